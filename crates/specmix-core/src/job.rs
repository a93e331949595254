//! Background mix jobs with supersession and cancellation.
//!
//! Each output slot runs at most one job at a time. Submitting a new job
//! for a slot cancels the running one (its token is set, and it stops at
//! its next checkpoint) and bumps the slot's generation. A job may only
//! publish while its generation is still current, and that check happens
//! under the slot's lock, so a superseded job can never overwrite a newer
//! result even if it finishes first.
//!
//! Outcomes are recorded per slot ([`JobController::status`],
//! [`JobController::result`]) and streamed as [`JobEvent`]s over an
//! `mpsc` channel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, mpsc};
use std::thread;

use crate::diagnostics::{MixDiagnostics, WebClock};
use crate::mixer::{self, MixControl, MixSpec, SpectrumSet};
use crate::types::{GrayImage, MixError, OUTPUT_SLOTS, OutputSlot};

/// Lifecycle of an output slot.
#[derive(Debug, Clone, PartialEq)]
pub enum JobStatus {
    /// Nothing has run, or the last result was cleared.
    Idle,
    /// A job is computing.
    Running {
        /// Generation of the running job.
        generation: u64,
        /// Last reported progress, `0.0..=1.0`.
        progress: f64,
    },
    /// The last job published a result.
    Completed {
        /// Generation that published.
        generation: u64,
    },
    /// The last job was cancelled without a replacement.
    Cancelled {
        /// Generation that was cancelled.
        generation: u64,
    },
    /// The last job failed.
    Failed {
        /// Generation that failed.
        generation: u64,
        /// Why.
        error: MixError,
    },
}

impl JobStatus {
    /// Returns `true` while a job is computing.
    #[must_use]
    pub const fn is_running(&self) -> bool {
        matches!(self, Self::Running { .. })
    }
}

/// Notifications from running jobs, in publication order per slot.
///
/// Only the current generation of a slot ever produces events.
#[derive(Debug, Clone)]
pub enum JobEvent {
    /// Progress reached a stage boundary.
    Progress {
        output: OutputSlot,
        generation: u64,
        fraction: f64,
    },
    /// The job finished and its image is now the slot's result.
    Completed {
        output: OutputSlot,
        generation: u64,
        image: Arc<GrayImage>,
    },
    /// The job was cancelled with no replacement.
    Cancelled { output: OutputSlot, generation: u64 },
    /// The job failed.
    Failed {
        output: OutputSlot,
        generation: u64,
        error: MixError,
    },
}

/// What a finished job hands back for publication.
#[derive(Debug, Clone)]
pub struct JobOutput {
    /// The mixed image.
    pub image: GrayImage,
    /// Stage timings, when collected.
    pub diagnostics: Option<MixDiagnostics>,
}

impl From<GrayImage> for JobOutput {
    fn from(image: GrayImage) -> Self {
        Self {
            image,
            diagnostics: None,
        }
    }
}

/// Shared cancellation flag of one job.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns `true` once cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
struct SlotState {
    generation: u64,
    token: Option<CancelToken>,
    status: JobStatus,
    result: Option<Arc<GrayImage>>,
    diagnostics: Option<MixDiagnostics>,
}

impl Default for SlotState {
    fn default() -> Self {
        Self {
            generation: 0,
            token: None,
            status: JobStatus::Idle,
            result: None,
            diagnostics: None,
        }
    }
}

#[derive(Debug)]
struct Shared {
    slots: [Mutex<SlotState>; OUTPUT_SLOTS],
    events: mpsc::Sender<JobEvent>,
}

impl Shared {
    fn lock(&self, output: OutputSlot) -> MutexGuard<'_, SlotState> {
        self.slots[output.index()]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: JobEvent) {
        if self.events.send(event).is_err() {
            tracing::trace!("job event receiver dropped");
        }
    }
}

/// Handed to a running job: cancellation polling and progress reporting.
#[derive(Debug, Clone)]
pub struct JobContext {
    output: OutputSlot,
    generation: u64,
    token: CancelToken,
    shared: Arc<Shared>,
}

impl JobContext {
    /// Generation of the job.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Record the job's outcome if it is still the slot's current job.
    fn finish(&self, outcome: Result<JobOutput, MixError>) {
        let (output, generation) = (self.output, self.generation);
        let event = {
            let mut state = self.shared.lock(output);
            if state.generation != generation {
                tracing::debug!(
                    %output,
                    generation,
                    current = state.generation,
                    "discarding superseded job outcome"
                );
                return;
            }
            state.token = None;
            match outcome {
                Ok(JobOutput { image, diagnostics }) => {
                    let image = Arc::new(image);
                    state.status = JobStatus::Completed { generation };
                    state.result = Some(Arc::clone(&image));
                    state.diagnostics.clone_from(&diagnostics);
                    drop(state);
                    if let Some(diagnostics) = &diagnostics {
                        tracing::info!(
                            %output,
                            generation,
                            total_ms = diagnostics.total_duration.as_secs_f64() * 1000.0,
                            "mix completed"
                        );
                    } else {
                        tracing::info!(%output, generation, "mix completed");
                    }
                    JobEvent::Completed {
                        output,
                        generation,
                        image,
                    }
                }
                Err(MixError::Cancelled) => {
                    state.status = JobStatus::Cancelled { generation };
                    state.result = None;
                    drop(state);
                    tracing::info!(%output, generation, "mix cancelled");
                    JobEvent::Cancelled { output, generation }
                }
                Err(error) => {
                    state.status = JobStatus::Failed {
                        generation,
                        error: error.clone(),
                    };
                    drop(state);
                    tracing::error!(%output, generation, %error, "mix failed");
                    JobEvent::Failed {
                        output,
                        generation,
                        error,
                    }
                }
            }
        };
        self.shared.emit(event);
    }
}

impl MixControl for JobContext {
    fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    fn report(&self, fraction: f64) {
        let fraction = {
            let mut state = self.shared.lock(self.output);
            if state.generation != self.generation {
                return;
            }
            let JobStatus::Running { progress, .. } = &mut state.status else {
                return;
            };
            *progress = fraction.max(*progress);
            *progress
        };
        self.shared.emit(JobEvent::Progress {
            output: self.output,
            generation: self.generation,
            fraction,
        });
    }
}

/// Handle to a spawned job.
#[derive(Debug)]
pub struct JobHandle {
    generation: u64,
    token: CancelToken,
    thread: thread::JoinHandle<()>,
}

impl JobHandle {
    /// Generation of the job.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Returns `true` once the job was asked to stop.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Returns `true` once the worker thread has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Wait for the worker thread to exit.
    ///
    /// # Errors
    ///
    /// Returns the panic payload if the job panicked.
    pub fn join(self) -> thread::Result<()> {
        self.thread.join()
    }
}

/// Runs mix jobs, one active job per output slot.
#[derive(Debug)]
pub struct JobController {
    shared: Arc<Shared>,
}

impl JobController {
    /// Create a controller and the receiver for its events.
    #[must_use]
    pub fn new() -> (Self, mpsc::Receiver<JobEvent>) {
        let (events, receiver) = mpsc::channel();
        let shared = Arc::new(Shared {
            slots: Default::default(),
            events,
        });
        (Self { shared }, receiver)
    }

    /// Mix `spectra` according to `spec` on a background thread and
    /// publish the result to `spec.output`.
    ///
    /// Malformed specs are reported through the job as
    /// [`JobStatus::Failed`], not here.
    ///
    /// # Errors
    ///
    /// Returns [`MixError::Spawn`] if the worker thread cannot be
    /// started.
    pub fn submit(&self, spec: MixSpec, spectra: SpectrumSet) -> Result<JobHandle, MixError> {
        self.submit_with(spec.output, move |ctx| {
            let (image, diagnostics) =
                mixer::mix_with_diagnostics(&spec, &spectra, ctx, &WebClock)?;
            tracing::debug!("\n{}", diagnostics.report());
            Ok(JobOutput {
                image,
                diagnostics: Some(diagnostics),
            })
        })
    }

    /// Run an arbitrary job for `output` with supersession semantics.
    ///
    /// `work` should poll [`MixControl::is_cancelled`] on the context it
    /// receives and return [`MixError::Cancelled`] when asked to stop.
    ///
    /// # Errors
    ///
    /// Returns [`MixError::Spawn`] if the worker thread cannot be
    /// started; the slot is then marked failed.
    pub fn submit_with<F>(&self, output: OutputSlot, work: F) -> Result<JobHandle, MixError>
    where
        F: FnOnce(&JobContext) -> Result<JobOutput, MixError> + Send + 'static,
    {
        let token = CancelToken::default();
        let generation = {
            let mut state = self.shared.lock(output);
            if let Some(previous) = state.token.take() {
                previous.cancel();
                tracing::info!(%output, superseded = state.generation, "superseding running mix");
            }
            state.generation += 1;
            state.token = Some(token.clone());
            state.status = JobStatus::Running {
                generation: state.generation,
                progress: 0.0,
            };
            state.generation
        };
        tracing::info!(%output, generation, "mix submitted");

        let ctx = JobContext {
            output,
            generation,
            token: token.clone(),
            shared: Arc::clone(&self.shared),
        };
        let spawned = thread::Builder::new()
            .name(format!("specmix-{}", output.index() + 1))
            .spawn(move || {
                let outcome = work(&ctx);
                ctx.finish(outcome);
            });

        match spawned {
            Ok(thread) => Ok(JobHandle {
                generation,
                token,
                thread,
            }),
            Err(e) => {
                let error = MixError::Spawn(e.to_string());
                let mut state = self.shared.lock(output);
                if state.generation == generation {
                    state.token = None;
                    state.status = JobStatus::Failed {
                        generation,
                        error: error.clone(),
                    };
                }
                Err(error)
            }
        }
    }

    /// Cancel the running job of `output` without a replacement and drop
    /// the slot's stored result.
    ///
    /// Returns `true` if a job was running.
    pub fn cancel(&self, output: OutputSlot) -> bool {
        let generation = {
            let mut state = self.shared.lock(output);
            state.result = None;
            state.diagnostics = None;
            let Some(token) = state.token.take() else {
                state.status = JobStatus::Idle;
                return false;
            };
            token.cancel();
            let generation = state.generation;
            // Retire the generation so the cancelled job cannot publish.
            state.generation += 1;
            state.status = JobStatus::Cancelled { generation };
            generation
        };
        tracing::info!(%output, generation, "mix cancelled");
        self.shared.emit(JobEvent::Cancelled { output, generation });
        true
    }

    /// Current status of `output`.
    #[must_use]
    pub fn status(&self, output: OutputSlot) -> JobStatus {
        self.shared.lock(output).status.clone()
    }

    /// Last published image of `output`.
    #[must_use]
    pub fn result(&self, output: OutputSlot) -> Option<Arc<GrayImage>> {
        self.shared.lock(output).result.clone()
    }

    /// Diagnostics of the last published mix of `output`.
    #[must_use]
    pub fn diagnostics(&self, output: OutputSlot) -> Option<MixDiagnostics> {
        self.shared.lock(output).diagnostics.clone()
    }
}

impl Drop for JobController {
    fn drop(&mut self) {
        for output in OutputSlot::ALL {
            if let Some(token) = self.shared.lock(output).token.take() {
                token.cancel();
            }
        }
    }
}
