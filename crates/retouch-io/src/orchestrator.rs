//! Upload/process orchestration.
//!
//! One [`Orchestrator::run`] takes an edit from strokes to a finished
//! remote job:
//!
//! ```text
//! queued -> uploading original -> rasterizing -> uploading mask
//!        -> submitting -> processing -> done
//! ```
//!
//! Any step can fail, which moves the job to `failed` and stops the
//! run. Steps run strictly in order: the mask upload needs the rendered
//! mask, and submission needs both upload ids. A failed run is never
//! retried automatically; calling `run` again starts over from
//! `queued`.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use retouch_editor::descriptor::{ImageLimits, validate_format, validate_size};
use retouch_editor::{ImageDescriptor, StrokeLog};
use serde::Serialize;
use web_time::Instant;

use crate::api::{ImageKind, InpaintApi, InpaintModel, ProcessRecord, RecordStatus, RemoteId};
use crate::config::CompletionPolicy;
use crate::error::{ProcessError, ValidationError};
use crate::transport::{Transport, UploadProgress};

/// File name the mask is uploaded under.
pub const MASK_FILE_NAME: &str = "mask.png";

/// Stage of a [`ProcessJob`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Created, nothing sent yet.
    Queued,
    /// Uploading the source image.
    UploadingOriginal,
    /// Rendering the mask.
    Rasterizing,
    /// Uploading the mask.
    UploadingMask,
    /// Requesting the inpainting job.
    Submitting,
    /// Waiting for the remote job.
    Processing,
    /// Finished successfully.
    Done,
    /// Stopped by an error.
    Failed,
}

impl JobStatus {
    const SEQUENCE: [Self; 7] = [
        Self::Queued,
        Self::UploadingOriginal,
        Self::Rasterizing,
        Self::UploadingMask,
        Self::Submitting,
        Self::Processing,
        Self::Done,
    ];

    fn position(self) -> Option<usize> {
        Self::SEQUENCE.iter().position(|s| *s == self)
    }

    /// Progress reached on entering this stage. `None` for
    /// [`Failed`](Self::Failed), which keeps the progress it failed at.
    #[must_use]
    pub const fn progress(self) -> Option<u8> {
        match self {
            Self::Queued | Self::UploadingOriginal => Some(0),
            Self::Rasterizing => Some(30),
            Self::UploadingMask => Some(50),
            Self::Submitting | Self::Processing => Some(70),
            Self::Done => Some(100),
            Self::Failed => None,
        }
    }

    /// Short machine-friendly name.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::UploadingOriginal => "uploading original",
            Self::Rasterizing => "rasterizing",
            Self::UploadingMask => "uploading mask",
            Self::Submitting => "submitting",
            Self::Processing => "processing",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    /// Status text for the user.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::Queued => "Preparing...",
            Self::UploadingOriginal => "Uploading image...",
            Self::Rasterizing => "Generating mask...",
            Self::UploadingMask => "Uploading mask...",
            Self::Submitting => "Starting AI processing...",
            Self::Processing => "AI processing...",
            Self::Done => "Processing complete!",
            Self::Failed => "Processing failed",
        }
    }

    /// Whether no further transition is possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Whether `next` may follow this stage: the immediate successor,
    /// or `Failed` from any non-terminal stage.
    #[must_use]
    pub fn can_advance_to(self, next: Self) -> bool {
        if next == Self::Failed {
            return !self.is_terminal();
        }
        match (self.position(), next.position()) {
            (Some(a), Some(b)) => b == a + 1,
            _ => false,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Observable state of one orchestration run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessJob {
    /// Run number, increasing per orchestrator.
    pub id: u64,
    /// Current stage.
    pub status: JobStatus,
    /// Percentage in `[0, 100]`; never decreases within a run.
    pub progress: u8,
    /// Model requested.
    pub model: InpaintModel,
    /// Remote job id, once submitted.
    pub process_id: Option<RemoteId>,
    /// Final record, once finished (absent when not polling).
    pub record: Option<ProcessRecord>,
    /// URL of the repaired image, when known.
    pub result_url: Option<String>,
    /// Failure description, when failed.
    pub error: Option<String>,
}

impl ProcessJob {
    fn queued(id: u64, model: InpaintModel) -> Self {
        Self {
            id,
            status: JobStatus::Queued,
            progress: 0,
            model,
            process_id: None,
            record: None,
            result_url: None,
            error: None,
        }
    }

    /// Status text for the user.
    #[must_use]
    pub const fn message(&self) -> &'static str {
        self.status.message()
    }
}

/// Receives job updates during a run.
pub trait ProgressObserver {
    /// Called after every status or progress change.
    fn on_transition(&mut self, job: &ProcessJob);

    /// Called as upload body bytes are sent.
    fn on_upload_progress(&mut self, kind: ImageKind, progress: UploadProgress) {
        let _ = (kind, progress);
    }
}

impl<F: FnMut(&ProcessJob)> ProgressObserver for F {
    fn on_transition(&mut self, job: &ProcessJob) {
        self(job);
    }
}

/// Lets the owner of a run give up on it.
///
/// Once triggered, the run stops at its next checkpoint (after each
/// network call, poll sleep and mask render), discards what that step
/// produced and leaves the job as it was.
#[derive(Debug, Clone, Default)]
pub struct AbandonHandle(Rc<Cell<bool>>);

impl AbandonHandle {
    /// A fresh, untriggered handle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Give up on the run.
    pub fn abandon(&self) {
        self.0.set(true);
    }

    /// Whether [`abandon`](Self::abandon) was called.
    #[must_use]
    pub fn is_abandoned(&self) -> bool {
        self.0.get()
    }
}

/// Everything a run needs from the editor.
#[derive(Debug, Clone, Copy)]
pub struct EditRequest<'a> {
    /// The loaded image; its display size is the mask size.
    pub descriptor: &'a ImageDescriptor,
    /// Encoded bytes of the source image, as uploaded.
    pub image_bytes: &'a [u8],
    /// Committed strokes.
    pub strokes: &'a StrokeLog,
    /// Model to run.
    pub model: InpaintModel,
}

/// Wall-clock duration of one stage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StepTiming {
    /// The stage.
    pub status: JobStatus,
    /// Time spent in it (seconds).
    #[serde(with = "crate::config::duration_serde")]
    pub duration: Duration,
}

/// Outcome of a successful run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobReport {
    /// Final job state.
    pub job: ProcessJob,
    /// Per-stage durations in execution order.
    pub timings: Vec<StepTiming>,
    /// Total wall-clock duration (seconds).
    #[serde(with = "crate::config::duration_serde")]
    pub total: Duration,
}

/// Drives upload, rasterization, submission and completion.
#[derive(Debug)]
pub struct Orchestrator<T> {
    api: InpaintApi<T>,
    completion: CompletionPolicy,
    limits: ImageLimits,
    job: ProcessJob,
    runs: u64,
    timings: Vec<StepTiming>,
    step_started: Option<Instant>,
}

impl<T: Transport> Orchestrator<T> {
    /// Create an orchestrator with default image limits.
    #[must_use]
    pub fn new(api: InpaintApi<T>, completion: CompletionPolicy) -> Self {
        Self {
            api,
            completion,
            limits: ImageLimits::default(),
            job: ProcessJob::queued(0, InpaintModel::default()),
            runs: 0,
            timings: Vec::new(),
            step_started: None,
        }
    }

    /// Replace the image limits.
    #[must_use]
    pub const fn with_limits(mut self, limits: ImageLimits) -> Self {
        self.limits = limits;
        self
    }

    /// The current (or last) job.
    #[must_use]
    pub const fn job(&self) -> &ProcessJob {
        &self.job
    }

    /// The API the orchestrator calls.
    #[must_use]
    pub const fn api(&self) -> &InpaintApi<T> {
        &self.api
    }

    /// Run the whole pipeline for one edit.
    ///
    /// Input is validated before anything is sent; a rejected request
    /// leaves the previous job untouched.
    ///
    /// # Errors
    ///
    /// - [`ProcessError::Validation`] for an empty stroke log or an
    ///   unsupported or oversized image (no network calls are made);
    /// - [`ProcessError::Network`] or [`ProcessError::Rasterization`]
    ///   from the failing step;
    /// - [`ProcessError::Remote`] if the server reports the job failed;
    /// - [`ProcessError::CompletionTimeout`] if polling runs out;
    /// - [`ProcessError::Abandoned`] if `abandon` was triggered.
    pub fn run(
        &mut self,
        request: &EditRequest<'_>,
        observer: &mut dyn ProgressObserver,
        abandon: &AbandonHandle,
    ) -> Result<JobReport, ProcessError> {
        self.validate(request)?;

        let started = Instant::now();
        self.runs += 1;
        self.job = ProcessJob::queued(self.runs, request.model);
        self.timings.clear();
        self.step_started = Some(started);
        tracing::info!(job = self.job.id, model = %request.model, "job queued");
        observer.on_transition(&self.job);

        self.execute(request, observer, abandon)?;

        Ok(JobReport {
            job: self.job.clone(),
            timings: self.timings.clone(),
            total: started.elapsed(),
        })
    }

    fn validate(&self, request: &EditRequest<'_>) -> Result<(), ValidationError> {
        if request.strokes.is_empty() {
            return Err(ValidationError::EmptyMask);
        }
        validate_format(request.descriptor.source_path()).map_err(ValidationError::Image)?;
        validate_size(request.image_bytes.len() as u64, self.limits.max_bytes)
            .map_err(ValidationError::Image)?;
        Ok(())
    }

    fn execute(
        &mut self,
        request: &EditRequest<'_>,
        observer: &mut dyn ProgressObserver,
        abandon: &AbandonHandle,
    ) -> Result<(), ProcessError> {
        // Original upload.
        self.advance(JobStatus::UploadingOriginal, observer);
        let outcome = self.api.upload_image(
            request.image_bytes.to_vec(),
            &request.descriptor.file_name(),
            ImageKind::Original,
            &mut |p| observer.on_upload_progress(ImageKind::Original, p),
        );
        checkpoint(abandon)?;
        let original = self.settle(outcome.map_err(ProcessError::from), observer)?;

        // Mask rendering.
        self.advance(JobStatus::Rasterizing, observer);
        let rendered = retouch_editor::render_mask_png(request.strokes, request.descriptor.display())
            .map_err(ProcessError::Rasterization);
        checkpoint(abandon)?;
        let mask_png = self.settle(rendered, observer)?;

        // Mask upload.
        self.advance(JobStatus::UploadingMask, observer);
        let outcome = self.api.upload_image(
            mask_png,
            MASK_FILE_NAME,
            ImageKind::Mask,
            &mut |p| observer.on_upload_progress(ImageKind::Mask, p),
        );
        checkpoint(abandon)?;
        let mask = self.settle(outcome.map_err(ProcessError::from), observer)?;

        // Submission.
        self.advance(JobStatus::Submitting, observer);
        let outcome = self
            .api
            .submit_inpaint(&original.id, &mask.id, request.model);
        checkpoint(abandon)?;
        let ticket = self.settle(outcome.map_err(ProcessError::from), observer)?;
        self.job.process_id = Some(ticket.process_id.clone());

        // Completion.
        self.advance(JobStatus::Processing, observer);
        let record = self.await_completion(&ticket.process_id, observer, abandon)?;
        if let Some(record) = record {
            self.job.result_url.clone_from(&record.result_image_url);
            self.job.record = Some(record);
        }

        self.advance(JobStatus::Done, observer);
        self.close_step();
        Ok(())
    }

    fn await_completion(
        &mut self,
        process_id: &RemoteId,
        observer: &mut dyn ProgressObserver,
        abandon: &AbandonHandle,
    ) -> Result<Option<ProcessRecord>, ProcessError> {
        let policy = self.completion;
        for poll in 0..policy.max_polls {
            if poll > 0 {
                self.api.client().sleeper().sleep(policy.poll_interval);
                checkpoint(abandon)?;
            }
            let outcome = self.api.fetch_process(process_id);
            checkpoint(abandon)?;
            let record = self.settle(outcome.map_err(ProcessError::from), observer)?;
            tracing::debug!(
                job = self.job.id,
                process_id = %process_id,
                poll = poll + 1,
                status = ?record.status,
                "polled job"
            );

            match record.status {
                RecordStatus::Completed => return Ok(Some(record)),
                RecordStatus::Failed => {
                    let message = record.error_message.clone().unwrap_or_default();
                    return Err(self.fail(ProcessError::Remote(message), observer));
                }
                RecordStatus::Pending | RecordStatus::Processing | RecordStatus::Unknown => {
                    if let Some(remote) = record.progress {
                        self.bump_progress(remote, observer);
                    }
                }
            }
        }

        if policy.max_polls == 0 {
            return Ok(None);
        }
        let process_id = process_id.to_string();
        Err(self.fail(ProcessError::CompletionTimeout { process_id }, observer))
    }

    /// Map remote progress into the processing band (70..=99).
    fn bump_progress(&mut self, remote: u8, observer: &mut dyn ProgressObserver) {
        let scaled = u16::from(remote.min(100)) * 29 / 100;
        let banded = 70 + u8::try_from(scaled).unwrap_or(29);
        if banded > self.job.progress {
            self.job.progress = banded;
            observer.on_transition(&self.job);
        }
    }

    fn advance(&mut self, next: JobStatus, observer: &mut dyn ProgressObserver) {
        debug_assert!(
            self.job.status.can_advance_to(next),
            "illegal transition {} -> {next}",
            self.job.status
        );
        self.close_step();
        self.job.status = next;
        if let Some(progress) = next.progress() {
            self.job.progress = self.job.progress.max(progress);
        }
        tracing::info!(
            job = self.job.id,
            status = %next,
            progress = self.job.progress,
            "job advanced"
        );
        observer.on_transition(&self.job);
    }

    /// Record how long the current stage took and start timing the
    /// next one.
    fn close_step(&mut self) {
        let now = Instant::now();
        if let Some(started) = self.step_started.replace(now) {
            self.timings.push(StepTiming {
                status: self.job.status,
                duration: now.duration_since(started),
            });
        }
    }

    fn settle<V>(
        &mut self,
        outcome: Result<V, ProcessError>,
        observer: &mut dyn ProgressObserver,
    ) -> Result<V, ProcessError> {
        outcome.map_err(|err| self.fail(err, observer))
    }

    fn fail(&mut self, err: ProcessError, observer: &mut dyn ProgressObserver) -> ProcessError {
        self.close_step();
        self.step_started = None;
        tracing::warn!(
            job = self.job.id,
            status = %self.job.status,
            error = %err,
            "job failed"
        );
        self.job.status = JobStatus::Failed;
        self.job.error = Some(err.to_string());
        observer.on_transition(&self.job);
        err
    }
}

fn checkpoint(abandon: &AbandonHandle) -> Result<(), ProcessError> {
    if abandon.is_abandoned() {
        tracing::info!("job abandoned");
        return Err(ProcessError::Abandoned);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_is_monotonic_along_the_sequence() {
        let values: Vec<u8> = JobStatus::SEQUENCE
            .iter()
            .filter_map(|s| s.progress())
            .collect();
        assert_eq!(values, vec![0, 0, 30, 50, 70, 70, 100]);
        assert!(values.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn transitions_are_strictly_forward() {
        use JobStatus as S;
        assert!(S::Queued.can_advance_to(S::UploadingOriginal));
        assert!(S::UploadingOriginal.can_advance_to(S::Rasterizing));
        assert!(S::Processing.can_advance_to(S::Done));
        assert!(!S::Rasterizing.can_advance_to(S::UploadingOriginal));
        assert!(!S::Queued.can_advance_to(S::Submitting));
        assert!(!S::Done.can_advance_to(S::Queued));
    }

    #[test]
    fn failure_reachable_from_non_terminal_only() {
        for status in JobStatus::SEQUENCE {
            assert_eq!(status.can_advance_to(JobStatus::Failed), status != JobStatus::Done);
        }
        assert!(!JobStatus::Failed.can_advance_to(JobStatus::Failed));
    }

    #[test]
    fn abandon_handle_is_shared() {
        let handle = AbandonHandle::new();
        let clone = handle.clone();
        assert!(!handle.is_abandoned());
        clone.abandon();
        assert!(handle.is_abandoned());
    }

    #[test]
    fn closures_are_observers() {
        let mut seen = Vec::new();
        let mut observer = |job: &ProcessJob| seen.push(job.status);
        let job = ProcessJob::queued(1, InpaintModel::Lama);
        observer.on_transition(&job);
        observer.on_upload_progress(ImageKind::Mask, UploadProgress { sent: 1, total: 2 });
        assert_eq!(seen, vec![JobStatus::Queued]);
    }
}
