use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use gems_core::{
    entry_status, Patch, Payload, Submission, SubmissionFailure, SubmissionId, SubmissionKind, SubmissionStatus,
};
use gems_queue::{QueueError, SubmissionQueue};
use serde_json::Value;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::error::{PersistError, PipelineError, StageError, SubmitError, UploadError};
use crate::persister::MetadataPersister;
use crate::stager::{ImageStager, MountedContentResolver, StagedImage};
use crate::transport::Transport;
use crate::uploader::Uploader;

/// How one admission of the pipeline ended.
#[derive(Clone, Debug, PartialEq)]
pub enum SubmissionOutcome {
    /// Saved and removed from the queue. `receipt` is the create reply body.
    Done { id: SubmissionId, receipt: Value },
    /// Left in the queue as `Failed`.
    Failed { id: SubmissionId, failure: SubmissionFailure },
    /// The record vanished or was not in a drivable state.
    Abandoned { id: SubmissionId },
}

impl SubmissionOutcome {
    pub fn id(&self) -> SubmissionId {
        match self {
            SubmissionOutcome::Done { id, .. }
            | SubmissionOutcome::Failed { id, .. }
            | SubmissionOutcome::Abandoned { id } => *id,
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, SubmissionOutcome::Done { .. })
    }
}

/// Returned by `submit` and `retry`. Dropping it does not cancel the work;
/// progress stays observable through the queue.
#[derive(Debug)]
pub struct SubmissionHandle {
    id: SubmissionId,
    task: JoinHandle<SubmissionOutcome>,
}

impl SubmissionHandle {
    pub fn id(&self) -> SubmissionId {
        self.id
    }

    pub async fn settled(self) -> SubmissionOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(submission_id = %self.id, error = %err, "driver task ended abnormally");
                SubmissionOutcome::Abandoned { id: self.id }
            }
        }
    }
}

#[derive(Debug, Error)]
enum DriveError {
    #[error(transparent)]
    Step(#[from] PipelineError),
    #[error(transparent)]
    Queue(#[from] QueueError),
}

struct Inner {
    queue: SubmissionQueue,
    stager: ImageStager,
    uploader: Uploader,
    persister: MetadataPersister,
    step_timeout: Option<Duration>,
}

/// Drives submissions through stage, upload and persist, recording every
/// transition in the queue.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    pub fn new(config: &PipelineConfig, transport: Arc<dyn Transport>, queue: SubmissionQueue) -> Self {
        let mut stager = ImageStager::new(config.staging_dir.clone());
        if let Some(root) = &config.content_root {
            stager = stager.with_resolver(MountedContentResolver::new(root.clone()));
        }
        let base = config.base_url();
        Self::from_parts(
            queue,
            stager,
            Uploader::new(transport.clone(), base),
            MetadataPersister::new(transport, base),
            config.step_timeout(),
        )
    }

    pub fn from_parts(
        queue: SubmissionQueue,
        stager: ImageStager,
        uploader: Uploader,
        persister: MetadataPersister,
        step_timeout: Option<Duration>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                queue,
                stager,
                uploader,
                persister,
                step_timeout,
            }),
        }
    }

    pub fn queue(&self) -> &SubmissionQueue {
        &self.inner.queue
    }

    /// Enqueues a new submission and starts driving it in the background.
    /// Must be called from within a tokio runtime.
    pub fn submit(
        &self,
        kind: SubmissionKind,
        payload: Payload,
        images: Vec<String>,
    ) -> Result<SubmissionHandle, SubmitError> {
        let submission = Submission::new(kind, payload, images)?;
        let id = self.inner.queue.add(submission)?;
        info!(submission_id = %id, kind = %kind, "submission queued");
        Ok(self.spawn_drive(id))
    }

    pub fn spawn_drive(&self, id: SubmissionId) -> SubmissionHandle {
        let this = self.clone();
        let task = tokio::spawn(async move { this.drive(id).await });
        SubmissionHandle { id, task }
    }

    /// Runs one admission of a `Pending` submission to `Done` or `Failed`.
    pub async fn drive(&self, id: SubmissionId) -> SubmissionOutcome {
        match self.run(id).await {
            Ok(receipt) => {
                self.inner
                    .queue
                    .remove_if(id, |s| s.status() == SubmissionStatus::Done);
                info!(submission_id = %id, "submission settled");
                SubmissionOutcome::Done { id, receipt }
            }
            Err(DriveError::Step(err)) => {
                let failure = SubmissionFailure::from(&err);
                warn!(submission_id = %id, step = %err.step(), error = %err, "submission failed");
                match self.inner.queue.update(id, Patch::Fail(failure.clone())) {
                    Ok(_) => SubmissionOutcome::Failed { id, failure },
                    Err(qerr) => {
                        warn!(submission_id = %id, error = %qerr, "could not record failure");
                        SubmissionOutcome::Abandoned { id }
                    }
                }
            }
            Err(DriveError::Queue(err)) => {
                warn!(submission_id = %id, error = %err, "submission abandoned");
                SubmissionOutcome::Abandoned { id }
            }
        }
    }

    async fn run(&self, id: SubmissionId) -> Result<Value, DriveError> {
        let queue = &self.inner.queue;
        let current = queue.get(id).ok_or(QueueError::NotFound(id))?;
        let mut sub = queue.update(id, Patch::Status(entry_status(&current)))?;
        let kind = sub.kind();

        if sub.status() == SubmissionStatus::StagingImages {
            let mut staged = Vec::with_capacity(sub.remaining_images().len());
            for reference in sub.remaining_images() {
                match self
                    .bounded(self.inner.stager.stage(reference), StageError::TimedOut)
                    .await
                {
                    Ok(image) => staged.push(image),
                    Err(err) => {
                        self.release_all(&staged).await;
                        return Err(err.into());
                    }
                }
            }
            let uploaded = self.upload_all(id, kind, &staged).await;
            self.release_all(&staged).await;
            sub = uploaded?;
        }

        let receipt = self
            .bounded(
                self.inner
                    .persister
                    .persist(kind, sub.payload(), sub.uploaded_urls()),
                PersistError::TimedOut,
            )
            .await?;
        queue.update(id, Patch::Status(SubmissionStatus::Done))?;
        Ok(receipt)
    }

    /// Uploads staged images in order, recording each URL as it lands.
    async fn upload_all(
        &self,
        id: SubmissionId,
        kind: SubmissionKind,
        staged: &[StagedImage],
    ) -> Result<Submission, DriveError> {
        let queue = &self.inner.queue;
        queue.update(id, Patch::Status(SubmissionStatus::Uploading))?;
        for image in staged {
            let url = self
                .bounded(self.inner.uploader.upload(kind, image), UploadError::TimedOut)
                .await?;
            queue.update(id, Patch::UploadedUrl(url))?;
        }
        Ok(queue.update(id, Patch::Status(SubmissionStatus::Persisting))?)
    }

    async fn release_all(&self, staged: &[StagedImage]) {
        for image in staged {
            self.inner.stager.release(image).await;
        }
    }

    async fn bounded<T, E>(
        &self,
        step: impl Future<Output = Result<T, E>>,
        timed_out: E,
    ) -> Result<T, PipelineError>
    where
        E: Into<PipelineError>,
    {
        let result = match self.inner.step_timeout {
            Some(limit) => tokio::time::timeout(limit, step)
                .await
                .unwrap_or(Err(timed_out)),
            None => step.await,
        };
        result.map_err(Into::into)
    }
}
