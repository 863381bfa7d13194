use gems_core::{Patch, Payload, Submission, SubmissionId, SubmissionStatus, TransitionError};
use gems_queue::QueueError;
use tracing::info;

use crate::error::RetryError;
use crate::orchestrator::{Orchestrator, SubmissionHandle};

/// Re-admits failed submissions. Uploaded URLs survive a retry, so only the
/// images that never finished are sent again.
#[derive(Clone)]
pub struct RetryCoordinator {
    orchestrator: Orchestrator,
}

impl RetryCoordinator {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self { orchestrator }
    }

    /// Failed -> Pending and re-drive. `payload` replaces the stored one when
    /// the user edited the form before retrying.
    pub fn retry(&self, id: SubmissionId, payload: Option<Payload>) -> Result<SubmissionHandle, RetryError> {
        let queue = self.orchestrator.queue();
        match queue.update(id, Patch::Readmit { payload }) {
            Ok(sub) => {
                info!(
                    submission_id = %id,
                    attempt = sub.attempts(),
                    uploaded = sub.uploaded_urls().len(),
                    "retrying submission"
                );
                Ok(self.orchestrator.spawn_drive(id))
            }
            Err(QueueError::Transition(TransitionError::NotFailed(status))) => Err(RetryError::NotFailed { id, status }),
            Err(_) => Err(self.not_retryable(id)),
        }
    }

    /// Drops a failed submission the user gave up on.
    pub fn dismiss(&self, id: SubmissionId) -> Result<Submission, RetryError> {
        let removed = self
            .orchestrator
            .queue()
            .remove_if(id, |s| s.status() == SubmissionStatus::Failed);
        match removed {
            Some(sub) => {
                info!(submission_id = %id, "failed submission dismissed");
                Ok(sub)
            }
            None => Err(self.not_retryable(id)),
        }
    }

    /// Re-admits every submission currently `Failed`.
    pub fn retry_all_failed(&self) -> Vec<SubmissionHandle> {
        self.orchestrator
            .queue()
            .snapshot()
            .failed_ids()
            .into_iter()
            .filter_map(|id| self.retry(id, None).ok())
            .collect()
    }

    fn not_retryable(&self, id: SubmissionId) -> RetryError {
        match self.orchestrator.queue().get(id) {
            Some(sub) => RetryError::NotFailed {
                id,
                status: sub.status(),
            },
            None => RetryError::NotFound(id),
        }
    }
}
