use thiserror::Error;

use crate::model::{Payload, Submission, SubmissionFailure, SubmissionStatus};

/// A change to one submission. Applied by the queue, produced by the
/// orchestrator and the retry coordinator.
#[derive(Clone, Debug, PartialEq)]
pub enum Patch {
    /// Forward move through the pipeline.
    Status(SubmissionStatus),
    /// One more image finished uploading.
    UploadedUrl(String),
    /// Terminal failure of the current admission.
    Fail(SubmissionFailure),
    /// Failed -> Pending, optionally swapping in a fresh payload.
    Readmit { payload: Option<Payload> },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("illegal transition {from:?} -> {to:?}")]
    Illegal {
        from: SubmissionStatus,
        to: SubmissionStatus,
    },
    #[error("{remaining} image(s) still need uploading before persisting")]
    UploadsIncomplete { remaining: usize },
    #[error("uploaded url rejected in {status:?} ({uploaded}/{images} uploaded)")]
    UnexpectedUpload {
        status: SubmissionStatus,
        uploaded: usize,
        images: usize,
    },
    #[error("only failed submissions can be re-admitted (status {0:?})")]
    NotFailed(SubmissionStatus),
}

/// Where a freshly admitted submission goes after `Pending`.
///
/// Submissions whose images are all uploaded already (no images at all, or a
/// retry after a persist failure) skip straight to `Persisting`.
pub fn entry_status(submission: &Submission) -> SubmissionStatus {
    if submission.remaining_images().is_empty() {
        SubmissionStatus::Persisting
    } else {
        SubmissionStatus::StagingImages
    }
}

/// Structural forward edges of the state machine. `Failed` is reached via
/// [`Patch::Fail`] and left via [`Patch::Readmit`] only.
pub fn is_forward_edge(from: SubmissionStatus, to: SubmissionStatus) -> bool {
    use SubmissionStatus::*;
    matches!(
        (from, to),
        (Pending, StagingImages)
            | (Pending, Persisting)
            | (StagingImages, Uploading)
            | (Uploading, Persisting)
            | (Persisting, Done)
    )
}

impl Submission {
    pub fn apply(&mut self, patch: Patch) -> Result<(), TransitionError> {
        match patch {
            Patch::Status(to) => self.advance(to),
            Patch::UploadedUrl(url) => {
                if self.status != SubmissionStatus::Uploading || self.uploaded_urls.len() >= self.images.len() {
                    return Err(TransitionError::UnexpectedUpload {
                        status: self.status,
                        uploaded: self.uploaded_urls.len(),
                        images: self.images.len(),
                    });
                }
                self.uploaded_urls.push(url);
                Ok(())
            }
            Patch::Fail(failure) => {
                if self.status.is_terminal() {
                    return Err(TransitionError::Illegal {
                        from: self.status,
                        to: SubmissionStatus::Failed,
                    });
                }
                self.status = SubmissionStatus::Failed;
                self.error = Some(failure);
                Ok(())
            }
            Patch::Readmit { payload } => {
                if self.status != SubmissionStatus::Failed {
                    return Err(TransitionError::NotFailed(self.status));
                }
                if let Some(payload) = payload {
                    self.payload = payload;
                }
                self.status = SubmissionStatus::Pending;
                self.error = None;
                self.attempts = self.attempts.saturating_add(1);
                Ok(())
            }
        }
    }

    fn advance(&mut self, to: SubmissionStatus) -> Result<(), TransitionError> {
        if !is_forward_edge(self.status, to) {
            return Err(TransitionError::Illegal { from: self.status, to });
        }
        let remaining = self.remaining_images().len();
        match (self.status, to) {
            (SubmissionStatus::Pending, SubmissionStatus::StagingImages) if remaining == 0 => {
                return Err(TransitionError::Illegal { from: self.status, to });
            }
            (_, SubmissionStatus::Persisting) if remaining > 0 => {
                return Err(TransitionError::UploadsIncomplete { remaining });
            }
            _ => {}
        }
        self.status = to;
        Ok(())
    }
}
