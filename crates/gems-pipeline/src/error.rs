use std::path::PathBuf;

use gems_core::{PipelineStep, SubmissionError, SubmissionFailure, SubmissionId, SubmissionStatus};
use gems_queue::QueueError;
use thiserror::Error;

use crate::transport::TransportError;

#[derive(Debug, Error)]
pub enum StageError {
    #[error("image not found: {0}")]
    Missing(PathBuf),
    #[error("unsupported image reference: {0}")]
    Unsupported(String),
    #[error("could not copy {from} into staging")]
    Copy {
        from: String,
        #[source]
        source: std::io::Error,
    },
    #[error("staging timed out")]
    TimedOut,
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("could not read {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("{message}")]
    Rejected { status: u16, message: String },
    #[error("upload response carried neither url nor filename")]
    MissingLocation,
    #[error("upload timed out")]
    TimedOut,
}

#[derive(Debug, Error)]
pub enum PersistError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("{message}")]
    Rejected { status: u16, message: String },
    #[error("{0}")]
    Unconfirmed(String),
    #[error("save timed out")]
    TimedOut,
}

/// A step failure for one submission.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("staging failed: {0}")]
    Stage(#[from] StageError),
    #[error("upload failed: {0}")]
    Upload(#[from] UploadError),
    #[error("save failed: {0}")]
    Persist(#[from] PersistError),
}

impl PipelineError {
    pub fn step(&self) -> PipelineStep {
        match self {
            PipelineError::Stage(_) => PipelineStep::Stage,
            PipelineError::Upload(_) => PipelineStep::Upload,
            PipelineError::Persist(_) => PipelineStep::Persist,
        }
    }

    /// Text for the failed row. Server messages pass through verbatim.
    pub fn user_message(&self) -> String {
        match self {
            PipelineError::Upload(UploadError::Rejected { message, .. })
            | PipelineError::Persist(PersistError::Rejected { message, .. })
            | PipelineError::Persist(PersistError::Unconfirmed(message)) => message.clone(),
            other => other.to_string(),
        }
    }
}

impl From<&PipelineError> for SubmissionFailure {
    fn from(err: &PipelineError) -> Self {
        SubmissionFailure::new(err.step(), err.user_message())
    }
}

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error(transparent)]
    Invalid(#[from] SubmissionError),
    #[error(transparent)]
    Queue(#[from] QueueError),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RetryError {
    #[error("submission {0} not found")]
    NotFound(SubmissionId),
    #[error("submission {id} is {status:?}, only failed submissions can be retried")]
    NotFailed { id: SubmissionId, status: SubmissionStatus },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_text_is_verbatim() {
        let err = PipelineError::from(PersistError::Rejected {
            status: 400,
            message: "Nama restoran wajib diisi".into(),
        });
        let failure = SubmissionFailure::from(&err);
        assert_eq!(failure.step, Some(PipelineStep::Persist));
        assert_eq!(failure.message, "Nama restoran wajib diisi");
    }

    #[test]
    fn local_errors_are_described() {
        let err = PipelineError::from(StageError::Unsupported("ph://asset/1".into()));
        assert_eq!(err.step(), PipelineStep::Stage);
        assert_eq!(err.user_message(), "staging failed: unsupported image reference: ph://asset/1");

        let err = PipelineError::from(UploadError::MissingLocation);
        assert_eq!(err.step(), PipelineStep::Upload);
        assert!(err.user_message().contains("neither url nor filename"));
    }
}
