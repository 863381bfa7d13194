use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ids::SubmissionId;

/// Already-validated form fields. The shape depends on the kind.
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// Which domain object a submission creates.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionKind {
    Restaurant,
    Dish,
    Review,
    Post,
}

impl SubmissionKind {
    pub const ALL: [SubmissionKind; 4] = [
        SubmissionKind::Restaurant,
        SubmissionKind::Dish,
        SubmissionKind::Review,
        SubmissionKind::Post,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            SubmissionKind::Restaurant => "restaurant",
            SubmissionKind::Dish => "dish",
            SubmissionKind::Review => "review",
            SubmissionKind::Post => "post",
        }
    }

    /// Upper bound on attached images; `None` means unbounded.
    pub fn max_images(&self) -> Option<usize> {
        match self {
            SubmissionKind::Restaurant | SubmissionKind::Dish => Some(1),
            SubmissionKind::Review | SubmissionKind::Post => None,
        }
    }
}

impl fmt::Display for SubmissionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.label())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown submission kind: {0}")]
pub struct UnknownKind(pub String);

impl FromStr for SubmissionKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SubmissionKind::ALL
            .into_iter()
            .find(|k| k.label().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownKind(s.to_string()))
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    Pending,
    StagingImages,
    Uploading,
    Persisting,
    Done,
    Failed,
}

impl SubmissionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SubmissionStatus::Done | SubmissionStatus::Failed)
    }

    /// Still moving through the pipeline.
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }
}

/// Pipeline step responsible for a failure.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStep {
    Stage,
    Upload,
    Persist,
}

impl fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PipelineStep::Stage => "stage",
            PipelineStep::Upload => "upload",
            PipelineStep::Persist => "persist",
        })
    }
}

/// Error attached to a `Failed` submission.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubmissionFailure {
    pub step: Option<PipelineStep>,
    pub message: String,
}

impl SubmissionFailure {
    pub fn new(step: PipelineStep, message: impl Into<String>) -> Self {
        Self {
            step: Some(step),
            message: message.into(),
        }
    }

    /// Text shown to the user; falls back to a generic message.
    pub fn display_message(&self) -> &str {
        if self.message.trim().is_empty() {
            "failed"
        } else {
            &self.message
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubmissionError {
    #[error("{kind} accepts at most {max} image(s), got {got}")]
    TooManyImages {
        kind: SubmissionKind,
        max: usize,
        got: usize,
    },
}

/// One user-initiated create action tracked through the pipeline.
///
/// Fields are private: status, uploaded URLs and error only change through
/// [`Submission::apply`], which enforces the state machine.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Submission {
    pub(crate) id: SubmissionId,
    pub(crate) kind: SubmissionKind,
    pub(crate) payload: Payload,
    pub(crate) images: Vec<String>,
    pub(crate) status: SubmissionStatus,
    pub(crate) uploaded_urls: Vec<String>,
    pub(crate) error: Option<SubmissionFailure>,
    pub(crate) created_at_ms: i64,
    pub(crate) attempts: u32,
}

const LABEL_KEYS: [&str; 5] = ["name", "namaRestoran", "namaMakanan", "title", "content"];

impl Submission {
    pub fn new(kind: SubmissionKind, payload: Payload, images: Vec<String>) -> Result<Self, SubmissionError> {
        if let Some(max) = kind.max_images() {
            if images.len() > max {
                return Err(SubmissionError::TooManyImages {
                    kind,
                    max,
                    got: images.len(),
                });
            }
        }
        let id = SubmissionId::new();
        Ok(Self {
            id,
            kind,
            payload,
            images,
            status: SubmissionStatus::Pending,
            uploaded_urls: Vec::new(),
            error: None,
            created_at_ms: i64::try_from(id.timestamp_ms()).unwrap_or(i64::MAX),
            attempts: 1,
        })
    }

    pub fn id(&self) -> SubmissionId {
        self.id
    }

    pub fn kind(&self) -> SubmissionKind {
        self.kind
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn images(&self) -> &[String] {
        &self.images
    }

    pub fn status(&self) -> SubmissionStatus {
        self.status
    }

    pub fn uploaded_urls(&self) -> &[String] {
        &self.uploaded_urls
    }

    pub fn error(&self) -> Option<&SubmissionFailure> {
        self.error.as_ref()
    }

    pub fn created_at_ms(&self) -> i64 {
        self.created_at_ms
    }

    /// Number of times the pipeline has been admitted for this record.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Images not yet covered by an uploaded URL.
    pub fn remaining_images(&self) -> &[String] {
        &self.images[self.uploaded_urls.len().min(self.images.len())..]
    }

    /// Human label for queue rows, e.g. the restaurant name.
    pub fn display_name(&self) -> String {
        LABEL_KEYS
            .iter()
            .filter_map(|key| self.payload.get(*key).and_then(|v| v.as_str()))
            .map(str::trim)
            .find(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| self.kind.label().to_string())
    }
}
