use serde::{Deserialize, Serialize};

use crate::{PipelineStep, Submission, SubmissionId, SubmissionKind, SubmissionStatus};

/// Read-only projection of the queue for UI rendering.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct QueueView {
    pub active: Vec<ActiveItem>,
    pub failed: Vec<FailedItem>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ActiveItem {
    pub id: SubmissionId,
    pub kind: SubmissionKind,
    pub name: String,
    pub status: SubmissionStatus,
    pub uploaded: usize,
    pub total_images: usize,
    pub created_at_ms: i64,
}

/// A failed submission, rendered with a retry affordance.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct FailedItem {
    pub id: SubmissionId,
    pub kind: SubmissionKind,
    pub name: String,
    pub step: Option<PipelineStep>,
    pub message: String,
    pub attempts: u32,
    pub created_at_ms: i64,
}

impl FailedItem {
    pub fn retry_prompt(&self) -> String {
        format!("{} failed - tap to retry", self.name)
    }
}

impl QueueView {
    pub fn project<'a>(items: impl IntoIterator<Item = &'a Submission>) -> Self {
        let mut view = QueueView::default();
        for sub in items {
            match sub.status() {
                SubmissionStatus::Failed => {
                    let (step, message) = match sub.error() {
                        Some(err) => (err.step, err.display_message().to_string()),
                        None => (None, "failed".to_string()),
                    };
                    view.failed.push(FailedItem {
                        id: sub.id(),
                        kind: sub.kind(),
                        name: sub.display_name(),
                        step,
                        message,
                        attempts: sub.attempts(),
                        created_at_ms: sub.created_at_ms(),
                    });
                }
                // Done records are removed right after the transition; never shown.
                SubmissionStatus::Done => {}
                status => view.active.push(ActiveItem {
                    id: sub.id(),
                    kind: sub.kind(),
                    name: sub.display_name(),
                    status,
                    uploaded: sub.uploaded_urls().len(),
                    total_images: sub.images().len(),
                    created_at_ms: sub.created_at_ms(),
                }),
            }
        }
        view
    }

    pub fn has_active(&self) -> bool {
        !self.active.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty() && self.failed.is_empty()
    }
}
