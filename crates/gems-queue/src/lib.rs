//! Observable in-memory collection of in-flight and failed submissions.
//!
//! Every mutation publishes a fresh immutable snapshot on a watch channel and
//! one [`QueueEvent`] on a broadcast feed, in mutation order.

use std::sync::Arc;

use gems_core::{Patch, QueueView, Submission, SubmissionId, SubmissionStatus, TransitionError};
use thiserror::Error;
use tokio::sync::{broadcast, watch};
use tracing::debug;

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("submission {0} is already queued")]
    Duplicate(SubmissionId),
    #[error("submission {0} not found")]
    NotFound(SubmissionId),
    #[error(transparent)]
    Transition(#[from] TransitionError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueueEvent {
    Added { id: SubmissionId, status: SubmissionStatus },
    Updated { id: SubmissionId, status: SubmissionStatus },
    Removed { id: SubmissionId, status: SubmissionStatus },
}

impl QueueEvent {
    pub fn id(&self) -> SubmissionId {
        match self {
            QueueEvent::Added { id, .. } | QueueEvent::Updated { id, .. } | QueueEvent::Removed { id, .. } => *id,
        }
    }

    pub fn status(&self) -> SubmissionStatus {
        match self {
            QueueEvent::Added { status, .. }
            | QueueEvent::Updated { status, .. }
            | QueueEvent::Removed { status, .. } => *status,
        }
    }
}

/// Immutable view of the queue at one point in time.
#[derive(Clone, Debug, Default)]
pub struct QueueSnapshot {
    version: u64,
    items: Vec<Submission>,
}

impl QueueSnapshot {
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn get(&self, id: SubmissionId) -> Option<&Submission> {
        self.items.iter().find(|s| s.id() == id)
    }

    /// Submissions ordered by creation time, then id.
    pub fn iter(&self) -> impl Iterator<Item = &Submission> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn failed_ids(&self) -> Vec<SubmissionId> {
        self.items
            .iter()
            .filter(|s| s.status() == SubmissionStatus::Failed)
            .map(|s| s.id())
            .collect()
    }

    pub fn view(&self) -> QueueView {
        QueueView::project(&self.items)
    }

    fn next(&self, items: Vec<Submission>) -> Arc<QueueSnapshot> {
        Arc::new(QueueSnapshot {
            version: self.version + 1,
            items,
        })
    }
}

struct Inner {
    state: watch::Sender<Arc<QueueSnapshot>>,
    events: broadcast::Sender<QueueEvent>,
}

/// Shared handle to the queue. Cloning is cheap; all clones see one queue.
#[derive(Clone)]
pub struct SubmissionQueue {
    inner: Arc<Inner>,
}

impl Default for SubmissionQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl SubmissionQueue {
    pub fn new() -> Self {
        let (state, _) = watch::channel(Arc::new(QueueSnapshot::default()));
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner { state, events }),
        }
    }

    pub fn add(&self, submission: Submission) -> Result<SubmissionId, QueueError> {
        let id = submission.id();
        let status = submission.status();
        let mut result = Ok(id);
        self.inner.state.send_if_modified(|snap| {
            if snap.get(id).is_some() {
                result = Err(QueueError::Duplicate(id));
                return false;
            }
            let mut items = snap.items.clone();
            items.push(submission);
            items.sort_by_key(|s| (s.created_at_ms(), s.id()));
            *snap = snap.next(items);
            self.emit(QueueEvent::Added { id, status });
            true
        });
        if result.is_ok() {
            debug!(submission_id = %id, ?status, "queued");
        }
        result
    }

    /// Applies `patch` to one submission and returns its new state. A rejected
    /// patch leaves the record untouched.
    pub fn update(&self, id: SubmissionId, patch: Patch) -> Result<Submission, QueueError> {
        let mut result = Err(QueueError::NotFound(id));
        self.inner.state.send_if_modified(|snap| {
            let Some(pos) = snap.items.iter().position(|s| s.id() == id) else {
                return false;
            };
            let mut updated = snap.items[pos].clone();
            if let Err(err) = updated.apply(patch) {
                result = Err(err.into());
                return false;
            }
            let mut items = snap.items.clone();
            items[pos] = updated.clone();
            *snap = snap.next(items);
            self.emit(QueueEvent::Updated {
                id,
                status: updated.status(),
            });
            result = Ok(updated);
            true
        });
        if let Ok(sub) = &result {
            debug!(submission_id = %id, status = ?sub.status(), uploaded = sub.uploaded_urls().len(), "updated");
        }
        result
    }

    pub fn remove(&self, id: SubmissionId) -> Option<Submission> {
        self.remove_if(id, |_| true)
    }

    /// Removes the record only if `pred` holds for its current state, checked
    /// under the same lock as the removal.
    pub fn remove_if(&self, id: SubmissionId, pred: impl FnOnce(&Submission) -> bool) -> Option<Submission> {
        let mut removed = None;
        self.inner.state.send_if_modified(|snap| {
            let Some(pos) = snap.items.iter().position(|s| s.id() == id) else {
                return false;
            };
            if !pred(&snap.items[pos]) {
                return false;
            }
            let mut items = snap.items.clone();
            let gone = items.remove(pos);
            *snap = snap.next(items);
            self.emit(QueueEvent::Removed {
                id,
                status: gone.status(),
            });
            removed = Some(gone);
            true
        });
        if let Some(sub) = &removed {
            debug!(submission_id = %id, status = ?sub.status(), "removed");
        }
        removed
    }

    pub fn get(&self, id: SubmissionId) -> Option<Submission> {
        self.inner.state.borrow().get(id).cloned()
    }

    pub fn snapshot(&self) -> Arc<QueueSnapshot> {
        self.inner.state.borrow().clone()
    }

    pub fn view(&self) -> QueueView {
        self.inner.state.borrow().view()
    }

    /// Latest snapshot, re-published after every mutation.
    pub fn subscribe(&self) -> watch::Receiver<Arc<QueueSnapshot>> {
        self.inner.state.subscribe()
    }

    /// Change feed. Receivers that fall behind get `Lagged` and should
    /// resync from [`SubmissionQueue::snapshot`].
    pub fn events(&self) -> broadcast::Receiver<QueueEvent> {
        self.inner.events.subscribe()
    }

    fn emit(&self, event: QueueEvent) {
        // No receivers is fine.
        let _ = self.inner.events.send(event);
    }
}
