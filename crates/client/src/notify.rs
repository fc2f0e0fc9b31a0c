//! User-facing notifications.
//!
//! The client reports progress through a [`Notifier`] and never waits on
//! or inspects the outcome; a sink that drops everything is valid.

use std::collections::VecDeque;
use std::sync::Mutex;

use tracing::{error, info, warn};

/// Severity of a notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Error,
    Warning,
    Info,
}

/// A user-facing notice.
#[derive(Debug, Clone)]
pub struct Notice {
    pub id: u64,
    pub level: NoticeLevel,
    pub title: String,
    pub detail: Option<String>,
}

/// Fire-and-forget sink for user-facing notices.
pub trait Notifier: Send + Sync {
    fn notify(&self, level: NoticeLevel, title: &str, detail: Option<&str>);
}

/// Default [`Notifier`]: forwards notices to the log.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, level: NoticeLevel, title: &str, detail: Option<&str>) {
        let detail = detail.unwrap_or("");
        match level {
            NoticeLevel::Success | NoticeLevel::Info => info!(%title, %detail, "notice"),
            NoticeLevel::Warning => warn!(%title, %detail, "notice"),
            NoticeLevel::Error => error!(%title, %detail, "notice"),
        }
    }
}

/// In-memory notice queue with monotonic id assignment, for embedding in
/// a UI. Dismissal timing is the embedder's concern; this just holds the
/// queue.
#[derive(Debug, Default)]
pub struct NoticeQueue {
    inner: Mutex<QueueInner>,
}

#[derive(Debug, Default)]
struct QueueInner {
    notices: VecDeque<Notice>,
    next_id: u64,
}

impl NoticeQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a notice and returns its id.
    pub fn push(&self, level: NoticeLevel, title: impl Into<String>, detail: Option<String>) -> u64 {
        let mut inner = self.inner.lock().expect("notice lock poisoned");
        let id = inner.next_id;
        inner.next_id += 1;
        inner.notices.push_back(Notice {
            id,
            level,
            title: title.into(),
            detail,
        });
        id
    }

    /// Removes a notice by id. Returns `true` if it was present.
    pub fn dismiss(&self, id: u64) -> bool {
        let mut inner = self.inner.lock().expect("notice lock poisoned");
        let before = inner.notices.len();
        inner.notices.retain(|n| n.id != id);
        inner.notices.len() != before
    }

    /// Snapshot of the queue, oldest first.
    pub fn notices(&self) -> Vec<Notice> {
        self.inner
            .lock()
            .expect("notice lock poisoned")
            .notices
            .iter()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("notice lock poisoned").notices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.inner
            .lock()
            .expect("notice lock poisoned")
            .notices
            .clear();
    }
}

impl Notifier for NoticeQueue {
    fn notify(&self, level: NoticeLevel, title: &str, detail: Option<&str>) {
        self.push(level, title, detail.map(Into::into));
    }
}
