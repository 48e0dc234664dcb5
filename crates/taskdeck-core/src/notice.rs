use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::fmt;

pub const DEFAULT_NOTICE_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Connected,
    Reconnecting,
    AuthFailed,
    GaveUp,
    RunStarted,
    DispatchFailed,
    DispatchCancelled,
    Unattributed,
}

impl NoticeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NoticeKind::Connected => "connected",
            NoticeKind::Reconnecting => "reconnecting",
            NoticeKind::AuthFailed => "auth-failed",
            NoticeKind::GaveUp => "gave-up",
            NoticeKind::RunStarted => "run-started",
            NoticeKind::DispatchFailed => "dispatch-failed",
            NoticeKind::DispatchCancelled => "dispatch-cancelled",
            NoticeKind::Unattributed => "unattributed",
        }
    }
}

impl fmt::Display for NoticeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub at: DateTime<Utc>,
    pub kind: NoticeKind,
    pub message: String,
}

/// Session-level log for everything that is not part of a run transcript.
#[derive(Debug, Clone)]
pub struct NoticeLog {
    entries: VecDeque<Notice>,
    capacity: usize,
    evicted: u64,
}

impl NoticeLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity: capacity.max(1),
            evicted: 0,
        }
    }

    pub fn push(&mut self, kind: NoticeKind, message: impl Into<String>) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
            self.evicted += 1;
        }
        self.entries.push_back(Notice {
            at: Utc::now(),
            kind,
            message: message.into(),
        });
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Notice> {
        self.entries.iter()
    }

    pub fn latest(&self) -> Option<&Notice> {
        self.entries.back()
    }

    pub fn count(&self, kind: NoticeKind) -> usize {
        self.entries.iter().filter(|notice| notice.kind == kind).count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn evicted(&self) -> u64 {
        self.evicted
    }
}

impl Default for NoticeLog {
    fn default() -> Self {
        Self::new(DEFAULT_NOTICE_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_oldest_when_full() {
        let mut log = NoticeLog::new(2);
        log.push(NoticeKind::Connected, "one");
        log.push(NoticeKind::Reconnecting, "two");
        log.push(NoticeKind::Connected, "three");
        assert_eq!(log.len(), 2);
        assert_eq!(log.evicted(), 1);
        assert_eq!(log.iter().next().map(|n| n.message.as_str()), Some("two"));
        assert_eq!(log.count(NoticeKind::Connected), 1);
        assert_eq!(log.latest().map(|n| n.kind), Some(NoticeKind::Connected));
    }
}
