use std::fmt;

use crate::event::LogEvent;
use crate::run::TaskRunStatus;
use crate::transcript::RunLog;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunIndicator {
    Idle,
    Dispatching,
    Running,
    Completed,
    Failed,
}

impl RunIndicator {
    pub fn from_log(log: &RunLog) -> Self {
        if log.pending_ticket().is_some() {
            return RunIndicator::Dispatching;
        }
        match log.status() {
            None => RunIndicator::Idle,
            Some(TaskRunStatus::Dispatched) | Some(TaskRunStatus::Running) => RunIndicator::Running,
            Some(TaskRunStatus::Completed) => RunIndicator::Completed,
            Some(TaskRunStatus::Failed) => RunIndicator::Failed,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, RunIndicator::Dispatching | RunIndicator::Running)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunIndicator::Completed | RunIndicator::Failed)
    }

    pub fn label(&self) -> &'static str {
        match self {
            RunIndicator::Idle => "idle",
            RunIndicator::Dispatching => "starting",
            RunIndicator::Running => "running",
            RunIndicator::Completed => "completed",
            RunIndicator::Failed => "failed",
        }
    }
}

impl fmt::Display for RunIndicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum TranscriptDelta<'a> {
    Append(&'a [LogEvent]),
    Restart(&'a [LogEvent]),
}

impl<'a> TranscriptDelta<'a> {
    pub fn events(&self) -> &'a [LogEvent] {
        match self {
            TranscriptDelta::Append(events) | TranscriptDelta::Restart(events) => events,
        }
    }
}

/// Read position into a `RunLog` transcript. A new run restarts the sequence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranscriptCursor {
    generation: u64,
    position: usize,
}

impl TranscriptCursor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn poll<'a>(&mut self, log: &'a RunLog) -> TranscriptDelta<'a> {
        let transcript = log.transcript();
        if log.generation() != self.generation || self.position > transcript.len() {
            self.generation = log.generation();
            self.position = transcript.len();
            return TranscriptDelta::Restart(transcript);
        }
        let fresh = &transcript[self.position..];
        self.position = transcript.len();
        TranscriptDelta::Append(fresh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run::{RunId, RunMode};
    use crate::transcript::DispatchIntent;
    use crate::wire::ChannelMessage;

    fn start(log: &mut RunLog, id: u64) {
        let ticket = log
            .begin_dispatch(DispatchIntent::new("task", "llama3", RunMode::Full))
            .unwrap();
        log.resolve_dispatch(ticket, Ok(RunId::from(id)));
    }

    #[test]
    fn indicator_tracks_run_lifecycle() {
        let mut log = RunLog::default();
        assert_eq!(RunIndicator::from_log(&log), RunIndicator::Idle);
        let ticket = log
            .begin_dispatch(DispatchIntent::new("task", "llama3", RunMode::Full))
            .unwrap();
        assert_eq!(RunIndicator::from_log(&log), RunIndicator::Dispatching);
        log.resolve_dispatch(ticket, Ok(RunId::from(1)));
        assert!(RunIndicator::from_log(&log).is_active());
        log.apply(ChannelMessage::event("orchestrator", "error", "Execution failed: boom"));
        assert_eq!(RunIndicator::from_log(&log), RunIndicator::Failed);
        assert!(RunIndicator::Failed.is_terminal());
    }

    #[test]
    fn cursor_appends_then_restarts_per_run() {
        let mut log = RunLog::default();
        let mut cursor = TranscriptCursor::new();
        start(&mut log, 1);
        assert_eq!(cursor.poll(&log).events().len(), 0);

        log.apply(ChannelMessage::event("planner", "info", "a"));
        log.apply(ChannelMessage::event("coder", "info", "b"));
        assert!(matches!(cursor.poll(&log), TranscriptDelta::Append(events) if events.len() == 2));
        assert!(matches!(cursor.poll(&log), TranscriptDelta::Append(events) if events.is_empty()));

        log.apply(ChannelMessage::event("orchestrator", "info", "Task #1 completed"));
        start(&mut log, 2);
        log.apply(ChannelMessage::event("planner", "info", "c"));
        match cursor.poll(&log) {
            TranscriptDelta::Restart(events) => {
                assert_eq!(events.len(), 1);
                assert_eq!(events[0].content, "c");
            }
            other => panic!("expected restart, got {other:?}"),
        }
    }
}
