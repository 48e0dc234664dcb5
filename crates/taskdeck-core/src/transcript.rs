use chrono::{DateTime, Utc};

use crate::error::DispatchError;
use crate::event::{AgentName, LogEvent};
use crate::notice::{NoticeKind, NoticeLog, DEFAULT_NOTICE_CAPACITY};
use crate::run::{RunId, RunMode, TaskRun, TaskRunStatus};
use crate::wire::{ChannelMessage, DispatchRequest, Sentinel};

const COMPLETED_MARKER: &str = "completed";
const FAILED_MARKER: &str = "failed";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DispatchTicket(u64);

impl DispatchTicket {
    pub fn value(&self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchIntent {
    pub description: String,
    pub model: String,
    pub mode: RunMode,
}

impl DispatchIntent {
    pub fn new(description: impl Into<String>, model: impl Into<String>, mode: RunMode) -> Self {
        Self {
            description: description.into(),
            model: model.into(),
            mode,
        }
    }

    pub fn to_request(&self) -> DispatchRequest {
        DispatchRequest {
            task: self.description.trim().to_string(),
            model: self.model.clone(),
            mode: self.mode,
        }
    }
}

#[derive(Debug, Clone)]
struct PendingDispatch {
    ticket: DispatchTicket,
    intent: DispatchIntent,
    buffered: Vec<LogEvent>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionBook {
    pub connected_count: u64,
    pub pong_count: u64,
    pub last_connected_at: Option<DateTime<Utc>>,
    pub last_pong_at: Option<DateTime<Utc>>,
}

/// What a single `apply` did with the incoming message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Applied {
    Sentinel(Sentinel),
    Appended {
        arrival_order: u64,
        transition: Option<(TaskRunStatus, TaskRunStatus)>,
    },
    Buffered,
    Unattributed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchResolution {
    Started(RunId),
    Failed(DispatchError),
    Stale,
}

/// Event reducer: folds channel messages into the active run's transcript and
/// lifecycle state.
///
/// All mutation goes through `apply`, `begin_dispatch`, `resolve_dispatch` and
/// `cancel_dispatch`; readers get shared slices only.
#[derive(Debug, Clone)]
pub struct RunLog {
    run: Option<TaskRun>,
    transcript: Vec<LogEvent>,
    generation: u64,
    pending: Option<PendingDispatch>,
    notices: NoticeLog,
    connection: ConnectionBook,
    next_arrival: u64,
    next_ticket: u64,
}

impl Default for RunLog {
    fn default() -> Self {
        Self::new(DEFAULT_NOTICE_CAPACITY)
    }
}

impl RunLog {
    pub fn new(notice_capacity: usize) -> Self {
        Self {
            run: None,
            transcript: Vec::new(),
            generation: 0,
            pending: None,
            notices: NoticeLog::new(notice_capacity),
            connection: ConnectionBook::default(),
            next_arrival: 0,
            next_ticket: 0,
        }
    }

    pub fn run(&self) -> Option<&TaskRun> {
        self.run.as_ref()
    }

    pub fn status(&self) -> Option<TaskRunStatus> {
        self.run.as_ref().map(|run| run.status)
    }

    pub fn transcript(&self) -> &[LogEvent] {
        &self.transcript
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn notices(&self) -> &NoticeLog {
        &self.notices
    }

    pub fn connection(&self) -> &ConnectionBook {
        &self.connection
    }

    pub fn pending_ticket(&self) -> Option<DispatchTicket> {
        self.pending.as_ref().map(|pending| pending.ticket)
    }

    pub fn pending_intent(&self) -> Option<&DispatchIntent> {
        self.pending.as_ref().map(|pending| &pending.intent)
    }

    /// True while a dispatch is in flight or the active run is non-terminal.
    pub fn is_busy(&self) -> bool {
        self.pending.is_some()
            || self
                .run
                .as_ref()
                .map(|run| !run.is_terminal())
                .unwrap_or(false)
    }

    pub fn record(&mut self, kind: NoticeKind, message: impl Into<String>) {
        self.notices.push(kind, message);
    }

    /// Takes the single-flight lock for a new dispatch. Never touches the
    /// transcript or the current run.
    pub fn begin_dispatch(&mut self, intent: DispatchIntent) -> Result<DispatchTicket, DispatchError> {
        if intent.description.trim().is_empty() {
            return Err(DispatchError::EmptyDescription);
        }
        if self.is_busy() {
            return Err(DispatchError::AlreadyRunning);
        }
        self.next_ticket += 1;
        let ticket = DispatchTicket(self.next_ticket);
        self.pending = Some(PendingDispatch {
            ticket,
            intent,
            buffered: Vec::new(),
        });
        Ok(ticket)
    }

    pub fn resolve_dispatch(
        &mut self,
        ticket: DispatchTicket,
        result: Result<RunId, DispatchError>,
    ) -> DispatchResolution {
        let pending = match self.pending.take() {
            Some(pending) if pending.ticket == ticket => pending,
            other => {
                self.pending = other;
                return DispatchResolution::Stale;
            }
        };

        match result {
            Ok(run_id) => {
                self.transcript.clear();
                self.generation += 1;
                self.run = Some(TaskRun {
                    id: run_id.clone(),
                    status: TaskRunStatus::Dispatched,
                    description: pending.intent.description.trim().to_string(),
                    model: pending.intent.model,
                    mode: pending.intent.mode,
                    started_at: Utc::now(),
                    finished_at: None,
                });
                self.notices
                    .push(NoticeKind::RunStarted, format!("Task #{run_id} started"));
                for event in pending.buffered {
                    self.attribute(event);
                }
                DispatchResolution::Started(run_id)
            }
            Err(err) => {
                self.notices
                    .push(NoticeKind::DispatchFailed, format!("Failed to start task: {err}"));
                self.orphan_all(pending.buffered);
                DispatchResolution::Failed(err)
            }
        }
    }

    /// Releases the single-flight lock; a later `resolve_dispatch` with this
    /// ticket is ignored.
    pub fn cancel_dispatch(&mut self, ticket: DispatchTicket) -> bool {
        match self.pending.take() {
            Some(pending) if pending.ticket == ticket => {
                self.notices.push(
                    NoticeKind::DispatchCancelled,
                    format!("Dispatch cancelled: {}", pending.intent.description.trim()),
                );
                self.orphan_all(pending.buffered);
                true
            }
            other => {
                self.pending = other;
                false
            }
        }
    }

    pub fn apply(&mut self, message: ChannelMessage) -> Applied {
        if let Some(sentinel) = message.sentinel() {
            let now = Utc::now();
            match sentinel {
                Sentinel::Connected => {
                    self.connection.connected_count += 1;
                    self.connection.last_connected_at = Some(now);
                    let text = message
                        .message
                        .unwrap_or_else(|| "channel connected".to_string());
                    self.notices.push(NoticeKind::Connected, text);
                }
                Sentinel::Pong => {
                    self.connection.pong_count += 1;
                    self.connection.last_pong_at = Some(now);
                }
            }
            return Applied::Sentinel(sentinel);
        }

        let event = LogEvent::from_message(message, self.next_arrival);
        self.next_arrival += 1;

        if let Some(pending) = self.pending.as_mut() {
            pending.buffered.push(event);
            return Applied::Buffered;
        }
        self.attribute(event)
    }

    fn attribute(&mut self, event: LogEvent) -> Applied {
        let Some(run) = self.run.as_mut() else {
            self.notices.push(NoticeKind::Unattributed, event.summary());
            return Applied::Unattributed;
        };
        if let Some(run_id) = event.run_id.as_ref() {
            if run_id != &run.id {
                self.notices.push(
                    NoticeKind::Unattributed,
                    format!("task #{run_id}: {}", event.summary()),
                );
                return Applied::Unattributed;
            }
        }

        let before = run.status;
        if before == TaskRunStatus::Dispatched {
            run.status = TaskRunStatus::Running;
        }
        if !run.status.is_terminal() {
            if let Some(terminal) =
                detect_terminal(&event.agent, &event.content, event.status.as_deref())
            {
                run.status = terminal;
                run.finished_at = Some(Utc::now());
            }
        }
        let after = run.status;
        let arrival_order = event.arrival_order;
        self.transcript.push(event);

        Applied::Appended {
            arrival_order,
            transition: (before != after).then_some((before, after)),
        }
    }

    fn orphan_all(&mut self, events: Vec<LogEvent>) {
        for event in events {
            self.notices.push(NoticeKind::Unattributed, event.summary());
        }
    }
}

/// Decides whether an event ends the run.
///
/// A structured `status` field wins when present. Without it, orchestrator
/// content is matched on the literal, case-sensitive markers; `failed` is
/// checked first so a failure message that quotes "completed" is not read as
/// success.
pub fn detect_terminal(
    agent: &AgentName,
    content: &str,
    status: Option<&str>,
) -> Option<TaskRunStatus> {
    if agent != &AgentName::Orchestrator {
        return None;
    }
    if let Some(status) = status {
        return match status.trim() {
            COMPLETED_MARKER => Some(TaskRunStatus::Completed),
            FAILED_MARKER => Some(TaskRunStatus::Failed),
            _ => None,
        };
    }
    if content.contains(FAILED_MARKER) {
        Some(TaskRunStatus::Failed)
    } else if content.contains(COMPLETED_MARKER) {
        Some(TaskRunStatus::Completed)
    } else {
        None
    }
}
