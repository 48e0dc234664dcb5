use crate::run::RunId;
use crate::wire::ChannelMessage;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AgentName {
    Planner,
    Coder,
    Tester,
    Deployer,
    Orchestrator,
    System,
    Other(String),
}

impl AgentName {
    pub fn from_wire(raw: &str) -> Self {
        match raw.trim() {
            "planner" => AgentName::Planner,
            "coder" => AgentName::Coder,
            "tester" => AgentName::Tester,
            "deployer" => AgentName::Deployer,
            "orchestrator" => AgentName::Orchestrator,
            "system" | "" => AgentName::System,
            other => AgentName::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            AgentName::Planner => "planner",
            AgentName::Coder => "coder",
            AgentName::Tester => "tester",
            AgentName::Deployer => "deployer",
            AgentName::Orchestrator => "orchestrator",
            AgentName::System => "system",
            AgentName::Other(name) => name,
        }
    }
}

impl fmt::Display for AgentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    Info,
    Command,
    Warning,
    Error,
    Output,
}

impl EventType {
    /// Unknown types fall back to `Info` so a new backend type never drops a line.
    pub fn from_wire(raw: Option<&str>) -> Self {
        match raw.map(|value| value.trim().to_lowercase()).as_deref() {
            Some("command") => EventType::Command,
            Some("warning") | Some("warn") => EventType::Warning,
            Some("error") => EventType::Error,
            Some("output") => EventType::Output,
            _ => EventType::Info,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Info => "info",
            EventType::Command => "command",
            EventType::Warning => "warning",
            EventType::Error => "error",
            EventType::Output => "output",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEvent {
    pub agent: AgentName,
    pub event_type: EventType,
    pub content: String,
    pub timestamp: Option<String>,
    pub run_id: Option<RunId>,
    pub status: Option<String>,
    pub arrival_order: u64,
}

impl LogEvent {
    pub fn from_message(message: ChannelMessage, arrival_order: u64) -> Self {
        let agent = message
            .agent
            .as_deref()
            .map(AgentName::from_wire)
            .unwrap_or(AgentName::System);
        let content = message.content.or(message.message).unwrap_or_default();
        Self {
            agent,
            event_type: EventType::from_wire(message.kind.as_deref()),
            content,
            timestamp: message.timestamp,
            run_id: message.task_id,
            status: message.status,
            arrival_order,
        }
    }

    pub fn summary(&self) -> String {
        format!("[{}] {}", self.agent, self.content)
    }
}
