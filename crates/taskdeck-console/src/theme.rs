use ratatui::style::{Color, Modifier, Style};
use taskdeck_client::Connectivity;
use taskdeck_core::{AgentName, EventType, NoticeKind, RunIndicator};

pub const HEADER_STYLE: Style = Style::new()
    .fg(Color::Rgb(191, 219, 254))
    .add_modifier(Modifier::BOLD);
pub const MUTED: Color = Color::Rgb(148, 163, 184);
pub const TEXT: Color = Color::Rgb(226, 232, 240);
pub const BORDER: Color = Color::Rgb(71, 85, 105);
pub const ACCENT: Color = Color::Rgb(56, 189, 248);
pub const OK: Color = Color::Rgb(34, 197, 94);
pub const WARN: Color = Color::Rgb(245, 158, 11);
pub const CRITICAL: Color = Color::Rgb(239, 68, 68);
pub const SELECTED_STYLE: Style = Style::new()
    .bg(Color::Rgb(51, 65, 85))
    .fg(Color::White)
    .add_modifier(Modifier::BOLD);

pub fn agent_color(agent: &AgentName) -> Color {
    match agent {
        AgentName::Planner => Color::Blue,
        AgentName::Coder => Color::Green,
        AgentName::Tester => Color::Yellow,
        AgentName::Deployer => Color::Magenta,
        AgentName::Orchestrator => Color::Cyan,
        AgentName::System | AgentName::Other(_) => Color::Gray,
    }
}

/// Content colour; plain info and output lines use the default text colour.
pub fn event_style(event_type: EventType) -> Style {
    match event_type {
        EventType::Error => Style::new().fg(Color::Red),
        EventType::Warning => Style::new().fg(Color::Yellow),
        EventType::Command => Style::new().fg(Color::LightCyan),
        EventType::Info | EventType::Output => Style::new().fg(TEXT),
    }
}

pub fn indicator_color(indicator: RunIndicator) -> Color {
    match indicator {
        RunIndicator::Idle => MUTED,
        RunIndicator::Dispatching | RunIndicator::Running => ACCENT,
        RunIndicator::Completed => OK,
        RunIndicator::Failed => CRITICAL,
    }
}

pub fn connectivity_color(connectivity: Connectivity) -> Color {
    match connectivity {
        Connectivity::Online => OK,
        Connectivity::Connecting | Connectivity::Reconnecting { .. } => WARN,
        Connectivity::Offline => MUTED,
        Connectivity::AuthFailed | Connectivity::GaveUp => CRITICAL,
    }
}

pub fn notice_color(kind: NoticeKind) -> Color {
    match kind {
        NoticeKind::Connected | NoticeKind::RunStarted => OK,
        NoticeKind::Reconnecting | NoticeKind::DispatchCancelled => WARN,
        NoticeKind::AuthFailed | NoticeKind::GaveUp | NoticeKind::DispatchFailed => CRITICAL,
        NoticeKind::Unattributed => MUTED,
    }
}

pub fn task_status_color(status: &str) -> Color {
    match status.trim().to_lowercase().as_str() {
        "completed" | "done" => OK,
        "running" | "in_progress" => ACCENT,
        "failed" | "error" => CRITICAL,
        "pending" => WARN,
        _ => MUTED,
    }
}

pub mod icons {
    pub const RUNNING: &str = ">";
    pub const DONE: &str = "x";
    pub const FAILED: &str = "!";
    pub const IDLE: &str = ".";
}
