use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::block::{Position, Title};
use ratatui::widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap};
use ratatui::Frame;
use taskdeck_client::Console;
use taskdeck_core::{LogEvent, RunIndicator};

use crate::app::{App, View};
use crate::theme::{self, icons};

pub fn render_ui(frame: &mut Frame, app: &App, console: &Console) {
    let size = frame.size();
    let banner = console.banner();
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(if banner.is_some() { 3 } else { 0 }),
            Constraint::Min(0),
            Constraint::Length(3),
        ])
        .split(size);

    frame.render_widget(render_header(app, console), layout[0]);
    if let Some(text) = banner {
        frame.render_widget(render_banner(text), layout[1]);
    }
    match app.view {
        View::Live => render_live(frame, app, console, layout[2]),
        View::History => render_history(frame, app, layout[2]),
    }
    frame.render_widget(render_input(app, console), layout[3]);
    if app.help_open {
        render_help_overlay(frame);
    }
}

fn panel(title: &str) -> Block<'_> {
    Block::default()
        .borders(Borders::ALL)
        .border_style(Style::new().fg(theme::BORDER))
        .title(Span::styled(title, theme::HEADER_STYLE))
}

fn render_header<'a>(app: &'a App, console: &Console) -> Paragraph<'a> {
    let indicator = console.indicator();
    let connectivity = console.connectivity();
    let mut run = vec![
        Span::styled(
            format!("{} {}", indicator_icon(indicator), indicator.label()),
            Style::new()
                .fg(theme::indicator_color(indicator))
                .add_modifier(Modifier::BOLD),
        ),
    ];
    if let Some(task) = console.log().run() {
        run.push(Span::styled(
            format!("  Task #{} ({}, {})", task.id, task.model, task.mode.label()),
            Style::new().fg(theme::TEXT),
        ));
    } else if let Some(intent) = console.log().pending_intent() {
        run.push(Span::styled(
            format!("  {}", ellipsize(intent.description.trim(), 48)),
            Style::new().fg(theme::MUTED),
        ));
    }

    let status = Line::from(vec![
        Span::styled("taskdeck", theme::HEADER_STYLE),
        Span::styled(format!("  {}  ", app.user_label), Style::new().fg(theme::MUTED)),
        Span::styled(
            format!("Channel: {}", connectivity.label()),
            Style::new().fg(theme::connectivity_color(connectivity)),
        ),
    ]);
    let note = app
        .status_note
        .as_deref()
        .map(|note| Line::from(Span::styled(note.to_string(), Style::new().fg(theme::WARN))))
        .unwrap_or_else(|| Line::from(run));
    Paragraph::new(Text::from(vec![status, note])).block(
        Block::default()
            .borders(Borders::BOTTOM)
            .border_style(Style::new().fg(theme::BORDER)),
    )
}

fn indicator_icon(indicator: RunIndicator) -> &'static str {
    match indicator {
        RunIndicator::Idle => icons::IDLE,
        RunIndicator::Dispatching | RunIndicator::Running => icons::RUNNING,
        RunIndicator::Completed => icons::DONE,
        RunIndicator::Failed => icons::FAILED,
    }
}

fn render_banner(text: &str) -> Paragraph<'_> {
    Paragraph::new(Line::from(Span::styled(
        text,
        Style::new()
            .fg(theme::CRITICAL)
            .add_modifier(Modifier::BOLD),
    )))
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::new().fg(theme::CRITICAL)),
    )
}

fn render_live(frame: &mut Frame, app: &App, console: &Console, area: Rect) {
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(70), Constraint::Percentage(30)])
        .split(area);

    let height = columns[0].height.saturating_sub(2) as usize;
    let width = columns[0].width.saturating_sub(2) as usize;
    let end = app.lines.len().saturating_sub(app.scroll);
    let start = end.saturating_sub(height);
    let lines: Vec<Line> = app.lines[start..end]
        .iter()
        .map(|event| transcript_line(event, width))
        .collect();
    let title = if app.scroll > 0 {
        format!("Transcript (+{} below)", app.scroll)
    } else {
        "Transcript".to_string()
    };
    frame.render_widget(Paragraph::new(lines).block(panel(&title)), columns[0]);

    let notices: Vec<ListItem> = console
        .log()
        .notices()
        .iter()
        .rev()
        .take(columns[1].height.saturating_sub(2) as usize)
        .map(|notice| {
            ListItem::new(Line::from(vec![
                Span::styled(
                    notice.at.format("%H:%M:%S ").to_string(),
                    Style::new().fg(theme::MUTED),
                ),
                Span::styled(
                    notice.message.clone(),
                    Style::new().fg(theme::notice_color(notice.kind)),
                ),
            ]))
        })
        .collect();
    frame.render_widget(List::new(notices).block(panel("Notices")), columns[1]);
}

pub fn transcript_line(event: &LogEvent, width: usize) -> Line<'static> {
    let time = event
        .timestamp
        .as_deref()
        .map(short_time)
        .unwrap_or_default();
    let prefix = format!("{time}[{}] ", event.agent);
    let room = width.saturating_sub(prefix.chars().count()).max(8);
    Line::from(vec![
        Span::styled(time, Style::new().fg(theme::MUTED)),
        Span::styled(
            format!("[{}] ", event.agent),
            Style::new()
                .fg(theme::agent_color(&event.agent))
                .add_modifier(Modifier::BOLD),
        ),
        Span::styled(
            ellipsize(&event.content.replace('\n', " "), room),
            theme::event_style(event.event_type),
        ),
    ])
}

/// `2026-01-01T10:00:00.123` -> `10:00:00 `
fn short_time(timestamp: &str) -> String {
    let time = timestamp
        .split(['T', ' '])
        .nth(1)
        .unwrap_or(timestamp);
    let time: String = time.chars().take(8).collect();
    if time.is_empty() {
        String::new()
    } else {
        format!("{time} ")
    }
}

fn render_history(frame: &mut Frame, app: &App, area: Rect) {
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
        .split(area);

    let items: Vec<ListItem> = app
        .history
        .tasks
        .iter()
        .map(|task| {
            let title = if task.title.trim().is_empty() {
                task.description.clone().unwrap_or_default()
            } else {
                task.title.clone()
            };
            ListItem::new(Line::from(vec![
                Span::styled(format!("#{:<5}", task.id), Style::new().fg(theme::MUTED)),
                Span::styled(
                    format!("{:<10}", task.status),
                    Style::new().fg(theme::task_status_color(&task.status)),
                ),
                Span::styled(ellipsize(&title, 40), Style::new().fg(theme::TEXT)),
            ]))
        })
        .collect();
    let title = if app.history.loading {
        "Tasks (loading)"
    } else {
        "Tasks"
    };
    let mut state = ListState::default();
    if !app.history.tasks.is_empty() {
        state.select(Some(app.history.selected));
    }
    frame.render_stateful_widget(
        List::new(items)
            .block(panel(title))
            .highlight_style(theme::SELECTED_STYLE),
        columns[0],
        &mut state,
    );

    let width = columns[1].width.saturating_sub(2) as usize;
    let mut lines: Vec<Line> = Vec::new();
    if let Some(error) = app.history.error.as_deref() {
        lines.push(Line::from(Span::styled(
            error.to_string(),
            Style::new().fg(theme::CRITICAL),
        )));
    }
    lines.extend(app.history.logs.iter().map(|event| transcript_line(event, width)));
    let title = match &app.history.logs_for {
        Some(id) => format!("Logs for task #{id}"),
        None => "Logs (Enter to load)".to_string(),
    };
    frame.render_widget(
        Paragraph::new(lines)
            .block(panel(&title))
            .wrap(Wrap { trim: false }),
        columns[1],
    );
}

fn render_input<'a>(app: &'a App, console: &Console) -> Paragraph<'a> {
    let busy = console.log().is_busy();
    let title = format!(
        " Model: {}  Mode: {} ",
        app.model(),
        app.mode.label()
    );
    let prompt_style = if busy {
        Style::new().fg(theme::MUTED)
    } else {
        Style::new().fg(theme::ACCENT)
    };
    Paragraph::new(Line::from(vec![
        Span::styled("> ", prompt_style),
        Span::styled(app.input.as_str(), Style::new().fg(theme::TEXT)),
    ]))
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::new().fg(theme::BORDER))
            .title(Span::styled(title, theme::HEADER_STYLE))
            .title(
                Title::from(Span::styled(
                    " Enter run  Tab model  Shift+Tab mode  Esc cancel  F2 history  F1 help ",
                    Style::new().fg(theme::MUTED),
                ))
                .position(Position::Bottom),
            ),
    )
}

fn render_help_overlay(frame: &mut Frame) {
    let area = centered(frame.size(), 60, 14);
    let rows = [
        ("Enter", "dispatch the typed task"),
        ("Tab", "next model"),
        ("Shift+Tab", "next mode (full, plan+code, plan+test)"),
        ("Esc", "cancel a pending dispatch / dismiss banner"),
        ("PgUp/PgDn/End", "scroll transcript"),
        ("F2", "task history (Enter loads logs, r refreshes)"),
        ("Ctrl+L", "log in again"),
        ("Ctrl+U", "clear input"),
        ("Ctrl+C", "quit"),
    ];
    let lines: Vec<Line> = rows
        .iter()
        .map(|(key, what)| {
            Line::from(vec![
                Span::styled(format!("{key:<14}"), Style::new().fg(theme::ACCENT)),
                Span::styled(*what, Style::new().fg(theme::TEXT)),
            ])
        })
        .collect();
    frame.render_widget(Clear, area);
    frame.render_widget(Paragraph::new(lines).block(panel("Help")), area);
}

fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    }
}

fn ellipsize(input: &str, max: usize) -> String {
    if input.chars().count() <= max {
        return input.to_string();
    }
    if max <= 3 {
        return "...".chars().take(max).collect();
    }
    let prefix: String = input.chars().take(max - 3).collect();
    format!("{prefix}...")
}
