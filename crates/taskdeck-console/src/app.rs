use std::io;

use crossterm::event::{Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use taskdeck_client::{ApiError, ModelInfo, TaskLogRecord, TaskRecord};
use taskdeck_core::{LogEvent, RunId, RunLog, RunMode, TranscriptCursor, TranscriptDelta};

const SCROLL_STEP: usize = 5;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum View {
    Live,
    History,
}

/// What the event loop must do after a key press.
#[derive(Debug, PartialEq, Eq)]
pub enum Action {
    None,
    Quit,
    Submit {
        description: String,
        model: String,
        mode: RunMode,
    },
    Escape,
    Relogin,
    LoadHistory,
    LoadTaskLogs(RunId),
}

/// One item from the terminal event stream, as the loop sees it.
#[derive(Debug, PartialEq, Eq)]
pub enum TerminalInput {
    Key(KeyEvent),
    Ignore,
    /// The stream ended; stdin is gone.
    Closed,
}

impl TerminalInput {
    pub fn from_stream(item: Option<io::Result<Event>>) -> Self {
        match item {
            Some(Ok(Event::Key(key))) if key.kind == KeyEventKind::Press => TerminalInput::Key(key),
            Some(_) => TerminalInput::Ignore,
            None => TerminalInput::Closed,
        }
    }
}

#[derive(Debug)]
pub enum HistoryUpdate {
    Tasks(Result<Vec<TaskRecord>, ApiError>),
    Logs {
        id: RunId,
        result: Result<Vec<TaskLogRecord>, ApiError>,
    },
}

#[derive(Debug, Default)]
pub struct HistoryPanel {
    pub tasks: Vec<TaskRecord>,
    pub selected: usize,
    pub logs_for: Option<RunId>,
    pub logs: Vec<LogEvent>,
    pub loading: bool,
    pub error: Option<String>,
}

impl HistoryPanel {
    pub fn selected_task(&self) -> Option<&TaskRecord> {
        self.tasks.get(self.selected)
    }
}

pub struct App {
    pub view: View,
    pub input: String,
    pub models: Vec<String>,
    pub model_index: usize,
    pub mode: RunMode,
    pub lines: Vec<LogEvent>,
    /// Lines scrolled up from the live tail.
    pub scroll: usize,
    pub history: HistoryPanel,
    pub status_note: Option<String>,
    pub user_label: String,
    pub help_open: bool,
    cursor: TranscriptCursor,
}

impl App {
    pub fn new(models: Vec<String>, default_model: &str, mode: RunMode, user_label: String) -> Self {
        let mut models = models;
        if !models.iter().any(|model| model == default_model) {
            models.insert(0, default_model.to_string());
        }
        let model_index = models
            .iter()
            .position(|model| model == default_model)
            .unwrap_or(0);
        Self {
            view: View::Live,
            input: String::new(),
            models,
            model_index,
            mode,
            lines: Vec::new(),
            scroll: 0,
            history: HistoryPanel::default(),
            status_note: None,
            user_label,
            help_open: false,
            cursor: TranscriptCursor::new(),
        }
    }

    pub fn model_names(models: &[ModelInfo]) -> Vec<String> {
        models
            .iter()
            .map(|model| model.name.trim().to_string())
            .filter(|name| !name.is_empty())
            .collect()
    }

    pub fn model(&self) -> &str {
        self.models
            .get(self.model_index)
            .map(String::as_str)
            .unwrap_or_default()
    }

    /// Pulls transcript entries appended since the last frame.
    pub fn sync(&mut self, log: &RunLog) {
        match self.cursor.poll(log) {
            TranscriptDelta::Append(events) => self.lines.extend_from_slice(events),
            TranscriptDelta::Restart(events) => {
                self.lines = events.to_vec();
                self.scroll = 0;
            }
        }
    }

    pub fn on_submitted(&mut self) {
        self.input.clear();
        self.scroll = 0;
        self.status_note = None;
    }

    pub fn apply_history(&mut self, update: HistoryUpdate) {
        self.history.loading = false;
        match update {
            HistoryUpdate::Tasks(Ok(tasks)) => {
                self.history.tasks = tasks;
                self.history.selected = self
                    .history
                    .selected
                    .min(self.history.tasks.len().saturating_sub(1));
                self.history.error = None;
            }
            HistoryUpdate::Tasks(Err(err)) => {
                self.history.error = Some(format!("Failed to load tasks: {err}"));
            }
            HistoryUpdate::Logs { id, result: Ok(records) } => {
                self.history.logs = records
                    .iter()
                    .enumerate()
                    .map(|(index, record)| record.to_log_event(index as u64))
                    .collect();
                self.history.logs_for = Some(id);
                self.history.error = None;
            }
            HistoryUpdate::Logs { id, result: Err(err) } => {
                self.history.error = Some(format!("Failed to load logs for task #{id}: {err}"));
            }
        }
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> Action {
        if key.modifiers.contains(KeyModifiers::CONTROL) {
            return match key.code {
                KeyCode::Char('c') | KeyCode::Char('q') => Action::Quit,
                KeyCode::Char('l') => Action::Relogin,
                KeyCode::Char('u') => {
                    self.input.clear();
                    Action::None
                }
                _ => Action::None,
            };
        }
        if key.code == KeyCode::F(1) {
            self.help_open = !self.help_open;
            return Action::None;
        }
        if self.help_open {
            if key.code == KeyCode::Esc {
                self.help_open = false;
            }
            return Action::None;
        }
        if key.code == KeyCode::F(2) {
            return self.toggle_history();
        }
        match self.view {
            View::Live => self.handle_live_key(key),
            View::History => self.handle_history_key(key),
        }
    }

    fn toggle_history(&mut self) -> Action {
        match self.view {
            View::Live => {
                self.view = View::History;
                self.history.loading = true;
                Action::LoadHistory
            }
            View::History => {
                self.view = View::Live;
                Action::None
            }
        }
    }

    fn handle_live_key(&mut self, key: KeyEvent) -> Action {
        match key.code {
            KeyCode::Enter => {
                if self.input.trim().is_empty() {
                    return Action::None;
                }
                Action::Submit {
                    description: self.input.trim().to_string(),
                    model: self.model().to_string(),
                    mode: self.mode,
                }
            }
            KeyCode::Esc => Action::Escape,
            KeyCode::Tab => {
                if !self.models.is_empty() {
                    self.model_index = (self.model_index + 1) % self.models.len();
                }
                Action::None
            }
            KeyCode::BackTab => {
                self.mode = self.mode.next();
                Action::None
            }
            KeyCode::PageUp => {
                self.scroll = (self.scroll + SCROLL_STEP).min(self.lines.len().saturating_sub(1));
                Action::None
            }
            KeyCode::PageDown => {
                self.scroll = self.scroll.saturating_sub(SCROLL_STEP);
                Action::None
            }
            KeyCode::End => {
                self.scroll = 0;
                Action::None
            }
            KeyCode::Backspace => {
                self.input.pop();
                Action::None
            }
            KeyCode::Char(c) => {
                self.input.push(c);
                Action::None
            }
            _ => Action::None,
        }
    }

    fn handle_history_key(&mut self, key: KeyEvent) -> Action {
        match key.code {
            KeyCode::Esc | KeyCode::Char('q') => {
                self.view = View::Live;
                Action::None
            }
            KeyCode::Down | KeyCode::Char('j') => {
                if self.history.selected + 1 < self.history.tasks.len() {
                    self.history.selected += 1;
                }
                Action::None
            }
            KeyCode::Up | KeyCode::Char('k') => {
                self.history.selected = self.history.selected.saturating_sub(1);
                Action::None
            }
            KeyCode::Char('r') => {
                self.history.loading = true;
                Action::LoadHistory
            }
            KeyCode::Enter => match self.history.selected_task().map(|task| task.id.clone()) {
                Some(id) => {
                    self.history.loading = true;
                    Action::LoadTaskLogs(id)
                }
                None => Action::None,
            },
            _ => Action::None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskdeck_core::{ChannelMessage, DispatchIntent};

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn type_text(app: &mut App, text: &str) {
        for c in text.chars() {
            app.handle_key(key(KeyCode::Char(c)));
        }
    }

    fn app() -> App {
        App::new(
            vec!["codellama".to_string(), "llama3".to_string()],
            "llama3",
            RunMode::Full,
            "Admin".to_string(),
        )
    }

    #[test]
    fn enter_submits_trimmed_input_with_current_model_and_mode() {
        let mut app = app();
        assert_eq!(app.handle_key(key(KeyCode::Enter)), Action::None);
        type_text(&mut app, "  Build a Flask REST API ");
        app.handle_key(key(KeyCode::Tab));
        app.handle_key(key(KeyCode::BackTab));
        assert_eq!(
            app.handle_key(key(KeyCode::Enter)),
            Action::Submit {
                description: "Build a Flask REST API".to_string(),
                model: "codellama".to_string(),
                mode: RunMode::CodeOnly,
            }
        );
        assert!(!app.input.is_empty());
        app.on_submitted();
        assert!(app.input.is_empty());
    }

    #[test]
    fn terminal_stream_end_is_reported() {
        assert_eq!(TerminalInput::from_stream(None), TerminalInput::Closed);
        let press = key(KeyCode::Enter);
        assert_eq!(
            TerminalInput::from_stream(Some(Ok(Event::Key(press)))),
            TerminalInput::Key(press)
        );
        let mut release = key(KeyCode::Enter);
        release.kind = KeyEventKind::Release;
        assert_eq!(
            TerminalInput::from_stream(Some(Ok(Event::Key(release)))),
            TerminalInput::Ignore
        );
        assert_eq!(
            TerminalInput::from_stream(Some(Ok(Event::FocusGained))),
            TerminalInput::Ignore
        );
    }

    #[test]
    fn configured_model_is_offered_even_when_not_listed() {
        let app = App::new(Vec::new(), "mistral", RunMode::Full, String::new());
        assert_eq!(app.models, ["mistral"]);
        assert_eq!(app.model(), "mistral");
    }

    #[test]
    fn control_keys_map_to_actions() {
        let mut app = app();
        let ctrl = |c| KeyEvent::new(KeyCode::Char(c), KeyModifiers::CONTROL);
        assert_eq!(app.handle_key(ctrl('c')), Action::Quit);
        assert_eq!(app.handle_key(ctrl('l')), Action::Relogin);
        type_text(&mut app, "abc");
        app.handle_key(ctrl('u'));
        assert!(app.input.is_empty());
        assert_eq!(app.handle_key(key(KeyCode::Esc)), Action::Escape);
    }

    #[test]
    fn history_navigation_requests_logs_for_selection() {
        let mut app = app();
        assert_eq!(app.handle_key(key(KeyCode::F(2))), Action::LoadHistory);
        assert_eq!(app.view, View::History);
        let tasks: Vec<TaskRecord> = serde_json::from_str(
            r#"[{"id": 12, "title": "Flask"}, {"id": 13, "title": "Tests"}]"#,
        )
        .unwrap();
        app.apply_history(HistoryUpdate::Tasks(Ok(tasks)));
        app.handle_key(key(KeyCode::Down));
        app.handle_key(key(KeyCode::Down));
        assert_eq!(
            app.handle_key(key(KeyCode::Enter)),
            Action::LoadTaskLogs(RunId::from(13))
        );
        assert!(app.history.loading);
        assert_eq!(app.history.selected, 1);
        app.apply_history(HistoryUpdate::Logs {
            id: RunId::from(13),
            result: Err(ApiError::Status {
                status: 404,
                detail: "Task not found".to_string(),
            }),
        });
        assert!(app.history.error.as_deref().unwrap_or_default().contains("#13"));
        app.handle_key(key(KeyCode::Esc));
        assert_eq!(app.view, View::Live);
    }

    #[test]
    fn sync_follows_transcript_resets() {
        let mut app = app();
        let mut log = RunLog::default();
        let ticket = log
            .begin_dispatch(DispatchIntent::new("first", "llama3", RunMode::Full))
            .unwrap();
        log.resolve_dispatch(ticket, Ok(RunId::from(1)));
        log.apply(ChannelMessage::event("planner", "info", "Planning"));
        app.sync(&log);
        log.apply(ChannelMessage::event("orchestrator", "info", "All agents completed successfully"));
        app.sync(&log);
        assert_eq!(app.lines.len(), 2);

        app.scroll = 1;
        let ticket = log
            .begin_dispatch(DispatchIntent::new("second", "llama3", RunMode::Full))
            .unwrap();
        log.resolve_dispatch(ticket, Ok(RunId::from(2)));
        app.sync(&log);
        assert!(app.lines.is_empty());
        assert_eq!(app.scroll, 0);
    }
}
