mod app;
mod config;
mod logging;
mod theme;
mod ui;

use std::io;

use anyhow::{Context, Result};
use crossterm::{
    event::EventStream,
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use futures_util::StreamExt;
use ratatui::{backend::CrosstermBackend, Terminal};
use taskdeck_client::{
    ApiClient, AuthState, ChannelManager, Console, ConsoleInput, SessionStore, Subscription,
    TaskDispatcher,
};
use taskdeck_core::{ConsoleError, SessionContext};
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

use crate::app::{Action, App, HistoryUpdate, TerminalInput};
use crate::config::{Config, Login};

type Tui = Terminal<CrosstermBackend<io::Stdout>>;

/// Everything the event loop owns besides the terminal.
struct Runtime {
    config: Config,
    api: ApiClient,
    session: SessionStore,
    channel: ChannelManager,
    subscription: Subscription,
    console: Console,
    inputs: mpsc::UnboundedReceiver<ConsoleInput>,
    history_tx: mpsc::UnboundedSender<HistoryUpdate>,
    history_rx: mpsc::UnboundedReceiver<HistoryUpdate>,
    auth: watch::Receiver<AuthState>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;
    let log_guard = logging::init_logging(&config.log_dir, &config.log_level);
    info!(
        event = "console_start",
        api_url = %config.client.api_url,
        log_file = ?log_guard.path()
    );

    let session = SessionStore::new();
    let api = ApiClient::new(&config.client, session.clone())?;
    let context = authenticate(&api, &config.login)
        .await
        .context("login failed")?;

    let models = match api.models().await {
        Ok(models) => App::model_names(&models),
        Err(err) => {
            warn!(event = "models_unavailable", error = %err);
            Vec::new()
        }
    };

    let mut channel = ChannelManager::new(config.client.clone());
    let subscription = channel.subscribe();
    channel
        .open(&context)
        .await
        .context("opening the task channel")?;

    let (console, inputs) = Console::new(TaskDispatcher::new(api.clone()));
    let mut app = App::new(models, &config.model, config.mode, context.display_name());
    let (history_tx, history_rx) = mpsc::unbounded_channel();
    let auth = session.subscribe();
    let mut runtime = Runtime {
        config,
        api,
        session,
        channel,
        subscription,
        console,
        inputs,
        history_tx,
        history_rx,
        auth,
    };

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout))?;

    let outcome = run(&mut terminal, &mut app, &mut runtime).await;

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    runtime.console.shutdown();
    runtime.channel.close().await;
    info!(event = "console_stop");
    if let Err(err) = &outcome {
        error!(event = "console_error", error = %err);
    }
    outcome
}

async fn authenticate(api: &ApiClient, login: &Login) -> Result<SessionContext> {
    let context = match login {
        Login::Token(credential) => api.resume(credential.clone()).await?,
        Login::Password { email, password } => api.login(email, password).await?,
    };
    Ok(context)
}

async fn run(terminal: &mut Tui, app: &mut App, rt: &mut Runtime) -> Result<()> {
    let mut events = EventStream::new();
    loop {
        app.sync(rt.console.log());
        terminal.draw(|frame| ui::render_ui(frame, app, &rt.console))?;

        tokio::select! {
            Some(event) = rt.subscription.recv() => {
                let surfaced = rt.console.handle(ConsoleInput::Channel(event));
                surface(app, surfaced);
            }
            Some(input) = rt.inputs.recv() => {
                let surfaced = rt.console.handle(input);
                surface(app, surfaced);
            }
            Some(update) = rt.history_rx.recv() => {
                app.apply_history(update);
            }
            Ok(()) = rt.auth.changed() => {
                let state = rt.auth.borrow_and_update().clone();
                if let AuthState::Anonymous { reason } = state {
                    on_signed_out(app, rt, reason).await;
                }
            }
            maybe_event = events.next() => {
                let key = match TerminalInput::from_stream(maybe_event) {
                    TerminalInput::Key(key) => key,
                    TerminalInput::Ignore => continue,
                    TerminalInput::Closed => return Ok(()),
                };
                match app.handle_key(key) {
                    Action::Quit => return Ok(()),
                    action => perform(action, app, rt).await,
                }
            }
        }
    }
}

fn surface(app: &mut App, surfaced: Option<ConsoleError>) {
    if let Some(err) = surfaced {
        app.status_note = Some(match &err {
            ConsoleError::Auth(_) => format!("{err}. Ctrl+L to log in again"),
            _ => err.to_string(),
        });
    }
}

async fn on_signed_out(app: &mut App, rt: &mut Runtime, reason: Option<String>) {
    let reason = reason.unwrap_or_else(|| "signed out".to_string());
    rt.console.sign_out(&reason);
    rt.channel.close().await;
    app.status_note = Some(format!("Session ended ({reason}). Ctrl+L to log in again"));
}

async fn perform(action: Action, app: &mut App, rt: &mut Runtime) {
    match action {
        Action::None | Action::Quit => {}
        Action::Submit {
            description,
            model,
            mode,
        } => match rt.console.submit(&description, &model, mode) {
            Ok(_) => app.on_submitted(),
            Err(err) => surface(app, Some(err)),
        },
        Action::Escape => {
            if !rt.console.cancel_dispatch() {
                rt.console.dismiss_banner();
                app.status_note = None;
            }
        }
        Action::Relogin => relogin(app, rt).await,
        Action::LoadHistory => {
            let api = rt.api.clone();
            let tx = rt.history_tx.clone();
            tokio::spawn(async move {
                let _ = tx.send(HistoryUpdate::Tasks(api.tasks().await));
            });
        }
        Action::LoadTaskLogs(id) => {
            let api = rt.api.clone();
            let tx = rt.history_tx.clone();
            tokio::spawn(async move {
                let result = api.task_logs(&id).await;
                let _ = tx.send(HistoryUpdate::Logs { id, result });
            });
        }
    }
}

/// Re-authenticates with the configured login and reopens the channel.
async fn relogin(app: &mut App, rt: &mut Runtime) {
    if rt.session.is_authenticated() && !rt.console.connectivity().is_degraded() {
        app.status_note = Some("Already signed in".to_string());
        return;
    }
    let context = match authenticate(&rt.api, &rt.config.login).await {
        Ok(context) => context,
        Err(err) => {
            app.status_note = Some(format!("Login failed: {err:#}"));
            return;
        }
    };
    app.user_label = context.display_name();
    match rt.channel.open(&context).await {
        Ok(_) => {
            rt.console.dismiss_banner();
            app.status_note = Some("Signed in again".to_string());
        }
        Err(err) => app.status_note = Some(format!("Channel unavailable: {err}")),
    }
}
