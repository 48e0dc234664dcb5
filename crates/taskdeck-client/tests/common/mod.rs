#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use taskdeck_client::{
    BackoffPolicy, ChannelEvent, ClientConfig, Console, ConsoleInput, Subscription,
};
use taskdeck_core::ConsoleError;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

pub const EMAIL: &str = "admin@example.com";
pub const PASSWORD: &str = "hunter2";
pub const TOKEN: &str = "tok-admin";

#[derive(Clone, Debug)]
pub enum ServerCommand {
    Send(String),
    Drop,
    CloseWith(u16),
}

pub struct MockState {
    valid_token: Mutex<String>,
    pub answer_pings: AtomicBool,
    pub refuse_ws: AtomicBool,
    pub ws_connections: AtomicUsize,
    pub execute_calls: AtomicUsize,
    execute_delay_ms: AtomicU64,
    execute_failure: AtomicU16,
    next_task_id: AtomicU64,
    script: Mutex<Vec<Value>>,
    last_execute: Mutex<Option<Value>>,
    commands: broadcast::Sender<ServerCommand>,
}

impl MockState {
    fn token(&self) -> String {
        self.valid_token.lock().unwrap().clone()
    }

    fn authorized(&self, headers: &HeaderMap) -> bool {
        let expected = format!("Bearer {}", self.token());
        headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value == expected)
    }
}

pub struct MockBackend {
    pub addr: SocketAddr,
    pub state: Arc<MockState>,
    server: JoinHandle<()>,
}

impl MockBackend {
    pub async fn start() -> Self {
        let (commands, _) = broadcast::channel(64);
        let state = Arc::new(MockState {
            valid_token: Mutex::new(TOKEN.to_string()),
            answer_pings: AtomicBool::new(true),
            refuse_ws: AtomicBool::new(false),
            ws_connections: AtomicUsize::new(0),
            execute_calls: AtomicUsize::new(0),
            execute_delay_ms: AtomicU64::new(0),
            execute_failure: AtomicU16::new(0),
            next_task_id: AtomicU64::new(12),
            script: Mutex::new(Vec::new()),
            last_execute: Mutex::new(None),
            commands,
        });

        let app = Router::new()
            .route("/api/auth/login", post(login))
            .route("/api/auth/me", get(me))
            .route("/api/models/", get(models))
            .route("/api/agent/execute", post(execute))
            .route("/api/tasks/", get(tasks))
            .route("/api/tasks/:id/logs", get(task_logs))
            .route("/api/agent/ws/:token", get(ws_handler))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        Self {
            addr,
            state,
            server,
        }
    }

    /// Fast retry and a long heartbeat so tests only see the drops they cause.
    pub fn config(&self) -> ClientConfig {
        let mut config = ClientConfig::parse(&format!("http://{}", self.addr)).unwrap();
        config.connect_timeout = Duration::from_secs(2);
        config.heartbeat_interval = Duration::from_secs(30);
        config.backoff = BackoffPolicy {
            initial: Duration::from_millis(20),
            max: Duration::from_millis(80),
            max_attempts: Some(3),
        };
        config
    }

    pub fn command(&self, command: ServerCommand) {
        let _ = self.state.commands.send(command);
    }

    pub fn push_event(&self, event: Value) {
        self.command(ServerCommand::Send(event.to_string()));
    }

    pub fn set_script(&self, events: Vec<Value>) {
        *self.state.script.lock().unwrap() = events;
    }

    pub fn set_execute_delay(&self, delay: Duration) {
        self.state
            .execute_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn fail_execute_with(&self, status: u16) {
        self.state.execute_failure.store(status, Ordering::SeqCst);
    }

    pub fn revoke_tokens(&self) {
        *self.state.valid_token.lock().unwrap() = "revoked".to_string();
    }

    pub fn execute_calls(&self) -> usize {
        self.state.execute_calls.load(Ordering::SeqCst)
    }

    pub fn ws_connections(&self) -> usize {
        self.state.ws_connections.load(Ordering::SeqCst)
    }

    pub fn last_execute(&self) -> Option<Value> {
        self.state.last_execute.lock().unwrap().clone()
    }
}

impl Drop for MockBackend {
    fn drop(&mut self) {
        self.server.abort();
    }
}

pub fn agent_event(agent: &str, kind: &str, content: &str) -> Value {
    json!({
        "agent": agent,
        "type": kind,
        "content": content,
        "timestamp": "2026-01-01T10:00:00",
    })
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"detail": "Could not validate credentials"})),
    )
        .into_response()
}

fn user() -> Value {
    json!({
        "id": 1,
        "email": EMAIL,
        "name": "Admin",
        "role": "admin",
        "is_active": true,
        "is_approved": true,
    })
}

async fn login(State(state): State<Arc<MockState>>, Json(body): Json<Value>) -> Response {
    if body["email"] != EMAIL || body["password"] != PASSWORD {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"detail": "Incorrect email or password"})),
        )
            .into_response();
    }
    Json(json!({
        "access_token": state.token(),
        "token_type": "bearer",
        "user": user(),
    }))
    .into_response()
}

async fn me(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    if !state.authorized(&headers) {
        return unauthorized();
    }
    Json(user()).into_response()
}

async fn models(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    if !state.authorized(&headers) {
        return unauthorized();
    }
    Json(json!([
        {"name": "llama3", "model": "llama3", "size": 4661224676u64, "digest": "abc", "modified_at": "2026-01-01T00:00:00Z", "details": {}},
        {"name": "codellama", "size": 3825819519u64}
    ]))
    .into_response()
}

async fn execute(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !state.authorized(&headers) {
        return unauthorized();
    }
    state.execute_calls.fetch_add(1, Ordering::SeqCst);
    *state.last_execute.lock().unwrap() = Some(body);

    let delay = Duration::from_millis(state.execute_delay_ms.load(Ordering::SeqCst));
    let failure = state.execute_failure.load(Ordering::SeqCst);
    if failure != 0 {
        tokio::time::sleep(delay).await;
        let status = StatusCode::from_u16(failure).unwrap();
        return (status, Json(json!({"detail": "Model backend unavailable"}))).into_response();
    }

    let task_id = state.next_task_id.fetch_add(1, Ordering::SeqCst);
    let script = state.script.lock().unwrap().clone();
    for mut event in script {
        event["task_id"] = json!(task_id);
        let _ = state.commands.send(ServerCommand::Send(event.to_string()));
    }
    tokio::time::sleep(delay).await;
    Json(json!({
        "task_id": task_id,
        "status": "started",
        "message": "Task execution started",
    }))
    .into_response()
}

async fn tasks(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    if !state.authorized(&headers) {
        return unauthorized();
    }
    Json(json!([
        {"id": 12, "user_id": 1, "title": "Build a Flask REST API", "description": "Build a Flask REST API", "status": "completed", "agent_type": "full", "model_used": "llama3", "created_at": "2026-01-01 10:00:00", "updated_at": "2026-01-01 10:05:00"}
    ]))
    .into_response()
}

async fn task_logs(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Path(id): Path<u64>,
) -> Response {
    if !state.authorized(&headers) {
        return unauthorized();
    }
    if id != 12 {
        return (StatusCode::NOT_FOUND, Json(json!({"detail": "Task not found"}))).into_response();
    }
    Json(json!([
        {"id": 1, "task_id": 12, "agent_name": "planner", "log_type": "info", "message": "Planning", "created_at": "2026-01-01 10:00:01"},
        {"id": 2, "task_id": 12, "agent_name": "orchestrator", "log_type": "info", "message": "All agents completed successfully", "created_at": "2026-01-01 10:05:00"}
    ]))
    .into_response()
}

async fn ws_handler(
    State(state): State<Arc<MockState>>,
    Path(token): Path<String>,
    ws: WebSocketUpgrade,
) -> Response {
    if state.refuse_ws.load(Ordering::SeqCst) {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    if token != state.token() {
        return StatusCode::FORBIDDEN.into_response();
    }
    ws.on_upgrade(move |socket| serve_socket(socket, state))
}

async fn serve_socket(mut socket: WebSocket, state: Arc<MockState>) {
    state.ws_connections.fetch_add(1, Ordering::SeqCst);
    let mut commands = state.commands.subscribe();
    let connected = json!({"type": "connected", "message": "WebSocket connected"}).to_string();
    if socket.send(Message::Text(connected)).await.is_err() {
        return;
    }
    loop {
        tokio::select! {
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    let is_ping = serde_json::from_str::<Value>(&text)
                        .map(|value| value["type"] == "ping")
                        .unwrap_or(false);
                    if is_ping && state.answer_pings.load(Ordering::SeqCst) {
                        let pong = json!({"type": "pong"}).to_string();
                        if socket.send(Message::Text(pong)).await.is_err() {
                            return;
                        }
                    }
                }
                Some(Ok(_)) => {}
                _ => return,
            },
            command = commands.recv() => match command {
                Ok(ServerCommand::Send(text)) => {
                    if socket.send(Message::Text(text)).await.is_err() {
                        return;
                    }
                }
                Ok(ServerCommand::Drop) => return,
                Ok(ServerCommand::CloseWith(code)) => {
                    let frame = CloseFrame {
                        code,
                        reason: "Invalid token".into(),
                    };
                    let _ = socket.send(Message::Close(Some(frame))).await;
                    return;
                }
                Err(_) => return,
            },
        }
    }
}

pub async fn next_event(subscription: &mut Subscription) -> ChannelEvent {
    tokio::time::timeout(Duration::from_secs(5), subscription.recv())
        .await
        .expect("channel event before timeout")
        .expect("subscription open")
}

/// Skips events until one matches.
pub async fn wait_for<F>(subscription: &mut Subscription, mut matches: F) -> ChannelEvent
where
    F: FnMut(&ChannelEvent) -> bool,
{
    loop {
        let event = next_event(subscription).await;
        if matches(&event) {
            return event;
        }
    }
}

/// Runs the console loop until `done` holds, returning surfaced errors.
pub async fn drive_until<F>(
    console: &mut Console,
    subscription: &mut Subscription,
    inputs: &mut mpsc::UnboundedReceiver<ConsoleInput>,
    mut done: F,
) -> Vec<ConsoleError>
where
    F: FnMut(&Console) -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    let mut errors = Vec::new();
    while !done(console) {
        let input = tokio::select! {
            Some(event) = subscription.recv() => ConsoleInput::Channel(event),
            Some(input) = inputs.recv() => input,
            _ = tokio::time::sleep_until(deadline) => panic!("console condition not reached"),
        };
        if let Some(err) = console.handle(input) {
            errors.push(err);
        }
    }
    errors
}
