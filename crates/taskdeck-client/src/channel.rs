use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use taskdeck_core::wire::{decode_message, encode_ping, WireError};
use taskdeck_core::{ChannelMessage, SessionContext};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;

use crate::backoff::Backoff;
use crate::config::{redact_channel_url, ClientConfig};
use crate::error::ChannelError;
use crate::heartbeat::{Heartbeat, HeartbeatVerdict};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Close code the backend uses when the token in the channel path is invalid.
pub const CLOSE_CODE_AUTH: u16 = 4001;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelState {
    Idle,
    Connecting,
    Open,
    Closing,
    Closed,
}

impl ChannelState {
    pub fn label(&self) -> &'static str {
        match self {
            ChannelState::Idle => "idle",
            ChannelState::Connecting => "connecting",
            ChannelState::Open => "open",
            ChannelState::Closing => "closing",
            ChannelState::Closed => "closed",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ChannelEvent {
    Message(ChannelMessage),
    /// A frame that did not decode; the stream carries on.
    Malformed(WireError),
    /// `reconnect` is 0 for the first open and counts reopens after that.
    Opened { reconnect: u32 },
    Dropped { reason: String },
    Reconnecting { attempt: u32, delay: Duration },
    AuthFailed(String),
    GaveUp { attempts: u32 },
    Closed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionToken(u64);

pub struct Subscription {
    token: SubscriptionToken,
    rx: mpsc::UnboundedReceiver<ChannelEvent>,
}

impl Subscription {
    pub fn token(&self) -> SubscriptionToken {
        self.token
    }

    pub async fn recv(&mut self) -> Option<ChannelEvent> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<ChannelEvent> {
        self.rx.try_recv().ok()
    }
}

struct Fanout {
    next_token: u64,
    entries: Vec<(SubscriptionToken, mpsc::UnboundedSender<ChannelEvent>)>,
    backlog: VecDeque<ChannelEvent>,
    backlog_cap: usize,
    last_activity_at: Option<DateTime<Utc>>,
}

impl Fanout {
    fn new(backlog_cap: usize) -> Self {
        Self {
            next_token: 0,
            entries: Vec::new(),
            backlog: VecDeque::new(),
            backlog_cap: backlog_cap.max(1),
            last_activity_at: None,
        }
    }

    fn deliver(&mut self, event: ChannelEvent) {
        if matches!(event, ChannelEvent::Message(_)) {
            self.last_activity_at = Some(Utc::now());
        }
        if self.entries.is_empty() {
            if self.backlog.len() == self.backlog_cap {
                self.backlog.pop_front();
            }
            self.backlog.push_back(event);
            return;
        }
        self.entries.retain(|(_, tx)| tx.send(event.clone()).is_ok());
    }

    fn subscribe(&mut self) -> Subscription {
        self.next_token += 1;
        let token = SubscriptionToken(self.next_token);
        let (tx, rx) = mpsc::unbounded_channel();
        if self.entries.is_empty() {
            for event in self.backlog.drain(..) {
                let _ = tx.send(event);
            }
        }
        self.entries.push((token, tx));
        Subscription { token, rx }
    }

    fn unsubscribe(&mut self, token: SubscriptionToken) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry, _)| *entry != token);
        self.entries.len() != before
    }
}

#[derive(Clone)]
struct SharedFanout(Arc<Mutex<Fanout>>);

impl SharedFanout {
    fn lock(&self) -> MutexGuard<'_, Fanout> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn deliver(&self, event: ChannelEvent) {
        self.lock().deliver(event);
    }
}

/// One live connection and the supervisor task that owns its socket.
pub struct ChannelHandle {
    state: watch::Receiver<ChannelState>,
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
    label: String,
}

impl ChannelHandle {
    pub fn state(&self) -> ChannelState {
        *self.state.borrow()
    }

    /// Channel URL with the token redacted.
    pub fn label(&self) -> &str {
        &self.label
    }

    async fn shutdown(&mut self) {
        let _ = self.shutdown.send(true);
        if let Some(mut task) = self.task.take() {
            if tokio::time::timeout(SHUTDOWN_GRACE, &mut task).await.is_err() {
                warn!(event = "channel_shutdown_timeout", channel = %self.label);
                task.abort();
            }
        }
    }
}

impl Drop for ChannelHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Owns the single live channel. Subscriptions outlive individual
/// connections, so reopening after a re-login keeps existing subscribers.
pub struct ChannelManager {
    config: ClientConfig,
    fanout: SharedFanout,
    state: Arc<watch::Sender<ChannelState>>,
    current: Option<ChannelHandle>,
}

impl ChannelManager {
    pub fn new(config: ClientConfig) -> Self {
        let fanout = SharedFanout(Arc::new(Mutex::new(Fanout::new(config.subscriber_backlog))));
        let (state, _rx) = watch::channel(ChannelState::Idle);
        Self {
            config,
            fanout,
            state: Arc::new(state),
            current: None,
        }
    }

    pub async fn open(&mut self, session: &SessionContext) -> Result<&ChannelHandle, ChannelError> {
        self.close().await;
        self.current = None;

        let url = self.config.channel_url(session.credential())?;
        let label = redact_channel_url(&url);
        info!(event = "channel_connecting", channel = %label);
        self.state.send_replace(ChannelState::Connecting);
        let ws = match connect_once(&url, self.config.connect_timeout).await {
            Ok(ws) => ws,
            Err(err) => {
                warn!(event = "channel_open_failed", channel = %label, error = %err);
                self.state.send_replace(ChannelState::Idle);
                return Err(err);
            }
        };
        info!(event = "channel_open", channel = %label);

        self.state.send_replace(ChannelState::Open);
        let state_rx = self.state.subscribe();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let supervisor = Supervisor {
            url,
            label: label.clone(),
            config: self.config.clone(),
            state: self.state.clone(),
            fanout: self.fanout.clone(),
            shutdown: shutdown_rx,
        };
        let task = tokio::spawn(supervisor.run(ws));
        Ok(self.current.insert(ChannelHandle {
            state: state_rx,
            shutdown: shutdown_tx,
            task: Some(task),
            label,
        }))
    }

    pub fn subscribe(&self) -> Subscription {
        self.fanout.lock().subscribe()
    }

    pub fn unsubscribe(&self, token: SubscriptionToken) -> bool {
        self.fanout.lock().unsubscribe(token)
    }

    pub fn state(&self) -> ChannelState {
        *self.state.borrow()
    }

    /// Follows every state change, including the first `Connecting`.
    pub fn watch_state(&self) -> watch::Receiver<ChannelState> {
        self.state.subscribe()
    }

    pub fn handle(&self) -> Option<&ChannelHandle> {
        self.current.as_ref()
    }

    pub fn last_activity_at(&self) -> Option<DateTime<Utc>> {
        self.fanout.lock().last_activity_at
    }

    /// Explicit close; the channel ends in `Closed` and is not retried.
    pub async fn close(&mut self) {
        if let Some(handle) = self.current.as_mut() {
            if !matches!(handle.state(), ChannelState::Closed) {
                info!(event = "channel_close", channel = %handle.label);
            }
            handle.shutdown().await;
            self.state.send_replace(ChannelState::Closed);
        }
    }
}

async fn connect_once(url: &Url, timeout: Duration) -> Result<WsStream, ChannelError> {
    match tokio::time::timeout(timeout, connect_async(url.as_str())).await {
        Err(_) => Err(ChannelError::Connection(format!(
            "connect timed out after {}ms",
            timeout.as_millis()
        ))),
        Ok(Ok((ws, _response))) => Ok(ws),
        Ok(Err(err)) => Err(classify_connect_error(err)),
    }
}

fn classify_connect_error(err: WsError) -> ChannelError {
    match &err {
        WsError::Http(response) if matches!(response.status().as_u16(), 401 | 403) => {
            ChannelError::Auth(format!("upgrade refused with {}", response.status()))
        }
        _ => ChannelError::Connection(err.to_string()),
    }
}

enum ConnectionEnd {
    Shutdown,
    Dropped(String),
    AuthRejected(String),
}

struct Supervisor {
    url: Url,
    label: String,
    config: ClientConfig,
    state: Arc<watch::Sender<ChannelState>>,
    fanout: SharedFanout,
    shutdown: watch::Receiver<bool>,
}

impl Supervisor {
    async fn run(mut self, mut ws: WsStream) {
        let mut backoff = Backoff::new(self.config.backoff.clone());
        let mut reconnects = 0u32;
        self.fanout.deliver(ChannelEvent::Opened { reconnect: 0 });

        loop {
            let end = self.pump(&mut ws).await;
            match end {
                ConnectionEnd::Shutdown => {
                    self.state.send_replace(ChannelState::Closing);
                    let _ = ws.close(None).await;
                    self.finish();
                    return;
                }
                ConnectionEnd::AuthRejected(reason) => {
                    self.auth_failed(reason);
                    return;
                }
                ConnectionEnd::Dropped(reason) => {
                    let _ = ws.close(None).await;
                    warn!(event = "channel_drop", channel = %self.label, reason = %reason);
                    self.fanout.deliver(ChannelEvent::Dropped { reason });
                    self.state.send_replace(ChannelState::Connecting);
                }
            }

            ws = loop {
                let Some(delay) = backoff.next_delay() else {
                    warn!(
                        event = "channel_gave_up",
                        channel = %self.label,
                        attempts = backoff.attempts()
                    );
                    self.fanout.deliver(ChannelEvent::GaveUp {
                        attempts: backoff.attempts(),
                    });
                    self.finish();
                    return;
                };
                let attempt = backoff.attempts();
                debug!(event = "channel_reconnect_wait", attempt, delay_ms = delay.as_millis() as u64);
                self.fanout.deliver(ChannelEvent::Reconnecting { attempt, delay });

                let url = &self.url;
                let connect_timeout = self.config.connect_timeout;
                let connect = tokio::select! {
                    _ = self.shutdown.changed() => None,
                    result = async {
                        tokio::time::sleep(delay).await;
                        connect_once(url, connect_timeout).await
                    } => Some(result),
                };
                match connect {
                    None => {
                        self.finish();
                        return;
                    }
                    Some(Ok(ws)) => break ws,
                    Some(Err(ChannelError::Auth(reason))) => {
                        self.auth_failed(reason);
                        return;
                    }
                    Some(Err(err)) => {
                        warn!(event = "channel_reconnect_failed", channel = %self.label, attempt, error = %err);
                    }
                }
            };

            backoff.reset();
            reconnects += 1;
            info!(event = "channel_reopen", channel = %self.label, reconnect = reconnects);
            self.state.send_replace(ChannelState::Open);
            self.fanout.deliver(ChannelEvent::Opened {
                reconnect: reconnects,
            });
        }
    }

    /// Reads one connection until it ends, probing liveness on the heartbeat interval.
    async fn pump(&mut self, ws: &mut WsStream) -> ConnectionEnd {
        let interval = self.config.heartbeat_interval;
        let mut ticker = interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut heartbeat = Heartbeat::new(self.config.max_missed_heartbeats);

        loop {
            tokio::select! {
                _ = self.shutdown.changed() => return ConnectionEnd::Shutdown,
                frame = ws.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        match decode_message(&text, self.config.max_message_bytes) {
                            Ok(message) => {
                                if message.is_pong() {
                                    heartbeat.on_reply();
                                }
                                self.fanout.deliver(ChannelEvent::Message(message));
                            }
                            Err(err) => {
                                warn!(event = "channel_parse_error", channel = %self.label, error = %err);
                                self.fanout.deliver(ChannelEvent::Malformed(err));
                            }
                        }
                    }
                    Some(Ok(Message::Close(frame))) => return close_outcome(frame),
                    Some(Ok(_)) => {}
                    Some(Err(err)) => return ConnectionEnd::Dropped(err.to_string()),
                    None => return ConnectionEnd::Dropped("stream ended".to_string()),
                },
                _ = ticker.tick() => match heartbeat.tick() {
                    HeartbeatVerdict::Probe => {
                        if let Err(err) = ws.send(Message::Text(encode_ping())).await {
                            return ConnectionEnd::Dropped(format!("heartbeat send failed: {err}"));
                        }
                    }
                    HeartbeatVerdict::Expired => {
                        return ConnectionEnd::Dropped(format!(
                            "{} heartbeats unanswered",
                            heartbeat.missed()
                        ));
                    }
                },
            }
        }
    }

    fn auth_failed(&self, reason: String) {
        warn!(event = "channel_auth_failed", channel = %self.label, reason = %reason);
        self.fanout.deliver(ChannelEvent::AuthFailed(reason));
        self.finish();
    }

    fn finish(&self) {
        self.state.send_replace(ChannelState::Closed);
        self.fanout.deliver(ChannelEvent::Closed);
    }
}

fn close_outcome(frame: Option<CloseFrame<'static>>) -> ConnectionEnd {
    match frame {
        Some(frame) if u16::from(frame.code) == CLOSE_CODE_AUTH => {
            ConnectionEnd::AuthRejected(format!("closed by server: {}", frame.reason))
        }
        Some(frame) => ConnectionEnd::Dropped(format!(
            "closed by server ({}): {}",
            u16::from(frame.code),
            frame.reason
        )),
        None => ConnectionEnd::Dropped("closed by server".to_string()),
    }
}
