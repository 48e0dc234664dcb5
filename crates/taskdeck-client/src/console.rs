use taskdeck_core::{
    Applied, ConsoleError, DispatchError, DispatchIntent, DispatchResolution, DispatchTicket,
    NoticeKind, RunId, RunIndicator, RunLog, RunMode, Sentinel, TaskRunStatus,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::channel::ChannelEvent;
use crate::dispatch::TaskDispatcher;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Connectivity {
    Connecting,
    Online,
    Reconnecting { attempt: u32 },
    Offline,
    AuthFailed,
    GaveUp,
}

impl Connectivity {
    pub fn label(&self) -> String {
        match self {
            Connectivity::Connecting => "connecting".to_string(),
            Connectivity::Online => "online".to_string(),
            Connectivity::Reconnecting { attempt: 0 } => "reconnecting".to_string(),
            Connectivity::Reconnecting { attempt } => format!("reconnecting (attempt {attempt})"),
            Connectivity::Offline => "offline".to_string(),
            Connectivity::AuthFailed => "auth failed".to_string(),
            Connectivity::GaveUp => "disconnected".to_string(),
        }
    }

    pub fn is_degraded(&self) -> bool {
        !matches!(self, Connectivity::Online)
    }
}

/// Everything that may change console state. Produced by the channel
/// subscription and by spawned dispatch requests; consumed on the UI task.
#[derive(Debug)]
pub enum ConsoleInput {
    Channel(ChannelEvent),
    Dispatch {
        ticket: DispatchTicket,
        result: Result<RunId, DispatchError>,
    },
}

struct Inflight {
    ticket: DispatchTicket,
    task: JoinHandle<()>,
}

/// Single-owner console runtime: the run log plus the in-flight dispatch.
/// Mutated only through `submit`, `cancel_dispatch` and `handle`.
pub struct Console {
    log: RunLog,
    dispatcher: TaskDispatcher,
    inflight: Option<Inflight>,
    inputs: mpsc::UnboundedSender<ConsoleInput>,
    connectivity: Connectivity,
    banner: Option<String>,
}

impl Console {
    pub fn new(dispatcher: TaskDispatcher) -> (Self, mpsc::UnboundedReceiver<ConsoleInput>) {
        let (inputs, rx) = mpsc::unbounded_channel();
        let console = Self {
            log: RunLog::default(),
            dispatcher,
            inflight: None,
            inputs,
            connectivity: Connectivity::Connecting,
            banner: None,
        };
        (console, rx)
    }

    pub fn log(&self) -> &RunLog {
        &self.log
    }

    pub fn indicator(&self) -> RunIndicator {
        RunIndicator::from_log(&self.log)
    }

    pub fn connectivity(&self) -> Connectivity {
        self.connectivity
    }

    pub fn banner(&self) -> Option<&str> {
        self.banner.as_deref()
    }

    pub fn dismiss_banner(&mut self) {
        self.banner = None;
    }

    /// Starts a dispatch. Local rejections return immediately and never
    /// reach the network.
    pub fn submit(
        &mut self,
        description: &str,
        model: &str,
        mode: RunMode,
    ) -> Result<DispatchTicket, ConsoleError> {
        let intent = DispatchIntent::new(description, model, mode);
        let request = intent.to_request();
        let ticket = self.log.begin_dispatch(intent).map_err(|err| {
            debug!(event = "dispatch_rejected", error = %err);
            ConsoleError::from(err)
        })?;

        let dispatcher = self.dispatcher.clone();
        let inputs = self.inputs.clone();
        let task = tokio::spawn(async move {
            let result = dispatcher.dispatch(request).await;
            let _ = inputs.send(ConsoleInput::Dispatch { ticket, result });
        });
        self.inflight = Some(Inflight { ticket, task });
        Ok(ticket)
    }

    pub fn cancel_dispatch(&mut self) -> bool {
        let Some(inflight) = self.inflight.take() else {
            return false;
        };
        inflight.task.abort();
        let released = self.log.cancel_dispatch(inflight.ticket);
        if released {
            info!(event = "dispatch_cancelled", ticket = inflight.ticket.value());
        }
        released
    }

    /// Folds one input into state. Returns an error the caller should surface.
    pub fn handle(&mut self, input: ConsoleInput) -> Option<ConsoleError> {
        match input {
            ConsoleInput::Channel(event) => self.on_channel(event),
            ConsoleInput::Dispatch { ticket, result } => self.on_dispatch(ticket, result),
        }
    }

    fn on_dispatch(
        &mut self,
        ticket: DispatchTicket,
        result: Result<RunId, DispatchError>,
    ) -> Option<ConsoleError> {
        if self
            .inflight
            .as_ref()
            .is_some_and(|inflight| inflight.ticket == ticket)
        {
            self.inflight = None;
        }
        match self.log.resolve_dispatch(ticket, result) {
            DispatchResolution::Started(run_id) => {
                info!(event = "run_started", run_id = %run_id);
                if self.banner_is_run_scoped() {
                    self.banner = None;
                }
                self.after_transcript_change();
                None
            }
            DispatchResolution::Failed(err) => Some(ConsoleError::from(err)),
            DispatchResolution::Stale => {
                debug!(event = "dispatch_stale", ticket = ticket.value());
                None
            }
        }
    }

    fn on_channel(&mut self, event: ChannelEvent) -> Option<ConsoleError> {
        match event {
            ChannelEvent::Message(message) => {
                match self.log.apply(message) {
                    Applied::Sentinel(Sentinel::Connected) => {
                        self.connectivity = Connectivity::Online;
                    }
                    Applied::Appended {
                        transition: Some((_, to)),
                        ..
                    } => self.on_transition(to),
                    _ => {}
                }
                None
            }
            ChannelEvent::Malformed(err) => Some(ConsoleError::from(err)),
            ChannelEvent::Opened { reconnect } => {
                self.connectivity = Connectivity::Online;
                if reconnect > 0 {
                    self.log
                        .record(NoticeKind::Reconnecting, format!("Reconnected (#{reconnect})"));
                }
                None
            }
            ChannelEvent::Dropped { reason } => {
                self.connectivity = Connectivity::Reconnecting { attempt: 0 };
                self.log
                    .record(NoticeKind::Reconnecting, format!("Connection lost: {reason}"));
                None
            }
            ChannelEvent::Reconnecting { attempt, .. } => {
                self.connectivity = Connectivity::Reconnecting { attempt };
                None
            }
            ChannelEvent::AuthFailed(reason) => {
                self.connectivity = Connectivity::AuthFailed;
                self.log.record(NoticeKind::AuthFailed, reason.clone());
                self.banner = Some("Session rejected by the server. Log in again.".to_string());
                Some(ConsoleError::Auth(reason))
            }
            ChannelEvent::GaveUp { attempts } => {
                self.connectivity = Connectivity::GaveUp;
                let message = format!("Gave up reconnecting after {attempts} attempts");
                self.log.record(NoticeKind::GaveUp, message.clone());
                self.banner = Some(format!("{message}. Restart the console to retry."));
                Some(ConsoleError::Connection(message))
            }
            ChannelEvent::Closed => {
                if !matches!(
                    self.connectivity,
                    Connectivity::AuthFailed | Connectivity::GaveUp
                ) {
                    self.connectivity = Connectivity::Offline;
                }
                None
            }
        }
    }

    fn after_transcript_change(&mut self) {
        if let Some(status) = self.log.status() {
            if status.is_terminal() {
                self.on_transition(status);
            }
        }
    }

    fn on_transition(&mut self, to: TaskRunStatus) {
        let Some(run) = self.log.run() else {
            return;
        };
        match to {
            TaskRunStatus::Completed => info!(event = "run_completed", run_id = %run.id),
            TaskRunStatus::Failed => {
                warn!(event = "run_failed", run_id = %run.id);
                self.banner = Some(format!("Task #{} failed", run.id));
            }
            TaskRunStatus::Running | TaskRunStatus::Dispatched => {}
        }
    }

    fn banner_is_run_scoped(&self) -> bool {
        matches!(
            self.connectivity,
            Connectivity::Online | Connectivity::Connecting | Connectivity::Reconnecting { .. }
        )
    }

    /// Reacts to the session being discarded. An in-flight dispatch is left to
    /// resolve on its own so its failure is still recorded.
    pub fn sign_out(&mut self, reason: &str) {
        warn!(event = "console_signed_out", reason = %reason);
        self.connectivity = Connectivity::AuthFailed;
        self.log
            .record(NoticeKind::AuthFailed, format!("Signed out: {reason}"));
        self.banner = Some("Session ended. Log in again.".to_string());
    }

    /// Aborts the in-flight dispatch. The channel is closed by its manager.
    pub fn shutdown(&mut self) {
        self.cancel_dispatch();
    }
}

impl Drop for Console {
    fn drop(&mut self) {
        if let Some(inflight) = self.inflight.take() {
            inflight.task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiClient;
    use crate::config::ClientConfig;
    use crate::session::SessionStore;
    use taskdeck_core::WireError;

    fn console() -> Console {
        let config = ClientConfig::parse("http://127.0.0.1:9").unwrap();
        let api = ApiClient::new(&config, SessionStore::new()).unwrap();
        Console::new(TaskDispatcher::new(api)).0
    }

    #[test]
    fn malformed_frames_surface_as_parse_errors() {
        let mut console = console();
        let surfaced = console.handle(ConsoleInput::Channel(ChannelEvent::Malformed(
            WireError::NotAnObject,
        )));
        assert_eq!(
            surfaced,
            Some(ConsoleError::Parse("message is not a JSON object".to_string()))
        );
        assert!(console.log().transcript().is_empty());
        assert_eq!(console.connectivity(), Connectivity::Connecting);
    }

    #[test]
    fn sign_out_survives_the_channel_closing() {
        let mut console = console();
        console.sign_out("token expired");
        console.handle(ConsoleInput::Channel(ChannelEvent::Closed));
        assert_eq!(console.connectivity(), Connectivity::AuthFailed);
        assert_eq!(console.log().notices().count(NoticeKind::AuthFailed), 1);
    }
}
