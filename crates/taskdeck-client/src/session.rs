use std::sync::Arc;

use taskdeck_core::{Credential, SessionContext};
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    Anonymous { reason: Option<String> },
    Authenticated(SessionContext),
}

impl AuthState {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthState::Authenticated(_))
    }
}

/// Holds the console's session. Cloned handles share one state; consumers
/// watch it to react to a forced logout.
#[derive(Clone, Debug)]
pub struct SessionStore {
    state: Arc<watch::Sender<AuthState>>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(AuthState::Anonymous { reason: None });
        Self {
            state: Arc::new(tx),
        }
    }

    pub fn establish(&self, context: SessionContext) {
        info!(event = "session_established", user = %context.display_name());
        self.state.send_replace(AuthState::Authenticated(context));
    }

    /// Discards the credential. Returns false if the session was already
    /// anonymous, so the first 401 wins and later ones are quiet.
    pub fn invalidate(&self, reason: &str) -> bool {
        let changed = self.state.send_if_modified(|state| {
            if state.is_authenticated() {
                *state = AuthState::Anonymous {
                    reason: Some(reason.to_string()),
                };
                true
            } else {
                false
            }
        });
        if changed {
            warn!(event = "session_invalidated", reason = %reason);
        }
        changed
    }

    pub fn context(&self) -> Option<SessionContext> {
        match &*self.state.borrow() {
            AuthState::Authenticated(context) => Some(context.clone()),
            AuthState::Anonymous { .. } => None,
        }
    }

    pub fn credential(&self) -> Option<Credential> {
        self.context().map(|context| context.credential().clone())
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().is_authenticated()
    }

    pub fn state(&self) -> AuthState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }
}
