use std::time::Duration;
use thiserror::Error;

use crate::wire::WireError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("task description is empty")]
    EmptyDescription,
    #[error("a task is already running")]
    AlreadyRunning,
    #[error("not authenticated")]
    Unauthorized,
    #[error("dispatch rejected ({status}): {detail}")]
    Rejected { status: u16, detail: String },
    #[error("dispatch transport error: {0}")]
    Transport(String),
    #[error("dispatch timed out after {}s", .0.as_secs_f32())]
    Timeout(Duration),
}

/// Console-wide error taxonomy. Component errors convert into it at the edge.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConsoleError {
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("connection error: {0}")]
    Connection(String),
    #[error("a task is already running")]
    AlreadyRunning,
    #[error(transparent)]
    Dispatch(DispatchError),
    #[error("malformed stream payload: {0}")]
    Parse(String),
}

impl ConsoleError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, ConsoleError::Auth(_))
    }
}

impl From<DispatchError> for ConsoleError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::AlreadyRunning => ConsoleError::AlreadyRunning,
            DispatchError::Unauthorized => ConsoleError::Auth(err.to_string()),
            other => ConsoleError::Dispatch(other),
        }
    }
}

impl From<WireError> for ConsoleError {
    fn from(err: WireError) -> Self {
        ConsoleError::Parse(err.to_string())
    }
}
