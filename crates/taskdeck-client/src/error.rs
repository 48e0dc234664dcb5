use taskdeck_core::{ConsoleError, DispatchError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("http client setup failed: {0}")]
    HttpSetup(String),
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("not authenticated")]
    NotAuthenticated,
    #[error("unauthorized; session discarded")]
    Unauthorized,
    #[error("request failed ({status}): {detail}")]
    Status { status: u16, detail: String },
    #[error("request transport error: {0}")]
    Transport(String),
    #[error("response decode failed: {0}")]
    Decode(String),
}

impl ApiError {
    pub fn is_auth(&self) -> bool {
        matches!(self, ApiError::NotAuthenticated | ApiError::Unauthorized)
    }
}

impl From<ApiError> for DispatchError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::NotAuthenticated | ApiError::Unauthorized => DispatchError::Unauthorized,
            ApiError::Status { status, detail } => DispatchError::Rejected { status, detail },
            ApiError::Transport(reason) => DispatchError::Transport(reason),
            ApiError::Decode(reason) => DispatchError::Transport(reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error("channel authentication rejected: {0}")]
    Auth(String),
    #[error("channel connection failed: {0}")]
    Connection(String),
    #[error("invalid channel url: {0}")]
    Url(String),
}

impl From<ChannelError> for ConsoleError {
    fn from(err: ChannelError) -> Self {
        match err {
            ChannelError::Auth(reason) => ConsoleError::Auth(reason),
            other => ConsoleError::Connection(other.to_string()),
        }
    }
}

impl From<ClientError> for ChannelError {
    fn from(err: ClientError) -> Self {
        ChannelError::Url(err.to_string())
    }
}
