pub mod api;
pub mod backoff;
pub mod channel;
pub mod config;
pub mod console;
pub mod dispatch;
pub mod error;
pub mod heartbeat;
pub mod session;

pub use api::{ApiClient, ModelInfo, TaskLogRecord, TaskRecord};
pub use backoff::{Backoff, BackoffPolicy};
pub use channel::{
    ChannelEvent, ChannelHandle, ChannelManager, ChannelState, Subscription, SubscriptionToken,
};
pub use config::{ClientConfig, DEFAULT_API_URL};
pub use console::{Connectivity, Console, ConsoleInput};
pub use dispatch::TaskDispatcher;
pub use error::{ApiError, ChannelError, ClientError};
pub use session::{AuthState, SessionStore};
