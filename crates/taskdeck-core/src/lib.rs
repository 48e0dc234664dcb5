pub mod error;
pub mod event;
pub mod notice;
pub mod run;
pub mod session;
pub mod transcript;
pub mod view;
pub mod wire;

pub use error::{ConsoleError, DispatchError};
pub use event::{AgentName, EventType, LogEvent};
pub use notice::{Notice, NoticeKind, NoticeLog};
pub use run::{RunId, RunMode, TaskRun, TaskRunStatus};
pub use session::{Credential, SessionContext, UserProfile};
pub use transcript::{Applied, DispatchIntent, DispatchResolution, DispatchTicket, RunLog};
pub use view::{RunIndicator, TranscriptCursor, TranscriptDelta};
pub use wire::{ChannelMessage, DispatchRequest, DispatchResponse, Sentinel, WireError};
