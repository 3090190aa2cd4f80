pub mod events;
pub mod hub;
pub mod lifecycle;
pub mod registry;
mod session;

pub use events::{InboundEvent, OutboundEvent};
pub use lifecycle::{AnswerSet, PollId, PollLifecycle, DEFAULT_POLL_TIMEOUT};
pub use registry::{ConnectionId, ConnectionRole, SessionRegistry};
pub use session::{PollServer, Session, SessionCommand};
