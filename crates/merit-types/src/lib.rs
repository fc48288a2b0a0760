pub mod amount;
pub mod error;
pub mod event;
pub mod id;

pub use amount::RepAmount;
pub use error::{MeritError, Result};
pub use event::{
    AuditSink, Event, EventPayload, Evaluation, Role, Specialty, Verdict,
};
pub use id::{ActorId, EventId, ProjectId, StakeId, TicketId};
