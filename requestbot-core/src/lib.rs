//! Ticket lifecycle engine for the request bot.
//!
//! Requesters submit free-text requests, which are posted to a review chat
//! with one control per possible outcome. A reviewer's activation resolves
//! the ticket, strips its controls, and notifies the requester. The review
//! message is the only record of a ticket.

pub mod capability;
pub mod engine;
pub mod fallback;
pub mod lifecycle;
pub mod memory;
pub mod notify;
pub mod pipeline;
pub mod render;
pub mod ticket;
pub mod token;
pub mod transport;

pub use capability::{CapabilityGate, CapabilityState};
pub use engine::{EngineConfig, TicketEngine};
pub use fallback::{FallbackKind, FallbackNotifier, FallbackReport};
pub use lifecycle::{ActivationError, ActivationOutcome, TicketLifecycle};
pub use memory::InMemoryTransport;
pub use notify::{NotificationFailed, NotificationFanOut, NotificationOutcome};
pub use pipeline::{SubmissionError, SubmissionPipeline, SUBMITTED_REPLY};
pub use ticket::{
    AlreadyResolved, ChatId, MessageId, SurfaceRef, Ticket, TicketAction, TicketStatus, UserId,
};
pub use token::{MalformedToken, TicketToken};
pub use transport::{Activation, ChatTransport, Control, MemberRole, TransportError};
