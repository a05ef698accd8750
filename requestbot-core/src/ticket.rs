//! Ticket types.
//!
//! A ticket has no identity of its own: it is the rendered review message plus
//! the (action, requester, text) tuple carried by each of its controls. The
//! types here keep those pieces from being mixed up with one another.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Newtype for a chat user identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for UserId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Newtype for a chat identity (group, channel or private chat).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChatId(pub i64);

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for ChatId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Newtype for a message identity within a chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub i64);

impl From<i64> for MessageId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Coordinates of the single rendered message that is a ticket's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SurfaceRef {
    pub chat_id: ChatId,
    pub message_id: MessageId,
}

impl SurfaceRef {
    pub fn new(chat_id: impl Into<ChatId>, message_id: impl Into<MessageId>) -> Self {
        Self {
            chat_id: chat_id.into(),
            message_id: message_id.into(),
        }
    }
}

impl fmt::Display for SurfaceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.chat_id.0, self.message_id.0)
    }
}

/// The four actions a reviewer can apply to a submitted ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TicketAction {
    Received,
    Uploaded,
    Available,
    Rejected,
}

impl TicketAction {
    /// Every action, in the order controls are rendered.
    pub const ALL: [TicketAction; 4] = [
        TicketAction::Received,
        TicketAction::Uploaded,
        TicketAction::Available,
        TicketAction::Rejected,
    ];

    /// Stable wire code used inside tokens. Changing these breaks every
    /// control already rendered in the review chat.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Received => "rcv",
            Self::Uploaded => "upl",
            Self::Available => "avl",
            Self::Rejected => "rej",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|action| action.code() == code)
    }

    /// Label shown on the reviewer's control.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Received => "📥 Received",
            Self::Uploaded => "📤 Uploaded",
            Self::Available => "✅ Available",
            Self::Rejected => "❌ Rejected",
        }
    }

    /// Status this action resolves a ticket to.
    pub fn resolved_status(&self) -> TicketStatus {
        match self {
            Self::Received => TicketStatus::Received,
            Self::Uploaded => TicketStatus::Uploaded,
            Self::Available => TicketStatus::Available,
            Self::Rejected => TicketStatus::Rejected,
        }
    }
}

impl fmt::Display for TicketAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.resolved_status(), f)
    }
}

/// Lifecycle status of a ticket.
///
/// `Submitted` is the only non-terminal status. A ticket leaves it exactly
/// once, and there are no transitions between the terminal statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TicketStatus {
    Submitted,
    Received,
    Uploaded,
    Available,
    Rejected,
}

/// Attempted to move a ticket that has already been resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("ticket already resolved as {current}")]
pub struct AlreadyResolved {
    pub current: TicketStatus,
}

impl TicketStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Submitted)
    }

    /// Pure transition function: `(status, action) -> status`.
    pub fn apply(self, action: TicketAction) -> Result<TicketStatus, AlreadyResolved> {
        match self {
            Self::Submitted => Ok(action.resolved_status()),
            current => Err(AlreadyResolved { current }),
        }
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Submitted => "Submitted",
            Self::Received => "Received",
            Self::Uploaded => "Uploaded",
            Self::Available => "Available",
            Self::Rejected => "Rejected",
        };
        f.write_str(name)
    }
}

/// A posted ticket.
///
/// Only the submission pipeline creates these, and only after the review
/// message was posted successfully.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    requester_id: UserId,
    request_text: String,
    status: TicketStatus,
    surface_ref: SurfaceRef,
}

impl Ticket {
    pub(crate) fn submitted(
        requester_id: UserId,
        request_text: impl Into<String>,
        surface_ref: SurfaceRef,
    ) -> Self {
        Self {
            requester_id,
            request_text: request_text.into(),
            status: TicketStatus::Submitted,
            surface_ref,
        }
    }

    pub fn requester_id(&self) -> UserId {
        self.requester_id
    }

    pub fn request_text(&self) -> &str {
        &self.request_text
    }

    pub fn status(&self) -> TicketStatus {
        self.status
    }

    pub fn surface_ref(&self) -> SurfaceRef {
        self.surface_ref
    }
}
