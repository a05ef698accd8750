//! Chat transport abstraction.
//!
//! This module defines the `ChatTransport` trait the engine talks to.
//! Implementations provide the actual chat backend (the Telegram Bot API
//! in the server, an in-memory table in tests).

use async_trait::async_trait;

use crate::ticket::{ChatId, SurfaceRef, UserId};

/// One interactive control attached to a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Control {
    pub label: String,
    pub token: String,
}

/// A reviewer's activation of a control, as delivered by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Activation {
    /// Transport handle used to acknowledge this activation.
    pub activation_id: String,
    pub surface: SurfaceRef,
    pub activator_id: UserId,
    pub token: String,
}

/// A user's role in a chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberRole {
    Creator,
    /// `can_post_messages` is only reported for channels; `None` means the
    /// chat type has no such restriction. Bots may always edit their own
    /// messages, so no edit flag is carried.
    Administrator { can_post_messages: Option<bool> },
    Member,
    Restricted,
    Left,
    Banned,
}

impl MemberRole {
    /// Whether this role may post to the chat. Plain membership is not
    /// enough: review chats are expected to restrict posting to admins.
    pub fn can_post(&self) -> bool {
        match self {
            Self::Creator => true,
            Self::Administrator { can_post_messages } => can_post_messages.unwrap_or(true),
            _ => false,
        }
    }
}

/// Failure of a single transport call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The request never got an answer (connection, timeout, ...).
    #[error("request failed: {0}")]
    Request(String),
    /// The chat service answered and refused the call.
    #[error("rejected ({code}): {description}")]
    Rejected { code: i64, description: String },
    /// The chat service answered with something unreadable.
    #[error("unreadable response: {0}")]
    Decode(String),
}

/// Operations the engine needs from a chat service.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Post a message with controls, returning where it landed.
    async fn post_message(
        &self,
        chat: ChatId,
        text: &str,
        controls: &[Control],
    ) -> Result<SurfaceRef, TransportError>;

    /// Replace a message's text. `None` strips every control.
    async fn edit_message(
        &self,
        surface: &SurfaceRef,
        text: &str,
        controls: Option<&[Control]>,
    ) -> Result<(), TransportError>;

    /// Send a private message to a user.
    async fn send_direct(&self, user: UserId, text: &str) -> Result<(), TransportError>;

    /// Look up a user's role in a chat.
    async fn get_membership(&self, chat: ChatId, user: UserId)
        -> Result<MemberRole, TransportError>;

    /// Acknowledge an activation so the control stops showing progress.
    /// With `alert`, the text is shown as a dialog instead of a toast.
    async fn acknowledge(
        &self,
        activation_id: &str,
        text: Option<&str>,
        alert: bool,
    ) -> Result<(), TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn admin(post: Option<bool>) -> MemberRole {
        MemberRole::Administrator {
            can_post_messages: post,
        }
    }

    #[test]
    fn test_group_admin_can_post() {
        assert!(admin(None).can_post());
    }

    #[test]
    fn test_channel_admin_post_flag_is_honoured() {
        assert!(!admin(Some(false)).can_post());
        assert!(admin(Some(true)).can_post());
    }

    #[test]
    fn test_non_admins_cannot_post() {
        for role in [
            MemberRole::Member,
            MemberRole::Restricted,
            MemberRole::Left,
            MemberRole::Banned,
        ] {
            assert!(!role.can_post(), "{:?} should not be able to post", role);
        }
        assert!(MemberRole::Creator.can_post());
    }
}
