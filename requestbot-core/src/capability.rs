//! Pre-flight permission check against the review chat.

use std::sync::Arc;

use tracing::{info, warn};

use crate::ticket::{ChatId, UserId};
use crate::transport::ChatTransport;

/// Result of one capability check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapabilityState {
    pub has_post_permission: bool,
}

/// Verifies that the bot may post to the review chat.
///
/// Nothing is cached: permissions can be revoked at any time, so every
/// submission asks again.
pub struct CapabilityGate {
    transport: Arc<dyn ChatTransport>,
    review_chat: ChatId,
    bot_id: UserId,
}

impl CapabilityGate {
    pub fn new(transport: Arc<dyn ChatTransport>, review_chat: ChatId, bot_id: UserId) -> Self {
        Self {
            transport,
            review_chat,
            bot_id,
        }
    }

    /// Query the bot's role. Any query failure counts as no permission.
    pub async fn check(&self) -> CapabilityState {
        let role = match self
            .transport
            .get_membership(self.review_chat, self.bot_id)
            .await
        {
            Ok(role) => role,
            Err(e) => {
                warn!(
                    "Membership lookup for bot {} in chat {} failed: {}",
                    self.bot_id, self.review_chat, e
                );
                return CapabilityState {
                    has_post_permission: false,
                };
            }
        };

        info!("Bot role in review chat {}: {:?}", self.review_chat, role);
        CapabilityState {
            has_post_permission: role.can_post(),
        }
    }

    pub async fn verify(&self) -> bool {
        self.check().await.has_post_permission
    }
}
