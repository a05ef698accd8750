//! Submission pipeline: gate, render, post, escalate on failure.

use std::sync::Arc;

use tracing::{info, warn};

use crate::capability::CapabilityGate;
use crate::fallback::{FallbackKind, FallbackNotifier, FallbackReport};
use crate::render;
use crate::ticket::{ChatId, Ticket, TicketAction, UserId};
use crate::token;
use crate::transport::{ChatTransport, Control, TransportError};

/// Reply to the requester after a successful submission.
pub const SUBMITTED_REPLY: &str =
    "✅ Your request has been submitted. You will be notified when a reviewer acts on it.";

/// Why a submission produced no ticket.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmissionError {
    #[error("bot lacks permission to post to the review chat")]
    CapabilityDenied,
    #[error("posting the ticket failed: {0}")]
    DeliveryFailed(#[source] TransportError),
}

impl SubmissionError {
    /// Generic text for the requester. Never includes the cause.
    pub fn requester_reply(&self) -> &'static str {
        match self {
            Self::CapabilityDenied => {
                "⚠️ The request system is having an issue right now. The operator has been informed."
            }
            Self::DeliveryFailed(_) => {
                "⚠️ Your request could not be delivered. Please try again in a moment."
            }
        }
    }
}

/// The four reviewer controls for a ticket, each carrying its own token.
pub fn ticket_controls(requester_id: UserId, request_text: &str) -> Vec<Control> {
    TicketAction::ALL
        .iter()
        .map(|action| Control {
            label: action.label().to_string(),
            token: token::encode(*action, requester_id, request_text),
        })
        .collect()
}

pub struct SubmissionPipeline {
    transport: Arc<dyn ChatTransport>,
    gate: CapabilityGate,
    fallback: Arc<FallbackNotifier>,
    review_chat: ChatId,
}

impl SubmissionPipeline {
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        gate: CapabilityGate,
        fallback: Arc<FallbackNotifier>,
        review_chat: ChatId,
    ) -> Self {
        Self {
            transport,
            gate,
            fallback,
            review_chat,
        }
    }

    /// Post a new ticket to the review chat.
    ///
    /// `request_text` must already be non-empty. Identical submissions are
    /// not deduplicated; each call posts its own ticket. No retry happens
    /// here: a failed post leaves nothing behind to retry against.
    pub async fn submit(
        &self,
        requester_id: UserId,
        request_text: &str,
    ) -> Result<Ticket, SubmissionError> {
        if !self.gate.verify().await {
            warn!(
                "Refusing submission from {}: bot cannot post to review chat {}",
                requester_id, self.review_chat
            );
            let report = FallbackReport::new(
                FallbackKind::ConfigurationError,
                requester_id,
                request_text,
                format!(
                    "bot lacks admin/post permission in review chat {}",
                    self.review_chat
                ),
            );
            self.fallback.escalate(&report).await;
            return Err(SubmissionError::CapabilityDenied);
        }

        let text = render::ticket_text(requester_id, request_text);
        let controls = ticket_controls(requester_id, request_text);

        match self
            .transport
            .post_message(self.review_chat, &text, &controls)
            .await
        {
            Ok(surface) => {
                info!(
                    "Posted ticket for requester {} at {}",
                    requester_id, surface
                );
                Ok(Ticket::submitted(requester_id, request_text, surface))
            }
            Err(e) => {
                warn!(
                    "Posting ticket for requester {} failed: {}",
                    requester_id, e
                );
                let report = FallbackReport::new(
                    FallbackKind::DeliveryFailure,
                    requester_id,
                    request_text,
                    format!("posting to review chat {} failed: {}", self.review_chat, e),
                );
                self.fallback.escalate(&report).await;
                Err(SubmissionError::DeliveryFailed(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryTransport;
    use crate::ticket::TicketStatus;
    use crate::transport::MemberRole;

    const CHAT: ChatId = ChatId(-100);
    const BOT: UserId = UserId(7);
    const OPERATOR: UserId = UserId(1000);
    const REQUESTER: UserId = UserId(1);

    fn pipeline(transport: &Arc<InMemoryTransport>) -> SubmissionPipeline {
        SubmissionPipeline::new(
            transport.clone(),
            CapabilityGate::new(transport.clone(), CHAT, BOT),
            Arc::new(FallbackNotifier::new(transport.clone(), OPERATOR)),
            CHAT,
        )
    }

    fn admin_transport() -> Arc<InMemoryTransport> {
        let transport = Arc::new(InMemoryTransport::new());
        transport.set_membership(CHAT, BOT, MemberRole::Creator);
        transport
    }

    #[test]
    fn test_controls_cover_every_action_in_order() {
        let controls = ticket_controls(REQUESTER, "Movie X 2020");
        let actions: Vec<_> = controls
            .iter()
            .map(|c| token::decode(&c.token).unwrap().action)
            .collect();
        assert_eq!(actions, TicketAction::ALL.to_vec());
        assert_eq!(controls[1].label, TicketAction::Uploaded.label());
    }

    #[tokio::test]
    async fn test_successful_submission_posts_ticket() {
        let transport = admin_transport();

        let ticket = pipeline(&transport)
            .submit(REQUESTER, "Movie X 2020")
            .await
            .unwrap();

        assert_eq!(ticket.status(), TicketStatus::Submitted);
        assert_eq!(ticket.requester_id(), REQUESTER);
        assert_eq!(ticket.request_text(), "Movie X 2020");

        let message = transport.message(&ticket.surface_ref()).unwrap();
        assert!(message.text.contains("Movie X 2020"));
        assert_eq!(message.controls.len(), 4);
        assert!(transport.direct_messages().is_empty());
    }

    #[tokio::test]
    async fn test_capability_denied_escalates_without_posting() {
        let transport = Arc::new(InMemoryTransport::new());
        transport.set_membership(CHAT, BOT, MemberRole::Member);

        let result = pipeline(&transport).submit(REQUESTER, "Movie X 2020").await;

        assert_eq!(result, Err(SubmissionError::CapabilityDenied));
        assert_eq!(transport.post_attempts(), 0);
        assert_eq!(transport.direct_attempts(OPERATOR), 1);
        let (_, report) = &transport.direct_messages()[0];
        assert!(report.contains("configuration error"));
    }

    #[tokio::test]
    async fn test_post_failure_escalates_with_payload() {
        let transport = admin_transport();
        transport.fail_posts(true);

        let result = pipeline(&transport).submit(REQUESTER, "Movie X 2020").await;

        assert!(matches!(result, Err(SubmissionError::DeliveryFailed(_))));
        assert_eq!(transport.post_attempts(), 1);
        assert!(transport.messages_in(CHAT).is_empty());
        assert_eq!(transport.direct_attempts(OPERATOR), 1);
        let (_, report) = &transport.direct_messages()[0];
        assert!(report.contains("Movie X 2020"));
        assert!(report.contains("injected post failure"));
    }

    #[tokio::test]
    async fn test_identical_submissions_create_independent_tickets() {
        let transport = admin_transport();
        let pipeline = pipeline(&transport);

        let first = pipeline.submit(REQUESTER, "same").await.unwrap();
        let second = pipeline.submit(REQUESTER, "same").await.unwrap();

        assert_ne!(first.surface_ref(), second.surface_ref());
        assert_eq!(transport.messages_in(CHAT).len(), 2);
    }

    #[test]
    fn test_requester_replies_hide_the_cause() {
        let error = SubmissionError::DeliveryFailed(TransportError::Request(
            "dns error: secret.internal".to_string(),
        ));
        assert!(!error.requester_reply().contains("secret.internal"));
        assert!(!SubmissionError::CapabilityDenied
            .requester_reply()
            .contains("permission"));
    }
}
