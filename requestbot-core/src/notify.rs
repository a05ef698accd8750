//! Outcome delivery to the requester.
//!
//! Runs after a transition has been committed to the review message.
//! Nothing here can undo that transition: a failed notification is reported
//! to the reviewer and the new status stands.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::render;
use crate::ticket::{TicketAction, UserId};
use crate::transport::{ChatTransport, TransportError};

/// The requester could not be reached.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("requester {requester_id} could not be notified: {source}")]
pub struct NotificationFailed {
    pub requester_id: UserId,
    #[source]
    pub source: TransportError,
}

/// Result of notifying the requester.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationOutcome {
    Delivered,
    Failed(NotificationFailed),
}

impl NotificationOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered)
    }
}

pub struct NotificationFanOut {
    transport: Arc<dyn ChatTransport>,
}

impl NotificationFanOut {
    pub fn new(transport: Arc<dyn ChatTransport>) -> Self {
        Self { transport }
    }

    /// Tell the requester how their ticket was resolved, then acknowledge
    /// the reviewer's activation with the result.
    ///
    /// The acknowledgement is sent whatever the delivery outcome.
    pub async fn deliver(
        &self,
        activation_id: &str,
        requester_id: UserId,
        action: TicketAction,
        request_text: &str,
    ) -> NotificationOutcome {
        let message = render::outcome_message(action, request_text);

        let outcome = match self.transport.send_direct(requester_id, &message).await {
            Ok(()) => {
                info!("Notified requester {} of {}", requester_id, action);
                NotificationOutcome::Delivered
            }
            Err(source) => {
                warn!(
                    "Could not notify requester {} of {}: {}",
                    requester_id, action, source
                );
                NotificationOutcome::Failed(NotificationFailed {
                    requester_id,
                    source,
                })
            }
        };

        let (text, alert) = match &outcome {
            NotificationOutcome::Delivered => {
                (format!("Marked as {}. Requester notified.", action), false)
            }
            NotificationOutcome::Failed(failure) => (
                format!(
                    "⚠️ Marked as {}, but the requester could not be notified: {}",
                    action, failure.source
                ),
                true,
            ),
        };
        acknowledge(self.transport.as_ref(), activation_id, &text, alert).await;

        outcome
    }
}

/// Acknowledge an activation. Failures are only logged: the reviewer's
/// client gives up waiting on its own.
pub(crate) async fn acknowledge(
    transport: &dyn ChatTransport,
    activation_id: &str,
    text: &str,
    alert: bool,
) {
    if let Err(e) = transport
        .acknowledge(activation_id, Some(text), alert)
        .await
    {
        error!("Failed to acknowledge activation {}: {}", activation_id, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryTransport;

    const REQUESTER: UserId = UserId(11);

    #[tokio::test]
    async fn test_delivered_notification_acknowledges_quietly() {
        let transport = Arc::new(InMemoryTransport::new());
        let fan_out = NotificationFanOut::new(transport.clone());

        let outcome = fan_out
            .deliver("a-1", REQUESTER, TicketAction::Available, "Movie X 2020")
            .await;

        assert_eq!(outcome, NotificationOutcome::Delivered);
        let sent = transport.direct_messages();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, REQUESTER);
        assert!(sent[0].1.contains("already available"));

        let acks = transport.acknowledgements();
        assert_eq!(acks.len(), 1);
        assert_eq!(acks[0].activation_id, "a-1");
        assert!(!acks[0].alert);
    }

    #[tokio::test]
    async fn test_failed_notification_still_acknowledges_with_warning() {
        let transport = Arc::new(InMemoryTransport::new());
        transport.fail_direct_to(REQUESTER);
        let fan_out = NotificationFanOut::new(transport.clone());

        let outcome = fan_out
            .deliver("a-2", REQUESTER, TicketAction::Uploaded, "Movie X 2020")
            .await;

        assert!(!outcome.is_delivered());
        assert_eq!(transport.direct_attempts(REQUESTER), 1);

        let acks = transport.acknowledgements();
        assert_eq!(acks.len(), 1);
        assert!(acks[0].alert);
        let text = acks[0].text.as_deref().unwrap();
        assert!(text.contains("could not be notified"));
        assert!(text.contains("blocked"));
    }

    #[tokio::test]
    async fn test_failed_acknowledgement_does_not_change_outcome() {
        let transport = Arc::new(InMemoryTransport::new());
        transport.fail_acknowledgements(true);
        let fan_out = NotificationFanOut::new(transport.clone());

        let outcome = fan_out
            .deliver("a-3", REQUESTER, TicketAction::Received, "x")
            .await;

        assert!(outcome.is_delivered());
        assert!(transport.acknowledgements().is_empty());
    }
}
