//! Last-resort escalation to a human operator.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{error, info};

use crate::ticket::UserId;
use crate::transport::ChatTransport;

/// Why the pipeline gave up on a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackKind {
    /// The bot lacks permissions on the review chat.
    ConfigurationError,
    /// Posting the ticket failed.
    DeliveryFailure,
}

impl fmt::Display for FallbackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigurationError => write!(f, "configuration error"),
            Self::DeliveryFailure => write!(f, "delivery failure"),
        }
    }
}

/// Operator-facing report of a failed submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackReport {
    pub kind: FallbackKind,
    pub requester_id: UserId,
    pub request_text: String,
    pub detail: String,
    pub occurred_at: DateTime<Utc>,
}

impl FallbackReport {
    pub fn new(
        kind: FallbackKind,
        requester_id: UserId,
        request_text: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            requester_id,
            request_text: request_text.into(),
            detail: detail.into(),
            occurred_at: Utc::now(),
        }
    }

    pub fn render(&self) -> String {
        format!(
            "⚠️ Request bot {}\n\n\
            Requester: {}\n\
            Request: {}\n\
            Detail: {}\n\
            At: {}",
            self.kind,
            self.requester_id,
            self.request_text,
            self.detail,
            self.occurred_at.format("%Y-%m-%d %H:%M:%S UTC")
        )
    }
}

/// Sends reports to the fixed operator.
///
/// This is the terminal failure sink: if the operator cannot be reached the
/// report is logged and dropped.
pub struct FallbackNotifier {
    transport: Arc<dyn ChatTransport>,
    operator_id: UserId,
}

impl FallbackNotifier {
    pub fn new(transport: Arc<dyn ChatTransport>, operator_id: UserId) -> Self {
        Self {
            transport,
            operator_id,
        }
    }

    /// Deliver a report. Returns whether the operator received it.
    pub async fn escalate(&self, report: &FallbackReport) -> bool {
        error!(
            "Escalating {} for requester {}: {}",
            report.kind, report.requester_id, report.detail
        );

        match self
            .transport
            .send_direct(self.operator_id, &report.render())
            .await
        {
            Ok(()) => {
                info!("Fallback report delivered to operator {}", self.operator_id);
                true
            }
            Err(e) => {
                error!(
                    "Failed to deliver fallback report to operator {}: {} (report: {:?})",
                    self.operator_id, e, report
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryTransport;

    const OPERATOR: UserId = UserId(1000);

    fn report() -> FallbackReport {
        FallbackReport::new(
            FallbackKind::DeliveryFailure,
            UserId(5),
            "Movie X 2020",
            "request failed: connection reset",
        )
    }

    #[test]
    fn test_render_contains_all_fields() {
        let rendered = report().render();
        assert!(rendered.contains("delivery failure"));
        assert!(rendered.contains("Requester: 5"));
        assert!(rendered.contains("Request: Movie X 2020"));
        assert!(rendered.contains("connection reset"));
    }

    #[tokio::test]
    async fn test_escalate_sends_to_operator() {
        let transport = Arc::new(InMemoryTransport::new());
        let notifier = FallbackNotifier::new(transport.clone(), OPERATOR);

        assert!(notifier.escalate(&report()).await);

        let sent = transport.direct_messages();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, OPERATOR);
        assert!(sent[0].1.contains("Movie X 2020"));
    }

    #[tokio::test]
    async fn test_escalate_failure_is_swallowed() {
        let transport = Arc::new(InMemoryTransport::new());
        transport.fail_direct_to(OPERATOR);
        let notifier = FallbackNotifier::new(transport.clone(), OPERATOR);

        assert!(!notifier.escalate(&report()).await);
        assert_eq!(transport.direct_attempts(OPERATOR), 1);
    }
}
