//! Engine facade wiring the components to one transport and configuration.

use std::collections::HashSet;
use std::sync::Arc;

use crate::capability::CapabilityGate;
use crate::fallback::FallbackNotifier;
use crate::lifecycle::{ActivationError, ActivationOutcome, TicketLifecycle};
use crate::pipeline::{SubmissionError, SubmissionPipeline};
use crate::ticket::{ChatId, Ticket, UserId};
use crate::transport::{Activation, ChatTransport};

/// Deployment-specific settings, fixed for the engine's lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Chat where tickets are posted and resolved.
    pub review_chat: ChatId,
    /// Recipient of fallback reports.
    pub operator_id: UserId,
    /// The bot's own account, used for the capability check.
    pub bot_id: UserId,
    /// Users allowed to resolve tickets. Empty allows everyone in the
    /// review chat.
    pub reviewers: HashSet<UserId>,
}

pub struct TicketEngine {
    pipeline: SubmissionPipeline,
    lifecycle: TicketLifecycle,
}

impl TicketEngine {
    pub fn new(config: EngineConfig, transport: Arc<dyn ChatTransport>) -> Self {
        let gate = CapabilityGate::new(transport.clone(), config.review_chat, config.bot_id);
        let fallback = Arc::new(FallbackNotifier::new(transport.clone(), config.operator_id));
        let pipeline = SubmissionPipeline::new(transport.clone(), gate, fallback, config.review_chat);
        let lifecycle = TicketLifecycle::new(transport, config.reviewers);

        Self {
            pipeline,
            lifecycle,
        }
    }

    pub async fn submit_request(
        &self,
        requester_id: UserId,
        request_text: &str,
    ) -> Result<Ticket, SubmissionError> {
        self.pipeline.submit(requester_id, request_text).await
    }

    pub async fn on_activation(
        &self,
        activation: &Activation,
    ) -> Result<ActivationOutcome, ActivationError> {
        self.lifecycle.on_activation(activation).await
    }
}
