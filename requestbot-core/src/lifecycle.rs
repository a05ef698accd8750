//! Ticket lifecycle: reviewer activations move a ticket from `Submitted` to
//! one of the terminal statuses.
//!
//! There is no ticket store. A transition re-renders the review message from
//! the activated token and strips its controls in a single edit; once the
//! controls are gone nobody can activate the ticket again. That makes a
//! transition at-most-once by convention rather than by protocol: it relies
//! on the chat service applying edits to one message in order.
//!
//! Within one process a claim table tightens this. Concurrent
//! activations of one surface are rejected while the first edit is in
//! flight, and late activations from clients still showing stale controls
//! are rejected for recently resolved surfaces.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{info, warn};

use crate::notify::{acknowledge, NotificationFanOut, NotificationOutcome};
use crate::render;
use crate::ticket::{AlreadyResolved, SurfaceRef, TicketStatus, UserId};
use crate::token::{self, MalformedToken};
use crate::transport::{Activation, ChatTransport, TransportError};

/// Resolved surfaces remembered by default.
pub(crate) const DEFAULT_RESOLVED_CAPACITY: usize = 4096;

/// Why an activation did not commit a transition.
///
/// In every case the review message is left as it was.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActivationError {
    #[error("malformed token: {0}")]
    MalformedToken(#[from] MalformedToken),
    #[error("user {activator_id} is not an authorized reviewer")]
    Unauthorized { activator_id: UserId },
    #[error("a transition of {surface} is already in progress")]
    TransitionInProgress { surface: SurfaceRef },
    #[error(transparent)]
    AlreadyResolved(#[from] AlreadyResolved),
    #[error("rendering the transition failed: {0}")]
    EditFailed(#[source] TransportError),
}

impl ActivationError {
    /// Alert text shown to the reviewer.
    pub fn reviewer_message(&self) -> String {
        match self {
            Self::MalformedToken(_) => {
                "⚠️ This control is invalid. Nothing was changed.".to_string()
            }
            Self::Unauthorized { .. } => "⛔ You are not allowed to resolve requests.".to_string(),
            Self::TransitionInProgress { .. } => {
                "⏳ Another reviewer is resolving this request right now.".to_string()
            }
            Self::AlreadyResolved(AlreadyResolved { current }) => {
                format!("This request was already marked as {}.", current)
            }
            Self::EditFailed(e) => format!(
                "⚠️ The ticket could not be updated ({}). Nothing was changed; please try again.",
                e
            ),
        }
    }
}

/// A committed transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivationOutcome {
    pub status: TicketStatus,
    pub notification: NotificationOutcome,
}

/// State of a claim on a surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Claim {
    /// An edit is in flight.
    InProgress,
    /// The surface was resolved by this process.
    Resolved(TicketStatus),
}

/// A surface could not be claimed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ClaimConflict {
    InProgress,
    Resolved(TicketStatus),
}

#[derive(Default)]
struct ClaimTableInner {
    claims: HashMap<SurfaceRef, Claim>,
    resolved_order: VecDeque<SurfaceRef>,
}

/// In-memory, bounded, per-process claims on review surfaces.
pub(crate) struct ClaimTable {
    inner: Mutex<ClaimTableInner>,
    resolved_capacity: usize,
}

impl ClaimTable {
    pub fn new(resolved_capacity: usize) -> Self {
        Self {
            inner: Mutex::new(ClaimTableInner::default()),
            resolved_capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, ClaimTableInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Claim a surface for one transition.
    pub fn begin(&self, surface: SurfaceRef) -> Result<ClaimGuard<'_>, ClaimConflict> {
        let mut inner = self.lock();
        match inner.claims.get(&surface) {
            Some(Claim::InProgress) => Err(ClaimConflict::InProgress),
            Some(Claim::Resolved(status)) => Err(ClaimConflict::Resolved(*status)),
            None => {
                inner.claims.insert(surface, Claim::InProgress);
                Ok(ClaimGuard {
                    table: self,
                    surface,
                    committed: false,
                })
            }
        }
    }

    fn resolve(&self, surface: SurfaceRef, status: TicketStatus) {
        let mut inner = self.lock();
        inner.claims.insert(surface, Claim::Resolved(status));
        inner.resolved_order.push_back(surface);
        while inner.resolved_order.len() > self.resolved_capacity {
            if let Some(evicted) = inner.resolved_order.pop_front() {
                inner.claims.remove(&evicted);
            }
        }
    }

    fn release(&self, surface: &SurfaceRef) {
        let mut inner = self.lock();
        if inner.claims.get(surface) == Some(&Claim::InProgress) {
            inner.claims.remove(surface);
        }
    }
}

impl Default for ClaimTable {
    fn default() -> Self {
        Self::new(DEFAULT_RESOLVED_CAPACITY)
    }
}

/// An in-progress claim. Dropping it without [`ClaimGuard::commit`] frees the
/// surface for another attempt.
pub(crate) struct ClaimGuard<'a> {
    table: &'a ClaimTable,
    surface: SurfaceRef,
    committed: bool,
}

impl ClaimGuard<'_> {
    pub fn commit(mut self, status: TicketStatus) {
        self.committed = true;
        self.table.resolve(self.surface, status);
    }
}

impl Drop for ClaimGuard<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.table.release(&self.surface);
        }
    }
}

pub struct TicketLifecycle {
    transport: Arc<dyn ChatTransport>,
    fan_out: NotificationFanOut,
    reviewers: HashSet<UserId>,
    claims: ClaimTable,
}

impl TicketLifecycle {
    /// An empty `reviewers` set lets anyone who can see the controls act.
    pub fn new(transport: Arc<dyn ChatTransport>, reviewers: HashSet<UserId>) -> Self {
        Self::with_claims(transport, reviewers, ClaimTable::default())
    }

    pub(crate) fn with_claims(
        transport: Arc<dyn ChatTransport>,
        reviewers: HashSet<UserId>,
        claims: ClaimTable,
    ) -> Self {
        Self {
            fan_out: NotificationFanOut::new(transport.clone()),
            transport,
            reviewers,
            claims,
        }
    }

    /// Apply a reviewer's activation.
    ///
    /// The activation is acknowledged exactly once on every path.
    pub async fn on_activation(
        &self,
        activation: &Activation,
    ) -> Result<ActivationOutcome, ActivationError> {
        let token = match token::decode(&activation.token) {
            Ok(token) => token,
            Err(e) => return self.reject(activation, e.into()).await,
        };

        if !self.reviewers.is_empty() && !self.reviewers.contains(&activation.activator_id) {
            let error = ActivationError::Unauthorized {
                activator_id: activation.activator_id,
            };
            return self.reject(activation, error).await;
        }

        let guard = match self.claims.begin(activation.surface) {
            Ok(guard) => guard,
            Err(ClaimConflict::InProgress) => {
                let error = ActivationError::TransitionInProgress {
                    surface: activation.surface,
                };
                return self.reject(activation, error).await;
            }
            Err(ClaimConflict::Resolved(current)) => {
                return self
                    .reject(activation, AlreadyResolved { current }.into())
                    .await;
            }
        };

        // A control is only rendered while the ticket is Submitted
        let status = match TicketStatus::Submitted.apply(token.action) {
            Ok(status) => status,
            Err(e) => return self.reject(activation, e.into()).await,
        };
        let text = render::resolved_ticket_text(token.requester_id, &token.request_text, status);

        if let Err(e) = self
            .transport
            .edit_message(&activation.surface, &text, None)
            .await
        {
            drop(guard);
            return self.reject(activation, ActivationError::EditFailed(e)).await;
        }
        guard.commit(status);

        info!(
            "Ticket at {} marked {} by {}",
            activation.surface, status, activation.activator_id
        );

        let notification = self
            .fan_out
            .deliver(
                &activation.activation_id,
                token.requester_id,
                token.action,
                &token.request_text,
            )
            .await;

        Ok(ActivationOutcome {
            status,
            notification,
        })
    }

    async fn reject(
        &self,
        activation: &Activation,
        error: ActivationError,
    ) -> Result<ActivationOutcome, ActivationError> {
        warn!(
            "Activation {} on {} by {} rejected: {}",
            activation.activation_id, activation.surface, activation.activator_id, error
        );
        acknowledge(
            self.transport.as_ref(),
            &activation.activation_id,
            &error.reviewer_message(),
            true,
        )
        .await;
        Err(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryTransport;
    use crate::pipeline::ticket_controls;
    use crate::ticket::{ChatId, TicketAction};

    const CHAT: ChatId = ChatId(-100);
    const REQUESTER: UserId = UserId(1);
    const REVIEWER: UserId = UserId(50);

    async fn posted(transport: &InMemoryTransport, text: &str) -> SurfaceRef {
        transport
            .post_message(
                CHAT,
                &render::ticket_text(REQUESTER, text),
                &ticket_controls(REQUESTER, text),
            )
            .await
            .unwrap()
    }

    fn lifecycle(transport: &Arc<InMemoryTransport>) -> TicketLifecycle {
        TicketLifecycle::new(transport.clone(), HashSet::new())
    }

    #[tokio::test]
    async fn test_activation_resolves_and_strips_controls() {
        let transport = Arc::new(InMemoryTransport::new());
        let surface = posted(&transport, "Movie X 2020").await;
        let activation = transport
            .activation(&surface, TicketAction::Uploaded, REVIEWER)
            .unwrap();

        let outcome = lifecycle(&transport)
            .on_activation(&activation)
            .await
            .unwrap();

        assert_eq!(outcome.status, TicketStatus::Uploaded);
        assert!(outcome.notification.is_delivered());
        let message = transport.message(&surface).unwrap();
        assert_eq!(
            message.text,
            render::resolved_ticket_text(REQUESTER, "Movie X 2020", TicketStatus::Uploaded)
        );
        assert!(message.controls.is_empty());
        assert_eq!(transport.acknowledgements().len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_token_leaves_surface_unchanged() {
        let transport = Arc::new(InMemoryTransport::new());
        let surface = posted(&transport, "Movie X 2020").await;
        let before = transport.message(&surface).unwrap();
        let activation = Activation {
            activation_id: "bad".to_string(),
            surface,
            activator_id: REVIEWER,
            token: "Uploaded|1|Movie|X".to_string(),
        };

        let result = lifecycle(&transport).on_activation(&activation).await;

        assert!(matches!(result, Err(ActivationError::MalformedToken(_))));
        assert_eq!(transport.message(&surface).unwrap(), before);
        assert_eq!(transport.edit_attempts(), 0);
        assert!(transport.direct_messages().is_empty());
        let acks = transport.acknowledgements();
        assert_eq!(acks.len(), 1);
        assert!(acks[0].alert);
    }

    #[tokio::test]
    async fn test_failed_edit_keeps_ticket_submitted_and_retryable() {
        let transport = Arc::new(InMemoryTransport::new());
        let surface = posted(&transport, "Movie X 2020").await;
        let lifecycle = lifecycle(&transport);
        transport.fail_edits(true);

        let activation = transport
            .activation(&surface, TicketAction::Available, REVIEWER)
            .unwrap();
        let result = lifecycle.on_activation(&activation).await;

        assert!(matches!(result, Err(ActivationError::EditFailed(_))));
        let message = transport.message(&surface).unwrap();
        assert_eq!(message.controls.len(), 4);
        assert!(!message.text.contains("Status:"));
        assert!(transport.direct_messages().is_empty());

        transport.fail_edits(false);
        let retry = transport
            .activation(&surface, TicketAction::Available, REVIEWER)
            .unwrap();
        let outcome = lifecycle.on_activation(&retry).await.unwrap();
        assert_eq!(outcome.status, TicketStatus::Available);
    }

    #[tokio::test]
    async fn test_unlisted_reviewer_is_rejected() {
        let transport = Arc::new(InMemoryTransport::new());
        let surface = posted(&transport, "Movie X 2020").await;
        let lifecycle = TicketLifecycle::new(transport.clone(), HashSet::from([REVIEWER]));

        let activation = transport
            .activation(&surface, TicketAction::Rejected, UserId(666))
            .unwrap();
        let result = lifecycle.on_activation(&activation).await;

        assert_eq!(
            result,
            Err(ActivationError::Unauthorized {
                activator_id: UserId(666)
            })
        );
        assert_eq!(transport.edit_attempts(), 0);
    }

    #[tokio::test]
    async fn test_stale_activation_after_commit_is_rejected() {
        let transport = Arc::new(InMemoryTransport::new());
        let surface = posted(&transport, "Movie X 2020").await;
        let lifecycle = lifecycle(&transport);

        // Both taken before the first commit, as two clients would
        let first = transport
            .activation(&surface, TicketAction::Uploaded, REVIEWER)
            .unwrap();
        let stale = transport
            .activation(&surface, TicketAction::Rejected, UserId(51))
            .unwrap();

        lifecycle.on_activation(&first).await.unwrap();
        let result = lifecycle.on_activation(&stale).await;

        assert_eq!(
            result,
            Err(ActivationError::AlreadyResolved(AlreadyResolved {
                current: TicketStatus::Uploaded
            }))
        );
        assert_eq!(transport.edit_attempts(), 1);
        assert!(transport
            .message(&surface)
            .unwrap()
            .text
            .ends_with("Status: Uploaded"));
        assert_eq!(transport.direct_attempts(REQUESTER), 1);
    }

    #[tokio::test]
    async fn test_replay_beyond_resolved_capacity_reaches_transport() {
        let transport = Arc::new(InMemoryTransport::new());
        let lifecycle =
            TicketLifecycle::with_claims(transport.clone(), HashSet::new(), ClaimTable::new(1));
        let older = posted(&transport, "Older").await;
        let newer = posted(&transport, "Newer").await;
        let older_click = transport
            .activation(&older, TicketAction::Received, REVIEWER)
            .unwrap();
        let newer_click = transport
            .activation(&newer, TicketAction::Received, REVIEWER)
            .unwrap();
        lifecycle.on_activation(&older_click).await.unwrap();
        lifecycle.on_activation(&newer_click).await.unwrap();

        // Still remembered: refused without an edit
        let replay = lifecycle.on_activation(&newer_click).await;
        assert!(matches!(replay, Err(ActivationError::AlreadyResolved(_))));
        assert_eq!(transport.edit_attempts(), 2);

        // Evicted: only the stripped message guards it now
        let _ = lifecycle.on_activation(&older_click).await;
        assert_eq!(transport.edit_attempts(), 3);
    }

    #[test]
    fn test_claim_in_progress_conflicts_until_dropped() {
        let table = ClaimTable::default();
        let surface = SurfaceRef::new(1, 1);

        let guard = table.begin(surface).unwrap();
        assert_eq!(table.begin(surface).err(), Some(ClaimConflict::InProgress));
        drop(guard);
        assert!(table.begin(surface).is_ok());
    }

    #[test]
    fn test_resolved_claims_are_bounded() {
        let table = ClaimTable::new(2);
        for id in 1..=3 {
            table
                .begin(SurfaceRef::new(1, id))
                .unwrap()
                .commit(TicketStatus::Received);
        }

        // Oldest resolution evicted, newer ones remembered
        assert!(table.begin(SurfaceRef::new(1, 1)).is_ok());
        assert_eq!(
            table.begin(SurfaceRef::new(1, 3)).err(),
            Some(ClaimConflict::Resolved(TicketStatus::Received))
        );
    }
}
