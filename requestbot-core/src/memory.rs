//! In-memory implementation of `ChatTransport`.
//!
//! Messages live in a `HashMap` behind a mutex and are lost on drop. Every
//! operation can be made to fail, and every call is recorded, which is what
//! the engine's tests assert against.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::ticket::{ChatId, MessageId, SurfaceRef, TicketAction, UserId};
use crate::token;
use crate::transport::{Activation, ChatTransport, Control, MemberRole, TransportError};

/// A message as currently rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    pub text: String,
    pub controls: Vec<Control>,
}

/// A recorded acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Acknowledgement {
    pub activation_id: String,
    pub text: Option<String>,
    pub alert: bool,
}

#[derive(Default)]
struct Failures {
    post: bool,
    edit: bool,
    membership: bool,
    acknowledge: bool,
    direct_to: HashSet<UserId>,
}

#[derive(Default)]
struct Inner {
    next_message_id: i64,
    next_activation_id: u64,
    messages: HashMap<SurfaceRef, RenderedMessage>,
    memberships: HashMap<(ChatId, UserId), MemberRole>,
    post_attempts: usize,
    edit_attempts: usize,
    direct_attempts: Vec<UserId>,
    direct_messages: Vec<(UserId, String)>,
    acknowledgements: Vec<Acknowledgement>,
    failures: Failures,
}

/// In-memory chat transport.
#[derive(Default)]
pub struct InMemoryTransport {
    inner: Mutex<Inner>,
}

fn injected(operation: &str) -> TransportError {
    TransportError::Request(format!("injected {} failure", operation))
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panicking test thread must not hide the state from the others
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_membership(&self, chat: ChatId, user: UserId, role: MemberRole) {
        self.lock().memberships.insert((chat, user), role);
    }

    pub fn fail_posts(&self, fail: bool) {
        self.lock().failures.post = fail;
    }

    pub fn fail_edits(&self, fail: bool) {
        self.lock().failures.edit = fail;
    }

    pub fn fail_membership(&self, fail: bool) {
        self.lock().failures.membership = fail;
    }

    pub fn fail_acknowledgements(&self, fail: bool) {
        self.lock().failures.acknowledge = fail;
    }

    pub fn fail_direct_to(&self, user: UserId) {
        self.lock().failures.direct_to.insert(user);
    }

    pub fn message(&self, surface: &SurfaceRef) -> Option<RenderedMessage> {
        self.lock().messages.get(surface).cloned()
    }

    /// All messages currently in a chat, oldest first.
    pub fn messages_in(&self, chat: ChatId) -> Vec<(SurfaceRef, RenderedMessage)> {
        let inner = self.lock();
        let mut messages: Vec<_> = inner
            .messages
            .iter()
            .filter(|(surface, _)| surface.chat_id == chat)
            .map(|(surface, message)| (*surface, message.clone()))
            .collect();
        messages.sort_by_key(|(surface, _)| surface.message_id.0);
        messages
    }

    pub fn post_attempts(&self) -> usize {
        self.lock().post_attempts
    }

    pub fn edit_attempts(&self) -> usize {
        self.lock().edit_attempts
    }

    /// Successfully delivered direct messages.
    pub fn direct_messages(&self) -> Vec<(UserId, String)> {
        self.lock().direct_messages.clone()
    }

    /// Delivery attempts to one user, successful or not.
    pub fn direct_attempts(&self, user: UserId) -> usize {
        self.lock()
            .direct_attempts
            .iter()
            .filter(|u| **u == user)
            .count()
    }

    pub fn acknowledgements(&self) -> Vec<Acknowledgement> {
        self.lock().acknowledgements.clone()
    }

    /// Click the control for `action` on a surface.
    ///
    /// Returns `None` if the surface does not exist or no longer shows that
    /// control, just as a real client cannot click a stripped button.
    pub fn activation(
        &self,
        surface: &SurfaceRef,
        action: TicketAction,
        activator_id: UserId,
    ) -> Option<Activation> {
        let mut inner = self.lock();
        let control = inner.messages.get(surface)?.controls.iter().find(|c| {
            token::decode(&c.token)
                .map(|t| t.action == action)
                .unwrap_or(false)
        })?;
        let token = control.token.clone();

        inner.next_activation_id += 1;
        Some(Activation {
            activation_id: format!("activation-{}", inner.next_activation_id),
            surface: *surface,
            activator_id,
            token,
        })
    }
}

#[async_trait]
impl ChatTransport for InMemoryTransport {
    async fn post_message(
        &self,
        chat: ChatId,
        text: &str,
        controls: &[Control],
    ) -> Result<SurfaceRef, TransportError> {
        let mut inner = self.lock();
        inner.post_attempts += 1;
        if inner.failures.post {
            return Err(injected("post"));
        }

        inner.next_message_id += 1;
        let surface = SurfaceRef {
            chat_id: chat,
            message_id: MessageId(inner.next_message_id),
        };
        inner.messages.insert(
            surface,
            RenderedMessage {
                text: text.to_string(),
                controls: controls.to_vec(),
            },
        );
        Ok(surface)
    }

    async fn edit_message(
        &self,
        surface: &SurfaceRef,
        text: &str,
        controls: Option<&[Control]>,
    ) -> Result<(), TransportError> {
        let mut inner = self.lock();
        inner.edit_attempts += 1;
        if inner.failures.edit {
            return Err(injected("edit"));
        }

        let message = inner
            .messages
            .get_mut(surface)
            .ok_or_else(|| TransportError::Rejected {
                code: 400,
                description: "message to edit not found".to_string(),
            })?;
        message.text = text.to_string();
        message.controls = controls.map(<[Control]>::to_vec).unwrap_or_default();
        Ok(())
    }

    async fn send_direct(&self, user: UserId, text: &str) -> Result<(), TransportError> {
        let mut inner = self.lock();
        inner.direct_attempts.push(user);
        if inner.failures.direct_to.contains(&user) {
            return Err(TransportError::Rejected {
                code: 403,
                description: "bot was blocked by the user".to_string(),
            });
        }
        inner.direct_messages.push((user, text.to_string()));
        Ok(())
    }

    async fn get_membership(
        &self,
        chat: ChatId,
        user: UserId,
    ) -> Result<MemberRole, TransportError> {
        let inner = self.lock();
        if inner.failures.membership {
            return Err(injected("membership"));
        }
        Ok(inner
            .memberships
            .get(&(chat, user))
            .copied()
            .unwrap_or(MemberRole::Left))
    }

    async fn acknowledge(
        &self,
        activation_id: &str,
        text: Option<&str>,
        alert: bool,
    ) -> Result<(), TransportError> {
        let mut inner = self.lock();
        if inner.failures.acknowledge {
            return Err(injected("acknowledge"));
        }
        inner.acknowledgements.push(Acknowledgement {
            activation_id: activation_id.to_string(),
            text: text.map(str::to_string),
            alert,
        });
        Ok(())
    }
}
