//! # Feature: Correlation Waiter
//!
//! Suspends a conversation step until an inbound event matching a predicate
//! arrives, or a deadline passes. Used by the setup wizard and by every
//! free-text prompt of the admin flows.
//!
//! - **Version**: 1.0.0
//! - **Since**: 0.2.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 1.0.0: Registry of pending waiters with background expiry sweep

use crate::error::TicketError;
use crate::platform::InboundEvent;
use log::debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;

type Predicate = Box<dyn Fn(&InboundEvent) -> bool + Send + Sync>;

/// Identifies one logical conversation: an actor in a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConversationKey {
    pub user_id: u64,
    pub channel_id: u64,
}

impl ConversationKey {
    pub fn new(user_id: u64, channel_id: u64) -> Self {
        ConversationKey { user_id, channel_id }
    }
}

struct Pending {
    id: u64,
    conversation: ConversationKey,
    predicate: Predicate,
    sender: oneshot::Sender<InboundEvent>,
    deadline: Instant,
}

struct Registry {
    pending: Mutex<Vec<Pending>>,
    next_id: AtomicU64,
}

impl Registry {
    fn lock(&self) -> MutexGuard<'_, Vec<Pending>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn remove(&self, id: u64) {
        self.lock().retain(|p| p.id != id);
    }
}

/// Removes a waiter's entry when its future completes or is dropped
struct PendingGuard {
    registry: Arc<Registry>,
    id: u64,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.registry.remove(self.id);
    }
}

/// Registry of suspended conversation steps
#[derive(Clone)]
pub struct CorrelationWaiter {
    registry: Arc<Registry>,
}

impl Default for CorrelationWaiter {
    fn default() -> Self {
        Self::new()
    }
}

impl CorrelationWaiter {
    pub fn new() -> Self {
        CorrelationWaiter {
            registry: Arc::new(Registry {
                pending: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Wait for the first event accepted by `predicate`.
    ///
    /// A conversation has at most one pending waiter: registering a new one
    /// cancels the previous, which then resolves as `TimedOut`.
    pub async fn wait_for<P>(
        &self,
        conversation: ConversationKey,
        timeout: Duration,
        predicate: P,
    ) -> Result<InboundEvent, TicketError>
    where
        P: Fn(&InboundEvent) -> bool + Send + Sync + 'static,
    {
        let (sender, receiver) = oneshot::channel();
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        let deadline = Instant::now() + timeout;

        {
            let mut pending = self.registry.lock();
            if let Some(pos) = pending.iter().position(|p| p.conversation == conversation) {
                let replaced = pending.remove(pos);
                debug!(
                    "Replacing pending waiter {} for user {} in channel {}",
                    replaced.id, conversation.user_id, conversation.channel_id
                );
            }
            pending.push(Pending {
                id,
                conversation,
                predicate: Box::new(predicate),
                sender,
                deadline,
            });
        }

        let _guard = PendingGuard {
            registry: self.registry.clone(),
            id,
        };

        match tokio::time::timeout_at(deadline, receiver).await {
            Ok(Ok(event)) => Ok(event),
            Ok(Err(_)) | Err(_) => {
                debug!(
                    "Waiter {id} for user {} in channel {} timed out",
                    conversation.user_id, conversation.channel_id
                );
                Err(TicketError::TimedOut)
            }
        }
    }

    /// Offer an inbound event to the pending waiters.
    ///
    /// The first live waiter (in registration order) whose predicate holds
    /// receives the event and `None` is returned. Otherwise the event is
    /// handed back untouched for other consumers.
    pub fn offer(&self, event: InboundEvent) -> Option<InboundEvent> {
        let mut pending = self.registry.lock();
        let now = Instant::now();
        let mut event = event;

        loop {
            let Some(pos) = pending
                .iter()
                .position(|p| p.deadline > now && !p.sender.is_closed() && (p.predicate)(&event))
            else {
                return Some(event);
            };

            let entry = pending.remove(pos);
            match entry.sender.send(event) {
                Ok(()) => {
                    debug!("Event delivered to waiter {}", entry.id);
                    return None;
                }
                // Receiver went away between the check and the send
                Err(returned) => event = returned,
            }
        }
    }

    /// Drop every waiter whose deadline has passed. Returns how many were removed.
    pub fn sweep_expired(&self) -> usize {
        let mut pending = self.registry.lock();
        let now = Instant::now();
        let before = pending.len();
        pending.retain(|p| p.deadline > now && !p.sender.is_closed());
        before - pending.len()
    }

    pub fn pending_count(&self) -> usize {
        self.registry.lock().len()
    }

    /// Periodically sweep expired waiters in the background
    pub fn spawn_sweeper(&self, interval: Duration) -> JoinHandle<()> {
        let waiter = self.clone();
        tokio::spawn(async move {
            debug!("Waiter sweeper started");
            loop {
                tokio::time::sleep(interval).await;
                let swept = waiter.sweep_expired();
                if swept > 0 {
                    debug!("Swept {swept} expired waiter(s)");
                }
            }
        })
    }
}

// ============================================================================
// Common predicates
// ============================================================================

/// Any plain message by `user_id` in `channel_id`
pub fn message_from(user_id: u64, channel_id: u64) -> impl Fn(&InboundEvent) -> bool + Send + Sync {
    move |event| {
        matches!(event, InboundEvent::Message(m) if m.author_id == user_id && m.channel_id == channel_id)
    }
}

/// A message by `user_id` in `channel_id` that mentions at least one role
pub fn role_mention_from(user_id: u64, channel_id: u64) -> impl Fn(&InboundEvent) -> bool + Send + Sync {
    move |event| {
        matches!(event, InboundEvent::Message(m)
            if m.author_id == user_id && m.channel_id == channel_id && !m.role_mentions.is_empty())
    }
}

/// A message by `user_id` in `channel_id` that mentions at least one channel
pub fn channel_mention_from(user_id: u64, channel_id: u64) -> impl Fn(&InboundEvent) -> bool + Send + Sync {
    move |event| {
        matches!(event, InboundEvent::Message(m)
            if m.author_id == user_id && m.channel_id == channel_id && !m.channel_mentions.is_empty())
    }
}

/// A press by `user_id` on one of the given controls
pub fn press_by(user_id: u64, custom_ids: Vec<String>) -> impl Fn(&InboundEvent) -> bool + Send + Sync {
    move |event| {
        matches!(event, InboundEvent::Component(c)
            if c.user_id == user_id && custom_ids.iter().any(|id| *id == c.custom_id))
    }
}
