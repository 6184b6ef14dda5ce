//! Per-subject stream subscriptions.
//!
//! A consumer holds at most one live subscription per subject. Subscribing
//! again cancels the previous subscription before the new one is registered,
//! so reconnects never accumulate connections.

use std::{
    collections::HashMap,
    fmt,
    hash::Hash,
    sync::{
        Arc,
        atomic::{AtomicU8, Ordering},
    },
};

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
}

const STATE_CONNECTING: u8 = 0;
const STATE_OPEN: u8 = 1;
const STATE_CLOSED: u8 = 2;

/// One subscription's cancellation handle and connection state.
#[derive(Debug)]
pub struct Subscription {
    token: CancellationToken,
    state: AtomicU8,
}

impl Subscription {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            token: CancellationToken::new(),
            state: AtomicU8::new(STATE_CONNECTING),
        })
    }

    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Moves `connecting` to `open`. Returns false if it was already closed.
    pub fn mark_open(&self) -> bool {
        self.state
            .compare_exchange(
                STATE_CONNECTING,
                STATE_OPEN,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
    }

    pub fn mark_closed(&self) {
        self.state.store(STATE_CLOSED, Ordering::SeqCst);
    }

    /// Closes the subscription and fires its token. Idempotent.
    pub fn cancel(&self) {
        self.mark_closed();
        self.token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        match self.state.load(Ordering::SeqCst) {
            STATE_CONNECTING => ConnectionState::Connecting,
            STATE_OPEN => ConnectionState::Open,
            _ => ConnectionState::Closed,
        }
    }
}

/// Subscriptions keyed by subject.
pub struct SubscriptionRegistry<K> {
    subscriptions: RwLock<HashMap<K, Arc<Subscription>>>,
}

impl<K: fmt::Debug> fmt::Debug for SubscriptionRegistry<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionRegistry").finish_non_exhaustive()
    }
}

impl<K> Default for SubscriptionRegistry<K> {
    fn default() -> Self {
        Self {
            subscriptions: RwLock::new(HashMap::new()),
        }
    }
}

impl<K> SubscriptionRegistry<K>
where
    K: Eq + Hash + Clone + fmt::Debug,
{
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a fresh subscription for `subject`, cancelling any previous one first.
    pub async fn subscribe(&self, subject: K) -> Arc<Subscription> {
        let subscription = Subscription::new();
        let previous = {
            let mut guard = self.subscriptions.write().await;
            guard.insert(subject.clone(), Arc::clone(&subscription))
        };
        if let Some(previous) = previous {
            debug!(?subject, "replacing existing subscription");
            previous.cancel();
        }
        subscription
    }

    /// Cancels and forgets the subscription for `subject`.
    /// Returns false when there was none.
    pub async fn unsubscribe(&self, subject: &K) -> bool {
        let removed = {
            let mut guard = self.subscriptions.write().await;
            guard.remove(subject)
        };
        removed.is_some_and(|subscription| {
            subscription.cancel();
            true
        })
    }

    /// Forgets `subscription` if it is still the one registered for `subject`.
    pub async fn release(&self, subject: &K, subscription: &Arc<Subscription>) {
        let mut guard = self.subscriptions.write().await;
        if guard
            .get(subject)
            .is_some_and(|current| Arc::ptr_eq(current, subscription))
        {
            guard.remove(subject);
        }
    }

    pub async fn state(&self, subject: &K) -> ConnectionState {
        let guard = self.subscriptions.read().await;
        guard
            .get(subject)
            .map_or(ConnectionState::Closed, |subscription| subscription.state())
    }

    pub async fn cancel_all(&self) {
        let drained: Vec<_> = {
            let mut guard = self.subscriptions.write().await;
            guard.drain().map(|(_, subscription)| subscription).collect()
        };
        for subscription in drained {
            subscription.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resubscribing_cancels_the_previous_subscription() {
        let registry = SubscriptionRegistry::new();
        let first = registry.subscribe(7_i64).await;
        let second = registry.subscribe(7_i64).await;

        assert!(first.is_cancelled());
        assert_eq!(first.state(), ConnectionState::Closed);
        assert!(!second.is_cancelled());
        assert_eq!(registry.state(&7).await, ConnectionState::Connecting);
    }

    #[tokio::test]
    async fn subjects_are_independent() {
        let registry = SubscriptionRegistry::new();
        let chat = registry.subscribe("chat-1".to_string()).await;
        let _bids = registry.subscribe("bids-1".to_string()).await;

        assert!(chat.mark_open());
        assert_eq!(registry.state(&"chat-1".to_string()).await, ConnectionState::Open);
        assert!(!chat.is_cancelled());
    }

    #[tokio::test]
    async fn unsubscribe_is_idempotent() {
        let registry = SubscriptionRegistry::new();
        let subscription = registry.subscribe(1_i64).await;

        assert!(registry.unsubscribe(&1).await);
        assert!(!registry.unsubscribe(&1).await);
        assert!(subscription.is_cancelled());
        assert!(!subscription.mark_open());
        assert_eq!(registry.state(&1).await, ConnectionState::Closed);
    }

    #[tokio::test]
    async fn release_leaves_a_newer_subscription_alone() {
        let registry = SubscriptionRegistry::new();
        let old = registry.subscribe(3_i64).await;
        let new = registry.subscribe(3_i64).await;

        registry.release(&3, &old).await;
        assert_eq!(registry.state(&3).await, ConnectionState::Connecting);

        registry.release(&3, &new).await;
        assert_eq!(registry.state(&3).await, ConnectionState::Closed);
    }

    #[tokio::test]
    async fn cancel_all_closes_everything() {
        let registry = SubscriptionRegistry::new();
        let a = registry.subscribe(1_i64).await;
        let b = registry.subscribe(2_i64).await;

        registry.cancel_all().await;

        assert!(a.is_cancelled() && b.is_cancelled());
    }
}
