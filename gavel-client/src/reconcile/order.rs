use std::{cmp::Ordering, fmt, hash::Hash};

use shared::models::{ChatMessage, LeaderboardEntry, ReceivedNotification, Timestamp};

/// An item that can live in a [`super::ReconciledSequence`].
pub trait Reconcilable: Clone + Send + Sync + 'static {
    /// Stable identity used for de-duplication and as the final tie-break.
    type Id: Eq + Hash + Ord + Clone + Send + Sync + fmt::Debug;

    fn id(&self) -> Self::Id;

    fn created_at(&self) -> Timestamp;

    /// Ranking amount; only consulted by [`OrderPolicy::RankedByAmount`].
    fn amount(&self) -> Option<f64> {
        None
    }

    /// Folds a later copy of the same item into `self`, returning whether
    /// anything changed. The fold must be commutative and must not touch the
    /// fields [`OrderPolicy::compare`] reads.
    fn absorb(&mut self, _duplicate: &Self) -> bool {
        false
    }
}

/// Sort order of a sequence. Both orders are total, so the merged result
/// does not depend on arrival order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderPolicy {
    /// Oldest first, ties broken by id.
    Chronological,
    /// Highest amount first, then the earlier bid, then id.
    RankedByAmount,
}

impl OrderPolicy {
    #[must_use]
    pub fn compare<T: Reconcilable>(self, a: &T, b: &T) -> Ordering {
        let by_time = || a.created_at().cmp(&b.created_at());
        let by_id = || a.id().cmp(&b.id());
        match self {
            Self::Chronological => by_time().then_with(by_id),
            Self::RankedByAmount => {
                let amount = |item: &T| item.amount().unwrap_or(f64::NEG_INFINITY);
                amount(b)
                    .total_cmp(&amount(a))
                    .then_with(by_time)
                    .then_with(by_id)
            }
        }
    }
}

impl Reconcilable for ChatMessage {
    type Id = i64;

    fn id(&self) -> i64 {
        self.id
    }

    fn created_at(&self) -> Timestamp {
        self.created_at
    }
}

impl Reconcilable for LeaderboardEntry {
    /// Bids carry no id on the wire; the masked bidder, amount and time
    /// identify one in history, ranking and live rows alike.
    type Id = (String, u64, Timestamp);

    fn id(&self) -> Self::Id {
        (
            self.masked_user_name.clone(),
            self.amount.to_bits(),
            self.created_at,
        )
    }

    fn created_at(&self) -> Timestamp {
        self.created_at
    }

    fn amount(&self) -> Option<f64> {
        Some(self.amount)
    }

    /// Only bid-history rows carry `blocked`; once any copy says so it sticks.
    fn absorb(&mut self, duplicate: &Self) -> bool {
        let before = (self.blocked, self.user_id);
        self.blocked |= duplicate.blocked;
        self.user_id = self.user_id.or(duplicate.user_id);
        before != (self.blocked, self.user_id)
    }
}

/// Identity of a received notification: the server's own fields when the
/// payload is timestamped, the arrival number otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NotificationKey {
    Stamped {
        kind: &'static str,
        product_id: Option<i64>,
        transaction_id: Option<i64>,
        at: Timestamp,
    },
    Arrival(u64),
}

/// The feed is ordered by arrival; a server replay of a stamped event is
/// recognised by its key.
impl Reconcilable for ReceivedNotification {
    type Id = NotificationKey;

    fn id(&self) -> NotificationKey {
        let notification = &self.notification;
        match notification.timestamp() {
            Some(at) => NotificationKey::Stamped {
                kind: notification.kind(),
                product_id: notification.product_id(),
                transaction_id: notification.transaction_id(),
                at,
            },
            None => NotificationKey::Arrival(self.sequence),
        }
    }

    fn created_at(&self) -> Timestamp {
        self.received_at
    }
}
