use std::collections::HashSet;

use shared::models::Page;

use super::order::{OrderPolicy, Reconcilable};

/// Ordered, de-duplicated items of one subject plus the history cursor.
///
/// `apply_page` and `apply_live` are idempotent and commute: any interleaving
/// of the same operations yields the same items.
#[derive(Debug, Clone)]
pub struct ReconciledSequence<T: Reconcilable> {
    items: Vec<T>,
    ids: HashSet<T::Id>,
    policy: OrderPolicy,
    /// Next history page to request; `None` once the last page was seen.
    cursor: Option<u32>,
}

impl<T: Reconcilable> ReconciledSequence<T> {
    #[must_use]
    pub fn new(policy: OrderPolicy) -> Self {
        Self {
            items: Vec::new(),
            ids: HashSet::new(),
            policy,
            cursor: Some(0),
        }
    }

    #[must_use]
    pub const fn policy(&self) -> OrderPolicy {
        self.policy
    }

    #[must_use]
    pub const fn cursor(&self) -> Option<u32> {
        self.cursor
    }

    #[must_use]
    pub const fn has_more(&self) -> bool {
        self.cursor.is_some()
    }

    /// Read-only ordered projection.
    #[must_use]
    pub fn view(&self) -> &[T] {
        &self.items
    }

    /// First item under the policy; the top bid for ranked sequences.
    #[must_use]
    pub fn lead(&self) -> Option<&T> {
        self.items.first()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub fn contains(&self, id: &T::Id) -> bool {
        self.ids.contains(id)
    }

    /// Merges a history page and advances the cursor. Returns how many
    /// items were new.
    pub fn apply_page(&mut self, page: Page<T>) -> usize {
        self.cursor = match self.cursor {
            Some(current) if !page.last => Some(current.max(page.page.saturating_add(1))),
            _ => None,
        };
        page.content
            .into_iter()
            .filter(|item| self.merge(item.clone()) == Merge::Inserted)
            .count()
    }

    /// Merges one live item and returns whether the view changed. A known
    /// id only folds the item into the stored copy (see
    /// [`Reconcilable::absorb`]), which usually changes nothing.
    pub fn apply_live(&mut self, item: T) -> bool {
        self.merge(item) != Merge::Unchanged
    }

    fn merge(&mut self, item: T) -> Merge {
        let id = item.id();
        if self.ids.contains(&id) {
            let updated = self
                .position_of(&item, &id)
                .is_some_and(|index| self.items[index].absorb(&item));
            return if updated { Merge::Updated } else { Merge::Unchanged };
        }
        let policy = self.policy;
        let position = self
            .items
            .partition_point(|existing| policy.compare(existing, &item).is_lt());
        self.items.insert(position, item);
        self.ids.insert(id);
        Merge::Inserted
    }

    /// Index of the stored item with `id`. Copies of one item compare equal
    /// under the policy, so a binary search usually lands on it.
    fn position_of(&self, item: &T, id: &T::Id) -> Option<usize> {
        let policy = self.policy;
        match self
            .items
            .binary_search_by(|existing| policy.compare(existing, item))
        {
            Ok(index) if self.items[index].id() == *id => Some(index),
            _ => self.items.iter().position(|existing| existing.id() == *id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Merge {
    Inserted,
    Updated,
    Unchanged,
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::models::Timestamp;

    #[derive(Debug, Clone, PartialEq)]
    struct Item {
        id: u32,
        at: i64,
        amount: f64,
    }

    impl Reconcilable for Item {
        type Id = u32;

        fn id(&self) -> u32 {
            self.id
        }

        fn created_at(&self) -> Timestamp {
            Timestamp(chrono::DateTime::from_timestamp(self.at, 0).unwrap())
        }

        fn amount(&self) -> Option<f64> {
            Some(self.amount)
        }
    }

    fn item(id: u32, at: i64) -> Item {
        Item {
            id,
            at,
            amount: f64::from(id),
        }
    }

    fn page(number: u32, last: bool, items: Vec<Item>) -> Page<Item> {
        Page {
            size: 3,
            total_elements: 0,
            total_pages: 0,
            content: items,
            page: number,
            last,
        }
    }

    fn ids(sequence: &ReconciledSequence<Item>) -> Vec<u32> {
        sequence.view().iter().map(|item| item.id).collect()
    }

    #[derive(Debug, Clone)]
    enum Op {
        Page(Page<Item>),
        Live(Item),
    }

    fn apply(sequence: &mut ReconciledSequence<Item>, op: Op) {
        match op {
            Op::Page(page) => {
                sequence.apply_page(page);
            }
            Op::Live(item) => {
                sequence.apply_live(item);
            }
        }
    }

    fn permutations(len: usize) -> Vec<Vec<usize>> {
        if len == 0 {
            return vec![Vec::new()];
        }
        let mut result = Vec::new();
        for rest in permutations(len - 1) {
            for slot in 0..=rest.len() {
                let mut order = rest.clone();
                order.insert(slot, len - 1);
                result.push(order);
            }
        }
        result
    }

    #[test]
    fn history_newest_first_is_displayed_oldest_first() {
        let mut sequence = ReconciledSequence::new(OrderPolicy::Chronological);

        let inserted = sequence.apply_page(page(0, false, vec![item(30, 30), item(20, 20), item(10, 10)]));

        assert_eq!(inserted, 3);
        assert_eq!(ids(&sequence), vec![10, 20, 30]);
        assert_eq!(sequence.cursor(), Some(1));
    }

    #[test]
    fn last_page_exhausts_the_cursor() {
        let mut sequence = ReconciledSequence::new(OrderPolicy::Chronological);
        sequence.apply_page(page(0, false, vec![item(3, 3)]));
        sequence.apply_page(page(1, true, vec![item(1, 1)]));

        assert!(!sequence.has_more());
        assert_eq!(sequence.cursor(), None);

        // A stale page arriving late never revives the cursor.
        sequence.apply_page(page(0, false, vec![item(3, 3)]));
        assert_eq!(sequence.cursor(), None);
    }

    #[test]
    fn live_event_with_known_id_is_a_no_op() {
        let mut sequence = ReconciledSequence::new(OrderPolicy::Chronological);
        sequence.apply_page(page(0, true, vec![item(1, 1), item(2, 2)]));

        assert!(!sequence.apply_live(item(2, 2)));
        assert!(sequence.apply_live(item(3, 3)));
        assert!(!sequence.apply_live(item(3, 3)));
        assert_eq!(ids(&sequence), vec![1, 2, 3]);
    }

    #[test]
    fn applying_everything_twice_changes_nothing() {
        let ops = vec![
            Op::Page(page(0, false, vec![item(5, 50), item(4, 40)])),
            Op::Live(item(6, 60)),
            Op::Page(page(1, true, vec![item(4, 40), item(3, 30)])),
        ];
        let mut once = ReconciledSequence::new(OrderPolicy::Chronological);
        let mut twice = ReconciledSequence::new(OrderPolicy::Chronological);
        for op in ops.clone() {
            apply(&mut once, op);
        }
        for op in ops.iter().chain(ops.iter()).cloned() {
            apply(&mut twice, op);
        }

        assert_eq!(once.view(), twice.view());
        assert_eq!(once.cursor(), twice.cursor());
        assert_eq!(ids(&once), vec![3, 4, 5, 6]);
    }

    #[test]
    fn every_interleaving_yields_the_same_view() {
        for policy in [OrderPolicy::Chronological, OrderPolicy::RankedByAmount] {
            let ops = vec![
                Op::Page(page(0, false, vec![item(9, 90), item(8, 80), item(7, 70)])),
                Op::Page(page(1, true, vec![item(7, 70), item(6, 60), item(5, 50)])),
                Op::Live(item(10, 100)),
                Op::Live(item(8, 80)),
                // Same instant as 9; the id decides.
                Op::Live(item(11, 90)),
            ];

            let mut reference = ReconciledSequence::new(policy);
            for op in ops.clone() {
                apply(&mut reference, op);
            }

            for order in permutations(ops.len()) {
                let mut sequence = ReconciledSequence::new(policy);
                for index in order {
                    apply(&mut sequence, ops[index].clone());
                }
                assert_eq!(sequence.view(), reference.view(), "{policy:?}");
                assert_eq!(sequence.cursor(), None);
            }
            assert_eq!(reference.len(), 7);
        }
    }

    #[test]
    fn duplicate_rows_fold_flags_in_either_order() {
        use shared::models::LeaderboardEntry;

        let live = LeaderboardEntry {
            user_id: None,
            masked_user_name: "****ann".into(),
            amount: 120.5,
            blocked: false,
            created_at: Timestamp::parse("2025-01-02T10:00:00").unwrap(),
        };
        let history = LeaderboardEntry {
            blocked: true,
            ..live.clone()
        };
        let history_page = || Page::single(vec![history.clone()]);

        let mut history_first = ReconciledSequence::new(OrderPolicy::RankedByAmount);
        history_first.apply_page(history_page());
        assert!(!history_first.apply_live(live.clone()));

        let mut live_first = ReconciledSequence::new(OrderPolicy::RankedByAmount);
        assert!(live_first.apply_live(live.clone()));
        assert_eq!(live_first.apply_page(history_page()), 0);

        assert_eq!(history_first.view(), live_first.view());
        assert_eq!(live_first.len(), 1);
        assert!(live_first.view()[0].blocked);
    }

    #[test]
    fn ranked_lead_is_highest_amount() {
        let mut sequence = ReconciledSequence::new(OrderPolicy::RankedByAmount);
        sequence.apply_live(item(2, 1));
        sequence.apply_live(item(7, 2));
        sequence.apply_live(item(4, 3));

        assert_eq!(sequence.lead().map(|item| item.id), Some(7));
        assert_eq!(ids(&sequence), vec![7, 4, 2]);
    }
}
