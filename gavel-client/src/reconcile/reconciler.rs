use std::{
    fmt,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
};

use async_trait::async_trait;
use shared::models::Page;
use tokio::sync::watch;
use tracing::debug;

use super::{
    order::{OrderPolicy, Reconcilable},
    sequence::ReconciledSequence,
};
use crate::error::PipelineError;

/// Backward-paginated history for one subject.
#[async_trait]
pub trait PageSource<T>: Send + Sync {
    async fn fetch_page(&self, page: u32, size: u32) -> Result<Page<T>, PipelineError>;
}

/// Result of [`Reconciler::load_older`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded { inserted: usize },
    /// History is exhausted; nothing was fetched.
    Exhausted,
    /// Another load is still running; nothing was fetched.
    InFlight,
}

/// Drives one [`ReconciledSequence`]: fetches pages, merges live items, and
/// publishes the ordered view after every merge.
pub struct Reconciler<T: Reconcilable> {
    sequence: Mutex<ReconciledSequence<T>>,
    source: Arc<dyn PageSource<T>>,
    page_size: u32,
    loading: AtomicBool,
    updates: watch::Sender<Vec<T>>,
}

impl<T: Reconcilable + fmt::Debug> fmt::Debug for Reconciler<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reconciler")
            .field("sequence", &*self.lock())
            .field("page_size", &self.page_size)
            .finish_non_exhaustive()
    }
}

/// Clears the loading flag however the load ends, including cancellation.
struct LoadingGuard<'a>(&'a AtomicBool);

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl<T: Reconcilable> Reconciler<T> {
    #[must_use]
    pub fn new(policy: OrderPolicy, source: Arc<dyn PageSource<T>>, page_size: u32) -> Self {
        let (updates, _) = watch::channel(Vec::new());
        Self {
            sequence: Mutex::new(ReconciledSequence::new(policy)),
            source,
            page_size,
            loading: AtomicBool::new(false),
            updates,
        }
    }

    fn lock(&self) -> MutexGuard<'_, ReconciledSequence<T>> {
        self.sequence.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, sequence: &ReconciledSequence<T>) {
        self.updates.send_replace(sequence.view().to_vec());
    }

    /// Receiver notified with the full ordered view after every merge.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<Vec<T>> {
        self.updates.subscribe()
    }

    /// Snapshot of the ordered view.
    #[must_use]
    pub fn view(&self) -> Vec<T> {
        self.lock().view().to_vec()
    }

    #[must_use]
    pub fn lead(&self) -> Option<T> {
        self.lock().lead().cloned()
    }

    #[must_use]
    pub fn has_more(&self) -> bool {
        self.lock().has_more()
    }

    /// Fetches the page at the cursor and merges it.
    ///
    /// Live items merged while the fetch is in flight are kept; the page is
    /// merged around them.
    ///
    /// # Errors
    /// Returns the fetch failure; the sequence and cursor are left untouched.
    pub async fn load_older(&self) -> Result<LoadOutcome, PipelineError> {
        let Some(page) = self.lock().cursor() else {
            return Ok(LoadOutcome::Exhausted);
        };
        if self.loading.swap(true, Ordering::SeqCst) {
            return Ok(LoadOutcome::InFlight);
        }
        let _guard = LoadingGuard(&self.loading);

        debug!(page, size = self.page_size, "loading history page");
        let fetched = self.source.fetch_page(page, self.page_size).await?;

        let mut sequence = self.lock();
        let inserted = sequence.apply_page(fetched);
        self.publish(&sequence);
        Ok(LoadOutcome::Loaded { inserted })
    }

    /// Merges one live item and returns whether the view changed; a known
    /// id changes nothing unless the copy adds to it.
    pub fn on_live_event(&self, item: T) -> bool {
        let mut sequence = self.lock();
        let changed = sequence.apply_live(item);
        if changed {
            self.publish(&sequence);
        }
        changed
    }

    /// Merges several live items under one lock and one notification.
    /// Returns how many of them changed the view.
    pub fn on_live_batch(&self, items: impl IntoIterator<Item = T>) -> usize {
        let mut sequence = self.lock();
        let changed = items
            .into_iter()
            .filter(|item| sequence.apply_live(item.clone()))
            .count();
        if changed > 0 {
            self.publish(&sequence);
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::models::{ChatMessage, Timestamp};
    use tokio::sync::Notify;

    fn chat(id: i64, minute: u32) -> ChatMessage {
        ChatMessage {
            id,
            transaction_id: 1,
            sender_id: 1,
            sender_name: None,
            message: format!("m{id}"),
            message_type: None,
            is_read: None,
            attachment_url: None,
            created_at: Timestamp::parse(&format!("2025-01-01T10:{minute:02}:00")).unwrap(),
            is_own_message: None,
        }
    }

    /// Two pages of three, newest first; page 0 waits for `gate` when set.
    struct TwoPages {
        gate: Option<Arc<Notify>>,
    }

    #[async_trait]
    impl PageSource<ChatMessage> for TwoPages {
        async fn fetch_page(&self, page: u32, size: u32) -> Result<Page<ChatMessage>, PipelineError> {
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            let content = match page {
                0 => vec![chat(6, 6), chat(5, 5), chat(4, 4)],
                _ => vec![chat(3, 3), chat(2, 2), chat(1, 1)],
            };
            Ok(Page {
                content,
                page,
                size,
                total_elements: 6,
                total_pages: 2,
                last: page >= 1,
            })
        }
    }

    fn ids(view: &[ChatMessage]) -> Vec<i64> {
        view.iter().map(|message| message.id).collect()
    }

    #[tokio::test]
    async fn pages_until_exhausted() {
        let reconciler = Reconciler::new(
            OrderPolicy::Chronological,
            Arc::new(TwoPages { gate: None }),
            3,
        );

        assert_eq!(
            reconciler.load_older().await.unwrap(),
            LoadOutcome::Loaded { inserted: 3 }
        );
        assert_eq!(
            reconciler.load_older().await.unwrap(),
            LoadOutcome::Loaded { inserted: 3 }
        );
        assert_eq!(reconciler.load_older().await.unwrap(), LoadOutcome::Exhausted);
        assert_eq!(ids(&reconciler.view()), vec![1, 2, 3, 4, 5, 6]);
    }

    #[tokio::test]
    async fn live_event_during_load_is_kept_and_deduplicated() {
        let gate = Arc::new(Notify::new());
        let reconciler = Arc::new(Reconciler::new(
            OrderPolicy::Chronological,
            Arc::new(TwoPages {
                gate: Some(Arc::clone(&gate)),
            }),
            3,
        ));
        let mut updates = reconciler.watch();

        let load = tokio::spawn({
            let reconciler = Arc::clone(&reconciler);
            async move { reconciler.load_older().await }
        });
        tokio::task::yield_now().await;

        assert_eq!(reconciler.load_older().await.unwrap(), LoadOutcome::InFlight);
        assert!(reconciler.on_live_event(chat(7, 7)));
        assert!(reconciler.on_live_event(chat(6, 6)));
        assert!(updates.has_changed().unwrap());
        assert_eq!(ids(&updates.borrow_and_update()), vec![6, 7]);

        gate.notify_one();
        let outcome = load.await.unwrap().unwrap();

        assert_eq!(outcome, LoadOutcome::Loaded { inserted: 2 });
        assert_eq!(ids(&reconciler.view()), vec![4, 5, 6, 7]);
        assert_eq!(ids(&updates.borrow()), vec![4, 5, 6, 7]);
    }

    #[tokio::test]
    async fn batch_notifies_once_and_skips_known_items() {
        let reconciler = Reconciler::new(
            OrderPolicy::Chronological,
            Arc::new(TwoPages { gate: None }),
            3,
        );
        let mut updates = reconciler.watch();

        let inserted = reconciler.on_live_batch(vec![chat(2, 2), chat(1, 1), chat(2, 2)]);

        assert_eq!(inserted, 2);
        assert!(updates.has_changed().unwrap());
        updates.mark_unchanged();
        assert_eq!(reconciler.on_live_batch(vec![chat(1, 1)]), 0);
        assert!(!updates.has_changed().unwrap());
        assert_eq!(reconciler.lead().map(|message| message.id), Some(1));
    }
}
