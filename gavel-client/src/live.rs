//! Live panes: one subject's history and push stream merged into a single
//! reconciled view.
//!
//! [`LiveHub`] opens panes. Each pane owns a stream subscription running on
//! its own task and a [`Reconciler`] that both the first history page and the
//! live frames are merged into. Opening a subject that already has a pane
//! cancels the older subscription first.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use shared::models::{
    AuctionClosed, ChatMessage, LatestBid, LeaderboardEntry, Page, ProductEvent,
    ReceivedNotification, Timestamp, UserNotification,
};
use tokio::{sync::watch, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    api::AuctionApi,
    error::{PipelineError, StreamError},
    reconcile::{LoadOutcome, OrderPolicy, PageSource, Reconcilable, Reconciler},
    stream::{EventStreamClient, Frame, ResponseMeta, StreamHandler, StreamOutcome},
    subscription::{ConnectionState, Subscription, SubscriptionRegistry},
};

/// What a pane is subscribed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subject {
    Chat(i64),
    Product(i64),
    User,
}

/// Opens live panes against one backend.
#[derive(Debug, Clone)]
pub struct LiveHub {
    api: AuctionApi,
    streams: EventStreamClient,
    registry: Arc<SubscriptionRegistry<Subject>>,
    page_size: u32,
}

impl LiveHub {
    #[must_use]
    pub fn new(api: AuctionApi, page_size: u32) -> Self {
        let pipeline = api.pipeline();
        let streams = EventStreamClient::new(
            pipeline.transport(),
            pipeline.session().clone(),
            pipeline.language(),
        );
        Self {
            api,
            streams,
            registry: Arc::new(SubscriptionRegistry::new()),
            page_size,
        }
    }

    #[must_use]
    pub const fn api(&self) -> &AuctionApi {
        &self.api
    }

    pub async fn state(&self, subject: Subject) -> ConnectionState {
        self.registry.state(&subject).await
    }

    /// Cancels every open subscription.
    pub async fn stop_all(&self) {
        self.registry.cancel_all().await;
    }

    /// Follows a transaction's chat, starting from its newest page.
    ///
    /// # Errors
    /// Fails when the credential cannot be refreshed or the first page
    /// cannot be loaded; the subscription is cancelled in that case.
    pub async fn open_chat(&self, transaction_id: i64) -> Result<ChatPane, PipelineError> {
        let reconciler = Arc::new(Reconciler::new(
            OrderPolicy::Chronological,
            Arc::new(self.api.chat_history(transaction_id)),
            self.page_size,
        ));
        let url = self.api.chat_stream_url(transaction_id);
        let core = self
            .start(Subject::Chat(transaction_id), url, reconciler, |reconciler, subscription| {
                ChatHandler {
                    reconciler,
                    subscription,
                }
            })
            .await?;
        core.load_first_page().await?;
        Ok(ChatPane { core })
    }

    /// Follows a product's leaderboard, starting from the top page of its
    /// bid ranking. The newest bids are folded in as well, since only they
    /// say which bidders are blocked.
    ///
    /// # Errors
    /// Same as [`LiveHub::open_chat`].
    pub async fn open_leaderboard(&self, product_id: i64) -> Result<LeaderboardPane, PipelineError> {
        let reconciler = Arc::new(Reconciler::new(
            OrderPolicy::RankedByAmount,
            Arc::new(self.api.bid_source(product_id)),
            self.page_size,
        ));
        let (status, _) = watch::channel(ProductStatus::default());
        let status = Arc::new(status);
        let url = self.api.product_stream_url(product_id);
        let core = self
            .start(Subject::Product(product_id), url, reconciler, {
                let status = Arc::clone(&status);
                move |reconciler, subscription| ProductHandler {
                    reconciler,
                    subscription,
                    status,
                }
            })
            .await?;
        core.load_first_page().await?;
        match self.api.bid_history(product_id).await {
            Ok(rows) => {
                let changed = core.reconciler.on_live_batch(rows);
                debug!(product_id, changed, "recent bids merged");
            }
            Err(err) => {
                warn!(product_id, error = %err, "recent bids unavailable; blocked bidders are not flagged");
            }
        }
        Ok(LeaderboardPane { core, status })
    }

    /// Follows the signed-in user's notifications. The feed has no history.
    ///
    /// # Errors
    /// Fails when the credential cannot be refreshed.
    pub async fn open_notifications(&self) -> Result<NotificationPane, PipelineError> {
        let reconciler = Arc::new(Reconciler::new(
            OrderPolicy::Chronological,
            Arc::new(NoHistory),
            self.page_size,
        ));
        let url = self.api.user_stream_url();
        let core = self
            .start(Subject::User, url, reconciler, |reconciler, subscription| {
                NotificationHandler {
                    reconciler,
                    subscription,
                    arrivals: 0,
                    last_arrival: None,
                }
            })
            .await?;
        Ok(NotificationPane { core })
    }

    async fn start<T, H, F>(
        &self,
        subject: Subject,
        url: Url,
        reconciler: Arc<Reconciler<T>>,
        handler: F,
    ) -> Result<PaneCore<T>, PipelineError>
    where
        T: Reconcilable,
        H: StreamHandler + 'static,
        F: FnOnce(Arc<Reconciler<T>>, Arc<Subscription>) -> H,
    {
        // The stream takes the bearer once, at connect time.
        self.api.pipeline().ensure_fresh().await?;

        let subscription = self.registry.subscribe(subject).await;
        let mut handler = handler(Arc::clone(&reconciler), Arc::clone(&subscription));
        let outcome = Arc::new(Mutex::new(None));
        let done = CancellationToken::new();

        let task = tokio::spawn({
            let streams = self.streams.clone();
            let registry = Arc::clone(&self.registry);
            let subscription = Arc::clone(&subscription);
            let outcome = Arc::clone(&outcome);
            let done = done.clone();
            async move {
                let token = subscription.cancellation_token();
                let result = streams.subscribe(url, &token, &mut handler).await;
                subscription.mark_closed();
                registry.release(&subject, &subscription).await;
                info!(?subject, ?result, "live subscription ended");
                *outcome.lock().unwrap_or_else(PoisonError::into_inner) = Some(result);
                done.cancel();
            }
        });

        Ok(PaneCore {
            subject,
            reconciler,
            subscription,
            outcome,
            done,
            task: Some(task),
        })
    }
}

/// State shared by every pane kind.
#[derive(Debug)]
struct PaneCore<T: Reconcilable> {
    subject: Subject,
    reconciler: Arc<Reconciler<T>>,
    subscription: Arc<Subscription>,
    outcome: Arc<Mutex<Option<StreamOutcome>>>,
    done: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl<T: Reconcilable> PaneCore<T> {
    async fn load_first_page(&self) -> Result<(), PipelineError> {
        match self.reconciler.load_older().await {
            Ok(outcome) => {
                debug!(subject = ?self.subject, ?outcome, "first page loaded");
                Ok(())
            }
            Err(err) => {
                warn!(subject = ?self.subject, error = %err, "first page failed; closing pane");
                self.subscription.cancel();
                Err(err)
            }
        }
    }

    fn outcome(&self) -> Option<StreamOutcome> {
        *self.outcome.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn finished(&self) -> impl Future<Output = ()> + Send + 'static {
        let done = self.done.clone();
        async move { done.cancelled().await }
    }

    async fn stop(mut self) {
        self.subscription.cancel();
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                warn!(subject = ?self.subject, error = %err, "live subscription task failed");
            }
        }
    }
}

impl<T: Reconcilable> Drop for PaneCore<T> {
    fn drop(&mut self) {
        self.subscription.cancel();
    }
}

macro_rules! pane_accessors {
    ($pane:ty, $item:ty) => {
        impl $pane {
            #[must_use]
            pub const fn subject(&self) -> Subject {
                self.core.subject
            }

            /// Snapshot of the reconciled view.
            #[must_use]
            pub fn view(&self) -> Vec<$item> {
                self.core.reconciler.view()
            }

            /// Notified with the full view after every merge.
            #[must_use]
            pub fn watch(&self) -> watch::Receiver<Vec<$item>> {
                self.core.reconciler.watch()
            }

            #[must_use]
            pub fn state(&self) -> ConnectionState {
                self.core.subscription.state()
            }

            /// How the stream ended, once it has.
            #[must_use]
            pub fn outcome(&self) -> Option<StreamOutcome> {
                self.core.outcome()
            }

            /// Resolves when the stream has ended for any reason.
            pub fn finished(&self) -> impl Future<Output = ()> + Send + 'static {
                self.core.finished()
            }

            /// Cancels the subscription, waits for its task, and drops the
            /// reconciled view.
            pub async fn stop(self) {
                self.core.stop().await;
            }
        }
    };
}

/// Chronological transcript of one transaction's chat.
#[derive(Debug)]
pub struct ChatPane {
    core: PaneCore<ChatMessage>,
}

pane_accessors!(ChatPane, ChatMessage);

impl ChatPane {
    /// Loads the next older page.
    ///
    /// # Errors
    /// Returns the fetch failure; the view is unchanged.
    pub async fn load_older(&self) -> Result<LoadOutcome, PipelineError> {
        self.core.reconciler.load_older().await
    }

    #[must_use]
    pub fn has_more(&self) -> bool {
        self.core.reconciler.has_more()
    }
}

/// Product-level push state outside the ranked entries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductStatus {
    pub latest_bid: Option<LatestBid>,
    pub closed: Option<AuctionClosed>,
}

/// Ranked bids on one product.
#[derive(Debug)]
pub struct LeaderboardPane {
    core: PaneCore<LeaderboardEntry>,
    status: Arc<watch::Sender<ProductStatus>>,
}

pane_accessors!(LeaderboardPane, LeaderboardEntry);

impl LeaderboardPane {
    /// Highest bid from a bidder who is not blocked.
    #[must_use]
    pub fn lead(&self) -> Option<LeaderboardEntry> {
        self.core
            .reconciler
            .view()
            .into_iter()
            .find(|entry| !entry.blocked)
    }

    /// Loads the next lower page of the ranking.
    ///
    /// # Errors
    /// Returns the fetch failure; the view is unchanged.
    pub async fn load_older(&self) -> Result<LoadOutcome, PipelineError> {
        self.core.reconciler.load_older().await
    }

    #[must_use]
    pub fn has_more(&self) -> bool {
        self.core.reconciler.has_more()
    }

    #[must_use]
    pub fn latest_bid(&self) -> Option<LatestBid> {
        self.status.borrow().latest_bid.clone()
    }

    #[must_use]
    pub fn closed(&self) -> Option<AuctionClosed> {
        self.status.borrow().closed.clone()
    }

    #[must_use]
    pub fn watch_status(&self) -> watch::Receiver<ProductStatus> {
        self.status.subscribe()
    }
}

/// The signed-in user's notifications in arrival order.
#[derive(Debug)]
pub struct NotificationPane {
    core: PaneCore<ReceivedNotification>,
}

pane_accessors!(NotificationPane, ReceivedNotification);

fn log_stream_error(subscription: &Subscription, error: &StreamError) {
    if !subscription.is_cancelled() {
        warn!(error = %error, "live stream failed; reopen the pane to reconnect");
    }
}

struct ChatHandler {
    reconciler: Arc<Reconciler<ChatMessage>>,
    subscription: Arc<Subscription>,
}

impl StreamHandler for ChatHandler {
    type Message = ChatMessage;

    fn on_open(&mut self, _meta: &ResponseMeta) {
        self.subscription.mark_open();
    }

    fn on_message(&mut self, message: ChatMessage, _frame: &Frame) {
        if !self.reconciler.on_live_event(message) {
            debug!("live chat message already known");
        }
    }

    fn on_error(&mut self, error: &StreamError) {
        log_stream_error(&self.subscription, error);
    }
}

struct ProductHandler {
    reconciler: Arc<Reconciler<LeaderboardEntry>>,
    subscription: Arc<Subscription>,
    status: Arc<watch::Sender<ProductStatus>>,
}

impl StreamHandler for ProductHandler {
    type Message = ProductEvent;

    fn on_open(&mut self, _meta: &ResponseMeta) {
        self.subscription.mark_open();
    }

    fn on_message(&mut self, message: ProductEvent, _frame: &Frame) {
        match message {
            ProductEvent::Leaderboard(update) => {
                let inserted = self.reconciler.on_live_batch(update.leaderboard);
                debug!(inserted, amount = update.latest_bid.amount, "leaderboard update");
                self.status
                    .send_modify(|status| status.latest_bid = Some(update.latest_bid));
            }
            ProductEvent::Closed(closed) => {
                info!(product_id = closed.product_id, "auction closed");
                self.status.send_modify(|status| status.closed = Some(closed));
            }
        }
    }

    fn on_error(&mut self, error: &StreamError) {
        log_stream_error(&self.subscription, error);
    }
}

struct NotificationHandler {
    reconciler: Arc<Reconciler<ReceivedNotification>>,
    subscription: Arc<Subscription>,
    arrivals: u64,
    last_arrival: Option<Timestamp>,
}

impl NotificationHandler {
    /// Numbers the notification and gives it an arrival time later than
    /// every earlier one, even if the wall clock stalls or steps back.
    fn stamp(&mut self, notification: UserNotification) -> ReceivedNotification {
        let now = Timestamp::now();
        let received_at = match self.last_arrival {
            Some(last) if now <= last => Timestamp(last.0 + chrono::Duration::nanoseconds(1)),
            _ => now,
        };
        self.last_arrival = Some(received_at);
        let sequence = self.arrivals;
        self.arrivals += 1;
        ReceivedNotification::new(sequence, received_at, notification)
    }
}

impl StreamHandler for NotificationHandler {
    type Message = UserNotification;

    fn on_open(&mut self, _meta: &ResponseMeta) {
        self.subscription.mark_open();
    }

    fn on_message(&mut self, message: UserNotification, _frame: &Frame) {
        let kind = message.kind();
        let received = self.stamp(message);
        if self.reconciler.on_live_event(received) {
            debug!(kind, "notification");
        } else {
            debug!(kind, "notification already received");
        }
    }

    fn on_error(&mut self, error: &StreamError) {
        log_stream_error(&self.subscription, error);
    }
}

/// History source for feeds that only ever grow from the stream.
struct NoHistory;

#[async_trait]
impl PageSource<ReceivedNotification> for NoHistory {
    async fn fetch_page(
        &self,
        page: u32,
        _size: u32,
    ) -> Result<Page<ReceivedNotification>, PipelineError> {
        Ok(Page {
            page,
            ..Page::single(Vec::new())
        })
    }
}
