use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, info, instrument, warn};

use crate::cache::LocalMessageCache;
use crate::capabilities::{KeyValueStore, RemoteLog};
use crate::config::{ConfigError, RetryPolicy, SyncConfig};
use crate::connectivity::{ConnectivityMonitor, Transition};
use crate::error::{ErrorKind, NetworkError, Notice};
use crate::model::{Snapshot, UserId};
use crate::stream::RemoteMessageStream;
use crate::view::{ChatViewModel, SyncMode};

const NOTICE_CAPACITY: usize = 32;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncState {
    Disconnected,
    Live { generation: u64 },
}

/// Everything the coordinator reacts to. Transport callbacks and retry
/// timers only ever enqueue these.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    ConnectivityChanged {
        online: bool,
    },
    Delivery {
        generation: u64,
        result: Result<Snapshot, NetworkError>,
    },
    RetrySubscribe {
        generation: u64,
        attempt: u32,
    },
}

impl SyncEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ConnectivityChanged { .. } => "connectivity_changed",
            Self::Delivery { .. } => "delivery",
            Self::RetrySubscribe { .. } => "retry_subscribe",
        }
    }
}

/// Decides whether the published message list is driven by the remote log
/// or by the local cache, and keeps the cache up to date while live.
///
/// All state changes happen inside [`SyncCoordinator::handle`], one event at a
/// time. A generation counter is bumped whenever a subscription is opened or
/// torn down; deliveries and retries tagged with any other generation are
/// dropped.
pub struct SyncCoordinator<R: RemoteLog + 'static, S: KeyValueStore> {
    retry: RetryPolicy,
    stream: RemoteMessageStream<R>,
    cache: LocalMessageCache<S>,
    monitor: ConnectivityMonitor,
    state: SyncState,
    generation: u64,
    /// Whether the current live period has accepted a snapshot yet.
    live_accepted: bool,
    published: watch::Sender<Snapshot>,
    notices: broadcast::Sender<Notice>,
    events_tx: mpsc::UnboundedSender<SyncEvent>,
    events_rx: mpsc::UnboundedReceiver<SyncEvent>,
}

impl<R: RemoteLog + 'static, S: KeyValueStore> SyncCoordinator<R, S> {
    pub fn new(config: &SyncConfig, log: Arc<R>, storage: Arc<S>) -> Result<Self, ConfigError> {
        config.validate()?;
        let cache = LocalMessageCache::new(storage, config.cache_key.as_str())
            .map_err(|e| ConfigError::Invalid(format!("cache_key: {e}")))?;
        let (published, _) = watch::channel(Snapshot::empty());
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        Ok(Self {
            retry: config.retry.clone(),
            stream: RemoteMessageStream::new(log, config.collection.as_str()),
            cache,
            monitor: ConnectivityMonitor::new(),
            state: SyncState::Disconnected,
            generation: 0,
            live_accepted: false,
            published,
            notices,
            events_tx,
            events_rx,
        })
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn current_messages(&self) -> Snapshot {
        self.published.borrow().clone()
    }

    /// Change notifications for the published list.
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.published.subscribe()
    }

    pub fn notices(&self) -> broadcast::Receiver<Notice> {
        self.notices.subscribe()
    }

    /// Handle for feeding events from outside the loop, e.g. a platform
    /// reachability callback.
    pub fn sender(&self) -> mpsc::UnboundedSender<SyncEvent> {
        self.events_tx.clone()
    }

    pub fn is_subscribed(&self) -> bool {
        self.stream.is_active()
    }

    pub fn view(&self, me: &UserId) -> ChatViewModel {
        let mode = match self.state {
            SyncState::Live { .. } => SyncMode::Live,
            SyncState::Disconnected => SyncMode::Offline,
        };
        ChatViewModel::project(
            &self.published.borrow(),
            me,
            self.monitor.is_online().unwrap_or(false),
            mode,
        )
    }

    /// Consumes connectivity observations and queued deliveries until the
    /// connectivity source closes.
    pub async fn run(&mut self, mut connectivity: mpsc::Receiver<bool>) {
        info!("sync loop started");
        loop {
            let event = tokio::select! {
                observed = connectivity.recv() => match observed {
                    Some(online) => SyncEvent::ConnectivityChanged { online },
                    None => break,
                },
                Some(event) = self.events_rx.recv() => event,
            };
            self.handle(event).await;
        }
        info!("connectivity source closed, sync loop stopped");
    }

    /// Handles every event already queued, including ones queued while
    /// draining. Returns how many were handled.
    pub async fn process_pending(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.events_rx.try_recv() {
            self.handle(event).await;
            handled += 1;
        }
        handled
    }

    #[instrument(skip(self, event), fields(event = event.name(), generation = self.generation))]
    pub async fn handle(&mut self, event: SyncEvent) {
        match event {
            SyncEvent::ConnectivityChanged { online } => match self.monitor.observe(online) {
                Some(Transition::Initial { online: true }) | Some(Transition::Restored) => {
                    self.enter_live().await
                }
                Some(Transition::Initial { online: false }) => self.enter_disconnected().await,
                Some(Transition::Lost) => {
                    self.notify(Notice::ConnectionLost);
                    self.enter_disconnected().await;
                }
                None => debug!(online, "connectivity unchanged"),
            },

            SyncEvent::Delivery { generation, result } => {
                if !self.is_current(generation) {
                    debug!(stale = generation, "discarding stale delivery");
                    return;
                }
                match result {
                    Ok(snapshot) => self.accept(snapshot).await,
                    Err(e) => {
                        warn!(error = %e, "live subscription failed");
                        self.notify(Notice::failure(ErrorKind::Network, &e));
                        if let Some(handle) = self.stream.active().cloned() {
                            self.stream.cancel(&handle).await;
                        }
                        self.fall_back_if_unsynced().await;
                        self.schedule_retry(1);
                    }
                }
            }

            SyncEvent::RetrySubscribe {
                generation,
                attempt,
            } => {
                if !self.is_current(generation) || self.stream.is_active() {
                    debug!(stale = generation, attempt, "discarding retry");
                    return;
                }
                info!(attempt, "retrying subscription");
                self.bump_live();
                self.open_subscription(attempt + 1).await;
            }
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        self.state == SyncState::Live { generation }
    }

    fn bump_live(&mut self) {
        self.generation += 1;
        self.state = SyncState::Live {
            generation: self.generation,
        };
    }

    async fn enter_live(&mut self) {
        self.bump_live();
        self.live_accepted = false;
        info!(generation = self.generation, "entering live mode");
        self.open_subscription(1).await;
    }

    /// `next_attempt` is the retry number scheduled if this attempt fails.
    async fn open_subscription(&mut self, next_attempt: u32) {
        let generation = self.generation;
        let events = self.events_tx.clone();
        let opened = self
            .stream
            .subscribe(move |result: Result<Snapshot, NetworkError>| {
                // Closed only once the coordinator is gone.
                let _ = events.send(SyncEvent::Delivery { generation, result });
            })
            .await;

        match opened {
            Ok(handle) => debug!(generation, seq = handle.seq(), "subscription open"),
            Err(e) => {
                warn!(error = %e, generation, "subscription could not be established");
                self.notify(Notice::failure(ErrorKind::Network, &e));
                self.fall_back_if_unsynced().await;
                self.schedule_retry(next_attempt);
            }
        }
    }

    fn schedule_retry(&self, attempt: u32) {
        if attempt > self.retry.max_attempts {
            warn!(attempt, "no retries left, waiting for connectivity to return");
            return;
        }
        let delay = Duration::from_millis(self.retry.delay_with_jitter_ms(attempt));
        let generation = self.generation;
        let events = self.events_tx.clone();
        debug!(attempt, delay_ms = delay.as_millis() as u64, "retry scheduled");
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = events.send(SyncEvent::RetrySubscribe {
                generation,
                attempt,
            });
        });
    }

    async fn accept(&mut self, snapshot: Snapshot) {
        if let Err(e) = self.cache.write(&snapshot).await {
            warn!(error = %e, "cache write failed, publishing anyway");
            self.notify(Notice::failure(ErrorKind::Cache, &e));
        }
        debug!(messages = snapshot.len(), "live snapshot accepted");
        self.live_accepted = true;
        self.publish(snapshot);
    }

    /// Live without any accepted snapshot has nothing better to show than
    /// the cache.
    async fn fall_back_if_unsynced(&self) {
        if self.live_accepted {
            return;
        }
        let snapshot = self.read_cache_or_empty().await;
        info!(messages = snapshot.len(), "no live data yet, serving cached messages");
        self.publish(snapshot);
    }

    async fn read_cache_or_empty(&self) -> Snapshot {
        match self.cache.read().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "cache unreadable, showing no messages");
                self.notify(Notice::failure(ErrorKind::Cache, &e));
                Snapshot::empty()
            }
        }
    }

    async fn enter_disconnected(&mut self) {
        self.generation += 1;
        self.state = SyncState::Disconnected;
        if let Some(handle) = self.stream.active().cloned() {
            self.stream.cancel(&handle).await;
        }

        let snapshot = self.read_cache_or_empty().await;
        info!(
            generation = self.generation,
            messages = snapshot.len(),
            "offline, serving cached messages"
        );
        self.publish(snapshot);
    }

    fn publish(&self, snapshot: Snapshot) {
        self.published.send_replace(snapshot);
    }

    fn notify(&self, notice: Notice) {
        // No receivers is fine.
        let _ = self.notices.send(notice);
    }
}
