use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::clock::{Clock, SystemClock};
use crate::errors::CoreError;
use crate::models::feed::FeedCatalog;
use crate::models::rate::{DataQuality, Rate, RateBook, RateTable, RawTick, Staleness};
use crate::models::settings::Settings;
use crate::providers::registry::FeedRegistry;
use crate::providers::traits::TickStream;
use super::normalizer::normalize;
use super::observers::{Listener, Observers, Subscription};
use super::scheduler::{FirstRun, ScheduledTask};

/// Rate used when a symbol has neither cached nor fallback data.
const UNKNOWN_SYMBOL_RATE: f64 = 1.0;

/// What a single refresh attempt did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// A new rate book with this many symbols was published.
    Updated(usize),
    /// Another fetch was already in flight; nothing was done.
    Skipped,
    /// The fetch or normalization failed; the previous book is kept.
    Failed,
}

/// Owns the latest normalized rates and keeps them fresh.
///
/// Lifecycle: `Idle -> Monitoring -> Idle`. While monitoring, feeds are
/// polled every `refresh_interval`; at most one fetch runs at a time.
/// Every successful fetch replaces the whole `RateBook` and notifies all
/// subscribers with it. Failed fetches are logged and absorbed.
///
/// Rates can also be pushed by a `TickStream` (see `start_streaming`);
/// pushed and polled batches are published one at a time, and subscribers
/// see books in the order they were stored.
///
/// Cheap to clone: clones share the same cache, subscribers and timer.
#[derive(Clone)]
pub struct PriceService {
    inner: Arc<PriceInner>,
}

struct PriceInner {
    settings: Settings,
    catalog: FeedCatalog,
    registry: FeedRegistry,
    clock: Arc<dyn Clock>,
    book: Mutex<Option<Arc<RateBook>>>,
    /// Held from storing a book until its subscribers have seen it.
    publish_order: Mutex<()>,
    observers: Arc<Observers<RateBook>>,
    fetch_in_flight: AtomicBool,
    monitor: Mutex<Option<ScheduledTask>>,
    streamer: Mutex<Option<ScheduledTask>>,
}

impl std::fmt::Debug for PriceService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PriceService")
            .field("feeds", &self.inner.registry.names())
            .field("symbols", &self.inner.catalog.symbols())
            .field("last_update", &self.last_update())
            .field("monitoring", &self.is_monitoring())
            .field("streaming", &self.is_streaming())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl PriceService {
    pub fn new(
        settings: Settings,
        registry: FeedRegistry,
        catalog: FeedCatalog,
    ) -> Result<Self, CoreError> {
        Self::with_clock(settings, registry, catalog, Arc::new(SystemClock))
    }

    /// Same as `new`, reading time from `clock`.
    pub fn with_clock(
        settings: Settings,
        registry: FeedRegistry,
        catalog: FeedCatalog,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, CoreError> {
        settings.validate()?;
        if registry.is_empty() {
            return Err(CoreError::ConfigMissing("no price feed registered".into()));
        }
        if catalog.is_empty() {
            return Err(CoreError::ConfigMissing("feed catalog is empty".into()));
        }
        if catalog.reference_symbol() != settings.reference_currency {
            return Err(CoreError::ValidationError(format!(
                "Feed catalog reference '{}' does not match configured reference '{}'",
                catalog.reference_symbol(),
                settings.reference_currency
            )));
        }

        Ok(Self {
            inner: Arc::new(PriceInner {
                settings,
                catalog,
                registry,
                clock,
                book: Mutex::new(None),
                publish_order: Mutex::new(()),
                observers: Observers::new(),
                fetch_in_flight: AtomicBool::new(false),
                monitor: Mutex::new(None),
                streamer: Mutex::new(None),
            }),
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub fn catalog(&self) -> &FeedCatalog {
        &self.inner.catalog
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        self.inner.clock.clone()
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    /// Fetch once right away, then every `refresh_interval`.
    ///
    /// A no-op when already monitoring. Must be called inside a tokio
    /// runtime. Returns `true` if this call started the timer.
    pub fn start_monitoring(&self) -> bool {
        let mut monitor = lock(&self.inner.monitor);
        if monitor.as_ref().is_some_and(ScheduledTask::is_active) {
            log::debug!("Price monitoring already running");
            return false;
        }

        // The timer must not keep the service alive on its own.
        let weak = Arc::downgrade(&self.inner);
        let task = ScheduledTask::spawn(
            "price-refresh",
            self.inner.settings.refresh_interval(),
            FirstRun::Immediately,
            move || {
                let weak = weak.clone();
                async move {
                    match weak.upgrade() {
                        Some(inner) => {
                            PriceService { inner }.refresh().await;
                            ControlFlow::Continue(())
                        }
                        None => ControlFlow::Break(()),
                    }
                }
            },
        );
        *monitor = Some(task);
        true
    }

    /// Cancel the refresh timer. Safe to call in any state, any number of
    /// times. Cached rates are kept. Returns `true` if a timer was stopped.
    pub fn stop_monitoring(&self) -> bool {
        let task = lock(&self.inner.monitor).take();
        match task {
            Some(mut task) => task.cancel(),
            None => false,
        }
    }

    pub fn is_monitoring(&self) -> bool {
        lock(&self.inner.monitor)
            .as_ref()
            .is_some_and(ScheduledTask::is_active)
    }

    /// Keep a push connection to `source` open and publish every batch it
    /// delivers.
    ///
    /// When the stream closes or fails it is reopened, at most once per
    /// `stream_reconnect_interval`. Polling is unaffected; both may run at
    /// once. A no-op when already streaming. Must be called inside a tokio
    /// runtime. Returns `true` if this call opened the stream.
    pub fn start_streaming(&self, source: Arc<dyn TickStream>) -> bool {
        let mut streamer = lock(&self.inner.streamer);
        if streamer.as_ref().is_some_and(ScheduledTask::is_active) {
            log::debug!("Price stream already running");
            return false;
        }

        let weak = Arc::downgrade(&self.inner);
        let feed_ids = self.inner.catalog.feed_ids();
        let task = ScheduledTask::spawn(
            "price-stream",
            self.inner.settings.stream_reconnect_interval(),
            FirstRun::Immediately,
            move || {
                let weak = weak.clone();
                let source = source.clone();
                let feed_ids = feed_ids.clone();
                async move {
                    if weak.strong_count() == 0 {
                        return ControlFlow::Break(());
                    }
                    let sink = |ticks: Vec<RawTick>| {
                        if let Some(inner) = weak.upgrade() {
                            PriceService { inner }.ingest_ticks(&ticks);
                        }
                    };
                    match source.stream(&feed_ids, &sink).await {
                        Ok(()) => log::info!("{} price stream closed", source.name()),
                        Err(e) => log::warn!("{} price stream failed: {e}", source.name()),
                    }
                    if weak.strong_count() == 0 {
                        ControlFlow::Break(())
                    } else {
                        ControlFlow::Continue(())
                    }
                }
            },
        );
        *streamer = Some(task);
        true
    }

    /// Close the push connection. Safe to call in any state, any number of
    /// times. Returns `true` if a stream was stopped.
    pub fn stop_streaming(&self) -> bool {
        let task = lock(&self.inner.streamer).take();
        match task {
            Some(mut task) => task.cancel(),
            None => false,
        }
    }

    pub fn is_streaming(&self) -> bool {
        lock(&self.inner.streamer)
            .as_ref()
            .is_some_and(ScheduledTask::is_active)
    }

    // ── Updates ─────────────────────────────────────────────────────

    /// Fetch and publish fresh rates.
    ///
    /// Never fails: errors are logged and the previous rates are kept.
    /// Returns `Skipped` when another fetch is already in flight.
    pub async fn refresh(&self) -> RefreshOutcome {
        if self.inner.fetch_in_flight.swap(true, Ordering::AcqRel) {
            log::debug!("Price fetch already in flight, skipping");
            return RefreshOutcome::Skipped;
        }
        let _guard = InFlightGuard(&self.inner.fetch_in_flight);

        let feed_ids = self.inner.catalog.feed_ids();
        match self.inner.registry.fetch_ticks(&feed_ids).await {
            Ok(ticks) => self.ingest_ticks(&ticks),
            Err(e) => {
                log::warn!("Price refresh failed, keeping cached rates: {e}");
                RefreshOutcome::Failed
            }
        }
    }

    /// Normalize and publish ticks received from any source: the polled
    /// feeds, the push stream, or the caller directly.
    pub fn ingest_ticks(&self, ticks: &[RawTick]) -> RefreshOutcome {
        match normalize(ticks, &self.inner.catalog) {
            Ok(normalized) => {
                let count = normalized.rates.len();
                self.publish(normalized.rates);
                RefreshOutcome::Updated(count)
            }
            Err(e) => {
                log::warn!("Discarding feed batch: {e}");
                RefreshOutcome::Failed
            }
        }
    }

    fn publish(&self, rates: HashMap<String, f64>) {
        let _order = lock(&self.inner.publish_order);
        let now = self.inner.clock.now();
        let book = {
            let mut current = lock(&self.inner.book);
            let previous = current.clone();
            let rates = rates
                .into_iter()
                .map(|(symbol, rate)| {
                    let change_24h = previous
                        .as_ref()
                        .and_then(|b| b.get(&symbol))
                        .filter(|p| p.rate > 0.0)
                        .map_or(0.0, |p| (rate - p.rate) / p.rate * 100.0);
                    let entry = Rate {
                        symbol: symbol.clone(),
                        rate,
                        observed_at: now,
                        change_24h,
                    };
                    (symbol, entry)
                })
                .collect();
            let book = Arc::new(RateBook {
                rates,
                updated_at: now,
            });
            *current = Some(book.clone());
            book
        };

        log::info!("Published {} rates", book.len());
        self.inner.observers.notify(book.as_ref());
    }

    // ── Subscriptions ───────────────────────────────────────────────

    /// Register a listener for every new rate book.
    ///
    /// If rates are already cached the listener is called once right away.
    /// The listener stays registered until the returned handle is
    /// unsubscribed or dropped. Listeners run while publishing is blocked,
    /// so they must not publish rates themselves.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&RateBook) + Send + Sync + 'static,
    {
        let listener: Listener<RateBook> = Arc::new(listener);
        let _order = lock(&self.inner.publish_order);
        let subscription = self.inner.observers.register(listener.clone());
        if let Some(book) = self.current_book() {
            listener(book.as_ref());
        }
        subscription
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.observers.len()
    }

    // ── Queries ─────────────────────────────────────────────────────

    /// The last published rate book, regardless of age.
    pub fn current_book(&self) -> Option<Arc<RateBook>> {
        lock(&self.inner.book).clone()
    }

    /// All cached rates keyed by symbol.
    pub fn all_rates(&self) -> HashMap<String, Rate> {
        self.current_book()
            .map(|b| b.rates.clone())
            .unwrap_or_default()
    }

    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        self.current_book().map(|b| b.updated_at)
    }

    /// Milliseconds since the last successful update, clamped at zero.
    fn age_ms(&self) -> Option<i64> {
        let updated_at = self.last_update()?;
        let age = (self.inner.clock.now() - updated_at).num_milliseconds();
        Some(age.max(0))
    }

    /// `true` when no update landed within the recency threshold.
    pub fn is_stale(&self) -> bool {
        self.staleness() == Staleness::Stale
    }

    pub fn staleness(&self) -> Staleness {
        let settings = &self.inner.settings;
        match self.age_ms() {
            None => Staleness::Stale,
            Some(age) if age <= as_ms(settings.refresh_interval_ms) => Staleness::Fresh,
            Some(age) if age <= as_ms(settings.recency_threshold_ms) => Staleness::Recent,
            Some(_) => Staleness::Stale,
        }
    }

    pub fn data_quality(&self) -> DataQuality {
        let staleness = self.staleness();
        DataQuality {
            is_stale: staleness == Staleness::Stale,
            last_update: self.last_update(),
            staleness,
        }
    }

    /// Rates to compute with right now.
    ///
    /// Cached rates are used while younger than the stale grace period,
    /// with fallback rates filling any symbol the feed did not provide.
    /// Past the grace period only fallback rates are used.
    pub fn effective_rates(&self) -> RateTable {
        let fallback = &self.inner.settings.fallback_rates;
        let grace = as_ms(self.inner.settings.stale_grace_ms);
        match (self.current_book(), self.age_ms()) {
            (Some(book), Some(age)) if age <= grace => {
                RateTable::from_book(&book).with_fallback(fallback)
            }
            _ => RateTable::new(fallback.clone()),
        }
    }

    /// Rate for `symbol` against the reference currency. Never fails.
    pub fn get_current_rate(&self, symbol: &str) -> f64 {
        self.effective_rates()
            .rate(symbol)
            .unwrap_or(UNKNOWN_SYMBOL_RATE)
    }

    /// Convert `amount` of `from` into `to` through the reference currency.
    pub fn convert_currency(&self, from: &str, to: &str, amount: f64) -> f64 {
        if from == to {
            return amount;
        }
        let table = self.effective_rates();
        let from_rate = table.rate(from).unwrap_or(UNKNOWN_SYMBOL_RATE);
        let to_rate = table.rate(to).unwrap_or(UNKNOWN_SYMBOL_RATE);
        amount / from_rate * to_rate
    }
}

/// Clears the in-flight flag when a fetch finishes, however it finishes.
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

fn as_ms(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
