use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::ops::ControlFlow;
use std::sync::{Arc, Mutex, PoisonError};

use crate::clock::Clock;
use crate::models::basket::Basket;
use crate::models::history::{
    PerformanceSnapshot, PnlDataPoint, PriceHistoryPoint, TokenPerformance,
};
use crate::models::rate::RateTable;
use crate::models::settings::Settings;
use super::observers::Subscription;
use super::performance_calculator::{basket_performance, pnl_percentage};
use super::price_service::PriceService;
use super::scheduler::{FirstRun, ScheduledTask};

/// Keeps a bounded, deduplicated time series of basket performance.
///
/// Every price update (and a backup timer, in case updates stall) triggers
/// one recompute pass over all tracked baskets. A snapshot is appended when
/// the basket value moved by more than `snapshot_min_change`, or when the
/// last snapshot is older than `snapshot_force_after`. Snapshots older than
/// `snapshot_retention` are dropped from the front.
///
/// Readers only ever get copies of the series.
#[derive(Clone)]
pub struct PerformanceTracker {
    inner: Arc<TrackerInner>,
}

struct TrackerInner {
    prices: PriceService,
    settings: Settings,
    clock: Arc<dyn Clock>,
    state: Mutex<TrackerState>,
    subscription: Mutex<Option<Subscription>>,
    fallback: Mutex<Option<ScheduledTask>>,
}

#[derive(Default)]
struct TrackerState {
    /// Latest recomputed copy of each tracked basket.
    baskets: BTreeMap<String, Basket>,
    /// Oldest first.
    snapshots: HashMap<String, VecDeque<PerformanceSnapshot>>,
}

impl std::fmt::Debug for PerformanceTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = lock(&self.inner.state);
        f.debug_struct("PerformanceTracker")
            .field("baskets", &state.baskets.len())
            .field(
                "snapshots",
                &state.snapshots.values().map(VecDeque::len).sum::<usize>(),
            )
            .finish()
    }
}

impl PerformanceTracker {
    /// Tracker fed by `prices`, sharing its settings and clock.
    pub fn new(prices: PriceService) -> Self {
        let clock = prices.clock();
        Self::with_clock(prices, clock)
    }

    pub fn with_clock(prices: PriceService, clock: Arc<dyn Clock>) -> Self {
        let settings = prices.settings().clone();
        Self {
            inner: Arc::new(TrackerInner {
                prices,
                settings,
                clock,
                state: Mutex::new(TrackerState::default()),
                subscription: Mutex::new(None),
                fallback: Mutex::new(None),
            }),
        }
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    /// Track `baskets` and make sure the live update path is running.
    ///
    /// Baskets already tracked keep their existing definition and history.
    /// One price subscription and one backup timer are shared by all
    /// baskets; calling this again never creates a second of either.
    /// Must be called inside a tokio runtime.
    pub fn start_tracking(&self, baskets: Vec<Basket>) {
        {
            let mut state = lock(&self.inner.state);
            for basket in baskets {
                state.snapshots.entry(basket.id.clone()).or_default();
                state.baskets.entry(basket.id.clone()).or_insert(basket);
            }
        }

        {
            let mut subscription = lock(&self.inner.subscription);
            if !subscription.as_ref().is_some_and(Subscription::is_active) {
                let weak = Arc::downgrade(&self.inner);
                *subscription = Some(self.inner.prices.subscribe(move |book| {
                    if let Some(inner) = weak.upgrade() {
                        inner.capture(&RateTable::from_book(book));
                    }
                }));
            }
        }

        let mut fallback = lock(&self.inner.fallback);
        if !fallback.as_ref().is_some_and(ScheduledTask::is_active) {
            let weak = Arc::downgrade(&self.inner);
            *fallback = Some(ScheduledTask::spawn(
                "snapshot-fallback",
                self.inner.settings.snapshot_fallback_interval(),
                FirstRun::AfterPeriod,
                move || {
                    let step = match weak.upgrade() {
                        Some(inner) => {
                            inner.capture(&inner.prices.effective_rates());
                            ControlFlow::Continue(())
                        }
                        None => ControlFlow::Break(()),
                    };
                    async move { step }
                },
            ));
        }
    }

    /// Stop the backup timer and the price subscription. History is kept.
    /// Safe to call in any state, any number of times.
    pub fn stop_tracking(&self) -> bool {
        let timer = lock(&self.inner.fallback).take();
        let subscription = lock(&self.inner.subscription).take();

        let stopped_timer = timer.is_some_and(|mut t| t.cancel());
        let stopped_subscription = subscription.is_some_and(|mut s| s.unsubscribe());
        stopped_timer || stopped_subscription
    }

    pub fn is_tracking(&self) -> bool {
        let timer_active = lock(&self.inner.fallback)
            .as_ref()
            .is_some_and(ScheduledTask::is_active);
        let subscribed = lock(&self.inner.subscription)
            .as_ref()
            .is_some_and(Subscription::is_active);
        timer_active || subscribed
    }

    /// Forget every tracked basket and its history.
    pub fn clear(&self) {
        let mut state = lock(&self.inner.state);
        state.baskets.clear();
        state.snapshots.clear();
    }

    // ── Capturing ───────────────────────────────────────────────────

    /// Run one recompute pass now with the price service's effective rates.
    /// Returns the number of snapshots appended.
    pub fn capture_snapshots(&self) -> usize {
        self.inner.capture(&self.inner.prices.effective_rates())
    }

    /// Run one recompute pass against `rates`.
    pub fn capture_from_rates(&self, rates: &RateTable) -> usize {
        self.inner.capture(rates)
    }

    // ── Queries ─────────────────────────────────────────────────────

    /// Basket P&L points from the last `hours_back` hours, oldest first.
    pub fn basket_history(&self, basket_id: &str, hours_back: u32) -> Vec<PnlDataPoint> {
        self.inner.window(basket_id, hours_back, |s| PnlDataPoint {
            timestamp: s.timestamp,
            value: s.total_value,
            pnl: s.pnl,
            pnl_percentage: s.pnl_percentage,
        })
    }

    /// One token's price points from the last `hours_back` hours.
    ///
    /// A snapshot without the token yields a zero point, so every series
    /// of a basket shares the same time axis.
    pub fn token_history(
        &self,
        basket_id: &str,
        symbol: &str,
        hours_back: u32,
    ) -> Vec<PriceHistoryPoint> {
        self.inner.window(basket_id, hours_back, |s| match s.token(symbol) {
            Some(token) => PriceHistoryPoint {
                timestamp: s.timestamp,
                price: token.price,
                pnl: token.pnl,
            },
            None => PriceHistoryPoint {
                timestamp: s.timestamp,
                price: 0.0,
                pnl: 0.0,
            },
        })
    }

    /// Most recent snapshot of a basket.
    pub fn current_performance(&self, basket_id: &str) -> Option<PerformanceSnapshot> {
        lock(&self.inner.state)
            .snapshots
            .get(basket_id)
            .and_then(|s| s.back().cloned())
    }

    pub fn snapshot_count(&self, basket_id: &str) -> usize {
        lock(&self.inner.state)
            .snapshots
            .get(basket_id)
            .map_or(0, VecDeque::len)
    }

    /// Latest recomputed copy of a tracked basket.
    pub fn tracked_basket(&self, basket_id: &str) -> Option<Basket> {
        lock(&self.inner.state).baskets.get(basket_id).cloned()
    }

    pub fn tracked_basket_ids(&self) -> Vec<String> {
        lock(&self.inner.state).baskets.keys().cloned().collect()
    }
}

impl TrackerInner {
    fn capture(&self, rates: &RateTable) -> usize {
        let now = self.clock.now();
        let mut state = lock(&self.state);
        let TrackerState { baskets, snapshots } = &mut *state;

        let mut appended = 0;
        for (id, basket) in baskets.iter_mut() {
            let base = basket.base_currency.clone();
            let updated = basket_performance(basket, |symbol| rates.price_in(symbol, &base));
            let snapshot = snapshot_of(&updated, now);
            *basket = updated;

            let series = snapshots.entry(id.clone()).or_default();
            if self.should_append(series.back(), &snapshot) {
                series.push_back(snapshot);
                appended += 1;
                self.trim(series, now);
            }
        }

        if appended > 0 {
            log::debug!("Captured {appended} performance snapshots");
        }
        appended
    }

    fn should_append(&self, last: Option<&PerformanceSnapshot>, next: &PerformanceSnapshot) -> bool {
        let Some(last) = last else {
            return true;
        };
        let moved = (next.total_value - last.total_value).abs() > self.settings.snapshot_min_change;
        let overdue = (next.timestamp - last.timestamp).num_milliseconds()
            > as_ms(self.settings.snapshot_force_after_ms);
        moved || overdue
    }

    fn trim(&self, series: &mut VecDeque<PerformanceSnapshot>, now: DateTime<Utc>) {
        let cutoff = earliest(now, Duration::milliseconds(as_ms(self.settings.snapshot_retention_ms)));
        while series.front().is_some_and(|s| s.timestamp < cutoff) {
            series.pop_front();
        }
    }

    fn window<T>(
        &self,
        basket_id: &str,
        hours_back: u32,
        project: impl Fn(&PerformanceSnapshot) -> T,
    ) -> Vec<T> {
        let cutoff = earliest(self.clock.now(), Duration::hours(i64::from(hours_back)));
        lock(&self.state)
            .snapshots
            .get(basket_id)
            .map(|series| {
                series
                    .iter()
                    .filter(|s| s.timestamp >= cutoff)
                    .map(&project)
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn snapshot_of(basket: &Basket, now: DateTime<Utc>) -> PerformanceSnapshot {
    let pnl = basket.total_value - basket.initial_value;
    PerformanceSnapshot {
        timestamp: now,
        basket_id: basket.id.clone(),
        total_value: basket.total_value,
        pnl,
        pnl_percentage: pnl_percentage(pnl, basket.initial_value),
        token_performances: basket
            .tokens
            .iter()
            .map(|t| TokenPerformance {
                symbol: t.symbol.clone(),
                price: t.current_price,
                value: t.current_value(),
                pnl: t.pnl,
                pnl_percentage: t.pnl_percentage,
            })
            .collect(),
    }
}

/// `now - span`, saturating at the earliest representable instant.
fn earliest(now: DateTime<Utc>, span: Duration) -> DateTime<Utc> {
    now.checked_sub_signed(span).unwrap_or(DateTime::<Utc>::MIN_UTC)
}

fn as_ms(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
