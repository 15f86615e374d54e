pub mod clock;
pub mod errors;
pub mod models;
pub mod providers;
pub mod services;

use std::collections::HashMap;
use std::sync::Arc;

use clock::{Clock, SystemClock};
use errors::CoreError;
use models::{
    basket::{Basket, UserBalance},
    feed::FeedCatalog,
    history::{PerformanceSnapshot, PnlDataPoint, PriceHistoryPoint},
    rate::{DataQuality, Rate},
    settings::Settings,
};
use providers::pyth::PythHermesFeed;
use providers::registry::FeedRegistry;
use providers::traits::TickStream;
use services::{
    basket_store::{BasketAction, BasketStore},
    performance_calculator,
    performance_tracker::PerformanceTracker,
    price_service::{PriceService, RefreshOutcome},
};

/// Main entry point for the FXFusion core library.
///
/// Owns one price service, one performance tracker and the basket store for
/// the connected wallet. Wallet connection, contract calls and rendering
/// live outside; they hand baskets in and read history and rates out.
#[must_use]
pub struct FxFusion {
    prices: PriceService,
    tracker: PerformanceTracker,
    store: BasketStore,
}

impl std::fmt::Debug for FxFusion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FxFusion")
            .field("baskets", &self.store.baskets().len())
            .field("monitoring", &self.prices.is_monitoring())
            .field("tracking", &self.tracker.is_tracking())
            .field("last_price_update", &self.prices.last_update())
            .finish()
    }
}

impl FxFusion {
    /// Build with the Pyth Hermes feed and the default FX catalog.
    pub fn new(settings: Settings) -> Result<Self, CoreError> {
        let registry = FeedRegistry::new_with_defaults(&settings)?;
        let catalog = FeedCatalog::pyth_defaults(settings.reference_currency.clone());
        Self::with_components(settings, registry, catalog, Arc::new(SystemClock))
    }

    /// Build from explicit parts (custom feeds, catalog or clock).
    pub fn with_components(
        settings: Settings,
        registry: FeedRegistry,
        catalog: FeedCatalog,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, CoreError> {
        let prices = PriceService::with_clock(settings, registry, catalog, clock)?;
        let tracker = PerformanceTracker::new(prices.clone());
        Ok(Self {
            prices,
            tracker,
            store: BasketStore::new(),
        })
    }

    // ── Wallet Session ──────────────────────────────────────────────

    /// Load the wallet's baskets and start price monitoring and tracking.
    /// Must be called inside a tokio runtime.
    pub fn connect(&mut self, baskets: Vec<Basket>) -> Result<(), CoreError> {
        self.store
            .dispatch(BasketAction::SetUserBaskets(baskets.clone()))?;
        self.prices.start_monitoring();
        self.tracker.start_tracking(baskets);
        Ok(())
    }

    /// Optimistically add a freshly minted basket and start tracking it.
    pub fn add_basket(&mut self, basket: Basket) -> Result<(), CoreError> {
        self.store.dispatch(BasketAction::AddBasket(basket.clone()))?;
        self.tracker.start_tracking(vec![basket]);
        Ok(())
    }

    /// Stop all timers and subscriptions and drop the wallet's data.
    /// Safe to call when not connected.
    pub fn disconnect(&mut self) -> Result<(), CoreError> {
        self.tracker.stop_tracking();
        self.tracker.clear();
        self.prices.stop_monitoring();
        self.prices.stop_streaming();
        self.store.dispatch(BasketAction::Clear)
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.tracker.is_tracking()
    }

    pub fn set_user_balances(&mut self, balances: Vec<UserBalance>) -> Result<(), CoreError> {
        self.store.dispatch(BasketAction::SetUserBalances(balances))
    }

    pub fn select_basket(&mut self, basket_id: Option<String>) -> Result<(), CoreError> {
        self.store.dispatch(BasketAction::SelectBasket(basket_id))
    }

    // ── Performance ─────────────────────────────────────────────────

    /// Recompute every stored basket from the current effective rates.
    /// Returns the updated baskets.
    pub fn refresh_performance(&mut self) -> Result<Vec<Basket>, CoreError> {
        let rates = self.prices.effective_rates();
        let baskets = self.store.baskets().to_vec();
        for basket in &baskets {
            let updated = performance_calculator::basket_performance(basket, |symbol| {
                rates.price_in(symbol, &basket.base_currency)
            });
            self.store
                .dispatch(BasketAction::UpdateBasketPerformance(updated))?;
        }
        Ok(self.store.baskets().to_vec())
    }

    #[must_use]
    pub fn basket_history(&self, basket_id: &str, hours_back: u32) -> Vec<PnlDataPoint> {
        self.tracker.basket_history(basket_id, hours_back)
    }

    #[must_use]
    pub fn token_history(
        &self,
        basket_id: &str,
        symbol: &str,
        hours_back: u32,
    ) -> Vec<PriceHistoryPoint> {
        self.tracker.token_history(basket_id, symbol, hours_back)
    }

    #[must_use]
    pub fn current_performance(&self, basket_id: &str) -> Option<PerformanceSnapshot> {
        self.tracker.current_performance(basket_id)
    }

    /// Whether a stored basket is still locked.
    pub fn is_locked(&self, basket_id: &str) -> Result<bool, CoreError> {
        let basket = self.require_basket(basket_id)?;
        Ok(performance_calculator::is_locked(basket, self.prices.clock().now()))
    }

    /// Days until a stored basket unlocks (0 once unlocked).
    pub fn days_remaining(&self, basket_id: &str) -> Result<i64, CoreError> {
        let basket = self.require_basket(basket_id)?;
        Ok(performance_calculator::days_remaining(basket, self.prices.clock().now()))
    }

    // ── Prices ──────────────────────────────────────────────────────

    /// Open the Hermes price stream on top of polling.
    /// Must be called inside a tokio runtime.
    pub fn stream_prices(&self) -> Result<bool, CoreError> {
        let settings = self.prices.settings();
        let feed = PythHermesFeed::new(&settings.hermes_endpoint, settings.request_timeout())?;
        Ok(self.stream_prices_from(Arc::new(feed)))
    }

    /// Open a price stream from a custom push source.
    pub fn stream_prices_from(&self, source: Arc<dyn TickStream>) -> bool {
        self.prices.start_streaming(source)
    }

    /// Fetch rates now instead of waiting for the next timer tick.
    pub async fn refresh_prices(&self) -> RefreshOutcome {
        self.prices.refresh().await
    }

    #[must_use]
    pub fn current_rate(&self, symbol: &str) -> f64 {
        self.prices.get_current_rate(symbol)
    }

    #[must_use]
    pub fn convert_currency(&self, from: &str, to: &str, amount: f64) -> f64 {
        self.prices.convert_currency(from, to, amount)
    }

    #[must_use]
    pub fn all_rates(&self) -> HashMap<String, Rate> {
        self.prices.all_rates()
    }

    #[must_use]
    pub fn data_quality(&self) -> DataQuality {
        self.prices.data_quality()
    }

    // ── Accessors ───────────────────────────────────────────────────

    pub fn prices(&self) -> &PriceService {
        &self.prices
    }

    pub fn tracker(&self) -> &PerformanceTracker {
        &self.tracker
    }

    pub fn store(&self) -> &BasketStore {
        &self.store
    }

    // ── Internal ────────────────────────────────────────────────────

    fn require_basket(&self, basket_id: &str) -> Result<&Basket, CoreError> {
        self.store
            .basket(basket_id)
            .ok_or_else(|| CoreError::BasketNotFound(basket_id.to_string()))
    }
}
