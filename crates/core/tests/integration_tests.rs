use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use fxfusion_core::clock::ManualClock;
use fxfusion_core::errors::CoreError;
use fxfusion_core::models::basket::{Basket, TokenAllocation, UserBalance};
use fxfusion_core::models::feed::{
    FeedCatalog, PYTH_EUR_USD, PYTH_GBP_USD, PYTH_USDC_USD, PYTH_USD_JPY,
};
use fxfusion_core::models::rate::{RawTick, Staleness};
use fxfusion_core::models::settings::Settings;
use fxfusion_core::providers::registry::FeedRegistry;
use fxfusion_core::providers::traits::PriceFeed;
use fxfusion_core::services::price_service::RefreshOutcome;
use fxfusion_core::FxFusion;

// ═══════════════════════════════════════════════════════════════════
// Mock Hermes feed (for testing without real API calls)
// ═══════════════════════════════════════════════════════════════════

/// Serves fixed ticks for the real Pyth feed ids:
/// USDC/USD 1.00, EUR/USD 1.25, GBP/USD 1.60, USD/JPY 150.
struct MockHermes {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl PriceFeed for MockHermes {
    fn name(&self) -> &str {
        "MockHermes"
    }

    async fn fetch_latest(&self, feed_ids: &[String]) -> Result<Vec<RawTick>, CoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let ticks = vec![
            RawTick::new(format!("0x{PYTH_USDC_USD}"), 100_000_000, -8, 1_717_000_000),
            RawTick::new(PYTH_EUR_USD, 125_000, -5, 1_717_000_000),
            RawTick::new(PYTH_GBP_USD, 160_000, -5, 1_717_000_000),
            RawTick::new(PYTH_USD_JPY, 15_000, -2, 1_717_000_000),
        ];
        Ok(ticks
            .into_iter()
            .filter(|t| feed_ids.iter().any(|id| t.feed_id.ends_with(id.as_str())))
            .collect())
    }
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 5, 1, 9, 30, 0).unwrap()
}

fn app() -> (FxFusion, Arc<ManualClock>, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut registry = FeedRegistry::new();
    registry.register(Box::new(MockHermes {
        calls: calls.clone(),
    }));
    let clock = Arc::new(ManualClock::new(now()));
    let app = FxFusion::with_components(
        Settings::default(),
        registry,
        FeedCatalog::pyth_defaults("fUSD"),
        clock.clone(),
    )
    .unwrap();
    (app, clock, calls)
}

/// 100 fEUR bought at 1.10 fUSD each, locked for 10 days and a bit.
fn euro_basket(id: &str) -> Basket {
    Basket::new(
        id,
        "Euro savings",
        vec![TokenAllocation::new("fEUR", 100.0, 1.10, 100.0)],
        now() + ChronoDuration::days(10) + ChronoDuration::hours(3),
        "fUSD",
    )
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

// ═══════════════════════════════════════════════════════════════════
// Construction
// ═══════════════════════════════════════════════════════════════════

#[test]
fn new_with_default_settings() {
    let app = FxFusion::new(Settings::default()).unwrap();
    assert_eq!(app.prices().catalog().symbols().len(), 6);
    assert!(!app.is_connected());
}

#[test]
fn new_without_endpoint_is_config_error() {
    let settings = Settings {
        hermes_endpoint: String::new(),
        ..Settings::default()
    };
    let err = FxFusion::new(settings).unwrap_err();
    assert!(err.is_configuration());
}

#[test]
fn empty_registry_is_config_error() {
    let result = FxFusion::with_components(
        Settings::default(),
        FeedRegistry::new(),
        FeedCatalog::pyth_defaults("fUSD"),
        Arc::new(ManualClock::new(now())),
    );
    assert!(matches!(result, Err(CoreError::ConfigMissing(_))));
}

// ═══════════════════════════════════════════════════════════════════
// Wallet session
// ═══════════════════════════════════════════════════════════════════

#[tokio::test]
async fn connect_fetches_rates_and_records_history() {
    let (mut app, _clock, calls) = app();
    app.connect(vec![euro_basket("b1")]).unwrap();
    assert!(app.is_connected());
    settle().await;

    // The monitor fetched once, right away.
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!((app.current_rate("fEUR") - 0.8).abs() < 1e-9);
    assert!((app.current_rate("fGBP") - 0.625).abs() < 1e-9);
    assert!((app.current_rate("fYEN") - 150.0).abs() < 1e-9);
    assert_eq!(app.current_rate("fUSD"), 1.0);

    // EUR/USD went from 1.10 to 1.25.
    let history = app.basket_history("b1", 24);
    assert_eq!(history.len(), 1);
    assert!((history[0].value - 125.0).abs() < 1e-9);
    assert!((history[0].pnl - 15.0).abs() < 1e-9);

    app.disconnect().unwrap();
}

#[tokio::test]
async fn manual_refresh_after_connect() {
    let (mut app, _clock, calls) = app();
    app.connect(vec![euro_basket("b1")]).unwrap();
    settle().await;

    assert_eq!(app.refresh_prices().await, RefreshOutcome::Updated(4));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    // Same instant, same rates: still one point.
    assert_eq!(app.basket_history("b1", 24).len(), 1);

    app.disconnect().unwrap();
}

#[tokio::test]
async fn refresh_performance_updates_stored_baskets() {
    let (mut app, _clock, _calls) = app();
    app.connect(vec![euro_basket("b1")]).unwrap();
    app.refresh_prices().await;

    let baskets = app.refresh_performance().unwrap();
    assert_eq!(baskets.len(), 1);
    let basket = &baskets[0];
    assert!((basket.total_value - 125.0).abs() < 1e-9);
    assert!((basket.performance - (15.0 / 110.0 * 100.0)).abs() < 1e-9);
    assert!((basket.initial_value - 110.0).abs() < 1e-9);
    assert_eq!(app.store().basket("b1").unwrap(), basket);

    app.disconnect().unwrap();
}

#[tokio::test]
async fn token_history_and_current_performance() {
    let (mut app, clock, _calls) = app();
    app.connect(vec![euro_basket("b1")]).unwrap();
    app.refresh_prices().await;
    clock.advance(ChronoDuration::minutes(2));
    app.refresh_prices().await;

    let points = app.token_history("b1", "fEUR", 1);
    assert_eq!(points.len(), 2);
    assert!(points.iter().all(|p| (p.price - 1.25).abs() < 1e-9));

    let latest = app.current_performance("b1").unwrap();
    assert_eq!(latest.timestamp, now() + ChronoDuration::minutes(2));

    app.disconnect().unwrap();
}

#[tokio::test]
async fn add_basket_is_tracked() {
    let (mut app, _clock, _calls) = app();
    app.connect(vec![euro_basket("b1")]).unwrap();
    app.add_basket(euro_basket("b2")).unwrap();
    assert!(matches!(
        app.add_basket(euro_basket("b2")),
        Err(CoreError::ValidationError(_))
    ));

    app.refresh_prices().await;
    assert_eq!(app.tracker().tracked_basket_ids(), vec!["b1", "b2"]);
    assert_eq!(app.basket_history("b2", 1).len(), 1);

    app.disconnect().unwrap();
}

#[tokio::test]
async fn disconnect_stops_everything_and_clears() {
    let (mut app, _clock, calls) = app();
    app.connect(vec![euro_basket("b1")]).unwrap();
    app.select_basket(Some("b1".into())).unwrap();
    settle().await;

    app.disconnect().unwrap();
    assert!(!app.is_connected());
    assert!(!app.prices().is_monitoring());
    assert_eq!(app.prices().subscriber_count(), 0);
    assert!(app.store().baskets().is_empty());
    assert!(app.store().selected_basket().is_none());
    assert!(app.basket_history("b1", 24).is_empty());

    // Cached rates survive a disconnect.
    assert!((app.current_rate("fEUR") - 0.8).abs() < 1e-9);

    let fetched = calls.load(Ordering::SeqCst);
    settle().await;
    assert_eq!(calls.load(Ordering::SeqCst), fetched);

    // A second disconnect is harmless.
    app.disconnect().unwrap();
}

#[tokio::test]
async fn reconnect_after_disconnect() {
    let (mut app, _clock, _calls) = app();
    app.connect(vec![euro_basket("b1")]).unwrap();
    app.disconnect().unwrap();

    app.connect(vec![euro_basket("b9")]).unwrap();
    assert!(app.is_connected());
    assert!(app.prices().is_monitoring());
    assert_eq!(app.prices().subscriber_count(), 1);
    assert!(app.store().basket("b9").is_some());
    app.disconnect().unwrap();
}

#[tokio::test]
async fn euro_rising_against_the_dollar_is_a_gain() {
    let (mut app, _clock, _calls) = app();
    let eur_usd = |mantissa: i64| {
        vec![
            RawTick::new(PYTH_USDC_USD, 100_000_000, -8, 1_717_000_000),
            RawTick::new(PYTH_EUR_USD, mantissa, -5, 1_717_000_000),
        ]
    };

    // Minted at EUR/USD 1.10, priced the way a wallet would price it.
    app.prices().ingest_ticks(&eur_usd(110_000));
    let mint_price = app.convert_currency("fEUR", "fUSD", 1.0);
    assert!((mint_price - 1.10).abs() < 1e-9);
    let basket = Basket::new(
        "b1",
        "Euro",
        vec![TokenAllocation::new("fEUR", 100.0, mint_price, 100.0)],
        now() + ChronoDuration::days(30),
        "fUSD",
    );
    app.add_basket(basket).unwrap();

    app.prices().ingest_ticks(&eur_usd(121_000));
    let baskets = app.refresh_performance().unwrap();
    let basket = &baskets[0];
    assert!((basket.total_value - app.convert_currency("fEUR", "fUSD", 100.0)).abs() < 1e-9);
    assert!((basket.total_value - 121.0).abs() < 1e-9);
    assert!((basket.performance - 10.0).abs() < 1e-9);

    let latest = app.current_performance("b1").unwrap();
    assert!((latest.pnl_percentage - 10.0).abs() < 1e-9);

    app.disconnect().unwrap();
}

#[tokio::test]
async fn mixed_basket_value_matches_conversion() {
    let (mut app, _clock, _calls) = app();
    let basket = Basket::new(
        "mix",
        "Mixed",
        vec![
            TokenAllocation::new("fEUR", 100.0, 1.2, 40.0),
            TokenAllocation::new("fGBP", 50.0, 1.5, 30.0),
            TokenAllocation::new("fYEN", 15_000.0, 0.007, 30.0),
        ],
        now() + ChronoDuration::days(30),
        "fUSD",
    );
    app.connect(vec![basket]).unwrap();
    app.refresh_prices().await;

    let baskets = app.refresh_performance().unwrap();
    let basket = &baskets[0];
    let converted: f64 = basket
        .tokens
        .iter()
        .map(|t| app.convert_currency(&t.symbol, "fUSD", t.amount))
        .sum();
    assert!((basket.total_value - converted).abs() < 1e-9);
    // 125 + 80 + 100
    assert!((basket.total_value - 305.0).abs() < 1e-9);

    app.disconnect().unwrap();
}

// ═══════════════════════════════════════════════════════════════════
// Locks, balances, selection
// ═══════════════════════════════════════════════════════════════════

#[tokio::test]
async fn lock_queries() {
    let (mut app, clock, _calls) = app();
    app.connect(vec![euro_basket("b1")]).unwrap();

    assert!(app.is_locked("b1").unwrap());
    assert_eq!(app.days_remaining("b1").unwrap(), 11);

    clock.advance(ChronoDuration::days(11));
    assert!(!app.is_locked("b1").unwrap());
    assert_eq!(app.days_remaining("b1").unwrap(), 0);

    assert!(matches!(
        app.is_locked("missing"),
        Err(CoreError::BasketNotFound(_))
    ));
    assert!(matches!(
        app.days_remaining("missing"),
        Err(CoreError::BasketNotFound(_))
    ));
    app.disconnect().unwrap();
}

#[tokio::test]
async fn balances_and_selection() {
    let (mut app, _clock, _calls) = app();
    app.connect(vec![euro_basket("b1")]).unwrap();

    app.set_user_balances(vec![UserBalance {
        symbol: "fEUR".into(),
        balance: 42.0,
        swapped_from: Some("fUSD".into()),
        eligible: true,
    }])
    .unwrap();
    assert_eq!(app.store().state().user_balances.len(), 1);

    assert!(matches!(
        app.select_basket(Some("nope".into())),
        Err(CoreError::BasketNotFound(_))
    ));
    app.select_basket(Some("b1".into())).unwrap();
    assert_eq!(app.store().selected_basket().unwrap().id, "b1");
    app.select_basket(None).unwrap();
    assert!(app.store().selected_basket().is_none());

    app.disconnect().unwrap();
}

// ═══════════════════════════════════════════════════════════════════
// Rates
// ═══════════════════════════════════════════════════════════════════

#[tokio::test]
async fn rates_before_first_fetch_come_from_fallback() {
    let (app, _clock, _calls) = app();
    assert_eq!(app.current_rate("fEUR"), 0.85);
    assert_eq!(app.current_rate("fINR"), 83.0);
    assert!(app.all_rates().is_empty());

    let quality = app.data_quality();
    assert!(quality.is_stale);
    assert_eq!(quality.staleness, Staleness::Stale);
}

#[tokio::test]
async fn conversion_and_quality_after_fetch() {
    let (app, clock, _calls) = app();
    app.refresh_prices().await;

    assert!((app.convert_currency("fEUR", "fGBP", 80.0) - 62.5).abs() < 1e-9);
    assert_eq!(app.all_rates().len(), 4);
    assert_eq!(app.data_quality().staleness, Staleness::Fresh);

    clock.advance(ChronoDuration::seconds(45));
    assert_eq!(app.data_quality().staleness, Staleness::Recent);
}
