use chrono::{TimeZone, Utc};
use fxfusion_core::errors::CoreError;
use fxfusion_core::models::basket::{Basket, TokenAllocation, UserBalance};
use fxfusion_core::models::feed::{
    normalize_feed_id, FeedCatalog, FeedDirection, FeedSpec, PYTH_EUR_USD, PYTH_USDC_USD,
    PYTH_USD_JPY,
};
use fxfusion_core::models::rate::{RateBook, RateTable, RawTick, Staleness};
use fxfusion_core::models::settings::Settings;
use std::collections::HashMap;

fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

// ═══════════════════════════════════════════════════════════════════
//  RawTick
// ═══════════════════════════════════════════════════════════════════

mod raw_tick {
    use super::*;

    #[test]
    fn value_applies_negative_exponent() {
        let tick = RawTick::new("aa", 85, -2, 0);
        assert!(approx(tick.value(), 0.85));
    }

    #[test]
    fn value_applies_positive_exponent() {
        let tick = RawTick::new("aa", 15, 1, 0);
        assert!(approx(tick.value(), 150.0));
    }

    #[test]
    fn value_with_zero_exponent() {
        assert!(approx(RawTick::new("aa", 7, 0, 0).value(), 7.0));
    }
}

// ═══════════════════════════════════════════════════════════════════
//  Feed catalog
// ═══════════════════════════════════════════════════════════════════

mod feed_catalog {
    use super::*;

    #[test]
    fn normalize_strips_prefix_and_lowercases() {
        assert_eq!(normalize_feed_id("0xABcd"), "abcd");
        assert_eq!(normalize_feed_id("0XFF"), "ff");
        assert_eq!(normalize_feed_id(" abcd "), "abcd");
    }

    #[test]
    fn get_accepts_any_id_form() {
        let mut catalog = FeedCatalog::new("fUSD");
        catalog.add(FeedSpec::new("0xAbC", "fEUR", FeedDirection::Direct));
        assert_eq!(catalog.get("abc").unwrap().symbol, "fEUR");
        assert_eq!(catalog.get("0xABC").unwrap().symbol, "fEUR");
        assert!(catalog.get("def").is_none());
    }

    #[test]
    fn pyth_defaults_cover_all_synthetic_tokens() {
        let catalog = FeedCatalog::pyth_defaults("fUSD");
        assert_eq!(catalog.reference_symbol(), "fUSD");
        assert_eq!(
            catalog.symbols(),
            vec!["fCHF", "fEUR", "fGBP", "fINR", "fUSD", "fYEN"]
        );
        assert_eq!(catalog.get(PYTH_EUR_USD).unwrap().direction, FeedDirection::Direct);
        assert_eq!(catalog.get(PYTH_USD_JPY).unwrap().direction, FeedDirection::Inverse);
    }

    #[test]
    fn feed_ids_put_anchor_first() {
        let catalog = FeedCatalog::pyth_defaults("fUSD");
        let ids = catalog.feed_ids();
        assert_eq!(ids[0], PYTH_USDC_USD);
        assert_eq!(ids.len(), 6);
    }

    #[test]
    fn direction_units_per_quote() {
        assert!(approx(FeedDirection::Direct.units_per_quote(1.25), 0.8));
        assert!(approx(FeedDirection::Inverse.units_per_quote(150.0), 150.0));
    }

    #[test]
    fn direction_display() {
        assert_eq!(FeedDirection::Direct.to_string(), "Direct");
        assert_eq!(FeedDirection::Inverse.to_string(), "Inverse");
    }
}

// ═══════════════════════════════════════════════════════════════════
//  RateTable
// ═══════════════════════════════════════════════════════════════════

mod rate_table {
    use super::*;

    #[test]
    fn cross_rate_divides_reference_rates() {
        let table = RateTable::from_pairs([("fUSD", 1.0), ("fEUR", 0.85), ("fGBP", 0.73)]);
        assert!(approx(table.cross_rate("fEUR", "fUSD").unwrap(), 0.85));
        assert!(approx(table.cross_rate("fEUR", "fGBP").unwrap(), 0.85 / 0.73));
    }

    #[test]
    fn price_in_is_value_of_one_unit_in_base() {
        // 0.8 fEUR per fUSD: one fEUR is worth 1.25 fUSD.
        let table = RateTable::from_pairs([("fUSD", 1.0), ("fEUR", 0.8), ("fYEN", 150.0)]);
        assert!(approx(table.price_in("fEUR", "fUSD").unwrap(), 1.25));
        assert!(approx(table.price_in("fYEN", "fUSD").unwrap(), 1.0 / 150.0));
        assert!(approx(table.price_in("fYEN", "fEUR").unwrap(), 0.8 / 150.0));
        assert_eq!(table.price_in("fEUR", "fEUR"), Some(1.0));
        assert_eq!(table.price_in("fCHF", "fUSD"), None);
    }

    #[test]
    fn cross_rate_to_self_is_one() {
        let table = RateTable::default();
        assert_eq!(table.cross_rate("fXYZ", "fXYZ"), Some(1.0));
    }

    #[test]
    fn cross_rate_missing_side_is_none() {
        let table = RateTable::from_pairs([("fEUR", 0.85)]);
        assert_eq!(table.cross_rate("fEUR", "fUSD"), None);
        assert_eq!(table.cross_rate("fGBP", "fEUR"), None);
    }

    #[test]
    fn non_positive_rates_are_unusable() {
        let table = RateTable::from_pairs([("fEUR", 0.0), ("fGBP", -1.0), ("fYEN", f64::NAN)]);
        assert_eq!(table.rate("fEUR"), None);
        assert_eq!(table.rate("fGBP"), None);
        assert_eq!(table.rate("fYEN"), None);
    }

    #[test]
    fn fallback_fills_only_missing_symbols() {
        let fallback: HashMap<String, f64> =
            [("fEUR".to_string(), 0.85), ("fGBP".to_string(), 0.73)].into();
        let table = RateTable::from_pairs([("fEUR", 0.9)]).with_fallback(&fallback);
        assert_eq!(table.rate("fEUR"), Some(0.9));
        assert_eq!(table.rate("fGBP"), Some(0.73));
    }

    #[test]
    fn from_book_copies_rates() {
        let now = Utc::now();
        let mut rates = HashMap::new();
        rates.insert(
            "fEUR".to_string(),
            fxfusion_core::models::rate::Rate {
                symbol: "fEUR".into(),
                rate: 0.85,
                observed_at: now,
                change_24h: 0.0,
            },
        );
        let book = RateBook { rates, updated_at: now };
        let table = RateTable::from_book(&book);
        assert_eq!(table.len(), 1);
        assert_eq!(table.rate("fEUR"), Some(0.85));
    }

    #[test]
    fn staleness_display() {
        assert_eq!(Staleness::Fresh.to_string(), "fresh");
        assert_eq!(Staleness::Recent.to_string(), "recent");
        assert_eq!(Staleness::Stale.to_string(), "stale");
    }
}

// ═══════════════════════════════════════════════════════════════════
//  Basket / TokenAllocation
// ═══════════════════════════════════════════════════════════════════

mod basket {
    use super::*;

    #[test]
    fn new_token_starts_at_initial_price() {
        let token = TokenAllocation::new("fEUR", 100.0, 0.85, 50.0);
        assert_eq!(token.current_price, 0.85);
        assert_eq!(token.pnl, 0.0);
        assert_eq!(token.pnl_percentage, 0.0);
        assert!(token.price_history.is_empty());
        assert!(approx(token.initial_value(), 85.0));
    }

    #[test]
    fn new_basket_sums_initial_value() {
        let lock_end = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let basket = Basket::new(
            "b1",
            "Euro mix",
            vec![
                TokenAllocation::new("fEUR", 100.0, 0.85, 50.0),
                TokenAllocation::new("fGBP", 100.0, 0.73, 50.0),
            ],
            lock_end,
            "fUSD",
        );
        assert!(approx(basket.initial_value, 158.0));
        assert!(approx(basket.total_value, 158.0));
        assert_eq!(basket.performance, 0.0);
        assert!(approx(basket.pnl(), 0.0));
        assert_eq!(basket.token("fGBP").unwrap().amount, 100.0);
        assert!(basket.token("fYEN").is_none());
    }

    #[test]
    fn token_without_price_history_deserializes() {
        let json = r#"{
            "symbol": "fEUR", "amount": 1.0, "initial_price": 0.85,
            "current_price": 0.86, "weight": 100.0, "pnl": 0.01, "pnl_percentage": 1.17
        }"#;
        let token: TokenAllocation = serde_json::from_str(json).unwrap();
        assert!(token.price_history.is_empty());
    }

    #[test]
    fn user_balance_defaults_swapped_from() {
        let json = r#"{ "symbol": "fEUR", "balance": 12.5, "eligible": true }"#;
        let balance: UserBalance = serde_json::from_str(json).unwrap();
        assert_eq!(balance.swapped_from, None);
        assert!(balance.eligible);
    }
}

// ═══════════════════════════════════════════════════════════════════
//  Settings
// ═══════════════════════════════════════════════════════════════════

mod settings {
    use super::*;

    #[test]
    fn defaults_match_documented_constants() {
        let s = Settings::default();
        assert_eq!(s.refresh_interval_ms, 30_000);
        assert_eq!(s.recency_threshold_ms, 60_000);
        assert_eq!(s.stale_grace_ms, 300_000);
        assert_eq!(s.snapshot_fallback_interval_ms, 60_000);
        assert_eq!(s.snapshot_force_after_ms, 60_000);
        assert_eq!(s.snapshot_retention_ms, 7 * 24 * 60 * 60 * 1000);
        assert_eq!(s.snapshot_min_change, 0.01);
        assert_eq!(s.stream_reconnect_ms, 5_000);
        assert_eq!(s.reference_currency, "fUSD");
        assert_eq!(s.fallback_rates.get("fEUR"), Some(&0.85));
        assert_eq!(s.fallback_rates.get("fYEN"), Some(&110.0));
        assert!(s.validate().is_ok());
    }

    #[test]
    fn duration_accessors() {
        let s = Settings::default();
        assert_eq!(s.refresh_interval().as_secs(), 30);
        assert_eq!(s.stale_grace().as_secs(), 300);
        assert_eq!(s.snapshot_retention().as_secs(), 7 * 24 * 3600);
        assert_eq!(s.stream_reconnect_interval().as_secs(), 5);
    }

    #[test]
    fn blank_endpoint_is_config_missing() {
        let s = Settings {
            hermes_endpoint: "  ".into(),
            ..Settings::default()
        };
        assert!(matches!(s.validate(), Err(CoreError::ConfigMissing(_))));
    }

    #[test]
    fn blank_reference_is_config_missing() {
        let s = Settings {
            reference_currency: String::new(),
            ..Settings::default()
        };
        assert!(matches!(s.validate(), Err(CoreError::ConfigMissing(_))));
    }

    #[test]
    fn zero_interval_is_rejected() {
        let s = Settings {
            refresh_interval_ms: 0,
            ..Settings::default()
        };
        match s.validate() {
            Err(CoreError::ValidationError(msg)) => assert!(msg.contains("refresh_interval_ms")),
            other => panic!("Expected ValidationError, got {:?}", other),
        }
    }

    #[test]
    fn zero_stream_reconnect_is_rejected() {
        let s = Settings {
            stream_reconnect_ms: 0,
            ..Settings::default()
        };
        match s.validate() {
            Err(CoreError::ValidationError(msg)) => assert!(msg.contains("stream_reconnect_ms")),
            other => panic!("Expected ValidationError, got {:?}", other),
        }
    }

    #[test]
    fn negative_min_change_is_rejected() {
        let s = Settings {
            snapshot_min_change: -0.5,
            ..Settings::default()
        };
        assert!(matches!(s.validate(), Err(CoreError::ValidationError(_))));
    }

    #[test]
    fn non_positive_fallback_rate_is_rejected() {
        let mut s = Settings::default();
        s.fallback_rates.insert("fEUR".into(), 0.0);
        assert!(matches!(s.validate(), Err(CoreError::ValidationError(_))));
    }

    #[test]
    fn from_json_fills_defaults() {
        let s = Settings::from_json(r#"{ "refresh_interval_ms": 5000 }"#).unwrap();
        assert_eq!(s.refresh_interval_ms, 5000);
        assert_eq!(s.recency_threshold_ms, 60_000);
        assert_eq!(s.hermes_endpoint, "https://hermes.pyth.network");
    }

    #[test]
    fn from_json_validates() {
        let result = Settings::from_json(r#"{ "hermes_endpoint": "" }"#);
        assert!(matches!(result, Err(CoreError::ConfigMissing(_))));
    }

    #[test]
    fn from_json_rejects_garbage() {
        let result = Settings::from_json("not json");
        assert!(matches!(result, Err(CoreError::Deserialization(_))));
    }
}
