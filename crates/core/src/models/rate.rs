use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A raw price tick as delivered by a feed provider.
///
/// The price is `mantissa * 10^exponent`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTick {
    pub feed_id: String,
    pub mantissa: i64,
    pub exponent: i32,
    /// Unix seconds at which the provider published this price.
    pub publish_time: i64,
}

impl RawTick {
    pub fn new(feed_id: impl Into<String>, mantissa: i64, exponent: i32, publish_time: i64) -> Self {
        Self {
            feed_id: feed_id.into(),
            mantissa,
            exponent,
            publish_time,
        }
    }

    /// Scaled value of this tick.
    pub fn value(&self) -> f64 {
        self.mantissa as f64 * 10f64.powi(self.exponent)
    }
}

/// Latest normalized rate for one symbol.
///
/// `rate` is the number of symbol units one reference unit buys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rate {
    pub symbol: String,
    pub rate: f64,
    pub observed_at: DateTime<Utc>,
    /// Percent change against the previously cached rate (0 on first sight).
    pub change_24h: f64,
}

/// One complete, immutable rate mapping, produced by a single refresh.
///
/// Replaced wholesale on every successful update; subscribers receive it
/// behind an `Arc` so all of them see the same batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateBook {
    pub rates: HashMap<String, Rate>,
    pub updated_at: DateTime<Utc>,
}

impl RateBook {
    pub fn get(&self, symbol: &str) -> Option<&Rate> {
        self.rates.get(symbol)
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }
}

/// Plain `symbol -> rate` lookup used by performance calculations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RateTable {
    rates: HashMap<String, f64>,
}

impl RateTable {
    pub fn new(rates: HashMap<String, f64>) -> Self {
        Self { rates }
    }

    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, f64)>) -> Self {
        Self {
            rates: pairs
                .into_iter()
                .map(|(symbol, rate)| (symbol.to_string(), rate))
                .collect(),
        }
    }

    pub fn from_book(book: &RateBook) -> Self {
        Self {
            rates: book
                .rates
                .iter()
                .map(|(symbol, rate)| (symbol.clone(), rate.rate))
                .collect(),
        }
    }

    /// Fill symbols missing from this table from `fallback`.
    pub fn with_fallback(mut self, fallback: &HashMap<String, f64>) -> Self {
        for (symbol, rate) in fallback {
            self.rates.entry(symbol.clone()).or_insert(*rate);
        }
        self
    }

    /// Rate for `symbol`, only if it is a usable positive number.
    pub fn rate(&self, symbol: &str) -> Option<f64> {
        self.rates
            .get(symbol)
            .copied()
            .filter(|r| r.is_finite() && *r > 0.0)
    }

    /// Units of `symbol` that one unit of `base` buys.
    pub fn cross_rate(&self, symbol: &str, base: &str) -> Option<f64> {
        if symbol == base {
            return Some(1.0);
        }
        let symbol_rate = self.rate(symbol)?;
        let base_rate = self.rate(base)?;
        Some(symbol_rate / base_rate)
    }

    /// Value of one unit of `symbol` expressed in `base`.
    ///
    /// This is what a token is worth inside a basket valued in `base`:
    /// a stronger `symbol` gives a higher price.
    pub fn price_in(&self, symbol: &str, base: &str) -> Option<f64> {
        self.cross_rate(base, symbol)
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }

    pub fn as_map(&self) -> &HashMap<String, f64> {
        &self.rates
    }
}

/// Trust classification of cached price data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Staleness {
    /// Updated within the last refresh interval.
    Fresh,
    /// Older than one refresh interval but within the recency threshold.
    Recent,
    /// Never updated, or older than the recency threshold.
    Stale,
}

impl std::fmt::Display for Staleness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Staleness::Fresh => write!(f, "fresh"),
            Staleness::Recent => write!(f, "recent"),
            Staleness::Stale => write!(f, "stale"),
        }
    }
}

/// What the UI needs to decide on a "using fallback rates" badge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataQuality {
    pub is_stale: bool,
    pub last_update: Option<DateTime<Utc>>,
    pub staleness: Staleness,
}
