use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// Pyth price feed ids (identical across networks).
pub const PYTH_EUR_USD: &str = "a995d00bb36a63cef7fd2c287dc105fc8f3d93779f062f09551b0af3e81ec30b";
pub const PYTH_GBP_USD: &str = "84c2dde9633d93d1bcad84e7dc41c9d56578b7ec52fabedc1f335d673df0a7c1";
pub const PYTH_USD_JPY: &str = "ef2c98c804ba503c6a707e38be4dfbb16683775f195b091252bf24693042fd52";
pub const PYTH_USD_CHF: &str = "0b1e3297e69f162877b577b0d6a47a0d63b2392bc8499e6540da4187a63e28f8";
pub const PYTH_USD_INR: &str = "0ac0f9a2886fc2dd708bc66cc2cea359052ce89d324f45d95fadbc6c4fcf1809";
pub const PYTH_USDC_USD: &str = "eaa020c61cc479712813461ce153894a96a6c00b21ed0cfc2798d1f9a9e9c94a";

/// Which way a feed quotes its pair.
///
/// Feeds are quoted against a common quote currency (USD for Pyth FX feeds).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FeedDirection {
    /// Quote currency per one unit of the symbol (EUR/USD = 1.08).
    Direct,
    /// Units of the symbol per one unit of quote currency (USD/JPY = 150).
    Inverse,
}

impl FeedDirection {
    /// How many units of the symbol one unit of quote currency buys.
    /// `value` must already be checked to be positive.
    pub fn units_per_quote(self, value: f64) -> f64 {
        match self {
            FeedDirection::Direct => 1.0 / value,
            FeedDirection::Inverse => value,
        }
    }
}

impl std::fmt::Display for FeedDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeedDirection::Direct => write!(f, "Direct"),
            FeedDirection::Inverse => write!(f, "Inverse"),
        }
    }
}

/// Semantic meaning of one feed id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedSpec {
    /// Normalized feed id (lowercase hex, no `0x`).
    pub feed_id: String,

    /// Symbol this feed prices (e.g., "fEUR").
    pub symbol: String,

    pub direction: FeedDirection,
}

impl FeedSpec {
    pub fn new(feed_id: &str, symbol: impl Into<String>, direction: FeedDirection) -> Self {
        Self {
            feed_id: normalize_feed_id(feed_id),
            symbol: symbol.into(),
            direction,
        }
    }
}

/// Lowercase, strip an optional `0x` prefix. Providers are inconsistent
/// about both.
pub fn normalize_feed_id(raw: &str) -> String {
    let trimmed = raw.trim();
    let stripped = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    stripped.to_ascii_lowercase()
}

/// Static mapping from feed id to the symbol it prices.
///
/// The optional anchor feed prices the reference currency itself against
/// the quote currency. Without one, the reference is taken to be worth
/// exactly one unit of quote currency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedCatalog {
    reference_symbol: String,
    anchor: Option<FeedSpec>,
    feeds: HashMap<String, FeedSpec>,
}

impl FeedCatalog {
    pub fn new(reference_symbol: impl Into<String>) -> Self {
        Self {
            reference_symbol: reference_symbol.into(),
            anchor: None,
            feeds: HashMap::new(),
        }
    }

    /// Catalog for the Pyth FX feeds backing the synthetic fiat tokens.
    pub fn pyth_defaults(reference_symbol: impl Into<String>) -> Self {
        let reference_symbol = reference_symbol.into();
        let mut catalog = Self::new(reference_symbol.clone())
            .with_anchor(FeedSpec::new(PYTH_USDC_USD, reference_symbol, FeedDirection::Direct));
        catalog.add(FeedSpec::new(PYTH_EUR_USD, "fEUR", FeedDirection::Direct));
        catalog.add(FeedSpec::new(PYTH_GBP_USD, "fGBP", FeedDirection::Direct));
        catalog.add(FeedSpec::new(PYTH_USD_JPY, "fYEN", FeedDirection::Inverse));
        catalog.add(FeedSpec::new(PYTH_USD_CHF, "fCHF", FeedDirection::Inverse));
        catalog.add(FeedSpec::new(PYTH_USD_INR, "fINR", FeedDirection::Inverse));
        catalog
    }

    pub fn with_anchor(mut self, anchor: FeedSpec) -> Self {
        self.anchor = Some(anchor);
        self
    }

    /// Register a feed. A later spec for the same id replaces the earlier one.
    pub fn add(&mut self, spec: FeedSpec) {
        self.feeds.insert(spec.feed_id.clone(), spec);
    }

    pub fn reference_symbol(&self) -> &str {
        &self.reference_symbol
    }

    pub fn anchor(&self) -> Option<&FeedSpec> {
        self.anchor.as_ref()
    }

    /// Look up a feed by id in any casing, with or without `0x`.
    pub fn get(&self, feed_id: &str) -> Option<&FeedSpec> {
        self.feeds.get(&normalize_feed_id(feed_id))
    }

    pub fn len(&self) -> usize {
        self.feeds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.feeds.is_empty()
    }

    /// Every id that must be requested from a provider, anchor first.
    pub fn feed_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.feeds.keys().cloned().collect();
        ids.sort();
        if let Some(anchor) = &self.anchor {
            ids.retain(|id| id != &anchor.feed_id);
            ids.insert(0, anchor.feed_id.clone());
        }
        ids
    }

    /// Symbols this catalog can produce, including the reference.
    pub fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.feeds.values().map(|f| f.symbol.clone()).collect();
        symbols.push(self.reference_symbol.clone());
        symbols.sort();
        symbols.dedup();
        symbols
    }
}
