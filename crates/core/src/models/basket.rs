use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::history::PriceHistoryPoint;

/// A fixed quantity of one synthetic currency held inside a basket.
///
/// `amount`, `initial_price` and `weight` are set at mint time and never
/// change. `current_price`, `pnl` and `pnl_percentage` are derived and
/// recomputed together by the performance calculator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenAllocation {
    /// Token symbol (e.g., "fEUR")
    pub symbol: String,

    /// Quantity held
    pub amount: f64,

    /// Value of one token in the basket's base currency at creation
    pub initial_price: f64,

    /// Latest value of one token in the basket's base currency
    pub current_price: f64,

    /// Allocation percentage at creation
    pub weight: f64,

    pub pnl: f64,

    pub pnl_percentage: f64,

    /// Carried for data compatibility only. History is owned by the
    /// performance tracker and this list is never appended to.
    #[serde(default)]
    pub price_history: Vec<PriceHistoryPoint>,
}

impl TokenAllocation {
    /// New allocation priced at its initial rate, so P&L starts at zero.
    pub fn new(symbol: impl Into<String>, amount: f64, initial_price: f64, weight: f64) -> Self {
        Self {
            symbol: symbol.into(),
            amount,
            initial_price,
            current_price: initial_price,
            weight,
            pnl: 0.0,
            pnl_percentage: 0.0,
            price_history: Vec::new(),
        }
    }

    /// Value at creation: `amount * initial_price`.
    pub fn initial_value(&self) -> f64 {
        self.amount * self.initial_price
    }

    /// Value at the latest price: `amount * current_price`.
    pub fn current_value(&self) -> f64 {
        self.amount * self.current_price
    }
}

/// An NFT-backed portfolio of synthetic fiat tokens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Basket {
    pub id: String,

    pub name: String,

    pub tokens: Vec<TokenAllocation>,

    /// Sum of `amount * initial_price` at creation. Immutable.
    pub initial_value: f64,

    /// Sum of `amount * current_price`. Derived.
    pub total_value: f64,

    /// Percentage change of `total_value` against `initial_value`. Derived.
    pub performance: f64,

    /// Tokens cannot be withdrawn before this instant.
    pub lock_end_date: DateTime<Utc>,

    /// Currency the basket is valued in (e.g., "fUSD").
    pub base_currency: String,
}

impl Basket {
    /// Build a freshly minted basket. `initial_value` and `total_value`
    /// are both taken from the tokens' initial prices.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        tokens: Vec<TokenAllocation>,
        lock_end_date: DateTime<Utc>,
        base_currency: impl Into<String>,
    ) -> Self {
        let initial_value = tokens.iter().map(TokenAllocation::initial_value).sum();
        Self {
            id: id.into(),
            name: name.into(),
            tokens,
            initial_value,
            total_value: initial_value,
            performance: 0.0,
            lock_end_date,
            base_currency: base_currency.into(),
        }
    }

    /// Absolute profit or loss against the creation value.
    pub fn pnl(&self) -> f64 {
        self.total_value - self.initial_value
    }

    pub fn token(&self, symbol: &str) -> Option<&TokenAllocation> {
        self.tokens.iter().find(|t| t.symbol == symbol)
    }
}

/// Wallet balance of one synthetic token, as reported by the contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserBalance {
    pub symbol: String,
    pub balance: f64,
    #[serde(default)]
    pub swapped_from: Option<String>,
    pub eligible: bool,
}
