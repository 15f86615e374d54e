use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-token figures captured inside a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenPerformance {
    pub symbol: String,
    pub price: f64,
    /// `amount * price` at capture time
    pub value: f64,
    pub pnl: f64,
    pub pnl_percentage: f64,
}

/// Immutable record of a basket's performance at one recompute pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSnapshot {
    pub timestamp: DateTime<Utc>,
    pub basket_id: String,
    pub total_value: f64,
    pub pnl: f64,
    pub pnl_percentage: f64,
    pub token_performances: Vec<TokenPerformance>,
}

impl PerformanceSnapshot {
    pub fn token(&self, symbol: &str) -> Option<&TokenPerformance> {
        self.token_performances.iter().find(|t| t.symbol == symbol)
    }
}

/// One point of a basket P&L chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PnlDataPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    pub pnl: f64,
    pub pnl_percentage: f64,
}

/// One point of a single-token price chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceHistoryPoint {
    pub timestamp: DateTime<Utc>,
    pub price: f64,
    pub pnl: f64,
}
