use chrono::{DateTime, Utc};

use crate::models::basket::{Basket, TokenAllocation};

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// `pnl / cost * 100`, or 0 when `cost` is not positive.
pub fn pnl_percentage(pnl: f64, cost: f64) -> f64 {
    if cost > 0.0 && cost.is_finite() {
        pnl / cost * 100.0
    } else {
        0.0
    }
}

fn usable(price: f64) -> Option<f64> {
    (price.is_finite() && price > 0.0).then_some(price)
}

/// Recompute `current_price`, `pnl` and `pnl_percentage` for one token.
///
/// A missing or non-positive lookup keeps the token's last known price,
/// or its initial price if it has none, so a gap in the feed never reads
/// as a total loss.
pub fn token_performance<F>(token: &TokenAllocation, lookup: F) -> TokenAllocation
where
    F: Fn(&str) -> Option<f64>,
{
    let current_price = lookup(token.symbol.as_str())
        .and_then(usable)
        .or_else(|| usable(token.current_price))
        .unwrap_or(token.initial_price);

    let initial_value = token.amount * token.initial_price;
    let pnl = token.amount * current_price - initial_value;

    TokenAllocation {
        current_price,
        pnl,
        pnl_percentage: pnl_percentage(pnl, initial_value),
        ..token.clone()
    }
}

/// Recompute every token and the basket totals from one price lookup.
///
/// `total_value` and `performance` always come from the same pass.
pub fn basket_performance<F>(basket: &Basket, lookup: F) -> Basket
where
    F: Fn(&str) -> Option<f64>,
{
    let tokens: Vec<TokenAllocation> = basket
        .tokens
        .iter()
        .map(|token| token_performance(token, &lookup))
        .collect();

    let total_value: f64 = tokens.iter().map(TokenAllocation::current_value).sum();
    let performance = pnl_percentage(total_value - basket.initial_value, basket.initial_value);

    Basket {
        tokens,
        total_value,
        performance,
        ..basket.clone()
    }
}

/// Whether the basket's lock period is still running at `now`.
pub fn is_locked(basket: &Basket, now: DateTime<Utc>) -> bool {
    now < basket.lock_end_date
}

/// Whole days until the lock ends, rounded up; 0 once unlocked.
pub fn days_remaining(basket: &Basket, now: DateTime<Utc>) -> i64 {
    let remaining_ms = (basket.lock_end_date - now).num_milliseconds();
    if remaining_ms <= 0 {
        return 0;
    }
    (remaining_ms + DAY_MS - 1) / DAY_MS
}
