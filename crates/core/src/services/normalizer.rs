use std::collections::HashMap;

use crate::errors::CoreError;
use crate::models::feed::{normalize_feed_id, FeedCatalog, FeedSpec};
use crate::models::rate::RawTick;

/// Result of one normalization pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedRates {
    /// Symbol → units of symbol per one reference unit.
    pub rates: HashMap<String, f64>,

    /// Symbols whose tick was present but unusable this pass.
    pub rejected: Vec<String>,
}

/// Convert a batch of raw ticks into `symbol -> rate against reference`.
///
/// 1. Ticks are indexed by normalized feed id; for duplicate ids the most
///    recently published tick wins. Unknown ids are ignored.
/// 2. The reference anchor (if the catalog has one) must be present and
///    positive, otherwise the whole pass fails with `InvalidRate`.
/// 3. Every other feed is converted to units-per-quote according to its
///    direction, then divided by the anchor's units-per-quote.
///    A non-positive tick rejects only its own symbol.
///
/// The reference symbol itself is always present with rate 1.0.
pub fn normalize(ticks: &[RawTick], catalog: &FeedCatalog) -> Result<NormalizedRates, CoreError> {
    let mut latest: HashMap<String, &RawTick> = HashMap::new();
    for tick in ticks {
        let id = normalize_feed_id(&tick.feed_id);
        match latest.get(&id) {
            Some(existing) if existing.publish_time > tick.publish_time => {}
            _ => {
                latest.insert(id, tick);
            }
        }
    }

    let reference = catalog.reference_symbol();
    let reference_units = match catalog.anchor() {
        Some(anchor) => anchor_units_per_quote(anchor, latest.get(&anchor.feed_id).copied())?,
        None => 1.0,
    };

    let mut result = NormalizedRates::default();
    for (id, tick) in &latest {
        if catalog.anchor().is_some_and(|a| &a.feed_id == id) {
            continue;
        }
        let Some(spec) = catalog.get(id) else {
            log::debug!("Ignoring unknown feed id {id}");
            continue;
        };
        if spec.symbol == reference {
            continue;
        }

        match units_per_quote(spec, tick) {
            Ok(units) => {
                result.rates.insert(spec.symbol.clone(), units / reference_units);
            }
            Err(e) => {
                log::warn!("Rejecting tick for {}: {e}", spec.symbol);
                result.rejected.push(spec.symbol.clone());
            }
        }
    }

    result.rates.insert(reference.to_string(), 1.0);
    result.rejected.sort();
    Ok(result)
}

fn anchor_units_per_quote(anchor: &FeedSpec, tick: Option<&RawTick>) -> Result<f64, CoreError> {
    let tick = tick.ok_or_else(|| CoreError::InvalidRate {
        symbol: anchor.symbol.clone(),
        reason: "reference rate missing from feed batch".into(),
    })?;
    units_per_quote(anchor, tick)
}

fn units_per_quote(spec: &FeedSpec, tick: &RawTick) -> Result<f64, CoreError> {
    if tick.mantissa <= 0 {
        return Err(CoreError::InvalidRate {
            symbol: spec.symbol.clone(),
            reason: format!("non-positive mantissa {}", tick.mantissa),
        });
    }
    let units = spec.direction.units_per_quote(tick.value());
    if !units.is_finite() || units <= 0.0 {
        return Err(CoreError::InvalidRate {
            symbol: spec.symbol.clone(),
            reason: format!(
                "value {}e{} is out of range",
                tick.mantissa, tick.exponent
            ),
        });
    }
    Ok(units)
}

