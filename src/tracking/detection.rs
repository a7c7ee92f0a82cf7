//! Two-stage detection: pairs crossing the change threshold start being
//! tracked, and tracked pairs rising fast enough over their baseline inside
//! the pump window produce a pump event.
//!
//! [`detect`] only computes. [`Detection::apply`] performs the registry
//! mutation, and the session dispatches notifications.

use crate::config::Thresholds;
use crate::tracking::registry::Registry;
use crate::types::{MarketSnapshot, PumpEvent, TrackedSymbol};
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::{debug, info};

/// Outcome of one detection tick.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Detection {
    /// Newly tracked symbols, highest change first.
    pub qualified: Vec<TrackedSymbol>,
    /// Tracked symbols that cooled off.
    pub evicted: Vec<String>,
    pub pumps: Vec<PumpEvent>,
}

impl Detection {
    pub fn is_empty(&self) -> bool {
        self.qualified.is_empty() && self.evicted.is_empty() && self.pumps.is_empty()
    }

    /// Writes the outcome into the registry.
    pub fn apply(&self, registry: &Registry) {
        for symbol in &self.qualified {
            // Another loop sharing the registry may have added it since our copy.
            registry.insert_if_absent(symbol.clone());
        }
        for symbol in &self.evicted {
            registry.remove(symbol);
        }
        for pump in &self.pumps {
            // Re-read so a concurrent refresh of the same key is not rolled back.
            if let Some(current) = registry.get(&pump.symbol) {
                registry.upsert(TrackedSymbol {
                    pump_notified: true,
                    ..current
                });
            }
        }
    }
}

/// Orders by change percent descending, then identifier ascending.
pub fn by_change_desc(a: &TrackedSymbol, b: &TrackedSymbol) -> Ordering {
    b.change_percent
        .total_cmp(&a.change_percent)
        .then_with(|| a.symbol.cmp(&b.symbol))
}

/// `current / reference - 1`, or `None` when there is nothing meaningful to divide.
pub fn pump_ratio(reference_price: f64, current_price: f64) -> Option<f64> {
    if !reference_price.is_finite() || reference_price <= 0.0 || !current_price.is_finite() {
        return None;
    }
    Some(current_price / reference_price - 1.0)
}

/// True once more than `window` has passed since tracking began.
pub fn window_elapsed(symbol: &TrackedSymbol, window: std::time::Duration, now: DateTime<Utc>) -> bool {
    // A negative elapsed time (clock stepped back) counts as inside the window.
    now.signed_duration_since(symbol.tracked_since)
        .to_std()
        .map(|elapsed| elapsed > window)
        .unwrap_or(false)
}

/// Runs the qualification, eviction and pump passes over one snapshot.
///
/// `tracked` is the registry content at the start of the tick. Symbols
/// qualified on this tick are not evicted or pump-checked until the next one.
pub fn detect(
    snapshot: &MarketSnapshot,
    tracked: &HashMap<String, TrackedSymbol>,
    thresholds: &Thresholds,
    now: DateTime<Utc>,
) -> Detection {
    let threshold = thresholds.change_threshold_percent;

    let mut qualified: Vec<TrackedSymbol> = snapshot
        .prices
        .iter()
        .filter(|(symbol, _)| !tracked.contains_key(symbol.as_str()))
        .filter_map(|(symbol, &price)| {
            let change = snapshot.change_percent(symbol)?;
            (change >= threshold).then(|| TrackedSymbol::new(symbol, price, change, now))
        })
        .collect();
    qualified.sort_by(by_change_desc);

    let mut current: Vec<&TrackedSymbol> = tracked.values().collect();
    current.sort_by(|a, b| a.symbol.cmp(&b.symbol));

    let mut evicted = Vec::new();
    let mut pumps = Vec::new();

    for symbol in current {
        // A pair missing from the change feed, or with a non-finite figure, counts as cooled off.
        let change = snapshot
            .change_percent(&symbol.symbol)
            .filter(|c| c.is_finite());
        if change.map_or(true, |c| c <= threshold) {
            evicted.push(symbol.symbol.clone());
            continue;
        }

        if symbol.pump_notified || window_elapsed(symbol, thresholds.pump_window, now) {
            continue;
        }

        let Some(current_price) = snapshot.price(&symbol.symbol) else {
            continue;
        };
        let Some(ratio) = pump_ratio(symbol.reference_price, current_price) else {
            continue;
        };

        if ratio >= thresholds.pump_threshold_ratio {
            info!(
                "Pump {}: {:.5}% over baseline {} (now {})",
                symbol.symbol,
                ratio * 100.0,
                symbol.reference_price,
                current_price
            );
            pumps.push(PumpEvent {
                symbol: symbol.symbol.clone(),
                reference_price: symbol.reference_price,
                current_price,
                change_percent: symbol.change_percent,
                detected_at: now,
            });
        } else {
            debug!("No pump {}: {:.5}% over baseline", symbol.symbol, ratio * 100.0);
        }
    }

    Detection {
        qualified,
        evicted,
        pumps,
    }
}
