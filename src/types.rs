use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A pair currently under observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedSymbol {
    pub symbol: String,
    /// Price at first qualification, the pump baseline. Never rewritten while tracked.
    pub reference_price: f64,
    /// Price seen on the latest status digest.
    pub last_observed_price: f64,
    pub change_percent: f64,
    pub tracked_since: DateTime<Utc>,
    pub pump_notified: bool,
}

impl TrackedSymbol {
    pub fn new(symbol: &str, price: f64, change_percent: f64, now: DateTime<Utc>) -> Self {
        Self {
            symbol: symbol.to_string(),
            reference_price: price,
            last_observed_price: price,
            change_percent,
            tracked_since: now,
            pump_notified: false,
        }
    }

    /// Copy with refreshed observation fields; baseline, start time and pump flag are kept.
    pub fn refreshed(&self, price: f64, change_percent: f64) -> Self {
        Self {
            last_observed_price: price,
            change_percent,
            ..self.clone()
        }
    }
}

/// Prices and 24h change percents from one poll. The two maps come from
/// separate calls and may not cover the same pairs.
#[derive(Debug, Clone, Default)]
pub struct MarketSnapshot {
    pub prices: HashMap<String, f64>,
    pub change_percents: HashMap<String, f64>,
}

impl MarketSnapshot {
    pub fn new(prices: Vec<(String, f64)>, change_percents: Vec<(String, f64)>) -> Self {
        Self {
            prices: prices.into_iter().collect(),
            change_percents: change_percents.into_iter().collect(),
        }
    }

    pub fn price(&self, symbol: &str) -> Option<f64> {
        self.prices.get(symbol).copied()
    }

    pub fn change_percent(&self, symbol: &str) -> Option<f64> {
        self.change_percents.get(symbol).copied()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PumpEvent {
    pub symbol: String,
    pub reference_price: f64,
    pub current_price: f64,
    pub change_percent: f64,
    pub detected_at: DateTime<Utc>,
}

impl PumpEvent {
    /// Fractional rise over the baseline, e.g. 0.06 for +6%.
    pub fn ratio(&self) -> f64 {
        self.current_price / self.reference_price - 1.0
    }
}
