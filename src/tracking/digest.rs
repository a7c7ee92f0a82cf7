use crate::tracking::detection::by_change_desc;
use crate::types::{MarketSnapshot, PumpEvent, TrackedSymbol};
use std::collections::HashMap;
use std::fmt::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trend {
    Up,
    Down,
    Flat,
}

impl Trend {
    pub fn between(previous: f64, current: f64) -> Self {
        if current > previous {
            Trend::Up
        } else if current < previous {
            Trend::Down
        } else {
            Trend::Flat
        }
    }

    fn marker(self) -> &'static str {
        match self {
            Trend::Up => "📈",
            Trend::Down => "📉",
            Trend::Flat => "🔹",
        }
    }
}

/// One line of the periodic status digest.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusEntry {
    /// The record with fresh observation fields applied.
    pub symbol: TrackedSymbol,
    pub trend: Trend,
}

/// Up to 8 decimals, trailing zeros trimmed.
pub fn format_price(price: f64) -> String {
    let text = format!("{:.8}", price);
    text.trim_end_matches('0').trim_end_matches('.').to_string()
}

/// `ABCUSDT` -> `ABC / USDT`; identifiers without the quote suffix are left alone.
pub fn display_pair(symbol: &str, quote_asset: &str) -> String {
    match symbol.strip_suffix(quote_asset) {
        Some(base) if !base.is_empty() && !quote_asset.is_empty() => format!("{} / {}", base, quote_asset),
        _ => symbol.to_string(),
    }
}

fn line(marker: &str, symbol: &str, price: f64, change_percent: f64, quote_asset: &str) -> String {
    format!(
        "{} {} P: {} Ch24h: {:.2}%",
        marker,
        display_pair(symbol, quote_asset),
        format_price(price),
        change_percent
    )
}

/// Digest of newly tracked symbols. `None` when there is nothing to report.
pub fn render_qualified(symbols: &[TrackedSymbol], quote_asset: &str) -> Option<String> {
    if symbols.is_empty() {
        return None;
    }
    let mut sorted = symbols.to_vec();
    sorted.sort_by(by_change_desc);

    let mut message = String::new();
    for symbol in &sorted {
        let _ = writeln!(
            message,
            "{}",
            line("✅", &symbol.symbol, symbol.reference_price, symbol.change_percent, quote_asset)
        );
    }
    Some(message)
}

/// Builds refreshed records for every tracked symbol, highest change first.
/// Symbols missing from the snapshot keep their last known values.
pub fn status_entries(snapshot: &MarketSnapshot, tracked: &HashMap<String, TrackedSymbol>) -> Vec<StatusEntry> {
    let mut entries: Vec<StatusEntry> = tracked
        .values()
        .map(|symbol| {
            let price = snapshot.price(&symbol.symbol).unwrap_or(symbol.last_observed_price);
            let change = snapshot.change_percent(&symbol.symbol).unwrap_or(symbol.change_percent);
            StatusEntry {
                symbol: symbol.refreshed(price, change),
                trend: Trend::between(symbol.last_observed_price, price),
            }
        })
        .collect();
    entries.sort_by(|a, b| by_change_desc(&a.symbol, &b.symbol));
    entries
}

pub fn render_status(entries: &[StatusEntry], quote_asset: &str) -> Option<String> {
    if entries.is_empty() {
        return None;
    }
    let mut message = String::new();
    for entry in entries {
        let symbol = &entry.symbol;
        let _ = writeln!(
            message,
            "{}",
            line(
                entry.trend.marker(),
                &symbol.symbol,
                symbol.last_observed_price,
                symbol.change_percent,
                quote_asset
            )
        );
    }
    Some(message)
}

pub fn render_pump(pump: &PumpEvent, quote_asset: &str) -> String {
    format!(
        "{} (PrP: {})",
        line("🚀", &pump.symbol, pump.current_price, pump.change_percent, quote_asset),
        format_price(pump.reference_price)
    )
}
