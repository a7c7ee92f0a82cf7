use crate::error::SourceError;
use crate::types::MarketSnapshot;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

/// Anything that can hand out current prices and 24h change percents.
/// The two calls are independent; nothing makes them atomic.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn get_prices(&self) -> Result<Vec<(String, f64)>, SourceError>;
    async fn get_change_percents(&self) -> Result<Vec<(String, f64)>, SourceError>;
}

/// Pulls both halves of a snapshot. Either call failing fails the whole snapshot.
pub async fn fetch_snapshot(source: &dyn SnapshotSource) -> Result<MarketSnapshot, SourceError> {
    let prices = source.get_prices().await?;
    let change_percents = source.get_change_percents().await?;
    Ok(MarketSnapshot::new(prices, change_percents))
}

#[derive(Debug, Deserialize)]
pub struct TickerPrice {
    pub symbol: String,
    pub price: String,
}

#[allow(non_snake_case)]
#[derive(Debug, Deserialize)]
pub struct Ticker24hr {
    pub symbol: String,
    pub priceChangePercent: String,
}

pub struct Binance {
    client: Client,
    base_url: String,
    quote_asset: String,
}

impl Binance {
    pub fn new(base_url: &str, quote_asset: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            quote_asset: quote_asset.to_string(),
        }
    }

    pub fn quote_asset(&self) -> &str {
        &self.quote_asset
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, endpoint: &str) -> Result<T, SourceError> {
        let url = format!("{}/{}", self.base_url, endpoint);
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
            });
        }
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| SourceError::Malformed(format!("{}: {}", endpoint, e)))
    }

    /// Latest price for every symbol.
    pub async fn get_all_ticker_price(&self) -> Result<Vec<TickerPrice>, SourceError> {
        self.get_json("ticker/price").await
    }

    /// Fetches aggregated 24hr ticker data for all symbols in one call.
    pub async fn get_all_ticker_24hr(&self) -> Result<Vec<Ticker24hr>, SourceError> {
        self.get_json("ticker/24hr").await
    }
}

/// Keeps pairs quoted in `quote_asset` whose price parses to a finite number; anything else is dropped.
pub fn quoted_prices(tickers: Vec<TickerPrice>, quote_asset: &str) -> Vec<(String, f64)> {
    tickers
        .into_iter()
        .filter(|t| t.symbol.ends_with(quote_asset))
        .filter_map(|t| finite(&t.price).map(|price| (t.symbol, price)))
        .collect()
}

// "NaN" and "inf" parse as f64, so parsing alone is not enough.
fn finite(value: &str) -> Option<f64> {
    value.parse::<f64>().ok().filter(|v| v.is_finite())
}

pub fn change_percents(tickers: Vec<Ticker24hr>, quote_asset: &str) -> Vec<(String, f64)> {
    tickers
        .into_iter()
        .filter(|t| t.symbol.ends_with(quote_asset))
        .filter_map(|t| finite(&t.priceChangePercent).map(|change| (t.symbol, change)))
        .collect()
}

#[async_trait]
impl SnapshotSource for Binance {
    async fn get_prices(&self) -> Result<Vec<(String, f64)>, SourceError> {
        let prices = quoted_prices(self.get_all_ticker_price().await?, &self.quote_asset);
        debug!("Fetched {} {} prices", prices.len(), self.quote_asset);
        Ok(prices)
    }

    async fn get_change_percents(&self) -> Result<Vec<(String, f64)>, SourceError> {
        let changes = change_percents(self.get_all_ticker_24hr().await?, &self.quote_asset);
        debug!("Fetched {} 24h change percents", changes.len());
        Ok(changes)
    }
}
