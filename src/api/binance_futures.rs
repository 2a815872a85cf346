use super::binance::{map_error, parse_decimal};
use super::{ClientError, ClientResult, DerivativesClient};
use crate::models::{FundingSnapshot, OrderBookSummary};
use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

pub const BINANCE_FUTURES_API_BASE: &str = "https://fapi.binance.com";

/// Levels requested per side; the endpoint only accepts fixed sizes
const DEPTH_LIMIT: usize = 100;

/// Binance USD-M perpetual futures client (public endpoints, no key)
#[derive(Clone)]
pub struct BinanceFuturesClient {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PremiumIndex {
    mark_price: String,
    last_funding_rate: String,
    #[serde(default)]
    next_funding_time: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OpenInterest {
    open_interest: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LongShortEntry {
    long_short_ratio: String,
}

#[derive(Debug, Deserialize)]
struct Depth {
    bids: Vec<Vec<Value>>,
    asks: Vec<Vec<Value>>,
}

impl BinanceFuturesClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn get(&self, path: &str, query: &[(&str, String)]) -> ClientResult<String> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.client.get(&url).query(query).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if status.is_success() {
            return Ok(body);
        }

        Err(map_error(status, &body))
    }
}

fn parse_str(value: &str, field: &str) -> ClientResult<f64> {
    value
        .parse::<f64>()
        .map_err(|e| ClientError::Decode(format!("{}: {}", field, e)))
}

/// Depth rows look like `["price", "quantity"]`
fn parse_levels(rows: &[Vec<Value>]) -> ClientResult<Vec<(f64, f64)>> {
    rows.iter()
        .map(|row| match row.as_slice() {
            [price, qty, ..] => Ok((parse_decimal(price, "price")?, parse_decimal(qty, "quantity")?)),
            _ => Err(ClientError::Decode("depth level has fewer than 2 fields".to_string())),
        })
        .collect()
}

#[async_trait]
impl DerivativesClient for BinanceFuturesClient {
    async fn funding(&self, symbol: &str) -> ClientResult<FundingSnapshot> {
        let body = self
            .get("/fapi/v1/premiumIndex", &[("symbol", symbol.to_uppercase())])
            .await?;
        let index: PremiumIndex = serde_json::from_str(&body)?;

        Ok(FundingSnapshot {
            mark_price: parse_str(&index.mark_price, "markPrice")?,
            funding_rate_pct: parse_str(&index.last_funding_rate, "lastFundingRate")? * 100.0,
            next_funding_time: index
                .next_funding_time
                .filter(|ms| *ms > 0)
                .and_then(DateTime::<Utc>::from_timestamp_millis),
        })
    }

    async fn open_interest(&self, symbol: &str) -> ClientResult<f64> {
        let body = self
            .get("/fapi/v1/openInterest", &[("symbol", symbol.to_uppercase())])
            .await?;
        let oi: OpenInterest = serde_json::from_str(&body)?;
        parse_str(&oi.open_interest, "openInterest")
    }

    async fn long_short_ratio(&self, symbol: &str) -> ClientResult<f64> {
        let body = self
            .get(
                "/futures/data/topLongShortPositionRatio",
                &[
                    ("symbol", symbol.to_uppercase()),
                    ("period", "1h".to_string()),
                    ("limit", "1".to_string()),
                ],
            )
            .await?;
        let entries: Vec<LongShortEntry> = serde_json::from_str(&body)?;
        let latest = entries
            .last()
            .ok_or_else(|| ClientError::Decode("empty long/short ratio data".to_string()))?;
        parse_str(&latest.long_short_ratio, "longShortRatio")
    }

    async fn order_book(&self, symbol: &str, walls: usize) -> ClientResult<OrderBookSummary> {
        let body = self
            .get(
                "/fapi/v1/depth",
                &[
                    ("symbol", symbol.to_uppercase()),
                    ("limit", DEPTH_LIMIT.to_string()),
                ],
            )
            .await?;
        let depth: Depth = serde_json::from_str(&body)?;
        let bids = parse_levels(&depth.bids)?;
        let asks = parse_levels(&depth.asks)?;

        tracing::debug!(symbol, bids = bids.len(), asks = asks.len(), "Fetched order book");

        OrderBookSummary::from_depth(&bids, &asks, walls)
            .ok_or_else(|| ClientError::Decode("order book has an empty side".to_string()))
    }
}
