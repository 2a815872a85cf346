use super::{ClientError, ClientResult, MarketOverviewClient};
use crate::models::GlobalMarket;
use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

pub const COINGECKO_API_BASE: &str = "https://api.coingecko.com/api/v3";

/// CoinGecko global market statistics
///
/// Works keyless; a demo API key raises the upstream rate limit.
#[derive(Clone)]
pub struct CoinGeckoClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GlobalResponse {
    data: GlobalData,
}

#[derive(Debug, Deserialize)]
struct GlobalData {
    #[serde(default)]
    active_cryptocurrencies: u64,
    total_market_cap: HashMap<String, f64>,
    total_volume: HashMap<String, f64>,
    market_cap_percentage: HashMap<String, f64>,
    market_cap_change_percentage_24h_usd: f64,
}

impl CoinGeckoClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }
}

fn usd(map: &HashMap<String, f64>, field: &str) -> ClientResult<f64> {
    map.get("usd")
        .copied()
        .ok_or_else(|| ClientError::Decode(format!("{}: no usd entry", field)))
}

#[async_trait]
impl MarketOverviewClient for CoinGeckoClient {
    async fn global_market(&self) -> ClientResult<GlobalMarket> {
        let url = format!("{}/global", self.base_url);
        let mut request = self.client.get(&url);
        if let Some(key) = &self.api_key {
            request = request.query(&[("x_cg_demo_api_key", key.as_str())]);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::from_status(status, &body));
        }

        let global: GlobalResponse = response.json().await?;
        let data = global.data;
        let dominance = |coin: &str| data.market_cap_percentage.get(coin).copied().unwrap_or(0.0);

        Ok(GlobalMarket {
            total_market_cap_usd: usd(&data.total_market_cap, "total_market_cap")?,
            total_volume_usd: usd(&data.total_volume, "total_volume")?,
            market_cap_change_24h_pct: data.market_cap_change_percentage_24h_usd,
            btc_dominance_pct: dominance("btc"),
            eth_dominance_pct: dominance("eth"),
            active_cryptocurrencies: data.active_cryptocurrencies,
        })
    }
}
