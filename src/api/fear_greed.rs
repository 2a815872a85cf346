use super::{ClientError, ClientResult, SentimentClient};
use crate::models::MarketSentiment;
use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

pub const FEAR_GREED_URL: &str = "https://api.alternative.me/fng/";

/// alternative.me Fear & Greed index
#[derive(Clone)]
pub struct FearGreedClient {
    client: Client,
    url: String,
}

#[derive(Debug, Deserialize)]
struct FngResponse {
    #[serde(default)]
    data: Vec<FngEntry>,
}

// All fields arrive as strings
#[derive(Debug, Deserialize)]
struct FngEntry {
    value: String,
    value_classification: String,
    timestamp: String,
}

impl FearGreedClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl SentimentClient for FearGreedClient {
    async fn fear_greed(&self) -> ClientResult<MarketSentiment> {
        let response = self.client.get(&self.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::from_status(status, &body));
        }

        let parsed: FngResponse = response.json().await?;
        let latest = parsed
            .data
            .into_iter()
            .next()
            .ok_or_else(|| ClientError::Decode("empty fear & greed data".to_string()))?;

        let value = latest
            .value
            .parse::<u32>()
            .map_err(|e| ClientError::Decode(format!("value: {}", e)))?;
        let updated_at = latest
            .timestamp
            .parse::<i64>()
            .ok()
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
            .unwrap_or_else(Utc::now);

        Ok(MarketSentiment {
            value,
            classification: latest.value_classification,
            updated_at,
        })
    }
}
