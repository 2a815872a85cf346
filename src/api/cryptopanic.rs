use super::{ClientError, ClientResult, NewsClient};
use crate::models::{NewsItem, NewsSentiment};
use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

pub const CRYPTOPANIC_API_BASE: &str = "https://cryptopanic.com/api/v1";

/// Quote currencies stripped from a trading pair to get the coin code
const QUOTE_SUFFIXES: [&str; 4] = ["USDT", "BUSD", "USDC", "FDUSD"];

#[derive(Clone)]
pub struct CryptoPanicClient {
    client: Client,
    auth_token: String,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct PostsResponse {
    #[serde(default)]
    results: Vec<Post>,
}

#[derive(Debug, Deserialize)]
struct Post {
    title: String,
    published_at: String,
    #[serde(default)]
    source: Option<PostSource>,
    #[serde(default)]
    votes: Option<Votes>,
}

#[derive(Debug, Deserialize)]
struct PostSource {
    title: String,
}

#[derive(Debug, Deserialize, Default)]
struct Votes {
    #[serde(default)]
    positive: u32,
    #[serde(default)]
    negative: u32,
}

impl CryptoPanicClient {
    pub fn new(auth_token: String, base_url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            auth_token,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

/// `BTCUSDT` -> `BTC`; plain coin codes pass through
pub fn currency_code(symbol: &str) -> String {
    let upper = symbol.trim().to_uppercase();
    for suffix in QUOTE_SUFFIXES {
        if let Some(code) = upper.strip_suffix(suffix) {
            if !code.is_empty() {
                return code.to_string();
            }
        }
    }
    upper
}

fn sentiment_from_votes(votes: &Votes) -> Option<NewsSentiment> {
    match (votes.positive, votes.negative) {
        (0, 0) => None,
        (p, n) if p > n => Some(NewsSentiment::Bullish),
        (p, n) if n > p => Some(NewsSentiment::Bearish),
        _ => Some(NewsSentiment::Neutral),
    }
}

impl Post {
    fn into_item(self) -> Option<NewsItem> {
        let published_at = match DateTime::parse_from_rfc3339(&self.published_at) {
            Ok(ts) => ts.with_timezone(&Utc),
            Err(e) => {
                tracing::debug!(title = %self.title, error = %e, "Skipping post with bad timestamp");
                return None;
            }
        };

        Some(NewsItem {
            sentiment: self.votes.as_ref().and_then(sentiment_from_votes),
            source: self
                .source
                .map(|s| s.title)
                .unwrap_or_else(|| "CryptoPanic".to_string()),
            title: self.title,
            published_at,
        })
    }
}

#[async_trait]
impl NewsClient for CryptoPanicClient {
    async fn get_news(&self, symbol: &str, limit: usize) -> ClientResult<Vec<NewsItem>> {
        let code = currency_code(symbol);
        if code.is_empty() {
            return Err(ClientError::NotFound(format!(
                "no currency code for symbol {}",
                symbol
            )));
        }

        let response = self
            .client
            .get(format!("{}/posts/", self.base_url))
            .query(&[
                ("auth_token", self.auth_token.as_str()),
                ("currencies", code.as_str()),
                ("public", "true"),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::from_status(status, &body));
        }

        let posts: PostsResponse = response.json().await?;
        let items: Vec<NewsItem> = posts
            .results
            .into_iter()
            .filter_map(Post::into_item)
            .take(limit)
            .collect();

        tracing::debug!(currency = %code, count = items.len(), "Fetched news");
        Ok(items)
    }
}
