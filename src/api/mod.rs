//! Capability interfaces for the upstream services the pipeline calls
//! through, plus the HTTP implementations used by the binary.

pub mod binance;
pub mod binance_futures;
pub mod coingecko;
pub mod cryptopanic;
pub mod fear_greed;
pub mod openai;
pub mod pool;
pub mod retry;

pub use binance::BinanceClient;
pub use binance_futures::BinanceFuturesClient;
pub use coingecko::CoinGeckoClient;
pub use cryptopanic::CryptoPanicClient;
pub use fear_greed::FearGreedClient;
pub use openai::OpenAiClient;
pub use pool::RequestPool;
pub use retry::{with_retry, RetryPolicy};

use crate::models::{
    Candle, FundingSnapshot, GlobalMarket, MarketSentiment, NewsItem, OrderBookSummary,
    TickerSnapshot, Timeframe,
};
use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Duration;
use thiserror::Error;

/// Failure reported by an upstream collaborator
///
/// Only `Transient` and `Timeout` are worth retrying.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClientError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("transient upstream failure: {0}")]
    Transient(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("failed to decode response: {0}")]
    Decode(String),
}

impl ClientError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ClientError::Transient(_) | ClientError::Timeout(_))
    }

    /// Generic mapping of a non-success HTTP status
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        let message = if body.is_empty() {
            status.to_string()
        } else {
            body.to_string()
        };

        if status == StatusCode::NOT_FOUND {
            ClientError::NotFound(message)
        } else if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            ClientError::Transient(format!("{}: {}", status, message))
        } else {
            ClientError::Rejected {
                status: status.as_u16(),
                message,
            }
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ClientError::Decode(e.to_string())
        } else {
            // Connect errors, resets and client-side timeouts
            ClientError::Transient(e.to_string())
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(e: serde_json::Error) -> Self {
        ClientError::Decode(e.to_string())
    }
}

pub type ClientResult<T> = std::result::Result<T, ClientError>;

/// Candle and ticker source. Implementations report an unknown symbol as
/// `ClientError::NotFound`.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    async fn get_klines(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> ClientResult<Vec<Candle>>;

    async fn get_ticker(&self, symbol: &str) -> ClientResult<TickerSnapshot>;
}

/// Single-shot text generation, no conversation state
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn generate(&self, prompt: &str) -> ClientResult<String>;
}

#[async_trait]
pub trait NewsClient: Send + Sync {
    async fn get_news(&self, symbol: &str, limit: usize) -> ClientResult<Vec<NewsItem>>;
}

/// Market-wide sentiment gauge
#[async_trait]
pub trait SentimentClient: Send + Sync {
    async fn fear_greed(&self) -> ClientResult<MarketSentiment>;
}

/// Total market capitalisation and dominance
#[async_trait]
pub trait MarketOverviewClient: Send + Sync {
    async fn global_market(&self) -> ClientResult<GlobalMarket>;
}

/// Perpetual-futures positioning for a symbol
#[async_trait]
pub trait DerivativesClient: Send + Sync {
    async fn funding(&self, symbol: &str) -> ClientResult<FundingSnapshot>;

    /// Open interest in contracts (base asset units)
    async fn open_interest(&self, symbol: &str) -> ClientResult<f64>;

    /// Top-trader long/short position ratio over the last hour
    async fn long_short_ratio(&self, symbol: &str) -> ClientResult<f64>;

    /// Depth snapshot summarized to the `walls` largest levels per side
    async fn order_book(&self, symbol: &str, walls: usize) -> ClientResult<OrderBookSummary>;
}
