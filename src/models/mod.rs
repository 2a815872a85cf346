use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub mod market;
pub mod report;
pub mod series;

pub use market::{BookLevel, DerivativesSnapshot, FundingSnapshot, GlobalMarket, OrderBookSummary};
pub use report::{AnalysisResult, DataCompleteness, ReportStatus, RequestState, Section};
pub use series::{CandleGap, CandleSeries};

/// Candle aggregation interval
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "15m")]
    FifteenMinutes,
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "4h")]
    FourHours,
    #[serde(rename = "1d")]
    OneDay,
}

impl Timeframe {
    /// All supported timeframes, shortest first
    pub const ALL: [Timeframe; 4] = [
        Timeframe::FifteenMinutes,
        Timeframe::OneHour,
        Timeframe::FourHours,
        Timeframe::OneDay,
    ];

    /// Exchange interval code (also used for display)
    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::FifteenMinutes => "15m",
            Timeframe::OneHour => "1h",
            Timeframe::FourHours => "4h",
            Timeframe::OneDay => "1d",
        }
    }

    /// Nominal spacing between two consecutive candles
    pub fn interval_secs(&self) -> i64 {
        match self {
            Timeframe::FifteenMinutes => 15 * 60,
            Timeframe::OneHour => 60 * 60,
            Timeframe::FourHours => 4 * 60 * 60,
            Timeframe::OneDay => 24 * 60 * 60,
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "15m" => Ok(Timeframe::FifteenMinutes),
            "1h" => Ok(Timeframe::OneHour),
            "4h" => Ok(Timeframe::FourHours),
            "1d" => Ok(Timeframe::OneDay),
            other => Err(format!("unsupported timeframe: {}", other)),
        }
    }
}

/// OHLCV candlestick, `timestamp` is the candle open time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Live 24h ticker, valid for one analysis cycle only
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickerSnapshot {
    pub symbol: String,
    pub last_price: f64,
    pub change_24h_pct: f64,
    pub volume_24h: f64,
    pub fetched_at: DateTime<Utc>,
}

/// Crowd sentiment attached to a news item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NewsSentiment {
    Bullish,
    Bearish,
    Neutral,
}

impl NewsSentiment {
    pub fn as_str(&self) -> &'static str {
        match self {
            NewsSentiment::Bullish => "bullish",
            NewsSentiment::Bearish => "bearish",
            NewsSentiment::Neutral => "neutral",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsItem {
    pub title: String,
    pub source: String,
    pub published_at: DateTime<Utc>,
    pub sentiment: Option<NewsSentiment>,
}

/// Market-wide Fear & Greed reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSentiment {
    pub value: u32,
    pub classification: String,
    pub updated_at: DateTime<Utc>,
}
