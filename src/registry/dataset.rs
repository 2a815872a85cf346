use crate::context::ContextSummary;
use crate::indicators::IndicatorSet;
use crate::memory::MemoryRecord;
use crate::models::{
    CandleSeries, DerivativesSnapshot, GlobalMarket, MarketSentiment, NewsItem, TickerSnapshot, Timeframe,
};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Candles and their indicators for one usable timeframe
#[derive(Debug, Clone)]
pub struct TimeframeData {
    pub series: CandleSeries,
    pub indicators: IndicatorSet,
}

/// Everything an analysis module sees for one request
///
/// Assembled by the facade after all fetches complete; read-only from then on.
#[derive(Debug, Clone)]
pub struct AnalysisDataset {
    pub symbol: String,
    pub as_of: DateTime<Utc>,
    pub price: f64,
    pub ticker: Option<TickerSnapshot>,
    pub timeframes: BTreeMap<Timeframe, TimeframeData>,
    /// Requested timeframes that could not be fetched, with the reason
    pub missing_timeframes: BTreeMap<Timeframe, String>,
    pub news: Vec<NewsItem>,
    pub sentiment: Option<MarketSentiment>,
    pub global_market: Option<GlobalMarket>,
    /// Present only for strategies that asked for futures data
    pub derivatives: Option<DerivativesSnapshot>,
    pub context: Arc<ContextSummary>,
    pub memory: Vec<MemoryRecord>,
}

impl AnalysisDataset {
    pub fn indicators(&self, timeframe: Timeframe) -> Option<&IndicatorSet> {
        self.timeframes.get(&timeframe).map(|d| &d.indicators)
    }
}
