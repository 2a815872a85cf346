//! Reference-asset context shared by every analysis in a batch.
//!
//! A [`ContextBatch`] computes the summary at most once, in a spawned task,
//! and hands the same `Arc<ContextSummary>` to every caller. Because the
//! computation runs on its own task, a caller that gives up waiting does
//! not cancel it for the others.

use crate::fetcher::MarketDataFetcher;
use crate::indicators::{IndicatorEngine, IndicatorKind, IndicatorValue};
use crate::models::Timeframe;
use crate::prompt::format::{format_pct, format_value};
use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Fewer candles than this and the summary is reported unavailable
const MIN_REFERENCE_CANDLES: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrendBias {
    Bullish,
    Bearish,
    Neutral,
}

impl TrendBias {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrendBias::Bullish => "bullish",
            TrendBias::Bearish => "bearish",
            TrendBias::Neutral => "neutral",
        }
    }
}

/// Condensed trend of the reference asset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSummary {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub computed_at: DateTime<Utc>,
    pub price: Option<f64>,
    pub change_24h_pct: Option<f64>,
    pub rsi: Option<f64>,
    pub sma_short: Option<(String, f64)>,
    pub sma_long: Option<(String, f64)>,
    pub macd: Option<(f64, f64)>,
    pub bias: Option<TrendBias>,
    /// Why the summary is unavailable, if it is
    pub unavailable: Option<String>,
}

impl ContextSummary {
    pub fn unavailable(symbol: &str, timeframe: Timeframe, reason: impl Into<String>) -> Self {
        Self {
            symbol: symbol.to_string(),
            timeframe,
            computed_at: Utc::now(),
            price: None,
            change_24h_pct: None,
            rsi: None,
            sma_short: None,
            sma_long: None,
            macd: None,
            bias: None,
            unavailable: Some(reason.into()),
        }
    }

    pub fn is_available(&self) -> bool {
        self.unavailable.is_none()
    }

    /// Deterministic plain-text rendering for prompts
    pub fn render(&self) -> String {
        if let Some(reason) = &self.unavailable {
            return format!(
                "{} ({}) trend data is currently unavailable: {}\n",
                self.symbol, self.timeframe, reason
            );
        }

        let mut out = format!("{} trend summary ({} candles):\n", self.symbol, self.timeframe);
        out.push_str(&format!(
            "  Current price: {} USDT (24h change: {})\n",
            format_value(self.price, 2),
            format_pct(self.change_24h_pct)
        ));
        out.push_str(&format!("  RSI: {}\n", format_value(self.rsi, 2)));

        for (label, sma) in [&self.sma_short, &self.sma_long].into_iter().flatten() {
            out.push_str(&format!(
                "  Price vs {} ({}): price {}\n",
                label,
                format_value(Some(*sma), 2),
                relation(self.price, Some(*sma))
            ));
        }

        if let Some((macd, signal)) = self.macd {
            out.push_str(&format!(
                "  MACD line ({}) vs signal ({}): MACD {}\n",
                format_value(Some(macd), 2),
                format_value(Some(signal), 2),
                relation(Some(macd), Some(signal))
            ));
        }

        if let Some(bias) = self.bias {
            out.push_str(&format!("  Overall bias: {}\n", bias.as_str()));
        }
        out
    }
}

fn relation(a: Option<f64>, b: Option<f64>) -> &'static str {
    match (a, b) {
        (Some(a), Some(b)) if a > b => "above",
        (Some(a), Some(b)) if a < b => "below",
        (Some(_), Some(_)) => "equal",
        _ => "unknown",
    }
}

/// Majority vote over price vs SMAs, MACD vs signal and RSI vs 50
fn trend_bias(summary: &ContextSummary) -> Option<TrendBias> {
    let mut votes: Vec<bool> = Vec::new();
    if let Some(price) = summary.price {
        for (_, sma) in [&summary.sma_short, &summary.sma_long].into_iter().flatten() {
            votes.push(price > *sma);
        }
    }
    if let Some((macd, signal)) = summary.macd {
        votes.push(macd > signal);
    }
    if let Some(rsi) = summary.rsi {
        votes.push(rsi > 50.0);
    }
    if votes.is_empty() {
        return None;
    }

    let up = votes.iter().filter(|v| **v).count();
    let down = votes.len() - up;
    Some(if up > down {
        TrendBias::Bullish
    } else if down > up {
        TrendBias::Bearish
    } else {
        TrendBias::Neutral
    })
}

/// Builds the reference summary from the fetcher and indicator engine
#[derive(Clone)]
pub struct ContextSummarizer {
    fetcher: MarketDataFetcher,
    engine: IndicatorEngine,
    reference_symbol: String,
    timeframe: Timeframe,
    lookback: usize,
}

impl ContextSummarizer {
    pub fn new(
        fetcher: MarketDataFetcher,
        engine: IndicatorEngine,
        reference_symbol: impl Into<String>,
        timeframe: Timeframe,
        lookback: usize,
    ) -> Self {
        Self {
            fetcher,
            engine,
            reference_symbol: reference_symbol.into(),
            timeframe,
            lookback,
        }
    }

    pub fn reference_symbol(&self) -> &str {
        &self.reference_symbol
    }

    /// Never fails; problems yield an "unavailable" summary
    pub async fn summarize_reference(&self) -> ContextSummary {
        let symbol = self.reference_symbol.as_str();
        tracing::info!(symbol, timeframe = %self.timeframe, "Computing reference context");

        let data = match self.fetcher.fetch(symbol, &[self.timeframe], self.lookback).await {
            Ok(data) => data,
            Err(e) => {
                tracing::warn!(symbol, error = %e, "Reference context unavailable");
                return ContextSummary::unavailable(symbol, self.timeframe, e.to_string());
            }
        };

        let Some(series) = data.series.get(&self.timeframe) else {
            let reason = data
                .failed
                .get(&self.timeframe)
                .cloned()
                .unwrap_or_else(|| "no candles".to_string());
            tracing::warn!(symbol, error = %reason, "Reference context unavailable");
            return ContextSummary::unavailable(symbol, self.timeframe, reason);
        };

        if series.len() < MIN_REFERENCE_CANDLES {
            tracing::warn!(symbol, candles = series.len(), "Too few candles for reference context");
            return ContextSummary::unavailable(
                symbol,
                self.timeframe,
                format!("only {} candles (need {})", series.len(), MIN_REFERENCE_CANDLES),
            );
        }

        let indicators = self.engine.compute(series.candles());
        let config = self.engine.config();
        let labelled = |kind: IndicatorKind| {
            indicators
                .scalar(kind)
                .map(|v| (kind.label(config), v))
        };

        let mut summary = ContextSummary {
            symbol: symbol.to_string(),
            timeframe: self.timeframe,
            computed_at: Utc::now(),
            price: data.current_price(),
            change_24h_pct: data.ticker.as_ref().map(|t| t.change_24h_pct),
            rsi: indicators.scalar(IndicatorKind::Rsi),
            sma_short: labelled(IndicatorKind::SmaShort),
            sma_long: labelled(IndicatorKind::SmaLong),
            macd: match indicators.get(IndicatorKind::Macd) {
                Some(IndicatorValue::Macd { macd, signal, .. }) => Some((*macd, *signal)),
                _ => None,
            },
            bias: None,
            unavailable: None,
        };
        summary.bias = trend_bias(&summary);

        tracing::info!(
            symbol,
            bias = summary.bias.map(|b| b.as_str()).unwrap_or("unknown"),
            "Reference context ready"
        );
        summary
    }
}

type SharedSummary = Shared<BoxFuture<'static, Arc<ContextSummary>>>;

/// One analysis batch: the reference summary is computed at most once
pub struct ContextBatch {
    id: Uuid,
    summarizer: ContextSummarizer,
    cell: Mutex<Option<SharedSummary>>,
}

impl ContextBatch {
    pub fn new(summarizer: ContextSummarizer) -> Self {
        Self {
            id: Uuid::new_v4(),
            summarizer,
            cell: Mutex::new(None),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Shared summary, starting its computation on first use
    pub async fn summary(&self) -> Arc<ContextSummary> {
        let shared = {
            let mut cell = self.cell.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            cell.get_or_insert_with(|| self.spawn_summary()).clone()
        };
        shared.await
    }

    fn spawn_summary(&self) -> SharedSummary {
        let summarizer = self.summarizer.clone();
        let symbol = summarizer.reference_symbol.clone();
        let timeframe = summarizer.timeframe;
        let batch = self.id;

        tracing::debug!(batch = %batch, "Starting batch reference context");
        let handle = tokio::spawn(async move { Arc::new(summarizer.summarize_reference().await) });

        async move {
            match handle.await {
                Ok(summary) => summary,
                Err(e) => {
                    tracing::warn!(batch = %batch, error = %e, "Reference context task failed");
                    Arc::new(ContextSummary::unavailable(&symbol, timeframe, e.to_string()))
                }
            }
        }
        .boxed()
        .shared()
    }
}
