//! Multi-timeframe market data retrieval.
//!
//! One request per timeframe plus one for the ticker, all issued
//! concurrently through the shared [`RequestPool`]. A timeframe that keeps
//! failing is reported in [`MarketData::failed`] while the others are kept;
//! an unknown symbol aborts the whole fetch.

use crate::api::{with_retry, ClientError, ExchangeClient, RequestPool, RetryPolicy};
use crate::error::AnalysisError;
use crate::models::{CandleSeries, DataCompleteness, TickerSnapshot, Timeframe};
use futures::future::{try_join, try_join_all};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Candles and ticker gathered for one symbol
#[derive(Debug, Clone)]
pub struct MarketData {
    pub symbol: String,
    pub ticker: Option<TickerSnapshot>,
    pub ticker_error: Option<String>,
    pub series: BTreeMap<Timeframe, CandleSeries>,
    pub failed: BTreeMap<Timeframe, String>,
}

impl MarketData {
    pub fn usable_timeframes(&self) -> usize {
        self.series.len()
    }

    pub fn completeness(&self) -> DataCompleteness {
        if self.failed.is_empty() && self.ticker.is_some() {
            DataCompleteness::Full
        } else {
            DataCompleteness::Partial
        }
    }

    /// Ticker price, else the latest close of the shortest usable timeframe
    pub fn current_price(&self) -> Option<f64> {
        self.ticker.as_ref().map(|t| t.last_price).or_else(|| {
            self.series
                .values()
                .find_map(|s| s.last().map(|c| c.close))
        })
    }
}

enum Fetched<T> {
    Ok(T),
    Failed(String),
}

#[derive(Clone)]
pub struct MarketDataFetcher {
    exchange: Arc<dyn ExchangeClient>,
    pool: RequestPool,
    retry: RetryPolicy,
}

impl MarketDataFetcher {
    pub fn new(exchange: Arc<dyn ExchangeClient>, pool: RequestPool, retry: RetryPolicy) -> Self {
        Self {
            exchange,
            pool,
            retry,
        }
    }

    /// Fetch `lookback` candles for each timeframe and the live ticker
    pub async fn fetch(
        &self,
        symbol: &str,
        timeframes: &[Timeframe],
        lookback: usize,
    ) -> Result<MarketData, AnalysisError> {
        tracing::info!(
            symbol,
            timeframes = ?timeframes,
            lookback,
            "Fetching market data"
        );

        let ticker = async {
            let result = with_retry(&self.pool, &self.retry, "ticker", || {
                self.exchange.get_ticker(symbol)
            })
            .await;
            classify(symbol, result)
        };

        let klines = try_join_all(timeframes.iter().map(|tf| async move {
            let result = with_retry(&self.pool, &self.retry, tf.as_str(), || {
                self.exchange.get_klines(symbol, *tf, lookback)
            })
            .await;
            classify(symbol, result).map(|outcome| (*tf, outcome))
        }));

        // First NotFound short-circuits and drops the remaining requests
        let (ticker, klines) = try_join(ticker, klines).await?;

        let mut data = MarketData {
            symbol: symbol.to_string(),
            ticker: None,
            ticker_error: None,
            series: BTreeMap::new(),
            failed: BTreeMap::new(),
        };

        match ticker {
            Fetched::Ok(t) => data.ticker = Some(t),
            Fetched::Failed(reason) => {
                tracing::warn!(symbol, error = %reason, "Ticker unavailable, falling back to last close");
                data.ticker_error = Some(reason);
            }
        }

        for (tf, outcome) in klines {
            match outcome {
                Fetched::Ok(candles) if candles.is_empty() => {
                    tracing::warn!(symbol, timeframe = %tf, "Exchange returned no candles");
                    data.failed.insert(tf, "no candles returned".to_string());
                }
                Fetched::Ok(candles) => {
                    let series = CandleSeries::new(tf, candles);
                    if !series.gaps().is_empty() {
                        tracing::warn!(
                            symbol,
                            timeframe = %tf,
                            gaps = series.gaps().len(),
                            "Candle series has gaps"
                        );
                    }
                    data.series.insert(tf, series);
                }
                Fetched::Failed(reason) => {
                    tracing::warn!(symbol, timeframe = %tf, error = %reason, "Timeframe fetch failed");
                    data.failed.insert(tf, reason);
                }
            }
        }

        tracing::info!(
            symbol,
            usable = data.usable_timeframes(),
            failed = data.failed.len(),
            "Market data fetched"
        );

        Ok(data)
    }

    /// Current price only: the ticker, else the latest hourly close
    pub async fn latest_price(&self, symbol: &str) -> Result<f64, AnalysisError> {
        let data = self.fetch(symbol, &[Timeframe::OneHour], 1).await?;
        data.current_price().ok_or_else(|| AnalysisError::InsufficientData {
            symbol: symbol.to_string(),
            reason: "no current price available".to_string(),
        })
    }
}

fn classify<T>(symbol: &str, result: Result<T, ClientError>) -> Result<Fetched<T>, AnalysisError> {
    match result {
        Ok(value) => Ok(Fetched::Ok(value)),
        Err(ClientError::NotFound(_)) => Err(AnalysisError::SymbolNotFound(symbol.to_string())),
        Err(e) => Ok(Fetched::Failed(e.to_string())),
    }
}
