//! Single entry point of the pipeline.
//!
//! `analyze` resolves the strategy, then gathers market data, news,
//! sentiment, global market and derivatives data, memory and the batch
//! reference context concurrently. It computes indicators,
//! lets the strategy talk to the LLM and finally splits the answer into
//! sections. The caller always gets either an `AnalysisResult` or one
//! `AnalysisError`.

use crate::config::PipelineSettings;
use crate::context::{ContextBatch, ContextSummarizer};
use crate::derivatives::DerivativesSource;
use crate::error::AnalysisError;
use crate::fetcher::{MarketData, MarketDataFetcher};
use crate::indicators::IndicatorEngine;
use crate::memory::{Memory, MemoryRecord};
use crate::models::{
    AnalysisResult, DataCompleteness, DerivativesSnapshot, GlobalMarket, MarketSentiment, NewsItem,
    ReportStatus, RequestState,
};
use crate::news::{MarketOverviewSource, NewsAggregator, SentimentSource};
use crate::prompt::parse_report;
use crate::registry::{AnalysisDataset, ModuleInfo, ModuleRegistry, TimeframeData};
use chrono::Utc;
use futures::future::join_all;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;

/// Ordered lifecycle of one request, mirrored to the log
struct Trace {
    symbol: String,
    module: String,
    states: Vec<RequestState>,
}

impl Trace {
    fn new(symbol: &str, module: &str) -> Self {
        let mut trace = Self {
            symbol: symbol.to_string(),
            module: module.to_string(),
            states: Vec::new(),
        };
        trace.advance(RequestState::Pending);
        trace
    }

    fn advance(&mut self, state: RequestState) {
        tracing::debug!(symbol = %self.symbol, module = %self.module, state = %state, "Request state");
        self.states.push(state);
    }

    fn fail(&mut self, error: AnalysisError) -> AnalysisError {
        tracing::error!(
            symbol = %self.symbol,
            module = %self.module,
            kind = error.kind(),
            error = %error,
            "Analysis failed"
        );
        self.advance(RequestState::Failed(error.kind().to_string()));
        error
    }
}

pub struct AnalysisFacade {
    registry: Arc<ModuleRegistry>,
    fetcher: MarketDataFetcher,
    engine: IndicatorEngine,
    news: Option<NewsAggregator>,
    sentiment: Option<SentimentSource>,
    market_overview: Option<MarketOverviewSource>,
    derivatives: Option<DerivativesSource>,
    memory: Option<Memory>,
    outcome_min_age: chrono::Duration,
    summarizer: ContextSummarizer,
    settings: PipelineSettings,
    pending_records: Mutex<Vec<JoinHandle<()>>>,
}

impl AnalysisFacade {
    pub fn new(
        registry: ModuleRegistry,
        fetcher: MarketDataFetcher,
        engine: IndicatorEngine,
        settings: PipelineSettings,
    ) -> Self {
        let summarizer = ContextSummarizer::new(
            fetcher.clone(),
            engine.clone(),
            settings.reference_symbol.clone(),
            settings.reference_timeframe,
            settings.lookback,
        );

        Self {
            registry: Arc::new(registry),
            fetcher,
            engine,
            news: None,
            sentiment: None,
            market_overview: None,
            derivatives: None,
            memory: None,
            outcome_min_age: chrono::Duration::hours(24),
            summarizer,
            settings,
            pending_records: Mutex::new(Vec::new()),
        }
    }

    pub fn with_news(mut self, news: NewsAggregator) -> Self {
        self.news = Some(news);
        self
    }

    pub fn with_sentiment(mut self, sentiment: SentimentSource) -> Self {
        self.sentiment = Some(sentiment);
        self
    }

    pub fn with_market_overview(mut self, overview: MarketOverviewSource) -> Self {
        self.market_overview = Some(overview);
        self
    }

    /// Futures data for strategies that ask for it
    pub fn with_derivatives(mut self, derivatives: DerivativesSource) -> Self {
        self.derivatives = Some(derivatives);
        self
    }

    /// `outcome_min_age` is how old an analysis must be before training
    /// attaches an observed outcome to it
    pub fn with_memory(mut self, memory: Memory, outcome_min_age: chrono::Duration) -> Self {
        self.memory = Some(memory);
        self.outcome_min_age = outcome_min_age;
        self
    }

    pub fn list_modules(&self) -> Vec<ModuleInfo> {
        self.registry.list()
    }

    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    /// Open a batch; every analysis in it shares one reference summary
    pub fn begin_batch(&self) -> AnalysisBatch<'_> {
        let context = ContextBatch::new(self.summarizer.clone());
        tracing::info!(batch = %context.id(), "Analysis batch opened");
        AnalysisBatch {
            facade: self,
            context,
        }
    }

    /// One analysis in a batch of its own
    pub async fn analyze(&self, module: &str, symbol: &str) -> Result<AnalysisResult, AnalysisError> {
        self.begin_batch().analyze(module, symbol).await
    }

    /// Analyze several symbols concurrently within one batch. Results are
    /// returned in input order.
    pub async fn analyze_batch(
        &self,
        module: &str,
        symbols: &[String],
    ) -> Vec<(String, Result<AnalysisResult, AnalysisError>)> {
        self.begin_batch().analyze_all(module, symbols).await
    }

    /// Record observed outcomes for past analyses of `symbol`
    pub async fn train_memory(&self, symbol: &str) -> Result<usize, AnalysisError> {
        let symbol = normalize_symbol(symbol)?;
        let Some(memory) = &self.memory else {
            tracing::warn!(symbol = %symbol, "No memory store configured, nothing to train");
            return Ok(0);
        };

        let price = self.fetcher.latest_price(&symbol).await?;
        Ok(memory.train(&symbol, price, self.outcome_min_age).await)
    }

    /// Wait for background memory writes started so far
    pub async fn flush_memory(&self) {
        let handles: Vec<_> = {
            let mut pending = self
                .pending_records
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            pending.drain(..).collect()
        };
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Memory write task failed");
            }
        }
    }

    async fn run(
        &self,
        context: &ContextBatch,
        module_name: &str,
        symbol: &str,
    ) -> Result<AnalysisResult, AnalysisError> {
        let mut trace = Trace::new(symbol, module_name);
        let module = self.registry.resolve(module_name).map_err(|e| trace.fail(e))?;
        let symbol = normalize_symbol(symbol).map_err(|e| trace.fail(e))?;

        trace.advance(RequestState::Fetching);
        let timeframes = module.timeframes();
        tracing::info!(symbol = %symbol, module = module_name, "Analysis started");

        // Reference context and memory are awaited alongside the fetch so no
        // source waits on another
        let (market, news, sentiment, global_market, derivatives, memory, reference) = futures::join!(
            self.fetcher.fetch(&symbol, timeframes, self.settings.lookback),
            self.fetch_news(&symbol),
            self.fetch_sentiment(),
            self.fetch_global_market(),
            self.fetch_derivatives(&symbol, module.wants_derivatives()),
            self.recall(&symbol),
            context.summary(),
        );

        let market = market.map_err(|e| trace.fail(e))?;
        let price = self
            .check_usable(&symbol, &market)
            .map_err(|e| trace.fail(e))?;

        let completeness = market.completeness();
        trace.advance(match completeness {
            DataCompleteness::Full => RequestState::FullData,
            DataCompleteness::Partial => RequestState::PartialData,
        });

        trace.advance(RequestState::Computing);
        let MarketData {
            ticker,
            series,
            failed,
            ..
        } = market;

        let gaps = series
            .iter()
            .filter(|(_, s)| !s.gaps().is_empty())
            .map(|(tf, s)| (*tf, s.gaps().to_vec()))
            .collect();
        let timeframe_data: BTreeMap<_, _> = series
            .into_iter()
            .map(|(tf, series)| {
                let indicators = self.engine.compute(series.candles());
                (tf, TimeframeData { series, indicators })
            })
            .collect();

        let dataset = AnalysisDataset {
            symbol: symbol.clone(),
            as_of: Utc::now(),
            price,
            ticker,
            timeframes: timeframe_data,
            missing_timeframes: failed.clone(),
            news,
            sentiment,
            global_market,
            derivatives,
            context: reference,
            memory,
        };

        trace.advance(RequestState::Prompting);
        let raw = module
            .perform_analysis(&dataset)
            .await
            .map_err(|e| trace.fail(e))?;
        trace.advance(RequestState::LlmCalled);

        let parsed = parse_report(&raw, module.required_sections());
        let status = if parsed.is_structured() {
            trace.advance(RequestState::Structured);
            ReportStatus::Structured
        } else {
            tracing::warn!(
                symbol = %symbol,
                module = module_name,
                missing = ?parsed.missing,
                "LLM response is missing sections, keeping raw text"
            );
            trace.advance(RequestState::Unstructured);
            ReportStatus::Unstructured {
                missing: parsed.missing.clone(),
            }
        };
        trace.advance(RequestState::Done);

        let result = AnalysisResult {
            symbol: symbol.clone(),
            module: module.name().to_string(),
            timestamp: dataset.as_of,
            price,
            sections: parsed.sections,
            raw_text: raw,
            summary: parsed.summary,
            status,
            completeness,
            timeframes: dataset.timeframes.keys().copied().collect(),
            indicators: dataset
                .timeframes
                .iter()
                .map(|(tf, data)| (*tf, data.indicators.clone()))
                .collect(),
            failed_timeframes: failed,
            gaps,
            states: trace.states,
        };

        if let Some(memory) = &self.memory {
            // The caller never waits on persistence
            let handle = memory.record(&result);
            let mut pending = self
                .pending_records
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            pending.retain(|h| !h.is_finished());
            pending.push(handle);
        }

        tracing::info!(
            symbol = %symbol,
            module = module_name,
            structured = result.is_structured(),
            completeness = ?result.completeness,
            "Analysis complete"
        );
        Ok(result)
    }

    /// Enforce the usable-timeframe threshold; returns the current price
    fn check_usable(&self, symbol: &str, market: &MarketData) -> Result<f64, AnalysisError> {
        let required = self.settings.min_usable_timeframes.max(1);
        let usable = market.usable_timeframes();
        if usable < required {
            let failures = market
                .failed
                .iter()
                .map(|(tf, reason)| format!("{}: {}", tf, reason))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(AnalysisError::InsufficientData {
                symbol: symbol.to_string(),
                reason: format!(
                    "{} usable timeframe(s), {} required ({})",
                    usable, required, failures
                ),
            });
        }

        market.current_price().ok_or_else(|| AnalysisError::InsufficientData {
            symbol: symbol.to_string(),
            reason: "no current price available".to_string(),
        })
    }

    async fn fetch_news(&self, symbol: &str) -> Vec<NewsItem> {
        match &self.news {
            Some(news) => news.fetch_news(symbol, self.settings.news_limit).await,
            None => Vec::new(),
        }
    }

    async fn fetch_sentiment(&self) -> Option<MarketSentiment> {
        match &self.sentiment {
            Some(sentiment) => sentiment.fetch().await,
            None => None,
        }
    }

    async fn fetch_global_market(&self) -> Option<GlobalMarket> {
        match &self.market_overview {
            Some(overview) => overview.fetch().await,
            None => None,
        }
    }

    async fn fetch_derivatives(&self, symbol: &str, wanted: bool) -> Option<DerivativesSnapshot> {
        if !wanted {
            return None;
        }
        match &self.derivatives {
            Some(source) => Some(source.snapshot(symbol).await),
            None => {
                tracing::warn!(symbol, "Strategy wants derivatives data but no source is configured");
                Some(DerivativesSnapshot::unavailable("no derivatives source configured"))
            }
        }
    }

    async fn recall(&self, symbol: &str) -> Vec<MemoryRecord> {
        match &self.memory {
            Some(memory) => memory.recent_context_for(symbol, self.settings.memory_limit).await,
            None => Vec::new(),
        }
    }
}

/// Analyses sharing one reference-asset summary
pub struct AnalysisBatch<'a> {
    facade: &'a AnalysisFacade,
    context: ContextBatch,
}

impl AnalysisBatch<'_> {
    pub fn id(&self) -> uuid::Uuid {
        self.context.id()
    }

    pub async fn analyze(&self, module: &str, symbol: &str) -> Result<AnalysisResult, AnalysisError> {
        self.facade.run(&self.context, module, symbol).await
    }

    pub async fn analyze_all(
        &self,
        module: &str,
        symbols: &[String],
    ) -> Vec<(String, Result<AnalysisResult, AnalysisError>)> {
        let results = join_all(symbols.iter().map(|s| self.analyze(module, s))).await;
        symbols.iter().cloned().zip(results).collect()
    }
}

fn normalize_symbol(symbol: &str) -> Result<String, AnalysisError> {
    let symbol = symbol.trim().to_uppercase();
    if symbol.is_empty() || !symbol.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(AnalysisError::SymbolNotFound(symbol));
    }
    Ok(symbol)
}
