use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use cryptoanalyst::api::{
    ClientError, ClientResult, DerivativesClient, ExchangeClient, LlmClient, NewsClient, RequestPool,
    RetryPolicy,
};
use cryptoanalyst::config::PipelineSettings;
use cryptoanalyst::derivatives::DerivativesSource;
use cryptoanalyst::fetcher::MarketDataFetcher;
use cryptoanalyst::indicators::{IndicatorEngine, IndicatorKind};
use cryptoanalyst::llm::LlmInvoker;
use cryptoanalyst::memory::{InMemoryStore, Memory};
use cryptoanalyst::modules::register_defaults;
use cryptoanalyst::news::{NewsAggregator, SentimentSource};
use cryptoanalyst::prompt::PromptBuilder;
use cryptoanalyst::*;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio_test::{assert_err, assert_ok};

const LOOKBACK: usize = 250;

const WELL_FORMED: &str = "# Report\n\
    ## Overview\nTrend is up on every timeframe.\n\
    ## Indicator Analysis\nRSI neutral, MACD bullish.\n\
    ## Reference Asset Effect\nBTC strength supports the move.\n\
    ## News Assessment\nQuiet news flow.\n\
    ## Key Levels\nSupport at 150, resistance at 360.\n\
    ## Strategy\nBuy pullbacks toward support.\n\
    ## Risk Management\nStop below 140, risk 1%.\n\
    ## Outlook\nHigher highs likely.\n\
    ---SUMMARY START---\nConstructive bias while above 150.\n---SUMMARY END---\n";

/// Exchange with a scripted set of failing (symbol, timeframe) pairs.
/// `XYZUSDT` is unknown.
#[derive(Default)]
struct FakeExchange {
    failing: HashSet<(String, Timeframe)>,
    kline_calls: Mutex<HashMap<String, usize>>,
}

impl FakeExchange {
    fn failing(pairs: &[(&str, Timeframe)]) -> Self {
        Self {
            failing: pairs.iter().map(|(s, tf)| (s.to_string(), *tf)).collect(),
            ..Self::default()
        }
    }

    fn kline_calls(&self, symbol: &str) -> usize {
        self.kline_calls.lock().unwrap().get(symbol).copied().unwrap_or(0)
    }
}

#[async_trait]
impl ExchangeClient for FakeExchange {
    async fn get_klines(&self, symbol: &str, tf: Timeframe, limit: usize) -> ClientResult<Vec<Candle>> {
        *self.kline_calls.lock().unwrap().entry(symbol.to_string()).or_default() += 1;
        if symbol == "XYZUSDT" {
            return Err(ClientError::NotFound("Invalid symbol.".into()));
        }
        if self.failing.contains(&(symbol.to_string(), tf)) {
            return Err(ClientError::Transient("502 Bad Gateway".into()));
        }

        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        Ok((0..limit)
            .map(|i| {
                let base = 100.0 + i as f64 + (i % 9) as f64;
                Candle {
                    timestamp: start + Duration::seconds(tf.interval_secs() * i as i64),
                    open: base - 1.0,
                    high: base + 2.0,
                    low: base - 2.0,
                    close: base,
                    volume: 1000.0 + (i % 13) as f64 * 10.0,
                }
            })
            .collect())
    }

    async fn get_ticker(&self, symbol: &str) -> ClientResult<TickerSnapshot> {
        if symbol == "XYZUSDT" {
            return Err(ClientError::NotFound("Invalid symbol.".into()));
        }
        Ok(TickerSnapshot {
            symbol: symbol.to_string(),
            last_price: 358.0,
            change_24h_pct: 1.8,
            volume_24h: 250_000.0,
            fetched_at: Utc::now(),
        })
    }
}

#[derive(Clone, Copy)]
enum LlmMode {
    WellFormed,
    Malformed,
    Down,
}

struct FakeLlm {
    mode: LlmMode,
    prompts: Mutex<Vec<String>>,
}

impl FakeLlm {
    fn new(mode: LlmMode) -> Self {
        Self {
            mode,
            prompts: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    fn prompt(&self, idx: usize) -> String {
        self.prompts.lock().unwrap()[idx].clone()
    }
}

#[async_trait]
impl LlmClient for FakeLlm {
    async fn generate(&self, prompt: &str) -> ClientResult<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        match self.mode {
            LlmMode::WellFormed => Ok(WELL_FORMED.to_string()),
            LlmMode::Malformed => Ok("Looks bullish to me, maybe buy some.".to_string()),
            LlmMode::Down => Err(ClientError::Transient("503 Service Unavailable".into())),
        }
    }
}

struct BrokenNews {
    calls: AtomicUsize,
}

#[async_trait]
impl NewsClient for BrokenNews {
    async fn get_news(&self, _symbol: &str, _limit: usize) -> ClientResult<Vec<NewsItem>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ClientError::Transient("connection reset".into()))
    }
}

struct Harness {
    facade: AnalysisFacade,
    exchange: Arc<FakeExchange>,
    llm: Arc<FakeLlm>,
    store: Arc<InMemoryStore>,
}

fn harness_with(exchange: FakeExchange, mode: LlmMode, news: Option<Arc<dyn NewsClient>>) -> Harness {
    let exchange = Arc::new(exchange);
    let llm = Arc::new(FakeLlm::new(mode));
    let store = Arc::new(InMemoryStore::new());

    let pool = RequestPool::new(8, 60_000);
    let retry = RetryPolicy {
        max_attempts: 3,
        base_delay: std::time::Duration::from_millis(1),
        max_delay: std::time::Duration::from_millis(2),
        attempt_timeout: std::time::Duration::from_secs(2),
    };

    let invoker = Arc::new(
        LlmInvoker::new(llm.clone(), pool.clone(), std::time::Duration::from_secs(2))
            .with_retry_delay(std::time::Duration::from_millis(1)),
    );
    let mut registry = ModuleRegistry::new();
    register_defaults(&mut registry, PromptBuilder::default(), invoker).unwrap();

    let settings = PipelineSettings {
        lookback: LOOKBACK,
        ..PipelineSettings::default()
    };

    let facade = AnalysisFacade::new(
        registry,
        MarketDataFetcher::new(exchange.clone(), pool.clone(), retry.clone()),
        IndicatorEngine::default(),
        settings,
    )
    .with_news(NewsAggregator::new(news, pool.clone(), retry.clone()))
    .with_sentiment(SentimentSource::new(None, pool, retry))
    .with_memory(Memory::new(store.clone(), 300), Duration::zero());

    Harness {
        facade,
        exchange,
        llm,
        store,
    }
}

/// Funding is live; every other futures endpoint rejects the contract
struct FundingOnly;

#[async_trait]
impl DerivativesClient for FundingOnly {
    async fn funding(&self, _symbol: &str) -> ClientResult<FundingSnapshot> {
        Ok(FundingSnapshot {
            mark_price: 358.4,
            funding_rate_pct: -0.0042,
            next_funding_time: None,
        })
    }

    async fn open_interest(&self, _symbol: &str) -> ClientResult<f64> {
        Err(ClientError::NotFound("Invalid symbol.".into()))
    }

    async fn long_short_ratio(&self, _symbol: &str) -> ClientResult<f64> {
        Err(ClientError::NotFound("Invalid symbol.".into()))
    }

    async fn order_book(&self, _symbol: &str, _walls: usize) -> ClientResult<OrderBookSummary> {
        Err(ClientError::NotFound("Invalid symbol.".into()))
    }
}

fn harness(exchange: FakeExchange, mode: LlmMode) -> Harness {
    harness_with(exchange, mode, None)
}

#[tokio::test]
async fn test_full_data_produces_structured_report() {
    let h = harness(FakeExchange::default(), LlmMode::WellFormed);

    let result = assert_ok!(h.facade.analyze("crypto_analysis", "btcusdt").await);

    assert_eq!(result.symbol, "BTCUSDT");
    assert_eq!(result.module, "crypto_analysis");
    assert_eq!(result.completeness, DataCompleteness::Full);
    assert_eq!(result.timeframes, Timeframe::ALL.to_vec());
    assert_eq!(result.indicators.keys().copied().collect::<Vec<_>>(), Timeframe::ALL.to_vec());
    for set in result.indicators.values() {
        assert_eq!(set.candle_count, LOOKBACK);
        assert!(set.scalar(IndicatorKind::Rsi).is_some());
    }
    assert!(result.is_structured());
    assert!(result.section(Section::Overview).is_some());
    assert!(result.section(Section::IndicatorAnalysis).is_some());
    assert!(result.section(Section::ReferenceAssetEffect).is_some());
    assert_eq!(result.summary.as_deref(), Some("Constructive bias while above 150."));
    assert_eq!(
        result.states,
        vec![
            RequestState::Pending,
            RequestState::Fetching,
            RequestState::FullData,
            RequestState::Computing,
            RequestState::Prompting,
            RequestState::LlmCalled,
            RequestState::Structured,
            RequestState::Done,
        ]
    );
    assert_eq!(h.llm.calls(), 1);
}

#[tokio::test]
async fn test_failed_timeframe_yields_partial_result() {
    let h = harness(
        FakeExchange::failing(&[("ETHUSDT", Timeframe::FourHours)]),
        LlmMode::WellFormed,
    );

    let result = assert_ok!(h.facade.analyze("crypto_analysis", "ETHUSDT").await);

    assert_eq!(result.completeness, DataCompleteness::Partial);
    assert!(!result.timeframes.contains(&Timeframe::FourHours));
    assert!(result.failed_timeframes.contains_key(&Timeframe::FourHours));
    assert!(result.states.contains(&RequestState::PartialData));

    let prompt = h.llm.prompt(0);
    assert!(prompt.contains("### 4h\nABSENT"));
    assert!(prompt.contains("### 1h ("));
}

#[tokio::test]
async fn test_no_usable_timeframe_never_calls_llm() {
    let all: Vec<_> = Timeframe::ALL.iter().map(|tf| ("SOLUSDT", *tf)).collect();
    let h = harness(FakeExchange::failing(&all), LlmMode::WellFormed);

    let err = assert_err!(h.facade.analyze("crypto_analysis", "SOLUSDT").await);

    assert!(matches!(err, AnalysisError::InsufficientData { ref symbol, .. } if symbol == "SOLUSDT"));
    assert_eq!(h.llm.calls(), 0);
}

#[tokio::test]
async fn test_unknown_symbol_is_not_retried() {
    let h = harness(FakeExchange::default(), LlmMode::WellFormed);

    let err = assert_err!(h.facade.analyze("spot_trading_analysis", "XYZUSDT").await);

    assert_eq!(err, AnalysisError::SymbolNotFound("XYZUSDT".to_string()));
    assert!(h.exchange.kline_calls("XYZUSDT") <= 3);
    assert_eq!(h.llm.calls(), 0);
}

#[tokio::test]
async fn test_unknown_module_lists_available() {
    let h = harness(FakeExchange::default(), LlmMode::WellFormed);

    match h.facade.analyze("astrology", "BTCUSDT").await {
        Err(AnalysisError::ModuleNotFound { name, available }) => {
            assert_eq!(name, "astrology");
            assert_eq!(available.len(), 3);
        }
        other => panic!("expected ModuleNotFound, got {:?}", other),
    }
    assert_eq!(h.exchange.kline_calls("BTCUSDT"), 0);
}

#[tokio::test]
async fn test_unknown_module_reported_before_symbol_validation() {
    let h = harness(FakeExchange::default(), LlmMode::WellFormed);

    let err = assert_err!(h.facade.analyze("astrology", "not a symbol!").await);

    assert!(matches!(err, AnalysisError::ModuleNotFound { ref name, .. } if name == "astrology"));
}

#[tokio::test]
async fn test_news_failure_degrades_to_empty_news() {
    let news = Arc::new(BrokenNews {
        calls: AtomicUsize::new(0),
    });
    let h = harness_with(FakeExchange::default(), LlmMode::WellFormed, Some(news.clone() as Arc<dyn NewsClient>));

    let result = assert_ok!(h.facade.analyze("crypto_analysis", "ETHUSDT").await);

    assert!(result.is_structured());
    assert!(news.calls.load(Ordering::SeqCst) >= 1);
    assert!(h.llm.prompt(0).contains("No recent news available."));
}

#[tokio::test]
async fn test_malformed_response_keeps_raw_text() {
    let h = harness(FakeExchange::default(), LlmMode::Malformed);

    let result = assert_ok!(h.facade.analyze("spot_trading_analysis", "ETHUSDT").await);

    assert_eq!(result.raw_text, "Looks bullish to me, maybe buy some.");
    assert!(result.sections.is_empty());
    match &result.status {
        ReportStatus::Unstructured { missing } => {
            assert!(missing.contains(&Section::Overview));
            assert!(missing.contains(&Section::RiskManagement));
        }
        other => panic!("expected unstructured, got {:?}", other),
    }
    assert_eq!(result.final_state(), Some(&RequestState::Done));
    assert!(result.states.contains(&RequestState::Unstructured));
}

#[tokio::test]
async fn test_llm_outage_retries_once_then_fails() {
    let h = harness(FakeExchange::default(), LlmMode::Down);

    let err = assert_err!(h.facade.analyze("futures_trading_analysis", "ETHUSDT").await);

    assert!(matches!(err, AnalysisError::LlmUnavailable(_)));
    assert_eq!(h.llm.calls(), 2);
    assert_eq!(h.llm.prompt(0), h.llm.prompt(1));
}

#[tokio::test]
async fn test_module_timeframes_drive_fetch() {
    let h = harness(FakeExchange::default(), LlmMode::WellFormed);

    let result = assert_ok!(h.facade.analyze("futures_trading_analysis", "ETHUSDT").await);

    assert_eq!(
        result.timeframes,
        vec![Timeframe::FifteenMinutes, Timeframe::OneHour, Timeframe::FourHours]
    );
    assert_eq!(h.exchange.kline_calls("ETHUSDT"), 3);
    assert!(h.llm.prompt(0).contains("Never suggest leverage above 20x."));
}

#[tokio::test]
async fn test_reference_context_shared_within_batch() {
    let h = harness(FakeExchange::default(), LlmMode::WellFormed);
    let symbols = vec!["ETHUSDT".to_string(), "SOLUSDT".to_string(), "ADAUSDT".to_string()];

    let results = h.facade.analyze_batch("crypto_analysis", &symbols).await;

    assert_eq!(results.len(), 3);
    for ((symbol, outcome), expected) in results.iter().zip(&symbols) {
        assert_eq!(symbol, expected);
        assert!(outcome.is_ok());
    }
    // One reference fetch for the whole batch
    assert_eq!(h.exchange.kline_calls("BTCUSDT"), 1);

    // Separate batches compute their own summary
    assert_ok!(h.facade.analyze("crypto_analysis", "ETHUSDT").await);
    assert_ok!(h.facade.analyze("crypto_analysis", "SOLUSDT").await);
    assert_eq!(h.exchange.kline_calls("BTCUSDT"), 3);
}

#[tokio::test]
async fn test_reference_context_rendered_in_prompt() {
    let h = harness(
        FakeExchange::failing(&[("BTCUSDT", Timeframe::FourHours)]),
        LlmMode::WellFormed,
    );

    // Reference failure degrades instead of failing the analysis
    assert_ok!(h.facade.analyze("crypto_analysis", "ETHUSDT").await);
    assert!(h.llm.prompt(0).contains("## Reference asset context"));
    assert!(h.llm.prompt(0).to_lowercase().contains("unavailable"));
}

#[tokio::test]
async fn test_memory_enriches_later_prompts() {
    let h = harness(FakeExchange::default(), LlmMode::WellFormed);

    assert_ok!(h.facade.analyze("crypto_analysis", "ETHUSDT").await);
    h.facade.flush_memory().await;
    assert_eq!(h.store.len("ETHUSDT"), 1);

    assert_ok!(h.facade.analyze("crypto_analysis", "ETHUSDT").await);
    let second = h.llm.prompt(1);
    assert!(second.contains("[crypto_analysis]"));
    assert!(second.contains("Constructive bias while above 150."));
    assert!(h.llm.prompt(0).contains("No previous analyses for ETHUSDT."));
}

#[tokio::test]
async fn test_train_memory_appends_outcomes() {
    let h = harness(FakeExchange::default(), LlmMode::WellFormed);

    assert_ok!(h.facade.analyze("crypto_analysis", "ETHUSDT").await);
    h.facade.flush_memory().await;

    let appended = assert_ok!(h.facade.train_memory("ETHUSDT").await);
    assert_eq!(appended, 1);
    assert_eq!(h.store.len("ETHUSDT"), 2);

    // Already trained
    assert_eq!(assert_ok!(h.facade.train_memory("ETHUSDT").await), 0);
}

#[tokio::test]
async fn test_list_modules() {
    let h = harness(FakeExchange::default(), LlmMode::WellFormed);
    let names: Vec<_> = h.facade.list_modules().into_iter().map(|m| m.name).collect();
    assert_eq!(
        names,
        vec!["crypto_analysis", "spot_trading_analysis", "futures_trading_analysis"]
    );
}

#[tokio::test]
async fn test_futures_prompt_marks_unconfigured_derivatives() {
    let h = harness(FakeExchange::default(), LlmMode::WellFormed);

    assert_ok!(h.facade.analyze("futures_trading_analysis", "ETHUSDT").await);

    let prompt = h.llm.prompt(0);
    assert!(prompt.contains("## Derivatives (perpetual futures)"));
    assert!(prompt.contains("- Funding rate: N/A (no derivatives source configured)"));
    assert!(prompt.contains("- Order book: N/A (no derivatives source configured)"));
    assert!(prompt.contains("Derivatives values shown as N/A are unknown"));
}

#[tokio::test]
async fn test_futures_prompt_renders_partial_derivatives() {
    let h = harness(FakeExchange::default(), LlmMode::WellFormed);
    let retry = RetryPolicy {
        max_attempts: 2,
        base_delay: std::time::Duration::from_millis(1),
        max_delay: std::time::Duration::from_millis(1),
        attempt_timeout: std::time::Duration::from_secs(1),
    };
    let facade = h.facade.with_derivatives(DerivativesSource::new(
        Arc::new(FundingOnly),
        RequestPool::new(4, 60_000),
        retry,
        3,
    ));

    let result = assert_ok!(facade.analyze("futures_trading_analysis", "ETHUSDT").await);

    assert!(result.is_structured());
    let prompt = h.llm.prompt(0);
    assert!(prompt.contains("- Funding rate: -0.0042% (mark price 358.40)"));
    assert!(prompt.contains("- Open interest: N/A (not found: Invalid symbol.)"));
    assert!(prompt.contains("- Top trader long/short ratio: N/A (not found: Invalid symbol.)"));
}

#[tokio::test]
async fn test_spot_and_crypto_prompts_skip_derivatives() {
    let h = harness(FakeExchange::default(), LlmMode::WellFormed);

    assert_ok!(h.facade.analyze("crypto_analysis", "ETHUSDT").await);
    assert_ok!(h.facade.analyze("spot_trading_analysis", "ETHUSDT").await);

    for idx in 0..2 {
        let prompt = h.llm.prompt(idx);
        assert!(!prompt.contains("## Derivatives"));
        assert!(prompt.contains("Global market data: unavailable"));
        assert!(prompt.contains("## Volume across timeframes\n- "));
    }

    // Every timeframe of the crypto prompt takes part in the volume comparison
    let crypto = h.llm.prompt(0);
    for tf in Timeframe::ALL {
        assert!(crypto.contains(&format!("- {}: current volume", tf)));
    }
}
