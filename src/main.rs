use anyhow::Context;
use clap::{Parser, Subcommand};
use cryptoanalyst::api::{
    BinanceClient, BinanceFuturesClient, CoinGeckoClient, CryptoPanicClient, FearGreedClient,
    MarketOverviewClient, NewsClient, OpenAiClient, RequestPool, SentimentClient,
};
use cryptoanalyst::derivatives::DerivativesSource;
use cryptoanalyst::fetcher::MarketDataFetcher;
use cryptoanalyst::indicators::IndicatorEngine;
use cryptoanalyst::llm::LlmInvoker;
use cryptoanalyst::memory::{InMemoryStore, Memory, MemoryStore, RedisMemoryStore};
use cryptoanalyst::modules::register_defaults;
use cryptoanalyst::news::{MarketOverviewSource, NewsAggregator, SentimentSource};
use cryptoanalyst::prompt::PromptBuilder;
use cryptoanalyst::{AnalysisFacade, AnalysisResult, ModuleRegistry, ReportStatus, Settings};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cryptoanalyst", version, about = "LLM-assisted crypto market analysis")]
struct Cli {
    /// Settings file stem, without extension
    #[arg(long, default_value = "analyst")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List registered analysis modules
    List,
    /// Analyze one or more symbols in a single batch
    Analyze {
        #[arg(long, short, default_value = "crypto_analysis")]
        module: String,
        /// Print results as JSON instead of markdown
        #[arg(long)]
        json: bool,
        #[arg(required = true)]
        symbols: Vec<String>,
    },
    /// Attach observed price outcomes to past analyses
    TrainMemory { symbol: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let cli = Cli::parse();
    let settings = Settings::load_from(&cli.config).context("failed to load settings")?;

    if let Command::Analyze { .. } = cli.command {
        if settings.llm.api_key.is_none() {
            anyhow::bail!("ANALYST_LLM__API_KEY is not set");
        }
    }

    let facade = build_facade(&settings).await?;

    match cli.command {
        Command::List => {
            for module in facade.list_modules() {
                println!("{:<28} {}", module.name, module.description);
            }
        }
        Command::Analyze {
            module,
            json,
            symbols,
        } => {
            let results = facade.analyze_batch(&module, &symbols).await;
            let mut failures = 0;
            for (symbol, outcome) in &results {
                match outcome {
                    Ok(result) if json => println!("{}", serde_json::to_string_pretty(result)?),
                    Ok(result) => print_report(result),
                    Err(e) => {
                        failures += 1;
                        eprintln!("{}: {}", symbol, e);
                    }
                }
            }
            facade.flush_memory().await;

            if failures == results.len() {
                anyhow::bail!("all {} analyses failed", failures);
            }
        }
        Command::TrainMemory { symbol } => {
            let appended = facade.train_memory(&symbol).await?;
            println!("{}: recorded {} outcome(s)", symbol.to_uppercase(), appended);
        }
    }

    Ok(())
}

async fn build_facade(settings: &Settings) -> anyhow::Result<AnalysisFacade> {
    let pipeline = &settings.pipeline;
    let pool = RequestPool::new(pipeline.max_concurrent_requests, pipeline.requests_per_minute);
    let retry = pipeline.retry_policy();

    let exchange = BinanceClient::new(settings.exchange.base_url.clone(), settings.exchange.timeout())?;
    let fetcher = MarketDataFetcher::new(Arc::new(exchange), pool.clone(), retry.clone());

    let llm = OpenAiClient::new(
        settings.llm.api_key.clone().unwrap_or_default(),
        settings.llm.base_url.clone(),
        settings.llm.timeout(),
    )?
    .with_model(settings.llm.model.clone())
    .with_sampling(settings.llm.max_tokens, settings.llm.temperature);
    let invoker = Arc::new(LlmInvoker::new(Arc::new(llm), pool.clone(), settings.llm.timeout()));

    let mut registry = ModuleRegistry::new();
    register_defaults(
        &mut registry,
        PromptBuilder::new(settings.indicators.clone()),
        invoker,
    )?;

    let news_client: Option<Arc<dyn NewsClient>> = match &settings.news.token {
        Some(token) => Some(Arc::new(CryptoPanicClient::new(
            token.clone(),
            settings.news.base_url.clone(),
            std::time::Duration::from_secs(settings.news.timeout_secs),
        )?)),
        None => {
            tracing::info!("No news token configured, news disabled");
            None
        }
    };

    let sentiment_client: Option<Arc<dyn SentimentClient>> = if settings.sentiment.enabled {
        Some(Arc::new(FearGreedClient::new(
            settings.sentiment.url.clone(),
            std::time::Duration::from_secs(settings.sentiment.timeout_secs),
        )?))
    } else {
        None
    };

    let overview = &settings.market_overview;
    let overview_client: Option<Arc<dyn MarketOverviewClient>> = if overview.enabled {
        Some(Arc::new(CoinGeckoClient::new(
            overview.base_url.clone(),
            overview.api_key.clone(),
            std::time::Duration::from_secs(overview.timeout_secs),
        )?))
    } else {
        None
    };

    let memory = Memory::new(connect_memory(settings).await, settings.memory.summary_chars);

    let mut facade = AnalysisFacade::new(
        registry,
        fetcher,
        IndicatorEngine::new(settings.indicators.clone()),
        pipeline.clone(),
    )
    .with_news(NewsAggregator::new(news_client, pool.clone(), retry.clone()))
    .with_sentiment(SentimentSource::new(sentiment_client, pool.clone(), retry.clone()))
    .with_market_overview(MarketOverviewSource::new(overview_client, pool.clone(), retry.clone()))
    .with_memory(
        memory,
        chrono::Duration::hours(settings.memory.outcome_min_age_hours),
    );

    let derivatives = &settings.derivatives;
    if derivatives.enabled {
        let client = BinanceFuturesClient::new(
            derivatives.base_url.clone(),
            std::time::Duration::from_secs(derivatives.timeout_secs),
        )?;
        facade = facade.with_derivatives(DerivativesSource::new(Arc::new(client), pool, retry, derivatives.walls));
    } else {
        tracing::info!("Derivatives data disabled");
    }

    Ok(facade)
}

async fn connect_memory(settings: &Settings) -> Arc<dyn MemoryStore> {
    let Some(url) = &settings.memory.redis_url else {
        tracing::info!("No Redis URL configured, memory is kept in-process");
        return Arc::new(InMemoryStore::new());
    };

    match RedisMemoryStore::connect(url).await {
        Ok(store) => {
            tracing::info!("Memory store connected to Redis");
            Arc::new(store)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Redis unavailable, memory is kept in-process");
            Arc::new(InMemoryStore::new())
        }
    }
}

fn print_report(result: &AnalysisResult) {
    println!("=== {} | {} | {} ===", result.symbol, result.module, result.timestamp.format("%Y-%m-%d %H:%M UTC"));
    if !result.failed_timeframes.is_empty() {
        let failed: Vec<_> = result.failed_timeframes.keys().map(|tf| tf.as_str()).collect();
        println!("(partial data, missing timeframes: {})", failed.join(", "));
    }
    if let ReportStatus::Unstructured { missing } = &result.status {
        let missing: Vec<_> = missing.iter().map(|s| s.title()).collect();
        println!("(unstructured report, missing sections: {})", missing.join(", "));
    }
    println!("{}\n", result.raw_text.trim());
}

fn setup_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("cryptoanalyst=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
