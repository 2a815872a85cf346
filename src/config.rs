//! Runtime settings: optional `analyst.toml` overlaid with `ANALYST_*`
//! environment variables (`ANALYST_LLM__API_KEY`, `ANALYST_PIPELINE__LOOKBACK`).

use crate::api::binance::BINANCE_API_BASE;
use crate::api::binance_futures::BINANCE_FUTURES_API_BASE;
use crate::api::coingecko::COINGECKO_API_BASE;
use crate::api::cryptopanic::CRYPTOPANIC_API_BASE;
use crate::api::fear_greed::FEAR_GREED_URL;
use crate::api::openai::{DEFAULT_MODEL, OPENAI_API_BASE};
use crate::api::RetryPolicy;
use crate::indicators::IndicatorConfig;
use crate::models::Timeframe;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub exchange: ExchangeSettings,
    pub llm: LlmSettings,
    pub news: NewsSettings,
    pub sentiment: SentimentSettings,
    pub market_overview: MarketOverviewSettings,
    pub derivatives: DerivativesSettings,
    pub pipeline: PipelineSettings,
    pub indicators: IndicatorConfig,
    pub memory: MemorySettings,
}

impl Settings {
    /// Load from `analyst.toml` (if present) and the environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("analyst")
    }

    pub fn load_from(file_stem: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::with_name(file_stem).required(false))
            .add_source(
                Environment::with_prefix("ANALYST")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExchangeSettings {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for ExchangeSettings {
    fn default() -> Self {
        Self {
            base_url: BINANCE_API_BASE.to_string(),
            timeout_secs: 10,
        }
    }
}

impl ExchangeSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout_secs: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: OPENAI_API_BASE.to_string(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: 4096,
            temperature: 0.4,
            timeout_secs: 90,
        }
    }
}

impl LlmSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NewsSettings {
    /// CryptoPanic auth token; news is skipped without one
    pub token: Option<String>,
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for NewsSettings {
    fn default() -> Self {
        Self {
            token: None,
            base_url: CRYPTOPANIC_API_BASE.to_string(),
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SentimentSettings {
    pub enabled: bool,
    pub url: String,
    pub timeout_secs: u64,
}

impl Default for SentimentSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            url: FEAR_GREED_URL.to_string(),
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MarketOverviewSettings {
    pub enabled: bool,
    pub base_url: String,
    /// Optional CoinGecko demo key
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for MarketOverviewSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: COINGECKO_API_BASE.to_string(),
            api_key: None,
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DerivativesSettings {
    pub enabled: bool,
    pub base_url: String,
    pub timeout_secs: u64,
    /// Order book walls reported per side
    pub walls: usize,
}

impl Default for DerivativesSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: BINANCE_FUTURES_API_BASE.to_string(),
            timeout_secs: 10,
            walls: 3,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    pub reference_symbol: String,
    pub reference_timeframe: Timeframe,
    /// Candles requested per timeframe
    pub lookback: usize,
    pub news_limit: usize,
    pub memory_limit: usize,
    /// Fewer usable timeframes than this fails with `InsufficientData`
    pub min_usable_timeframes: usize,
    pub max_concurrent_requests: usize,
    pub requests_per_minute: u32,
    pub retry_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub request_timeout_secs: u64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            reference_symbol: "BTCUSDT".to_string(),
            reference_timeframe: Timeframe::FourHours,
            lookback: 500,
            news_limit: 5,
            memory_limit: 5,
            min_usable_timeframes: 1,
            max_concurrent_requests: 8,
            requests_per_minute: 600,
            retry_attempts: 3,
            retry_base_delay_ms: 500,
            request_timeout_secs: 15,
        }
    }
}

impl PipelineSettings {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_attempts.max(1),
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            attempt_timeout: Duration::from_secs(self.request_timeout_secs),
            ..RetryPolicy::default()
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MemorySettings {
    /// Redis URL; an in-process store is used when unset
    pub redis_url: Option<String>,
    pub summary_chars: usize,
    /// Analyses younger than this get no outcome during training
    pub outcome_min_age_hours: i64,
}

impl Default for MemorySettings {
    fn default() -> Self {
        Self {
            redis_url: None,
            summary_chars: 600,
            outcome_min_age_hours: 24,
        }
    }
}
