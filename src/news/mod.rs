//! News, market-sentiment and global-market collection.
//!
//! Every source here is optional context: any failure degrades to "nothing"
//! with a warning and never fails the analysis.

use crate::api::{with_retry, MarketOverviewClient, NewsClient, RequestPool, RetryPolicy, SentimentClient};
use crate::models::{GlobalMarket, MarketSentiment, NewsItem};
use std::collections::HashSet;
use std::sync::Arc;

/// Recent news for a symbol, deduplicated and newest first
#[derive(Clone)]
pub struct NewsAggregator {
    client: Option<Arc<dyn NewsClient>>,
    pool: RequestPool,
    retry: RetryPolicy,
}

impl NewsAggregator {
    pub fn new(client: Option<Arc<dyn NewsClient>>, pool: RequestPool, retry: RetryPolicy) -> Self {
        Self {
            client,
            pool,
            retry,
        }
    }

    /// Never fails; an unreachable or unconfigured source yields an empty list
    pub async fn fetch_news(&self, symbol: &str, limit: usize) -> Vec<NewsItem> {
        let Some(client) = &self.client else {
            tracing::debug!(symbol, "No news source configured");
            return Vec::new();
        };
        if limit == 0 {
            return Vec::new();
        }

        // Over-fetch so deduplication still leaves `limit` items
        let fetch_limit = limit.saturating_mul(2);
        match with_retry(&self.pool, &self.retry, "news", || client.get_news(symbol, fetch_limit)).await {
            Ok(items) => {
                let items = normalize(items, limit);
                tracing::info!(symbol, count = items.len(), "News fetched");
                items
            }
            Err(e) => {
                tracing::warn!(symbol, error = %e, "News source failed, continuing without news");
                Vec::new()
            }
        }
    }
}

/// Drop repeated (source, title) pairs, sort newest first, keep `limit`
pub fn normalize(items: Vec<NewsItem>, limit: usize) -> Vec<NewsItem> {
    let mut seen = HashSet::new();
    let mut unique: Vec<NewsItem> = items
        .into_iter()
        .filter(|item| {
            seen.insert((
                item.source.trim().to_lowercase(),
                item.title.trim().to_lowercase(),
            ))
        })
        .collect();

    // Stable sort keeps upstream order among equal timestamps
    unique.sort_by(|a, b| b.published_at.cmp(&a.published_at));
    unique.truncate(limit);
    unique
}

/// Optional Fear & Greed reading
#[derive(Clone)]
pub struct SentimentSource {
    client: Option<Arc<dyn SentimentClient>>,
    pool: RequestPool,
    retry: RetryPolicy,
}

impl SentimentSource {
    pub fn new(client: Option<Arc<dyn SentimentClient>>, pool: RequestPool, retry: RetryPolicy) -> Self {
        Self {
            client,
            pool,
            retry,
        }
    }

    pub async fn fetch(&self) -> Option<MarketSentiment> {
        let client = self.client.as_ref()?;
        match with_retry(&self.pool, &self.retry, "fear_greed", || client.fear_greed()).await {
            Ok(sentiment) => Some(sentiment),
            Err(e) => {
                tracing::warn!(error = %e, "Market sentiment unavailable");
                None
            }
        }
    }
}

/// Optional total-market snapshot (capitalisation, dominance, 24h trend)
#[derive(Clone)]
pub struct MarketOverviewSource {
    client: Option<Arc<dyn MarketOverviewClient>>,
    pool: RequestPool,
    retry: RetryPolicy,
}

impl MarketOverviewSource {
    pub fn new(client: Option<Arc<dyn MarketOverviewClient>>, pool: RequestPool, retry: RetryPolicy) -> Self {
        Self {
            client,
            pool,
            retry,
        }
    }

    pub async fn fetch(&self) -> Option<GlobalMarket> {
        let client = self.client.as_ref()?;
        match with_retry(&self.pool, &self.retry, "global_market", || client.global_market()).await {
            Ok(market) => {
                tracing::debug!(
                    market_cap_change = market.market_cap_change_24h_pct,
                    btc_dominance = market.btc_dominance_pct,
                    "Global market fetched"
                );
                Some(market)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Global market data unavailable");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ClientError, ClientResult};
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn item(title: &str, source: &str, minutes: i64) -> NewsItem {
        NewsItem {
            title: title.to_string(),
            source: source.to_string(),
            published_at: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap() + Duration::minutes(minutes),
            sentiment: None,
        }
    }

    fn quick_retry() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 2,
            base_delay: std::time::Duration::from_millis(1),
            max_delay: std::time::Duration::from_millis(1),
            attempt_timeout: std::time::Duration::from_secs(1),
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

    struct StaticNews(Vec<NewsItem>);

    #[async_trait]
    impl NewsClient for StaticNews {
        async fn get_news(&self, _symbol: &str, _limit: usize) -> ClientResult<Vec<NewsItem>> {
            Ok(self.0.clone())
        }
    }

    struct FlakyOverview {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl MarketOverviewClient for FlakyOverview {
        async fn global_market(&self) -> ClientResult<GlobalMarket> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(ClientError::Transient("429 Too Many Requests".into()));
            }
            Ok(GlobalMarket {
                total_market_cap_usd: 2.5e12,
                total_volume_usd: 9.0e10,
                market_cap_change_24h_pct: 1.5,
                btc_dominance_pct: 52.0,
                eth_dominance_pct: 17.0,
                active_cryptocurrencies: 10_000,
            })
        }
    }

    #[test]
    fn test_normalize_dedups_and_orders() {
        let items = vec![
            item("ETF approved", "CoinDesk", 0),
            item("Hack drains bridge", "The Block", 30),
            item("ETF Approved ", "coindesk", 10),
            item("ETF approved", "Decrypt", 5),
        ];

        let out = normalize(items, 10);
        let titles: Vec<_> = out.iter().map(|i| (i.title.as_str(), i.source.as_str())).collect();
        assert_eq!(
            titles,
            vec![
                ("Hack drains bridge", "The Block"),
                ("ETF approved", "Decrypt"),
                ("ETF approved", "CoinDesk"),
            ]
        );
    }

    #[test]
    fn test_normalize_truncates() {
        let items = (0..8).map(|i| item(&format!("story {}", i), "src", i)).collect();
        let out = normalize(items, 3);
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].title, "story 7");
    }

    #[tokio::test]
    async fn test_failing_source_degrades_to_empty() {
        let client = Arc::new(BrokenNews {
            calls: AtomicUsize::new(0),
        });
        let aggregator = NewsAggregator::new(Some(client.clone()), RequestPool::new(2, 6000), quick_retry());

        let news = aggregator.fetch_news("BTCUSDT", 5).await;
        assert!(news.is_empty());
        assert_eq!(client.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_fetch_news_limits_results() {
        let items = (0..6).map(|i| item(&format!("n{}", i), "src", i)).collect();
        let aggregator = NewsAggregator::new(
            Some(Arc::new(StaticNews(items))),
            RequestPool::new(2, 6000),
            quick_retry(),
        );

        let news = aggregator.fetch_news("ETHUSDT", 2).await;
        assert_eq!(news.len(), 2);
        assert_eq!(news[0].title, "n5");
    }

    #[tokio::test]
    async fn test_unconfigured_sources() {
        let aggregator = NewsAggregator::new(None, RequestPool::new(1, 60), quick_retry());
        assert!(aggregator.fetch_news("BTCUSDT", 5).await.is_empty());

        let sentiment = SentimentSource::new(None, RequestPool::new(1, 60), quick_retry());
        assert!(sentiment.fetch().await.is_none());

        let overview = MarketOverviewSource::new(None, RequestPool::new(1, 60), quick_retry());
        assert!(overview.fetch().await.is_none());
    }

    #[tokio::test]
    async fn test_global_market_retried_once() {
        let client = Arc::new(FlakyOverview {
            calls: AtomicUsize::new(0),
        });
        let overview = MarketOverviewSource::new(Some(client.clone()), RequestPool::new(1, 6000), quick_retry());

        let market = overview.fetch().await.unwrap();
        assert_eq!(market.btc_dominance_pct, 52.0);
        assert_eq!(client.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_global_market_failure_degrades_to_none() {
        let client = Arc::new(FlakyOverview {
            calls: AtomicUsize::new(0),
        });
        let single = RetryPolicy {
            max_attempts: 1,
            ..quick_retry()
        };
        let overview = MarketOverviewSource::new(Some(client), RequestPool::new(1, 6000), single);
        assert!(overview.fetch().await.is_none());
    }
}
