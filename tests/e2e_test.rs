use cryptoanalyst::api::{
    BinanceClient, BinanceFuturesClient, CoinGeckoClient, DerivativesClient, ExchangeClient, FearGreedClient,
    MarketOverviewClient, RequestPool, RetryPolicy, SentimentClient,
};
use cryptoanalyst::context::{ContextBatch, ContextSummarizer};
use cryptoanalyst::fetcher::MarketDataFetcher;
use cryptoanalyst::indicators::{IndicatorEngine, IndicatorKind};
use cryptoanalyst::*;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
#[ignore] // Hits live Binance, alternative.me and CoinGecko endpoints
async fn test_e2e_market_data_workflow() {
    // Initialize logging
    let _ = tracing_subscriber::fmt::try_init();

    println!("=== Starting E2E Test ===\n");

    // 1. Ticker
    println!("1. Testing Binance ticker...");
    let binance = BinanceClient::new(cryptoanalyst::api::binance::BINANCE_API_BASE, Duration::from_secs(10))
        .expect("client");
    let ticker = binance.get_ticker("BTCUSDT").await.expect("ticker");
    println!("   ✓ BTC price: ${:.2} ({:+.2}%)", ticker.last_price, ticker.change_24h_pct);
    assert!(ticker.last_price > 0.0);

    // 2. Multi-timeframe fetch through the pool
    println!("\n2. Testing multi-timeframe fetch...");
    let fetcher = MarketDataFetcher::new(
        Arc::new(binance.clone()),
        RequestPool::new(4, 600),
        RetryPolicy::default(),
    );
    let data = fetcher
        .fetch("ETHUSDT", &Timeframe::ALL, 250)
        .await
        .expect("fetch");
    println!("   ✓ Usable timeframes: {}", data.usable_timeframes());
    assert_eq!(data.usable_timeframes(), Timeframe::ALL.len());
    assert_eq!(data.completeness(), DataCompleteness::Full);

    // 3. Indicators on real candles
    println!("\n3. Testing indicator engine...");
    let engine = IndicatorEngine::default();
    let series = &data.series[&Timeframe::OneHour];
    let indicators = engine.compute(series.candles());
    let rsi = indicators.scalar(IndicatorKind::Rsi).expect("rsi");
    println!("   ✓ ETH 1h RSI(14): {:.2}", rsi);
    assert!((0.0..=100.0).contains(&rsi));
    assert!(indicators.get(IndicatorKind::Macd).is_some());

    // 4. Reference context
    println!("\n4. Testing reference context...");
    let summarizer = ContextSummarizer::new(fetcher.clone(), engine, "BTCUSDT", Timeframe::FourHours, 250);
    let batch = ContextBatch::new(summarizer);
    let summary = batch.summary().await;
    println!("{}", summary.render());
    assert!(summary.is_available());

    // 5. Unknown symbol
    println!("\n5. Testing unknown symbol...");
    let err = fetcher.fetch("XYZNOTAPAIR", &[Timeframe::OneHour], 10).await.unwrap_err();
    assert_eq!(err, AnalysisError::SymbolNotFound("XYZNOTAPAIR".to_string()));

    // 6. Fear & Greed
    println!("\n6. Testing Fear & Greed index...");
    let fng = FearGreedClient::new(cryptoanalyst::api::fear_greed::FEAR_GREED_URL, Duration::from_secs(10))
        .expect("client");
    let sentiment = fng.fear_greed().await.expect("sentiment");
    println!("   ✓ Fear & Greed: {} ({})", sentiment.value, sentiment.classification);
    assert!(sentiment.value <= 100);

    // 7. Perpetual futures
    println!("\n7. Testing Binance futures data...");
    let futures = BinanceFuturesClient::new(
        cryptoanalyst::api::binance_futures::BINANCE_FUTURES_API_BASE,
        Duration::from_secs(10),
    )
    .expect("client");
    let funding = futures.funding("BTCUSDT").await.expect("funding");
    println!("   ✓ BTC funding: {:+.4}%", funding.funding_rate_pct);
    let book = futures.order_book("BTCUSDT", 3).await.expect("order book");
    assert!(book.best_ask >= book.best_bid);
    assert_eq!(book.bid_walls.len(), 3);

    // 8. Global market
    println!("\n8. Testing CoinGecko global market...");
    let gecko = CoinGeckoClient::new(cryptoanalyst::api::coingecko::COINGECKO_API_BASE, None, Duration::from_secs(10))
        .expect("client");
    let global = gecko.global_market().await.expect("global");
    println!("   ✓ BTC dominance: {:.2}%", global.btc_dominance_pct);
    assert!(global.total_market_cap_usd > 0.0);

    println!("\n=== E2E Test Complete ===");
}
