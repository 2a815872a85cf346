use super::{ClientError, ClientResult, ExchangeClient};
use crate::models::{Candle, TickerSnapshot, Timeframe};
use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

pub const BINANCE_API_BASE: &str = "https://api.binance.com";

/// Binance error code for an unknown trading pair
const INVALID_SYMBOL_CODE: i64 = -1121;

/// Binance spot market-data client (public endpoints, no key)
#[derive(Clone)]
pub struct BinanceClient {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Ticker24h {
    symbol: String,
    last_price: String,
    price_change_percent: String,
    volume: String,
}

#[derive(Debug, Deserialize)]
struct BinanceErrorBody {
    code: i64,
    msg: String,
}

impl BinanceClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn get(&self, path: &str, query: &[(&str, String)]) -> ClientResult<String> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.client.get(&url).query(query).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if status.is_success() {
            return Ok(body);
        }

        Err(map_error(status, &body))
    }
}

/// Binance reports unknown symbols as 400 with code -1121
pub(super) fn map_error(status: StatusCode, body: &str) -> ClientError {
    if let Ok(err) = serde_json::from_str::<BinanceErrorBody>(body) {
        if err.code == INVALID_SYMBOL_CODE {
            return ClientError::NotFound(err.msg);
        }
    }
    ClientError::from_status(status, body)
}

pub(super) fn parse_decimal(value: &Value, field: &str) -> ClientResult<f64> {
    match value {
        Value::String(s) => s
            .parse::<f64>()
            .map_err(|e| ClientError::Decode(format!("{}: {}", field, e))),
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| ClientError::Decode(format!("{}: not a float", field))),
        other => Err(ClientError::Decode(format!(
            "{}: unexpected value {}",
            field, other
        ))),
    }
}

/// Kline rows look like `[openTime, "open", "high", "low", "close", "volume", closeTime, ...]`
fn parse_kline(row: &[Value]) -> ClientResult<Candle> {
    if row.len() < 6 {
        return Err(ClientError::Decode(format!(
            "kline row has {} fields, expected at least 6",
            row.len()
        )));
    }

    let open_time = row[0]
        .as_i64()
        .ok_or_else(|| ClientError::Decode("open time is not an integer".to_string()))?;
    let timestamp = DateTime::<Utc>::from_timestamp_millis(open_time)
        .ok_or_else(|| ClientError::Decode(format!("open time out of range: {}", open_time)))?;

    Ok(Candle {
        timestamp,
        open: parse_decimal(&row[1], "open")?,
        high: parse_decimal(&row[2], "high")?,
        low: parse_decimal(&row[3], "low")?,
        close: parse_decimal(&row[4], "close")?,
        volume: parse_decimal(&row[5], "volume")?,
    })
}

#[async_trait]
impl ExchangeClient for BinanceClient {
    async fn get_klines(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> ClientResult<Vec<Candle>> {
        let body = self
            .get(
                "/api/v3/klines",
                &[
                    ("symbol", symbol.to_uppercase()),
                    ("interval", timeframe.as_str().to_string()),
                    // Binance caps a single page at 1000 rows
                    ("limit", limit.clamp(1, 1000).to_string()),
                ],
            )
            .await?;

        let rows: Vec<Vec<Value>> = serde_json::from_str(&body)?;
        let candles = rows
            .iter()
            .map(|row| parse_kline(row))
            .collect::<ClientResult<Vec<_>>>()?;

        tracing::debug!(
            symbol,
            timeframe = %timeframe,
            count = candles.len(),
            "Fetched klines"
        );

        Ok(candles)
    }

    async fn get_ticker(&self, symbol: &str) -> ClientResult<TickerSnapshot> {
        let body = self
            .get("/api/v3/ticker/24hr", &[("symbol", symbol.to_uppercase())])
            .await?;

        let ticker: Ticker24h = serde_json::from_str(&body)?;
        let parse = |s: &str, field: &str| {
            s.parse::<f64>()
                .map_err(|e| ClientError::Decode(format!("{}: {}", field, e)))
        };

        Ok(TickerSnapshot {
            symbol: ticker.symbol,
            last_price: parse(&ticker.last_price, "lastPrice")?,
            change_24h_pct: parse(&ticker.price_change_percent, "priceChangePercent")?,
            volume_24h: parse(&ticker.volume, "volume")?,
            fetched_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn client_for(server: &mockito::ServerGuard) -> BinanceClient {
        BinanceClient::new(server.url(), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_get_klines_parses_rows() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v3/klines")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("symbol".into(), "BTCUSDT".into()),
                Matcher::UrlEncoded("interval".into(), "4h".into()),
                Matcher::UrlEncoded("limit".into(), "2".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"[
                    [1704067200000,"42000.1","42500.0","41800.5","42300.0","123.45",1704081599999,"0",10,"0","0","0"],
                    [1704081600000,"42300.0","42600.0","42100.0","42550.5","98.7",1704095999999,"0",8,"0","0","0"]
                ]"#,
            )
            .create_async()
            .await;

        let candles = client_for(&server)
            .get_klines("btcusdt", Timeframe::FourHours, 2)
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].open, 42000.1);
        assert_eq!(candles[1].close, 42550.5);
        assert_eq!(candles[0].timestamp.timestamp_millis(), 1704067200000);
    }

    #[tokio::test]
    async fn test_invalid_symbol_maps_to_not_found() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/v3/ticker/24hr")
            .match_query(Matcher::UrlEncoded("symbol".into(), "XYZUSDT".into()))
            .with_status(400)
            .with_body(r#"{"code":-1121,"msg":"Invalid symbol."}"#)
            .create_async()
            .await;

        let err = client_for(&server).get_ticker("XYZUSDT").await.unwrap_err();
        assert_eq!(err, ClientError::NotFound("Invalid symbol.".to_string()));
    }

    #[tokio::test]
    async fn test_server_error_is_transient() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/v3/klines")
            .match_query(Matcher::Any)
            .with_status(503)
            .with_body("maintenance")
            .create_async()
            .await;

        let err = client_for(&server)
            .get_klines("BTCUSDT", Timeframe::OneHour, 10)
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_get_ticker() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/v3/ticker/24hr")
            .match_query(Matcher::UrlEncoded("symbol".into(), "BTCUSDT".into()))
            .with_status(200)
            .with_body(
                r#"{"symbol":"BTCUSDT","priceChange":"1460.0","priceChangePercent":"2.300",
                    "lastPrice":"65000.00","volume":"25000.5","quoteVolume":"1"}"#,
            )
            .create_async()
            .await;

        let ticker = client_for(&server).get_ticker("BTCUSDT").await.unwrap();
        assert_eq!(ticker.symbol, "BTCUSDT");
        assert_eq!(ticker.last_price, 65000.0);
        assert_eq!(ticker.change_24h_pct, 2.3);
        assert_eq!(ticker.volume_24h, 25000.5);
    }

    #[tokio::test]
    async fn test_malformed_row_is_decode_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/v3/klines")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"[[1704067200000,"1.0"]]"#)
            .create_async()
            .await;

        let err = client_for(&server)
            .get_klines("BTCUSDT", Timeframe::OneDay, 1)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Decode(_)));
    }

    #[tokio::test]
    #[ignore] // Requires network
    async fn test_live_binance_klines() {
        let client = BinanceClient::new(BINANCE_API_BASE, Duration::from_secs(10)).unwrap();
        let candles = client
            .get_klines("BTCUSDT", Timeframe::OneHour, 50)
            .await
            .unwrap();
        println!("Fetched {} candles, last close {:?}", candles.len(), candles.last().map(|c| c.close));
        assert_eq!(candles.len(), 50);
    }
}
