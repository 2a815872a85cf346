/// Volume-weighted average price and realised volatility
use crate::models::Candle;

/// VWAP over the last `period` candles, using the typical price
/// `(high + low + close) / 3`
pub fn calculate_vwap(candles: &[Candle], period: usize) -> Option<f64> {
    if period == 0 || candles.len() < period {
        return None;
    }

    let window = &candles[candles.len() - period..];
    let volume: f64 = window.iter().map(|c| c.volume).sum();
    if volume <= 0.0 {
        return None;
    }

    let weighted: f64 = window
        .iter()
        .map(|c| (c.high + c.low + c.close) / 3.0 * c.volume)
        .sum();
    Some(weighted / volume)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolatilityReading {
    /// Sample standard deviation of candle-to-candle returns, in percent
    pub returns_std_pct: f64,
    /// High-low range of the window relative to the last close, in percent
    pub range_pct: f64,
}

/// Realised volatility over the last `period` returns
pub fn calculate_volatility(candles: &[Candle], period: usize) -> Option<VolatilityReading> {
    if period < 2 || candles.len() < period + 1 {
        return None;
    }

    let window = &candles[candles.len() - period - 1..];
    let returns: Vec<f64> = window
        .windows(2)
        .filter(|w| w[0].close > 0.0)
        .map(|w| (w[1].close / w[0].close - 1.0) * 100.0)
        .collect();
    if returns.len() < 2 {
        return None;
    }

    let mean = returns.iter().sum::<f64>() / returns.len() as f64;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (returns.len() - 1) as f64;

    let last_close = window[window.len() - 1].close;
    if last_close <= 0.0 {
        return None;
    }
    let high = window[1..].iter().map(|c| c.high).fold(f64::MIN, f64::max);
    let low = window[1..].iter().map(|c| c.low).fold(f64::MAX, f64::min);

    Some(VolatilityReading {
        returns_std_pct: variance.sqrt(),
        range_pct: (high - low) / last_close * 100.0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn candle(i: i64, close: f64, volume: f64) -> Candle {
        Candle {
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::hours(i),
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume,
        }
    }

    #[test]
    fn test_vwap_weights_by_volume() {
        let candles = vec![candle(0, 500.0, 1.0), candle(1, 100.0, 1.0), candle(2, 200.0, 3.0)];
        // Typical price equals close with a symmetric high/low
        let vwap = calculate_vwap(&candles, 2).unwrap();
        assert!((vwap - 175.0).abs() < 1e-9);

        assert!(calculate_vwap(&candles, 4).is_none());
        let silent = vec![candle(0, 100.0, 0.0), candle(1, 101.0, 0.0)];
        assert!(calculate_vwap(&silent, 2).is_none());
    }

    #[test]
    fn test_volatility_of_alternating_returns() {
        let closes = [100.0, 110.0, 100.0, 110.0, 100.0];
        let candles: Vec<_> = closes.iter().enumerate().map(|(i, c)| candle(i as i64, *c, 1.0)).collect();

        let reading = calculate_volatility(&candles, 4).unwrap();
        assert!(reading.returns_std_pct > 9.0);
        // Range 99..111 over the last close of 100
        assert!((reading.range_pct - 12.0).abs() < 1e-9);
    }

    #[test]
    fn test_constant_prices_have_zero_volatility() {
        let candles: Vec<_> = (0..10).map(|i| candle(i, 50.0, 1.0)).collect();
        let reading = calculate_volatility(&candles, 5).unwrap();
        assert_eq!(reading.returns_std_pct, 0.0);
        assert!(calculate_volatility(&candles[..3], 5).is_none());
    }
}
