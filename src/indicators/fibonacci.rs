//! Fibonacci retracements over a lookback window and Fibonacci pivot
//! points from the latest candle.

use crate::models::Candle;

const RETRACEMENT_RATIOS: [(&str, f64); 7] = [
    ("0.0%", 0.0),
    ("23.6%", 0.236),
    ("38.2%", 0.382),
    ("50.0%", 0.5),
    ("61.8%", 0.618),
    ("78.6%", 0.786),
    ("100.0%", 1.0),
];

#[derive(Debug, Clone, PartialEq)]
pub enum FibonacciOutcome {
    /// Levels measured down from the window high
    Levels(Vec<(String, f64)>),
    /// High equals low, no meaningful retracement
    FlatRange,
}

/// Retracement levels over the last `lookback` candles, None when there are fewer
pub fn calculate_fibonacci_levels(candles: &[Candle], lookback: usize) -> Option<FibonacciOutcome> {
    if lookback == 0 || candles.len() < lookback {
        return None;
    }

    let window = &candles[candles.len() - lookback..];
    let high = window.iter().map(|c| c.high).fold(f64::NEG_INFINITY, f64::max);
    let low = window.iter().map(|c| c.low).fold(f64::INFINITY, f64::min);

    if high <= low {
        return Some(FibonacciOutcome::FlatRange);
    }

    let diff = high - low;
    let levels = RETRACEMENT_RATIOS
        .iter()
        .map(|(label, ratio)| (label.to_string(), high - diff * ratio))
        .collect();

    Some(FibonacciOutcome::Levels(levels))
}

/// Pivot P with R1..R3 / S1..S3 at 0.382, 0.618 and 1.0 of the candle range
pub fn calculate_fibonacci_pivots(candle: &Candle) -> Vec<(String, f64)> {
    let range = candle.high - candle.low;
    let pivot = (candle.high + candle.low + candle.close) / 3.0;

    let mut levels = vec![("P".to_string(), pivot)];
    for (i, ratio) in [0.382, 0.618, 1.0].iter().enumerate() {
        levels.push((format!("R{}", i + 1), pivot + ratio * range));
        levels.push((format!("S{}", i + 1), pivot - ratio * range));
    }
    levels
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn candle(high: f64, low: f64, close: f64) -> Candle {
        Candle {
            timestamp: Utc::now(),
            open: close,
            high,
            low,
            close,
            volume: 1.0,
        }
    }

    #[test]
    fn test_levels_span_window() {
        let candles = vec![candle(110.0, 100.0, 105.0), candle(200.0, 150.0, 180.0), candle(190.0, 100.0, 120.0)];

        match calculate_fibonacci_levels(&candles, 2) {
            Some(FibonacciOutcome::Levels(levels)) => {
                assert_eq!(levels.len(), 7);
                assert_eq!(levels[0], ("0.0%".to_string(), 200.0));
                assert_eq!(levels[3], ("50.0%".to_string(), 150.0));
                assert_eq!(levels[6], ("100.0%".to_string(), 100.0));
            }
            other => panic!("expected levels, got {:?}", other),
        }
    }

    #[test]
    fn test_flat_range_is_degenerate() {
        let candles = vec![candle(100.0, 100.0, 100.0); 5];
        assert_eq!(calculate_fibonacci_levels(&candles, 5), Some(FibonacciOutcome::FlatRange));
        assert!(calculate_fibonacci_levels(&candles, 6).is_none());
    }

    #[test]
    fn test_pivots() {
        let levels = calculate_fibonacci_pivots(&candle(110.0, 90.0, 100.0));
        assert_eq!(levels[0], ("P".to_string(), 100.0));
        assert_eq!(levels[5], ("R3".to_string(), 120.0));
        assert_eq!(levels[6], ("S3".to_string(), 80.0));
    }
}
