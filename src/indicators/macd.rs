use super::moving_average::ema_series;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MacdReading {
    pub macd: f64,
    pub signal: f64,
    pub histogram: f64,
}

impl MacdReading {
    pub fn bias(&self) -> &'static str {
        if self.macd > self.signal {
            "bullish (MACD above signal)"
        } else if self.macd < self.signal {
            "bearish (MACD below signal)"
        } else {
            "neutral"
        }
    }
}

/// Closes needed before the signal line has its first value
pub fn macd_min_candles(slow: usize, signal: usize) -> usize {
    slow + signal.saturating_sub(1)
}

/// MACD line (fast EMA - slow EMA), its signal EMA and the histogram
pub fn calculate_macd(closes: &[f64], fast: usize, slow: usize, signal: usize) -> Option<MacdReading> {
    if fast == 0 || fast >= slow || signal == 0 || closes.len() < macd_min_candles(slow, signal) {
        return None;
    }

    let fast_ema = ema_series(closes, fast);
    let slow_ema = ema_series(closes, slow);

    // Align the fast series on the slow one: both end at the last close
    let offset = fast_ema.len() - slow_ema.len();
    let macd_line: Vec<f64> = slow_ema
        .iter()
        .zip(&fast_ema[offset..])
        .map(|(s, f)| f - s)
        .collect();

    let signal_line = ema_series(&macd_line, signal);
    let macd = *macd_line.last()?;
    let signal = *signal_line.last()?;

    Some(MacdReading {
        macd,
        signal,
        histogram: macd - signal,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_macd_positive_in_uptrend() {
        let closes: Vec<f64> = (0..100).map(|i| 100.0 + i as f64).collect();
        let reading = calculate_macd(&closes, 21, 50, 9).unwrap();

        assert!(reading.macd > 0.0);
        assert!((reading.histogram - (reading.macd - reading.signal)).abs() < 1e-12);
    }

    #[test]
    fn test_macd_flat_series_is_zero() {
        let closes = vec![50.0; 80];
        let reading = calculate_macd(&closes, 21, 50, 9).unwrap();
        assert_eq!(reading.macd, 0.0);
        assert_eq!(reading.signal, 0.0);
        assert_eq!(reading.bias(), "neutral");
    }

    #[test]
    fn test_macd_requires_slow_plus_signal() {
        let closes: Vec<f64> = (0..57).map(|i| i as f64).collect();
        assert!(calculate_macd(&closes, 21, 50, 9).is_none());

        let closes: Vec<f64> = (0..58).map(|i| i as f64).collect();
        assert!(calculate_macd(&closes, 21, 50, 9).is_some());
    }
}
