/// Relative Strength Index with Wilder smoothing
///
/// RSI measures the magnitude of recent price changes to evaluate
/// overbought or oversold conditions.
///
/// Values:
/// - RSI > 70: Overbought
/// - RSI < 30: Oversold
///
/// Needs at least `period + 1` closes. A series with no losses reads 100.
pub fn calculate_rsi(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() < period + 1 {
        return None;
    }

    let changes: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();

    // Seed with simple averages over the first window
    let mut avg_gain = changes[..period].iter().filter(|c| **c > 0.0).sum::<f64>() / period as f64;
    let mut avg_loss = changes[..period]
        .iter()
        .filter(|c| **c < 0.0)
        .map(|c| c.abs())
        .sum::<f64>()
        / period as f64;

    let p = period as f64;
    for change in &changes[period..] {
        let gain = change.max(0.0);
        let loss = (-change).max(0.0);
        avg_gain = (avg_gain * (p - 1.0) + gain) / p;
        avg_loss = (avg_loss * (p - 1.0) + loss) / p;
    }

    if avg_loss == 0.0 {
        return Some(if avg_gain == 0.0 { 50.0 } else { 100.0 });
    }

    let rs = avg_gain / avg_loss;
    Some(100.0 - (100.0 / (1.0 + rs)))
}

/// Qualitative label used in prompts
pub fn rsi_zone(rsi: f64) -> &'static str {
    if rsi >= 70.0 {
        "overbought"
    } else if rsi <= 30.0 {
        "oversold"
    } else {
        "neutral"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rsi_calculation() {
        let closes = vec![
            44.0, 44.25, 44.5, 43.75, 44.0, 44.5, 45.0, 45.5, 45.25, 45.5, 46.0, 46.5, 46.25,
            46.0, 46.5, 46.75, 46.25,
        ];

        let rsi = calculate_rsi(&closes, 14).unwrap();
        assert!(rsi > 50.0 && rsi < 100.0, "mostly rising series, got {}", rsi);
    }

    #[test]
    fn test_rsi_insufficient_data() {
        let closes = vec![100.0, 102.0, 101.0];
        assert!(calculate_rsi(&closes, 14).is_none());
    }

    #[test]
    fn test_rsi_extremes() {
        let rising = vec![100.0, 101.0, 102.0, 103.0, 104.0, 105.0];
        assert_eq!(calculate_rsi(&rising, 5), Some(100.0));

        let flat = vec![100.0; 6];
        assert_eq!(calculate_rsi(&flat, 5), Some(50.0));

        let falling: Vec<f64> = rising.iter().rev().copied().collect();
        assert_eq!(calculate_rsi(&falling, 5), Some(0.0));
    }

    #[test]
    fn test_rsi_zone() {
        assert_eq!(rsi_zone(75.0), "overbought");
        assert_eq!(rsi_zone(25.0), "oversold");
        assert_eq!(rsi_zone(50.0), "neutral");
    }
}
