/// Average Directional Index (ADX) - Measures trend strength
///
/// ADX ranges from 0 to 100:
/// - ADX > 25: Strong trend (bull or bear)
/// - ADX 20-25: Moderate trend
/// - ADX < 20: Weak trend / choppy / ranging market
///
/// +DI > -DI points up, -DI > +DI points down.
use super::atr::{true_ranges, wilder_series};
use crate::models::Candle;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdxReading {
    pub adx: f64,
    pub plus_di: f64,
    pub minus_di: f64,
}

impl AdxReading {
    pub fn strength(&self) -> &'static str {
        if self.adx >= 25.0 {
            "strong trend"
        } else if self.adx >= 20.0 {
            "moderate trend"
        } else {
            "weak trend / ranging"
        }
    }
}

/// Candles needed for a smoothed ADX value
pub fn adx_min_candles(period: usize) -> usize {
    period * 2
}

/// Wilder ADX with +DI / -DI, None with fewer than `2 * period` candles
pub fn calculate_adx(candles: &[Candle], period: usize) -> Option<AdxReading> {
    if period == 0 || candles.len() < adx_min_candles(period) {
        return None;
    }

    let (plus_dm, minus_dm): (Vec<f64>, Vec<f64>) = candles
        .windows(2)
        .map(|w| {
            let up_move = w[1].high - w[0].high;
            let down_move = w[0].low - w[1].low;
            let plus = if up_move > down_move && up_move > 0.0 { up_move } else { 0.0 };
            let minus = if down_move > up_move && down_move > 0.0 { down_move } else { 0.0 };
            (plus, minus)
        })
        .unzip();

    let tr = wilder_series(&true_ranges(candles), period);
    let plus = wilder_series(&plus_dm, period);
    let minus = wilder_series(&minus_dm, period);

    let mut last_di = (0.0, 0.0);
    let dx: Vec<f64> = tr
        .iter()
        .zip(plus.iter().zip(minus.iter()))
        .map(|(tr, (p, m))| {
            let (plus_di, minus_di) = if *tr > 0.0 {
                (p / tr * 100.0, m / tr * 100.0)
            } else {
                (0.0, 0.0)
            };
            last_di = (plus_di, minus_di);
            let sum = plus_di + minus_di;
            if sum > 0.0 {
                (plus_di - minus_di).abs() / sum * 100.0
            } else {
                0.0
            }
        })
        .collect();

    let adx = wilder_series(&dx, period).last().copied()?;

    Some(AdxReading {
        adx,
        plus_di: last_di.0,
        minus_di: last_di.1,
    })
}
