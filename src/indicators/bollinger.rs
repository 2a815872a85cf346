use super::moving_average::calculate_sma;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bands {
    pub lower: f64,
    pub middle: f64,
    pub upper: f64,
}

impl Bands {
    /// Where `price` sits inside the bands: 0 at the lower band, 1 at the upper
    pub fn percent_b(&self, price: f64) -> Option<f64> {
        let width = self.upper - self.lower;
        if width > 0.0 {
            Some((price - self.lower) / width)
        } else {
            None
        }
    }
}

/// Bollinger Bands: SMA(period) +/- `std_devs` population standard deviations
pub fn calculate_bollinger(closes: &[f64], period: usize, std_devs: f64) -> Option<Bands> {
    let middle = calculate_sma(closes, period)?;
    let window = &closes[closes.len() - period..];

    let variance = window.iter().map(|c| (c - middle).powi(2)).sum::<f64>() / period as f64;
    let spread = variance.sqrt() * std_devs;

    Some(Bands {
        lower: middle - spread,
        middle,
        upper: middle + spread,
    })
}
