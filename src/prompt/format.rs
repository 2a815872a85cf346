/// Render a number for a prompt
///
/// Tiny magnitudes keep their significant digits: below 0.0001 switches to
/// scientific notation, below 0.01 uses six decimals. Absent or non-finite
/// values print `N/A`.
pub fn format_value(value: Option<f64>, precision: usize) -> String {
    match value {
        Some(v) if v.is_finite() => {
            let magnitude = v.abs();
            if v != 0.0 && magnitude < 0.0001 {
                format!("{:.2e}", v)
            } else if v != 0.0 && magnitude < 0.01 {
                format!("{:.6}", v)
            } else {
                format!("{:.*}", precision, v)
            }
        }
        _ => "N/A".to_string(),
    }
}

/// Signed percentage, e.g. `+2.30%`
pub fn format_pct(value: Option<f64>) -> String {
    match value {
        Some(v) if v.is_finite() => format!("{:+.2}%", v),
        _ => "N/A".to_string(),
    }
}

/// Precision that keeps a price readable: cents for large prices, more
/// decimals for sub-dollar assets
pub fn price_precision(price: f64) -> usize {
    let p = price.abs();
    if p >= 100.0 {
        2
    } else if p >= 1.0 {
        4
    } else {
        6
    }
}
