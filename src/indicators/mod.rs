// Technical indicators module
// RSI, MACD, moving averages, ATR, ADX, Bollinger, Fibonacci, VWAP, volatility,
// volume and structure

pub mod adx;
pub mod atr;
pub mod bollinger;
pub mod engine;
pub mod fibonacci;
pub mod macd;
pub mod market_analysis;
pub mod moving_average;
pub mod rsi;
pub mod volatility;

pub use adx::{calculate_adx, AdxReading};
pub use atr::calculate_atr;
pub use bollinger::{calculate_bollinger, Bands};
pub use engine::{
    AbsentReason, IndicatorConfig, IndicatorEngine, IndicatorKind, IndicatorSet, IndicatorValue,
};
pub use fibonacci::{calculate_fibonacci_levels, calculate_fibonacci_pivots, FibonacciOutcome};
pub use macd::{calculate_macd, MacdReading};
pub use market_analysis::{
    analyze_market_structure, calculate_volume_ratio, calculate_volume_trend,
    compare_volume_across_timeframes, detect_volume_anomaly, AnomalyKind, MarketStructure,
    TimeframeVolume, VolumeAnomaly, VolumeComparison, VolumeDirection, VolumeDivergence,
};
pub use moving_average::{calculate_ema, calculate_sma, ema_series};
pub use rsi::{calculate_rsi, rsi_zone};
pub use volatility::{calculate_volatility, calculate_vwap, VolatilityReading};
