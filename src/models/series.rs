use super::{Candle, Timeframe};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A hole in a candle series wider than the timeframe's nominal interval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandleGap {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    /// Candles that would have fit between `from` and `to`
    pub missing: i64,
}

/// Time-ordered candles for one (symbol, timeframe) pair
///
/// Construction sorts the input, drops duplicate timestamps (the later row
/// wins) and records every gap. Gaps are flagged, never interpolated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandleSeries {
    timeframe: Timeframe,
    candles: Vec<Candle>,
    gaps: Vec<CandleGap>,
    dropped: usize,
}

impl CandleSeries {
    pub fn new(timeframe: Timeframe, mut candles: Vec<Candle>) -> Self {
        let original_len = candles.len();

        // Stable sort keeps arrival order among equal timestamps
        candles.sort_by_key(|c| c.timestamp);

        let mut deduped: Vec<Candle> = Vec::with_capacity(candles.len());
        for candle in candles {
            match deduped.last_mut() {
                Some(last) if last.timestamp == candle.timestamp => *last = candle,
                _ => deduped.push(candle),
            }
        }

        let dropped = original_len - deduped.len();
        if dropped > 0 {
            tracing::warn!(
                timeframe = %timeframe,
                dropped,
                "Dropped duplicate candles while normalizing series"
            );
        }

        let gaps = find_gaps(&deduped, timeframe.interval_secs());

        Self {
            timeframe,
            candles: deduped,
            gaps,
            dropped,
        }
    }

    pub fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn last(&self) -> Option<&Candle> {
        self.candles.last()
    }

    pub fn gaps(&self) -> &[CandleGap] {
        &self.gaps
    }

    /// Number of duplicate rows removed during construction
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn closes(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.close).collect()
    }
}

fn find_gaps(candles: &[Candle], interval_secs: i64) -> Vec<CandleGap> {
    candles
        .windows(2)
        .filter_map(|w| {
            let diff = (w[1].timestamp - w[0].timestamp).num_seconds();
            if diff > interval_secs {
                Some(CandleGap {
                    from: w[0].timestamp,
                    to: w[1].timestamp,
                    missing: diff / interval_secs - 1,
                })
            } else {
                None
            }
        })
        .collect()
}
