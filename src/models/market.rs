//! Market-wide and derivatives snapshots used as optional prompt context.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Total crypto market capitalisation and dominance (CoinGecko `/global`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalMarket {
    pub total_market_cap_usd: f64,
    pub total_volume_usd: f64,
    pub market_cap_change_24h_pct: f64,
    pub btc_dominance_pct: f64,
    pub eth_dominance_pct: f64,
    pub active_cryptocurrencies: u64,
}

/// Perpetual contract funding state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundingSnapshot {
    pub mark_price: f64,
    /// Last funding rate, in percent
    pub funding_rate_pct: f64,
    pub next_funding_time: Option<DateTime<Utc>>,
}

/// One order-book level with its notional value in quote currency
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookLevel {
    pub price: f64,
    pub quantity: f64,
    pub notional: f64,
}

impl BookLevel {
    fn new(price: f64, quantity: f64) -> Self {
        Self {
            price,
            quantity,
            notional: price * quantity,
        }
    }
}

/// Condensed view of a depth snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBookSummary {
    pub best_bid: f64,
    pub best_ask: f64,
    pub spread_pct: f64,
    /// Largest bid levels by notional, biggest first
    pub bid_walls: Vec<BookLevel>,
    pub ask_walls: Vec<BookLevel>,
    pub bid_notional: f64,
    pub ask_notional: f64,
}

impl OrderBookSummary {
    /// Summarize `(price, quantity)` levels, best price first on both sides.
    /// `None` when either side is empty.
    pub fn from_depth(bids: &[(f64, f64)], asks: &[(f64, f64)], walls: usize) -> Option<Self> {
        let (best_bid, _) = *bids.first()?;
        let (best_ask, _) = *asks.first()?;
        if best_ask <= 0.0 {
            return None;
        }

        let largest = |levels: &[(f64, f64)]| {
            let mut levels: Vec<BookLevel> = levels.iter().map(|&(p, q)| BookLevel::new(p, q)).collect();
            levels.sort_by(|a, b| b.notional.total_cmp(&a.notional));
            levels.truncate(walls);
            levels
        };
        let notional = |levels: &[(f64, f64)]| levels.iter().map(|(p, q)| p * q).sum::<f64>();

        Some(Self {
            best_bid,
            best_ask,
            spread_pct: (best_ask - best_bid) / best_ask * 100.0,
            bid_walls: largest(bids),
            ask_walls: largest(asks),
            bid_notional: notional(bids),
            ask_notional: notional(asks),
        })
    }

    /// Share of visible notional on the bid side, 0..=1
    pub fn bid_share(&self) -> Option<f64> {
        let total = self.bid_notional + self.ask_notional;
        (total > 0.0).then(|| self.bid_notional / total)
    }
}

/// Futures positioning for one symbol. Each part is optional; parts that
/// could not be fetched are listed in `unavailable` with the reason.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DerivativesSnapshot {
    pub funding: Option<FundingSnapshot>,
    pub open_interest: Option<f64>,
    pub long_short_ratio: Option<f64>,
    pub order_book: Option<OrderBookSummary>,
    pub unavailable: BTreeMap<String, String>,
}

impl DerivativesSnapshot {
    pub const PARTS: [&'static str; 4] = ["funding", "open_interest", "long_short_ratio", "order_book"];

    /// Every part missing for the same reason
    pub fn unavailable(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self {
            unavailable: Self::PARTS
                .iter()
                .map(|part| (part.to_string(), reason.clone()))
                .collect(),
            ..Default::default()
        }
    }

    pub fn reason(&self, part: &str) -> Option<&str> {
        self.unavailable.get(part).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.funding.is_none()
            && self.open_interest.is_none()
            && self.long_short_ratio.is_none()
            && self.order_book.is_none()
    }
}
