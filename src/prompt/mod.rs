//! Prompt rendering and report parsing.
//!
//! [`PromptBuilder::build`] is a pure function of the template and the
//! dataset: maps are iterated in key order and every number goes through
//! [`format::format_value`], so identical input gives byte-identical text.

pub mod format;
pub mod parser;

pub use parser::{parse_report, ParsedReport};

use crate::indicators::{
    compare_volume_across_timeframes, rsi_zone, AbsentReason, IndicatorConfig, IndicatorKind, IndicatorSet,
    IndicatorValue,
};
use crate::models::{Candle, DerivativesSnapshot, Section, Timeframe};
use crate::registry::{AnalysisDataset, TimeframeData};
use format::{format_pct, format_value, price_precision};
use std::collections::BTreeMap;
use std::fmt::Write;

pub const SUMMARY_START_MARKER: &str = "---SUMMARY START---";
pub const SUMMARY_END_MARKER: &str = "---SUMMARY END---";

/// Guidance for one report section
#[derive(Debug, Clone)]
pub struct SectionSpec {
    pub section: Section,
    pub guidance: Vec<String>,
}

impl SectionSpec {
    pub fn new(section: Section, guidance: &[&str]) -> Self {
        Self {
            section,
            guidance: guidance.iter().map(|g| g.to_string()).collect(),
        }
    }
}

/// Static part of a strategy's prompt
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    pub title: String,
    pub role: String,
    pub sections: Vec<SectionSpec>,
    pub notes: Vec<String>,
}

impl PromptTemplate {
    pub fn required_sections(&self) -> Vec<Section> {
        self.sections.iter().map(|s| s.section).collect()
    }
}

#[derive(Debug, Clone, Default)]
pub struct PromptBuilder {
    indicators: IndicatorConfig,
}

impl PromptBuilder {
    pub fn new(indicators: IndicatorConfig) -> Self {
        Self { indicators }
    }

    pub fn indicator_config(&self) -> &IndicatorConfig {
        &self.indicators
    }

    pub fn build(&self, template: &PromptTemplate, dataset: &AnalysisDataset) -> String {
        let mut out = String::new();
        let symbol = &dataset.symbol;

        let _ = writeln!(out, "# ROLE");
        let _ = writeln!(out, "{}", template.role);
        let _ = writeln!(
            out,
            "Prepare a {} for {}. This is educational analysis, not financial advice.\n",
            template.title, symbol
        );

        let _ = writeln!(out, "# DATA (as of {})", dataset.as_of.format("%Y-%m-%d %H:%M UTC"));
        self.write_price(&mut out, dataset);
        self.write_timeframes(&mut out, dataset);
        self.write_volume_comparison(&mut out, dataset);
        if let Some(derivatives) = &dataset.derivatives {
            write_derivatives(&mut out, derivatives, dataset.price);
        }
        write_news(&mut out, dataset);
        write_sentiment(&mut out, dataset);

        let _ = writeln!(out, "## Reference asset context");
        let _ = writeln!(out, "{}", dataset.context.render());

        write_memory(&mut out, dataset);
        write_instructions(&mut out, template, symbol);
        out
    }

    fn write_price(&self, out: &mut String, dataset: &AnalysisDataset) {
        let precision = price_precision(dataset.price);
        let _ = writeln!(out, "## Price");
        let _ = writeln!(
            out,
            "Current price: {} USDT",
            format_value(Some(dataset.price), precision)
        );
        match &dataset.ticker {
            Some(ticker) => {
                let _ = writeln!(
                    out,
                    "24h change: {} | 24h volume: {}",
                    format_pct(Some(ticker.change_24h_pct)),
                    format_value(Some(ticker.volume_24h), 2)
                );
            }
            None => {
                let _ = writeln!(
                    out,
                    "Live ticker unavailable; the price above is the latest candle close."
                );
            }
        }
        out.push('\n');
    }

    fn write_timeframes(&self, out: &mut String, dataset: &AnalysisDataset) {
        let _ = writeln!(out, "## Technical indicators");

        // Present and absent timeframes interleaved in timeframe order
        let mut all: Vec<_> = dataset
            .timeframes
            .keys()
            .chain(dataset.missing_timeframes.keys())
            .copied()
            .collect();
        all.sort();
        all.dedup();

        for tf in all {
            match dataset.timeframes.get(&tf) {
                Some(data) => self.write_timeframe(out, tf.as_str(), data, dataset.price),
                None => {
                    let reason = dataset
                        .missing_timeframes
                        .get(&tf)
                        .map(String::as_str)
                        .unwrap_or("unknown");
                    let _ = writeln!(out, "### {}", tf);
                    let _ = writeln!(
                        out,
                        "ABSENT: data for this timeframe could not be fetched ({}). Do not infer values for it.",
                        reason
                    );
                }
            }
        }
        out.push('\n');
    }

    fn write_timeframe(&self, out: &mut String, tf: &str, data: &TimeframeData, price: f64) {
        let precision = price_precision(price);
        let last_close = data.series.last().map(|c| c.timestamp.format("%Y-%m-%d %H:%M UTC").to_string());
        let _ = writeln!(
            out,
            "### {} ({} candles, last candle {})",
            tf,
            data.series.len(),
            last_close.as_deref().unwrap_or("N/A")
        );

        for (kind, value) in &data.indicators.values {
            let label = kind.label(&self.indicators);
            let _ = writeln!(out, "- {}: {}", label, describe(*kind, value, price, precision));
        }

        write_absent(out, &data.indicators, &self.indicators);

        let gaps = data.series.gaps();
        if !gaps.is_empty() {
            let missing: i64 = gaps.iter().map(|g| g.missing).sum();
            let _ = writeln!(
                out,
                "- Data gaps: {} gap(s), {} candle(s) missing in total (not interpolated)",
                gaps.len(),
                missing
            );
        }
    }

    fn write_volume_comparison(&self, out: &mut String, dataset: &AnalysisDataset) {
        let _ = writeln!(out, "## Volume across timeframes");

        let series: BTreeMap<Timeframe, &[Candle]> = dataset
            .timeframes
            .iter()
            .map(|(tf, data)| (*tf, data.series.candles()))
            .collect();
        let comparison = compare_volume_across_timeframes(
            &series,
            self.indicators.volume_ma_period,
            self.indicators.volume_trend_period,
        );

        if comparison.timeframes.len() < 2 {
            let _ = writeln!(
                out,
                "Cross-timeframe volume comparison: unavailable (fewer than two timeframes with enough candles)\n"
            );
            return;
        }

        let longest = comparison.timeframes.keys().next_back().copied();
        for (tf, volume) in &comparison.timeframes {
            let rate = match (volume.rate_vs_longest, longest) {
                (Some(ratio), Some(base)) if Some(*tf) != longest => {
                    format!(", hourly volume {}x the {} rate", format_value(Some(ratio), 2), base)
                }
                _ => String::new(),
            };
            let _ = writeln!(
                out,
                "- {}: current volume {}% of MA({}), trend {} ({}){}",
                tf,
                format_value(Some(volume.current_vs_ma_pct), 0),
                self.indicators.volume_ma_period,
                volume.trend.as_str(),
                format_pct(Some(volume.trend_change_pct)),
                rate
            );
        }
        for tf in &comparison.insufficient {
            let _ = writeln!(out, "- {}: not enough candles for comparison", tf);
        }
        match &comparison.divergence {
            Some(d) => {
                let _ = writeln!(
                    out,
                    "Divergence: {} volume is {} while {} volume is {}.",
                    d.short,
                    d.short_trend.as_str(),
                    d.long,
                    d.long_trend.as_str()
                );
            }
            None => {
                let _ = writeln!(out, "No divergence between the shortest and longest timeframe volume trends.");
            }
        }
        out.push('\n');
    }
}

fn write_derivatives(out: &mut String, snapshot: &DerivativesSnapshot, price: f64) {
    let precision = price_precision(price);
    let na = |part: &str| match snapshot.reason(part) {
        Some(reason) => format!("N/A ({})", reason),
        None => "N/A".to_string(),
    };

    let _ = writeln!(out, "## Derivatives (perpetual futures)");

    let funding = match &snapshot.funding {
        Some(f) => {
            let next = f
                .next_funding_time
                .map(|t| format!(", next funding {}", t.format("%Y-%m-%d %H:%M UTC")))
                .unwrap_or_default();
            format!(
                "{:+.4}% (mark price {}{})",
                f.funding_rate_pct,
                format_value(Some(f.mark_price), precision),
                next
            )
        }
        None => na("funding"),
    };
    let _ = writeln!(out, "- Funding rate: {}", funding);

    let open_interest = match snapshot.open_interest {
        Some(oi) => format!(
            "{} contracts (~{} USDT)",
            format_value(Some(oi), 2),
            format_value(Some(oi * price), 0)
        ),
        None => na("open_interest"),
    };
    let _ = writeln!(out, "- Open interest: {}", open_interest);

    let ratio = match snapshot.long_short_ratio {
        Some(r) => format_value(Some(r), 2),
        None => na("long_short_ratio"),
    };
    let _ = writeln!(out, "- Top trader long/short ratio: {}", ratio);

    match &snapshot.order_book {
        Some(book) => {
            let walls = |levels: &[crate::models::BookLevel]| {
                levels
                    .iter()
                    .map(|l| {
                        format!(
                            "{} ({} USDT)",
                            format_value(Some(l.price), precision),
                            format_value(Some(l.notional), 0)
                        )
                    })
                    .collect::<Vec<_>>()
                    .join(", ")
            };
            let _ = writeln!(
                out,
                "- Order book: best bid {}, best ask {}, spread {}%, bid share {}%",
                format_value(Some(book.best_bid), precision),
                format_value(Some(book.best_ask), precision),
                format_value(Some(book.spread_pct), 4),
                format_value(book.bid_share().map(|s| s * 100.0), 1)
            );
            let _ = writeln!(out, "- Bid walls: {}", walls(&book.bid_walls));
            let _ = writeln!(out, "- Ask walls: {}", walls(&book.ask_walls));
        }
        None => {
            let _ = writeln!(out, "- Order book: {}", na("order_book"));
        }
    }
    out.push('\n');
}

fn describe(kind: IndicatorKind, value: &IndicatorValue, price: f64, precision: usize) -> String {
    match value {
        IndicatorValue::Value(v) => match kind {
            IndicatorKind::Rsi => format!("{} ({})", format_value(Some(*v), 2), rsi_zone(*v)),
            IndicatorKind::SmaShort | IndicatorKind::SmaLong | IndicatorKind::EmaShort | IndicatorKind::EmaLong => {
                let relation = if price > *v {
                    "price above"
                } else if price < *v {
                    "price below"
                } else {
                    "price at"
                };
                format!("{} ({})", format_value(Some(*v), precision), relation)
            }
            IndicatorKind::VolumeRatio => format!("{}x", format_value(Some(*v), 2)),
            IndicatorKind::Vwap => {
                let relation = if price >= *v { "price above" } else { "price below" };
                format!("{} ({})", format_value(Some(*v), precision), relation)
            }
            _ => format_value(Some(*v), precision),
        },
        IndicatorValue::Macd {
            macd,
            signal,
            histogram,
        } => {
            let bias = if macd > signal {
                "bullish, MACD above signal"
            } else if macd < signal {
                "bearish, MACD below signal"
            } else {
                "neutral"
            };
            format!(
                "MACD {}, signal {}, histogram {} ({})",
                format_value(Some(*macd), precision),
                format_value(Some(*signal), precision),
                format_value(Some(*histogram), precision),
                bias
            )
        }
        IndicatorValue::Bands { lower, middle, upper } => format!(
            "lower {}, middle {}, upper {}",
            format_value(Some(*lower), precision),
            format_value(Some(*middle), precision),
            format_value(Some(*upper), precision)
        ),
        IndicatorValue::Directional {
            adx,
            plus_di,
            minus_di,
        } => format!(
            "{} (+DI {}, -DI {})",
            format_value(Some(*adx), 2),
            format_value(Some(*plus_di), 2),
            format_value(Some(*minus_di), 2)
        ),
        IndicatorValue::Levels(levels) => levels
            .iter()
            .map(|(name, v)| format!("{} {}", name, format_value(Some(*v), precision)))
            .collect::<Vec<_>>()
            .join(", "),
        IndicatorValue::Trend {
            direction,
            change_pct,
        } => format!("{} ({})", direction, format_pct(Some(*change_pct))),
        IndicatorValue::Anomaly {
            kind: anomaly,
            z_score,
            deviation_pct,
            recent,
        } => format!(
            "{} (z-score {}, {} vs baseline, {} anomalous of the last 5 candles)",
            anomaly,
            format_value(Some(*z_score), 2),
            format_pct(Some(*deviation_pct)),
            recent
        ),
        IndicatorValue::Volatility {
            returns_std_pct,
            range_pct,
        } => format!(
            "return std dev {}%, high-low range {}%",
            format_value(Some(*returns_std_pct), 2),
            format_value(Some(*range_pct), 2)
        ),
        IndicatorValue::Label(label) => label.clone(),
    }
}

fn write_absent(out: &mut String, set: &IndicatorSet, config: &IndicatorConfig) {
    if set.absent.is_empty() {
        return;
    }

    let entries: Vec<String> = set
        .absent
        .iter()
        .map(|(kind, reason)| match reason {
            AbsentReason::InsufficientCandles { required, available } => format!(
                "{} (needs {} candles, have {})",
                kind.label(config),
                required,
                available
            ),
            AbsentReason::Degenerate(why) => format!("{} ({})", kind.label(config), why),
        })
        .collect();
    let _ = writeln!(out, "- Not available: {}", entries.join("; "));
}

fn write_news(out: &mut String, dataset: &AnalysisDataset) {
    let _ = writeln!(out, "## News");
    if dataset.news.is_empty() {
        let _ = writeln!(out, "No recent news available.\n");
        return;
    }

    for item in &dataset.news {
        let sentiment = item
            .sentiment
            .map(|s| format!(" [crowd sentiment: {}]", s.as_str()))
            .unwrap_or_default();
        let _ = writeln!(
            out,
            "- {} {} ({}){}",
            item.published_at.format("%Y-%m-%d %H:%M UTC"),
            item.title,
            item.source,
            sentiment
        );
    }
    out.push('\n');
}

fn write_sentiment(out: &mut String, dataset: &AnalysisDataset) {
    let _ = writeln!(out, "## Market sentiment");
    match &dataset.sentiment {
        Some(s) => {
            let _ = writeln!(
                out,
                "Fear & Greed Index: {} ({}), updated {}\n",
                s.value,
                s.classification,
                s.updated_at.format("%Y-%m-%d")
            );
        }
        None => {
            let _ = writeln!(out, "Fear & Greed Index: unavailable\n");
        }
    }

    let _ = writeln!(out, "## Global market");
    match &dataset.global_market {
        Some(m) => {
            let _ = writeln!(
                out,
                "Total market cap: {}B USD ({} 24h), 24h volume: {}B USD",
                format_value(Some(m.total_market_cap_usd / 1e9), 2),
                format_pct(Some(m.market_cap_change_24h_pct)),
                format_value(Some(m.total_volume_usd / 1e9), 2)
            );
            let _ = writeln!(
                out,
                "BTC dominance: {}%, ETH dominance: {}%, active coins: {}\n",
                format_value(Some(m.btc_dominance_pct), 2),
                format_value(Some(m.eth_dominance_pct), 2),
                m.active_cryptocurrencies
            );
        }
        None => {
            let _ = writeln!(out, "Global market data: unavailable\n");
        }
    }
}

fn write_memory(out: &mut String, dataset: &AnalysisDataset) {
    let _ = writeln!(out, "## Previous analyses");
    if dataset.memory.is_empty() {
        let _ = writeln!(out, "No previous analyses for {}.\n", dataset.symbol);
        return;
    }

    for record in &dataset.memory {
        let precision = price_precision(record.reference_price);
        let outcome = match &record.outcome {
            Some(o) => format!(
                " Outcome: price {} ({}) on {}.",
                format_value(Some(o.price), precision),
                format_pct(Some(o.change_pct)),
                o.observed_at.format("%Y-%m-%d %H:%M UTC")
            ),
            None => String::new(),
        };
        let _ = writeln!(
            out,
            "- {} [{}] at {} USDT: {}{}",
            record.timestamp.format("%Y-%m-%d %H:%M UTC"),
            record.module,
            format_value(Some(record.reference_price), precision),
            record.summary,
            outcome
        );
    }
    out.push('\n');
}

fn write_instructions(out: &mut String, template: &PromptTemplate, symbol: &str) {
    let _ = writeln!(out, "# REPORT");
    let _ = writeln!(
        out,
        "Write a markdown report titled \"# {} {}\" using exactly these level-2 headings, in this order:\n",
        symbol, template.title
    );

    for spec in &template.sections {
        let _ = writeln!(out, "## {}", spec.section.title());
        for line in &spec.guidance {
            let _ = writeln!(out, "- {}", line);
        }
        out.push('\n');
    }

    let _ = writeln!(out, "# RULES");
    for note in &template.notes {
        let _ = writeln!(out, "- {}", note);
    }
    let _ = writeln!(
        out,
        "- Treat timeframes marked ABSENT and indicators listed as not available as unknown."
    );
    let _ = writeln!(
        out,
        "- End the report with a 2-3 sentence summary of your view between the lines {} and {}.",
        SUMMARY_START_MARKER, SUMMARY_END_MARKER
    );
}
