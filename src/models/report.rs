use super::{CandleGap, Timeframe};
use crate::indicators::IndicatorSet;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Named part of an analysis report
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Section {
    Overview,
    IndicatorAnalysis,
    ReferenceAssetEffect,
    NewsAssessment,
    KeyLevels,
    Strategy,
    RiskManagement,
    Outlook,
}

impl Section {
    pub const ALL: [Section; 8] = [
        Section::Overview,
        Section::IndicatorAnalysis,
        Section::ReferenceAssetEffect,
        Section::NewsAssessment,
        Section::KeyLevels,
        Section::Strategy,
        Section::RiskManagement,
        Section::Outlook,
    ];

    /// Heading the prompt asks the LLM to use
    pub fn title(&self) -> &'static str {
        match self {
            Section::Overview => "Overview",
            Section::IndicatorAnalysis => "Indicator Analysis",
            Section::ReferenceAssetEffect => "Reference Asset Effect",
            Section::NewsAssessment => "News Assessment",
            Section::KeyLevels => "Key Levels",
            Section::Strategy => "Strategy",
            Section::RiskManagement => "Risk Management",
            Section::Outlook => "Outlook",
        }
    }

    /// Normalized phrases that identify this section in a heading.
    /// The title itself (lowercased) always comes first.
    pub fn aliases(&self) -> &'static [&'static str] {
        match self {
            Section::Overview => &[
                "overview",
                "general assessment",
                "market position",
                "summary of market",
                "market overview",
            ],
            Section::IndicatorAnalysis => &[
                "indicator analysis",
                "technical indicator analysis",
                "technical analysis",
                "indicator signals",
                "indicators",
            ],
            Section::ReferenceAssetEffect => &[
                "reference asset effect",
                "bitcoin effect",
                "btc effect",
                "bitcoin correlation",
                "market leader",
            ],
            Section::NewsAssessment => &[
                "news assessment",
                "fundamental",
                "news analysis",
                "news",
                "sentiment",
            ],
            Section::KeyLevels => &[
                "key levels",
                "key price levels",
                "critical price levels",
                "support and resistance",
                "support resistance",
            ],
            Section::Strategy => &[
                "strategy",
                "potential strategies",
                "entry and exit",
                "trading strategy",
                "trade setup",
                "recommendation",
                "position",
            ],
            Section::RiskManagement => &["risk management", "risk", "stop loss"],
            Section::Outlook => &[
                "outlook",
                "short and medium term outlook",
                "short term outlook",
                "scenarios",
                "forecast",
            ],
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

/// Per-request lifecycle, recorded in order on every result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestState {
    Pending,
    Fetching,
    PartialData,
    FullData,
    Computing,
    Prompting,
    LlmCalled,
    Structured,
    Unstructured,
    Done,
    Failed(String),
}

impl RequestState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestState::Done | RequestState::Failed(_))
    }
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestState::Pending => f.write_str("Pending"),
            RequestState::Fetching => f.write_str("Fetching"),
            RequestState::PartialData => f.write_str("PartialData"),
            RequestState::FullData => f.write_str("FullData"),
            RequestState::Computing => f.write_str("Computing"),
            RequestState::Prompting => f.write_str("Prompting"),
            RequestState::LlmCalled => f.write_str("LLMCalled"),
            RequestState::Structured => f.write_str("Structured"),
            RequestState::Unstructured => f.write_str("Unstructured"),
            RequestState::Done => f.write_str("Done"),
            RequestState::Failed(reason) => write!(f, "Failed({})", reason),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataCompleteness {
    /// Every requested timeframe and the ticker arrived
    Full,
    /// At least one timeframe or the ticker is missing
    Partial,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportStatus {
    Structured,
    /// Some required sections could not be located; the raw text is still kept
    Unstructured { missing: Vec<Section> },
}

/// Final output of one `analyze` call. Never mutated once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub symbol: String,
    pub module: String,
    pub timestamp: DateTime<Utc>,
    /// Current price the analysis was based on
    pub price: f64,
    pub sections: BTreeMap<Section, String>,
    pub raw_text: String,
    pub summary: Option<String>,
    pub status: ReportStatus,
    pub completeness: DataCompleteness,
    pub timeframes: Vec<Timeframe>,
    /// Indicators computed for every usable timeframe
    pub indicators: BTreeMap<Timeframe, IndicatorSet>,
    pub failed_timeframes: BTreeMap<Timeframe, String>,
    pub gaps: BTreeMap<Timeframe, Vec<CandleGap>>,
    pub states: Vec<RequestState>,
}

impl AnalysisResult {
    pub fn section(&self, section: Section) -> Option<&str> {
        self.sections.get(&section).map(String::as_str)
    }

    pub fn is_structured(&self) -> bool {
        matches!(self.status, ReportStatus::Structured)
    }

    pub fn final_state(&self) -> Option<&RequestState> {
        self.states.last()
    }

    /// Text stored in memory: the extracted summary, else the start of
    /// the overview, else the start of the raw response.
    pub fn memory_summary(&self, max_chars: usize) -> String {
        let source = self
            .summary
            .as_deref()
            .or_else(|| self.section(Section::Overview))
            .unwrap_or(&self.raw_text);
        truncate_chars(source.trim(), max_chars)
    }
}

pub(crate) fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push_str("...");
    out
}
