use super::PromptModule;
use crate::llm::LlmInvoker;
use crate::models::{Section, Timeframe};
use crate::prompt::{PromptBuilder, PromptTemplate, SectionSpec};
use std::sync::Arc;

pub const NAME: &str = "crypto_analysis";

const DESCRIPTION: &str =
    "General multi-timeframe market analysis combining indicators, news and reference asset trend";

/// General-purpose market read, the default strategy
pub fn template() -> PromptTemplate {
    PromptTemplate {
        title: "Crypto Market Analysis".to_string(),
        role: "You are an experienced cryptocurrency market analyst. You combine technical \
               indicators across timeframes with news flow and overall market sentiment, and \
               you explain your reasoning clearly for both new and experienced traders."
            .to_string(),
        sections: vec![
            SectionSpec::new(
                Section::Overview,
                &[
                    "Current trend direction and its strength on each timeframe",
                    "Where the price sits relative to its recent range",
                ],
            ),
            SectionSpec::new(
                Section::IndicatorAnalysis,
                &[
                    "RSI: momentum, overbought or oversold readings and divergences",
                    "MACD: crossovers and histogram direction",
                    "Moving averages: price position and golden or death crosses",
                    "Bollinger Bands and ATR: volatility and band position",
                    "Volume: whether volume confirms the move",
                    "Compare the timeframes and call out any conflicting signals",
                ],
            ),
            SectionSpec::new(
                Section::ReferenceAssetEffect,
                &["How the reference asset trend is likely to affect this asset"],
            ),
            SectionSpec::new(
                Section::NewsAssessment,
                &["Impact of the listed news and of overall market sentiment"],
            ),
            SectionSpec::new(
                Section::KeyLevels,
                &["Nearest supports and resistances with the indicator or level backing each"],
            ),
            SectionSpec::new(
                Section::Strategy,
                &["Possible long and short setups with entry zone, target and invalidation"],
            ),
            SectionSpec::new(
                Section::Outlook,
                &["Short and medium term scenarios with what would confirm or cancel each"],
            ),
        ],
        notes: vec![
            "Base every claim on the data provided; do not invent prices or events.".to_string(),
            "Use the same price precision as the data.".to_string(),
        ],
    }
}

pub fn module(builder: PromptBuilder, invoker: Arc<LlmInvoker>) -> PromptModule {
    PromptModule::new(NAME, DESCRIPTION, &Timeframe::ALL, template(), builder, invoker)
}
