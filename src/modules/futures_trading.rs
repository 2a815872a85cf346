use super::PromptModule;
use crate::llm::LlmInvoker;
use crate::models::{Section, Timeframe};
use crate::prompt::{PromptBuilder, PromptTemplate, SectionSpec};
use serde_json::json;
use std::sync::Arc;

pub const NAME: &str = "futures_trading_analysis";

const DESCRIPTION: &str = "Leveraged futures plan with direction, leverage and liquidation risk";

const TIMEFRAMES: [Timeframe; 3] = [
    Timeframe::FifteenMinutes,
    Timeframe::OneHour,
    Timeframe::FourHours,
];

pub const MAX_LEVERAGE: u32 = 20;

pub fn template() -> PromptTemplate {
    PromptTemplate {
        title: "Futures Trading Plan".to_string(),
        role: "You are an experienced crypto futures analyst specialising in leveraged trades. \
               You favour precise entries, conservative leverage and tight risk control."
            .to_string(),
        sections: vec![
            SectionSpec::new(
                Section::Overview,
                &[
                    "Main trend and its strength, naming the timeframe it is based on",
                    "Short term expectation for the next hours and days",
                ],
            ),
            SectionSpec::new(
                Section::KeyLevels,
                &[
                    "Supports S1 to S3 and resistances R1 to R3",
                    "Which levels are likely stop-hunt or liquidation zones",
                ],
            ),
            SectionSpec::new(
                Section::Strategy,
                &[
                    "Direction: LONG or SHORT, with the signals behind it",
                    "Entry zone, take-profit levels and stop-loss",
                    "Suggested leverage range and the single leverage you would pick",
                ],
            ),
            SectionSpec::new(
                Section::RiskManagement,
                &[
                    "Maximum capital at risk per trade",
                    "Approximate liquidation price at the chosen leverage",
                    "Conditions under which to close the position early",
                ],
            ),
            SectionSpec::new(
                Section::Outlook,
                &["Alternative scenario if the trade idea fails"],
            ),
        ],
        notes: vec![
            format!("Never suggest leverage above {}x.", MAX_LEVERAGE),
            "Use the derivatives data for positioning: a high positive funding rate means crowded longs, a negative one crowded shorts."
                .to_string(),
            "Derivatives values shown as N/A are unknown; do not assume values for them."
                .to_string(),
        ],
    }
}

pub fn module(builder: PromptBuilder, invoker: Arc<LlmInvoker>) -> PromptModule {
    PromptModule::new(NAME, DESCRIPTION, &TIMEFRAMES, template(), builder, invoker)
        .with_parameters(json!({ "max_leverage": MAX_LEVERAGE }))
        .with_derivatives()
}
