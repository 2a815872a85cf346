use super::PromptModule;
use crate::llm::LlmInvoker;
use crate::models::{Section, Timeframe};
use crate::prompt::{PromptBuilder, PromptTemplate, SectionSpec};
use serde_json::json;
use std::sync::Arc;

pub const NAME: &str = "spot_trading_analysis";

const DESCRIPTION: &str = "Spot trade plan with entry zones, targets and stop-loss levels";

const TIMEFRAMES: [Timeframe; 3] = [Timeframe::OneHour, Timeframe::FourHours, Timeframe::OneDay];

pub fn template() -> PromptTemplate {
    PromptTemplate {
        title: "Spot Trading Plan".to_string(),
        role: "You are an experienced spot trader. You build concrete, risk-aware buy and sell \
               plans without leverage."
            .to_string(),
        sections: vec![
            SectionSpec::new(
                Section::Overview,
                &["Market position: trend, momentum and where the price sits in its range"],
            ),
            SectionSpec::new(
                Section::KeyLevels,
                &["Supports S1 to S3 and resistances R1 to R2 with why each level matters"],
            ),
            SectionSpec::new(
                Section::Strategy,
                &[
                    "Entry zone or zones",
                    "Targets T1 to T3",
                    "Stop-loss level and what invalidates the plan",
                    "Final recommendation: buy, wait or avoid",
                ],
            ),
            SectionSpec::new(
                Section::RiskManagement,
                &[
                    "Risk/reward ratio for each target",
                    "Suggested position size as a share of the portfolio",
                ],
            ),
            SectionSpec::new(
                Section::IndicatorAnalysis,
                &["Which indicator signals support or contradict the plan"],
            ),
            SectionSpec::new(
                Section::Outlook,
                &["Alternative scenarios and what would change the plan"],
            ),
        ],
        notes: vec![
            "Spot only: never suggest leverage or short selling.".to_string(),
            "Keep the risk per trade at or below 2% of the portfolio.".to_string(),
        ],
    }
}

pub fn module(builder: PromptBuilder, invoker: Arc<LlmInvoker>) -> PromptModule {
    PromptModule::new(NAME, DESCRIPTION, &TIMEFRAMES, template(), builder, invoker)
        .with_parameters(json!({ "max_risk_per_trade_pct": 2.0, "targets": 3 }))
}
