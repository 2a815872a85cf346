// Built-in analysis strategies
pub mod crypto_analysis;
pub mod futures_trading;
pub mod spot_trading;

use crate::error::AnalysisError;
use crate::llm::LlmInvoker;
use crate::models::{Section, Timeframe};
use crate::prompt::{PromptBuilder, PromptTemplate};
use crate::registry::{AnalysisDataset, AnalysisModule, ModuleRegistry};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

/// Strategy driven entirely by a prompt template
///
/// All three built-in strategies are instances of this type; they differ in
/// timeframes, report sections and prompt wording.
pub struct PromptModule {
    name: &'static str,
    description: &'static str,
    timeframes: Vec<Timeframe>,
    sections: Vec<Section>,
    template: PromptTemplate,
    extra: serde_json::Value,
    derivatives: bool,
    builder: PromptBuilder,
    invoker: Arc<LlmInvoker>,
}

impl PromptModule {
    pub fn new(
        name: &'static str,
        description: &'static str,
        timeframes: &[Timeframe],
        template: PromptTemplate,
        builder: PromptBuilder,
        invoker: Arc<LlmInvoker>,
    ) -> Self {
        Self {
            name,
            description,
            timeframes: timeframes.to_vec(),
            sections: template.required_sections(),
            template,
            extra: json!({}),
            derivatives: false,
            builder,
            invoker,
        }
    }

    /// Strategy-specific entries merged into `parameters()`
    pub fn with_parameters(mut self, extra: serde_json::Value) -> Self {
        self.extra = extra;
        self
    }

    /// Ask for funding, open interest and order book data
    pub fn with_derivatives(mut self) -> Self {
        self.derivatives = true;
        self
    }

    /// The exact prompt `perform_analysis` would send
    pub fn render_prompt(&self, dataset: &AnalysisDataset) -> String {
        self.builder.build(&self.template, dataset)
    }
}

#[async_trait]
impl AnalysisModule for PromptModule {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        self.description
    }

    fn timeframes(&self) -> &[Timeframe] {
        &self.timeframes
    }

    fn required_sections(&self) -> &[Section] {
        &self.sections
    }

    fn parameters(&self) -> serde_json::Value {
        let mut params = json!({
            "timeframes": self.timeframes.iter().map(|tf| tf.as_str()).collect::<Vec<_>>(),
            "required_sections": self.sections.iter().map(|s| s.title()).collect::<Vec<_>>(),
            "indicators": self.builder.indicator_config(),
        });

        if let (Some(target), Some(extra)) = (params.as_object_mut(), self.extra.as_object()) {
            for (key, value) in extra {
                target.insert(key.clone(), value.clone());
            }
        }
        params
    }

    fn wants_derivatives(&self) -> bool {
        self.derivatives
    }

    async fn perform_analysis(&self, dataset: &AnalysisDataset) -> Result<String, AnalysisError> {
        let prompt = self.render_prompt(dataset);
        tracing::debug!(
            module = self.name,
            symbol = %dataset.symbol,
            prompt_chars = prompt.len(),
            "Prompt built"
        );
        self.invoker.invoke(&prompt).await
    }
}

/// Register the three built-in strategies
pub fn register_defaults(
    registry: &mut ModuleRegistry,
    builder: PromptBuilder,
    invoker: Arc<LlmInvoker>,
) -> Result<(), AnalysisError> {
    registry.register(Arc::new(crypto_analysis::module(builder.clone(), invoker.clone())))?;
    registry.register(Arc::new(spot_trading::module(builder.clone(), invoker.clone())))?;
    registry.register(Arc::new(futures_trading::module(builder, invoker)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ClientResult, LlmClient, RequestPool};
    use std::time::Duration;

    struct NoopLlm;

    #[async_trait]
    impl LlmClient for NoopLlm {
        async fn generate(&self, _prompt: &str) -> ClientResult<String> {
            Ok(String::new())
        }
    }

    fn registry() -> ModuleRegistry {
        let invoker = Arc::new(LlmInvoker::new(
            Arc::new(NoopLlm),
            RequestPool::new(1, 60),
            Duration::from_secs(1),
        ));
        let mut registry = ModuleRegistry::new();
        register_defaults(&mut registry, PromptBuilder::default(), invoker).unwrap();
        registry
    }

    #[test]
    fn test_defaults_registered_in_order() {
        assert_eq!(
            registry().names(),
            vec![
                "crypto_analysis".to_string(),
                "spot_trading_analysis".to_string(),
                "futures_trading_analysis".to_string(),
            ]
        );
    }

    #[test]
    fn test_defaults_cannot_be_registered_twice() {
        let mut registry = registry();
        let invoker = Arc::new(LlmInvoker::new(
            Arc::new(NoopLlm),
            RequestPool::new(1, 60),
            Duration::from_secs(1),
        ));
        let err = register_defaults(&mut registry, PromptBuilder::default(), invoker).unwrap_err();
        assert_eq!(err, AnalysisError::DuplicateModuleName("crypto_analysis".to_string()));
    }

    #[test]
    fn test_parameters_describe_strategy() {
        let registry = registry();
        let futures = registry.resolve("futures_trading_analysis").unwrap();
        let params = futures.parameters();

        assert_eq!(params["timeframes"], json!(["15m", "1h", "4h"]));
        assert_eq!(params["max_leverage"], json!(20));
        assert_eq!(params["indicators"]["rsi_period"], json!(14));
        assert!(params["required_sections"]
            .as_array()
            .unwrap()
            .contains(&json!("Risk Management")));
    }

    #[test]
    fn test_only_futures_wants_derivatives() {
        let registry = registry();
        let wanting: Vec<_> = registry
            .names()
            .into_iter()
            .filter(|name| registry.resolve(name).unwrap().wants_derivatives())
            .collect();
        assert_eq!(wanting, vec!["futures_trading_analysis".to_string()]);
    }

    #[test]
    fn test_crypto_analysis_sections() {
        let registry = registry();
        let module = registry.resolve("crypto_analysis").unwrap();
        assert_eq!(module.timeframes(), &Timeframe::ALL);
        assert_eq!(
            module.required_sections(),
            &[
                Section::Overview,
                Section::IndicatorAnalysis,
                Section::ReferenceAssetEffect,
                Section::NewsAssessment,
                Section::KeyLevels,
                Section::Strategy,
                Section::Outlook,
            ]
        );
    }
}
