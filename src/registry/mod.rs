//! Named, pluggable analysis strategies.
//!
//! The registry is built once at startup and is read-only afterwards, so
//! concurrent `resolve` calls need no locking.

pub mod dataset;

pub use dataset::{AnalysisDataset, TimeframeData};

use crate::error::AnalysisError;
use crate::models::{Section, Timeframe};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Capability every analysis strategy provides
#[async_trait]
pub trait AnalysisModule: Send + Sync {
    /// Unique registry key, e.g. `crypto_analysis`
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// Timeframes this strategy wants fetched
    fn timeframes(&self) -> &[Timeframe];

    /// Sections a well-formed report must contain
    fn required_sections(&self) -> &[Section];

    /// JSON description of the strategy's parameters
    fn parameters(&self) -> serde_json::Value;

    /// Whether the facade should fetch perpetual futures data
    fn wants_derivatives(&self) -> bool {
        false
    }

    /// Build the prompt from `dataset` and return the raw LLM text
    async fn perform_analysis(&self, dataset: &AnalysisDataset) -> Result<String, AnalysisError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleInfo {
    pub name: String,
    pub description: String,
}

#[derive(Default)]
pub struct ModuleRegistry {
    modules: Vec<Arc<dyn AnalysisModule>>,
    index: HashMap<String, usize>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, module: Arc<dyn AnalysisModule>) -> Result<(), AnalysisError> {
        let name = module.name().to_string();
        if self.index.contains_key(&name) {
            return Err(AnalysisError::DuplicateModuleName(name));
        }

        tracing::info!(module = %name, "Registered analysis module");
        self.index.insert(name, self.modules.len());
        self.modules.push(module);
        Ok(())
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<dyn AnalysisModule>, AnalysisError> {
        self.index
            .get(name)
            .map(|idx| self.modules[*idx].clone())
            .ok_or_else(|| AnalysisError::ModuleNotFound {
                name: name.to_string(),
                available: self.names(),
            })
    }

    /// Registered modules in registration order
    pub fn list(&self) -> Vec<ModuleInfo> {
        self.modules
            .iter()
            .map(|m| ModuleInfo {
                name: m.name().to_string(),
                description: m.description().to_string(),
            })
            .collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.modules.iter().map(|m| m.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoModule {
        name: &'static str,
    }

    #[async_trait]
    impl AnalysisModule for EchoModule {
        fn name(&self) -> &str {
            self.name
        }

        fn description(&self) -> &str {
            "echoes the symbol"
        }

        fn timeframes(&self) -> &[Timeframe] {
            &[Timeframe::OneHour]
        }

        fn required_sections(&self) -> &[Section] {
            &[Section::Overview]
        }

        fn parameters(&self) -> serde_json::Value {
            serde_json::json!({})
        }

        async fn perform_analysis(&self, dataset: &AnalysisDataset) -> Result<String, AnalysisError> {
            Ok(format!("# Overview\n{}", dataset.symbol))
        }
    }

    #[test]
    fn test_register_and_list_in_order() {
        let mut registry = ModuleRegistry::new();
        registry.register(Arc::new(EchoModule { name: "zeta" })).unwrap();
        registry.register(Arc::new(EchoModule { name: "alpha" })).unwrap();

        let names: Vec<_> = registry.list().into_iter().map(|m| m.name).collect();
        assert_eq!(names, vec!["zeta", "alpha"]);
        assert_eq!(registry.resolve("alpha").unwrap().name(), "alpha");
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut registry = ModuleRegistry::new();
        registry.register(Arc::new(EchoModule { name: "dup" })).unwrap();

        let err = registry.register(Arc::new(EchoModule { name: "dup" })).unwrap_err();
        assert_eq!(err, AnalysisError::DuplicateModuleName("dup".to_string()));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_unknown_module() {
        let mut registry = ModuleRegistry::new();
        registry.register(Arc::new(EchoModule { name: "only" })).unwrap();

        match registry.resolve("missing") {
            Err(AnalysisError::ModuleNotFound { name, available }) => {
                assert_eq!(name, "missing");
                assert_eq!(available, vec!["only".to_string()]);
            }
            other => panic!("expected ModuleNotFound, got {:?}", other.map(|m| m.name().to_string())),
        }
    }
}
