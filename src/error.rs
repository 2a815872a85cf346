use thiserror::Error;

/// Errors surfaced by the analysis pipeline.
///
/// This is the only error type `AnalysisFacade` returns. Failures inside the
/// exchange, news or LLM collaborators are mapped onto one of these variants
/// (or degraded away) before they reach the caller.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    /// The exchange does not know the symbol. Never retried.
    #[error("symbol not found: {0}")]
    SymbolNotFound(String),

    /// Not enough usable market data to build a prompt.
    #[error("insufficient data for {symbol}: {reason}")]
    InsufficientData { symbol: String, reason: String },

    #[error("analysis module '{name}' not found (available: {})", available.join(", "))]
    ModuleNotFound { name: String, available: Vec<String> },

    #[error("analysis module '{0}' is already registered")]
    DuplicateModuleName(String),

    /// The language model failed after its single retry.
    #[error("LLM unavailable: {0}")]
    LlmUnavailable(String),
}

impl AnalysisError {
    /// Short machine-friendly tag, used in request traces and logs
    pub fn kind(&self) -> &'static str {
        match self {
            AnalysisError::SymbolNotFound(_) => "SymbolNotFound",
            AnalysisError::InsufficientData { .. } => "InsufficientData",
            AnalysisError::ModuleNotFound { .. } => "ModuleNotFound",
            AnalysisError::DuplicateModuleName(_) => "DuplicateModuleName",
            AnalysisError::LlmUnavailable(_) => "LLMUnavailable",
        }
    }
}
