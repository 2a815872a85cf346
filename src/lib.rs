// Core modules
pub mod api;
pub mod config;
pub mod context;
pub mod derivatives;
pub mod error;
pub mod facade;
pub mod fetcher;
pub mod indicators;
pub mod llm;
pub mod memory;
pub mod models;
pub mod modules;
pub mod news;
pub mod prompt;
pub mod registry;

// Re-export commonly used types
pub use config::Settings;
pub use error::AnalysisError;
pub use facade::{AnalysisBatch, AnalysisFacade};
pub use models::*;
pub use registry::{AnalysisDataset, AnalysisModule, ModuleInfo, ModuleRegistry};

// Error handling
pub type Result<T> = std::result::Result<T, AnalysisError>;
