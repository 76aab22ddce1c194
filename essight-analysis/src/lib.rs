//! # essight-analysis: ESS survey analysis engine
//!
//! Loads and cleans the European Social Survey snapshot, runs the statistical
//! engines over it, grounds the research assistant on their results, and
//! serves everything over HTTP.
//!
//! ## Layers
//!
//! 1. **Data**: catalog, CSV/JSON loading, cleaning, and the published snapshot
//! 2. **Stats**: aggregation, OLS regression with outliers, correlation
//! 3. **Research**: grounding facts, depth-scoped prompts, the LLM call
//! 4. **Report / Gateway**: the response contract and the axum router

// Foundation
pub mod cache;
pub mod error;

// Engines
pub mod data;
pub mod stats;

// Assistant
pub mod research;

// Presentation
pub mod gateway;
pub mod report;

// Re-exports
pub use cache::{CacheEntry, CachedResult, ResultKind, ResultsCache};
pub use data::{Dataset, DatasetSnapshot, DatasetStore};
pub use error::{AnalysisError, AssistantError, ErrorClass, IngestError};
pub use gateway::{AppState, SharedState};
pub use report::RegressionAnalysis;
pub use research::ResearchAssistant;
