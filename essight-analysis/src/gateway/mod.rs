//! # HTTP Gateway
//!
//! Serves the analysis engines and the research assistant over a JSON API.
//! Every request reads the currently published dataset snapshot; results of
//! the overview and regression routes are published to the last-results cache
//! for the assistant to ground on.

mod server;

pub use server::{ApiError, router, run};

use crate::cache::ResultsCache;
use crate::data::DatasetStore;
use crate::research::ResearchAssistant;
use essight_core::AnalysisConfig;
use std::sync::Arc;
use std::time::Instant;

/// Shared state behind every handler.
#[derive(Debug)]
pub struct AppState {
    pub store: Arc<DatasetStore>,
    pub cache: Arc<ResultsCache>,
    pub assistant: Arc<ResearchAssistant>,
    pub analysis: Arc<AnalysisConfig>,
    pub started_at: Instant,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(
        store: DatasetStore,
        assistant: ResearchAssistant,
        analysis: AnalysisConfig,
    ) -> SharedState {
        Arc::new(Self {
            store: Arc::new(store),
            cache: Arc::new(ResultsCache::new()),
            assistant: Arc::new(assistant),
            analysis: Arc::new(analysis),
            started_at: Instant::now(),
        })
    }
}
