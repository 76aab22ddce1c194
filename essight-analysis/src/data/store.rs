//! Dataset Store: the published, immutable survey snapshot.

use crate::data::catalog::Catalog;
use crate::data::clean::{CleaningReport, clean};
use crate::data::dataset::Dataset;
use crate::data::source::{self, SourceInfo};
use crate::error::IngestError;
use chrono::{DateTime, Utc};
use essight_core::{DatasetConfig, DatasetSourceConfig};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tracing::info;

/// A cleaned dataset plus everything needed to trace where it came from.
#[derive(Debug)]
pub struct DatasetSnapshot {
    pub dataset: Dataset,
    pub report: CleaningReport,
    pub source: SourceInfo,
    /// Increases by one on every successful (re)load.
    pub generation: u64,
    pub loaded_at: DateTime<Utc>,
}

/// Owns the current snapshot.
///
/// Readers clone the `Arc` and work without holding any lock. `reload` builds
/// the replacement completely before swapping it in, so a failed reload leaves
/// the previous snapshot published.
pub struct DatasetStore {
    current: RwLock<Arc<DatasetSnapshot>>,
    catalog: Catalog,
    required: Vec<String>,
    generation: AtomicU64,
}

impl std::fmt::Debug for DatasetStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatasetStore")
            .field("generation", &self.generation.load(Ordering::SeqCst))
            .field("required", &self.required)
            .finish()
    }
}

impl DatasetStore {
    /// Load and clean the configured source with the ESS catalog.
    ///
    /// `response` is always required; `config.required` adds to it.
    pub fn load(config: &DatasetConfig, response: &str) -> Result<Self, IngestError> {
        let catalog = Catalog::ess_default();
        let raw = source::load(&config.source, &catalog)?;
        Self::from_raw(
            raw,
            catalog,
            required_variables(response, &config.required),
            SourceInfo::from_config(&config.source),
        )
    }

    /// Clean an in-memory table and publish it as generation 1.
    pub fn from_raw(
        raw: Dataset,
        catalog: Catalog,
        required: Vec<String>,
        source: SourceInfo,
    ) -> Result<Self, IngestError> {
        let snapshot = build_snapshot(&raw, &required, source, 1)?;
        Ok(Self {
            current: RwLock::new(Arc::new(snapshot)),
            catalog,
            required,
            generation: AtomicU64::new(1),
        })
    }

    /// The currently published snapshot.
    pub fn snapshot(&self) -> Arc<DatasetSnapshot> {
        let guard = match self.current.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Arc::clone(&guard)
    }

    pub fn generation(&self) -> u64 {
        self.snapshot().generation
    }

    /// Read, clean, and publish `source` as a new generation.
    pub fn reload(&self, source: &DatasetSourceConfig) -> Result<Arc<DatasetSnapshot>, IngestError> {
        let raw = source::load(source, &self.catalog)?;
        self.publish(&raw, SourceInfo::from_config(source))
    }

    /// Clean `raw` and publish it as a new generation.
    pub fn publish(
        &self,
        raw: &Dataset,
        source: SourceInfo,
    ) -> Result<Arc<DatasetSnapshot>, IngestError> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let snapshot = Arc::new(build_snapshot(raw, &self.required, source, generation)?);

        let mut guard = match self.current.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        // Concurrent reloads may finish out of order; never go backwards.
        if guard.generation < generation {
            *guard = Arc::clone(&snapshot);
        }
        info!(
            generation,
            rows = snapshot.dataset.len(),
            "Published dataset snapshot"
        );
        Ok(snapshot)
    }
}

fn required_variables(response: &str, extra: &[String]) -> Vec<String> {
    let mut required = vec![response.to_string()];
    for name in extra {
        if !required.contains(name) {
            required.push(name.clone());
        }
    }
    required
}

fn build_snapshot(
    raw: &Dataset,
    required: &[String],
    source: SourceInfo,
    generation: u64,
) -> Result<DatasetSnapshot, IngestError> {
    let (dataset, report) = clean(raw, required)?;
    Ok(DatasetSnapshot {
        dataset,
        report,
        source,
        generation,
        loaded_at: Utc::now(),
    })
}
