//! Last-results cache: the most recent output of each engine.
//!
//! Entries are replaced whole. Each carries the dataset generation it was
//! computed from, and readers asking for a specific generation treat older
//! entries as absent.

use crate::stats::{CorrelationMatrix, OutlierReport, Overview, RegressionResult};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::debug;

/// Which engine produced a cached result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultKind {
    Overview,
    Regression,
    Correlation,
}

impl std::fmt::Display for ResultKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResultKind::Overview => write!(f, "overview"),
            ResultKind::Regression => write!(f, "regression"),
            ResultKind::Correlation => write!(f, "correlation"),
        }
    }
}

#[derive(Debug, Clone)]
pub enum CachedResult {
    Overview(Overview),
    Regression {
        result: Box<RegressionResult>,
        outliers: OutlierReport,
    },
    Correlation(CorrelationMatrix),
}

impl CachedResult {
    pub fn kind(&self) -> ResultKind {
        match self {
            CachedResult::Overview(_) => ResultKind::Overview,
            CachedResult::Regression { .. } => ResultKind::Regression,
            CachedResult::Correlation(_) => ResultKind::Correlation,
        }
    }
}

#[derive(Debug)]
pub struct CacheEntry {
    pub generation: u64,
    pub computed_at: DateTime<Utc>,
    pub result: CachedResult,
}

#[derive(Debug, Default)]
pub struct ResultsCache {
    entries: RwLock<HashMap<ResultKind, Arc<CacheEntry>>>,
}

impl ResultsCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the entry for `result`'s kind.
    ///
    /// An entry from a newer generation is never overwritten by an older one.
    pub fn publish(&self, generation: u64, result: CachedResult) {
        let kind = result.kind();
        let entry = Arc::new(CacheEntry {
            generation,
            computed_at: Utc::now(),
            result,
        });
        let mut entries = match self.entries.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match entries.get(&kind) {
            Some(existing) if existing.generation > generation => {
                debug!(%kind, generation, current = existing.generation, "Skipped stale cache entry");
            }
            _ => {
                entries.insert(kind, entry);
                debug!(%kind, generation, "Cached result");
            }
        }
    }

    /// The latest entry of `kind`, whatever its generation.
    pub fn get(&self, kind: ResultKind) -> Option<Arc<CacheEntry>> {
        let entries = match self.entries.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries.get(&kind).cloned()
    }

    /// The entry of `kind` computed from exactly `generation`.
    pub fn get_current(&self, kind: ResultKind, generation: u64) -> Option<Arc<CacheEntry>> {
        self.get(kind).filter(|entry| entry.generation == generation)
    }

    pub fn clear(&self) {
        let mut entries = match self.entries.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn overview(total: usize) -> CachedResult {
        CachedResult::Overview(Overview {
            total_observations: total,
            total_variables: 3,
            total_countries: 1,
            age_range: None,
            completeness: BTreeMap::new(),
        })
    }

    fn total(entry: &CacheEntry) -> usize {
        match &entry.result {
            CachedResult::Overview(ov) => ov.total_observations,
            other => panic!("unexpected {:?}", other.kind()),
        }
    }

    #[test]
    fn test_publish_and_get() {
        let cache = ResultsCache::new();
        assert!(cache.get(ResultKind::Overview).is_none());
        cache.publish(1, overview(10));
        let entry = cache.get(ResultKind::Overview).unwrap();
        assert_eq!(entry.generation, 1);
        assert_eq!(total(&entry), 10);
        assert!(cache.get(ResultKind::Regression).is_none());
    }

    #[test]
    fn test_old_generation_is_absent() {
        let cache = ResultsCache::new();
        cache.publish(1, overview(10));
        assert!(cache.get_current(ResultKind::Overview, 1).is_some());
        assert!(cache.get_current(ResultKind::Overview, 2).is_none());
    }

    #[test]
    fn test_replace_keeps_old_arc_valid() {
        let cache = ResultsCache::new();
        cache.publish(1, overview(10));
        let old = cache.get(ResultKind::Overview).unwrap();
        cache.publish(2, overview(20));
        assert_eq!(total(&old), 10);
        assert_eq!(total(&cache.get(ResultKind::Overview).unwrap()), 20);
    }

    #[test]
    fn test_stale_publish_ignored() {
        let cache = ResultsCache::new();
        cache.publish(3, overview(30));
        cache.publish(2, overview(20));
        assert_eq!(cache.get(ResultKind::Overview).unwrap().generation, 3);
        cache.clear();
        assert!(cache.get(ResultKind::Overview).is_none());
    }
}
