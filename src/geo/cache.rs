use crate::domain::model::{GeocodeQuery, GeocodeResult};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

/// Memo of geocoding outcomes for the lifetime of a run.
///
/// Failures are stored next to successes so that a query that found
/// nothing is never sent again. Entries are never evicted.
#[derive(Debug, Default)]
pub struct ResolutionCache {
    entries: RwLock<HashMap<String, GeocodeResult>>,
    hits: AtomicU64,
}

impl ResolutionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, query: &GeocodeQuery) -> Option<GeocodeResult> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let found = entries.get(query.key()).copied();
        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
        found
    }

    /// Stores `result`, keeping the first value if another worker raced us.
    pub fn insert(&self, query: &GeocodeQuery, result: GeocodeResult) -> GeocodeResult {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        *entries.entry(query.key().to_string()).or_insert(result)
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }
}
