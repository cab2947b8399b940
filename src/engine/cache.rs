//! Memoized feature vectors.
//!
//! Keyed by (entity, as-of date, opponent, season, window config). Entries are
//! never invalidated by time since historical observations are immutable; a
//! new window config is simply a new key.

use super::features::{FeatureBuilder, FeatureKey, FeatureRequest, FeatureVector};
use crate::error::EngineResult;
use crate::repository::Repository;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

/// Concurrent requests for one key collapse to a single computation.
#[derive(Default)]
pub struct FeatureCache {
    entries: DashMap<FeatureKey, Arc<OnceLock<Arc<FeatureVector>>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl FeatureCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_build(
        &self,
        builder: &FeatureBuilder,
        repo: &dyn Repository,
        request: &FeatureRequest,
    ) -> EngineResult<Arc<FeatureVector>> {
        // Unknown entities are never cached.
        builder.ensure_known(repo, &request.entity_id)?;

        let key = builder.key_for(request);
        // Clone the cell out so the shard lock is released before computing.
        let cell = Arc::clone(self.entries.entry(key).or_insert_with(Default::default).value());

        let mut computed = false;
        let fv = cell.get_or_init(|| {
            computed = true;
            Arc::new(builder.compute(repo, request))
        });

        if computed {
            self.misses.fetch_add(1, Ordering::Relaxed);
        } else {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
        Ok(Arc::clone(fv))
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.entries.len(),
        }
    }
}
