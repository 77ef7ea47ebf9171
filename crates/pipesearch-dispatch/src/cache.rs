//! Content-addressed pipeline-execution cache.
//!
//! Maps a 64-bit hash of (pipeline definition, sorted input dataset URIs,
//! sorted produce-input URIs, search parameters) to the result URI of a
//! previously completed execution. Process-lifetime only: no eviction,
//! no TTL, no persistence across restarts. Correctness depends on the
//! key incorporating every input that affects the output; a caller must
//! not expect hits across changes the hash does not capture.
//!
//! The cache is an explicitly constructed object injected into the
//! submission façade, not a process-wide singleton.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::debug;

use pipesearch_core::types::PipelineDescription;
use pipesearch_core::CoreError;

use crate::error::DispatchResult;

/// Strip the file scheme from a result URI, yielding the bare
/// file-system path stored and returned by the cache.
pub fn normalize_uri(uri: &str) -> String {
    uri.strip_prefix("file://").unwrap_or(uri).to_string()
}

/// Content-addressed identifier of a produced result: a deterministic
/// hash of the result's normalized file path.
pub fn result_id(uri: &str) -> String {
    let digest = Sha256::digest(normalize_uri(uri).as_bytes());
    digest[..8].iter().map(|b| format!("{:02x}", b)).collect()
}

/// Cache hit/miss counters.
#[derive(Debug, Clone, Copy)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total > 0 {
            self.hits as f64 / total as f64
        } else {
            0.0
        }
    }
}

/// Concurrent memo table of completed pipeline executions.
///
/// # Thread Safety
///
/// Guarded by a read/write exclusion lock: many concurrent readers,
/// single writer. `get` and `insert` are O(1) and reads never block each
/// other.
#[derive(Debug, Default)]
pub struct PipelineCache {
    entries: RwLock<HashMap<u64, String>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl PipelineCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Derive the cache key for one pipeline execution.
    ///
    /// URI slices are sorted before hashing so caller ordering cannot
    /// split identical executions across keys.
    pub fn key<P: Serialize>(
        pipeline: &PipelineDescription,
        dataset_uris: &[String],
        produce_uris: &[String],
        params: &P,
    ) -> DispatchResult<u64> {
        let mut hasher = Sha256::new();
        hasher.update(pipeline.canonical_json().map_err(CoreError::from)?);

        let mut sorted_datasets = dataset_uris.to_vec();
        sorted_datasets.sort_unstable();
        for uri in &sorted_datasets {
            hasher.update(uri.as_bytes());
        }

        let mut sorted_produce = produce_uris.to_vec();
        sorted_produce.sort_unstable();
        for uri in &sorted_produce {
            hasher.update(uri.as_bytes());
        }

        hasher.update(serde_json::to_vec(params).map_err(CoreError::from)?);

        let digest = hasher.finalize();
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        Ok(u64::from_be_bytes(bytes))
    }

    /// Look up a previously cached result URI.
    pub fn get(&self, key: u64) -> Option<String> {
        let entries = self.entries.read();
        match entries.get(&key) {
            Some(uri) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(uri.clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Record a completed execution. Entries are never updated once
    /// written; a duplicate insert for the same key is a no-op.
    pub fn insert(&self, key: u64, result_uri: String) {
        let mut entries = self.entries.write();
        if entries.insert(key, result_uri).is_some() {
            debug!(key, "pipeline cache entry overwritten with same-key result");
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipesearch_core::types::PipelineStep;

    fn pipeline() -> PipelineDescription {
        PipelineDescription::new(vec![PipelineStep::new(
            "primitives.learner.random_forest",
            "RandomForest",
        )])
    }

    #[derive(Serialize)]
    struct Params {
        budget: u64,
    }

    #[test]
    fn test_key_ignores_uri_ordering() {
        let p = pipeline();
        let params = Params { budget: 5 };
        let a = PipelineCache::key(
            &p,
            &["file:///a".into(), "file:///b".into()],
            &[],
            &params,
        )
        .unwrap();
        let b = PipelineCache::key(
            &p,
            &["file:///b".into(), "file:///a".into()],
            &[],
            &params,
        )
        .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_key_sensitive_to_every_input() {
        let p = pipeline();
        let params = Params { budget: 5 };
        let base =
            PipelineCache::key(&p, &["file:///a".into()], &["file:///t".into()], &params).unwrap();

        let other_dataset =
            PipelineCache::key(&p, &["file:///z".into()], &["file:///t".into()], &params).unwrap();
        assert_ne!(base, other_dataset);

        let other_params = PipelineCache::key(
            &p,
            &["file:///a".into()],
            &["file:///t".into()],
            &Params { budget: 6 },
        )
        .unwrap();
        assert_ne!(base, other_params);
    }

    #[test]
    fn test_get_insert_and_stats() {
        let cache = PipelineCache::new();
        assert!(cache.get(42).is_none());

        cache.insert(42, "/results/predictions.csv".to_string());
        assert_eq!(cache.get(42).as_deref(), Some("/results/predictions.csv"));
        assert_eq!(cache.len(), 1);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_concurrent_readers_and_writer() {
        use std::sync::Arc;
        let cache = Arc::new(PipelineCache::new());
        let mut handles = Vec::new();
        for i in 0..8u64 {
            let cache = cache.clone();
            handles.push(std::thread::spawn(move || {
                cache.insert(i, format!("/results/{}", i));
                for j in 0..8u64 {
                    let _ = cache.get(j);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(cache.len(), 8);
    }

    #[test]
    fn test_uri_normalization_and_result_id() {
        assert_eq!(normalize_uri("file:///results/p.csv"), "/results/p.csv");
        assert_eq!(normalize_uri("/results/p.csv"), "/results/p.csv");

        // Identifier depends on the normalized path only.
        assert_eq!(result_id("file:///results/p.csv"), result_id("/results/p.csv"));
        assert_eq!(result_id("/results/p.csv").len(), 16);
        assert_ne!(result_id("/results/p.csv"), result_id("/results/q.csv"));
    }
}
