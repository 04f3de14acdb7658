//! Memoized close-match lookups.
//!
//! Similarity is the normalized indel (longest common subsequence) ratio,
//! `2 * LCS / (len(a) + len(b))`. Lookups are cached in a bounded LRU keyed by
//! the target, the exact candidate tuple and the cutoff, so repeated uploads of
//! the same header shape do not recompute every pair.

use std::{
    num::NonZeroUsize,
    sync::{
        Mutex, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
};

use log::debug;
use lru::LruCache;
use rapidfuzz::distance::indel;
use serde::Serialize;

const MIN_CAPACITY: NonZeroUsize = NonZeroUsize::MIN;

/// Ratio in `[0, 1]`; two empty strings are identical.
pub fn similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    indel::normalized_similarity(a.chars(), b.chars())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CloseMatch {
    pub candidate: String,
    pub similarity: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub len: usize,
    pub capacity: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct MatchKey {
    target: String,
    candidates: Vec<String>,
    cutoff_bits: u64,
}

#[derive(Debug)]
pub struct CloseMatcher {
    cache: Mutex<LruCache<MatchKey, Vec<CloseMatch>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CloseMatcher {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(MIN_CAPACITY);
        Self {
            cache: Mutex::new(LruCache::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Candidates scoring at least `cutoff`, best first. Equal scores keep
    /// candidate order.
    pub fn close_matches(&self, target: &str, candidates: &[String], cutoff: f64) -> Vec<CloseMatch> {
        let key = MatchKey {
            target: target.to_string(),
            candidates: candidates.to_vec(),
            cutoff_bits: cutoff.to_bits(),
        };
        {
            let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(found) = cache.get(&key) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return found.clone();
            }
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        let mut matches = candidates
            .iter()
            .map(|candidate| CloseMatch {
                candidate: candidate.clone(),
                similarity: similarity(target, candidate),
            })
            .filter(|m| m.similarity >= cutoff)
            .collect::<Vec<_>>();
        matches.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));

        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache.put(key, matches.clone());
        matches
    }

    pub fn best_match(&self, target: &str, candidates: &[String], cutoff: f64) -> Option<CloseMatch> {
        self.close_matches(target, candidates, cutoff).into_iter().next()
    }

    pub fn stats(&self) -> CacheStats {
        let cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            len: cache.len(),
            capacity: cache.cap().get(),
        }
    }

    pub fn clear(&self) {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache.clear();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        debug!("Close-match cache cleared");
    }
}
