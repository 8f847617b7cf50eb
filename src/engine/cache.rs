//! Per-analyzer result cache with single-flight deduplication.
//!
//! The first caller for a key installs a shared future; concurrent callers for the same key
//! await that future instead of recomputing. Successful results are kept for `ttl`. Failures
//! are dropped so the next request retries. Expired entries are swept whenever a new
//! computation starts, so the map only holds live keys.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};

use crate::config::DEBUG_FLAGS;
use crate::engine::messages::{CacheKey, NodeOutput, NodeResult};
use crate::utils::AppInstant;

type InFlight = Shared<BoxFuture<'static, NodeResult>>;

enum Entry {
    InFlight(InFlight),
    Ready { value: NodeOutput, at: AppInstant },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Served from a ready entry.
    pub hits: usize,
    /// Started a new computation.
    pub misses: usize,
    /// Joined a computation another caller had already started.
    pub joins: usize,
}

pub struct ResultCache {
    entries: Mutex<HashMap<CacheKey, Entry>>,
    ttl: Duration,
    hits: AtomicUsize,
    misses: AtomicUsize,
    joins: AtomicUsize,
}

impl ResultCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
            joins: AtomicUsize::new(0),
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            joins: self.joins.load(Ordering::Relaxed),
        }
    }

    /// Number of ready (not in-flight) entries, expired ones included.
    pub fn len(&self) -> usize {
        self.lock()
            .values()
            .filter(|e| matches!(e, Entry::Ready { .. }))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Drop every expired ready entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let mut entries = self.lock();
        Self::sweep(&mut entries, self.ttl)
    }

    fn sweep(entries: &mut HashMap<CacheKey, Entry>, ttl: Duration) -> usize {
        let before = entries.len();
        entries.retain(|_, entry| match entry {
            Entry::Ready { at, .. } => at.elapsed() < ttl,
            Entry::InFlight(_) => true,
        });
        let removed = before - entries.len();
        if removed > 0 && DEBUG_FLAGS.log_cache {
            log::debug!("cache evicted {} expired entries", removed);
        }
        removed
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<CacheKey, Entry>> {
        // A panic while holding the lock cannot leave the map half-updated.
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Return the cached value for `key`, join the in-flight computation, or start `compute`.
    pub async fn get_or_compute<F>(&self, key: CacheKey, compute: F) -> NodeResult
    where
        F: Future<Output = NodeResult> + Send + 'static,
    {
        let shared = {
            let mut entries = self.lock();
            match entries.get(&key) {
                Some(Entry::Ready { value, at }) if at.elapsed() < self.ttl => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    if DEBUG_FLAGS.log_cache {
                        log::debug!("cache hit {:?}", key);
                    }
                    return Ok(value.clone());
                }
                Some(Entry::InFlight(shared)) => {
                    self.joins.fetch_add(1, Ordering::Relaxed);
                    if DEBUG_FLAGS.log_cache {
                        log::debug!("cache join {:?}", key);
                    }
                    shared.clone()
                }
                _ => {
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    Self::sweep(&mut entries, self.ttl);
                    let shared = compute.boxed().shared();
                    entries.insert(key.clone(), Entry::InFlight(shared.clone()));
                    shared
                }
            }
        };

        let result = shared.await;

        let mut entries = self.lock();
        if matches!(entries.get(&key), Some(Entry::InFlight(_))) {
            match &result {
                Ok(value) => {
                    entries.insert(
                        key,
                        Entry::Ready {
                            value: value.clone(),
                            at: AppInstant::now(),
                        },
                    );
                }
                Err(e) => {
                    if DEBUG_FLAGS.log_cache {
                        log::debug!("cache drop {:?}: {}", key, e);
                    }
                    entries.remove(&key);
                }
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AnalysisError;
    use crate::models::{AnalyzerKind, RegimeResult};
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn key(analyzer: AnalyzerKind) -> CacheKey {
        CacheKey {
            symbol: "AAA".into(),
            lookback_days: 252,
            as_of_date: None,
            analyzer,
        }
    }

    fn regime_output() -> NodeOutput {
        NodeOutput::Regime(RegimeResult {
            current_regime: 0,
            regime_probabilities: vec![1.0],
            regime_descriptions: BTreeMap::new(),
            n_states: 1,
            states: vec![],
            transition_matrix: vec![vec![1.0]],
            log_likelihood: 0.0,
            bic: 0.0,
            bic_by_states: BTreeMap::new(),
            iterations: 1,
            history: vec![],
            statistics: BTreeMap::new(),
        })
    }

    #[tokio::test]
    async fn concurrent_duplicates_share_one_computation() {
        let cache = Arc::new(ResultCache::new(Duration::from_secs(60)));
        let runs = Arc::new(AtomicUsize::new(0));

        let call = |cache: Arc<ResultCache>, runs: Arc<AtomicUsize>| async move {
            cache
                .get_or_compute(key(AnalyzerKind::Regime), async move {
                    runs.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Ok(regime_output())
                })
                .await
        };

        let (a, b, c) = tokio::join!(
            call(cache.clone(), runs.clone()),
            call(cache.clone(), runs.clone()),
            call(cache.clone(), runs.clone())
        );
        assert_eq!(a, b);
        assert_eq!(b, c);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(cache.stats(), CacheStats { hits: 0, misses: 1, joins: 2 });

        call(cache.clone(), runs.clone()).await.unwrap();
        assert_eq!(cache.stats().hits, 1);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failures_are_not_cached() {
        let cache = ResultCache::new(Duration::from_secs(60));
        let failed = cache
            .get_or_compute(key(AnalyzerKind::Volatility), async {
                Err(AnalysisError::Timeout { millis: 5 })
            })
            .await;
        assert!(failed.is_err());
        assert!(cache.is_empty());

        let ok = cache
            .get_or_compute(key(AnalyzerKind::Volatility), async { Ok(regime_output()) })
            .await;
        assert!(ok.is_ok());
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.stats().misses, 2);
    }

    #[tokio::test]
    async fn expired_entries_do_not_accumulate() {
        let cache = ResultCache::new(Duration::ZERO);
        for day in 0..1000 {
            let key = CacheKey {
                as_of_date: chrono::NaiveDate::from_num_days_from_ce_opt(738_000 + day),
                ..key(AnalyzerKind::FractionalDiff)
            };
            cache.get_or_compute(key, async { Ok(regime_output()) }).await.unwrap();
            assert!(cache.len() <= 1, "{} entries after {} inserts", cache.len(), day + 1);
        }
        assert_eq!(cache.stats().misses, 1000);
        assert_eq!(cache.purge_expired(), 1);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn live_entries_survive_a_sweep() {
        let cache = ResultCache::new(Duration::from_secs(60));
        for analyzer in [AnalyzerKind::Regime, AnalyzerKind::Spectral] {
            cache.get_or_compute(key(analyzer), async { Ok(regime_output()) }).await.unwrap();
        }
        assert_eq!(cache.purge_expired(), 0);
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn expired_entries_are_recomputed() {
        let cache = ResultCache::new(Duration::ZERO);
        for _ in 0..2 {
            cache
                .get_or_compute(key(AnalyzerKind::Spectral), async { Ok(regime_output()) })
                .await
                .unwrap();
        }
        assert_eq!(cache.stats().misses, 2);
        assert_eq!(cache.stats().hits, 0);
    }
}
