//! Cached, coalescing HDD lookups.
//!
//! The normalizer is the only mutable shared state in the detection
//! pipeline. It is constructed once and injected wherever weather data
//! is needed; detectors never talk to an [`HddProvider`] directly.
//!
//! Concurrent lookups for the same key share one in-flight fetch: the
//! first caller starts it, later callers await the same shared future,
//! and the result lands in the cache exactly once.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use futures::FutureExt as _;
use futures::future::{BoxFuture, Shared};
use tokio::sync::{Mutex, RwLock};

use crate::{HddProvider, HddReading, WeatherError, WeatherKey, WeatherRecord, WeatherSample};

type FetchResult = Result<WeatherSample, Arc<WeatherError>>;
type SharedFetch = Shared<BoxFuture<'static, FetchResult>>;

/// Cached HDD lookups with request coalescing and a staleness window.
///
/// Cheap to clone; clones share the same cache and in-flight registry.
#[derive(Clone)]
pub struct WeatherNormalizer {
    inner: Arc<Inner>,
}

struct Inner {
    provider: Arc<dyn HddProvider>,
    staleness: Duration,
    cache: RwLock<HashMap<WeatherKey, WeatherRecord>>,
    in_flight: Mutex<HashMap<WeatherKey, SharedFetch>>,
}

impl WeatherNormalizer {
    /// Default staleness window: 30 days. Historical-year HDD values
    /// barely move, so the window mostly guards against a bad fetch
    /// lingering forever.
    #[must_use]
    pub fn default_staleness() -> Duration {
        Duration::days(30)
    }

    /// Creates a normalizer over the given provider.
    #[must_use]
    pub fn new(provider: Arc<dyn HddProvider>, staleness: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                provider,
                staleness,
                cache: RwLock::new(HashMap::new()),
                in_flight: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Heating degree days for a postal code and year.
    ///
    /// Resolution order: fresh cache entry; otherwise one provider fetch
    /// shared among all concurrent callers for the key; on fetch failure
    /// the last-known cached value, flagged [`stale`](HddReading::stale).
    ///
    /// # Errors
    ///
    /// Returns [`WeatherError::Unavailable`] only when the fetch fails
    /// and nothing is cached for the key. Callers treat that as absent
    /// evidence, not as a pipeline failure.
    pub async fn get_hdd(&self, postal_code: &str, year: i32) -> Result<HddReading, WeatherError> {
        let key = WeatherKey {
            postal_code: postal_code.to_string(),
            year,
        };

        if let Some(reading) = self.fresh(&key).await {
            return Ok(reading);
        }

        let fetch = {
            let mut in_flight = self.inner.in_flight.lock().await;
            // Re-check under the lock: a fetch that finished between the
            // miss above and acquiring the lock has already filled the
            // cache and left the registry.
            if let Some(reading) = self.fresh(&key).await {
                return Ok(reading);
            }
            if let Some(pending) = in_flight.get(&key) {
                pending.clone()
            } else {
                let started = self.start_fetch(key.clone());
                in_flight.insert(key.clone(), started.clone());
                started
            }
        };

        match fetch.await {
            Ok(sample) => Ok(HddReading {
                hdd: sample.hdd,
                avg_temp_celsius: sample.avg_temp_celsius,
                stale: false,
            }),
            Err(err) => {
                let last_known = self.inner.cache.read().await.get(&key).cloned();
                if let Some(record) = last_known {
                    log::warn!(
                        "weather fetch for {key} failed ({err}); serving value fetched at {}",
                        record.fetched_at
                    );
                    return Ok(HddReading {
                        hdd: record.hdd,
                        avg_temp_celsius: record.avg_temp_celsius,
                        stale: true,
                    });
                }
                Err(WeatherError::Unavailable {
                    postal_code: key.postal_code,
                    year,
                    message: err.to_string(),
                })
            }
        }
    }

    /// Warms the cache for a list of keys, tolerating per-key failures.
    ///
    /// Returns how many keys resolved to a value (fresh or degraded).
    pub async fn prefetch(&self, keys: &[WeatherKey]) -> usize {
        let lookups = keys.iter().map(|key| async move {
            match self.get_hdd(&key.postal_code, key.year).await {
                Ok(_) => true,
                Err(err) => {
                    log::warn!("prefetch for {key} failed: {err}");
                    false
                }
            }
        });
        futures::future::join_all(lookups)
            .await
            .into_iter()
            .filter(|resolved| *resolved)
            .count()
    }

    /// Drops the cached record for one key. Returns whether one existed.
    pub async fn invalidate(&self, postal_code: &str, year: i32) -> bool {
        let key = WeatherKey {
            postal_code: postal_code.to_string(),
            year,
        };
        self.inner.cache.write().await.remove(&key).is_some()
    }

    /// Drops every cached record. Returns how many were evicted.
    pub async fn clear(&self) -> usize {
        let mut cache = self.inner.cache.write().await;
        let evicted = cache.len();
        cache.clear();
        evicted
    }

    async fn fresh(&self, key: &WeatherKey) -> Option<HddReading> {
        let cache = self.inner.cache.read().await;
        let record = cache.get(key)?;
        let age = Utc::now() - record.fetched_at;
        (age <= self.inner.staleness).then(|| HddReading {
            hdd: record.hdd,
            avg_temp_celsius: record.avg_temp_celsius,
            stale: false,
        })
    }

    fn start_fetch(&self, key: WeatherKey) -> SharedFetch {
        let inner = Arc::clone(&self.inner);
        async move {
            let result = inner.provider.fetch_hdd(&key.postal_code, key.year).await;
            let mapped = match result {
                Ok(sample) => {
                    inner.cache.write().await.insert(
                        key.clone(),
                        WeatherRecord {
                            postal_code: key.postal_code.clone(),
                            year: key.year,
                            hdd: sample.hdd,
                            avg_temp_celsius: sample.avg_temp_celsius,
                            fetched_at: Utc::now(),
                        },
                    );
                    log::debug!("cached HDD for {key}: {}", sample.hdd);
                    Ok(sample)
                }
                Err(err) => Err(Arc::new(err)),
            };
            inner.in_flight.lock().await.remove(&key);
            mapped
        }
        .boxed()
        .shared()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration as StdDuration;

    use async_trait::async_trait;

    use super::*;

    struct CountingProvider {
        calls: AtomicUsize,
        hdd: f64,
        delay: StdDuration,
    }

    impl CountingProvider {
        fn new(hdd: f64) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                hdd,
                delay: StdDuration::from_millis(20),
            }
        }
    }

    #[async_trait]
    impl HddProvider for CountingProvider {
        async fn fetch_hdd(
            &self,
            _postal_code: &str,
            _year: i32,
        ) -> Result<WeatherSample, WeatherError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok(WeatherSample {
                hdd: self.hdd,
                avg_temp_celsius: Some(9.5),
            })
        }
    }

    /// Succeeds on the first call, fails afterwards.
    struct FlakyProvider {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl HddProvider for FlakyProvider {
        async fn fetch_hdd(
            &self,
            postal_code: &str,
            year: i32,
        ) -> Result<WeatherSample, WeatherError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(WeatherSample {
                    hdd: 3100.0,
                    avg_temp_celsius: None,
                })
            } else {
                Err(WeatherError::Unavailable {
                    postal_code: postal_code.to_string(),
                    year,
                    message: "upstream down".to_string(),
                })
            }
        }
    }

    struct FailingProvider;

    #[async_trait]
    impl HddProvider for FailingProvider {
        async fn fetch_hdd(
            &self,
            postal_code: &str,
            year: i32,
        ) -> Result<WeatherSample, WeatherError> {
            Err(WeatherError::Unavailable {
                postal_code: postal_code.to_string(),
                year,
                message: "upstream down".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn concurrent_lookups_for_one_key_coalesce() {
        let provider = Arc::new(CountingProvider::new(3000.0));
        let normalizer =
            WeatherNormalizer::new(provider.clone(), WeatherNormalizer::default_staleness());

        let (a, b) = tokio::join!(
            normalizer.get_hdd("10115", 2024),
            normalizer.get_hdd("10115", 2024)
        );

        assert!((a.unwrap().hdd - 3000.0).abs() < f64::EPSILON);
        assert!((b.unwrap().hdd - 3000.0).abs() < f64::EPSILON);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn distinct_keys_fetch_independently() {
        let provider = Arc::new(CountingProvider::new(3000.0));
        let normalizer =
            WeatherNormalizer::new(provider.clone(), WeatherNormalizer::default_staleness());

        let (a, b) = tokio::join!(
            normalizer.get_hdd("10115", 2024),
            normalizer.get_hdd("80331", 2024)
        );

        assert!(a.is_ok());
        assert!(b.is_ok());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn fresh_cache_hit_skips_the_provider() {
        let provider = Arc::new(CountingProvider::new(2800.0));
        let normalizer =
            WeatherNormalizer::new(provider.clone(), WeatherNormalizer::default_staleness());

        let first = normalizer.get_hdd("10115", 2023).await.unwrap();
        let second = normalizer.get_hdd("10115", 2023).await.unwrap();

        assert!(!first.stale);
        assert!(!second.stale);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_refresh_serves_stale_value() {
        let provider = Arc::new(FlakyProvider {
            calls: AtomicUsize::new(0),
        });
        // Zero staleness: every lookup after the first wants a refresh.
        let normalizer = WeatherNormalizer::new(provider, Duration::zero());

        let first = normalizer.get_hdd("10115", 2024).await.unwrap();
        assert!(!first.stale);

        let degraded = normalizer.get_hdd("10115", 2024).await.unwrap();
        assert!(degraded.stale);
        assert!((degraded.hdd - 3100.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn failure_with_empty_cache_is_unavailable() {
        let normalizer =
            WeatherNormalizer::new(Arc::new(FailingProvider), WeatherNormalizer::default_staleness());

        let result = normalizer.get_hdd("10115", 2024).await;
        assert!(matches!(result, Err(WeatherError::Unavailable { .. })));
    }

    #[tokio::test]
    async fn invalidate_forces_a_refetch() {
        let provider = Arc::new(CountingProvider::new(2800.0));
        let normalizer =
            WeatherNormalizer::new(provider.clone(), WeatherNormalizer::default_staleness());

        normalizer.get_hdd("10115", 2024).await.unwrap();
        assert!(normalizer.invalidate("10115", 2024).await);
        normalizer.get_hdd("10115", 2024).await.unwrap();

        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn prefetch_tolerates_partial_failure() {
        let provider = Arc::new(FlakyProvider {
            calls: AtomicUsize::new(0),
        });
        let normalizer = WeatherNormalizer::new(provider, WeatherNormalizer::default_staleness());

        let keys = vec![
            WeatherKey {
                postal_code: "10115".to_string(),
                year: 2024,
            },
            WeatherKey {
                postal_code: "80331".to_string(),
                year: 2024,
            },
        ];
        let resolved = normalizer.prefetch(&keys).await;
        assert_eq!(resolved, 1);
    }
}
