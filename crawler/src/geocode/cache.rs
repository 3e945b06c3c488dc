use super::{GeocodeResult, Geocoder};
use async_trait::async_trait;
use lru::LruCache;
use metrics::counter;
use std::num::NonZeroUsize;
use std::sync::{Mutex, PoisonError};
use tracing::debug;

/// Geocoder decorator remembering the last `capacity` answers, failures included,
/// so a bad address is not sent upstream again on every listing that mentions it.
pub struct CachingGeocoder<G> {
    inner: G,
    cache: Mutex<LruCache<String, GeocodeResult>>,
}

impl<G: Geocoder> CachingGeocoder<G> {
    pub fn new(inner: G, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Cached answer for the toponym, marking it most recently used.
    fn lookup(&self, toponym: &str) -> Option<GeocodeResult> {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache.get(toponym).cloned()
    }

    fn remember(&self, toponym: &str, result: GeocodeResult) {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some((evicted, _)) = cache.push(toponym.to_string(), result) {
            if evicted != toponym {
                debug!(toponym = %evicted, "Evicted geocode cache entry");
            }
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[async_trait]
impl<G: Geocoder> Geocoder for CachingGeocoder<G> {
    async fn geocode(&self, toponym: &str) -> GeocodeResult {
        if let Some(cached) = self.lookup(toponym) {
            counter!("crawler_geocode_cache_hits").increment(1);
            debug!(toponym, "Geocode cache hit");
            return cached;
        }

        counter!("crawler_geocode_cache_misses").increment(1);
        let result = self.inner.geocode(toponym).await;
        self.remember(toponym, result.clone());
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geocode::GeocodeError;
    use crate::model::GeoCoords;
    use crate::testing::StubGeocoder;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn coords(lat: f64) -> GeoCoords {
        GeoCoords { lat, lon: 0.0 }
    }

    fn stub() -> Arc<StubGeocoder> {
        Arc::new(StubGeocoder::resolving([
            ("a", coords(1.0)),
            ("b", coords(2.0)),
            ("c", coords(3.0)),
            ("d", coords(4.0)),
        ]))
    }

    #[tokio::test]
    async fn hit_skips_upstream() {
        let upstream = stub();
        let cached = CachingGeocoder::new(Arc::clone(&upstream), 10);

        assert_eq!(cached.geocode("a").await, Ok(coords(1.0)));
        assert_eq!(cached.geocode("a").await, Ok(coords(1.0)));
        assert_eq!(upstream.attempts(), vec!["a"]);
    }

    #[tokio::test]
    async fn failures_are_cached_too() {
        let upstream = stub();
        let cached = CachingGeocoder::new(Arc::clone(&upstream), 10);

        assert_eq!(cached.geocode("nowhere").await, Err(GeocodeError::NotFound));
        assert_eq!(cached.geocode("nowhere").await, Err(GeocodeError::NotFound));
        assert_eq!(upstream.attempts(), vec!["nowhere"]);
    }

    #[tokio::test]
    async fn overflow_evicts_least_recently_used() {
        let upstream = stub();
        let cached = CachingGeocoder::new(Arc::clone(&upstream), 3);

        for key in ["a", "b", "c", "d"] {
            cached.geocode(key).await.unwrap();
        }
        assert_eq!(cached.len(), 3);

        // "a" was evicted, the others are still cached
        for key in ["b", "c", "d", "a"] {
            cached.geocode(key).await.unwrap();
        }
        assert_eq!(upstream.attempts(), vec!["a", "b", "c", "d", "a"]);
    }

    #[tokio::test]
    async fn get_protects_entry_from_next_eviction() {
        let upstream = stub();
        let cached = CachingGeocoder::new(Arc::clone(&upstream), 3);

        for key in ["a", "b", "c"] {
            cached.geocode(key).await.unwrap();
        }
        // touching "a" leaves "b" as the least recently used
        cached.geocode("a").await.unwrap();
        cached.geocode("d").await.unwrap();

        cached.geocode("a").await.unwrap();
        cached.geocode("b").await.unwrap();
        assert_eq!(upstream.attempts(), vec!["a", "b", "c", "d", "b"]);
    }
}
