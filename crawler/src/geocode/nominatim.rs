use super::{GeocodeError, GeocodeResult, Geocoder};
use crate::http::{HttpClient, JSON_MIME};
use crate::model::GeoCoords;
use async_trait::async_trait;
use metrics::counter;
use reqwest::header::ACCEPT;
use reqwest::Url;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, instrument};

/// Minimum spacing between upstream requests, shared by every caller.
///
/// The guard returned by [`RequestThrottle::acquire`] holds the watermark lock,
/// so requests issued while holding it are also serialized.
#[derive(Debug)]
pub struct RequestThrottle {
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl RequestThrottle {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_request: Mutex::new(None),
        }
    }

    pub async fn acquire(&self) -> MutexGuard<'_, Option<Instant>> {
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let ready_at = previous + self.min_interval;
            if ready_at > Instant::now() {
                sleep_until(ready_at).await;
            }
        }
        *last = Some(Instant::now());
        last
    }
}

#[derive(Debug, Deserialize)]
struct FoundToponym {
    lat: String,
    lon: String,
}

/// Nominatim search API client, throttled to the public instance usage policy.
pub struct NominatimClient {
    http: HttpClient,
    base_url: Url,
    throttle: RequestThrottle,
}

impl NominatimClient {
    pub fn new(http: HttpClient, base_url: Url, min_interval: Duration) -> Self {
        Self {
            http,
            base_url,
            throttle: RequestThrottle::new(min_interval),
        }
    }

    fn search_url(&self, toponym: &str) -> Url {
        let mut url = self.base_url.clone();
        url.query_pairs_mut()
            .append_pair("q", toponym)
            .append_pair("format", "jsonv2");
        url
    }
}

/// First hit of a `format=jsonv2` search response.
pub fn parse_search_response(body: &str) -> GeocodeResult {
    let found: Vec<FoundToponym> = serde_json::from_str(body)
        .map_err(|e| GeocodeError::Upstream(format!("malformed search response: {e}")))?;

    let Some(first) = found.first() else {
        return Err(GeocodeError::NotFound);
    };

    let lat = first
        .lat
        .parse::<f64>()
        .map_err(|_| GeocodeError::Upstream(format!("invalid latitude: {}", first.lat)))?;
    let lon = first
        .lon
        .parse::<f64>()
        .map_err(|_| GeocodeError::Upstream(format!("invalid longitude: {}", first.lon)))?;

    Ok(GeoCoords { lat, lon })
}

#[async_trait]
impl Geocoder for NominatimClient {
    #[instrument(skip(self))]
    async fn geocode(&self, toponym: &str) -> GeocodeResult {
        let url = self.search_url(toponym);

        let _slot = self.throttle.acquire().await;
        counter!("crawler_geocode_upstream_requests").increment(1);

        let response = self
            .http
            .inner()
            .get(url)
            .header(ACCEPT, JSON_MIME)
            .send()
            .await
            .map_err(|e| GeocodeError::Upstream(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GeocodeError::Upstream(format!("HTTP status {status}")));
        }

        let body = response
            .text()
            .await
            .map_err(|e| GeocodeError::Upstream(e.to_string()))?;

        let result = parse_search_response(&body);
        debug!(toponym, found = result.is_ok(), "Nominatim search completed");
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn first_search_hit_is_used() {
        let body = r#"[
            {"place_id": 1, "lat": "54.7291584", "lon": "37.1807652", "display_name": "Таруса"},
            {"place_id": 2, "lat": "1.0", "lon": "2.0"}
        ]"#;
        assert_eq!(
            parse_search_response(body),
            Ok(GeoCoords { lat: 54.7291584, lon: 37.1807652 })
        );
    }

    #[test]
    fn empty_search_is_not_found() {
        assert_eq!(parse_search_response("[]"), Err(GeocodeError::NotFound));
    }

    #[test]
    fn garbage_coordinates_are_upstream_errors() {
        let result = parse_search_response(r#"[{"lat": "north", "lon": "1"}]"#);
        assert!(matches!(result, Err(GeocodeError::Upstream(_))));
        assert!(matches!(parse_search_response("<html>"), Err(GeocodeError::Upstream(_))));
    }

    #[test]
    fn search_url_escapes_toponym() {
        let http = HttpClient::new("test-agent", Duration::from_secs(1)).unwrap();
        let client = NominatimClient::new(
            http,
            Url::parse("https://nominatim.example/search.php").unwrap(),
            Duration::from_secs(1),
        );
        let url = client.search_url("г. Сургут, пр. Пролетарский 8/1");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("q".to_string(), "г. Сургут, пр. Пролетарский 8/1".to_string()),
                ("format".to_string(), "jsonv2".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn throttle_spaces_out_sequential_requests() {
        let interval = Duration::from_millis(40);
        let throttle = RequestThrottle::new(interval);
        let start = Instant::now();

        for _ in 0..3 {
            drop(throttle.acquire().await);
        }

        assert!(start.elapsed() >= interval * 2);
    }

    #[tokio::test]
    async fn throttle_serializes_concurrent_callers() {
        let interval = Duration::from_millis(30);
        let throttle = Arc::new(RequestThrottle::new(interval));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let throttle = Arc::clone(&throttle);
            handles.push(tokio::spawn(async move {
                let stamp = *throttle.acquire().await;
                stamp.expect("watermark set on acquire")
            }));
        }

        let mut stamps = Vec::new();
        for handle in handles {
            stamps.push(handle.await.unwrap());
        }
        stamps.sort();

        for pair in stamps.windows(2) {
            assert!(pair[1].duration_since(pair[0]) >= interval);
        }
    }
}
