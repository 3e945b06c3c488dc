pub mod cache;
pub mod nominatim;

use crate::model::{GeoCoords, ListingId};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

pub use cache::CachingGeocoder;
pub use nominatim::NominatimClient;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeocodeError {
    #[error("no match for toponym")]
    NotFound,

    #[error("geocoder request failed: {0}")]
    Upstream(String),
}

pub type GeocodeResult = std::result::Result<GeoCoords, GeocodeError>;

#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Resolve a free-text place description to coordinates.
    async fn geocode(&self, toponym: &str) -> GeocodeResult;
}

#[async_trait]
impl<G: Geocoder + ?Sized> Geocoder for Arc<G> {
    async fn geocode(&self, toponym: &str) -> GeocodeResult {
        (**self).geocode(toponym).await
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedLocation {
    pub coords: GeoCoords,
    pub toponym: String,
}

/// Toponym strings for a listing, most specific first.
pub fn toponym_candidates(country: &str, city: &str, address: &str) -> Vec<String> {
    let city = city.trim();
    let address = address.trim();

    let formats: Vec<String> = match (city.is_empty(), address.is_empty()) {
        (true, true) => Vec::new(),
        (true, false) => vec![format!("{country}, {address}"), address.to_string()],
        (false, true) => vec![
            format!("{country}, г. {city}"),
            format!("{country}, {city}"),
            format!("г. {city}"),
            city.to_string(),
        ],
        (false, false) => vec![
            format!("{country}, г. {city}, {address}"),
            format!("{country}, {city}, {address}"),
            format!("{country}, г. {city}"),
            format!("{country}, {city}"),
            format!("г. {city}, {address}"),
            format!("{city}, {address}"),
            format!("г. {city}"),
            city.to_string(),
        ],
    };

    let mut seen = std::collections::HashSet::new();
    formats
        .into_iter()
        .filter(|f| seen.insert(f.clone()))
        .collect()
}

/// Tries the toponym formats of a listing in order against the shared geocoder.
#[derive(Clone)]
pub struct AddressResolver {
    geocoder: Arc<dyn Geocoder>,
    country: String,
}

impl AddressResolver {
    pub fn new(geocoder: Arc<dyn Geocoder>, country: impl Into<String>) -> Self {
        Self {
            geocoder,
            country: country.into(),
        }
    }

    /// First format that geocodes wins. `None` when none does, which is not an error.
    pub async fn resolve(
        &self,
        listing_id: ListingId,
        city: &str,
        address: &str,
    ) -> Option<ResolvedLocation> {
        for toponym in toponym_candidates(&self.country, city, address) {
            debug!(%listing_id, toponym = %toponym, "Trying to geocode");
            match self.geocoder.geocode(&toponym).await {
                Ok(coords) => {
                    info!(
                        %listing_id,
                        toponym = %toponym,
                        lat = coords.lat,
                        lon = coords.lon,
                        "Geocoded listing location"
                    );
                    return Some(ResolvedLocation { coords, toponym });
                }
                Err(e) => {
                    debug!(%listing_id, toponym = %toponym, error = %e, "Toponym not resolved");
                }
            }
        }

        info!(%listing_id, city, address, "No address format could be geocoded");
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StubGeocoder;
    use pretty_assertions::assert_eq;

    #[test]
    fn candidates_go_from_specific_to_general() {
        let candidates = toponym_candidates("Россия", "Сургут", "пр. Пролетарский 8/1");
        assert_eq!(
            candidates,
            vec![
                "Россия, г. Сургут, пр. Пролетарский 8/1",
                "Россия, Сургут, пр. Пролетарский 8/1",
                "Россия, г. Сургут",
                "Россия, Сургут",
                "г. Сургут, пр. Пролетарский 8/1",
                "Сургут, пр. Пролетарский 8/1",
                "г. Сургут",
                "Сургут",
            ]
        );
    }

    #[test]
    fn blank_address_skips_address_formats() {
        let candidates = toponym_candidates("Россия", "Оренбург", "  ");
        assert_eq!(
            candidates,
            vec!["Россия, г. Оренбург", "Россия, Оренбург", "г. Оренбург", "Оренбург"]
        );
        assert!(toponym_candidates("Россия", "", "").is_empty());
    }

    #[tokio::test]
    async fn fallback_tries_every_more_specific_format_first() {
        let stub = Arc::new(StubGeocoder::resolving([(
            "Владивосток",
            GeoCoords { lat: 43.11, lon: 131.88 },
        )]));
        let resolver = AddressResolver::new(stub.clone(), "Россия");

        let resolved = resolver
            .resolve(ListingId(164929), "Владивосток", "район Арт-пляжа")
            .await
            .unwrap();

        assert_eq!(resolved.toponym, "Владивосток");
        assert_eq!(resolved.coords, GeoCoords { lat: 43.11, lon: 131.88 });
        assert_eq!(
            stub.attempts(),
            toponym_candidates("Россия", "Владивосток", "район Арт-пляжа")
        );
    }

    #[tokio::test]
    async fn fallback_stops_at_first_success() {
        let stub = Arc::new(StubGeocoder::resolving([
            ("Россия, Оренбург", GeoCoords { lat: 51.76, lon: 55.1 }),
            ("Оренбург", GeoCoords { lat: 0.0, lon: 0.0 }),
        ]));
        let resolver = AddressResolver::new(stub.clone(), "Россия");

        let resolved = resolver.resolve(ListingId(1), "Оренбург", "").await.unwrap();

        assert_eq!(resolved.toponym, "Россия, Оренбург");
        assert_eq!(stub.attempts(), vec!["Россия, г. Оренбург", "Россия, Оренбург"]);
    }

    #[tokio::test]
    async fn unresolvable_address_yields_none() {
        let stub = Arc::new(StubGeocoder::default());
        let resolver = AddressResolver::new(stub.clone(), "Россия");

        assert!(resolver.resolve(ListingId(1), "Нигде", "ул. Никакая").await.is_none());
        assert_eq!(stub.attempts().len(), 8);
    }
}
