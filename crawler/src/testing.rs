//! In-memory collaborators shared by the unit tests.

use crate::geocode::{GeocodeError, GeocodeResult, Geocoder};
use crate::ingest::ListingSource;
use crate::model::{
    CatalogEntry, EventType, FetchedResource, GeoCoords, ListingId, PetCard, Sex, Species,
};
use crate::notify::Notifier;
use crate::record::NormalizedRecord;
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use crawler_core::{Error, Result};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

pub const PHOTO_BASE: &str = "https://poiskzoo.test/images/board/small";

pub fn entry(id: i64) -> CatalogEntry {
    CatalogEntry {
        id: ListingId(id),
        url: format!("/orenburg/propala-koshka/{id}"),
        promoted: false,
    }
}

pub fn promoted(id: i64) -> CatalogEntry {
    CatalogEntry {
        promoted: true,
        ..entry(id)
    }
}

pub fn sample_card(id: ListingId) -> PetCard {
    PetCard {
        id,
        species: Species::Cat,
        sex: Sex::Male,
        city: "Оренбург".to_string(),
        address: "Центральный".to_string(),
        event_time: Utc.with_ymd_and_hms(2022, 10, 16, 22, 27, 0).unwrap(),
        event_type: EventType::Lost,
        comment: "Бенгальский кот, окрас леопардовый".to_string(),
        photo_url: None,
    }
}

pub fn sample_record(id: ListingId) -> NormalizedRecord {
    NormalizedRecord::build(
        &sample_card(id),
        "poiskzooru",
        format!("https://poiskzoo.test/{id}"),
        None,
        None,
    )
}

/// Answers from a fixed table and records every toponym it was asked about.
#[derive(Default)]
pub struct StubGeocoder {
    known: HashMap<String, GeoCoords>,
    attempts: Mutex<Vec<String>>,
}

impl StubGeocoder {
    pub fn resolving<'a>(known: impl IntoIterator<Item = (&'a str, GeoCoords)>) -> Self {
        Self {
            known: known
                .into_iter()
                .map(|(toponym, coords)| (toponym.to_string(), coords))
                .collect(),
            attempts: Mutex::new(Vec::new()),
        }
    }

    pub fn attempts(&self) -> Vec<String> {
        self.attempts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Geocoder for StubGeocoder {
    async fn geocode(&self, toponym: &str) -> GeocodeResult {
        self.attempts.lock().unwrap().push(toponym.to_string());
        self.known
            .get(toponym)
            .copied()
            .ok_or(GeocodeError::NotFound)
    }
}

/// Catalog pages, cards and photos served from memory, counting fetches.
///
/// Pages past the configured ones are empty. Cards that were not registered
/// are generated with [`sample_card`] unless marked broken.
#[derive(Default)]
pub struct StubSource {
    pages: Mutex<Vec<Vec<CatalogEntry>>>,
    cards: HashMap<ListingId, PetCard>,
    broken: HashSet<ListingId>,
    photos: HashMap<String, FetchedResource>,
    page_fetches: Mutex<Vec<u32>>,
    card_fetches: AtomicUsize,
    photo_fetches: AtomicUsize,
}

impl StubSource {
    pub fn with_pages(pages: Vec<Vec<CatalogEntry>>) -> Self {
        Self {
            pages: Mutex::new(pages),
            ..Self::default()
        }
    }

    pub fn with_card(mut self, card: PetCard) -> Self {
        self.cards.insert(card.id, card);
        self
    }

    pub fn with_broken_card(mut self, id: ListingId) -> Self {
        self.broken.insert(id);
        self
    }

    pub fn with_photo(mut self, url: &str, resource: FetchedResource) -> Self {
        self.photos.insert(url.to_string(), resource);
        self
    }

    /// Replace the catalog, as the site does between cycles.
    pub fn set_pages(&self, pages: Vec<Vec<CatalogEntry>>) {
        *self.pages.lock().unwrap() = pages;
        self.page_fetches.lock().unwrap().clear();
    }

    pub fn pages_fetched(&self) -> Vec<u32> {
        self.page_fetches.lock().unwrap().clone()
    }

    pub fn card_fetches(&self) -> usize {
        self.card_fetches.load(Ordering::SeqCst)
    }

    pub fn photo_fetches(&self) -> usize {
        self.photo_fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ListingSource for StubSource {
    async fn fetch_catalog_page(&self, page: u32) -> Result<Vec<CatalogEntry>> {
        self.page_fetches.lock().unwrap().push(page);
        let pages = self.pages.lock().unwrap();
        Ok(page
            .checked_sub(1)
            .and_then(|index| pages.get(index as usize))
            .cloned()
            .unwrap_or_default())
    }

    async fn fetch_card(&self, id: ListingId) -> Result<PetCard> {
        self.card_fetches.fetch_add(1, Ordering::SeqCst);
        if self.broken.contains(&id) {
            return Err(Error::Fetch {
                url: self.listing_url(id),
                details: "HTTP status 500 Internal Server Error".to_string(),
            });
        }
        Ok(self.cards.get(&id).cloned().unwrap_or_else(|| sample_card(id)))
    }

    async fn fetch_photo(&self, url: &str) -> Result<FetchedResource> {
        self.photo_fetches.fetch_add(1, Ordering::SeqCst);
        self.photos.get(url).cloned().ok_or_else(|| Error::Fetch {
            url: url.to_string(),
            details: "connection refused".to_string(),
        })
    }

    fn source_name(&self) -> &str {
        "poiskzooru"
    }

    fn listing_url(&self, id: ListingId) -> String {
        format!("https://poiskzoo.test/{id}")
    }
}

/// Captures notifications, optionally answering every one with a fixed non-2xx status.
#[derive(Default)]
pub struct RecordingNotifier {
    reject_with: Option<u16>,
    received: Mutex<Vec<(String, Vec<u8>)>>,
}

impl RecordingNotifier {
    pub fn rejecting(status: u16) -> Self {
        Self {
            reject_with: Some(status),
            ..Self::default()
        }
    }

    pub fn received(&self) -> Vec<(String, Vec<u8>)> {
        self.received.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, uid: &str, payload: Vec<u8>) -> Result<()> {
        if let Some(status) = self.reject_with {
            return Err(Error::NotificationRejected { status });
        }
        self.received.lock().unwrap().push((uid.to_string(), payload));
        Ok(())
    }
}
