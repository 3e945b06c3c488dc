use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Numeric id of one catalog listing. Larger ids are newer listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ListingId(pub i64);

impl ListingId {
    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for ListingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ListingId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<i64>().map(ListingId)
    }
}

/// One tile of a catalog page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub id: ListingId,
    pub url: String,
    /// Paid placement; such tiles float to the top regardless of age.
    pub promoted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Species {
    Dog,
    Cat,
    Bird,
}

impl Species {
    pub fn as_str(self) -> &'static str {
        match self {
            Species::Dog => "dog",
            Species::Cat => "cat",
            Species::Bird => "bird",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Sex {
    #[default]
    Unknown,
    Male,
    Female,
}

impl Sex {
    pub fn as_str(self) -> &'static str {
        match self {
            Sex::Unknown => "unknown",
            Sex::Male => "male",
            Sex::Female => "female",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    Found,
    Lost,
}

impl EventType {
    pub fn as_str(self) -> &'static str {
        match self {
            EventType::Found => "found",
            EventType::Lost => "lost",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A listing detail page, fully parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct PetCard {
    pub id: ListingId,
    pub species: Species,
    pub sex: Sex,
    pub city: String,
    pub address: String,
    pub event_time: DateTime<Utc>,
    pub event_type: EventType,
    pub comment: String,
    pub photo_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoCoords {
    pub lat: f64,
    pub lon: f64,
}

/// Raw response body together with its declared content type.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedResource {
    pub body: Bytes,
    pub content_type: String,
}

impl FetchedResource {
    pub fn new(body: impl Into<Bytes>, content_type: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            content_type: content_type.into(),
        }
    }

    /// Photo links sometimes redirect to an HTML page; only `image/*` bodies count as photos.
    pub fn is_image(&self) -> bool {
        self.content_type.to_ascii_lowercase().contains("image")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_ids_parse_from_directory_names() {
        assert_eq!("164921".parse::<ListingId>().unwrap(), ListingId(164921));
        assert!("tmp".parse::<ListingId>().is_err());
        assert!(ListingId(101) > ListingId(100));
    }

    #[test]
    fn html_redirect_is_not_an_image() {
        let page = FetchedResource::new(&b"<html></html>"[..], "text/html; charset=utf-8");
        let photo = FetchedResource::new(&b"\xff\xd8"[..], "Image/JPEG");
        assert!(!page.is_image());
        assert!(photo.is_image());
    }
}
