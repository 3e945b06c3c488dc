//! The JSON document persisted as `card.json` and sent to the downstream pipeline.

use crate::geocode::ResolvedLocation;
use crate::model::{FetchedResource, PetCard, Sex};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use crawler_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// Downstream consumers match on these exact strings.
pub const COORDS_PROVENANCE: &str = "Геокодер OSM Moninatim";
pub const NO_COORDS_PROVENANCE: &str = "Геокодер OSM Moninatim: адрес не найден";
pub const EVENT_TIME_PROVENANCE: &str = "Указано на сайте poiskzoo.ru";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    pub uid: String,
    #[serde(rename = "animal")]
    pub species: String,
    pub location: LocationBlock,
    pub event_time: DateTime<Utc>,
    pub event_time_provenance: String,
    #[serde(rename = "card_type")]
    pub event_type: String,
    pub contact_info: ContactBlock,
    pub provenance_url: String,
    #[serde(rename = "animal_sex", default, skip_serializing_if = "Option::is_none")]
    pub sex: Option<String>,
    pub images: Vec<ImageDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationBlock {
    #[serde(rename = "Address")]
    pub address: String,
    #[serde(rename = "Lat", default, skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(rename = "Lon", default, skip_serializing_if = "Option::is_none")]
    pub lon: Option<f64>,
    #[serde(rename = "CoordsProvenance")]
    pub provenance: String,
}

/// Contact details are not scraped; only the free-text comment is carried.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContactBlock {
    pub comment: String,
    pub tel: Vec<String>,
    pub website: Vec<String>,
    pub email: Vec<String>,
    pub name: String,
}

/// Either an inline base64 image (`type` is the file extension) or a reference
/// to a file next to `card.json` (`type` is `file`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageDescriptor {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: String,
}

impl ImageDescriptor {
    pub fn inline(format: ImageFormat, bytes: &[u8]) -> Self {
        Self {
            kind: format.extension().to_string(),
            data: STANDARD.encode(bytes),
        }
    }

    pub fn file(name: impl Into<String>) -> Self {
        Self {
            kind: "file".to_string(),
            data: name.into(),
        }
    }

    #[cfg(test)]
    pub fn is_file_reference(&self) -> bool {
        self.kind == "file"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Jpeg,
    Png,
    Gif,
    Webp,
}

impl ImageFormat {
    /// Recognizes `image/<subtype>` content types, ignoring case and parameters.
    pub fn from_mime(content_type: &str) -> Result<Self> {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        match essence.as_str() {
            "image/jpeg" | "image/jpg" => Ok(ImageFormat::Jpeg),
            "image/png" => Ok(ImageFormat::Png),
            "image/gif" => Ok(ImageFormat::Gif),
            "image/webp" => Ok(ImageFormat::Webp),
            _ => Err(Error::UnsupportedImageType(content_type.to_string())),
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Png => "png",
            ImageFormat::Gif => "gif",
            ImageFormat::Webp => "webp",
        }
    }

    pub fn file_name(self) -> String {
        format!("image.{}", self.extension())
    }
}

/// A downloaded listing photo in a recognized format.
#[derive(Debug, Clone, PartialEq)]
pub struct Photo {
    pub format: ImageFormat,
    pub body: Bytes,
}

impl Photo {
    /// `Ok(None)` for non-image bodies (redirects to HTML pages and the like).
    /// An image in a format we cannot name is an error.
    pub fn from_fetched(resource: FetchedResource) -> Result<Option<Self>> {
        if !resource.is_image() {
            return Ok(None);
        }
        let format = ImageFormat::from_mime(&resource.content_type)?;
        Ok(Some(Self {
            format,
            body: resource.body,
        }))
    }
}

impl NormalizedRecord {
    pub fn build(
        card: &PetCard,
        source_name: &str,
        provenance_url: String,
        location: Option<&ResolvedLocation>,
        photo: Option<&Photo>,
    ) -> Self {
        let address = if card.address.trim().is_empty() {
            card.city.clone()
        } else {
            format!("{}, {}", card.city, card.address)
        };

        let location = match location {
            Some(resolved) => LocationBlock {
                address,
                lat: Some(resolved.coords.lat),
                lon: Some(resolved.coords.lon),
                provenance: COORDS_PROVENANCE.to_string(),
            },
            None => LocationBlock {
                address,
                lat: None,
                lon: None,
                provenance: NO_COORDS_PROVENANCE.to_string(),
            },
        };

        let sex = match card.sex {
            Sex::Unknown => None,
            known => Some(known.as_str().to_string()),
        };

        let images = photo
            .map(|p| vec![ImageDescriptor::inline(p.format, &p.body)])
            .unwrap_or_default();

        Self {
            uid: format!("{}_{}", source_name, card.id),
            species: card.species.as_str().to_string(),
            location,
            event_time: card.event_time,
            event_time_provenance: EVENT_TIME_PROVENANCE.to_string(),
            event_type: card.event_type.as_str().to_string(),
            contact_info: ContactBlock {
                comment: card.comment.clone(),
                tel: Vec::new(),
                website: Vec::new(),
                email: Vec::new(),
                name: String::new(),
            },
            provenance_url,
            sex,
            images,
        }
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
