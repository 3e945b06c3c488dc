pub mod extract;
pub mod poiskzoo;

use crate::model::{CatalogEntry, FetchedResource, ListingId, PetCard};
use async_trait::async_trait;
use crawler_core::Result;

#[async_trait]
pub trait ListingSource: Send + Sync {
    /// Fetch and parse one catalog page. Pages are numbered from 1, newest first.
    async fn fetch_catalog_page(&self, page: u32) -> Result<Vec<CatalogEntry>>;

    /// Fetch and parse the detail page of a listing
    async fn fetch_card(&self, id: ListingId) -> Result<PetCard>;

    /// Download a photo without judging its content type
    async fn fetch_photo(&self, url: &str) -> Result<FetchedResource>;

    /// Prefix of the record uid
    fn source_name(&self) -> &str;

    /// Public address of the listing detail page
    fn listing_url(&self, id: ListingId) -> String;
}

pub use poiskzoo::PoiskzooSource;
