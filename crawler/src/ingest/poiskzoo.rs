use super::{extract, ListingSource};
use crate::http::{HttpClient, ANY_ACCEPT};
use crate::model::{CatalogEntry, FetchedResource, ListingId, PetCard};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crawler_core::{Error, Result};
use metrics::counter;
use reqwest::Url;
use tracing::{debug, instrument};

/// The poiskzoo.ru lost/found board.
pub struct PoiskzooSource {
    http: HttpClient,
    base_url: Url,
    source_name: String,
}

impl PoiskzooSource {
    pub fn new(http: HttpClient, base_url: Url, source_name: impl Into<String>) -> Self {
        Self {
            http,
            base_url,
            source_name: source_name.into(),
        }
    }

    pub fn catalog_page_url(&self, page: u32) -> Result<Url> {
        self.join(&format!("/poteryashka/page-{page}"))
    }

    fn join(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| Error::Internal(format!("cannot build URL for {path}: {e}")))
    }
}

/// UTC midnight of the current day, the reference for relative dates on listing pages.
fn today_midnight() -> DateTime<Utc> {
    let now = Utc::now();
    now.date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|midnight| midnight.and_utc())
        .unwrap_or(now)
}

#[async_trait]
impl ListingSource for PoiskzooSource {
    #[instrument(skip(self))]
    async fn fetch_catalog_page(&self, page: u32) -> Result<Vec<CatalogEntry>> {
        let url = self.catalog_page_url(page)?;
        let html = self.http.get_html(url.as_str()).await?;
        let entries = extract::parse_catalog(&html)?;

        counter!("crawler_catalog_pages_fetched").increment(1);
        debug!(page, entries = entries.len(), "Catalog page parsed");
        Ok(entries)
    }

    #[instrument(skip(self), fields(listing_id = %id))]
    async fn fetch_card(&self, id: ListingId) -> Result<PetCard> {
        let url = self.listing_url(id);
        let html = self.http.get_html(&url).await?;
        extract::parse_card(id, &html, &self.base_url, today_midnight())
    }

    async fn fetch_photo(&self, url: &str) -> Result<FetchedResource> {
        self.http.get(url, ANY_ACCEPT).await
    }

    fn source_name(&self) -> &str {
        &self.source_name
    }

    fn listing_url(&self, id: ListingId) -> String {
        match self.join(&format!("/{id}")) {
            Ok(url) => url.to_string(),
            Err(_) => format!("{}/{id}", self.base_url.as_str().trim_end_matches('/')),
        }
    }
}
