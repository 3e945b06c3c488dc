use crate::geocode::AddressResolver;
use crate::ingest::ListingSource;
use crate::model::ListingId;
use crate::notify::Notifier;
use crate::record::{NormalizedRecord, Photo};
use crate::store::CardStore;
use crawler_core::Result;
use metrics::counter;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Ingested,
    /// Storage already had the listing, nothing was fetched.
    AlreadyStored,
}

/// Everything needed to take one listing from the site into storage.
#[derive(Clone)]
pub struct CardJob {
    source: Arc<dyn ListingSource>,
    resolver: AddressResolver,
    store: Arc<dyn CardStore>,
    notifier: Option<Arc<dyn Notifier>>,
}

impl CardJob {
    pub fn new(
        source: Arc<dyn ListingSource>,
        resolver: AddressResolver,
        store: Arc<dyn CardStore>,
        notifier: Option<Arc<dyn Notifier>>,
    ) -> Self {
        Self {
            source,
            resolver,
            store,
            notifier,
        }
    }

    #[instrument(skip(self), fields(listing_id = %id))]
    pub async fn run(&self, id: ListingId) -> Result<JobOutcome> {
        self.ingest(id).await.map_err(|e| e.for_listing(id.get()))
    }

    async fn ingest(&self, id: ListingId) -> Result<JobOutcome> {
        if self.store.exists(id).await? {
            info!("Listing already stored, skipping");
            counter!("crawler_cards_skipped").increment(1);
            return Ok(JobOutcome::AlreadyStored);
        }

        let card = self.source.fetch_card(id).await?;
        debug!(species = card.species.as_str(), event = %card.event_type, "Fetched listing card");

        let photo = match &card.photo_url {
            Some(url) => {
                let fetched = self.source.fetch_photo(url).await?;
                let photo = Photo::from_fetched(fetched)?;
                if photo.is_none() {
                    warn!(url = %url, "Photo link did not return an image, dropping it");
                    counter!("crawler_photos_discarded").increment(1);
                }
                photo
            }
            None => None,
        };

        let location = self.resolver.resolve(id, &card.city, &card.address).await;

        let record = NormalizedRecord::build(
            &card,
            self.source.source_name(),
            self.source.listing_url(id),
            location.as_ref(),
            photo.as_ref(),
        );

        match &self.notifier {
            Some(notifier) => {
                let payload = record.to_json_pretty()?.into_bytes();
                notifier.notify(&record.uid, payload).await?;
                info!("Pipeline notified");
            }
            None => debug!("No pipeline configured, skipping notification"),
        }

        self.store.save(id, record, photo.as_ref()).await?;
        counter!("crawler_cards_ingested").increment(1);
        Ok(JobOutcome::Ingested)
    }
}
