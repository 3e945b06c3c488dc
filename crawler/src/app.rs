use crate::geocode::{AddressResolver, CachingGeocoder, Geocoder, NominatimClient};
use crate::http::HttpClient;
use crate::ingest::{ListingSource, PoiskzooSource};
use crate::job::CardJob;
use crate::notify::{HttpNotifier, Notifier};
use crate::pipeline::{CycleReport, Pipeline};
use crate::pool::WorkerPool;
use crate::store::{CardStore, DirectoryCardStore};
use crate::walker::CatalogWalker;
use crawler_core::{Config, Error, Result};
use std::sync::Arc;
use tracing::{info, instrument};

/// Builds the geocoding stack shared by every worker: one throttled upstream client behind one cache.
pub fn build_resolver(config: &Config, http: HttpClient) -> Result<AddressResolver> {
    let base_url = config
        .geocoder_base_url()
        .map_err(|e| Error::Config(e.to_string()))?;
    let upstream = NominatimClient::new(http, base_url, config.geocoder_min_interval());
    let geocoder: Arc<dyn Geocoder> = Arc::new(CachingGeocoder::new(
        upstream,
        config.geocoder.cache_capacity,
    ));
    Ok(AddressResolver::new(geocoder, config.geocoder.country.clone()))
}

pub struct App {
    pipeline: Pipeline,
}

impl App {
    #[instrument(skip(config))]
    pub async fn new(config: Config) -> Result<Self> {
        info!("Initializing application");

        let http = HttpClient::new(&config.crawler.user_agent, config.http_timeout())?;

        let store: Arc<dyn CardStore> =
            Arc::new(DirectoryCardStore::open(&config.storage.cards_dir).await?);

        let catalog_base_url = config
            .catalog_base_url()
            .map_err(|e| Error::Config(e.to_string()))?;
        let source: Arc<dyn ListingSource> = Arc::new(PoiskzooSource::new(
            http.clone(),
            catalog_base_url,
            config.crawler.source_name.clone(),
        ));

        let notifier = match config
            .pipeline_url()
            .map_err(|e| Error::Config(e.to_string()))?
        {
            Some(url) => {
                info!(url = %url, "Records will be sent to the pipeline");
                Some(Arc::new(HttpNotifier::new(http.clone(), url)) as Arc<dyn Notifier>)
            }
            None => {
                info!("No pipeline URL configured, records are only stored locally");
                None
            }
        };

        let resolver = build_resolver(&config, http)?;
        let job = CardJob::new(Arc::clone(&source), resolver, Arc::clone(&store), notifier);

        let pipeline = Pipeline::new(
            CatalogWalker::new(source),
            WorkerPool::new(job, config.crawler.worker_count),
            store,
            config.crawler.ledger_capacity,
            config.poll_interval(),
        );

        info!(
            cards_dir = %config.storage.cards_dir.display(),
            workers = config.crawler.worker_count,
            ledger_capacity = config.crawler.ledger_capacity,
            poll_interval_secs = config.crawler.poll_interval_secs,
            "Application ready"
        );

        Ok(Self { pipeline })
    }

    pub async fn run_continuous(&self) -> Result<()> {
        self.pipeline.run_continuous().await
    }

    pub async fn run_once(&self) -> Result<CycleReport> {
        self.pipeline.run_once().await
    }
}
