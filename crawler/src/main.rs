mod app;
mod geocode;
mod http;
mod ingest;
mod job;
mod ledger;
mod model;
mod notify;
mod pipeline;
mod pool;
mod record;
mod store;
mod walker;

#[cfg(test)]
mod testing;

use clap::{Parser, Subcommand};
use crawler_core::{telemetry, Config};
use model::ListingId;
use std::path::PathBuf;
use std::process;
use tracing::{error, info};

#[derive(Parser)]
#[clap(name = "crawler")]
#[clap(about = "poiskzoo.ru lost & found pet listings crawler", version)]
struct Cli {
    /// Directory holding one sub-directory per ingested listing
    #[clap(long, env = "CARDS_DIR", global = true)]
    cards_dir: Option<PathBuf>,

    /// Endpoint that receives every new record as JSON
    #[clap(long, env = "PIPELINE_URL", global = true)]
    pipeline_url: Option<String>,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl forever at the polling interval
    Run,

    /// Run a single crawl cycle and exit
    Once,

    /// Resolve a city and optional address the way listings are geocoded
    Geocode {
        city: String,

        /// Street, district or landmark within the city
        address: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        match e.downcast_ref::<crawler_core::Error>() {
            // Logging is not installed yet
            Some(err) if err.is_startup_fatal() => eprintln!("Startup failed: {e:#}"),
            Some(err) => {
                error!(error = %e, listing_id = ?err.listing_id(), "Fatal error");
                eprintln!("Error: {e:#}");
            }
            None => {
                error!(error = %e, "Fatal error");
                eprintln!("Error: {e:#}");
            }
        }
        process::exit(1);
    }
}

/// Command line and historical environment names win over config layers.
fn apply_overrides(
    mut config: Config,
    cards_dir: Option<PathBuf>,
    pipeline_url: Option<String>,
) -> crawler_core::Result<Config> {
    if let Some(cards_dir) = cards_dir {
        config.storage.cards_dir = cards_dir;
    }
    if let Some(pipeline_url) = pipeline_url {
        config.notify.pipeline_url = Some(pipeline_url);
    }
    config
        .validate()
        .map_err(|e| crawler_core::Error::Validation(e.to_string()))?;
    Ok(config)
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Config::load()
        .map_err(|e| crawler_core::Error::Config(format!("failed to load config: {e}")))?;
    let config = apply_overrides(config, cli.cards_dir, cli.pipeline_url)?;

    telemetry::init(&config.telemetry)?;
    info!(version = env!("CARGO_PKG_VERSION"), "Starting crawler");

    match cli.command {
        Commands::Run => {
            let app = app::App::new(config).await?;
            app.run_continuous().await?;
        }

        Commands::Once => {
            let app = app::App::new(config).await?;
            let report = app.run_once().await?;
            info!(
                pages = report.pages_fetched,
                candidates = report.candidates,
                ingested = report.ingested,
                skipped = report.skipped,
                "Single cycle finished"
            );
        }

        Commands::Geocode { city, address } => {
            let http = http::HttpClient::new(&config.crawler.user_agent, config.http_timeout())?;
            let resolver = app::build_resolver(&config, http)?;
            let address = address.unwrap_or_default();

            match resolver.resolve(ListingId(0), &city, &address).await {
                Some(found) => println!(
                    "{}\t{}\t{}",
                    found.coords.lat, found.coords.lon, found.toponym
                ),
                None => println!("not found"),
            }
        }
    }

    telemetry::shutdown();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn overrides_replace_configured_values() {
        let config = apply_overrides(
            Config::default(),
            Some(PathBuf::from("/srv/cards")),
            Some("http://pipeline.local/ingest".to_string()),
        )
        .unwrap();

        assert_eq!(config.storage.cards_dir, PathBuf::from("/srv/cards"));
        assert_eq!(
            config.notify.pipeline_url.as_deref(),
            Some("http://pipeline.local/ingest")
        );
    }

    #[test]
    fn invalid_override_is_startup_fatal() {
        let err = apply_overrides(Config::default(), None, Some("not a url".to_string()))
            .unwrap_err();

        assert!(err.is_startup_fatal());
        assert!(err.to_string().contains("notify.pipeline_url"));

        let wrapped = anyhow::Error::from(err);
        assert!(wrapped
            .downcast_ref::<crawler_core::Error>()
            .is_some_and(|e| e.is_startup_fatal()));
    }
}
