use crate::config::{LogFormat, TelemetryConfig};
use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Install the tracing subscriber and, when enabled, the Prometheus scrape endpoint.
///
/// `RUST_LOG` takes precedence over `telemetry.log_level`.
pub fn init(config: &TelemetryConfig) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let fmt_layer = match config.log_format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .boxed(),
        LogFormat::Pretty => fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_names(true)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()?;

    if config.metrics_enabled {
        let addr: SocketAddr = ([0, 0, 0, 0], config.metrics_port).into();
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()?;
        describe_metrics();

        tracing::info!(
            port = config.metrics_port,
            "Metrics endpoint started at http://0.0.0.0:{}/metrics",
            config.metrics_port
        );
    }

    Ok(())
}

fn describe_metrics() {
    describe_counter!(
        "crawler_catalog_pages_fetched",
        Unit::Count,
        "Catalog pages downloaded and parsed"
    );
    describe_counter!(
        "crawler_candidates_discovered",
        Unit::Count,
        "Listings the catalog walk found new"
    );
    describe_counter!("crawler_cards_ingested", Unit::Count, "Listings stored");
    describe_counter!(
        "crawler_cards_skipped",
        Unit::Count,
        "Listings skipped because storage already had them"
    );
    describe_counter!(
        "crawler_photos_discarded",
        Unit::Count,
        "Photo links that did not return an image"
    );
    describe_counter!(
        "crawler_geocode_upstream_requests",
        Unit::Count,
        "Requests sent to the geocoding service"
    );
    describe_counter!("crawler_geocode_cache_hits", Unit::Count, "Geocode cache hits");
    describe_counter!("crawler_geocode_cache_misses", Unit::Count, "Geocode cache misses");
    describe_gauge!("crawler_ledger_size", Unit::Count, "Listing ids remembered as ingested");
    describe_histogram!(
        "crawler_cycle_duration_ms",
        Unit::Milliseconds,
        "Wall time of one walk-and-ingest cycle"
    );
}

pub fn shutdown() {
    tracing::info!("Shutting down telemetry");
}
