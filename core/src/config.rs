use config::{ConfigError, Environment, File};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub storage: StorageConfig,
    pub crawler: CrawlerConfig,
    pub geocoder: GeocoderConfig,
    pub notify: NotifyConfig,
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    pub cards_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CrawlerConfig {
    pub catalog_base_url: String,
    /// Prefix of the record uid, `<source_name>_<listing id>`.
    pub source_name: String,
    pub worker_count: usize,
    pub ledger_capacity: usize,
    pub poll_interval_secs: u64,
    pub http_timeout_secs: u64,
    pub user_agent: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GeocoderConfig {
    pub base_url: String,
    pub min_interval_ms: u64,
    pub cache_capacity: usize,
    /// Leading component of the most specific toponym formats.
    pub country: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct NotifyConfig {
    pub pipeline_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub log_format: LogFormat,
    pub metrics_enabled: bool,
    pub metrics_port: u16,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();

        // Load default configuration
        builder = builder.add_source(config::Config::try_from(&Config::default())?);

        // Layer on config file if it exists
        if Path::new("config.toml").exists() {
            builder = builder.add_source(File::with_name("config"));
        }

        // Layer on environment variables (CRAWLER_ prefix)
        builder = builder.add_source(
            Environment::with_prefix("CRAWLER")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        let settings: Config = config.try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storage.cards_dir.as_os_str().is_empty() {
            return Err(ConfigError::Message("storage.cards_dir is required".into()));
        }

        if self.crawler.worker_count == 0 {
            return Err(ConfigError::Message(
                "crawler.worker_count must be greater than 0".into(),
            ));
        }

        if self.crawler.ledger_capacity == 0 {
            return Err(ConfigError::Message(
                "crawler.ledger_capacity must be greater than 0".into(),
            ));
        }

        if self.geocoder.cache_capacity == 0 {
            return Err(ConfigError::Message(
                "geocoder.cache_capacity must be greater than 0".into(),
            ));
        }

        self.catalog_base_url()?;
        self.geocoder_base_url()?;
        self.pipeline_url()?;

        Ok(())
    }

    pub fn catalog_base_url(&self) -> Result<Url, ConfigError> {
        parse_url("crawler.catalog_base_url", &self.crawler.catalog_base_url)
    }

    pub fn geocoder_base_url(&self) -> Result<Url, ConfigError> {
        parse_url("geocoder.base_url", &self.geocoder.base_url)
    }

    /// Parsed downstream notification URL, `None` when notification is disabled.
    pub fn pipeline_url(&self) -> Result<Option<Url>, ConfigError> {
        match self.notify.pipeline_url.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(raw) => parse_url("notify.pipeline_url", raw).map(Some),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.crawler.poll_interval_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.crawler.http_timeout_secs)
    }

    pub fn geocoder_min_interval(&self) -> Duration {
        Duration::from_millis(self.geocoder.min_interval_ms)
    }
}

fn parse_url(key: &str, raw: &str) -> Result<Url, ConfigError> {
    Url::parse(raw).map_err(|e| ConfigError::Message(format!("{key} is not a valid URL ({raw:?}): {e}")))
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage: StorageConfig {
                cards_dir: PathBuf::from("./db"),
            },
            crawler: CrawlerConfig {
                catalog_base_url: "https://poiskzoo.ru".to_string(),
                source_name: "poiskzooru".to_string(),
                worker_count: 5,
                ledger_capacity: 10_000,
                poll_interval_secs: 5 * 60,
                http_timeout_secs: 30,
                user_agent: format!(
                    "LostPetInitiative:poiskzoo-crawler / {} (https://kashtanka.pet/)",
                    env!("CARGO_PKG_VERSION")
                ),
            },
            geocoder: GeocoderConfig {
                base_url: "https://nominatim.openstreetmap.org/search.php".to_string(),
                min_interval_ms: 1000,
                cache_capacity: 128,
                country: "Россия".to_string(),
            },
            notify: NotifyConfig::default(),
            telemetry: TelemetryConfig {
                log_level: "info".to_string(),
                log_format: LogFormat::Pretty,
                metrics_enabled: false,
                metrics_port: 9090,
            },
        }
    }
}
