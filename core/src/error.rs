use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("failed to fetch {url}: {details}")]
    Fetch { url: String, details: String },

    #[error("failed to extract {what}: {details}")]
    Parse { what: String, details: String },

    #[error("pipeline rejected the notification with HTTP status {status}")]
    NotificationRejected { status: u16 },

    #[error("unsupported image mime type: {0}")]
    UnsupportedImageType(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("listing {listing_id}: {source}")]
    Job {
        listing_id: i64,
        #[source]
        source: Box<Error>,
    },

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Wraps the error with the listing it happened on, unless it already carries one.
    pub fn for_listing(self, listing_id: i64) -> Self {
        match self {
            Error::Job { .. } => self,
            other => Error::Job {
                listing_id,
                source: Box::new(other),
            },
        }
    }

    pub fn parse(what: impl Into<String>, details: impl Into<String>) -> Self {
        Error::Parse {
            what: what.into(),
            details: details.into(),
        }
    }

    pub fn listing_id(&self) -> Option<i64> {
        match self {
            Error::Job { listing_id, .. } => Some(*listing_id),
            _ => None,
        }
    }

    pub fn is_startup_fatal(&self) -> bool {
        matches!(self, Error::Config(_) | Error::Validation(_))
    }
}
