use crate::http::{HttpClient, JSON_MIME};
use async_trait::async_trait;
use crawler_core::{Error, Result};
use reqwest::Url;
use tracing::{debug, instrument};

/// Hands serialized records to the downstream processing pipeline.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Succeeds only when the pipeline accepted the record with a 2xx status.
    async fn notify(&self, uid: &str, payload: Vec<u8>) -> Result<()>;
}

pub struct HttpNotifier {
    http: HttpClient,
    url: Url,
}

impl HttpNotifier {
    pub fn new(http: HttpClient, url: Url) -> Self {
        Self { http, url }
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    #[instrument(skip(self, payload), fields(bytes = payload.len()))]
    async fn notify(&self, uid: &str, payload: Vec<u8>) -> Result<()> {
        let status = self.http.post(self.url.as_str(), JSON_MIME, payload).await?;
        if !status.is_success() {
            return Err(Error::NotificationRejected {
                status: status.as_u16(),
            });
        }
        debug!(status = status.as_u16(), "Pipeline accepted the record");
        Ok(())
    }
}
