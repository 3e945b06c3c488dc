use crate::model::FetchedResource;
use crawler_core::{Error, Result};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::StatusCode;
use std::time::Duration;
use tracing::{debug, warn};

pub const HTML_ACCEPT: &str = "text/html";
pub const ANY_ACCEPT: &str = "*/*";
pub const JSON_MIME: &str = "application/json";

/// Thin shared wrapper over `reqwest` carrying the crawler's User-Agent and timeout.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
}

impl HttpClient {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }

    /// GET returning the raw body whatever the status; callers judge the content type.
    pub async fn get(&self, url: &str, accept: &str) -> Result<FetchedResource> {
        let response = self
            .client
            .get(url)
            .header(ACCEPT, accept)
            .send()
            .await
            .map_err(|e| fetch_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            warn!(url, status = status.as_u16(), "Non-success status for raw fetch");
        }

        let content_type = content_type_of(&response);
        let body = response.bytes().await.map_err(|e| fetch_error(url, e))?;

        debug!(url, bytes = body.len(), content_type = %content_type, "Fetched resource");
        Ok(FetchedResource::new(body, content_type))
    }

    /// GET an HTML page and decode it to UTF-8 using the declared charset.
    pub async fn get_html(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .header(ACCEPT, HTML_ACCEPT)
            .send()
            .await
            .map_err(|e| fetch_error(url, e))?;

        decode_html(url, response).await
    }

    pub async fn post(&self, url: &str, content_type: &str, body: Vec<u8>) -> Result<StatusCode> {
        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await
            .map_err(|e| fetch_error(url, e))?;
        Ok(response.status())
    }

    pub fn inner(&self) -> &reqwest::Client {
        &self.client
    }
}

/// Non-2xx is an error; the body is recoded from its declared charset, UTF-8 when none.
async fn decode_html(url: &str, response: reqwest::Response) -> Result<String> {
    let status = response.status();
    if !status.is_success() {
        return Err(Error::Fetch {
            url: url.to_string(),
            details: format!("HTTP status {status}"),
        });
    }

    response
        .text_with_charset("utf-8")
        .await
        .map_err(|e| fetch_error(url, e))
}

fn content_type_of(response: &reqwest::Response) -> String {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

fn fetch_error(url: &str, err: reqwest::Error) -> Error {
    Error::Fetch {
        url: url.to_string(),
        details: err.to_string(),
    }
}
