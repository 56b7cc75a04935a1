use reqwest::{Client, StatusCode};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;
use url::Url;

use storescope_core::RawSnapshot;

/// User agent sent to the analytics endpoint, which rejects non-browser clients.
pub const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:130.0) Gecko/20100101 Firefox/130.0";

/// Client for the public traffic snapshot endpoint.
#[derive(Clone)]
pub struct SnapshotClient {
    http: Client,
    base_url: Url,
}

impl SnapshotClient {
    /// Creates a client; `base_url` must end with a slash, e.g.
    /// `https://data.similarweb.com/api/v1/`.
    pub fn new(base_url: Url, http: Client) -> Self {
        Self { http, base_url }
    }

    /// Fetches the raw analytics document for `domain`.
    pub async fn fetch(&self, domain: &str) -> Result<RawSnapshot, SnapshotError> {
        let mut url = self.base_url.join("data")?;
        url.query_pairs_mut().append_pair("domain", domain);

        let response = self
            .http
            .get(url)
            .header(reqwest::header::USER_AGENT, BROWSER_USER_AGENT)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("<unavailable>"));
            return Err(SnapshotError::Status { status, body });
        }

        let body = response.text().await?;
        let document: Value = serde_json::from_str(&body)?;
        match &document {
            Value::Object(map) if !map.is_empty() => {
                debug!(stage = "fetch", domain, bytes = body.len(), "snapshot received");
                Ok(document)
            }
            _ => Err(SnapshotError::NoData),
        }
    }
}

/// Errors produced while fetching a snapshot.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("failed to build url: {0}")]
    Url(#[from] url::ParseError),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("failed to decode snapshot: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("provider returned no data")]
    NoData,
}
