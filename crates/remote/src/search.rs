use std::collections::HashSet;

use reqwest::{Client, StatusCode};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;
use url::Url;

/// Parameters of a single Custom Search request.
#[derive(Debug, Clone)]
pub struct SearchParams {
    pub api_key: String,
    pub engine_id: String,
    pub query: String,
    pub site: String,
}

/// Client for the Custom Search JSON API, used to discover storefront hostnames.
#[derive(Clone)]
pub struct SearchClient {
    http: Client,
    endpoint: Url,
}

impl SearchClient {
    pub fn new(endpoint: Url, http: Client) -> Self {
        Self { http, endpoint }
    }

    /// Returns the unique hostnames found on the first result page.
    pub async fn discover(&self, params: &SearchParams) -> Result<HashSet<String>, SearchError> {
        let mut url = self.endpoint.clone();
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("key", &params.api_key);
            query.append_pair("cx", &params.engine_id);
            query.append_pair("q", &params.query);
            query.append_pair("siteSearch", &params.site);
            query.append_pair("siteSearchFilter", "i");
            query.append_pair("num", "10");
            query.append_pair("start", "1");
        }

        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("<unavailable>"));
            return Err(SearchError::Status { status, body });
        }

        let page: Value = response.json().await?;
        let items = page
            .get("items")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        let domains: HashSet<String> = items.iter().filter_map(item_hostname).collect();
        debug!(
            stage = "discovery",
            items = items.len(),
            domains = domains.len(),
            "search page processed"
        );
        Ok(domains)
    }
}

/// Host of one result item, preferring the canonical `og:url` over the link.
///
/// Items of any other shape yield `None` and are dropped.
fn item_hostname(item: &Value) -> Option<String> {
    let canonical = item
        .pointer("/pagemap/metatags/0/og:url")
        .and_then(Value::as_str)
        .and_then(host_of);

    canonical.or_else(|| item.get("link").and_then(Value::as_str).and_then(host_of))
}

fn host_of(raw: &str) -> Option<String> {
    Url::parse(raw)
        .ok()
        .and_then(|url| url.host_str().map(str::to_ascii_lowercase))
        .filter(|host| !host.is_empty())
}

/// Errors produced by the search client.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status {status}: {body}")]
    Status { status: StatusCode, body: String },
}
