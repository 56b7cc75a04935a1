//! Adapters between the remote clients and the pipeline seams.

use std::collections::HashSet;

use async_trait::async_trait;
use url::Url;

use storescope_core::RawSnapshot;
use storescope_remote::{SearchClient, SearchError, SearchParams, SnapshotClient, SnapshotError};
use storescope_util::DiscoveryConfig;

use crate::pipeline::{DomainDiscovery, SnapshotFetcher};

/// Discovery over a fixed domain list.
#[derive(Debug, Clone, Default)]
pub struct StaticDiscovery {
    domains: HashSet<String>,
}

impl StaticDiscovery {
    pub fn new<I>(domains: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        Self {
            domains: domains
                .into_iter()
                .map(|domain| domain.trim().to_ascii_lowercase())
                .filter(|domain| !domain.is_empty())
                .collect(),
        }
    }
}

#[async_trait]
impl DomainDiscovery for StaticDiscovery {
    async fn discover(&self) -> Result<HashSet<String>, SearchError> {
        Ok(self.domains.clone())
    }
}

/// Discovery through one Custom Search query.
#[derive(Clone)]
pub struct SearchDiscovery {
    client: SearchClient,
    params: SearchParams,
}

impl SearchDiscovery {
    pub fn new(client: SearchClient, params: SearchParams) -> Self {
        Self { client, params }
    }
}

#[async_trait]
impl DomainDiscovery for SearchDiscovery {
    async fn discover(&self) -> Result<HashSet<String>, SearchError> {
        self.client.discover(&self.params).await
    }
}

/// Discovery source chosen by configuration.
pub enum ConfiguredDiscovery {
    Static(StaticDiscovery),
    Search(SearchDiscovery),
}

impl ConfiguredDiscovery {
    pub fn from_config(
        config: &DiscoveryConfig,
        http: reqwest::Client,
    ) -> Result<Self, url::ParseError> {
        match config {
            DiscoveryConfig::Static(domains) => Ok(Self::Static(StaticDiscovery::new(
                domains.iter().cloned(),
            ))),
            DiscoveryConfig::Search {
                api_key,
                engine_id,
                query,
                site,
                base_url,
            } => {
                let client = SearchClient::new(Url::parse(base_url)?, http);
                let params = SearchParams {
                    api_key: api_key.clone(),
                    engine_id: engine_id.clone(),
                    query: query.clone(),
                    site: site.clone(),
                };
                Ok(Self::Search(SearchDiscovery::new(client, params)))
            }
        }
    }

    pub fn source(&self) -> &'static str {
        match self {
            Self::Static(_) => "static",
            Self::Search(_) => "search",
        }
    }
}

#[async_trait]
impl DomainDiscovery for ConfiguredDiscovery {
    async fn discover(&self) -> Result<HashSet<String>, SearchError> {
        match self {
            Self::Static(discovery) => discovery.discover().await,
            Self::Search(discovery) => discovery.discover().await,
        }
    }
}

#[async_trait]
impl SnapshotFetcher for SnapshotClient {
    async fn fetch_snapshot(&self, domain: &str) -> Result<RawSnapshot, SnapshotError> {
        self.fetch(domain).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_discovery_normalizes_and_deduplicates() {
        let discovery = StaticDiscovery::new(
            ["Shop.Example", " shop.example ", "", "other.example"]
                .into_iter()
                .map(str::to_string),
        );

        let mut domains: Vec<_> = discovery.discover().await.expect("discover").into_iter().collect();
        domains.sort();
        assert_eq!(domains, vec!["other.example", "shop.example"]);
    }

    #[test]
    fn configured_discovery_follows_config() {
        let http = reqwest::Client::new();
        let static_source = ConfiguredDiscovery::from_config(
            &DiscoveryConfig::Static(vec!["shop.example".to_string()]),
            http.clone(),
        )
        .expect("static");
        assert_eq!(static_source.source(), "static");

        let search_source = ConfiguredDiscovery::from_config(
            &DiscoveryConfig::Search {
                api_key: "key".to_string(),
                engine_id: "cx".to_string(),
                query: "site:myshopify.com".to_string(),
                site: "myshopify.com".to_string(),
                base_url: "https://www.googleapis.com/customsearch/v1".to_string(),
            },
            http.clone(),
        )
        .expect("search");
        assert_eq!(search_source.source(), "search");

        let invalid = ConfiguredDiscovery::from_config(
            &DiscoveryConfig::Search {
                api_key: "key".to_string(),
                engine_id: "cx".to_string(),
                query: String::new(),
                site: String::new(),
                base_url: "not a url".to_string(),
            },
            http,
        );
        assert!(invalid.is_err());
    }
}
