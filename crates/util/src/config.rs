use std::{env, fmt, path::PathBuf, time::Duration};

use crate::DEFAULT_STORE_URL;

const DEFAULT_SEARCH_QUERY: &str = "site:myshopify.com -inurl:/";
const DEFAULT_SEARCH_SITE: &str = "myshopify.com";
const DEFAULT_SEARCH_BASE_URL: &str = "https://www.googleapis.com/customsearch/v1";
const DEFAULT_SNAPSHOT_BASE_URL: &str = "https://data.similarweb.com/api/v1/";
const DEFAULT_VISIT_MONTHS: &str = "2024-08,2024-09,2024-10";
const DEFAULT_WORKERS: u64 = 8;
const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;

/// Application runtime environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
    Test,
}

impl Environment {
    fn from_str(value: &str) -> Result<Self, ConfigError> {
        match value {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            "test" => Ok(Self::Test),
            other => Err(ConfigError::InvalidEnvironment(other.to_string())),
        }
    }

    /// Returns the canonical name used for logging/metrics labels.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Test => "test",
        }
    }
}

/// Where candidate domains come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryConfig {
    /// Fixed list taken from `ENRICH_DOMAINS`.
    Static(Vec<String>),
    /// Custom Search API query.
    Search {
        api_key: String,
        engine_id: String,
        query: String,
        site: String,
        base_url: String,
    },
}

/// Runtime configuration resolved from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: Environment,
    pub store_url: String,
    pub store_bootstrap: bool,
    pub clickhouse_database: String,
    pub clickhouse_user: String,
    pub clickhouse_password: String,
    pub discovery: DiscoveryConfig,
    pub snapshot_base_url: String,
    pub workers: usize,
    pub fetch_timeout: Duration,
    /// Raw `YYYY-MM,YYYY-MM,YYYY-MM` value; validated by the pipeline.
    pub visit_months: String,
    pub metrics_path: Option<PathBuf>,
}

impl AppConfig {
    /// Constructs the configuration by reading and validating environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let env_value = env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());
        let environment = Environment::from_str(&env_value)?;

        let workers = positive_number("ENRICH_WORKERS", DEFAULT_WORKERS)?;
        let fetch_timeout = positive_number("FETCH_TIMEOUT_SECS", DEFAULT_FETCH_TIMEOUT_SECS)?;

        Ok(Self {
            environment,
            store_url: var_or("STORE_URL", DEFAULT_STORE_URL),
            store_bootstrap: flag("STORE_BOOTSTRAP")?,
            clickhouse_database: var_or("CLICKHOUSE_DATABASE", "default"),
            clickhouse_user: var_or("CLICKHOUSE_USER", "default"),
            clickhouse_password: var_or("CLICKHOUSE_PASSWORD", ""),
            discovery: discovery_from_env()?,
            snapshot_base_url: var_or("SNAPSHOT_BASE_URL", DEFAULT_SNAPSHOT_BASE_URL),
            workers: workers as usize,
            fetch_timeout: Duration::from_secs(fetch_timeout),
            visit_months: var_or("VISIT_MONTHS", DEFAULT_VISIT_MONTHS),
            metrics_path: non_empty_var("METRICS_PATH").map(PathBuf::from),
        })
    }
}

fn discovery_from_env() -> Result<DiscoveryConfig, ConfigError> {
    if let Some(list) = non_empty_var("ENRICH_DOMAINS") {
        let domains: Vec<String> = list
            .split(',')
            .map(str::trim)
            .filter(|domain| !domain.is_empty())
            .map(str::to_string)
            .collect();
        if domains.is_empty() {
            return Err(ConfigError::MissingDiscovery);
        }
        return Ok(DiscoveryConfig::Static(domains));
    }

    match (
        non_empty_var("GOOGLE_CSE_API_KEY"),
        non_empty_var("GOOGLE_CSE_ID"),
    ) {
        (Some(api_key), Some(engine_id)) => Ok(DiscoveryConfig::Search {
            api_key,
            engine_id,
            query: var_or("SEARCH_QUERY", DEFAULT_SEARCH_QUERY),
            site: var_or("SEARCH_SITE", DEFAULT_SEARCH_SITE),
            base_url: var_or("SEARCH_BASE_URL", DEFAULT_SEARCH_BASE_URL),
        }),
        _ => Err(ConfigError::MissingDiscovery),
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn flag(name: &'static str) -> Result<bool, ConfigError> {
    match non_empty_var(name).as_deref() {
        None => Ok(false),
        Some("1" | "true" | "yes") => Ok(true),
        Some("0" | "false" | "no") => Ok(false),
        Some(other) => Err(ConfigError::InvalidValue {
            name,
            value: other.to_string(),
        }),
    }
}

fn positive_number(name: &'static str, default: u64) -> Result<u64, ConfigError> {
    let Some(raw) = non_empty_var(name) else {
        return Ok(default);
    };
    match raw.parse::<u64>() {
        Ok(value) if value > 0 => Ok(value),
        _ => Err(ConfigError::InvalidValue { name, value: raw }),
    }
}

/// Errors that can occur during configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    InvalidEnvironment(String),
    InvalidValue { name: &'static str, value: String },
    MissingDiscovery,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidEnvironment(value) => write!(
                f,
                "APP_ENV must be one of 'development', 'production', or 'test' (got {value})"
            ),
            Self::InvalidValue { name, value } => write!(f, "invalid {name} value: {value}"),
            Self::MissingDiscovery => write!(
                f,
                "set ENRICH_DOMAINS or both GOOGLE_CSE_API_KEY and GOOGLE_CSE_ID"
            ),
        }
    }
}

impl std::error::Error for ConfigError {}
