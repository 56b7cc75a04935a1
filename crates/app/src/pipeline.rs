use std::{
    collections::HashSet,
    fmt,
    sync::atomic::{AtomicBool, Ordering},
    time::{Duration, Instant},
};

use async_trait::async_trait;
use futures::{stream, StreamExt};
use metrics::{counter, histogram};
use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use storescope_core::{
    ParseError, RawSnapshot, RecordTransformer, SnapshotParser, Table, VisitWindow,
};
use storescope_remote::{SearchError, SnapshotError};
use storescope_storage::{LoadReport, StoreError, TableLoader, TableStore};

/// Source of candidate storefront hostnames.
#[async_trait]
pub trait DomainDiscovery: Send + Sync {
    async fn discover(&self) -> Result<HashSet<String>, SearchError>;
}

/// Source of raw analytics documents.
#[async_trait]
pub trait SnapshotFetcher: Send + Sync {
    async fn fetch_snapshot(&self, domain: &str) -> Result<RawSnapshot, SnapshotError>;
}

/// Tuning knobs for a pipeline run.
#[derive(Debug, Clone, Copy)]
pub struct PipelineSettings {
    /// Maximum number of domains in flight at once.
    pub workers: usize,
    pub fetch_timeout: Duration,
}

/// Progress of one domain through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainState {
    Pending,
    Fetched,
    Parsed,
    Transformed,
    Loaded,
    Failed(Stage),
}

/// Pipeline step that can fail for a domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fetch,
    Parse,
    Load,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fetch => "fetch",
            Self::Parse => "parse",
            Self::Load => "load",
        }
    }
}

/// Errors that end processing for a single domain.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("snapshot unavailable: {0}")]
    FetchUnavailable(String),
    #[error(transparent)]
    InvalidSnapshot(#[from] ParseError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl DomainError {
    pub fn stage(&self) -> Stage {
        match self {
            Self::FetchUnavailable(_) => Stage::Fetch,
            Self::InvalidSnapshot(_) => Stage::Parse,
            Self::Store(_) => Stage::Load,
        }
    }
}

/// Final result for one domain.
#[derive(Debug)]
pub enum DomainOutcome {
    Loaded(LoadReport),
    Failed { stage: Stage, error: DomainError },
    /// The run was halted before this domain started.
    NotStarted,
}

/// Counts reported at the end of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub discovered: usize,
    pub loaded: usize,
    pub skipped_unavailable: usize,
    pub skipped_invalid: usize,
    pub failed: usize,
    pub not_started: usize,
    pub rows: LoadReport,
}

impl RunSummary {
    pub fn skipped(&self) -> usize {
        self.skipped_unavailable + self.skipped_invalid
    }

    /// Domains that went through the pipeline, whatever the outcome.
    pub fn processed(&self) -> usize {
        self.loaded + self.skipped() + self.failed
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "discovered={} processed={} loaded={} skipped={} (unavailable={}, invalid={}) failed={} not_started={} rows:",
            self.discovered,
            self.processed(),
            self.loaded,
            self.skipped(),
            self.skipped_unavailable,
            self.skipped_invalid,
            self.failed,
            self.not_started,
        )?;
        for table in Table::ALL {
            write!(f, " {}={}", table, self.rows.rows(table))?;
        }
        Ok(())
    }
}

/// Errors that terminate a whole run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("domain discovery failed: {0}")]
    Discovery(#[from] SearchError),
    #[error("store schema does not match the pipeline: {source}")]
    SchemaMismatch {
        source: StoreError,
        summary: RunSummary,
    },
    #[error("store unavailable: {source}")]
    StoreUnavailable {
        source: StoreError,
        summary: RunSummary,
    },
}

impl RunError {
    fn from_store(source: StoreError, summary: RunSummary) -> Self {
        match source {
            StoreError::SchemaMismatch { .. } => Self::SchemaMismatch { source, summary },
            _ => Self::StoreUnavailable { source, summary },
        }
    }

    /// Counts gathered before the run was aborted.
    pub fn summary(&self) -> Option<&RunSummary> {
        match self {
            Self::Discovery(_) => None,
            Self::SchemaMismatch { summary, .. } | Self::StoreUnavailable { summary, .. } => {
                Some(summary)
            }
        }
    }
}

/// Drives discovery, fetch, parse, transform and load for every domain.
///
/// Domains are independent: a failure for one domain is counted and the run
/// moves on. Only store-level failures stop the run, and even then domains
/// already in flight are allowed to finish.
pub struct EnrichmentOrchestrator<D, F, S> {
    discovery: D,
    fetcher: F,
    loader: TableLoader<S>,
    transformer: RecordTransformer,
    settings: PipelineSettings,
    halted: AtomicBool,
}

impl<D, F, S> EnrichmentOrchestrator<D, F, S>
where
    D: DomainDiscovery,
    F: SnapshotFetcher,
    S: TableStore,
{
    pub fn new(
        discovery: D,
        fetcher: F,
        store: S,
        window: VisitWindow,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            discovery,
            fetcher,
            loader: TableLoader::new(store, &window),
            transformer: RecordTransformer::new(window),
            settings,
            halted: AtomicBool::new(false),
        }
    }

    pub async fn run(&self) -> Result<RunSummary, RunError> {
        self.halted.store(false, Ordering::SeqCst);
        let domains = self.discovery.discover().await?;
        let mut summary = RunSummary {
            discovered: domains.len(),
            ..RunSummary::default()
        };
        info!(stage = "discovery", count = domains.len(), "domains discovered");
        if domains.is_empty() {
            return Ok(summary);
        }

        if let Err(err) = self.loader.verify_schema().await {
            error!(stage = "load", error = %err, "store schema check failed");
            return Err(RunError::from_store(err, summary));
        }

        let mut fatal: Option<StoreError> = None;
        let mut outcomes = stream::iter(domains)
            .map(move |domain| async move {
                let outcome = self.process_domain(&domain).await;
                (domain, outcome)
            })
            .buffer_unordered(self.settings.workers.max(1));

        while let Some((domain, outcome)) = outcomes.next().await {
            match outcome {
                DomainOutcome::Loaded(report) => {
                    counter!("enrich_domains_total", "outcome" => "loaded").increment(1);
                    for table in Table::ALL {
                        counter!("enrich_rows_written_total", "table" => table.as_str())
                            .increment(report.rows(table) as u64);
                    }
                    info!(stage = "load", domain = %domain, rows = report.total(), "domain loaded");
                    summary.loaded += 1;
                    summary.rows.merge(&report);
                }
                DomainOutcome::Failed { stage, error } => match error {
                    DomainError::FetchUnavailable(reason) => {
                        counter!("enrich_domains_total", "outcome" => "unavailable").increment(1);
                        warn!(stage = stage.as_str(), domain = %domain, reason = %reason, "no snapshot available; skipping domain");
                        summary.skipped_unavailable += 1;
                    }
                    DomainError::InvalidSnapshot(err) => {
                        counter!("enrich_domains_total", "outcome" => "invalid").increment(1);
                        warn!(stage = stage.as_str(), domain = %domain, error = %err, "invalid snapshot; skipping domain");
                        summary.skipped_invalid += 1;
                    }
                    DomainError::Store(err) => {
                        counter!("enrich_domains_total", "outcome" => "failed").increment(1);
                        error!(stage = stage.as_str(), domain = %domain, error = %err, "loading domain failed");
                        summary.failed += 1;
                        if err.is_fatal() {
                            self.halted.store(true, Ordering::SeqCst);
                            fatal.get_or_insert(err);
                        }
                    }
                },
                DomainOutcome::NotStarted => {
                    counter!("enrich_domains_total", "outcome" => "not_started").increment(1);
                    summary.not_started += 1;
                }
            }
        }

        if let Some(source) = fatal {
            return Err(RunError::from_store(source, summary));
        }
        Ok(summary)
    }

    async fn process_domain(&self, domain: &str) -> DomainOutcome {
        if self.halted.load(Ordering::SeqCst) {
            return DomainOutcome::NotStarted;
        }

        match self.enrich(domain).await {
            Ok(report) => DomainOutcome::Loaded(report),
            Err(error) => {
                let stage = error.stage();
                log_state(domain, DomainState::Failed(stage));
                DomainOutcome::Failed { stage, error }
            }
        }
    }

    async fn enrich(&self, domain: &str) -> Result<LoadReport, DomainError> {
        log_state(domain, DomainState::Pending);

        let started = Instant::now();
        let raw = match timeout(self.settings.fetch_timeout, self.fetcher.fetch_snapshot(domain)).await
        {
            Ok(Ok(raw)) => raw,
            Ok(Err(err)) => return Err(DomainError::FetchUnavailable(err.to_string())),
            Err(_) => {
                return Err(DomainError::FetchUnavailable(format!(
                    "timed out after {:?}",
                    self.settings.fetch_timeout
                )))
            }
        };
        histogram!("enrich_fetch_seconds").record(started.elapsed().as_secs_f64());
        log_state(domain, DomainState::Fetched);

        let snapshot = SnapshotParser::parse(&raw)?;
        log_state(domain, DomainState::Parsed);

        let batch = self.transformer.transform(&snapshot);
        log_state(domain, DomainState::Transformed);

        let report = self.loader.load_batch(&batch).await?;
        log_state(domain, DomainState::Loaded);
        Ok(report)
    }
}

fn log_state(domain: &str, state: DomainState) {
    debug!(stage = "pipeline", domain = %domain, state = ?state, "domain state changed");
}
