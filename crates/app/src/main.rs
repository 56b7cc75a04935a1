mod collaborators;
mod pipeline;
mod telemetry;

use std::time::Duration;

use tracing::{error, info, info_span, Instrument};
use url::Url;
use uuid::Uuid;

use storescope_core::VisitWindow;
use storescope_remote::SnapshotClient;
use storescope_storage::{AnyStore, ClickHouseOptions, StoreOptions};
use storescope_util::{load_env_file, AppConfig};

use crate::{
    collaborators::ConfiguredDiscovery,
    pipeline::{EnrichmentOrchestrator, PipelineSettings},
};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    load_env_file();
    let config = AppConfig::from_env()?;

    telemetry::init_tracing(&config)?;
    let metrics = telemetry::init_metrics()?;

    let run_id = Uuid::new_v4();
    let window: VisitWindow = config.visit_months.parse()?;

    let http = reqwest::Client::builder()
        .gzip(true)
        .connect_timeout(CONNECT_TIMEOUT)
        .build()?;
    let discovery = ConfiguredDiscovery::from_config(&config.discovery, http.clone())?;
    let fetcher = SnapshotClient::new(Url::parse(&config.snapshot_base_url)?, http);

    let store = AnyStore::connect(
        &config.store_url,
        &StoreOptions {
            max_connections: config.workers.max(1) as u32,
            bootstrap: config.store_bootstrap,
            clickhouse: ClickHouseOptions {
                database: config.clickhouse_database.clone(),
                user: config.clickhouse_user.clone(),
                password: config.clickhouse_password.clone(),
            },
        },
    )
    .await?;

    let span = info_span!("run", run_id = %run_id);
    info!(
        parent: &span,
        stage = "app",
        env = %config.environment.as_str(),
        store = store.backend(),
        discovery = discovery.source(),
        workers = config.workers,
        "starting enrichment run"
    );

    let orchestrator = EnrichmentOrchestrator::new(
        discovery,
        fetcher,
        store.clone(),
        window,
        PipelineSettings {
            workers: config.workers,
            fetch_timeout: config.fetch_timeout,
        },
    );
    let result = orchestrator.run().instrument(span.clone()).await;
    store.close().await;

    if let Some(path) = &config.metrics_path {
        if let Err(err) = telemetry::write_metrics_snapshot(&metrics, path) {
            error!(parent: &span, stage = "telemetry", error = %err, "could not persist metrics");
        }
    }

    match result {
        Ok(summary) => {
            info!(parent: &span, stage = "app", %summary, "enrichment run finished");
            Ok(())
        }
        Err(err) => {
            match err.summary() {
                Some(summary) => {
                    error!(parent: &span, stage = "app", error = %err, %summary, "enrichment run aborted")
                }
                None => error!(parent: &span, stage = "app", error = %err, "enrichment run aborted"),
            }
            Err(err.into())
        }
    }
}
