mod clients;
mod config;
mod error;
mod helpers;
mod history;
mod models;
mod providers;
mod routes;
mod snapshot;
#[cfg(test)]
mod testing;

use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use clients::{ClientOptions, KubeConnector};
use config::{Cli, Command, Config, HistoryBackend, LogFormat, ProviderKind};
use error::{Error, Result};
use history::StatusHistory;
use history::document::DocumentHistory;
use history::gc::GarbageCollector;
use history::ring::RingBufferHistory;
use history::scheduler::SnapshotScheduler;
use history::sqlite::SqliteDocumentStore;
use providers::ClusterListProvider;
use providers::continuous_pipe::ContinuousPipeProvider;
use providers::in_memory::InMemoryClusterList;
use providers::within_k8s::WithinClusterProvider;
use snapshot::fetcher::SnapshotFetcher;

#[derive(Clone)]
pub struct AppState {
    pub fetcher: Arc<SnapshotFetcher>,
    pub clusters: Arc<dyn ClusterListProvider>,
    pub history: Arc<dyn StatusHistory>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.config.log_format);

    if let Err(e) = run(cli).await {
        error!(error = %e, "kube-status stopped");
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("kube_status=info,tower_http=info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

async fn run(cli: Cli) -> Result<()> {
    let command = cli.command.unwrap_or_default();
    let cfg = cli.config;
    cfg.validate()?;

    info!(
        ?command,
        provider = ?cfg.cluster_provider,
        history = ?cfg.history_storage_backend,
        "kube-status starting"
    );

    let clusters = cluster_provider(&cfg)?;
    let history = history_backend(&cfg).await?;
    let connector = Arc::new(KubeConnector::new(ClientOptions {
        timeout: cfg.call_timeout(),
        accept_invalid_certs: !cfg.verify_tls,
    }));
    let fetcher = Arc::new(SnapshotFetcher::new(
        connector,
        cfg.call_timeout(),
        cfg.fetch_timeout(),
    ));
    let scheduler = Arc::new(SnapshotScheduler::new(
        clusters.clone(),
        fetcher.clone(),
        history.clone(),
        cfg.snapshot_interval(),
    ));

    if command == Command::Snapshot {
        let report = scheduler.tick().await?;
        info!(saved = report.saved, failed = report.failed, "snapshot taken");
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(());
    let mut tasks = Vec::new();

    if command.records_history() {
        let rx = shutdown_rx.clone();
        let scheduler = scheduler.clone();
        tasks.push(tokio::spawn(async move { scheduler.run(rx).await }));

        if let Some(retention) = cfg.retention() {
            let gc = GarbageCollector::new(history.clone(), retention, cfg.gc_interval());
            let rx = shutdown_rx.clone();
            tasks.push(tokio::spawn(async move { gc.run(rx).await }));
        }
    }

    if command.serves_api() {
        let state = AppState {
            fetcher,
            clusters,
            history,
        };
        let router = routes::build_router(state, &cfg.static_dir);

        let listen_addr = cfg.listen_addr()?;
        let listener = TcpListener::bind(&listen_addr)
            .await
            .map_err(|e| Error::Config(format!("failed to bind {}: {}", listen_addr, e)))?;
        info!("kube-status listening on {}", listen_addr);

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                shutdown_signal().await;
                let _ = shutdown_tx.send(());
            })
            .await?;
    } else {
        shutdown_signal().await;
        let _ = shutdown_tx.send(());
    }

    for task in tasks {
        if let Err(e) = task.await {
            error!(error = %e, "background task panicked");
        }
    }
    info!("kube-status stopped");
    Ok(())
}

fn cluster_provider(cfg: &Config) -> Result<Arc<dyn ClusterListProvider>> {
    let provider: Arc<dyn ClusterListProvider> = match cfg.cluster_provider {
        ProviderKind::InMemory => {
            let list = match (&cfg.clusters_file, &cfg.cluster_list) {
                (Some(path), _) => InMemoryClusterList::load(path)?,
                (None, Some(json)) => InMemoryClusterList::from_json(json)?,
                (None, None) => {
                    return Err(Error::Config(
                        "the in-memory provider needs CLUSTER_LIST or --clusters-file".to_string(),
                    ));
                }
            };
            Arc::new(list)
        }
        ProviderKind::WithinK8s => Arc::new(WithinClusterProvider::from_env()?),
        ProviderKind::ContinuousPipe => Arc::new(ContinuousPipeProvider::new(
            &cfg.continuous_pipe_url,
            cfg.continuous_pipe_api_key.as_deref().unwrap_or_default(),
        )?),
    };
    Ok(provider)
}

async fn history_backend(cfg: &Config) -> Result<Arc<dyn StatusHistory>> {
    let history: Arc<dyn StatusHistory> = match cfg.history_storage_backend {
        HistoryBackend::InMemory => Arc::new(RingBufferHistory::new(cfg.history_capacity)),
        HistoryBackend::Sqlite => Arc::new(DocumentHistory::new(
            SqliteDocumentStore::connect(&cfg.database_url).await?,
        )),
    };
    Ok(history)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl+c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
