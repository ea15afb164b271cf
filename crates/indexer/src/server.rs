//! Process wiring: config → stores → event log → worker, plus the HTTP server.

use std::str::FromStr;
use std::sync::Arc;

use anyhow::Context;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{error, info};

use pkgmg_infra::config::IndexerConfig;
use pkgmg_infra::event_log::JsonLinesEventSource;
use pkgmg_infra::projections::{RegistryProjection, rebuild_from_source};
use pkgmg_infra::workers::{ProjectionWorker, WorkerOptions};
use pkgmg_registry::RegistryEvent;

use crate::app::{self, AppServices, Stores};

/// Cursor key of the registry projection.
pub const PROJECTION_NAME: &str = "registry";

/// What the binary was asked to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Index the event log and serve queries.
    #[default]
    Serve,
    /// Clear the read model, replay the whole log, and exit.
    Rebuild,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown mode {0:?} (expected \"serve\" or \"rebuild\")")]
pub struct UnknownMode(String);

impl FromStr for Mode {
    type Err = UnknownMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "serve" => Ok(Mode::Serve),
            "rebuild" => Ok(Mode::Rebuild),
            other => Err(UnknownMode(other.to_string())),
        }
    }
}

impl Mode {
    /// Parse the first CLI argument; no argument means `serve`.
    pub fn from_args(mut args: impl Iterator<Item = String>) -> Result<Self, UnknownMode> {
        match args.next() {
            Some(arg) => arg.parse(),
            None => Ok(Mode::default()),
        }
    }
}

pub async fn run(mode: Mode, config: IndexerConfig) -> anyhow::Result<()> {
    info!(
        mode = ?mode,
        network = %config.network,
        contract = ?config.contract_address.as_ref().map(|a| a.to_string()),
        event_log = %config.event_log.display(),
        start_block = config.start_block,
        "starting indexer"
    );

    let stores = Stores::build(&config.persistence)
        .await
        .context("failed to initialise stores")?;

    match mode {
        Mode::Serve => serve(config, stores).await,
        Mode::Rebuild => rebuild(config, stores).await,
    }
}

/// Replay the whole event log into an empty read model.
pub async fn rebuild(config: IndexerConfig, stores: Stores) -> anyhow::Result<()> {
    let mut source = JsonLinesEventSource::<_, RegistryEvent>::open(&config.event_log)
        .await
        .with_context(|| format!("failed to open {}", config.event_log.display()))?;

    let report = rebuild_from_source(
        &mut source,
        stores.entities.clone(),
        stores.cursors.as_ref(),
        PROJECTION_NAME,
        config.start_block,
    )
    .await
    .context("rebuild failed")?;

    info!(
        total_events = report.total_events,
        replayed_events = report.replayed_events,
        block_number = report.cursor.block_number(),
        "read model rebuilt"
    );
    Ok(())
}

/// Index the event log in the background and serve queries until a shutdown
/// signal arrives or the worker fails.
pub async fn serve(config: IndexerConfig, stores: Stores) -> anyhow::Result<()> {
    let source = JsonLinesEventSource::<_, RegistryEvent>::open(&config.event_log)
        .await
        .with_context(|| format!("failed to open {}", config.event_log.display()))?;

    let listener = tokio::net::TcpListener::bind(config.http_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.http_addr))?;
    info!("listening on {}", listener.local_addr()?);

    let router = app::build_app(Arc::new(AppServices::new(stores.entities.clone())));
    let (stop_server, mut server_stopped) = watch::channel(false);
    let server = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = server_stopped.changed().await;
            })
            .await
    });

    let worker = ProjectionWorker::spawn(
        WorkerOptions {
            projection_name: PROJECTION_NAME.to_string(),
            start_block: config.start_block,
            retry: config.retry.clone(),
        },
        source,
        RegistryProjection::new(stores.entities.clone()),
        stores.cursors.clone(),
    );
    let stop_worker = worker.shutdown_trigger();
    let worker_done = worker.join();
    tokio::pin!(worker_done);

    let signal = shutdown_signal();
    tokio::pin!(signal);

    let mut interrupted = false;
    let worker_result = tokio::select! {
        result = &mut worker_done => result,
        _ = &mut signal => {
            interrupted = true;
            info!("shutdown signal received");
            stop_worker.trigger();
            (&mut worker_done).await
        }
    };

    match worker_result {
        Ok(report) => {
            info!(
                applied = report.applied,
                skipped = report.skipped,
                below_start_block = report.below_start_block,
                block_number = report.cursor.block_number(),
                "indexing finished"
            );
            if !interrupted {
                signal.await;
                info!("shutdown signal received");
            }
        }
        Err(e) => {
            error!(error = %e, "indexing stopped on error");
            let _ = stop_server.send(true);
            let _ = server.await;
            return Err(e).context("projection worker failed");
        }
    }

    let _ = stop_server.send(true);
    server
        .await
        .context("http server task failed")?
        .context("http server failed")?;
    info!("indexer stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
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
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use pkgmg_core::PackageName;
    use pkgmg_infra::config::{self, Persistence};
    use pkgmg_infra::projections::CursorStore;
    use pkgmg_infra::read_model::EntityStore;

    use super::*;

    fn args(list: &[&str]) -> impl Iterator<Item = String> {
        list.iter().map(|s| s.to_string()).collect::<Vec<_>>().into_iter()
    }

    #[test]
    fn mode_defaults_to_serve() {
        assert_eq!(Mode::from_args(args(&[])), Ok(Mode::Serve));
        assert_eq!(Mode::from_args(args(&["rebuild"])), Ok(Mode::Rebuild));
        assert_eq!(
            Mode::from_args(args(&["migrate"])),
            Err(UnknownMode("migrate".to_string()))
        );
    }

    #[tokio::test]
    async fn rebuild_mode_projects_log_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{"blockNumber":3,"logIndex":0,"event":{{"type":"PackageCreated","owner":"0x89205a3a3b2a69de6dbf7f01ed13b2108b2c43e7","pkgName":"GenisPackage"}}}}"#
        )
        .unwrap();
        file.flush().unwrap();

        let path = file.path().display().to_string();
        let cfg = IndexerConfig::from_lookup(|key| (key == config::EVENT_LOG).then(|| path.clone())).unwrap();
        assert_eq!(cfg.persistence, Persistence::InMemory);
        let stores = Stores::in_memory();

        rebuild(cfg, stores.clone()).await.unwrap();

        assert!(
            stores
                .entities
                .get_package(&PackageName::from("GenisPackage"))
                .await
                .unwrap()
                .is_some()
        );
        let cursor = stores.cursors.load(PROJECTION_NAME).await.unwrap().unwrap();
        assert_eq!(cursor.block_number(), 3);
    }
}
