use anyhow::Context;

use pkgmg_indexer::server::{self, Mode};
use pkgmg_infra::config::IndexerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    pkgmg_observability::init();

    let result = try_main().await;
    if let Err(e) = &result {
        tracing::error!(error = %format!("{e:#}"), "indexer exited with error");
    }
    result
}

async fn try_main() -> anyhow::Result<()> {
    let mode = Mode::from_args(std::env::args().skip(1))?;
    let config = IndexerConfig::from_env().context("invalid configuration")?;
    server::run(mode, config).await
}
