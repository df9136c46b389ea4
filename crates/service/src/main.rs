//! Entry point for the embserve daemon.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use core_types::config::load_or_create_config;
use service::{init_tracing_with_config, run_app};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Debug, Parser)]
#[command(name = "embserve", version, about = "Serve entity embeddings and relation predictions")]
struct Args {
    /// Config file (defaults to $EMBSERVE_CONFIG or config/embserve.toml).
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Override server.bind_addr.
    #[arg(long)]
    bind: Option<String>,

    /// Override embeddings.snapshot.
    #[arg(long)]
    snapshot: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let mut cfg = load_or_create_config(args.config.as_deref())?;
    if let Some(bind) = args.bind {
        cfg.server.bind_addr = bind;
    }
    if let Some(snapshot) = args.snapshot {
        cfg.embeddings.snapshot = snapshot.to_string_lossy().into_owned();
    }
    cfg.validate()?;

    let _guard = init_tracing_with_config(&cfg.logging)?;
    tracing::info!(app = %cfg.app.name, bind = %cfg.server.bind_addr, "starting");

    run_app(&cfg, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    })
    .await?;

    tracing::info!("stopped");
    Ok(())
}
