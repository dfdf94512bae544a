//! shotdiff baseline server

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use shotdiff_server::{router, serve, AppState, BrowserKind, CiWatcher, PlaywrightLauncher, ServerConfig};

#[derive(Parser)]
#[command(name = "shotdiff-server")]
#[command(about = "shotdiff baseline server - snapshot store, diffing and screenshot capture")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Baseline directory
    #[arg(short, long)]
    snapshots: Option<PathBuf>,

    /// HTTP listen address
    #[arg(short, long)]
    listen: Option<String>,

    /// Browser engine for screenshots (chromium, firefox, webkit)
    #[arg(long)]
    browser: Option<String>,

    /// Wait for a CI runner's result and exit with its status
    #[arg(long)]
    ci: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    info!("shotdiff server v{}", shotdiff_common::VERSION);

    let mut config = match &cli.config {
        Some(path) => ServerConfig::from_file(path)?,
        None => ServerConfig::default(),
    }
    .apply_env();
    if let Some(snapshots) = cli.snapshots {
        config.snapshots_path = snapshots;
    }
    if let Some(listen) = cli.listen {
        config.listen = listen;
    }
    if let Some(browser) = cli.browser {
        config.browser = BrowserKind::parse(&browser)?;
    }

    tokio::fs::create_dir_all(&config.snapshots_path).await?;
    info!("Baselines stored in {}", config.snapshots_path.display());

    let launcher = Arc::new(PlaywrightLauncher::new(&config.node_binary, config.browser));
    let listener = tokio::net::TcpListener::bind(&config.listen).await?;

    if !cli.ci {
        let state = AppState::new(&config, launcher, CiWatcher::detached());
        serve(listener, router(state), async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Received shutdown signal");
        })
        .await?;
        return Ok(ExitCode::SUCCESS);
    }

    let (watcher, outcome_rx) = CiWatcher::channel();
    let state = AppState::new(&config, launcher, watcher);
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let ci_wait = tokio::spawn(async move {
        let outcome = tokio::select! {
            outcome = outcome_rx => outcome.ok(),
            _ = tokio::signal::ctrl_c() => None,
        };
        let _ = stop_tx.send(());
        outcome
    });

    info!("CI mode: waiting for the scenario runner on /ci");
    serve(listener, router(state), async {
        let _ = stop_rx.await;
    })
    .await?;

    match ci_wait.await? {
        Some(outcome) => Ok(ExitCode::from(outcome.exit_code())),
        None => {
            error!("CI run ended without a result");
            Ok(ExitCode::FAILURE)
        }
    }
}
