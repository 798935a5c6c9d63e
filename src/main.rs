//! Relwatch daemon: periodic release checks plus the HTTP gateway.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use relwatch_channels::channels_from_config;
use relwatch_core::RelwatchConfig;
use relwatch_core::traits::ReleaseSource;
use relwatch_core::types::RepoId;
use relwatch_engine::{DispatchOptions, Dispatcher, Scheduler};
use relwatch_gateway::AppState;
use relwatch_github::GithubClient;
use relwatch_store::StateStore;

#[derive(Parser)]
#[command(name = "relwatch", version, about = "Watch GitHub releases, notify Telegram and Discord")]
struct Cli {
    /// Config file path. Defaults to ~/.relwatch/config.toml.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the gateway bind host.
    #[arg(long)]
    host: Option<String>,

    /// Override the gateway bind port.
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "relwatch=info,tower_http=warn".into()),
        )
        .init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => RelwatchConfig::load_from(path)?,
        None => RelwatchConfig::load()?,
    };
    config.apply_env_overrides();
    if let Some(host) = cli.host {
        config.gateway.host = host;
    }
    if let Some(port) = cli.port {
        config.gateway.port = port;
    }

    let store = Arc::new(StateStore::open(&config.db_path())?);
    let source: Arc<dyn ReleaseSource> = Arc::new(GithubClient::new(
        Some(config.github.token.clone()),
        config.github.per_page,
    ));

    // Start tracking repositories listed in the config. Already-tracked
    // entries are a no-op; their markers carry over.
    for entry in &config.repositories {
        match RepoId::parse(entry) {
            Some(repo) => {
                if store.add_project(&repo)?.is_some() {
                    info!("📦 now tracking {repo}");
                }
            }
            None => warn!("ignoring invalid repository '{entry}' in config"),
        }
    }

    let dispatcher = Arc::new(Dispatcher::new(
        store.clone(),
        source.clone(),
        channels_from_config(&config),
        DispatchOptions {
            default_toggles: config.notifications.default,
            delivery_timeout: Duration::from_secs(config.delivery.timeout_secs),
            retry_once: config.delivery.retry_once,
        },
    ));

    // The first tick fires immediately, bootstrapping fresh projects without
    // notifying about their back catalog.
    let interval = Duration::from_secs(config.check_interval_mins.max(1) * 60);
    let scheduler = Arc::new(Scheduler::new(dispatcher.clone(), interval));
    let scheduler_task = tokio::spawn(scheduler.clone().run());

    let state = Arc::new(AppState {
        store,
        scheduler: scheduler.clone(),
        dispatcher,
        source,
        config,
    });

    tokio::select! {
        result = relwatch_gateway::serve(state) => {
            if let Err(e) = result {
                error!("gateway failed: {e}");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("received ctrl-c, shutting down");
        }
    }

    // Let an in-flight cycle finish before exiting.
    scheduler.shutdown();
    scheduler_task.await.ok();
    Ok(())
}
