//! Bundle loader daemon
//!
//! Usage:
//!   bundle-loader [--config <file>] [--plugins-dir <dir>] [--property key=value]... [--once]

use anyhow::{anyhow, Context};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

use bundle_loader::config::{ListenerMode, LoaderConfig, LoggingConfig, PLUGINS_DIR_PROPERTY};
use bundle_loader::module::{EventListener, Host, LifecycleCoordinator, LocalHost, RescanQueue};
use bundle_loader::utils::{init_logging_from_config, wait_for_shutdown_signal};

#[derive(Parser, Debug)]
#[command(name = "bundle-loader", version, about)]
struct Args {
    /// Configuration file (TOML, or JSON by extension)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Plugin directory; shorthand for --property loader.plugins.dir=<dir>
    #[arg(long)]
    plugins_dir: Option<PathBuf>,

    /// Framework property handed to the host (repeatable)
    #[arg(long = "property", value_name = "KEY=VALUE", value_parser = parse_property)]
    properties: Vec<(String, String)>,

    /// Log filter, e.g. "debug" or "bundle_loader::module=trace"
    #[arg(long)]
    log_filter: Option<String>,

    /// Run a single pass, print its report and exit
    #[arg(long)]
    once: bool,
}

fn parse_property(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got '{}'", raw)),
    }
}

/// Plugin directory as a property value; non-UTF-8 paths are refused
fn plugins_dir_property(dir: PathBuf) -> anyhow::Result<String> {
    dir.into_os_string()
        .into_string()
        .map_err(|raw| anyhow!("--plugins-dir {:?} is not valid UTF-8", raw))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => LoaderConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => LoaderConfig::default(),
    };

    if let Some(filter) = args.log_filter.clone() {
        config.logging.get_or_insert_with(LoggingConfig::default).filter = Some(filter);
    }
    init_logging_from_config(config.logging.as_ref());

    let mut host = LocalHost::new().context("failed to start module host")?;
    for (key, value) in args.properties {
        host = host.with_property(key, value);
    }
    if let Some(dir) = args.plugins_dir {
        host = host.with_property(PLUGINS_DIR_PROPERTY, plugins_dir_property(dir)?);
    }
    let host = Arc::new(host);

    config.apply_overrides(host.as_ref());
    config.validate()?;
    info!(
        "Bundle loader starting (plugins_dir={}, strategy={:?}, listener={:?})",
        config.plugins_dir, config.resolve_strategy, config.listener_mode
    );

    let coordinator = Arc::new(LifecycleCoordinator::new(
        Arc::clone(&host) as Arc<dyn Host>,
        &config,
    ));

    let initial = {
        let coordinator = Arc::clone(&coordinator);
        tokio::task::spawn_blocking(move || coordinator.run())
            .await
            .map_err(|e| anyhow!("initial pass aborted: {}", e))?
    };

    if args.once {
        println!("{}", serde_json::to_string_pretty(&initial)?);
        drop(coordinator);
        stop_host(host).await;
        return Ok(());
    }

    let (listener, worker) = match config.listener_mode {
        ListenerMode::Inline => (EventListener::attach_inline(&coordinator), None),
        ListenerMode::Queued => {
            let (queue, worker) = RescanQueue::spawn(Arc::clone(&coordinator));
            (EventListener::attach_queued(&coordinator, queue), Some(worker))
        }
    };

    wait_for_shutdown_signal().await;

    listener.detach();
    drop(listener);
    stop_host(Arc::clone(&host)).await;

    // Every queue handle lived in the listener callback; the worker ends
    // once the in-flight pass (if any) finishes.
    if let Some(worker) = worker {
        if let Err(e) = worker.await {
            error!("Rescan worker failed: {}", e);
        }
    }

    info!("Bundle loader stopped");
    Ok(())
}

async fn stop_host(host: Arc<LocalHost>) {
    if let Err(e) = tokio::task::spawn_blocking(move || host.shutdown()).await {
        error!("Host shutdown failed: {}", e);
    }
}
