mod cli;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use cli::{Cli, Commands};
use tracing_subscriber::EnvFilter;

use dtg_common::ItemId;
use hls_dtg::aggregator::{Aggregator, ItemEvent};
use hls_dtg::config::{self, Config};
use hls_dtg::manager::Manager;
use hls_dtg::selector::DeviceCapabilities;
use hls_dtg::server::start_playback_server;
use hls_dtg::worker::{WorkerConfig, WorkerPool};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "hls_dtg=trace,tower_http=debug".to_string()
        } else {
            "hls_dtg=info,tower_http=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&env_filter))
        .init();

    let config = config::load_config_or_default(cli.config.as_deref())?;

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(config, cli.command))
}

async fn run(config: Config, command: Commands) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::Add {
            item_id,
            master_url,
            hardware_hevc,
            software_hevc_permitted,
            ac3,
            eac3,
        } => {
            let manager = build_manager(&config)?;
            let device = DeviceCapabilities {
                hardware_hevc,
                software_hevc_permitted,
                ac3,
                eac3,
            };
            let item_id = ItemId::new(item_id);
            manager.add_item(&item_id, &master_url, &device).await?;
            println!("added {item_id}");
            Ok(())
        }
        Commands::Start { item_id } => cmd_start(config, item_id).await,
        Commands::Pause { item_id } => {
            let manager = build_manager(&config)?;
            manager.pause_item(&ItemId::new(item_id))?;
            Ok(())
        }
        Commands::Cancel { item_id } => {
            let manager = build_manager(&config)?;
            manager.cancel_item(&ItemId::new(item_id))?;
            Ok(())
        }
        Commands::Remove { item_id } => {
            let manager = build_manager(&config)?;
            manager.remove_item(&ItemId::new(item_id)).await?;
            Ok(())
        }
        Commands::List => {
            let manager = build_manager(&config)?;
            for item in manager.list_items()? {
                println!(
                    "{}\t{}\t{} bytes",
                    item.id, item.state, item.estimated_size_bytes
                );
            }
            Ok(())
        }
        Commands::Serve { host, port } => {
            let host = host.unwrap_or(config.server.host.clone());
            let port = port.unwrap_or(config.server.port);
            let handle = start_playback_server(&host, port, config.downloads.items_root.clone())
                .await?;
            println!("serving {} on {}", config.downloads.items_root.display(), handle.local_addr);
            tokio::signal::ctrl_c().await?;
            handle.shutdown();
            Ok(())
        }
        Commands::Version => {
            println!("hls-dtg {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// `start` keeps the process alive until the item reaches a terminal or
/// paused state, or until the operator hits Ctrl+C, in which case the item
/// is paused gracefully before the process exits (spec.md §3 "survives
/// process restarts").
async fn cmd_start(config: Config, item_id: String) -> Result<(), Box<dyn std::error::Error>> {
    let manager = build_manager(&config)?;
    let aggregator = manager.aggregator();
    let item_id = ItemId::new(item_id);

    let mut events = aggregator.subscribe();
    manager.start_item(&item_id)?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!(%item_id, "ctrl+c received, pausing");
                manager.pause_item(&item_id)?;
            }
            event = events.recv() => {
                match event {
                    Ok(ItemEvent::StateChanged { item_id: ref id, state, .. }) if id == &item_id => {
                        if state.is_terminal() || state.can_start() {
                            println!("{item_id} {state}");
                            break;
                        }
                    }
                    Ok(_) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    Ok(())
}

fn build_manager(config: &Config) -> Result<Manager, Box<dyn std::error::Error>> {
    let db_path = config
        .downloads
        .db_path
        .to_str()
        .ok_or("db_path is not valid UTF-8")?;
    std::fs::create_dir_all(&config.downloads.items_root)?;
    if let Some(parent) = config.downloads.db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let pool = dtg_db::pool::init_pool(db_path)?;
    let aggregator = Aggregator::new(pool.clone());
    let worker_config = WorkerConfig::from(&config.worker);
    let workers = WorkerPool::new(pool.clone(), Arc::clone(&aggregator), worker_config);

    Ok(Manager::new(
        pool,
        aggregator,
        workers,
        config.downloads.items_root.clone(),
        Duration::from_secs(config.worker.metadata_timeout_secs),
        config.selection.clone(),
    ))
}
