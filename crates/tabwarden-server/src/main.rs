//! Tabwarden — duplicate tab closer with a synced settings mirror.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

mod cli;
mod relay;
mod routes;
mod state;

use relay::RelayHost;
use state::{AppState, Storage};
use tabwarden_core::ServiceConfig;

fn resolve_data_dir() -> PathBuf {
    std::env::var("TABWARDEN_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("data"))
}

fn print_help() {
    println!("Tabwarden — closes duplicate tabs, mirrors settings across devices");
    println!();
    println!("Usage: tabwarden [command]");
    println!();
    println!("Commands:");
    println!("  serve                    Start the relay server (default)");
    println!("  export [file]            Write settings to a JSON file");
    println!("  import <file>            Replace settings with a JSON file");
    println!("  push                     Push settings to the remote mirror");
    println!("  pull [--force]           Pull settings from the remote mirror");
    println!("  sync-now                 Push, then adopt the mirror's copy");
    println!("  scan <tabs.json>         Print the tabs a scan would close");
    println!("  help                     Show this help message");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(String::as_str).unwrap_or("serve");

    if matches!(command, "--help" | "-h" | "help") {
        print_help();
        return Ok(());
    }

    let data_dir = resolve_data_dir();
    info!("Data directory: {}", data_dir.display());
    let config = ServiceConfig::from_env(&data_dir)?;

    let result = match command {
        "serve" => serve(config).await,
        "export" => cli::export(&config, args.get(2).map(PathBuf::from)).await,
        "import" => match args.get(2) {
            Some(file) => cli::import(&config, &PathBuf::from(file)).await,
            None => usage("tabwarden import <file>"),
        },
        "push" => cli::push(&config).await,
        "pull" => {
            let force = args.iter().skip(2).any(|a| a == "--force");
            cli::pull(&config, force).await
        }
        "sync-now" => cli::sync_now(&config).await,
        "scan" => match args.get(2) {
            Some(file) => cli::scan(&config, &PathBuf::from(file)).await,
            None => usage("tabwarden scan <tabs.json>"),
        },
        other => {
            eprintln!("Unknown command: {}. Use 'tabwarden help' for usage.", other);
            std::process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
    Ok(())
}

fn usage(line: &str) -> anyhow::Result<()> {
    anyhow::bail!("Usage: {}", line)
}

async fn serve(config: ServiceConfig) -> anyhow::Result<()> {
    let port = config.port;

    let storage = Storage::open(&config)?;
    let _remote_poller = storage.spawn_remote_poller(&config);
    let _local_poller = storage.spawn_local_poller(&config);

    let relay = Arc::new(RelayHost::new());
    let state = Arc::new(AppState::new(storage.bridge.clone(), relay));

    // Load settings and schedule the start scan, then follow the mirror
    state
        .engine
        .start()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to start engine: {}", e))?;
    let _mirror = state.bridge.start_mirror();

    let app = routes::build_router(state.clone());

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Tabwarden relay listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
