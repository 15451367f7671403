//! `fep-server`: the operator CLI and process entry point. Every invocation
//! builds a fresh [`Assembly`] and loads the configured channel/profile
//! document (§4.1) before running the requested subcommand; `serve` is the
//! only one that then blocks, keeping the hot-reload poller and the managed
//! connections alive until an operator signal arrives.
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use fep_core::configuration::{ConfigSource, FileConfigSource};
use fep_core::ids::ChannelId;
use fep_registry::StrictMode;
use fep_hosting::Assembly;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "fep-server", author, version, about = "Financial Exchange Processor operator CLI")]
struct Cli {
    /// Path to the channel/profile configuration document (JSON or YAML).
    #[arg(long, global = true, default_value = "fep.config.json")]
    config: PathBuf,

    /// Reject a malformed configuration document instead of keeping the
    /// last-known-good one (§4.1's `StrictMode`).
    #[arg(long, global = true)]
    strict: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load the configuration, reconcile connections, and run until a
    /// shutdown signal (SIGINT/Ctrl-C) arrives.
    Serve,
    /// List every channel id currently configured in the registry.
    List,
    /// Show connection status for one channel, or every channel if omitted.
    Status { channel_id: Option<String> },
    /// Print aggregate counts: active channels, connected, clients, servers.
    Summary,
    /// Bring up the connection for a configured channel id.
    Add { channel_id: String },
    /// Tear down the connection for a channel id.
    Remove { channel_id: String },
    /// Force a client-mode channel through close-then-reconnect.
    Reconnect { channel_id: String },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let strict = if cli.strict { StrictMode::Strict } else { StrictMode::Tolerant };
    let mut assembly = Assembly::build(strict);

    let source: Arc<dyn ConfigSource> = Arc::new(FileConfigSource::new(cli.config.clone()));
    if let Err(error) = assembly.load_and_watch_default(source) {
        error!(%error, path = %cli.config.display(), "failed to load configuration");
        return ExitCode::FAILURE;
    }

    match run(&cli.command, &mut assembly).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            error!("{message}");
            ExitCode::FAILURE
        }
    }
}

async fn run(command: &Commands, assembly: &mut Assembly) -> Result<(), String> {
    match command {
        Commands::Serve => {
            info!("fep-server running; press Ctrl-C to stop");
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
            assembly.shutdown().await;
            Ok(())
        }
        Commands::List => {
            for channel_id in assembly.registry.channel_ids() {
                println!("{channel_id}");
            }
            Ok(())
        }
        Commands::Status { channel_id } => {
            match channel_id {
                Some(id) => {
                    let id = ChannelId::new(id.clone());
                    match assembly.manager.status(&id) {
                        Some(status) => {
                            println!("{} connected={} peers={}", status.channel_id, status.connected, status.connected_peers);
                            Ok(())
                        }
                        None => Err(format!("channel {id} is not managed")),
                    }
                }
                None => {
                    for status in assembly.manager.all_statuses() {
                        println!("{} connected={} peers={}", status.channel_id, status.connected, status.connected_peers);
                    }
                    Ok(())
                }
            }
        }
        Commands::Summary => {
            println!("active channels: {}", assembly.registry.channel_ids().len());
            println!("managed connections: {}", assembly.manager.active_count());
            println!("connected: {}", assembly.manager.connected_count());
            println!("clients: {}", assembly.manager.client_ids().len());
            println!("servers: {}", assembly.manager.server_ids().len());
            Ok(())
        }
        Commands::Add { channel_id } => {
            let id = ChannelId::new(channel_id.clone());
            assembly.manager.add_connection(&id).await.map_err(|e| e.to_string())
        }
        Commands::Remove { channel_id } => {
            let id = ChannelId::new(channel_id.clone());
            if assembly.manager.remove_connection(&id).await {
                Ok(())
            } else {
                Err(format!("channel {id} was not managed"))
            }
        }
        Commands::Reconnect { channel_id } => {
            let id = ChannelId::new(channel_id.clone());
            assembly.manager.reconnect(&id).await.map_err(|e| e.to_string())
        }
    }
}
