use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tracing::{info, Level};

use gatekeeper::auth::{permission, Identity, MemoryDirectory, Role};
use gatekeeper::config::GatekeeperConfig;
use gatekeeper::http::GateServer;

#[derive(Parser, Debug)]
#[command(name = "gatekeeper", about = "Request gate for CRUD APIs")]
struct Args {
    /// Path to a YAML configuration file
    #[arg(long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .init();

    info!("Starting Gatekeeper");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let args = Args::parse();

    // Invalid configuration halts startup; nothing is served with a
    // broken quota table or a missing signing secret.
    let config = GatekeeperConfig::load(args.config.as_deref())?;
    config.validate()?;
    info!(http_addr = %config.server.http_addr, "Configuration loaded");

    // Demo directory. A deployment replaces this with a client for its
    // own user store.
    let directory = MemoryDirectory::shared();
    seed_demo_directory(&directory);
    info!("Directory initialized");

    let server = GateServer::new(&config, directory)?;

    server.serve_with_shutdown(shutdown_signal()).await?;

    info!("Gatekeeper stopped");
    Ok(())
}

fn seed_demo_directory(directory: &MemoryDirectory) {
    let full_todo = std::collections::HashMap::from([("todo".to_string(), permission::ALL)]);
    let read_todo = std::collections::HashMap::from([("todo".to_string(), permission::READ)]);

    directory.insert_role(Role {
        id: "role-admin".to_string(),
        name: "admin".to_string(),
        active: true,
        permissions: full_todo,
    });
    directory.insert_role(Role {
        id: "role-user".to_string(),
        name: "user".to_string(),
        active: true,
        permissions: read_todo,
    });
    directory.insert_subject(Identity {
        id: "admin".to_string(),
        role_id: "role-admin".to_string(),
        active: true,
    });
    directory.insert_subject(Identity {
        id: "demo".to_string(),
        role_id: "role-user".to_string(),
        active: true,
    });
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
