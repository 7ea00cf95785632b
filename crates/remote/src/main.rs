// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! sq-remote: Authoritative WebSocket store for syncq clients.

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use sq_remote::{server, ServerState};

/// sq-remote: Authoritative store for offline-first syncq clients
#[derive(Parser, Debug)]
#[command(name = "sq-remote")]
#[command(about = "Authoritative WebSocket store for syncq clients")]
struct Args {
    /// Address to bind the server to
    #[arg(short, long, default_value = "0.0.0.0:7890")]
    bind: SocketAddr,

    /// Directory for ledger storage
    #[arg(short, long, default_value = ".")]
    data: PathBuf,

    /// Bearer token clients must present
    #[arg(long)]
    token: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Initialize logging
    let level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting sq-remote server");
    info!("  Bind address: {}", args.bind);
    info!("  Data directory: {}", args.data.display());
    info!(
        "  Auth: {}",
        if args.token.is_some() { "token" } else { "none" }
    );

    let state = ServerState::open(&args.data, args.token)?;

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            shutdown.cancel();
        }
    });

    server::run(args.bind, state, cancel).await?;

    Ok(())
}
