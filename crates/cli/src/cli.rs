// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use sq_core::OpKind;

/// Kind of mutation to record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum KindArg {
    Create,
    Update,
    Delete,
}

impl From<KindArg> for OpKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Create => OpKind::Create,
            KindArg::Update => OpKind::Update,
            KindArg::Delete => OpKind::Delete,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "syncq")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(disable_version_flag = true)]
#[command(about = "Offline-first operation queue with background sync")]
#[command(
    long_about = "Offline-first operation queue with background sync.\n\n\
    Mutations are recorded locally and replayed in order against the remote store \
    whenever it is reachable."
)]
// Allow the unit type field pattern which is required for clap's ArgAction::Version
#[allow(clippy::manual_non_exhaustive)]
pub struct Cli {
    /// Path to syncq.toml
    #[arg(short = 'c', long = "config", global = true, value_name = "path")]
    pub config: Option<PathBuf>,

    /// Print version
    #[arg(short = 'v', short_alias = 'V', long = "version", action = clap::ArgAction::Version)]
    version: (),

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// Record a mutation for later sync
    #[command(after_help = "\
Examples:
  syncq enqueue create device --payload '{\"name\":\"PC1\"}'
  syncq enqueue create device tmp-1 --payload '{\"name\":\"PC1\"}'
  syncq enqueue update device srv-3 --payload '{\"name\":\"PC2\"}' --base-version 2
  syncq enqueue delete device srv-3")]
    Enqueue {
        /// Mutation kind
        #[arg(value_enum)]
        kind: KindArg,

        /// Resource kind, e.g. device
        resource_kind: String,

        /// Resource id (optional for create; a temporary id is generated)
        id: Option<String>,

        /// JSON payload
        #[arg(short, long)]
        payload: Option<String>,

        /// Server version the edit was made against
        #[arg(short = 'b', long)]
        base_version: Option<u64>,

        /// Derive the idempotency key from the content (creates only)
        #[arg(long)]
        content_key: bool,
    },

    /// Show queue counts and recent errors
    Status {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// List operations waiting to sync
    Pending,

    /// List operations that gave up after retries or were rejected
    Failed,

    /// List operations the remote store rejected as conflicting
    Conflicted,

    /// Replay eligible operations once and report
    Sync,

    /// Return failed operations to the queue
    Retry,

    /// Remove completed operations past the retention window
    Clear {
        /// Remove every completed operation
        #[arg(long)]
        all: bool,
    },

    /// Drop a pending operation
    Cancel {
        /// Operation id
        id: String,
    },

    /// Run the sync worker until interrupted
    Run,
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;
