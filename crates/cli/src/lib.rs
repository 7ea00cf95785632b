// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! syncq - command-line front end for the offline operation queue.
//!
//! Mutations are recorded in a local SQLite queue ([`sq_core::QueueStore`])
//! and replayed against the remote store by [`sq_engine::SyncQueue`], either
//! once (`syncq sync`) or continuously (`syncq run`).
//!
//! # Main Components
//!
//! - [`Cli`] / [`Command`] - argument parsing
//! - [`Config`] - `syncq.toml` loading
//! - [`Error`] - error type for all commands

mod cli;
mod commands;

pub mod config;
pub mod error;

pub use cli::{Cli, Command, KindArg};
pub use commands::enqueue::EnqueueArgs;
pub use config::Config;
pub use error::{Error, Result};

use std::path::Path;

/// Execute a CLI command. This is the main entry point for library users
/// and provides a testable way to run commands without process execution.
pub fn run(config_path: Option<&Path>, command: Command) -> Result<()> {
    let config = Config::load(config_path)?;
    match command {
        Command::Enqueue {
            kind,
            resource_kind,
            id,
            payload,
            base_version,
            content_key,
        } => commands::enqueue::run(
            &config,
            EnqueueArgs {
                kind,
                resource_kind,
                id,
                payload,
                base_version,
                content_key,
            },
        ),
        Command::Status { json } => commands::status::status(&config, json),
        Command::Pending => commands::status::pending(&config),
        Command::Failed => commands::status::failed(&config),
        Command::Conflicted => commands::status::conflicted(&config),
        Command::Sync => commands::sync::sync(&config),
        Command::Retry => commands::manage::retry(&config),
        Command::Clear { all } => commands::manage::clear(&config, all),
        Command::Cancel { id } => commands::manage::cancel(&config, &id),
        Command::Run => commands::sync::run(&config),
    }
}
