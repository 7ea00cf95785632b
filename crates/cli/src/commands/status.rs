// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Read-only views of the queue.

use sq_core::projector::{project, DEFAULT_RECENT_ERRORS};
use sq_core::{OpStatus, Operation, QueueStatus, QueueStore};

use super::{open_store, print_operations};
use crate::config::Config;
use crate::error::Result;

pub fn status(config: &Config, json: bool) -> Result<()> {
    let store = open_store(config)?;
    let snapshot = project(&store, DEFAULT_RECENT_ERRORS)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        print!("{}", render_status(&snapshot));
    }
    Ok(())
}

/// Human-readable status summary.
pub fn render_status(status: &QueueStatus) -> String {
    let mut out = String::new();
    out.push_str(&format!("Pending:    {}\n", status.pending));
    out.push_str(&format!("Processing: {}\n", status.processing));
    out.push_str(&format!("Completed:  {}\n", status.completed));
    out.push_str(&format!("Failed:     {}\n", status.failed));
    out.push_str(&format!("Conflicted: {}\n", status.conflicted));
    out.push_str(&format!("Unsynced:   {} bytes\n", status.payload_bytes));
    if !status.recent_errors.is_empty() {
        out.push_str("\nRecent errors:\n");
        for error in &status.recent_errors {
            out.push_str(&format!(
                "  {} {} [{}] {}: {}\n",
                error.at.format("%Y-%m-%d %H:%M:%S"),
                error.resource,
                error.status,
                error.class,
                error.message
            ));
        }
    }
    out
}

/// Pending and in-flight operations, oldest first.
pub fn unsynced(store: &QueueStore) -> Result<Vec<Operation>> {
    let mut ops = store.list_by_status(OpStatus::Pending)?;
    ops.extend(store.list_by_status(OpStatus::Processing)?);
    ops.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
    Ok(ops)
}

pub fn pending(config: &Config) -> Result<()> {
    let store = open_store(config)?;
    print_operations(&unsynced(&store)?, "No pending operations");
    Ok(())
}

pub fn failed(config: &Config) -> Result<()> {
    let store = open_store(config)?;
    print_operations(
        &store.list_by_status(OpStatus::Failed)?,
        "No failed operations",
    );
    Ok(())
}

pub fn conflicted(config: &Config) -> Result<()> {
    let store = open_store(config)?;
    print_operations(
        &store.list_by_status(OpStatus::Conflicted)?,
        "No conflicted operations",
    );
    Ok(())
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod tests;
