// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Commands that act on failed, completed and pending operations.

use sq_core::QueueStore;
use tracing::info;

use super::open_store;
use crate::config::Config;
use crate::error::Result;

pub fn retry(config: &Config) -> Result<()> {
    let store = open_store(config)?;
    let reset = store.reset_failed()?;
    if reset == 0 {
        println!("No failed operations");
    } else {
        info!(reset, "retrying failed operations");
        println!("Requeued {} failed operation(s)", reset);
    }
    Ok(())
}

pub fn clear(config: &Config, all: bool) -> Result<()> {
    let store = open_store(config)?;
    let removed = clear_completed(&store, config, all)?;
    println!("Removed {} completed operation(s)", removed);
    Ok(())
}

/// Remove completed operations, either all of them or those older than the
/// configured retention window.
pub fn clear_completed(store: &QueueStore, config: &Config, all: bool) -> Result<usize> {
    if all {
        return Ok(store.remove_all_completed()?);
    }
    let cutoff = store.now() - config.engine.retention();
    Ok(store.remove_completed_older_than(cutoff)?)
}

pub fn cancel(config: &Config, id: &str) -> Result<()> {
    let store = open_store(config)?;
    let op = store.remove_pending(id)?;
    info!(id, resource = %op.resource(), "cancelled");
    println!("Cancelled {} {}: {}", op.kind, op.resource(), op.id);
    Ok(())
}

#[cfg(test)]
#[path = "manage_tests.rs"]
mod tests;
