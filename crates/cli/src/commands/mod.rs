// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

pub mod enqueue;
pub mod manage;
pub mod status;
pub mod sync;

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use fs2::FileExt;
use sq_core::{Operation, QueueStore};

use crate::config::Config;
use crate::error::{Error, Result};

/// Open the queue database named by the config.
pub fn open_store(config: &Config) -> Result<Arc<QueueStore>> {
    let path = config.queue_path();
    tracing::debug!(path = %path.display(), "opening queue");
    Ok(Arc::new(QueueStore::open(&path)?))
}

/// Exclusive claim on a queue for the process that replays it.
///
/// Opening a [`sq_engine::SyncQueue`] requeues interrupted operations, which
/// is only sound when no other worker has them in flight.
pub struct WorkerLock {
    _file: File,
    path: PathBuf,
}

impl WorkerLock {
    pub fn acquire(queue_path: &Path) -> Result<Self> {
        if let Some(parent) = queue_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let path = lock_path(queue_path);
        let file = fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)?;
        file.try_lock_exclusive()
            .map_err(|_| Error::WorkerRunning(queue_path.display().to_string()))?;
        Ok(WorkerLock { _file: file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn lock_path(queue_path: &Path) -> PathBuf {
    let mut name = queue_path.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}

/// One line per operation: id, kind, resource, attempts and last error.
pub fn format_operation(op: &Operation) -> String {
    let mut line = format!(
        "{}  {:<6} {}  [{}] attempts {}/{}",
        op.id,
        op.kind.as_str(),
        op.resource(),
        op.status,
        op.retry_count,
        op.max_retries
    );
    if let Some(error) = &op.last_error {
        line.push_str(&format!("  {}", error));
    }
    line
}

/// Print a list of operations, or a note when there are none.
pub fn print_operations(ops: &[Operation], empty: &str) {
    if ops.is_empty() {
        println!("{}", empty);
        return;
    }
    for op in ops {
        println!("{}", format_operation(op));
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
