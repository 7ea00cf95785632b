// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only ledger of applied mutations.
//!
//! The ledger stores one JSON object per line, each the outcome of one
//! accepted request. It is the server's durable state: resources and the
//! idempotency table are rebuilt from it on start.
//!
//! Each entry is appended with fsync before the client hears about it.

use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sq_core::OpKind;

use crate::error::{AuthorityError, Result};

/// The recorded outcome of one applied request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub idempotency_key: String,
    pub resource_kind: String,
    /// Final resource id (the assigned id for creates).
    pub resource_id: String,
    pub kind: OpKind,
    /// Resource document after the mutation; `None` once deleted.
    pub document: Option<Value>,
    pub version: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_id: Option<String>,
}

/// Append-only ledger stored as JSONL.
pub struct Ledger {
    path: PathBuf,
    /// Idempotency keys already recorded.
    seen_keys: HashSet<String>,
}

impl Ledger {
    /// Opens or creates a ledger, returning it with every recorded entry in
    /// append order.
    pub fn open(path: impl AsRef<Path>) -> Result<(Self, Vec<LedgerEntry>)> {
        let path = path.as_ref().to_path_buf();
        let mut seen_keys = HashSet::new();
        let mut entries = Vec::new();

        if path.exists() {
            let reader = BufReader::new(File::open(&path)?);
            for (index, line) in reader.lines().enumerate() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                let entry: LedgerEntry =
                    serde_json::from_str(&line).map_err(|e| AuthorityError::CorruptedLedger {
                        line: index + 1,
                        message: e.to_string(),
                    })?;
                seen_keys.insert(entry.idempotency_key.clone());
                entries.push(entry);
            }
        }

        Ok((Ledger { path, seen_keys }, entries))
    }

    /// Creates a ledger that keeps nothing on disk.
    pub fn in_memory() -> Self {
        Ledger {
            path: PathBuf::new(),
            seen_keys: HashSet::new(),
        }
    }

    /// Appends an entry.
    ///
    /// Returns Ok(true) if the entry was appended, Ok(false) if its key was
    /// already recorded.
    pub fn append(&mut self, entry: &LedgerEntry) -> Result<bool> {
        if self.seen_keys.contains(&entry.idempotency_key) {
            return Ok(false);
        }

        if !self.path.as_os_str().is_empty() {
            if let Some(parent) = self.path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)?;

            let json = serde_json::to_string(entry)?;
            writeln!(file, "{json}")?;
            file.sync_all()?;
        }

        self.seen_keys.insert(entry.idempotency_key.clone());
        Ok(true)
    }

    /// Returns the number of recorded entries.
    pub fn len(&self) -> usize {
        self.seen_keys.len()
    }

    /// Returns true if the ledger is empty.
    pub fn is_empty(&self) -> bool {
        self.seen_keys.is_empty()
    }

    /// Returns the path to the ledger file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
#[path = "ledger_tests.rs"]
mod tests;
