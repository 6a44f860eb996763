// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only state log: one JSON record per line.
//!
//! The effects processor appends a record per observed sensor change and
//! per context change. Plain JSON-lines keeps the log greppable and
//! crash-tolerant (a torn tail line is skipped on read).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "snake_case")]
pub enum StateRecord {
    /// One changed snapshot field among online/ipv4/ipv6/local_ipv4.
    SensorChange {
        timestamp: DateTime<Utc>,
        field: String,
        from: String,
        to: String,
        trigger: String,
    },
    /// A context and/or location change.
    ContextChange {
        timestamp: DateTime<Utc>,
        context_from: String,
        context_to: String,
        location_from: String,
        location_to: String,
        trigger: String,
    },
}

#[derive(Debug, Clone)]
pub struct StateLog {
    path: PathBuf,
}

impl StateLog {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    pub fn append(&self, record: &StateRecord) -> std::io::Result<()> {
        let line = serde_json::to_string(record)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{line}")?;
        Ok(())
    }

    /// All intact records, oldest first. Unparseable lines are skipped.
    pub fn read_all(&self) -> std::io::Result<Vec<StateRecord>> {
        let file = match std::fs::File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let mut records = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(record) => records.push(record),
                Err(e) => tracing::debug!(error = %e, "skipping malformed state log line"),
            }
        }
        Ok(records)
    }
}

#[cfg(test)]
#[path = "storage_tests.rs"]
mod tests;
