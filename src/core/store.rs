//! Persistent storage for alert records.
//!
//! Stores all alerts as a single JSON array in the app data directory, in the
//! same record shape the host application uses (filters as a JSON text blob).

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;

use super::alerts::model::Alert;
use super::error::{Error, Result};

const ALERTS_FILE: &str = "alerts.json";

/// Reads the alert file and keeps the decoded records.
pub struct AlertStore {
    path: PathBuf,
    alerts: Vec<Alert>,
}

impl AlertStore {
    /// Create a store backed by `alerts.json` inside `data_dir`.
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            path: data_dir.as_ref().join(ALERTS_FILE),
            alerts: Vec::new(),
        }
    }

    /// Load records from disk, replacing the cached ones. Records that cannot
    /// be decoded are skipped with a warning.
    pub fn load(&mut self) -> Result<&[Alert]> {
        self.alerts.clear();
        if !self.path.exists() {
            return Ok(&self.alerts);
        }

        let content = fs::read_to_string(&self.path)?;
        let rows: Vec<Value> = serde_json::from_str(&content)?;
        for (position, row) in rows.into_iter().enumerate() {
            match serde_json::from_value::<Alert>(row) {
                Ok(alert) => self.alerts.push(alert),
                Err(source) => log::warn!("{}", Error::InvalidAlert { position, source }),
            }
        }
        Ok(&self.alerts)
    }
}
