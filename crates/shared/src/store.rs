//! On-disk store for test snapshots and collected node logs
//!
//! Each named test run gets its own directory under the store root:
//! `<root>/<test-name>/<start-timestamp>/`. Snapshots are JSON documents;
//! downloaded node logs land under a per-node subdirectory.

use crate::config::StoreConfig;
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Store handle bound to a single test run directory
#[derive(Debug, Clone)]
pub struct Store {
    dir: PathBuf,
}

impl Store {
    /// Create the run directory for a named test
    pub async fn open(config: &StoreConfig, name: &str, start: DateTime<Utc>) -> Result<Self> {
        let dir = PathBuf::from(&config.root)
            .join(name)
            .join(start.format("%Y%m%dT%H%M%S%.3fZ").to_string());

        tokio::fs::create_dir_all(&dir).await?;

        tracing::debug!(dir = %dir.display(), "Opened store directory");

        Ok(Self { dir })
    }

    /// The run directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Serialize a value as pretty JSON into the run directory
    pub async fn write_json<T: Serialize>(&self, file_name: &str, value: &T) -> Result<PathBuf> {
        let path = self.dir.join(file_name);
        let json = serde_json::to_vec_pretty(value)?;
        tokio::fs::write(&path, json).await?;

        tracing::debug!(path = %path.display(), "Wrote snapshot");

        Ok(path)
    }

    /// Destination path for a downloaded log file from a node
    ///
    /// The suffix may contain subdirectories; callers create parents before
    /// writing.
    pub fn log_dest(&self, node: &str, suffix: &str) -> PathBuf {
        self.dir.join(node).join(suffix)
    }
}
