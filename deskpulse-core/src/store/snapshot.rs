//! Previously materialized outputs
//!
//! Each processing run writes a folder named `YYYY-MM-DD_HH-MM-SS` holding
//! `tickets_transformed.csv` and/or `chats_transformed.csv`. The most recent
//! folder that has the requested file wins.

use super::{read_csv_rows, RecordStore};
use crate::error::{Error, Result};
use crate::types::{Domain, RawRow, TimeWindow};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use std::path::{Path, PathBuf};

const RUN_DIR_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// File name a run writes for a domain.
pub fn snapshot_file_name(domain: Domain) -> &'static str {
    match domain {
        Domain::Tickets => "tickets_transformed.csv",
        Domain::Chats => "chats_transformed.csv",
    }
}

#[derive(Debug, Clone)]
pub struct SnapshotStore {
    root: PathBuf,
    lookback: usize,
}

impl SnapshotStore {
    pub fn new(root: impl Into<PathBuf>, lookback: usize) -> Self {
        Self {
            root: root.into(),
            lookback: lookback.max(1),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Run folders, newest first.
    pub fn run_dirs(&self) -> Result<Vec<PathBuf>> {
        let mut runs: Vec<(NaiveDateTime, PathBuf)> = std::fs::read_dir(&self.root)?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_dir())
            .filter_map(|entry| {
                let name = entry.file_name().to_string_lossy().into_owned();
                NaiveDateTime::parse_from_str(&name, RUN_DIR_FORMAT)
                    .ok()
                    .map(|ts| (ts, entry.path()))
            })
            .collect();
        runs.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(runs.into_iter().map(|(_, path)| path).collect())
    }

    /// Most recent snapshot file for a domain within the lookback.
    pub fn latest(&self, domain: Domain) -> Result<PathBuf> {
        let file_name = snapshot_file_name(domain);
        self.run_dirs()?
            .into_iter()
            .take(self.lookback)
            .map(|dir| dir.join(file_name))
            .find(|path| path.is_file())
            .ok_or_else(|| {
                Error::backend(
                    "snapshot",
                    format!(
                        "no {} in the {} most recent runs under {}",
                        file_name,
                        self.lookback,
                        self.root.display()
                    ),
                )
            })
    }

    /// Load the latest snapshot rows for a domain, unfiltered.
    pub fn load(&self, domain: Domain) -> Result<Vec<RawRow>> {
        let path = self.latest(domain)?;
        tracing::debug!(domain = %domain, path = %path.display(), "Loading snapshot");
        read_csv_rows(&path)
    }

    async fn load_blocking(&self, domain: Domain) -> Result<Vec<RawRow>> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.load(domain))
            .await
            .map_err(|e| Error::backend("snapshot", format!("load task failed: {e}")))?
    }
}

/// Window filtering happens after normalization, once timestamps are parsed.
#[async_trait]
impl RecordStore for SnapshotStore {
    fn name(&self) -> &str {
        "snapshot"
    }

    async fn get_tickets(&self, _window: &TimeWindow) -> Result<Vec<RawRow>> {
        self.load_blocking(Domain::Tickets).await
    }

    async fn get_chats(&self, _window: &TimeWindow) -> Result<Vec<RawRow>> {
        self.load_blocking(Domain::Chats).await
    }
}
