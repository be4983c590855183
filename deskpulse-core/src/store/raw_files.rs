//! Raw source extracts
//!
//! The last-resort tier: every CSV under `raw_dir/<domain>/` is loaded and
//! concatenated, and the whole lot goes through normalization from scratch.

use super::{read_csv_rows, RecordStore};
use crate::error::{Error, Result};
use crate::types::{Domain, RawRow, TimeWindow};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct RawExtractStore {
    root: PathBuf,
}

impl RawExtractStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Extract files for a domain, sorted by path.
    pub fn files(&self, domain: Domain) -> Result<Vec<PathBuf>> {
        let pattern = self.root.join(domain.as_str()).join("*.csv");
        let pattern = pattern.to_string_lossy();
        let mut files: Vec<PathBuf> = glob::glob(&pattern)
            .map_err(|e| Error::Config(format!("invalid raw extract pattern {pattern}: {e}")))?
            .filter_map(|entry| entry.ok())
            .filter(|path| path.is_file())
            .collect();
        files.sort();
        Ok(files)
    }

    /// Load every readable extract for a domain.
    ///
    /// Unreadable files are logged and skipped; it is an error only when no
    /// file could be read at all.
    pub fn load(&self, domain: Domain) -> Result<Vec<RawRow>> {
        let files = self.files(domain)?;
        let mut rows = Vec::new();
        let mut loaded = 0;
        for path in &files {
            match read_csv_rows(path) {
                Ok(mut file_rows) => {
                    tracing::debug!(path = %path.display(), rows = file_rows.len(), "Loaded raw extract");
                    rows.append(&mut file_rows);
                    loaded += 1;
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable raw extract");
                }
            }
        }
        if loaded == 0 {
            return Err(Error::backend(
                "raw_files",
                format!("no readable {} extracts under {}", domain, self.root.display()),
            ));
        }
        Ok(rows)
    }

    async fn load_blocking(&self, domain: Domain) -> Result<Vec<RawRow>> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.load(domain))
            .await
            .map_err(|e| Error::backend("raw_files", format!("load task failed: {e}")))?
    }
}

#[async_trait]
impl RecordStore for RawExtractStore {
    fn name(&self) -> &str {
        "raw_files"
    }

    async fn get_tickets(&self, _window: &TimeWindow) -> Result<Vec<RawRow>> {
        self.load_blocking(Domain::Tickets).await
    }

    async fn get_chats(&self, _window: &TimeWindow) -> Result<Vec<RawRow>> {
        self.load_blocking(Domain::Chats).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_concatenates_extracts() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("tickets");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("a.csv"), "Ticket ID,Case Owner\n1,Nova\n2,Girly\n").unwrap();
        fs::write(dir.join("b.csv"), "Ticket ID,Ticket owner\n3,Shan\n").unwrap();
        fs::write(dir.join("notes.txt"), "ignored").unwrap();

        let store = RawExtractStore::new(tmp.path());
        let rows = store.load(Domain::Tickets).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[2]["Ticket owner"], "Shan");
    }

    #[test]
    fn test_no_extracts_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let store = RawExtractStore::new(tmp.path());
        assert!(store.load(Domain::Chats).is_err());
    }

    #[test]
    fn test_bad_file_is_skipped() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("chats");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("good.csv"), "chat_id,primary_agent\nc1,Nova\n").unwrap();
        fs::write(dir.join("bad.csv"), [0xff, 0xfe, b'\n', 0xff]).unwrap();

        let rows = RawExtractStore::new(tmp.path()).load(Domain::Chats).unwrap();
        assert_eq!(rows.len(), 1);
    }
}
