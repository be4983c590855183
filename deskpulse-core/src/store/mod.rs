//! Backing stores for the resolver's tiers
//!
//! Each store answers "rows for this domain in this window" in its own
//! native shape; normalization happens once, in the resolver.
//!
//! - [`SqliteStore`]: primary document store, and the secondary mirror
//! - [`SnapshotStore`]: most recent materialized outputs on disk
//! - [`RawExtractStore`]: raw CSV extracts, the last resort
//! - [`HubSpotClient`]: the ticket-source API, used for pipeline names and sync

pub mod raw_files;
pub mod snapshot;
pub mod sqlite;
pub mod sync;
pub mod ticket_source;

pub use raw_files::RawExtractStore;
pub use snapshot::SnapshotStore;
pub use sqlite::SqliteStore;
pub use sync::{sync_tickets, SyncReport};
pub use ticket_source::{HubSpotClient, TicketSource};

use crate::error::{Error, Result};
use crate::types::{Domain, RawRow, TimeWindow};
use async_trait::async_trait;
use std::path::Path;

/// A store that can return raw rows for either domain.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    async fn get_tickets(&self, window: &TimeWindow) -> Result<Vec<RawRow>>;

    async fn get_chats(&self, window: &TimeWindow) -> Result<Vec<RawRow>>;

    /// Dispatch on domain.
    async fn fetch(&self, domain: Domain, window: &TimeWindow) -> Result<Vec<RawRow>> {
        match domain {
            Domain::Tickets => self.get_tickets(window).await,
            Domain::Chats => self.get_chats(window).await,
        }
    }
}

/// Read every row of a CSV file as string-valued raw rows.
///
/// Empty cells are kept as empty strings; the normalizer treats them as
/// absent.
pub(crate) fn read_csv_rows(path: &Path) -> Result<Vec<RawRow>> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
    let headers = reader.headers()?.clone();
    if headers.iter().all(|h| h.trim().is_empty()) {
        return Err(Error::Parse {
            source_name: path.display().to_string(),
            message: "missing header row".to_string(),
        });
    }
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let row: RawRow = headers
            .iter()
            .zip(record.iter())
            .map(|(h, v)| {
                (
                    h.trim_start_matches('\u{feff}').to_string(),
                    serde_json::Value::String(v.to_string()),
                )
            })
            .collect();
        rows.push(row);
    }
    Ok(rows)
}
