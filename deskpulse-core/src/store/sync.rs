//! Ticket-source -> document store sync

use super::{SqliteStore, TicketSource};
use crate::error::{Error, Result};
use crate::normalize::columns::{canonical_field, Field};
use crate::types::{Domain, RawRow, TimeWindow};
use serde::Serialize;
use std::time::Instant;

/// Outcome of one sync run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Rows returned by the ticket source
    pub fetched: usize,
    /// Rows written to the store
    pub stored: usize,
    /// Rows dropped because they had no record id
    pub skipped_without_id: usize,
    pub duration_ms: u64,
}

/// Pull tickets created inside `window` from the source into the store.
///
/// Upserts are keyed by ticket id, so re-running a sync is idempotent.
pub async fn sync_tickets(
    source: &dyn TicketSource,
    store: &SqliteStore,
    window: &TimeWindow,
) -> Result<SyncReport> {
    let started = Instant::now();
    let rows = source.fetch_records(window).await?;
    let fetched = rows.len();
    let skipped_without_id = rows.iter().filter(|row| !has_record_id(row)).count();

    let writer = store.clone();
    let stored = tokio::task::spawn_blocking(move || writer.upsert_rows(Domain::Tickets, &rows))
        .await
        .map_err(|e| Error::backend("sync", format!("store task failed: {e}")))??;

    let report = SyncReport {
        fetched,
        stored,
        skipped_without_id,
        duration_ms: started.elapsed().as_millis() as u64,
    };
    tracing::info!(
        fetched = report.fetched,
        stored = report.stored,
        skipped = report.skipped_without_id,
        duration_ms = report.duration_ms,
        "Ticket sync complete"
    );
    Ok(report)
}

fn has_record_id(row: &RawRow) -> bool {
    row.iter().any(|(header, value)| {
        canonical_field(Domain::Tickets, header) == Some(Field::RecordId)
            && crate::normalize::columns::parse_text(value).is_some()
    })
}
