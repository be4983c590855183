//! Integration tests for the resolution pipeline
//!
//! These tests wire real stores (in-memory SQLite, snapshot and raw-extract
//! directories under a `TempDir`) into the resolver and the dashboard.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use deskpulse_core::resolver::TierStatus;
use deskpulse_core::store::{RawExtractStore, SnapshotStore};
use deskpulse_core::types::{Domain, RawRow, Tier, TimeWindow};
use deskpulse_core::widgets::create_default_registry;
use deskpulse_core::{
    Dashboard, Error, MemoryCache, RawParams, RecordStore, Result, SqliteStore, TieredDataResolver,
};
use serde_json::json;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Wraps a store and counts how often it is asked for rows.
struct CountingStore {
    inner: Arc<dyn RecordStore>,
    calls: Arc<AtomicUsize>,
}

impl CountingStore {
    fn new(inner: Arc<dyn RecordStore>) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Self {
                inner,
                calls: calls.clone(),
            },
            calls,
        )
    }
}

#[async_trait]
impl RecordStore for CountingStore {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn get_tickets(&self, window: &TimeWindow) -> Result<Vec<RawRow>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.get_tickets(window).await
    }

    async fn get_chats(&self, window: &TimeWindow) -> Result<Vec<RawRow>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.get_chats(window).await
    }
}

/// A store whose backend is down.
struct DownStore;

#[async_trait]
impl RecordStore for DownStore {
    fn name(&self) -> &str {
        "down"
    }

    async fn get_tickets(&self, _window: &TimeWindow) -> Result<Vec<RawRow>> {
        Err(Error::backend("primary", "connection refused"))
    }

    async fn get_chats(&self, _window: &TimeWindow) -> Result<Vec<RawRow>> {
        Err(Error::backend("primary", "connection refused"))
    }
}

fn ticket(id: usize, owner: &str, created: &str) -> RawRow {
    json!({
        "Ticket ID": id.to_string(),
        "Create date": created,
        "Ticket owner": owner,
        "Pipeline": "0",
        "First agent email response date": "",
    })
    .as_object()
    .cloned()
    .unwrap()
}

fn sqlite_with(rows: &[RawRow]) -> SqliteStore {
    let store = SqliteStore::open_in_memory("primary").unwrap();
    store.migrate().unwrap();
    store.upsert_rows(Domain::Tickets, rows).unwrap();
    store
}

fn resolver() -> (TieredDataResolver, Arc<MemoryCache>) {
    let cache = Arc::new(MemoryCache::new(16));
    let mut resolver = TieredDataResolver::new(cache.clone(), Duration::from_secs(300));
    resolver.set_default_timeout_ms(2_000);
    (resolver, cache)
}

fn unbounded() -> TimeWindow {
    TimeWindow::unbounded(Domain::Tickets.timezone())
}

fn write_csv(path: &Path, contents: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

// ============================================
// Cache behaviour
// ============================================

#[tokio::test]
async fn test_second_resolve_is_served_from_cache() {
    let primary = sqlite_with(&[
        ticket(1, "Nova", "2025-03-04T15:00:00Z"),
        ticket(2, "Girly", "2025-03-05T15:00:00Z"),
    ]);
    let (counting, calls) = CountingStore::new(Arc::new(primary));
    let (mut resolver, cache) = resolver();
    resolver.register_tier(Tier::Primary, Arc::new(counting));

    let first = resolver.resolve(Domain::Tickets, &unbounded(), "all").await;
    assert_eq!(first.tier, Some(Tier::Primary));
    assert_eq!(first.dataset.len(), 2);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let second = resolver.resolve(Domain::Tickets, &unbounded(), "all").await;
    assert!(second.from_cache());
    assert!(!second.touched_backends());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(*first.dataset, *second.dataset);
    assert_eq!(cache.stats().hits, 1);
}

#[tokio::test]
async fn test_domains_are_cached_separately() {
    let primary = sqlite_with(&[ticket(1, "Nova", "2025-03-04T15:00:00Z")]);
    let (counting, calls) = CountingStore::new(Arc::new(primary));
    let (mut resolver, _cache) = resolver();
    resolver.register_tier(Tier::Primary, Arc::new(counting));

    resolver.resolve(Domain::Tickets, &unbounded(), "all").await;
    let chats = resolver
        .resolve(Domain::Chats, &TimeWindow::unbounded(Domain::Chats.timezone()), "all")
        .await;
    assert!(chats.dataset.is_empty());
    assert_eq!(chats.tier, None);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

// ============================================
// Fallback chain
// ============================================

#[tokio::test]
async fn test_primary_failure_falls_back_to_mirror() {
    let mirror = sqlite_with(&[ticket(7, "Shan D", "2025-03-04T15:00:00Z")]);
    let (mut resolver, _cache) = resolver();
    resolver.register_tier(Tier::Primary, Arc::new(DownStore));
    resolver.register_tier(Tier::Mirror, Arc::new(mirror));

    let resolution = resolver.resolve(Domain::Tickets, &unbounded(), "all").await;

    assert_eq!(resolution.tier, Some(Tier::Mirror));
    assert_eq!(resolution.dataset.len(), 1);
    assert_eq!(resolution.dataset.records[0].agent.as_deref(), Some("Bhushan"));

    let primary = resolution
        .attempts
        .iter()
        .find(|a| a.tier == Tier::Primary)
        .unwrap();
    assert_eq!(primary.status, TierStatus::Error);
    assert!(primary
        .error_message
        .as_deref()
        .unwrap_or_default()
        .contains("connection refused"));
}

#[tokio::test]
async fn test_snapshot_then_raw_files_on_disk() {
    let dir = TempDir::new().unwrap();
    let snapshots = dir.path().join("results");
    let raw = dir.path().join("raw");

    // Newest run has no tickets file; the older one does.
    fs::create_dir_all(snapshots.join("2025-03-12_06-00-00")).unwrap();
    write_csv(
        &snapshots.join("2025-03-10_06-00-00/tickets_transformed.csv"),
        "Ticket ID,Create date,Case Owner,Pipeline\n\
         101,2025-03-04 09:00:00,Nora N,Support Pipeline\n\
         102,2025-03-05 09:00:00,Gillie E,SPAM Tickets\n",
    );
    write_csv(
        &raw.join("chats/export-1.csv"),
        "Chat ID,Chat Creation Date UTC,Primary Agent,First Response Time\n\
         c1,2025-03-04 14:00:00,Wynn AI,12\n\
         c2,2025-03-04 15:00:00,Nova,30\n",
    );

    let (mut resolver, _cache) = resolver();
    resolver.register_tier(Tier::Primary, Arc::new(DownStore));
    resolver.register_tier(Tier::Snapshot, Arc::new(SnapshotStore::new(&snapshots, 5)));
    resolver.register_tier(Tier::RawFiles, Arc::new(RawExtractStore::new(&raw)));

    let tickets = resolver.resolve(Domain::Tickets, &unbounded(), "all").await;
    assert_eq!(tickets.tier, Some(Tier::Snapshot));
    // SPAM ticket removed
    assert_eq!(tickets.dataset.len(), 1);
    assert_eq!(tickets.dataset.records[0].agent.as_deref(), Some("Nova"));
    assert_eq!(tickets.dataset.records[0].pipeline.as_deref(), Some("Support"));

    let chats = resolver
        .resolve(Domain::Chats, &TimeWindow::unbounded(Domain::Chats.timezone()), "all")
        .await;
    assert_eq!(chats.tier, Some(Tier::RawFiles));
    assert_eq!(chats.dataset.len(), 2);
    let latency: Vec<_> = chats.dataset.records.iter().map(|r| r.response_hours).collect();
    assert_eq!(latency, vec![Some(12.0 / 3600.0), Some(30.0 / 3600.0)]);
}

#[tokio::test]
async fn test_all_tiers_down_yields_empty_dataset() {
    let dir = TempDir::new().unwrap();
    let (mut resolver, cache) = resolver();
    resolver.register_tier(Tier::Primary, Arc::new(DownStore));
    resolver.register_tier(Tier::Snapshot, Arc::new(SnapshotStore::new(dir.path().join("none"), 5)));
    resolver.register_tier(Tier::RawFiles, Arc::new(RawExtractStore::new(dir.path().join("none"))));

    let resolution = resolver.resolve(Domain::Tickets, &unbounded(), "all").await;
    assert!(resolution.dataset.is_empty());
    assert_eq!(resolution.tier, None);
    assert_eq!(cache.stats().entries, 0);
}

// ============================================
// End to end
// ============================================

fn weekday_ticket_dates() -> Vec<String> {
    // Weekdays of 3-14 March 2025 at 10:00 US/Eastern
    [3, 4, 5, 6, 7, 10, 11, 12, 13, 14]
        .iter()
        .map(|day| format!("2025-03-{day:02}T14:00:00Z"))
        .collect()
}

#[tokio::test]
async fn test_agent_filtered_widget_end_to_end() {
    let dates = weekday_ticket_dates();
    let mut rows = Vec::new();
    let mut id = 0;
    for (owner, count) in [("Nova", 50), ("Girly", 30), ("Spencer", 5)] {
        for i in 0..count {
            id += 1;
            rows.push(ticket(id, owner, &dates[i % dates.len()]));
        }
    }
    let primary = sqlite_with(&rows);
    assert_eq!(primary.count(Domain::Tickets).unwrap(), 85);

    let (mut resolver, cache) = resolver();
    resolver.register_tier(Tier::Primary, Arc::new(primary));
    let dashboard = Dashboard::new(create_default_registry(), cache, resolver);

    let params: RawParams = [
        ("domain".to_string(), json!("tickets")),
        ("range".to_string(), json!("8w")),
        ("agents".to_string(), json!("Nova,Girly")),
    ]
    .into_iter()
    .collect();
    let now = Utc.with_ymd_and_hms(2025, 3, 19, 16, 0, 0).unwrap();

    let rendered = dashboard
        .render_at("agent_ticket_volume_distribution", &params, now)
        .await
        .unwrap();

    assert_eq!(rendered.domain, Domain::Tickets);
    assert_eq!(rendered.tier, Some(Tier::Primary));
    assert_eq!(rendered.records, 80);
    assert!(rendered.window.start.is_some());
    assert_eq!(rendered.output.labels, vec!["Nova", "Girly"]);
    assert_eq!(rendered.output.series[0].values, vec![50.0, 30.0]);

    let again = dashboard
        .render_at("agent_ticket_volume_distribution", &params, now)
        .await
        .unwrap();
    assert_eq!(again.tier, Some(Tier::Cache));
    assert_eq!(again.records, 80);
}

#[tokio::test]
async fn test_unknown_widget_is_not_found() {
    let (resolver, cache) = resolver();
    let dashboard = Dashboard::new(create_default_registry(), cache, resolver);

    let err = dashboard
        .render("weekly_everything", &RawParams::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::WidgetNotFound(_)));
}

#[tokio::test]
async fn test_bad_params_fall_back_to_defaults() {
    let primary = sqlite_with(&[ticket(1, "Nova", "2025-03-04T14:00:00Z")]);
    let (mut resolver, cache) = resolver();
    resolver.register_tier(Tier::Primary, Arc::new(primary));
    let dashboard = Dashboard::new(create_default_registry(), cache, resolver);

    let params: RawParams = [
        ("range".to_string(), json!("bogus")),
        ("include_weekends".to_string(), json!("maybe")),
    ]
    .into_iter()
    .collect();
    let now = Utc.with_ymd_and_hms(2025, 3, 19, 16, 0, 0).unwrap();

    let rendered = dashboard
        .render_at("volume_daily_historic", &params, now)
        .await
        .unwrap();
    assert_eq!(rendered.params.text("range"), Some("12w"));
    assert!(rendered.params.flag("include_weekends"));
    assert_eq!(rendered.records, 1);
}
