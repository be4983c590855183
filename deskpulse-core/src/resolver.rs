//! Tiered data resolution
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                   TieredDataResolver.resolve()                  │
//! │                                                                 │
//! │  cache ──hit──────────────────────────────────────────► return  │
//! │    │ miss                                                       │
//! │    ▼                                                            │
//! │  primary ─► mirror ─► snapshot ─► raw_files                     │
//! │    each tier: fetch (bounded timeout)                           │
//! │               ─► EntityNormalizer (live pipeline names)         │
//! │               ─► window filter                                  │
//! │               ─► non-empty? write through to cache, return      │
//! │    error / timeout / empty ─► log, next tier                    │
//! │                                                                 │
//! │  all tiers exhausted ─► empty dataset                           │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Resolution never fails: backend problems only ever show up in the
//! returned [`TierAttempt`] log and in tracing output.

use crate::cache::{CacheKey, DatasetCache};
use crate::config::Config;
use crate::normalize::EntityNormalizer;
use crate::store::{RawExtractStore, RecordStore, SnapshotStore, SqliteStore, TicketSource};
use crate::types::{Dataset, Domain, SourceBatch, Tier, TimeWindow};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Default timeout for one tier call (milliseconds).
pub const DEFAULT_TIER_TIMEOUT_MS: u64 = 10_000;

/// Timeout override key for the live pipeline-name lookup.
pub const PIPELINE_LOOKUP_TIMEOUT_KEY: &str = "ticket_source";

/// Outcome of one step of the resolution chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TierStatus {
    /// Cache returned a dataset
    Hit,
    /// Cache had nothing (or failed, which counts the same)
    Miss,
    /// Tier returned a non-empty dataset
    Success,
    /// Tier answered but had nothing in the window
    Empty,
    /// Tier raised
    Error,
    /// Tier exceeded its time budget
    Timeout,
}

impl TierStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TierStatus::Hit => "hit",
            TierStatus::Miss => "miss",
            TierStatus::Success => "success",
            TierStatus::Empty => "empty",
            TierStatus::Error => "error",
            TierStatus::Timeout => "timeout",
        }
    }
}

/// Record of one tier attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TierAttempt {
    pub tier: Tier,
    pub status: TierStatus,
    pub duration_ms: u64,
    /// Canonical records produced (0 unless `Success` or `Hit`)
    pub rows: usize,
    pub error_message: Option<String>,
}

/// Result of a resolution.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub dataset: Arc<Dataset>,
    /// Tier that produced the dataset; `None` when every tier came up empty
    pub tier: Option<Tier>,
    pub attempts: Vec<TierAttempt>,
}

impl Resolution {
    pub fn from_cache(&self) -> bool {
        self.tier == Some(Tier::Cache)
    }

    /// Whether any backend tier was actually called.
    pub fn touched_backends(&self) -> bool {
        self.attempts.iter().any(|a| a.tier != Tier::Cache)
    }
}

struct TierEntry {
    tier: Tier,
    store: Arc<dyn RecordStore>,
}

/// Walks cache -> primary -> mirror -> snapshot -> raw files.
pub struct TieredDataResolver {
    cache: Arc<dyn DatasetCache>,
    cache_ttl: Duration,
    tiers: Vec<TierEntry>,
    ticket_source: Option<Arc<dyn TicketSource>>,
    normalizer: EntityNormalizer,
    default_timeout_ms: u64,
    tier_timeouts_ms: HashMap<String, u64>,
}

impl TieredDataResolver {
    /// Resolver with only the cache; register tiers in resolution order.
    pub fn new(cache: Arc<dyn DatasetCache>, cache_ttl: Duration) -> Self {
        Self {
            cache,
            cache_ttl,
            tiers: Vec::new(),
            ticket_source: None,
            normalizer: EntityNormalizer::default(),
            default_timeout_ms: DEFAULT_TIER_TIMEOUT_MS,
            tier_timeouts_ms: HashMap::new(),
        }
    }

    /// Build the standard tier chain from configuration.
    ///
    /// A store that cannot be opened is left out of the chain with a
    /// warning rather than failing start-up.
    pub fn from_config(config: &Config, cache: Arc<dyn DatasetCache>) -> Self {
        let mut resolver = Self::new(cache, config.cache.ttl());
        resolver.set_default_timeout_ms(config.resolver.tier_timeout_ms);
        resolver.set_tier_timeouts_ms(config.resolver.tier_timeouts.clone());

        let open = |name: &str, path: &std::path::Path| {
            SqliteStore::open(name, path).and_then(|store| {
                store.migrate()?;
                Ok(store)
            })
        };

        match open(Tier::Primary.as_str(), &Config::database_path()) {
            Ok(store) => resolver.register_tier(Tier::Primary, Arc::new(store)),
            Err(e) => tracing::warn!(tier = "primary", error = %e, "Primary store unavailable"),
        }
        if let Some(path) = &config.resolver.mirror_path {
            match open(Tier::Mirror.as_str(), path) {
                Ok(store) => resolver.register_tier(Tier::Mirror, Arc::new(store)),
                Err(e) => tracing::warn!(tier = "mirror", error = %e, "Mirror store unavailable"),
            }
        }
        resolver.register_tier(
            Tier::Snapshot,
            Arc::new(SnapshotStore::new(
                config.resolver.snapshot_dir(),
                config.resolver.snapshot_lookback,
            )),
        );
        resolver.register_tier(
            Tier::RawFiles,
            Arc::new(RawExtractStore::new(config.resolver.raw_dir())),
        );

        if config.ticket_source.is_ready() {
            match crate::store::HubSpotClient::new(config.ticket_source.clone()) {
                Ok(client) => resolver.set_ticket_source(Arc::new(client)),
                Err(e) => tracing::warn!(error = %e, "Ticket source disabled"),
            }
        }

        resolver
    }

    /// Append a tier to the chain.
    pub fn register_tier(&mut self, tier: Tier, store: Arc<dyn RecordStore>) {
        tracing::debug!(tier = %tier, store = store.name(), "Registered resolver tier");
        self.tiers.push(TierEntry { tier, store });
    }

    /// Source used for live pipeline-name lookups.
    pub fn set_ticket_source(&mut self, source: Arc<dyn TicketSource>) {
        self.ticket_source = Some(source);
    }

    pub fn set_normalizer(&mut self, normalizer: EntityNormalizer) {
        self.normalizer = normalizer;
    }

    /// Set default timeout (milliseconds) for one tier call.
    pub fn set_default_timeout_ms(&mut self, timeout_ms: u64) {
        self.default_timeout_ms = timeout_ms.max(1);
    }

    /// Set per-tier timeout overrides (milliseconds), keyed by tier name.
    pub fn set_tier_timeouts_ms(&mut self, tier_timeouts_ms: HashMap<String, u64>) {
        self.tier_timeouts_ms = tier_timeouts_ms
            .into_iter()
            .map(|(name, timeout)| (name, timeout.max(1)))
            .collect();
    }

    /// Registered tiers, in resolution order.
    pub fn tiers(&self) -> Vec<Tier> {
        self.tiers.iter().map(|t| t.tier).collect()
    }

    pub fn cache(&self) -> &Arc<dyn DatasetCache> {
        &self.cache
    }

    fn timeout_for(&self, key: &str) -> Duration {
        Duration::from_millis(
            self.tier_timeouts_ms
                .get(key)
                .copied()
                .unwrap_or(self.default_timeout_ms),
        )
    }

    /// Resolve the dataset for a domain and window.
    pub async fn resolve(&self, domain: Domain, window: &TimeWindow, range_token: &str) -> Resolution {
        let key = CacheKey::new(domain, range_token, window);
        let mut attempts = Vec::new();

        let start = Instant::now();
        match self.cache.get(&key) {
            Ok(Some(dataset)) => {
                tracing::debug!(domain = %domain, range = range_token, key = %key, "Cache hit");
                attempts.push(TierAttempt {
                    tier: Tier::Cache,
                    status: TierStatus::Hit,
                    duration_ms: start.elapsed().as_millis() as u64,
                    rows: dataset.len(),
                    error_message: None,
                });
                return Resolution {
                    dataset,
                    tier: Some(Tier::Cache),
                    attempts,
                };
            }
            Ok(None) => attempts.push(TierAttempt {
                tier: Tier::Cache,
                status: TierStatus::Miss,
                duration_ms: start.elapsed().as_millis() as u64,
                rows: 0,
                error_message: None,
            }),
            Err(e) => {
                tracing::warn!(domain = %domain, error = %e, "Cache read failed, treating as miss");
                attempts.push(TierAttempt {
                    tier: Tier::Cache,
                    status: TierStatus::Miss,
                    duration_ms: start.elapsed().as_millis() as u64,
                    rows: 0,
                    error_message: Some(e.to_string()),
                });
            }
        }

        for entry in &self.tiers {
            let (attempt, dataset) = self.attempt_tier(entry, domain, window).await;
            attempts.push(attempt);
            let Some(dataset) = dataset else {
                continue;
            };

            let dataset = Arc::new(dataset);
            if let Err(e) = self.cache.set(key.clone(), Arc::clone(&dataset), self.cache_ttl) {
                tracing::warn!(domain = %domain, error = %e, "Cache write failed");
            }
            return Resolution {
                dataset,
                tier: Some(entry.tier),
                attempts,
            };
        }

        tracing::warn!(
            domain = %domain,
            range = range_token,
            tiers = self.tiers.len(),
            "All tiers exhausted, returning empty dataset"
        );
        Resolution {
            dataset: Arc::new(Dataset::empty(domain)),
            tier: None,
            attempts,
        }
    }

    async fn attempt_tier(
        &self,
        entry: &TierEntry,
        domain: Domain,
        window: &TimeWindow,
    ) -> (TierAttempt, Option<Dataset>) {
        let tier = entry.tier;
        let timeout = self.timeout_for(tier.as_str());
        let start = Instant::now();
        let attempt = |status, rows, error_message: Option<String>| TierAttempt {
            tier,
            status,
            duration_ms: start.elapsed().as_millis() as u64,
            rows,
            error_message,
        };

        tracing::debug!(
            tier = %tier,
            domain = %domain,
            timeout_ms = timeout.as_millis() as u64,
            "Trying tier"
        );

        let rows = match tokio::time::timeout(timeout, entry.store.fetch(domain, window)).await {
            Ok(Ok(rows)) => rows,
            Ok(Err(e)) => {
                tracing::warn!(tier = %tier, domain = %domain, error = %e, "Tier failed");
                return (attempt(TierStatus::Error, 0, Some(e.to_string())), None);
            }
            Err(_) => {
                let e = crate::error::Error::TierTimeout {
                    tier: tier.to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                };
                tracing::warn!(tier = %tier, domain = %domain, error = %e, "Tier timed out");
                return (attempt(TierStatus::Timeout, 0, Some(e.to_string())), None);
            }
        };

        if rows.is_empty() {
            tracing::info!(tier = %tier, domain = %domain, "Tier returned no rows");
            return (attempt(TierStatus::Empty, 0, None), None);
        }

        let batch = SourceBatch::new(tier, domain, rows);
        let live_pipelines = if self.normalizer.needs_pipeline_lookup(&batch) {
            self.live_pipeline_names().await
        } else {
            None
        };
        let (mut dataset, stats) = self.normalizer.normalize(&batch, live_pipelines.as_ref());
        dataset.retain_window(window);

        if dataset.is_empty() {
            tracing::info!(
                tier = %tier,
                domain = %domain,
                raw_rows = stats.input_rows,
                "Tier had no records in window"
            );
            return (attempt(TierStatus::Empty, 0, None), None);
        }

        let result = attempt(TierStatus::Success, dataset.len(), None);
        tracing::info!(
            tier = %tier,
            domain = %domain,
            rows = dataset.len(),
            duplicates = stats.duplicates_dropped,
            duration_ms = result.duration_ms,
            "Resolved dataset"
        );
        (result, Some(dataset))
    }

    /// Pipeline ID -> name map from the ticket source, if reachable in time.
    async fn live_pipeline_names(&self) -> Option<HashMap<String, String>> {
        let source = self.ticket_source.as_ref()?;
        let timeout = self.timeout_for(PIPELINE_LOOKUP_TIMEOUT_KEY);
        match tokio::time::timeout(timeout, source.fetch_pipeline_names()).await {
            Ok(Ok(names)) if !names.is_empty() => Some(names),
            Ok(Ok(_)) => None,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Pipeline lookup failed, using static map");
                None
            }
            Err(_) => {
                tracing::warn!(
                    timeout_ms = timeout.as_millis() as u64,
                    "Pipeline lookup timed out, using static map"
                );
                None
            }
        }
    }
}
