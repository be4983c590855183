//! Widget request pipeline
//!
//! ```text
//! raw params ─► schema.normalize ─► domain + range ─► TimeWindow
//!            ─► TieredDataResolver ─► agent / pipeline filters ─► builder
//! ```
//!
//! The [`Dashboard`] is constructed once by the entry point and owns the
//! widget registry, the cache and the resolver.

use crate::cache::MemoryCache;
use crate::config::Config;
use crate::error::Result;
use crate::params::{NormalizedParams, RawParams};
use crate::resolver::{TierAttempt, TieredDataResolver};
use crate::store::{sync_tickets, SqliteStore, SyncReport, TicketSource};
use crate::types::{Dataset, Domain, Tier, TimeWindow};
use crate::widgets::{create_default_registry, WidgetInput, WidgetOutput, WidgetRegistry};
use crate::window::TimeWindowResolver;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

/// Range used by widgets that declare no `range` parameter.
const UNBOUNDED_RANGE: &str = "all";

/// A rendered widget plus how its data was obtained.
#[derive(Debug, Clone, Serialize)]
pub struct RenderedWidget {
    pub widget: String,
    pub domain: Domain,
    pub params: NormalizedParams,
    pub window: TimeWindow,
    /// Tier that served the data; `None` when every tier came up empty
    pub tier: Option<Tier>,
    /// Records left after filtering
    pub records: usize,
    pub attempts: Vec<TierAttempt>,
    pub output: WidgetOutput,
}

pub struct Dashboard {
    registry: WidgetRegistry,
    cache: Arc<MemoryCache>,
    resolver: TieredDataResolver,
}

impl Dashboard {
    /// Assemble a dashboard from parts. `resolver` should share `cache`.
    pub fn new(registry: WidgetRegistry, cache: Arc<MemoryCache>, resolver: TieredDataResolver) -> Self {
        Self {
            registry,
            cache,
            resolver,
        }
    }

    /// Default widgets over the configured tier chain.
    pub fn from_config(config: &Config) -> Self {
        let cache = Arc::new(MemoryCache::new(config.cache.max_entries));
        let resolver = TieredDataResolver::from_config(config, cache.clone());
        Self::new(create_default_registry(), cache, resolver)
    }

    pub fn registry(&self) -> &WidgetRegistry {
        &self.registry
    }

    pub fn resolver(&self) -> &TieredDataResolver {
        &self.resolver
    }

    pub fn cache(&self) -> &MemoryCache {
        &self.cache
    }

    /// Render a widget with "now" taken from the clock.
    pub async fn render(&self, name: &str, raw: &RawParams) -> Result<RenderedWidget> {
        self.render_at(name, raw, Utc::now()).await
    }

    /// Render a widget as of `now`.
    ///
    /// Only an unknown widget name is an error; bad parameters fall back to
    /// their defaults and backend failures produce an empty dataset.
    pub async fn render_at(&self, name: &str, raw: &RawParams, now: DateTime<Utc>) -> Result<RenderedWidget> {
        let spec = self.registry.resolve(name)?;
        let params = spec.schema.normalize(&with_domain_alias(raw));
        let domain = spec.domain_for(&params);
        let range = params.text("range").unwrap_or(UNBOUNDED_RANGE);
        let window =
            TimeWindowResolver::resolve_at(range, domain, now.with_timezone(&domain.timezone()));

        let resolution = self.resolver.resolve(domain, &window, range).await;
        let filtered = apply_filters(&resolution.dataset, &params);
        let dataset = filtered.as_ref().unwrap_or(resolution.dataset.as_ref());

        let output = spec.build(&WidgetInput {
            dataset,
            params: &params,
            window: &window,
        });
        tracing::info!(
            widget = name,
            domain = %domain,
            range,
            tier = resolution.tier.map(|t| t.as_str()).unwrap_or("none"),
            records = dataset.len(),
            "Rendered widget"
        );

        Ok(RenderedWidget {
            widget: spec.name.clone(),
            domain,
            records: dataset.len(),
            tier: resolution.tier,
            attempts: resolution.attempts,
            params,
            window,
            output,
        })
    }

    /// Sync tickets for `range` into `store`, then drop cached ticket datasets.
    pub async fn sync(&self, source: &dyn TicketSource, store: &SqliteStore, range: &str) -> Result<SyncReport> {
        let window = TimeWindowResolver::resolve(range, Domain::Tickets);
        let report = sync_tickets(source, store, &window).await?;
        self.cache.invalidate_domain(Domain::Tickets)?;
        Ok(report)
    }
}

/// Accept `domain` as a spelling of the `source` parameter.
fn with_domain_alias(raw: &RawParams) -> RawParams {
    let mut raw = raw.clone();
    if !raw.contains_key("source") {
        if let Some(domain) = raw.get("domain").cloned() {
            raw.insert("source".to_string(), domain);
        }
    }
    raw
}

fn contains_folded(list: &[String], value: &str) -> bool {
    list.iter().any(|item| item.trim().eq_ignore_ascii_case(value))
}

/// Apply the `agents`, `pipelines` and `exclude_pipelines` filters.
///
/// Returns `None` when no filter is active. An agent filter restricts the
/// dataset to agent-scoped records.
pub fn apply_filters(dataset: &Dataset, params: &NormalizedParams) -> Option<Dataset> {
    let agents = params.list("agents");
    let pipelines = params.list("pipelines");
    let excluded = params.list("exclude_pipelines");
    if agents.is_none() && pipelines.is_none() && excluded.is_none() {
        return None;
    }

    let records = dataset
        .records
        .iter()
        .filter(|r| match agents {
            Some(list) => r.agent.as_deref().is_some_and(|a| contains_folded(list, a)),
            None => true,
        })
        .filter(|r| match pipelines {
            Some(list) => r.pipeline.as_deref().is_some_and(|p| contains_folded(list, p)),
            None => true,
        })
        .filter(|r| match (excluded, r.pipeline.as_deref()) {
            (Some(list), Some(p)) => !contains_folded(list, p),
            _ => true,
        })
        .cloned()
        .collect();
    Some(Dataset::new(dataset.domain, records))
}
