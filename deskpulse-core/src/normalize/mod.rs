//! Entity normalization
//!
//! Every tier hands back rows in its own shape. [`EntityNormalizer`] routes
//! all of them through one function that produces [`CanonicalRecord`]s:
//!
//! 1. Column aliasing and value coercion ([`columns`])
//! 2. Weekend flag (derived when the row does not carry one)
//! 3. First-response latency
//! 4. Agent canonicalization ([`aliases::AgentDirectory`])
//! 5. Pipeline canonicalization ([`aliases::PipelineAliases`])
//! 6. Deduplication by record id, first occurrence wins
//! 7. SPAM pipeline removal
//!
//! Normalizing already-canonical rows yields the same records.

pub mod aliases;
pub mod columns;

use crate::types::{AgentKind, CanonicalRecord, Dataset, Domain, RawRow, SourceBatch};
use aliases::{is_pipeline_id, AgentDirectory, PipelineAliases, SPAM_PIPELINE};
use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};
use chrono_tz::Tz;
use columns::{canonical_field, Field};
use serde::Serialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};


/// Pipeline whose tickets are answered by chat, with a fixed latency.
pub const LIVE_CHAT_PIPELINE: &str = "Live Chat";

const LIVE_CHAT_RESPONSE_SECS: f64 = 30.0;

/// Counters from one normalization pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NormalizeStats {
    pub input_rows: usize,
    pub duplicates_dropped: usize,
    pub spam_removed: usize,
    pub unmapped_agents: usize,
    pub undated: usize,
}

/// Canonicalizes rows from any tier into one stable schema.
#[derive(Debug, Clone, Default)]
pub struct EntityNormalizer {
    agents: AgentDirectory,
    pipelines: PipelineAliases,
}

impl EntityNormalizer {
    pub fn new(agents: AgentDirectory, pipelines: PipelineAliases) -> Self {
        Self { agents, pipelines }
    }

    /// Whether the batch's pipeline values are all numeric source IDs.
    ///
    /// Only then is a live ID->name lookup worth attempting.
    pub fn needs_pipeline_lookup(&self, batch: &SourceBatch) -> bool {
        if batch.domain != Domain::Tickets {
            return false;
        }
        let mut values = batch
            .rows
            .iter()
            .filter_map(|row| field_value(batch.domain, row, Field::Pipeline))
            .filter_map(columns::parse_text)
            .peekable();
        values.peek().is_some() && values.all(|v| is_pipeline_id(&v))
    }

    /// Normalize a batch into a dataset.
    ///
    /// `live_pipelines` is the ID->name map fetched from the ticket source,
    /// when one was available.
    pub fn normalize(
        &self,
        batch: &SourceBatch,
        live_pipelines: Option<&HashMap<String, String>>,
    ) -> (Dataset, NormalizeStats) {
        let domain = batch.domain;
        let mut stats = NormalizeStats {
            input_rows: batch.rows.len(),
            ..Default::default()
        };

        let mut seen = HashSet::new();
        let mut records = Vec::with_capacity(batch.rows.len());
        for row in &batch.rows {
            let record = self.normalize_row(domain, row, live_pipelines);
            if let Some(id) = &record.record_id {
                if !seen.insert(id.clone()) {
                    stats.duplicates_dropped += 1;
                    continue;
                }
            }
            if record.created_at.is_none() {
                stats.undated += 1;
            }
            if record.agent_kind == AgentKind::Unknown && record.raw_agent.is_some() {
                stats.unmapped_agents += 1;
            }
            records.push(record);
        }

        // Business rule: applied after every other step
        let before = records.len();
        records.retain(|r| r.pipeline.as_deref() != Some(SPAM_PIPELINE));
        stats.spam_removed = before - records.len();

        if stats.duplicates_dropped > 0 {
            tracing::info!(
                domain = %domain,
                tier = %batch.tier,
                dropped = stats.duplicates_dropped,
                "Dropped duplicate records"
            );
        }
        if stats.spam_removed > 0 {
            tracing::debug!(domain = %domain, removed = stats.spam_removed, "Removed SPAM records");
        }
        if stats.unmapped_agents > 0 {
            tracing::debug!(
                domain = %domain,
                unmapped = stats.unmapped_agents,
                "Records owned by non-support accounts"
            );
        }

        (Dataset::new(domain, records), stats)
    }

    /// Normalize a single row.
    pub fn normalize_row(
        &self,
        domain: Domain,
        row: &RawRow,
        live_pipelines: Option<&HashMap<String, String>>,
    ) -> CanonicalRecord {
        let mut record = CanonicalRecord::blank();
        let mut weekend_flag = None;
        let mut first_response_at = None;
        let mut response_hours = None;
        let mut response_secs = None;
        let mut raw_pipeline = None;

        for (header, value) in row {
            let Some(field) = canonical_field(domain, header) else {
                let carried = if columns::is_temporal_header(header) {
                    columns::parse_timestamp(value, columns::naive_zone(domain, header))
                        .map(|ts| Value::String(ts.to_rfc3339()))
                        .unwrap_or(Value::Null)
                } else {
                    value.clone()
                };
                record.extra.insert(header.clone(), carried);
                continue;
            };
            match field {
                Field::RecordId => {
                    fill(&mut record.record_id, || columns::parse_text(value).map(normalize_id))
                }
                Field::CreatedAt => fill(&mut record.created_at, || {
                    columns::parse_timestamp(value, columns::naive_zone(domain, header))
                }),
                Field::Owner => fill(&mut record.raw_agent, || columns::parse_text(value)),
                Field::Pipeline => fill(&mut raw_pipeline, || columns::parse_text(value)),
                Field::FirstResponseAt => fill(&mut first_response_at, || {
                    columns::parse_timestamp(value, columns::naive_zone(domain, header))
                }),
                Field::ResponseHours => {
                    fill(&mut response_hours, || columns::parse_number(value))
                }
                Field::ResponseSeconds => {
                    fill(&mut response_secs, || columns::parse_number(value))
                }
                Field::Weekend => fill(&mut weekend_flag, || columns::parse_flag(value)),
            }
        }

        let tz = domain.timezone();
        record.is_weekend = weekend_flag.unwrap_or_else(|| {
            record
                .created_local(tz)
                .map(|local| is_weekend(&local))
                .unwrap_or(false)
        });

        if let Some(raw) = &record.raw_agent {
            let (name, kind) = self.agents.lookup(raw);
            record.agent = name.map(str::to_string);
            record.agent_kind = kind;
        }

        record.pipeline = raw_pipeline.map(|p| self.pipelines.canonicalize(&p, live_pipelines));

        record.response_hours = match domain {
            Domain::Tickets => ticket_response_hours(
                response_hours,
                record.pipeline.as_deref(),
                record.created_at,
                first_response_at,
            ),
            Domain::Chats => response_secs
                .filter(|s| *s >= 0.0)
                .map(|s| s / 3600.0)
                .or(response_hours.filter(|h| *h >= 0.0)),
        };

        record
    }
}

fn fill<T>(slot: &mut Option<T>, parse: impl FnOnce() -> Option<T>) {
    if slot.is_none() {
        *slot = parse();
    }
}

fn field_value<'a>(domain: Domain, row: &'a RawRow, field: Field) -> Option<&'a Value> {
    row.iter()
        .find(|(header, _)| canonical_field(domain, header) == Some(field))
        .map(|(_, value)| value)
}

/// CSV exports render integer ids as floats ("1234.0").
pub(crate) fn normalize_id(id: String) -> String {
    match id.strip_suffix(".0") {
        Some(stripped) if !stripped.is_empty() && stripped.bytes().all(|b| b.is_ascii_digit()) => {
            stripped.to_string()
        }
        _ => id,
    }
}

fn ticket_response_hours(
    explicit: Option<f64>,
    pipeline: Option<&str>,
    created: Option<DateTime<Utc>>,
    first_response: Option<DateTime<Utc>>,
) -> Option<f64> {
    if let Some(hours) = explicit.filter(|h| *h >= 0.0) {
        return Some(hours);
    }
    if pipeline == Some(LIVE_CHAT_PIPELINE) {
        return Some(LIVE_CHAT_RESPONSE_SECS / 3600.0);
    }
    let delta = first_response? - created?;
    let secs = delta.num_seconds();
    (secs > 0).then(|| secs as f64 / 3600.0)
}

/// Friday from 18:00, all of Saturday and Sunday, Monday before 05:00.
pub fn is_weekend(local: &DateTime<Tz>) -> bool {
    match local.weekday() {
        Weekday::Sat | Weekday::Sun => true,
        Weekday::Fri => local.hour() >= 18,
        Weekday::Mon => local.hour() < 5,
        _ => false,
    }
}
