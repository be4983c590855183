//! Core domain types for deskpulse
//!
//! These types represent the canonical shape that every backing store's rows
//! are normalized into before widgets see them.
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Domain** | Which kind of record a request is about: support tickets or chat sessions |
//! | **Tier** | One backing source in the resolver's fallback chain |
//! | **Raw row** | A record as a backend returned it, with backend-specific field names |
//! | **Canonical record** | A row after field-name, timestamp and alias normalization |
//! | **Dataset** | The canonical records resolved for one domain and window |
//! | **Business day** | A weekday (Mon-Fri) in the domain's canonical timezone |

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

// ============================================
// Domain
// ============================================

/// Kind of record a request resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    Tickets,
    Chats,
}

impl Domain {
    /// Canonical civil timezone the domain's calendar is defined in.
    ///
    /// Tickets follow US Eastern; chats follow Canada/Atlantic.
    pub fn timezone(&self) -> Tz {
        match self {
            Domain::Tickets => chrono_tz::America::New_York,
            Domain::Chats => chrono_tz::America::Halifax,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Tickets => "tickets",
            Domain::Chats => "chats",
        }
    }

    /// Parse a domain name, defaulting to tickets for anything unrecognized.
    pub fn parse_or_default(value: &str) -> Self {
        value.parse().unwrap_or(Domain::Tickets)
    }
}

impl FromStr for Domain {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tickets" | "ticket" => Ok(Domain::Tickets),
            "chats" | "chat" => Ok(Domain::Chats),
            other => Err(format!("unknown domain: {other}")),
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================
// Tier
// ============================================

/// One backing source in the resolver's fallback chain, in resolution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// In-process dataset cache
    Cache,
    /// Primary live document store
    Primary,
    /// Batch-synced secondary mirror
    Mirror,
    /// Most recent previously materialized output
    Snapshot,
    /// Raw source extracts, reprocessed from scratch
    RawFiles,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Cache => "cache",
            Tier::Primary => "primary",
            Tier::Mirror => "mirror",
            Tier::Snapshot => "snapshot",
            Tier::RawFiles => "raw_files",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================
// Time window
// ============================================

/// A timezone-aware `[start, end)` bound.
///
/// `None` bounds are unbounded. `live_end` marks an `end` that is the
/// "now" instant at resolution time rather than a reproducible boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: Option<DateTime<Tz>>,
    pub end: Option<DateTime<Tz>>,
    pub timezone: Tz,
    pub live_end: bool,
}

impl TimeWindow {
    /// Window with neither bound ("all").
    pub fn unbounded(timezone: Tz) -> Self {
        Self {
            start: None,
            end: None,
            timezone,
            live_end: false,
        }
    }

    /// Window from `start` up to the live `now` instant.
    pub fn until_now(start: DateTime<Tz>, now: DateTime<Tz>) -> Self {
        Self {
            timezone: now.timezone(),
            start: Some(start),
            end: Some(now),
            live_end: true,
        }
    }

    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    /// Whether an instant falls inside `[start, end)`.
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        if let Some(start) = &self.start {
            if ts < start.with_timezone(&Utc) {
                return false;
            }
        }
        if let Some(end) = &self.end {
            if ts >= end.with_timezone(&Utc) {
                return false;
            }
        }
        true
    }

    pub fn start_utc(&self) -> Option<DateTime<Utc>> {
        self.start.map(|s| s.with_timezone(&Utc))
    }

    pub fn end_utc(&self) -> Option<DateTime<Utc>> {
        self.end.map(|e| e.with_timezone(&Utc))
    }
}

impl Serialize for TimeWindow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("TimeWindow", 4)?;
        state.serialize_field("start", &self.start.map(|s| s.to_rfc3339()))?;
        state.serialize_field("end", &self.end.map(|e| e.to_rfc3339()))?;
        state.serialize_field("timezone", self.timezone.name())?;
        state.serialize_field("live_end", &self.live_end)?;
        state.end()
    }
}

// ============================================
// Raw rows
// ============================================

/// A record as a backend returned it.
pub type RawRow = serde_json::Map<String, serde_json::Value>;

/// Rows from one tier, tagged with where they came from.
#[derive(Debug, Clone)]
pub struct SourceBatch {
    pub tier: Tier,
    pub domain: Domain,
    pub rows: Vec<RawRow>,
}

impl SourceBatch {
    pub fn new(tier: Tier, domain: Domain, rows: Vec<RawRow>) -> Self {
        Self { tier, domain, rows }
    }
}

// ============================================
// Canonical records
// ============================================

/// Classification of the account that owns a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    /// A member of the support team
    Human,
    /// An automated chat agent
    Bot,
    /// Anything else (managers, former staff, unassigned)
    Unknown,
}

/// A dataset row after normalization.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanonicalRecord {
    /// Dedup key (ticket id / chat id)
    pub record_id: Option<String>,
    /// Creation instant; `None` when missing or unparseable
    pub created_at: Option<DateTime<Utc>>,
    /// Canonical agent name; `None` excludes the record from agent-scoped views
    pub agent: Option<String>,
    /// Owner/agent value before aliasing
    pub raw_agent: Option<String>,
    pub agent_kind: AgentKind,
    /// Canonical pipeline display name (tickets only)
    pub pipeline: Option<String>,
    /// First-response latency in hours
    pub response_hours: Option<f64>,
    /// Created inside the Friday 18:00 - Monday 05:00 local window
    pub is_weekend: bool,
    /// Columns with no canonical counterpart, carried through unchanged
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl CanonicalRecord {
    /// An empty record to be filled by the normalizer.
    pub fn blank() -> Self {
        Self {
            record_id: None,
            created_at: None,
            agent: None,
            raw_agent: None,
            agent_kind: AgentKind::Unknown,
            pipeline: None,
            response_hours: None,
            is_weekend: false,
            extra: BTreeMap::new(),
        }
    }

    /// Creation instant in the given timezone.
    pub fn created_local(&self, tz: Tz) -> Option<DateTime<Tz>> {
        self.created_at.map(|ts| ts.with_timezone(&tz))
    }
}

/// The canonical records resolved for one domain.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dataset {
    pub domain: Domain,
    pub records: Vec<CanonicalRecord>,
}

impl Dataset {
    pub fn new(domain: Domain, records: Vec<CanonicalRecord>) -> Self {
        Self { domain, records }
    }

    pub fn empty(domain: Domain) -> Self {
        Self::new(domain, Vec::new())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Drop records dated outside the window.
    ///
    /// Records without a creation timestamp are kept: they are excluded from
    /// time-bucketed aggregation, not from the dataset.
    pub fn retain_window(&mut self, window: &TimeWindow) {
        if window.is_unbounded() {
            return;
        }
        self.records.retain(|r| match r.created_at {
            Some(ts) => window.contains(ts),
            None => true,
        });
    }

    /// Records that can be placed on a timeline.
    pub fn dated(&self) -> impl Iterator<Item = (&CanonicalRecord, DateTime<Utc>)> {
        self.records
            .iter()
            .filter_map(|r| r.created_at.map(|ts| (r, ts)))
    }

    /// Records owned by a known agent.
    pub fn agent_scoped(&self) -> impl Iterator<Item = (&CanonicalRecord, &str)> {
        self.records
            .iter()
            .filter_map(|r| r.agent.as_deref().map(|a| (r, a)))
    }
}
