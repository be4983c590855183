//! Agent and pipeline alias tables.

use crate::types::AgentKind;
use std::collections::HashMap;

/// Raw owner name variants (lowercase, single-spaced) -> canonical agent.
const AGENT_ALIASES: &[(&str, &str)] = &[
    ("bhushan", "Bhushan"),
    ("shan", "Bhushan"),
    ("shan d", "Bhushan"),
    ("girly", "Girly"),
    ("girly e", "Girly"),
    ("gillie", "Girly"),
    ("gillie e", "Girly"),
    ("nova", "Nova"),
    ("nora", "Nova"),
    ("nora n", "Nova"),
    ("francis", "Francis"),
    ("chris", "Francis"),
    ("chris s", "Francis"),
];

/// Chat bot operator nicks -> display name.
const BOT_ALIASES: &[(&str, &str)] = &[
    ("wynn ai", "Wynn AI"),
    ("sales agent", "Wynn AI"),
    ("agent scrape", "Agent Scrape"),
    ("traject data live chat", "Agent Scrape"),
    ("traject data customer support", "Agent Scrape"),
    ("chatbot", "Agent Scrape"),
    ("customer support test bot", "Test Bot"),
];

/// Pipeline IDs from the ticket source -> long pipeline names.
const PIPELINE_ID_FALLBACK: &[(&str, &str)] = &[
    ("0", "Support Pipeline"),
    ("147307289", "Live Chat"),
    ("648529801", "Upgrades/Downgrades"),
    ("667370066", "Success"),
    ("724973238", "Customer Onboarding"),
    ("76337708", "Dev Tickets"),
    ("77634704", "Marketing, Finance"),
    ("803109779", "Product Testing Requests - Enterprise"),
    ("803165721", "Trial Account Requests - Enterprise"),
    ("95256452", "Enterprise and VIP Tickets"),
    ("95947431", "SPAM Tickets"),
];

/// Long pipeline names -> short display names.
const PIPELINE_DISPLAY: &[(&str, &str)] = &[
    ("support pipeline", "Support"),
    ("enterprise and vip tickets", "Enterprise & VIP"),
    ("product testing requests - enterprise", "Product Testing"),
    ("trial account requests - enterprise", "Trial Requests"),
    ("marketing, finance", "Marketing & Finance"),
    ("spam tickets", SPAM_PIPELINE),
];

/// Display name of the pipeline whose records are removed from every dataset.
pub const SPAM_PIPELINE: &str = "SPAM";

/// Lowercase, trim and collapse internal whitespace.
pub fn fold_name(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Many-to-one mapping from owner name variants to canonical agents.
#[derive(Debug, Clone)]
pub struct AgentDirectory {
    humans: HashMap<String, String>,
    bots: HashMap<String, String>,
}

impl Default for AgentDirectory {
    fn default() -> Self {
        Self::new(AGENT_ALIASES, BOT_ALIASES)
    }
}

impl AgentDirectory {
    pub fn new(humans: &[(&str, &str)], bots: &[(&str, &str)]) -> Self {
        let fold = |pairs: &[(&str, &str)]| {
            pairs
                .iter()
                .map(|(raw, canonical)| (fold_name(raw), canonical.to_string()))
                .collect()
        };
        Self {
            humans: fold(humans),
            bots: fold(bots),
        }
    }

    /// Canonical name and kind for a raw owner value.
    ///
    /// Unmapped names come back as `(None, Unknown)`; they are dropped from
    /// agent-scoped views rather than treated as errors.
    pub fn lookup(&self, raw: &str) -> (Option<&str>, AgentKind) {
        let key = fold_name(raw);
        if key.is_empty() {
            return (None, AgentKind::Unknown);
        }
        if let Some(name) = self.humans.get(&key) {
            return (Some(name.as_str()), AgentKind::Human);
        }
        if let Some(name) = self.bots.get(&key) {
            return (Some(name.as_str()), AgentKind::Bot);
        }
        (None, AgentKind::Unknown)
    }
}

/// Pipeline identifier and display-name aliases.
#[derive(Debug, Clone)]
pub struct PipelineAliases {
    id_fallback: HashMap<String, String>,
    display: HashMap<String, String>,
}

impl Default for PipelineAliases {
    fn default() -> Self {
        Self {
            id_fallback: PIPELINE_ID_FALLBACK
                .iter()
                .map(|(id, name)| (id.to_string(), name.to_string()))
                .collect(),
            display: PIPELINE_DISPLAY
                .iter()
                .map(|(long, short)| (fold_name(long), short.to_string()))
                .collect(),
        }
    }
}

impl PipelineAliases {
    /// Canonical display name for one raw pipeline value.
    ///
    /// Numeric IDs go through `live` first, then the static fallback map;
    /// unmapped IDs pass through unchanged.
    pub fn canonicalize(&self, raw: &str, live: Option<&HashMap<String, String>>) -> String {
        let trimmed = raw.trim();
        let long = if is_pipeline_id(trimmed) {
            live.and_then(|names| names.get(trimmed))
                .or_else(|| self.id_fallback.get(trimmed))
                .map(|name| name.trim())
                .unwrap_or(trimmed)
        } else {
            trimmed
        };
        self.display
            .get(&fold_name(long))
            .cloned()
            .unwrap_or_else(|| long.to_string())
    }
}

/// Whether a pipeline value is a numeric source-system ID.
pub fn is_pipeline_id(value: &str) -> bool {
    let value = value.trim();
    !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit())
}
