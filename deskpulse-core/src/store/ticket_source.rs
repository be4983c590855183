//! HTTP client for the ticket-source CRM API
//!
//! Talks to a HubSpot-style v3 API: pipeline labels for resolving numeric
//! pipeline IDs, and a paged ticket search for syncing records.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::TicketSourceConfig;
use crate::error::{Error, Result};
use crate::types::{RawRow, TimeWindow};

/// Ticket properties requested from the search endpoint.
pub const TICKET_PROPERTIES: &[&str] = &[
    "subject",
    "hs_pipeline",
    "hs_pipeline_stage",
    "createdate",
    "hs_lastmodifieddate",
    "closed_date",
    "hubspot_owner_id",
    "hs_ticket_priority",
    "hs_ticket_category",
    "source_type",
    "first_agent_reply_date",
    "hs_object_id",
];

/// Upstream source of ticket records.
#[async_trait]
pub trait TicketSource: Send + Sync {
    /// Raw ticket rows created inside the window.
    async fn fetch_records(&self, window: &TimeWindow) -> Result<Vec<RawRow>>;

    /// Pipeline ID -> label map.
    async fn fetch_pipeline_names(&self) -> Result<HashMap<String, String>>;
}

#[derive(Debug, Deserialize)]
struct PipelinesResponse {
    #[serde(default)]
    results: Vec<Pipeline>,
}

#[derive(Debug, Deserialize)]
struct Pipeline {
    id: String,
    #[serde(default)]
    label: String,
}

#[derive(Debug, Deserialize)]
struct OwnersResponse {
    #[serde(default)]
    results: Vec<Owner>,
    paging: Option<Paging>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Owner {
    id: String,
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    last_name: Option<String>,
    #[serde(default)]
    email: Option<String>,
}

impl Owner {
    fn display_name(&self) -> Option<String> {
        let full = format!(
            "{} {}",
            self.first_name.as_deref().unwrap_or(""),
            self.last_name.as_deref().unwrap_or("")
        );
        let full = full.trim();
        if !full.is_empty() {
            Some(full.to_string())
        } else {
            self.email.clone().filter(|e| !e.is_empty())
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
    paging: Option<Paging>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    id: String,
    #[serde(default)]
    properties: serde_json::Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct Paging {
    next: Option<NextPage>,
}

#[derive(Debug, Deserialize)]
struct NextPage {
    after: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchRequest<'a> {
    filter_groups: Vec<FilterGroup>,
    properties: &'a [&'a str],
    limit: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    after: Option<String>,
}

#[derive(Debug, Serialize)]
struct FilterGroup {
    filters: Vec<Filter>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Filter {
    property_name: &'static str,
    operator: &'static str,
    value: String,
}

/// HTTP client for the ticket-source API
pub struct HubSpotClient {
    config: TicketSourceConfig,
    http_client: reqwest::Client,
    base_url: String,
}

impl HubSpotClient {
    /// Create a new client from configuration
    ///
    /// Returns an error if the configuration is invalid or missing required fields.
    pub fn new(config: TicketSourceConfig) -> Result<Self> {
        config.validate()?;

        let token = config
            .access_token
            .clone()
            .ok_or_else(|| Error::Config("ticket_source.access_token is required".to_string()))?;
        let base_url = config.base_url.trim_end_matches('/').to_string();

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| Error::Config(format!("invalid access_token: {}", e)))?,
        );

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            config,
            http_client,
            base_url,
        })
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "unknown".to_string());
        Err(Error::backend(
            "ticket_source",
            format!("API error ({}): {}", status, error_text),
        ))
    }

    /// Owner ID -> display name map.
    pub async fn fetch_owners(&self) -> Result<HashMap<String, String>> {
        let url = format!("{}/crm/v3/owners", self.base_url);
        let mut owners = HashMap::new();
        let mut after: Option<String> = None;

        loop {
            let mut request = self
                .http_client
                .get(&url)
                .query(&[("limit", self.config.page_size.min(100).to_string())]);
            if let Some(cursor) = &after {
                request = request.query(&[("after", cursor)]);
            }
            let page: OwnersResponse = Self::check(request.send().await?).await?.json().await?;
            for owner in &page.results {
                if let Some(name) = owner.display_name() {
                    owners.insert(owner.id.clone(), name);
                }
            }
            after = page.paging.and_then(|p| p.next).map(|n| n.after);
            if after.is_none() {
                break;
            }
        }

        tracing::info!(owners = owners.len(), "Fetched ticket owners");
        Ok(owners)
    }

    fn search_request(&self, window: &TimeWindow, after: Option<String>) -> SearchRequest<'static> {
        let mut filters = Vec::new();
        if let Some(start) = window.start_utc() {
            filters.push(Filter {
                property_name: "createdate",
                operator: "GTE",
                value: start.timestamp_millis().to_string(),
            });
        }
        if let Some(end) = window.end_utc() {
            filters.push(Filter {
                property_name: "createdate",
                operator: "LT",
                value: end.timestamp_millis().to_string(),
            });
        }
        let filter_groups = if filters.is_empty() {
            Vec::new()
        } else {
            vec![FilterGroup { filters }]
        };
        SearchRequest {
            filter_groups,
            properties: TICKET_PROPERTIES,
            limit: self.config.page_size,
            after,
        }
    }
}

/// Flatten a search result into a raw row, resolving the owner id.
fn flatten(result: SearchResult, owners: &HashMap<String, String>) -> RawRow {
    let mut row = result.properties;
    row.insert("id".to_string(), Value::String(result.id));
    let owner = row
        .get("hubspot_owner_id")
        .and_then(Value::as_str)
        .and_then(|id| owners.get(id))
        .cloned();
    if let Some(name) = owner {
        row.insert("Ticket owner".to_string(), Value::String(name));
    }
    row
}

#[async_trait]
impl TicketSource for HubSpotClient {
    async fn fetch_records(&self, window: &TimeWindow) -> Result<Vec<RawRow>> {
        let owners = match self.fetch_owners().await {
            Ok(owners) => owners,
            Err(e) => {
                tracing::warn!(error = %e, "Owner lookup failed, tickets will carry raw owner ids");
                HashMap::new()
            }
        };

        let url = format!("{}/crm/v3/objects/tickets/search", self.base_url);
        let mut rows = Vec::new();
        let mut after = None;

        loop {
            let body = self.search_request(window, after.take());
            let response = self.http_client.post(&url).json(&body).send().await?;
            let page: SearchResponse = Self::check(response).await?.json().await?;
            rows.extend(page.results.into_iter().map(|r| flatten(r, &owners)));

            after = page.paging.and_then(|p| p.next).map(|n| n.after);
            if after.is_none() {
                break;
            }
        }

        tracing::info!(rows = rows.len(), "Fetched tickets from ticket source");
        Ok(rows)
    }

    async fn fetch_pipeline_names(&self) -> Result<HashMap<String, String>> {
        let url = format!("{}/crm/v3/pipelines/tickets", self.base_url);
        let response = self.http_client.get(&url).send().await?;
        let body: PipelinesResponse = Self::check(response).await?.json().await?;

        let names: HashMap<String, String> = body
            .results
            .into_iter()
            .filter(|p| !p.id.is_empty() && !p.label.is_empty())
            .map(|p| (p.id, p.label))
            .collect();
        tracing::info!(pipelines = names.len(), "Fetched ticket pipelines");
        Ok(names)
    }
}
