//! Built-in widget builders
//!
//! Each builder turns a resolved dataset into labels and series. Response
//! statistics use weekday records only; weekend tickets sit in a separate
//! queue with different service targets.

use super::{Series, WidgetInput, WidgetOutput, WidgetRegistry, WidgetSpec};
use crate::params::ParamSchema;
use crate::types::{CanonicalRecord, Domain};
use chrono::{Datelike, Duration, NaiveDate};
use std::collections::{BTreeMap, HashMap};

/// Range tokens offered by every widget.
pub const RANGE_VALUES: &[&str] = &["all", "ytd", "13w", "52w", "26w", "12w", "8w", "4w", "7d"];

const DEFAULT_RANGE: &str = "12w";
const SOURCES: &[&str] = &["tickets", "chats"];
const STATS: &[&str] = &["median", "mean"];

/// Create a registry with all built-in widgets.
pub fn create_default_registry() -> WidgetRegistry {
    let mut registry = WidgetRegistry::new();
    let range = || ParamSchema::new().enumeration("range", RANGE_VALUES, DEFAULT_RANGE);

    registry.insert(
        WidgetSpec::new(
            "weekly_response_time_trends",
            weekly_response_time_trends,
            range()
                .enumeration("source", SOURCES, "tickets")
                .enumeration("stat", STATS, "median"),
        )
        .with_title("Weekly Response Time Trends")
        .with_description("Weekday first-response time per week"),
    );
    registry.insert(
        WidgetSpec::new(
            "volume_daily_historic",
            volume_daily_historic,
            range()
                .enumeration("source", SOURCES, "tickets")
                .flag("include_weekends", true),
        )
        .with_title("Daily Volume")
        .with_description("Records created per day"),
    );
    registry.insert(
        WidgetSpec::new("tickets_by_pipeline", tickets_by_pipeline, range().list("pipelines"))
            .with_title("Tickets by Pipeline")
            .with_description("Ticket counts per pipeline"),
    );
    registry.insert(
        WidgetSpec::new(
            "weekday_weekend_distribution",
            weekday_weekend_distribution,
            range(),
        )
        .with_title("Weekday vs Weekend")
        .with_description("Records created inside and outside the weekend window"),
    );
    registry.insert(
        WidgetSpec::new(
            "agent_ticket_volume_distribution",
            agent_ticket_volume_distribution,
            range().list("agents"),
        )
        .with_title("Agent Ticket Volume")
        .with_description("Weekday tickets handled per support agent"),
    );
    registry.insert(
        WidgetSpec::new(
            "agent_response_time_comparison",
            agent_response_time_comparison,
            range()
                .list("agents")
                .list_with_default("exclude_pipelines", Some(&["Live Chat"])),
        )
        .with_title("Agent Response Times")
        .with_description("Mean and median weekday response time per agent"),
    );
    registry.insert(
        WidgetSpec::new(
            "weekly_response_breakdown",
            weekly_response_breakdown,
            range()
                .enumeration("stat", STATS, "median")
                .flag("show_trend", true),
        )
        .with_title("Weekly Response Breakdown")
        .with_description("Weekly response statistic with an optional linear trend"),
    );

    registry
}

// ============================================
// Statistics helpers
// ============================================

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

fn statistic(name: &str, values: &[f64]) -> Option<f64> {
    match name {
        "mean" => mean(values),
        _ => median(values),
    }
}

/// Least-squares line through `(i, y_i)`, evaluated at every index.
fn linear_trend(values: &[f64]) -> Option<Vec<f64>> {
    if values.len() < 2 {
        return None;
    }
    let n = values.len() as f64;
    let mean_x = (n - 1.0) / 2.0;
    let mean_y = values.iter().sum::<f64>() / n;
    let (num, den) = values
        .iter()
        .enumerate()
        .fold((0.0, 0.0), |(num, den), (i, y)| {
            let dx = i as f64 - mean_x;
            (num + dx * (y - mean_y), den + dx * dx)
        });
    let slope = num / den;
    let intercept = mean_y - slope * mean_x;
    Some(
        (0..values.len())
            .map(|i| intercept + slope * i as f64)
            .collect(),
    )
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Monday of the local week a record was created in.
fn week_start(record: &CanonicalRecord, domain: Domain) -> Option<NaiveDate> {
    let day = record.created_local(domain.timezone())?.date_naive();
    Some(day - Duration::days(day.weekday().num_days_from_monday() as i64))
}

/// Weekday response hours grouped by week.
fn weekly_response_hours(input: &WidgetInput<'_>) -> BTreeMap<NaiveDate, Vec<f64>> {
    let domain = input.dataset.domain;
    let mut weeks: BTreeMap<NaiveDate, Vec<f64>> = BTreeMap::new();
    for record in &input.dataset.records {
        if record.is_weekend {
            continue;
        }
        let (Some(week), Some(hours)) = (week_start(record, domain), record.response_hours) else {
            continue;
        };
        weeks.entry(week).or_default().push(hours);
    }
    weeks
}

fn stat_label(stat: &str) -> &'static str {
    match stat {
        "mean" => "Mean response (hours)",
        _ => "Median response (hours)",
    }
}

// ============================================
// Builders
// ============================================

fn weekly_response_time_trends(input: &WidgetInput<'_>) -> WidgetOutput {
    let stat = input.params.text("stat").unwrap_or("median");
    let mut output = WidgetOutput::new("Weekly Response Time Trends");
    let mut values = Vec::new();
    for (week, hours) in weekly_response_hours(input) {
        if let Some(value) = statistic(stat, &hours) {
            output.labels.push(week.to_string());
            values.push(round2(value));
        }
    }
    output.series.push(Series::new(stat_label(stat), values));
    output
}

fn volume_daily_historic(input: &WidgetInput<'_>) -> WidgetOutput {
    let include_weekends = input.params.flag("include_weekends");
    let tz = input.dataset.domain.timezone();
    let mut days: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    for (record, ts) in input.dataset.dated() {
        if !include_weekends && record.is_weekend {
            continue;
        }
        *days.entry(ts.with_timezone(&tz).date_naive()).or_default() += 1.0;
    }

    let mut output = WidgetOutput::new("Daily Volume");
    output.labels = days.keys().map(NaiveDate::to_string).collect();
    output
        .series
        .push(Series::new("Records", days.into_values().collect()));
    output
}

/// Counts per key, largest first, ties by name.
fn ranked_counts<'a>(keys: impl Iterator<Item = &'a str>) -> Vec<(String, f64)> {
    let mut counts: HashMap<&str, f64> = HashMap::new();
    for key in keys {
        *counts.entry(key).or_default() += 1.0;
    }
    let mut ranked: Vec<(String, f64)> = counts
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked
}

fn tickets_by_pipeline(input: &WidgetInput<'_>) -> WidgetOutput {
    let ranked = ranked_counts(
        input
            .dataset
            .records
            .iter()
            .map(|r| r.pipeline.as_deref().unwrap_or("Unassigned")),
    );
    let mut output = WidgetOutput::new("Tickets by Pipeline");
    let (labels, values) = ranked.into_iter().unzip();
    output.labels = labels;
    output.series.push(Series::new("Tickets", values));
    output
}

fn weekday_weekend_distribution(input: &WidgetInput<'_>) -> WidgetOutput {
    let (weekend, weekday) = input
        .dataset
        .dated()
        .fold((0usize, 0usize), |(weekend, weekday), (record, _)| {
            if record.is_weekend {
                (weekend + 1, weekday)
            } else {
                (weekend, weekday + 1)
            }
        });

    let mut output = WidgetOutput::new("Weekday vs Weekend");
    output.labels = vec!["Weekday".to_string(), "Weekend".to_string()];
    output
        .series
        .push(Series::new("Records", vec![weekday as f64, weekend as f64]));
    output
}

fn agent_ticket_volume_distribution(input: &WidgetInput<'_>) -> WidgetOutput {
    let ranked = ranked_counts(
        input
            .dataset
            .agent_scoped()
            .filter(|(record, _)| record.created_at.is_some() && !record.is_weekend)
            .map(|(_, agent)| agent),
    );
    let mut output = WidgetOutput::new("Agent Ticket Volume");
    let (labels, values) = ranked.into_iter().unzip();
    output.labels = labels;
    output.series.push(Series::new("Weekday tickets", values));
    output
}

fn agent_response_time_comparison(input: &WidgetInput<'_>) -> WidgetOutput {
    let mut per_agent: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for (record, agent) in input.dataset.agent_scoped() {
        if record.created_at.is_none() || record.is_weekend {
            continue;
        }
        if let Some(hours) = record.response_hours {
            per_agent.entry(agent).or_default().push(hours);
        }
    }

    let mut output = WidgetOutput::new("Agent Response Times");
    let mut means = Vec::new();
    let mut medians = Vec::new();
    for (agent, hours) in &per_agent {
        if let (Some(m), Some(md)) = (mean(hours), median(hours)) {
            output.labels.push(agent.to_string());
            means.push(round2(m));
            medians.push(round2(md));
        }
    }
    output.series.push(Series::new("Mean (hours)", means));
    output.series.push(Series::new("Median (hours)", medians));
    output
}

fn weekly_response_breakdown(input: &WidgetInput<'_>) -> WidgetOutput {
    let mut output = weekly_response_time_trends(input);
    output.title = "Weekly Response Breakdown".to_string();
    if input.params.flag("show_trend") {
        let trend = output
            .series
            .first()
            .and_then(|s| linear_trend(&s.values));
        if let Some(trend) = trend {
            output
                .series
                .push(Series::new("Trend", trend.into_iter().map(round2).collect()));
        }
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::RawParams;
    use crate::types::{AgentKind, Dataset, TimeWindow};
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn record(day: u32, hour: u32, agent: Option<&str>, hours: Option<f64>) -> CanonicalRecord {
        let mut r = CanonicalRecord::blank();
        // March 2025: the 3rd is a Monday
        r.created_at = Utc.with_ymd_and_hms(2025, 3, day, hour, 0, 0).single();
        r.agent = agent.map(str::to_string);
        r.agent_kind = if agent.is_some() { AgentKind::Human } else { AgentKind::Unknown };
        r.response_hours = hours;
        r.pipeline = Some("Support".to_string());
        r
    }

    fn render(name: &str, dataset: &Dataset, raw: RawParams) -> WidgetOutput {
        let registry = create_default_registry();
        let spec = registry.resolve(name).unwrap();
        let params = spec.schema.normalize(&raw);
        let window = TimeWindow::unbounded(dataset.domain.timezone());
        spec.build(&WidgetInput {
            dataset,
            params: &params,
            window: &window,
        })
    }

    fn raw(pairs: &[(&str, serde_json::Value)]) -> RawParams {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn test_registry_catalogue() {
        let registry = create_default_registry();
        assert_eq!(registry.len(), 7);
        for spec in registry.specs() {
            match spec.schema.get("range") {
                Some(crate::params::ParamSpec::Enum { values, default }) => {
                    assert_eq!(values.len(), RANGE_VALUES.len());
                    assert_eq!(default, "12w");
                }
                other => panic!("{} has no range enum: {:?}", spec.name, other),
            }
        }
    }

    #[test]
    fn test_statistics() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 2.0, 3.0]), Some(2.5));
        assert_eq!(mean(&[1.0, 2.0, 6.0]), Some(3.0));
        assert_eq!(median(&[]), None);
        assert_eq!(linear_trend(&[1.0, 2.0, 3.0]), Some(vec![1.0, 2.0, 3.0]));
        assert_eq!(linear_trend(&[5.0]), None);
    }

    #[test]
    fn test_weekly_trend_groups_by_monday() {
        let dataset = Dataset::new(
            Domain::Tickets,
            vec![
                record(4, 15, Some("Nova"), Some(2.0)),
                record(5, 15, Some("Nova"), Some(4.0)),
                record(11, 15, Some("Girly"), Some(1.0)),
                record(12, 15, Some("Girly"), None),
            ],
        );
        let output = render("weekly_response_time_trends", &dataset, raw(&[("stat", json!("mean"))]));
        assert_eq!(output.labels, vec!["2025-03-03", "2025-03-10"]);
        assert_eq!(output.series[0].values, vec![3.0, 1.0]);
    }

    #[test]
    fn test_volume_excludes_weekends_on_request() {
        let mut weekend = record(8, 15, None, None);
        weekend.is_weekend = true;
        let dataset = Dataset::new(
            Domain::Tickets,
            vec![record(4, 15, None, None), record(4, 16, None, None), weekend],
        );

        let output = render("volume_daily_historic", &dataset, RawParams::new());
        assert_eq!(output.labels, vec!["2025-03-04", "2025-03-08"]);
        assert_eq!(output.series[0].values, vec![2.0, 1.0]);

        let output = render(
            "volume_daily_historic",
            &dataset,
            raw(&[("include_weekends", json!("false"))]),
        );
        assert_eq!(output.labels, vec!["2025-03-04"]);
    }

    #[test]
    fn test_agent_widgets() {
        let dataset = Dataset::new(
            Domain::Tickets,
            vec![
                record(4, 15, Some("Nova"), Some(1.0)),
                record(4, 16, Some("Nova"), Some(3.0)),
                record(5, 15, Some("Girly"), Some(2.0)),
                record(5, 16, None, Some(9.0)),
            ],
        );

        let volume = render("agent_ticket_volume_distribution", &dataset, RawParams::new());
        assert_eq!(volume.labels, vec!["Nova", "Girly"]);
        assert_eq!(volume.series[0].values, vec![2.0, 1.0]);

        let times = render("agent_response_time_comparison", &dataset, RawParams::new());
        assert_eq!(times.labels, vec!["Girly", "Nova"]);
        assert_eq!(times.series[0].values, vec![2.0, 2.0]);
        assert_eq!(times.series[1].values, vec![2.0, 2.0]);
    }

    #[test]
    fn test_breakdown_trend_toggle() {
        let dataset = Dataset::new(
            Domain::Tickets,
            vec![
                record(4, 15, Some("Nova"), Some(1.0)),
                record(11, 15, Some("Nova"), Some(2.0)),
                record(18, 15, Some("Nova"), Some(3.0)),
            ],
        );
        let output = render("weekly_response_breakdown", &dataset, RawParams::new());
        assert_eq!(output.series.len(), 2);
        assert_eq!(output.series[1].values, vec![1.0, 2.0, 3.0]);

        let output = render(
            "weekly_response_breakdown",
            &dataset,
            raw(&[("show_trend", json!("off"))]),
        );
        assert_eq!(output.series.len(), 1);
    }

    #[test]
    fn test_pipeline_and_weekend_counts() {
        let mut live = record(4, 15, None, None);
        live.pipeline = Some("Live Chat".to_string());
        live.is_weekend = true;
        let dataset = Dataset::new(
            Domain::Tickets,
            vec![record(4, 15, None, None), record(5, 15, None, None), live],
        );

        let by_pipeline = render("tickets_by_pipeline", &dataset, RawParams::new());
        assert_eq!(by_pipeline.labels, vec!["Support", "Live Chat"]);

        let split = render("weekday_weekend_distribution", &dataset, RawParams::new());
        assert_eq!(split.series[0].values, vec![2.0, 1.0]);
    }

    #[test]
    fn test_undated_records_are_not_bucketed() {
        let mut undated = CanonicalRecord::blank();
        undated.agent = Some("Nova".to_string());
        undated.agent_kind = AgentKind::Human;
        undated.response_hours = Some(5.0);
        let dataset = Dataset::new(Domain::Tickets, vec![undated]);

        let split = render("weekday_weekend_distribution", &dataset, RawParams::new());
        assert_eq!(split.series[0].values, vec![0.0, 0.0]);

        let volume = render("agent_ticket_volume_distribution", &dataset, RawParams::new());
        assert!(volume.labels.is_empty());
        assert!(volume.series[0].values.is_empty());

        let times = render("agent_response_time_comparison", &dataset, RawParams::new());
        assert!(times.labels.is_empty());
    }
}
