//! deskpulse - support ticket and chat dashboard analytics
//!
//! Lists widgets, resolves range tokens, renders widgets through the tiered
//! resolver and syncs tickets from the CRM into the document store.

use deskpulse_core::store::HubSpotClient;
use deskpulse_core::widgets::WidgetOutput;
use deskpulse_core::{
    Config, Dashboard, Domain, ParamSpec, RawParams, RenderedWidget, SqliteStore,
    TimeWindowResolver,
};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "deskpulse")]
#[command(about = "Support ticket and chat dashboard analytics")]
#[command(version)]
struct Args {
    /// Output format
    #[arg(short, long, value_enum, default_value_t = Format::Text, global = true)]
    format: Format,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// List registered widgets and their parameters
    Widgets,

    /// Resolve a range token to a time window
    Window {
        /// Range token (all, ytd, 13w, 12w, 7d, ...)
        range: String,

        /// Domain whose calendar the window is computed in
        #[arg(short, long, default_value = "tickets")]
        domain: Domain,
    },

    /// Render a widget
    Render {
        /// Widget name (see `deskpulse widgets`)
        widget: String,

        /// Widget parameter as key=value (repeatable)
        #[arg(short, long = "param", value_parser = parse_param)]
        params: Vec<(String, String)>,
    },

    /// Pull tickets from the ticket source into the document store
    Sync {
        /// Range token selecting which tickets to pull
        #[arg(short, long, default_value = "12w")]
        range: String,
    },
}

fn parse_param(raw: &str) -> std::result::Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("missing parameter name in '{raw}'"));
    }
    Ok((key.to_string(), value.to_string()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    Config::ensure_xdg_env();

    // Load configuration
    let config = Config::load().context("failed to load configuration")?;

    // Initialize logging
    let _log_guard =
        deskpulse_core::logging::init(&config.logging).context("failed to initialize logging")?;

    tracing::debug!(config = %Config::config_path().display(), "deskpulse starting");

    match args.command {
        Command::Widgets => list_widgets(&Dashboard::from_config(&config), args.format),
        Command::Window { range, domain } => {
            let window = TimeWindowResolver::resolve(&range, domain);
            match args.format {
                Format::Json => println!("{}", serde_json::to_string_pretty(&window)?),
                Format::Text => {
                    let bound = |b: Option<String>| b.unwrap_or_else(|| "unbounded".to_string());
                    println!("Domain:   {} ({})", domain, window.timezone);
                    println!("Start:    {}", bound(window.start.map(|s| s.to_rfc3339())));
                    println!("End:      {}", bound(window.end.map(|e| e.to_rfc3339())));
                    if window.live_end {
                        println!("          (end is now)");
                    }
                }
            }
            Ok(())
        }
        Command::Render { widget, params } => {
            let dashboard = Dashboard::from_config(&config);
            let raw: RawParams = params
                .into_iter()
                .map(|(k, v)| (k, serde_json::Value::String(v)))
                .collect();
            let rendered = dashboard
                .render(&widget, &raw)
                .await
                .with_context(|| format!("failed to render widget '{widget}'"))?;
            match args.format {
                Format::Json => println!("{}", serde_json::to_string_pretty(&rendered)?),
                Format::Text => print_rendered(&rendered),
            }
            Ok(())
        }
        Command::Sync { range } => run_sync(&config, &range, args.format).await,
    }
}

fn list_widgets(dashboard: &Dashboard, format: Format) -> Result<()> {
    let registry = dashboard.registry();
    if format == Format::Json {
        let specs: Vec<_> = registry.specs().collect();
        println!("{}", serde_json::to_string_pretty(&specs)?);
        return Ok(());
    }

    println!("Available widgets:");
    for spec in registry.specs() {
        println!("  - {} ({})", spec.name, spec.title);
        if !spec.description.is_empty() {
            println!("      {}", spec.description);
        }
        for name in spec.schema.names() {
            let Some(param) = spec.schema.get(name) else {
                continue;
            };
            let detail = match param {
                ParamSpec::Enum { values, default } => {
                    format!("one of {} (default {})", values.join("|"), default)
                }
                ParamSpec::Bool { default } => format!("flag (default {})", default),
                ParamSpec::List { default: Some(items) } => {
                    format!("list (default {})", items.join(","))
                }
                ParamSpec::List { default: None } => "list (default: no filter)".to_string(),
            };
            println!("      {:<18} {}", name, detail);
        }
    }
    Ok(())
}

fn print_rendered(rendered: &RenderedWidget) {
    let tier = rendered
        .tier
        .map(|t| t.to_string())
        .unwrap_or_else(|| "none".to_string());
    println!("{}", rendered.output.title);
    println!("  domain:  {}", rendered.domain);
    println!("  tier:    {}", tier);
    println!("  records: {}", rendered.records);
    for attempt in &rendered.attempts {
        match &attempt.error_message {
            Some(message) => println!(
                "    {:<10} {:<8} {:>6}ms  {}",
                attempt.tier.as_str(),
                attempt.status.as_str(),
                attempt.duration_ms,
                message
            ),
            None => println!(
                "    {:<10} {:<8} {:>6}ms  {} rows",
                attempt.tier.as_str(),
                attempt.status.as_str(),
                attempt.duration_ms,
                attempt.rows
            ),
        }
    }
    println!();
    print_table(&rendered.output);
}

fn print_table(output: &WidgetOutput) {
    if output.is_empty() {
        println!("No data for this window.");
        return;
    }
    let width = output.labels.iter().map(String::len).max().unwrap_or(0).max(5);
    print!("{:<width$}", "label");
    for series in &output.series {
        print!("  {:>14}", series.name);
    }
    println!();
    for (i, label) in output.labels.iter().enumerate() {
        print!("{:<width$}", label);
        for series in &output.series {
            match series.values.get(i) {
                Some(value) => print!("  {:>14.2}", value),
                None => print!("  {:>14}", "-"),
            }
        }
        println!();
    }
}

async fn run_sync(config: &Config, range: &str, format: Format) -> Result<()> {
    if !config.ticket_source.is_ready() {
        anyhow::bail!(
            "ticket source is not enabled; set [ticket_source] enabled and access_token in {}",
            Config::config_path().display()
        );
    }

    let client =
        HubSpotClient::new(config.ticket_source.clone()).context("failed to create ticket-source client")?;
    let store = SqliteStore::open("primary", &Config::database_path())
        .context("failed to open document store")?;
    store.migrate().context("failed to run store migrations")?;

    let dashboard = Dashboard::from_config(config);
    let report = dashboard
        .sync(&client, &store, range)
        .await
        .context("ticket sync failed")?;

    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        Format::Text => {
            println!("Sync complete:");
            println!("  Fetched:             {}", report.fetched);
            println!("  Stored:              {}", report.stored);
            println!("  Skipped (no id):     {}", report.skipped_without_id);
            println!("  Duration:            {}ms", report.duration_ms);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_param() {
        assert_eq!(
            parse_param("agents=Nova,Girly").unwrap(),
            ("agents".to_string(), "Nova,Girly".to_string())
        );
        assert_eq!(parse_param("range=").unwrap().1, "");
        assert!(parse_param("range").is_err());
        assert!(parse_param("=12w").is_err());
    }

    #[test]
    fn test_args_parse_render() {
        let args = Args::try_parse_from([
            "deskpulse", "--format", "json", "render", "tickets_by_pipeline", "-p", "range=4w",
        ])
        .unwrap();
        assert_eq!(args.format, Format::Json);
        match args.command {
            Command::Render { widget, params } => {
                assert_eq!(widget, "tickets_by_pipeline");
                assert_eq!(params, vec![("range".to_string(), "4w".to_string())]);
            }
            _ => panic!("expected render"),
        }
    }
}
