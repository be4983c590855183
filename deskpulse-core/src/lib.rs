//! # deskpulse-core
//!
//! Core library for deskpulse - a support-desk analytics engine.
//!
//! This library provides:
//! - Range tokens ("12w", "13w", "ytd", "7d", "all") resolved to
//!   timezone-correct windows
//! - Typed widget parameters that fall back to defaults on bad input
//! - Normalization of backend rows into canonical records
//! - A tiered resolver: cache, primary store, mirror, snapshots, raw extracts
//! - A widget registry and the request pipeline that drives it
//!
//! ## Example
//!
//! ```rust,no_run
//! use deskpulse_core::{Config, Dashboard, RawParams};
//!
//! # async fn run() -> deskpulse_core::Result<()> {
//! let config = Config::load()?;
//! let dashboard = Dashboard::from_config(&config);
//!
//! let mut params = RawParams::new();
//! params.insert("range".into(), "8w".into());
//! params.insert("agents".into(), "Nova,Girly".into());
//! let rendered = dashboard.render("agent_ticket_volume_distribution", &params).await?;
//! println!("{} records from {:?}", rendered.records, rendered.tier);
//! # Ok(())
//! # }
//! ```

// Re-export commonly used items at the crate root
pub use cache::{CacheKey, DatasetCache, MemoryCache};
pub use config::Config;
pub use dashboard::{apply_filters, Dashboard, RenderedWidget};
pub use error::{Error, Result};
pub use normalize::{EntityNormalizer, NormalizeStats};
pub use params::{NormalizedParams, ParamSchema, ParamSpec, ParamValue, RawParams};
pub use resolver::{Resolution, TierAttempt, TierStatus, TieredDataResolver};
pub use store::{RecordStore, SqliteStore, SyncReport, TicketSource};
pub use types::*;
pub use widgets::{WidgetOutput, WidgetRegistry, WidgetSpec};
pub use window::{RangeSpec, TimeWindowResolver};

// Public modules
pub mod cache;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod logging;
pub mod normalize;
pub mod params;
pub mod resolver;
pub mod store;
pub mod types;
pub mod widgets;
pub mod window;
