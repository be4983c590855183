//! Widget registry
//!
//! A widget is a builder function plus the parameter schema it declares.
//! Builders receive an already-resolved, already-windowed dataset and
//! already-typed parameters; they never touch a backend.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use deskpulse_core::widgets::create_default_registry;
//!
//! let registry = create_default_registry();
//! let spec = registry.resolve("tickets_by_pipeline")?;
//! let params = spec.schema.normalize(&raw_params);
//! ```

pub mod builders;

pub use builders::{create_default_registry, RANGE_VALUES};

use crate::error::{Error, Result};
use crate::params::{NormalizedParams, ParamSchema};
use crate::types::{Dataset, Domain, TimeWindow};
use serde::Serialize;
use std::collections::BTreeMap;

/// Everything a builder gets to work with.
#[derive(Debug, Clone, Copy)]
pub struct WidgetInput<'a> {
    pub dataset: &'a Dataset,
    pub params: &'a NormalizedParams,
    pub window: &'a TimeWindow,
}

/// One named series of values aligned with [`WidgetOutput::labels`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Series {
    pub name: String,
    pub values: Vec<f64>,
}

impl Series {
    pub fn new(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }
}

/// Presentation-neutral widget output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WidgetOutput {
    pub title: String,
    pub labels: Vec<String>,
    pub series: Vec<Series>,
}

impl WidgetOutput {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            labels: Vec::new(),
            series: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Builder function signature.
pub type WidgetBuilder = fn(&WidgetInput<'_>) -> WidgetOutput;

/// A registered widget.
#[derive(Clone, Serialize)]
pub struct WidgetSpec {
    pub name: String,
    pub title: String,
    pub description: String,
    /// Domain used when the schema has no `source` parameter
    pub default_domain: Domain,
    pub schema: ParamSchema,
    #[serde(skip)]
    pub builder: WidgetBuilder,
}

impl std::fmt::Debug for WidgetSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WidgetSpec")
            .field("name", &self.name)
            .field("title", &self.title)
            .field("default_domain", &self.default_domain)
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}

impl WidgetSpec {
    pub fn new(name: &str, builder: WidgetBuilder, schema: ParamSchema) -> Self {
        Self {
            name: name.to_string(),
            title: name.replace('_', " "),
            description: String::new(),
            default_domain: Domain::Tickets,
            schema,
            builder,
        }
    }

    pub fn with_title(mut self, title: &str) -> Self {
        self.title = title.to_string();
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn with_domain(mut self, domain: Domain) -> Self {
        self.default_domain = domain;
        self
    }

    /// Domain a request targets: the `source` parameter if declared.
    pub fn domain_for(&self, params: &NormalizedParams) -> Domain {
        params
            .text("source")
            .map(Domain::parse_or_default)
            .unwrap_or(self.default_domain)
    }

    /// Run the builder.
    pub fn build(&self, input: &WidgetInput<'_>) -> WidgetOutput {
        (self.builder)(input)
    }
}

/// Name -> widget mapping, built once at start-up.
#[derive(Debug, Clone, Default)]
pub struct WidgetRegistry {
    widgets: BTreeMap<String, WidgetSpec>,
}

impl WidgetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a builder under `name` with its parameter schema.
    pub fn register(&mut self, name: &str, builder: WidgetBuilder, schema: ParamSchema) {
        self.insert(WidgetSpec::new(name, builder, schema));
    }

    /// Register a fully described widget, replacing any with the same name.
    pub fn insert(&mut self, spec: WidgetSpec) {
        tracing::debug!(widget = %spec.name, "Registered widget");
        self.widgets.insert(spec.name.clone(), spec);
    }

    /// Look up a widget.
    ///
    /// Unknown names are a caller defect and return
    /// [`Error::WidgetNotFound`], distinct from an empty dataset.
    pub fn resolve(&self, name: &str) -> Result<&WidgetSpec> {
        self.widgets
            .get(name)
            .ok_or_else(|| Error::WidgetNotFound(name.to_string()))
    }

    pub fn names(&self) -> Vec<&str> {
        self.widgets.keys().map(String::as_str).collect()
    }

    pub fn specs(&self) -> impl Iterator<Item = &WidgetSpec> {
        self.widgets.values()
    }

    pub fn len(&self) -> usize {
        self.widgets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.widgets.is_empty()
    }
}
