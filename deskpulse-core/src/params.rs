//! Declarative widget parameter schemas.
//!
//! A widget declares its parameters once; [`ParamSchema::normalize`] turns
//! whatever arrived on the query string into exactly those keys, each with a
//! well-typed value. Invalid input never errors: it falls back to the
//! declared default so a bad query degrades to default dashboard behavior.

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Raw, untyped request parameters.
pub type RawParams = BTreeMap<String, Value>;

const BOOL_TRUE: &[&str] = &["true", "1", "yes", "y", "on"];
const BOOL_FALSE: &[&str] = &["false", "0", "no", "n", "off"];

/// Declared type and default of one parameter.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ParamSpec {
    /// One of a fixed set of strings
    Enum {
        values: Vec<String>,
        default: String,
    },
    /// Boolean flag
    Bool { default: bool },
    /// Comma-separated or native list of strings; `None` means "no filter"
    List { default: Option<Vec<String>> },
}

/// A normalized parameter value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    Enum(String),
    Bool(bool),
    List(Option<Vec<String>>),
}

/// Ordered mapping from parameter name to its spec.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ParamSchema {
    params: BTreeMap<String, ParamSpec>,
}

impl ParamSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare an enum parameter.
    pub fn enumeration(mut self, name: &str, values: &[&str], default: &str) -> Self {
        self.params.insert(
            name.to_string(),
            ParamSpec::Enum {
                values: values.iter().map(|v| v.to_string()).collect(),
                default: default.to_string(),
            },
        );
        self
    }

    /// Declare a boolean parameter.
    pub fn flag(mut self, name: &str, default: bool) -> Self {
        self.params
            .insert(name.to_string(), ParamSpec::Bool { default });
        self
    }

    /// Declare a list parameter with no default.
    pub fn list(self, name: &str) -> Self {
        self.list_with_default(name, None)
    }

    /// Declare a list parameter whose absence means `default`.
    pub fn list_with_default(mut self, name: &str, default: Option<&[&str]>) -> Self {
        self.params.insert(
            name.to_string(),
            ParamSpec::List {
                default: default.map(|d| d.iter().map(|v| v.to_string()).collect()),
            },
        );
        self
    }

    pub fn get(&self, name: &str) -> Option<&ParamSpec> {
        self.params.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.params.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Coerce raw parameters into typed, defaulted values.
    ///
    /// Keys not declared in the schema are ignored.
    pub fn normalize(&self, raw: &RawParams) -> NormalizedParams {
        let values = self
            .params
            .iter()
            .map(|(name, spec)| {
                let value = normalize_one(name, spec, raw.get(name));
                (name.clone(), value)
            })
            .collect();
        NormalizedParams { values }
    }
}

fn normalize_one(name: &str, spec: &ParamSpec, raw: Option<&Value>) -> ParamValue {
    match spec {
        ParamSpec::Enum { values, default } => {
            let chosen = raw
                .and_then(value_as_text)
                .filter(|v| values.iter().any(|allowed| allowed == v));
            if chosen.is_none() && raw.is_some() {
                tracing::debug!(param = name, ?raw, default = %default, "Invalid enum value, using default");
            }
            ParamValue::Enum(chosen.unwrap_or_else(|| default.clone()))
        }
        ParamSpec::Bool { default } => {
            ParamValue::Bool(raw.and_then(coerce_bool).unwrap_or(*default))
        }
        ParamSpec::List { default } => match raw {
            None | Some(Value::Null) => ParamValue::List(default.clone()),
            Some(value) => ParamValue::List(parse_list(value)),
        },
    }
}

fn value_as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Interpret a truthy/falsy token; `None` when it is neither.
pub fn coerce_bool(value: &Value) -> Option<bool> {
    let token = match value {
        Value::Bool(b) => return Some(*b),
        Value::String(s) => s.trim().to_ascii_lowercase(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    if BOOL_TRUE.contains(&token.as_str()) {
        Some(true)
    } else if BOOL_FALSE.contains(&token.as_str()) {
        Some(false)
    } else {
        None
    }
}

/// Split a comma-separated string or a native list, dropping blank entries.
pub fn parse_list(value: &Value) -> Option<Vec<String>> {
    let items: Vec<String> = match value {
        Value::String(s) => s
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        Value::Array(values) => values
            .iter()
            .filter_map(|v| match v {
                Value::String(s) => Some(s.trim().to_string()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .filter(|s| !s.is_empty())
            .collect(),
        _ => Vec::new(),
    };
    if items.is_empty() {
        None
    } else {
        Some(items)
    }
}

/// Parameters after schema normalization.
///
/// Holds exactly the keys the schema declares.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct NormalizedParams {
    values: BTreeMap<String, ParamValue>,
}

impl NormalizedParams {
    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.values.get(name)
    }

    /// Value of an enum parameter.
    pub fn text(&self, name: &str) -> Option<&str> {
        match self.values.get(name) {
            Some(ParamValue::Enum(v)) => Some(v.as_str()),
            _ => None,
        }
    }

    /// Value of a bool parameter, `false` when undeclared.
    pub fn flag(&self, name: &str) -> bool {
        matches!(self.values.get(name), Some(ParamValue::Bool(true)))
    }

    /// Value of a list parameter; `None` means no filter.
    pub fn list(&self, name: &str) -> Option<&[String]> {
        match self.values.get(name) {
            Some(ParamValue::List(Some(items))) => Some(items.as_slice()),
            _ => None,
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> ParamSchema {
        ParamSchema::new()
            .enumeration("source", &["tickets", "chats"], "tickets")
            .enumeration("range", &["all", "12w", "8w"], "12w")
            .flag("include_weekends", true)
            .list("agents")
    }

    fn raw(pairs: &[(&str, Value)]) -> RawParams {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_invalid_enum_falls_back_to_default() {
        let params = schema().normalize(&raw(&[("range", json!("bogus"))]));
        assert_eq!(params.text("range"), Some("12w"));
        assert_eq!(params.text("source"), Some("tickets"));
        assert!(params.flag("include_weekends"));
        assert_eq!(params.list("agents"), None);
    }

    #[test]
    fn test_output_has_exactly_schema_keys() {
        let params = schema().normalize(&raw(&[
            ("range", json!("8w")),
            ("unexpected", json!("x")),
        ]));
        let keys: Vec<_> = params.keys().collect();
        assert_eq!(keys, vec!["agents", "include_weekends", "range", "source"]);
        assert_eq!(params.text("range"), Some("8w"));
    }

    #[test]
    fn test_enum_rejects_non_string_values() {
        let params = schema().normalize(&raw(&[("source", json!(["chats"]))]));
        assert_eq!(params.text("source"), Some("tickets"));
    }

    #[test]
    fn test_bool_tokens() {
        let s = ParamSchema::new().flag("show_trend", true);
        for token in ["false", "0", "NO", "n", " Off "] {
            let params = s.normalize(&raw(&[("show_trend", json!(token))]));
            assert!(!params.flag("show_trend"), "{token}");
        }
        let s = ParamSchema::new().flag("show_trend", false);
        for token in ["true", "1", "Yes", "y", "ON"] {
            let params = s.normalize(&raw(&[("show_trend", json!(token))]));
            assert!(params.flag("show_trend"), "{token}");
        }
        let params = s.normalize(&raw(&[("show_trend", json!(true))]));
        assert!(params.flag("show_trend"));
    }

    #[test]
    fn test_unrecognized_bool_uses_default() {
        let s = ParamSchema::new().flag("include_weekends", true);
        let params = s.normalize(&raw(&[("include_weekends", json!("maybe"))]));
        assert!(params.flag("include_weekends"));
        let params = s.normalize(&raw(&[("include_weekends", json!(null))]));
        assert!(params.flag("include_weekends"));
    }

    #[test]
    fn test_list_parsing() {
        let params = schema().normalize(&raw(&[("agents", json!("Nova, Girly,,  ,"))]));
        assert_eq!(
            params.list("agents"),
            Some(&["Nova".to_string(), "Girly".to_string()][..])
        );

        let params = schema().normalize(&raw(&[("agents", json!(["Nova", " ", "Bhushan"]))]));
        assert_eq!(params.list("agents").map(|l| l.len()), Some(2));

        let params = schema().normalize(&raw(&[("agents", json!("  "))]));
        assert_eq!(params.list("agents"), None);
        assert_eq!(params.get("agents"), Some(&ParamValue::List(None)));
    }

    #[test]
    fn test_list_default_applies_only_when_absent() {
        let s = ParamSchema::new().list_with_default("exclude_pipelines", Some(&["Live Chat"]));
        let params = s.normalize(&RawParams::new());
        assert_eq!(params.list("exclude_pipelines"), Some(&["Live Chat".to_string()][..]));

        let params = s.normalize(&raw(&[("exclude_pipelines", json!(""))]));
        assert_eq!(params.list("exclude_pipelines"), None);
    }

    #[test]
    fn test_schema_serializes_types() {
        let json = serde_json::to_value(schema()).unwrap();
        assert_eq!(json["range"]["type"], "enum");
        assert_eq!(json["range"]["default"], "12w");
        assert_eq!(json["include_weekends"]["type"], "bool");
        assert_eq!(json["agents"]["type"], "list");
    }
}
