//! Capabilities consumed from the external catchment modelling engine.
//!
//! The engine is opaque: this crate only issues requests through
//! [`ModelEngine`] and never inspects simulation state directly. Calls are
//! synchronous request/response and are issued serially.

use std::collections::BTreeMap;

use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::EngineError;

pub type EngineResult<T> = Result<T, EngineError>;

/// Constraint map forwarded to the engine (`catchments`, `fus`,
/// `constituents`, `sources`, ... mapped to a string or list of strings).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Constraint(BTreeMap<String, Value>);

impl Constraint {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Merge `other` into this constraint, `other` winning on shared keys.
    pub fn extend(&mut self, other: &Constraint) {
        for (k, v) in other.iter() {
            self.0.insert(k.clone(), v.clone());
        }
    }

    /// Keep only the listed keys.
    pub fn subset(&self, keys: &[&str]) -> Constraint {
        Constraint(
            self.0
                .iter()
                .filter(|(k, _)| keys.contains(&k.as_str()))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }

    /// Values of `key` as strings. A string holding commas is split, a list
    /// is flattened; other scalars are rendered with `to_string`.
    pub fn strings(&self, key: &str) -> Vec<String> {
        self.get(key).map(value_strings).unwrap_or_default()
    }
}

impl FromIterator<(String, Value)> for Constraint {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Constraint(iter.into_iter().collect())
    }
}

/// Render a constraint value as a list of strings.
pub fn value_strings(value: &Value) -> Vec<String> {
    match value {
        Value::Null => Vec::new(),
        Value::String(s) => s
            .split(',')
            .map(|part| part.trim().to_string())
            .filter(|part| !part.is_empty())
            .collect(),
        Value::Array(items) => items.iter().flat_map(value_strings).collect(),
        other => vec![other.to_string()],
    }
}

/// Whether a constraint value selects `name`.
pub fn value_matches(value: &Value, name: &str) -> bool {
    match value {
        Value::String(s) => s == name,
        Value::Array(items) => items.iter().any(|item| value_matches(item, name)),
        Value::Null => false,
        other => other.to_string() == name,
    }
}

/// Part of the catchment model a parameter request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelComponent {
    Generation,
    Runoff,
}

/// A data source known to the engine and the names of its columns.
#[derive(Debug, Clone, PartialEq)]
pub struct DataSourceInfo {
    pub name: String,
    pub columns: Vec<String>,
}

/// One row of the engine's generation model table.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelAssignment {
    pub catchment: String,
    pub functional_unit: String,
    pub constituent: Option<String>,
    pub source: Option<String>,
    pub model: Option<String>,
}

/// A single value handed to a created function.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgumentValue {
    Text(String),
    Number(f64),
}

/// Per-element arguments for a batch of functions created from one template.
///
/// Arguments are an ordered list of `(placeholder, values)` pairs with one
/// value per function. Positional templates use synthetic index names.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FunctionArguments {
    named: bool,
    entries: Vec<(String, Vec<ArgumentValue>)>,
}

impl FunctionArguments {
    pub fn named() -> Self {
        Self {
            named: true,
            entries: Vec::new(),
        }
    }

    pub fn positional() -> Self {
        Self {
            named: false,
            entries: Vec::new(),
        }
    }

    pub fn is_named(&self) -> bool {
        self.named
    }

    /// Append an argument. Positional arguments ignore `name` and are
    /// labelled by their index.
    pub fn push(&mut self, name: &str, values: Vec<ArgumentValue>) {
        let label = if self.named {
            name.to_string()
        } else {
            self.entries.len().to_string()
        };
        self.entries.push((label, values));
    }

    pub fn entries(&self) -> &[(String, Vec<ArgumentValue>)] {
        &self.entries
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    /// Number of functions the arguments describe.
    pub fn element_count(&self) -> usize {
        self.entries.first().map(|(_, v)| v.len()).unwrap_or(0)
    }

    /// Arguments of the `index`-th function, in declaration order.
    pub fn element(&self, index: usize) -> Vec<(&str, &ArgumentValue)> {
        self.entries
            .iter()
            .filter_map(|(name, values)| values.get(index).map(|v| (name.as_str(), v)))
            .collect()
    }
}

/// Recorder to enable, e.g. `{"RecordingVariable": "SoilStore"}`.
pub type RecorderSpec = Constraint;

/// Metadata identifying one recorded series.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingInfo {
    pub network_element: String,
    pub functional_unit: String,
    pub recording_variable: String,
}

/// Series retrieved from a run: a `Date` column followed by one column per
/// entry of `recordings`, in the same order.
#[derive(Debug, Clone)]
pub struct RecordedTable {
    pub table: DataFrame,
    pub recordings: Vec<RecordingInfo>,
}

pub trait ModelEngine {
    // ── Network ─────────────────────────────────────────────────────────────
    fn network_features(&self, feature_type: &str) -> EngineResult<Vec<String>>;
    fn functional_unit_types(&self) -> EngineResult<Vec<String>>;

    // ── Declarations and model installation ─────────────────────────────────
    fn add_constituent(&mut self, name: &str) -> EngineResult<()>;
    fn add_constituent_source(&mut self, name: &str) -> EngineResult<()>;
    fn set_generation_models(&mut self, model: &str, constraint: &Constraint)
        -> EngineResult<()>;
    fn set_link_constituent_models(
        &mut self,
        model: &str,
        constraint: &Constraint,
    ) -> EngineResult<()>;

    // ── Data sources and time series ────────────────────────────────────────
    fn create_data_source(&mut self, name: &str, table: &DataFrame, units: &str)
        -> EngineResult<()>;
    fn data_sources(&self) -> EngineResult<Vec<DataSourceInfo>>;
    fn assign_time_series(
        &mut self,
        parameter: &str,
        column: &str,
        data_source: &str,
        constraint: &Constraint,
    ) -> EngineResult<()>;
    fn clear_time_series(&mut self, parameter: &str, constraint: &Constraint)
        -> EngineResult<()>;

    // ── Parameters ──────────────────────────────────────────────────────────
    fn set_param_values(
        &mut self,
        component: ModelComponent,
        parameter: &str,
        value: f64,
        constraint: &Constraint,
    ) -> EngineResult<()>;
    fn get_param_values(
        &self,
        component: ModelComponent,
        parameter: &str,
        constraint: &Constraint,
    ) -> EngineResult<Vec<f64>>;
    fn enumerate_names(
        &self,
        component: ModelComponent,
        constraint: &Constraint,
    ) -> EngineResult<Vec<(String, String)>>;
    fn generation_model_table(&self, constraint: &Constraint)
        -> EngineResult<Vec<ModelAssignment>>;

    // ── Modelled variables and functions ────────────────────────────────────
    fn create_modelled_variable(&mut self, name: &str, constraint: &Constraint)
        -> EngineResult<()>;
    fn variable_names(&self) -> EngineResult<Vec<String>>;
    fn delete_variables(&mut self, names: &[String]) -> EngineResult<()>;
    fn set_modelled_variable_time_period(
        &mut self,
        period: &str,
        variables: &[String],
    ) -> EngineResult<()>;
    fn delete_functions(&mut self, names: &[String]) -> EngineResult<()>;
    fn create_functions(
        &mut self,
        names: &[String],
        template: &str,
        arguments: &FunctionArguments,
    ) -> EngineResult<()>;
    fn set_function_option(
        &mut self,
        option: &str,
        value: &str,
        functions: &[String],
    ) -> EngineResult<()>;
    fn set_time_of_evaluation(&mut self, timing: &str, functions: &[String])
        -> EngineResult<()>;
    fn apply_function(
        &mut self,
        parameter: &str,
        applications: &[String],
        constraint: &Constraint,
    ) -> EngineResult<()>;

    // ── Recording ───────────────────────────────────────────────────────────
    fn configure_recording(&mut self, enable: &[RecorderSpec]) -> EngineResult<()>;
    fn retrieve_multiple_time_series(
        &self,
        run: &str,
        criteria: &Constraint,
    ) -> EngineResult<RecordedTable>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn constraint_strings_accepts_lists_and_comma_strings() {
        let c: Constraint = serde_json::from_value(json!({
            "sources": "Septic, Dairyshed",
            "fus": ["Forest", "Pasture"],
            "catchments": null
        }))
        .unwrap();
        assert_eq!(c.strings("sources"), vec!["Septic", "Dairyshed"]);
        assert_eq!(c.strings("fus"), vec!["Forest", "Pasture"]);
        assert!(c.strings("catchments").is_empty());
        assert!(c.strings("missing").is_empty());
    }

    #[test]
    fn value_matches_scalars_and_lists() {
        assert!(value_matches(&json!("SC#1"), "SC#1"));
        assert!(value_matches(&json!(["SC#1", "SC#2"]), "SC#2"));
        assert!(value_matches(&json!(12), "12"));
        assert!(!value_matches(&json!("SC#1"), "SC#10"));
    }

    #[test]
    fn positional_arguments_use_index_names() {
        let mut args = FunctionArguments::positional();
        args.push("runoff", vec![ArgumentValue::Text("$runoff_a".into())]);
        args.push("Area", vec![ArgumentValue::Number(2.0)]);
        assert_eq!(args.names().collect::<Vec<_>>(), vec!["0", "1"]);
        assert_eq!(args.element_count(), 1);
        assert_eq!(args.element(0)[1], ("1", &ArgumentValue::Number(2.0)));
    }
}
