//! Typed setup configuration, loaded once from JSON and validated up front.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::engine::{value_strings, Constraint};
use crate::error::{CloeError, CloeResult};
use crate::schema::{constraint, parameters};
use crate::template::NamingTemplate;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CloeConfig {
    pub sources: SourcesConfig,
    pub inputs: InputsConfig,
    #[serde(default)]
    pub parameters: ParametersConfig,
    #[serde(default)]
    pub runoff_functions: Vec<RunoffFunctionConfig>,
}

// ── Sources ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourcesConfig {
    #[serde(default)]
    pub areal: Vec<String>,
    #[serde(default)]
    pub non_areal: Vec<String>,
    #[serde(default)]
    pub conditional: Vec<ConditionalModel>,
    /// Declared constituents, each with its source exclusions.
    pub constituents: IndexMap<String, ConstituentConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConstituentConfig {
    #[serde(default)]
    pub exclude: Vec<String>,
}

/// Model class installed under an arbitrary engine constraint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConditionalModel {
    pub model: String,
    #[serde(default)]
    pub constrain: Constraint,
}

// ── Inputs ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InputsConfig {
    pub dir: PathBuf,
    #[serde(default)]
    pub ignore: Option<Vec<String>>,
    #[serde(default)]
    pub column_formats: IndexMap<String, NamingTemplate>,
    /// constituent -> input key -> value column used when pivoting.
    #[serde(default)]
    pub columns: IndexMap<String, IndexMap<String, String>>,
    /// constituent source -> input key applied to every catchment/FU.
    #[serde(default)]
    pub source: IndexMap<String, String>,
    #[serde(default)]
    pub global: Vec<GlobalTimeSeries>,
    #[serde(default)]
    pub existing: Option<IndexMap<String, OneOrMany<ConstrainedInput>>>,
    #[serde(default)]
    pub constrained: Option<IndexMap<String, OneOrMany<ConstrainedInput>>>,
}

impl InputsConfig {
    /// Per-source overrides; `existing` wins over `constrained`.
    pub fn constrained_inputs(&self) -> Option<&IndexMap<String, OneOrMany<ConstrainedInput>>> {
        self.existing.as_ref().or(self.constrained.as_ref())
    }

    pub fn overrides_for(&self, source: &str) -> Vec<&ConstrainedInput> {
        self.constrained_inputs()
            .and_then(|map| map.get(source))
            .map(|entries| entries.iter().collect())
            .unwrap_or_default()
    }

    pub fn is_ignored(&self, key: &str) -> bool {
        self.ignore
            .as_ref()
            .map(|ignore| ignore.iter().any(|k| k == key))
            .unwrap_or(false)
    }

    /// Whether any constituent pivots `key` by location.
    pub fn is_constituent_specific(&self, key: &str) -> bool {
        self.columns.values().any(|lookup| lookup.contains_key(key))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        match self {
            OneOrMany::One(item) => std::slice::from_ref(item).iter(),
            OneOrMany::Many(items) => items.iter(),
        }
    }
}

/// Explicit data-source binding for one constituent source.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConstrainedInput {
    pub datasource: String,
    pub column_format: NamingTemplate,
    #[serde(default = "default_input_parameter")]
    pub param: String,
    #[serde(default)]
    pub constrain: InputRestriction,
}

fn default_input_parameter() -> String {
    parameters::INPUT_RATE.to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct InputRestriction {
    #[serde(default)]
    pub constituents: Option<serde_json::Value>,
    #[serde(default)]
    pub fus: Option<serde_json::Value>,
}

impl InputRestriction {
    pub fn constituents(&self) -> Option<Vec<String>> {
        self.constituents.as_ref().map(value_strings)
    }

    pub fn fus(&self) -> Option<Vec<String>> {
        self.fus.as_ref().map(value_strings)
    }
}

/// Fully explicit assignment, applied without template expansion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GlobalTimeSeries {
    pub parameter: String,
    pub column: String,
    pub source: String,
    #[serde(default)]
    pub constrain: Constraint,
}

// ── Parameters ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ParametersConfig {
    #[serde(default)]
    pub fixed: IndexMap<String, f64>,
    #[serde(default)]
    pub losses: LossConfig,
    #[serde(default)]
    pub scalar: Vec<ScalarGroup>,
    #[serde(default)]
    pub spatial: Vec<SpatialParameter>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LossConfig {
    /// Loss parameter -> fraction routed downstream.
    #[serde(default)]
    pub fixed: IndexMap<String, f64>,
    #[serde(default)]
    pub dynamic: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ScalarGroup {
    #[serde(default, rename = "match")]
    pub matches: Constraint,
    #[serde(default)]
    pub parameters: IndexMap<String, f64>,
}

/// Row-wise lookup against an auxiliary input table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SpatialLookup {
    pub input: String,
    /// constraint key -> table column holding its value.
    #[serde(default, rename = "match")]
    pub matches: IndexMap<String, String>,
    pub value: String,
    #[serde(default)]
    pub constrain: Constraint,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SpatialParameter {
    pub param: String,
    #[serde(flatten)]
    pub lookup: SpatialLookup,
}

// ── Runoff functions ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunoffFunctionConfig {
    pub function_name: String,
    pub template: String,
    pub param: String,
    #[serde(default)]
    pub constrain: Constraint,
    #[serde(default)]
    pub model_variables: Option<Vec<String>>,
    /// Single-variable form, used when `model_variables` is absent.
    #[serde(default)]
    pub runoff_variable: Option<String>,
    #[serde(default)]
    pub model_parameters: Vec<String>,
    #[serde(default)]
    pub data_variables: Vec<DataVariable>,
    #[serde(default)]
    pub units: Option<String>,
}

impl RunoffFunctionConfig {
    pub fn model_variables(&self) -> Vec<String> {
        match (&self.model_variables, &self.runoff_variable) {
            (Some(vars), _) => vars.clone(),
            (None, Some(var)) => vec![var.clone()],
            (None, None) => Vec::new(),
        }
    }

    /// Templates with `{placeholder}` take named arguments.
    pub fn uses_named_arguments(&self) -> bool {
        self.template.contains('{')
    }

    /// The part of the constraint that applies to runoff models (`fus`).
    pub fn runoff_constraint(&self) -> Constraint {
        self.constrain.subset(&[constraint::FUS])
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DataVariable {
    pub label: String,
    #[serde(default)]
    pub default_value: Option<f64>,
    #[serde(flatten)]
    pub lookup: SpatialLookup,
}

// ── Loading ─────────────────────────────────────────────────────────────────

impl CloeConfig {
    pub fn load_json(path: &Path) -> CloeResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::from_json_str(&content)?;
        if config.inputs.dir.is_relative() {
            if let Some(parent) = path.parent() {
                config.inputs.dir = parent.join(&config.inputs.dir);
            }
        }
        Ok(config)
    }

    pub fn from_json_str(content: &str) -> CloeResult<Self> {
        let config: CloeConfig = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn constituents(&self) -> Vec<String> {
        self.sources.constituents.keys().cloned().collect()
    }

    /// Areal, non-areal and conditional sources, each listed once.
    pub fn constituent_sources(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.sources
            .areal
            .iter()
            .chain(self.sources.non_areal.iter())
            .cloned()
            .chain(
                self.sources
                    .conditional
                    .iter()
                    .flat_map(|c| c.constrain.strings(constraint::SOURCES)),
            )
            .filter(|s| seen.insert(s.clone()))
            .collect()
    }

    pub fn is_excluded(&self, source: &str, constituent: &str) -> bool {
        self.sources
            .constituents
            .get(constituent)
            .map(|c| c.exclude.iter().any(|s| s == source))
            .unwrap_or(false)
    }

    pub fn validate(&self) -> CloeResult<()> {
        let declared = &self.sources.constituents;
        let check = |constituent: &str, context: &str| -> CloeResult<()> {
            if declared.contains_key(constituent) {
                Ok(())
            } else {
                Err(CloeError::Config(format!(
                    "constituent '{constituent}' referenced in {context} is not declared in sources.constituents"
                )))
            }
        };

        for constituent in self.inputs.columns.keys() {
            check(constituent, "inputs.columns")?;
        }

        if let Some(overrides) = self.inputs.constrained_inputs() {
            for (source, entries) in overrides {
                for entry in entries.iter() {
                    for constituent in entry.constrain.constituents().unwrap_or_default() {
                        check(&constituent, &format!("constrained inputs for {source}"))?;
                    }
                }
            }
        }

        for function in &self.runoff_functions {
            if !function.data_variables.is_empty() && !function.uses_named_arguments() {
                return Err(CloeError::Config(format!(
                    "runoff function '{}' declares data_variables but its template has no named placeholders",
                    function.function_name
                )));
            }
        }

        Ok(())
    }
}
