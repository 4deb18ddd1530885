//! Fixed, loss, scalar and spatial parameter assignment.
//!
//! Requests are issued in configuration order; where constraints overlap the
//! last write wins inside the engine.

use polars::prelude::*;
use serde_json::Value;
use tracing::{info, warn};

use crate::config::{ParametersConfig, SpatialLookup};
use crate::engine::{value_matches, Constraint, ModelComponent, ModelEngine};
use crate::error::{CloeError, CloeResult};
use crate::inputs::InputSet;
use crate::schema::{constraint, parameters};

/// One row of a spatial lookup: the value and the constraint it applies under.
#[derive(Debug, Clone, PartialEq)]
pub struct SpatialValue {
    pub value: f64,
    pub matches: Constraint,
}

impl SpatialValue {
    /// Whether the row's catchment and functional unit criteria (when
    /// present) both select the element.
    pub fn selects(&self, catchment: &str, functional_unit: &str) -> bool {
        let selects = |key: &str, name: &str| {
            self.matches
                .get(key)
                .map(|v| value_matches(v, name))
                .unwrap_or(true)
        };
        selects(constraint::CATCHMENTS, catchment) && selects(constraint::FUS, functional_unit)
    }
}

/// Read `(value, constraint)` pairs from every row of the lookup's table.
pub fn extract_spatial_values(
    lookup: &SpatialLookup,
    inputs: &InputSet,
) -> CloeResult<Vec<SpatialValue>> {
    let df = inputs.get(&lookup.input)?;

    let value_column = df
        .column(&lookup.value)
        .map_err(|_| CloeError::MissingColumn(format!("{}.{}", lookup.input, lookup.value)))?
        .cast(&DataType::Float64)?;
    let values = value_column.f64()?;

    let mut match_columns = Vec::with_capacity(lookup.matches.len());
    for (key, column) in &lookup.matches {
        let series = df
            .column(column)
            .map_err(|_| CloeError::MissingColumn(format!("{}.{column}", lookup.input)))?
            .cast(&DataType::String)?;
        match_columns.push((key.as_str(), series));
    }

    let mut result = Vec::with_capacity(df.height());
    for row in 0..df.height() {
        let mut matches = Constraint::new();
        for (key, series) in &match_columns {
            let cell = series
                .str()?
                .get(row)
                .map(|s| Value::String(s.to_string()))
                .unwrap_or(Value::Null);
            matches.insert(*key, cell);
        }
        matches.extend(&lookup.constrain);

        // empty cells reach the engine as NaN
        let value = values.get(row).unwrap_or_else(|| {
            warn!(input = %lookup.input, column = %lookup.value, row, "empty spatial value");
            f64::NAN
        });
        result.push(SpatialValue { value, matches });
    }
    Ok(result)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParameterReport {
    pub fixed: usize,
    pub losses: usize,
    pub scalar: usize,
    pub spatial: usize,
}

impl ParameterReport {
    pub fn total(&self) -> usize {
        self.fixed + self.losses + self.scalar + self.spatial
    }
}

pub fn apply_parameters<E: ModelEngine>(
    config: &ParametersConfig,
    inputs: &InputSet,
    engine: &mut E,
) -> CloeResult<ParameterReport> {
    let mut report = ParameterReport::default();
    let unconstrained = Constraint::new();

    info!("setting fixed scalar parameters");
    for (name, value) in &config.fixed {
        set(engine, name, *value, &unconstrained)?;
        report.fixed += 1;
    }

    info!("configuring loss parameters");
    for (name, fraction) in &config.losses.fixed {
        set(engine, &outside(name), 0.0, &unconstrained)?;
        set(engine, &downstream(name), *fraction, &unconstrained)?;
        report.losses += 1;
    }
    for name in &config.losses.dynamic {
        set(engine, &outside(name), 1.0, &unconstrained)?;
        set(engine, &downstream(name), 0.0, &unconstrained)?;
        report.losses += 1;
    }

    info!("setting constrained scalar parameters");
    for group in &config.scalar {
        for (name, value) in &group.parameters {
            set(engine, name, *value, &group.matches)?;
            report.scalar += 1;
        }
    }

    info!("setting spatial parameters");
    for spatial in &config.spatial {
        for row in extract_spatial_values(&spatial.lookup, inputs)? {
            set(engine, &spatial.param, row.value, &row.matches)?;
            report.spatial += 1;
        }
    }

    info!(
        fixed = report.fixed,
        losses = report.losses,
        scalar = report.scalar,
        spatial = report.spatial,
        "applied parameters"
    );
    Ok(report)
}

fn set<E: ModelEngine>(
    engine: &mut E,
    name: &str,
    value: f64,
    constrain: &Constraint,
) -> CloeResult<()> {
    engine.set_param_values(ModelComponent::Generation, name, value, constrain)?;
    Ok(())
}

fn outside(name: &str) -> String {
    format!("{}{name}", parameters::LOSS_OUTSIDE_PREFIX)
}

fn downstream(name: &str) -> String {
    format!("{}{name}", parameters::LOSS_DOWNSTREAM_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;
    use serde_json::json;

    fn lookup_inputs() -> InputSet {
        let df = df!(
            "cmt" => ["SC#1", "SC#1", "SC#2"],
            "FU" => ["Forest", "Pasture", "Forest"],
            "B1" => [0.1, 0.2, 0.3]
        )
        .unwrap();
        InputSet::from_tables([("b1".to_string(), df)]).unwrap()
    }

    fn lookup() -> SpatialLookup {
        let mut matches = IndexMap::new();
        matches.insert("catchments".to_string(), "cmt".to_string());
        matches.insert("fus".to_string(), "FU".to_string());
        SpatialLookup {
            input: "b1".into(),
            matches,
            value: "B1".into(),
            constrain: Constraint::new().with("constituents", "TP"),
        }
    }

    #[test]
    fn extracts_row_constraints() {
        let rows = extract_spatial_values(&lookup(), &lookup_inputs()).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1].value, 0.2);
        assert_eq!(rows[1].matches.get("catchments"), Some(&json!("SC#1")));
        assert_eq!(rows[1].matches.get("fus"), Some(&json!("Pasture")));
        assert_eq!(rows[1].matches.get("constituents"), Some(&json!("TP")));
    }

    #[test]
    fn selects_requires_all_present_criteria() {
        let rows = extract_spatial_values(&lookup(), &lookup_inputs()).unwrap();
        assert!(rows[0].selects("SC#1", "Forest"));
        assert!(!rows[0].selects("SC#1", "Pasture"));
        assert!(!rows[2].selects("SC#1", "Forest"));

        let catchment_only = SpatialValue {
            value: 1.0,
            matches: Constraint::new().with("catchments", "SC#2"),
        };
        assert!(catchment_only.selects("SC#2", "Anything"));
    }

    #[test]
    fn empty_value_cell_becomes_nan() {
        let df = df!(
            "cmt" => ["SC#1", "SC#2"],
            "FU" => ["Forest", "Forest"],
            "B1" => [Some(0.1), None]
        )
        .unwrap();
        let inputs = InputSet::from_tables([("b1".to_string(), df)]).unwrap();
        let rows = extract_spatial_values(&lookup(), &inputs).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].value, 0.1);
        assert!(rows[1].value.is_nan());
    }

    #[test]
    fn missing_lookup_column_is_reported() {
        let mut bad = lookup();
        bad.value = "B9".into();
        let err = extract_spatial_values(&bad, &lookup_inputs()).unwrap_err();
        assert!(matches!(err, CloeError::MissingColumn(_)));
    }
}
