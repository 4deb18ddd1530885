//! Registration of temporal inputs as engine data sources.

use std::collections::HashMap;

use polars::prelude::pivot::pivot_stable;
use polars::prelude::*;
use tracing::{debug, info};

use crate::config::CloeConfig;
use crate::engine::ModelEngine;
use crate::error::{CloeError, CloeResult};
use crate::inputs::InputSet;
use crate::schema::{columns, data_sources};
use crate::template::NamingTemplate;

/// Lookup key of a registered data source.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SourceKey {
    /// Input registered as-is.
    Input(String),
    /// Input pivoted for one constituent.
    Constituent { input: String, constituent: String },
}

impl SourceKey {
    pub fn input(input: &str) -> Self {
        SourceKey::Input(input.to_string())
    }

    pub fn constituent(input: &str, constituent: &str) -> Self {
        SourceKey::Constituent {
            input: input.to_string(),
            constituent: constituent.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DataSourceEntry {
    pub name: String,
    /// `None` when configuration gives no column format for the input.
    pub template: Option<NamingTemplate>,
    pub table: DataFrame,
}

impl DataSourceEntry {
    /// Data columns of the backing table (everything but `Date`).
    pub fn columns(&self) -> Vec<String> {
        self.table
            .get_column_names_str()
            .into_iter()
            .filter(|c| *c != columns::DATE)
            .map(|c| c.to_string())
            .collect()
    }
}

#[derive(Debug, Clone, Default)]
pub struct DataSourceRegistry {
    entries: HashMap<SourceKey, DataSourceEntry>,
    /// Column names as recorded by the engine, per data source name.
    existing: HashMap<String, Vec<String>>,
}

impl DataSourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every temporal input, pivoting the ones that constituents
    /// look up by location.
    pub fn create_data_sources<E: ModelEngine>(
        &mut self,
        config: &CloeConfig,
        inputs: &InputSet,
        engine: &mut E,
    ) -> CloeResult<()> {
        for key in inputs.temporal() {
            let df = inputs.get(key)?;

            if !config.inputs.is_constituent_specific(key) {
                debug!(input = %key, "registering without pivot");
                engine.create_data_source(key, df, data_sources::UNITS)?;
                self.entries.insert(
                    SourceKey::input(key),
                    DataSourceEntry {
                        name: key.to_string(),
                        template: config.inputs.column_formats.get(key).cloned(),
                        table: df.clone(),
                    },
                );
                continue;
            }

            for (constituent, lookup) in &config.inputs.columns {
                let Some(value_column) = lookup.get(key) else {
                    continue;
                };
                let pivoted = pivot_by_location(df, value_column)?;
                let name = format!("{constituent}:{key}");
                debug!(input = %key, constituent = %constituent, data_source = %name, columns = pivoted.width() - 1, "registering pivoted input");
                engine.create_data_source(&name, &pivoted, data_sources::UNITS)?;
                self.entries.insert(
                    SourceKey::constituent(key, constituent),
                    DataSourceEntry {
                        name,
                        template: Some(NamingTemplate::parse(data_sources::PIVOT_TEMPLATE)?),
                        table: pivoted,
                    },
                );
            }
        }

        self.map_model_data_sources(engine)?;
        info!(registered = self.entries.len(), "created data sources");
        Ok(())
    }

    /// Refresh the engine's record of data source columns.
    pub fn map_model_data_sources<E: ModelEngine>(&mut self, engine: &E) -> CloeResult<()> {
        self.existing = engine
            .data_sources()?
            .into_iter()
            .map(|ds| (ds.name, ds.columns))
            .collect();
        Ok(())
    }

    pub fn get(&self, key: &SourceKey) -> Option<&DataSourceEntry> {
        self.entries.get(key)
    }

    /// Entry for `input`, falling back to its pivot for `constituent`.
    pub fn resolve(&self, input: &str, constituent: &str) -> Option<&DataSourceEntry> {
        self.get(&SourceKey::input(input))
            .or_else(|| self.get(&SourceKey::constituent(input, constituent)))
    }

    pub fn existing_columns(&self, data_source: &str) -> Option<&[String]> {
        self.existing.get(data_source).map(|c| c.as_slice())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Pivot a long `Date, location, value` table to one column per location.
pub fn pivot_by_location(df: &DataFrame, value_column: &str) -> CloeResult<DataFrame> {
    for required in [columns::DATE, columns::LOCATION, value_column] {
        if df.column(required).is_err() {
            return Err(CloeError::MissingColumn(required.to_string()));
        }
    }
    let pivoted = pivot_stable(
        df,
        [columns::LOCATION],
        Some([columns::DATE]),
        Some([value_column]),
        false,
        None,
        None,
    )?;
    Ok(pivoted)
}
