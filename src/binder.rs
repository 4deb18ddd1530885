//! Resolution of input-rate time series for every source/constituent pair.
//!
//! Precedence per pair: exclusion list > global per-source input >
//! constrained overrides > nothing. Each binding expands a naming template
//! over every catchment x functional unit and assigns the columns that exist.

use std::collections::HashSet;

use tracing::{debug, info, warn};

use crate::config::{CloeConfig, ConstrainedInput};
use crate::engine::{Constraint, ModelEngine};
use crate::error::{CloeError, CloeResult};
use crate::network::Network;
use crate::registry::DataSourceRegistry;
use crate::schema::{constraint, parameters};
use crate::template::{NamingTemplate, TemplateVars};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Source listed in the constituent's exclusion list.
    Excluded,
    /// No global input and no constrained override for the source.
    NoInputs,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedPair {
    pub source: String,
    pub constituent: String,
    pub reason: SkipReason,
}

/// Outcome of one template expansion against one data source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingSummary {
    pub data_source: String,
    pub source: String,
    pub constituent: String,
    pub parameter: String,
    pub applied: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BindingReport {
    pub bindings: Vec<BindingSummary>,
    pub skipped_pairs: Vec<SkippedPair>,
    /// `(data source, column)` pairs found missing, each reported once.
    pub missing_columns: Vec<(String, String)>,
    /// Explicit assignments from `inputs.global`.
    pub global_assignments: usize,
}

impl BindingReport {
    pub fn applied(&self) -> usize {
        self.bindings.iter().map(|b| b.applied).sum()
    }

    pub fn skipped(&self) -> usize {
        self.bindings.iter().map(|b| b.skipped).sum()
    }
}

/// One template expansion request.
#[derive(Debug, Clone, Copy)]
pub struct Binding<'a> {
    pub data_source: &'a str,
    pub template: &'a NamingTemplate,
    pub source: &'a str,
    pub constituent: &'a str,
    /// Known columns of the data source; `None` defers to the engine's record.
    pub columns: Option<&'a [String]>,
    /// Restrict to these functional units instead of the whole network.
    pub fus: Option<&'a [String]>,
    pub parameter: &'a str,
}

pub struct TimeSeriesBinder<'a> {
    config: &'a CloeConfig,
    network: &'a Network,
    registry: &'a DataSourceRegistry,
    reported_missing: HashSet<(String, String)>,
    report: BindingReport,
}

impl<'a> TimeSeriesBinder<'a> {
    pub fn new(
        config: &'a CloeConfig,
        network: &'a Network,
        registry: &'a DataSourceRegistry,
    ) -> Self {
        Self {
            config,
            network,
            registry,
            reported_missing: HashSet::new(),
            report: BindingReport::default(),
        }
    }

    /// Clear existing input rates, then bind every source/constituent pair
    /// and the explicit global assignments.
    pub fn resolve_and_bind<E: ModelEngine>(mut self, engine: &mut E) -> CloeResult<BindingReport> {
        engine.clear_time_series(parameters::INPUT_RATE, &Constraint::new())?;

        let constituents = self.config.constituents();
        for source in self.config.constituent_sources() {
            for constituent in &constituents {
                self.bind_pair(engine, &source, constituent)?;
            }
        }

        self.connect_global_time_series(engine)?;

        info!(
            applied = self.report.applied(),
            skipped = self.report.skipped(),
            skipped_pairs = self.report.skipped_pairs.len(),
            missing_columns = self.report.missing_columns.len(),
            "connected time series"
        );
        Ok(self.report)
    }

    fn bind_pair<E: ModelEngine>(
        &mut self,
        engine: &mut E,
        source: &str,
        constituent: &str,
    ) -> CloeResult<()> {
        let config = self.config;
        if config.is_excluded(source, constituent) {
            info!(source, constituent, "skipping - exclude list");
            self.skip_pair(source, constituent, SkipReason::Excluded);
            return Ok(());
        }

        if let Some(input) = config.inputs.source.get(source) {
            return self.bind_global(engine, source, constituent, input);
        }

        let overrides = config.inputs.overrides_for(source);
        if overrides.is_empty() {
            info!(source, constituent, "skipping - no inputs");
            self.skip_pair(source, constituent, SkipReason::NoInputs);
            return Ok(());
        }

        for entry in overrides {
            self.bind_override(engine, source, constituent, entry)?;
        }
        Ok(())
    }

    fn skip_pair(&mut self, source: &str, constituent: &str, reason: SkipReason) {
        self.report.skipped_pairs.push(SkippedPair {
            source: source.to_string(),
            constituent: constituent.to_string(),
            reason,
        });
    }

    /// Default treatment: one input applied to every catchment/FU with data.
    fn bind_global<E: ModelEngine>(
        &mut self,
        engine: &mut E,
        source: &str,
        constituent: &str,
        input: &str,
    ) -> CloeResult<()> {
        let config = self.config;
        let registry = self.registry;
        let entry = registry.resolve(input, constituent);

        let data_source = entry.map(|e| e.name.as_str()).unwrap_or(input);
        let template = entry
            .and_then(|e| e.template.as_ref())
            .or_else(|| config.inputs.column_formats.get(input))
            .ok_or_else(|| {
                CloeError::Config(format!(
                    "no column format for input '{input}' used by source '{source}'"
                ))
            })?;
        let columns = entry.map(|e| e.columns());

        debug!(source, constituent, data_source, template = %template, "global input");
        self.apply_template(
            engine,
            Binding {
                data_source,
                template,
                source,
                constituent,
                columns: columns.as_deref(),
                fus: None,
                parameter: parameters::INPUT_RATE,
            },
        )?;
        Ok(())
    }

    fn bind_override<E: ModelEngine>(
        &mut self,
        engine: &mut E,
        source: &str,
        constituent: &str,
        entry: &ConstrainedInput,
    ) -> CloeResult<()> {
        if let Some(allowed) = entry.constrain.constituents() {
            if !allowed.iter().any(|c| c == constituent) {
                debug!(source, constituent, data_source = %entry.datasource, "override not for constituent");
                return Ok(());
            }
        }

        let fus = entry.constrain.fus();
        self.apply_template(
            engine,
            Binding {
                data_source: &entry.datasource,
                template: &entry.column_format,
                source,
                constituent,
                columns: None,
                fus: fus.as_deref(),
                parameter: &entry.param,
            },
        )?;
        Ok(())
    }

    /// Expand `binding.template` over every catchment x functional unit and
    /// assign each column present in the data source.
    pub fn apply_template<E: ModelEngine>(
        &mut self,
        engine: &mut E,
        binding: Binding<'_>,
    ) -> CloeResult<BindingSummary> {
        let network = self.network;
        let fus = binding.fus.unwrap_or(network.functional_units.as_slice());
        let cells = network.catchments.len() * fus.len();
        let mut summary = BindingSummary {
            data_source: binding.data_source.to_string(),
            source: binding.source.to_string(),
            constituent: binding.constituent.to_string(),
            parameter: binding.parameter.to_string(),
            applied: 0,
            skipped: 0,
        };

        let registry = self.registry;
        let Some(columns) = binding
            .columns
            .or_else(|| registry.existing_columns(binding.data_source))
        else {
            warn!(
                data_source = binding.data_source,
                "we don't know anything about the columns in data source"
            );
            summary.skipped = cells;
            self.report.bindings.push(summary.clone());
            return Ok(summary);
        };
        let known: HashSet<&str> = columns.iter().map(|c| c.as_str()).collect();

        for catchment in &network.catchments {
            for fu in fus {
                let vars = TemplateVars::new(catchment, fu, binding.constituent);
                let column = binding.template.resolve(&vars);

                if !known.contains(column.as_str()) {
                    let key = (binding.data_source.to_string(), column);
                    if self.reported_missing.insert(key.clone()) {
                        warn!(data_source = %key.0, column = %key.1, "no data");
                        self.report.missing_columns.push(key);
                    }
                    summary.skipped += 1;
                    continue;
                }

                let constraint = Constraint::new()
                    .with(constraint::CATCHMENTS, catchment.as_str())
                    .with(constraint::FUS, fu.as_str())
                    .with(constraint::CONSTITUENTS, binding.constituent)
                    .with(constraint::SOURCES, binding.source);
                if let Err(e) = engine.assign_time_series(
                    binding.parameter,
                    &column,
                    binding.data_source,
                    &constraint,
                ) {
                    warn!(
                        column = %column,
                        data_source = binding.data_source,
                        catchment = %catchment,
                        fus = %fu,
                        constituent = binding.constituent,
                        source = binding.source,
                        error = %e,
                        "error assigning time series"
                    );
                    return Err(CloeError::Assignment {
                        column,
                        data_source: binding.data_source.to_string(),
                        catchment: catchment.clone(),
                        functional_unit: fu.clone(),
                        constituent: binding.constituent.to_string(),
                        source_name: binding.source.to_string(),
                        message: e.to_string(),
                    });
                }
                summary.applied += 1;
            }
        }

        info!(
            data_source = binding.data_source,
            constituent = binding.constituent,
            source = binding.source,
            applied = summary.applied,
            skipped = summary.skipped,
            "applying timeseries"
        );
        self.report.bindings.push(summary.clone());
        Ok(summary)
    }

    fn connect_global_time_series<E: ModelEngine>(&mut self, engine: &mut E) -> CloeResult<()> {
        let config = self.config;
        for ts in &config.inputs.global {
            engine.assign_time_series(&ts.parameter, &ts.column, &ts.source, &ts.constrain)?;
            self.report.global_assignments += 1;
        }
        Ok(())
    }
}
