//! Orchestration of a full CLOE scenario setup against one engine.

use std::path::Path;

use tracing::info;

use crate::binder::{BindingReport, TimeSeriesBinder};
use crate::config::CloeConfig;
use crate::engine::ModelEngine;
use crate::error::{CloeError, CloeResult};
use crate::functions::{FunctionBuilder, FunctionReport};
use crate::inputs::{self, InputSet};
use crate::installer;
use crate::network::Network;
use crate::parameters::{self, ParameterReport};
use crate::registry::DataSourceRegistry;
use crate::scenario::CloeScenario;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SetupReport {
    pub inputs: usize,
    pub data_sources: usize,
    pub binding: BindingReport,
    pub parameters: ParameterReport,
    pub functions: Vec<FunctionReport>,
}

pub struct CloeSetup<E: ModelEngine> {
    config: CloeConfig,
    engine: E,
    network: Network,
    inputs: Option<InputSet>,
    registry: Option<DataSourceRegistry>,
}

impl<E: ModelEngine> CloeSetup<E> {
    /// Validate the configuration and query the network once.
    pub fn new(config: CloeConfig, engine: E) -> CloeResult<Self> {
        config.validate()?;
        let network = Network::query(&engine)?;
        Ok(Self {
            config,
            engine,
            network,
            inputs: None,
            registry: None,
        })
    }

    pub fn from_json_file(path: &Path, engine: E) -> CloeResult<Self> {
        Self::new(CloeConfig::load_json(path)?, engine)
    }

    // ── Stages ──────────────────────────────────────────────────────────────

    pub fn load_inputs(&mut self) -> CloeResult<&InputSet> {
        let ignore = self.config.inputs.ignore.clone().unwrap_or_default();
        let loaded = inputs::load_inputs(&self.config.inputs.dir, &ignore)?;
        Ok(&*self.inputs.insert(loaded))
    }

    /// Use tables prepared elsewhere instead of reading the input directory.
    pub fn set_inputs(&mut self, inputs: InputSet) {
        self.inputs = Some(inputs);
        self.registry = None;
    }

    pub fn create_constituents(&mut self) -> CloeResult<()> {
        installer::create_constituents(&self.config, &mut self.engine)
    }

    pub fn create_constituent_sources(&mut self) -> CloeResult<()> {
        installer::create_constituent_sources(&self.config, &mut self.engine)
    }

    pub fn install_models(&mut self) -> CloeResult<()> {
        installer::install_models(&self.config, &mut self.engine)
    }

    pub fn create_data_sources(&mut self) -> CloeResult<&DataSourceRegistry> {
        let inputs = self
            .inputs
            .as_ref()
            .ok_or_else(|| CloeError::NotLoaded("inputs".into()))?;
        let mut registry = DataSourceRegistry::new();
        registry.create_data_sources(&self.config, inputs, &mut self.engine)?;
        Ok(&*self.registry.insert(registry))
    }

    pub fn connect_time_series(&mut self) -> CloeResult<BindingReport> {
        let registry = self
            .registry
            .as_ref()
            .ok_or_else(|| CloeError::NotLoaded("data sources".into()))?;
        TimeSeriesBinder::new(&self.config, &self.network, registry)
            .resolve_and_bind(&mut self.engine)
    }

    pub fn apply_parameters(&mut self) -> CloeResult<ParameterReport> {
        let inputs = self
            .inputs
            .as_ref()
            .ok_or_else(|| CloeError::NotLoaded("inputs".into()))?;
        parameters::apply_parameters(&self.config.parameters, inputs, &mut self.engine)
    }

    pub fn setup_functions(&mut self) -> CloeResult<Vec<FunctionReport>> {
        let inputs = self
            .inputs
            .as_ref()
            .ok_or_else(|| CloeError::NotLoaded("inputs".into()))?;
        FunctionBuilder::new(inputs).configure_all(&self.config.runoff_functions, &mut self.engine)
    }

    /// Run every stage in order. Inputs already set are reused.
    pub fn apply(&mut self) -> CloeResult<SetupReport> {
        if self.inputs.is_none() {
            self.load_inputs()?;
        }
        self.create_constituents()?;
        self.create_constituent_sources()?;
        self.install_models()?;
        let data_sources = self.create_data_sources()?.len();
        let binding = self.connect_time_series()?;
        let parameters = self.apply_parameters()?;
        let functions = self.setup_functions()?;

        let report = SetupReport {
            inputs: self.inputs.as_ref().map(InputSet::len).unwrap_or(0),
            data_sources,
            binding,
            parameters,
            functions,
        };
        info!(
            inputs = report.inputs,
            data_sources = report.data_sources,
            applied = report.binding.applied(),
            skipped = report.binding.skipped(),
            parameters = report.parameters.total(),
            functions = report.functions.len(),
            "scenario setup complete"
        );
        Ok(report)
    }

    // ── Accessors ───────────────────────────────────────────────────────────

    pub fn config(&self) -> &CloeConfig {
        &self.config
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn inputs(&self) -> Option<&InputSet> {
        self.inputs.as_ref()
    }

    pub fn registry(&self) -> Option<&DataSourceRegistry> {
        self.registry.as_ref()
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    pub fn scenario(&mut self) -> CloeScenario<'_, E> {
        CloeScenario::new(&mut self.engine)
    }

    pub fn into_engine(self) -> E {
        self.engine
    }
}
