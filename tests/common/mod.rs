//! In-memory engine that records every request it receives.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};

use cloe_setup::engine::{
    Constraint, DataSourceInfo, EngineResult, FunctionArguments, ModelAssignment, ModelComponent,
    ModelEngine, RecordedTable,
};
use cloe_setup::functions::variable_prefix;
use cloe_setup::EngineError;
use polars::prelude::DataFrame;

#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub parameter: String,
    pub column: String,
    pub data_source: String,
    pub constraint: Constraint,
}

impl Assignment {
    pub fn key(&self, key: &str) -> String {
        self.constraint.strings(key).join(",")
    }
}

#[derive(Debug, Clone)]
pub struct CreatedFunctions {
    pub names: Vec<String>,
    pub template: String,
    pub arguments: FunctionArguments,
}

#[derive(Debug, Default)]
pub struct RecordingEngine {
    // Configured network and engine state
    pub catchments: Vec<String>,
    pub functional_units: Vec<String>,
    pub runoff_params: HashMap<String, Vec<f64>>,
    pub model_table: Vec<ModelAssignment>,
    pub variables: Vec<String>,
    pub recorded: Option<RecordedTable>,
    pub fail_assign_column: Option<String>,
    /// Modelled variables that produce one element more than the network has.
    pub oversized_variables: Vec<String>,

    // Requests received
    pub constituents: Vec<String>,
    pub sources: Vec<String>,
    pub generation_models: Vec<(String, Constraint)>,
    pub link_models: Vec<(String, Constraint)>,
    pub data_source_columns: BTreeMap<String, Vec<String>>,
    pub assignments: Vec<Assignment>,
    pub cleared: Vec<(String, Constraint)>,
    pub params: Vec<(ModelComponent, String, f64, Constraint)>,
    pub deleted_variables: Vec<String>,
    pub time_periods: Vec<(String, Vec<String>)>,
    pub deleted_functions: Vec<String>,
    pub created_functions: Vec<CreatedFunctions>,
    pub function_options: Vec<(String, String, Vec<String>)>,
    pub evaluation: Vec<(String, Vec<String>)>,
    pub applied_functions: Vec<(String, Vec<String>, Constraint)>,
    pub recorders: Vec<Constraint>,
}

impl RecordingEngine {
    pub fn new(catchments: &[&str], functional_units: &[&str]) -> Self {
        Self {
            catchments: catchments.iter().map(|s| s.to_string()).collect(),
            functional_units: functional_units.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    /// Every catchment x FU pair, catchment-major.
    pub fn elements(&self) -> Vec<(String, String)> {
        self.catchments
            .iter()
            .flat_map(|c| {
                self.functional_units
                    .iter()
                    .map(move |fu| (c.clone(), fu.clone()))
            })
            .collect()
    }

    pub fn with_cloe_models(mut self) -> Self {
        self.model_table = self
            .elements()
            .into_iter()
            .map(|(catchment, functional_unit)| ModelAssignment {
                catchment,
                functional_unit,
                constituent: Some("TP".into()),
                source: Some("Fertiliser".into()),
                model: Some("Source.CLOE.ArealCLOEModel".into()),
            })
            .collect();
        self
    }

    pub fn assignments_for(&self, source: &str, constituent: &str) -> Vec<&Assignment> {
        self.assignments
            .iter()
            .filter(|a| a.key("sources") == source && a.key("constituents") == constituent)
            .collect()
    }

    pub fn param(&self, name: &str) -> Vec<f64> {
        self.params
            .iter()
            .filter(|(_, n, _, _)| n == name)
            .map(|(_, _, v, _)| *v)
            .collect()
    }
}

impl ModelEngine for RecordingEngine {
    fn network_features(&self, _feature_type: &str) -> EngineResult<Vec<String>> {
        Ok(self.catchments.clone())
    }

    fn functional_unit_types(&self) -> EngineResult<Vec<String>> {
        // one entry per catchment, as an engine listing FUs per catchment would
        Ok(self
            .catchments
            .iter()
            .flat_map(|_| self.functional_units.clone())
            .collect())
    }

    fn add_constituent(&mut self, name: &str) -> EngineResult<()> {
        self.constituents.push(name.to_string());
        Ok(())
    }

    fn add_constituent_source(&mut self, name: &str) -> EngineResult<()> {
        self.sources.push(name.to_string());
        Ok(())
    }

    fn set_generation_models(&mut self, model: &str, constraint: &Constraint) -> EngineResult<()> {
        self.generation_models
            .push((model.to_string(), constraint.clone()));
        Ok(())
    }

    fn set_link_constituent_models(
        &mut self,
        model: &str,
        constraint: &Constraint,
    ) -> EngineResult<()> {
        self.link_models.push((model.to_string(), constraint.clone()));
        Ok(())
    }

    fn create_data_source(&mut self, name: &str, table: &DataFrame, _units: &str) -> EngineResult<()> {
        let columns = table
            .get_column_names_str()
            .into_iter()
            .filter(|c| *c != "Date")
            .map(|c| c.to_string())
            .collect();
        self.data_source_columns.insert(name.to_string(), columns);
        Ok(())
    }

    fn data_sources(&self) -> EngineResult<Vec<DataSourceInfo>> {
        Ok(self
            .data_source_columns
            .iter()
            .map(|(name, columns)| DataSourceInfo {
                name: name.clone(),
                columns: columns.clone(),
            })
            .collect())
    }

    fn assign_time_series(
        &mut self,
        parameter: &str,
        column: &str,
        data_source: &str,
        constraint: &Constraint,
    ) -> EngineResult<()> {
        if self.fail_assign_column.as_deref() == Some(column) {
            return Err(EngineError::new("engine rejected assignment"));
        }
        self.assignments.push(Assignment {
            parameter: parameter.to_string(),
            column: column.to_string(),
            data_source: data_source.to_string(),
            constraint: constraint.clone(),
        });
        Ok(())
    }

    fn clear_time_series(&mut self, parameter: &str, constraint: &Constraint) -> EngineResult<()> {
        self.cleared.push((parameter.to_string(), constraint.clone()));
        Ok(())
    }

    fn set_param_values(
        &mut self,
        component: ModelComponent,
        parameter: &str,
        value: f64,
        constraint: &Constraint,
    ) -> EngineResult<()> {
        self.params
            .push((component, parameter.to_string(), value, constraint.clone()));
        Ok(())
    }

    fn get_param_values(
        &self,
        _component: ModelComponent,
        parameter: &str,
        _constraint: &Constraint,
    ) -> EngineResult<Vec<f64>> {
        self.runoff_params
            .get(parameter)
            .cloned()
            .ok_or_else(|| EngineError::new(format!("unknown parameter {parameter}")))
    }

    fn enumerate_names(
        &self,
        _component: ModelComponent,
        _constraint: &Constraint,
    ) -> EngineResult<Vec<(String, String)>> {
        Ok(self.elements())
    }

    fn generation_model_table(&self, _constraint: &Constraint) -> EngineResult<Vec<ModelAssignment>> {
        Ok(self.model_table.clone())
    }

    fn create_modelled_variable(&mut self, name: &str, _constraint: &Constraint) -> EngineResult<()> {
        let prefix = variable_prefix(name);
        for (catchment, fu) in self.elements() {
            self.variables.push(format!(
                "{prefix}_{}_{}",
                catchment.replace('#', ""),
                fu.replace(' ', "_")
            ));
        }
        if self.oversized_variables.iter().any(|v| v == name) {
            self.variables.push(format!("{prefix}_SC99_Urban"));
        }
        Ok(())
    }

    fn variable_names(&self) -> EngineResult<Vec<String>> {
        Ok(self.variables.clone())
    }

    fn delete_variables(&mut self, names: &[String]) -> EngineResult<()> {
        self.variables.retain(|v| !names.contains(v));
        self.deleted_variables.extend(names.iter().cloned());
        Ok(())
    }

    fn set_modelled_variable_time_period(
        &mut self,
        period: &str,
        variables: &[String],
    ) -> EngineResult<()> {
        self.time_periods
            .push((period.to_string(), variables.to_vec()));
        Ok(())
    }

    fn delete_functions(&mut self, names: &[String]) -> EngineResult<()> {
        self.deleted_functions.extend(names.iter().cloned());
        Ok(())
    }

    fn create_functions(
        &mut self,
        names: &[String],
        template: &str,
        arguments: &FunctionArguments,
    ) -> EngineResult<()> {
        self.created_functions.push(CreatedFunctions {
            names: names.to_vec(),
            template: template.to_string(),
            arguments: arguments.clone(),
        });
        Ok(())
    }

    fn set_function_option(
        &mut self,
        option: &str,
        value: &str,
        functions: &[String],
    ) -> EngineResult<()> {
        self.function_options
            .push((option.to_string(), value.to_string(), functions.to_vec()));
        Ok(())
    }

    fn set_time_of_evaluation(&mut self, timing: &str, functions: &[String]) -> EngineResult<()> {
        self.evaluation.push((timing.to_string(), functions.to_vec()));
        Ok(())
    }

    fn apply_function(
        &mut self,
        parameter: &str,
        applications: &[String],
        constraint: &Constraint,
    ) -> EngineResult<()> {
        self.applied_functions
            .push((parameter.to_string(), applications.to_vec(), constraint.clone()));
        Ok(())
    }

    fn configure_recording(&mut self, enable: &[Constraint]) -> EngineResult<()> {
        self.recorders.extend(enable.iter().cloned());
        Ok(())
    }

    fn retrieve_multiple_time_series(
        &self,
        _run: &str,
        _criteria: &Constraint,
    ) -> EngineResult<RecordedTable> {
        self.recorded
            .clone()
            .ok_or_else(|| EngineError::new("nothing recorded"))
    }
}
