//! Expansion of runoff-function templates into per-element functions.
//!
//! For each configured function: recreate its modelled variables, gather
//! per-element arguments (modelled variables, current parameter values and
//! spatial data lookups), recreate the functions, and install them as the
//! target parameter of every element running a CLOE generation model.

use tracing::{debug, info};

use crate::config::{DataVariable, RunoffFunctionConfig};
use crate::engine::{ArgumentValue, FunctionArguments, ModelComponent, ModelEngine};
use crate::error::{CloeError, CloeResult};
use crate::inputs::InputSet;
use crate::parameters::{extract_spatial_values, SpatialValue};
use crate::schema::{functions, models};

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionReport {
    pub function_name: String,
    pub parameter: String,
    pub functions_created: usize,
    pub applications: Vec<String>,
}

/// Prefix of the engine variables created for a modelled variable
/// (`Quick Flow` -> `$Quick_Flow`).
pub fn variable_prefix(variable: &str) -> String {
    format!("${}", variable.replace([' ', '-'], "_"))
}

/// Identifier of a function applied to one element.
pub fn application_name(function_name: &str, catchment: &str, functional_unit: &str) -> String {
    format!("${function_name}_{catchment}_{functional_unit}")
        .replace('#', "")
        .replace("- ", "")
        .replace(' ', "_")
}

/// First rule selecting the element wins; `default` when none does.
pub fn lookup_value(rules: &[SpatialValue], catchment: &str, functional_unit: &str, default: f64) -> f64 {
    rules
        .iter()
        .find(|rule| rule.selects(catchment, functional_unit))
        .map(|rule| rule.value)
        .unwrap_or(default)
}

pub struct FunctionBuilder<'a> {
    inputs: &'a InputSet,
}

impl<'a> FunctionBuilder<'a> {
    pub fn new(inputs: &'a InputSet) -> Self {
        Self { inputs }
    }

    pub fn configure_all<E: ModelEngine>(
        &self,
        specs: &[RunoffFunctionConfig],
        engine: &mut E,
    ) -> CloeResult<Vec<FunctionReport>> {
        specs.iter().map(|spec| self.configure(spec, engine)).collect()
    }

    pub fn configure<E: ModelEngine>(
        &self,
        spec: &RunoffFunctionConfig,
        engine: &mut E,
    ) -> CloeResult<FunctionReport> {
        info!(function = %spec.function_name, param = %spec.param, "configuring runoff function");

        let runoff_constraint = spec.runoff_constraint();
        let mut arguments = if spec.uses_named_arguments() {
            FunctionArguments::named()
        } else {
            FunctionArguments::positional()
        };

        let mut function_names: Vec<String> = Vec::new();
        for (i, variable) in spec.model_variables().into_iter().enumerate() {
            let prefix = variable_prefix(&variable);

            let stale: Vec<String> = engine
                .variable_names()?
                .into_iter()
                .filter(|v| v.starts_with(&prefix))
                .collect();
            if !stale.is_empty() {
                debug!(prefix = %prefix, count = stale.len(), "deleting existing variables");
                engine.delete_variables(&stale)?;
            }

            engine.create_modelled_variable(&variable, &runoff_constraint)?;

            let created: Vec<String> = engine
                .variable_names()?
                .into_iter()
                .filter(|v| v.starts_with(&prefix))
                .collect();
            engine.set_modelled_variable_time_period(functions::CURRENT_TIME_STEP, &created)?;

            let label = &prefix[1..];
            if i == 0 {
                function_names = created
                    .iter()
                    .map(|v| v.replace(label, &spec.function_name))
                    .collect();
            } else {
                check_length(&spec.function_name, label, created.len(), function_names.len())?;
            }
            arguments.push(
                label,
                created.into_iter().map(ArgumentValue::Text).collect(),
            );
        }

        for parameter in &spec.model_parameters {
            let values =
                engine.get_param_values(ModelComponent::Runoff, parameter, &runoff_constraint)?;
            check_length(&spec.function_name, parameter, values.len(), function_names.len())?;
            arguments.push(parameter, values.into_iter().map(ArgumentValue::Number).collect());
        }

        if !spec.data_variables.is_empty() {
            let elements = engine.enumerate_names(ModelComponent::Runoff, &runoff_constraint)?;
            for data_variable in &spec.data_variables {
                let values = self.data_variable_values(data_variable, &elements)?;
                check_length(
                    &spec.function_name,
                    &data_variable.label,
                    values.len(),
                    function_names.len(),
                )?;
                arguments.push(
                    &data_variable.label,
                    values.into_iter().map(ArgumentValue::Number).collect(),
                );
            }
        }

        engine.delete_functions(&function_names)?;
        engine.create_functions(&function_names, &spec.template, &arguments)?;

        if let Some(units) = &spec.units {
            let unit = format!("{}{units}", functions::UNIT_LIBRARY_PREFIX);
            engine.set_function_option(functions::RESULT_UNIT, &unit, &function_names)?;
        }

        let applications: Vec<String> = engine
            .generation_model_table(&spec.constrain)?
            .into_iter()
            .filter(|row| {
                row.model
                    .as_deref()
                    .map(|m| m.ends_with(models::CLOE_SUFFIX))
                    .unwrap_or(false)
            })
            .map(|row| application_name(&spec.function_name, &row.catchment, &row.functional_unit))
            .collect();

        engine.clear_time_series(&spec.param, &spec.constrain)?;
        engine.apply_function(&spec.param, &applications, &spec.constrain)?;
        engine.set_time_of_evaluation(functions::DURING_FLOW_PHASE, &applications)?;

        info!(
            function = %spec.function_name,
            created = function_names.len(),
            applied = applications.len(),
            "configured runoff function"
        );
        Ok(FunctionReport {
            function_name: spec.function_name.clone(),
            parameter: spec.param.clone(),
            functions_created: function_names.len(),
            applications,
        })
    }

    /// Per-element values of a data variable, in the order of `elements`.
    fn data_variable_values(
        &self,
        data_variable: &DataVariable,
        elements: &[(String, String)],
    ) -> CloeResult<Vec<f64>> {
        let rules = extract_spatial_values(&data_variable.lookup, self.inputs)?;
        let default = data_variable
            .default_value
            .unwrap_or(functions::DEFAULT_DATA_VALUE);
        Ok(elements
            .iter()
            .map(|(catchment, fu)| lookup_value(&rules, catchment, fu, default))
            .collect())
    }
}

fn check_length(function: &str, argument: &str, values: usize, functions: usize) -> CloeResult<()> {
    if values != functions {
        return Err(CloeError::Consistency(format!(
            "function '{function}': expected {functions} values for '{argument}', found {values}"
        )));
    }
    Ok(())
}
