//! Python bindings: a [`ModelEngine`] backed by a Python adapter object, and
//! `CloeSetup` / `CloeScenario` classes driving it.
//!
//! The adapter exposes one method per engine capability, named as in
//! [`ModelEngine`]. Constraints arrive as dicts, tables as polars frames and
//! the model component as `"generation"` or `"runoff"`. Structured results:
//!
//! - `data_sources()` -> list of `(name, [column, ...])`
//! - `enumerate_names(component, constraint)` -> list of `(catchment, fu)`
//! - `generation_model_table(constraint)` -> list of dicts with `catchment`,
//!   `fu`, `constituent`, `source`, `model`
//! - `retrieve_multiple_time_series(run, criteria)` -> `(frame, [dict])`, each
//!   dict holding `NetworkElement`, `FunctionalUnit`, `RecordingVariable`
//! - `create_functions(names, template, arguments, named)` receives one dict
//!   (named) or list (positional) of arguments per function.

use std::collections::HashMap;
use std::path::PathBuf;

use polars::prelude::DataFrame;
use pyo3::prelude::*;
use pyo3::types::{PyDict, PyList};
use pyo3_polars::PyDataFrame;
use serde_json::Value;

use crate::binder::BindingReport;
use crate::config::CloeConfig;
use crate::engine::{
    ArgumentValue, Constraint, DataSourceInfo, EngineResult, FunctionArguments, ModelAssignment,
    ModelComponent, ModelEngine, RecordedTable, RecordingInfo,
};
use crate::error::EngineError;
use crate::scenario::{self, CloeScenario, DEFAULT_CONSTITUENT};
use crate::schema::recording;
use crate::setup::{CloeSetup, SetupReport};

pub struct PyEngine {
    adapter: PyObject,
}

impl PyEngine {
    pub fn new(adapter: PyObject) -> Self {
        Self { adapter }
    }
}

fn component_name(component: ModelComponent) -> &'static str {
    match component {
        ModelComponent::Generation => "generation",
        ModelComponent::Runoff => "runoff",
    }
}

fn json_to_py<'py>(py: Python<'py>, value: &Value) -> PyResult<Bound<'py, PyAny>> {
    Ok(match value {
        Value::Null => py.None().into_bound(py),
        Value::Bool(b) => b.into_pyobject(py)?.to_owned().into_any(),
        Value::Number(n) => match n.as_i64() {
            Some(i) => i.into_pyobject(py)?.into_any(),
            None => n.as_f64().unwrap_or(f64::NAN).into_pyobject(py)?.into_any(),
        },
        Value::String(s) => s.into_pyobject(py)?.into_any(),
        Value::Array(items) => {
            let list = PyList::empty(py);
            for item in items {
                list.append(json_to_py(py, item)?)?;
            }
            list.into_any()
        }
        Value::Object(map) => {
            let dict = PyDict::new(py);
            for (k, v) in map {
                dict.set_item(k, json_to_py(py, v)?)?;
            }
            dict.into_any()
        }
    })
}

fn constraint_to_py<'py>(py: Python<'py>, constraint: &Constraint) -> PyResult<Bound<'py, PyDict>> {
    let dict = PyDict::new(py);
    for (k, v) in constraint.iter() {
        dict.set_item(k, json_to_py(py, v)?)?;
    }
    Ok(dict)
}

fn argument_to_py<'py>(py: Python<'py>, value: &ArgumentValue) -> PyResult<Bound<'py, PyAny>> {
    Ok(match value {
        ArgumentValue::Text(s) => s.into_pyobject(py)?.into_any(),
        ArgumentValue::Number(n) => n.into_pyobject(py)?.into_any(),
    })
}

fn arguments_to_py<'py>(py: Python<'py>, args: &FunctionArguments) -> PyResult<Bound<'py, PyList>> {
    let out = PyList::empty(py);
    for i in 0..args.element_count() {
        if args.is_named() {
            let dict = PyDict::new(py);
            for (name, value) in args.element(i) {
                dict.set_item(name, argument_to_py(py, value)?)?;
            }
            out.append(dict)?;
        } else {
            let list = PyList::empty(py);
            for (_, value) in args.element(i) {
                list.append(argument_to_py(py, value)?)?;
            }
            out.append(list)?;
        }
    }
    Ok(out)
}

impl ModelEngine for PyEngine {
    fn network_features(&self, feature_type: &str) -> EngineResult<Vec<String>> {
        Python::with_gil(|py| {
            let out = self
                .adapter
                .bind(py)
                .call_method1("network_features", (feature_type,))?;
            Ok(out.extract()?)
        })
    }

    fn functional_unit_types(&self) -> EngineResult<Vec<String>> {
        Python::with_gil(|py| {
            let out = self.adapter.bind(py).call_method0("functional_unit_types")?;
            Ok(out.extract()?)
        })
    }

    fn add_constituent(&mut self, name: &str) -> EngineResult<()> {
        Python::with_gil(|py| {
            self.adapter.bind(py).call_method1("add_constituent", (name,))?;
            Ok(())
        })
    }

    fn add_constituent_source(&mut self, name: &str) -> EngineResult<()> {
        Python::with_gil(|py| {
            self.adapter
                .bind(py)
                .call_method1("add_constituent_source", (name,))?;
            Ok(())
        })
    }

    fn set_generation_models(&mut self, model: &str, constraint: &Constraint) -> EngineResult<()> {
        Python::with_gil(|py| {
            let c = constraint_to_py(py, constraint)?;
            self.adapter
                .bind(py)
                .call_method1("set_generation_models", (model, c))?;
            Ok(())
        })
    }

    fn set_link_constituent_models(
        &mut self,
        model: &str,
        constraint: &Constraint,
    ) -> EngineResult<()> {
        Python::with_gil(|py| {
            let c = constraint_to_py(py, constraint)?;
            self.adapter
                .bind(py)
                .call_method1("set_link_constituent_models", (model, c))?;
            Ok(())
        })
    }

    fn create_data_source(&mut self, name: &str, table: &DataFrame, units: &str) -> EngineResult<()> {
        Python::with_gil(|py| {
            self.adapter.bind(py).call_method1(
                "create_data_source",
                (name, PyDataFrame(table.clone()), units),
            )?;
            Ok(())
        })
    }

    fn data_sources(&self) -> EngineResult<Vec<DataSourceInfo>> {
        Python::with_gil(|py| {
            let out: Vec<(String, Vec<String>)> = self
                .adapter
                .bind(py)
                .call_method0("data_sources")?
                .extract()?;
            Ok(out
                .into_iter()
                .map(|(name, columns)| DataSourceInfo { name, columns })
                .collect())
        })
    }

    fn assign_time_series(
        &mut self,
        parameter: &str,
        column: &str,
        data_source: &str,
        constraint: &Constraint,
    ) -> EngineResult<()> {
        Python::with_gil(|py| {
            let c = constraint_to_py(py, constraint)?;
            self.adapter.bind(py).call_method1(
                "assign_time_series",
                (parameter, column, data_source, c),
            )?;
            Ok(())
        })
    }

    fn clear_time_series(&mut self, parameter: &str, constraint: &Constraint) -> EngineResult<()> {
        Python::with_gil(|py| {
            let c = constraint_to_py(py, constraint)?;
            self.adapter
                .bind(py)
                .call_method1("clear_time_series", (parameter, c))?;
            Ok(())
        })
    }

    fn set_param_values(
        &mut self,
        component: ModelComponent,
        parameter: &str,
        value: f64,
        constraint: &Constraint,
    ) -> EngineResult<()> {
        Python::with_gil(|py| {
            let c = constraint_to_py(py, constraint)?;
            self.adapter.bind(py).call_method1(
                "set_param_values",
                (component_name(component), parameter, value, c),
            )?;
            Ok(())
        })
    }

    fn get_param_values(
        &self,
        component: ModelComponent,
        parameter: &str,
        constraint: &Constraint,
    ) -> EngineResult<Vec<f64>> {
        Python::with_gil(|py| {
            let c = constraint_to_py(py, constraint)?;
            let out = self.adapter.bind(py).call_method1(
                "get_param_values",
                (component_name(component), parameter, c),
            )?;
            Ok(out.extract()?)
        })
    }

    fn enumerate_names(
        &self,
        component: ModelComponent,
        constraint: &Constraint,
    ) -> EngineResult<Vec<(String, String)>> {
        Python::with_gil(|py| {
            let c = constraint_to_py(py, constraint)?;
            let out = self
                .adapter
                .bind(py)
                .call_method1("enumerate_names", (component_name(component), c))?;
            Ok(out.extract()?)
        })
    }

    fn generation_model_table(&self, constraint: &Constraint) -> EngineResult<Vec<ModelAssignment>> {
        Python::with_gil(|py| {
            let c = constraint_to_py(py, constraint)?;
            let rows: Vec<HashMap<String, Option<String>>> = self
                .adapter
                .bind(py)
                .call_method1("generation_model_table", (c,))?
                .extract()?;
            rows.into_iter()
                .map(|mut row| {
                    let mut take = |key: &str| row.remove(key).flatten();
                    let catchment = take("catchment")
                        .ok_or_else(|| EngineError::new("model table row without catchment"))?;
                    let functional_unit = take("fu")
                        .ok_or_else(|| EngineError::new("model table row without fu"))?;
                    Ok(ModelAssignment {
                        catchment,
                        functional_unit,
                        constituent: take("constituent"),
                        source: take("source"),
                        model: take("model"),
                    })
                })
                .collect()
        })
    }

    fn create_modelled_variable(&mut self, name: &str, constraint: &Constraint) -> EngineResult<()> {
        Python::with_gil(|py| {
            let c = constraint_to_py(py, constraint)?;
            self.adapter
                .bind(py)
                .call_method1("create_modelled_variable", (name, c))?;
            Ok(())
        })
    }

    fn variable_names(&self) -> EngineResult<Vec<String>> {
        Python::with_gil(|py| Ok(self.adapter.bind(py).call_method0("variable_names")?.extract()?))
    }

    fn delete_variables(&mut self, names: &[String]) -> EngineResult<()> {
        Python::with_gil(|py| {
            self.adapter
                .bind(py)
                .call_method1("delete_variables", (names.to_vec(),))?;
            Ok(())
        })
    }

    fn set_modelled_variable_time_period(
        &mut self,
        period: &str,
        variables: &[String],
    ) -> EngineResult<()> {
        Python::with_gil(|py| {
            self.adapter.bind(py).call_method1(
                "set_modelled_variable_time_period",
                (period, variables.to_vec()),
            )?;
            Ok(())
        })
    }

    fn delete_functions(&mut self, names: &[String]) -> EngineResult<()> {
        Python::with_gil(|py| {
            self.adapter
                .bind(py)
                .call_method1("delete_functions", (names.to_vec(),))?;
            Ok(())
        })
    }

    fn create_functions(
        &mut self,
        names: &[String],
        template: &str,
        arguments: &FunctionArguments,
    ) -> EngineResult<()> {
        Python::with_gil(|py| {
            let args = arguments_to_py(py, arguments)?;
            self.adapter.bind(py).call_method1(
                "create_functions",
                (names.to_vec(), template, args, arguments.is_named()),
            )?;
            Ok(())
        })
    }

    fn set_function_option(
        &mut self,
        option: &str,
        value: &str,
        functions: &[String],
    ) -> EngineResult<()> {
        Python::with_gil(|py| {
            self.adapter.bind(py).call_method1(
                "set_function_option",
                (option, value, functions.to_vec()),
            )?;
            Ok(())
        })
    }

    fn set_time_of_evaluation(&mut self, timing: &str, functions: &[String]) -> EngineResult<()> {
        Python::with_gil(|py| {
            self.adapter
                .bind(py)
                .call_method1("set_time_of_evaluation", (timing, functions.to_vec()))?;
            Ok(())
        })
    }

    fn apply_function(
        &mut self,
        parameter: &str,
        applications: &[String],
        constraint: &Constraint,
    ) -> EngineResult<()> {
        Python::with_gil(|py| {
            let c = constraint_to_py(py, constraint)?;
            self.adapter.bind(py).call_method1(
                "apply_function",
                (parameter, applications.to_vec(), c),
            )?;
            Ok(())
        })
    }

    fn configure_recording(&mut self, enable: &[Constraint]) -> EngineResult<()> {
        Python::with_gil(|py| {
            let recorders = PyList::empty(py);
            for spec in enable {
                recorders.append(constraint_to_py(py, spec)?)?;
            }
            self.adapter
                .bind(py)
                .call_method1("configure_recording", (recorders,))?;
            Ok(())
        })
    }

    fn retrieve_multiple_time_series(
        &self,
        run: &str,
        criteria: &Constraint,
    ) -> EngineResult<RecordedTable> {
        Python::with_gil(|py| {
            let c = constraint_to_py(py, criteria)?;
            let (frame, rows): (PyDataFrame, Vec<HashMap<String, String>>) = self
                .adapter
                .bind(py)
                .call_method1("retrieve_multiple_time_series", (run, c))?
                .extract()?;
            let recordings = rows
                .into_iter()
                .map(|mut row| {
                    let mut take = |key: &str| {
                        row.remove(key).ok_or_else(|| {
                            EngineError::new(format!("recording description without {key}"))
                        })
                    };
                    Ok(RecordingInfo {
                        network_element: take("NetworkElement")?,
                        functional_unit: take("FunctionalUnit")?,
                        recording_variable: take(recording::RECORDING_VARIABLE)?,
                    })
                })
                .collect::<EngineResult<Vec<_>>>()?;
            Ok(RecordedTable {
                table: frame.0,
                recordings,
            })
        })
    }
}

fn report_to_py<'py>(py: Python<'py>, report: &SetupReport) -> PyResult<Bound<'py, PyDict>> {
    let dict = PyDict::new(py);
    dict.set_item("inputs", report.inputs)?;
    dict.set_item("data_sources", report.data_sources)?;
    dict.set_item("binding", binding_to_py(py, &report.binding)?)?;
    dict.set_item("parameters", report.parameters.total())?;
    let functions = PyDict::new(py);
    for f in &report.functions {
        functions.set_item(&f.function_name, f.applications.len())?;
    }
    dict.set_item("functions", functions)?;
    Ok(dict)
}

fn binding_to_py<'py>(py: Python<'py>, report: &BindingReport) -> PyResult<Bound<'py, PyDict>> {
    let dict = PyDict::new(py);
    dict.set_item("applied", report.applied())?;
    dict.set_item("skipped", report.skipped())?;
    dict.set_item("missing_columns", report.missing_columns.clone())?;
    dict.set_item(
        "skipped_pairs",
        report
            .skipped_pairs
            .iter()
            .map(|p| (p.source.clone(), p.constituent.clone()))
            .collect::<Vec<_>>(),
    )?;
    dict.set_item("global_assignments", report.global_assignments)?;
    Ok(dict)
}

#[pyclass(name = "CloeSetup")]
pub struct PyCloeSetup {
    inner: CloeSetup<PyEngine>,
}

#[pymethods]
impl PyCloeSetup {
    #[new]
    fn new(config_path: PathBuf, engine: PyObject) -> PyResult<Self> {
        let inner = CloeSetup::from_json_file(&config_path, PyEngine::new(engine))?;
        Ok(Self { inner })
    }

    #[staticmethod]
    fn from_json(config: &str, engine: PyObject) -> PyResult<Self> {
        let config = CloeConfig::from_json_str(config)?;
        let inner = CloeSetup::new(config, PyEngine::new(engine))?;
        Ok(Self { inner })
    }

    fn apply<'py>(&mut self, py: Python<'py>) -> PyResult<Bound<'py, PyDict>> {
        let report = self.inner.apply()?;
        report_to_py(py, &report)
    }

    // ── Stages ──────────────────────────────────────────────────────────────

    fn load_inputs(&mut self) -> PyResult<Vec<String>> {
        let inputs = self.inner.load_inputs()?;
        Ok(inputs.keys().map(str::to_string).collect())
    }

    fn create_constituents(&mut self) -> PyResult<()> {
        Ok(self.inner.create_constituents()?)
    }

    fn create_constituent_sources(&mut self) -> PyResult<()> {
        Ok(self.inner.create_constituent_sources()?)
    }

    fn install_models(&mut self) -> PyResult<()> {
        Ok(self.inner.install_models()?)
    }

    fn create_data_sources(&mut self) -> PyResult<usize> {
        Ok(self.inner.create_data_sources()?.len())
    }

    fn connect_time_series<'py>(&mut self, py: Python<'py>) -> PyResult<Bound<'py, PyDict>> {
        let report = self.inner.connect_time_series()?;
        binding_to_py(py, &report)
    }

    fn apply_parameters(&mut self) -> PyResult<usize> {
        Ok(self.inner.apply_parameters()?.total())
    }

    fn setup_functions(&mut self) -> PyResult<Vec<String>> {
        Ok(self
            .inner
            .setup_functions()?
            .into_iter()
            .map(|f| f.function_name)
            .collect())
    }

    // ── Data access ─────────────────────────────────────────────────────────

    fn input(&self, key: &str) -> PyResult<PyDataFrame> {
        let inputs = self
            .inner
            .inputs()
            .ok_or_else(|| crate::error::CloeError::NotLoaded("inputs".into()))?;
        Ok(PyDataFrame(inputs.get(key)?.clone()))
    }

    #[getter]
    fn catchments(&self) -> Vec<String> {
        self.inner.network().catchments.clone()
    }

    #[getter]
    fn functional_units(&self) -> Vec<String> {
        self.inner.network().functional_units.clone()
    }
}

#[pyclass(name = "CloeScenario")]
pub struct PyCloeScenario {
    engine: PyEngine,
}

#[pymethods]
impl PyCloeScenario {
    #[new]
    fn new(engine: PyObject) -> Self {
        Self {
            engine: PyEngine::new(engine),
        }
    }

    fn record_stores(&mut self) -> PyResult<()> {
        Ok(CloeScenario::new(&mut self.engine).record_stores()?)
    }

    fn record_fluxes(&mut self) -> PyResult<()> {
        Ok(CloeScenario::new(&mut self.engine).record_fluxes()?)
    }

    #[pyo3(signature = (variable, constituent=DEFAULT_CONSTITUENT, run=recording::LATEST_RUN))]
    fn retrieve_model_var_by_fu(
        &mut self,
        variable: &str,
        constituent: &str,
        run: &str,
    ) -> PyResult<PyDataFrame> {
        let df = CloeScenario::new(&mut self.engine)
            .retrieve_model_var_by_fu(variable, constituent, run)?;
        Ok(PyDataFrame(df))
    }

    #[pyo3(signature = (constituent=DEFAULT_CONSTITUENT, run=recording::LATEST_RUN))]
    fn retrieve_soil_stores(&mut self, constituent: &str, run: &str) -> PyResult<PyDataFrame> {
        let df = CloeScenario::new(&mut self.engine).retrieve_soil_stores(constituent, run)?;
        Ok(PyDataFrame(df))
    }

    #[pyo3(signature = (constituent=DEFAULT_CONSTITUENT, run=recording::LATEST_RUN))]
    fn retrieve_gw_stores(&mut self, constituent: &str, run: &str) -> PyResult<PyDataFrame> {
        let df = CloeScenario::new(&mut self.engine).retrieve_gw_stores(constituent, run)?;
        Ok(PyDataFrame(df))
    }

    #[pyo3(signature = (constituent=DEFAULT_CONSTITUENT, run=recording::LATEST_RUN))]
    fn retrieve_gw_loss(&mut self, constituent: &str, run: &str) -> PyResult<PyDataFrame> {
        let df = CloeScenario::new(&mut self.engine).retrieve_gw_loss(constituent, run)?;
        Ok(PyDataFrame(df))
    }

    #[pyo3(signature = (constituent=DEFAULT_CONSTITUENT, run=recording::LATEST_RUN))]
    fn retrieve_loss_to_outside(&mut self, constituent: &str, run: &str) -> PyResult<PyDataFrame> {
        let df = CloeScenario::new(&mut self.engine).retrieve_loss_to_outside(constituent, run)?;
        Ok(PyDataFrame(df))
    }

    #[pyo3(signature = (variable, constituent=DEFAULT_CONSTITUENT, run=recording::LATEST_RUN))]
    fn retrieve_fu_flux(
        &mut self,
        variable: &str,
        constituent: &str,
        run: &str,
    ) -> PyResult<PyDataFrame> {
        let df = CloeScenario::new(&mut self.engine).retrieve_fu_flux(variable, constituent, run)?;
        Ok(PyDataFrame(df))
    }

    #[pyo3(signature = (constituent=DEFAULT_CONSTITUENT, run=recording::LATEST_RUN))]
    fn retrieve_quickflow_flux(&mut self, constituent: &str, run: &str) -> PyResult<PyDataFrame> {
        let df = CloeScenario::new(&mut self.engine).retrieve_quickflow_flux(constituent, run)?;
        Ok(PyDataFrame(df))
    }

    #[pyo3(signature = (constituent=DEFAULT_CONSTITUENT, run=recording::LATEST_RUN))]
    fn retrieve_slowflow_flux(&mut self, constituent: &str, run: &str) -> PyResult<PyDataFrame> {
        let df = CloeScenario::new(&mut self.engine).retrieve_slowflow_flux(constituent, run)?;
        Ok(PyDataFrame(df))
    }
}

#[pyfunction]
#[pyo3(signature = (df, column_delim="@", sum_element=2))]
pub fn sum_dataframe(df: PyDataFrame, column_delim: &str, sum_element: usize) -> PyResult<PyDataFrame> {
    Ok(PyDataFrame(scenario::sum_dataframe(&df.0, column_delim, sum_element)?))
}

#[pyfunction]
pub fn sum_for_catchment(df: PyDataFrame) -> PyResult<PyDataFrame> {
    Ok(PyDataFrame(scenario::sum_for_catchment(&df.0)?))
}
