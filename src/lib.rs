pub mod binder;
pub mod config;
pub mod engine;
pub mod error;
pub mod functions;
pub mod inputs;
pub mod installer;
pub mod network;
pub mod parameters;
pub mod registry;
pub mod scenario;
pub mod schema;
pub mod setup;
pub mod template;

#[cfg(feature = "python")]
mod python;

pub use binder::{BindingReport, TimeSeriesBinder};
pub use config::CloeConfig;
pub use engine::{Constraint, ModelComponent, ModelEngine};
pub use error::{CloeError, CloeResult, EngineError};
pub use inputs::InputSet;
pub use network::Network;
pub use registry::DataSourceRegistry;
pub use scenario::CloeScenario;
pub use setup::{CloeSetup, SetupReport};
pub use template::NamingTemplate;

#[cfg(feature = "python")]
use pyo3::prelude::*;
#[cfg(feature = "python")]
use pyo3::types::PyModule;

/// Export schema constants as Python submodules
#[cfg(feature = "python")]
fn add_schema_exports(m: &Bound<'_, PyModule>) -> PyResult<()> {
    // Columns
    let columns = PyModule::new(m.py(), "columns")?;
    columns.add("DATE", schema::columns::DATE)?;
    columns.add("LOCATION", schema::columns::LOCATION)?;
    columns.add("CATCHMENT_ALTERNATES", schema::columns::CATCHMENT_ALTERNATES.to_vec())?;
    columns.add("FU_ALTERNATES", schema::columns::FU_ALTERNATES.to_vec())?;
    m.add_submodule(&columns)?;

    // Models
    let models = PyModule::new(m.py(), "models")?;
    models.add("AREAL", schema::models::AREAL)?;
    models.add("NON_AREAL", schema::models::NON_AREAL)?;
    models.add("INSTREAM", schema::models::INSTREAM)?;
    m.add_submodule(&models)?;

    // Parameters
    let parameters = PyModule::new(m.py(), "parameters")?;
    parameters.add("INPUT_RATE", schema::parameters::INPUT_RATE)?;
    parameters.add("LOSS_OUTSIDE_PREFIX", schema::parameters::LOSS_OUTSIDE_PREFIX)?;
    parameters.add(
        "LOSS_DOWNSTREAM_PREFIX",
        schema::parameters::LOSS_DOWNSTREAM_PREFIX,
    )?;
    m.add_submodule(&parameters)?;

    // Recording
    let recording = PyModule::new(m.py(), "recording")?;
    recording.add("RECORDING_VARIABLE", schema::recording::RECORDING_VARIABLE)?;
    recording.add("STORES", schema::recording::STORES.to_vec())?;
    recording.add("FLUXES", schema::recording::FLUXES.to_vec())?;
    recording.add("LATEST_RUN", schema::recording::LATEST_RUN)?;
    m.add_submodule(&recording)?;

    Ok(())
}

#[cfg(feature = "python")]
#[pymodule]
fn _core(m: &Bound<'_, PyModule>) -> PyResult<()> {
    let _ = tracing_subscriber::fmt().try_init();
    m.add_class::<python::PyCloeSetup>()?;
    m.add_class::<python::PyCloeScenario>()?;
    m.add_function(wrap_pyfunction!(python::sum_dataframe, m)?)?;
    m.add_function(wrap_pyfunction!(python::sum_for_catchment, m)?)?;
    add_schema_exports(m)?;
    Ok(())
}
