/// Column, parameter and model-class names shared by the setup stages.
/// Single source of truth - exported to Python via PyO3.

// ── Input table columns ─────────────────────────────────────────────────────
pub mod columns {
    pub const DATE: &str = "Date";
    pub const LOCATION: &str = "location";

    /// Alternate spellings of the catchment column, first match wins.
    pub const CATCHMENT_ALTERNATES: [&str; 2] = ["SourceName", "cmt"];
    /// Alternate spellings of the functional unit column, first match wins.
    pub const FU_ALTERNATES: [&str; 2] = ["Source_FU", "FU"];

    pub const LOCATION_SEPARATOR: &str = ":";
}

// ── Input categories reshaped with a location column ────────────────────────
pub mod categories {
    pub const RESHAPABLE: [&str; 5] = ["clover", "dairyshed", "feed", "septic", "fertiliser"];

    pub fn is_reshapable(key: &str) -> bool {
        RESHAPABLE.contains(&key)
    }
}

// ── Result export files ─────────────────────────────────────────────────────
pub mod rescsv {
    pub const SUFFIX: &str = ".res.csv";
    pub const END_OF_CONFIG: &str = "EOC";
    pub const END_OF_HEADER: &str = "EOH";
    pub const NAME_ATTRIBUTE: &str = "Name";
}

// ── Model classes ───────────────────────────────────────────────────────────
pub mod models {
    pub const AREAL: &str = "Source.CLOE.ArealCLOEModel";
    pub const NON_AREAL: &str = "Source.CLOE.NonArealCLOEModel";
    pub const INSTREAM: &str = "Source.CLOE.InstreamCLOEModel";
    /// Suffix shared by every generation model class this crate installs.
    pub const CLOE_SUFFIX: &str = "CLOEModel";

    /// Resolve a configured model alias to its class name.
    pub fn model_name(name: &str) -> &str {
        match name {
            "areal" => AREAL,
            "non_areal" => NON_AREAL,
            other => other,
        }
    }
}

// ── Parameters ──────────────────────────────────────────────────────────────
pub mod parameters {
    pub const INPUT_RATE: &str = "InputRate";
    /// Prefix of the "outside" half of a loss parameter pair.
    pub const LOSS_OUTSIDE_PREFIX: &str = "O";
    /// Prefix of the "downstream" half of a loss parameter pair.
    pub const LOSS_DOWNSTREAM_PREFIX: &str = "D";
}

// ── Network queries ─────────────────────────────────────────────────────────
pub mod network {
    pub const CATCHMENT_FEATURE: &str = "catchment";
}

// ── Constraint keys understood by the engine ────────────────────────────────
pub mod constraint {
    pub const CATCHMENTS: &str = "catchments";
    pub const FUS: &str = "fus";
    pub const CONSTITUENTS: &str = "constituents";
    pub const SOURCES: &str = "sources";
}

// ── Function evaluation ─────────────────────────────────────────────────────
pub mod functions {
    pub const CURRENT_TIME_STEP: &str = "Current Time Step";
    pub const DURING_FLOW_PHASE: &str = "DuringFlowPhase";
    pub const RESULT_UNIT: &str = "ResultUnit";
    pub const UNIT_LIBRARY_PREFIX: &str = "UnitLibrary.";
    pub const DEFAULT_DATA_VALUE: f64 = -1.0;
}

// ── Data source registration ────────────────────────────────────────────────
pub mod data_sources {
    pub const UNITS: &str = "kg";
    /// Column naming of location-pivoted tables.
    pub const PIVOT_TEMPLATE: &str = "SC#${scix}:${fu}";
}

// ── Recording ───────────────────────────────────────────────────────────────
pub mod recording {
    pub const RECORDING_VARIABLE: &str = "RecordingVariable";
    pub const STORES: [&str; 2] = ["SoilStore", "GroundwaterStore"];
    pub const FLUXES: [&str; 3] = ["LossOut", "LossToGroundwater", "LossOutGroundwater"];
    pub const SOURCE_DELIMITER: &str = "@@";
    pub const ELEMENT_DELIMITER: &str = "@";
    pub const LATEST_RUN: &str = "latest";
}
