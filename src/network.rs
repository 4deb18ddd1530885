//! Read-only view of the engine's catchment network.

use std::collections::HashSet;

use tracing::info;

use crate::engine::ModelEngine;
use crate::error::CloeResult;
use crate::schema::network;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Network {
    pub catchments: Vec<String>,
    /// Distinct functional unit names across the network, in first-seen order.
    pub functional_units: Vec<String>,
}

impl Network {
    pub fn new(catchments: Vec<String>, functional_units: Vec<String>) -> Self {
        Self {
            catchments,
            functional_units,
        }
    }

    /// Query catchments and functional units once.
    pub fn query<E: ModelEngine>(engine: &E) -> CloeResult<Self> {
        let catchments = engine.network_features(network::CATCHMENT_FEATURE)?;
        let mut seen = HashSet::new();
        let functional_units: Vec<String> = engine
            .functional_unit_types()?
            .into_iter()
            .filter(|fu| seen.insert(fu.clone()))
            .collect();

        info!(
            catchments = catchments.len(),
            functional_units = functional_units.len(),
            "queried network"
        );
        Ok(Self {
            catchments,
            functional_units,
        })
    }
}
