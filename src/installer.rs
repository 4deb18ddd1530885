//! Constituent declarations and model installation.

use tracing::{debug, info};

use crate::config::CloeConfig;
use crate::engine::{Constraint, ModelEngine};
use crate::error::CloeResult;
use crate::schema::{constraint, models};

pub fn create_constituents<E: ModelEngine>(config: &CloeConfig, engine: &mut E) -> CloeResult<()> {
    for constituent in config.constituents() {
        engine.add_constituent(&constituent)?;
    }
    Ok(())
}

pub fn create_constituent_sources<E: ModelEngine>(
    config: &CloeConfig,
    engine: &mut E,
) -> CloeResult<()> {
    for source in config.constituent_sources() {
        engine.add_constituent_source(&source)?;
    }
    Ok(())
}

/// Install areal and non-areal generation models, the conditional rules in
/// declaration order, then the in-stream model on links.
pub fn install_models<E: ModelEngine>(config: &CloeConfig, engine: &mut E) -> CloeResult<()> {
    let constituents = config.constituents();

    for (alias, sources) in [
        ("areal", &config.sources.areal),
        ("non_areal", &config.sources.non_areal),
    ] {
        let model = models::model_name(alias);
        let constrain = Constraint::new()
            .with(constraint::SOURCES, sources.clone())
            .with(constraint::CONSTITUENTS, constituents.clone());
        debug!(model, sources = sources.len(), "installing generation model");
        engine.set_generation_models(model, &constrain)?;
    }

    for conditional in &config.sources.conditional {
        let model = models::model_name(&conditional.model);
        debug!(model, "installing conditional generation model");
        engine.set_generation_models(model, &conditional.constrain)?;
    }

    let constrain = Constraint::new().with(constraint::CONSTITUENTS, constituents);
    engine.set_link_constituent_models(models::INSTREAM, &constrain)?;

    info!(
        conditional = config.sources.conditional.len(),
        "installed models"
    );
    Ok(())
}
