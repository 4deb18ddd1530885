//! Recording configuration and retrieval of per-FU results after a run.

use polars::prelude::*;
use tracing::{debug, info};

use crate::engine::{Constraint, ModelEngine, RecordedTable, RecordingInfo};
use crate::error::{CloeError, CloeResult};
use crate::schema::{columns, recording};

pub const DEFAULT_CONSTITUENT: &str = "TP";

pub struct CloeScenario<'a, E: ModelEngine> {
    engine: &'a mut E,
}

impl<'a, E: ModelEngine> CloeScenario<'a, E> {
    pub fn new(engine: &'a mut E) -> Self {
        Self { engine }
    }

    pub fn record_stores(&mut self) -> CloeResult<()> {
        self.record(&recording::STORES)
    }

    pub fn record_fluxes(&mut self) -> CloeResult<()> {
        self.record(&recording::FLUXES)
    }

    fn record(&mut self, variables: &[&str]) -> CloeResult<()> {
        let recorders: Vec<Constraint> = variables
            .iter()
            .map(|v| Constraint::new().with(recording::RECORDING_VARIABLE, *v))
            .collect();
        self.engine.configure_recording(&recorders)?;
        info!(variables = ?variables, "enabled recorders");
        Ok(())
    }

    pub fn retrieve_soil_stores(&self, constituent: &str, run: &str) -> CloeResult<DataFrame> {
        self.retrieve_model_var_by_fu("SoilStore", constituent, run)
    }

    pub fn retrieve_gw_stores(&self, constituent: &str, run: &str) -> CloeResult<DataFrame> {
        self.retrieve_model_var_by_fu("GroundwaterStore", constituent, run)
    }

    pub fn retrieve_gw_loss(&self, constituent: &str, run: &str) -> CloeResult<DataFrame> {
        self.retrieve_model_var_by_fu("LossToGroundwater", constituent, run)
    }

    /// `LossOut` only; the anchor keeps `LossOutGroundwater` out.
    pub fn retrieve_loss_to_outside(&self, constituent: &str, run: &str) -> CloeResult<DataFrame> {
        self.retrieve_model_var_by_fu("LossOut$", constituent, run)
    }

    /// Generation model state per catchment and FU, summed over sources.
    pub fn retrieve_model_var_by_fu(
        &self,
        variable: &str,
        constituent: &str,
        run: &str,
    ) -> CloeResult<DataFrame> {
        let pattern = format!("Constituents@{constituent}.*@Generation Model@{variable}");
        self.retrieve(&pattern, run)
    }

    pub fn retrieve_quickflow_flux(&self, constituent: &str, run: &str) -> CloeResult<DataFrame> {
        self.retrieve_fu_flux("Quick Flow Load Out", constituent, run)
    }

    pub fn retrieve_slowflow_flux(&self, constituent: &str, run: &str) -> CloeResult<DataFrame> {
        self.retrieve_fu_flux("Slow Flow Load Out", constituent, run)
    }

    pub fn retrieve_fu_flux(
        &self,
        variable: &str,
        constituent: &str,
        run: &str,
    ) -> CloeResult<DataFrame> {
        let pattern = format!("Constituents@{constituent}.*@{variable}");
        self.retrieve(&pattern, run)
    }

    fn retrieve(&self, pattern: &str, run: &str) -> CloeResult<DataFrame> {
        let criteria = Constraint::new().with(recording::RECORDING_VARIABLE, pattern);
        let recorded = self.engine.retrieve_multiple_time_series(run, &criteria)?;
        debug!(pattern, run, series = recorded.recordings.len(), "retrieved series");
        let named = name_recorded(recorded)?;
        sum_dataframe(&named, recording::SOURCE_DELIMITER, 1)
    }
}

/// `{NetworkElement}@{FunctionalUnit}@@{source}`, the source being the
/// fourth `@` field of the recording variable.
pub fn recording_column_name(info: &RecordingInfo) -> CloeResult<String> {
    let source = info
        .recording_variable
        .split(recording::ELEMENT_DELIMITER)
        .nth(3)
        .ok_or_else(|| {
            CloeError::InvalidData(format!(
                "recording variable '{}' has no source field",
                info.recording_variable
            ))
        })?;
    Ok(format!(
        "{}@{}{}{source}",
        info.network_element,
        info.functional_unit,
        recording::SOURCE_DELIMITER
    ))
}

/// Rename the recorded series after their metadata, keeping `Date` first.
fn name_recorded(recorded: RecordedTable) -> CloeResult<DataFrame> {
    let RecordedTable { table, recordings } = recorded;
    let series: Vec<&Column> = table
        .get_columns()
        .iter()
        .filter(|c| c.name().as_str() != columns::DATE)
        .collect();
    if series.len() != recordings.len() {
        return Err(CloeError::Consistency(format!(
            "retrieved {} series but {} recording descriptions",
            series.len(),
            recordings.len()
        )));
    }

    let mut out = Vec::with_capacity(series.len() + 1);
    if let Ok(date) = table.column(columns::DATE) {
        out.push(date.clone());
    }
    for (column, info) in series.into_iter().zip(&recordings) {
        let name = recording_column_name(info)?;
        out.push(column.clone().with_name(name.into()));
    }
    Ok(DataFrame::new(out)?)
}

/// Drop the `sum_element`-th `delimiter` field from every column name and
/// sum the columns that collide. `Date` passes through; output columns keep
/// first-seen order.
pub fn sum_dataframe(df: &DataFrame, delimiter: &str, sum_element: usize) -> CloeResult<DataFrame> {
    let mut groups: Vec<(String, Series)> = Vec::new();
    let mut out = Vec::new();

    for column in df.get_columns() {
        let name = column.name().as_str();
        if name == columns::DATE {
            out.push(column.clone());
            continue;
        }

        let reduced = reduced_name(name, delimiter, sum_element);
        let series = column.as_materialized_series();
        match groups.iter_mut().find(|(n, _)| *n == reduced) {
            Some((_, total)) => *total = (&*total + series)?,
            None => groups.push((reduced, series.clone())),
        }
    }

    for (name, series) in groups {
        out.push(series.with_name(name.into()).into_column());
    }
    Ok(DataFrame::new(out)?)
}

/// Collapse per-FU columns into one column per catchment.
pub fn sum_for_catchment(df: &DataFrame) -> CloeResult<DataFrame> {
    sum_dataframe(df, recording::ELEMENT_DELIMITER, 1)
}

fn reduced_name(name: &str, delimiter: &str, sum_element: usize) -> String {
    name.split(delimiter)
        .enumerate()
        .filter(|(i, _)| *i != sum_element)
        .map(|(_, part)| part)
        .collect::<Vec<_>>()
        .join(delimiter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reduced_name_drops_one_field() {
        assert_eq!(reduced_name("SC#1@Forest@@Fertiliser", "@@", 1), "SC#1@Forest");
        assert_eq!(reduced_name("SC#1@Forest", "@", 1), "SC#1");
        assert_eq!(reduced_name("plain", "@", 1), "plain");
    }

    #[test]
    fn sums_colliding_columns() {
        let df = df!(
            "Date" => [1i64, 2],
            "SC#1@Forest@@A" => [1.0, 2.0],
            "SC#1@Forest@@B" => [10.0, 20.0],
            "SC#1@Pasture@@A" => [5.0, 5.0]
        )
        .unwrap();

        let by_fu = sum_dataframe(&df, "@@", 1).unwrap();
        assert_eq!(
            by_fu.get_column_names_str(),
            vec!["Date", "SC#1@Forest", "SC#1@Pasture"]
        );
        let forest: Vec<Option<f64>> = by_fu
            .column("SC#1@Forest")
            .unwrap()
            .f64()
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(forest, vec![Some(11.0), Some(22.0)]);

        let by_catchment = sum_for_catchment(&by_fu).unwrap();
        assert_eq!(by_catchment.get_column_names_str(), vec!["Date", "SC#1"]);
        let total: Vec<Option<f64>> = by_catchment
            .column("SC#1")
            .unwrap()
            .f64()
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(total, vec![Some(16.0), Some(27.0)]);
    }

    #[test]
    fn column_name_uses_fourth_field() {
        let info = RecordingInfo {
            network_element: "SC#1".into(),
            functional_unit: "Forest".into(),
            recording_variable: "Constituents@TP@Forest@Fertiliser@Generation Model@SoilStore"
                .into(),
        };
        assert_eq!(recording_column_name(&info).unwrap(), "SC#1@Forest@@Fertiliser");

        let short = RecordingInfo {
            recording_variable: "Constituents@TP".into(),
            ..info
        };
        assert!(matches!(
            recording_column_name(&short),
            Err(CloeError::InvalidData(_))
        ));
    }
}
