//! Input discovery, CSV / result-export decoding and temporal classification.

use std::collections::BTreeMap;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveDateTime};
use polars::datatypes::TimeUnit;
use polars::prelude::*;
use tracing::{debug, info, warn};

use crate::error::{CloeError, CloeResult};
use crate::schema::{categories, columns, rescsv};

/// Day-first formats tried, in order, when detecting a `Date` column format.
const DATE_FORMATS: [&str; 7] = [
    "%d/%m/%Y",
    "%d/%m/%Y %H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%d-%m-%Y",
    "%Y-%m-%d",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
];

/// All tables found in the input directory, keyed by logical name.
#[derive(Debug, Clone, Default)]
pub struct InputSet {
    tables: BTreeMap<String, DataFrame>,
}

impl InputSet {
    /// Build a set from already-parsed tables, applying the location reshape.
    pub fn from_tables(tables: impl IntoIterator<Item = (String, DataFrame)>) -> CloeResult<Self> {
        let tables = tables
            .into_iter()
            .map(|(key, df)| {
                let df = if categories::is_reshapable(&key) {
                    add_location_column(df)?
                } else {
                    df
                };
                Ok((key, df))
            })
            .collect::<CloeResult<BTreeMap<_, _>>>()?;
        Ok(Self { tables })
    }

    pub fn get(&self, key: &str) -> CloeResult<&DataFrame> {
        self.tables
            .get(key)
            .ok_or_else(|| CloeError::NotLoaded(format!("input '{key}'")))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(|k| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Inputs with a `Date` column, in key order.
    pub fn temporal(&self) -> Vec<&str> {
        self.tables
            .iter()
            .filter(|(_, df)| is_temporal(df))
            .map(|(k, _)| k.as_str())
            .collect()
    }

    pub fn non_temporal(&self) -> Vec<&str> {
        self.tables
            .iter()
            .filter(|(_, df)| !is_temporal(df))
            .map(|(k, _)| k.as_str())
            .collect()
    }
}

pub fn is_temporal(df: &DataFrame) -> bool {
    df.column(columns::DATE).is_ok()
}

/// Logical key of an input file: file name up to its first `.`.
pub fn input_key(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    name.split('.').next().map(|s| s.to_string())
}

/// Find every `*.csv` file in `dir`, keyed by logical name.
pub fn discover(dir: &Path, ignore: &[String]) -> CloeResult<BTreeMap<String, PathBuf>> {
    let mut files = BTreeMap::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let is_csv = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("csv"))
            .unwrap_or(false);
        if !path.is_file() || !is_csv {
            continue;
        }
        let Some(key) = input_key(&path) else {
            continue;
        };
        if ignore.iter().any(|k| k == &key) {
            debug!(input = %key, "ignoring input");
            continue;
        }
        files.insert(key, path);
    }
    Ok(files)
}

/// Load every input in `dir`. Any unreadable file aborts the load.
pub fn load_inputs(dir: &Path, ignore: &[String]) -> CloeResult<InputSet> {
    let files = discover(dir, ignore)?;
    let mut tables = BTreeMap::new();
    for (key, path) in files {
        let df = read_input(&path)?;
        let df = if categories::is_reshapable(&key) {
            add_location_column(df).map_err(|e| load_error(&path, e))?
        } else {
            df
        };
        debug!(input = %key, rows = df.height(), columns = df.width(), "loaded input");
        tables.insert(key, df);
    }

    let set = InputSet { tables };
    info!(
        dir = %dir.display(),
        temporal = set.temporal().len(),
        non_temporal = set.non_temporal().len(),
        "loaded inputs"
    );
    Ok(set)
}

fn load_error(path: &Path, err: CloeError) -> CloeError {
    CloeError::InputLoad {
        path: path.to_path_buf(),
        source: Box::new(err),
    }
}

/// Read one input file, reporting the offending path on failure.
pub fn read_input(path: &Path) -> CloeResult<DataFrame> {
    read_input_inner(path).map_err(|e| {
        warn!(path = %path.display(), error = %e, "error reading input data");
        load_error(path, e)
    })
}

fn read_input_inner(path: &Path) -> CloeResult<DataFrame> {
    let is_rescsv = path
        .to_str()
        .map(|p| p.ends_with(rescsv::SUFFIX))
        .unwrap_or(false);
    if is_rescsv {
        return read_rescsv(path);
    }

    let df = read_csv(path, false)?;
    if !is_temporal(&df) {
        return Ok(df);
    }
    match parse_date_column(df, columns::DATE) {
        Ok(df) => Ok(df),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "falling back to inferred dates");
            infer_date_column(read_csv(path, true)?, columns::DATE)
        }
    }
}

/// Bring a `Date` column read with date inference to microsecond datetimes.
/// Columns polars left as strings are parsed row by row; unparseable cells
/// become null.
pub fn infer_date_column(df: DataFrame, column: &str) -> CloeResult<DataFrame> {
    if matches!(
        df.column(column)?.dtype(),
        DataType::Datetime(TimeUnit::Microseconds, _)
    ) {
        return Ok(df);
    }
    let datetime = DataType::Datetime(TimeUnit::Microseconds, None);
    let date = df.column(column)?;
    let parsed = match date.dtype() {
        DataType::Date | DataType::Datetime(_, _) => date.cast(&datetime)?,
        _ => {
            let values = date.cast(&DataType::String)?;
            let micros: Vec<Option<i64>> = values
                .str()?
                .into_iter()
                .map(|value| value.and_then(parse_any_date))
                .map(|dt| dt.map(|dt| dt.and_utc().timestamp_micros()))
                .collect();
            Column::new(column.into(), micros).cast(&datetime)?
        }
    };

    let unparsed = parsed.null_count().saturating_sub(date.null_count());
    if unparsed > 0 {
        warn!(column, unparsed, "dates left empty after inference");
    }
    let mut df = df;
    df.with_column(parsed)?;
    Ok(df)
}

/// Parse one value with whichever known format fits it.
fn parse_any_date(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    DATE_FORMATS.iter().find_map(|format| {
        NaiveDateTime::parse_from_str(value, format)
            .ok()
            .or_else(|| {
                NaiveDate::parse_from_str(value, format)
                    .ok()
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
            })
    })
}

fn read_csv(path: &Path, try_parse_dates: bool) -> CloeResult<DataFrame> {
    let mut df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(10_000))
        .map_parse_options(|opts| opts.with_try_parse_dates(try_parse_dates))
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()?;
    trim_column_names(&mut df)?;
    Ok(df)
}

fn trim_column_names(df: &mut DataFrame) -> CloeResult<()> {
    let trimmed: Vec<String> = df
        .get_column_names_str()
        .iter()
        .map(|c| c.trim().to_string())
        .collect();
    df.set_column_names(trimmed.as_slice())?;
    Ok(())
}

/// Decode a result export: configuration block, `EOC`, attribute block,
/// `EOH`, then a header-less body whose first column is the date index.
pub fn read_rescsv(path: &Path) -> CloeResult<DataFrame> {
    let text = std::fs::read_to_string(path)?.replace("\r\n", "\n");
    let (header, body) = split_on_line(&text, rescsv::END_OF_HEADER)
        .ok_or_else(|| CloeError::InvalidData(format!("no {} line", rescsv::END_OF_HEADER)))?;
    let (config, attributes) = split_on_line(header, rescsv::END_OF_CONFIG)
        .ok_or_else(|| CloeError::InvalidData(format!("no {} line", rescsv::END_OF_CONFIG)))?;

    let attribute_names: Vec<&str> = config
        .lines()
        .last()
        .map(|line| line.split(',').collect())
        .unwrap_or_default();
    let name_ix = attribute_names
        .iter()
        .position(|n| n.trim() == rescsv::NAME_ATTRIBUTE)
        .ok_or_else(|| CloeError::MissingColumn(rescsv::NAME_ATTRIBUTE.to_string()))?;

    let rows: Vec<&str> = attributes.lines().collect();
    let rows = if rows.len() >= 2 {
        &rows[1..rows.len() - 1]
    } else {
        &rows[..0]
    };
    let mut names = vec![columns::DATE.to_string()];
    for row in rows {
        let value = row.split(',').nth(name_ix).unwrap_or_default();
        names.push(value.trim().to_string());
    }

    let mut df = CsvReadOptions::default()
        .with_has_header(false)
        .with_infer_schema_length(Some(10_000))
        .into_reader_with_file_handle(Cursor::new(body.as_bytes().to_vec()))
        .finish()?;
    if df.width() != names.len() {
        return Err(CloeError::InvalidData(format!(
            "{} data columns but {} named series",
            df.width().saturating_sub(1),
            names.len() - 1
        )));
    }
    df.set_column_names(names.as_slice())?;
    parse_date_column(df, columns::DATE)
}

fn split_on_line<'a>(text: &'a str, marker: &str) -> Option<(&'a str, &'a str)> {
    let needle = format!("\n{marker}\n");
    text.split_once(needle.as_str())
}

/// Detect the format of a date string, trying day-first formats first.
pub fn detect_date_format(value: &str) -> Option<&'static str> {
    let value = value.trim();
    DATE_FORMATS.iter().copied().find(|format| {
        NaiveDateTime::parse_from_str(value, format).is_ok()
            || NaiveDate::parse_from_str(value, format).is_ok()
    })
}

/// Parse a string `Date` column as datetimes using the detected day-first format.
pub fn parse_date_column(df: DataFrame, column: &str) -> CloeResult<DataFrame> {
    let dtype = df.column(column)?.dtype().clone();
    if matches!(dtype, DataType::Datetime(_, _)) {
        return Ok(df);
    }

    let values = df.column(column)?.cast(&DataType::String)?;
    let sample = values.str()?.into_iter().flatten().next().map(|s| s.to_string());
    let format = sample
        .as_deref()
        .and_then(detect_date_format)
        .ok_or_else(|| {
            CloeError::InvalidData(format!(
                "column '{column}' has no recognisable dates (first value {sample:?})"
            ))
        })?;

    let df = df
        .lazy()
        .with_columns([col(column)
            .cast(DataType::String)
            .str()
            .strip_chars(lit(" \t\r\n"))
            .str()
            .to_datetime(
                Some(TimeUnit::Microseconds),
                None,
                StrptimeOptions {
                    format: Some(format.into()),
                    strict: true,
                    ..Default::default()
                },
                lit("raise"),
            )])
        .collect()?;
    Ok(df)
}

fn first_match<'a>(available: &[&str], options: &[&'a str]) -> Option<&'a str> {
    options.iter().copied().find(|o| available.contains(o))
}

/// Add `location` = `{catchment}:{functional unit}` using the first known
/// spelling of each column.
pub fn add_location_column(mut df: DataFrame) -> CloeResult<DataFrame> {
    let names = df.get_column_names_str();
    let catchment_col = first_match(&names, &columns::CATCHMENT_ALTERNATES)
        .ok_or_else(|| CloeError::MissingColumn(columns::CATCHMENT_ALTERNATES.join("|")))?;
    let fu_col = first_match(&names, &columns::FU_ALTERNATES)
        .ok_or_else(|| CloeError::MissingColumn(columns::FU_ALTERNATES.join("|")))?;

    let catchments = df.column(catchment_col)?.cast(&DataType::String)?;
    let fus = df.column(fu_col)?.cast(&DataType::String)?;
    let location: Vec<Option<String>> = catchments
        .str()?
        .into_iter()
        .zip(fus.str()?.into_iter())
        .map(|(sc, fu)| match (sc, fu) {
            (Some(sc), Some(fu)) => Some(format!("{sc}{}{fu}", columns::LOCATION_SEPARATOR)),
            _ => None,
        })
        .collect();

    df.with_column(Column::new(columns::LOCATION.into(), location))?;
    Ok(df)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn input_key_strips_all_suffixes() {
        assert_eq!(input_key(Path::new("/a/fert.csv")).unwrap(), "fert");
        assert_eq!(input_key(Path::new("/a/flows.res.csv")).unwrap(), "flows");
    }

    #[test]
    fn detects_day_first_formats() {
        assert_eq!(detect_date_format("13/01/2000"), Some("%d/%m/%Y"));
        assert_eq!(detect_date_format("2000-01-13"), Some("%Y-%m-%d"));
        assert_eq!(detect_date_format("not a date"), None);
    }

    #[test]
    fn classifies_temporal_and_adds_location() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "fertiliser.csv",
            "Date,SourceName,FU,P_kg\n01/01/2000,SC#1,Forest,1.5\n02/01/2000,SC#1,Forest,2.5\n",
        );
        write(dir.path(), "b1.csv", "cmt,B1\nSC#1,0.2\n");
        write(dir.path(), "notes.txt", "ignored");

        let inputs = load_inputs(dir.path(), &[]).unwrap();
        assert_eq!(inputs.temporal(), vec!["fertiliser"]);
        assert_eq!(inputs.non_temporal(), vec!["b1"]);

        let fert = inputs.get("fertiliser").unwrap();
        let location = fert.column("location").unwrap();
        assert_eq!(location.str().unwrap().get(0), Some("SC#1:Forest"));
        assert!(matches!(
            fert.column("Date").unwrap().dtype(),
            DataType::Datetime(_, _)
        ));
    }

    #[test]
    fn reload_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "septic.csv",
            "Date,cmt,Source_FU,N\n01/01/2000,SC#2,Urban,1\n",
        );
        write(dir.path(), "other.csv", "a,b\n1,2\n");

        let first = load_inputs(dir.path(), &[]).unwrap();
        let second = load_inputs(dir.path(), &[]).unwrap();
        assert_eq!(first.temporal(), second.temporal());
        assert_eq!(first.non_temporal(), second.non_temporal());
        let location = |set: &InputSet| {
            set.get("septic")
                .unwrap()
                .column("location")
                .unwrap()
                .as_materialized_series()
                .clone()
        };
        assert!(location(&first).equals(&location(&second)));
    }

    #[test]
    fn mixed_date_formats_fall_back_to_inference() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "fert.csv",
            "Date,SC#1:Forest\n01/02/2000,1.0\n2000-02-13,2.0\n",
        );

        let df = read_input(&path).unwrap();

        assert_eq!(df.height(), 2);
        let date = df.column("Date").unwrap();
        assert_eq!(
            date.dtype(),
            &DataType::Datetime(TimeUnit::Microseconds, None)
        );
        assert!(date.get(0).map(|v| !v.is_null()).unwrap());
    }

    #[test]
    fn row_wise_inference_parses_each_format() {
        let df = df!(
            "Date" => [Some("01/02/2000"), Some("2000-02-13"), Some("soon"), None]
        )
        .unwrap();

        let df = infer_date_column(df, "Date").unwrap();

        let date = df.column("Date").unwrap();
        assert!(matches!(date.dtype(), DataType::Datetime(TimeUnit::Microseconds, _)));
        let micros: Vec<Option<i64>> = date
            .cast(&DataType::Int64)
            .unwrap()
            .i64()
            .unwrap()
            .into_iter()
            .collect();
        let day = |y, m, d| {
            NaiveDate::from_ymd_opt(y, m, d)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap()
                .and_utc()
                .timestamp_micros()
        };
        assert_eq!(
            micros,
            vec![Some(day(2000, 2, 1)), Some(day(2000, 2, 13)), None, None]
        );
    }

    #[test]
    fn ignore_list_drops_inputs() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "keep.csv", "a\n1\n");
        write(dir.path(), "drop.csv", "a\n1\n");
        let inputs = load_inputs(dir.path(), &["drop".to_string()]).unwrap();
        assert_eq!(inputs.keys().collect::<Vec<_>>(), vec!["keep"]);
    }

    #[test]
    fn reads_result_export() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "flows.res.csv",
            "Results\nName,Units\nEOC\nheader\nSC#1 Flow,ML\nSC#2 Flow,ML\nend\nEOH\n\
             01/01/2000,1.0,2.0\n02/01/2000,3.0,4.0\n",
        );
        let df = read_input(&path).unwrap();
        assert_eq!(
            df.get_column_names_str(),
            vec!["Date", "SC#1 Flow", "SC#2 Flow"]
        );
        assert_eq!(df.height(), 2);
    }

    #[test]
    fn unreadable_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "broken.res.csv", "no markers here\n");
        let err = read_input(&path).unwrap_err();
        match err {
            CloeError::InputLoad { path: p, .. } => assert_eq!(p, path),
            other => panic!("unexpected error {other}"),
        }
    }
}
