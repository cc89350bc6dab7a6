//! Tabular input and output.
//!
//! CSV goes through polars: every column is read as a string (schema
//! inference is turned off so `"007"` stays `"007"`), and empty cells come
//! back as [`Value::Missing`]. JSON input is an array of flat objects whose
//! key order becomes the column order.

use crate::dataset::{Dataset, Record, Value};
use crate::error::{RefineryError, Result, ResultExt};
use polars::io::csv::read::CsvReadOptions;
use polars::prelude::*;
use std::fs::{self, File};
use std::path::Path;
use tracing::{debug, info};

/// Convert a polars frame into a dataset.
///
/// Non-string columns are cast to strings first; nulls become
/// [`Value::Missing`].
pub fn dataframe_to_dataset(df: &DataFrame) -> Result<Dataset> {
    let columns: Vec<String> = df
        .get_column_names()
        .into_iter()
        .map(|name| name.to_string())
        .collect();

    let mut rows: Vec<Vec<Value>> = vec![Vec::with_capacity(df.width()); df.height()];
    for column in df.get_columns() {
        let as_strings = column
            .cast(&DataType::String)
            .context(format!("Casting column '{}' to string", column.name()))?;
        for (row, cell) in as_strings.str()?.into_iter().enumerate() {
            rows[row].push(cell.map(Value::text).unwrap_or(Value::Missing));
        }
    }

    if rows.is_empty() {
        return Ok(Dataset::with_columns(columns));
    }
    Dataset::from_rows(columns, rows)
}

/// Convert a dataset into a polars frame of string columns.
///
/// Numbers are rendered with [`Value::to_label`]; `Missing` becomes null.
pub fn dataset_to_dataframe(dataset: &Dataset) -> Result<DataFrame> {
    let columns: Vec<Column> = dataset
        .columns()
        .iter()
        .enumerate()
        .map(|(index, name)| {
            let cells: Vec<Option<String>> = dataset
                .column_at(index)
                .into_iter()
                .map(|value| match value {
                    Value::Missing => None,
                    other => Some(other.to_label()),
                })
                .collect();
            Column::new(name.as_str().into(), cells)
        })
        .collect();

    DataFrame::new(columns).map_err(RefineryError::from)
}

/// Read a CSV file with a header row.
pub fn read_csv(path: &Path) -> Result<Dataset> {
    debug!("Reading CSV: {}", path.display());
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .with_parse_options(CsvParseOptions::default().with_quote_char(Some(b'"')))
        .try_into_reader_with_file_path(Some(path.to_path_buf()))
        .context(format!("Opening {}", path.display()))?
        .finish()
        .context(format!("Parsing {}", path.display()))?;

    info!("Loaded {} rows x {} columns from {}", df.height(), df.width(), path.display());
    dataframe_to_dataset(&df)
}

/// Write a dataset as CSV, creating parent directories as needed.
pub fn write_csv(dataset: &Dataset, path: &Path) -> Result<()> {
    let mut df = dataset_to_dataframe(dataset)?;

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    let mut file = File::create(path)?;

    CsvWriter::new(&mut file)
        .include_header(true)
        .with_separator(b',')
        .with_quote_char(b'"')
        .finish(&mut df)
        .context(format!("Writing {}", path.display()))?;

    info!("Dataset saved: {}", path.display());
    Ok(())
}

/// Read a JSON array of objects.
///
/// Every object must have the same keys; the first object's key order is
/// the column order.
pub fn read_json_records(path: &Path) -> Result<Dataset> {
    debug!("Reading JSON: {}", path.display());
    let content = fs::read_to_string(path)?;
    let objects: Vec<serde_json::Map<String, serde_json::Value>> = serde_json::from_str(&content)?;

    let records: Vec<Record> = objects
        .iter()
        .map(|object| {
            object
                .iter()
                .map(|(key, value)| (key.as_str(), Value::from(value)))
                .collect()
        })
        .collect();

    info!("Loaded {} records from {}", records.len(), path.display());
    Dataset::new(records)
}

/// Read a dataset, choosing the format from the file extension
/// (`.json` for JSON records, anything else as CSV).
pub fn read_dataset(path: &Path) -> Result<Dataset> {
    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    if is_json {
        read_json_records(path)
    } else {
        read_csv(path)
    }
}
