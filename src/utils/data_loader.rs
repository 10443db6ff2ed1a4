//! Quote file loading

use crate::error::{RegimeError, Result};
use crate::preprocessing::returns::QuoteRecord;
use chrono::NaiveDate;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::Path;
use std::time::Instant;
use tracing::info;

/// Column names of a quote file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteColumns {
    pub date: String,
    pub permno: String,
    pub bid_lo: String,
    pub ask_hi: String,
    pub volume: String,
    pub retx: String,
}

impl Default for QuoteColumns {
    fn default() -> Self {
        Self {
            date: "date".to_string(),
            permno: "PERMNO".to_string(),
            bid_lo: "BIDLO".to_string(),
            ask_hi: "ASKHI".to_string(),
            volume: "VOL".to_string(),
            retx: "RETX".to_string(),
        }
    }
}

/// CSV loader for stacked daily quotes
#[derive(Debug, Clone)]
pub struct DataLoader {
    columns: QuoteColumns,
    delimiter: u8,
    infer_schema_length: Option<usize>,
}

impl Default for DataLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl DataLoader {
    pub fn new() -> Self {
        Self {
            columns: QuoteColumns::default(),
            delimiter: b',',
            infer_schema_length: Some(100),
        }
    }

    pub fn with_columns(mut self, columns: QuoteColumns) -> Self {
        self.columns = columns;
        self
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Read a CSV file into a DataFrame
    pub fn load_csv(&self, path: impl AsRef<Path>) -> Result<DataFrame> {
        self.read_csv(path.as_ref(), self.infer_schema_length)
    }

    /// Read a CSV file with every column as text
    pub fn load_csv_as_text(&self, path: impl AsRef<Path>) -> Result<DataFrame> {
        self.read_csv(path.as_ref(), Some(0))
    }

    fn read_csv(&self, path: &Path, infer_schema_length: Option<usize>) -> Result<DataFrame> {
        let file = File::open(path)?;

        let parse_opts = CsvParseOptions::default().with_separator(self.delimiter);

        CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(infer_schema_length)
            .with_parse_options(parse_opts)
            .into_reader_with_file_handle(file)
            .finish()
            .map_err(|e| RegimeError::DataError(e.to_string()))
    }

    /// Read quote records from a CSV file.
    ///
    /// Columns are read as text and cast per field, so a CRSP code anywhere in
    /// the file degrades to a missing value instead of failing the load.
    pub fn load_quotes(&self, path: impl AsRef<Path>) -> Result<Vec<QuoteRecord>> {
        let start = Instant::now();
        let df = self.load_csv_as_text(path.as_ref())?;
        let records = self.records(&df)?;
        info!(
            path = %path.as_ref().display(),
            rows = records.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Loaded quotes"
        );
        Ok(records)
    }

    /// Convert a quote DataFrame into records.
    ///
    /// Numeric fields that fail to parse (CRSP codes like `"C"`) become `None`;
    /// a missing or unparsable date or PERMNO is an error.
    pub fn records(&self, df: &DataFrame) -> Result<Vec<QuoteRecord>> {
        let dates = self.date_column(df)?;
        let permnos = self.id_column(df, &self.columns.permno)?;
        let bid_lo = self.numeric_column(df, &self.columns.bid_lo)?;
        let ask_hi = self.numeric_column(df, &self.columns.ask_hi)?;
        let volume = self.numeric_column(df, &self.columns.volume)?;
        let retx = self.numeric_column(df, &self.columns.retx)?;

        (0..df.height())
            .map(|i| {
                let date = dates[i].ok_or_else(|| {
                    RegimeError::DataError(format!("row {}: missing or invalid date", i))
                })?;
                let permno = permnos[i].ok_or_else(|| {
                    RegimeError::DataError(format!("row {}: missing {}", i, self.columns.permno))
                })?;
                Ok(QuoteRecord {
                    date,
                    permno,
                    bid_lo: bid_lo[i],
                    ask_hi: ask_hi[i],
                    volume: volume[i],
                    retx: retx[i],
                })
            })
            .collect()
    }

    fn column<'a>(&self, df: &'a DataFrame, name: &str) -> Result<&'a Column> {
        df.column(name)
            .map_err(|_| RegimeError::DataError(format!("column '{}' not found", name)))
    }

    fn numeric_column(&self, df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
        // Non-strict cast turns unparsable strings into nulls
        let values = self
            .column(df, name)?
            .cast(&DataType::Float64)
            .map_err(|e| RegimeError::DataError(e.to_string()))?;
        Ok(values
            .f64()
            .map_err(|e| RegimeError::DataError(e.to_string()))?
            .into_iter()
            .collect())
    }

    fn id_column(&self, df: &DataFrame, name: &str) -> Result<Vec<Option<i64>>> {
        let values = self
            .column(df, name)?
            .cast(&DataType::Int64)
            .map_err(|e| RegimeError::DataError(e.to_string()))?;
        Ok(values
            .i64()
            .map_err(|e| RegimeError::DataError(e.to_string()))?
            .into_iter()
            .collect())
    }

    /// Accepts `YYYY-MM-DD` and CRSP-style `YYYYMMDD`, as text or integer
    fn date_column(&self, df: &DataFrame) -> Result<Vec<Option<NaiveDate>>> {
        let values = self
            .column(df, &self.columns.date)?
            .cast(&DataType::String)
            .map_err(|e| RegimeError::DataError(e.to_string()))?;
        Ok(values
            .str()
            .map_err(|e| RegimeError::DataError(e.to_string()))?
            .into_iter()
            .map(|v| v.and_then(parse_date))
            .collect())
    }
}

pub(crate) fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(s, "%Y%m%d"))
        .ok()
}
