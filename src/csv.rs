use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;
use thiserror::Error;

use crate::amount::{Amount, AmountError};
use crate::model::{AccountKind, AllocationResult};
use crate::variance::{VarianceError, VarianceRecord, format_percent};

/// Errors that can occur when reading or writing csv files
#[derive(Debug, Error)]
pub enum CsvError {
    #[error("failed to open csv file: {0}")]
    Open(csv::Error),

    #[error("line {line}: failed to parse row: {source}")]
    Parse { line: usize, source: csv::Error },

    #[error("line {line}: {source}")]
    Amount { line: usize, source: AmountError },

    #[error("line {line}: {source}")]
    Variance { line: usize, source: VarianceError },

    #[error("line {line}: unrecognized account kind '{kind}'")]
    UnrecognizedKind { line: usize, kind: String },

    #[error("line {line}: driver value {value} for '{target}' is negative or not finite")]
    InvalidDriver {
        line: usize,
        target: String,
        value: f64,
    },

    #[error("failed to write csv: {0}")]
    Write(#[from] csv::Error),

    #[error("failed to flush csv writer: {0}")]
    Flush(#[from] io::Error),
}

#[derive(Debug, Deserialize)]
struct DriverRow {
    target: String,
    value: f64,
}

#[derive(Debug, Deserialize)]
struct VarianceRow {
    account: String,
    kind: String,
    actual: String,
    budget: String,
    prior_year: Option<String>,
}

#[derive(Debug, Serialize)]
struct AllocationRow<'a> {
    target: &'a str,
    driver_value: f64,
    percentage: String,
    amount: String,
}

#[derive(Debug, Serialize)]
struct VarianceOutputRow<'a> {
    account: &'a str,
    actual: String,
    budget: String,
    variance: String,
    variance_percent: String,
    status: &'static str,
    flagged: bool,
}

fn open(path: impl AsRef<Path>) -> Result<csv::Reader<std::fs::File>, CsvError> {
    csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(CsvError::Open)
}

/// Read `target,value` driver rows from a csv file
pub fn read_drivers(
    path: impl AsRef<Path>,
) -> Result<impl Iterator<Item = Result<(String, f64), CsvError>>, CsvError> {
    let reader = open(path)?;

    Ok(reader
        .into_deserialize::<DriverRow>()
        .enumerate()
        .map(|(idx, result)| {
            let line = idx + 2; // 1-indexed, skip header
            let row = result.map_err(|source| CsvError::Parse { line, source })?;
            if !row.value.is_finite() || row.value < 0.0 {
                return Err(CsvError::InvalidDriver {
                    line,
                    target: row.target,
                    value: row.value,
                });
            }
            Ok((row.target, row.value))
        }))
}

/// Read `account,kind,actual,budget,prior_year` rows from a csv file
pub fn read_variance_lines(
    path: impl AsRef<Path>,
) -> Result<impl Iterator<Item = Result<VarianceRecord, CsvError>>, CsvError> {
    let reader = open(path)?;

    Ok(reader
        .into_deserialize::<VarianceRow>()
        .enumerate()
        .map(|(idx, result)| {
            let line = idx + 2; // 1-indexed, skip header
            let row = result.map_err(|source| CsvError::Parse { line, source })?;
            let kind = match row.kind.to_ascii_lowercase().as_str() {
                "revenue" => AccountKind::Revenue,
                "expense" => AccountKind::Expense,
                _ => {
                    return Err(CsvError::UnrecognizedKind {
                        line,
                        kind: row.kind,
                    });
                }
            };
            let parse = |value: &str| {
                value
                    .parse::<Amount>()
                    .map_err(|source| CsvError::Amount { line, source })
            };
            let variance_error = |source: VarianceError| CsvError::Variance { line, source };
            let mut record =
                VarianceRecord::new(row.account, kind, parse(&row.actual)?, parse(&row.budget)?)
                    .map_err(variance_error)?;
            if let Some(prior) = row.prior_year.as_deref().filter(|p| !p.is_empty()) {
                record = record
                    .with_prior_year(parse(prior)?)
                    .map_err(variance_error)?;
            }
            Ok(record)
        }))
}

/// Write allocation results in csv format
pub fn write_allocation<'a>(
    writer: impl io::Write,
    results: impl IntoIterator<Item = &'a AllocationResult>,
) -> Result<(), CsvError> {
    let mut writer = csv::Writer::from_writer(writer);

    for result in results {
        writer.serialize(AllocationRow {
            target: &result.target,
            driver_value: result.driver_value,
            percentage: format!("{:.2}", result.percentage),
            amount: result.amount.to_string(),
        })?;
    }

    writer.flush()?;
    Ok(())
}

/// Write reviewed variance lines, each paired with its anomaly flag, in csv format
pub fn write_variance<'a>(
    writer: impl io::Write,
    lines: impl IntoIterator<Item = (&'a VarianceRecord, bool)>,
) -> Result<(), CsvError> {
    let mut writer = csv::Writer::from_writer(writer);

    for (record, flagged) in lines {
        let variance = record.variance();
        writer.serialize(VarianceOutputRow {
            account: &record.account,
            actual: record.actual().to_string(),
            budget: record.budget().to_string(),
            variance: variance.variance.to_string(),
            variance_percent: format_percent(variance.variance_percent),
            status: record.status().as_str(),
            flagged,
        })?;
    }

    writer.flush()?;
    Ok(())
}
