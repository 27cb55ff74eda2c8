// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

//! Input loading and JSON output for the `ggs` command-line tool.

use ggs_core::{Diagnostics, SegError, SeriesBuffer};
use ggs_offline::{GgsParams, GreedyGaussianSegmentation};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors surfaced by the CLI, each mapped to a stable code and exit status.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Seg(#[from] SegError),
    #[error("{context}: {source}")]
    Io {
        context: String,
        source: std::io::Error,
    },
    #[error("{context}: {source}")]
    Json {
        context: String,
        source: serde_json::Error,
    },
    #[error("{0}")]
    Usage(String),
    #[error("{0}")]
    NotSupported(String),
}

impl CliError {
    pub fn usage(msg: impl Into<String>) -> Self {
        Self::Usage(msg.into())
    }

    pub fn not_supported(msg: impl Into<String>) -> Self {
        Self::NotSupported(msg.into())
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub fn json(context: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Json {
            context: context.into(),
            source,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Seg(err) => err.code(),
            Self::Io { .. } => "io_error",
            Self::Json { .. } => "json_error",
            Self::Usage(_) => "usage",
            Self::NotSupported(_) => "not_supported",
        }
    }

    /// `2` for command-line misuse, `1` for everything that fails at runtime.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Usage(_) | Self::Seg(SegError::InvalidParameter(_)) => 2,
            _ => 1,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputFormat {
    Csv,
    Json,
}

impl InputFormat {
    pub fn from_path(path: &Path) -> Result<Self, CliError> {
        let extension = path
            .extension()
            .and_then(|value| value.to_str())
            .map(|value| value.to_ascii_lowercase())
            .ok_or_else(|| {
                CliError::not_supported(format!(
                    "unable to infer input format for '{}'; expected .csv or .json",
                    path.display()
                ))
            })?;
        match extension.as_str() {
            "csv" => Ok(Self::Csv),
            "json" => Ok(Self::Json),
            _ => Err(CliError::not_supported(format!(
                "unsupported input format '{extension}'; expected .csv or .json"
            ))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
        }
    }
}

#[derive(Clone, Debug)]
pub struct LoadedSeries {
    pub path: PathBuf,
    pub format: InputFormat,
    pub buffer: SeriesBuffer,
}

impl LoadedSeries {
    pub fn summary(&self) -> InputSummary {
        InputSummary {
            path: self.path.display().to_string(),
            format: self.format.as_str(),
            n: self.buffer.n(),
            d: self.buffer.d(),
        }
    }
}

pub fn load_series(path: &Path) -> Result<LoadedSeries, CliError> {
    let format = InputFormat::from_path(path)?;
    let raw = fs::read_to_string(path)
        .map_err(|source| CliError::io(format!("failed to read '{}'", path.display()), source))?;
    let buffer = match format {
        InputFormat::Csv => parse_csv_data(&raw)?,
        InputFormat::Json => parse_json_data(&raw)?,
    };
    Ok(LoadedSeries {
        path: path.to_path_buf(),
        format,
        buffer,
    })
}

/// One observation per non-blank line; a non-numeric first line is taken as a header.
pub fn parse_csv_data(raw: &str) -> Result<SeriesBuffer, CliError> {
    let rows = raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>();

    if rows.is_empty() {
        return Err(SegError::invalid_input("CSV input is empty").into());
    }

    match parse_csv_rows(&rows) {
        Ok(parsed) => Ok(parsed),
        Err(err) => {
            if rows.len() > 1
                && first_row_looks_like_header(rows[0], rows[1])
                && let Ok(without_header) = parse_csv_rows(&rows[1..])
            {
                return Ok(without_header);
            }
            Err(err)
        }
    }
}

fn parse_csv_rows(rows: &[&str]) -> Result<SeriesBuffer, CliError> {
    let mut parsed = Vec::with_capacity(rows.len());
    for (row_idx, row) in rows.iter().enumerate() {
        let mut values = Vec::new();
        for (col_idx, cell) in row.split(',').map(str::trim).enumerate() {
            if cell.is_empty() {
                return Err(SegError::invalid_input(format!(
                    "CSV row {} column {} is empty",
                    row_idx + 1,
                    col_idx + 1
                ))
                .into());
            }
            let value = cell.parse::<f64>().map_err(|_| {
                SegError::invalid_input(format!(
                    "CSV row {} column {} is not a valid float: '{cell}'",
                    row_idx + 1,
                    col_idx + 1
                ))
            })?;
            values.push(value);
        }
        parsed.push(values);
    }
    Ok(SeriesBuffer::from_rows(&parsed)?)
}

fn first_row_looks_like_header(first_row: &str, second_row: &str) -> bool {
    let first_cells = first_row.split(',').map(str::trim).collect::<Vec<_>>();
    let second_cells = second_row.split(',').map(str::trim).collect::<Vec<_>>();

    if first_cells.len() != second_cells.len() || first_cells.iter().any(|cell| cell.is_empty()) {
        return false;
    }

    first_cells.iter().all(|cell| cell.parse::<f64>().is_err())
        && second_cells.iter().all(|cell| cell.parse::<f64>().is_ok())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum JsonSeries {
    Univariate(Vec<f64>),
    Rows(Vec<Vec<f64>>),
}

/// A JSON array of numbers (one feature) or an array of equal-length rows.
pub fn parse_json_data(raw: &str) -> Result<SeriesBuffer, CliError> {
    let series: JsonSeries = serde_json::from_str(raw).map_err(|source| {
        CliError::json(
            "expected a JSON array of numbers or an array of numeric rows",
            source,
        )
    })?;
    let buffer = match series {
        JsonSeries::Univariate(values) => SeriesBuffer::univariate(&values)?,
        JsonSeries::Rows(rows) => SeriesBuffer::from_rows(&rows)?,
    };
    Ok(buffer)
}

#[derive(Clone, Debug, Serialize)]
pub struct InputSummary {
    pub path: String,
    pub format: &'static str,
    pub n: usize,
    pub d: usize,
}

/// Document written by `ggs detect`.
#[derive(Clone, Debug, Serialize)]
pub struct DetectOutput {
    pub command: &'static str,
    pub input: InputSummary,
    pub params: GgsParams,
    pub change_points: Vec<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<usize>>,
    pub log_likelihood: f64,
    pub intermediate_change_points: Vec<Vec<usize>>,
    pub diagnostics: Diagnostics,
}

/// Runs one segmentation over a loaded series.
pub fn detect(
    series: &LoadedSeries,
    params: GgsParams,
    include_labels: bool,
) -> Result<DetectOutput, CliError> {
    let mut estimator = GreedyGaussianSegmentation::new(params)?;
    let view = series.buffer.view();
    let result = estimator.fit(&view)?.clone();
    tracing::debug!(
        n = view.n,
        d = view.d,
        change_points = ?result.change_points,
        "detect finished"
    );

    Ok(DetectOutput {
        command: "detect",
        input: series.summary(),
        params: estimator.get_params(),
        labels: include_labels.then(|| result.labels()),
        change_points: result.change_points,
        log_likelihood: result.log_likelihood,
        intermediate_change_points: result.intermediate_change_points,
        diagnostics: result.diagnostics,
    })
}

pub fn write_json_output<T: Serialize>(
    payload: &T,
    output_path: Option<&Path>,
) -> Result<(), CliError> {
    let encoded = serde_json::to_string_pretty(payload)
        .map_err(|source| CliError::json("failed to serialize JSON output", source))?;

    if let Some(path) = output_path {
        fs::write(path, format!("{encoded}\n"))
            .map_err(|source| CliError::io(format!("failed to write '{}'", path.display()), source))
    } else {
        println!("{encoded}");
        Ok(())
    }
}

#[derive(Serialize)]
struct ErrorEnvelope<'a> {
    error: ErrorPayload<'a>,
}

#[derive(Serialize)]
struct ErrorPayload<'a> {
    code: &'a str,
    message: String,
}

/// `{"error": {"code": ..., "message": ...}}` for stderr.
pub fn error_envelope(err: &CliError) -> String {
    let envelope = ErrorEnvelope {
        error: ErrorPayload {
            code: err.code(),
            message: err.to_string(),
        },
    };
    serde_json::to_string_pretty(&envelope).unwrap_or_else(|_| {
        serde_json::json!({"error": {"code": err.code(), "message": err.to_string()}}).to_string()
    })
}
