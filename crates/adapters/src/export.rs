use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{json, Map, Value};
use sqlpad_core::query_runner::QueryResponse;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to write export file at {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize JSON export: {0}")]
    Json(#[from] serde_json::Error),
    #[error("no rendered graph to export")]
    NoGraph,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Json,
    Svg,
}

impl ExportFormat {
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
            Self::Svg => "svg",
        }
    }

    /// `<dir>/sqlpad-result.<ext>`, or `sqlpad-plan.svg` for graphs.
    #[must_use]
    pub fn default_path(self, dir: &Path) -> PathBuf {
        let stem = match self {
            Self::Csv | Self::Json => "sqlpad-result",
            Self::Svg => "sqlpad-plan",
        };
        dir.join(format!("{stem}.{}", self.extension()))
    }
}

/// Writes `response` in `format` and returns how many rows (or graphs) were written.
pub fn export_response(
    path: &Path,
    format: ExportFormat,
    response: &QueryResponse,
) -> Result<usize, ExportError> {
    let headers = response.column_names();
    match format {
        ExportFormat::Csv => export_rows_to_csv(path, &headers, data_rows(response)),
        ExportFormat::Json => export_rows_to_json(path, &headers, data_rows(response)),
        ExportFormat::Svg => {
            let svg = response.graph_image.as_deref().ok_or(ExportError::NoGraph)?;
            write_file(path, svg)?;
            Ok(1)
        }
    }
}

/// Rows without the server's trailing truncation marker.
fn data_rows(response: &QueryResponse) -> &[Vec<String>] {
    if response.is_truncated() {
        &response.rows[..response.rows.len() - 1]
    } else {
        &response.rows
    }
}

pub fn export_rows_to_csv(
    path: &Path,
    headers: &[String],
    rows: &[Vec<String>],
) -> Result<usize, ExportError> {
    let mut content = String::new();
    content.push_str(
        &headers
            .iter()
            .map(|header| csv_escape(header))
            .collect::<Vec<_>>()
            .join(","),
    );
    content.push('\n');

    for row in rows {
        let values: Vec<String> = (0..headers.len())
            .map(|column_index| csv_escape(row.get(column_index).map_or("", String::as_str)))
            .collect();
        content.push_str(&values.join(","));
        content.push('\n');
    }

    write_file(path, &content)?;
    Ok(rows.len())
}

pub fn export_rows_to_json(
    path: &Path,
    headers: &[String],
    rows: &[Vec<String>],
) -> Result<usize, ExportError> {
    let records: Vec<Value> = rows
        .iter()
        .map(|row| {
            let object: Map<String, Value> = headers
                .iter()
                .enumerate()
                .map(|(column_index, header)| {
                    let value = row
                        .get(column_index)
                        .map_or(Value::Null, |value| json!(value));
                    (header.clone(), value)
                })
                .collect();
            Value::Object(object)
        })
        .collect();

    let payload = serde_json::to_string_pretty(&records)?;
    write_file(path, &payload)?;
    Ok(rows.len())
}

fn write_file(path: &Path, content: &str) -> Result<(), ExportError> {
    fs::write(path, content).map_err(|source| ExportError::Write {
        path: path.display().to_string(),
        source,
    })
}

fn csv_escape(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
