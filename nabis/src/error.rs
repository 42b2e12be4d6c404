//! Error types.

use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum NabisError {
    #[error("Wrapped anyhow error: {0}")]
    AnyhowError(#[from] anyhow::Error),
    #[error("Required input does not exist: {}", .0.display())]
    MissingInput(PathBuf),
    #[error("No spreadsheets found under {}", .0.display())]
    EmptyInput(PathBuf),
    #[error("No indicator records could be parsed from any source spreadsheet.")]
    NoRecords,
    #[error("Worksheet is empty or missing: {}", .0.display())]
    EmptyWorksheet(PathBuf),
    #[error("Missing column `{column}` in {}", .path.display())]
    MissingColumn { path: PathBuf, column: String },
    #[error("Unsupported file format: {}", .0.display())]
    UnsupportedFormat(PathBuf),
    #[error("Unsupported character encoding: {0}")]
    UnsupportedEncoding(String),
    #[error("Unsupported coordinate reference system: EPSG:{0}")]
    UnsupportedCrs(u32),
    #[error("Indicator {sequence} has {variants} conflicting catalog definitions.")]
    CatalogConflict { sequence: i32, variants: usize },
    #[error("Join validation failed: {unmatched} unmatched and {ambiguous} ambiguous key(s).")]
    ValidationFailed { unmatched: usize, ambiguous: usize },
    #[error("Wrapped polars error: {0}")]
    PolarsError(#[from] polars::error::PolarsError),
    #[error("Wrapped spreadsheet error: {0}")]
    SpreadsheetError(#[from] calamine::Error),
    #[error("Wrapped regex error: {0}")]
    RegexError(#[from] regex::Error),
    #[error("Wrapped shapefile error: {0}")]
    ShapefileError(#[from] shapefile::Error),
    #[error("Wrapped geojson error: {0}")]
    GeoJsonError(#[from] geojson::Error),
    #[error("std IO error: {0}")]
    IOError(#[from] std::io::Error),
}
