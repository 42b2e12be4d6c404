//! The census region-code lookup table, which resolves boundary codes to province names and to
//! the municipality a feature belongs to in the indicator table.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::OnceLock;

use anyhow::{Context, Result};
use calamine::{Data, Range};
use log::{debug, info, warn};
use polars::prelude::*;
use regex::Regex;

use crate::config::{BoundaryConfig, LookupColumns};
use crate::error::NabisError;
use crate::region::AdminClass;
use crate::spreadsheet::{cell_text, read_first_sheet};

/// One distinct row of the lookup table.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct LookupRow {
    pub province_code: String,
    pub province_name: String,
    pub municipality_code: String,
    pub municipality_name: String,
}

impl LookupRow {
    /// The five-digit code used by the boundary dataset: province code followed by the
    /// municipality code zero-padded to three digits.
    pub fn normalized_code(&self) -> String {
        format!(
            "{}{:0>3}",
            self.province_code.trim(),
            self.municipality_code.trim()
        )
    }
}

/// Resolved identity of a boundary code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionEntry {
    pub province_name: String,
    pub admin_class: AdminClass,
    pub municipality_name: String,
    /// Municipality the feature is dissolved into
    pub target_name: String,
}

const CITY_DISTRICT_PATTERN: &str = r"^(\S+시)\s+\S+구$";

fn city_district() -> Result<&'static Regex, NabisError> {
    static CITY_DISTRICT: OnceLock<Regex> = OnceLock::new();
    if let Some(re) = CITY_DISTRICT.get() {
        return Ok(re);
    }
    let re = Regex::new(CITY_DISTRICT_PATTERN)?;
    Ok(CITY_DISTRICT.get_or_init(|| re))
}

/// Districts of cities in a province ("수원시 영통구") are not autonomous and are reported as
/// their city ("수원시"). Autonomous districts of metropolitan cities keep their names.
pub fn target_name(
    admin_class: AdminClass,
    municipality_name: &str,
) -> Result<String, NabisError> {
    let name = municipality_name.trim();
    if admin_class.is_provincial() {
        if let Some(city) = city_district()?.captures(name).and_then(|c| c.get(1)) {
            return Ok(city.as_str().to_string());
        }
    }
    Ok(name.to_string())
}

impl TryFrom<&LookupRow> for RegionEntry {
    type Error = NabisError;

    fn try_from(row: &LookupRow) -> Result<Self, Self::Error> {
        let admin_class = AdminClass::from_province_name(&row.province_name);
        Ok(RegionEntry {
            province_name: row.province_name.trim().to_string(),
            admin_class,
            municipality_name: row.municipality_name.trim().to_string(),
            target_name: target_name(admin_class, &row.municipality_name)?,
        })
    }
}

/// Immutable index from normalized region code to region identity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegionIndex {
    entries: BTreeMap<String, RegionEntry>,
}

impl RegionIndex {
    /// Builds the index from raw rows, dropping duplicates. When a code appears with different
    /// names, the first row (in sorted order) wins.
    pub fn from_rows(rows: impl IntoIterator<Item = LookupRow>) -> Result<Self, NabisError> {
        let distinct: BTreeSet<LookupRow> = rows.into_iter().collect();
        let mut entries: BTreeMap<String, RegionEntry> = BTreeMap::new();
        for row in &distinct {
            let code = row.normalized_code();
            if let Some(existing) = entries.get(&code) {
                warn!(
                    "Region code {code} is listed as both {} {} and {} {}; keeping the former",
                    existing.province_name,
                    existing.municipality_name,
                    row.province_name,
                    row.municipality_name
                );
                continue;
            }
            entries.insert(code, RegionEntry::try_from(row)?);
        }
        debug!(
            "Region index: {} code(s) from {} distinct row(s)",
            entries.len(),
            distinct.len()
        );
        Ok(RegionIndex { entries })
    }

    pub fn get(&self, code: &str) -> Option<&RegionEntry> {
        self.entries.get(code.trim())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Reads lookup rows from the first worksheet, with column names on `header_row`.
pub fn rows_from_sheet(
    range: &Range<Data>,
    header_row: u32,
    columns: &LookupColumns,
    path: &Path,
) -> Result<Vec<LookupRow>> {
    let Some((last_row, last_col)) = range.end() else {
        return Err(NabisError::EmptyWorksheet(path.to_path_buf()).into());
    };
    let find = |name: &str| -> Result<u32> {
        (0..=last_col)
            .find(|&col| cell_text(range, header_row, col) == name)
            .ok_or_else(|| {
                NabisError::MissingColumn {
                    path: path.to_path_buf(),
                    column: name.to_string(),
                }
                .into()
            })
    };
    let province_code = find(&columns.province_code)?;
    let province_name = find(&columns.province_name)?;
    let municipality_code = find(&columns.municipality_code)?;
    let municipality_name = find(&columns.municipality_name)?;

    let rows = (header_row + 1..=last_row)
        .map(|row| LookupRow {
            province_code: cell_text(range, row, province_code),
            province_name: cell_text(range, row, province_name),
            municipality_code: cell_text(range, row, municipality_code),
            municipality_name: cell_text(range, row, municipality_name),
        })
        .filter(|row| !row.province_code.is_empty() && !row.municipality_code.is_empty())
        .collect();
    Ok(rows)
}

/// Reads lookup rows from a CSV file. Every column is read as text so that codes keep their
/// leading zeros.
pub fn rows_from_csv(path: &Path, columns: &LookupColumns) -> Result<Vec<LookupRow>> {
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()
        .with_context(|| format!("Failed to read lookup table {}", path.display()))?;

    let text_column = |name: &str| -> Result<Vec<String>> {
        let series = df.column(name).map_err(|_| NabisError::MissingColumn {
            path: path.to_path_buf(),
            column: name.to_string(),
        })?;
        Ok(series
            .str()?
            .into_iter()
            .map(|value| value.unwrap_or_default().trim().to_string())
            .collect())
    };
    let province_codes = text_column(&columns.province_code)?;
    let province_names = text_column(&columns.province_name)?;
    let municipality_codes = text_column(&columns.municipality_code)?;
    let municipality_names = text_column(&columns.municipality_name)?;

    let rows = province_codes
        .into_iter()
        .zip(province_names)
        .zip(municipality_codes.into_iter().zip(municipality_names))
        .map(
            |((province_code, province_name), (municipality_code, municipality_name))| LookupRow {
                province_code,
                province_name,
                municipality_code,
                municipality_name,
            },
        )
        .filter(|row| !row.province_code.is_empty() && !row.municipality_code.is_empty())
        .collect();
    Ok(rows)
}

/// Loads the lookup table named in the configuration, as a spreadsheet or CSV file.
pub fn load_region_index(config: &BoundaryConfig) -> Result<RegionIndex> {
    let path = config.lookup_path.as_path();
    if !path.exists() {
        return Err(NabisError::MissingInput(path.to_path_buf()).into());
    }
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_default();
    let rows = match extension.as_str() {
        "xlsx" | "xls" => {
            let range = read_first_sheet(path)?;
            rows_from_sheet(&range, config.lookup_header_row, &config.lookup_columns, path)?
        }
        "csv" => rows_from_csv(path, &config.lookup_columns)?,
        _ => return Err(NabisError::UnsupportedFormat(path.to_path_buf()).into()),
    };
    let index = RegionIndex::from_rows(rows)?;
    info!(
        "Loaded {} region code(s) from {}",
        index.len(),
        path.display()
    );
    Ok(index)
}
