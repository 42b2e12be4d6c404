use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::COL;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    pub output_dir: PathBuf,
    pub spreadsheets: SpreadsheetConfig,
    pub boundaries: BoundaryConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            output_dir: "datasets/processed".into(),
            spreadsheets: SpreadsheetConfig::default(),
            boundaries: BoundaryConfig::default(),
        }
    }
}

/// Where the per-region spreadsheets live and how they are laid out.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct SpreadsheetConfig {
    /// One sub-directory per province, one spreadsheet per region inside it
    pub input_dir: PathBuf,
    pub layout: SheetLayout,
    /// Sources (relative to `input_dir`) known to contain no sub-regional rows. These are reported
    /// as expected empty sources rather than skipped ones.
    pub expected_empty: Vec<String>,
    /// Fail the run instead of warning when an indicator has conflicting catalog definitions
    pub strict_catalog: bool,
    pub harmonisation: Harmonisation,
}

impl Default for SpreadsheetConfig {
    fn default() -> Self {
        SpreadsheetConfig {
            input_dir: "datasets/index2025".into(),
            layout: SheetLayout::default(),
            expected_empty: vec![],
            strict_catalog: false,
            harmonisation: Harmonisation::default(),
        }
    }
}

/// Column offsets of the (local value, national value, reference year) triplet for one publish
/// year.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct YearColumns {
    pub year: i32,
    pub local: u32,
    pub national: u32,
    pub reference: u32,
}

impl YearColumns {
    pub const fn new(year: i32, local: u32, national: u32, reference: u32) -> Self {
        Self {
            year,
            local,
            national,
            reference,
        }
    }
}

/// Fixed row and column positions of the portal's indicator export.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct SheetLayout {
    pub data_start_row: u32,
    pub sequence_col: u32,
    pub kind_col: u32,
    pub category_col: u32,
    pub name_col: u32,
    pub unit_col: u32,
    pub province_col: u32,
    pub municipality_col: u32,
    /// One triplet per publish year, newest first as in the export
    pub years: Vec<YearColumns>,
}

impl Default for SheetLayout {
    fn default() -> Self {
        SheetLayout {
            data_start_row: 6,
            sequence_col: 0,
            kind_col: 1,
            category_col: 2,
            name_col: 3,
            unit_col: 4,
            province_col: 5,
            municipality_col: 6,
            years: vec![
                YearColumns::new(2025, 7, 8, 9),
                YearColumns::new(2024, 10, 11, 12),
                YearColumns::new(2023, 13, 14, 15),
                YearColumns::new(2022, 16, 17, 18),
                YearColumns::new(2021, 19, 20, 21),
            ],
        }
    }
}

/// Renames applied to indicator records so that their composite keys follow the current
/// administrative map used by the boundary layer.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Harmonisation {
    /// Old province name -> current province name
    pub province_aliases: BTreeMap<String, String>,
    /// Municipality name -> province it now belongs to
    pub municipality_moves: BTreeMap<String, String>,
}

impl Default for Harmonisation {
    fn default() -> Self {
        Harmonisation {
            province_aliases: BTreeMap::from([("전라북도".into(), "전북특별자치도".into())]),
            // Transferred from 경상북도 to 대구광역시 in 2023
            municipality_moves: BTreeMap::from([("군위군".into(), "대구광역시".into())]),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct BoundaryConfig {
    /// Municipal boundaries, as an ESRI shapefile, GeoJSON or FlatGeobuf
    pub boundary_path: PathBuf,
    /// Character encoding of the shapefile's `.dbf` attributes
    pub dbf_encoding: String,
    /// Census region code table, as a spreadsheet or CSV
    pub lookup_path: PathBuf,
    /// Zero-based row holding the lookup table's column names (spreadsheets only)
    pub lookup_header_row: u32,
    pub lookup_columns: LookupColumns,
    pub code_field: String,
    pub name_field: String,
    /// Overrides the coordinate reference system declared by (or assumed for) the boundary file
    pub source_epsg: Option<u32>,
    /// Simplification tolerance in metres, converted to degrees for geographic sources
    pub simplify_tolerance_m: f64,
    /// Province assigned to boundary features without a lookup match
    pub unknown_province: String,
    /// Municipality name -> name used by the indicator table
    pub join_name_overrides: BTreeMap<String, String>,
}

impl Default for BoundaryConfig {
    fn default() -> Self {
        BoundaryConfig {
            boundary_path: "datasets/shapefile/BND_SIGUNGU_PG/BND_SIGUNGU_PG.shp".into(),
            dbf_encoding: "EUC-KR".into(),
            lookup_path: "datasets/shapefile/센서스 공간정보 지역 코드.xlsx".into(),
            lookup_header_row: 1,
            lookup_columns: LookupColumns::default(),
            code_field: COL::SOURCE_MUNICIPALITY_CODE.into(),
            name_field: COL::SOURCE_MUNICIPALITY_NAME.into(),
            source_epsg: None,
            simplify_tolerance_m: 5000.0,
            unknown_province: "기타".into(),
            join_name_overrides: BTreeMap::from([("세종시".into(), "세종특별자치시".into())]),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct LookupColumns {
    pub province_code: String,
    pub province_name: String,
    pub municipality_code: String,
    pub municipality_name: String,
}

impl Default for LookupColumns {
    fn default() -> Self {
        LookupColumns {
            province_code: COL::LOOKUP_PROVINCE_CODE.into(),
            province_name: COL::LOOKUP_PROVINCE_NAME.into(),
            municipality_code: COL::LOOKUP_MUNICIPALITY_CODE.into(),
            municipality_name: COL::LOOKUP_MUNICIPALITY_NAME.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_should_fill_in_defaults() -> anyhow::Result<()> {
        let config: Config = serde_json::from_str(
            r#"{"output_dir": "out", "boundaries": {"source_epsg": 5179}}"#,
        )?;
        assert_eq!(config.output_dir, PathBuf::from("out"));
        assert_eq!(config.boundaries.source_epsg, Some(5179));
        assert_eq!(config.boundaries.code_field, "SIGUNGU_CD");
        assert_eq!(config.boundaries.dbf_encoding, "EUC-KR");
        assert_eq!(
            config.boundaries.boundary_path,
            PathBuf::from("datasets/shapefile/BND_SIGUNGU_PG/BND_SIGUNGU_PG.shp")
        );
        assert_eq!(config.spreadsheets, SpreadsheetConfig::default());
        Ok(())
    }

    #[test]
    fn default_layout_should_cover_five_publish_years() {
        let layout = SheetLayout::default();
        assert_eq!(
            layout.years.iter().map(|y| y.year).collect::<Vec<_>>(),
            vec![2025, 2024, 2023, 2022, 2021]
        );
        assert_eq!(layout.years[0], YearColumns::new(2025, 7, 8, 9));
        assert_eq!(layout.years[4], YearColumns::new(2021, 19, 20, 21));
    }
}
