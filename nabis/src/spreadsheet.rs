//! Reading the portal's per-region indicator spreadsheets into [`IndicatorRecord`]s.

use std::path::{Path, PathBuf};

use anyhow::Context;
use calamine::{open_workbook_auto, Data, Range, Reader};
use log::debug;

use crate::config::SheetLayout;
use crate::error::NabisError;
use crate::indicators::IndicatorRecord;
use crate::region::RegionLevel;

/// Province cell value marking a row without data at the requested granularity.
pub const NATIONWIDE: &str = "전국";

/// Cell contents standing in for "no data".
const PLACEHOLDERS: [&str; 3] = ["-", "", "None"];

const SPREADSHEET_EXTENSIONS: [&str; 2] = ["xls", "xlsx"];

/// Lists the spreadsheets under `input_dir`, one sub-directory per province, in a deterministic
/// order. Directories starting with `_` and hidden files are ignored.
pub fn discover_sources(input_dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    if !input_dir.is_dir() {
        return Err(NabisError::MissingInput(input_dir.to_path_buf()).into());
    }
    let mut province_dirs = std::fs::read_dir(input_dir)
        .with_context(|| format!("Failed to list {}", input_dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_dir() && !file_name_starts_with(path, '_'))
        .collect::<Vec<_>>();
    province_dirs.sort();

    let mut sources = vec![];
    for dir in province_dirs {
        let mut files = std::fs::read_dir(&dir)
            .with_context(|| format!("Failed to list {}", dir.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.is_file() && is_spreadsheet(path) && !file_name_starts_with(path, '.')
            })
            .collect::<Vec<_>>();
        files.sort();
        debug!("{}: {} spreadsheet(s)", dir.display(), files.len());
        sources.extend(files);
    }

    if sources.is_empty() {
        return Err(NabisError::EmptyInput(input_dir.to_path_buf()).into());
    }
    Ok(sources)
}

fn file_name_starts_with(path: &Path, prefix: char) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.starts_with(prefix))
        .unwrap_or(false)
}

fn is_spreadsheet(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            SPREADSHEET_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}

/// Opens a workbook and returns its first worksheet.
pub fn read_first_sheet(path: &Path) -> anyhow::Result<Range<Data>> {
    let mut workbook = open_workbook_auto(path)
        .map_err(NabisError::from)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| NabisError::EmptyWorksheet(path.to_path_buf()))?
        .map_err(NabisError::from)
        .with_context(|| format!("Failed to read first worksheet of {}", path.display()))?;
    Ok(range)
}

/// Text content of a cell, trimmed. Missing cells read as the empty string.
pub(crate) fn cell_text(range: &Range<Data>, row: u32, col: u32) -> String {
    match range.get_value((row, col)) {
        None | Some(Data::Empty) => String::new(),
        Some(Data::String(s)) => s.trim().to_string(),
        Some(Data::Float(f)) => f.to_string(),
        Some(Data::Int(i)) => i.to_string(),
        Some(other) => other.to_string().trim().to_string(),
    }
}

/// The indicator sequence number of a row, or `None` for blank and non-numeric cells.
fn cell_sequence(range: &Range<Data>, row: u32, col: u32) -> Option<i32> {
    let number = match range.get_value((row, col))? {
        Data::Int(i) => *i as f64,
        Data::Float(f) => *f,
        Data::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    number.is_finite().then_some(number.trunc() as i32)
}

/// Parses a measured value. Placeholders, blanks and unparseable text are "no value", never zero.
pub fn parse_value(text: &str) -> Option<f64> {
    let text = text.trim();
    if PLACEHOLDERS.contains(&text) {
        return None;
    }
    text.replace(',', "")
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}

fn cell_value(range: &Range<Data>, row: u32, col: u32) -> Option<f64> {
    match range.get_value((row, col))? {
        Data::Float(f) => Some(*f).filter(|v| v.is_finite()),
        Data::Int(i) => Some(*i as f64),
        Data::String(s) => parse_value(s),
        _ => None,
    }
}

/// Converts one worksheet into records: every data row fans out into one record per configured
/// publish year. Rows without a numeric sequence and nationwide rows are skipped.
pub fn parse_sheet(range: &Range<Data>, layout: &SheetLayout) -> Vec<IndicatorRecord> {
    let Some((last_row, _)) = range.end() else {
        return vec![];
    };
    let mut records = vec![];
    for row in layout.data_start_row..=last_row {
        let Some(indicator_sequence) = cell_sequence(range, row, layout.sequence_col) else {
            continue;
        };
        let province = cell_text(range, row, layout.province_col);
        if province == NATIONWIDE {
            continue;
        }
        let municipality = cell_text(range, row, layout.municipality_col);
        let region_level = RegionLevel::of(&province, &municipality);
        let indicator_kind = cell_text(range, row, layout.kind_col);
        let category = cell_text(range, row, layout.category_col);
        let indicator_name = cell_text(range, row, layout.name_col);
        let unit = cell_text(range, row, layout.unit_col);

        for year in &layout.years {
            records.push(IndicatorRecord {
                province: province.clone(),
                municipality: municipality.clone(),
                region_level,
                publish_year: year.year,
                indicator_sequence,
                indicator_kind: indicator_kind.clone(),
                category: category.clone(),
                indicator_name: indicator_name.clone(),
                unit: unit.clone(),
                local_value: cell_value(range, row, year.local),
                national_value: cell_value(range, row, year.national),
                reference_year: cell_text(range, row, year.reference),
            });
        }
    }
    records
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// One indicator row in the export layout: sequence, kind, category, name, unit, province,
    /// municipality, then five (local, national, reference) triplets.
    pub(crate) struct Row<'a> {
        pub sequence: Data,
        pub name: &'a str,
        pub province: &'a str,
        pub municipality: &'a str,
        pub values: [(Data, Data, &'a str); 5],
    }

    pub(crate) fn row<'a>(
        sequence: i64,
        name: &'a str,
        province: &'a str,
        municipality: &'a str,
    ) -> Row<'a> {
        Row {
            sequence: Data::Float(sequence as f64),
            name,
            province,
            municipality,
            values: [
                (Data::Float(1.5), Data::Float(2.0), "2024년"),
                (Data::Float(1.4), Data::Float(1.9), "2023년"),
                (Data::Float(1.3), Data::Float(1.8), "2022년"),
                (Data::Float(1.2), Data::Float(1.7), "2021년"),
                (Data::Float(1.1), Data::Float(1.6), "2020년"),
            ],
        }
    }

    /// Builds a worksheet with six header rows followed by `rows`.
    pub(crate) fn sheet(rows: &[Row]) -> Range<Data> {
        let layout = SheetLayout::default();
        let last_row = layout.data_start_row + rows.len().max(1) as u32 - 1;
        let mut range = Range::new((0, 0), (last_row, 21));
        range.set_value((0, 0), Data::String("균형발전지표".into()));
        range.set_value((5, 0), Data::String("순번".into()));
        for (offset, r) in rows.iter().enumerate() {
            let row = layout.data_start_row + offset as u32;
            range.set_value((row, 0), r.sequence.clone());
            range.set_value((row, 1), Data::String("핵심지표".into()));
            range.set_value((row, 2), Data::String("인구".into()));
            range.set_value((row, 3), Data::String(r.name.into()));
            range.set_value((row, 4), Data::String("%".into()));
            range.set_value((row, 5), Data::String(r.province.into()));
            range.set_value((row, 6), Data::String(r.municipality.into()));
            for (year, (local, national, reference)) in layout.years.iter().zip(r.values.iter()) {
                range.set_value((row, year.local), local.clone());
                range.set_value((row, year.national), national.clone());
                range.set_value((row, year.reference), Data::String((*reference).into()));
            }
        }
        range
    }

    #[test]
    fn each_row_should_fan_out_per_publish_year() {
        let range = sheet(&[
            row(1, "인구증감률", "경기도", "수원시 영통구"),
            row(2, "재정자립도", "경기도", "수원시 영통구"),
        ]);
        let layout = SheetLayout::default();
        let records = parse_sheet(&range, &layout);
        assert_eq!(records.len(), 2 * layout.years.len());
        assert!(records
            .iter()
            .all(|r| r.region_level == RegionLevel::Municipality));
        let first = &records[0];
        assert_eq!(first.publish_year, 2025);
        assert_eq!(first.indicator_sequence, 1);
        assert_eq!(first.local_value, Some(1.5));
        assert_eq!(first.national_value, Some(2.0));
        assert_eq!(first.reference_year, "2024년");
        assert_eq!(records[4].publish_year, 2021);
        assert_eq!(records[4].local_value, Some(1.1));
    }

    #[test]
    fn placeholder_cells_should_be_absent_not_zero() {
        let mut r = row(1, "인구증감률", "경기도", "수원시 영통구");
        r.values[2].0 = Data::String("-".into());
        r.values[3].1 = Data::Empty;
        r.values[4].0 = Data::String("1,234.5".into());
        let records = parse_sheet(&sheet(&[r]), &SheetLayout::default());
        assert_eq!(records.len(), 5);
        assert_eq!(records[2].publish_year, 2023);
        assert_eq!(records[2].local_value, None);
        assert_eq!(records[2].national_value, Some(1.8));
        assert_eq!(records[3].national_value, None);
        assert_eq!(records[4].local_value, Some(1234.5));
    }

    #[test]
    fn malformed_and_nationwide_rows_should_be_skipped() {
        let mut blank = row(0, "합계", "경기도", "수원시");
        blank.sequence = Data::Empty;
        let mut text = row(0, "주석", "경기도", "수원시");
        text.sequence = Data::String("※ 출처".into());
        let range = sheet(&[
            row(1, "인구증감률", "경기도", "수원시"),
            blank,
            text,
            row(2, "재정자립도", NATIONWIDE, NATIONWIDE),
            row(3, "고용률", "경기도", "수원시"),
        ]);
        let records = parse_sheet(&range, &SheetLayout::default());
        assert_eq!(records.len(), 2 * 5, "Only two valid rows should be emitted");
        let sequences: Vec<i32> = records.iter().map(|r| r.indicator_sequence).collect();
        assert!(sequences.iter().all(|s| *s == 1 || *s == 3));
    }

    #[test]
    fn misdownloaded_file_should_yield_no_records() {
        let range = sheet(&[
            row(1, "인구증감률", NATIONWIDE, NATIONWIDE),
            row(2, "재정자립도", NATIONWIDE, NATIONWIDE),
        ]);
        assert!(parse_sheet(&range, &SheetLayout::default()).is_empty());
    }

    #[test]
    fn province_rows_should_be_province_level() {
        let range = sheet(&[row(1, "인구증감률", "경기도", "경기도")]);
        let records = parse_sheet(&range, &SheetLayout::default());
        assert_eq!(records.len(), 5);
        assert!(records.iter().all(|r| r.region_level == RegionLevel::Province));
    }

    #[test]
    fn sequence_numbers_may_be_text() {
        let mut r = row(0, "인구증감률", "경기도", "경기도");
        r.sequence = Data::String(" 7 ".into());
        let records = parse_sheet(&sheet(&[r]), &SheetLayout::default());
        assert_eq!(records[0].indicator_sequence, 7);
    }

    #[test]
    fn values_should_parse_leniently() {
        assert_eq!(parse_value("-"), None);
        assert_eq!(parse_value("  "), None);
        assert_eq!(parse_value("None"), None);
        assert_eq!(parse_value("n/a"), None);
        assert_eq!(parse_value("12,345"), Some(12345.0));
        assert_eq!(parse_value(" -3.5 "), Some(-3.5));
    }

    #[test]
    fn discovery_should_fail_on_missing_or_empty_input() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let missing = dir.path().join("missing");
        let err = discover_sources(&missing).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<NabisError>(),
            Some(NabisError::MissingInput(_))
        ));

        std::fs::create_dir(dir.path().join("경기도"))?;
        std::fs::write(dir.path().join("경기도").join("notes.txt"), "not a spreadsheet")?;
        let err = discover_sources(dir.path()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<NabisError>(),
            Some(NabisError::EmptyInput(_))
        ));
        Ok(())
    }

    #[test]
    fn discovery_should_ignore_hidden_and_underscored_entries() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        for province in ["경기도", "강원특별자치도", "_archive"] {
            std::fs::create_dir(dir.path().join(province))?;
        }
        std::fs::write(dir.path().join("경기도").join("수원시.xls"), b"")?;
        std::fs::write(dir.path().join("경기도").join(".~lock.xls"), b"")?;
        std::fs::write(dir.path().join("강원특별자치도").join("춘천시.XLSX"), b"")?;
        std::fs::write(dir.path().join("_archive").join("old.xls"), b"")?;

        let sources = discover_sources(dir.path())?;
        let names: Vec<String> = sources
            .iter()
            .map(|p| p.strip_prefix(dir.path()).unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names.len(), 2);
        assert!(names[0].ends_with("춘천시.XLSX"), "Province directories sort by name");
        assert!(names[1].ends_with("수원시.xls"));
        Ok(())
    }

    #[test]
    fn corrupt_file_should_fail_to_open() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("broken.xls");
        std::fs::write(&path, b"<html>session expired</html>")?;
        let err = read_first_sheet(&path).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<NabisError>(),
            Some(NabisError::SpreadsheetError(_))
        ));
        Ok(())
    }
}
