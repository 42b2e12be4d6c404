//! Assembling per-source records into the canonical long-format indicator table, the indicator
//! catalog and the region hierarchy.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use anyhow::Result;
use itertools::Itertools;
use log::{debug, info, warn};
use polars::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::{Harmonisation, SpreadsheetConfig};
use crate::error::NabisError;
use crate::region::RegionLevel;
use crate::spreadsheet::{discover_sources, parse_sheet, read_first_sheet};
use crate::COL;

/// One region x publish year x indicator observation.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorRecord {
    pub province: String,
    pub municipality: String,
    pub region_level: RegionLevel,
    pub publish_year: i32,
    pub indicator_sequence: i32,
    pub indicator_kind: String,
    pub category: String,
    pub indicator_name: String,
    pub unit: String,
    pub local_value: Option<f64>,
    pub national_value: Option<f64>,
    pub reference_year: String,
}

impl IndicatorRecord {
    /// Canonical order: province, province-level before municipalities, municipality, publish
    /// year, indicator sequence.
    fn canonical_cmp(&self, other: &Self) -> Ordering {
        self.province
            .cmp(&other.province)
            .then(self.region_level.cmp(&other.region_level))
            .then_with(|| self.municipality.cmp(&other.municipality))
            .then(self.publish_year.cmp(&other.publish_year))
            .then(self.indicator_sequence.cmp(&other.indicator_sequence))
    }

    fn same_key(&self, other: &Self) -> bool {
        self.canonical_cmp(other) == Ordering::Equal
    }

    fn definition(&self) -> CatalogEntry {
        CatalogEntry {
            indicator_sequence: self.indicator_sequence,
            indicator_kind: self.indicator_kind.clone(),
            category: self.category.clone(),
            indicator_name: self.indicator_name.clone(),
            unit: self.unit.clone(),
        }
    }
}

/// Applies province renames and municipality transfers to a record in place.
pub fn harmonise(record: &mut IndicatorRecord, rules: &Harmonisation) {
    if let Some(current) = rules.province_aliases.get(&record.province) {
        if record.municipality == record.province {
            record.municipality = current.clone();
        }
        record.province = current.clone();
    }
    if record.region_level == RegionLevel::Municipality {
        if let Some(province) = rules.municipality_moves.get(&record.municipality) {
            record.province = province.clone();
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub indicator_sequence: i32,
    pub indicator_kind: String,
    pub category: String,
    pub indicator_name: String,
    pub unit: String,
}

/// Several definitions observed for the same indicator sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogConflict {
    pub indicator_sequence: i32,
    /// Every distinct definition with its number of records, the kept one first
    pub variants: Vec<(CatalogEntry, usize)>,
}

/// Province -> sorted municipality names, from municipality-level records only.
pub type RegionHierarchy = BTreeMap<String, Vec<String>>;

/// The sorted, duplicate-free long-format table.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct IndicatorTable {
    records: Vec<IndicatorRecord>,
}

impl IndicatorTable {
    /// Sorts records canonically and drops repeated composite keys, keeping the first one.
    /// Returns the table and the number of duplicates dropped.
    pub fn assemble(mut records: Vec<IndicatorRecord>) -> (Self, usize) {
        // Stable sort: among duplicates the record from the earliest source survives
        records.sort_by(|a, b| a.canonical_cmp(b));
        let before = records.len();
        records.dedup_by(|later, earlier| later.same_key(earlier));
        let dropped = before - records.len();
        if dropped > 0 {
            warn!("Dropped {dropped} record(s) repeating an existing region/year/indicator key");
        }
        (Self { records }, dropped)
    }

    pub fn records(&self) -> &[IndicatorRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Distinct indicator definitions ordered by sequence, with any conflicting definitions.
    ///
    /// When one sequence carries several definitions the most common one is kept (ties go to the
    /// smallest), and the conflict is returned rather than resolved silently.
    pub fn catalog(&self) -> (Vec<CatalogEntry>, Vec<CatalogConflict>) {
        let mut counts: BTreeMap<i32, BTreeMap<CatalogEntry, usize>> = BTreeMap::new();
        for record in &self.records {
            *counts
                .entry(record.indicator_sequence)
                .or_default()
                .entry(record.definition())
                .or_default() += 1;
        }

        let mut catalog = vec![];
        let mut conflicts = vec![];
        for (indicator_sequence, definitions) in counts {
            let variants = definitions
                .into_iter()
                // Most frequent first; BTreeMap iteration already orders ties by definition
                .sorted_by(|(_, a), (_, b)| b.cmp(a))
                .collect_vec();
            if variants.len() > 1 {
                warn!(
                    "Indicator {indicator_sequence} has {} definitions, keeping `{}`",
                    variants.len(),
                    variants[0].0.indicator_name
                );
                conflicts.push(CatalogConflict {
                    indicator_sequence,
                    variants: variants.clone(),
                });
            }
            if let Some((entry, _)) = variants.into_iter().next() {
                catalog.push(entry);
            }
        }
        (catalog, conflicts)
    }

    pub fn hierarchy(&self) -> RegionHierarchy {
        let mut hierarchy: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for record in &self.records {
            let municipalities = hierarchy.entry(record.province.clone()).or_default();
            if record.region_level == RegionLevel::Municipality {
                municipalities.insert(record.municipality.clone());
            }
        }
        hierarchy
            .into_iter()
            .map(|(province, municipalities)| (province, municipalities.into_iter().collect()))
            .collect()
    }

    /// The table as a dataframe with the on-disk column order.
    pub fn to_dataframe(&self) -> PolarsResult<DataFrame> {
        let r = &self.records;
        let text = |f: fn(&IndicatorRecord) -> &str| r.iter().map(f).collect_vec();
        DataFrame::new(vec![
            Series::new(COL::PROVINCE, text(|x| x.province.as_str())),
            Series::new(COL::MUNICIPALITY, text(|x| x.municipality.as_str())),
            Series::new(
                COL::REGION_LEVEL,
                r.iter().map(|x| x.region_level.to_string()).collect_vec(),
            ),
            Series::new(
                COL::PUBLISH_YEAR,
                r.iter().map(|x| x.publish_year).collect_vec(),
            ),
            Series::new(
                COL::INDICATOR_SEQUENCE,
                r.iter().map(|x| x.indicator_sequence).collect_vec(),
            ),
            Series::new(COL::INDICATOR_KIND, text(|x| x.indicator_kind.as_str())),
            Series::new(COL::CATEGORY, text(|x| x.category.as_str())),
            Series::new(COL::INDICATOR_NAME, text(|x| x.indicator_name.as_str())),
            Series::new(COL::UNIT, text(|x| x.unit.as_str())),
            Series::new(
                COL::LOCAL_VALUE,
                r.iter().map(|x| x.local_value).collect_vec(),
            ),
            Series::new(
                COL::NATIONAL_VALUE,
                r.iter().map(|x| x.national_value).collect_vec(),
            ),
            Series::new(COL::REFERENCE_YEAR, text(|x| x.reference_year.as_str())),
        ])
    }

    pub fn summary(&self) -> Result<TableSummary> {
        let df = self.to_dataframe()?;
        let rows = df.height().max(1) as f64;
        let missing_rate =
            |column: &str| -> Result<f64> { Ok(df.column(column)?.null_count() as f64 / rows) };

        let mut regions: BTreeMap<RegionLevel, BTreeSet<(&str, &str)>> = BTreeMap::new();
        for record in &self.records {
            regions
                .entry(record.region_level)
                .or_default()
                .insert((record.province.as_str(), record.municipality.as_str()));
        }
        // Municipality names that occur under more than one province
        let repeated_names = regions
            .get(&RegionLevel::Municipality)
            .map(|pairs| {
                pairs
                    .iter()
                    .map(|(_, municipality)| *municipality)
                    .counts()
                    .into_iter()
                    .filter(|(_, n)| *n > 1)
                    .map(|(name, _)| name.to_string())
                    .sorted()
                    .collect_vec()
            })
            .unwrap_or_default();

        Ok(TableSummary {
            records: self.records.len(),
            publish_years: self
                .records
                .iter()
                .map(|r| r.publish_year)
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect(),
            regions_by_level: regions
                .into_iter()
                .map(|(level, pairs)| (level, pairs.len()))
                .collect(),
            local_missing_rate: missing_rate(COL::LOCAL_VALUE)?,
            national_missing_rate: missing_rate(COL::NATIONAL_VALUE)?,
            repeated_names,
        })
    }
}

/// Headline figures of an assembled table.
#[derive(Debug, Clone, PartialEq)]
pub struct TableSummary {
    pub records: usize,
    pub publish_years: Vec<i32>,
    pub regions_by_level: BTreeMap<RegionLevel, usize>,
    pub local_missing_rate: f64,
    pub national_missing_rate: f64,
    pub repeated_names: Vec<String>,
}

/// Why a source contributed no records.
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    Unreadable(String),
    /// Every row was skipped: either no data at this level or the wrong file was downloaded
    NoRecords,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedSource {
    pub path: PathBuf,
    pub reason: SkipReason,
}

/// Per-source outcome of a spreadsheet run.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct IngestReport {
    /// Sources and the number of records each contributed
    pub parsed: Vec<(PathBuf, usize)>,
    pub skipped: Vec<SkippedSource>,
    /// Zero-record sources listed in the `expected_empty` allowlist
    pub expected_empty: Vec<PathBuf>,
    pub duplicates_dropped: usize,
    pub catalog_conflicts: Vec<CatalogConflict>,
}

/// Everything the spreadsheet pipeline produces, held in memory until written.
#[derive(Debug, Clone)]
pub struct IndicatorBuild {
    pub table: IndicatorTable,
    pub catalog: Vec<CatalogEntry>,
    pub hierarchy: RegionHierarchy,
    pub report: IngestReport,
}

/// Path of `source` relative to `input_dir` with `/` separators, as written in the allowlist.
fn allowlist_key(input_dir: &Path, source: &Path) -> String {
    source
        .strip_prefix(input_dir)
        .unwrap_or(source)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .join("/")
}

/// Parses already-opened sources. Split from [`build_indicators`] so that the aggregation can be
/// driven without files on disk.
pub fn assemble_sources<I>(
    sources: I,
    input_dir: &Path,
    config: &SpreadsheetConfig,
) -> Result<IndicatorBuild>
where
    I: IntoIterator<Item = (PathBuf, Result<calamine::Range<calamine::Data>>)>,
{
    let expected_empty: BTreeSet<&str> =
        config.expected_empty.iter().map(|s| s.as_str()).collect();
    let mut report = IngestReport::default();
    let mut records = vec![];

    for (path, sheet) in sources {
        let sheet = match sheet {
            Ok(sheet) => sheet,
            Err(err) => {
                warn!("Skipping unreadable source {}: {err:#}", path.display());
                report.skipped.push(SkippedSource {
                    path,
                    reason: SkipReason::Unreadable(format!("{err:#}")),
                });
                continue;
            }
        };
        let mut parsed = parse_sheet(&sheet, &config.layout);
        debug!("{}: {} record(s)", path.display(), parsed.len());
        if parsed.is_empty() {
            if expected_empty.contains(allowlist_key(input_dir, &path).as_str()) {
                info!("{} has no sub-regional rows, as expected", path.display());
                report.expected_empty.push(path);
            } else {
                warn!(
                    "{} yielded no records; check whether the right file was downloaded",
                    path.display()
                );
                report.skipped.push(SkippedSource {
                    path,
                    reason: SkipReason::NoRecords,
                });
            }
            continue;
        }
        for record in parsed.iter_mut() {
            harmonise(record, &config.harmonisation);
        }
        report.parsed.push((path, parsed.len()));
        records.extend(parsed);
    }

    if records.is_empty() {
        return Err(NabisError::NoRecords.into());
    }
    info!(
        "Collected {} record(s) from {} source(s), skipped {}",
        records.len(),
        report.parsed.len(),
        report.skipped.len()
    );

    let (table, duplicates_dropped) = IndicatorTable::assemble(records);
    report.duplicates_dropped = duplicates_dropped;

    let (catalog, conflicts) = table.catalog();
    if config.strict_catalog {
        if let Some(conflict) = conflicts.first() {
            return Err(NabisError::CatalogConflict {
                sequence: conflict.indicator_sequence,
                variants: conflict.variants.len(),
            }
            .into());
        }
    }
    report.catalog_conflicts = conflicts;
    let hierarchy = table.hierarchy();

    Ok(IndicatorBuild {
        table,
        catalog,
        hierarchy,
        report,
    })
}

/// Runs the spreadsheet pipeline over every source under the configured input directory.
pub fn build_indicators(config: &SpreadsheetConfig) -> Result<IndicatorBuild> {
    let sources = discover_sources(&config.input_dir)?;
    info!("Found {} spreadsheet(s)", sources.len());
    assemble_sources(
        sources.into_iter().map(|path| {
            let sheet = read_first_sheet(&path);
            (path, sheet)
        }),
        &config.input_dir,
        config,
    )
}
