use std::path::PathBuf;

use comfy_table::{presets::NOTHING, *};
use itertools::Itertools;
use nabis::indicators::{IngestReport, SkipReason, TableSummary};
use nabis::layers::BoundaryReport;
use nabis::validate::ValidationReport;

/// Rows beyond this are summarised in a single line
const MAX_LISTED: usize = 20;

fn report_table(header: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(NOTHING)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(
            header
                .iter()
                .map(|h| Cell::new(h).add_attribute(Attribute::Bold))
                .collect_vec(),
        )
        .set_style(comfy_table::TableComponent::BottomBorder, '─')
        .set_style(comfy_table::TableComponent::MiddleHeaderIntersections, '─')
        .set_style(comfy_table::TableComponent::HeaderLines, '─')
        .set_style(comfy_table::TableComponent::BottomBorderIntersections, '─')
        .set_style(comfy_table::TableComponent::TopBorder, '─')
        .set_style(comfy_table::TableComponent::TopBorderIntersections, '─');
    table
}

fn add_listed<T>(table: &mut Table, items: &[T], row: impl Fn(&T) -> Vec<String>) {
    for item in items.iter().take(MAX_LISTED) {
        table.add_row(row(item));
    }
    if items.len() > MAX_LISTED {
        table.add_row(vec![format!("... {} more", items.len() - MAX_LISTED)]);
    }
}

fn percent(rate: f64) -> String {
    format!("{:.1}%", rate * 100.0)
}

pub fn summary_table(summary: &TableSummary) -> Table {
    let mut table = report_table(&["Long table", ""]);
    table.add_row(vec!["Records".to_string(), summary.records.to_string()]);
    table.add_row(vec![
        "Publish years".to_string(),
        summary.publish_years.iter().join(", "),
    ]);
    for (level, count) in &summary.regions_by_level {
        table.add_row(vec![format!("Regions ({level})"), count.to_string()]);
    }
    table.add_row(vec![
        "Missing local values".to_string(),
        percent(summary.local_missing_rate),
    ]);
    table.add_row(vec![
        "Missing national values".to_string(),
        percent(summary.national_missing_rate),
    ]);
    if !summary.repeated_names.is_empty() {
        table.add_row(vec![
            "Names shared across provinces".to_string(),
            summary.repeated_names.join(", "),
        ]);
    }
    table
}

pub fn ingest_table(report: &IngestReport) -> Table {
    let mut table = report_table(&["Source", "Outcome"]);
    let records: usize = report.parsed.iter().map(|(_, n)| n).sum();
    table.add_row(vec![
        format!("{} source(s) parsed", report.parsed.len()),
        format!("{records} record(s)"),
    ]);
    add_listed(&mut table, &report.skipped, |skipped| {
        let reason = match &skipped.reason {
            SkipReason::Unreadable(message) => format!("unreadable: {message}"),
            SkipReason::NoRecords => "no records".to_string(),
        };
        vec![skipped.path.display().to_string(), reason]
    });
    add_listed(&mut table, &report.expected_empty, |path| {
        vec![path.display().to_string(), "expected empty".to_string()]
    });
    if report.duplicates_dropped > 0 {
        table.add_row(vec![
            "Duplicate records dropped".to_string(),
            report.duplicates_dropped.to_string(),
        ]);
    }
    add_listed(&mut table, &report.catalog_conflicts, |conflict| {
        vec![
            format!("Indicator {}", conflict.indicator_sequence),
            format!("{} catalog definitions", conflict.variants.len()),
        ]
    });
    table
}

pub fn boundary_table(report: &BoundaryReport) -> Table {
    let mut table = report_table(&["Boundaries", ""]);
    let reconcile = &report.reconcile;
    table.add_row(vec![
        "Source CRS".to_string(),
        format!("EPSG:{}", report.source_epsg),
    ]);
    table.add_row(vec![
        "Simplification tolerance".to_string(),
        report.tolerance.to_string(),
    ]);
    table.add_row(vec!["Shared arcs".to_string(), report.arcs.to_string()]);
    table.add_row(vec![
        "Source features".to_string(),
        reconcile.source_features.to_string(),
    ]);
    table.add_row(vec![
        "Municipal features".to_string(),
        report.municipal_features.to_string(),
    ]);
    table.add_row(vec![
        "Province outlines".to_string(),
        report.province_features.to_string(),
    ]);
    add_listed(&mut table, &reconcile.dissolved, |(name, parts)| {
        vec![format!("Dissolved {name}"), format!("{parts} part(s)")]
    });
    add_listed(&mut table, &reconcile.unmatched, |feature| {
        vec![
            format!("Unmatched {} ({})", feature.code, feature.name),
            "kept under fallback province".to_string(),
        ]
    });
    table
}

pub fn validation_table(report: &ValidationReport) -> Table {
    let mut table = report_table(&["Join key", "Status"]);
    table.add_row(vec![
        "Matched".to_string(),
        report.matched.to_string(),
    ]);
    add_listed(&mut table, &report.unmatched, |key| {
        vec![key.clone(), "no boundary feature".to_string()]
    });
    add_listed(&mut table, &report.ambiguous, |(key, count)| {
        vec![key.clone(), format!("{count} boundary features")]
    });
    add_listed(&mut table, &report.unused, |key| {
        vec![key.clone(), "no indicator records".to_string()]
    });
    table
}

pub fn written_table(paths: &[PathBuf]) -> Table {
    let mut table = report_table(&["Written"]);
    for path in paths {
        table.add_row(vec![path.display().to_string()]);
    }
    table
}

pub fn display_tables(tables: impl IntoIterator<Item = Table>) {
    for table in tables {
        println!("\n{}", table);
    }
}
