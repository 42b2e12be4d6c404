//! Resolving boundary features against the region index and dissolving non-autonomous districts
//! into their parent cities.

use geo::MultiPolygon;
use log::{info, warn};

use crate::boundary::SourceFeature;
use crate::dissolve::{group_by, union_all};
use crate::lookup::RegionIndex;
use crate::region::composite_key;

/// One feature per (province, municipality) after dissolving.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconciledFeature {
    pub province_name: String,
    pub municipality_name: String,
    /// Code of the first source feature of the group
    pub region_code: String,
    pub source_count: usize,
    pub geometry: MultiPolygon<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnmatchedFeature {
    pub code: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReconcileReport {
    pub source_features: usize,
    /// Features without a lookup row, kept under the fallback province
    pub unmatched: Vec<UnmatchedFeature>,
    /// Composite keys formed from more than one source feature, with the number merged
    pub dissolved: Vec<(String, usize)>,
}

struct Resolved {
    province_name: String,
    target_name: String,
    code: String,
    geometry: MultiPolygon<f64>,
}

/// Resolves each feature's province and target municipality by code, then dissolves features
/// sharing both. Output is ordered by province, then municipality.
pub fn reconcile(
    features: Vec<SourceFeature>,
    index: &RegionIndex,
    unknown_province: &str,
) -> (Vec<ReconciledFeature>, ReconcileReport) {
    let mut report = ReconcileReport {
        source_features: features.len(),
        ..ReconcileReport::default()
    };

    let resolved = features.into_iter().map(|feature| match index.get(&feature.code) {
        Some(entry) => Resolved {
            province_name: entry.province_name.clone(),
            target_name: entry.target_name.clone(),
            code: feature.code,
            geometry: feature.geometry,
        },
        None => {
            warn!(
                "No lookup row for boundary code {} ({}); assigning it to {unknown_province}",
                feature.code, feature.name
            );
            report.unmatched.push(UnmatchedFeature {
                code: feature.code.clone(),
                name: feature.name.clone(),
            });
            Resolved {
                province_name: unknown_province.to_string(),
                target_name: feature.name,
                code: feature.code,
                geometry: feature.geometry,
            }
        }
    });
    let groups = group_by(resolved, |r| (r.province_name.clone(), r.target_name.clone()));

    let reconciled: Vec<ReconciledFeature> = groups
        .into_iter()
        .map(|((province_name, municipality_name), group)| {
            let source_count = group.len();
            if source_count > 1 {
                report.dissolved.push((
                    composite_key(&province_name, &municipality_name),
                    source_count,
                ));
            }
            let region_code = group.head.code.clone();
            ReconciledFeature {
                province_name,
                municipality_name,
                region_code,
                source_count,
                geometry: union_all(group.map(|r| r.geometry)),
            }
        })
        .collect();

    info!(
        "Reconciled {} boundary feature(s) into {} ({} dissolved, {} unmatched)",
        report.source_features,
        reconciled.len(),
        report.dissolved.len(),
        report.unmatched.len()
    );
    (reconciled, report)
}
