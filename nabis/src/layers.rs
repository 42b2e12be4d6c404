//! The geometry pipeline: reconcile, simplify, reproject and dissolve the boundary dataset into
//! the municipal and province layers.

use anyhow::Result;
use geo::MultiPolygon;
use log::{debug, info};
use polars::prelude::*;
use wkt::ToWkt;

use crate::boundary::{read_boundaries, BoundarySource};
use crate::config::BoundaryConfig;
use crate::dissolve::{group_by, make_valid, union_all};
use crate::lookup::{load_region_index, RegionIndex};
use crate::projection::Crs;
use crate::reconcile::{reconcile, ReconcileReport};
use crate::region::composite_key;
use crate::topology::Topology;
use crate::COL;

/// A feature of the municipal layer, in EPSG:4326.
#[derive(Debug, Clone, PartialEq)]
pub struct MunicipalFeature {
    pub province_name: String,
    pub municipality_name: String,
    pub region_code: String,
    /// Municipality name as the indicator table spells it
    pub join_name: String,
    /// `province_name` and `join_name`, matching the indicator table's composite key
    pub join_key: String,
    pub geometry: MultiPolygon<f64>,
}

/// A feature of the province outline layer, in EPSG:4326.
#[derive(Debug, Clone, PartialEq)]
pub struct ProvinceFeature {
    pub province_name: String,
    pub geometry: MultiPolygon<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryReport {
    pub source_epsg: u32,
    /// Simplification tolerance in the source's own units
    pub tolerance: f64,
    pub arcs: usize,
    pub reconcile: ReconcileReport,
    pub municipal_features: usize,
    pub province_features: usize,
}

/// Both boundary layers, held in memory until written.
#[derive(Debug, Clone)]
pub struct BoundaryBuild {
    pub municipal: Vec<MunicipalFeature>,
    pub provinces: Vec<ProvinceFeature>,
    pub report: BoundaryReport,
}

/// Name used to join a municipality to the indicator table.
pub fn join_name(config: &BoundaryConfig, municipality_name: &str) -> String {
    config
        .join_name_overrides
        .get(municipality_name)
        .cloned()
        .unwrap_or_else(|| municipality_name.to_string())
}

/// Runs the geometry pipeline over features that have already been read.
pub fn assemble_boundaries(
    source: BoundarySource,
    index: &RegionIndex,
    config: &BoundaryConfig,
) -> Result<BoundaryBuild> {
    let source_epsg = config
        .source_epsg
        .or(source.declared_epsg)
        .unwrap_or(Crs::WGS84_EPSG);
    let crs = Crs::from_epsg(source_epsg)?;
    debug!("Boundary source CRS: EPSG:{}", crs.epsg());

    let (reconciled, reconcile_report) =
        reconcile(source.features, index, &config.unknown_province);

    let tolerance = crs.tolerance_in_native_units(config.simplify_tolerance_m);
    let geometries: Vec<MultiPolygon<f64>> =
        reconciled.iter().map(|f| f.geometry.clone()).collect();
    let topology = Topology::build(&geometries);
    let simplified = topology.simplify(tolerance);
    info!(
        "Simplified {} arc(s) at tolerance {tolerance} (EPSG:{source_epsg} units)",
        topology.arc_count()
    );

    let municipal: Vec<MunicipalFeature> = reconciled
        .into_iter()
        .zip(simplified)
        .map(|(feature, geometry)| {
            let join_name = join_name(config, &feature.municipality_name);
            MunicipalFeature {
                join_key: composite_key(&feature.province_name, &join_name),
                join_name,
                province_name: feature.province_name,
                municipality_name: feature.municipality_name,
                region_code: feature.region_code,
                geometry: crs.reproject(&geometry),
            }
        })
        .collect();

    let provinces: Vec<ProvinceFeature> = group_by(municipal.iter(), |f| f.province_name.clone())
        .into_iter()
        .map(|(province_name, group)| ProvinceFeature {
            province_name,
            geometry: make_valid(&union_all(group.map(|f| make_valid(&f.geometry)))),
        })
        .collect();

    let report = BoundaryReport {
        source_epsg: crs.epsg(),
        tolerance,
        arcs: topology.arc_count(),
        reconcile: reconcile_report,
        municipal_features: municipal.len(),
        province_features: provinces.len(),
    };
    Ok(BoundaryBuild {
        municipal,
        provinces,
        report,
    })
}

/// Reads the lookup table and boundary file named in the configuration and builds both layers.
pub fn build_boundaries(config: &BoundaryConfig) -> Result<BoundaryBuild> {
    let index = load_region_index(config)?;
    let source = read_boundaries(
        &config.boundary_path,
        &config.code_field,
        &config.name_field,
        &config.dbf_encoding,
    )?;
    assemble_boundaries(source, &index, config)
}

fn wkt_column(geometries: impl Iterator<Item = String>) -> Series {
    Series::new(COL::GEOMETRY, geometries.collect::<Vec<_>>())
}

/// The municipal layer as a dataframe with a WKT `geometry` column.
pub fn municipal_dataframe(features: &[MunicipalFeature]) -> PolarsResult<DataFrame> {
    let text = |name: &str, field: fn(&MunicipalFeature) -> &str| {
        Series::new(name, features.iter().map(field).collect::<Vec<_>>())
    };
    DataFrame::new(vec![
        text(COL::PROVINCE_NAME, |f| f.province_name.as_str()),
        text(COL::MUNICIPALITY_NAME, |f| f.municipality_name.as_str()),
        text(COL::REGION_CODE, |f| f.region_code.as_str()),
        text(COL::JOIN_NAME, |f| f.join_name.as_str()),
        text(COL::JOIN_KEY, |f| f.join_key.as_str()),
        wkt_column(features.iter().map(|f| f.geometry.wkt_string())),
    ])
}

/// The province layer as a dataframe with a WKT `geometry` column.
pub fn province_dataframe(features: &[ProvinceFeature]) -> PolarsResult<DataFrame> {
    DataFrame::new(vec![
        Series::new(
            COL::PROVINCE_NAME,
            features
                .iter()
                .map(|f| f.province_name.as_str())
                .collect::<Vec<_>>(),
        ),
        wkt_column(features.iter().map(|f| f.geometry.wkt_string())),
    ])
}
