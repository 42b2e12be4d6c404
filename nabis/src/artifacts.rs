//! The dashboard's input files and their all-or-nothing publication.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{debug, info};
use tempfile::NamedTempFile;

use crate::formatters::{CSVFormatter, GeoJSONFormatter, OutputFormatter, OutputGenerator};
use crate::indicators::IndicatorBuild;
use crate::layers::{municipal_dataframe, province_dataframe, BoundaryBuild};

/// File names of the artifacts in the output directory.
pub mod paths {
    pub const INDICATORS_LONG: &str = "indicators_long.csv";
    pub const INDICATOR_CATALOG: &str = "indicator_catalog.json";
    pub const REGION_HIERARCHY: &str = "region_hierarchy.json";
    pub const MUNICIPAL_BOUNDARIES: &str = "geo_sgg_4326.json";
    pub const PROVINCE_BOUNDARIES: &str = "geo_sido_4326.json";
}

/// A fully serialised artifact awaiting publication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub file_name: &'static str,
    pub contents: Vec<u8>,
}

fn render(formatter: OutputFormatter, df: &mut polars::frame::DataFrame) -> Result<Vec<u8>> {
    let mut contents = vec![];
    formatter.save(&mut contents, df)?;
    Ok(contents)
}

/// Serialises the long table, catalog and hierarchy.
pub fn indicator_artifacts(build: &IndicatorBuild) -> Result<Vec<Artifact>> {
    let mut df = build.table.to_dataframe()?;
    Ok(vec![
        Artifact {
            file_name: paths::INDICATORS_LONG,
            contents: render(CSVFormatter { with_bom: true }.into(), &mut df)?,
        },
        Artifact {
            file_name: paths::INDICATOR_CATALOG,
            contents: serde_json::to_vec_pretty(&build.catalog)?,
        },
        Artifact {
            file_name: paths::REGION_HIERARCHY,
            contents: serde_json::to_vec_pretty(&build.hierarchy)?,
        },
    ])
}

/// Serialises both boundary layers as GeoJSON FeatureCollections.
pub fn boundary_artifacts(build: &BoundaryBuild) -> Result<Vec<Artifact>> {
    Ok(vec![
        Artifact {
            file_name: paths::MUNICIPAL_BOUNDARIES,
            contents: render(
                GeoJSONFormatter.into(),
                &mut municipal_dataframe(&build.municipal)?,
            )?,
        },
        Artifact {
            file_name: paths::PROVINCE_BOUNDARIES,
            contents: render(
                GeoJSONFormatter.into(),
                &mut province_dataframe(&build.provinces)?,
            )?,
        },
    ])
}

/// Writes every artifact to a temporary file in `out_dir` and, only once all of them are
/// complete, renames them into place. A failure before the renames leaves existing artifacts
/// untouched.
pub fn publish(out_dir: &Path, artifacts: &[Artifact]) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create output directory {}", out_dir.display()))?;

    let mut staged = Vec::with_capacity(artifacts.len());
    for artifact in artifacts {
        let mut file = NamedTempFile::new_in(out_dir)?;
        file.write_all(&artifact.contents)?;
        file.as_file().sync_all()?;
        debug!(
            "Staged {} ({} bytes) at {}",
            artifact.file_name,
            artifact.contents.len(),
            file.path().display()
        );
        staged.push((file, out_dir.join(artifact.file_name)));
    }

    let mut written = Vec::with_capacity(staged.len());
    for (file, target) in staged {
        file.persist(&target)
            .with_context(|| format!("Failed to move artifact into {}", target.display()))?;
        info!("Wrote {}", target.display());
        written.push(target);
    }
    Ok(written)
}
