use std::path::PathBuf;

use anyhow::Result;
use artifacts::{boundary_artifacts, indicator_artifacts, publish};
use indicators::IndicatorBuild;
use layers::BoundaryBuild;
use log::debug;
use validate::ValidationReport;

use crate::config::Config;

// Re-exports
pub use column_names as COL;

// Modules
pub mod artifacts;
pub mod boundary;
pub mod column_names;
pub mod config;
pub mod dissolve;
pub mod error;
pub mod formatters;
pub mod indicators;
pub mod layers;
pub mod lookup;
pub mod projection;
pub mod reconcile;
pub mod region;
pub mod spreadsheet;
pub mod topology;
pub mod validate;

/// Type for the NABIS dashboard data pipelines
pub struct Nabis {
    pub config: Config,
}

impl Default for Nabis {
    fn default() -> Self {
        Self::new()
    }
}

impl Nabis {
    /// Setup the Nabis object with default configuration
    pub fn new() -> Self {
        Self::new_with_config(Config::default())
    }

    /// Setup the Nabis object with custom configuration
    pub fn new_with_config(config: Config) -> Self {
        debug!("config: {config:?}");
        Self { config }
    }

    /// Parses every source spreadsheet into the long table, catalog and hierarchy
    pub fn build_indicators(&self) -> Result<IndicatorBuild> {
        indicators::build_indicators(&self.config.spreadsheets)
    }

    /// Builds the municipal and province boundary layers
    pub fn build_boundaries(&self) -> Result<BoundaryBuild> {
        layers::build_boundaries(&self.config.boundaries)
    }

    /// Writes the spreadsheet pipeline's artifacts
    pub fn write_indicators(&self, build: &IndicatorBuild) -> Result<Vec<PathBuf>> {
        publish(&self.config.output_dir, &indicator_artifacts(build)?)
    }

    /// Writes the geometry pipeline's artifacts
    pub fn write_boundaries(&self, build: &BoundaryBuild) -> Result<Vec<PathBuf>> {
        publish(&self.config.output_dir, &boundary_artifacts(build)?)
    }

    /// Writes the artifacts of both pipelines together: either all five are replaced or none is
    pub fn write_all(
        &self,
        indicators: &IndicatorBuild,
        boundaries: &BoundaryBuild,
    ) -> Result<Vec<PathBuf>> {
        let mut artifacts = indicator_artifacts(indicators)?;
        artifacts.extend(boundary_artifacts(boundaries)?);
        publish(&self.config.output_dir, &artifacts)
    }

    /// Joins in-memory results of both pipelines
    pub fn validate_builds(
        &self,
        indicators: &IndicatorBuild,
        boundaries: &BoundaryBuild,
    ) -> ValidationReport {
        validate::validate_join(
            &indicators.hierarchy,
            boundaries.municipal.iter().map(|f| f.join_key.as_str()),
        )
    }

    /// Joins the artifacts already written to the output directory
    pub fn validate(&self) -> Result<ValidationReport> {
        validate::validate_artifacts(&self.config.output_dir)
    }
}
