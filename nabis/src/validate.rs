//! Checking that the indicator table and the municipal layer join on their composite keys.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use geojson::GeoJson;
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::artifacts::paths;
use crate::error::NabisError;
use crate::indicators::RegionHierarchy;
use crate::region::composite_key;
use crate::COL;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ValidationReport {
    /// Composite keys matched by exactly one feature
    pub matched: usize,
    /// Composite keys of the indicator table with no feature
    pub unmatched: Vec<String>,
    /// Composite keys matched by more than one feature, with the number of features
    pub ambiguous: Vec<(String, usize)>,
    /// Feature join keys no indicator record refers to
    pub unused: Vec<String>,
}

impl ValidationReport {
    pub fn is_ok(&self) -> bool {
        self.unmatched.is_empty() && self.ambiguous.is_empty()
    }

    /// Turns unmatched or ambiguous keys into an error.
    pub fn ensure_ok(&self) -> Result<(), NabisError> {
        if self.is_ok() {
            Ok(())
        } else {
            Err(NabisError::ValidationFailed {
                unmatched: self.unmatched.len(),
                ambiguous: self.ambiguous.len(),
            })
        }
    }
}

/// Joins every municipality of the hierarchy to the features' join keys.
pub fn validate_join<'a>(
    hierarchy: &RegionHierarchy,
    join_keys: impl IntoIterator<Item = &'a str>,
) -> ValidationReport {
    let mut features: BTreeMap<&str, usize> = BTreeMap::new();
    for key in join_keys {
        *features.entry(key).or_default() += 1;
    }

    let expected: BTreeSet<String> = hierarchy
        .iter()
        .flat_map(|(province, municipalities)| {
            municipalities
                .iter()
                .map(move |municipality| composite_key(province, municipality))
        })
        .collect();

    let mut report = ValidationReport::default();
    for key in &expected {
        match features.get(key.as_str()) {
            None => report.unmatched.push(key.clone()),
            Some(1) => report.matched += 1,
            Some(&count) => report.ambiguous.push((key.clone(), count)),
        }
    }
    report.unused = features
        .keys()
        .filter(|key| !expected.contains(**key))
        .map(|key| key.to_string())
        .collect();

    for key in &report.unmatched {
        warn!("No boundary feature for {key}");
    }
    for (key, count) in &report.ambiguous {
        warn!("{count} boundary features share the join key {key}");
    }
    info!(
        "Join validation: {} matched, {} unmatched, {} ambiguous, {} unused feature(s)",
        report.matched,
        report.unmatched.len(),
        report.ambiguous.len(),
        report.unused.len()
    );
    report
}

/// Join keys of a municipal layer written as GeoJSON.
pub fn join_keys_from_geojson(text: &str) -> Result<Vec<String>> {
    let geojson: GeoJson = text.parse().map_err(NabisError::from)?;
    let GeoJson::FeatureCollection(collection) = geojson else {
        return Err(anyhow!("Municipal layer must be a FeatureCollection"));
    };
    collection
        .features
        .iter()
        .enumerate()
        .map(|(idx, feature)| {
            feature
                .property(COL::JOIN_KEY)
                .and_then(|value| value.as_str())
                .map(str::to_string)
                .ok_or_else(|| anyhow!("Feature {idx} has no `{}` property", COL::JOIN_KEY))
        })
        .collect()
}

/// Validates the hierarchy and municipal layer previously written to `out_dir`.
pub fn validate_artifacts(out_dir: &Path) -> Result<ValidationReport> {
    let read = |name: &str| -> Result<String> {
        let path = out_dir.join(name);
        if !path.exists() {
            return Err(NabisError::MissingInput(path).into());
        }
        std::fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path.display()))
    };
    let hierarchy: RegionHierarchy = serde_json::from_str(&read(paths::REGION_HIERARCHY)?)?;
    let join_keys = join_keys_from_geojson(&read(paths::MUNICIPAL_BOUNDARIES)?)?;
    Ok(validate_join(
        &hierarchy,
        join_keys.iter().map(|key| key.as_str()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hierarchy() -> RegionHierarchy {
        RegionHierarchy::from([
            ("서울특별시".to_string(), vec!["중구".to_string()]),
            (
                "인천광역시".to_string(),
                vec!["미추홀구".to_string(), "중구".to_string()],
            ),
            ("세종특별자치시".to_string(), vec![]),
        ])
    }

    #[test]
    fn composite_keys_should_distinguish_same_named_districts() {
        let report = validate_join(
            &hierarchy(),
            ["서울특별시 중구", "인천광역시 중구", "인천광역시 미추홀구"],
        );
        assert!(report.is_ok());
        assert_eq!(report.matched, 3);
        assert!(report.unused.is_empty());
    }

    #[test]
    fn defects_should_be_reported() {
        let report = validate_join(
            &hierarchy(),
            [
                "서울특별시 중구",
                "인천광역시 중구",
                "인천광역시 중구",
                "경기도 수원시",
            ],
        );
        assert!(!report.is_ok());
        assert_eq!(report.matched, 1);
        assert_eq!(report.unmatched, vec!["인천광역시 미추홀구"]);
        assert_eq!(report.ambiguous, vec![("인천광역시 중구".to_string(), 2)]);
        assert_eq!(report.unused, vec!["경기도 수원시"]);
        assert!(matches!(
            report.ensure_ok(),
            Err(NabisError::ValidationFailed {
                unmatched: 1,
                ambiguous: 1
            })
        ));
    }

    #[test]
    fn join_keys_should_be_read_from_geojson() -> anyhow::Result<()> {
        let text = r#"{"type": "FeatureCollection", "features": [
            {"type": "Feature", "geometry": null, "properties": {"join_key": "서울특별시 중구"}}
        ]}"#;
        assert_eq!(join_keys_from_geojson(text)?, vec!["서울특별시 중구"]);

        let text = r#"{"type": "FeatureCollection", "features": [
            {"type": "Feature", "geometry": null, "properties": {"province_name": "서울특별시"}}
        ]}"#;
        assert!(join_keys_from_geojson(text).is_err());
        Ok(())
    }

    #[test]
    fn validating_missing_artifacts_should_fail() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let err = validate_artifacts(dir.path()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<NabisError>(),
            Some(NabisError::MissingInput(_))
        ));
        Ok(())
    }

    #[test]
    fn written_artifacts_should_validate() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        std::fs::write(
            dir.path().join(paths::REGION_HIERARCHY),
            r#"{"서울특별시": ["중구"]}"#,
        )?;
        std::fs::write(
            dir.path().join(paths::MUNICIPAL_BOUNDARIES),
            r#"{"type": "FeatureCollection", "features": [
                {"type": "Feature", "geometry": null, "properties": {"join_key": "서울특별시 중구"}}
            ]}"#,
        )?;
        let report = validate_artifacts(dir.path())?;
        assert!(report.is_ok());
        assert_eq!(report.matched, 1);
        Ok(())
    }
}
