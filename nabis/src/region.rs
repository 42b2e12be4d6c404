//! Administrative region vocabulary shared by both pipelines.

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// Granularity of an indicator record.
///
/// The declaration order is the canonical sort order of the long table: province-level
/// aggregates come before the municipalities of that province.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Display, EnumString, Serialize,
    Deserialize,
)]
pub enum RegionLevel {
    #[strum(serialize = "시도")]
    #[serde(rename = "시도")]
    Province,
    #[strum(serialize = "시군구")]
    #[serde(rename = "시군구")]
    Municipality,
}

impl RegionLevel {
    /// A record is province-level exactly when it names the province as its own municipality.
    pub fn of(province: &str, municipality: &str) -> Self {
        if province == municipality {
            RegionLevel::Province
        } else {
            RegionLevel::Municipality
        }
    }
}

/// Administrative class of a top-level division, derived from the suffix of its official name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AdminClass {
    /// 특별시
    SpecialCity,
    /// 광역시
    MetropolitanCity,
    /// 특별자치시
    SpecialSelfGoverningCity,
    /// 도
    Province,
    /// 특별자치도
    SpecialSelfGoverningProvince,
    Other,
}

impl AdminClass {
    pub fn from_province_name(name: &str) -> Self {
        let name = name.trim();
        // Longest suffixes first: "특별자치시" also ends with "시", "특별자치도" with "도"
        if name.ends_with("특별자치도") {
            AdminClass::SpecialSelfGoverningProvince
        } else if name.ends_with("특별자치시") {
            AdminClass::SpecialSelfGoverningCity
        } else if name.ends_with("특별시") {
            AdminClass::SpecialCity
        } else if name.ends_with("광역시") {
            AdminClass::MetropolitanCity
        } else if name.ends_with('도') {
            AdminClass::Province
        } else {
            AdminClass::Other
        }
    }

    /// Provinces, as opposed to metropolitan cities, govern ordinary cities whose districts
    /// have no local autonomy of their own.
    pub fn is_provincial(&self) -> bool {
        matches!(
            self,
            AdminClass::Province | AdminClass::SpecialSelfGoverningProvince
        )
    }
}

/// Composite key used to match indicator records to boundary features. Municipality names alone
/// are not unique nationally (중구, 동구, 서구, ...).
pub fn composite_key(province: &str, municipality: &str) -> String {
    format!("{province} {municipality}")
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn region_level_should_follow_names() {
        assert_eq!(RegionLevel::of("경기도", "경기도"), RegionLevel::Province);
        assert_eq!(
            RegionLevel::of("경기도", "수원시 영통구"),
            RegionLevel::Municipality
        );
    }

    #[test]
    fn province_level_should_sort_first() {
        assert!(RegionLevel::Province < RegionLevel::Municipality);
        // The labels themselves happen to sort the same way, but ordering must not depend on it
        assert_eq!(RegionLevel::Province.to_string(), "시도");
        assert_eq!(RegionLevel::Municipality.to_string(), "시군구");
    }

    #[test]
    fn region_level_labels_should_parse() {
        assert_eq!(RegionLevel::from_str("시도").unwrap(), RegionLevel::Province);
        assert_eq!(
            RegionLevel::from_str("시군구").unwrap(),
            RegionLevel::Municipality
        );
        assert!(RegionLevel::from_str("전국").is_err());
    }

    #[test]
    fn admin_class_should_use_suffixes() {
        assert_eq!(
            AdminClass::from_province_name("서울특별시"),
            AdminClass::SpecialCity
        );
        assert_eq!(
            AdminClass::from_province_name("인천광역시"),
            AdminClass::MetropolitanCity
        );
        assert_eq!(
            AdminClass::from_province_name("세종특별자치시"),
            AdminClass::SpecialSelfGoverningCity
        );
        assert_eq!(AdminClass::from_province_name("경기도"), AdminClass::Province);
        assert_eq!(
            AdminClass::from_province_name("제주특별자치도"),
            AdminClass::SpecialSelfGoverningProvince
        );
        assert_eq!(AdminClass::from_province_name("기타"), AdminClass::Other);
        assert!(AdminClass::from_province_name("강원특별자치도").is_provincial());
        assert!(!AdminClass::from_province_name("부산광역시").is_provincial());
    }

    #[test]
    fn composite_key_should_separate_same_named_districts() {
        assert_ne!(
            composite_key("서울특별시", "중구"),
            composite_key("인천광역시", "중구")
        );
        assert_eq!(composite_key("서울특별시", "중구"), "서울특별시 중구");
    }
}
