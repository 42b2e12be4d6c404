//! This module stores the column names of every artifact the pipelines write, which are used when
//! serialising records to a dataframe and when reading artifacts back for validation. Note that
//! these must be kept in sync with what the dashboard reads!

// Long-format indicator table, in on-disk column order
pub const PROVINCE: &str = "province";
pub const MUNICIPALITY: &str = "municipality";
pub const REGION_LEVEL: &str = "region_level";
pub const PUBLISH_YEAR: &str = "publish_year";
pub const INDICATOR_SEQUENCE: &str = "indicator_sequence";
pub const INDICATOR_KIND: &str = "indicator_kind";
pub const CATEGORY: &str = "category";
pub const INDICATOR_NAME: &str = "indicator_name";
pub const UNIT: &str = "unit";
pub const LOCAL_VALUE: &str = "local_value";
pub const NATIONAL_VALUE: &str = "national_value";
pub const REFERENCE_YEAR: &str = "reference_year";

pub const INDICATOR_COLUMNS: [&str; 12] = [
    PROVINCE,
    MUNICIPALITY,
    REGION_LEVEL,
    PUBLISH_YEAR,
    INDICATOR_SEQUENCE,
    INDICATOR_KIND,
    CATEGORY,
    INDICATOR_NAME,
    UNIT,
    LOCAL_VALUE,
    NATIONAL_VALUE,
    REFERENCE_YEAR,
];

// Boundary layer feature properties
pub const PROVINCE_NAME: &str = "province_name";
pub const MUNICIPALITY_NAME: &str = "municipality_name";
pub const REGION_CODE: &str = "region_code";
pub const JOIN_NAME: &str = "join_name";
pub const JOIN_KEY: &str = "join_key";
pub const GEOMETRY: &str = "geometry";

// Region-code lookup table (census spatial information region codes)
pub const LOOKUP_PROVINCE_CODE: &str = "시도코드";
pub const LOOKUP_PROVINCE_NAME: &str = "시도명칭";
pub const LOOKUP_MUNICIPALITY_CODE: &str = "시군구코드";
pub const LOOKUP_MUNICIPALITY_NAME: &str = "시군구명칭";

// Source boundary dataset (census municipal boundaries)
pub const SOURCE_MUNICIPALITY_CODE: &str = "SIGUNGU_CD";
pub const SOURCE_MUNICIPALITY_NAME: &str = "SIGUNGU_NM";
