use anyhow::{anyhow, Result};
use enum_dispatch::enum_dispatch;
use geo::geometry::Geometry;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::json;
use serde_json::Value;
use std::io::Cursor;
use std::io::Write;
use wkt::TryFromWkt;

use crate::COL;

/// Byte order mark written ahead of CSV output so that spreadsheet applications detect UTF-8
pub const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Utility function to convert from polars `AnyValue` to `serde_json::Value`
/// Doesn't cover all types but most of them.
fn any_value_to_json(value: &AnyValue) -> Result<Value> {
    match value {
        AnyValue::Null => Ok(Value::Null),
        AnyValue::Boolean(b) => Ok(Value::Bool(*b)),
        AnyValue::String(s) => Ok(Value::String((*s).to_string())),
        AnyValue::Int8(n) => Ok(json!(*n)),
        AnyValue::Int16(n) => Ok(json!(*n)),
        AnyValue::Int32(n) => Ok(json!(*n)),
        AnyValue::Int64(n) => Ok(json!(*n)),
        AnyValue::UInt8(n) => Ok(json!(*n)),
        AnyValue::UInt16(n) => Ok(json!(*n)),
        AnyValue::UInt32(n) => Ok(json!(*n)),
        AnyValue::UInt64(n) => Ok(json!(*n)),
        AnyValue::Float32(n) => Ok(json!(*n)),
        AnyValue::Float64(n) => Ok(json!(*n)),
        _ => Err(anyhow!("Failed to convert type")),
    }
}

/// Trait to define different output generators. Defines two
/// functions, format which generates a serialized string of the
/// `DataFrame` and save which writes the generated output
#[enum_dispatch]
pub trait OutputGenerator {
    fn save(&self, writer: &mut impl Write, df: &mut DataFrame) -> Result<()>;
    fn format(&self, df: &mut DataFrame) -> Result<String> {
        // Just creating an empty vec to store the buffered output
        let mut data: Vec<u8> = vec![];
        let mut buff = Cursor::new(&mut data);
        self.save(&mut buff, df)?;

        Ok(String::from_utf8(data)?)
    }
}

/// Enum of OutputFormatters one for each artifact type
#[enum_dispatch(OutputGenerator)]
#[derive(Serialize, Deserialize, Debug)]
pub enum OutputFormatter {
    GeoJSON(GeoJSONFormatter),
    Csv(CSVFormatter),
}

/// Format the results as a CSV file, optionally preceded by a UTF-8 byte order mark
#[derive(Serialize, Deserialize, Debug, Default)]
pub struct CSVFormatter {
    pub with_bom: bool,
}

impl OutputGenerator for CSVFormatter {
    fn save(&self, writer: &mut impl Write, df: &mut DataFrame) -> Result<()> {
        if self.with_bom {
            writer.write_all(UTF8_BOM)?;
        }
        CsvWriter::new(writer).finish(df)?;
        Ok(())
    }
}

/// Format the results as a GeoJSON FeatureCollection. The `geometry` column holds WKT and every
/// other column becomes a feature property.
#[derive(Serialize, Deserialize, Debug, Default)]
pub struct GeoJSONFormatter;

impl OutputGenerator for GeoJSONFormatter {
    fn format(&self, df: &mut DataFrame) -> Result<String> {
        let geometry_col = df.column(COL::GEOMETRY)?;
        let other_cols = df.drop(COL::GEOMETRY)?;
        let mut features: Vec<geojson::Feature> = vec![];

        for (idx, geom) in geometry_col.str()?.into_iter().enumerate() {
            if let Some(wkt_str) = geom {
                let geom: Geometry<f64> = Geometry::try_from_wkt_str(wkt_str)
                    .map_err(|_| anyhow!("Failed to parse geometry"))?;
                let mut properties = serde_json::Map::new();

                for col in other_cols.get_columns() {
                    let val = any_value_to_json(&col.get(idx)?)?;
                    properties.insert(col.name().to_string(), val);
                }

                let feature = geojson::Feature {
                    geometry: Some(geojson::Geometry::from(&geom)),
                    properties: Some(properties),
                    bbox: None,
                    id: None,
                    foreign_members: None,
                };
                features.push(feature);
            }
        }

        let feature_collection = geojson::FeatureCollection {
            bbox: None,
            features,
            foreign_members: None,
        };
        Ok(feature_collection.to_string())
    }

    fn save(&self, writer: &mut impl Write, df: &mut DataFrame) -> Result<()> {
        let result = self.format(df)?;
        writer.write_all(result.as_bytes())?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_df() -> DataFrame {
        df!(
             "province_name" => &["경기도", "서울특별시"],
             "region_code" => &[31011, 11020],
             "local_value" => &[Some(1.5), None],
             "geometry" => &[
                 "POLYGON ((0 0, 1 0, 1 1, 0 0))",
                 "POLYGON ((2 2, 3 2, 3 3, 2 2))"
             ]
        )
        .unwrap()
    }

    #[test]
    fn geojson_formatter_should_work() {
        let formatter = GeoJSONFormatter;
        let mut df = test_df();
        let output = formatter.format(&mut df);
        assert!(output.is_ok(), "Output should not error");
        let correct_str = r#"{"features":[{"geometry":{"coordinates":[[[0.0,0.0],[1.0,0.0],[1.0,1.0],[0.0,0.0]]],"type":"Polygon"},"properties":{"local_value":1.5,"province_name":"경기도","region_code":31011},"type":"Feature"},{"geometry":{"coordinates":[[[2.0,2.0],[3.0,2.0],[3.0,3.0],[2.0,2.0]]],"type":"Polygon"},"properties":{"local_value":null,"province_name":"서울특별시","region_code":11020},"type":"Feature"}],"type":"FeatureCollection"}"#;
        assert_eq!(output.unwrap(), correct_str, "Output should be correct");
    }

    #[test]
    fn csv_formatter_should_work() {
        let formatter = CSVFormatter { with_bom: false };
        let mut df = test_df().drop("geometry").unwrap();
        let output = formatter.format(&mut df);
        let correct_str = [
            "province_name,region_code,local_value",
            "경기도,31011,1.5",
            "서울특별시,11020,",
            "",
        ]
        .join("\n");

        assert!(output.is_ok(), "Output should not error");
        assert_eq!(output.unwrap(), correct_str, "Output should be correct");
    }

    #[test]
    fn csv_formatter_with_bom_should_prefix_output() {
        let formatter = OutputFormatter::Csv(CSVFormatter { with_bom: true });
        let mut df = test_df().drop("geometry").unwrap();
        let output = formatter.format(&mut df).unwrap();
        assert!(output.starts_with('\u{feff}'), "Output should start with a BOM");
        assert!(output[3..].starts_with("province_name,"));
    }
}
