use std::fs::File;
use std::io::{BufReader, ErrorKind};
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use dbase::encoding::EncodingRs;
use dbase::FieldValue;
use encoding_rs::Encoding;
use flatgeobuf::geozero::ToGeo;
use flatgeobuf::{FallibleStreamingIterator, FeatureProperties, FgbReader};
use geo::{Geometry, MultiPolygon};
use geojson::{GeoJson, JsonObject, JsonValue};
use log::{debug, warn};
use shapefile::Shape;

use crate::error::NabisError;
use crate::projection::{epsg_from_crs_name, epsg_from_prj};

/// One polygon feature of the source boundary dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceFeature {
    pub code: String,
    pub name: String,
    pub geometry: MultiPolygon<f64>,
}

/// Features of a boundary file, with the EPSG code it declares, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundarySource {
    pub features: Vec<SourceFeature>,
    pub declared_epsg: Option<u32>,
}

/// Polygonal part of a geometry. Points and lines carry no area and are dropped.
fn to_multi_polygon(geometry: Geometry<f64>) -> Option<MultiPolygon<f64>> {
    match geometry {
        Geometry::Polygon(polygon) => Some(MultiPolygon(vec![polygon])),
        Geometry::MultiPolygon(multi) => Some(multi),
        Geometry::GeometryCollection(collection) => {
            let polygons: Vec<_> = collection
                .into_iter()
                .filter_map(to_multi_polygon)
                .flat_map(|multi| multi.0)
                .collect();
            (!polygons.is_empty()).then_some(MultiPolygon(polygons))
        }
        _ => None,
    }
}

/// Property values as text; numeric codes are written without a fractional part.
fn property_text(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) => Some(s.trim().to_string()),
        JsonValue::Number(n) => n
            .as_i64()
            .map(|i| i.to_string())
            .or_else(|| n.as_f64().map(|f| f.to_string())),
        _ => None,
    }
}

fn crs_member(foreign_members: Option<&JsonObject>) -> Option<u32> {
    let name = foreign_members?
        .get("crs")?
        .get("properties")?
        .get("name")?
        .as_str()?;
    epsg_from_crs_name(name)
}

/// Parses a GeoJSON FeatureCollection. The legacy `crs` member, if present, gives the EPSG code.
pub fn parse_geojson(text: &str, code_field: &str, name_field: &str) -> Result<BoundarySource> {
    let geojson: GeoJson = text.parse().map_err(NabisError::from)?;
    let GeoJson::FeatureCollection(collection) = geojson else {
        return Err(anyhow!("Boundary GeoJSON must be a FeatureCollection"));
    };
    let declared_epsg = crs_member(collection.foreign_members.as_ref());

    let mut features = vec![];
    for (idx, feature) in collection.features.into_iter().enumerate() {
        let code = feature.property(code_field).and_then(property_text);
        let name = feature.property(name_field).and_then(property_text);
        let (Some(code), Some(name)) = (code, name) else {
            warn!("Feature {idx} lacks `{code_field}` or `{name_field}`; skipping");
            continue;
        };
        let Some(geometry) = feature.geometry else {
            warn!("Feature {idx} ({code} {name}) has no geometry; skipping");
            continue;
        };
        let geometry = Geometry::<f64>::try_from(geometry).map_err(NabisError::from)?;
        match to_multi_polygon(geometry) {
            Some(geometry) => features.push(SourceFeature {
                code,
                name,
                geometry,
            }),
            None => warn!("Feature {idx} ({code} {name}) is not polygonal; skipping"),
        }
    }
    Ok(BoundarySource {
        features,
        declared_epsg,
    })
}

/// Reads a local FlatGeobuf file. The header's CRS code, if set, gives the EPSG code.
pub fn read_flatgeobuf(path: &Path, code_field: &str, name_field: &str) -> Result<BoundarySource> {
    let mut reader = BufReader::new(File::open(path)?);
    let fgb = FgbReader::open(&mut reader)
        .with_context(|| format!("Failed to open FlatGeobuf {}", path.display()))?;
    let declared_epsg = fgb
        .header()
        .crs()
        .map(|crs| crs.code())
        .filter(|&code| code > 0)
        .map(|code| code as u32);
    let mut fgb = fgb.select_all()?;

    let mut features = vec![];
    while let Some(feature) = fgb.next()? {
        let props = feature.properties()?;
        let (Some(code), Some(name)) = (props.get(code_field), props.get(name_field)) else {
            warn!("Feature lacks `{code_field}` or `{name_field}`; skipping");
            continue;
        };
        let (code, name) = (code.trim().to_string(), name.trim().to_string());
        match to_multi_polygon(feature.to_geo()?) {
            Some(geometry) => features.push(SourceFeature {
                code,
                name,
                geometry,
            }),
            None => warn!("Feature {code} {name} is not polygonal; skipping"),
        }
    }
    Ok(BoundarySource {
        features,
        declared_epsg,
    })
}

fn dbf_encoding(label: &str) -> Result<EncodingRs, NabisError> {
    Encoding::for_label(label.trim().as_bytes())
        .map(EncodingRs::from)
        .ok_or_else(|| NabisError::UnsupportedEncoding(label.to_string()))
}

/// Attribute values as text; numeric codes are written without a fractional part.
fn field_text(value: &FieldValue) -> Option<String> {
    let text = match value {
        FieldValue::Character(Some(s)) => s.trim().to_string(),
        FieldValue::Numeric(Some(n)) if n.fract() == 0.0 => format!("{}", *n as i64),
        FieldValue::Numeric(Some(n)) => n.to_string(),
        FieldValue::Integer(i) => i.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

/// Reads an ESRI shapefile whose `.dbf` attributes are stored in `encoding` (a WHATWG label such
/// as `EUC-KR`). The sibling `.prj`, if present, gives the EPSG code.
pub fn read_shapefile(
    path: &Path,
    code_field: &str,
    name_field: &str,
    encoding: &str,
) -> Result<BoundarySource> {
    let encoding = dbf_encoding(encoding)?;
    let mut reader = dbase::Reader::from_path_with_encoding(path.with_extension("dbf"), encoding)
        .map_err(shapefile::Error::from)
        .and_then(|dbf| Ok(shapefile::Reader::new(shapefile::ShapeReader::from_path(path)?, dbf)))
        .map_err(NabisError::from)
        .with_context(|| format!("Failed to open shapefile {}", path.display()))?;
    let declared_epsg = match std::fs::read_to_string(path.with_extension("prj")) {
        Ok(wkt) => epsg_from_prj(&wkt),
        Err(e) if e.kind() == ErrorKind::NotFound => None,
        Err(e) => return Err(NabisError::from(e).into()),
    };

    let mut features = vec![];
    for (idx, item) in reader.iter_shapes_and_records().enumerate() {
        let (shape, record) = item.map_err(NabisError::from)?;
        let code = record.get(code_field).and_then(field_text);
        let name = record.get(name_field).and_then(field_text);
        let (Some(code), Some(name)) = (code, name) else {
            warn!("Record {idx} lacks `{code_field}` or `{name_field}`; skipping");
            continue;
        };
        if matches!(shape, Shape::NullShape) {
            warn!("Record {idx} ({code} {name}) has no geometry; skipping");
            continue;
        }
        let geometry = Geometry::<f64>::try_from(shape)
            .map_err(|e| anyhow!("Record {idx} ({code} {name}) has invalid geometry: {e}"))?;
        match to_multi_polygon(geometry) {
            Some(geometry) => features.push(SourceFeature {
                code,
                name,
                geometry,
            }),
            None => warn!("Record {idx} ({code} {name}) is not polygonal; skipping"),
        }
    }
    Ok(BoundarySource {
        features,
        declared_epsg,
    })
}

/// Reads the municipal boundary dataset, dispatching on the file extension. `dbf_encoding` only
/// applies to shapefiles.
pub fn read_boundaries(
    path: &Path,
    code_field: &str,
    name_field: &str,
    dbf_encoding: &str,
) -> Result<BoundarySource> {
    if !path.exists() {
        return Err(NabisError::MissingInput(path.to_path_buf()).into());
    }
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_default();
    let source = match extension.as_str() {
        "geojson" | "json" => {
            let text = std::fs::read_to_string(path)?;
            parse_geojson(&text, code_field, name_field)
                .with_context(|| format!("Failed to read boundaries from {}", path.display()))?
        }
        "shp" => read_shapefile(path, code_field, name_field, dbf_encoding)?,
        "fgb" => read_flatgeobuf(path, code_field, name_field)?,
        _ => return Err(NabisError::UnsupportedFormat(path.to_path_buf()).into()),
    };
    debug!(
        "Read {} boundary feature(s) from {} (declared EPSG: {:?})",
        source.features.len(),
        path.display(),
        source.declared_epsg
    );
    Ok(source)
}
