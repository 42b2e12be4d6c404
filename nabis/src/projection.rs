//! Coordinate reference systems of the boundary sources and their inverse projection to
//! geographic WGS84 (EPSG:4326).
//!
//! The Korea 2000 systems use the GRS80 ellipsoid on an ITRF datum, which coincides with WGS84
//! at web-mapping accuracy, so no datum shift is applied.

use std::f64::consts::PI;

use geo::{Coord, MapCoords, MultiPolygon};

use crate::error::NabisError;

const GRS80_A: f64 = 6_378_137.0;
const GRS80_F: f64 = 1.0 / 298.257_222_101;

/// Approximate length of one degree of latitude, used to express metre tolerances in degrees.
pub const METRES_PER_DEGREE: f64 = 111_000.0;

/// A transverse Mercator projection on the GRS80 ellipsoid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransverseMercator {
    pub lat0: f64,
    pub lon0: f64,
    pub k0: f64,
    pub false_easting: f64,
    pub false_northing: f64,
}

impl TransverseMercator {
    fn e2() -> f64 {
        GRS80_F * (2.0 - GRS80_F)
    }

    /// Meridian arc length from the equator to latitude `phi` (radians).
    fn meridian_arc(phi: f64) -> f64 {
        let e2 = Self::e2();
        let e4 = e2 * e2;
        let e6 = e4 * e2;
        GRS80_A
            * ((1.0 - e2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0) * phi
                - (3.0 * e2 / 8.0 + 3.0 * e4 / 32.0 + 45.0 * e6 / 1024.0) * (2.0 * phi).sin()
                + (15.0 * e4 / 256.0 + 45.0 * e6 / 1024.0) * (4.0 * phi).sin()
                - (35.0 * e6 / 3072.0) * (6.0 * phi).sin())
    }

    /// Projected (easting, northing) in metres to (longitude, latitude) in degrees.
    pub fn inverse(&self, c: Coord<f64>) -> Coord<f64> {
        let e2 = Self::e2();
        let ep2 = e2 / (1.0 - e2);
        let m0 = Self::meridian_arc(self.lat0.to_radians());
        let m = m0 + (c.y - self.false_northing) / self.k0;
        let mu = m / (GRS80_A * (1.0 - e2 / 4.0 - 3.0 * e2 * e2 / 64.0 - 5.0 * e2.powi(3) / 256.0));
        let e1 = (1.0 - (1.0 - e2).sqrt()) / (1.0 + (1.0 - e2).sqrt());
        let phi1 = mu
            + (3.0 * e1 / 2.0 - 27.0 * e1.powi(3) / 32.0) * (2.0 * mu).sin()
            + (21.0 * e1 * e1 / 16.0 - 55.0 * e1.powi(4) / 32.0) * (4.0 * mu).sin()
            + (151.0 * e1.powi(3) / 96.0) * (6.0 * mu).sin()
            + (1097.0 * e1.powi(4) / 512.0) * (8.0 * mu).sin();

        let (sin1, cos1, tan1) = (phi1.sin(), phi1.cos(), phi1.tan());
        let c1 = ep2 * cos1 * cos1;
        let t1 = tan1 * tan1;
        let n1 = GRS80_A / (1.0 - e2 * sin1 * sin1).sqrt();
        let r1 = GRS80_A * (1.0 - e2) / (1.0 - e2 * sin1 * sin1).powf(1.5);
        let d = (c.x - self.false_easting) / (n1 * self.k0);

        let phi = phi1
            - (n1 * tan1 / r1)
                * (d * d / 2.0
                    - (5.0 + 3.0 * t1 + 10.0 * c1 - 4.0 * c1 * c1 - 9.0 * ep2) * d.powi(4) / 24.0
                    + (61.0 + 90.0 * t1 + 298.0 * c1 + 45.0 * t1 * t1 - 252.0 * ep2 - 3.0 * c1 * c1)
                        * d.powi(6)
                        / 720.0);
        let lambda = (d - (1.0 + 2.0 * t1 + c1) * d.powi(3) / 6.0
            + (5.0 - 2.0 * c1 + 28.0 * t1 - 3.0 * c1 * c1 + 8.0 * ep2 + 24.0 * t1 * t1)
                * d.powi(5)
                / 120.0)
            / cos1;

        Coord {
            x: self.lon0 + lambda.to_degrees(),
            y: phi.to_degrees(),
        }
    }

    /// (longitude, latitude) in degrees to projected (easting, northing) in metres.
    pub fn forward(&self, c: Coord<f64>) -> Coord<f64> {
        let e2 = Self::e2();
        let ep2 = e2 / (1.0 - e2);
        let phi = c.y.to_radians();
        let (sin, cos, tan) = (phi.sin(), phi.cos(), phi.tan());
        let n = GRS80_A / (1.0 - e2 * sin * sin).sqrt();
        let t = tan * tan;
        let cc = ep2 * cos * cos;
        let a = (c.x - self.lon0).to_radians() * cos;
        let m = Self::meridian_arc(phi);
        let m0 = Self::meridian_arc(self.lat0.to_radians());

        let x = self.false_easting
            + self.k0
                * n
                * (a + (1.0 - t + cc) * a.powi(3) / 6.0
                    + (5.0 - 18.0 * t + t * t + 72.0 * cc - 58.0 * ep2) * a.powi(5) / 120.0);
        let y = self.false_northing
            + self.k0
                * (m - m0
                    + n * tan
                        * (a * a / 2.0
                            + (5.0 - t + 9.0 * cc + 4.0 * cc * cc) * a.powi(4) / 24.0
                            + (61.0 - 58.0 * t + t * t + 600.0 * cc - 330.0 * ep2) * a.powi(6)
                                / 720.0));
        Coord { x, y }
    }
}

/// Coordinate reference systems a boundary source may use.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Crs {
    /// EPSG:4326
    Wgs84,
    /// EPSG:3857
    WebMercator,
    /// Korea 2000 transverse Mercator variants (EPSG:5179, 5181, 5186)
    Korea2000 { epsg: u32, tm: TransverseMercator },
}

impl Crs {
    pub const WGS84_EPSG: u32 = 4326;

    pub fn from_epsg(epsg: u32) -> Result<Self, NabisError> {
        let belt = |lon0, k0, false_easting, false_northing| TransverseMercator {
            lat0: 38.0,
            lon0,
            k0,
            false_easting,
            false_northing,
        };
        match epsg {
            4326 => Ok(Crs::Wgs84),
            3857 => Ok(Crs::WebMercator),
            // Korea 2000 / Unified CS
            5179 => Ok(Crs::Korea2000 {
                epsg,
                tm: belt(127.5, 0.9996, 1_000_000.0, 2_000_000.0),
            }),
            // Korea 2000 / Central Belt
            5181 => Ok(Crs::Korea2000 {
                epsg,
                tm: belt(127.0, 1.0, 200_000.0, 500_000.0),
            }),
            // Korea 2000 / Central Belt 2010
            5186 => Ok(Crs::Korea2000 {
                epsg,
                tm: belt(127.0, 1.0, 200_000.0, 600_000.0),
            }),
            other => Err(NabisError::UnsupportedCrs(other)),
        }
    }

    pub fn epsg(&self) -> u32 {
        match self {
            Crs::Wgs84 => Self::WGS84_EPSG,
            Crs::WebMercator => 3857,
            Crs::Korea2000 { epsg, .. } => *epsg,
        }
    }

    pub fn is_geographic(&self) -> bool {
        matches!(self, Crs::Wgs84)
    }

    /// A distance in metres expressed in this system's native units.
    pub fn tolerance_in_native_units(&self, metres: f64) -> f64 {
        if self.is_geographic() {
            metres / METRES_PER_DEGREE
        } else {
            metres
        }
    }

    /// One coordinate in this system to (longitude, latitude) in degrees.
    pub fn to_wgs84(&self, c: Coord<f64>) -> Coord<f64> {
        match self {
            Crs::Wgs84 => c,
            Crs::WebMercator => Coord {
                x: (c.x / GRS80_A).to_degrees(),
                y: (2.0 * (c.y / GRS80_A).exp().atan() - PI / 2.0).to_degrees(),
            },
            Crs::Korea2000 { tm, .. } => tm.inverse(c),
        }
    }

    /// Reprojects a geometry coordinate by coordinate; the topology is untouched.
    pub fn reproject(&self, geometry: &MultiPolygon<f64>) -> MultiPolygon<f64> {
        match self {
            Crs::Wgs84 => geometry.clone(),
            _ => geometry.map_coords(|c| self.to_wgs84(c)),
        }
    }
}

/// Extracts an EPSG code from an OGC CRS name such as `urn:ogc:def:crs:EPSG::5179` or
/// `EPSG:5179`. The OGC CRS84 name maps to EPSG:4326.
pub fn epsg_from_crs_name(name: &str) -> Option<u32> {
    if name.ends_with("CRS84") {
        return Some(Crs::WGS84_EPSG);
    }
    let (authority, code) = name.rsplit_once(':')?;
    authority
        .to_ascii_uppercase()
        .contains("EPSG")
        .then(|| code.trim().parse().ok())
        .flatten()
}

/// The top-level `AUTHORITY["EPSG","nnnn"]` of a WKT definition. Authorities of nested nodes
/// (datum, ellipsoid, base GEOGCS) are ignored.
fn wkt_root_authority(wkt: &str) -> Option<u32> {
    const NODE: &str = "AUTHORITY[";
    let start = wkt.rfind(NODE)? + NODE.len();
    let (body, rest) = wkt[start..].split_once(']')?;
    if rest.trim() != "]" {
        return None;
    }
    let unquote = |s: &str| s.trim().trim_matches('"').trim().to_string();
    let (authority, code) = body.split_once(',')?;
    unquote(authority)
        .eq_ignore_ascii_case("EPSG")
        .then(|| unquote(code).parse().ok())
        .flatten()
}

/// EPSG code of a shapefile `.prj` (ESRI or OGC WKT1). Definitions without an authority are
/// recognised by the name of their root node.
pub fn epsg_from_prj(wkt: &str) -> Option<u32> {
    let wkt = wkt.trim();
    if let Some(epsg) = wkt_root_authority(wkt) {
        return Some(epsg);
    }
    let (node, rest) = wkt.split_once('[')?;
    let name: String = rest
        .trim_start()
        .trim_start_matches('"')
        .split('"')
        .next()?
        .chars()
        .map(|c| if c.is_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect();
    match node.trim().to_ascii_uppercase().as_str() {
        "PROJCS" if name.contains("unified") => Some(5179),
        "PROJCS" if name.contains("central_belt_2010") => Some(5186),
        "PROJCS" if name.contains("central_belt") => Some(5181),
        "PROJCS" if name.contains("pseudo_mercator") || name.contains("web_mercator") => {
            Some(3857)
        }
        "GEOGCS" if name.contains("wgs") && name.contains("84") => Some(Crs::WGS84_EPSG),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use geo::{polygon, Area};

    use super::*;

    fn assert_close(a: Coord<f64>, b: Coord<f64>, tolerance: f64) {
        assert!(
            (a.x - b.x).abs() < tolerance && (a.y - b.y).abs() < tolerance,
            "{a:?} should be within {tolerance} of {b:?}"
        );
    }

    #[test]
    fn false_origin_should_map_to_projection_centre() -> anyhow::Result<()> {
        let crs = Crs::from_epsg(5179)?;
        let centre = crs.to_wgs84(Coord {
            x: 1_000_000.0,
            y: 2_000_000.0,
        });
        assert_close(centre, Coord { x: 127.5, y: 38.0 }, 1e-9);

        let crs = Crs::from_epsg(5186)?;
        let centre = crs.to_wgs84(Coord {
            x: 200_000.0,
            y: 600_000.0,
        });
        assert_close(centre, Coord { x: 127.0, y: 38.0 }, 1e-9);
        Ok(())
    }

    #[test]
    fn seoul_city_hall_should_reproject() -> anyhow::Result<()> {
        // Seoul City Hall, 126.9780 E 37.5665 N
        let seoul = Coord {
            x: 126.978,
            y: 37.5665,
        };
        let Crs::Korea2000 { tm, .. } = Crs::from_epsg(5179)? else {
            unreachable!("EPSG:5179 is a transverse Mercator system");
        };
        let projected = tm.forward(seoul);
        // West of the central meridian and south of the origin latitude
        assert!(projected.x < 1_000_000.0 && projected.x > 900_000.0);
        assert!(projected.y < 2_000_000.0 && projected.y > 1_900_000.0);
        assert_close(tm.inverse(projected), seoul, 1e-8);
        Ok(())
    }

    #[test]
    fn web_mercator_should_invert() -> anyhow::Result<()> {
        let crs = Crs::from_epsg(3857)?;
        assert_close(crs.to_wgs84(Coord { x: 0.0, y: 0.0 }), Coord { x: 0.0, y: 0.0 }, 1e-12);
        let lon = crs.to_wgs84(Coord {
            x: PI * GRS80_A,
            y: 0.0,
        });
        assert_close(lon, Coord { x: 180.0, y: 0.0 }, 1e-9);
        Ok(())
    }

    #[test]
    fn unsupported_crs_should_be_rejected() {
        assert!(matches!(
            Crs::from_epsg(2097),
            Err(NabisError::UnsupportedCrs(2097))
        ));
    }

    #[test]
    fn tolerance_should_follow_units() -> anyhow::Result<()> {
        assert_eq!(Crs::from_epsg(5179)?.tolerance_in_native_units(5000.0), 5000.0);
        let degrees = Crs::Wgs84.tolerance_in_native_units(5000.0);
        assert!((degrees - 0.045_045).abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn reprojection_should_keep_vertex_count() -> anyhow::Result<()> {
        let square = MultiPolygon(vec![polygon![
            (x: 950_000.0, y: 1_950_000.0),
            (x: 960_000.0, y: 1_950_000.0),
            (x: 960_000.0, y: 1_960_000.0),
            (x: 950_000.0, y: 1_960_000.0),
            (x: 950_000.0, y: 1_950_000.0),
        ]]);
        let reprojected = Crs::from_epsg(5179)?.reproject(&square);
        assert_eq!(reprojected.0[0].exterior().0.len(), 5);
        // Roughly 10 km x 10 km, i.e. about 0.1 degree on each side
        let area = reprojected.unsigned_area();
        assert!(area > 0.005 && area < 0.02, "unexpected area {area}");
        Ok(())
    }

    #[test]
    fn crs_names_should_parse() {
        assert_eq!(epsg_from_crs_name("urn:ogc:def:crs:EPSG::5179"), Some(5179));
        assert_eq!(epsg_from_crs_name("EPSG:5186"), Some(5186));
        assert_eq!(epsg_from_crs_name("urn:ogc:def:crs:OGC:1.3:CRS84"), Some(4326));
        assert_eq!(epsg_from_crs_name("local"), None);
    }

    #[test]
    fn prj_definitions_should_resolve() {
        // ESRI WKT as shipped with the census boundary shapefiles
        let unified = r#"PROJCS["Korea_2000_Korea_Unified_Coordinate_System",GEOGCS["GCS_Korea_2000",DATUM["D_Korea_2000",SPHEROID["GRS_1980",6378137.0,298.257222101]],PRIMEM["Greenwich",0.0],UNIT["Degree",0.0174532925199433]],PROJECTION["Transverse_Mercator"],PARAMETER["False_Easting",1000000.0],PARAMETER["False_Northing",2000000.0],PARAMETER["Central_Meridian",127.5],PARAMETER["Scale_Factor",0.9996],PARAMETER["Latitude_Of_Origin",38.0],UNIT["Meter",1.0]]"#;
        assert_eq!(epsg_from_prj(unified), Some(5179));
        let belt = r#"PROJCS["Korea_2000_Korea_Central_Belt_2010",GEOGCS["GCS_Korea_2000",DATUM["D_Korea_2000",SPHEROID["GRS_1980",6378137.0,298.257222101]],PRIMEM["Greenwich",0.0],UNIT["Degree",0.0174532925199433]],PROJECTION["Transverse_Mercator"],UNIT["Meter",1.0]]"#;
        assert_eq!(epsg_from_prj(belt), Some(5186));
        let wgs84 = r#"GEOGCS["GCS_WGS_1984",DATUM["D_WGS_1984",SPHEROID["WGS_1984",6378137.0,298.257223563]],PRIMEM["Greenwich",0.0],UNIT["Degree",0.0174532925199433]]"#;
        assert_eq!(epsg_from_prj(wgs84), Some(4326));
    }

    #[test]
    fn prj_root_authority_should_win() {
        let ogc = r#"PROJCS["Korea 2000 / Central Belt",GEOGCS["Korea 2000",AUTHORITY["EPSG","4737"]],PROJECTION["Transverse_Mercator"],AUTHORITY["EPSG","5181"]]"#;
        assert_eq!(epsg_from_prj(ogc), Some(5181));
        // Only the base GEOGCS carries an authority
        let nested = r#"PROJCS["Bessel / Local TM",GEOGCS["Tokyo",AUTHORITY["EPSG","4301"]],PROJECTION["Transverse_Mercator"]]"#;
        assert_eq!(epsg_from_prj(nested), None);
        assert_eq!(epsg_from_prj(""), None);
    }
}
