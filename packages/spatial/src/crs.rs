//! Coordinate reference systems understood by the joiner.
//!
//! Outage feeds and parcel layers arrive either in WGS84 longitude/latitude
//! or in spherical Web Mercator metres. Both are read from the legacy
//! `GeoJSON` `crs` member and converted between with the closed-form
//! spherical Mercator equations.

use std::fmt;
use std::str::FromStr;

use geo::{Coord, MapCoords};
use geojson::JsonObject;

use crate::SpatialError;

/// Semi-major axis used by spherical Web Mercator, in metres.
const EARTH_RADIUS_M: f64 = 6_378_137.0;

/// Latitude beyond which Web Mercator is undefined.
const MAX_MERCATOR_LAT: f64 = 85.051_128_779_806_59;

/// A supported coordinate reference system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Crs {
    /// Longitude/latitude in degrees (EPSG:4326, OGC CRS84).
    Wgs84,
    /// Spherical Web Mercator in metres (EPSG:3857).
    WebMercator,
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Wgs84 => f.write_str("EPSG:4326"),
            Self::WebMercator => f.write_str("EPSG:3857"),
        }
    }
}

impl FromStr for Crs {
    type Err = SpatialError;

    /// Accepts `EPSG:n`, `urn:ogc:def:crs:EPSG::n`, and the OGC CRS84 URN.
    fn from_str(name: &str) -> Result<Self, Self::Err> {
        let upper = name.trim().to_ascii_uppercase();
        if upper.ends_with("CRS84") {
            return Ok(Self::Wgs84);
        }

        let code = upper
            .rsplit(':')
            .next()
            .filter(|_| upper.contains("EPSG"))
            .unwrap_or_default();

        match code {
            "4326" => Ok(Self::Wgs84),
            "3857" | "900913" | "102100" | "102113" => Ok(Self::WebMercator),
            _ => Err(SpatialError::UnsupportedCrs {
                name: name.to_string(),
            }),
        }
    }
}

impl Crs {
    /// Reads the `crs` member of a `FeatureCollection`.
    ///
    /// A missing member means WGS84, as RFC 7946 requires.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError::UnsupportedCrs`] if the member is present
    /// but is not a named CRS this crate can convert.
    pub fn from_foreign_members(members: Option<&JsonObject>) -> Result<Self, SpatialError> {
        let Some(crs) = members.and_then(|m| m.get("crs")) else {
            return Ok(Self::Wgs84);
        };

        crs.get("properties")
            .and_then(|p| p.get("name"))
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| SpatialError::UnsupportedCrs {
                name: crs.to_string(),
            })?
            .parse()
    }

    /// The `crs` member to write on an output `FeatureCollection`.
    #[must_use]
    pub fn to_foreign_members(self) -> JsonObject {
        let mut members = JsonObject::new();
        members.insert(
            "crs".to_string(),
            serde_json::json!({
                "type": "name",
                "properties": { "name": self.to_string() },
            }),
        );
        members
    }

    /// Converts a geometry from `self` to `target`.
    #[must_use]
    pub fn reproject(self, geometry: &geo::Geometry<f64>, target: Self) -> geo::Geometry<f64> {
        match (self, target) {
            (Self::Wgs84, Self::WebMercator) => geometry.map_coords(wgs84_to_web_mercator),
            (Self::WebMercator, Self::Wgs84) => geometry.map_coords(web_mercator_to_wgs84),
            _ => geometry.clone(),
        }
    }
}

fn wgs84_to_web_mercator(c: Coord<f64>) -> Coord<f64> {
    let lat = c.y.clamp(-MAX_MERCATOR_LAT, MAX_MERCATOR_LAT).to_radians();
    Coord {
        x: EARTH_RADIUS_M * c.x.to_radians(),
        y: EARTH_RADIUS_M * (std::f64::consts::FRAC_PI_4 + lat / 2.0).tan().ln(),
    }
}

fn web_mercator_to_wgs84(c: Coord<f64>) -> Coord<f64> {
    Coord {
        x: (c.x / EARTH_RADIUS_M).to_degrees(),
        y: (2.0 * (c.y / EARTH_RADIUS_M).exp().atan() - std::f64::consts::FRAC_PI_2).to_degrees(),
    }
}
