#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Outage-to-parcel spatial join.
//!
//! Loads land-use parcel polygons, builds an R-tree over their envelopes,
//! and finds the parcels each outage geometry intersects. Both layers carry
//! their [`Crs`]; the join refuses to run when they differ, because an
//! intersect test across reference systems quietly returns nonsense.

pub mod crs;

use std::path::{Path, PathBuf};

use geo::{BoundingRect, Intersects, MultiPolygon};
use geojson::GeoJson;
use outage_map_outage_models::{LandParcel, OutageRecord};
use rstar::{AABB, RTree, RTreeObject};

pub use crs::Crs;

/// Errors that can occur while loading layers or joining them.
#[derive(Debug, thiserror::Error)]
pub enum SpatialError {
    /// Reading a layer file failed.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A layer file is not valid `GeoJSON`.
    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),

    /// A layer file is valid `GeoJSON` but not a `FeatureCollection`.
    #[error("{} is not a GeoJSON FeatureCollection", path.display())]
    NotFeatureCollection {
        /// File involved.
        path: PathBuf,
    },

    /// A layer declares a reference system that cannot be converted.
    #[error("Unsupported coordinate reference system: {name}")]
    UnsupportedCrs {
        /// The declared name (or raw `crs` member).
        name: String,
    },

    /// The layers handed to [`join`] are in different reference systems.
    #[error("Reference system mismatch: parcels are {parcels}, outages are {outages}")]
    ReferenceSystemMismatch {
        /// Parcel layer CRS.
        parcels: Crs,
        /// Outage layer CRS.
        outages: Crs,
    },
}

/// Outage records sharing one reference system.
#[derive(Debug, Clone)]
pub struct OutageLayer {
    /// Reference system of every record's geometry.
    pub crs: Crs,
    /// The records.
    pub records: Vec<OutageRecord>,
}

impl OutageLayer {
    /// Wraps records whose geometries are in `crs`.
    #[must_use]
    pub const fn new(crs: Crs, records: Vec<OutageRecord>) -> Self {
        Self { crs, records }
    }

    /// Converts every geometry into `target`.
    #[must_use]
    pub fn reproject(mut self, target: Crs) -> Self {
        if self.crs == target {
            return self;
        }

        log::info!(
            "Reprojecting {} outage records from {} to {target}",
            self.records.len(),
            self.crs
        );
        for record in &mut self.records {
            if let Some(geometry) = &record.geometry {
                record.geometry = Some(self.crs.reproject(geometry, target));
            }
        }
        self.crs = target;
        self
    }
}

/// Land-use parcels sharing one reference system.
#[derive(Debug, Clone)]
pub struct ParcelLayer {
    /// Reference system of every parcel boundary.
    pub crs: Crs,
    /// The parcels, ordered by `landuse_id`.
    pub parcels: Vec<LandParcel>,
}

impl ParcelLayer {
    /// Loads a `GeoJSON` `FeatureCollection` of polygon parcels.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError`] if the file cannot be read, is not a
    /// `FeatureCollection`, or declares an unsupported CRS.
    pub fn load(path: &Path) -> Result<Self, SpatialError> {
        let contents = std::fs::read_to_string(path).map_err(|source| SpatialError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let GeoJson::FeatureCollection(collection) = contents.parse::<GeoJson>()? else {
            return Err(SpatialError::NotFeatureCollection {
                path: path.to_path_buf(),
            });
        };

        let layer = Self::from_collection(collection)?;
        log::info!(
            "Loaded {} parcels ({}) from {}",
            layer.parcels.len(),
            layer.crs,
            path.display()
        );
        Ok(layer)
    }

    /// Builds a layer from an in-memory `FeatureCollection`.
    ///
    /// Each parcel's `landuse_id` is its position in the collection.
    /// Features without polygonal geometry are skipped with a warning; the
    /// ids of the remaining parcels do not shift.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError::UnsupportedCrs`] if the collection declares
    /// an unsupported CRS.
    pub fn from_collection(collection: geojson::FeatureCollection) -> Result<Self, SpatialError> {
        let crs = Crs::from_foreign_members(collection.foreign_members.as_ref())?;

        let parcels = collection
            .features
            .into_iter()
            .enumerate()
            .filter_map(|(landuse_id, feature)| {
                let Some(geometry) = feature.geometry.and_then(polygonal) else {
                    log::warn!("Skipping parcel {landuse_id}: geometry is not a polygon");
                    return None;
                };
                Some(LandParcel {
                    landuse_id,
                    geometry,
                    properties: feature.properties.unwrap_or_default(),
                })
            })
            .collect();

        Ok(Self { crs, parcels })
    }
}

/// Converts a `GeoJSON` geometry into a [`MultiPolygon`] when it is
/// polygonal.
fn polygonal(geometry: geojson::Geometry) -> Option<MultiPolygon<f64>> {
    match geo::Geometry::<f64>::try_from(geometry).ok()? {
        geo::Geometry::MultiPolygon(mp) => Some(mp),
        geo::Geometry::Polygon(p) => Some(MultiPolygon(vec![p])),
        _ => None,
    }
}

/// The outage records intersecting one parcel.
#[derive(Debug, Clone, PartialEq)]
pub struct ParcelOutages<'a> {
    /// Parcel id.
    pub landuse_id: usize,
    /// Intersecting records, in outage-layer order.
    pub records: Vec<&'a OutageRecord>,
}

/// A parcel envelope stored in the R-tree, pointing back into the layer.
struct ParcelEntry {
    index: usize,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for ParcelEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// Left-joins parcels to the outage records that intersect them.
///
/// Returns one entry per parcel in layer order; parcels with no
/// intersecting record get an empty list. Records without geometry never
/// match.
///
/// # Errors
///
/// Returns [`SpatialError::ReferenceSystemMismatch`] if the layers are not
/// in the same reference system. Reproject the outage layer first.
pub fn join<'a>(
    parcels: &ParcelLayer,
    outages: &'a OutageLayer,
) -> Result<Vec<ParcelOutages<'a>>, SpatialError> {
    if parcels.crs != outages.crs {
        return Err(SpatialError::ReferenceSystemMismatch {
            parcels: parcels.crs,
            outages: outages.crs,
        });
    }

    let tree = RTree::bulk_load(
        parcels
            .parcels
            .iter()
            .enumerate()
            .filter_map(|(index, parcel)| {
                envelope_of(&parcel.geometry).map(|envelope| ParcelEntry { index, envelope })
            })
            .collect(),
    );

    let mut joined: Vec<ParcelOutages<'a>> = parcels
        .parcels
        .iter()
        .map(|parcel| ParcelOutages {
            landuse_id: parcel.landuse_id,
            records: Vec::new(),
        })
        .collect();

    let mut matches = 0_usize;
    for record in &outages.records {
        let Some(geometry) = &record.geometry else {
            continue;
        };
        let Some(envelope) = envelope_of(geometry) else {
            continue;
        };

        for entry in tree.locate_in_envelope_intersecting(&envelope) {
            if geometry.intersects(&parcels.parcels[entry.index].geometry) {
                joined[entry.index].records.push(record);
                matches += 1;
            }
        }
    }

    log::info!(
        "Joined {} outage records to {} parcels ({matches} intersections)",
        outages.records.len(),
        parcels.parcels.len()
    );

    Ok(joined)
}

/// Bounding box of a geometry as an R-tree envelope.
fn envelope_of<G>(geometry: &G) -> Option<AABB<[f64; 2]>>
where
    G: BoundingRect<f64, Output = Option<geo::Rect<f64>>>,
{
    geometry
        .bounding_rect()
        .map(|rect| AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]))
}
