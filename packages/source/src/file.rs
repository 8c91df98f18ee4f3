//! Local `GeoJSON` file source.
//!
//! Replays a previously downloaded query response (or any `GeoJSON`
//! `FeatureCollection`) as a single batch.

use std::path::Path;

use async_trait::async_trait;
use geojson::{Feature, GeoJson};

use crate::{FeatureSource, SourceError};

/// A [`FeatureSource`] that yields the features of one file, once.
pub struct FileSource {
    label: String,
    features: Option<Vec<Feature>>,
}

impl FileSource {
    /// Reads a `GeoJSON` file. A `FeatureCollection` yields all of its
    /// features; a lone `Feature` yields itself.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the file cannot be read or is not a
    /// `FeatureCollection` or `Feature`.
    pub fn open(path: &Path) -> Result<Self, SourceError> {
        let contents = std::fs::read_to_string(path)?;
        let features = match contents.parse::<GeoJson>()? {
            GeoJson::FeatureCollection(collection) => collection.features,
            GeoJson::Feature(feature) => vec![feature],
            GeoJson::Geometry(_) => {
                return Err(SourceError::NotFeatures {
                    path: path.to_path_buf(),
                });
            }
        };

        log::info!("Read {} features from {}", features.len(), path.display());

        Ok(Self {
            label: path.display().to_string(),
            features: Some(features),
        })
    }
}

#[async_trait]
impl FeatureSource for FileSource {
    fn label(&self) -> &str {
        &self.label
    }

    async fn next_batch(&mut self) -> Option<Vec<Feature>> {
        self.features.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn yields_collection_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page.geojson");
        std::fs::write(
            &path,
            r#"{"type":"FeatureCollection","features":[
                {"type":"Feature","geometry":null,"properties":{"JOB_ID":"DT240315000001"}},
                {"type":"Feature","geometry":null,"properties":{"JOB_ID":"DT240315000002"}}
            ]}"#,
        )
        .unwrap();

        let mut source = FileSource::open(&path).unwrap();
        assert_eq!(source.next_batch().await.map(|b| b.len()), Some(2));
        assert!(source.next_batch().await.is_none());
    }

    #[test]
    fn rejects_bare_geometry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("point.geojson");
        std::fs::write(&path, r#"{"type":"Point","coordinates":[0.0,0.0]}"#).unwrap();

        assert!(matches!(
            FileSource::open(&path),
            Err(SourceError::NotFeatures { path: p }) if p == path
        ));
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            FileSource::open(&dir.path().join("missing.geojson")),
            Err(SourceError::Io(_))
        ));
    }
}
