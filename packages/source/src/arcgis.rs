//! Paginated `ArcGIS` REST fetcher.
//!
//! Pages through an `ArcGIS` `MapServer` or `FeatureServer` query endpoint
//! with `f=geojson`, yielding one page of features per
//! [`FeatureSource::next_batch`] call.

use async_trait::async_trait;
use geojson::Feature;

use crate::feed::FeedDefinition;
use crate::retry::{self, RetryPolicy};
use crate::{FeatureSource, SourceError};

/// A [`FeatureSource`] backed by an `ArcGIS` query endpoint.
pub struct ArcGisSource {
    client: reqwest::Client,
    retry: RetryPolicy,
    label: String,
    query_url: String,
    where_clause: String,
    page_size: Option<u64>,
    offset: u64,
    exhausted: bool,
}

impl ArcGisSource {
    /// Creates a source for a feed, building its HTTP client from the
    /// feed's client config.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the HTTP client cannot be built.
    pub fn from_feed(feed: &FeedDefinition) -> Result<Self, SourceError> {
        let client = feed.client.build_client()?;
        Ok(Self::new(client, feed))
    }

    /// Creates a source for a feed using an already-built client.
    #[must_use]
    pub fn new(client: reqwest::Client, feed: &FeedDefinition) -> Self {
        Self {
            client,
            retry: feed.client.retry_policy(),
            label: feed.id.clone(),
            query_url: feed.query_url.clone(),
            where_clause: feed.where_clause.clone(),
            page_size: feed.page_size,
            offset: 0,
            exhausted: false,
        }
    }

    /// Query parameters for the page starting at `offset`.
    fn page_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("where", self.where_clause.clone()),
            ("outFields", "*".to_string()),
            ("f", "geojson".to_string()),
            ("resultOffset", self.offset.to_string()),
        ];
        if let Some(page_size) = self.page_size {
            params.push(("resultRecordCount", page_size.to_string()));
        }
        params
    }

    async fn fetch_page(&self) -> Result<serde_json::Value, SourceError> {
        let params = self.page_params();
        retry::send_json(&self.retry, || {
            self.client.get(&self.query_url).query(&params)
        })
        .await
    }
}

#[async_trait]
impl FeatureSource for ArcGisSource {
    fn label(&self) -> &str {
        &self.label
    }

    async fn next_batch(&mut self) -> Option<Vec<Feature>> {
        if self.exhausted {
            return None;
        }

        log::info!("{}: fetching geojson, offset {}", self.label, self.offset);

        let body = match self.fetch_page().await {
            Ok(body) => body,
            Err(e) => {
                log::error!(
                    "{}: all retries failed at offset {}: {e}",
                    self.label,
                    self.offset
                );
                self.exhausted = true;
                return None;
            }
        };

        let page = parse_page(&body, &self.label);
        self.offset += page.raw_count;

        // `exceededTransferLimit` is the canonical "more pages" signal; a
        // short page says nothing because servers cap at their own
        // `maxRecordCount`.
        if !page.exceeded_transfer_limit || page.raw_count == 0 {
            self.exhausted = true;
        }

        if page.raw_count == 0 {
            return None;
        }

        Some(page.features)
    }
}

/// One decoded page of an `f=geojson` query response.
#[derive(Debug)]
struct Page {
    features: Vec<Feature>,
    /// Number of entries in the response's `features` array, including
    /// any that failed to decode. The next offset advances by this much.
    raw_count: u64,
    exceeded_transfer_limit: bool,
}

fn parse_page(body: &serde_json::Value, label: &str) -> Page {
    let raw = body
        .get("features")
        .and_then(serde_json::Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    let mut features = Vec::with_capacity(raw.len());
    for value in raw {
        match serde_json::from_value::<Feature>(value.clone()) {
            Ok(feature) => features.push(feature),
            Err(e) => log::warn!("{label}: skipping undecodable feature: {e}"),
        }
    }

    Page {
        features,
        raw_count: raw.len() as u64,
        exceeded_transfer_limit: body
            .get("exceededTransferLimit")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::HttpClientConfig;

    fn feed(page_size: Option<u64>) -> FeedDefinition {
        FeedDefinition {
            id: "test_feed".to_string(),
            name: "Test".to_string(),
            query_url: "https://example.invalid/query".to_string(),
            where_clause: "OBJECTID>0".to_string(),
            page_size,
            client: HttpClientConfig::default(),
        }
    }

    #[test]
    fn parses_features_and_transfer_flag() {
        let body = serde_json::json!({
            "type": "FeatureCollection",
            "exceededTransferLimit": true,
            "features": [
                {
                    "type": "Feature",
                    "geometry": { "type": "Point", "coordinates": [-83.7, 42.28] },
                    "properties": { "JOB_ID": "DT240315000001", "OFF_DTTM": 0 }
                },
                { "not": "a feature" }
            ]
        });

        let page = parse_page(&body, "test");
        assert_eq!(page.features.len(), 1);
        assert_eq!(page.raw_count, 2);
        assert!(page.exceeded_transfer_limit);
    }

    #[test]
    fn missing_transfer_flag_means_last_page() {
        let body = serde_json::json!({ "features": [] });
        let page = parse_page(&body, "test");
        assert_eq!(page.raw_count, 0);
        assert!(!page.exceeded_transfer_limit);
    }

    #[test]
    fn page_params_follow_offset_and_page_size() {
        let client = reqwest::Client::new();
        let mut source = ArcGisSource::new(client, &feed(Some(500)));
        source.offset = 1000;

        let params = source.page_params();
        assert!(params.contains(&("f", "geojson".to_string())));
        assert!(params.contains(&("where", "OBJECTID>0".to_string())));
        assert!(params.contains(&("resultOffset", "1000".to_string())));
        assert!(params.contains(&("resultRecordCount", "500".to_string())));
    }

    #[test]
    fn page_size_is_optional() {
        let source = ArcGisSource::new(reqwest::Client::new(), &feed(None));
        assert!(
            !source
                .page_params()
                .iter()
                .any(|(k, _)| *k == "resultRecordCount")
        );
    }

    #[tokio::test]
    async fn exhausted_source_yields_nothing() {
        let mut source = ArcGisSource::new(reqwest::Client::new(), &feed(None));
        source.exhausted = true;
        assert!(source.next_batch().await.is_none());
    }
}
