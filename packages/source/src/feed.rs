//! Config-driven outage feed definitions.
//!
//! Feeds are TOML files embedded at compile time from `feeds/`. A feed
//! names an `ArcGIS` query endpoint and the HTTP settings used to page
//! through it. Users can point the CLI at their own TOML file with the
//! same shape.

use std::path::Path;

use serde::Deserialize;

use crate::SourceError;
use crate::client::HttpClientConfig;

/// One outage feed.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FeedDefinition {
    /// Unique identifier (e.g., `"dte_outages"`).
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// `ArcGIS` layer query URL (ending in `/query`).
    pub query_url: String,
    /// `where` clause selecting every outage row.
    #[serde(default = "default_where_clause")]
    pub where_clause: String,
    /// Records per request. `None` lets the server use its own maximum.
    #[serde(default)]
    pub page_size: Option<u64>,
    /// HTTP client settings.
    #[serde(default)]
    pub client: HttpClientConfig,
}

fn default_where_clause() -> String {
    "1=1".to_string()
}

/// Embedded feed definitions: `(file stem, TOML contents)`.
const FEED_TOMLS: &[(&str, &str)] = &[("dte_outages", include_str!("../feeds/dte_outages.toml"))];

/// Feed used when none is requested.
pub const DEFAULT_FEED_ID: &str = "dte_outages";

/// Parses a feed definition from TOML text.
///
/// # Errors
///
/// Returns [`SourceError::Config`] if the TOML is malformed or a required
/// field is missing.
pub fn parse_feed_toml(toml_str: &str) -> Result<FeedDefinition, SourceError> {
    Ok(toml::from_str(toml_str)?)
}

/// Returns all embedded feed definitions.
///
/// # Panics
///
/// Panics if an embedded TOML is malformed. The files ship with the
/// binary, so the tests below catch this before release.
#[must_use]
pub fn all_feeds() -> Vec<FeedDefinition> {
    FEED_TOMLS
        .iter()
        .map(|(name, toml)| {
            parse_feed_toml(toml).unwrap_or_else(|e| panic!("Failed to parse {name}.toml: {e}"))
        })
        .collect()
}

/// Looks up an embedded feed by id.
#[must_use]
pub fn feed_by_id(id: &str) -> Option<FeedDefinition> {
    all_feeds().into_iter().find(|feed| feed.id == id)
}

/// Loads a user-supplied feed definition file.
///
/// # Errors
///
/// Returns [`SourceError`] if the file cannot be read or parsed.
pub fn load_feed_file(path: &Path) -> Result<FeedDefinition, SourceError> {
    let contents = std::fs::read_to_string(path)?;
    parse_feed_toml(&contents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::TlsPolicy;

    #[test]
    fn loads_all_feeds() {
        let feeds = all_feeds();
        assert_eq!(feeds.len(), FEED_TOMLS.len());
    }

    #[test]
    fn feed_ids_are_unique_and_match_file_names() {
        let feeds = all_feeds();
        for (feed, (stem, _)) in feeds.iter().zip(FEED_TOMLS) {
            assert_eq!(feed.id, *stem);
        }
        let mut ids: Vec<&str> = feeds.iter().map(|f| f.id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), feeds.len());
    }

    #[test]
    fn default_feed_exists() {
        let feed = feed_by_id(DEFAULT_FEED_ID).unwrap();
        assert!(feed.query_url.ends_with("/query"));
        assert_eq!(feed.where_clause, "OBJECTID>0");
        assert_eq!(feed.client.max_retries, 5);
    }

    #[test]
    fn minimal_feed_uses_defaults() {
        let feed = parse_feed_toml(
            "id = \"x\"\nname = \"X\"\nquery_url = \"https://example.invalid/query\"",
        )
        .unwrap();
        assert_eq!(feed.where_clause, "1=1");
        assert_eq!(feed.page_size, None);
        assert_eq!(feed.client, HttpClientConfig::default());
    }

    #[test]
    fn rejects_feed_without_url() {
        assert!(matches!(
            parse_feed_toml("id = \"x\"\nname = \"X\""),
            Err(SourceError::Config(_))
        ));
    }

    #[test]
    fn loads_feed_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feed.toml");
        std::fs::write(
            &path,
            "id = \"local\"\nname = \"Local\"\nquery_url = \"https://example.invalid/query\"\n\
             page_size = 250\n[client]\ntls = \"accept_invalid_certs\"\n",
        )
        .unwrap();

        let feed = load_feed_file(&path).unwrap();
        assert_eq!(feed.id, "local");
        assert_eq!(feed.page_size, Some(250));
        assert_eq!(feed.client.tls, TlsPolicy::AcceptInvalidCerts);
    }

    #[test]
    fn unknown_feed_is_none() {
        assert!(feed_by_id("nope").is_none());
    }
}
