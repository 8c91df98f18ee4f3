#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Date-sharded on-disk store for outage features.
//!
//! Features live in `root/YY/MM/DD/jobs.json`, one JSON object per shard
//! mapping job id to the full `GeoJSON` feature. The shard is chosen from
//! the date encoded in the job id, so a job that is re-fetched on a later
//! day overwrites its earlier record instead of duplicating it.
//!
//! Shard files are written with every object's keys sorted and two-space
//! indentation, so re-running a merge with the same input produces a
//! byte-identical file and diffs between runs stay readable.

pub mod paths;

use std::collections::BTreeMap;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use geojson::Feature;
use outage_map_outage_models::{ShardKey, ShardKeyError, job_id_of, shard_key_of};
use serde_json::Value;

/// File name of every shard.
pub const SHARD_FILE_NAME: &str = "jobs.json";

/// Errors that can occur reading or writing the store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Filesystem operation failed.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// File or directory involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Directory traversal failed.
    #[error("Failed to walk store: {0}")]
    Walk(#[from] walkdir::Error),

    /// A shard file is not valid JSON.
    #[error("Invalid JSON in {}: {source}", path.display())]
    Json {
        /// Shard file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },

    /// A shard file parsed but is not a JSON object.
    #[error("{} is not a JSON object", path.display())]
    NotAnObject {
        /// Shard file.
        path: PathBuf,
    },

    /// A shard entry is not a `GeoJSON` feature.
    #[error("Entry {job_id:?} in {} is not a GeoJSON feature: {source}", path.display())]
    InvalidEntry {
        /// Shard file.
        path: PathBuf,
        /// Key of the bad entry.
        job_id: String,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },

    /// A feature handed to [`ShardedStore::write`] has no job id.
    #[error("Cannot store a feature without a job id")]
    MissingJobId,

    /// A feature's job id does not map to a shard.
    #[error(transparent)]
    InvalidJobId(#[from] ShardKeyError),

    /// A feature could not be serialized.
    #[error("Failed to serialize feature {job_id:?}: {source}")]
    Serialize {
        /// Job whose feature failed.
        job_id: String,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },
}

/// What a [`ShardedStore::write`] call touched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteSummary {
    /// Shard files rewritten.
    pub shards_written: usize,
    /// Distinct job ids merged in.
    pub records_written: usize,
}

/// A feature whose job id and shard have already been resolved.
#[derive(Debug, Clone, Copy)]
pub struct ShardEntry<'a> {
    /// Shard the job belongs to.
    pub key: &'a ShardKey,
    /// Job identifier, used as the key inside the shard.
    pub job_id: &'a str,
    /// The feature to store.
    pub feature: &'a Feature,
}

/// One shard file found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardInfo {
    /// Shard key derived from the file's directory.
    pub key: ShardKey,
    /// Path to the shard file.
    pub path: PathBuf,
    /// Number of jobs stored in it.
    pub records: usize,
}

/// Outage features partitioned by job date.
///
/// Single-writer: nothing guards against two processes merging into the
/// same shard at once.
#[derive(Debug, Clone)]
pub struct ShardedStore {
    root: PathBuf,
}

impl ShardedStore {
    /// Opens a store rooted at `root`. Nothing is created until the first
    /// write.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The store's root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the shard file for `key`.
    #[must_use]
    pub fn shard_path(&self, key: &ShardKey) -> PathBuf {
        self.root
            .join(key.year())
            .join(key.month())
            .join(key.day())
            .join(SHARD_FILE_NAME)
    }

    /// Merges features into their shards, last write wins per job id.
    ///
    /// Features are grouped by shard; each touched shard is loaded, the new
    /// features are laid over it by job id, and the whole mapping is
    /// written back through a temporary file that replaces the shard in a
    /// single rename. Jobs already in a shard but absent from `features`
    /// are kept. When the same job id appears twice in `features`, the
    /// later one wins.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if any feature lacks a valid job id (checked
    /// before any shard is touched) or a shard cannot be read or written.
    pub fn write(&self, features: &[Feature]) -> Result<WriteSummary, StoreError> {
        let keyed = features
            .iter()
            .map(|feature| {
                let job_id = job_id_of(feature).ok_or(StoreError::MissingJobId)?;
                Ok((shard_key_of(job_id)?, job_id, feature))
            })
            .collect::<Result<Vec<_>, StoreError>>()?;

        self.write_entries(keyed.iter().map(|(key, job_id, feature)| ShardEntry {
            key,
            job_id,
            feature,
        }))
    }

    /// Merges features whose shard keys the caller already resolved.
    ///
    /// Behaves like [`Self::write`] without re-deriving job ids or shard
    /// keys. Each entry's `key` must be `shard_key_of(job_id)`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if a feature cannot be serialized (checked
    /// before any shard is touched) or a shard cannot be read or written.
    pub fn write_entries<'a>(
        &self,
        entries: impl IntoIterator<Item = ShardEntry<'a>>,
    ) -> Result<WriteSummary, StoreError> {
        let mut shards: BTreeMap<ShardKey, BTreeMap<String, Value>> = BTreeMap::new();

        for entry in entries {
            debug_assert_eq!(shard_key_of(entry.job_id).as_ref(), Ok(entry.key));
            let value =
                serde_json::to_value(entry.feature).map_err(|source| StoreError::Serialize {
                    job_id: entry.job_id.to_string(),
                    source,
                })?;
            shards
                .entry(entry.key.clone())
                .or_default()
                .insert(entry.job_id.to_string(), value);
        }

        let mut summary = WriteSummary::default();

        for (key, incoming) in shards {
            let path = self.shard_path(&key);
            let mut merged = read_shard_map(&path)?;
            let before = merged.len();

            summary.records_written += incoming.len();
            merged.extend(incoming);

            write_shard_map(&path, &merged)?;
            summary.shards_written += 1;

            log::debug!(
                "Merged shard {key}: {before} -> {} jobs ({})",
                merged.len(),
                path.display()
            );
        }

        Ok(summary)
    }

    /// Loads one shard's raw mapping. A missing shard is empty.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the shard exists but cannot be read or
    /// parsed.
    pub fn load_shard(&self, key: &ShardKey) -> Result<BTreeMap<String, Value>, StoreError> {
        read_shard_map(&self.shard_path(key))
    }

    /// Reads every stored feature across all shards.
    ///
    /// Shards are visited in sorted directory order and jobs in key order
    /// within a shard. A missing root yields no features.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if a shard cannot be read or holds an entry
    /// that is not a `GeoJSON` feature.
    pub fn read_all(&self) -> Result<Vec<Feature>, StoreError> {
        let mut features = Vec::new();

        for (_, path) in self.shard_files()? {
            for (job_id, value) in read_shard_map(&path)? {
                let feature = serde_json::from_value::<Feature>(value).map_err(|source| {
                    StoreError::InvalidEntry {
                        path: path.clone(),
                        job_id,
                        source,
                    }
                })?;
                features.push(feature);
            }
        }

        log::info!(
            "Loaded {} outage features from {}",
            features.len(),
            self.root.display()
        );
        Ok(features)
    }

    /// Lists every shard with its record count.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if a shard cannot be read.
    pub fn list_shards(&self) -> Result<Vec<ShardInfo>, StoreError> {
        self.shard_files()?
            .into_iter()
            .map(|(key, path)| {
                let records = read_shard_map(&path)?.len();
                Ok(ShardInfo { key, path, records })
            })
            .collect()
    }

    /// Finds `root/YY/MM/DD/jobs.json` files in sorted order. Files named
    /// like a shard but sitting elsewhere are skipped with a warning.
    fn shard_files(&self) -> Result<Vec<(ShardKey, PathBuf)>, StoreError> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        let walker = walkdir::WalkDir::new(&self.root)
            .min_depth(1)
            .sort_by_file_name();

        for entry in walker {
            let entry = entry?;
            if !entry.file_type().is_file() || entry.file_name() != SHARD_FILE_NAME {
                continue;
            }

            match shard_key_from_path(&self.root, entry.path()) {
                Some(key) => files.push((key, entry.into_path())),
                None => log::warn!(
                    "Ignoring {} outside the YY/MM/DD shard layout",
                    entry.path().display()
                ),
            }
        }

        Ok(files)
    }
}

/// Recovers the shard key from `root/YY/MM/DD/jobs.json`.
fn shard_key_from_path(root: &Path, path: &Path) -> Option<ShardKey> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<&str> = relative
        .parent()?
        .components()
        .map(|c| c.as_os_str().to_str())
        .collect::<Option<_>>()?;

    match parts.as_slice() {
        [year, month, day] => ShardKey::from_parts(year, month, day).ok(),
        _ => None,
    }
}

fn read_shard_map(path: &Path) -> Result<BTreeMap<String, Value>, StoreError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
        Err(source) => {
            return Err(StoreError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    let value: Value = serde_json::from_str(&contents).map_err(|source| StoreError::Json {
        path: path.to_path_buf(),
        source,
    })?;

    match value {
        Value::Object(map) => Ok(map.into_iter().collect()),
        _ => Err(StoreError::NotAnObject {
            path: path.to_path_buf(),
        }),
    }
}

/// Writes a shard through a sibling `.tmp` file and renames it into
/// place, so a failed write leaves the previous shard intact.
fn write_shard_map(path: &Path, map: &BTreeMap<String, Value>) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        paths::ensure_dir(parent).map_err(io_error(parent))?;
    }

    let canonical = Value::Object(
        map.iter()
            .map(|(k, v)| (k.clone(), sorted_keys(v.clone())))
            .collect(),
    );
    let json = serde_json::to_string_pretty(&canonical).map_err(|source| StoreError::Json {
        path: path.to_path_buf(),
        source,
    })?;

    let temp_path = path.with_extension("json.tmp");
    let mut file = std::fs::File::create(&temp_path).map_err(io_error(&temp_path))?;
    file.write_all(json.as_bytes())
        .and_then(|()| file.sync_all())
        .map_err(io_error(&temp_path))?;
    drop(file);

    std::fs::rename(&temp_path, path).map_err(io_error(path))
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError {
    let path = path.to_path_buf();
    move |source| StoreError::Io { path, source }
}

/// Rebuilds every nested object with its keys in sorted order.
fn sorted_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<String, Value> =
                map.into_iter().map(|(k, v)| (k, sorted_keys(v))).collect();
            Value::Object(sorted.into_iter().collect())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sorted_keys).collect()),
        other => other,
    }
}
