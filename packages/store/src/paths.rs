#![allow(clippy::module_name_repetitions)]
//! Default file locations.
//!
//! Everything lives under the project root's `data/` directory unless the
//! CLI is pointed elsewhere.

use std::path::{Path, PathBuf};

/// Returns the workspace root directory.
///
/// Resolved at compile time from `CARGO_MANIFEST_DIR`.
///
/// # Panics
///
/// Panics if the project root cannot be resolved.
#[must_use]
pub fn project_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .ancestors()
        .nth(2)
        .expect("Failed to find project root from CARGO_MANIFEST_DIR")
        .to_path_buf()
}

/// Returns the `data/` directory, the default shard store root.
#[must_use]
pub fn data_dir() -> PathBuf {
    project_root().join("data")
}

/// Returns the default land-use parcel layer.
#[must_use]
pub fn landuse_path() -> PathBuf {
    data_dir().join("landuse.geojson")
}

/// Returns the `data/generated/` directory for analysis outputs.
#[must_use]
pub fn generated_dir() -> PathBuf {
    data_dir().join("generated")
}

/// Returns the default per-parcel summary output.
#[must_use]
pub fn summary_path() -> PathBuf {
    generated_dir().join("summary.geojson")
}

/// Ensures a directory exists, creating it if necessary.
///
/// # Errors
///
/// Returns an I/O error if the directory cannot be created.
pub fn ensure_dir(path: &Path) -> std::io::Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_live_under_data() {
        let data = data_dir();
        assert!(landuse_path().starts_with(&data));
        assert!(summary_path().starts_with(generated_dir()));
        assert!(generated_dir().starts_with(&data));
    }

    #[test]
    fn ensure_dir_creates_nested_directories() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b/c");
        ensure_dir(&nested).unwrap();
        ensure_dir(&nested).unwrap();
        assert!(nested.is_dir());
    }
}
