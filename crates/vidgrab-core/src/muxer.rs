//! Muxer (ffmpeg) discovery.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::util::{executable_name, find_executable};

/// Name of the muxer binary.
pub const MUXER_TOOL: &str = "ffmpeg";

/// Finds the directory containing the muxer binary.
///
/// Lookup order: explicit override, bundled directory, `PATH`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MuxerLocator {
    bundled_dir: Option<PathBuf>,
    override_dir: Option<PathBuf>,
}

impl Default for MuxerLocator {
    fn default() -> Self {
        Self::new(default_bundled_dir())
    }
}

impl MuxerLocator {
    /// Create a locator that checks `bundled_dir` before `PATH`.
    #[must_use]
    pub const fn new(bundled_dir: Option<PathBuf>) -> Self {
        Self {
            bundled_dir,
            override_dir: None,
        }
    }

    /// Check `dir` first.
    #[must_use]
    pub fn with_override(mut self, dir: impl Into<PathBuf>) -> Self {
        self.override_dir = Some(dir.into());
        self
    }

    /// Directory containing the muxer, if found.
    #[must_use]
    pub fn locate(&self) -> Option<PathBuf> {
        let binary = executable_name(MUXER_TOOL);

        for dir in [&self.override_dir, &self.bundled_dir].into_iter().flatten() {
            if contains_file(dir, &binary) {
                debug!(dir = %dir.display(), "Found bundled muxer");
                return Some(dir.clone());
            }
        }

        let found =
            find_executable(MUXER_TOOL).and_then(|path| path.parent().map(Path::to_path_buf));
        if found.is_none() {
            debug!("Muxer not found in bundled directory or PATH");
        }
        found
    }

    /// Whether the muxer can be found.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.locate().is_some()
    }
}

/// `<data dir>/vidgrab/ffmpeg/bin`.
#[must_use]
pub fn default_bundled_dir() -> Option<PathBuf> {
    dirs::data_local_dir().map(|dir| dir.join("vidgrab").join("ffmpeg").join("bin"))
}

fn contains_file(dir: &Path, name: &str) -> bool {
    dir.join(name).metadata().is_ok_and(|meta| meta.is_file())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_locate_prefers_override() {
        let temp = TempDir::new().unwrap();
        let bundled = temp.path().join("bundled");
        let custom = temp.path().join("custom");
        std::fs::create_dir_all(&bundled).unwrap();
        std::fs::create_dir_all(&custom).unwrap();
        std::fs::write(bundled.join(executable_name(MUXER_TOOL)), b"").unwrap();
        std::fs::write(custom.join(executable_name(MUXER_TOOL)), b"").unwrap();

        let locator = MuxerLocator::new(Some(bundled.clone()));
        assert_eq!(locator.locate(), Some(bundled));

        let locator = locator.with_override(&custom);
        assert_eq!(locator.locate(), Some(custom));
    }

    #[test]
    fn test_empty_bundled_dir_is_skipped() {
        let temp = TempDir::new().unwrap();
        let locator = MuxerLocator::new(Some(temp.path().to_path_buf()));
        // Whatever PATH yields, the empty bundled directory is never returned.
        assert_ne!(locator.locate(), Some(temp.path().to_path_buf()));
    }

    #[test]
    fn test_default_bundled_dir_layout() {
        if let Some(dir) = default_bundled_dir() {
            assert!(dir.ends_with("vidgrab/ffmpeg/bin"));
        }
    }
}
