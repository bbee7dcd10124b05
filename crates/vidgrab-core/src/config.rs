//! Application configuration management.
//!
//! Handles loading, saving, and managing application-wide settings: where
//! downloads go, default quality and container, subtitles, history policy and
//! extraction engine settings.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::history::default_history_path;
use crate::request::{ContainerFormat, DEFAULT_SUBTITLE_LANGS, QualityRequest};

/// Default socket timeout passed to the extraction engine, in seconds.
pub const DEFAULT_SOCKET_TIMEOUT_SECS: u32 = 30;

/// Default number of transfer retries.
pub const DEFAULT_RETRIES: u32 = 5;

/// Subtitle preferences.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubtitleOptions {
    /// Download subtitles.
    #[serde(default)]
    pub enabled: bool,
    /// Languages to request.
    #[serde(default = "default_subtitle_languages")]
    pub languages: BTreeSet<String>,
    /// Embed subtitles into the video.
    #[serde(default)]
    pub embed: bool,
}

fn default_subtitle_languages() -> BTreeSet<String> {
    DEFAULT_SUBTITLE_LANGS
        .iter()
        .map(ToString::to_string)
        .collect()
}

impl Default for SubtitleOptions {
    fn default() -> Self {
        Self {
            enabled: false,
            languages: default_subtitle_languages(),
            embed: false,
        }
    }
}

/// Which non-successful attempts are written to history.
///
/// Successful downloads are always recorded.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct HistoryPolicy {
    /// Record failed attempts.
    #[serde(default)]
    pub record_failures: bool,
    /// Record cancelled attempts.
    #[serde(default)]
    pub record_cancellations: bool,
}

/// History settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct HistoryConfig {
    /// History file; the application data directory when unset.
    #[serde(default)]
    pub file: Option<PathBuf>,
    /// What to record.
    #[serde(default)]
    pub policy: HistoryPolicy,
}

impl HistoryConfig {
    /// Effective history file path.
    #[must_use]
    pub fn path(&self) -> PathBuf {
        self.file.clone().unwrap_or_else(default_history_path)
    }
}

/// Extraction engine settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EngineConfig {
    /// Explicit yt-dlp binary; discovered when unset.
    #[serde(default)]
    pub ytdlp_path: Option<PathBuf>,
    /// Directory containing ffmpeg; discovered when unset.
    #[serde(default)]
    pub muxer_directory: Option<PathBuf>,
    /// Socket timeout in seconds.
    #[serde(default = "default_socket_timeout")]
    pub socket_timeout_secs: u32,
    /// Transfer retries.
    #[serde(default = "default_retries")]
    pub retries: u32,
}

const fn default_socket_timeout() -> u32 {
    DEFAULT_SOCKET_TIMEOUT_SECS
}

const fn default_retries() -> u32 {
    DEFAULT_RETRIES
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ytdlp_path: None,
            muxer_directory: None,
            socket_timeout_secs: DEFAULT_SOCKET_TIMEOUT_SECS,
            retries: DEFAULT_RETRIES,
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppConfig {
    /// Directory downloads are saved into.
    #[serde(default = "default_download_directory")]
    pub download_directory: PathBuf,
    /// Output container for video downloads.
    #[serde(default)]
    pub container: ContainerFormat,
    /// Default quality.
    #[serde(default)]
    pub quality: QualityRequest,
    /// Subtitle preferences.
    #[serde(default)]
    pub subtitles: SubtitleOptions,
    /// History settings.
    #[serde(default)]
    pub history: HistoryConfig,
    /// Extraction engine settings.
    #[serde(default)]
    pub engine: EngineConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            download_directory: default_download_directory(),
            container: ContainerFormat::default(),
            quality: QualityRequest::default(),
            subtitles: SubtitleOptions::default(),
            history: HistoryConfig::default(),
            engine: EngineConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default location, creating it if missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        Self::load_from(&config_file_path())
    }

    /// Load configuration from `path`, writing defaults there if it is missing.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "Config file not found, using defaults");
            let config = Self::default();
            if let Err(e) = config.save_to(path) {
                warn!("Failed to save default config: {}", e);
            }
            return Ok(config);
        }

        let content = fs::read_to_string(path)
            .map_err(|e| Error::file_system(path, format!("Failed to read config file: {e}")))?;

        let config: Self = serde_json::from_str(&content)
            .map_err(|e| Error::Configuration(format!("Failed to parse config file: {e}")))?;

        info!("Loaded config from {}", path.display());
        debug!(
            "Download directory: {}",
            config.download_directory.display()
        );

        Ok(config)
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<()> {
        self.save_to(&config_file_path())
    }

    /// Save configuration to `path`.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent).map_err(|e| {
                Error::file_system(parent, format!("Failed to create config directory: {e}"))
            })?;
        }

        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)
            .map_err(|e| Error::file_system(path, format!("Failed to write config file: {e}")))?;

        info!("Saved config to {}", path.display());
        Ok(())
    }

    /// Update the download directory after validating it.
    pub fn set_download_directory(&mut self, path: PathBuf) -> Result<()> {
        validate_download_directory(&path)?;
        self.download_directory = path;
        info!(
            "Updated download directory to: {}",
            self.download_directory.display()
        );
        Ok(())
    }

    /// Get the path to the config file.
    #[must_use]
    pub fn config_file_path() -> PathBuf {
        config_file_path()
    }
}

/// Get the default download directory.
#[must_use]
pub fn default_download_directory() -> PathBuf {
    dirs::download_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("vidgrab")
}

fn config_file_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| dirs::data_local_dir().unwrap_or_else(|| PathBuf::from(".")))
        .join("vidgrab")
        .join("config.json")
}

/// Validate that a directory can receive downloads, creating it if needed.
pub fn validate_download_directory(path: &Path) -> Result<()> {
    if !path.is_absolute() {
        return Err(Error::Configuration(
            "Download directory must be an absolute path".to_string(),
        ));
    }

    if path.exists() {
        if !path.is_dir() {
            return Err(Error::Configuration(format!(
                "Path exists but is not a directory: {}",
                path.display()
            )));
        }

        let test_file = path.join(".vidgrab_write_test");
        match fs::write(&test_file, "test") {
            Ok(()) => {
                let _ = fs::remove_file(&test_file);
            }
            Err(e) => {
                return Err(Error::Configuration(format!(
                    "Directory is not writable: {} ({})",
                    path.display(),
                    e
                )));
            }
        }
    } else {
        fs::create_dir_all(path).map_err(|e| {
            Error::Configuration(format!("Cannot create directory {}: {}", path.display(), e))
        })?;
    }

    Ok(())
}

/// Configuration manager that handles loading and caching config.
#[derive(Debug)]
pub struct ConfigManager {
    path: PathBuf,
    config: AppConfig,
}

impl ConfigManager {
    /// Create a manager backed by the default config file.
    pub fn new() -> Result<Self> {
        Self::with_path(config_file_path())
    }

    /// Create a manager backed by `path`.
    pub fn with_path(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let config = AppConfig::load_from(&path)?;
        Ok(Self { path, config })
    }

    /// Get a reference to the current configuration.
    #[must_use]
    pub const fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Config file backing this manager.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the configuration and save it.
    pub fn update(&mut self, config: AppConfig) -> Result<()> {
        validate_download_directory(&config.download_directory)?;
        self.config = config;
        self.config.save_to(&self.path)?;
        Ok(())
    }

    /// Update just the download directory.
    pub fn set_download_directory(&mut self, path: PathBuf) -> Result<()> {
        self.config.set_download_directory(path)?;
        self.config.save_to(&self.path)?;
        Ok(())
    }

    /// Reset to default configuration.
    pub fn reset(&mut self) -> Result<()> {
        self.config = AppConfig::default();
        self.config.save_to(&self.path)?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert!(!config.download_directory.as_os_str().is_empty());
        assert_eq!(config.container, ContainerFormat::Mp4);
        assert_eq!(config.quality, QualityRequest::BestAv);
        assert!(!config.history.policy.record_failures);
        assert!(!config.history.policy.record_cancellations);
        assert_eq!(config.engine.socket_timeout_secs, 30);
        assert_eq!(config.engine.retries, 5);
    }

    #[test]
    fn test_config_serialization() {
        let config = AppConfig {
            download_directory: PathBuf::from("/test/path"),
            quality: QualityRequest::CappedHeight(720),
            container: ContainerFormat::Mkv,
            ..Default::default()
        };

        let json = serde_json::to_string(&config).expect("Should serialize");
        assert!(json.contains("\"720p\""));
        assert!(json.contains("\"mkv\""));
        let deserialized: AppConfig = serde_json::from_str(&json).expect("Should deserialize");
        assert_eq!(config, deserialized);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let json = r#"{"download_directory": "/data/videos", "quality": "audio"}"#;
        let config: AppConfig = serde_json::from_str(json).expect("Should deserialize");
        assert_eq!(config.download_directory, PathBuf::from("/data/videos"));
        assert_eq!(config.quality, QualityRequest::BestAudioOnly);
        assert_eq!(config.subtitles, SubtitleOptions::default());
        assert_eq!(config.engine, EngineConfig::default());
    }

    #[test]
    fn test_load_from_missing_writes_defaults() {
        let temp_dir = TempDir::new().expect("Should create temp dir");
        let path = temp_dir.path().join("nested").join("config.json");

        let config = AppConfig::load_from(&path).expect("Should load defaults");
        assert_eq!(config, AppConfig::default());
        assert!(path.exists());
    }

    #[test]
    fn test_load_from_invalid_json() {
        let temp_dir = TempDir::new().expect("Should create temp dir");
        let path = temp_dir.path().join("config.json");
        fs::write(&path, "not json").unwrap();

        let err = AppConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_save_and_reload() {
        let temp_dir = TempDir::new().expect("Should create temp dir");
        let path = temp_dir.path().join("config.json");

        let mut config = AppConfig::default();
        config.subtitles.enabled = true;
        config.history.policy.record_failures = true;
        config.save_to(&path).unwrap();

        assert_eq!(AppConfig::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_validate_download_directory_success() {
        let temp_dir = TempDir::new().expect("Should create temp dir");
        assert!(validate_download_directory(temp_dir.path()).is_ok());
    }

    #[test]
    fn test_validate_download_directory_creates_missing() {
        let temp_dir = TempDir::new().expect("Should create temp dir");
        let new_dir = temp_dir.path().join("new").join("dir");
        assert!(validate_download_directory(&new_dir).is_ok());
        assert!(new_dir.is_dir());
    }

    #[test]
    fn test_validate_download_directory_relative_path() {
        let result = validate_download_directory(Path::new("relative/path"));
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[test]
    fn test_validate_download_directory_file_path() {
        let temp_dir = TempDir::new().expect("Should create temp dir");
        let file = temp_dir.path().join("file.txt");
        fs::write(&file, "x").unwrap();
        assert!(validate_download_directory(&file).is_err());
    }

    #[test]
    fn test_config_manager_update_and_reset() {
        let temp_dir = TempDir::new().expect("Should create temp dir");
        let path = temp_dir.path().join("config.json");
        let mut manager = ConfigManager::with_path(&path).unwrap();

        let mut config = manager.config().clone();
        config.download_directory = temp_dir.path().join("downloads");
        config.quality = QualityRequest::CappedHeight(480);
        manager.update(config.clone()).unwrap();

        assert_eq!(manager.config(), &config);
        assert_eq!(AppConfig::load_from(&path).unwrap(), config);

        manager.reset().unwrap();
        assert_eq!(manager.config(), &AppConfig::default());
    }

    #[test]
    fn test_history_config_path() {
        let config = HistoryConfig {
            file: Some(PathBuf::from("/tmp/h.json")),
            ..HistoryConfig::default()
        };
        assert_eq!(config.path(), PathBuf::from("/tmp/h.json"));
        assert!(HistoryConfig::default().path().ends_with("download_history.json"));
    }
}
