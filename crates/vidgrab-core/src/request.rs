//! Download requests and the user-facing quality choice.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::format::{self, FormatExpression};
use crate::platform::{self, PlatformTag};
use crate::util::sanitize_filename;

/// Output template used when no file name is given: the media title.
pub const TITLE_TEMPLATE: &str = "%(title)s.%(ext)s";

/// Default subtitle languages.
pub const DEFAULT_SUBTITLE_LANGS: [&str; 2] = ["zh", "en"];

/// The quality a user asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum QualityRequest {
    /// Best video with best audio.
    #[default]
    BestAv,
    /// Best audio only, extracted to mp3.
    BestAudioOnly,
    /// Best video no taller than the given height, with best audio.
    CappedHeight(u32),
}

impl QualityRequest {
    /// Short label (`best`, `audio`, `720p`).
    #[must_use]
    pub fn label(self) -> String {
        match self {
            Self::BestAv => "best".to_string(),
            Self::BestAudioOnly => "audio".to_string(),
            Self::CappedHeight(height) => format!("{height}p"),
        }
    }

    /// Whether the request downloads audio only.
    #[must_use]
    pub const fn is_audio_only(self) -> bool {
        matches!(self, Self::BestAudioOnly)
    }

    /// Height limit, if any.
    #[must_use]
    pub const fn max_height(self) -> Option<u32> {
        match self {
            Self::CappedHeight(height) => Some(height),
            _ => None,
        }
    }
}

impl std::fmt::Display for QualityRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.label())
    }
}

impl FromStr for QualityRequest {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let label = s.trim().to_lowercase();
        match label.as_str() {
            "best" | "bestvideo" => Ok(Self::BestAv),
            "audio" | "bestaudio" | "audio-only" | "mp3" => Ok(Self::BestAudioOnly),
            other => {
                let digits = other.strip_suffix('p').unwrap_or(other);
                match digits.parse::<u32>() {
                    Ok(height) if height > 0 => Ok(Self::CappedHeight(height)),
                    _ => Err(Error::InvalidQuality(s.to_string())),
                }
            }
        }
    }
}

impl TryFrom<String> for QualityRequest {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<QualityRequest> for String {
    fn from(value: QualityRequest) -> Self {
        value.label()
    }
}

/// Output container for video downloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerFormat {
    /// MPEG-4.
    #[default]
    Mp4,
    /// Matroska.
    Mkv,
    /// WebM.
    Webm,
    /// AVI.
    Avi,
    /// QuickTime.
    Mov,
}

impl ContainerFormat {
    /// All supported containers.
    pub const ALL: [Self; 5] = [Self::Mp4, Self::Mkv, Self::Webm, Self::Avi, Self::Mov];

    /// File extension / engine name of the container.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Mp4 => "mp4",
            Self::Mkv => "mkv",
            Self::Webm => "webm",
            Self::Avi => "avi",
            Self::Mov => "mov",
        }
    }
}

impl std::fmt::Display for ContainerFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContainerFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|container| container.as_str() == lower)
            .ok_or_else(|| Error::Configuration(format!("Unsupported container format: {s}")))
    }
}

/// Everything the extraction engine needs to fetch one media item.
///
/// Built once per session and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadRequest {
    /// Source URL.
    pub url: String,
    /// Detected platform dialect.
    pub platform: PlatformTag,
    /// Requested quality.
    pub quality: QualityRequest,
    /// Format-selection expression derived from platform and quality.
    pub format: FormatExpression,
    /// Output path template handed to the engine.
    pub destination_template: String,
    /// Download subtitles alongside the media.
    pub want_subtitles: bool,
    /// Subtitle languages to request.
    pub subtitle_langs: BTreeSet<String>,
    /// Embed subtitles into the output container.
    pub embed_subtitles: bool,
    /// Output container for video downloads.
    pub container: ContainerFormat,
}

impl DownloadRequest {
    /// Create a request that saves into `output_dir`, named after the media title.
    #[must_use]
    pub fn new(url: impl Into<String>, quality: QualityRequest, output_dir: &Path) -> Self {
        let url = url.into();
        let platform = platform::detect(&url);

        Self {
            format: format::select(platform, quality),
            destination_template: output_dir.join(TITLE_TEMPLATE).to_string_lossy().into_owned(),
            url,
            platform,
            quality,
            want_subtitles: false,
            subtitle_langs: DEFAULT_SUBTITLE_LANGS
                .iter()
                .map(ToString::to_string)
                .collect(),
            embed_subtitles: false,
            container: ContainerFormat::default(),
        }
    }

    /// Use a fixed file name (sanitized) instead of the media title.
    ///
    /// Falls back to the title template when the name sanitizes to nothing.
    #[must_use]
    pub fn with_filename(mut self, output_dir: &Path, name: &str) -> Self {
        let stem = sanitize_filename(name);
        if !stem.is_empty() {
            let file = format!("{}.%(ext)s", stem.replace('%', "%%"));
            self.destination_template = output_dir.join(file).to_string_lossy().into_owned();
        }
        self
    }

    /// Request subtitles in the given languages.
    #[must_use]
    pub fn with_subtitles<I, S>(mut self, languages: I, embed: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let languages: BTreeSet<String> = languages.into_iter().map(Into::into).collect();
        if !languages.is_empty() {
            self.subtitle_langs = languages;
        }
        self.want_subtitles = true;
        self.embed_subtitles = embed;
        self
    }

    /// Set the output container.
    #[must_use]
    pub const fn with_container(mut self, container: ContainerFormat) -> Self {
        self.container = container;
        self
    }

    /// Directory part of the destination template.
    #[must_use]
    pub fn output_dir(&self) -> PathBuf {
        Path::new(&self.destination_template)
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_quality_parsing() {
        assert_eq!("best".parse::<QualityRequest>().unwrap(), QualityRequest::BestAv);
        assert_eq!(
            "Audio".parse::<QualityRequest>().unwrap(),
            QualityRequest::BestAudioOnly
        );
        assert_eq!(
            "bestaudio".parse::<QualityRequest>().unwrap(),
            QualityRequest::BestAudioOnly
        );
        assert_eq!(
            "720p".parse::<QualityRequest>().unwrap(),
            QualityRequest::CappedHeight(720)
        );
        assert_eq!(
            " 1080 ".parse::<QualityRequest>().unwrap(),
            QualityRequest::CappedHeight(1080)
        );
    }

    #[test]
    fn test_quality_parsing_rejects_garbage() {
        assert!("".parse::<QualityRequest>().is_err());
        assert!("0p".parse::<QualityRequest>().is_err());
        assert!("-720".parse::<QualityRequest>().is_err());
        assert!("ultra".parse::<QualityRequest>().is_err());
    }

    #[test]
    fn test_quality_display_round_trip() {
        for quality in [
            QualityRequest::BestAv,
            QualityRequest::BestAudioOnly,
            QualityRequest::CappedHeight(360),
        ] {
            assert_eq!(quality.to_string().parse::<QualityRequest>().unwrap(), quality);
        }
    }

    #[test]
    fn test_quality_serde_uses_labels() {
        let json = serde_json::to_string(&QualityRequest::CappedHeight(480)).unwrap();
        assert_eq!(json, "\"480p\"");
        let parsed: QualityRequest = serde_json::from_str("\"audio\"").unwrap();
        assert_eq!(parsed, QualityRequest::BestAudioOnly);
        assert!(serde_json::from_str::<QualityRequest>("\"huge\"").is_err());
    }

    #[test]
    fn test_container_parsing() {
        assert_eq!("MKV".parse::<ContainerFormat>().unwrap(), ContainerFormat::Mkv);
        assert!("flv".parse::<ContainerFormat>().is_err());
        assert_eq!(ContainerFormat::default(), ContainerFormat::Mp4);
    }

    #[test]
    fn test_new_request_selects_format_from_platform() {
        let request = DownloadRequest::new(
            "https://www.bilibili.com/video/BV1xx",
            QualityRequest::CappedHeight(720),
            Path::new("/downloads"),
        );

        assert_eq!(request.platform, PlatformTag::Bilibili);
        assert_eq!(
            request.format.as_str(),
            "bv*[height<=720]+ba*/b[height<=720]/b*[height<=720]"
        );
        assert!(request.destination_template.ends_with(TITLE_TEMPLATE));
        assert_eq!(request.output_dir(), PathBuf::from("/downloads"));
        assert!(!request.want_subtitles);
        assert_eq!(request.container, ContainerFormat::Mp4);
    }

    #[test]
    fn test_with_filename_sanitizes() {
        let request = DownloadRequest::new(
            "https://youtu.be/abc",
            QualityRequest::BestAv,
            Path::new("/downloads"),
        )
        .with_filename(Path::new("/downloads"), "a/b: 100%");

        assert!(request.destination_template.ends_with("a_b_ 100%%.%(ext)s"));
    }

    #[test]
    fn test_with_filename_empty_keeps_title_template() {
        let request = DownloadRequest::new(
            "https://youtu.be/abc",
            QualityRequest::BestAv,
            Path::new("/downloads"),
        )
        .with_filename(Path::new("/downloads"), "   ");

        assert!(request.destination_template.ends_with(TITLE_TEMPLATE));
    }

    #[test]
    fn test_with_subtitles() {
        let request = DownloadRequest::new(
            "https://youtu.be/abc",
            QualityRequest::BestAv,
            Path::new("/downloads"),
        );
        assert_eq!(
            request.subtitle_langs.iter().cloned().collect::<Vec<_>>(),
            vec!["en".to_string(), "zh".to_string()]
        );

        let request = request.with_subtitles(["fr"], true);
        assert!(request.want_subtitles);
        assert!(request.embed_subtitles);
        assert_eq!(request.subtitle_langs.len(), 1);
        assert!(request.subtitle_langs.contains("fr"));
    }
}
