//! Resolved media metadata and the quality choices offered for it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::request::QualityRequest;

/// One stream (format) offered by the source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamInfo {
    /// Engine-specific format identifier.
    pub format_id: String,
    /// File extension of the stream.
    pub ext: String,
    /// Frame width.
    pub width: Option<u32>,
    /// Frame height.
    pub height: Option<u32>,
    /// Frames per second.
    pub fps: Option<f64>,
    /// Video codec, `none` for audio-only streams.
    pub vcodec: Option<String>,
    /// Audio codec, `none` for video-only streams.
    pub acodec: Option<String>,
    /// Exact size in bytes.
    pub filesize: Option<u64>,
    /// Approximate size in bytes.
    pub filesize_approx: Option<u64>,
}

impl StreamInfo {
    /// Whether the stream carries video.
    #[must_use]
    pub fn has_video(&self) -> bool {
        self.height.is_some_and(|h| h > 0) && !is_none_codec(self.vcodec.as_deref())
    }

    /// Whether the stream carries audio.
    #[must_use]
    pub fn has_audio(&self) -> bool {
        !is_none_codec(self.acodec.as_deref())
    }

    /// Exact size, falling back to the approximate size.
    #[must_use]
    pub fn size(&self) -> Option<u64> {
        self.filesize.or(self.filesize_approx)
    }
}

fn is_none_codec(codec: Option<&str>) -> bool {
    codec.is_some_and(|c| c.eq_ignore_ascii_case("none"))
}

/// Metadata of a resolved media URL.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    /// Media title.
    pub title: String,
    /// Duration in seconds.
    pub duration_seconds: Option<u64>,
    /// Thumbnail URL.
    pub thumbnail_url: Option<String>,
    /// Uploader / channel name.
    pub uploader: Option<String>,
    /// View count.
    pub view_count: Option<u64>,
    /// Canonical page URL.
    pub webpage_url: Option<String>,
    /// Available streams.
    pub streams: Vec<StreamInfo>,
}

impl MediaInfo {
    /// Create metadata with only a title.
    #[must_use]
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    /// Quality choices for this media.
    #[must_use]
    pub fn quality_options(&self) -> Vec<QualityOption> {
        if self.streams.is_empty() {
            default_quality_options()
        } else {
            quality_options(&self.streams)
        }
    }
}

/// A quality choice presented to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityOption {
    /// Quality request this option maps to.
    pub quality: QualityRequest,
    /// Display label.
    pub label: String,
    /// Largest known size among streams at this quality.
    pub estimated_size: Option<u64>,
}

impl QualityOption {
    fn new(quality: QualityRequest, estimated_size: Option<u64>) -> Self {
        let label = match quality {
            QualityRequest::BestAv => "Best quality".to_string(),
            QualityRequest::BestAudioOnly => "Audio only (MP3)".to_string(),
            QualityRequest::CappedHeight(height) => format!("{height}p"),
        };
        Self {
            quality,
            label,
            estimated_size,
        }
    }
}

/// Derive quality options from resolved streams.
///
/// Distinct video heights sorted descending, `best` first when any video stream
/// exists, `audio` always last.
#[must_use]
pub fn quality_options(streams: &[StreamInfo]) -> Vec<QualityOption> {
    let mut heights: BTreeMap<u32, Option<u64>> = BTreeMap::new();
    for stream in streams.iter().filter(|s| s.has_video()) {
        if let Some(height) = stream.height {
            let size = heights.entry(height).or_default();
            *size = (*size).max(stream.size());
        }
    }

    let mut options = Vec::with_capacity(heights.len() + 2);
    if !heights.is_empty() {
        options.push(QualityOption::new(QualityRequest::BestAv, None));
    }
    options.extend(
        heights
            .into_iter()
            .rev()
            .map(|(height, size)| QualityOption::new(QualityRequest::CappedHeight(height), size)),
    );

    let audio_size = streams
        .iter()
        .filter(|s| s.has_audio() && !s.has_video())
        .filter_map(StreamInfo::size)
        .max();
    options.push(QualityOption::new(QualityRequest::BestAudioOnly, audio_size));

    options
}

/// Options offered before anything has been resolved.
#[must_use]
pub fn default_quality_options() -> Vec<QualityOption> {
    [
        QualityRequest::BestAv,
        QualityRequest::CappedHeight(1080),
        QualityRequest::CappedHeight(720),
        QualityRequest::CappedHeight(480),
        QualityRequest::CappedHeight(360),
        QualityRequest::BestAudioOnly,
    ]
    .into_iter()
    .map(|quality| QualityOption::new(quality, None))
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn video(height: u32, size: Option<u64>) -> StreamInfo {
        StreamInfo {
            format_id: format!("v{height}"),
            ext: "mp4".to_string(),
            height: Some(height),
            vcodec: Some("avc1".to_string()),
            acodec: Some("none".to_string()),
            filesize: size,
            ..StreamInfo::default()
        }
    }

    fn audio(size: u64) -> StreamInfo {
        StreamInfo {
            format_id: "a".to_string(),
            ext: "m4a".to_string(),
            vcodec: Some("none".to_string()),
            acodec: Some("mp4a".to_string()),
            filesize_approx: Some(size),
            ..StreamInfo::default()
        }
    }

    #[test]
    fn test_quality_options_sorted_and_deduplicated() {
        let streams = vec![
            video(720, Some(10)),
            video(1080, Some(30)),
            video(720, Some(12)),
            video(360, None),
            audio(5),
        ];

        let options = quality_options(&streams);
        let qualities: Vec<QualityRequest> = options.iter().map(|o| o.quality).collect();
        assert_eq!(
            qualities,
            vec![
                QualityRequest::BestAv,
                QualityRequest::CappedHeight(1080),
                QualityRequest::CappedHeight(720),
                QualityRequest::CappedHeight(360),
                QualityRequest::BestAudioOnly,
            ]
        );
        assert_eq!(options[2].estimated_size, Some(12));
        assert_eq!(options[3].estimated_size, None);
        assert_eq!(options[4].estimated_size, Some(5));
    }

    #[test]
    fn test_quality_options_audio_only_source() {
        let options = quality_options(&[audio(3)]);
        assert_eq!(options.len(), 1);
        assert_eq!(options[0].quality, QualityRequest::BestAudioOnly);
    }

    #[test]
    fn test_media_info_falls_back_to_defaults() {
        let info = MediaInfo::titled("clip");
        let options = info.quality_options();
        assert_eq!(options.len(), 6);
        assert_eq!(options[0].quality, QualityRequest::BestAv);
        assert_eq!(options[5].quality, QualityRequest::BestAudioOnly);
        assert_eq!(options[2].label, "720p");
    }

    #[test]
    fn test_stream_kind_detection() {
        assert!(video(480, None).has_video());
        assert!(!video(480, None).has_audio());
        assert!(audio(1).has_audio());
        assert!(!audio(1).has_video());

        let muxed = StreamInfo {
            height: Some(360),
            ..StreamInfo::default()
        };
        assert!(muxed.has_video());
        assert!(muxed.has_audio());
    }
}
