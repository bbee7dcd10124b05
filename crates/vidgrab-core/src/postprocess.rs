//! Post-processing plan.
//!
//! Describes what the muxer has to do after the streams are downloaded. The
//! engine adapter turns the plan into its own flags.

use serde::{Deserialize, Serialize};

use crate::request::{ContainerFormat, DownloadRequest};

/// Audio codec used when extracting audio.
pub const AUDIO_CODEC: &str = "mp3";

/// Audio bitrate (kbit/s) used when extracting audio.
pub const AUDIO_QUALITY_KBPS: u32 = 192;

/// A single post-processing step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum PostProcessStep {
    /// Extract the audio track and transcode it.
    ExtractAudio {
        /// Target codec.
        codec: String,
        /// Target bitrate in kbit/s.
        quality_kbps: u32,
    },
    /// Convert the video into another container.
    ConvertVideo {
        /// Target container.
        container: ContainerFormat,
    },
    /// Embed downloaded subtitles into the output.
    EmbedSubtitles,
}

/// Ordered post-processing steps for one request.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PostProcessPlan {
    steps: Vec<PostProcessStep>,
    merge_container: Option<ContainerFormat>,
}

impl PostProcessPlan {
    /// Build the plan for a request.
    #[must_use]
    pub fn for_request(request: &DownloadRequest) -> Self {
        let mut steps = Vec::new();

        if request.want_subtitles && request.embed_subtitles {
            steps.push(PostProcessStep::EmbedSubtitles);
        }

        let merge_container = if request.quality.is_audio_only() {
            steps.push(PostProcessStep::ExtractAudio {
                codec: AUDIO_CODEC.to_string(),
                quality_kbps: AUDIO_QUALITY_KBPS,
            });
            None
        } else {
            if request.container != ContainerFormat::Mp4 {
                steps.push(PostProcessStep::ConvertVideo {
                    container: request.container,
                });
            }
            Some(request.container)
        };

        Self {
            steps,
            merge_container,
        }
    }

    /// Steps in execution order.
    #[must_use]
    pub fn steps(&self) -> &[PostProcessStep] {
        &self.steps
    }

    /// Container separate video and audio streams are merged into.
    ///
    /// `None` for audio-only downloads.
    #[must_use]
    pub const fn merge_container(&self) -> Option<ContainerFormat> {
        self.merge_container
    }

    /// Whether the plan can only run with the muxer present.
    ///
    /// True when any step is planned or when video and audio may be merged.
    #[must_use]
    pub const fn requires_muxer(&self) -> bool {
        !self.steps.is_empty() || self.merge_container.is_some()
    }

    /// Whether no post-processing step is planned.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}
