//! Progress normalization.
//!
//! Extraction engines report progress as loosely typed callbacks. [`translate`]
//! turns them into [`ProgressEvent`]s with a fixed shape.

use std::path::PathBuf;

use serde::{Deserialize, Deserializer, Serialize};

/// Raw progress callback as reported by an extraction engine.
///
/// Field names follow the engine's progress dictionary so a JSON progress line
/// deserializes directly. Numeric fields accept integers or floats.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawProgress {
    /// `downloading`, `finished`, `postprocessing`, or anything else.
    #[serde(default)]
    pub status: String,
    /// Bytes fetched so far.
    #[serde(default, deserialize_with = "lenient_u64")]
    pub downloaded_bytes: Option<u64>,
    /// Exact total size, when known.
    #[serde(default, deserialize_with = "lenient_u64")]
    pub total_bytes: Option<u64>,
    /// Estimated total size.
    #[serde(default, deserialize_with = "lenient_u64")]
    pub total_bytes_estimate: Option<u64>,
    /// Transfer speed in bytes per second.
    #[serde(default)]
    pub speed: Option<f64>,
    /// Estimated seconds remaining.
    #[serde(default, deserialize_with = "lenient_u64")]
    pub eta: Option<u64>,
    /// File being written.
    #[serde(default)]
    pub filename: Option<String>,
    /// Post-processing step name.
    #[serde(default)]
    pub postprocessor: Option<String>,
}

impl RawProgress {
    /// A `downloading` callback.
    #[must_use]
    pub fn downloading(downloaded: u64, total: Option<u64>) -> Self {
        Self {
            status: "downloading".to_string(),
            downloaded_bytes: Some(downloaded),
            total_bytes: total,
            ..Self::default()
        }
    }

    /// A `finished` callback for `filename`.
    #[must_use]
    pub fn finished(filename: impl Into<String>) -> Self {
        Self {
            status: "finished".to_string(),
            filename: Some(filename.into()),
            ..Self::default()
        }
    }

    /// A `postprocessing` callback for the named step.
    #[must_use]
    pub fn postprocessing(step: impl Into<String>) -> Self {
        Self {
            status: "postprocessing".to_string(),
            postprocessor: Some(step.into()),
            ..Self::default()
        }
    }

    /// Set the estimated total.
    #[must_use]
    pub const fn with_estimate(mut self, estimate: u64) -> Self {
        self.total_bytes_estimate = Some(estimate);
        self
    }

    /// Set speed and ETA.
    #[must_use]
    pub const fn with_rate(mut self, bytes_per_second: f64, eta_seconds: u64) -> Self {
        self.speed = Some(bytes_per_second);
        self.eta = Some(eta_seconds);
        self
    }
}

fn lenient_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<f64>::deserialize(deserializer)?;
    Ok(value
        .filter(|v| v.is_finite() && *v >= 0.0)
        .map(|v| v.round() as u64))
}

/// Normalized progress event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// Bytes are being transferred.
    Downloading {
        /// Bytes fetched so far.
        bytes_done: u64,
        /// Total size (exact when known, estimated otherwise).
        bytes_total: Option<u64>,
        /// Transfer speed.
        bytes_per_second: Option<f64>,
        /// Estimated seconds remaining.
        eta_seconds: Option<u64>,
    },
    /// A post-processing step (merge, convert, embed) started.
    PostProcessing {
        /// Step name as reported by the engine.
        step: String,
    },
    /// A file was completely written.
    Finished {
        /// Path of the written file.
        final_path: PathBuf,
    },
}

impl ProgressEvent {
    /// Completion percentage in `0.0..=100.0`, if it can be computed.
    #[must_use]
    pub fn percent(&self) -> Option<f64> {
        match self {
            Self::Downloading {
                bytes_done,
                bytes_total: Some(total),
                ..
            } if *total > 0 => Some((*bytes_done as f64 / *total as f64 * 100.0).min(100.0)),
            Self::Downloading { .. } | Self::PostProcessing { .. } => None,
            Self::Finished { .. } => Some(100.0),
        }
    }

    /// Whether this is a `Finished` event.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        matches!(self, Self::Finished { .. })
    }
}

/// Translate a raw engine callback into a progress event.
///
/// Unknown statuses yield `None`. The exact total is preferred over the
/// estimate unless it is zero.
#[must_use]
pub fn translate(raw: &RawProgress) -> Option<ProgressEvent> {
    match raw.status.as_str() {
        "downloading" => Some(ProgressEvent::Downloading {
            bytes_done: raw.downloaded_bytes.unwrap_or(0),
            bytes_total: raw
                .total_bytes
                .filter(|total| *total > 0)
                .or(raw.total_bytes_estimate),
            bytes_per_second: raw.speed.filter(|speed| speed.is_finite() && *speed >= 0.0),
            eta_seconds: raw.eta,
        }),
        "finished" => Some(ProgressEvent::Finished {
            final_path: raw.filename.as_deref().map(PathBuf::from).unwrap_or_default(),
        }),
        "postprocessing" => Some(ProgressEvent::PostProcessing {
            step: raw
                .postprocessor
                .clone()
                .unwrap_or_else(|| "postprocessing".to_string()),
        }),
        _ => None,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_translate_downloading_with_total() {
        let event = translate(&RawProgress::downloading(512, Some(1024))).unwrap();
        assert_eq!(event.percent(), Some(50.0));
    }

    #[test]
    fn test_translate_prefers_exact_total() {
        let raw = RawProgress::downloading(100, Some(400)).with_estimate(1000);
        let event = translate(&raw).unwrap();
        assert!(matches!(
            event,
            ProgressEvent::Downloading {
                bytes_total: Some(400),
                ..
            }
        ));
    }

    #[test]
    fn test_translate_falls_back_to_estimate() {
        let raw = RawProgress::downloading(250, None).with_estimate(1000);
        assert_eq!(translate(&raw).unwrap().percent(), Some(25.0));

        // A zero exact total is treated as unknown.
        let raw = RawProgress::downloading(250, Some(0)).with_estimate(500);
        assert_eq!(translate(&raw).unwrap().percent(), Some(50.0));
    }

    #[test]
    fn test_no_percent_without_total() {
        let event = translate(&RawProgress::downloading(4096, None)).unwrap();
        assert_eq!(event.percent(), None);

        let event = translate(&RawProgress::downloading(4096, Some(0))).unwrap();
        assert_eq!(event.percent(), None);

        let raw = RawProgress::downloading(4096, Some(0)).with_estimate(0);
        assert_eq!(translate(&raw).unwrap().percent(), None);
    }

    #[test]
    fn test_translate_finished() {
        let event = translate(&RawProgress::finished("/tmp/video.mp4")).unwrap();
        assert_eq!(
            event,
            ProgressEvent::Finished {
                final_path: PathBuf::from("/tmp/video.mp4")
            }
        );
        assert_eq!(event.percent(), Some(100.0));
        assert!(event.is_finished());
    }

    #[test]
    fn test_translate_postprocessing() {
        let event = translate(&RawProgress::postprocessing("Merger")).unwrap();
        assert_eq!(
            event,
            ProgressEvent::PostProcessing {
                step: "Merger".to_string()
            }
        );
        assert_eq!(event.percent(), None);
    }

    #[test]
    fn test_unknown_status_dropped() {
        let raw = RawProgress {
            status: "error".to_string(),
            ..RawProgress::default()
        };
        assert!(translate(&raw).is_none());
        assert!(translate(&RawProgress::default()).is_none());
    }

    #[test]
    fn test_percent_is_clamped() {
        let event = translate(&RawProgress::downloading(2048, Some(1024))).unwrap();
        assert_eq!(event.percent(), Some(100.0));
    }

    #[test]
    fn test_raw_progress_from_engine_json() {
        let line = r#"{"status":"downloading","downloaded_bytes":1048576,"total_bytes":null,"total_bytes_estimate":4194304.7,"speed":524288.5,"eta":6,"filename":"/tmp/a.f137.mp4","tmpfilename":"/tmp/a.f137.mp4.part","elapsed":2.1}"#;
        let raw: RawProgress = serde_json::from_str(line).unwrap();
        assert_eq!(raw.downloaded_bytes, Some(1_048_576));
        assert_eq!(raw.total_bytes, None);
        assert_eq!(raw.total_bytes_estimate, Some(4_194_305));
        assert_eq!(raw.eta, Some(6));

        let event = translate(&raw).unwrap();
        let percent = event.percent().unwrap();
        assert!((percent - 25.0).abs() < 0.01);
    }
}
