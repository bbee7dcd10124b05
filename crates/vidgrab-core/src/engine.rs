//! Extraction engine contract.
//!
//! The engine resolves URLs and fetches media. It is blocking: a session calls
//! it from its own worker thread. Progress flows out through a [`ProgressSink`]
//! and cancellation flows in through a [`CancelPredicate`], so the engine never
//! sees session internals.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::error::Error;
use crate::media::MediaInfo;
use crate::progress::RawProgress;
use crate::request::DownloadRequest;

/// Receives raw progress callbacks from an engine.
pub trait ProgressSink: Send + Sync {
    /// Report one progress callback.
    fn report(&self, progress: RawProgress);
}

impl<F> ProgressSink for F
where
    F: Fn(RawProgress) + Send + Sync,
{
    fn report(&self, progress: RawProgress) {
        self(progress);
    }
}

/// Answers whether the caller asked the engine to stop.
pub trait CancelPredicate: Send + Sync {
    /// `true` once cancellation was requested.
    fn is_cancelled(&self) -> bool;
}

impl<F> CancelPredicate for F
where
    F: Fn() -> bool + Send + Sync,
{
    fn is_cancelled(&self) -> bool {
        self()
    }
}

/// Shared progress sink handed to [`ExtractionEngine::fetch`].
pub type SharedSink = Arc<dyn ProgressSink>;

/// Shared cancellation predicate handed to [`ExtractionEngine::fetch`].
pub type SharedCancel = Arc<dyn CancelPredicate>;

/// Errors reported by an extraction engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// The cancellation predicate turned true.
    #[error("download cancelled")]
    Cancelled,

    /// No extractor handles the URL.
    #[error("unsupported URL: {0}")]
    UnsupportedUrl(String),

    /// The format expression matched no stream.
    #[error("requested format is not available: {0}")]
    NoMatchingFormat(String),

    /// The muxer is needed but missing.
    #[error("ffmpeg is required to merge or convert streams but was not found: {0}")]
    MuxerMissing(String),

    /// The engine itself could not be started.
    #[error("extraction engine not available: {0}")]
    ToolNotFound(String),

    /// Any other failure during the transfer.
    #[error("{0}")]
    Transfer(String),
}

impl From<EngineError> for Error {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Cancelled => Self::Cancelled,
            EngineError::UnsupportedUrl(msg) => Self::UnsupportedUrl(msg),
            EngineError::NoMatchingFormat(msg) => Self::NoMatchingFormat(msg),
            EngineError::MuxerMissing(msg) => Self::MuxerUnavailable(msg),
            EngineError::ToolNotFound(msg) => Self::EngineUnavailable(msg),
            EngineError::Transfer(msg) => Self::TransferFailed(msg),
        }
    }
}

/// An extraction engine able to resolve and download media URLs.
///
/// Implementations block the calling thread.
#[cfg_attr(test, mockall::automock)]
pub trait ExtractionEngine: Send + Sync {
    /// Short engine name for logs.
    fn name(&self) -> &'static str;

    /// Resolve metadata and available streams for a URL.
    fn resolve(&self, url: &str) -> Result<MediaInfo, EngineError>;

    /// Download the media described by `request`.
    ///
    /// Raw progress goes to `sink`. The engine checks `cancel` at least at every
    /// progress boundary and returns [`EngineError::Cancelled`] once it is true.
    /// `muxer_hint` is the directory containing the muxer binary, if one was
    /// found. Returns the path of the final output file.
    fn fetch(
        &self,
        request: &DownloadRequest,
        sink: SharedSink,
        cancel: SharedCancel,
        muxer_hint: Option<PathBuf>,
    ) -> Result<PathBuf, EngineError>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn test_closure_sink_and_predicate() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let sink: SharedSink = Arc::new(move |p: RawProgress| {
            seen_clone.lock().unwrap().push(p.status);
        });
        sink.report(RawProgress::downloading(1, Some(2)));
        sink.report(RawProgress::finished("/tmp/x"));
        assert_eq!(*seen.lock().unwrap(), vec!["downloading", "finished"]);

        let flag = Arc::new(AtomicBool::new(false));
        let flag_clone = Arc::clone(&flag);
        let cancel: SharedCancel = Arc::new(move || flag_clone.load(Ordering::SeqCst));
        assert!(!cancel.is_cancelled());
        flag.store(true, Ordering::SeqCst);
        assert!(cancel.is_cancelled());
    }

    #[test]
    fn test_engine_error_conversion() {
        assert!(matches!(Error::from(EngineError::Cancelled), Error::Cancelled));
        assert!(matches!(
            Error::from(EngineError::MuxerMissing("x".into())),
            Error::MuxerUnavailable(_)
        ));
        assert!(matches!(
            Error::from(EngineError::Transfer("reset".into())),
            Error::TransferFailed(_)
        ));
        assert!(matches!(
            Error::from(EngineError::ToolNotFound("yt-dlp".into())),
            Error::EngineUnavailable(_)
        ));
    }

    #[test]
    fn test_mock_engine_reports_progress() {
        let mut engine = MockExtractionEngine::new();
        engine.expect_name().return_const("mock");
        engine
            .expect_fetch()
            .times(1)
            .returning(|_request, sink, cancel, _hint| {
                sink.report(RawProgress::downloading(10, Some(10)));
                if cancel.is_cancelled() {
                    return Err(EngineError::Cancelled);
                }
                Ok(PathBuf::from("/tmp/out.mp4"))
            });

        let request = DownloadRequest::new(
            "https://youtu.be/abc",
            crate::request::QualityRequest::BestAv,
            std::path::Path::new("/tmp"),
        );
        let count = Arc::new(Mutex::new(0));
        let count_clone = Arc::clone(&count);
        let result = engine.fetch(
            &request,
            Arc::new(move |_p: RawProgress| *count_clone.lock().unwrap() += 1),
            Arc::new(|| false),
            None,
        );

        assert_eq!(engine.name(), "mock");
        assert_eq!(result.unwrap(), PathBuf::from("/tmp/out.mp4"));
        assert_eq!(*count.lock().unwrap(), 1);
    }
}
