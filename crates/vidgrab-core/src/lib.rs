//! `Vidgrab` Core Library
//!
//! This crate provides the core functionality for the `vidgrab` downloader:
//! - Platform detection and format-expression selection
//! - Cancellable download sessions driving an extraction engine
//! - Progress translation from engine callbacks to UI events
//! - Post-processing plans (audio extraction, container conversion, subtitles)
//! - Persistent download history
//! - Application configuration management
//!
//! # Error Handling
//!
//! All fallible operations return [`Result`] with the crate-wide [`Error`].
//!
//! ```rust,ignore
//! use vidgrab_core::{DownloadJob, DownloadManager, QualityRequest, Result};
//!
//! async fn grab(manager: &DownloadManager) -> Result<()> {
//!     let ticket = manager
//!         .submit(DownloadJob::new("https://youtu.be/abc", QualityRequest::BestAv))
//!         .await?;
//!     let outcome = ticket.wait(|p| println!("{:?}", p.percent())).await;
//!     println!("{outcome:?}");
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod format;
pub mod history;
pub mod manager;
pub mod media;
pub mod muxer;
pub mod platform;
pub mod postprocess;
pub mod progress;
pub mod registry;
pub mod request;
pub mod session;
pub mod util;
pub mod ytdlp;

pub use config::{
    AppConfig, ConfigManager, DEFAULT_RETRIES, DEFAULT_SOCKET_TIMEOUT_SECS, EngineConfig,
    HistoryConfig, HistoryPolicy, SubtitleOptions, default_download_directory,
    validate_download_directory,
};
pub use engine::{
    CancelPredicate, EngineError, ExtractionEngine, ProgressSink, SharedCancel, SharedSink,
};
pub use error::{Error, Result};
pub use format::{FormatExpression, select};
pub use history::{
    DEFAULT_LIST_LIMIT, HISTORY_CAP, HISTORY_FILE_NAME, HistoryRecord, HistoryStatus,
    HistoryStore, NewHistoryRecord, Persisted, SharedHistory, default_history_path,
};
pub use manager::{BatchSubmission, DownloadJob, DownloadManager, DownloadTicket, ManagerOptions};
pub use media::{MediaInfo, QualityOption, StreamInfo, default_quality_options, quality_options};
pub use muxer::{MUXER_TOOL, MuxerLocator, default_bundled_dir};
pub use platform::{OTHER_PLATFORM, PlatformTag, detect, platform_name};
pub use postprocess::{AUDIO_CODEC, AUDIO_QUALITY_KBPS, PostProcessPlan, PostProcessStep};
pub use progress::{ProgressEvent, RawProgress, translate};
pub use registry::SessionRegistry;
pub use request::{
    ContainerFormat, DEFAULT_SUBTITLE_LANGS, DownloadRequest, QualityRequest, TITLE_TEMPLATE,
};
pub use session::{
    DownloadSession, SessionEvent, SessionEvents, SessionId, SessionOutcome, SessionState,
};
pub use util::{
    MAX_FILENAME_CHARS, format_duration, format_size, is_valid_url, parse_batch_input,
    sanitize_filename,
};
pub use ytdlp::{ENGINE_NAME, YtDlpEngine, locate_binary};
