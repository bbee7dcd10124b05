//! Download manager.
//!
//! Composes the pieces into the operations a front end needs:
//! - validate a URL and build its [`DownloadRequest`]
//! - register and start a [`DownloadSession`]
//! - relay its events to the caller while writing history according to the
//!   configured [`HistoryPolicy`]
//! - cancel one or all sessions
//!
//! All collaborators (engine, history, muxer locator) are injected.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::{AppConfig, HistoryPolicy, SubtitleOptions};
use crate::engine::ExtractionEngine;
use crate::error::{Error, Result};
use crate::history::{HistoryStatus, NewHistoryRecord, SharedHistory};
use crate::media::MediaInfo;
use crate::muxer::MuxerLocator;
use crate::platform::platform_name;
use crate::postprocess::PostProcessPlan;
use crate::progress::ProgressEvent;
use crate::registry::SessionRegistry;
use crate::request::{ContainerFormat, DownloadRequest, QualityRequest};
use crate::session::{DownloadSession, SessionEvent, SessionEvents, SessionId, SessionOutcome};
use crate::util::{is_valid_url, parse_batch_input};

/// Settings applied to every submitted download.
#[derive(Debug, Clone)]
pub struct ManagerOptions {
    /// Directory downloads are saved into.
    pub download_directory: PathBuf,
    /// Output container for video downloads.
    pub container: ContainerFormat,
    /// Subtitle preferences.
    pub subtitles: SubtitleOptions,
    /// Which non-successful attempts are recorded.
    pub history_policy: HistoryPolicy,
    /// Muxer discovery.
    pub muxer: MuxerLocator,
}

impl ManagerOptions {
    /// Options saving into `download_directory` with default settings.
    pub fn new(download_directory: impl Into<PathBuf>) -> Self {
        Self {
            download_directory: download_directory.into(),
            container: ContainerFormat::default(),
            subtitles: SubtitleOptions::default(),
            history_policy: HistoryPolicy::default(),
            muxer: MuxerLocator::default(),
        }
    }

    /// Options taken from the application configuration.
    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        let mut muxer = MuxerLocator::default();
        if let Some(dir) = &config.engine.muxer_directory {
            muxer = muxer.with_override(dir);
        }

        Self {
            download_directory: config.download_directory.clone(),
            container: config.container,
            subtitles: config.subtitles.clone(),
            history_policy: config.history.policy,
            muxer,
        }
    }

    /// Set the history policy.
    #[must_use]
    pub const fn with_history_policy(mut self, policy: HistoryPolicy) -> Self {
        self.history_policy = policy;
        self
    }

    /// Set the muxer locator.
    #[must_use]
    pub fn with_muxer(mut self, muxer: MuxerLocator) -> Self {
        self.muxer = muxer;
        self
    }
}

/// A download to submit.
#[derive(Debug, Clone)]
pub struct DownloadJob {
    /// Source URL.
    pub url: String,
    /// Requested quality.
    pub quality: QualityRequest,
    /// Metadata resolved beforehand, used for history records.
    pub media: Option<MediaInfo>,
    /// Fixed output file name instead of the media title.
    pub filename: Option<String>,
}

impl DownloadJob {
    /// Create a job for `url` at `quality`.
    pub fn new(url: impl Into<String>, quality: QualityRequest) -> Self {
        Self {
            url: url.into(),
            quality,
            media: None,
            filename: None,
        }
    }

    /// Attach resolved metadata.
    #[must_use]
    pub fn with_media(mut self, media: MediaInfo) -> Self {
        self.media = Some(media);
        self
    }

    /// Use a fixed output file name.
    #[must_use]
    pub fn with_filename(mut self, name: impl Into<String>) -> Self {
        self.filename = Some(name.into());
        self
    }
}

/// Handle to a submitted download.
#[derive(Debug)]
pub struct DownloadTicket {
    id: SessionId,
    url: String,
    muxer_missing: bool,
    events: SessionEvents,
}

impl DownloadTicket {
    /// Session id.
    #[must_use]
    pub const fn id(&self) -> SessionId {
        self.id
    }

    /// Source URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Whether the request needs the muxer but none was found.
    #[must_use]
    pub const fn muxer_missing(&self) -> bool {
        self.muxer_missing
    }

    /// Next event; `None` after the outcome.
    pub async fn recv(&mut self) -> Option<SessionEvent> {
        self.events.recv().await
    }

    /// Wait for the outcome, passing progress to `on_progress`.
    pub async fn wait(self, on_progress: impl FnMut(&ProgressEvent)) -> SessionOutcome {
        self.events.wait(on_progress).await
    }
}

/// Result of a batch submission.
#[derive(Debug, Default)]
pub struct BatchSubmission {
    /// Downloads that were started.
    pub accepted: Vec<DownloadTicket>,
    /// URLs that could not be started, with the reason.
    pub rejected: Vec<(String, Error)>,
}

/// Fields of the history record written when a session ends.
#[derive(Debug, Clone)]
struct RecordContext {
    url: String,
    title: String,
    platform: &'static str,
    thumbnail: Option<String>,
    duration_seconds: Option<u64>,
    quality: String,
}

impl RecordContext {
    fn new(job: &DownloadJob, request: &DownloadRequest) -> Self {
        let media = job.media.as_ref();
        Self {
            url: request.url.clone(),
            title: media.map_or_else(|| request.url.clone(), |m| m.title.clone()),
            platform: platform_name(&request.url),
            thumbnail: media.and_then(|m| m.thumbnail_url.clone()),
            duration_seconds: media.and_then(|m| m.duration_seconds),
            quality: job.quality.label(),
        }
    }

    fn to_record(&self, status: HistoryStatus) -> NewHistoryRecord {
        NewHistoryRecord::new(
            self.url.clone(),
            self.title.clone(),
            self.platform,
            self.quality.clone(),
            status,
        )
        .with_thumbnail(self.thumbnail.clone())
        .with_duration(self.duration_seconds)
    }
}

/// Entry point for submitting, observing and cancelling downloads.
pub struct DownloadManager {
    engine: Arc<dyn ExtractionEngine>,
    registry: Arc<SessionRegistry>,
    history: SharedHistory,
    options: ManagerOptions,
}

impl std::fmt::Debug for DownloadManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadManager")
            .field("engine", &self.engine.name())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl DownloadManager {
    /// Create a manager.
    pub fn new(
        engine: Arc<dyn ExtractionEngine>,
        history: SharedHistory,
        options: ManagerOptions,
    ) -> Self {
        Self {
            engine,
            registry: Arc::new(SessionRegistry::new()),
            history,
            options,
        }
    }

    /// The live session registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// The shared history store.
    #[must_use]
    pub fn history(&self) -> &SharedHistory {
        &self.history
    }

    /// Manager options.
    #[must_use]
    pub const fn options(&self) -> &ManagerOptions {
        &self.options
    }

    /// Resolve metadata for a URL without downloading.
    pub async fn preview(&self, url: &str) -> Result<MediaInfo> {
        let url = url.trim().to_string();
        if !is_valid_url(&url) {
            return Err(Error::UnsupportedUrl(url));
        }

        let engine = Arc::clone(&self.engine);
        tokio::task::spawn_blocking(move || engine.resolve(&url))
            .await
            .map_err(|e| Error::TransferFailed(format!("metadata task failed: {e}")))?
            .map_err(Error::from)
    }

    /// Build the request for a job without starting it.
    pub fn build_request(&self, job: &DownloadJob) -> Result<DownloadRequest> {
        let url = job.url.trim();
        if !is_valid_url(url) {
            return Err(Error::UnsupportedUrl(job.url.clone()));
        }

        let dir = &self.options.download_directory;
        let mut request =
            DownloadRequest::new(url, job.quality, dir).with_container(self.options.container);
        if let Some(name) = &job.filename {
            request = request.with_filename(dir, name);
        }
        let subtitles = &self.options.subtitles;
        if subtitles.enabled {
            request = request.with_subtitles(subtitles.languages.iter().cloned(), subtitles.embed);
        }
        Ok(request)
    }

    /// Start a download.
    ///
    /// Must be called from within a tokio runtime. Unsupported URLs are
    /// rejected before any session is created.
    pub async fn submit(&self, job: DownloadJob) -> Result<DownloadTicket> {
        let request = self.build_request(&job)?;
        let context = RecordContext::new(&job, &request);
        let session = self.registry.create(request).await;
        self.launch(session, context).await
    }

    /// Start a registered session and attach the history relay.
    ///
    /// A session cancelled between registration and start still yields a
    /// ticket; its only event is the `Cancelled` outcome.
    async fn launch(
        &self,
        session: DownloadSession,
        context: RecordContext,
    ) -> Result<DownloadTicket> {
        let id = session.id();
        info!(
            session = id,
            url = %context.url,
            platform = context.platform,
            quality = %context.quality,
            "Submitting download"
        );

        let muxer_hint = self.options.muxer.locate();
        let muxer_missing = muxer_hint.is_none()
            && PostProcessPlan::for_request(session.request()).requires_muxer();
        if muxer_missing {
            warn!(session = id, "ffmpeg not found; merging or conversion may fail");
        }

        let session_events = match session.start(Arc::clone(&self.engine), muxer_hint) {
            Ok(events) => events,
            Err(e) => match session.outcome() {
                Some(outcome) => {
                    debug!(session = id, "Session resolved before start");
                    let (tx, rx) = mpsc::unbounded_channel();
                    let _ = tx.send(SessionEvent::Outcome(outcome));
                    SessionEvents::new(id, rx)
                }
                None => {
                    self.registry.forget(id).await;
                    return Err(e);
                }
            },
        };

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(relay(
            session_events,
            tx,
            Arc::clone(&self.registry),
            Arc::clone(&self.history),
            self.options.history_policy,
            context.clone(),
        ));

        Ok(DownloadTicket {
            id,
            url: context.url,
            muxer_missing,
            events: SessionEvents::new(id, rx),
        })
    }

    /// Start a download for every valid URL in `input` (one per line).
    ///
    /// Metadata is resolved first so history records carry titles; URLs that
    /// fail to resolve are rejected.
    pub async fn submit_batch(&self, input: &str, quality: QualityRequest) -> BatchSubmission {
        let mut batch = BatchSubmission::default();

        for url in parse_batch_input(input) {
            let media = match self.preview(&url).await {
                Ok(media) => media,
                Err(e) => {
                    warn!(url = %url, error = %e, "Skipping batch entry");
                    batch.rejected.push((url, e));
                    continue;
                }
            };

            let job = DownloadJob::new(url.clone(), quality).with_media(media);
            match self.submit(job).await {
                Ok(ticket) => batch.accepted.push(ticket),
                Err(e) => batch.rejected.push((url, e)),
            }
        }

        info!(
            accepted = batch.accepted.len(),
            rejected = batch.rejected.len(),
            "Batch submitted"
        );
        batch
    }

    /// Cancel one session. Returns `false` if it is unknown or finished.
    pub async fn cancel(&self, id: SessionId) -> bool {
        self.registry.cancel(id).await
    }

    /// Cancel all live sessions. Returns how many were affected.
    pub async fn cancel_all(&self) -> usize {
        self.registry.cancel_all().await
    }

    /// Ids of live sessions.
    pub async fn active_sessions(&self) -> Vec<SessionId> {
        self.registry.active_ids().await
    }
}

/// Forward session events to the caller; on the outcome, write history and
/// forget the session before passing the outcome on.
async fn relay(
    mut events: SessionEvents,
    tx: mpsc::UnboundedSender<SessionEvent>,
    registry: Arc<SessionRegistry>,
    history: SharedHistory,
    policy: HistoryPolicy,
    context: RecordContext,
) {
    let id = events.id();

    while let Some(event) = events.recv().await {
        match event {
            SessionEvent::Progress(progress) => {
                let _ = tx.send(SessionEvent::Progress(progress));
            }
            SessionEvent::Outcome(outcome) => {
                record_outcome(&history, policy, &context, &outcome).await;
                registry.forget(id).await;
                let _ = tx.send(SessionEvent::Outcome(outcome));
                return;
            }
        }
    }

    debug!(session = id, "Session channel closed without outcome");
    registry.forget(id).await;
}

async fn record_outcome(
    history: &SharedHistory,
    policy: HistoryPolicy,
    context: &RecordContext,
    outcome: &SessionOutcome,
) {
    let entry = match outcome {
        SessionOutcome::Succeeded { file_path } => {
            context.to_record(HistoryStatus::Completed).with_file_path(file_path)
        }
        SessionOutcome::Failed { .. } if policy.record_failures => {
            context.to_record(HistoryStatus::Failed)
        }
        SessionOutcome::Cancelled if policy.record_cancellations => {
            context.to_record(HistoryStatus::Cancelled)
        }
        _ => return,
    };

    let history = Arc::clone(history);
    match tokio::task::spawn_blocking(move || history.blocking_lock().add(entry)).await {
        Ok(persisted) => {
            if let Some(warning) = persisted.warning {
                warn!(error = %warning, "History record kept in memory only");
            }
        }
        Err(e) => warn!(error = %e, "History write task failed"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::engine::{EngineError, MockExtractionEngine, ProgressSink};
    use crate::history::HistoryStore;
    use crate::progress::RawProgress;
    use tempfile::TempDir;

    fn manager(
        engine: MockExtractionEngine,
        temp: &TempDir,
        policy: HistoryPolicy,
    ) -> DownloadManager {
        let history = HistoryStore::open(temp.path().join("history.json")).into_shared();
        let options = ManagerOptions::new(temp.path().join("downloads"))
            .with_history_policy(policy)
            .with_muxer(MuxerLocator::new(None));
        DownloadManager::new(Arc::new(engine), history, options)
    }

    #[tokio::test]
    async fn test_submit_rejects_invalid_url() {
        let temp = TempDir::new().unwrap();
        let manager = manager(MockExtractionEngine::new(), &temp, HistoryPolicy::default());

        let err = manager
            .submit(DownloadJob::new("not a url", QualityRequest::BestAv))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedUrl(_)));
        assert!(manager.active_sessions().await.is_empty());
    }

    #[tokio::test]
    async fn test_submit_success_records_history() {
        let temp = TempDir::new().unwrap();
        let mut engine = MockExtractionEngine::new();
        engine.expect_name().return_const("mock");
        engine.expect_fetch().returning(|request, sink, _, _| {
            assert!(request.destination_template.contains("downloads"));
            sink.report(RawProgress::downloading(5, Some(10)));
            Ok(PathBuf::from("/downloads/clip.mp4"))
        });
        let manager = manager(engine, &temp, HistoryPolicy::default());

        let job = DownloadJob::new("https://vimeo.com/123", QualityRequest::CappedHeight(480))
            .with_media(MediaInfo::titled("Clip"));
        let ticket = manager.submit(job).await.unwrap();
        let mut events = Vec::new();
        let outcome = ticket.wait(|p| events.push(p.clone())).await;

        assert!(outcome.is_success());
        assert_eq!(events.len(), 2);
        assert!(matches!(events[1], ProgressEvent::Finished { .. }));

        let history = manager.history().lock().await;
        assert_eq!(history.len(), 1);
        let record = &history.records()[0];
        assert_eq!(record.title, "Clip");
        assert_eq!(record.platform, "Vimeo");
        assert_eq!(record.quality, "480p");
        assert_eq!(record.status, HistoryStatus::Completed);
        assert_eq!(record.file_path, "/downloads/clip.mp4");
        drop(history);

        assert!(manager.active_sessions().await.is_empty());
    }

    #[tokio::test]
    async fn test_failure_not_recorded_by_default() {
        let temp = TempDir::new().unwrap();
        let mut engine = MockExtractionEngine::new();
        engine.expect_name().return_const("mock");
        engine
            .expect_fetch()
            .returning(|_, _, _, _| Err(EngineError::Transfer("HTTP Error 403".to_string())));
        let manager = manager(engine, &temp, HistoryPolicy::default());

        let ticket = manager
            .submit(DownloadJob::new("https://youtu.be/abc", QualityRequest::BestAv))
            .await
            .unwrap();
        let outcome = ticket.wait(|_| {}).await;

        assert!(matches!(outcome, SessionOutcome::Failed { .. }));
        assert!(manager.history().lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_failure_recorded_when_policy_asks() {
        let temp = TempDir::new().unwrap();
        let mut engine = MockExtractionEngine::new();
        engine.expect_name().return_const("mock");
        engine
            .expect_fetch()
            .returning(|_, _, _, _| Err(EngineError::Cancelled));
        let policy = HistoryPolicy {
            record_failures: true,
            record_cancellations: true,
        };
        let manager = manager(engine, &temp, policy);

        let ticket = manager
            .submit(DownloadJob::new("https://youtu.be/abc", QualityRequest::BestAv))
            .await
            .unwrap();
        assert_eq!(ticket.wait(|_| {}).await, SessionOutcome::Cancelled);

        let history = manager.history().lock().await;
        assert_eq!(history.len(), 1);
        assert_eq!(history.records()[0].status, HistoryStatus::Cancelled);
        assert!(history.records()[0].file_path.is_empty());
    }

    #[tokio::test]
    async fn test_session_cancelled_before_start_yields_cancelled_ticket() {
        let temp = TempDir::new().unwrap();
        let policy = HistoryPolicy {
            record_failures: false,
            record_cancellations: true,
        };
        let manager = manager(MockExtractionEngine::new(), &temp, policy);

        let job = DownloadJob::new("https://youtu.be/abc", QualityRequest::BestAv);
        let request = manager.build_request(&job).unwrap();
        let context = RecordContext::new(&job, &request);
        let session = manager.registry().create(request).await;
        assert_eq!(manager.cancel_all().await, 1);

        let mut ticket = manager.launch(session, context).await.unwrap();
        assert_eq!(
            ticket.recv().await,
            Some(SessionEvent::Outcome(SessionOutcome::Cancelled))
        );
        assert_eq!(ticket.recv().await, None);

        let history = manager.history().lock().await;
        assert_eq!(history.len(), 1);
        assert_eq!(history.records()[0].status, HistoryStatus::Cancelled);
        drop(history);
        assert!(manager.active_sessions().await.is_empty());
    }

    #[tokio::test]
    async fn test_ticket_reports_muxer_availability() {
        let temp = TempDir::new().unwrap();
        // Only PATH is searched; the host may or may not have ffmpeg.
        let found = MuxerLocator::new(None).locate();
        let expected_hint = found.clone();

        let mut engine = MockExtractionEngine::new();
        engine.expect_name().return_const("mock");
        engine.expect_fetch().returning(move |_, _, _, muxer_hint| {
            assert_eq!(muxer_hint, expected_hint);
            Ok(PathBuf::from("/downloads/a.mp3"))
        });
        let manager = manager(engine, &temp, HistoryPolicy::default());

        let ticket = manager
            .submit(DownloadJob::new("https://youtu.be/abc", QualityRequest::BestAudioOnly))
            .await
            .unwrap();
        assert_eq!(ticket.muxer_missing(), found.is_none());
        assert!(ticket.wait(|_| {}).await.is_success());
    }

    #[tokio::test]
    async fn test_build_request_applies_options() {
        let temp = TempDir::new().unwrap();
        let history = HistoryStore::open(temp.path().join("history.json")).into_shared();
        let mut options = ManagerOptions::new(temp.path());
        options.container = ContainerFormat::Webm;
        options.subtitles.enabled = true;
        options.subtitles.embed = true;
        let manager = DownloadManager::new(Arc::new(MockExtractionEngine::new()), history, options);

        let request = manager
            .build_request(
                &DownloadJob::new(" https://youtu.be/abc ", QualityRequest::BestAv)
                    .with_filename("my clip"),
            )
            .unwrap();
        assert_eq!(request.url, "https://youtu.be/abc");
        assert_eq!(request.container, ContainerFormat::Webm);
        assert!(request.want_subtitles);
        assert!(request.embed_subtitles);
        assert!(request.destination_template.ends_with("my clip.%(ext)s"));
    }

    #[tokio::test]
    async fn test_preview_maps_engine_errors() {
        let temp = TempDir::new().unwrap();
        let mut engine = MockExtractionEngine::new();
        engine
            .expect_resolve()
            .returning(|url| Err(EngineError::UnsupportedUrl(url.to_string())));
        let manager = manager(engine, &temp, HistoryPolicy::default());

        let err = manager.preview("https://example.com/page").await.unwrap_err();
        assert!(matches!(err, Error::UnsupportedUrl(_)));
    }

    #[tokio::test]
    async fn test_submit_batch_skips_invalid_and_unresolvable() {
        let temp = TempDir::new().unwrap();
        let mut engine = MockExtractionEngine::new();
        engine.expect_name().return_const("mock");
        engine.expect_resolve().returning(|url| {
            if url.contains("broken") {
                Err(EngineError::UnsupportedUrl(url.to_string()))
            } else {
                Ok(MediaInfo::titled("ok"))
            }
        });
        engine
            .expect_fetch()
            .returning(|_, _, _, _| Ok(PathBuf::from("/downloads/ok.mp4")));
        let manager = manager(engine, &temp, HistoryPolicy::default());

        let input = "https://youtu.be/a\nnot a url\nhttps://broken.example.com/x\n";
        let batch = manager.submit_batch(input, QualityRequest::BestAv).await;

        assert_eq!(batch.accepted.len(), 1);
        assert_eq!(batch.rejected.len(), 1);
        assert_eq!(batch.rejected[0].0, "https://broken.example.com/x");

        for ticket in batch.accepted {
            assert!(ticket.wait(|_| {}).await.is_success());
        }
    }
}
