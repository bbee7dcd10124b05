//! Download sessions.
//!
//! A [`DownloadSession`] owns one in-flight download:
//! - `Pending -> Running -> {Succeeded | Cancelled | Failed}`, terminal states
//!   never change again
//! - the engine runs on a dedicated worker thread
//! - progress and the final outcome arrive over one channel ([`SessionEvents`]),
//!   every progress event before the outcome
//! - cancellation is cooperative: the engine polls a flag at progress boundaries
//!
//! Sessions never return engine errors to the caller. Every failure, including
//! a panic inside the engine, resolves to [`SessionOutcome::Failed`].

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::engine::{EngineError, ExtractionEngine, ProgressSink, SharedCancel, SharedSink};
use crate::error::{Error, Result};
use crate::progress::{ProgressEvent, RawProgress, translate};
use crate::request::DownloadRequest;

/// Unique identifier for a session.
pub type SessionId = u64;

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Created, not started.
    Pending,
    /// The engine is running.
    Running,
    /// Finished with a file.
    Succeeded,
    /// Stopped by the caller.
    Cancelled,
    /// Stopped by an error.
    Failed,
}

impl SessionState {
    /// Whether no further transition is possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Cancelled | Self::Failed)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Final result of a session. Each session produces exactly one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SessionOutcome {
    /// The download finished.
    Succeeded {
        /// Final output file.
        file_path: PathBuf,
    },
    /// The caller cancelled the download.
    Cancelled,
    /// The download failed.
    Failed {
        /// Human readable failure description.
        message: String,
    },
}

impl SessionOutcome {
    /// Terminal state matching this outcome.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        match self {
            Self::Succeeded { .. } => SessionState::Succeeded,
            Self::Cancelled => SessionState::Cancelled,
            Self::Failed { .. } => SessionState::Failed,
        }
    }

    /// Whether the download succeeded.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }

    /// Output file of a successful download.
    #[must_use]
    pub const fn file_path(&self) -> Option<&PathBuf> {
        match self {
            Self::Succeeded { file_path } => Some(file_path),
            _ => None,
        }
    }

    /// Failure message shortened to at most `max_chars` characters.
    ///
    /// `None` unless the outcome is `Failed`.
    #[must_use]
    pub fn short_message(&self, max_chars: usize) -> Option<String> {
        let Self::Failed { message } = self else {
            return None;
        };
        if message.chars().count() <= max_chars {
            return Some(message.clone());
        }
        let keep = max_chars.saturating_sub(3);
        let mut short: String = message.chars().take(keep).collect();
        short.push_str("...");
        Some(short)
    }
}

/// Message delivered on a session's event channel.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Normalized progress.
    Progress(ProgressEvent),
    /// The final outcome; always the last message.
    Outcome(SessionOutcome),
}

#[derive(Debug)]
struct Status {
    state: SessionState,
    outcome: Option<SessionOutcome>,
}

#[derive(Debug)]
struct SessionInner {
    id: SessionId,
    request: Arc<DownloadRequest>,
    cancel_flag: Arc<AtomicBool>,
    status: Mutex<Status>,
}

/// One download attempt. Cheap to clone; clones share state.
#[derive(Debug, Clone)]
pub struct DownloadSession {
    inner: Arc<SessionInner>,
}

impl DownloadSession {
    /// Create a pending session.
    #[must_use]
    pub fn new(id: SessionId, request: DownloadRequest) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                id,
                request: Arc::new(request),
                cancel_flag: Arc::new(AtomicBool::new(false)),
                status: Mutex::new(Status {
                    state: SessionState::Pending,
                    outcome: None,
                }),
            }),
        }
    }

    /// Session identifier.
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.inner.id
    }

    /// The immutable request.
    #[must_use]
    pub fn request(&self) -> &DownloadRequest {
        &self.inner.request
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.status().state
    }

    /// Final outcome, once terminal.
    #[must_use]
    pub fn outcome(&self) -> Option<SessionOutcome> {
        self.status().outcome.clone()
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancel_requested(&self) -> bool {
        self.inner.cancel_flag.load(Ordering::SeqCst)
    }

    /// Request cancellation.
    ///
    /// A pending session becomes `Cancelled` immediately. A running session
    /// stops at the engine's next progress boundary. Returns `false` when the
    /// session was already terminal and nothing changed.
    pub fn cancel(&self) -> bool {
        let mut status = self.status();
        if status.state.is_terminal() {
            debug!(
                session = self.inner.id,
                state = %status.state,
                "Cancel ignored for finished session"
            );
            return false;
        }

        self.inner.cancel_flag.store(true, Ordering::SeqCst);
        if status.state == SessionState::Pending {
            status.state = SessionState::Cancelled;
            status.outcome = Some(SessionOutcome::Cancelled);
            info!(session = self.inner.id, "Pending session cancelled");
        } else {
            info!(session = self.inner.id, "Cancellation requested");
        }
        true
    }

    /// Start the download on a worker thread.
    ///
    /// Fails with [`Error::InvalidSessionState`] unless the session is
    /// `Pending`; no thread is spawned in that case.
    pub fn start(
        &self,
        engine: Arc<dyn ExtractionEngine>,
        muxer_hint: Option<PathBuf>,
    ) -> Result<SessionEvents> {
        {
            let mut status = self.status();
            if status.state != SessionState::Pending {
                return Err(Error::InvalidSessionState {
                    id: self.inner.id,
                    state: status.state,
                    action: "start",
                });
            }
            status.state = SessionState::Running;
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let worker_tx = tx.clone();
        let session = self.clone();

        let spawned = thread::Builder::new()
            .name(format!("vidgrab-session-{}", self.inner.id))
            .spawn(move || session.run(engine.as_ref(), muxer_hint, &worker_tx));

        if let Err(e) = spawned {
            error!(session = self.inner.id, error = %e, "Failed to spawn session worker");
            let outcome = SessionOutcome::Failed {
                message: format!("failed to start download worker: {e}"),
            };
            self.resolve(outcome.clone());
            let _ = tx.send(SessionEvent::Outcome(outcome));
        }

        Ok(SessionEvents::new(self.inner.id, rx))
    }

    fn run(
        &self,
        engine: &dyn ExtractionEngine,
        muxer_hint: Option<PathBuf>,
        tx: &mpsc::UnboundedSender<SessionEvent>,
    ) {
        let request = Arc::clone(&self.inner.request);
        let sink = Arc::new(ForwardingSink::new(self.inner.id, tx.clone()));
        let flag = Arc::clone(&self.inner.cancel_flag);
        let cancel: SharedCancel = Arc::new(move || flag.load(Ordering::SeqCst));

        info!(
            session = self.inner.id,
            engine = engine.name(),
            url = %request.url,
            format = %request.format,
            "Download session started"
        );

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            engine.fetch(
                &request,
                Arc::clone(&sink) as SharedSink,
                cancel,
                muxer_hint,
            )
        }));

        let outcome = match result {
            Ok(Ok(path)) => {
                if sink.last_finished().as_ref() != Some(&path) {
                    sink.forward(ProgressEvent::Finished {
                        final_path: path.clone(),
                    });
                }
                info!(session = self.inner.id, path = %path.display(), "Download succeeded");
                SessionOutcome::Succeeded { file_path: path }
            }
            Ok(Err(EngineError::Cancelled)) => {
                info!(session = self.inner.id, "Download cancelled");
                SessionOutcome::Cancelled
            }
            Ok(Err(e)) => {
                warn!(session = self.inner.id, error = %e, "Download failed");
                SessionOutcome::Failed {
                    message: e.to_string(),
                }
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(session = self.inner.id, %message, "Extraction engine panicked");
                SessionOutcome::Failed {
                    message: format!("extraction engine panicked: {message}"),
                }
            }
        };

        self.resolve(outcome.clone());
        if tx.send(SessionEvent::Outcome(outcome)).is_err() {
            debug!(session = self.inner.id, "Outcome dropped, receiver gone");
        }
    }

    fn resolve(&self, outcome: SessionOutcome) {
        let mut status = self.status();
        if status.state.is_terminal() {
            warn!(session = self.inner.id, state = %status.state, "Session already resolved");
            return;
        }
        status.state = outcome.state();
        status.outcome = Some(outcome);
    }

    fn status(&self) -> MutexGuard<'_, Status> {
        self.inner
            .status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Translates raw callbacks and pushes them onto the session channel.
struct ForwardingSink {
    id: SessionId,
    tx: mpsc::UnboundedSender<SessionEvent>,
    last_finished: Mutex<Option<PathBuf>>,
}

impl ForwardingSink {
    const fn new(id: SessionId, tx: mpsc::UnboundedSender<SessionEvent>) -> Self {
        Self {
            id,
            tx,
            last_finished: Mutex::new(None),
        }
    }

    fn forward(&self, event: ProgressEvent) {
        {
            let mut last = self
                .last_finished
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            *last = match &event {
                ProgressEvent::Finished { final_path } => Some(final_path.clone()),
                _ => None,
            };
        }
        if self.tx.send(SessionEvent::Progress(event)).is_err() {
            debug!(session = self.id, "Progress dropped, receiver gone");
        }
    }

    /// Path of the most recent event if it was `Finished`.
    fn last_finished(&self) -> Option<PathBuf> {
        self.last_finished
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ProgressSink for ForwardingSink {
    fn report(&self, progress: RawProgress) {
        match translate(&progress) {
            Some(event) => self.forward(event),
            None => debug!(
                session = self.id,
                status = %progress.status,
                "Ignoring progress callback"
            ),
        }
    }
}

/// Receiving end of a session's events.
#[derive(Debug)]
pub struct SessionEvents {
    id: SessionId,
    rx: mpsc::UnboundedReceiver<SessionEvent>,
}

impl SessionEvents {
    /// Wrap a receiver carrying the events of session `id`.
    #[must_use]
    pub const fn new(id: SessionId, rx: mpsc::UnboundedReceiver<SessionEvent>) -> Self {
        Self { id, rx }
    }

    /// Session these events belong to.
    #[must_use]
    pub const fn id(&self) -> SessionId {
        self.id
    }

    /// Next event; `None` after the outcome has been received.
    pub async fn recv(&mut self) -> Option<SessionEvent> {
        self.rx.recv().await
    }

    /// Blocking variant of [`recv`](Self::recv) for synchronous callers.
    ///
    /// Must not be called from inside an async runtime.
    pub fn blocking_recv(&mut self) -> Option<SessionEvent> {
        self.rx.blocking_recv()
    }

    /// Drain events until the outcome arrives, passing progress to `on_progress`.
    pub async fn wait(mut self, mut on_progress: impl FnMut(&ProgressEvent)) -> SessionOutcome {
        while let Some(event) = self.rx.recv().await {
            match event {
                SessionEvent::Progress(progress) => on_progress(&progress),
                SessionEvent::Outcome(outcome) => return outcome,
            }
        }
        SessionOutcome::Failed {
            message: "session ended without an outcome".to_string(),
        }
    }
}
