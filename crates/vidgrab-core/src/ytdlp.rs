//! Extraction engine backed by the `yt-dlp` executable.
//!
//! Progress is read from machine readable lines requested through
//! `--progress-template` and the final file path through `--print after_move:`.
//! `--print` puts yt-dlp into quiet mode, which moves progress output to
//! stderr, so both pipes are read and marker lines are accepted from either.

use std::collections::VecDeque;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info, trace, warn};

use crate::config::{DEFAULT_RETRIES, DEFAULT_SOCKET_TIMEOUT_SECS, EngineConfig};
use crate::engine::{EngineError, ExtractionEngine, SharedCancel, SharedSink};
use crate::error::{Error, Result};
use crate::media::{MediaInfo, StreamInfo};
use crate::postprocess::{PostProcessPlan, PostProcessStep};
use crate::progress::RawProgress;
use crate::request::DownloadRequest;
use crate::util::find_executable;

/// Engine name reported in logs.
pub const ENGINE_NAME: &str = "yt-dlp";

const PROGRESS_MARKER: &str = "[vidgrab:progress] ";
const POSTPROCESS_MARKER: &str = "[vidgrab:postprocess] ";
const FILE_MARKER: &str = "[vidgrab:file] ";

/// Subtitle formats in order of preference.
const SUBTITLE_FORMATS: &str = "srt/ass/vtt";

/// How often the cancel predicate is polled while no output arrives.
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Stderr lines kept for error classification.
const STDERR_TAIL_LINES: usize = 50;

/// Install locations checked before `PATH`.
const COMMON_PATHS: &[&str] = &[
    "/opt/homebrew/bin/yt-dlp",
    "/usr/local/bin/yt-dlp",
    "/usr/bin/yt-dlp",
];

/// Find the yt-dlp binary: configured path, common install paths, then `PATH`.
#[must_use]
pub fn locate_binary(configured: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = configured {
        if path.is_file() {
            return Some(path.to_path_buf());
        }
        warn!(path = %path.display(), "Configured yt-dlp binary not found, searching");
    }

    COMMON_PATHS
        .iter()
        .map(PathBuf::from)
        .find(|path| path.is_file())
        .or_else(|| find_executable(ENGINE_NAME))
}

/// [`ExtractionEngine`] that drives the `yt-dlp` command line tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YtDlpEngine {
    binary: PathBuf,
    socket_timeout_secs: u32,
    retries: u32,
}

impl YtDlpEngine {
    /// Create an engine running `binary`.
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            socket_timeout_secs: DEFAULT_SOCKET_TIMEOUT_SECS,
            retries: DEFAULT_RETRIES,
        }
    }

    /// Create an engine from configuration, locating the binary.
    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        let binary = locate_binary(config.ytdlp_path.as_deref()).ok_or_else(|| {
            Error::EngineUnavailable(
                "yt-dlp was not found; install it or set engine.ytdlp_path".to_string(),
            )
        })?;
        info!(binary = %binary.display(), "Using yt-dlp");

        Ok(Self::new(binary)
            .with_socket_timeout(config.socket_timeout_secs)
            .with_retries(config.retries))
    }

    /// Set the socket timeout in seconds.
    #[must_use]
    pub const fn with_socket_timeout(mut self, seconds: u32) -> Self {
        self.socket_timeout_secs = seconds;
        self
    }

    /// Set the number of retries.
    #[must_use]
    pub const fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Path of the yt-dlp binary.
    #[must_use]
    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// Command line arguments for downloading `request`.
    #[must_use]
    pub fn download_args(
        &self,
        request: &DownloadRequest,
        muxer_hint: Option<&Path>,
    ) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "-f".into(),
            request.format.as_str().into(),
            "-o".into(),
            request.destination_template.clone(),
            "--newline".into(),
            "--no-playlist".into(),
            "--no-colors".into(),
            "--no-simulate".into(),
            "--progress".into(),
            "--progress-template".into(),
            format!("download:{PROGRESS_MARKER}%(progress)j"),
            "--progress-template".into(),
            format!(
                "postprocess:{POSTPROCESS_MARKER}%(progress.status)s %(progress.postprocessor)s"
            ),
            "--print".into(),
            format!("after_move:{FILE_MARKER}%(filepath)s"),
            "--socket-timeout".into(),
            self.socket_timeout_secs.to_string(),
            "--retries".into(),
            self.retries.to_string(),
        ];

        let plan = PostProcessPlan::for_request(request);
        if let Some(container) = plan.merge_container() {
            args.extend(["--merge-output-format".to_string(), container.as_str().to_string()]);
        }

        if request.want_subtitles {
            let langs: Vec<&str> = request.subtitle_langs.iter().map(String::as_str).collect();
            args.extend([
                "--write-subs".to_string(),
                "--write-auto-subs".to_string(),
                "--sub-langs".to_string(),
                langs.join(","),
                "--sub-format".to_string(),
                SUBTITLE_FORMATS.to_string(),
            ]);
        }

        for step in plan.steps() {
            match step {
                PostProcessStep::ExtractAudio {
                    codec,
                    quality_kbps,
                } => args.extend([
                    "-x".to_string(),
                    "--audio-format".to_string(),
                    codec.clone(),
                    "--audio-quality".to_string(),
                    format!("{quality_kbps}K"),
                ]),
                PostProcessStep::ConvertVideo { container } => {
                    args.extend(["--recode-video".to_string(), container.as_str().to_string()]);
                }
                PostProcessStep::EmbedSubtitles => args.push("--embed-subs".to_string()),
            }
        }

        if let Some(dir) = muxer_hint {
            args.extend([
                "--ffmpeg-location".to_string(),
                dir.to_string_lossy().into_owned(),
            ]);
        }

        args.push("--".into());
        args.push(request.url.clone());
        args
    }

    fn resolve_args(&self, url: &str) -> Vec<String> {
        vec![
            "--dump-json".into(),
            "--no-playlist".into(),
            "--no-warnings".into(),
            "--skip-download".into(),
            "--socket-timeout".into(),
            self.socket_timeout_secs.to_string(),
            "--".into(),
            url.into(),
        ]
    }

    fn spawn(&self, args: &[String]) -> std::result::Result<Child, EngineError> {
        Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                EngineError::ToolNotFound(format!(
                    "failed to start {}: {e}",
                    self.binary.display()
                ))
            })
    }
}

impl ExtractionEngine for YtDlpEngine {
    fn name(&self) -> &'static str {
        ENGINE_NAME
    }

    fn resolve(&self, url: &str) -> std::result::Result<MediaInfo, EngineError> {
        debug!(url, "Resolving media");
        let output = Command::new(&self.binary)
            .args(self.resolve_args(url))
            .stdin(Stdio::null())
            .output()
            .map_err(|e| {
                EngineError::ToolNotFound(format!(
                    "failed to start {}: {e}",
                    self.binary.display()
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_failure(&stderr, output.status.code()));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let line = stdout
            .lines()
            .find(|line| line.trim_start().starts_with('{'))
            .ok_or_else(|| EngineError::Transfer("yt-dlp returned no metadata".to_string()))?;

        let dumped: DumpedMedia = serde_json::from_str(line)
            .map_err(|e| EngineError::Transfer(format!("invalid metadata from yt-dlp: {e}")))?;
        Ok(dumped.into())
    }

    fn fetch(
        &self,
        request: &DownloadRequest,
        sink: SharedSink,
        cancel: SharedCancel,
        muxer_hint: Option<PathBuf>,
    ) -> std::result::Result<PathBuf, EngineError> {
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        let args = self.download_args(request, muxer_hint.as_deref());
        debug!(binary = %self.binary.display(), ?args, "Starting yt-dlp");
        let mut child = self.spawn(&args)?;

        let (tx, rx) = mpsc::channel();
        if let Some(stdout) = child.stdout.take() {
            pump_lines(stdout, Stream::Stdout, tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            pump_lines(stderr, Stream::Stderr, tx);
        }

        let mut final_path = None;
        let mut stderr_tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES);

        loop {
            let (stream, line) = match rx.recv_timeout(CANCEL_POLL_INTERVAL) {
                Ok(received) => received,
                Err(mpsc::RecvTimeoutError::Timeout) => {
                    if cancel.is_cancelled() {
                        return Err(stop(&mut child));
                    }
                    continue;
                }
                Err(mpsc::RecvTimeoutError::Disconnected) => break,
            };

            match parse_line(&line) {
                Some(OutputLine::Progress(raw)) => {
                    if cancel.is_cancelled() {
                        return Err(stop(&mut child));
                    }
                    sink.report(raw);
                }
                Some(OutputLine::FinalPath(path)) => final_path = Some(path),
                None if stream == Stream::Stderr => {
                    trace!(line = %line, "yt-dlp stderr");
                    if stderr_tail.len() == STDERR_TAIL_LINES {
                        stderr_tail.pop_front();
                    }
                    stderr_tail.push_back(line);
                }
                None => trace!(line = %line, "yt-dlp stdout"),
            }
        }

        let status = child
            .wait()
            .map_err(|e| EngineError::Transfer(format!("failed to wait for yt-dlp: {e}")))?;

        if !status.success() {
            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
            let stderr = Vec::from(stderr_tail).join("\n");
            return Err(classify_failure(&stderr, status.code()));
        }

        final_path.ok_or_else(|| {
            EngineError::Transfer("yt-dlp finished without reporting the output file".to_string())
        })
    }
}

fn stop(child: &mut Child) -> EngineError {
    info!(pid = child.id(), "Cancelling yt-dlp");
    if let Err(e) = child.kill() {
        debug!(error = %e, "yt-dlp already exited");
    }
    let _ = child.wait();
    EngineError::Cancelled
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stream {
    Stdout,
    Stderr,
}

fn pump_lines<R>(reader: R, stream: Stream, tx: mpsc::Sender<(Stream, String)>)
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) => break,
                Ok(_) => {
                    let line = decode_line(&buf);
                    if tx.send((stream, line)).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    debug!(?stream, error = %e, "Stopped reading yt-dlp output");
                    break;
                }
            }
        }
    });
}

/// Decode one raw output line, replacing invalid UTF-8 and dropping the line ending.
fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}

#[derive(Debug, Clone, PartialEq)]
enum OutputLine {
    Progress(RawProgress),
    FinalPath(PathBuf),
}

fn parse_line(line: &str) -> Option<OutputLine> {
    let line = line.trim_end();

    if let Some(json) = line.strip_prefix(PROGRESS_MARKER) {
        return match serde_json::from_str::<RawProgress>(json) {
            Ok(raw) => Some(OutputLine::Progress(raw)),
            Err(e) => {
                debug!(error = %e, "Unparseable progress line");
                None
            }
        };
    }

    if let Some(rest) = line.strip_prefix(POSTPROCESS_MARKER) {
        let (status, step) = rest.split_once(' ')?;
        return (status == "started")
            .then(|| OutputLine::Progress(RawProgress::postprocessing(step)));
    }

    line.strip_prefix(FILE_MARKER)
        .filter(|path| !path.is_empty())
        .map(|path| OutputLine::FinalPath(PathBuf::from(path)))
}

/// Map yt-dlp's stderr to an engine error.
pub(crate) fn classify_failure(stderr: &str, exit_code: Option<i32>) -> EngineError {
    let lower = stderr.to_lowercase();
    let detail = stderr
        .lines()
        .rev()
        .find_map(|line| line.trim().strip_prefix("ERROR:").map(str::trim))
        .or_else(|| stderr.lines().rev().map(str::trim).find(|line| !line.is_empty()))
        .map_or_else(
            || match exit_code {
                Some(code) => format!("yt-dlp exited with status {code}"),
                None => "yt-dlp was terminated".to_string(),
            },
            ToString::to_string,
        );

    if lower.contains("unsupported url") {
        EngineError::UnsupportedUrl(detail)
    } else if lower.contains("requested format is not available") {
        EngineError::NoMatchingFormat(detail)
    } else if lower.contains("ffmpeg")
        && (lower.contains("not installed") || lower.contains("not found"))
    {
        EngineError::MuxerMissing(detail)
    } else {
        EngineError::Transfer(detail)
    }
}

#[derive(Debug, Deserialize)]
struct DumpedMedia {
    title: Option<String>,
    duration: Option<f64>,
    thumbnail: Option<String>,
    uploader: Option<String>,
    view_count: Option<u64>,
    webpage_url: Option<String>,
    #[serde(default)]
    formats: Vec<DumpedFormat>,
}

#[derive(Debug, Deserialize)]
struct DumpedFormat {
    format_id: Option<String>,
    ext: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    fps: Option<f64>,
    vcodec: Option<String>,
    acodec: Option<String>,
    filesize: Option<f64>,
    filesize_approx: Option<f64>,
}

fn to_bytes(value: Option<f64>) -> Option<u64> {
    value
        .filter(|v| v.is_finite() && *v >= 0.0)
        .map(|v| v as u64)
}

impl From<DumpedFormat> for StreamInfo {
    fn from(format: DumpedFormat) -> Self {
        Self {
            format_id: format.format_id.unwrap_or_default(),
            ext: format.ext.unwrap_or_default(),
            width: format.width,
            height: format.height,
            fps: format.fps,
            vcodec: format.vcodec,
            acodec: format.acodec,
            filesize: to_bytes(format.filesize),
            filesize_approx: to_bytes(format.filesize_approx),
        }
    }
}

impl From<DumpedMedia> for MediaInfo {
    fn from(media: DumpedMedia) -> Self {
        Self {
            title: media
                .title
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| "Untitled".to_string()),
            duration_seconds: to_bytes(media.duration),
            thumbnail_url: media.thumbnail,
            uploader: media.uploader,
            view_count: media.view_count,
            webpage_url: media.webpage_url,
            streams: media.formats.into_iter().map(StreamInfo::from).collect(),
        }
    }
}
