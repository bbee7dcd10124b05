//! Small helpers shared by the core and the command line front end.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

/// Maximum length (in characters) of a sanitized file name stem.
pub const MAX_FILENAME_CHARS: usize = 200;

static URL_PATTERN: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^https?://(?:(?:[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?\.)+[a-z]{2,63}\.?|localhost|\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3})(?::\d+)?(?:/?|[/?]\S+)$",
    )
    .ok()
});

/// Check whether `url` looks like a downloadable http(s) URL.
///
/// Accepts a domain name, `localhost`, or an IPv4 address, followed by an
/// optional port and path.
///
/// # Examples
///
/// ```
/// use vidgrab_core::util::is_valid_url;
///
/// assert!(is_valid_url("https://www.youtube.com/watch?v=dQw4w9WgXcQ"));
/// assert!(is_valid_url("http://localhost:8080/video"));
/// assert!(!is_valid_url("ftp://example.com/file"));
/// assert!(!is_valid_url("not a url"));
/// ```
#[must_use]
pub fn is_valid_url(url: &str) -> bool {
    let url = url.trim();
    !url.is_empty()
        && URL_PATTERN
            .as_ref()
            .is_some_and(|pattern| pattern.is_match(url))
}

/// Sanitize a string for use as a file name.
///
/// Characters that are illegal on common file systems become `_`, control
/// characters are removed, the result is trimmed and capped at
/// [`MAX_FILENAME_CHARS`] characters.
#[must_use]
pub fn sanitize_filename(name: &str) -> String {
    const ILLEGAL: [char; 9] = ['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

    let cleaned: String = name
        .chars()
        .filter(|c| !c.is_control())
        .map(|c| if ILLEGAL.contains(&c) { '_' } else { c })
        .take(MAX_FILENAME_CHARS)
        .collect();

    cleaned.trim().to_string()
}

/// Format a byte count for humans (`B`, `KB`, `MB`, `GB`, `TB`).
#[must_use]
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }

    format!("{size:.2} {}", UNITS[unit])
}

/// Format a duration as `HH:MM:SS`, or `MM:SS` when under an hour.
#[must_use]
pub fn format_duration(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    if hours > 0 {
        format!("{hours:02}:{minutes:02}:{secs:02}")
    } else {
        format!("{minutes:02}:{secs:02}")
    }
}

/// Split batch input into URLs: one per line, blank and invalid lines dropped.
#[must_use]
pub fn parse_batch_input(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && is_valid_url(line))
        .map(ToString::to_string)
        .collect()
}

/// Platform-specific executable name (`ffmpeg` -> `ffmpeg.exe` on Windows).
#[must_use]
pub fn executable_name(tool: &str) -> String {
    if cfg!(windows) {
        format!("{tool}.exe")
    } else {
        tool.to_string()
    }
}

/// Search the directories on `PATH` for an executable called `tool`.
#[must_use]
pub fn find_executable(tool: &str) -> Option<PathBuf> {
    let name = executable_name(tool);
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(&name))
        .find(|candidate| is_file(candidate))
}

fn is_file(path: &Path) -> bool {
    path.metadata().is_ok_and(|meta| meta.is_file())
}
