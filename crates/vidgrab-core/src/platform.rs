//! Source platform detection.
//!
//! Two separate questions are answered here:
//! - which format-string dialect a URL needs ([`detect`]), and
//! - which human readable platform name goes into history records
//!   ([`platform_name`]).

use serde::{Deserialize, Serialize};

/// Format-string dialect family of a source platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlatformTag {
    /// YouTube and sites with the same stream layout conventions.
    YouTubeLike,
    /// Bilibili, which exposes separate DASH video and audio streams.
    Bilibili,
    /// Anything else.
    Generic,
}

impl PlatformTag {
    /// Lowercase identifier used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::YouTubeLike => "youtube_like",
            Self::Bilibili => "bilibili",
            Self::Generic => "generic",
        }
    }
}

impl std::fmt::Display for PlatformTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Host fragments that select a dialect. Checked in order.
const DIALECT_HOSTS: &[(&str, PlatformTag)] = &[
    ("bilibili.com", PlatformTag::Bilibili),
    ("b23.tv", PlatformTag::Bilibili),
    ("youtube.com", PlatformTag::YouTubeLike),
    ("youtu.be", PlatformTag::YouTubeLike),
];

/// Host suffixes mapped to display names.
const DISPLAY_NAMES: &[(&[&str], &str)] = &[
    (&["youtube.com", "youtu.be"], "YouTube"),
    (&["bilibili.com", "b23.tv"], "Bilibili"),
    (&["twitter.com", "x.com"], "Twitter/X"),
    (&["tiktok.com"], "TikTok"),
    (&["instagram.com"], "Instagram"),
    (&["facebook.com", "fb.watch"], "Facebook"),
    (&["vimeo.com"], "Vimeo"),
];

/// Display name used when no host matches.
pub const OTHER_PLATFORM: &str = "Other";

/// Classify a URL into the dialect used for format selection.
///
/// Case-insensitive substring match against known host fragments; never fails.
///
/// # Examples
///
/// ```
/// use vidgrab_core::platform::{detect, PlatformTag};
///
/// assert_eq!(detect("https://www.bilibili.com/video/BV1xx"), PlatformTag::Bilibili);
/// assert_eq!(detect("https://YOUTU.BE/abc"), PlatformTag::YouTubeLike);
/// assert_eq!(detect("https://vimeo.com/1"), PlatformTag::Generic);
/// ```
#[must_use]
pub fn detect(url: &str) -> PlatformTag {
    let lower = url.to_lowercase();
    DIALECT_HOSTS
        .iter()
        .find(|(fragment, _)| lower.contains(fragment))
        .map_or(PlatformTag::Generic, |(_, tag)| *tag)
}

/// Human readable platform name for a URL.
///
/// Matches on the host, so `x.com` does not match `dropbox.com`.
#[must_use]
pub fn platform_name(url: &str) -> &'static str {
    let Some(host) = host_of(url) else {
        return OTHER_PLATFORM;
    };

    DISPLAY_NAMES
        .iter()
        .find(|(suffixes, _)| {
            suffixes.iter().any(|suffix| {
                host == *suffix
                    || host
                        .strip_suffix(suffix)
                        .is_some_and(|rest| rest.ends_with('.'))
            })
        })
        .map_or(OTHER_PLATFORM, |(_, name)| *name)
}

/// Lowercased host of an http(s) URL, without userinfo or port.
fn host_of(url: &str) -> Option<String> {
    let lower = url.trim().to_lowercase();
    let rest = lower
        .strip_prefix("https://")
        .or_else(|| lower.strip_prefix("http://"))?;
    let authority = rest.split(['/', '?', '#']).next()?;
    let host_port = authority.rsplit('@').next()?;
    let host = host_port.split(':').next()?;

    if host.is_empty() {
        None
    } else {
        Some(host.to_string())
    }
}
