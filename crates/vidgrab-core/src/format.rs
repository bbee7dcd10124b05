//! Format-selection expressions.
//!
//! A [`FormatExpression`] is the string handed to the extraction engine to pick
//! streams: tiers separated by `/` are tried left to right, components of a
//! tier joined by `+` are downloaded separately and merged.
//!
//! The expressions are rendered from a per-platform dialect table rather than
//! written out by hand, so every capped tier is guaranteed to carry the same
//! height limit.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::platform::PlatformTag;
use crate::request::QualityRequest;

/// Opaque format-selection expression passed through to the extraction engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FormatExpression(String);

impl FormatExpression {
    /// The raw expression.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Fallback tiers in the order the engine tries them.
    pub fn tiers(&self) -> impl Iterator<Item = &str> {
        self.0.split('/')
    }

    /// Consume the expression, returning the raw string.
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl std::fmt::Display for FormatExpression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for FormatExpression {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, Copy)]
enum Stream {
    Video,
    Audio,
    Combined,
    AnyCombined,
}

/// One selector inside a tier, such as `bestvideo[height<=720][ext=mp4]`.
#[derive(Debug, Clone, Copy)]
struct Selector {
    stream: Stream,
    capped: bool,
    ext: Option<&'static str>,
}

impl Selector {
    const fn of(stream: Stream) -> Self {
        Self {
            stream,
            capped: false,
            ext: None,
        }
    }

    const fn capped(mut self) -> Self {
        self.capped = true;
        self
    }

    const fn ext(mut self, ext: &'static str) -> Self {
        self.ext = Some(ext);
        self
    }
}

type Tier = &'static [Selector];

/// Selector vocabulary and tier lists of one platform family.
struct Dialect {
    video: &'static str,
    audio: &'static str,
    combined: &'static str,
    any_combined: &'static str,
    audio_only: &'static [Tier],
    best_av: &'static [Tier],
    capped: &'static [Tier],
}

const VIDEO: Selector = Selector::of(Stream::Video);
const AUDIO: Selector = Selector::of(Stream::Audio);
const COMBINED: Selector = Selector::of(Stream::Combined);
const ANY_COMBINED: Selector = Selector::of(Stream::AnyCombined);

const STANDARD: Dialect = Dialect {
    video: "bestvideo",
    audio: "bestaudio",
    combined: "best",
    any_combined: "best",
    audio_only: &[&[AUDIO], &[COMBINED]],
    best_av: &[
        &[VIDEO.ext("mp4"), AUDIO.ext("m4a")],
        &[COMBINED.ext("mp4")],
        &[COMBINED],
    ],
    capped: &[
        &[VIDEO.capped().ext("mp4"), AUDIO.ext("m4a")],
        &[COMBINED.capped().ext("mp4")],
        &[COMBINED.capped()],
    ],
};

const BILIBILI: Dialect = Dialect {
    video: "bv*",
    audio: "ba*",
    combined: "b",
    any_combined: "b*",
    audio_only: &[&[AUDIO], &[ANY_COMBINED]],
    best_av: &[&[VIDEO, AUDIO], &[ANY_COMBINED]],
    capped: &[
        &[VIDEO.capped(), AUDIO],
        &[COMBINED.capped()],
        &[ANY_COMBINED.capped()],
    ],
};

const fn dialect_for(tag: PlatformTag) -> &'static Dialect {
    match tag {
        PlatformTag::Bilibili => &BILIBILI,
        PlatformTag::YouTubeLike | PlatformTag::Generic => &STANDARD,
    }
}

/// Map a platform and quality request to a format-selection expression.
///
/// Pure and deterministic.
///
/// # Examples
///
/// ```
/// use vidgrab_core::format::select;
/// use vidgrab_core::platform::PlatformTag;
/// use vidgrab_core::request::QualityRequest;
///
/// let expr = select(PlatformTag::Bilibili, QualityRequest::CappedHeight(720));
/// assert_eq!(expr.as_str(), "bv*[height<=720]+ba*/b[height<=720]/b*[height<=720]");
/// ```
#[must_use]
pub fn select(tag: PlatformTag, quality: QualityRequest) -> FormatExpression {
    let dialect = dialect_for(tag);
    let (tiers, height) = match quality {
        QualityRequest::BestAudioOnly => (dialect.audio_only, None),
        QualityRequest::BestAv => (dialect.best_av, None),
        QualityRequest::CappedHeight(height) => (dialect.capped, Some(height)),
    };

    let rendered: Vec<String> = tiers
        .iter()
        .map(|tier| {
            tier.iter()
                .map(|selector| render(dialect, *selector, height))
                .collect::<Vec<_>>()
                .join("+")
        })
        .collect();

    FormatExpression(rendered.join("/"))
}

fn render(dialect: &Dialect, selector: Selector, height: Option<u32>) -> String {
    let mut out = match selector.stream {
        Stream::Video => dialect.video,
        Stream::Audio => dialect.audio,
        Stream::Combined => dialect.combined,
        Stream::AnyCombined => dialect.any_combined,
    }
    .to_string();

    if selector.capped
        && let Some(height) = height
    {
        let _ = write!(out, "[height<={height}]");
    }
    if let Some(ext) = selector.ext {
        let _ = write!(out, "[ext={ext}]");
    }

    out
}
