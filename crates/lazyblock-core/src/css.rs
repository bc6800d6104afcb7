//! Validators for untrusted CSS values.
//!
//! Every validator here is a pure function: it either returns a value that is safe to
//! interpolate into a CSS declaration, or the caller-supplied default. Matching is anchored to
//! the whole (trimmed) input so trailing payloads like `100px; background:url(x)` never pass.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Fallback color for the play overlay icon.
pub const DEFAULT_PLAY_ICON_COLOR: &str = "rgba(0,0,0,0.7)";

const DIMENSION_KEYWORDS: &[&str] = &[
    "auto",
    "inherit",
    "initial",
    "unset",
    "none",
    "max-content",
    "min-content",
    "fit-content",
];

const NAMED_COLORS: &[&str] = &[
    "transparent",
    "currentcolor",
    "black",
    "white",
    "red",
    "green",
    "blue",
    "yellow",
    "orange",
    "purple",
    "pink",
    "brown",
    "gray",
    "grey",
    "silver",
    "maroon",
    "olive",
    "lime",
    "aqua",
    "teal",
    "navy",
    "fuchsia",
    "cyan",
    "magenta",
    "gold",
    "indigo",
    "violet",
    "crimson",
    "coral",
    "salmon",
    "tomato",
    "orchid",
    "plum",
    "khaki",
    "beige",
    "ivory",
    "lavender",
    "turquoise",
    "tan",
    "chocolate",
    "darkgray",
    "darkgrey",
    "lightgray",
    "lightgrey",
    "dimgray",
    "dimgrey",
    "darkred",
    "darkblue",
    "darkgreen",
    "lightblue",
    "lightgreen",
    "skyblue",
    "steelblue",
    "slategray",
    "slategrey",
    "whitesmoke",
];

fn dimension_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[0-9]+(?:\.[0-9]+)?(?:px|%|em|rem|vh|vw|vmin|vmax|ch|ex|cm|mm|in|pt|pc)$")
            .expect("valid regex")
    })
}

fn hex_color_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^#(?:[0-9a-f]{3}|[0-9a-f]{6}|[0-9a-f]{8})$").expect("valid regex")
    })
}

fn rgb_color_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^rgba?\(\s*([0-9]{1,3})\s*,\s*([0-9]{1,3})\s*,\s*([0-9]{1,3})\s*(?:,\s*([0-9]*\.?[0-9]+)\s*)?\)$",
        )
        .expect("valid regex")
    })
}

fn hsl_color_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^hsla?\(\s*([0-9]{1,3})\s*,\s*([0-9]{1,3})%\s*,\s*([0-9]{1,3})%\s*(?:,\s*([0-9]*\.?[0-9]+)\s*)?\)$",
        )
        .expect("valid regex")
    })
}

fn dangerous_css_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)@import|@charset|expression\(|javascript:|vbscript:|data:|behavior:|-moz-binding|/\*|\*/|\\[0-9a-f]{1,6}\s?|\\|[{};<>]",
        )
        .expect("valid regex")
    })
}

/// Validates a CSS length (or length keyword).
///
/// Accepts the keywords `auto`, `inherit`, `initial`, `unset`, `none`, `max-content`,
/// `min-content` and `fit-content`, or an unsigned integer/decimal immediately followed by a
/// known unit, case-insensitively. Returns the trimmed value as written, or `default` for
/// anything else.
pub fn validate_dimension(raw: &str, default: &str) -> String {
    let value = raw.trim();
    let lower = value.to_ascii_lowercase();
    if lower.is_empty() {
        return default.to_string();
    }
    if DIMENSION_KEYWORDS.contains(&lower.as_str()) || dimension_regex().is_match(&lower) {
        return value.to_string();
    }
    default.to_string()
}

/// Like [`validate_dimension`], but an invalid or empty value yields `None` ("unset").
pub fn validate_optional_dimension(raw: &str) -> Option<String> {
    let value = validate_dimension(raw, "");
    (!value.is_empty()).then_some(value)
}

fn alpha_in_range(raw: Option<&str>) -> bool {
    match raw {
        None => true,
        Some(a) => a.parse::<f64>().is_ok_and(|v| (0.0..=1.0).contains(&v)),
    }
}

fn channel_at_most(raw: &str, max: u32) -> bool {
    raw.parse::<u32>().is_ok_and(|v| v <= max)
}

/// Validates a CSS color; anything unrecognized maps to `default`.
///
/// Matching ignores ASCII case, and an accepted color is returned trimmed but otherwise as written.
pub fn validate_color(raw: &str, default: &str) -> String {
    let value = raw.trim();
    if color_is_valid(&value.to_ascii_lowercase()) {
        value.to_string()
    } else {
        default.to_string()
    }
}

fn color_is_valid(value: &str) -> bool {
    if value.is_empty() {
        return false;
    }
    if hex_color_regex().is_match(value) || NAMED_COLORS.contains(&value) {
        return true;
    }
    if let Some(caps) = rgb_color_regex().captures(value) {
        let channels_ok = (1..=3).all(|i| channel_at_most(&caps[i], 255));
        return channels_ok && alpha_in_range(caps.get(4).map(|m| m.as_str()));
    }
    if let Some(caps) = hsl_color_regex().captures(value) {
        return channel_at_most(&caps[1], 360)
            && channel_at_most(&caps[2], 100)
            && channel_at_most(&caps[3], 100)
            && alpha_in_range(caps.get(4).map(|m| m.as_str()));
    }
    false
}

/// Validates the play icon color, falling back to [`DEFAULT_PLAY_ICON_COLOR`].
pub fn validate_play_icon_color(raw: &str) -> String {
    validate_color(raw, DEFAULT_PLAY_ICON_COLOR)
}

/// Removes characters and tokens that could break out of a CSS declaration.
///
/// This is a removal pass, repeated until the value stops changing, so fragments like
/// `expexpression(ression(` cannot reassemble into a dangerous token. Call it once on an
/// already validated value, right before writing it into a `<style>` block.
pub fn escape_css_value(value: &str) -> String {
    let mut out = value.to_string();
    loop {
        let next = dangerous_css_regex().replace_all(&out, "").into_owned();
        if next == out {
            return out;
        }
        out = next;
    }
}

fn unsafe_inline_style_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)expression\s*\(|javascript:|vbscript:|behavior\s*:|-moz-binding|@import|url\s*\(|\\|/\*|[<>]",
        )
        .expect("valid regex")
    })
}

/// Returns `false` for `style="…"` attribute values that can load resources or run code.
///
/// Inline styles are kept or dropped as a whole; they are never rewritten.
pub fn is_safe_inline_style(value: &str) -> bool {
    !unsafe_inline_style_regex().is_match(value)
}

/// Keeps only `[A-Za-z0-9_-]`, for selectors derived from instance ids.
pub fn escape_css_ident(ident: &str) -> String {
    ident
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect()
}

/// Closed set of aspect ratios offered to authors. `Unset` serializes as `""`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AspectRatio {
    #[default]
    Unset,
    Widescreen,
    Classic,
    Square,
    Vertical,
    Ultrawide,
}

impl AspectRatio {
    pub const ALL: [AspectRatio; 6] = [
        AspectRatio::Unset,
        AspectRatio::Widescreen,
        AspectRatio::Classic,
        AspectRatio::Square,
        AspectRatio::Vertical,
        AspectRatio::Ultrawide,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AspectRatio::Unset => "",
            AspectRatio::Widescreen => "16/9",
            AspectRatio::Classic => "4/3",
            AspectRatio::Square => "1/1",
            AspectRatio::Vertical => "9/16",
            AspectRatio::Ultrawide => "21/9",
        }
    }

    pub fn is_set(self) -> bool {
        self != AspectRatio::Unset
    }
}

/// Membership test against the fixed ratio list; non-members are `Unset`.
pub fn validate_aspect_ratio(raw: &str) -> AspectRatio {
    let raw = raw.trim();
    AspectRatio::ALL
        .into_iter()
        .find(|r| r.as_str() == raw)
        .unwrap_or_default()
}

impl From<String> for AspectRatio {
    fn from(value: String) -> Self {
        validate_aspect_ratio(&value)
    }
}

impl From<AspectRatio> for String {
    fn from(value: AspectRatio) -> Self {
        value.as_str().to_string()
    }
}
