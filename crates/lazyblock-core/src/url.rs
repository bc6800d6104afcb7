//! URL policy for author-supplied links and media sources.

use regex::Regex;
use std::sync::OnceLock;
use url::Url;

fn html_ctrl_entity_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)&(newline|tab);").expect("valid regex"))
}

fn whitespace_escape_chars_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)(\\|%5c)((%(6e|72|74))|[nrt])").expect("valid regex"))
}

fn colon_entity_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)&colon;|&#0*58;?|&#x0*3a;?").expect("valid regex"))
}

fn is_ctrl_character(ch: char) -> bool {
    matches!(ch,
        '\u{0000}'..='\u{001F}'
        | '\u{007F}'..='\u{009F}'
        | '\u{2000}'..='\u{200D}'
        | '\u{FEFF}'
    )
}

fn strip_ctrl_characters(input: &str) -> String {
    input.chars().filter(|&ch| !is_ctrl_character(ch)).collect()
}

fn from_hex_byte(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

/// Percent-decodes like `decodeURIComponent`; malformed input is returned unchanged.
fn decode_uri_component(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());

    let mut i = 0usize;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let (Some(hi), Some(lo)) = (
                bytes.get(i + 1).copied().and_then(from_hex_byte),
                bytes.get(i + 2).copied().and_then(from_hex_byte),
            ) else {
                return input.to_string();
            };
            out.push((hi << 4) | lo);
            i += 3;
            continue;
        }
        out.push(bytes[i]);
        i += 1;
    }

    String::from_utf8(out).unwrap_or_else(|_| input.to_string())
}

/// Decodes numeric character references and the named entities that matter for scheme
/// detection.
fn decode_html_characters(input: &str) -> String {
    let colons = colon_entity_regex().replace_all(input, ":");
    let unescaped = htmlize::unescape(colons.as_ref());
    strip_ctrl_characters(&unescaped)
}

fn needs_another_pass(input: &str) -> bool {
    input.chars().any(is_ctrl_character)
        || input.contains("&#")
        || colon_entity_regex().is_match(input)
        || html_ctrl_entity_regex().is_match(input)
        || whitespace_escape_chars_regex().is_match(input)
        || (input.contains('%') && decode_uri_component(input) != input)
}

fn url_scheme(input: &str) -> Option<String> {
    let colon = input.find(':')?;
    let candidate = &input[..colon];
    let first_delim = input.find(['/', '?', '#']).unwrap_or(usize::MAX);
    if colon > first_delim {
        return None;
    }
    Some(candidate.trim().to_ascii_lowercase())
}

fn is_blocked_scheme(scheme: &str) -> bool {
    let trimmed = scheme.trim_start_matches(|ch: char| !(ch.is_ascii_alphanumeric() || ch == '_'));
    trimmed.starts_with("javascript") || trimmed.starts_with("vbscript") || trimmed.starts_with("data")
}

const ALLOWED_SCHEMES: &[&str] = &["http", "https", "mailto", "tel"];

/// Normalizes an untrusted URL, or returns `None` when it must not be emitted.
///
/// Obfuscation (percent encoding, character references, control characters, escaped
/// whitespace) is peeled off repeatedly before the scheme is inspected. Relative references
/// and fragments pass through; absolute URLs must use `http`, `https`, `mailto` or `tel`.
pub fn sanitize_url(raw: &str) -> Option<String> {
    let mut decoded = decode_uri_component(raw.trim());

    // Bounded: each pass strictly removes an encoding layer, real inputs settle in 1-3.
    for _ in 0..16 {
        decoded = decode_html_characters(&decoded);
        decoded = html_ctrl_entity_regex().replace_all(&decoded, "").into_owned();
        decoded = whitespace_escape_chars_regex()
            .replace_all(&decoded, "")
            .into_owned();
        decoded = decode_uri_component(decoded.trim());
        if !needs_another_pass(&decoded) {
            break;
        }
    }

    if decoded.is_empty() {
        return None;
    }

    if matches!(decoded.as_bytes().first(), Some(b'.' | b'/' | b'#' | b'?')) {
        if decoded.starts_with("//") {
            return Url::parse(&format!("https:{decoded}"))
                .ok()
                .map(|_| raw.trim().to_string());
        }
        return Some(raw.trim().to_string());
    }

    let Some(scheme) = url_scheme(&decoded) else {
        return Some(raw.trim().to_string());
    };

    if is_blocked_scheme(&scheme) || !ALLOWED_SCHEMES.contains(&scheme.as_str()) {
        return None;
    }

    if scheme == "http" || scheme == "https" {
        let parsed = Url::parse(&decoded.replace('\\', "/")).ok()?;
        return Some(parsed.to_string());
    }

    Some(decoded)
}

/// Returns `true` when [`sanitize_url`] would keep the value.
pub fn is_allowed_url(raw: &str) -> bool {
    sanitize_url(raw).is_some()
}
