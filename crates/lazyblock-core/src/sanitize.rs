//! Allowlist sanitizer for author-supplied embed HTML.
//!
//! Sanitizing is two sequential pure passes:
//! 1. [`ContentSanitizer`] reduces the markup to an [`AllowList`] (which callers may extend);
//! 2. [`strip_event_handlers`] unconditionally removes every `on*` attribute. This second pass
//!    takes no configuration, so no allowlist extension can bring an event handler back.

use crate::css;
use crate::url;
use lol_html::{RewriteStrSettings, element, rewrite_str};
use regex::Regex;
use std::borrow::Cow;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::OnceLock;

/// Attribute names removed from every element by the hard post-filter, in addition to any
/// other `on*` attribute.
pub const HARD_DENYLIST: &[&str] = &[
    "onclick",
    "onerror",
    "onload",
    "onmouseover",
    "onfocus",
    "onblur",
];

/// Embed-oriented elements allowed on top of the rich-text baseline.
pub const EMBED_TAGS: &[&str] = &["iframe", "embed", "object", "param", "source", "video", "audio"];

/// Attributes kept on `<script>` when the caller may author scripts.
pub const SCRIPT_ATTRIBUTES: &[&str] = &[
    "src",
    "type",
    "async",
    "defer",
    "charset",
    "id",
    "crossorigin",
    "integrity",
];

const GLOBAL_ATTRIBUTES: &[&str] = &["class", "id", "style", "title", "lang", "dir", "role"];

const RICH_TEXT_TAGS: &[(&str, &[&str])] = &[
    ("a", &["href", "target", "rel", "name", "hreflang", "type"]),
    ("abbr", &[]),
    ("article", &[]),
    ("b", &[]),
    ("blockquote", &["cite"]),
    ("br", &[]),
    ("caption", &[]),
    ("cite", &[]),
    ("code", &[]),
    ("dd", &[]),
    ("del", &["datetime"]),
    ("details", &["open"]),
    ("div", &[]),
    ("dl", &[]),
    ("dt", &[]),
    ("em", &[]),
    ("figcaption", &[]),
    ("figure", &[]),
    ("footer", &[]),
    ("h1", &[]),
    ("h2", &[]),
    ("h3", &[]),
    ("h4", &[]),
    ("h5", &[]),
    ("h6", &[]),
    ("header", &[]),
    ("hr", &[]),
    ("i", &[]),
    (
        "img",
        &["src", "alt", "width", "height", "loading", "srcset", "sizes", "decoding"],
    ),
    ("ins", &["datetime"]),
    ("kbd", &[]),
    ("li", &["value"]),
    ("mark", &[]),
    ("ol", &["start", "reversed", "type"]),
    ("p", &[]),
    ("picture", &[]),
    ("pre", &[]),
    ("q", &["cite"]),
    ("s", &[]),
    ("section", &[]),
    ("small", &[]),
    ("span", &[]),
    ("strong", &[]),
    ("sub", &[]),
    ("summary", &[]),
    ("sup", &[]),
    ("table", &[]),
    ("tbody", &[]),
    ("td", &["colspan", "rowspan"]),
    ("tfoot", &[]),
    ("th", &["colspan", "rowspan", "scope"]),
    ("thead", &[]),
    ("time", &["datetime"]),
    ("tr", &[]),
    ("u", &[]),
    ("ul", &[]),
];

const EMBED_TAG_ATTRIBUTES: &[(&str, &[&str])] = &[
    (
        "iframe",
        &[
            "src",
            "width",
            "height",
            "frameborder",
            "allow",
            "allowfullscreen",
            "loading",
            "title",
            "name",
            "class",
            "id",
            "style",
            "referrerpolicy",
            "sandbox",
        ],
    ),
    ("embed", &["src", "type", "width", "height", "title"]),
    ("object", &["data", "type", "width", "height", "name", "title"]),
    ("param", &["name", "value"]),
    ("source", &["src", "srcset", "type", "media", "sizes"]),
    (
        "video",
        &[
            "src",
            "poster",
            "width",
            "height",
            "controls",
            "autoplay",
            "loop",
            "muted",
            "playsinline",
            "preload",
        ],
    ),
    ("audio", &["src", "controls", "autoplay", "loop", "muted", "preload"]),
];

/// Disallowed elements whose content is dropped together with the element. Any other
/// disallowed element is unwrapped and its children kept.
const DROP_WITH_CONTENT: &[&str] = &[
    "script", "style", "template", "noscript", "noembed", "noframes", "xmp", "plaintext",
    "title", "textarea", "select", "head", "base", "meta", "link", "frameset", "frame", "applet",
    "svg", "math",
];

const URI_ATTRIBUTES: &[&str] = &[
    "href",
    "src",
    "data",
    "poster",
    "action",
    "cite",
    "codebase",
    "formaction",
    "background",
];

fn data_attr_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^data-[\-\w.]+$").expect("valid regex"))
}

fn aria_attr_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^aria-[\-\w]+$").expect("valid regex"))
}

fn iframe_open_tag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)<iframe\b(?:[^>"']|"[^"]*"|'[^']*')*>"#).expect("valid regex")
    })
}

fn tag_attribute_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"([^\s"'>/=]+)(?:\s*=\s*(?:"[^"]*"|'[^']*'|[^\s"'>]+))?"#)
            .expect("valid regex")
    })
}

/// Returns `true` for attribute names that register inline event handlers.
pub fn is_event_handler_attribute(name: &str) -> bool {
    let lc = name.trim().to_ascii_lowercase();
    HARD_DENYLIST.contains(&lc.as_str()) || (lc.len() > 2 && lc.starts_with("on"))
}

/// Per-element attribute allowlist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowList {
    tags: HashMap<String, HashSet<String>>,
    global: HashSet<String>,
    allow_data_attr: bool,
    allow_aria_attr: bool,
}

impl AllowList {
    /// Rich-text baseline plus the embed elements. Never includes `script`.
    pub fn embeds() -> Self {
        let mut list = Self {
            tags: HashMap::new(),
            global: GLOBAL_ATTRIBUTES.iter().map(|s| s.to_string()).collect(),
            allow_data_attr: true,
            allow_aria_attr: true,
        };
        for (tag, attrs) in RICH_TEXT_TAGS.iter().chain(EMBED_TAG_ATTRIBUTES) {
            list.extend(tag, attrs.iter().copied());
        }
        list
    }

    /// [`AllowList::embeds`], plus `script` when `privileged`.
    pub fn for_caller(privileged: bool) -> Self {
        let mut list = Self::embeds();
        if privileged {
            list.extend("script", SCRIPT_ATTRIBUTES.iter().copied());
        }
        list
    }

    fn shared(privileged: bool) -> &'static AllowList {
        static BASE: OnceLock<AllowList> = OnceLock::new();
        static PRIVILEGED: OnceLock<AllowList> = OnceLock::new();
        if privileged {
            PRIVILEGED.get_or_init(|| AllowList::for_caller(true))
        } else {
            BASE.get_or_init(|| AllowList::for_caller(false))
        }
    }

    /// Union-extends the allowlist: adds `tag` (if missing) and the given attributes.
    pub fn extend<'a>(&mut self, tag: &str, attrs: impl IntoIterator<Item = &'a str>) -> &mut Self {
        let entry = self.tags.entry(tag.to_ascii_lowercase()).or_default();
        for attr in attrs {
            entry.insert(attr.to_ascii_lowercase());
        }
        self
    }

    pub fn allows_tag(&self, lc_tag: &str) -> bool {
        self.tags.contains_key(lc_tag)
    }

    pub fn allows_attribute(&self, lc_tag: &str, lc_name: &str) -> bool {
        let Some(attrs) = self.tags.get(lc_tag) else {
            return false;
        };
        if attrs.contains(lc_name) || self.global.contains(lc_name) {
            return true;
        }
        (self.allow_data_attr && data_attr_regex().is_match(lc_name))
            || (self.allow_aria_attr && aria_attr_regex().is_match(lc_name))
    }
}

impl Default for AllowList {
    fn default() -> Self {
        Self::embeds()
    }
}

/// HTML that has passed [`ContentSanitizer`]. Only this module can construct one.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SanitizedPayload(String);

impl SanitizedPayload {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Applies [`harden_iframes`]; it only adds allowlisted attributes, so the result is still
    /// sanitized.
    pub fn with_hardened_iframes(self) -> Self {
        Self(harden_iframes(&self.0))
    }
}

impl AsRef<str> for SanitizedPayload {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SanitizedPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Allowlist sanitizer. `script` survives only for privileged callers.
#[derive(Debug, Clone, Default)]
pub struct ContentSanitizer {
    allow_list: AllowList,
}

impl ContentSanitizer {
    pub fn new(privileged: bool) -> Self {
        Self {
            allow_list: AllowList::for_caller(privileged),
        }
    }

    pub fn with_allow_list(allow_list: AllowList) -> Self {
        Self { allow_list }
    }

    pub fn allow_list(&self) -> &AllowList {
        &self.allow_list
    }

    /// Extension point. Whatever is added here still goes through [`strip_event_handlers`].
    pub fn allow_list_mut(&mut self) -> &mut AllowList {
        &mut self.allow_list
    }

    pub fn sanitize(&self, raw: &str) -> SanitizedPayload {
        sanitize_with(raw, &self.allow_list)
    }
}

/// Sanitizes `raw` against the default allowlist for the given privilege level.
pub fn sanitize(raw: &str, privileged: bool) -> SanitizedPayload {
    sanitize_with(raw, AllowList::shared(privileged))
}

fn sanitize_with(raw: &str, allow_list: &AllowList) -> SanitizedPayload {
    let reduced = reduce_to_allow_list(raw, allow_list);
    let out = strip_event_handlers(&reduced);
    tracing::debug!(input_len = raw.len(), output_len = out.len(), "sanitized block html");
    SanitizedPayload(out)
}

/// Inert fallback when the rewriter refuses the input: everything becomes text.
fn escape_everything(text: &str, err: &dyn std::error::Error) -> String {
    tracing::error!(error = %err, "html rewrite failed; emitting escaped text");
    htmlize::escape_text(text).into_owned()
}

fn find_ascii_case_insensitive(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|w| w.eq_ignore_ascii_case(needle))
}

/// Length of a `<script …>…</script` / `<style …>…</style` run starting at `rest[0] == b'<'`.
fn raw_text_element_len(rest: &[u8]) -> Option<usize> {
    for tag in ["script", "style"] {
        let open_len = tag.len() + 1;
        let Some(after) = rest.get(open_len).copied() else {
            continue;
        };
        if !rest[1..open_len].eq_ignore_ascii_case(tag.as_bytes())
            || after.is_ascii_alphanumeric()
            || after == b'-'
        {
            continue;
        }
        let close = format!("</{tag}");
        let end = find_ascii_case_insensitive(&rest[open_len..], close.as_bytes())
            .map(|i| open_len + i + close.len())
            .unwrap_or(rest.len());
        return Some(end);
    }
    None
}

/// `lol_html` is stricter than browsers about a `<` that does not open a tag (`a < b`).
/// Browsers treat it as text; escape it up front so the rewrite keeps the same meaning.
/// Script and style bodies are raw text and are copied untouched.
fn escape_stray_lt(input: &str) -> Cow<'_, str> {
    let bytes = input.as_bytes();
    let mut out: Option<String> = None;
    let mut last = 0usize;
    let mut i = 0usize;
    while i < bytes.len() {
        if bytes[i] == b'<' {
            if let Some(len) = raw_text_element_len(&bytes[i..]) {
                i += len;
                continue;
            }
            let next = bytes.get(i + 1).copied().unwrap_or(b' ');
            let tag_start = next.is_ascii_alphabetic() || matches!(next, b'/' | b'!' | b'?');
            if !tag_start {
                let buf = out.get_or_insert_with(|| String::with_capacity(input.len() + 8));
                buf.push_str(&input[last..i]);
                buf.push_str("&lt;");
                i += 1;
                last = i;
                continue;
            }
        }
        i += 1;
    }

    match out {
        None => Cow::Borrowed(input),
        Some(mut buf) => {
            buf.push_str(&input[last..]);
            Cow::Owned(buf)
        }
    }
}

fn srcset_is_safe(value: &str) -> bool {
    value
        .split(',')
        .filter_map(|candidate| candidate.split_whitespace().next())
        .all(url::is_allowed_url)
}

fn attribute_value_is_safe(lc_name: &str, value: &str) -> bool {
    if URI_ATTRIBUTES.contains(&lc_name) {
        return value.trim().is_empty() || url::is_allowed_url(value);
    }
    match lc_name {
        "srcset" => srcset_is_safe(value),
        "style" => css::is_safe_inline_style(value),
        _ => true,
    }
}

fn reduce_to_allow_list(raw: &str, allow_list: &AllowList) -> String {
    if raw.is_empty() {
        return String::new();
    }

    let text = escape_stray_lt(raw);

    let handlers = vec![element!("*", |el| {
        if el.removed() {
            return Ok(());
        }

        let lc_tag = el.tag_name().to_ascii_lowercase();
        if !allow_list.allows_tag(&lc_tag) {
            if DROP_WITH_CONTENT.contains(&lc_tag.as_str()) {
                el.remove();
            } else {
                el.remove_and_keep_content();
            }
            return Ok(());
        }

        let attrs: Vec<(String, String)> = el
            .attributes()
            .iter()
            .map(|a| (a.name(), a.value()))
            .collect();

        for (name, value) in attrs {
            let lc_name = name.to_ascii_lowercase();
            if !allow_list.allows_attribute(&lc_tag, &lc_name)
                || !attribute_value_is_safe(&lc_name, &value)
            {
                el.remove_attribute(&name);
            }
        }

        if lc_tag == "a"
            && el.get_attribute("target").as_deref() == Some("_blank")
            && !el.has_attribute("rel")
        {
            el.set_attribute("rel", "noopener")?;
        }

        Ok(())
    })];

    rewrite_str(
        text.as_ref(),
        RewriteStrSettings {
            element_content_handlers: handlers,
            ..RewriteStrSettings::new()
        },
    )
    .unwrap_or_else(|err| escape_everything(text.as_ref(), &err))
}

/// Removes every event-handler attribute from every element.
///
/// Deliberately not configurable: it runs after any allowlist, including extended ones.
pub fn strip_event_handlers(html: &str) -> String {
    if !html.contains('<') {
        return html.to_string();
    }

    let handlers = vec![element!("*", |el| {
        let names: Vec<String> = el
            .attributes()
            .iter()
            .map(|a| a.name())
            .filter(|name| is_event_handler_attribute(name))
            .collect();
        for name in names {
            el.remove_attribute(&name);
        }
        Ok(())
    })];

    rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: handlers,
            ..RewriteStrSettings::new()
        },
    )
    .unwrap_or_else(|err| escape_everything(html, &err))
}

/// Adds `loading="lazy"` and `referrerpolicy="strict-origin-when-cross-origin"` to every
/// `<iframe>` opening tag that lacks them.
///
/// Works on the text of the opening tag only; other attributes keep their order and quoting,
/// and markup outside iframe tags is untouched. Applying it twice is a no-op.
pub fn harden_iframes(html: &str) -> String {
    if find_ascii_case_insensitive(html.as_bytes(), b"<iframe").is_none() {
        return html.to_string();
    }

    // Only real opening tags are patched; comments and script/style bodies are copied as-is.
    let bytes = html.as_bytes();
    let mut out = String::with_capacity(html.len() + 96);
    let mut last = 0usize;
    let mut i = 0usize;
    while i < bytes.len() {
        if bytes[i] != b'<' {
            i += 1;
            continue;
        }
        if bytes[i..].starts_with(b"<!--") {
            i = find_ascii_case_insensitive(&bytes[i + 4..], b"-->")
                .map(|end| i + 4 + end + 3)
                .unwrap_or(bytes.len());
            continue;
        }
        if let Some(len) = raw_text_element_len(&bytes[i..]) {
            i += len;
            continue;
        }
        match iframe_open_tag_regex().find_at(html, i) {
            Some(m) if m.start() == i => {
                out.push_str(&html[last..i]);
                out.push_str(&patch_iframe_tag(m.as_str()));
                i = m.end();
                last = i;
            }
            _ => i += 1,
        }
    }
    out.push_str(&html[last..]);
    out
}

fn patch_iframe_tag(tag: &str) -> Cow<'_, str> {
    let body = &tag["<iframe".len()..];
    let names: HashSet<String> = tag_attribute_regex()
        .captures_iter(body)
        .map(|c| c[1].to_ascii_lowercase())
        .collect();

    let mut additions = String::new();
    if !names.contains("loading") {
        additions.push_str(r#" loading="lazy""#);
    }
    if !names.contains("referrerpolicy") {
        additions.push_str(r#" referrerpolicy="strict-origin-when-cross-origin""#);
    }
    if additions.is_empty() {
        return Cow::Borrowed(tag);
    }

    let split = if tag.ends_with("/>") {
        tag.len() - 2
    } else {
        tag.len() - 1
    };
    let (head, tail) = tag.split_at(split);
    Cow::Owned(format!("{}{additions}{tail}", head.trim_end()))
}
