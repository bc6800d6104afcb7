//! Defense-in-depth pass applied right before injection.
//!
//! The payload was already reduced to the allowlist when it was rendered; this pass only
//! guards against a compromised or bypassed publish-time sanitizer. With the `full-sanitizer`
//! feature it delegates to `ammonia`. Without it, a regex fallback removes inline event
//! handlers and `javascript:` URLs and nothing else. The fallback is strictly weaker than the
//! full sanitizer and must not be treated as equivalent.

use regex::Regex;
use std::sync::OnceLock;

#[cfg(feature = "full-sanitizer")]
use lazyblock_core::sanitize::{EMBED_TAGS, SCRIPT_ATTRIBUTES};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SanitizerKind {
    Full,
    Fallback,
}

#[derive(Debug)]
pub struct ClientSanitizer {
    scripts_allowed: bool,
    kind: SanitizerKind,
}

impl ClientSanitizer {
    /// Uses the full sanitizer when it is compiled in.
    pub fn new(scripts_allowed: bool) -> Self {
        let kind = if cfg!(feature = "full-sanitizer") {
            SanitizerKind::Full
        } else {
            SanitizerKind::Fallback
        };
        Self {
            scripts_allowed,
            kind,
        }
    }

    pub fn fallback(scripts_allowed: bool) -> Self {
        Self {
            scripts_allowed,
            kind: SanitizerKind::Fallback,
        }
    }

    pub fn kind(&self) -> SanitizerKind {
        self.kind
    }

    pub fn scripts_allowed(&self) -> bool {
        self.scripts_allowed
    }

    pub fn sanitize(&self, html: &str) -> String {
        match self.kind {
            #[cfg(feature = "full-sanitizer")]
            SanitizerKind::Full => full_sanitize(html, self.scripts_allowed),
            #[cfg(not(feature = "full-sanitizer"))]
            SanitizerKind::Full => fallback_sanitize(html),
            SanitizerKind::Fallback => fallback_sanitize(html),
        }
    }
}

#[cfg(feature = "full-sanitizer")]
fn full_sanitize(html: &str, scripts_allowed: bool) -> String {
    let mut builder = ammonia::Builder::default();
    builder
        .add_tags(EMBED_TAGS)
        .add_tags(&["div", "span", "section", "article", "figure", "figcaption", "picture", "video"])
        .add_generic_attributes(&["class", "id", "style", "role", "width", "height"])
        .add_generic_attribute_prefixes(&["data-", "aria-"])
        .add_tag_attributes(
            "iframe",
            &[
                "src",
                "frameborder",
                "allow",
                "allowfullscreen",
                "loading",
                "name",
                "referrerpolicy",
                "sandbox",
            ],
        )
        .add_tag_attributes("embed", &["src", "type"])
        .add_tag_attributes("object", &["data", "type", "name"])
        .add_tag_attributes("param", &["name", "value"])
        .add_tag_attributes("source", &["src", "srcset", "type", "media", "sizes"])
        .add_tag_attributes(
            "video",
            &["src", "poster", "controls", "autoplay", "muted", "loop", "playsinline", "preload"],
        )
        .add_tag_attributes(
            "audio",
            &["src", "controls", "autoplay", "muted", "loop", "preload"],
        )
        .add_tag_attributes("a", &["target", "rel"])
        .add_tag_attributes("img", &["loading", "srcset", "sizes", "decoding"])
        .link_rel(None);
    if scripts_allowed {
        builder
            .rm_clean_content_tags(&["script"])
            .add_tags(&["script"])
            .add_tag_attributes("script", SCRIPT_ATTRIBUTES);
    }
    builder.clean(html).to_string()
}

fn event_handler_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)([\s"'/])on[a-z0-9_-]+\s*=\s*(?:"[^"]*"|'[^']*'|[^\s>]*)"#)
            .expect("valid regex")
    })
}

fn javascript_url_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)(href|src|action|formaction|data|poster)\s*=\s*(["']?)\s*javascript\s*:"#)
            .expect("valid regex")
    })
}

/// Regex-only pass: strips `on*=` attributes and neutralizes `javascript:` URLs.
///
/// This does not parse HTML and does not enforce any allowlist.
pub fn fallback_sanitize(html: &str) -> String {
    let mut out = html.to_string();
    loop {
        let next = event_handler_regex().replace_all(&out, "$1").into_owned();
        if next == out {
            break;
        }
        out = next;
    }
    javascript_url_regex()
        .replace_all(&out, "${1}=${2}#blocked:")
        .into_owned()
}
