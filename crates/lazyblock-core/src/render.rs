//! Publish-time rendering of a block into inert markup.
//!
//! Pipeline per block: safety scan (fail closed for unprivileged authors) → allowlist
//! sanitize → iframe hardening → base64 payload → container markup with responsive CSS.
//! Author HTML never reaches the output except through the encoded payload.

use crate::config::{BlockConfiguration, Settings, TriggerKind};
use crate::css::{self, AspectRatio};
use crate::privilege::Capabilities;
use crate::scan::{self, Check, ScanReport, Verdict};
use crate::{Result, payload, sanitize, url};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

/// Root class of every rendered instance.
pub const BLOCK_CLASS: &str = "wp-block-lazy-load-block";
/// Output when a block is refused at publish time.
pub const BLOCKED_MARKUP: &str = "<!-- lazyblock: content blocked -->";

pub const TABLET_MAX_WIDTH_PX: u32 = 1024;
pub const MOBILE_MAX_WIDTH_PX: u32 = 768;

const PLAY_ICON_SVG: &str =
    r##"<svg viewBox="0 0 24 24" width="32" height="32"><path d="M8 5v14l11-7z" fill="#fff"/></svg>"##;

/// Responsive dimensions for embedded media, published as `data-iframe-config`.
///
/// Every value is validated; an empty string means "not set" (inherit from the wider
/// breakpoint through the normal cascade).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IframeConfig {
    pub width: String,
    pub height: String,
    pub width_tablet: String,
    pub height_tablet: String,
    pub width_mobile: String,
    pub height_mobile: String,
    pub aspect_ratio: AspectRatio,
}

impl IframeConfig {
    pub fn from_block(config: &BlockConfiguration) -> Self {
        let dim = |raw: &str| css::validate_optional_dimension(raw).unwrap_or_default();
        Self {
            width: dim(&config.iframe_width),
            height: dim(&config.iframe_height),
            width_tablet: dim(&config.iframe_width_tablet),
            height_tablet: dim(&config.iframe_height_tablet),
            width_mobile: dim(&config.iframe_width_mobile),
            height_mobile: dim(&config.iframe_height_mobile),
            aspect_ratio: config.aspect_ratio,
        }
    }
}

/// The unit embedded in page markup for one block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodedInstance {
    pub instance_id: String,
    pub encoded_content: String,
    pub scripts_allowed: bool,
    pub iframe_config: IframeConfig,
    pub wrapper_classes: IndexSet<String>,
}

/// Why a block produced [`BLOCKED_MARKUP`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum BlockReason {
    UnsafeContent { report: ScanReport },
    Oversize { len: usize, max: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rendered {
    /// No content (or nothing left after sanitizing); nothing is emitted.
    Empty,
    Blocked(BlockReason),
    Instance {
        instance: EncodedInstance,
        markup: String,
        /// Scanner warnings recorded for audit (privileged author, or blocking disabled).
        warnings: Vec<Check>,
    },
}

impl Rendered {
    pub fn markup(&self) -> &str {
        match self {
            Rendered::Empty => "",
            Rendered::Blocked(_) => BLOCKED_MARKUP,
            Rendered::Instance { markup, .. } => markup,
        }
    }

    pub fn instance(&self) -> Option<&EncodedInstance> {
        match self {
            Rendered::Instance { instance, .. } => Some(instance),
            _ => None,
        }
    }

    pub fn is_blocked(&self) -> bool {
        matches!(self, Rendered::Blocked(_))
    }
}

/// Where instance ids come from.
#[derive(Debug, Clone)]
pub enum IdSource {
    /// `llb-1`, `llb-2`, … (deterministic; one counter per renderer, like one page request).
    Sequential { next: u64 },
    /// `llb-` followed by twelve hex digits of a v4 uuid.
    Random,
    /// Always the same id. Only meaningful when one block is rendered.
    Fixed(String),
}

impl Default for IdSource {
    fn default() -> Self {
        IdSource::Sequential { next: 1 }
    }
}

impl IdSource {
    pub fn next_id(&mut self) -> String {
        match self {
            IdSource::Sequential { next } => {
                let id = format!("llb-{next}");
                *next += 1;
                id
            }
            IdSource::Random => {
                let simple = uuid::Uuid::new_v4().simple().to_string();
                format!("llb-{}", &simple[..12])
            }
            IdSource::Fixed(id) => id.clone(),
        }
    }
}

/// Renders blocks for one page.
#[derive(Debug, Clone, Default)]
pub struct Renderer {
    settings: Settings,
    ids: IdSource,
}

impl Renderer {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            ids: IdSource::default(),
        }
    }

    pub fn with_id_source(mut self, ids: IdSource) -> Self {
        self.ids = ids;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Renders one block on behalf of `author`.
    ///
    /// The script capability is re-derived here from `author`, never taken from
    /// `config.allow_scripts` alone.
    pub fn render(
        &mut self,
        config: &BlockConfiguration,
        author: &dyn Capabilities,
    ) -> Result<Rendered> {
        let html = config.html_content.as_str();
        if html.trim().is_empty() {
            return Ok(Rendered::Empty);
        }

        let privileged = author.can_author_scripts();
        let scripts_allowed = config.allow_scripts && privileged;

        if html.len() > self.settings.max_content_bytes {
            tracing::warn!(
                len = html.len(),
                max = self.settings.max_content_bytes,
                "block content exceeds the size limit; not rendering"
            );
            return Ok(Rendered::Blocked(BlockReason::Oversize {
                len: html.len(),
                max: self.settings.max_content_bytes,
            }));
        }

        let report = scan::scan(html);
        match report.verdict(privileged) {
            Verdict::Unsafe if self.settings.block_unsafe_content => {
                tracing::warn!(
                    reasons = ?report.reasons(),
                    "unsafe block content from an unprivileged author; not rendering"
                );
                return Ok(Rendered::Blocked(BlockReason::UnsafeContent { report }));
            }
            Verdict::Unsafe => {
                tracing::warn!(
                    reasons = ?report.reasons(),
                    "unsafe block content from an unprivileged author; rendering sanitized"
                );
            }
            Verdict::Warned => {
                tracing::warn!(reasons = ?report.reasons(), "privileged author content flagged");
            }
            Verdict::Clean => {}
        }

        let sanitized = sanitize::sanitize(html, scripts_allowed).with_hardened_iframes();
        if sanitized.as_str().trim().is_empty() {
            tracing::debug!("block content was empty after sanitizing");
            return Ok(Rendered::Empty);
        }
        // Activation bounds the decoded payload, which includes the hardening attributes.
        if sanitized.len() > self.settings.max_content_bytes {
            tracing::warn!(
                len = sanitized.len(),
                max = self.settings.max_content_bytes,
                "sanitized block content exceeds the size limit; not rendering"
            );
            return Ok(Rendered::Blocked(BlockReason::Oversize {
                len: sanitized.len(),
                max: self.settings.max_content_bytes,
            }));
        }

        let instance = EncodedInstance {
            instance_id: self.ids.next_id(),
            encoded_content: payload::encode(&sanitized),
            scripts_allowed,
            iframe_config: IframeConfig::from_block(config),
            wrapper_classes: wrapper_classes(config, scripts_allowed),
        };
        let markup = render_markup(config, &instance)?;
        tracing::debug!(
            instance_id = %instance.instance_id,
            scripts_allowed,
            payload_len = instance.encoded_content.len(),
            "rendered block"
        );

        Ok(Rendered::Instance {
            instance,
            markup,
            warnings: report.warnings,
        })
    }
}

/// Renders a single block with default settings.
pub fn render_block(config: &BlockConfiguration, author: &dyn Capabilities) -> Result<Rendered> {
    Renderer::default().render(config, author)
}

fn image_mode(config: &BlockConfiguration) -> bool {
    config.trigger_type == TriggerKind::Image && placeholder_image_url(config).is_some()
}

fn placeholder_image_url(config: &BlockConfiguration) -> Option<String> {
    let raw = config.placeholder_image.trim();
    if raw.is_empty() {
        return None;
    }
    url::sanitize_url(raw)
}

fn wrapper_classes(config: &BlockConfiguration, scripts_allowed: bool) -> IndexSet<String> {
    let mut classes = IndexSet::new();
    classes.insert(BLOCK_CLASS.to_string());
    classes.insert(if image_mode(config) {
        "llb-mode-image".to_string()
    } else {
        "llb-mode-button".to_string()
    });
    if config.auto_load_on_visible {
        classes.insert("llb-auto-load".to_string());
    }
    if scripts_allowed {
        classes.insert("llb-scripts-allowed".to_string());
    }
    if config.aspect_ratio.is_set() {
        classes.insert("llb-has-aspect-ratio".to_string());
    }
    classes
}

fn attr(value: &str) -> String {
    htmlize::escape_attribute(value).into_owned()
}

fn text(value: &str) -> String {
    htmlize::escape_text(value).into_owned()
}

fn declarations(width: &str, height: &str, aspect_ratio: AspectRatio) -> String {
    let mut out = String::new();
    if !width.is_empty() {
        let _ = write!(out, "width:{};", css::escape_css_value(width));
    }
    if aspect_ratio.is_set() {
        let _ = write!(
            out,
            "aspect-ratio:{};height:auto;",
            css::escape_css_value(aspect_ratio.as_str())
        );
    } else if !height.is_empty() {
        let _ = write!(out, "height:{};", css::escape_css_value(height));
    }
    out
}

/// Scoped CSS for the content region. Tablet and mobile rules are emitted only when they
/// override something; otherwise the desktop rule applies at every width.
pub fn responsive_css(instance_id: &str, config: &IframeConfig) -> String {
    let id = css::escape_css_ident(instance_id);
    let selector = ["iframe", "embed", "object", "video"]
        .iter()
        .map(|tag| format!("#{id} .llb-content {tag}"))
        .collect::<Vec<_>>()
        .join(",");

    let mut out = String::new();
    let desktop = declarations(&config.width, &config.height, config.aspect_ratio);
    if !desktop.is_empty() {
        let _ = write!(out, "{selector}{{max-width:100%;{desktop}}}");
    }

    // The aspect ratio already drives height at every width.
    let no_ratio = AspectRatio::Unset;
    let tablet_height = if config.aspect_ratio.is_set() {
        ""
    } else {
        config.height_tablet.as_str()
    };
    let tablet = declarations(&config.width_tablet, tablet_height, no_ratio);
    if !tablet.is_empty() {
        let _ = write!(
            out,
            "@media (max-width: {TABLET_MAX_WIDTH_PX}px){{{selector}{{{tablet}}}}}"
        );
    }

    let mobile_height = if config.aspect_ratio.is_set() {
        ""
    } else {
        config.height_mobile.as_str()
    };
    let mobile = declarations(&config.width_mobile, mobile_height, no_ratio);
    if !mobile.is_empty() {
        let _ = write!(
            out,
            "@media (max-width: {MOBILE_MAX_WIDTH_PX}px){{{selector}{{{mobile}}}}}"
        );
    }
    out
}

fn render_placeholder(config: &BlockConfiguration, out: &mut String) {
    let image = placeholder_image_url(config);
    let trigger_text = if config.trigger_text.trim().is_empty() {
        crate::config::DEFAULT_TRIGGER_TEXT
    } else {
        config.trigger_text.as_str()
    };

    out.push_str(r#"<div class="llb-placeholder">"#);

    if let (true, Some(src)) = (image_mode(config), image.as_deref()) {
        let _ = write!(
            out,
            r#"<div class="llb-trigger llb-trigger-image" role="button" tabindex="0" aria-label="{}">"#,
            attr(trigger_text)
        );
        let _ = write!(
            out,
            r#"<img src="{}" alt="{}" class="llb-placeholder-image" loading="lazy" />"#,
            attr(src),
            attr(&config.placeholder_text)
        );
        if config.show_play_icon {
            let color = css::validate_play_icon_color(&config.play_icon_color);
            let _ = write!(
                out,
                r#"<span class="llb-play-icon" style="background-color: {};" aria-hidden="true">{PLAY_ICON_SVG}</span>"#,
                attr(&css::escape_css_value(&color))
            );
        }
        out.push_str("</div>");
        out.push_str("</div>");
        return;
    }

    if let Some(src) = image.as_deref() {
        let _ = write!(
            out,
            r#"<img src="{}" alt="{}" class="llb-placeholder-image" loading="lazy" />"#,
            attr(src),
            attr(&config.placeholder_text)
        );
    }

    if config.show_placeholder && !config.placeholder_text.trim().is_empty() {
        let _ = write!(
            out,
            r#"<p class="llb-placeholder-text">{}</p>"#,
            text(&config.placeholder_text)
        );
    }

    match config.trigger_type {
        TriggerKind::Link => {
            let _ = write!(
                out,
                r##"<a href="#" class="llb-trigger llb-trigger-link" role="button">{}</a>"##,
                text(trigger_text)
            );
        }
        TriggerKind::Button | TriggerKind::Image => {
            let _ = write!(
                out,
                r#"<button type="button" class="llb-trigger llb-trigger-button">{}</button>"#,
                text(trigger_text)
            );
        }
    }

    out.push_str("</div>");
}

fn render_markup(config: &BlockConfiguration, instance: &EncodedInstance) -> Result<String> {
    let classes = instance
        .wrapper_classes
        .iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(" ");
    let container_width = css::escape_css_value(&css::validate_dimension(
        &config.container_width,
        "100%",
    ));
    let container_height = css::escape_css_value(&css::validate_dimension(
        &config.container_height,
        "auto",
    ));
    let iframe_config = serde_json::to_string(&instance.iframe_config)?;

    let mut out = String::with_capacity(instance.encoded_content.len() + 1024);
    let _ = write!(
        out,
        r#"<div id="{id}" class="{classes}" data-content="{content}" data-loaded="false" data-allow-scripts="{scripts}" data-iframe-config="{iframe}" style="width: {w}; min-height: {h};">"#,
        id = attr(&instance.instance_id),
        classes = attr(&classes),
        content = attr(&instance.encoded_content),
        scripts = if instance.scripts_allowed { "true" } else { "false" },
        iframe = attr(&iframe_config),
        w = attr(&container_width),
        h = attr(&container_height),
    );

    let css_rules = responsive_css(&instance.instance_id, &instance.iframe_config);
    if !css_rules.is_empty() {
        let _ = write!(out, "<style>{css_rules}</style>");
    }

    render_placeholder(config, &mut out);

    out.push_str(r#"<div class="llb-content" style="display: none;"></div>"#);
    out.push_str(
        r#"<div class="llb-loader" style="display: none;"><span class="llb-spinner"></span></div>"#,
    );
    out.push_str("</div>");
    Ok(out)
}
