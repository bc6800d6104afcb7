//! Block attributes and plugin settings.

use crate::css::AspectRatio;
use crate::privilege::Capabilities;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default upper bound on block content, shared by publish time and activation.
pub const DEFAULT_MAX_CONTENT_BYTES: usize = 512 * 1024;

pub const DEFAULT_TRIGGER_TEXT: &str = "Load content";
pub const DEFAULT_PLACEHOLDER_TEXT: &str = "Click to load";

/// How the reader activates the block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TriggerKind {
    #[default]
    Button,
    Link,
    /// The placeholder image itself is the control.
    Image,
}

impl TriggerKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TriggerKind::Button => "button",
            TriggerKind::Link => "link",
            TriggerKind::Image => "image",
        }
    }
}

impl From<String> for TriggerKind {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "link" => TriggerKind::Link,
            "image" => TriggerKind::Image,
            _ => TriggerKind::Button,
        }
    }
}

impl From<TriggerKind> for String {
    fn from(value: TriggerKind) -> Self {
        value.as_str().to_string()
    }
}

/// Attributes of one block as stored by the editor.
///
/// Every field has a default, so partial JSON (or an older block) deserializes. Nothing here
/// is trusted: dimensions and colors are validated at render time, and `allow_scripts` is only
/// honored when the rendering author is privileged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BlockConfiguration {
    pub html_content: String,
    pub trigger_type: TriggerKind,
    pub trigger_text: String,
    pub placeholder_text: String,
    pub show_placeholder: bool,
    pub placeholder_image: String,
    pub show_play_icon: bool,
    pub play_icon_color: String,
    pub auto_load_on_visible: bool,
    pub container_width: String,
    pub container_height: String,
    pub iframe_width: String,
    pub iframe_height: String,
    pub iframe_width_tablet: String,
    pub iframe_height_tablet: String,
    pub iframe_width_mobile: String,
    pub iframe_height_mobile: String,
    pub aspect_ratio: AspectRatio,
    pub allow_scripts: bool,
}

impl Default for BlockConfiguration {
    fn default() -> Self {
        Self {
            html_content: String::new(),
            trigger_type: TriggerKind::Button,
            trigger_text: DEFAULT_TRIGGER_TEXT.to_string(),
            placeholder_text: DEFAULT_PLACEHOLDER_TEXT.to_string(),
            show_placeholder: true,
            placeholder_image: String::new(),
            show_play_icon: true,
            play_icon_color: crate::css::DEFAULT_PLAY_ICON_COLOR.to_string(),
            auto_load_on_visible: false,
            container_width: "100%".to_string(),
            container_height: "auto".to_string(),
            iframe_width: "100%".to_string(),
            iframe_height: String::new(),
            iframe_width_tablet: String::new(),
            iframe_height_tablet: String::new(),
            iframe_width_mobile: String::new(),
            iframe_height_mobile: String::new(),
            aspect_ratio: AspectRatio::Unset,
            allow_scripts: false,
        }
    }
}

impl BlockConfiguration {
    pub fn with_html(html: impl Into<String>) -> Self {
        Self {
            html_content: html.into(),
            ..Self::default()
        }
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|err| Error::InvalidConfig {
            message: err.to_string(),
        })
    }
}

/// Plugin-wide settings (persisted by the host; read-only here).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// When set, only privileged authors may insert the block. This is an editor-level gate;
    /// the render-time safety checks run regardless.
    pub restrict_to_privileged: bool,
    /// Refuse to render a block when the safety scan fires for an unprivileged author. When
    /// cleared, such content is rendered after the allowlist sanitizer has reduced it.
    pub block_unsafe_content: bool,
    pub max_content_bytes: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            restrict_to_privileged: false,
            block_unsafe_content: true,
            max_content_bytes: DEFAULT_MAX_CONTENT_BYTES,
        }
    }
}

impl Settings {
    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|err| Error::Settings {
            message: err.to_string(),
        })
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).map_err(|err| Error::Settings {
            message: err.to_string(),
        })
    }

    /// Loads settings from a `.json`, `.yaml` or `.yml` file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        let settings = match ext.as_deref() {
            Some("yaml" | "yml") => Self::from_yaml_str(&text)?,
            Some("json") | None => Self::from_json_str(&text)?,
            Some(other) => {
                return Err(Error::Settings {
                    message: format!("unsupported settings format: .{other}"),
                });
            }
        };
        tracing::debug!(path = %path.display(), ?settings, "loaded settings");
        Ok(settings)
    }

    /// Whether the block may be offered to `author` in the editor.
    pub fn is_available_to(&self, author: &dyn Capabilities) -> bool {
        !self.restrict_to_privileged || author.can_author_scripts()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::privilege::Author;

    #[test]
    fn partial_json_fills_defaults() {
        let cfg = BlockConfiguration::from_json_str(
            r#"{ "htmlContent": "<p>x</p>", "triggerType": "image", "aspectRatio": "16/9", "unknown": 1 }"#,
        )
        .unwrap();
        assert_eq!(cfg.html_content, "<p>x</p>");
        assert_eq!(cfg.trigger_type, TriggerKind::Image);
        assert_eq!(cfg.aspect_ratio, AspectRatio::Widescreen);
        assert_eq!(cfg.trigger_text, DEFAULT_TRIGGER_TEXT);
        assert!(cfg.show_placeholder);
        assert!(!cfg.allow_scripts);
        assert_eq!(cfg.container_width, "100%");
    }

    #[test]
    fn unknown_trigger_and_ratio_fall_back() {
        let cfg =
            BlockConfiguration::from_json_str(r#"{ "triggerType": "hover", "aspectRatio": "2/1" }"#)
                .unwrap();
        assert_eq!(cfg.trigger_type, TriggerKind::Button);
        assert_eq!(cfg.aspect_ratio, AspectRatio::Unset);
    }

    #[test]
    fn invalid_json_is_a_config_error() {
        let err = BlockConfiguration::from_json_str("{").unwrap_err();
        assert!(matches!(err, Error::InvalidConfig { .. }));
    }

    #[test]
    fn settings_load_from_json_and_yaml_files() {
        let dir = tempfile::tempdir().unwrap();

        let json = dir.path().join("settings.json");
        std::fs::write(&json, r#"{ "restrictToPrivileged": true }"#).unwrap();
        let s = Settings::load(&json).unwrap();
        assert!(s.restrict_to_privileged);
        assert_eq!(s.max_content_bytes, DEFAULT_MAX_CONTENT_BYTES);

        let yaml = dir.path().join("settings.yml");
        std::fs::write(&yaml, "maxContentBytes: 1024\n").unwrap();
        let s = Settings::load(&yaml).unwrap();
        assert!(!s.restrict_to_privileged);
        assert!(s.block_unsafe_content);
        assert_eq!(s.max_content_bytes, 1024);

        let toml = dir.path().join("settings.toml");
        std::fs::write(&toml, "x = 1").unwrap();
        assert!(matches!(Settings::load(&toml), Err(Error::Settings { .. })));
        assert!(matches!(
            Settings::load(dir.path().join("missing.json")),
            Err(Error::Io(_))
        ));
    }

    #[test]
    fn restriction_gates_editor_availability_only() {
        let open = Settings::default();
        let restricted = Settings {
            restrict_to_privileged: true,
            ..Settings::default()
        };
        assert!(open.is_available_to(&Author::contributor()));
        assert!(!restricted.is_available_to(&Author::contributor()));
        assert!(restricted.is_available_to(&Author::administrator()));
    }
}
