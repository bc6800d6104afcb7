//! A minimal page model built from rendered markup.
//!
//! Only what activation needs is kept: one [`InstanceNode`] per block container, in document
//! order. There is no separate registry; "which instances exist" is always answered by
//! querying the page as it is at call time.

use crate::error::{ActivationError, Result};
use crate::state::ActivationState;
use crate::trigger::ViewportWatcher;
use lazyblock_core::render::{BLOCK_CLASS, IframeConfig};
use lol_html::{RewriteStrSettings, element, rewrite_str};
use std::cell::RefCell;

/// Shown in place of the placeholder when activation fails.
pub const ERROR_MESSAGE_HTML: &str =
    r#"<p class="llb-error" role="alert" style="color: #d63638;">Error loading content.</p>"#;

#[derive(Debug, Clone, PartialEq)]
pub struct InstanceNode {
    id: String,
    classes: Vec<String>,
    data_content: Option<String>,
    data_loaded: bool,
    allow_scripts: bool,
    iframe_config: Option<IframeConfig>,
    has_trigger: bool,
    has_content_region: bool,
    pub(crate) state: ActivationState,
    pub(crate) placeholder_visible: bool,
    pub(crate) loader_visible: bool,
    pub(crate) content_visible: bool,
    pub(crate) content: String,
    pub(crate) control_wired: bool,
    pub(crate) watcher: Option<ViewportWatcher>,
}

impl InstanceNode {
    fn from_container(id: String, class_attr: &str) -> Self {
        Self {
            id,
            classes: class_attr.split_whitespace().map(str::to_string).collect(),
            data_content: None,
            data_loaded: false,
            allow_scripts: false,
            iframe_config: None,
            has_trigger: false,
            has_content_region: false,
            state: ActivationState::Pending,
            placeholder_visible: true,
            loader_visible: false,
            content_visible: false,
            content: String::new(),
            control_wired: false,
            watcher: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes.iter().any(|c| c == class)
    }

    pub fn is_auto_load(&self) -> bool {
        self.has_class("llb-auto-load")
    }

    pub fn is_image_mode(&self) -> bool {
        self.has_class("llb-mode-image")
    }

    /// The encoded payload, until a successful load clears it.
    pub fn data_content(&self) -> Option<&str> {
        self.data_content.as_deref()
    }

    /// Mirrors the `data-loaded` attribute.
    pub fn data_loaded(&self) -> bool {
        self.data_loaded
    }

    pub fn allow_scripts(&self) -> bool {
        self.allow_scripts
    }

    pub fn iframe_config(&self) -> Option<&IframeConfig> {
        self.iframe_config.as_ref()
    }

    pub fn has_trigger(&self) -> bool {
        self.has_trigger
    }

    pub fn has_content_region(&self) -> bool {
        self.has_content_region
    }

    pub fn state(&self) -> ActivationState {
        self.state
    }

    pub fn placeholder_visible(&self) -> bool {
        self.placeholder_visible
    }

    pub fn loader_visible(&self) -> bool {
        self.loader_visible
    }

    pub fn content_visible(&self) -> bool {
        self.content_visible
    }

    /// Current markup of the `.llb-content` region.
    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn is_wired(&self) -> bool {
        self.control_wired || self.watcher.is_some()
    }

    /// Still eligible for activation: pending and not marked loaded.
    pub fn is_pending(&self) -> bool {
        self.state.can_activate() && !self.data_loaded
    }

    pub(crate) fn mark_loaded(&mut self) {
        self.state = ActivationState::Loaded;
        self.data_loaded = true;
        self.data_content = None;
        self.loader_visible = false;
        self.content_visible = true;
        self.watcher = None;
    }

    pub(crate) fn mark_error(&mut self) {
        self.state = ActivationState::Error;
        self.content = ERROR_MESSAGE_HTML.to_string();
        self.placeholder_visible = false;
        self.loader_visible = false;
        self.content_visible = true;
        self.watcher = None;
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    nodes: Vec<InstanceNode>,
}

fn unescaped(value: Option<String>) -> Option<String> {
    value.map(|v| htmlize::unescape(v).into_owned())
}

fn parse_instances(html: &str) -> Result<Vec<InstanceNode>> {
    let nodes = RefCell::new(Vec::<InstanceNode>::new());
    let container = format!("div.{BLOCK_CLASS}[id]");
    let trigger = format!("div.{BLOCK_CLASS} .llb-trigger");
    let content = format!("div.{BLOCK_CLASS} .llb-content");

    rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: vec![
                element!(container, |el| {
                    let id = unescaped(el.get_attribute("id")).unwrap_or_default();
                    let class_attr = unescaped(el.get_attribute("class")).unwrap_or_default();
                    let mut node = InstanceNode::from_container(id, &class_attr);
                    node.data_content = unescaped(el.get_attribute("data-content"));
                    node.data_loaded =
                        unescaped(el.get_attribute("data-loaded")).as_deref() == Some("true");
                    node.allow_scripts =
                        unescaped(el.get_attribute("data-allow-scripts")).as_deref() == Some("true");
                    node.iframe_config =
                        unescaped(el.get_attribute("data-iframe-config")).and_then(|raw| {
                            serde_json::from_str(&raw)
                                .inspect_err(|err| {
                                    tracing::warn!(
                                        id = %node.id,
                                        error = %err,
                                        "ignoring unreadable iframe config"
                                    );
                                })
                                .ok()
                        });
                    if node.data_loaded {
                        node.state = ActivationState::Loaded;
                        node.placeholder_visible = false;
                        node.content_visible = true;
                    }
                    nodes.borrow_mut().push(node);
                    Ok(())
                }),
                element!(trigger, |_el| {
                    if let Some(node) = nodes.borrow_mut().last_mut() {
                        node.has_trigger = true;
                    }
                    Ok(())
                }),
                element!(content, |_el| {
                    if let Some(node) = nodes.borrow_mut().last_mut() {
                        node.has_content_region = true;
                    }
                    Ok(())
                }),
            ],
            ..RewriteStrSettings::new()
        },
    )
    .map_err(|err| ActivationError::InvalidMarkup {
        message: err.to_string(),
    })?;

    Ok(nodes.into_inner())
}

impl Page {
    pub fn from_markup(html: &str) -> Result<Self> {
        let nodes = parse_instances(html)?;
        tracing::debug!(instances = nodes.len(), "read page markup");
        Ok(Self { nodes })
    }

    /// Appends the instances found in `html` (a dynamic content swap) and returns their ids.
    /// Ids already present on the page are skipped.
    pub fn insert_markup(&mut self, html: &str) -> Result<Vec<String>> {
        let mut added = Vec::new();
        for node in parse_instances(html)? {
            if self.instance(node.id()).is_some() {
                tracing::warn!(id = %node.id(), "duplicate instance id; keeping the existing one");
                continue;
            }
            added.push(node.id().to_string());
            self.nodes.push(node);
        }
        Ok(added)
    }

    /// Removes an instance from the page. Work already scheduled for it is dropped when it runs.
    pub fn remove(&mut self, id: &str) -> Option<InstanceNode> {
        let pos = self.nodes.iter().position(|n| n.id == id)?;
        Some(self.nodes.remove(pos))
    }

    pub fn instances(&self) -> impl Iterator<Item = &InstanceNode> {
        self.nodes.iter()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn instance(&self, id: &str) -> Option<&InstanceNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub(crate) fn instance_mut(&mut self, id: &str) -> Option<&mut InstanceNode> {
        self.nodes.iter_mut().find(|n| n.id == id)
    }

    pub(crate) fn instances_mut(&mut self) -> impl Iterator<Item = &mut InstanceNode> {
        self.nodes.iter_mut()
    }

    /// Ids of every instance still eligible for activation, in document order.
    pub fn pending_ids(&self) -> Vec<String> {
        self.nodes
            .iter()
            .filter(|n| n.is_pending())
            .map(|n| n.id.clone())
            .collect()
    }
}
