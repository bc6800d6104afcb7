//! Activation triggers: the interactive control and the viewport watcher.

use serde::{Deserialize, Serialize};

/// Instances start loading this far before they scroll into view.
pub const PRELOAD_MARGIN_PX: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Key {
    Enter,
    Space,
    Other,
}

impl Key {
    /// Maps a DOM `KeyboardEvent.key` value.
    pub fn from_dom_key(key: &str) -> Self {
        match key {
            "Enter" => Key::Enter,
            " " | "Space" | "Spacebar" => Key::Space,
            _ => Key::Other,
        }
    }

    pub fn activates(self) -> bool {
        matches!(self, Key::Enter | Key::Space)
    }
}

/// Element bounds relative to the top of the viewport (as from `getBoundingClientRect`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewportGeometry {
    pub element_top: f64,
    pub element_bottom: f64,
    pub viewport_height: f64,
}

impl ViewportGeometry {
    pub fn new(element_top: f64, element_bottom: f64, viewport_height: f64) -> Self {
        Self {
            element_top,
            element_bottom,
            viewport_height,
        }
    }

    /// True when the element overlaps the viewport grown by `margin` on both edges.
    pub fn is_within(&self, margin: f64) -> bool {
        self.element_top <= self.viewport_height + margin && self.element_bottom >= -margin
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum TriggerEvent {
    Click {
        instance_id: String,
    },
    KeyDown {
        instance_id: String,
        key: Key,
    },
    Viewport {
        instance_id: String,
        geometry: ViewportGeometry,
    },
}

impl TriggerEvent {
    pub fn click(instance_id: impl Into<String>) -> Self {
        TriggerEvent::Click {
            instance_id: instance_id.into(),
        }
    }

    pub fn key(instance_id: impl Into<String>, key: Key) -> Self {
        TriggerEvent::KeyDown {
            instance_id: instance_id.into(),
            key,
        }
    }

    pub fn viewport(instance_id: impl Into<String>, geometry: ViewportGeometry) -> Self {
        TriggerEvent::Viewport {
            instance_id: instance_id.into(),
            geometry,
        }
    }

    pub fn instance_id(&self) -> &str {
        match self {
            TriggerEvent::Click { instance_id }
            | TriggerEvent::KeyDown { instance_id, .. }
            | TriggerEvent::Viewport { instance_id, .. } => instance_id,
        }
    }
}

/// Fires once when the element comes within the pre-load margin, then detaches.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewportWatcher {
    margin: f64,
    attached: bool,
}

impl Default for ViewportWatcher {
    fn default() -> Self {
        Self::new(PRELOAD_MARGIN_PX)
    }
}

impl ViewportWatcher {
    pub fn new(margin: f64) -> Self {
        Self {
            margin,
            attached: true,
        }
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }

    pub fn detach(&mut self) {
        self.attached = false;
    }

    /// Returns `true` exactly once: the first observation inside the margin.
    pub fn observe(&mut self, geometry: &ViewportGeometry) -> bool {
        if !self.attached || !geometry.is_within(self.margin) {
            return false;
        }
        self.attached = false;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_that_activate() {
        assert!(Key::from_dom_key("Enter").activates());
        assert!(Key::from_dom_key(" ").activates());
        assert!(!Key::from_dom_key("Tab").activates());
    }

    #[test]
    fn watcher_fires_inside_the_preload_margin_once() {
        let mut watcher = ViewportWatcher::default();
        // 150px below the fold: not yet.
        assert!(!watcher.observe(&ViewportGeometry::new(950.0, 1300.0, 800.0)));
        assert!(watcher.is_attached());
        // 80px below the fold: within the 100px margin.
        assert!(watcher.observe(&ViewportGeometry::new(880.0, 1230.0, 800.0)));
        assert!(!watcher.is_attached());
        assert!(!watcher.observe(&ViewportGeometry::new(10.0, 300.0, 800.0)));
    }

    #[test]
    fn elements_above_the_viewport_count_within_the_margin() {
        let near = ViewportGeometry::new(-400.0, -60.0, 800.0);
        let far = ViewportGeometry::new(-400.0, -160.0, 800.0);
        assert!(near.is_within(PRELOAD_MARGIN_PX));
        assert!(!far.is_within(PRELOAD_MARGIN_PX));
    }
}
