//! The elevated-privilege predicate.
//!
//! Whether block scripts may ever run is decided here, at the moment markup is produced. The
//! `allowScripts` attribute stored with a block is a request; it only takes effect when the
//! author rendering the block passes [`Capabilities::can_author_scripts`].

use serde::{Deserialize, Serialize};

pub trait Capabilities {
    /// Elevated privilege: may author `<script>` content that survives sanitization.
    fn can_author_scripts(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Administrator,
    Editor,
    Author,
    #[default]
    Contributor,
}

/// The author on whose behalf a block is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Author {
    pub role: Role,
    /// Explicit grant of unfiltered HTML, independent of role.
    #[serde(default)]
    pub unfiltered_html: bool,
}

impl Author {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            unfiltered_html: false,
        }
    }

    pub fn administrator() -> Self {
        Self::new(Role::Administrator)
    }

    pub fn editor() -> Self {
        Self::new(Role::Editor)
    }

    pub fn contributor() -> Self {
        Self::new(Role::Contributor)
    }

    pub fn with_unfiltered_html(mut self, granted: bool) -> Self {
        self.unfiltered_html = granted;
        self
    }
}

impl Capabilities for Author {
    fn can_author_scripts(&self) -> bool {
        self.unfiltered_html || matches!(self.role, Role::Administrator | Role::Editor)
    }
}

impl Capabilities for bool {
    fn can_author_scripts(&self) -> bool {
        *self
    }
}
