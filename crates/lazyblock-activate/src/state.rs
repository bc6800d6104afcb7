use serde::Serialize;
use std::fmt;

/// Per-instance lifecycle. `Loaded` and `Error` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivationState {
    #[default]
    Pending,
    Loading,
    Loaded,
    Error,
}

impl ActivationState {
    pub fn as_str(self) -> &'static str {
        match self {
            ActivationState::Pending => "pending",
            ActivationState::Loading => "loading",
            ActivationState::Loaded => "loaded",
            ActivationState::Error => "error",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ActivationState::Loaded | ActivationState::Error)
    }

    /// Only `Pending` may move to `Loading`.
    pub fn can_activate(self) -> bool {
        self == ActivationState::Pending
    }
}

impl fmt::Display for ActivationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
