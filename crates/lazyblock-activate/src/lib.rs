#![forbid(unsafe_code)]

//! Activation-time pipeline for lazyblock instances.
//!
//! A page's rendered markup is read into a [`Page`]; an [`ActivationController`] wires
//! triggers, and on the first trigger per instance decodes the payload, re-checks it, sanitizes
//! it once more and injects it after a short delay on a virtual-time queue. Each instance
//! activates at most once and always ends in `loaded` or `error`.

pub mod client_sanitize;
pub mod controller;
pub mod dom;
pub mod error;
pub mod events;
pub mod scheduler;
pub mod scripts;
pub mod state;
pub mod trigger;

pub use client_sanitize::{ClientSanitizer, SanitizerKind};
pub use controller::{ActivationController, ControllerOptions, Dispatch, DomHost, HeadlessHost};
pub use dom::{InstanceNode, Page};
pub use error::{ActivationError, Result};
pub use events::{EventBus, LifecycleEvent};
pub use scheduler::{INJECT_DELAY_MS, Scheduler};
pub use scripts::Script;
pub use state::ActivationState;
pub use trigger::{Key, PRELOAD_MARGIN_PX, TriggerEvent, ViewportGeometry, ViewportWatcher};

#[cfg(test)]
mod tests;
