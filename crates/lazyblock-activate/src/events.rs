//! Lifecycle notifications for host code.
//!
//! Subscribers only observe; having none changes nothing about activation.

use crate::error::ActivationError;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    Loaded {
        instance_id: String,
    },
    SecurityRejected {
        instance_id: String,
        reason: String,
    },
    Failed {
        instance_id: String,
        error: ActivationError,
    },
}

impl LifecycleEvent {
    /// DOM event name the browser build dispatches for this notification.
    pub fn name(&self) -> &'static str {
        match self {
            LifecycleEvent::Loaded { .. } => "llb:loaded",
            LifecycleEvent::SecurityRejected { .. } => "llb:security-rejected",
            LifecycleEvent::Failed { .. } => "llb:error",
        }
    }

    pub fn instance_id(&self) -> &str {
        match self {
            LifecycleEvent::Loaded { instance_id }
            | LifecycleEvent::SecurityRejected { instance_id, .. }
            | LifecycleEvent::Failed { instance_id, .. } => instance_id,
        }
    }
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleEvent::Loaded { instance_id } => write!(f, "{} {instance_id}", self.name()),
            LifecycleEvent::SecurityRejected {
                instance_id,
                reason,
            } => write!(f, "{} {instance_id}: {reason}", self.name()),
            LifecycleEvent::Failed { instance_id, error } => {
                write!(f, "{} {instance_id}: {error}", self.name())
            }
        }
    }
}

type Subscriber = Box<dyn FnMut(&LifecycleEvent)>;

#[derive(Default)]
pub struct EventBus {
    subscribers: Vec<Subscriber>,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

impl EventBus {
    pub fn subscribe(&mut self, subscriber: impl FnMut(&LifecycleEvent) + 'static) {
        self.subscribers.push(Box::new(subscriber));
    }

    pub fn emit(&mut self, event: &LifecycleEvent) {
        tracing::debug!(event = %event, subscribers = self.subscribers.len(), "lifecycle event");
        for subscriber in &mut self.subscribers {
            subscriber(event);
        }
    }
}
