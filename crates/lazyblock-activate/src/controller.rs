//! Per-instance activation: trigger wiring, payload checks, delayed injection.

use crate::client_sanitize::ClientSanitizer;
use crate::dom::{InstanceNode, Page};
use crate::error::{ActivationError, Result};
use crate::events::{EventBus, LifecycleEvent};
use crate::scheduler::{INJECT_DELAY_MS, Scheduler};
use crate::scripts::{self, Script};
use crate::state::ActivationState;
use crate::trigger::{TriggerEvent, ViewportWatcher};
use lazyblock_core::config::DEFAULT_MAX_CONTENT_BYTES;
use lazyblock_core::{Settings, payload, scan};

/// The page environment the controller mutates.
///
/// Errors are reported as messages and turn the instance into an `error` state.
pub trait DomHost {
    /// Sets the markup of the instance's content region.
    fn inject(&mut self, instance_id: &str, html: &str) -> std::result::Result<(), String>;

    /// Executes a re-created script element. Only called when scripts are allowed.
    fn run_script(&mut self, instance_id: &str, script: &Script) -> std::result::Result<(), String>;
}

/// Host that records what it was asked to do and never fails.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeadlessHost {
    pub injected: Vec<(String, String)>,
    pub executed: Vec<(String, Script)>,
}

impl DomHost for HeadlessHost {
    fn inject(&mut self, instance_id: &str, html: &str) -> std::result::Result<(), String> {
        self.injected.push((instance_id.to_string(), html.to_string()));
        Ok(())
    }

    fn run_script(&mut self, instance_id: &str, script: &Script) -> std::result::Result<(), String> {
        self.executed.push((instance_id.to_string(), script.clone()));
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerOptions {
    pub max_content_bytes: usize,
    pub inject_delay_ms: u64,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            max_content_bytes: DEFAULT_MAX_CONTENT_BYTES,
            inject_delay_ms: INJECT_DELAY_MS,
        }
    }
}

impl ControllerOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            max_content_bytes: settings.max_content_bytes,
            ..Self::default()
        }
    }
}

/// Outcome of a trigger or a programmatic load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// The instance moved from `pending` to `loading`.
    Started,
    /// Unknown instance, unwired trigger, or the instance was already past `pending`.
    Ignored,
}

#[derive(Debug, Clone)]
struct Injection {
    instance_id: String,
    html: String,
    scripts_allowed: bool,
}

#[derive(Debug)]
pub struct ActivationController<H: DomHost> {
    page: Page,
    host: H,
    scheduler: Scheduler<Injection>,
    events: EventBus,
    options: ControllerOptions,
}

impl<H: DomHost> ActivationController<H> {
    pub fn new(page: Page, host: H) -> Self {
        Self {
            page,
            host,
            scheduler: Scheduler::new(),
            events: EventBus::default(),
            options: ControllerOptions::default(),
        }
    }

    pub fn from_markup(html: &str, host: H) -> Result<Self> {
        Ok(Self::new(Page::from_markup(html)?, host))
    }

    pub fn with_options(mut self, options: ControllerOptions) -> Self {
        self.options = options;
        self
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn into_host(self) -> H {
        self.host
    }

    pub fn state(&self, instance_id: &str) -> Option<ActivationState> {
        self.page.instance(instance_id).map(InstanceNode::state)
    }

    /// Current virtual time in milliseconds.
    pub fn now(&self) -> u64 {
        self.scheduler.now()
    }

    pub fn is_idle(&self) -> bool {
        self.scheduler.is_idle()
    }

    pub fn subscribe(&mut self, subscriber: impl FnMut(&LifecycleEvent) + 'static) {
        self.events.subscribe(subscriber);
    }

    /// Adds instances from freshly inserted markup. Call [`Self::init`] to wire them.
    pub fn insert_markup(&mut self, html: &str) -> Result<Vec<String>> {
        self.page.insert_markup(html)
    }

    pub fn remove_instance(&mut self, instance_id: &str) -> bool {
        self.page.remove(instance_id).is_some()
    }

    /// Wires triggers on every pending instance that has none yet. Safe to call repeatedly;
    /// loaded and failed instances are never touched. Returns how many were wired.
    pub fn init(&mut self) -> usize {
        let mut wired = 0;
        for node in self.page.instances_mut() {
            if !node.is_pending() || node.is_wired() {
                continue;
            }
            if node.has_trigger() {
                node.control_wired = true;
            }
            if node.is_auto_load() {
                node.watcher = Some(ViewportWatcher::default());
            }
            if node.is_wired() {
                tracing::debug!(
                    id = %node.id(),
                    auto_load = node.is_auto_load(),
                    "wired instance"
                );
                wired += 1;
            }
        }
        wired
    }

    pub fn dispatch(&mut self, event: TriggerEvent) -> Dispatch {
        let Some(node) = self.page.instance_mut(event.instance_id()) else {
            tracing::debug!(id = %event.instance_id(), "trigger for unknown instance");
            return Dispatch::Ignored;
        };
        let fired = match &event {
            TriggerEvent::Click { .. } => node.control_wired,
            TriggerEvent::KeyDown { key, .. } => node.control_wired && key.activates(),
            TriggerEvent::Viewport { geometry, .. } => node
                .watcher
                .as_mut()
                .is_some_and(|watcher| watcher.observe(geometry)),
        };
        if !fired {
            return Dispatch::Ignored;
        }
        self.activate(event.instance_id())
    }

    /// Programmatic load of one instance, wired or not.
    pub fn load(&mut self, instance_id: &str) -> Dispatch {
        self.activate(instance_id)
    }

    /// Loads every instance that is still pending right now. Returns how many started.
    pub fn load_all(&mut self) -> usize {
        let mut started = 0;
        for id in self.page.pending_ids() {
            if self.activate(&id) == Dispatch::Started {
                started += 1;
            }
        }
        started
    }

    /// Runs every task due within the next `ms` milliseconds. Returns how many ran.
    pub fn advance(&mut self, ms: u64) -> usize {
        let deadline = self.scheduler.now().saturating_add(ms);
        let mut ran = 0;
        while let Some(task) = self.scheduler.pop_due(deadline) {
            self.run_injection(task);
            ran += 1;
        }
        self.scheduler.advance_to(deadline);
        ran
    }

    /// Runs tasks until the queue is empty. Returns how many ran.
    pub fn run_until_idle(&mut self) -> usize {
        let mut ran = 0;
        while let Some(task) = self.scheduler.pop_due(u64::MAX) {
            self.run_injection(task);
            ran += 1;
        }
        ran
    }

    fn activate(&mut self, instance_id: &str) -> Dispatch {
        let Some(node) = self.page.instance_mut(instance_id) else {
            tracing::debug!(id = %instance_id, "load requested for unknown instance");
            return Dispatch::Ignored;
        };
        if !node.is_pending() {
            tracing::debug!(id = %instance_id, state = %node.state(), "instance already activated");
            return Dispatch::Ignored;
        }

        node.state = ActivationState::Loading;
        node.placeholder_visible = false;
        node.loader_visible = true;
        if let Some(watcher) = node.watcher.as_mut() {
            watcher.detach();
        }

        // From here on every path ends in `loaded` or `error`.
        match prepare(node, &self.options) {
            Ok(injection) => {
                tracing::debug!(
                    id = %instance_id,
                    len = injection.html.len(),
                    delay_ms = self.options.inject_delay_ms,
                    "scheduled injection"
                );
                self.scheduler.schedule(self.options.inject_delay_ms, injection);
            }
            Err(err) => self.fail(instance_id, err),
        }
        Dispatch::Started
    }

    fn run_injection(&mut self, task: Injection) {
        match self.page.instance(&task.instance_id).map(InstanceNode::state) {
            Some(ActivationState::Loading) => {}
            Some(_) => return,
            None => {
                tracing::debug!(id = %task.instance_id, "instance removed before injection");
                return;
            }
        }

        match self.inject(&task) {
            Ok(content) => {
                if let Some(node) = self.page.instance_mut(&task.instance_id) {
                    node.content = content;
                    node.mark_loaded();
                }
                tracing::debug!(id = %task.instance_id, "instance loaded");
                self.events.emit(&LifecycleEvent::Loaded {
                    instance_id: task.instance_id,
                });
            }
            Err(err) => self.fail(&task.instance_id, err),
        }
    }

    fn inject(&mut self, task: &Injection) -> Result<String> {
        let id = task.instance_id.as_str();
        let rewrite_failed = |err: lol_html::errors::RewritingError| ActivationError::Injection {
            message: err.to_string(),
        };
        let host_failed = |message: String| ActivationError::Injection { message };

        if !task.scripts_allowed {
            let html = scripts::remove_scripts(&task.html).map_err(rewrite_failed)?;
            self.host.inject(id, &html).map_err(host_failed)?;
            return Ok(html);
        }

        let (html, scripts) = scripts::materialize(&task.html).map_err(rewrite_failed)?;
        self.host.inject(id, &html).map_err(host_failed)?;
        for script in &scripts {
            tracing::debug!(id, src = ?script.src(), "running script");
            self.host.run_script(id, script).map_err(host_failed)?;
        }
        Ok(html)
    }

    fn fail(&mut self, instance_id: &str, err: ActivationError) {
        tracing::error!(id = %instance_id, error = %err, "activation failed");
        if let Some(node) = self.page.instance_mut(instance_id) {
            node.mark_error();
        }
        if let ActivationError::UnsafeContent { reason } = &err {
            self.events.emit(&LifecycleEvent::SecurityRejected {
                instance_id: instance_id.to_string(),
                reason: reason.clone(),
            });
        }
        self.events.emit(&LifecycleEvent::Failed {
            instance_id: instance_id.to_string(),
            error: err,
        });
    }
}

/// Decode, bound, scan and sanitize. Runs synchronously at activation time.
fn prepare(node: &InstanceNode, options: &ControllerOptions) -> Result<Injection> {
    let encoded = match node.data_content() {
        Some(encoded) if node.has_content_region() && !encoded.trim().is_empty() => encoded,
        _ => {
            return Err(ActivationError::MissingContainer {
                id: node.id().to_string(),
            });
        }
    };

    let html = payload::decode(encoded)?;
    if html.len() > options.max_content_bytes {
        return Err(ActivationError::Oversize {
            len: html.len(),
            max: options.max_content_bytes,
        });
    }

    let scripts_allowed = node.allow_scripts();
    if !scripts_allowed {
        let report = scan::scan_client(&html);
        if !report.is_clean() {
            return Err(ActivationError::UnsafeContent {
                reason: report.reasons().join("; "),
            });
        }
    }

    Ok(Injection {
        instance_id: node.id().to_string(),
        html: ClientSanitizer::new(scripts_allowed).sanitize(&html),
        scripts_allowed,
    })
}
