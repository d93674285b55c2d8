//! The rule manager facade.
//!
//! [`RuleManager`] is what a component runtime talks to. Each transition
//! brackets its run with [`acquire`](RuleManager::acquire) and
//! [`release`](RuleManager::release); the manager keeps exactly one managed
//! stylesheet per document, shares rules between identical animations, and
//! deletes them once nobody holds them.
//!
//! Deletion is deferred through the [`Executor`]: a release never removes a
//! rule synchronously, so an element that releases and re-acquires the same
//! animation in one turn keeps its rule.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};
use std::time::Duration;

use csp_styles_core::logging::targets;
use csp_styles_core::{Executor, LocalTask};

use crate::config::{CollectionDelay, ManagerConfig};
use crate::host::{Document, SheetId, StyleSheetDescriptor};
use crate::keyframes::{KeyframeSpec, RuleName, RuleNameHasher};
use crate::rules::{
    CollectionReport, DeferredCollector, ManagedStylesheet, RuleRefCounter, StylesheetLocator,
};
use crate::{Error, Result};

/// Identifies an element of the component runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId(u64);

impl ElementId {
    /// Create an element ID from a raw value.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw u64 value of this element ID.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Per-document state behind the manager handle.
struct ManagerState<D> {
    document: D,
    locator: StylesheetLocator,
    hasher: RuleNameHasher,
    counter: RuleRefCounter,
    collector: DeferredCollector,
    holdings: HashMap<ElementId, Vec<RuleName>>,
}

impl<D: Document> ManagerState<D> {
    fn acquire(&mut self, spec: &KeyframeSpec) -> Result<RuleName> {
        let name = self.hasher.name_for(spec)?;
        let text = spec.to_rule(&name)?;

        let ensured = self.locator.ensure(&self.document)?;
        if ensured.replaced {
            self.collector.clear();
            let refused = self.counter.reinsert_held(&self.document, ensured.sheet);
            if !refused.is_empty() {
                self.holdings.retain(|_, held| {
                    held.retain(|name| !refused.contains(name));
                    !held.is_empty()
                });
            }
        }

        self.counter
            .acquire(&self.document, ensured.sheet, &name, &text, &mut self.collector)?;
        Ok(name)
    }

    fn release(&mut self, name: &RuleName) -> Result<bool> {
        Ok(self.counter.release(name, &mut self.collector)?.queue_pass)
    }

    fn release_for(&mut self, element: ElementId, name: &RuleName) -> Result<bool> {
        let not_held = || Error::NotHeld {
            element,
            name: name.to_string(),
        };
        let held = self.holdings.get_mut(&element).ok_or_else(not_held)?;
        let position = held.iter().position(|held| held == name).ok_or_else(not_held)?;
        held.swap_remove(position);
        if held.is_empty() {
            self.holdings.remove(&element);
        }
        self.release(name)
    }

    fn collect(&mut self) -> CollectionReport {
        let sheet = self.locator.managed().map(|managed| managed.sheet);
        self.collector.collect(&self.document, sheet, &mut self.counter)
    }
}

/// Keyframe rule lifecycle manager for one document.
///
/// `RuleManager` is a cheap handle; clones share the same state. It is meant
/// for the single thread that drives the document's event loop.
///
/// # Example
///
/// ```
/// use std::rc::Rc;
///
/// use csp_styles::host::{ContentSecurityPolicy, MemoryDocument};
/// use csp_styles::keyframes::KeyframeSpec;
/// use csp_styles::manager::RuleManager;
/// use csp_styles_core::TaskQueue;
///
/// let document = MemoryDocument::with_policy(ContentSecurityPolicy::parse("style-src 'self'"));
/// let queue = TaskQueue::new();
/// let manager = RuleManager::new(document.clone(), Rc::new(queue.clone()));
///
/// let fade = KeyframeSpec::from_to("opacity: 0", "opacity: 1").unwrap();
/// let name = manager.acquire(&fade).unwrap();
/// assert_eq!(manager.ref_count(name.as_str()), Some(1));
///
/// manager.release(&name).unwrap();
/// queue.run_microtasks();
/// assert_eq!(manager.ref_count(name.as_str()), None);
/// assert!(document.violations().is_empty());
/// ```
pub struct RuleManager<D: Document + 'static> {
    state: Rc<RefCell<ManagerState<D>>>,
    executor: Rc<dyn Executor>,
    collection: CollectionDelay,
}

impl<D: Document + 'static> RuleManager<D> {
    /// Create a manager with the default configuration.
    pub fn new(document: D, executor: Rc<dyn Executor>) -> Self {
        Self::from_parts(document, executor, ManagerConfig::default(), RuleNameHasher::default())
    }

    /// Create a manager with the given configuration.
    pub fn with_config(document: D, executor: Rc<dyn Executor>, config: ManagerConfig) -> Result<Self> {
        config.validate()?;
        let hasher = RuleNameHasher::new(config.name_prefix.clone())?;
        Ok(Self::from_parts(document, executor, config, hasher))
    }

    fn from_parts(
        document: D,
        executor: Rc<dyn Executor>,
        config: ManagerConfig,
        hasher: RuleNameHasher,
    ) -> Self {
        let state = ManagerState {
            document,
            locator: StylesheetLocator::new(config.marker, config.media_type),
            hasher,
            counter: RuleRefCounter::new(),
            collector: DeferredCollector::new(),
            holdings: HashMap::new(),
        };
        Self {
            state: Rc::new(RefCell::new(state)),
            executor,
            collection: config.collection,
        }
    }

    /// Take a reference to the rule for `spec` and return its name.
    ///
    /// Creates the managed stylesheet on first use and inserts the rule only
    /// if no rule with the same body exists. Malformed specs and insertion
    /// failures propagate; nothing is recorded for them.
    pub fn acquire(&self, spec: &KeyframeSpec) -> Result<RuleName> {
        self.state.borrow_mut().acquire(spec)
    }

    /// Like [`acquire`](Self::acquire), but a refusal by the document's style
    /// policy yields `None` so the caller can run its transition without an
    /// animation.
    pub fn acquire_or_skip(&self, spec: &KeyframeSpec) -> Result<Option<RuleName>> {
        match self.acquire(spec) {
            Ok(name) => Ok(Some(name)),
            Err(err) if err.is_policy_violation() => {
                tracing::warn!(target: targets::RULES, error = %err, "keyframes blocked; skipping animation");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Drop a reference taken with [`acquire`](Self::acquire).
    ///
    /// At zero the rule is deleted by the next collection pass, unless it is
    /// acquired again first.
    pub fn release(&self, name: &RuleName) -> Result<()> {
        let queue_pass = self.state.borrow_mut().release(name)?;
        if queue_pass {
            self.queue_collection();
        }
        Ok(())
    }

    /// Acquire on behalf of `element`, recording that it holds the rule.
    pub fn acquire_for(&self, element: ElementId, spec: &KeyframeSpec) -> Result<RuleName> {
        let mut state = self.state.borrow_mut();
        let name = state.acquire(spec)?;
        state.holdings.entry(element).or_default().push(name.clone());
        Ok(name)
    }

    /// Release a rule `element` acquired with
    /// [`acquire_for`](Self::acquire_for).
    pub fn release_for(&self, element: ElementId, name: &RuleName) -> Result<()> {
        let queue_pass = self.state.borrow_mut().release_for(element, name)?;
        if queue_pass {
            self.queue_collection();
        }
        Ok(())
    }

    /// Release everything `element` still holds, for an element destroyed
    /// mid-transition. Returns how many references were dropped.
    pub fn release_element(&self, element: ElementId) -> usize {
        let (released, queue_pass) = {
            let mut state = self.state.borrow_mut();
            let held = state.holdings.remove(&element).unwrap_or_default();
            let mut released = 0;
            let mut queue_pass = false;
            for name in &held {
                match state.release(name) {
                    Ok(queued) => {
                        released += 1;
                        queue_pass |= queued;
                    }
                    Err(err) => {
                        tracing::warn!(target: targets::RULES, %element, error = %err, "dropping stale holding");
                    }
                }
            }
            (released, queue_pass)
        };
        if queue_pass {
            self.queue_collection();
        }
        released
    }

    /// The rules `element` currently holds, one entry per reference.
    pub fn held_by(&self, element: ElementId) -> Vec<RuleName> {
        self.state
            .borrow()
            .holdings
            .get(&element)
            .cloned()
            .unwrap_or_default()
    }

    fn queue_collection(&self) {
        spawn_collection(Rc::downgrade(&self.state), Rc::downgrade(&self.executor), self.collection);
    }

    /// Run a collection pass now instead of waiting for the queued one.
    pub fn collect_now(&self) -> CollectionReport {
        self.state.borrow_mut().collect()
    }

    /// Index of the reusable managed stylesheet in `sheets`, using this
    /// manager's marker and media type.
    pub fn locate_managed_stylesheet_index(&self, sheets: &[StyleSheetDescriptor]) -> Option<usize> {
        self.state.borrow().locator.locate(sheets)
    }

    /// The reference count of rule `name`, if it is tracked.
    pub fn ref_count(&self, name: &str) -> Option<usize> {
        self.state.borrow().counter.ref_count(name)
    }

    /// Whether rule `name` waits for the next collection pass.
    pub fn is_pending(&self, name: &str) -> bool {
        self.state.borrow().collector.is_pending(name)
    }

    /// Get the number of tracked rules, pending ones included.
    pub fn rule_count(&self) -> usize {
        self.state.borrow().counter.len()
    }

    /// The managed stylesheet, once located or created.
    pub fn managed_sheet(&self) -> Option<SheetId> {
        self.managed_stylesheet().map(|managed| managed.sheet)
    }

    /// The managed stylesheet with its marker and origin.
    pub fn managed_stylesheet(&self) -> Option<ManagedStylesheet> {
        self.state.borrow().locator.managed().cloned()
    }
}

/// Queue a collection pass on `executor`.
///
/// A pass that finds the manager borrowed re-queues itself as a timer task,
/// so pending rules are collected on a later turn.
fn spawn_collection<D: Document + 'static>(
    state: Weak<RefCell<ManagerState<D>>>,
    executor: Weak<dyn Executor>,
    delay: CollectionDelay,
) {
    let Some(runner) = executor.upgrade() else {
        return;
    };
    let task: LocalTask = Box::new(move || {
        let Some(strong) = state.upgrade() else {
            return;
        };
        let Ok(mut borrowed) = strong.try_borrow_mut() else {
            tracing::warn!(target: targets::COLLECTOR, "manager busy; collection pass re-queued");
            let retry = match delay {
                CollectionDelay::Microtask => CollectionDelay::Timer(Duration::ZERO),
                timer => timer,
            };
            spawn_collection(state, executor, retry);
            return;
        };
        borrowed.collect();
    });
    match delay {
        CollectionDelay::Microtask => runner.spawn_microtask(task),
        CollectionDelay::Timer(wait) => runner.spawn_after(wait, task),
    }
    tracing::trace!(target: targets::COLLECTOR, ?delay, "collection pass queued");
}

impl<D: Document + 'static> Clone for RuleManager<D> {
    fn clone(&self) -> Self {
        Self {
            state: Rc::clone(&self.state),
            executor: Rc::clone(&self.executor),
            collection: self.collection,
        }
    }
}

impl<D: Document + 'static> fmt::Debug for RuleManager<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("RuleManager");
        match self.state.try_borrow() {
            Ok(state) => debug
                .field("managed", &state.locator.managed())
                .field("rules", &state.counter.len())
                .field("pending", &state.collector.pending_count()),
            Err(_) => debug.field("state", &"<borrowed>"),
        };
        debug.field("collection", &self.collection).finish()
    }
}
