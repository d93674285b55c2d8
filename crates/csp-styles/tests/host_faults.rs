//! Manager behavior when the host document misbehaves: failing sheet
//! creation and collection passes that run while the manager is busy.

use std::cell::Cell;
use std::rc::Rc;

use csp_styles::host::CssomError;
use csp_styles::prelude::*;
use csp_styles_core::TaskQueue;

/// Route log output to the test harness; filter with `RUST_LOG`.
fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A [`MemoryDocument`] with switchable faults.
#[derive(Clone)]
struct FaultyDocument {
    inner: MemoryDocument,
    queue: TaskQueue,
    fail_next_create: Rc<Cell<bool>>,
    drain_on_next_insert: Rc<Cell<bool>>,
}

impl FaultyDocument {
    fn new(queue: &TaskQueue) -> Self {
        Self {
            inner: MemoryDocument::new(),
            queue: queue.clone(),
            fail_next_create: Rc::new(Cell::new(false)),
            drain_on_next_insert: Rc::new(Cell::new(false)),
        }
    }
}

impl Document for FaultyDocument {
    fn style_sheets(&self) -> Vec<StyleSheetDescriptor> {
        self.inner.style_sheets()
    }

    fn adopt_style_sheet(&self, index: usize) -> std::result::Result<SheetId, CssomError> {
        self.inner.adopt_style_sheet(index)
    }

    fn create_style_sheet(&self, title: &str, media_type: &str) -> std::result::Result<SheetId, CssomError> {
        if self.fail_next_create.replace(false) {
            return Err(CssomError::Host("head is not writable".into()));
        }
        self.inner.create_style_sheet(title, media_type)
    }

    fn is_attached(&self, sheet: SheetId) -> bool {
        self.inner.is_attached(sheet)
    }

    fn rule_count(&self, sheet: SheetId) -> std::result::Result<usize, CssomError> {
        self.inner.rule_count(sheet)
    }

    fn rule_text(&self, sheet: SheetId, index: usize) -> std::result::Result<Option<String>, CssomError> {
        self.inner.rule_text(sheet, index)
    }

    fn insert_rule(&self, sheet: SheetId, rule: &str, index: usize) -> std::result::Result<usize, CssomError> {
        // Models a host callback that spins the event loop mid-insertion.
        if self.drain_on_next_insert.replace(false) {
            self.queue.run_microtasks();
        }
        self.inner.insert_rule(sheet, rule, index)
    }

    fn delete_rule(&self, sheet: SheetId, index: usize) -> std::result::Result<(), CssomError> {
        self.inner.delete_rule(sheet, index)
    }
}

fn fade_in() -> KeyframeSpec {
    KeyframeSpec::from_to("opacity: 0", "opacity: 1").unwrap()
}

fn slide_in() -> KeyframeSpec {
    KeyframeSpec::from_to("transform: translateX(-100%)", "transform: none").unwrap()
}

fn managed_rules(document: &FaultyDocument, manager: &RuleManager<FaultyDocument>) -> Vec<String> {
    manager
        .managed_sheet()
        .and_then(|sheet| document.inner.rules(sheet))
        .unwrap_or_default()
}

#[test]
fn test_held_rule_survives_failed_sheet_replacement() {
    init_logging();
    let queue = TaskQueue::new();
    let document = FaultyDocument::new(&queue);
    let manager = RuleManager::new(document.clone(), Rc::new(queue.clone()));

    let name = manager.acquire(&fade_in()).unwrap();
    document.inner.remove_style_sheet(manager.managed_sheet().unwrap());

    document.fail_next_create.set(true);
    assert!(matches!(manager.acquire(&fade_in()), Err(Error::Cssom(CssomError::Host(_)))));

    let again = manager.acquire(&fade_in()).unwrap();

    assert_eq!(again, name);
    assert_eq!(manager.ref_count(name.as_str()), Some(2));
    let rules = managed_rules(&document, &manager);
    assert_eq!(rules.len(), 1);
    assert!(rules[0].starts_with(&format!("@keyframes {name} ")));
}

#[test]
fn test_pass_that_finds_manager_busy_runs_later() {
    init_logging();
    let queue = TaskQueue::new();
    let document = FaultyDocument::new(&queue);
    let manager = RuleManager::new(document.clone(), Rc::new(queue.clone()));

    let fade = manager.acquire(&fade_in()).unwrap();
    manager.release(&fade).unwrap();

    // The queued pass runs inside this acquire, while the manager is borrowed.
    document.drain_on_next_insert.set(true);
    let slide = manager.acquire(&slide_in()).unwrap();
    assert!(manager.is_pending(fade.as_str()));

    queue.run_until_idle();
    assert_eq!(manager.ref_count(fade.as_str()), None);
    assert_eq!(managed_rules(&document, &manager).len(), 1);

    // Later releases still queue their own pass.
    manager.release(&slide).unwrap();
    assert_eq!(queue.pending_count(), 1);
    queue.run_until_idle();
    assert!(managed_rules(&document, &manager).is_empty());
}
