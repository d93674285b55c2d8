//! Page-level scenarios: locating the managed stylesheet and running
//! transitions under a strict Content-Security-Policy.

use std::rc::Rc;

use csp_styles::prelude::*;
use csp_styles::rules::SheetOrigin;
use csp_styles_core::TaskQueue;

const MARKER: &str = "svelte-stylesheet";
const STRICT: &str = "default-src 'self'; style-src 'self'";

/// Route log output to the test harness; filter with `RUST_LOG`.
fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[test]
fn test_locates_marker_among_other_sheets() {
    let sheets = [
        StyleSheetDescriptor::titled("my-stylesheet"),
        StyleSheetDescriptor::titled("my-stylesheet2"),
        StyleSheetDescriptor::titled(MARKER),
        StyleSheetDescriptor::titled("my-stylesheet3"),
    ];

    assert_eq!(locate_managed_stylesheet_index(&sheets), Some(2));
}

#[test]
fn test_no_marker_means_no_index() {
    let sheets = [
        StyleSheetDescriptor::titled("my-stylesheet"),
        StyleSheetDescriptor::untitled(),
    ];

    assert_eq!(locate_managed_stylesheet_index(&sheets), None);
}

#[test]
fn test_populated_marker_sheet_is_rejected() {
    let sheets = [StyleSheetDescriptor::titled(MARKER).with_rule("body { width:100%; }")];

    assert_eq!(locate_managed_stylesheet_index(&sheets), None);
}

#[test]
fn test_wrong_type_marker_sheet_is_rejected() {
    let sheets = [StyleSheetDescriptor::titled(MARKER).with_media_type("text/html")];

    assert_eq!(locate_managed_stylesheet_index(&sheets), None);
}

#[test]
fn test_strict_policy_blocks_inline_styles() {
    let document = MemoryDocument::with_policy(ContentSecurityPolicy::parse(STRICT));

    let blocked = document.append_inline_style("@keyframes x { to { opacity: 1; } }");

    assert!(blocked.is_err());
    assert_eq!(document.violations().len(), 1);
    assert_eq!(document.violations()[0].directive, "style-src");
}

#[test]
fn test_transition_under_strict_policy() {
    init_logging();
    let document = MemoryDocument::with_policy(ContentSecurityPolicy::parse(STRICT));
    document.add_linked_style_sheet(StyleSheetDescriptor::titled("site").with_rule("body { margin: 0; }"));
    let queue = TaskQueue::new();
    let manager = RuleManager::new(document.clone(), Rc::new(queue.clone()));

    // Nothing is created before a transition runs.
    assert_eq!(document.count_titled(MARKER), 0);

    let element = ElementId::new(1);
    let spec = KeyframeSpec::sample(10, |t| format!("opacity: {t}; transform: translateY({}px)", (1.0 - t) * 8.0))
        .unwrap();
    let name = manager.acquire_for(element, &spec).unwrap();

    assert_eq!(document.count_titled(MARKER), 1);
    assert_eq!(
        manager.managed_stylesheet().map(|managed| managed.origin),
        Some(SheetOrigin::Created)
    );
    assert!(document.violations().is_empty());

    manager.release_for(element, &name).unwrap();
    queue.run_until_idle();

    // The sheet stays for the document's lifetime; only the rule goes.
    assert_eq!(document.count_titled(MARKER), 1);
    let sheet = manager.managed_sheet().unwrap();
    assert_eq!(document.rules(sheet), Some(vec![]));
    assert!(document.violations().is_empty());
}

#[test]
fn test_server_rendered_marker_sheet_is_reused() {
    let document = MemoryDocument::with_policy(ContentSecurityPolicy::parse(STRICT));
    let provided = document.add_linked_style_sheet(StyleSheetDescriptor::titled(MARKER));
    let manager = RuleManager::new(document.clone(), Rc::new(TaskQueue::new()));

    manager.acquire(&KeyframeSpec::from_to("opacity: 0", "opacity: 1").unwrap()).unwrap();

    assert_eq!(manager.managed_sheet(), Some(provided));
    assert_eq!(document.count_titled(MARKER), 1);
    assert_eq!(document.created_count(), 0);
}

#[test]
fn test_noncompliant_engine_skips_animation() {
    init_logging();
    let document = MemoryDocument::with_policy(ContentSecurityPolicy::parse(STRICT));
    document.refuse_cssom_insertion(true);
    let manager = RuleManager::new(document.clone(), Rc::new(TaskQueue::new()));
    let spec = KeyframeSpec::from_to("opacity: 0", "opacity: 1").unwrap();

    assert_eq!(manager.acquire_or_skip(&spec).unwrap(), None);
    assert!(matches!(manager.acquire(&spec), Err(ref err) if err.is_policy_violation()));
    assert_eq!(manager.rule_count(), 0);
}
