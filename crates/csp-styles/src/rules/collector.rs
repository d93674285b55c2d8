//! Deferred deletion of unreferenced rules.

use std::collections::HashSet;

use csp_styles_core::logging::{span_names, targets};

use crate::host::{Document, SheetId};
use crate::keyframes::RuleName;
use crate::rules::RuleRefCounter;

/// What a collection pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionReport {
    /// Rules deleted from the sheet.
    pub deleted: Vec<RuleName>,
    /// Rules already gone from the sheet; only their bookkeeping was dropped.
    pub stale: Vec<RuleName>,
    /// Names that were acquired again before the pass ran.
    pub skipped: Vec<RuleName>,
}

impl CollectionReport {
    /// Whether the pass touched nothing.
    pub fn is_empty(&self) -> bool {
        self.deleted.is_empty() && self.stale.is_empty() && self.skipped.is_empty()
    }
}

/// Batches zero-count rules and deletes them in one later pass.
///
/// Releases only mark names. The owner queues a pass when [`schedule`]
/// reports that none is queued yet, so any number of releases in one
/// synchronous turn cost a single pass.
///
/// [`schedule`]: DeferredCollector::schedule
#[derive(Debug, Default)]
pub struct DeferredCollector {
    pending: HashSet<RuleName>,
    pass_queued: bool,
}

impl DeferredCollector {
    /// Create an idle collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `name` for deletion. Returns true when the caller must queue a
    /// pass.
    pub fn schedule(&mut self, name: RuleName) -> bool {
        self.pending.insert(name);
        !std::mem::replace(&mut self.pass_queued, true)
    }

    /// Unmark `name`. Returns true if it was pending.
    pub fn cancel(&mut self, name: &str) -> bool {
        self.pending.remove(name)
    }

    /// Whether `name` waits for deletion.
    pub fn is_pending(&self, name: &str) -> bool {
        self.pending.contains(name)
    }

    /// Get the number of names waiting for deletion.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Whether a pass is queued and has not run yet.
    pub fn is_pass_queued(&self) -> bool {
        self.pass_queued
    }

    /// Drop every pending name without touching the document.
    pub fn clear(&mut self) {
        self.pending.clear();
    }

    /// Run a collection pass.
    ///
    /// Every pending name whose count is still zero is deleted from `sheet`.
    /// Deletions run from the highest index down so that no deletion moves a
    /// rule that is still to be deleted. Rules that vanished from the sheet
    /// on their own are forgotten. With no sheet, or a detached one, there
    /// is nothing to delete and the bookkeeping is dropped.
    pub fn collect<D: Document>(
        &mut self,
        document: &D,
        sheet: Option<SheetId>,
        counter: &mut RuleRefCounter,
    ) -> CollectionReport {
        let span = tracing::trace_span!(
            target: targets::COLLECTOR,
            span_names::COLLECTION,
            pending = self.pending.len()
        );
        let _enter = span.enter();

        self.pass_queued = false;
        let mut report = CollectionReport::default();
        let mut doomed = Vec::with_capacity(self.pending.len());

        for name in self.pending.drain() {
            match counter.ref_count(name.as_str()) {
                Some(0) => {}
                Some(_) => {
                    report.skipped.push(name);
                    continue;
                }
                None => continue,
            }
            let index = sheet
                .filter(|&sheet| document.is_attached(sheet))
                .and_then(|sheet| counter.resolve_index(document, sheet, &name));
            match index {
                Some(index) => doomed.push((index, name)),
                None => {
                    tracing::warn!(
                        target: targets::COLLECTOR,
                        %name,
                        "rule disappeared from the managed stylesheet before collection"
                    );
                    counter.forget(&name);
                    report.stale.push(name);
                }
            }
        }

        doomed.sort_unstable_by(|a, b| b.0.cmp(&a.0));
        for (index, name) in doomed {
            let Some(sheet) = sheet else { break };
            match document.delete_rule(sheet, index) {
                Ok(()) => {
                    tracing::trace!(target: targets::COLLECTOR, %name, index, "rule deleted");
                    counter.remove_deleted(&name, index);
                    report.deleted.push(name);
                }
                Err(err) => {
                    tracing::warn!(
                        target: targets::COLLECTOR,
                        %name,
                        index,
                        error = %err,
                        "failed to delete rule; forgetting it"
                    );
                    counter.forget(&name);
                    report.stale.push(name);
                }
            }
        }

        tracing::debug!(
            target: targets::COLLECTOR,
            deleted = report.deleted.len(),
            stale = report.stale.len(),
            skipped = report.skipped.len(),
            "collection pass finished"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MemoryDocument;

    struct Fixture {
        doc: MemoryDocument,
        sheet: SheetId,
        counter: RuleRefCounter,
        collector: DeferredCollector,
    }

    impl Fixture {
        fn new() -> Self {
            let doc = MemoryDocument::new();
            let sheet = doc.create_style_sheet("svelte-stylesheet", "text/css").unwrap();
            Self {
                doc,
                sheet,
                counter: RuleRefCounter::new(),
                collector: DeferredCollector::new(),
            }
        }

        fn acquire(&mut self, raw: &str) -> RuleName {
            let name = RuleName::from_hashed(raw, 0);
            let text = format!("@keyframes {name} {{ 100% {{ opacity: 1; }} }}");
            self.counter
                .acquire(&self.doc, self.sheet, &name, &text, &mut self.collector)
                .unwrap();
            name
        }

        fn release(&mut self, name: &RuleName) -> bool {
            self.counter.release(name, &mut self.collector).unwrap().queue_pass
        }

        fn collect(&mut self) -> CollectionReport {
            self.collector
                .collect(&self.doc, Some(self.sheet), &mut self.counter)
        }
    }

    #[test]
    fn only_first_schedule_requests_a_pass() {
        let mut collector = DeferredCollector::new();
        assert!(collector.schedule(RuleName::from_hashed("a", 0)));
        assert!(!collector.schedule(RuleName::from_hashed("b", 0)));
        assert!(collector.is_pass_queued());
        assert_eq!(collector.pending_count(), 2);
    }

    #[test]
    fn collection_deletes_in_descending_order() {
        let mut fx = Fixture::new();
        let names: Vec<_> = ["a", "b", "c", "d"].iter().map(|n| fx.acquire(n)).collect();

        assert!(fx.release(&names[0]));
        assert!(!fx.release(&names[2]));
        let report = fx.collect();

        assert_eq!(report.deleted, vec![names[2].clone(), names[0].clone()]);
        let remaining = fx.doc.rules(fx.sheet).unwrap();
        assert_eq!(remaining.len(), 2);
        assert!(remaining[0].contains(names[1].as_str()));
        assert!(remaining[1].contains(names[3].as_str()));
        assert_eq!(fx.counter.get(names[1].as_str()).map(|r| r.index), Some(0));
        assert_eq!(fx.counter.get(names[3].as_str()).map(|r| r.index), Some(1));
        assert!(!fx.collector.is_pass_queued());
    }

    #[test]
    fn shifted_indices_stay_correct_across_passes() {
        let mut fx = Fixture::new();
        let a = fx.acquire("a");
        let b = fx.acquire("b");
        let c = fx.acquire("c");

        fx.release(&a);
        fx.collect();
        fx.release(&c);
        let report = fx.collect();

        assert_eq!(report.deleted, vec![c]);
        let remaining = fx.doc.rules(fx.sheet).unwrap();
        assert_eq!(remaining.len(), 1);
        assert!(remaining[0].contains(b.as_str()));
    }

    #[test]
    fn reacquired_names_are_not_collected() {
        let mut fx = Fixture::new();
        let a = fx.acquire("a");
        fx.release(&a);
        fx.acquire("a");

        let report = fx.collect();

        assert!(report.is_empty());
        assert_eq!(fx.doc.rule_count(fx.sheet).unwrap(), 1);
    }

    #[test]
    fn externally_removed_rules_are_forgotten() {
        let mut fx = Fixture::new();
        let a = fx.acquire("a");
        let b = fx.acquire("b");
        fx.doc.delete_rule(fx.sheet, 0).unwrap();

        fx.release(&a);
        fx.release(&b);
        let report = fx.collect();

        assert_eq!(report.stale, vec![a]);
        assert_eq!(report.deleted, vec![b]);
        assert!(fx.counter.is_empty());
        assert_eq!(fx.doc.rule_count(fx.sheet).unwrap(), 0);
    }

    #[test]
    fn detached_sheet_drops_bookkeeping() {
        let mut fx = Fixture::new();
        let a = fx.acquire("a");
        fx.release(&a);
        fx.doc.remove_style_sheet(fx.sheet);

        let report = fx.collect();

        assert_eq!(report.stale, vec![a]);
        assert!(fx.counter.is_empty());
    }
}
