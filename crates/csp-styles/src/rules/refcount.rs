//! Reference counting of inserted rules.

use std::collections::HashMap;

use csp_styles_core::logging::targets;

use crate::host::{Document, SheetId};
use crate::keyframes::RuleName;
use crate::rules::DeferredCollector;
use crate::{Error, Result};

/// One rule inserted into the managed stylesheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedRule {
    /// Index of the rule in the managed sheet's rule list, as last recorded.
    pub index: usize,
    /// Number of active consumers.
    pub ref_count: usize,
    /// The rule text that was inserted.
    pub text: String,
}

/// Outcome of a release.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Released {
    /// Consumers still holding the rule.
    pub remaining: usize,
    /// True when the caller must queue a collection pass.
    pub queue_pass: bool,
}

/// Maps rule names to their index and reference count.
#[derive(Debug, Default)]
pub struct RuleRefCounter {
    rules: HashMap<RuleName, ManagedRule>,
}

impl RuleRefCounter {
    /// Create an empty counter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a reference to the rule `name`, inserting `text` at the end of
    /// the sheet if the rule does not exist yet.
    ///
    /// A rule waiting for collection is revived in place: its pending
    /// deletion is cancelled and it is never re-inserted. When insertion
    /// fails nothing is recorded. A known name whose recorded text differs
    /// from `text` is a hash collision and is refused.
    pub fn acquire<D: Document>(
        &mut self,
        document: &D,
        sheet: SheetId,
        name: &RuleName,
        text: &str,
        collector: &mut DeferredCollector,
    ) -> Result<usize> {
        if let Some(rule) = self.rules.get_mut(name) {
            if rule.text != text {
                tracing::error!(target: targets::RULES, %name, "rule name collision");
                return Err(Error::NameCollision {
                    name: name.to_string(),
                });
            }
            if collector.cancel(name.as_str()) {
                tracing::trace!(target: targets::RULES, %name, "pending deletion cancelled");
            }
            rule.ref_count += 1;
            tracing::trace!(target: targets::RULES, %name, ref_count = rule.ref_count, "rule shared");
            return Ok(rule.index);
        }

        let end = document.rule_count(sheet)?;
        let index = document
            .insert_rule(sheet, text, end)
            .map_err(|source| Error::insert(name.as_str(), source))?;
        self.rules.insert(
            name.clone(),
            ManagedRule {
                index,
                ref_count: 1,
                text: text.to_string(),
            },
        );
        tracing::trace!(target: targets::RULES, %name, index, "rule inserted");
        Ok(index)
    }

    /// Drop a reference to `name`. At zero the name goes to the collector.
    ///
    /// Releasing an unknown name, or one whose count is already zero, is a
    /// usage error.
    pub fn release(&mut self, name: &RuleName, collector: &mut DeferredCollector) -> Result<Released> {
        let rule = self.rules.get_mut(name).ok_or_else(|| Error::UnknownRule {
            name: name.to_string(),
        })?;
        if rule.ref_count == 0 {
            return Err(Error::DoubleRelease {
                name: name.to_string(),
            });
        }

        rule.ref_count -= 1;
        let remaining = rule.ref_count;
        tracing::trace!(target: targets::RULES, %name, ref_count = remaining, "rule released");

        let queue_pass = remaining == 0 && collector.schedule(name.clone());
        Ok(Released {
            remaining,
            queue_pass,
        })
    }

    /// The bookkeeping for `name`.
    pub fn get(&self, name: &str) -> Option<&ManagedRule> {
        self.rules.get(name)
    }

    /// The reference count of `name`.
    pub fn ref_count(&self, name: &str) -> Option<usize> {
        self.get(name).map(|rule| rule.ref_count)
    }

    /// Get the number of tracked rules, pending ones included.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Check if no rules are tracked.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Forget every rule. Used when the managed sheet itself disappeared.
    pub fn clear(&mut self) {
        self.rules.clear();
    }

    /// Find the current index of `name` in the sheet.
    ///
    /// Trusts the recorded index only if the rule there still carries the
    /// name; otherwise scans the sheet. `None` means the rule is gone.
    pub(crate) fn resolve_index<D: Document>(
        &self,
        document: &D,
        sheet: SheetId,
        name: &RuleName,
    ) -> Option<usize> {
        let recorded = self.rules.get(name)?.index;
        let names_rule = |index: usize| {
            document
                .rule_text(sheet, index)
                .ok()
                .flatten()
                .is_some_and(|text| rule_text_names(&text, name.as_str()))
        };
        if names_rule(recorded) {
            return Some(recorded);
        }
        let count = document.rule_count(sheet).ok()?;
        (0..count).find(|&index| names_rule(index))
    }

    /// Remove `name` after its rule was deleted at `deleted_index`, shifting
    /// every rule recorded after it down by one.
    pub(crate) fn remove_deleted(&mut self, name: &RuleName, deleted_index: usize) {
        self.rules.remove(name);
        for rule in self.rules.values_mut() {
            if rule.index > deleted_index {
                rule.index -= 1;
            }
        }
    }

    /// Drop bookkeeping for a rule that is no longer in the sheet.
    pub(crate) fn forget(&mut self, name: &RuleName) {
        self.rules.remove(name);
    }

    /// Move every held rule into a fresh `sheet` after the old one was
    /// detached, keeping their relative order. Rules nobody holds are
    /// dropped, as are rules the new sheet refuses; the latter are returned.
    pub(crate) fn reinsert_held<D: Document>(&mut self, document: &D, sheet: SheetId) -> Vec<RuleName> {
        let mut held: Vec<_> = self
            .rules
            .drain()
            .filter(|(_, rule)| rule.ref_count > 0)
            .collect();
        held.sort_unstable_by_key(|(_, rule)| rule.index);

        let mut refused = Vec::new();
        for (name, mut rule) in held {
            let inserted = document
                .rule_count(sheet)
                .and_then(|end| document.insert_rule(sheet, &rule.text, end));
            match inserted {
                Ok(index) => {
                    rule.index = index;
                    self.rules.insert(name, rule);
                }
                Err(err) => {
                    tracing::warn!(
                        target: targets::RULES,
                        %name,
                        error = %err,
                        "could not move rule into the replacement stylesheet"
                    );
                    refused.push(name);
                }
            }
        }
        refused
    }
}

/// Whether serialized rule text is the `@keyframes` rule called `name`.
fn rule_text_names(text: &str, name: &str) -> bool {
    text.trim_start()
        .strip_prefix("@keyframes")
        .map(str::trim_start)
        .and_then(|rest| rest.strip_prefix(name))
        .is_some_and(|rest| rest.starts_with(|c: char| c.is_whitespace() || c == '{'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{CssomError, MemoryDocument};

    const FADE: &str = "@keyframes fade { 0% { opacity: 0; } 100% { opacity: 1; } }";

    fn setup() -> (MemoryDocument, SheetId) {
        let doc = MemoryDocument::new();
        let sheet = doc.create_style_sheet("svelte-stylesheet", "text/css").unwrap();
        (doc, sheet)
    }

    fn name(raw: &str) -> RuleName {
        RuleName::from_hashed(raw, 0)
    }

    fn rule(name: &RuleName) -> String {
        format!("@keyframes {name} {{ 100% {{ opacity: 1; }} }}")
    }

    #[test]
    fn rule_text_name_matching() {
        assert!(rule_text_names(FADE, "fade"));
        assert!(rule_text_names("@keyframes fade{to{opacity:1}}", "fade"));
        assert!(!rule_text_names(FADE, "fad"));
        assert!(!rule_text_names("body { width: 100%; }", "fade"));
    }

    #[test]
    fn acquire_inserts_once_and_counts() {
        let (doc, sheet) = setup();
        let mut counter = RuleRefCounter::new();
        let mut collector = DeferredCollector::new();
        let fade = name("fade");

        assert_eq!(counter.acquire(&doc, sheet, &fade, &rule(&fade), &mut collector).unwrap(), 0);
        assert_eq!(counter.acquire(&doc, sheet, &fade, &rule(&fade), &mut collector).unwrap(), 0);

        assert_eq!(counter.ref_count(fade.as_str()), Some(2));
        assert_eq!(doc.rule_count(sheet).unwrap(), 1);
    }

    #[test]
    fn new_rules_append_after_existing_ones() {
        let (doc, sheet) = setup();
        let mut counter = RuleRefCounter::new();
        let mut collector = DeferredCollector::new();
        let (a, b) = (name("a"), name("b"));

        counter.acquire(&doc, sheet, &a, &rule(&a), &mut collector).unwrap();
        assert_eq!(counter.acquire(&doc, sheet, &b, &rule(&b), &mut collector).unwrap(), 1);
    }

    #[test]
    fn release_to_zero_schedules_once() {
        let (doc, sheet) = setup();
        let mut counter = RuleRefCounter::new();
        let mut collector = DeferredCollector::new();
        let fade = name("fade");
        counter.acquire(&doc, sheet, &fade, &rule(&fade), &mut collector).unwrap();
        counter.acquire(&doc, sheet, &fade, &rule(&fade), &mut collector).unwrap();

        let first = counter.release(&fade, &mut collector).unwrap();
        assert_eq!(first, Released { remaining: 1, queue_pass: false });
        let second = counter.release(&fade, &mut collector).unwrap();
        assert_eq!(second, Released { remaining: 0, queue_pass: true });
        assert!(collector.is_pending(fade.as_str()));
    }

    #[test]
    fn reacquire_cancels_pending_deletion() {
        let (doc, sheet) = setup();
        let mut counter = RuleRefCounter::new();
        let mut collector = DeferredCollector::new();
        let fade = name("fade");
        counter.acquire(&doc, sheet, &fade, &rule(&fade), &mut collector).unwrap();
        counter.release(&fade, &mut collector).unwrap();

        counter.acquire(&doc, sheet, &fade, &rule(&fade), &mut collector).unwrap();

        assert!(!collector.is_pending(fade.as_str()));
        assert_eq!(counter.ref_count(fade.as_str()), Some(1));
        assert_eq!(doc.rule_count(sheet).unwrap(), 1);
    }

    #[test]
    fn double_release_and_unknown_names_are_errors() {
        let (doc, sheet) = setup();
        let mut counter = RuleRefCounter::new();
        let mut collector = DeferredCollector::new();
        let fade = name("fade");

        assert!(matches!(
            counter.release(&fade, &mut collector),
            Err(Error::UnknownRule { .. })
        ));

        counter.acquire(&doc, sheet, &fade, &rule(&fade), &mut collector).unwrap();
        counter.release(&fade, &mut collector).unwrap();
        assert!(matches!(
            counter.release(&fade, &mut collector),
            Err(Error::DoubleRelease { .. })
        ));
    }

    #[test]
    fn failed_insert_records_nothing() {
        let (doc, sheet) = setup();
        let mut counter = RuleRefCounter::new();
        let mut collector = DeferredCollector::new();
        let broken = name("broken");

        let err = counter
            .acquire(&doc, sheet, &broken, "@keyframes broken { 0% { opacity } }", &mut collector)
            .unwrap_err();

        assert!(matches!(
            err,
            Error::Insert {
                source: CssomError::Syntax { .. },
                ..
            }
        ));
        assert!(counter.is_empty());
        assert_eq!(doc.rule_count(sheet).unwrap(), 0);
    }

    #[test]
    fn held_rules_move_to_replacement_sheet() {
        let (doc, sheet) = setup();
        let mut counter = RuleRefCounter::new();
        let mut collector = DeferredCollector::new();
        let (a, b, c) = (name("a"), name("b"), name("c"));
        for n in [&a, &b, &c] {
            counter.acquire(&doc, sheet, n, &rule(n), &mut collector).unwrap();
        }
        counter.release(&b, &mut collector).unwrap();

        doc.remove_style_sheet(sheet);
        let fresh = doc.create_style_sheet("svelte-stylesheet", "text/css").unwrap();
        let refused = counter.reinsert_held(&doc, fresh);

        assert!(refused.is_empty());
        assert_eq!(counter.len(), 2);
        assert_eq!(counter.get(a.as_str()).map(|r| r.index), Some(0));
        assert_eq!(counter.get(c.as_str()).map(|r| r.index), Some(1));
        assert_eq!(doc.rules(fresh).unwrap(), vec![rule(&a), rule(&c)]);
    }

    #[test]
    fn resolve_index_follows_external_shifts() {
        let (doc, sheet) = setup();
        let mut counter = RuleRefCounter::new();
        let mut collector = DeferredCollector::new();
        let (a, b) = (name("a"), name("b"));
        counter.acquire(&doc, sheet, &a, &rule(&a), &mut collector).unwrap();
        counter.acquire(&doc, sheet, &b, &rule(&b), &mut collector).unwrap();

        // Another script removes the first rule behind the manager's back.
        doc.delete_rule(sheet, 0).unwrap();

        assert_eq!(counter.resolve_index(&doc, sheet, &b), Some(0));
        assert_eq!(counter.resolve_index(&doc, sheet, &a), None);
    }

    #[test]
    fn colliding_text_is_refused() {
        let (doc, sheet) = setup();
        let mut counter = RuleRefCounter::new();
        let mut collector = DeferredCollector::new();
        let fade = name("fade");
        counter.acquire(&doc, sheet, &fade, &rule(&fade), &mut collector).unwrap();

        let other = format!("@keyframes {fade} {{ 100% {{ opacity: 0.5; }} }}");
        let err = counter.acquire(&doc, sheet, &fade, &other, &mut collector).unwrap_err();

        assert!(matches!(err, Error::NameCollision { .. }));
        assert_eq!(counter.ref_count(fade.as_str()), Some(1));
        assert_eq!(doc.rules(sheet).unwrap(), vec![rule(&fade)]);
    }
}
