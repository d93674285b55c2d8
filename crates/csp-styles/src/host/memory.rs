//! In-process document host.
//!
//! `MemoryDocument` stands in for a browser document on hosts without a
//! CSSOM. It keeps an ordered head of stylesheets, validates inserted rules
//! like `insertRule` does, and enforces the inline-style half of a
//! Content-Security-Policy. Clones share one document, so tests can play the
//! part of other page scripts.

use std::fmt;
use std::sync::Arc;

use csp_styles_core::logging::targets;
use parking_lot::Mutex;
use slotmap::SlotMap;

use super::csp::{ContentSecurityPolicy, CspViolation};
use super::{CssomError, Document, SheetId, StyleSheetDescriptor};
use crate::parser;

/// How a sheet entered the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SheetOrigin {
    /// Authored into the page, such as a `<link>` element.
    Linked,
    /// A `<style>` element with text content.
    Inline,
    /// An empty `<style>` element created through the DOM.
    Created,
}

#[derive(Debug)]
struct SheetNode {
    title: Option<String>,
    media_type: Option<String>,
    /// `None` when the rules cannot be read.
    rules: Option<Vec<String>>,
    origin: SheetOrigin,
}

impl SheetNode {
    fn descriptor(&self) -> StyleSheetDescriptor {
        StyleSheetDescriptor {
            title: self.title.clone(),
            media_type: self.media_type.clone(),
            rules: self.rules.clone(),
        }
    }
}

#[derive(Debug, Default)]
struct DocumentState {
    sheets: SlotMap<SheetId, SheetNode>,
    /// Attached sheets in document order.
    head: Vec<SheetId>,
    policy: ContentSecurityPolicy,
    refuse_cssom: bool,
    violations: Vec<CspViolation>,
}

impl DocumentState {
    fn attached_rules(&mut self, sheet: SheetId) -> Result<&mut Vec<String>, CssomError> {
        if !self.head.contains(&sheet) {
            return Err(CssomError::SheetDetached);
        }
        self.sheets
            .get_mut(sheet)
            .ok_or(CssomError::SheetDetached)?
            .rules
            .as_mut()
            .ok_or(CssomError::Inaccessible)
    }

    fn attach(&mut self, node: SheetNode) -> SheetId {
        let id = self.sheets.insert(node);
        self.head.push(id);
        id
    }
}

/// A shared, in-memory document.
#[derive(Clone, Default)]
pub struct MemoryDocument {
    inner: Arc<Mutex<DocumentState>>,
}

impl MemoryDocument {
    /// Create an empty document with no policy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty document that enforces `policy`.
    pub fn with_policy(policy: ContentSecurityPolicy) -> Self {
        let doc = Self::new();
        doc.inner.lock().policy = policy;
        doc
    }

    /// The enforced policy.
    pub fn policy(&self) -> ContentSecurityPolicy {
        self.inner.lock().policy.clone()
    }

    /// Model an engine that refuses CSSOM insertion outright.
    ///
    /// No current engine does this; it exists to exercise the manager's
    /// policy-refusal path.
    pub fn refuse_cssom_insertion(&self, refuse: bool) {
        self.inner.lock().refuse_cssom = refuse;
    }

    /// Add a page-authored stylesheet (for example a `<link title=...>`).
    ///
    /// The descriptor's rules are taken as-is, without validation.
    pub fn add_linked_style_sheet(&self, sheet: StyleSheetDescriptor) -> SheetId {
        self.inner.lock().attach(SheetNode {
            title: sheet.title,
            media_type: sheet.media_type,
            rules: sheet.rules,
            origin: SheetOrigin::Linked,
        })
    }

    /// Append a `<style>` element whose text is `css`.
    ///
    /// Inline style text is subject to the policy: when the policy forbids
    /// it, a violation is recorded and nothing is added.
    pub fn append_inline_style(&self, css: &str) -> Result<SheetId, CssomError> {
        let mut state = self.inner.lock();
        if !state.policy.allows_inline_styles() {
            let directive = state
                .policy
                .style_directive()
                .map_or("style-src", |(name, _)| name);
            let violation = CspViolation::new(directive, css);
            tracing::warn!(target: targets::HOST, directive, "inline style blocked by policy");
            state.violations.push(violation);
            return Err(CssomError::PolicyViolation {
                directive: directive.to_string(),
            });
        }
        let rules = parser::split_rules(css)?;
        Ok(state.attach(SheetNode {
            title: None,
            media_type: None,
            rules: Some(rules),
            origin: SheetOrigin::Inline,
        }))
    }

    /// Remove a sheet's node from the document.
    ///
    /// Returns `false` if the sheet was not attached.
    pub fn remove_style_sheet(&self, sheet: SheetId) -> bool {
        let mut state = self.inner.lock();
        let Some(pos) = state.head.iter().position(|id| *id == sheet) else {
            return false;
        };
        state.head.remove(pos);
        state.sheets.remove(sheet);
        true
    }

    /// The rule texts of a sheet, if it is attached and readable.
    pub fn rules(&self, sheet: SheetId) -> Option<Vec<String>> {
        let state = self.inner.lock();
        if !state.head.contains(&sheet) {
            return None;
        }
        state.sheets.get(sheet)?.rules.clone()
    }

    /// The number of attached sheets whose title is `title`.
    pub fn count_titled(&self, title: &str) -> usize {
        let state = self.inner.lock();
        state
            .head
            .iter()
            .filter_map(|id| state.sheets.get(*id))
            .filter(|node| node.title.as_deref() == Some(title))
            .count()
    }

    /// The number of `<style>` elements created through the DOM.
    pub fn created_count(&self) -> usize {
        let state = self.inner.lock();
        state
            .head
            .iter()
            .filter_map(|id| state.sheets.get(*id))
            .filter(|node| node.origin == SheetOrigin::Created)
            .count()
    }

    /// Policy violations reported so far.
    pub fn violations(&self) -> Vec<CspViolation> {
        self.inner.lock().violations.clone()
    }
}

impl Document for MemoryDocument {
    fn style_sheets(&self) -> Vec<StyleSheetDescriptor> {
        let state = self.inner.lock();
        state
            .head
            .iter()
            .filter_map(|id| state.sheets.get(*id))
            .map(SheetNode::descriptor)
            .collect()
    }

    fn adopt_style_sheet(&self, index: usize) -> Result<SheetId, CssomError> {
        let state = self.inner.lock();
        state.head.get(index).copied().ok_or(CssomError::IndexOutOfRange {
            index,
            len: state.head.len(),
        })
    }

    fn create_style_sheet(&self, title: &str, media_type: &str) -> Result<SheetId, CssomError> {
        let id = self.inner.lock().attach(SheetNode {
            title: Some(title.to_string()),
            media_type: Some(media_type.to_string()),
            rules: Some(Vec::new()),
            origin: SheetOrigin::Created,
        });
        tracing::debug!(target: targets::HOST, ?id, title, "style element appended to head");
        Ok(id)
    }

    fn is_attached(&self, sheet: SheetId) -> bool {
        self.inner.lock().head.contains(&sheet)
    }

    fn rule_count(&self, sheet: SheetId) -> Result<usize, CssomError> {
        Ok(self.inner.lock().attached_rules(sheet)?.len())
    }

    fn rule_text(&self, sheet: SheetId, index: usize) -> Result<Option<String>, CssomError> {
        Ok(self.inner.lock().attached_rules(sheet)?.get(index).cloned())
    }

    fn insert_rule(&self, sheet: SheetId, rule: &str, index: usize) -> Result<usize, CssomError> {
        let mut state = self.inner.lock();
        if state.refuse_cssom {
            let violation = CspViolation::new("style-src", rule);
            state.violations.push(violation);
            return Err(CssomError::PolicyViolation {
                directive: "style-src".to_string(),
            });
        }
        let rules = state.attached_rules(sheet)?;
        if index > rules.len() {
            return Err(CssomError::IndexOutOfRange {
                index,
                len: rules.len(),
            });
        }
        parser::parse_rule(rule)?;
        rules.insert(index, rule.trim().to_string());
        Ok(index)
    }

    fn delete_rule(&self, sheet: SheetId, index: usize) -> Result<(), CssomError> {
        let mut state = self.inner.lock();
        let rules = state.attached_rules(sheet)?;
        if index >= rules.len() {
            return Err(CssomError::IndexOutOfRange {
                index,
                len: rules.len(),
            });
        }
        rules.remove(index);
        Ok(())
    }
}

impl fmt::Debug for MemoryDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.lock();
        f.debug_struct("MemoryDocument")
            .field("sheets", &state.head.len())
            .field("violations", &state.violations.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FADE: &str = "@keyframes fade { 0% { opacity: 0; } 100% { opacity: 1; } }";

    #[test]
    fn created_sheet_accepts_cssom_rules() {
        let doc = MemoryDocument::new();
        let sheet = doc.create_style_sheet("svelte-stylesheet", "text/css").unwrap();

        assert_eq!(doc.insert_rule(sheet, FADE, 0).unwrap(), 0);
        assert_eq!(doc.rule_count(sheet).unwrap(), 1);
        assert_eq!(doc.rule_text(sheet, 0).unwrap().as_deref(), Some(FADE));
        assert_eq!(doc.rule_text(sheet, 1).unwrap(), None);
        assert_eq!(doc.created_count(), 1);
    }

    #[test]
    fn insert_rejects_malformed_rule_and_bad_index() {
        let doc = MemoryDocument::new();
        let sheet = doc.create_style_sheet("s", "text/css").unwrap();

        assert!(matches!(
            doc.insert_rule(sheet, "@keyframes { oops", 0),
            Err(CssomError::Syntax { .. })
        ));
        assert_eq!(
            doc.insert_rule(sheet, FADE, 3),
            Err(CssomError::IndexOutOfRange { index: 3, len: 0 })
        );
        assert_eq!(doc.rule_count(sheet).unwrap(), 0);
    }

    #[test]
    fn detached_sheet_rejects_operations() {
        let doc = MemoryDocument::new();
        let sheet = doc.create_style_sheet("s", "text/css").unwrap();

        assert!(doc.remove_style_sheet(sheet));
        assert!(!doc.remove_style_sheet(sheet));
        assert!(!doc.is_attached(sheet));
        assert_eq!(doc.insert_rule(sheet, FADE, 0), Err(CssomError::SheetDetached));
        assert_eq!(doc.delete_rule(sheet, 0), Err(CssomError::SheetDetached));
    }

    #[test]
    fn inaccessible_sheet_hides_rules() {
        let doc = MemoryDocument::new();
        let sheet = doc.add_linked_style_sheet(StyleSheetDescriptor::titled("remote").inaccessible());

        assert_eq!(doc.rule_count(sheet), Err(CssomError::Inaccessible));
        assert_eq!(doc.style_sheets()[0].rules, None);
    }

    #[test]
    fn strict_policy_blocks_inline_style_text() {
        let policy = ContentSecurityPolicy::parse("default-src 'self'; style-src 'self'");
        let doc = MemoryDocument::with_policy(policy);

        let result = doc.append_inline_style("@keyframes fade { to { opacity: 1 } }");
        assert!(matches!(result, Err(CssomError::PolicyViolation { .. })));
        assert!(doc.style_sheets().is_empty());
        assert_eq!(doc.violations().len(), 1);
        assert_eq!(doc.violations()[0].directive, "style-src");
    }

    #[test]
    fn strict_policy_allows_cssom_insertion() {
        let policy = ContentSecurityPolicy::parse("style-src 'self'");
        let doc = MemoryDocument::with_policy(policy);
        let sheet = doc.create_style_sheet("s", "text/css").unwrap();

        assert!(doc.insert_rule(sheet, FADE, 0).is_ok());
        assert!(doc.violations().is_empty());
    }

    #[test]
    fn permissive_policy_accepts_inline_style_text() {
        let doc = MemoryDocument::new();
        let sheet = doc
            .append_inline_style("a { color: red } b { color: blue }")
            .unwrap();

        assert_eq!(doc.rule_count(sheet).unwrap(), 2);
    }

    #[test]
    fn refused_cssom_is_reported() {
        let doc = MemoryDocument::new();
        let sheet = doc.create_style_sheet("s", "text/css").unwrap();
        doc.refuse_cssom_insertion(true);

        assert!(matches!(
            doc.insert_rule(sheet, FADE, 0),
            Err(CssomError::PolicyViolation { .. })
        ));
        assert_eq!(doc.violations().len(), 1);
    }
}
