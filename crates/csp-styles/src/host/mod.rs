//! Host document abstraction.
//!
//! The rule manager never touches a browser directly. It reads the document's
//! stylesheet list and calls the CSSOM insertion primitives through the
//! [`Document`] trait. [`MemoryDocument`] is a complete in-process host for
//! environments without a CSSOM; the `web` feature adds a `web-sys` backend.

mod csp;
mod memory;
#[cfg(feature = "web")]
mod web;

pub use csp::{ContentSecurityPolicy, CspViolation};
pub use memory::MemoryDocument;
#[cfg(feature = "web")]
pub use web::{WebDocument, WebExecutor};

use slotmap::new_key_type;

new_key_type! {
    /// Stable handle to a stylesheet known to a [`Document`].
    ///
    /// Handles survive reordering of the document's stylesheet list.
    pub struct SheetId;
}

/// Errors raised by CSSOM operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CssomError {
    /// The rule text is not a single well-formed rule.
    #[error("Failed to parse rule: {message}")]
    Syntax { message: String },

    /// The document's policy refused the operation.
    #[error("Refused by content security policy directive '{directive}'")]
    PolicyViolation { directive: String },

    /// A rule index outside the sheet's rule list.
    #[error("Index {index} is out of range for a list of {len} rules")]
    IndexOutOfRange { index: usize, len: usize },

    /// The stylesheet's node is no longer part of the document.
    #[error("Stylesheet is no longer attached to the document")]
    SheetDetached,

    /// The stylesheet's rules cannot be read (for example a cross-origin sheet).
    #[error("Stylesheet rules are not accessible")]
    Inaccessible,

    /// Any other host failure.
    #[error("Host error: {0}")]
    Host(String),
}

/// Snapshot of one entry in a document's stylesheet list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleSheetDescriptor {
    /// The sheet's title (the `title` attribute of its owner node).
    pub title: Option<String>,
    /// The declared media type. `None` means the HTML default, `text/css`.
    pub media_type: Option<String>,
    /// Rule texts in order, or `None` when the rules cannot be read.
    pub rules: Option<Vec<String>>,
}

impl StyleSheetDescriptor {
    /// An untitled, empty sheet.
    pub fn untitled() -> Self {
        Self {
            title: None,
            media_type: None,
            rules: Some(Vec::new()),
        }
    }

    /// An empty sheet with the given title.
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::untitled()
        }
    }

    /// Set the declared media type.
    pub fn with_media_type(mut self, media_type: impl Into<String>) -> Self {
        self.media_type = Some(media_type.into());
        self
    }

    /// Append a rule.
    pub fn with_rule(mut self, rule: impl Into<String>) -> Self {
        self.rules.get_or_insert_with(Vec::new).push(rule.into());
        self
    }

    /// Mark the sheet's rules as unreadable.
    pub fn inaccessible(mut self) -> Self {
        self.rules = None;
        self
    }

    /// The number of rules, if readable.
    pub fn rule_count(&self) -> Option<usize> {
        self.rules.as_ref().map(Vec::len)
    }
}

/// A document whose stylesheets can be inspected and mutated through the CSSOM.
///
/// Implementations are handles with interior mutability: other code holding
/// the same document may add, remove, or edit sheets between calls.
pub trait Document {
    /// Snapshot the document's stylesheet list in document order.
    fn style_sheets(&self) -> Vec<StyleSheetDescriptor>;

    /// Get a stable handle to the sheet currently at `index` in the list.
    fn adopt_style_sheet(&self, index: usize) -> Result<SheetId, CssomError>;

    /// Append an empty style node with the given title and type to the head
    /// and return its stylesheet.
    fn create_style_sheet(&self, title: &str, media_type: &str) -> Result<SheetId, CssomError>;

    /// Whether the sheet's node is still part of the document.
    fn is_attached(&self, sheet: SheetId) -> bool;

    /// The number of rules in the sheet.
    fn rule_count(&self, sheet: SheetId) -> Result<usize, CssomError>;

    /// The serialized text of the rule at `index`, if any.
    fn rule_text(&self, sheet: SheetId, index: usize) -> Result<Option<String>, CssomError>;

    /// Insert a rule at `index` (CSSOM `insertRule`), returning its index.
    fn insert_rule(&self, sheet: SheetId, rule: &str, index: usize) -> Result<usize, CssomError>;

    /// Delete the rule at `index` (CSSOM `deleteRule`).
    fn delete_rule(&self, sheet: SheetId, index: usize) -> Result<(), CssomError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_builders() {
        let sheet = StyleSheetDescriptor::titled("svelte-stylesheet")
            .with_media_type("text/css")
            .with_rule("body { width: 100%; }");

        assert_eq!(sheet.title.as_deref(), Some("svelte-stylesheet"));
        assert_eq!(sheet.rule_count(), Some(1));
        assert_eq!(sheet.inaccessible().rule_count(), None);
        assert_eq!(StyleSheetDescriptor::untitled().rule_count(), Some(0));
    }
}
