//! The pieces of rule lifecycle management.
//!
//! - [`StylesheetLocator`] finds or creates the one managed stylesheet.
//! - [`RuleRefCounter`] inserts rules and counts their consumers.
//! - [`DeferredCollector`] deletes rules nobody holds, in batches.
//!
//! [`RuleManager`](crate::manager::RuleManager) ties them together.

mod collector;
mod locator;
mod refcount;

pub use collector::{CollectionReport, DeferredCollector};
pub use locator::{
    DEFAULT_MARKER, DEFAULT_MEDIA_TYPE, EnsuredSheet, ManagedStylesheet, SheetOrigin,
    StylesheetLocator, locate_managed_stylesheet_index,
};
pub use refcount::{ManagedRule, Released, RuleRefCounter};
