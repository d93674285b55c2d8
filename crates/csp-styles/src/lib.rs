//! CSP-safe keyframe rule management.
//!
//! Pages that send `Content-Security-Policy: style-src 'self'` block inline
//! `style` attributes and `<style>` blocks with literal rule text. Rules
//! inserted through the CSSOM are still allowed, so this crate drives
//! transitions entirely through `insertRule` and `deleteRule` on one managed
//! stylesheet:
//!
//! - **Locator**: finds an empty, marker-titled `text/css` sheet or creates one
//! - **Hashing**: names every rule after its keyframe body, so identical
//!   animations share a rule
//! - **Ref counting**: counts the transitions using each rule
//! - **Collection**: deletes unused rules after the current turn, so a
//!   same-turn re-acquire keeps its rule
//!
//! The document is reached through the [`host::Document`] trait.
//! [`host::MemoryDocument`] is an in-process host; the `web` feature adds a
//! `web-sys` backend.
//!
//! # Example
//!
//! ```
//! use std::rc::Rc;
//!
//! use csp_styles::prelude::*;
//! use csp_styles_core::TaskQueue;
//!
//! let document = MemoryDocument::with_policy(ContentSecurityPolicy::parse("style-src 'self'"));
//! let queue = TaskQueue::new();
//! let manager = RuleManager::new(document.clone(), Rc::new(queue.clone()));
//!
//! let spec = KeyframeSpec::sample(2, |t| format!("opacity: {t}")).unwrap();
//! let element = ElementId::new(1);
//! let name = manager.acquire_for(element, &spec).unwrap();
//!
//! // Start the CSS animation `name` on the element, then when it ends:
//! manager.release_for(element, &name).unwrap();
//! queue.run_microtasks();
//!
//! assert_eq!(document.count_titled("svelte-stylesheet"), 1);
//! assert!(document.violations().is_empty());
//! ```

pub mod config;
pub mod host;
pub mod keyframes;
pub mod manager;
pub mod parser;
pub mod rules;

mod error;

pub use error::{Error, Result};

/// Prelude module with commonly used types.
pub mod prelude {
    pub use crate::config::{CollectionDelay, ManagerBuilder, ManagerConfig};
    pub use crate::host::{ContentSecurityPolicy, Document, MemoryDocument, SheetId, StyleSheetDescriptor};
    pub use crate::keyframes::{Keyframe, KeyframeSpec, RuleName, RuleNameHasher};
    pub use crate::manager::{ElementId, RuleManager};
    pub use crate::rules::locate_managed_stylesheet_index;
    pub use crate::{Error, Result};

    #[cfg(feature = "web")]
    pub use crate::host::{WebDocument, WebExecutor};
}
