//! Browser host backed by `web-sys`.

use std::cell::RefCell;
use std::fmt;
use std::time::Duration;

use csp_styles_core::logging::targets;
use csp_styles_core::{Executor, LocalTask};
use slotmap::SlotMap;
use wasm_bindgen::prelude::*;
use web_sys::{CssRuleList, CssStyleSheet, DomException, Element, HtmlStyleElement, Window};

use super::{CssomError, Document, SheetId, StyleSheetDescriptor};

/// Map a thrown JS value to a CSSOM error.
fn to_cssom_error(value: JsValue) -> CssomError {
    match value.dyn_ref::<DomException>() {
        Some(exception) => match exception.name().as_str() {
            "SyntaxError" => CssomError::Syntax {
                message: exception.message(),
            },
            "SecurityError" => CssomError::Inaccessible,
            _ => CssomError::Host(format!("{}: {}", exception.name(), exception.message())),
        },
        None => CssomError::Host(format!("{value:?}")),
    }
}

fn rule_texts(rules: &CssRuleList) -> Vec<String> {
    (0..rules.length())
        .filter_map(|i| rules.item(i))
        .map(|rule| rule.css_text())
        .collect()
}

fn index_u32(index: usize) -> Result<u32, CssomError> {
    u32::try_from(index).map_err(|_| CssomError::IndexOutOfRange {
        index,
        len: u32::MAX as usize,
    })
}

/// A browser document.
///
/// Stylesheets are remembered by identity once adopted or created, so a
/// [`SheetId`] keeps pointing at the same `CSSStyleSheet` however the page
/// reorders its style nodes.
pub struct WebDocument {
    document: web_sys::Document,
    sheets: RefCell<SlotMap<SheetId, CssStyleSheet>>,
}

impl WebDocument {
    /// Wrap the current window's document.
    pub fn new() -> Result<Self, CssomError> {
        let document = web_sys::window()
            .and_then(|window| window.document())
            .ok_or_else(|| CssomError::Host("no window document".into()))?;
        Ok(Self::from_document(document))
    }

    /// Wrap a specific document.
    pub fn from_document(document: web_sys::Document) -> Self {
        Self {
            document,
            sheets: RefCell::new(SlotMap::with_key()),
        }
    }

    fn register(&self, sheet: CssStyleSheet) -> SheetId {
        let mut sheets = self.sheets.borrow_mut();
        let known = sheets
            .iter()
            .find(|(_, known)| js_sys::Object::is(known, &sheet))
            .map(|(id, _)| id);
        known.unwrap_or_else(|| sheets.insert(sheet))
    }

    fn sheet(&self, id: SheetId) -> Result<CssStyleSheet, CssomError> {
        let sheet = self
            .sheets
            .borrow()
            .get(id)
            .cloned()
            .ok_or(CssomError::SheetDetached)?;
        if !is_connected(&sheet) {
            return Err(CssomError::SheetDetached);
        }
        Ok(sheet)
    }

    fn rules(&self, id: SheetId) -> Result<CssRuleList, CssomError> {
        self.sheet(id)?.css_rules().map_err(to_cssom_error)
    }
}

fn is_connected(sheet: &CssStyleSheet) -> bool {
    sheet.owner_node().is_some_and(|node| node.is_connected())
}

impl Document for WebDocument {
    fn style_sheets(&self) -> Vec<StyleSheetDescriptor> {
        let list = self.document.style_sheets();
        (0..list.length())
            .filter_map(|i| list.item(i))
            .map(|sheet| {
                let media_type = sheet
                    .owner_node()
                    .and_then(|node| node.dyn_into::<Element>().ok())
                    .and_then(|element| element.get_attribute("type"));
                let rules = sheet
                    .dyn_ref::<CssStyleSheet>()
                    .and_then(|css| css.css_rules().ok())
                    .map(|rules| rule_texts(&rules));
                StyleSheetDescriptor {
                    title: sheet.title(),
                    media_type,
                    rules,
                }
            })
            .collect()
    }

    fn adopt_style_sheet(&self, index: usize) -> Result<SheetId, CssomError> {
        let list = self.document.style_sheets();
        let len = list.length() as usize;
        let sheet = list
            .item(index_u32(index)?)
            .ok_or(CssomError::IndexOutOfRange { index, len })?
            .dyn_into::<CssStyleSheet>()
            .map_err(|_| CssomError::Host("stylesheet is not a CSSStyleSheet".into()))?;
        Ok(self.register(sheet))
    }

    fn create_style_sheet(&self, title: &str, media_type: &str) -> Result<SheetId, CssomError> {
        let head = self
            .document
            .head()
            .ok_or_else(|| CssomError::Host("document has no head".into()))?;
        let element = self.document.create_element("style").map_err(to_cssom_error)?;
        element.set_attribute("title", title).map_err(to_cssom_error)?;
        element.set_attribute("type", media_type).map_err(to_cssom_error)?;
        head.append_child(&element).map_err(to_cssom_error)?;

        let sheet = element
            .dyn_into::<HtmlStyleElement>()
            .ok()
            .and_then(|style| style.sheet())
            .and_then(|sheet| sheet.dyn_into::<CssStyleSheet>().ok())
            .ok_or_else(|| CssomError::Host("style element has no stylesheet".into()))?;
        let id = self.register(sheet);
        tracing::debug!(target: targets::HOST, ?id, title, "style element appended to head");
        Ok(id)
    }

    fn is_attached(&self, sheet: SheetId) -> bool {
        self.sheets.borrow().get(sheet).is_some_and(is_connected)
    }

    fn rule_count(&self, sheet: SheetId) -> Result<usize, CssomError> {
        Ok(self.rules(sheet)?.length() as usize)
    }

    fn rule_text(&self, sheet: SheetId, index: usize) -> Result<Option<String>, CssomError> {
        let rules = self.rules(sheet)?;
        Ok(rules.item(index_u32(index)?).map(|rule| rule.css_text()))
    }

    fn insert_rule(&self, sheet: SheetId, rule: &str, index: usize) -> Result<usize, CssomError> {
        let sheet = self.sheet(sheet)?;
        match sheet.insert_rule_with_index(rule, index_u32(index)?) {
            Ok(index) => Ok(index as usize),
            // Engines that apply style-src to the CSSOM throw SecurityError.
            Err(err) => match to_cssom_error(err) {
                CssomError::Inaccessible => Err(CssomError::PolicyViolation {
                    directive: "style-src".into(),
                }),
                err => Err(err),
            },
        }
    }

    fn delete_rule(&self, sheet: SheetId, index: usize) -> Result<(), CssomError> {
        self.sheet(sheet)?
            .delete_rule(index_u32(index)?)
            .map_err(to_cssom_error)
    }
}

impl fmt::Debug for WebDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebDocument")
            .field("sheets", &self.sheets.borrow().len())
            .finish()
    }
}

/// Runs deferred work on the browser event loop with `queueMicrotask` and
/// `setTimeout`.
#[derive(Debug, Clone)]
pub struct WebExecutor {
    window: Window,
}

impl WebExecutor {
    /// Create an executor for the current window.
    pub fn new() -> Result<Self, CssomError> {
        let window = web_sys::window().ok_or_else(|| CssomError::Host("no window".into()))?;
        Ok(Self { window })
    }
}

impl Executor for WebExecutor {
    fn spawn_microtask(&self, task: LocalTask) {
        let callback = Closure::once_into_js(move || task());
        self.window.queue_microtask(callback.unchecked_ref());
    }

    fn spawn_after(&self, delay: Duration, task: LocalTask) {
        let callback = Closure::once_into_js(move || task());
        let millis = i32::try_from(delay.as_millis()).unwrap_or(i32::MAX);
        if let Err(err) = self
            .window
            .set_timeout_with_callback_and_timeout_and_arguments_0(callback.unchecked_ref(), millis)
        {
            tracing::warn!(target: targets::HOST, error = ?err, "setTimeout failed; task dropped");
        }
    }
}
