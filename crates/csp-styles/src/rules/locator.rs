//! Discovery and lazy creation of the managed stylesheet.

use csp_styles_core::logging::targets;

use crate::Result;
use crate::host::{Document, SheetId, StyleSheetDescriptor};

/// Title that marks the managed stylesheet.
pub const DEFAULT_MARKER: &str = "svelte-stylesheet";

/// The only media type a managed stylesheet may have.
pub const DEFAULT_MEDIA_TYPE: &str = "text/css";

/// Find the managed stylesheet in a document's stylesheet list using the
/// default marker and media type.
///
/// Returns the index of the first sheet titled [`DEFAULT_MARKER`] whose rule
/// list is empty and whose type is `text/css`. A marker match that already
/// holds rules, or has another type, does not count.
///
/// # Example
///
/// ```
/// use csp_styles::host::StyleSheetDescriptor;
/// use csp_styles::rules::locate_managed_stylesheet_index;
///
/// let sheets = [
///     StyleSheetDescriptor::titled("my-stylesheet"),
///     StyleSheetDescriptor::titled("svelte-stylesheet"),
/// ];
/// assert_eq!(locate_managed_stylesheet_index(&sheets), Some(1));
/// ```
pub fn locate_managed_stylesheet_index(sheets: &[StyleSheetDescriptor]) -> Option<usize> {
    StylesheetLocator::default().locate(sheets)
}

/// How the managed stylesheet was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SheetOrigin {
    /// An empty, marker-tagged sheet was already in the document.
    Reused,
    /// A new style node was appended to the head.
    Created,
}

/// Handle to the document's managed stylesheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedStylesheet {
    /// The live stylesheet.
    pub sheet: SheetId,
    /// The marker the sheet carries.
    pub marker: String,
    /// How the sheet was obtained.
    pub origin: SheetOrigin,
}

/// Result of [`StylesheetLocator::ensure`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnsuredSheet {
    /// The managed sheet to use.
    pub sheet: SheetId,
    /// True when a previously managed sheet was detached and replaced.
    /// Every rule recorded against the old sheet is gone.
    pub replaced: bool,
}

/// Locates, validates, or creates the managed stylesheet.
///
/// Holds the per-document singleton once one exists.
#[derive(Debug, Clone)]
pub struct StylesheetLocator {
    marker: String,
    media_type: String,
    managed: Option<ManagedStylesheet>,
    // Set once the managed sheet is found detached; cleared only when a
    // replacement has been obtained.
    needs_replacement: bool,
}

impl StylesheetLocator {
    /// Create a locator for a custom marker and media type.
    pub fn new(marker: impl Into<String>, media_type: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
            media_type: media_type.into(),
            managed: None,
            needs_replacement: false,
        }
    }

    /// The marker title.
    pub fn marker(&self) -> &str {
        &self.marker
    }

    /// The managed sheet, once located or created.
    pub fn managed(&self) -> Option<&ManagedStylesheet> {
        self.managed.as_ref()
    }

    /// Whether `sheet` can be adopted as the managed stylesheet.
    pub fn is_reusable(&self, sheet: &StyleSheetDescriptor) -> bool {
        sheet.title.as_deref() == Some(self.marker.as_str())
            && sheet.rule_count() == Some(0)
            && self.is_expected_type(sheet.media_type.as_deref())
    }

    fn is_expected_type(&self, media_type: Option<&str>) -> bool {
        // A style node without a type attribute is text/css.
        let media_type = media_type.unwrap_or(DEFAULT_MEDIA_TYPE);
        let essence = media_type.split(';').next().unwrap_or_default().trim();
        essence.eq_ignore_ascii_case(&self.media_type)
    }

    /// Index of the first reusable sheet.
    pub fn locate(&self, sheets: &[StyleSheetDescriptor]) -> Option<usize> {
        sheets.iter().position(|sheet| self.is_reusable(sheet))
    }

    /// Return the managed sheet, locating or creating it on first use.
    ///
    /// Repeated calls return the same sheet while its node stays in the
    /// document. The head is only mutated on the creation path. When the
    /// managed sheet was detached, `replaced` is reported by the first call
    /// that succeeds in obtaining a new one, even if earlier attempts failed.
    pub fn ensure<D: Document>(&mut self, document: &D) -> Result<EnsuredSheet> {
        if let Some(managed) = &self.managed {
            if document.is_attached(managed.sheet) {
                return Ok(EnsuredSheet {
                    sheet: managed.sheet,
                    replaced: false,
                });
            }
            tracing::warn!(
                target: targets::LOCATOR,
                sheet = ?managed.sheet,
                "managed stylesheet was removed from the document; replacing it"
            );
            self.managed = None;
            self.needs_replacement = true;
        }

        let sheets = document.style_sheets();
        let (sheet, origin) = match self.locate(&sheets) {
            Some(index) => {
                let sheet = document.adopt_style_sheet(index)?;
                tracing::debug!(target: targets::LOCATOR, index, ?sheet, "reusing managed stylesheet");
                (sheet, SheetOrigin::Reused)
            }
            None => {
                let sheet = document.create_style_sheet(&self.marker, &self.media_type)?;
                tracing::debug!(target: targets::LOCATOR, ?sheet, "created managed stylesheet");
                (sheet, SheetOrigin::Created)
            }
        };

        self.managed = Some(ManagedStylesheet {
            sheet,
            marker: self.marker.clone(),
            origin,
        });
        Ok(EnsuredSheet {
            sheet,
            replaced: std::mem::take(&mut self.needs_replacement),
        })
    }
}

impl Default for StylesheetLocator {
    fn default() -> Self {
        Self::new(DEFAULT_MARKER, DEFAULT_MEDIA_TYPE)
    }
}
