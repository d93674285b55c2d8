//! Keyframe specs: the offset/declaration data behind one animation.

use std::fmt::Write as _;

use crate::keyframes::RuleName;
use crate::parser;
use crate::{Error, Result};

/// A single `property: value` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    /// Property name. Lowercased unless it is a custom property (`--name`).
    pub property: String,
    /// Property value with whitespace runs outside quoted strings collapsed.
    pub value: String,
}

impl Declaration {
    /// Create a normalized declaration.
    pub fn new(property: impl Into<String>, value: impl Into<String>) -> Self {
        let property = property.into();
        let property = property.trim();
        let property = if property.starts_with("--") {
            property.to_string()
        } else {
            property.to_ascii_lowercase()
        };
        let value = value.into();
        Self {
            property,
            value: collapse_whitespace(&value),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.property.is_empty() {
            return Err(Error::invalid_keyframes("declaration has an empty property name"));
        }
        if self.value.is_empty() {
            return Err(Error::invalid_keyframes(format!(
                "declaration '{}' has an empty value",
                self.property
            )));
        }
        let breaks_out = |text: &str| text.contains([';', '{', '}']);
        if breaks_out(&self.property) || breaks_out(&self.value) {
            return Err(Error::invalid_keyframes(format!(
                "declaration '{}' contains a rule delimiter",
                self.property
            )));
        }
        Ok(())
    }
}

/// Collapse whitespace runs to one space and trim the ends, leaving quoted
/// strings untouched.
fn collapse_whitespace(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut quote = None;
    let mut escaped = false;
    let mut gap = false;
    for c in value.chars() {
        if let Some(open) = quote {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == open {
                quote = None;
            }
            continue;
        }
        if c.is_ascii_whitespace() {
            gap = true;
            continue;
        }
        if gap && !out.is_empty() {
            out.push(' ');
        }
        gap = false;
        if c == '"' || c == '\'' {
            quote = Some(c);
        }
        out.push(c);
    }
    out
}

/// One keyframe: an offset in `[0, 1]` and the declarations at that offset.
#[derive(Debug, Clone, PartialEq)]
pub struct Keyframe {
    offset: f64,
    declarations: Vec<Declaration>,
}

impl Keyframe {
    /// Create an empty keyframe at `offset`.
    pub fn new(offset: f64) -> Self {
        Self {
            offset,
            declarations: vec![],
        }
    }

    /// Add a declaration.
    pub fn declare(mut self, property: impl Into<String>, value: impl Into<String>) -> Self {
        self.declarations.push(Declaration::new(property, value));
        self
    }

    /// Parse a declaration list such as `opacity: 0; transform: scale(0.5)`.
    pub fn from_css(offset: f64, css: &str) -> Result<Self> {
        let declarations = parser::parse_declarations(css)
            .map_err(|err| Error::invalid_keyframes(err.to_string()))?
            .into_iter()
            .map(|(property, value)| Declaration::new(property, value))
            .collect();
        Ok(Self {
            offset,
            declarations,
        })
    }

    /// The offset in `[0, 1]`.
    pub fn offset(&self) -> f64 {
        self.offset
    }

    /// The declarations in order.
    pub fn declarations(&self) -> &[Declaration] {
        &self.declarations
    }

    fn validate(&self) -> Result<()> {
        if !self.offset.is_finite() || !(0.0..=1.0).contains(&self.offset) {
            return Err(Error::invalid_keyframes(format!(
                "offset {} is outside [0, 1]",
                self.offset
            )));
        }
        self.declarations.iter().try_for_each(Declaration::validate)
    }
}

/// The ordered keyframes of one animation.
///
/// Two specs with the same frames, in the same order, render the same rule
/// body and therefore share one rule.
///
/// # Example
///
/// ```
/// use csp_styles::keyframes::{Keyframe, KeyframeSpec};
///
/// let fade = KeyframeSpec::new()
///     .with_frame(Keyframe::new(0.0).declare("opacity", "0"))
///     .with_frame(Keyframe::new(1.0).declare("opacity", "1"));
///
/// assert_eq!(
///     fade.canonical_body().unwrap(),
///     "0% { opacity: 0; } 100% { opacity: 1; }"
/// );
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeyframeSpec {
    frames: Vec<Keyframe>,
}

impl KeyframeSpec {
    /// Create an empty spec.
    pub fn new() -> Self {
        Self::default()
    }

    /// A two-frame spec from declaration lists at 0% and 100%.
    pub fn from_to(from: &str, to: &str) -> Result<Self> {
        Ok(Self::new()
            .with_frame(Keyframe::from_css(0.0, from)?)
            .with_frame(Keyframe::from_css(1.0, to)?))
    }

    /// Sample `css` at `steps + 1` evenly spaced offsets from 0 to 1.
    ///
    /// This is how a transition's easing curve becomes keyframes: `css`
    /// receives the eased progress and returns the declarations for it.
    pub fn sample<F>(steps: usize, mut css: F) -> Result<Self>
    where
        F: FnMut(f64) -> String,
    {
        if steps == 0 {
            return Err(Error::invalid_keyframes("sampling needs at least one step"));
        }
        let mut spec = Self::new();
        for step in 0..=steps {
            let t = step as f64 / steps as f64;
            spec.push(Keyframe::from_css(t, &css(t))?);
        }
        Ok(spec)
    }

    /// Append a frame.
    pub fn with_frame(mut self, frame: Keyframe) -> Self {
        self.frames.push(frame);
        self
    }

    /// Append a frame in place.
    pub fn push(&mut self, frame: Keyframe) {
        self.frames.push(frame);
    }

    /// The frames in order.
    pub fn frames(&self) -> &[Keyframe] {
        &self.frames
    }

    /// Get the number of frames.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Check if there are no frames.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Check that the frames can be rendered into a rule.
    pub fn validate(&self) -> Result<()> {
        if self.frames.is_empty() {
            return Err(Error::invalid_keyframes("keyframe spec has no frames"));
        }
        self.frames.iter().try_for_each(Keyframe::validate)
    }

    /// Render the rule body: every frame as `N% { declarations }`.
    pub fn canonical_body(&self) -> Result<String> {
        self.validate()?;
        let mut body = String::new();
        for (i, frame) in self.frames.iter().enumerate() {
            if i > 0 {
                body.push(' ');
            }
            let _ = write!(body, "{}% {{", format_percent(frame.offset));
            for decl in &frame.declarations {
                let _ = write!(body, " {}: {};", decl.property, decl.value);
            }
            body.push_str(" }");
        }
        Ok(body)
    }

    /// Render the full `@keyframes` rule under `name`.
    pub fn to_rule(&self, name: &RuleName) -> Result<String> {
        Ok(format!("@keyframes {name} {{ {} }}", self.canonical_body()?))
    }
}

/// Format an offset as a percentage with at most four decimals.
fn format_percent(offset: f64) -> String {
    let text = format!("{:.4}", offset * 100.0);
    let text = text.trim_end_matches('0').trim_end_matches('.');
    if text == "-0" { "0".to_string() } else { text.to_string() }
}
