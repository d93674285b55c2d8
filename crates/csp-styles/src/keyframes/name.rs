//! Rule-name hashing.

use std::borrow::Borrow;
use std::fmt;

use xxhash_rust::xxh3::xxh3_64;

use crate::keyframes::KeyframeSpec;
use crate::{Error, Result};

/// Default prefix for generated rule names.
pub const DEFAULT_NAME_PREFIX: &str = "__csp";

/// The name of a managed `@keyframes` rule. Always a valid CSS identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuleName(String);

impl RuleName {
    /// Build a name from a prefix and a body hash.
    pub fn from_hashed(prefix: &str, hash: u64) -> Self {
        Self(format!("{prefix}_{}", to_base36(hash)))
    }

    /// The name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RuleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RuleName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for RuleName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Derives rule names from keyframe bodies.
///
/// Names depend only on the canonical body, so identical animations on
/// unrelated elements converge on one rule. The hash is xxh3-64: stable
/// across runs and platforms, non-cryptographic.
#[derive(Debug, Clone)]
pub struct RuleNameHasher {
    prefix: String,
}

impl RuleNameHasher {
    /// Create a hasher with a custom name prefix.
    ///
    /// The prefix must start a CSS identifier: ASCII letters, digits, `-` and
    /// `_`, not starting with a digit or with `-` followed by a digit.
    pub fn new(prefix: impl Into<String>) -> Result<Self> {
        let prefix = prefix.into();
        validate_prefix(&prefix)?;
        Ok(Self { prefix })
    }

    /// The name prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// The rule name for a keyframe spec.
    pub fn name_for(&self, spec: &KeyframeSpec) -> Result<RuleName> {
        Ok(self.name_for_body(&spec.canonical_body()?))
    }

    /// The rule name for an already-rendered rule body.
    pub fn name_for_body(&self, body: &str) -> RuleName {
        RuleName::from_hashed(&self.prefix, xxh3_64(body.as_bytes()))
    }
}

impl Default for RuleNameHasher {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_NAME_PREFIX.to_string(),
        }
    }
}

pub(crate) fn validate_prefix(prefix: &str) -> Result<()> {
    let mut chars = prefix.chars();
    let Some(first) = chars.next() else {
        return Err(Error::Config("rule name prefix is empty".into()));
    };
    let valid_chars = prefix
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    let bad_start = first.is_ascii_digit()
        || (first == '-' && chars.next().is_some_and(|c| c.is_ascii_digit()));
    if !valid_chars || bad_start {
        return Err(Error::Config(format!(
            "rule name prefix '{prefix}' does not start a CSS identifier"
        )));
    }
    Ok(())
}

fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::with_capacity(13);
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}
