//! Keyframe specs and the rule names derived from them.

mod name;
mod spec;

pub use name::{DEFAULT_NAME_PREFIX, RuleName, RuleNameHasher};
pub(crate) use name::validate_prefix;
pub use spec::{Declaration, Keyframe, KeyframeSpec};
