//! Error types for the rule manager.

use crate::host::CssomError;
use crate::manager::ElementId;

/// Result type alias for rule-manager operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while managing keyframe rules.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The keyframe spec cannot be rendered into a rule.
    #[error("Invalid keyframes: {message}")]
    InvalidKeyframes { message: String },

    /// The document rejected the rule text.
    #[error("Failed to insert rule '{name}': {source}")]
    Insert {
        name: String,
        #[source]
        source: CssomError,
    },

    /// The document refused CSSOM insertion under its style policy.
    #[error("Rule '{name}' was refused by the document's style policy")]
    Blocked { name: String },

    /// Two different keyframe bodies hashed to the same rule name.
    #[error("Rule name '{name}' is already used by different keyframes")]
    NameCollision { name: String },

    /// A rule was released more times than it was acquired.
    #[error("Rule '{name}' released more times than it was acquired")]
    DoubleRelease { name: String },

    /// The rule name is not managed by this document.
    #[error("Rule '{name}' is not managed by this document")]
    UnknownRule { name: String },

    /// The element does not hold the rule it tried to release.
    #[error("Element {element} does not hold rule '{name}'")]
    NotHeld { element: ElementId, name: String },

    /// Invalid manager configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// A stylesheet operation failed.
    #[error(transparent)]
    Cssom(#[from] CssomError),
}

impl Error {
    /// Create a keyframes error.
    pub fn invalid_keyframes(message: impl Into<String>) -> Self {
        Self::InvalidKeyframes {
            message: message.into(),
        }
    }

    /// Create an insertion error, separating policy refusals from defects.
    pub fn insert(name: impl Into<String>, source: CssomError) -> Self {
        match source {
            CssomError::PolicyViolation { .. } => Self::Blocked { name: name.into() },
            source => Self::Insert {
                name: name.into(),
                source,
            },
        }
    }

    /// Whether the failure comes from the page's policy rather than a
    /// programming defect. Transitions blocked this way run without animation.
    pub fn is_policy_violation(&self) -> bool {
        matches!(
            self,
            Self::Blocked { .. } | Self::Cssom(CssomError::PolicyViolation { .. })
        )
    }

    /// Whether the caller broke the acquire/release contract.
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            Self::DoubleRelease { .. } | Self::UnknownRule { .. } | Self::NotHeld { .. }
        )
    }
}
