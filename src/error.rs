//! Error types for tagql.

use thiserror::Error;

/// Errors raised while parsing or executing an SQL template.
///
/// Kept separate from [`TagError`] and `Clone` so a template that failed to
/// parse can hand back the same error on every call.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TemplateError {
    /// The template text is not valid template syntax.
    #[error("template parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    /// Execution failed for one call (bad argument, missing function input, ...).
    #[error("template execution error: {0}")]
    Exec(String),
}

impl TemplateError {
    /// Create a parse error at the given 1-based line.
    pub fn parse(line: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            line,
            message: message.into(),
        }
    }

    /// Create an execution error.
    pub fn exec(message: impl Into<String>) -> Self {
        Self::Exec(message.into())
    }
}

/// The main error type for tagql operations.
#[derive(Debug, Error)]
pub enum TagError {
    // --- registration -----------------------------------------------------
    /// A category, builder or fragment type was registered twice.
    #[error("{kind} with ID {id:?} already registered")]
    DuplicateId { kind: &'static str, id: String },

    /// A builder references a category that was never registered.
    #[error("category with ID {0:?} not found")]
    UnknownCategory(String),

    /// A fragment factory produced a fragment of another type.
    #[error("fragment type mismatch: expected {expected}, got {got}")]
    FragmentTypeMismatch { expected: String, got: String },

    /// A fragment `type` has no registered factory.
    #[error("unknown fragment type: {0:?}")]
    UnknownFragmentType(String),

    // --- validation -------------------------------------------------------
    /// Sentinel: the fragment is conditionally skipped. Not a failure.
    #[error("validation should be skipped")]
    ShouldSkipValidate,

    #[error("required parameter missing: {0}")]
    MissingParameter(String),

    /// The value did not match `Validation::pattern`.
    #[error("{0}")]
    PatternMismatch(String),

    #[error("invalid validation pattern for {key:?}: {source}")]
    InvalidPattern {
        key: String,
        #[source]
        source: regex::Error,
    },

    /// Type or range check of a concrete fragment failed.
    #[error("{0}")]
    InvalidParameter(String),

    /// A `skipIf` / `skipUnless` condition could not be evaluated.
    #[error("checking if validation should be skipped: evaluating {clause} condition: {message}")]
    Condition {
        clause: &'static str,
        message: String,
    },

    // --- structure --------------------------------------------------------
    #[error("invalid expression: {0}")]
    InvalidExpression(String),

    #[error("builder not found: {0}")]
    BuilderNotFound(String),

    /// The builder is descriptive only and cannot compile itself to SQL.
    #[error("builder {0} does not implement SqlBuilder")]
    UnsupportedBuilder(String),

    #[error("failed to build SQL for tag {builder_id}: {source}")]
    Build {
        builder_id: String,
        #[source]
        source: Box<TagError>,
    },

    // --- templates --------------------------------------------------------
    #[error(transparent)]
    Template(#[from] TemplateError),

    // --- surfaces ---------------------------------------------------------
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TagError {
    /// Create a duplicate-ID registration error.
    pub fn duplicate(kind: &'static str, id: impl Into<String>) -> Self {
        Self::DuplicateId {
            kind,
            id: id.into(),
        }
    }

    /// Create a fragment type/range check error.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidParameter(message.into())
    }

    /// Whether this is the [`TagError::ShouldSkipValidate`] sentinel.
    pub fn is_skip(&self) -> bool {
        matches!(self, Self::ShouldSkipValidate)
    }

    /// Whether the error stems from caller input rather than from wiring.
    ///
    /// API boundaries map these to a 4xx-style rejection.
    pub fn is_client_error(&self) -> bool {
        match self {
            Self::MissingParameter(_)
            | Self::PatternMismatch(_)
            | Self::InvalidParameter(_)
            | Self::Condition { .. }
            | Self::InvalidExpression(_)
            | Self::BuilderNotFound(_)
            | Self::UnsupportedBuilder(_)
            | Self::Json(_) => true,
            Self::Build { source, .. } => source.is_client_error(),
            _ => false,
        }
    }
}

/// Result type alias for tagql operations.
pub type TagResult<T> = Result<T, TagError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TagError::duplicate("builder", "user_gender");
        assert_eq!(
            err.to_string(),
            "builder with ID \"user_gender\" already registered"
        );
        let err = TemplateError::parse(3, "unexpected \"}}\"");
        assert_eq!(
            err.to_string(),
            "template parse error at line 3: unexpected \"}}\""
        );
    }

    #[test]
    fn test_build_error_keeps_cause() {
        let err = TagError::Build {
            builder_id: "age".to_string(),
            source: Box::new(TagError::MissingParameter("min".to_string())),
        };
        assert_eq!(
            err.to_string(),
            "failed to build SQL for tag age: required parameter missing: min"
        );
        assert!(err.is_client_error());
        assert!(!TagError::UnknownCategory("x".into()).is_client_error());
        assert!(TagError::ShouldSkipValidate.is_skip());
    }
}
