//! Shared error taxonomy for the flowguard workflow parser and validator.
//!
//! This crate provides the foundational types used across all other flowguard crates:
//! - `FlowguardError`: unified error taxonomy (syntax, rule violations, plumbing)
//! - `ViolationKind`: the rule group a violation belongs to
//! - `Result`: convenience alias

use serde::{Deserialize, Serialize};

/// The category of a rejected document.
///
/// Rule groups run in the declaration order of the validation kinds:
/// structural, security, resource limits, advisory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    /// The document cannot be mapped to the workflow model.
    Syntax,
    /// A required field or section is missing, or a cardinality/exclusivity rule is broken.
    Structural,
    /// Dangerous pattern, disallowed permission, suspected secret or injection.
    Security,
    /// Count or time ceiling exceeded.
    ResourceLimit,
    /// Best-practice deficiency.
    Advisory,
}

impl std::fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ViolationKind::Syntax => write!(f, "syntax"),
            ViolationKind::Structural => write!(f, "structural"),
            ViolationKind::Security => write!(f, "security"),
            ViolationKind::ResourceLimit => write!(f, "resource-limit"),
            ViolationKind::Advisory => write!(f, "advisory"),
        }
    }
}

/// Unified error type for all flowguard subsystems.
#[derive(Debug, thiserror::Error)]
pub enum FlowguardError {
    // === Parser Errors ===
    #[error("Syntax error at line {line}: {message}")]
    Syntax { line: usize, message: String },

    // === Rule Violations ===
    #[error("Structural violation [{rule}]: {message}")]
    Structural { rule: String, message: String },

    #[error("Security violation [{rule}]: {message}")]
    Security { rule: String, message: String },

    #[error("Resource limit exceeded [{rule}]: {message}")]
    ResourceLimit { rule: String, message: String },

    #[error("Best-practice violation [{rule}]: {message}")]
    Advisory { rule: String, message: String },

    // === Input Errors ===
    #[error("Input of {size} bytes is outside the accepted range 1..={limit}")]
    InputSize { size: usize, limit: usize },

    // === Configuration Errors ===
    #[error("Invalid policy: {0}")]
    InvalidPolicy(String),

    // === Generic ===
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl FlowguardError {
    /// Build the violation variant matching `kind`.
    pub fn violation(
        kind: ViolationKind,
        rule: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        let rule = rule.into();
        let message = message.into();
        match kind {
            ViolationKind::Syntax => FlowguardError::Syntax { line: 0, message },
            ViolationKind::Structural => FlowguardError::Structural { rule, message },
            ViolationKind::Security => FlowguardError::Security { rule, message },
            ViolationKind::ResourceLimit => FlowguardError::ResourceLimit { rule, message },
            ViolationKind::Advisory => FlowguardError::Advisory { rule, message },
        }
    }

    /// Returns the violation category, or `None` for plumbing errors
    /// (IO, JSON, policy compilation) and for inputs never handed to the parser.
    pub fn kind(&self) -> Option<ViolationKind> {
        match self {
            FlowguardError::Syntax { .. } => Some(ViolationKind::Syntax),
            FlowguardError::Structural { .. } => Some(ViolationKind::Structural),
            FlowguardError::Security { .. } => Some(ViolationKind::Security),
            FlowguardError::ResourceLimit { .. } => Some(ViolationKind::ResourceLimit),
            FlowguardError::Advisory { .. } => Some(ViolationKind::Advisory),
            _ => None,
        }
    }

    /// Returns `true` if the error is a verdict on the document rather than
    /// a failure of the tooling around it.
    pub fn is_violation(&self) -> bool {
        self.kind().is_some()
    }

    /// Name of the rule that rejected the document, when there is one.
    pub fn rule(&self) -> Option<&str> {
        match self {
            FlowguardError::Structural { rule, .. }
            | FlowguardError::Security { rule, .. }
            | FlowguardError::ResourceLimit { rule, .. }
            | FlowguardError::Advisory { rule, .. } => Some(rule),
            _ => None,
        }
    }

    /// Maps the error to a process exit code for the CLI.
    pub fn exit_code(&self) -> i32 {
        if self.is_violation() {
            1
        } else {
            2
        }
    }
}

/// A convenience alias for `Result<T, FlowguardError>`.
pub type Result<T> = std::result::Result<T, FlowguardError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn violation_builds_matching_variant() {
        let err = FlowguardError::violation(ViolationKind::Security, "run_command", "rm -rf /");
        assert!(matches!(err, FlowguardError::Security { .. }));
        assert_eq!(err.kind(), Some(ViolationKind::Security));
        assert_eq!(err.rule(), Some("run_command"));
    }

    #[test]
    fn syntax_error_display_includes_line() {
        let err = FlowguardError::Syntax {
            line: 7,
            message: "timeout-minutes is not an integer: 'abc'".into(),
        };
        assert_eq!(
            err.to_string(),
            "Syntax error at line 7: timeout-minutes is not an integer: 'abc'"
        );
        assert!(err.is_violation());
        assert_eq!(err.rule(), None);
    }

    #[test]
    fn plumbing_errors_are_not_violations() {
        let io = FlowguardError::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        assert!(!io.is_violation());
        assert_eq!(io.kind(), None);
        assert_eq!(io.exit_code(), 2);

        let policy = FlowguardError::InvalidPolicy("bad regex".into());
        assert!(!policy.is_violation());

        let size = FlowguardError::InputSize { size: 0, limit: 65536 };
        assert!(!size.is_violation());
        assert_eq!(size.to_string(), "Input of 0 bytes is outside the accepted range 1..=65536");
    }

    #[test]
    fn violation_exit_code_is_one() {
        let err = FlowguardError::violation(ViolationKind::ResourceLimit, "resource_limits", "too many jobs");
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn kind_display_is_kebab_case() {
        assert_eq!(ViolationKind::ResourceLimit.to_string(), "resource-limit");
        assert_eq!(ViolationKind::Structural.to_string(), "structural");
    }
}
