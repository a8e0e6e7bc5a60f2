//! Error types
//!
//! Two families live here:
//!
//! - [`RuleConfigError`]: programming mistakes made while composing rules.
//!   They surface from [`RuleBuilder::build`](crate::builder::RuleBuilder::build)
//!   and name the offending member and the missing precondition.
//! - [`EvaluationError`]: an evaluation path that could not finish
//!   (an async rule on the synchronous path, or cancellation).
//!
//! Failing checks are not errors: they are reported as
//! [`Failure`](crate::evaluator::Failure) records.

use crate::evaluator::ValidationReport;

// ============================================================================
// CONFIGURATION ERRORS
// ============================================================================

/// A rule configuration that cannot be committed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum RuleConfigError {
    /// `when` was called with no open `rule_for`.
    #[error("`when` requires a preceding `rule_for`; no rule is open")]
    WhenWithoutRule,

    /// `otherwise` did not directly follow a `when_scope`.
    #[error("`otherwise` must directly follow a `when_scope` on the same builder")]
    OtherwiseWithoutWhen,

    /// A condition was attached to a member that has no leaf check to gate.
    #[error(
        "member `{member}` has a condition but no leaf-check rule; attach a check first or disable consistency enforcement"
    )]
    GateWithoutCheck {
        /// The gated member.
        member: String,
    },

    /// A conditional scope configured nothing.
    #[error("a conditional scope must configure at least one rule")]
    EmptyScope,

    /// More than one before-validation transform targets one member.
    #[error("member `{member}` has more than one before-validation transform")]
    DuplicateTransform {
        /// The member with conflicting transforms.
        member: String,
    },

    /// A rule group was merged into the rules of a different declaring type.
    #[error("rule group declared for `{found}` cannot be merged into the rules of `{expected}`")]
    DeclaringTypeMismatch {
        /// Declaring type of the receiving list.
        expected: &'static str,
        /// Declaring type of the rejected group.
        found: &'static str,
    },
}

impl RuleConfigError {
    /// Returns the member named by the error, if any.
    #[must_use]
    pub fn member(&self) -> Option<&str> {
        match self {
            Self::GateWithoutCheck { member } | Self::DuplicateTransform { member } => Some(member),
            _ => None,
        }
    }
}

// ============================================================================
// EVALUATION ERRORS
// ============================================================================

/// An evaluation that stopped before producing a full report.
#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum EvaluationError {
    /// A rule with an async condition or check reached the synchronous path.
    #[error("rule on `{member}` is asynchronous; use `validate_async`")]
    AsyncInSyncPath {
        /// Member of the offending rule.
        member: String,
    },

    /// The cancellation token fired.
    ///
    /// `collected` holds the failures gathered before the cancelled rule;
    /// they are complete for every rule that finished.
    #[error("validation was cancelled while evaluating `{member}`")]
    Cancelled {
        /// Member whose evaluation was interrupted.
        member: String,
        /// Failures from rules that completed before cancellation.
        collected: ValidationReport,
    },
}

impl EvaluationError {
    /// Returns `true` for [`EvaluationError::Cancelled`].
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_names_member() {
        let error = RuleConfigError::GateWithoutCheck {
            member: "Password".to_owned(),
        };
        assert_eq!(error.member(), Some("Password"));
        assert!(error.to_string().contains("`Password`"));
    }

    #[test]
    fn scope_errors_have_no_member() {
        assert_eq!(RuleConfigError::EmptyScope.member(), None);
        assert_eq!(RuleConfigError::OtherwiseWithoutWhen.member(), None);
    }

    #[test]
    fn cancelled_is_detected() {
        let error = EvaluationError::Cancelled {
            member: "Items".to_owned(),
            collected: ValidationReport::default(),
        };
        assert!(error.is_cancelled());
        assert!(error.to_string().contains("Items"));
    }
}
