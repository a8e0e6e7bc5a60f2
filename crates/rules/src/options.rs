//! Builder and resolver configuration

use serde::{Deserialize, Serialize};

use crate::group::Merge;

/// What happens to a member's registered rules when the builder opens it again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistrationMode {
    /// New rules replace everything registered for the member.
    #[default]
    Replace,
    /// New rules are merged next to the existing ones.
    Preserve,
}

/// Rule composition options.
///
/// # Examples
///
/// ```rust,ignore
/// use nebula_rules::options::RuleOptions;
///
/// let options = RuleOptions::from_json(r#"{ "registration": "preserve" }"#)?;
/// assert!(options.enforce_consistency);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleOptions {
    /// Reject conditions on members that have no leaf-check rule.
    pub enforce_consistency: bool,

    /// Replace or preserve rules of re-opened members.
    pub registration: RegistrationMode,

    /// Attach the same kind of check to a member more than once.
    pub allow_duplicate_checks: bool,

    /// Look up `Member_Check` resource keys when a rule names none.
    pub conventional_keys: bool,

    /// Locale used when a rule does not carry one.
    pub default_locale: Option<String>,
}

impl Default for RuleOptions {
    fn default() -> Self {
        Self {
            enforce_consistency: true,
            registration: RegistrationMode::Replace,
            allow_duplicate_checks: false,
            conventional_keys: true,
            default_locale: None,
        }
    }
}

impl RuleOptions {
    /// Parses options from JSON; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Sets consistency enforcement.
    #[must_use = "builder methods must be chained or built"]
    pub fn with_consistency(mut self, enforce: bool) -> Self {
        self.enforce_consistency = enforce;
        self
    }

    /// Sets the registration mode.
    #[must_use = "builder methods must be chained or built"]
    pub fn with_registration(mut self, registration: RegistrationMode) -> Self {
        self.registration = registration;
        self
    }

    /// Allows repeated checks of the same kind on one member.
    #[must_use = "builder methods must be chained or built"]
    pub fn with_duplicate_checks(mut self, allow: bool) -> Self {
        self.allow_duplicate_checks = allow;
        self
    }

    /// How builder output is merged into the registry.
    #[must_use]
    pub fn merge_mode(&self) -> Merge {
        if self.allow_duplicate_checks {
            Merge::Append
        } else {
            Merge::SkipIdentical
        }
    }
}
