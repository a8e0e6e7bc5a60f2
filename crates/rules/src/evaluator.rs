//! Rule evaluation
//!
//! Walks a rule set over one instance: skips placeholders and rules whose
//! condition does not hold, runs the leaf check, and resolves a message for
//! every failure. All rules run; failures are collected in configuration
//! order.
//!
//! The async walk races every condition and check against the cancellation
//! token, polling the work first. Cancellation ends the walk with a single
//! [`EvaluationError::Cancelled`] that carries the failures collected so far.

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::check::{LeafCheck, ValidationContext, Verdict};
use crate::error::EvaluationError;
use crate::member::Model;
use crate::message::MessageResolver;
use crate::registry::RuleRegistry;
use crate::rule::{Rule, RuleSet};

// ============================================================================
// FAILURE
// ============================================================================

/// One failed check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    /// Name of the failing member.
    pub member: String,
    /// Resolved display message.
    pub message: String,
    /// Failure key: the rule's key, or the member name.
    pub key: String,
    /// Short name of the failing check.
    pub check: &'static str,
    /// Element index within the innermost collection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection_index: Option<usize>,
    /// Element index one collection level further out.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_collection_index: Option<usize>,
    /// Path from the validated root, e.g. `Items[3].Products[0].OrderId`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_path: Option<String>,
}

impl Failure {
    pub(crate) fn from_rule<T: Model>(
        instance: &T,
        rule: &Rule<T>,
        check: &dyn LeafCheck<T>,
        messages: &MessageResolver,
    ) -> Self {
        let member = rule.member().name();
        Self {
            member: member.to_owned(),
            message: messages.resolve(instance, member, check, Some(rule)),
            key: rule
                .message()
                .failure_key()
                .unwrap_or(member)
                .to_owned(),
            check: check.short_name(),
            collection_index: None,
            parent_collection_index: None,
            item_path: None,
        }
    }

    /// Tags a failure of element `index` of collection `member`.
    ///
    /// The first collection level sets `collection_index`, the next one
    /// `parent_collection_index`; the path gains a `member[index].` prefix.
    #[must_use]
    pub fn within_collection(mut self, member: &str, index: usize) -> Self {
        if self.collection_index.is_none() {
            self.collection_index = Some(index);
        } else if self.parent_collection_index.is_none() {
            self.parent_collection_index = Some(index);
        }
        let inner = self.item_path.take().unwrap_or_else(|| self.member.clone());
        self.item_path = Some(format!("{member}[{index}].{inner}"));
        self
    }

    /// Prefixes the path with a scalar nested member.
    #[must_use]
    pub fn within_member(mut self, member: &str) -> Self {
        let inner = self.item_path.take().unwrap_or_else(|| self.member.clone());
        self.item_path = Some(format!("{member}.{inner}"));
        self
    }

    /// The item path, or the member name for top-level failures.
    #[must_use]
    pub fn path(&self) -> &str {
        self.item_path.as_deref().unwrap_or(&self.member)
    }
}

// ============================================================================
// REPORT
// ============================================================================

/// Every failure of one evaluation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    failures: Vec<Failure>,
}

impl ValidationReport {
    /// Wraps failures in evaluation order.
    #[must_use]
    pub fn new(failures: Vec<Failure>) -> Self {
        Self { failures }
    }

    /// `true` if nothing failed.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.failures.is_empty()
    }

    /// Failures in evaluation order.
    #[must_use]
    pub fn failures(&self) -> &[Failure] {
        &self.failures
    }

    /// Consumes the report.
    #[must_use]
    pub fn into_failures(self) -> Vec<Failure> {
        self.failures
    }

    /// Failures under one top-level member, including nested ones.
    ///
    /// Matches the first segment of [`Failure::path`], so `"Lines"` selects
    /// `Lines[0].Name` and `"Address"` selects `Address.City`.
    pub fn failures_for<'a>(&'a self, member: &'a str) -> impl Iterator<Item = &'a Failure> {
        self.failures
            .iter()
            .filter(move |f| f.path().split(['.', '[']).next() == Some(member))
    }

    /// Number of failures.
    #[must_use]
    pub fn len(&self) -> usize {
        self.failures.len()
    }

    /// `true` if there are no failures.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    /// Renders the report as JSON.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "valid": self.is_valid(),
            "failures": self.failures,
        })
    }
}

// ============================================================================
// WALKERS
// ============================================================================

/// Evaluates rules on the synchronous path.
///
/// # Errors
///
/// [`EvaluationError::AsyncInSyncPath`] at the first rule that needs the
/// async path, before its gate is evaluated.
pub fn evaluate_rules<T: Model>(
    instance: &T,
    rules: &[Rule<T>],
    messages: &MessageResolver,
) -> Result<Vec<Failure>, EvaluationError> {
    let token = CancellationToken::new();
    let mut failures = Vec::new();

    for rule in rules {
        let Some(check) = rule.check() else {
            continue;
        };
        if rule.is_async() {
            return Err(EvaluationError::AsyncInSyncPath {
                member: rule.member().name().to_owned(),
            });
        }
        if !rule.applies(instance)? {
            continue;
        }

        let ctx = ValidationContext::new(rule.member(), messages, &token);
        match check.evaluate(instance, &ctx)? {
            Verdict::Valid => {}
            Verdict::Invalid => {
                failures.push(Failure::from_rule(instance, rule, check.as_ref(), messages));
            }
            Verdict::Nested(nested) => failures.extend(nested),
        }
    }

    Ok(failures)
}

/// Evaluates rules on the asynchronous path.
///
/// # Errors
///
/// [`EvaluationError::Cancelled`] when `cancellation` fires before the walk
/// completes.
pub async fn evaluate_rules_async<T: Model>(
    instance: &T,
    rules: &[Rule<T>],
    messages: &MessageResolver,
    cancellation: &CancellationToken,
) -> Result<Vec<Failure>, EvaluationError> {
    let mut failures = Vec::new();

    for rule in rules {
        let Some(check) = rule.check() else {
            continue;
        };
        if cancellation.is_cancelled() {
            return Err(cancelled(rule, failures));
        }

        // Work first: a nested check that observes the cancellation returns
        // its partial failures instead of being dropped.
        let applies = tokio::select! {
            biased;
            applies = rule.applies_async(instance, cancellation) => applies,
            () = cancellation.cancelled() => return Err(cancelled(rule, failures)),
        };
        if !applies {
            continue;
        }

        let ctx = ValidationContext::new(rule.member(), messages, cancellation);
        let verdict = tokio::select! {
            biased;
            verdict = check.evaluate_async(instance, &ctx) => verdict,
            () = cancellation.cancelled() => return Err(cancelled(rule, failures)),
        };

        match verdict {
            Ok(Verdict::Valid) => {}
            Ok(Verdict::Invalid) => {
                failures.push(Failure::from_rule(instance, rule, check.as_ref(), messages));
            }
            Ok(Verdict::Nested(nested)) => failures.extend(nested),
            Err(EvaluationError::Cancelled { collected, .. }) => {
                failures.extend(collected.into_failures());
                return Err(cancelled(rule, failures));
            }
            Err(error) => return Err(error),
        }
    }

    Ok(failures)
}

fn cancelled<T>(rule: &Rule<T>, failures: Vec<Failure>) -> EvaluationError {
    tracing::debug!(
        member = %rule.member(),
        collected = failures.len(),
        "rule evaluation cancelled"
    );
    EvaluationError::Cancelled {
        member: rule.member().name().to_owned(),
        collected: ValidationReport::new(failures),
    }
}

// ============================================================================
// VALIDATOR
// ============================================================================

/// A rule set plus the resolver for its messages.
///
/// # Examples
///
/// ```rust,ignore
/// use nebula_rules::prelude::*;
///
/// let validator = Validator::from_registry(&registry);
/// let report = validator.validate(&signup)?;
/// for failure in report.failures() {
///     println!("{}: {}", failure.path(), failure.message);
/// }
/// ```
#[derive(Debug, Clone)]
pub struct Validator<T> {
    rules: RuleSet<T>,
    messages: MessageResolver,
}

impl<T: Model> Validator<T> {
    /// Creates a validator with the default resolver.
    #[must_use]
    pub fn new(rules: RuleSet<T>) -> Self {
        Self {
            rules,
            messages: MessageResolver::new(),
        }
    }

    /// Snapshots `T`'s registered rules.
    #[must_use]
    pub fn from_registry(registry: &RuleRegistry) -> Self {
        Self::new(registry.rule_set::<T>())
    }

    /// Replaces the message resolver.
    #[must_use = "builder methods must be chained or built"]
    pub fn with_messages(mut self, messages: MessageResolver) -> Self {
        self.messages = messages;
        self
    }

    /// The evaluated rules.
    #[must_use]
    pub fn rules(&self) -> &RuleSet<T> {
        &self.rules
    }

    /// Validates on the synchronous path.
    ///
    /// # Errors
    ///
    /// [`EvaluationError::AsyncInSyncPath`] if any rule with a check has an
    /// async condition or check. Rules are rejected before their gate runs,
    /// so a gate that is false does not hide an async rule.
    pub fn validate(&self, instance: &T) -> Result<ValidationReport, EvaluationError> {
        evaluate_rules(instance, self.rules.rules(), &self.messages).map(ValidationReport::new)
    }

    /// Validates on the asynchronous path.
    ///
    /// # Errors
    ///
    /// [`EvaluationError::Cancelled`] if `cancellation` fires first.
    pub async fn validate_async(
        &self,
        instance: &T,
        cancellation: &CancellationToken,
    ) -> Result<ValidationReport, EvaluationError> {
        evaluate_rules_async(instance, self.rules.rules(), &self.messages, cancellation)
            .await
            .map(ValidationReport::new)
    }
}
