//! Rule model
//!
//! A [`Rule`] is one conditionally applicable leaf check on one member, with
//! the metadata the message pipeline needs. Rules are immutable once built;
//! gating a rule inside a scope produces a new value that keeps the original
//! unique key.

use std::fmt;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::check::LeafCheck;
use crate::condition::{AsyncCondition, Condition, Gate, all, all_async, lift};
use crate::error::EvaluationError;
use crate::member::{MemberRef, Model};
use crate::message::ResourceType;

/// Programmatic message source.
pub type MessageFn<T> = Arc<dyn Fn(&T) -> Option<String> + Send + Sync>;

// ============================================================================
// MESSAGE METADATA
// ============================================================================

/// Message metadata of a rule.
pub struct MessageSpec<T> {
    pub(crate) message: Option<String>,
    pub(crate) resolver: Option<MessageFn<T>>,
    pub(crate) failure_key: Option<String>,
    pub(crate) resource_key: Option<String>,
    pub(crate) resource_type: Option<ResourceType>,
    pub(crate) locale: Option<String>,
    pub(crate) fallback: Option<String>,
    pub(crate) use_conventional_keys: bool,
}

impl<T> MessageSpec<T> {
    /// Explicit message template.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Message function receiving the instance.
    #[must_use]
    pub fn resolver(&self) -> Option<&MessageFn<T>> {
        self.resolver.as_ref()
    }

    /// Key reported with the failure instead of the member name.
    #[must_use]
    pub fn failure_key(&self) -> Option<&str> {
        self.failure_key.as_deref()
    }

    /// Resource key overriding the check's and the conventional one.
    #[must_use]
    pub fn resource_key(&self) -> Option<&str> {
        self.resource_key.as_deref()
    }

    /// Resource type for lookups.
    #[must_use]
    pub fn resource_type(&self) -> Option<&ResourceType> {
        self.resource_type.as_ref()
    }

    /// Locale for lookups.
    #[must_use]
    pub fn locale(&self) -> Option<&str> {
        self.locale.as_deref()
    }

    /// Message used when resource lookup fails.
    #[must_use]
    pub fn fallback(&self) -> Option<&str> {
        self.fallback.as_deref()
    }

    /// Whether `Member_Check` resource keys are tried.
    #[must_use]
    pub fn use_conventional_keys(&self) -> bool {
        self.use_conventional_keys
    }
}

impl<T> Default for MessageSpec<T> {
    fn default() -> Self {
        Self {
            message: None,
            resolver: None,
            failure_key: None,
            resource_key: None,
            resource_type: None,
            locale: None,
            fallback: None,
            use_conventional_keys: true,
        }
    }
}

impl<T> Clone for MessageSpec<T> {
    fn clone(&self) -> Self {
        Self {
            message: self.message.clone(),
            resolver: self.resolver.clone(),
            failure_key: self.failure_key.clone(),
            resource_key: self.resource_key.clone(),
            resource_type: self.resource_type.clone(),
            locale: self.locale.clone(),
            fallback: self.fallback.clone(),
            use_conventional_keys: self.use_conventional_keys,
        }
    }
}

impl<T> fmt::Debug for MessageSpec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageSpec")
            .field("message", &self.message)
            .field("has_resolver", &self.resolver.is_some())
            .field("failure_key", &self.failure_key)
            .field("resource_key", &self.resource_key)
            .field("resource_type", &self.resource_type)
            .field("locale", &self.locale)
            .field("fallback", &self.fallback)
            .field("use_conventional_keys", &self.use_conventional_keys)
            .finish()
    }
}

// ============================================================================
// RULE
// ============================================================================

/// One conditionally applicable check on one member.
pub struct Rule<T> {
    member: MemberRef,
    condition: Option<Condition<T>>,
    async_condition: Option<AsyncCondition<T>>,
    check: Option<Arc<dyn LeafCheck<T>>>,
    message: MessageSpec<T>,
    unique_key: Uuid,
}

impl<T: Model> Rule<T> {
    /// Creates an unconditional rule.
    pub fn new(member: MemberRef, check: Arc<dyn LeafCheck<T>>) -> Self {
        Self::from_parts(member, Some(check), None, None, MessageSpec::default())
    }

    /// Creates a rule without a check.
    ///
    /// Placeholders never fail; they only record that the member has rules.
    #[must_use]
    pub fn placeholder(member: MemberRef) -> Self {
        Self::from_parts(member, None, None, None, MessageSpec::default())
    }

    pub(crate) fn from_parts(
        member: MemberRef,
        check: Option<Arc<dyn LeafCheck<T>>>,
        condition: Option<Condition<T>>,
        async_condition: Option<AsyncCondition<T>>,
        message: MessageSpec<T>,
    ) -> Self {
        Self {
            member,
            condition,
            async_condition,
            check,
            message,
            unique_key: Uuid::new_v4(),
        }
    }

    /// Sets the synchronous condition.
    #[must_use = "builder methods must be chained or built"]
    pub fn with_condition(mut self, condition: Condition<T>) -> Self {
        self.condition = Some(condition);
        self
    }

    /// Sets the asynchronous condition.
    #[must_use = "builder methods must be chained or built"]
    pub fn with_async_condition(mut self, condition: AsyncCondition<T>) -> Self {
        self.async_condition = Some(condition);
        self
    }

    /// Replaces the message metadata.
    #[must_use = "builder methods must be chained or built"]
    pub fn with_message_spec(mut self, message: MessageSpec<T>) -> Self {
        self.message = message;
        self
    }

    /// Returns a copy behind `gate`, evaluated before the rule's own condition.
    pub(crate) fn gated(&self, gate: &Gate<T>) -> Self {
        let (condition, async_condition) = match gate {
            Gate::Sync(g) => (
                Some(all(Arc::clone(g), self.condition.clone())),
                self.async_condition
                    .clone()
                    .map(|a| all_async(lift(Arc::clone(g)), a)),
            ),
            Gate::Async(g) => {
                let inner = self
                    .async_condition
                    .clone()
                    .or_else(|| self.condition.clone().map(lift));
                let composed = match inner {
                    Some(inner) => all_async(Arc::clone(g), inner),
                    None => Arc::clone(g),
                };
                (self.condition.clone(), Some(composed))
            }
        };
        Self {
            condition,
            async_condition,
            ..self.clone()
        }
    }

    /// Whether the rule applies, on the synchronous path.
    ///
    /// # Errors
    ///
    /// [`EvaluationError::AsyncInSyncPath`] when the rule has an async condition.
    pub fn applies(&self, instance: &T) -> Result<bool, EvaluationError> {
        if self.async_condition.is_some() {
            return Err(EvaluationError::AsyncInSyncPath {
                member: self.member.name().to_owned(),
            });
        }
        Ok(self.condition.as_ref().is_none_or(|c| c(instance)))
    }

    /// Whether the rule applies; the async condition is authoritative when set.
    pub fn applies_async<'a>(
        &'a self,
        instance: &'a T,
        cancellation: &'a CancellationToken,
    ) -> BoxFuture<'a, bool> {
        match &self.async_condition {
            Some(a) => a(instance, cancellation),
            None => {
                let holds = self.condition.as_ref().is_none_or(|c| c(instance));
                futures::future::ready(holds).boxed()
            }
        }
    }

    /// Returns a serializable summary.
    #[must_use]
    pub fn describe(&self) -> RuleDescriptor {
        RuleDescriptor {
            member: self.member.name().to_owned(),
            declaring_type: self.member.declaring_type().short_name(),
            check: self.check.as_ref().map(|c| c.short_name()),
            conditional: self.condition.is_some() || self.async_condition.is_some(),
            is_async: self.is_async(),
            unique_key: self.unique_key,
            message: self.message.message.clone(),
            resource_key: self.message.resource_key.clone(),
        }
    }
}

impl<T> Rule<T> {
    /// The checked member.
    #[must_use]
    pub fn member(&self) -> &MemberRef {
        &self.member
    }

    /// The leaf check; `None` for placeholders.
    #[must_use]
    pub fn check(&self) -> Option<&Arc<dyn LeafCheck<T>>> {
        self.check.as_ref()
    }

    /// Message metadata.
    #[must_use]
    pub fn message(&self) -> &MessageSpec<T> {
        &self.message
    }

    /// Identity for deduplication and diagnostics.
    #[must_use]
    pub fn unique_key(&self) -> Uuid {
        self.unique_key
    }

    /// `true` when the rule has no check.
    #[must_use]
    pub fn is_placeholder(&self) -> bool {
        self.check.is_none()
    }

    /// `true` when the rule has a condition of either kind.
    #[must_use]
    pub fn is_conditional(&self) -> bool {
        self.condition.is_some() || self.async_condition.is_some()
    }

    /// `true` when the rule needs the async path.
    #[must_use]
    pub fn is_async(&self) -> bool {
        self.async_condition.is_some() || self.check.as_ref().is_some_and(|c| c.is_async())
    }
}

impl<T> Clone for Rule<T> {
    fn clone(&self) -> Self {
        Self {
            member: self.member.clone(),
            condition: self.condition.clone(),
            async_condition: self.async_condition.clone(),
            check: self.check.clone(),
            message: self.message.clone(),
            unique_key: self.unique_key,
        }
    }
}

impl<T> fmt::Debug for Rule<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("member", &self.member)
            .field("check", &self.check.as_ref().map(|c| c.short_name()))
            .field("conditional", &self.is_conditional())
            .field("unique_key", &self.unique_key)
            .finish_non_exhaustive()
    }
}

/// Diagnostic summary of a rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleDescriptor {
    /// Member name.
    pub member: String,
    /// Short name of the declaring type.
    pub declaring_type: &'static str,
    /// Short name of the check, if any.
    pub check: Option<&'static str>,
    /// Whether a condition is attached.
    pub conditional: bool,
    /// Whether the rule needs the async path.
    pub is_async: bool,
    /// Rule identity.
    pub unique_key: Uuid,
    /// Explicit message template.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Explicit resource key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_key: Option<String>,
}

// ============================================================================
// RULE SET
// ============================================================================

/// An ordered, shareable snapshot of rules for `T`.
pub struct RuleSet<T> {
    rules: Arc<[Rule<T>]>,
}

impl<T> RuleSet<T> {
    /// Creates a set from rules in evaluation order.
    #[must_use]
    pub fn new(rules: Vec<Rule<T>>) -> Self {
        Self {
            rules: rules.into(),
        }
    }

    /// All rules in order.
    #[must_use]
    pub fn rules(&self) -> &[Rule<T>] {
        &self.rules
    }

    /// Number of rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// `true` if there are no rules.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Iterates in evaluation order.
    pub fn iter(&self) -> std::slice::Iter<'_, Rule<T>> {
        self.rules.iter()
    }

    /// `true` if any rule needs the async path.
    #[must_use]
    pub fn has_async(&self) -> bool {
        self.rules.iter().any(Rule::is_async)
    }

    /// Rules on one member, in order.
    pub fn for_member<'a>(&'a self, member: &'a MemberRef) -> impl Iterator<Item = &'a Rule<T>> {
        self.rules
            .iter()
            .filter(move |r| r.member.is_same_member(member))
    }
}

impl<T> Default for RuleSet<T> {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl<T> Clone for RuleSet<T> {
    fn clone(&self) -> Self {
        Self {
            rules: Arc::clone(&self.rules),
        }
    }
}

impl<T> fmt::Debug for RuleSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.rules.iter()).finish()
    }
}

impl<'a, T> IntoIterator for &'a RuleSet<T> {
    type Item = &'a Rule<T>;
    type IntoIter = std::slice::Iter<'a, Rule<T>>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
