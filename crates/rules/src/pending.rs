//! Builder-side rule accumulator

use std::sync::Arc;

use crate::check::LeafCheck;
use crate::condition::{AsyncCondition, Condition, Gate};
use crate::member::{MemberRef, Model};
use crate::rule::{MessageSpec, Rule};

/// A rule under configuration.
///
/// Collects checks for one member until the builder expands it into one
/// [`Rule`] per check. Never shared and never seen by evaluation.
pub struct PendingRule<T> {
    member: MemberRef,
    checks: Vec<Arc<dyn LeafCheck<T>>>,
    condition: Option<Condition<T>>,
    async_condition: Option<AsyncCondition<T>>,
    message: MessageSpec<T>,
    has_transform: bool,
    independent_rules: usize,
}

impl<T: Model> PendingRule<T> {
    pub(crate) fn new(member: MemberRef) -> Self {
        Self {
            member,
            checks: Vec::new(),
            condition: None,
            async_condition: None,
            message: MessageSpec::default(),
            has_transform: false,
            independent_rules: 0,
        }
    }

    /// The configured member.
    #[must_use]
    pub fn member(&self) -> &MemberRef {
        &self.member
    }

    /// Number of attached checks.
    #[must_use]
    pub fn check_count(&self) -> usize {
        self.checks.len()
    }

    /// `true` if a value transform is attached.
    #[must_use]
    pub fn has_transform(&self) -> bool {
        self.has_transform
    }

    /// `true` for a condition with nothing to gate.
    #[must_use]
    pub fn is_gate_only(&self) -> bool {
        self.checks.is_empty() && (self.condition.is_some() || self.async_condition.is_some())
    }

    /// `true` if `must` rules were staged from this rule's chain.
    #[must_use]
    pub fn has_independent_rules(&self) -> bool {
        self.independent_rules > 0
    }

    /// `true` for an ungated rule without checks whose member already has
    /// `must` rules from the same chain.
    #[must_use]
    pub fn is_covered_by_independent_rules(&self) -> bool {
        self.checks.is_empty() && !self.is_gate_only() && self.has_independent_rules()
    }

    /// Attaches a check; returns `false` if an identical one is present.
    pub(crate) fn attach(&mut self, check: Arc<dyn LeafCheck<T>>, allow_duplicates: bool) -> bool {
        if !allow_duplicates
            && self
                .checks
                .iter()
                .any(|existing| existing.is_identical(check.as_ref()))
        {
            tracing::debug!(
                member = %self.member,
                check = check.short_name(),
                "skipped identical check"
            );
            return false;
        }
        self.checks.push(check);
        true
    }

    pub(crate) fn set_condition(&mut self, condition: Condition<T>) {
        self.condition = Some(condition);
    }

    pub(crate) fn set_async_condition(&mut self, condition: AsyncCondition<T>) {
        self.async_condition = Some(condition);
    }

    pub(crate) fn note_independent_rule(&mut self) {
        self.independent_rules += 1;
    }

    pub(crate) fn mark_transform(&mut self) {
        self.has_transform = true;
    }

    pub(crate) fn message_mut(&mut self) -> &mut MessageSpec<T> {
        &mut self.message
    }

    /// The gate of a gate-only rule; the async condition wins.
    pub(crate) fn gate(&self) -> Option<Gate<T>> {
        match (&self.async_condition, &self.condition) {
            (Some(a), _) => Some(Gate::Async(Arc::clone(a))),
            (None, Some(c)) => Some(Gate::Sync(Arc::clone(c))),
            (None, None) => None,
        }
    }

    /// One rule per check, sharing condition and message; a placeholder
    /// when there are no checks.
    pub(crate) fn into_rules(self) -> Vec<Rule<T>> {
        let Self {
            member,
            checks,
            condition,
            async_condition,
            message,
            has_transform: _,
            independent_rules: _,
        } = self;

        if checks.is_empty() {
            return vec![Rule::from_parts(
                member,
                None,
                condition,
                async_condition,
                message,
            )];
        }

        checks
            .into_iter()
            .map(|check| {
                Rule::from_parts(
                    member.clone(),
                    Some(check),
                    condition.clone(),
                    async_condition.clone(),
                    message.clone(),
                )
            })
            .collect()
    }
}
