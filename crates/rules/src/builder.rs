//! Fluent rule composition
//!
//! [`RuleBuilder`] turns a sequence of fluent calls into rules and commits
//! them to the [`RuleRegistry`] on [`RuleBuilder::build`].
//!
//! - `rule_for` opens a pending rule for one member; opening the next one
//!   commits it. The returned [`PropertyRule`] attaches checks, conditions,
//!   message metadata and nested rules.
//! - `when` gates the open rule. A gate without checks applies to the
//!   member's existing leaf-check rules instead.
//! - `must` adds an independent predicate rule that the open rule's gate
//!   does not cover.
//! - `when_scope` runs a closure against a fresh builder and gates every
//!   rule it produced; `otherwise` does the same with the negated gate.
//!
//! Configuration mistakes are recorded where they happen and returned by
//! `build`. Only the first one is kept.
//!
//! # Examples
//!
//! ```rust,ignore
//! use nebula_rules::prelude::*;
//!
//! let mut rules = RuleBuilder::<Customer>::new(registry);
//! rules.rule_for(member!(Customer, name)).check(Required).check(Length::max(40));
//! rules
//!     .when_scope(|c| c.is_business, |r| {
//!         r.rule_for(member!(Customer, vat_id)).check(Required);
//!     })
//!     .otherwise(|r| {
//!         r.rule_for(member!(Customer, birth_date)).check(Required);
//!     });
//! let set = rules.build()?;
//! ```

use std::sync::Arc;

use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use crate::check::{Binding, Check, MemberCheck};
use crate::checks::{AsyncPredicate, Predicate};
use crate::condition::{Gate, async_condition, condition, lift};
use crate::error::RuleConfigError;
use crate::member::{MemberRef, Model, Property};
use crate::message::ResourceType;
use crate::nested::{CollectionRules, NestedRules};
use crate::options::{RegistrationMode, RuleOptions};
use crate::pending::PendingRule;
use crate::registry::RuleRegistry;
use crate::rule::{MessageSpec, Rule, RuleSet};
use crate::source::ConfigureRules;

enum Staged<T> {
    Pending(PendingRule<T>),
    Scoped(Vec<Rule<T>>),
}

// ============================================================================
// RULE BUILDER
// ============================================================================

/// Composes rules for `T`.
pub struct RuleBuilder<T> {
    registry: Arc<RuleRegistry>,
    options: RuleOptions,
    staged: Vec<Staged<T>>,
    current: Option<usize>,
    last_gate: Option<Gate<T>>,
    replaced: Vec<MemberRef>,
    transforms: Vec<MemberRef>,
    error: Option<RuleConfigError>,
    built: Option<RuleSet<T>>,
    dirty: bool,
}

impl<T: Model> RuleBuilder<T> {
    /// Creates a builder with default options.
    #[must_use]
    pub fn new(registry: Arc<RuleRegistry>) -> Self {
        Self::with_options(registry, RuleOptions::default())
    }

    /// Creates a builder with explicit options.
    #[must_use]
    pub fn with_options(registry: Arc<RuleRegistry>, options: RuleOptions) -> Self {
        Self {
            registry,
            options,
            staged: Vec::new(),
            current: None,
            last_gate: None,
            replaced: Vec::new(),
            transforms: Vec::new(),
            error: None,
            built: None,
            dirty: false,
        }
    }

    /// The registry this builder commits to.
    #[must_use]
    pub fn registry(&self) -> &Arc<RuleRegistry> {
        &self.registry
    }

    /// The builder options.
    #[must_use]
    pub fn options(&self) -> &RuleOptions {
        &self.options
    }

    /// The first recorded configuration error, if any.
    #[must_use]
    pub fn error(&self) -> Option<&RuleConfigError> {
        self.error.as_ref()
    }

    // ------------------------------------------------------------------------
    // Opening members
    // ------------------------------------------------------------------------

    /// Opens a rule for a member, committing the previously open one.
    pub fn rule_for<V>(&mut self, property: Property<T, V>) -> PropertyRule<'_, T, V>
    where
        V: Send + Sync + 'static,
    {
        let index = self.open(property.member().clone());
        PropertyRule {
            builder: self,
            binding: Arc::new(Binding::new(property)),
            pending: index,
            target: index,
        }
    }

    /// Opens a rule for a collection member whose elements get child rules.
    pub fn rule_for_each<E: Model>(&mut self, property: Property<T, Vec<E>>) -> EachRule<'_, T, E> {
        let index = self.open(property.member().clone());
        EachRule {
            builder: self,
            property,
            pending: index,
        }
    }

    fn open(&mut self, member: MemberRef) -> usize {
        self.dirty = true;
        self.last_gate = None;
        if self.options.registration == RegistrationMode::Replace {
            self.mark_replaced(&member);
        }
        self.staged.push(Staged::Pending(PendingRule::new(member)));
        let index = self.staged.len() - 1;
        self.current = Some(index);
        index
    }

    // ------------------------------------------------------------------------
    // Gates
    // ------------------------------------------------------------------------

    /// Gates the open rule.
    ///
    /// Records [`RuleConfigError::WhenWithoutRule`] if no rule is open.
    pub fn when<F>(&mut self, predicate: F) -> &mut Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.dirty = true;
        match self.current {
            Some(index) => {
                if let Some(pending) = self.pending_mut(index) {
                    pending.set_condition(condition(predicate));
                }
            }
            None => self.fail(RuleConfigError::WhenWithoutRule),
        }
        self
    }

    /// Gates the open rule with an async predicate.
    pub fn when_async<F>(&mut self, predicate: F) -> &mut Self
    where
        F: for<'a> Fn(&'a T, &'a CancellationToken) -> BoxFuture<'a, bool> + Send + Sync + 'static,
    {
        self.dirty = true;
        match self.current {
            Some(index) => {
                if let Some(pending) = self.pending_mut(index) {
                    pending.set_async_condition(async_condition(predicate));
                }
            }
            None => self.fail(RuleConfigError::WhenWithoutRule),
        }
        self
    }

    /// Gates every rule configured by `configure` with `predicate`.
    ///
    /// Records [`RuleConfigError::EmptyScope`] if `configure` adds nothing.
    pub fn when_scope<F>(
        &mut self,
        predicate: F,
        configure: impl FnOnce(&mut RuleBuilder<T>),
    ) -> Scope<'_, T>
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        let gate = Gate::Sync(condition(predicate));
        self.scoped(gate.clone(), configure);
        self.last_gate = Some(gate);
        Scope { builder: self }
    }

    /// Async [`RuleBuilder::when_scope`].
    pub fn when_scope_async<F>(
        &mut self,
        predicate: F,
        configure: impl FnOnce(&mut RuleBuilder<T>),
    ) -> Scope<'_, T>
    where
        F: for<'a> Fn(&'a T, &'a CancellationToken) -> BoxFuture<'a, bool> + Send + Sync + 'static,
    {
        let gate = Gate::Async(async_condition(predicate));
        self.scoped(gate.clone(), configure);
        self.last_gate = Some(gate);
        Scope { builder: self }
    }

    /// Gates `configure`'s rules with the negation of the last scope gate.
    ///
    /// Records [`RuleConfigError::OtherwiseWithoutWhen`] unless it directly
    /// follows a `when_scope` on this builder.
    pub fn otherwise(&mut self, configure: impl FnOnce(&mut RuleBuilder<T>)) -> &mut Self {
        match self.last_gate.take() {
            Some(gate) => self.scoped(gate.negated(), configure),
            None => self.fail(RuleConfigError::OtherwiseWithoutWhen),
        }
        self
    }

    /// [`RuleBuilder::otherwise`] on the async path.
    ///
    /// A synchronous scope gate is negated and lifted.
    pub fn otherwise_async(&mut self, configure: impl FnOnce(&mut RuleBuilder<T>)) -> &mut Self {
        match self.last_gate.take() {
            Some(gate) => {
                let negated = match gate.negated() {
                    Gate::Sync(c) => Gate::Async(lift(c)),
                    async_gate @ Gate::Async(_) => async_gate,
                };
                self.scoped(negated, configure);
            }
            None => self.fail(RuleConfigError::OtherwiseWithoutWhen),
        }
        self
    }

    fn scoped(&mut self, gate: Gate<T>, configure: impl FnOnce(&mut RuleBuilder<T>)) {
        self.dirty = true;
        self.current = None;
        self.last_gate = None;
        if self.error.is_some() {
            return;
        }

        let mut nested = RuleBuilder::with_options(Arc::clone(&self.registry), self.options.clone());
        configure(&mut nested);
        match nested.finish() {
            Err(error) => self.fail(error),
            Ok(rules) if rules.is_empty() => self.fail(RuleConfigError::EmptyScope),
            Ok(rules) => {
                let gated = rules.iter().map(|rule| rule.gated(&gate)).collect();
                self.staged.push(Staged::Scoped(gated));
                for member in std::mem::take(&mut nested.replaced) {
                    self.mark_replaced(&member);
                }
                self.transforms.append(&mut nested.transforms);
            }
        }
    }

    // ------------------------------------------------------------------------
    // Build
    // ------------------------------------------------------------------------

    /// Commits the configured rules to the registry.
    ///
    /// Members opened under [`RegistrationMode::Replace`], and members whose
    /// registered rules were gated, are replaced; the rest are merged. A
    /// second call without new configuration returns the previous set.
    ///
    /// # Errors
    ///
    /// The first configuration error recorded by any call on this builder.
    pub fn build(&mut self) -> Result<RuleSet<T>, RuleConfigError> {
        if !self.dirty
            && let Some(built) = &self.built
        {
            return Ok(built.clone());
        }

        let rules = self.finish()?;
        let replaced = std::mem::take(&mut self.replaced);
        self.transforms.clear();

        if let Err(error) =
            self.registry
                .commit(group_by_member(&rules), &replaced, self.options.merge_mode())
        {
            self.fail(error.clone());
            return Err(error);
        }

        let mut all: Vec<Rule<T>> = self
            .built
            .take()
            .map(|previous| {
                previous
                    .iter()
                    .filter(|rule| !replaced.iter().any(|m| m.is_same_member(rule.member())))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        all.extend(rules);

        let set = RuleSet::new(all);
        tracing::debug!(
            declaring_type = std::any::type_name::<T>(),
            rules = set.len(),
            replaced = replaced.len(),
            "built rules"
        );
        self.built = Some(set.clone());
        self.dirty = false;
        Ok(set)
    }

    /// Builds without touching the registry; used for child rule sets.
    pub(crate) fn build_detached(&mut self) -> Result<RuleSet<T>, RuleConfigError> {
        self.finish().map(RuleSet::new)
    }

    /// Commits the open rule, expands staged rules in order and runs the
    /// transform check.
    fn finish(&mut self) -> Result<Vec<Rule<T>>, RuleConfigError> {
        if let Some(error) = &self.error {
            return Err(error.clone());
        }
        self.current = None;

        let mut rules: Vec<Rule<T>> = Vec::new();
        for entry in std::mem::take(&mut self.staged) {
            match entry {
                Staged::Scoped(scoped) => rules.extend(scoped),
                Staged::Pending(pending) if pending.is_gate_only() => {
                    match self.expand_gate(pending, &mut rules) {
                        Ok(expanded) => rules.extend(expanded),
                        Err(error) => {
                            self.fail(error.clone());
                            return Err(error);
                        }
                    }
                }
                Staged::Pending(pending) if pending.is_covered_by_independent_rules() => {}
                Staged::Pending(pending) => rules.extend(pending.into_rules()),
            }
        }

        for (i, member) in self.transforms.iter().enumerate() {
            if self.transforms[..i].iter().any(|m| m.is_same_member(member)) {
                let error = RuleConfigError::DuplicateTransform {
                    member: member.name().to_owned(),
                };
                self.fail(error.clone());
                return Err(error);
            }
        }

        Ok(rules)
    }

    /// Applies a check-less gate to the member's leaf-check rules.
    ///
    /// Rules configured earlier on this builder are gated in place; otherwise
    /// the registered ones are copied behind the gate and the member is
    /// replaced on build. A member covered only by `must` rules of the same
    /// chain keeps the gate as a placeholder.
    fn expand_gate(
        &mut self,
        pending: PendingRule<T>,
        rules: &mut [Rule<T>],
    ) -> Result<Vec<Rule<T>>, RuleConfigError> {
        let Some(gate) = pending.gate() else {
            return Ok(pending.into_rules());
        };
        let member = pending.member().clone();

        let mut local = rules
            .iter_mut()
            .filter(|rule| !rule.is_placeholder() && rule.member().is_same_member(&member))
            .peekable();
        if local.peek().is_some() {
            for rule in local {
                *rule = rule.gated(&gate);
            }
            return Ok(Vec::new());
        }

        let registered = self.registry.leaf_check_rules::<T>(&member);
        if !registered.is_empty() {
            tracing::debug!(
                member = %member,
                rules = registered.len(),
                "gating registered rules"
            );
            self.mark_replaced(&member);
            return Ok(registered.iter().map(|rule| rule.gated(&gate)).collect());
        }

        // `must` rules of the same `rule_for` stay ungated.
        if pending.has_independent_rules() || !self.options.enforce_consistency {
            return Ok(pending.into_rules());
        }
        Err(RuleConfigError::GateWithoutCheck {
            member: member.name().to_owned(),
        })
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    fn fail(&mut self, error: RuleConfigError) {
        if self.error.is_none() {
            tracing::debug!(%error, "rule configuration error recorded");
            self.error = Some(error);
        }
    }

    fn mark_replaced(&mut self, member: &MemberRef) {
        if !self.replaced.iter().any(|m| m.is_same_member(member)) {
            self.replaced.push(member.clone());
        }
    }

    fn pending_mut(&mut self, index: usize) -> Option<&mut PendingRule<T>> {
        match self.staged.get_mut(index) {
            Some(Staged::Pending(pending)) => Some(pending),
            _ => None,
        }
    }

    fn push_pending(&mut self, pending: PendingRule<T>) -> usize {
        self.dirty = true;
        self.staged.push(Staged::Pending(pending));
        self.staged.len() - 1
    }

    fn child_rules<V: Model>(
        &mut self,
        configure: impl FnOnce(&mut RuleBuilder<V>),
    ) -> Option<RuleSet<V>> {
        if self.error.is_some() {
            return None;
        }
        let mut child = RuleBuilder::<V>::with_options(Arc::clone(&self.registry), self.options.clone());
        configure(&mut child);
        match child.build_detached() {
            Ok(rules) => Some(rules),
            Err(error) => {
                self.fail(error);
                None
            }
        }
    }
}

impl<T> std::fmt::Debug for RuleBuilder<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleBuilder")
            .field("options", &self.options)
            .field("staged", &self.staged.len())
            .field("replaced", &self.replaced)
            .field("error", &self.error)
            .field("dirty", &self.dirty)
            .finish_non_exhaustive()
    }
}

/// Groups rules by member, in order of first appearance.
fn group_by_member<T>(rules: &[Rule<T>]) -> Vec<(MemberRef, Vec<Rule<T>>)> {
    let mut groups: Vec<(MemberRef, Vec<Rule<T>>)> = Vec::new();
    for rule in rules {
        match groups
            .iter_mut()
            .find(|(member, _)| member.is_same_member(rule.member()))
        {
            Some((_, group)) => group.push(rule.clone()),
            None => groups.push((rule.member().clone(), vec![rule.clone()])),
        }
    }
    groups
}

// ============================================================================
// SCOPE
// ============================================================================

/// Returned by `when_scope`; chains the matching `otherwise`.
pub struct Scope<'a, T> {
    builder: &'a mut RuleBuilder<T>,
}

impl<'a, T: Model> Scope<'a, T> {
    /// See [`RuleBuilder::otherwise`].
    pub fn otherwise(self, configure: impl FnOnce(&mut RuleBuilder<T>)) -> &'a mut RuleBuilder<T> {
        let builder = self.builder;
        builder.otherwise(configure)
    }

    /// See [`RuleBuilder::otherwise_async`].
    pub fn otherwise_async(
        self,
        configure: impl FnOnce(&mut RuleBuilder<T>),
    ) -> &'a mut RuleBuilder<T> {
        let builder = self.builder;
        builder.otherwise_async(configure)
    }

    /// Returns the builder without an `otherwise` branch.
    pub fn end(self) -> &'a mut RuleBuilder<T> {
        self.builder
    }
}

// ============================================================================
// PROPERTY RULE
// ============================================================================

/// Configures the rule opened by [`RuleBuilder::rule_for`].
///
/// Message methods apply to the most recent `check` target: the member rule,
/// or the last `must` rule.
pub struct PropertyRule<'a, T, V> {
    builder: &'a mut RuleBuilder<T>,
    binding: Arc<Binding<T, V>>,
    pending: usize,
    target: usize,
}

impl<T, V> PropertyRule<'_, T, V>
where
    T: Model,
    V: Send + Sync + 'static,
{
    /// Attaches a check to the member rule.
    pub fn check<C: Check<V>>(mut self, check: C) -> Self {
        let allow = self.builder.options.allow_duplicate_checks;
        let leaf = Arc::new(MemberCheck::new(Arc::clone(&self.binding), check));
        if let Some(pending) = self.builder.pending_mut(self.pending) {
            pending.attach(leaf, allow);
        }
        self.target = self.pending;
        self
    }

    /// Adds an independent predicate rule on the member.
    ///
    /// The rule is unconditional; `when` on this builder does not gate it.
    pub fn must<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&V) -> bool + Send + Sync + 'static,
    {
        self.independent(Predicate(predicate));
        self
    }

    /// Async [`PropertyRule::must`].
    pub fn must_async<F>(mut self, predicate: F) -> Self
    where
        F: for<'b> Fn(&'b V, &'b CancellationToken) -> BoxFuture<'b, bool> + Send + Sync + 'static,
    {
        self.independent(AsyncPredicate::new::<V>(predicate));
        self
    }

    fn independent<C: Check<V>>(&mut self, check: C) {
        let mut pending = PendingRule::new(self.binding.member().clone());
        pending.attach(
            Arc::new(MemberCheck::new(Arc::clone(&self.binding), check)),
            true,
        );
        if let Some(owner) = self.builder.pending_mut(self.pending) {
            owner.note_independent_rule();
        }
        self.target = self.builder.push_pending(pending);
    }

    /// Gates the member rule.
    pub fn when<F>(self, predicate: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        if let Some(pending) = self.builder.pending_mut(self.pending) {
            pending.set_condition(condition(predicate));
        }
        self
    }

    /// Gates the member rule with an async predicate.
    pub fn when_async<F>(self, predicate: F) -> Self
    where
        F: for<'b> Fn(&'b T, &'b CancellationToken) -> BoxFuture<'b, bool> + Send + Sync + 'static,
    {
        if let Some(pending) = self.builder.pending_mut(self.pending) {
            pending.set_async_condition(async_condition(predicate));
        }
        self
    }

    /// Transforms the value before every check of this rule.
    ///
    /// A member accepts one transform.
    pub fn transform<F>(self, transform: F) -> Self
    where
        F: Fn(&V) -> V + Send + Sync + 'static,
    {
        let member = self.binding.member().clone();
        if self.binding.set_transform(Arc::new(transform)) {
            self.builder.transforms.push(member);
            if let Some(pending) = self.builder.pending_mut(self.pending) {
                pending.mark_transform();
            }
        } else {
            self.builder.fail(RuleConfigError::DuplicateTransform {
                member: member.name().to_owned(),
            });
        }
        self
    }

    /// Applies child rules to the nested value.
    pub fn child_rules(self, configure: impl FnOnce(&mut RuleBuilder<V>)) -> Self
    where
        V: Model,
    {
        if let Some(rules) = self.builder.child_rules(configure) {
            let allow = self.builder.options.allow_duplicate_checks;
            let nested = NestedRules::new(self.binding.property().clone(), rules);
            if let Some(pending) = self.builder.pending_mut(self.pending) {
                pending.attach(Arc::new(nested), allow);
            }
        }
        self
    }

    /// Applies the rules `V` declares for itself to the nested value.
    pub fn child_rules_of(self) -> Self
    where
        V: ConfigureRules,
    {
        self.child_rules(V::configure)
    }

    // ------------------------------------------------------------------------
    // Message metadata
    // ------------------------------------------------------------------------

    fn message_mut(&mut self) -> Option<&mut MessageSpec<T>> {
        self.builder
            .pending_mut(self.target)
            .map(PendingRule::message_mut)
    }

    fn edit_message(mut self, edit: impl FnOnce(&mut MessageSpec<T>)) -> Self {
        if let Some(message) = self.message_mut() {
            edit(message);
        }
        self
    }

    /// Explicit message template; `{0}`… take the check's format argument.
    pub fn with_message(self, message: impl Into<String>) -> Self {
        let message = message.into();
        self.edit_message(|m| m.message = Some(message))
    }

    /// Message computed from the instance.
    pub fn with_message_fn<F>(self, resolver: F) -> Self
    where
        F: Fn(&T) -> Option<String> + Send + Sync + 'static,
    {
        self.edit_message(|m| m.resolver = Some(Arc::new(resolver)))
    }

    /// Key reported with failures instead of the member name.
    pub fn with_failure_key(self, key: impl Into<String>) -> Self {
        let key = key.into();
        self.edit_message(|m| m.failure_key = Some(key))
    }

    /// Resource key for message lookup.
    pub fn with_resource_key(self, key: impl Into<String>) -> Self {
        let key = key.into();
        self.edit_message(|m| m.resource_key = Some(key))
    }

    /// Resource type for message lookup.
    pub fn with_resource_type(self, resource: ResourceType) -> Self {
        self.edit_message(|m| m.resource_type = Some(resource))
    }

    /// Locale for message lookup.
    pub fn with_locale(self, locale: impl Into<String>) -> Self {
        let locale = locale.into();
        self.edit_message(|m| m.locale = Some(locale))
    }

    /// Message used when resource lookup fails.
    pub fn with_fallback_message(self, message: impl Into<String>) -> Self {
        let message = message.into();
        self.edit_message(|m| m.fallback = Some(message))
    }

    /// Skips `Member_Check` resource keys for this rule.
    pub fn without_conventional_keys(self) -> Self {
        self.edit_message(|m| m.use_conventional_keys = false)
    }
}

// ============================================================================
// EACH RULE
// ============================================================================

/// Configures the rule opened by [`RuleBuilder::rule_for_each`].
pub struct EachRule<'a, T, E> {
    builder: &'a mut RuleBuilder<T>,
    property: Property<T, Vec<E>>,
    pending: usize,
}

impl<T: Model, E: Model> EachRule<'_, T, E> {
    /// Applies child rules to every element.
    pub fn child_rules(self, configure: impl FnOnce(&mut RuleBuilder<E>)) -> Self {
        if let Some(rules) = self.builder.child_rules(configure) {
            let allow = self.builder.options.allow_duplicate_checks;
            let each = CollectionRules::new(self.property.clone(), rules);
            if let Some(pending) = self.builder.pending_mut(self.pending) {
                pending.attach(Arc::new(each), allow);
            }
        }
        self
    }

    /// Applies the rules `E` declares for itself to every element.
    pub fn child_rules_of(self) -> Self
    where
        E: ConfigureRules,
    {
        self.child_rules(E::configure)
    }

    /// Gates the whole collection on the parent instance.
    pub fn when<F>(self, predicate: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        if let Some(pending) = self.builder.pending_mut(self.pending) {
            pending.set_condition(condition(predicate));
        }
        self
    }

    /// Async [`EachRule::when`].
    pub fn when_async<F>(self, predicate: F) -> Self
    where
        F: for<'b> Fn(&'b T, &'b CancellationToken) -> BoxFuture<'b, bool> + Send + Sync + 'static,
    {
        if let Some(pending) = self.builder.pending_mut(self.pending) {
            pending.set_async_condition(async_condition(predicate));
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::{Length, Required};
    use crate::group::Merge;
    use crate::member::TypeToken;
    use crate::options::RegistrationMode;

    struct Login {
        user: String,
        password: String,
        sso: bool,
    }

    fn user() -> Property<Login, String> {
        Property::new("User", |l: &Login| &l.user)
    }

    fn password() -> Property<Login, String> {
        Property::new("Password", |l: &Login| &l.password)
    }

    fn builder() -> RuleBuilder<Login> {
        RuleBuilder::new(Arc::new(RuleRegistry::new()))
    }

    #[test]
    fn when_without_rule_is_recorded() {
        let mut rules = builder();
        rules.when(|l| l.sso);
        rules.rule_for(user()).check(Required);
        assert_eq!(rules.build().unwrap_err(), RuleConfigError::WhenWithoutRule);
    }

    #[test]
    fn otherwise_without_scope_is_recorded() {
        let mut rules = builder();
        rules.otherwise(|r| {
            r.rule_for(user()).check(Required);
        });
        assert_eq!(rules.build().unwrap_err(), RuleConfigError::OtherwiseWithoutWhen);
    }

    #[test]
    fn rule_for_between_scope_and_otherwise_clears_gate() {
        let mut rules = builder();
        rules.when_scope(|l| l.sso, |r| {
            r.rule_for(user()).check(Required);
        });
        rules.rule_for(password()).check(Required);
        rules.otherwise(|r| {
            r.rule_for(user()).check(Length::max(3));
        });
        assert_eq!(rules.build().unwrap_err(), RuleConfigError::OtherwiseWithoutWhen);
    }

    #[test]
    fn empty_scope_is_recorded() {
        let mut rules = builder();
        rules.when_scope(|l| l.sso, |_| {});
        assert_eq!(rules.build().unwrap_err(), RuleConfigError::EmptyScope);
    }

    #[test]
    fn first_error_wins() {
        let mut rules = builder();
        rules.otherwise(|_| {});
        rules.when_scope(|l| l.sso, |_| {});
        assert_eq!(rules.build().unwrap_err(), RuleConfigError::OtherwiseWithoutWhen);
    }

    #[test]
    fn gate_without_check_names_member() {
        let mut rules = builder();
        rules.rule_for(password()).when(|l| !l.sso);
        assert_eq!(
            rules.build().unwrap_err(),
            RuleConfigError::GateWithoutCheck {
                member: "Password".to_owned()
            }
        );
    }

    #[test]
    fn gate_without_check_is_placeholder_when_not_enforced() {
        let registry = Arc::new(RuleRegistry::new());
        let mut rules = RuleBuilder::with_options(
            Arc::clone(&registry),
            RuleOptions::default().with_consistency(false),
        );
        rules.rule_for(password()).when(|l: &Login| !l.sso);
        let set = rules.build().unwrap();
        assert_eq!(set.len(), 1);
        assert!(set.rules()[0].is_placeholder());
        assert!(set.rules()[0].is_conditional());
    }

    #[test]
    fn gate_only_rule_gates_registered_checks() {
        let registry = Arc::new(RuleRegistry::new());
        let mut first = RuleBuilder::new(Arc::clone(&registry));
        first.rule_for(password()).check(Required).check(Length::min(8));
        first.build().unwrap();

        let mut second = RuleBuilder::with_options(
            Arc::clone(&registry),
            RuleOptions::default().with_registration(RegistrationMode::Preserve),
        );
        second.rule_for(password()).when(|l: &Login| !l.sso);
        second.build().unwrap();

        let stored = registry.rule_set::<Login>();
        assert_eq!(stored.len(), 2);
        assert!(stored.iter().all(Rule::is_conditional));
    }

    #[test]
    fn must_is_not_gated_by_when() {
        let mut rules = builder();
        rules
            .rule_for(password())
            .check(Required)
            .must(|p| p.chars().any(|c| c.is_ascii_digit()))
            .when(|l| !l.sso);
        let set = rules.build().unwrap();

        let conditional: Vec<_> = set.iter().map(Rule::is_conditional).collect();
        assert_eq!(conditional, vec![true, false]);
    }

    #[test]
    fn second_build_returns_same_set() {
        let registry = Arc::new(RuleRegistry::new());
        let mut rules = RuleBuilder::new(Arc::clone(&registry));
        rules.rule_for(user()).check(Required);
        let first = rules.build().unwrap();
        let second = rules.build().unwrap();

        let keys = |set: &RuleSet<Login>| set.iter().map(Rule::unique_key).collect::<Vec<_>>();
        assert_eq!(keys(&first), keys(&second));
        assert_eq!(registry.rule_set::<Login>().len(), 1);
    }

    #[test]
    fn duplicate_transform_is_rejected() {
        let mut rules = builder();
        rules.rule_for(user()).transform(|u| u.trim().to_owned()).check(Required);
        rules.rule_for(user()).transform(|u| u.to_lowercase()).check(Length::max(12));
        assert_eq!(
            rules.build().unwrap_err(),
            RuleConfigError::DuplicateTransform {
                member: "User".to_owned()
            }
        );
    }

    #[test]
    fn replace_mode_drops_previous_rules_of_member() {
        let registry = Arc::new(RuleRegistry::new());
        registry
            .add_rules::<Login>(
                user().member(),
                vec![Rule::placeholder(user().member().clone())],
                Merge::Append,
            )
            .unwrap();

        let mut rules = RuleBuilder::new(Arc::clone(&registry));
        rules.rule_for(user()).check(Required);
        rules.build().unwrap();

        let stored = registry.rule_set::<Login>();
        assert_eq!(stored.len(), 1);
        assert!(!stored.rules()[0].is_placeholder());
    }

    #[test]
    fn gate_after_must_keeps_must_ungated() {
        let mut rules = builder();
        rules
            .rule_for(password())
            .must(|p| p.len() >= 8)
            .when(|l| !l.sso);
        let set = rules.build().unwrap();

        let shape: Vec<_> = set
            .iter()
            .map(|rule| (rule.is_placeholder(), rule.is_conditional()))
            .collect();
        assert_eq!(shape, vec![(true, true), (false, false)]);
    }

    #[test]
    fn must_only_chain_registers_no_placeholder() {
        let registry = Arc::new(RuleRegistry::new());
        let mut rules = RuleBuilder::new(Arc::clone(&registry));
        rules
            .rule_for(password())
            .must(|p| p.len() >= 8)
            .must(|p| p.chars().any(char::is_uppercase));
        rules.build().unwrap();

        let checks: Vec<_> = registry
            .enumerate_rules::<Login>()
            .iter()
            .map(|d| d.check)
            .collect();
        assert_eq!(checks, vec![Some("Must"), Some("Must")]);
    }

    #[test]
    fn failed_build_leaves_registry_untouched() {
        struct Unrelated;

        let registry = Arc::new(RuleRegistry::new());
        let mut rules = RuleBuilder::new(Arc::clone(&registry));
        rules.rule_for(user()).check(Required);
        rules
            .rule_for(password().declared_by(TypeToken::of::<Unrelated>()))
            .check(Required);

        assert!(matches!(
            rules.build().unwrap_err(),
            RuleConfigError::DeclaringTypeMismatch { .. }
        ));
        assert!(registry.rule_set::<Login>().is_empty());
        assert_eq!(registry.type_count(), 0);
    }
}
