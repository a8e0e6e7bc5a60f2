//! Rule registry
//!
//! Process-wide storage of committed rules, keyed by declaring type and
//! member. The registry is an explicit handle (`Arc<RuleRegistry>`) shared by
//! builders and validators.
//!
//! Every type's rules live in one immutable [`RuleGroupList`] behind an `Arc`.
//! Writers clone the list, change the clone and publish it while holding the
//! type's map entry; readers clone the `Arc` and never observe a half-merged
//! group.

use std::any::{Any, TypeId};
use std::convert::Infallible;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::builder::RuleBuilder;
use crate::error::RuleConfigError;
use crate::group::{Merge, RuleGroup, RuleGroupList};
use crate::member::{MemberRef, Model};
use crate::options::RuleOptions;
use crate::rule::{Rule, RuleDescriptor, RuleSet};
use crate::source::{ConfigureRules, RuleSource};

type ErasedList = Arc<dyn Any + Send + Sync>;

/// Thread-safe store of rules for every configured type.
///
/// # Examples
///
/// ```rust,ignore
/// use std::sync::Arc;
/// use nebula_rules::prelude::*;
///
/// let registry = Arc::new(RuleRegistry::new());
/// let mut rules = RuleBuilder::<Signup>::new(Arc::clone(&registry));
/// rules.rule_for(member!(Signup, email)).check(Required);
/// rules.build()?;
///
/// assert!(registry.has_leaf_check::<Signup>(&MemberRef::of::<Signup>("email")));
/// ```
pub struct RuleRegistry {
    types: DashMap<TypeId, ErasedList>,
}

impl RuleRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            types: DashMap::new(),
        }
    }

    // ------------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------------

    /// Merges rules into the member's group.
    ///
    /// Returns how many rules were added.
    ///
    /// # Errors
    ///
    /// [`RuleConfigError::DeclaringTypeMismatch`] if `member` is not declared
    /// on a type compatible with `T`.
    pub fn add_rules<T: Model>(
        &self,
        member: &MemberRef,
        rules: Vec<Rule<T>>,
        merge: Merge,
    ) -> Result<usize, RuleConfigError> {
        let incoming = rules.len();
        let added = self.try_update::<T, _, _>(|list| {
            list.merge(RuleGroup::with_rules(member.clone(), rules), merge)
        })?;
        tracing::debug!(
            member = %member,
            incoming,
            added,
            ?merge,
            "merged rules into registry"
        );
        Ok(added)
    }

    /// Replaces every rule of the member.
    ///
    /// Returns how many rules were dropped.
    ///
    /// # Errors
    ///
    /// See [`RuleRegistry::add_rules`].
    pub fn replace_rules<T: Model>(
        &self,
        member: &MemberRef,
        rules: Vec<Rule<T>>,
    ) -> Result<usize, RuleConfigError> {
        let count = rules.len();
        let dropped = self
            .try_update::<T, _, _>(|list| list.replace(RuleGroup::with_rules(member.clone(), rules)))?;
        tracing::debug!(member = %member, count, dropped, "replaced member rules");
        Ok(dropped)
    }

    /// Publishes a builder's member groups in one step.
    ///
    /// Members in `replaced` have their rules replaced; the others are merged
    /// with `merge`. Either every group is published or none is.
    pub(crate) fn commit<T: Model>(
        &self,
        groups: Vec<(MemberRef, Vec<Rule<T>>)>,
        replaced: &[MemberRef],
        merge: Merge,
    ) -> Result<(), RuleConfigError> {
        let members = groups.len();
        self.try_update::<T, _, _>(|list| {
            for (member, rules) in groups {
                let replace = replaced.iter().any(|m| m.is_same_member(&member));
                let group = RuleGroup::with_rules(member, rules);
                if replace {
                    list.replace(group)?;
                } else {
                    list.merge(group, merge)?;
                }
            }
            Ok(())
        })?;
        tracing::debug!(
            declaring_type = std::any::type_name::<T>(),
            members,
            "committed built rules"
        );
        Ok(())
    }

    /// Removes every rule of the member; returns the count.
    pub fn remove_all<T: Model>(&self, member: &MemberRef) -> usize {
        let removed = self.update::<T, _>(|list| list.remove_member(member));
        tracing::debug!(member = %member, removed, "removed member rules");
        removed
    }

    /// Removes the member's rules whose check is of kind `C`; returns the count.
    pub fn remove_checks<T: Model, C: 'static>(&self, member: &MemberRef) -> usize {
        let removed = self.update::<T, _>(|list| list.remove_checks(member, TypeId::of::<C>()));
        tracing::debug!(
            member = %member,
            check = std::any::type_name::<C>(),
            removed,
            "removed checks"
        );
        removed
    }

    /// Removes the rules of every member matching `predicate`; returns the count.
    pub fn remove_where<T: Model>(&self, predicate: impl FnMut(&MemberRef) -> bool) -> usize {
        let removed = self.update::<T, _>(|list| list.remove_where(predicate));
        tracing::debug!(
            declaring_type = std::any::type_name::<T>(),
            removed,
            "removed rules by predicate"
        );
        removed
    }

    /// Drops every rule of `T`; returns the count.
    pub fn clear<T: Model>(&self) -> usize {
        let removed = self
            .types
            .remove(&TypeId::of::<T>())
            .and_then(|(_, list)| downcast::<T>(list))
            .map_or(0, |list| list.rules().count());
        tracing::debug!(
            declaring_type = std::any::type_name::<T>(),
            removed,
            "cleared type rules"
        );
        removed
    }

    /// Merges rules supplied by a discovery source, skipping identical checks.
    ///
    /// Returns how many rules were added.
    ///
    /// # Errors
    ///
    /// See [`RuleRegistry::add_rules`].
    pub fn register_discovered<T: Model>(
        &self,
        source: &dyn RuleSource<T>,
    ) -> Result<usize, RuleConfigError> {
        let mut groups: Vec<(MemberRef, Vec<Rule<T>>)> = Vec::new();
        for discovered in source.discover() {
            let rule = discovered.into_rule();
            match groups
                .iter_mut()
                .find(|(member, _)| member.is_same_member(rule.member()))
            {
                Some((_, rules)) => rules.push(rule),
                None => groups.push((rule.member().clone(), vec![rule])),
            }
        }

        let mut added = 0;
        for (member, rules) in groups {
            added += self.add_rules(&member, rules, Merge::SkipIdentical)?;
        }
        Ok(added)
    }

    /// Builds and registers the rules `T` declares for itself.
    ///
    /// # Errors
    ///
    /// The first configuration error recorded while building.
    pub fn configure<T: ConfigureRules>(self: &Arc<Self>) -> Result<RuleSet<T>, RuleConfigError> {
        self.configure_with::<T>(RuleOptions::default())
    }

    /// [`RuleRegistry::configure`] with explicit options.
    ///
    /// # Errors
    ///
    /// See [`RuleRegistry::configure`].
    pub fn configure_with<T: ConfigureRules>(
        self: &Arc<Self>,
        options: RuleOptions,
    ) -> Result<RuleSet<T>, RuleConfigError> {
        let mut builder = RuleBuilder::<T>::with_options(Arc::clone(self), options);
        T::configure(&mut builder);
        builder.build()
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    /// Snapshot of `T`'s groups, if any rule is registered.
    #[must_use]
    pub fn rules_for<T: Model>(&self) -> Option<Arc<RuleGroupList<T>>> {
        self.types
            .get(&TypeId::of::<T>())
            .and_then(|entry| downcast::<T>(Arc::clone(entry.value())))
            .filter(|list| !list.is_empty())
    }

    /// Every rule of `T` as one ordered set.
    #[must_use]
    pub fn rule_set<T: Model>(&self) -> RuleSet<T> {
        self.rules_for::<T>()
            .map(|list| RuleSet::new(list.rules().cloned().collect()))
            .unwrap_or_default()
    }

    /// Diagnostic summaries of `T`'s rules.
    #[must_use]
    pub fn enumerate_rules<T: Model>(&self) -> Vec<RuleDescriptor> {
        self.rules_for::<T>()
            .map(|list| list.rules().map(Rule::describe).collect())
            .unwrap_or_default()
    }

    /// `true` if a rule of the member matches `filter`.
    pub fn contains<T: Model>(&self, member: &MemberRef, filter: impl Fn(&Rule<T>) -> bool) -> bool {
        self.rules_for::<T>().is_some_and(|list| {
            list.group(member)
                .is_some_and(|group| group.rules().iter().any(&filter))
        })
    }

    /// `true` if any rule of `T` matches `filter`.
    pub fn contains_any<T: Model>(&self, filter: impl Fn(&Rule<T>) -> bool) -> bool {
        self.rules_for::<T>()
            .is_some_and(|list| list.rules().any(filter))
    }

    /// `true` if the member has at least one rule with a check.
    #[must_use]
    pub fn has_leaf_check<T: Model>(&self, member: &MemberRef) -> bool {
        self.contains::<T>(member, |rule| !rule.is_placeholder())
    }

    /// Number of types with registered rules.
    #[must_use]
    pub fn type_count(&self) -> usize {
        self.types.len()
    }

    pub(crate) fn leaf_check_rules<T: Model>(&self, member: &MemberRef) -> Vec<Rule<T>> {
        self.rules_for::<T>()
            .and_then(|list| {
                list.group(member).map(|group| {
                    group
                        .rules()
                        .iter()
                        .filter(|rule| !rule.is_placeholder())
                        .cloned()
                        .collect()
                })
            })
            .unwrap_or_default()
    }

    /// Applies `f` to a private copy of `T`'s list and publishes the result.
    ///
    /// The entry guard is held across the whole read-modify-write. Nothing is
    /// published when `f` fails, and a type without rules gets no entry
    /// unless `f` leaves rules behind.
    fn try_update<T: Model, R, E>(
        &self,
        f: impl FnOnce(&mut RuleGroupList<T>) -> Result<R, E>,
    ) -> Result<R, E> {
        match self.types.entry(TypeId::of::<T>()) {
            Entry::Occupied(mut entry) => {
                let mut list = downcast::<T>(Arc::clone(entry.get()))
                    .map(|current| RuleGroupList::clone(&current))
                    .unwrap_or_default();
                let out = f(&mut list)?;
                entry.insert(Arc::new(list) as ErasedList);
                Ok(out)
            }
            Entry::Vacant(entry) => {
                let mut list = RuleGroupList::<T>::new();
                let out = f(&mut list)?;
                if !list.is_empty() {
                    entry.insert(Arc::new(list) as ErasedList);
                }
                Ok(out)
            }
        }
    }

    fn update<T: Model, R>(&self, f: impl FnOnce(&mut RuleGroupList<T>) -> R) -> R {
        let Ok(out) = self.try_update::<T, R, Infallible>(|list| Ok(f(list)));
        out
    }
}

impl Default for RuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleRegistry")
            .field("types", &self.types.len())
            .finish()
    }
}

fn downcast<T: Model>(list: ErasedList) -> Option<Arc<RuleGroupList<T>>> {
    list.downcast::<RuleGroupList<T>>().ok()
}
