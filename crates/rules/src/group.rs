//! Rule storage units
//!
//! [`RuleGroup`] holds the rules of one member; [`RuleGroupList`] holds every
//! group of one declaring type. Both are plain values: the registry swaps
//! whole lists and never mutates a published one.

use std::any::TypeId;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::RuleConfigError;
use crate::member::{MemberRef, TypeToken};
use crate::rule::Rule;

/// How incoming rules combine with existing ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Merge {
    /// Keep every incoming rule.
    #[default]
    Append,
    /// Drop incoming rules whose check duplicates an existing one.
    SkipIdentical,
}

// ============================================================================
// RULE GROUP
// ============================================================================

/// All rules for one member.
pub struct RuleGroup<T> {
    member: MemberRef,
    rules: Vec<Rule<T>>,
}

impl<T> RuleGroup<T> {
    /// Creates an empty group.
    #[must_use]
    pub fn new(member: MemberRef) -> Self {
        Self {
            member,
            rules: Vec::new(),
        }
    }

    /// Creates a group holding `rules`.
    #[must_use]
    pub fn with_rules(member: MemberRef, rules: Vec<Rule<T>>) -> Self {
        Self { member, rules }
    }

    /// The grouped member.
    #[must_use]
    pub fn member(&self) -> &MemberRef {
        &self.member
    }

    /// Rules in configuration order.
    #[must_use]
    pub fn rules(&self) -> &[Rule<T>] {
        &self.rules
    }

    /// Number of rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// `true` if the group holds no rules.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Adds a rule; returns `false` if it was skipped.
    ///
    /// A rule already present (same unique key) is always skipped. Under
    /// [`Merge::SkipIdentical`] a rule whose check is identical to an existing
    /// check is skipped too.
    pub fn push(&mut self, rule: Rule<T>, merge: Merge) -> bool {
        if self
            .rules
            .iter()
            .any(|r| r.unique_key() == rule.unique_key())
        {
            return false;
        }
        if merge == Merge::SkipIdentical
            && let Some(incoming) = rule.check()
            && self
                .rules
                .iter()
                .filter_map(Rule::check)
                .any(|existing| existing.is_identical(incoming.as_ref()))
        {
            return false;
        }
        self.rules.push(rule);
        true
    }

    /// Removes rules whose check is of the given kind; returns the count.
    pub fn remove_checks_of(&mut self, check_type: TypeId) -> usize {
        self.retain(|r| r.check().is_none_or(|c| c.check_type() != check_type))
    }

    /// Keeps rules matching `keep`; returns the count removed.
    pub fn retain(&mut self, keep: impl FnMut(&Rule<T>) -> bool) -> usize {
        let before = self.rules.len();
        self.rules.retain(keep);
        before - self.rules.len()
    }

    /// `true` if any rule carries a check.
    #[must_use]
    pub fn has_leaf_check(&self) -> bool {
        self.rules.iter().any(|r| !r.is_placeholder())
    }
}

impl<T> Clone for RuleGroup<T> {
    fn clone(&self) -> Self {
        Self {
            member: self.member.clone(),
            rules: self.rules.clone(),
        }
    }
}

impl<T> fmt::Debug for RuleGroup<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleGroup")
            .field("member", &self.member)
            .field("rules", &self.rules)
            .finish()
    }
}

// ============================================================================
// RULE GROUP LIST
// ============================================================================

/// All rule groups of one declaring type.
pub struct RuleGroupList<T> {
    declaring_type: TypeToken,
    groups: Vec<RuleGroup<T>>,
}

impl<T: 'static> RuleGroupList<T> {
    /// Creates an empty list for `T`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            declaring_type: TypeToken::of::<T>(),
            groups: Vec::new(),
        }
    }
}

impl<T: 'static> Default for RuleGroupList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> RuleGroupList<T> {
    /// The declaring type.
    #[must_use]
    pub fn declaring_type(&self) -> &TypeToken {
        &self.declaring_type
    }

    /// Groups in registration order.
    #[must_use]
    pub fn groups(&self) -> &[RuleGroup<T>] {
        &self.groups
    }

    /// The group of `member`.
    #[must_use]
    pub fn group(&self, member: &MemberRef) -> Option<&RuleGroup<T>> {
        self.groups.iter().find(|g| g.member.is_same_member(member))
    }

    /// Every rule, group by group.
    pub fn rules(&self) -> impl Iterator<Item = &Rule<T>> {
        self.groups.iter().flat_map(|g| g.rules.iter())
    }

    /// `true` if no group is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Merges `group` into the same-member group, or appends it.
    ///
    /// Returns how many rules were added.
    ///
    /// # Errors
    ///
    /// [`RuleConfigError::DeclaringTypeMismatch`] if the group's member is
    /// declared on a type incompatible with this list.
    pub fn merge(&mut self, group: RuleGroup<T>, merge: Merge) -> Result<usize, RuleConfigError> {
        self.ensure_declared_here(&group.member)?;
        let RuleGroup { member, rules } = group;
        let index = match self.position(&member) {
            Some(index) => index,
            None => {
                self.groups.push(RuleGroup::new(member));
                self.groups.len() - 1
            }
        };
        let target = &mut self.groups[index];
        let mut added = 0;
        for rule in rules {
            if target.push(rule, merge) {
                added += 1;
            }
        }
        self.drop_empty();
        Ok(added)
    }

    /// Replaces the rules of the group's member.
    ///
    /// Returns how many rules were dropped.
    ///
    /// # Errors
    ///
    /// See [`RuleGroupList::merge`].
    pub fn replace(&mut self, group: RuleGroup<T>) -> Result<usize, RuleConfigError> {
        self.ensure_declared_here(&group.member)?;
        let removed = match self.position(&group.member) {
            Some(index) => {
                let removed = self.groups[index].len();
                self.groups[index] = group;
                removed
            }
            None => {
                self.groups.push(group);
                0
            }
        };
        self.drop_empty();
        Ok(removed)
    }

    /// Removes the member's group; returns the rule count removed.
    pub fn remove_member(&mut self, member: &MemberRef) -> usize {
        self.position(member)
            .map_or(0, |index| self.groups.remove(index).len())
    }

    /// Removes the member's checks of one kind; returns the count.
    pub fn remove_checks(&mut self, member: &MemberRef, check_type: TypeId) -> usize {
        let removed = self
            .position(member)
            .map_or(0, |index| self.groups[index].remove_checks_of(check_type));
        self.drop_empty();
        removed
    }

    /// Removes every group whose member matches; returns the rule count.
    pub fn remove_where(&mut self, mut predicate: impl FnMut(&MemberRef) -> bool) -> usize {
        let mut removed = 0;
        self.groups.retain(|g| {
            let hit = predicate(&g.member);
            if hit {
                removed += g.len();
            }
            !hit
        });
        removed
    }

    fn position(&self, member: &MemberRef) -> Option<usize> {
        self.groups
            .iter()
            .position(|g| g.member.is_same_member(member))
    }

    fn ensure_declared_here(&self, member: &MemberRef) -> Result<(), RuleConfigError> {
        if self
            .declaring_type
            .is_compatible_with(member.declaring_type())
        {
            Ok(())
        } else {
            Err(RuleConfigError::DeclaringTypeMismatch {
                expected: self.declaring_type.name(),
                found: member.declaring_type().name(),
            })
        }
    }

    fn drop_empty(&mut self) {
        self.groups.retain(|g| !g.is_empty());
    }
}

impl<T> Clone for RuleGroupList<T> {
    fn clone(&self) -> Self {
        Self {
            declaring_type: self.declaring_type.clone(),
            groups: self.groups.clone(),
        }
    }
}

impl<T> fmt::Debug for RuleGroupList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleGroupList")
            .field("declaring_type", &self.declaring_type)
            .field("groups", &self.groups)
            .finish()
    }
}
