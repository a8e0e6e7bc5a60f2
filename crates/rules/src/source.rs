//! Rule sources
//!
//! Two ways to feed the registry besides calling the builder directly:
//! a discovery collaborator that hands over `(member, check)` pairs found in
//! model declarations, and types that describe their own rules through
//! [`ConfigureRules`].

use std::sync::Arc;

use crate::builder::RuleBuilder;
use crate::check::{Binding, Check, LeafCheck, MemberCheck};
use crate::member::{MemberRef, Model, Property};
use crate::rule::Rule;

/// A type that declares its own rules.
///
/// # Examples
///
/// ```rust,ignore
/// use nebula_rules::prelude::*;
///
/// struct Address { city: String }
///
/// impl ConfigureRules for Address {
///     fn configure(rules: &mut RuleBuilder<Self>) {
///         rules.rule_for(member!(Address, city)).check(Required);
///     }
/// }
///
/// let set = registry.configure::<Address>()?;
/// ```
pub trait ConfigureRules: Model + Sized {
    /// Adds this type's rules to `rules`.
    fn configure(rules: &mut RuleBuilder<Self>);
}

/// A check found on a member by a discovery collaborator.
pub struct DiscoveredRule<T> {
    member: MemberRef,
    check: Arc<dyn LeafCheck<T>>,
}

impl<T: Model> DiscoveredRule<T> {
    /// Binds `check` to `property`.
    pub fn new<V, C>(property: Property<T, V>, check: C) -> Self
    where
        V: Send + Sync + 'static,
        C: Check<V>,
    {
        let member = property.member().clone();
        let binding = Arc::new(Binding::new(property));
        Self {
            member,
            check: Arc::new(MemberCheck::new(binding, check)),
        }
    }

    /// Wraps an already adapted check.
    pub fn from_leaf(member: MemberRef, check: Arc<dyn LeafCheck<T>>) -> Self {
        Self { member, check }
    }

    /// The member the check was found on.
    #[must_use]
    pub fn member(&self) -> &MemberRef {
        &self.member
    }

    pub(crate) fn into_rule(self) -> Rule<T> {
        Rule::new(self.member, self.check)
    }
}

/// Supplies discovered checks for `T`.
pub trait RuleSource<T>: Send + Sync {
    /// Every check found on `T`'s members, in declaration order.
    fn discover(&self) -> Vec<DiscoveredRule<T>>;
}

impl<T, F> RuleSource<T> for F
where
    F: Fn() -> Vec<DiscoveredRule<T>> + Send + Sync,
{
    fn discover(&self) -> Vec<DiscoveredRule<T>> {
        self()
    }
}
