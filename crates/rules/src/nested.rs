//! Nested and collection traversal
//!
//! A child rule set attached to a member runs as one leaf check of the
//! parent. [`CollectionRules`] runs it against every element of a `Vec`
//! member and tags failures with their position; [`NestedRules`] runs it
//! against a single nested value and only prefixes the path.
//!
//! Elements are visited in order and every failure is kept.

use std::any::TypeId;

use futures::FutureExt;
use futures::future::BoxFuture;

use crate::check::{LeafCheck, ValidationContext, Verdict};
use crate::error::EvaluationError;
use crate::evaluator::{ValidationReport, evaluate_rules, evaluate_rules_async};
use crate::member::{Model, Property};
use crate::message::FormatArg;
use crate::rule::RuleSet;

const SHORT_NAME: &str = "ChildRules";

/// Child rules applied to each element of a collection member.
pub(crate) struct CollectionRules<T, E> {
    property: Property<T, Vec<E>>,
    rules: RuleSet<E>,
    is_async: bool,
}

impl<T, E: Model> CollectionRules<T, E> {
    pub(crate) fn new(property: Property<T, Vec<E>>, rules: RuleSet<E>) -> Self {
        let is_async = rules.has_async();
        Self {
            property,
            rules,
            is_async,
        }
    }
}

impl<T: Model, E: Model> LeafCheck<T> for CollectionRules<T, E> {
    fn check_type(&self) -> TypeId {
        TypeId::of::<Self>()
    }

    fn short_name(&self) -> &'static str {
        SHORT_NAME
    }

    fn is_async(&self) -> bool {
        self.is_async
    }

    fn evaluate(
        &self,
        instance: &T,
        ctx: &ValidationContext<'_>,
    ) -> Result<Verdict, EvaluationError> {
        let member = self.property.member().name();
        let mut failures = Vec::new();
        for (index, element) in self.property.get(instance).iter().enumerate() {
            let inner = evaluate_rules(element, self.rules.rules(), ctx.messages())?;
            failures.extend(inner.into_iter().map(|f| f.within_collection(member, index)));
        }
        Ok(Verdict::Nested(failures))
    }

    fn evaluate_async<'a>(
        &'a self,
        instance: &'a T,
        ctx: &'a ValidationContext<'a>,
    ) -> BoxFuture<'a, Result<Verdict, EvaluationError>> {
        async move {
            let member = self.property.member().name();
            let mut failures = Vec::new();
            for (index, element) in self.property.get(instance).iter().enumerate() {
                let outcome = evaluate_rules_async(
                    element,
                    self.rules.rules(),
                    ctx.messages(),
                    ctx.cancellation(),
                )
                .await;
                match outcome {
                    Ok(inner) => {
                        failures.extend(inner.into_iter().map(|f| f.within_collection(member, index)));
                    }
                    Err(EvaluationError::Cancelled { member: at, collected }) => {
                        failures.extend(
                            collected
                                .into_failures()
                                .into_iter()
                                .map(|f| f.within_collection(member, index)),
                        );
                        return Err(EvaluationError::Cancelled {
                            member: at,
                            collected: ValidationReport::new(failures),
                        });
                    }
                    Err(error) => return Err(error),
                }
            }
            Ok(Verdict::Nested(failures))
        }
        .boxed()
    }

    fn format_arg(&self) -> Option<FormatArg> {
        None
    }

    fn format_message(&self, _member_name: &str) -> Option<String> {
        None
    }

    fn resource_name(&self) -> Option<&str> {
        None
    }

    fn allows_multiple(&self) -> bool {
        true
    }
}

/// Child rules applied to one nested value.
pub(crate) struct NestedRules<T, V> {
    property: Property<T, V>,
    rules: RuleSet<V>,
    is_async: bool,
}

impl<T, V: Model> NestedRules<T, V> {
    pub(crate) fn new(property: Property<T, V>, rules: RuleSet<V>) -> Self {
        let is_async = rules.has_async();
        Self {
            property,
            rules,
            is_async,
        }
    }
}

impl<T: Model, V: Model> LeafCheck<T> for NestedRules<T, V> {
    fn check_type(&self) -> TypeId {
        TypeId::of::<Self>()
    }

    fn short_name(&self) -> &'static str {
        SHORT_NAME
    }

    fn is_async(&self) -> bool {
        self.is_async
    }

    fn evaluate(
        &self,
        instance: &T,
        ctx: &ValidationContext<'_>,
    ) -> Result<Verdict, EvaluationError> {
        let member = self.property.member().name();
        let inner = evaluate_rules(self.property.get(instance), self.rules.rules(), ctx.messages())?;
        Ok(Verdict::Nested(
            inner.into_iter().map(|f| f.within_member(member)).collect(),
        ))
    }

    fn evaluate_async<'a>(
        &'a self,
        instance: &'a T,
        ctx: &'a ValidationContext<'a>,
    ) -> BoxFuture<'a, Result<Verdict, EvaluationError>> {
        async move {
            let member = self.property.member().name();
            let outcome = evaluate_rules_async(
                self.property.get(instance),
                self.rules.rules(),
                ctx.messages(),
                ctx.cancellation(),
            )
            .await;
            match outcome {
                Ok(inner) => Ok(Verdict::Nested(
                    inner.into_iter().map(|f| f.within_member(member)).collect(),
                )),
                Err(EvaluationError::Cancelled { member: at, collected }) => {
                    Err(EvaluationError::Cancelled {
                        member: at,
                        collected: ValidationReport::new(
                            collected
                                .into_failures()
                                .into_iter()
                                .map(|f| f.within_member(member))
                                .collect(),
                        ),
                    })
                }
                Err(error) => Err(error),
            }
        }
        .boxed()
    }

    fn format_arg(&self) -> Option<FormatArg> {
        None
    }

    fn format_message(&self, _member_name: &str) -> Option<String> {
        None
    }

    fn resource_name(&self) -> Option<&str> {
        None
    }

    fn allows_multiple(&self) -> bool {
        true
    }
}
