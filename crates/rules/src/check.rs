//! Leaf-check contract
//!
//! A leaf check is the atomic pass/fail unit the engine composes but never
//! looks inside. Check authors implement the value-level [`Check<V>`]; the
//! builder adapts it to the instance-level, object-safe [`LeafCheck<T>`] by
//! pairing it with the member accessor.
//!
//! # Examples
//!
//! ```rust,ignore
//! use nebula_rules::check::{Check, ValidationContext};
//!
//! struct NotBlank;
//!
//! impl Check<String> for NotBlank {
//!     fn short_name(&self) -> &'static str { "NotBlank" }
//!     fn is_valid(&self, value: &String, _: &ValidationContext<'_>) -> bool {
//!         !value.trim().is_empty()
//!     }
//! }
//! ```

use std::any::TypeId;
use std::fmt;
use std::sync::{Arc, OnceLock};

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use crate::error::EvaluationError;
use crate::evaluator::Failure;
use crate::member::{MemberRef, Model, Property};
use crate::message::{FormatArg, MessageResolver, format_positional};

/// Template used when a check does not supply its own.
pub const DEFAULT_TEMPLATE: &str = "The field {0} is invalid.";

// ============================================================================
// VALIDATION CONTEXT
// ============================================================================

/// What a running check can see besides its value.
#[derive(Debug, Clone, Copy)]
pub struct ValidationContext<'a> {
    member: &'a MemberRef,
    messages: &'a MessageResolver,
    cancellation: &'a CancellationToken,
}

impl<'a> ValidationContext<'a> {
    pub(crate) fn new(
        member: &'a MemberRef,
        messages: &'a MessageResolver,
        cancellation: &'a CancellationToken,
    ) -> Self {
        Self {
            member,
            messages,
            cancellation,
        }
    }

    /// The member being checked.
    #[must_use]
    pub fn member(&self) -> &'a MemberRef {
        self.member
    }

    /// The resolver used for failures of nested rule sets.
    #[must_use]
    pub fn messages(&self) -> &'a MessageResolver {
        self.messages
    }

    /// Cancellation signal of the running evaluation.
    #[must_use]
    pub fn cancellation(&self) -> &'a CancellationToken {
        self.cancellation
    }
}

// ============================================================================
// VALUE-LEVEL CHECK
// ============================================================================

/// Pass/fail logic over a member value.
pub trait Check<V: ?Sized>: Send + Sync + 'static {
    /// Short kind name, used in conventional resource keys (`Member_ShortName`).
    fn short_name(&self) -> &'static str;

    /// Synchronous evaluation.
    fn is_valid(&self, value: &V, ctx: &ValidationContext<'_>) -> bool;

    /// Whether the check must run on the async path.
    fn is_async(&self) -> bool {
        false
    }

    /// Asynchronous evaluation; defaults to [`Check::is_valid`].
    fn is_valid_async<'a>(
        &'a self,
        value: &'a V,
        ctx: &'a ValidationContext<'a>,
    ) -> BoxFuture<'a, bool>
    where
        V: Sync,
    {
        futures::future::ready(self.is_valid(value, ctx)).boxed()
    }

    /// Built-in message template; `{0}` is the member name.
    fn message_template(&self) -> &'static str {
        DEFAULT_TEMPLATE
    }

    /// Argument used to format explicit and resource messages.
    fn format_arg(&self) -> Option<FormatArg> {
        None
    }

    /// The built-in message for a member.
    ///
    /// Positional arguments are the member name followed by the normalized
    /// format argument.
    fn format_message(&self, member_name: &str) -> Option<String> {
        let mut args = vec![member_name.to_owned()];
        if let Some(arg) = self.format_arg() {
            args.extend(arg.normalize());
        }
        format_positional(self.message_template(), &args).ok()
    }

    /// Resource key the check declares for itself.
    fn resource_name(&self) -> Option<&str> {
        None
    }

    /// Whether several checks of this kind may sit on one member.
    fn allows_multiple(&self) -> bool {
        false
    }
}

// ============================================================================
// INSTANCE-LEVEL CHECK
// ============================================================================

/// Outcome of one leaf check.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    /// The value passed.
    Valid,
    /// The value failed; the evaluator resolves the message.
    Invalid,
    /// A nested rule set ran and reported its own failures.
    Nested(Vec<Failure>),
}

impl Verdict {
    /// `true` unless the verdict carries a failure.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        match self {
            Self::Valid => true,
            Self::Invalid => false,
            Self::Nested(failures) => failures.is_empty(),
        }
    }
}

impl From<bool> for Verdict {
    fn from(valid: bool) -> Self {
        if valid { Self::Valid } else { Self::Invalid }
    }
}

/// A check bound to a member of `T`.
///
/// This is what a [`Rule`](crate::rule::Rule) holds.
pub trait LeafCheck<T>: Send + Sync {
    /// Identity of the underlying check kind.
    fn check_type(&self) -> TypeId;

    /// See [`Check::short_name`].
    fn short_name(&self) -> &'static str;

    /// See [`Check::is_async`].
    fn is_async(&self) -> bool;

    /// Runs the check on the synchronous path.
    fn evaluate(&self, instance: &T, ctx: &ValidationContext<'_>)
    -> Result<Verdict, EvaluationError>;

    /// Runs the check on the asynchronous path.
    fn evaluate_async<'a>(
        &'a self,
        instance: &'a T,
        ctx: &'a ValidationContext<'a>,
    ) -> BoxFuture<'a, Result<Verdict, EvaluationError>>;

    /// See [`Check::format_arg`].
    fn format_arg(&self) -> Option<FormatArg>;

    /// See [`Check::format_message`].
    fn format_message(&self, member_name: &str) -> Option<String>;

    /// See [`Check::resource_name`].
    fn resource_name(&self) -> Option<&str>;

    /// See [`Check::allows_multiple`].
    fn allows_multiple(&self) -> bool;

    /// Whether `other` duplicates this check on the same member.
    fn is_identical(&self, other: &dyn LeafCheck<T>) -> bool {
        self.check_type() == other.check_type() && !self.allows_multiple()
    }
}

impl<T> fmt::Debug for dyn LeafCheck<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LeafCheck")
            .field("short_name", &self.short_name())
            .field("is_async", &self.is_async())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// MEMBER BINDING
// ============================================================================

pub(crate) type Transform<V> = Arc<dyn Fn(&V) -> V + Send + Sync>;

/// A member accessor plus its optional before-validation transform.
///
/// Shared by every check opened through one `rule_for`.
pub(crate) struct Binding<T, V> {
    property: Property<T, V>,
    transform: OnceLock<Transform<V>>,
}

impl<T, V> Binding<T, V> {
    pub(crate) fn new(property: Property<T, V>) -> Self {
        Self {
            property,
            transform: OnceLock::new(),
        }
    }

    pub(crate) fn property(&self) -> &Property<T, V> {
        &self.property
    }

    pub(crate) fn member(&self) -> &MemberRef {
        self.property.member()
    }

    /// Returns `false` if a transform was already set.
    pub(crate) fn set_transform(&self, transform: Transform<V>) -> bool {
        self.transform.set(transform).is_ok()
    }

    fn transform(&self) -> Option<&Transform<V>> {
        self.transform.get()
    }
}

/// Adapts a value-level [`Check`] to a [`LeafCheck`] over the owner.
pub(crate) struct MemberCheck<T, V, C> {
    binding: Arc<Binding<T, V>>,
    check: C,
}

impl<T, V, C> MemberCheck<T, V, C> {
    pub(crate) fn new(binding: Arc<Binding<T, V>>, check: C) -> Self {
        Self { binding, check }
    }
}

impl<T, V, C> LeafCheck<T> for MemberCheck<T, V, C>
where
    T: Model,
    V: Send + Sync + 'static,
    C: Check<V>,
{
    fn check_type(&self) -> TypeId {
        TypeId::of::<C>()
    }

    fn short_name(&self) -> &'static str {
        self.check.short_name()
    }

    fn is_async(&self) -> bool {
        self.check.is_async()
    }

    fn evaluate(
        &self,
        instance: &T,
        ctx: &ValidationContext<'_>,
    ) -> Result<Verdict, EvaluationError> {
        if self.check.is_async() {
            return Err(EvaluationError::AsyncInSyncPath {
                member: self.binding.member().name().to_owned(),
            });
        }
        let value = self.binding.property().get(instance);
        let valid = match self.binding.transform() {
            Some(transform) => self.check.is_valid(&transform(value), ctx),
            None => self.check.is_valid(value, ctx),
        };
        Ok(valid.into())
    }

    fn evaluate_async<'a>(
        &'a self,
        instance: &'a T,
        ctx: &'a ValidationContext<'a>,
    ) -> BoxFuture<'a, Result<Verdict, EvaluationError>> {
        async move {
            let value = self.binding.property().get(instance);
            let valid = match self.binding.transform() {
                Some(transform) => {
                    let owned = transform(value);
                    self.check.is_valid_async(&owned, ctx).await
                }
                None => self.check.is_valid_async(value, ctx).await,
            };
            Ok(valid.into())
        }
        .boxed()
    }

    fn format_arg(&self) -> Option<FormatArg> {
        self.check.format_arg()
    }

    fn format_message(&self, member_name: &str) -> Option<String> {
        self.check.format_message(member_name)
    }

    fn resource_name(&self) -> Option<&str> {
        self.check.resource_name()
    }

    fn allows_multiple(&self) -> bool {
        self.check.allows_multiple()
    }
}
