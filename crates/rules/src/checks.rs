//! Reference leaf checks
//!
//! A small set covering each format-argument shape: none ([`Required`]),
//! scalar ([`Pattern`]), pair ([`Length`], [`Range`]) and custom predicates
//! ([`Predicate`], [`AsyncPredicate`]).

use std::fmt::Display;

use futures::future::BoxFuture;
use regex::Regex;
use tokio_util::sync::CancellationToken;

use crate::check::{Check, ValidationContext};
use crate::message::FormatArg;

// ============================================================================
// REQUIRED
// ============================================================================

/// Values that can be "missing".
pub trait Presence {
    /// `true` if the value counts as provided.
    fn is_present(&self) -> bool;
}

impl Presence for String {
    fn is_present(&self) -> bool {
        !self.trim().is_empty()
    }
}

impl<T> Presence for Option<T> {
    fn is_present(&self) -> bool {
        self.is_some()
    }
}

impl<T> Presence for Vec<T> {
    fn is_present(&self) -> bool {
        !self.is_empty()
    }
}

/// The value must be present; blank strings are missing.
#[derive(Debug, Clone, Copy, Default)]
pub struct Required;

impl<V: Presence + ?Sized> Check<V> for Required {
    fn short_name(&self) -> &'static str {
        "Required"
    }

    fn is_valid(&self, value: &V, _: &ValidationContext<'_>) -> bool {
        value.is_present()
    }

    fn message_template(&self) -> &'static str {
        "The {0} field is required."
    }
}

// ============================================================================
// LENGTH
// ============================================================================

/// Character (or element) count within bounds, inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Length {
    min: usize,
    max: Option<usize>,
}

impl Length {
    /// `min..=max`.
    #[must_use]
    pub const fn between(min: usize, max: usize) -> Self {
        Self {
            min,
            max: Some(max),
        }
    }

    /// At least `min`.
    #[must_use]
    pub const fn min(min: usize) -> Self {
        Self { min, max: None }
    }

    /// At most `max`.
    #[must_use]
    pub const fn max(max: usize) -> Self {
        Self::between(0, max)
    }

    fn contains(&self, len: usize) -> bool {
        len >= self.min && self.max.is_none_or(|max| len <= max)
    }

    fn arg(&self) -> FormatArg {
        FormatArg::pair(self.min, self.max)
    }

    fn template(&self) -> &'static str {
        if self.max.is_some() {
            "The field {0} must have a length between {1} and {2}."
        } else {
            "The field {0} must have a length of at least {1}."
        }
    }
}

impl Check<String> for Length {
    fn short_name(&self) -> &'static str {
        "Length"
    }

    fn is_valid(&self, value: &String, _: &ValidationContext<'_>) -> bool {
        self.contains(value.chars().count())
    }

    fn message_template(&self) -> &'static str {
        self.template()
    }

    fn format_arg(&self) -> Option<FormatArg> {
        Some(self.arg())
    }
}

impl<E> Check<Vec<E>> for Length {
    fn short_name(&self) -> &'static str {
        "Length"
    }

    fn is_valid(&self, value: &Vec<E>, _: &ValidationContext<'_>) -> bool {
        self.contains(value.len())
    }

    fn message_template(&self) -> &'static str {
        self.template()
    }

    fn format_arg(&self) -> Option<FormatArg> {
        Some(self.arg())
    }
}

// ============================================================================
// RANGE
// ============================================================================

/// Value within `min..=max`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Range<N> {
    min: N,
    max: N,
}

impl<N> Range<N> {
    /// Creates an inclusive range.
    pub const fn new(min: N, max: N) -> Self {
        Self { min, max }
    }
}

impl<N> Check<N> for Range<N>
where
    N: PartialOrd + Display + Send + Sync + 'static,
{
    fn short_name(&self) -> &'static str {
        "Range"
    }

    fn is_valid(&self, value: &N, _: &ValidationContext<'_>) -> bool {
        *value >= self.min && *value <= self.max
    }

    fn message_template(&self) -> &'static str {
        "The field {0} must be between {1} and {2}."
    }

    fn format_arg(&self) -> Option<FormatArg> {
        Some(FormatArg::pair(&self.min, [&self.max]))
    }
}

// ============================================================================
// PATTERN
// ============================================================================

/// The whole string must match a regular expression.
#[derive(Debug, Clone)]
pub struct Pattern {
    regex: Regex,
}

impl Pattern {
    /// Compiles `pattern`.
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            regex: Regex::new(pattern)?,
        })
    }

    /// Returns the source pattern.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }
}

impl Check<String> for Pattern {
    fn short_name(&self) -> &'static str {
        "RegularExpression"
    }

    fn is_valid(&self, value: &String, _: &ValidationContext<'_>) -> bool {
        self.regex
            .find(value)
            .is_some_and(|m| m.start() == 0 && m.end() == value.len())
    }

    fn message_template(&self) -> &'static str {
        "The field {0} must match the regular expression '{1}'."
    }

    fn format_arg(&self) -> Option<FormatArg> {
        Some(FormatArg::scalar(self.regex.as_str()))
    }
}

// ============================================================================
// PREDICATES
// ============================================================================

/// A closure check; what `must` attaches.
#[derive(Clone)]
pub struct Predicate<F>(pub F);

impl<V, F> Check<V> for Predicate<F>
where
    V: ?Sized,
    F: Fn(&V) -> bool + Send + Sync + 'static,
{
    fn short_name(&self) -> &'static str {
        "Must"
    }

    fn is_valid(&self, value: &V, _: &ValidationContext<'_>) -> bool {
        (self.0)(value)
    }

    fn message_template(&self) -> &'static str {
        "The specified condition was not met for '{0}'."
    }

    fn allows_multiple(&self) -> bool {
        true
    }
}

/// An async closure check; what `must_async` attaches.
///
/// On the synchronous path it fails closed.
#[derive(Clone)]
pub struct AsyncPredicate<F>(F);

impl<F> AsyncPredicate<F> {
    /// Wraps an async closure.
    pub fn new<V>(f: F) -> Self
    where
        V: ?Sized,
        F: for<'a> Fn(&'a V, &'a CancellationToken) -> BoxFuture<'a, bool> + Send + Sync + 'static,
    {
        Self(f)
    }
}

impl<V, F> Check<V> for AsyncPredicate<F>
where
    V: Sync + ?Sized,
    F: for<'a> Fn(&'a V, &'a CancellationToken) -> BoxFuture<'a, bool> + Send + Sync + 'static,
{
    fn short_name(&self) -> &'static str {
        "MustAsync"
    }

    fn is_valid(&self, _: &V, _: &ValidationContext<'_>) -> bool {
        false
    }

    fn is_async(&self) -> bool {
        true
    }

    fn is_valid_async<'a>(
        &'a self,
        value: &'a V,
        ctx: &'a ValidationContext<'a>,
    ) -> BoxFuture<'a, bool>
    where
        V: Sync,
    {
        (self.0)(value, ctx.cancellation())
    }

    fn message_template(&self) -> &'static str {
        "The specified condition was not met for '{0}'."
    }

    fn allows_multiple(&self) -> bool {
        true
    }
}
