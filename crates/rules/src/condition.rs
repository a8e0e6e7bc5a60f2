//! Applicability conditions and their composition
//!
//! A rule applies when its condition holds for the owning instance. Scopes
//! opened with `when_scope`/`otherwise` wrap every rule they contain in a
//! gate; the helpers here build the composed conditions. Composition always
//! evaluates the outer gate first and short-circuits, on both the synchronous
//! and the asynchronous path.

use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use crate::member::Model;

/// Synchronous applicability condition.
pub type Condition<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

/// Asynchronous applicability condition.
///
/// Receives the cancellation token of the running evaluation.
pub type AsyncCondition<T> =
    Arc<dyn for<'a> Fn(&'a T, &'a CancellationToken) -> BoxFuture<'a, bool> + Send + Sync>;

/// Wraps a closure as a [`Condition`].
pub fn condition<T, F>(f: F) -> Condition<T>
where
    F: Fn(&T) -> bool + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Wraps a closure as an [`AsyncCondition`].
pub fn async_condition<T, F>(f: F) -> AsyncCondition<T>
where
    F: for<'a> Fn(&'a T, &'a CancellationToken) -> BoxFuture<'a, bool> + Send + Sync + 'static,
{
    Arc::new(f)
}

// ============================================================================
// GATE
// ============================================================================

/// The predicate of a conditional scope.
pub(crate) enum Gate<T> {
    Sync(Condition<T>),
    Async(AsyncCondition<T>),
}

impl<T: Model> Gate<T> {
    pub(crate) fn negated(&self) -> Self {
        match self {
            Self::Sync(c) => Self::Sync(not(Arc::clone(c))),
            Self::Async(c) => Self::Async(not_async(Arc::clone(c))),
        }
    }
}

impl<T> Clone for Gate<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Sync(c) => Self::Sync(Arc::clone(c)),
            Self::Async(c) => Self::Async(Arc::clone(c)),
        }
    }
}

// ============================================================================
// COMPOSITION
// ============================================================================

/// `gate(x) && inner(x)`; the gate alone when there is no inner condition.
pub(crate) fn all<T: Model>(gate: Condition<T>, inner: Option<Condition<T>>) -> Condition<T> {
    match inner {
        None => gate,
        Some(inner) => condition(move |x: &T| gate(x) && inner(x)),
    }
}

pub(crate) fn not<T: Model>(c: Condition<T>) -> Condition<T> {
    condition(move |x: &T| !c(x))
}

/// Async `first(x) && then(x)`; `then` is not polled when `first` fails.
pub(crate) fn all_async<T: Model>(
    first: AsyncCondition<T>,
    then: AsyncCondition<T>,
) -> AsyncCondition<T> {
    async_condition(move |x, token| {
        let first = Arc::clone(&first);
        let then = Arc::clone(&then);
        async move { first(x, token).await && then(x, token).await }.boxed()
    })
}

pub(crate) fn not_async<T: Model>(c: AsyncCondition<T>) -> AsyncCondition<T> {
    async_condition(move |x, token| {
        let c = Arc::clone(&c);
        async move { !c(x, token).await }.boxed()
    })
}

/// Runs a synchronous condition on the async path.
pub(crate) fn lift<T: Model>(c: Condition<T>) -> AsyncCondition<T> {
    async_condition(move |x, _token| {
        let holds = c(x);
        futures::future::ready(holds).boxed()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Flags {
        outer: bool,
        inner: bool,
    }

    fn counting(hits: &Arc<AtomicUsize>, result: bool) -> AsyncCondition<Flags> {
        let hits = Arc::clone(hits);
        async_condition(move |_flags: &Flags, _token| {
            hits.fetch_add(1, Ordering::SeqCst);
            futures::future::ready(result).boxed()
        })
    }

    #[test]
    fn all_evaluates_gate_then_inner() {
        let composed = all(
            condition(|f: &Flags| f.outer),
            Some(condition(|f: &Flags| f.inner)),
        );
        assert!(composed(&Flags {
            outer: true,
            inner: true
        }));
        assert!(!composed(&Flags {
            outer: true,
            inner: false
        }));
        assert!(!composed(&Flags {
            outer: false,
            inner: true
        }));
    }

    #[test]
    fn negated_gate_inverts() {
        let gate = Gate::Sync(condition(|f: &Flags| f.outer));
        let Gate::Sync(negated) = gate.negated() else {
            panic!("sync gate must negate to a sync gate");
        };
        assert!(negated(&Flags {
            outer: false,
            inner: false
        }));
    }

    #[tokio::test]
    async fn async_composition_short_circuits() {
        let hits = Arc::new(AtomicUsize::new(0));
        let composed = all_async(
            lift(condition(|f: &Flags| f.outer)),
            counting(&hits, true),
        );
        let token = CancellationToken::new();

        let closed = Flags {
            outer: false,
            inner: true,
        };
        assert!(!composed(&closed, &token).await);
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        let open = Flags {
            outer: true,
            inner: true,
        };
        assert!(composed(&open, &token).await);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn not_async_inverts_result() {
        let hits = Arc::new(AtomicUsize::new(0));
        let negated = not_async(counting(&hits, true));
        let flags = Flags {
            outer: true,
            inner: true,
        };
        assert!(!negated(&flags, &CancellationToken::new()).await);
    }
}
