//! # nebula-rules
//!
//! Conditional rule composition and failure-message resolution for model
//! validation.
//!
//! Rules are composed once per model type with a [`RuleBuilder`], stored in a
//! shared [`RuleRegistry`], and evaluated by a [`Validator`]. The engine
//! decides which leaf checks apply to an instance (conditionally, possibly
//! asynchronously), runs them, descends into nested values and collections,
//! and resolves one display message per failure.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use nebula_rules::prelude::*;
//!
//! struct Signup { email: String, company: String, is_business: bool }
//!
//! let registry = Arc::new(RuleRegistry::new());
//! let mut rules = RuleBuilder::<Signup>::new(Arc::clone(&registry));
//! rules.rule_for(member!(Signup, email as "Email")).check(Required);
//! rules.when_scope(|s| s.is_business, |r| {
//!     r.rule_for(member!(Signup, company as "Company")).check(Required);
//! });
//! rules.build()?;
//!
//! let report = Validator::<Signup>::from_registry(&registry).validate(&signup)?;
//! assert!(report.is_valid());
//! ```
//!
//! ## Modules
//!
//! - [`builder`]: fluent composition with `when`/`otherwise`/`must` scoping
//! - [`registry`]: thread-safe storage with merge and removal
//! - [`evaluator`]: sync and cancellable async evaluation
//! - [`message`]: the message resolution chain
//! - [`checks`]: reference leaf checks
//!
//! [`RuleBuilder`]: builder::RuleBuilder
//! [`RuleRegistry`]: registry::RuleRegistry
//! [`Validator`]: evaluator::Validator

pub mod builder;
pub mod check;
pub mod checks;
pub mod condition;
pub mod error;
pub mod evaluator;
pub mod group;
mod macros;
pub mod member;
pub mod message;
mod nested;
pub mod options;
pub mod pending;
pub mod prelude;
pub mod registry;
pub mod rule;
pub mod source;
