//! Prelude module for convenient imports.
//!
//! ```rust,ignore
//! use nebula_rules::prelude::*;
//! ```

pub use crate::builder::{EachRule, PropertyRule, RuleBuilder, Scope};
pub use crate::check::{Check, LeafCheck, ValidationContext, Verdict};
pub use crate::checks::{AsyncPredicate, Length, Pattern, Predicate, Presence, Range, Required};
pub use crate::error::{EvaluationError, RuleConfigError};
pub use crate::evaluator::{Failure, ValidationReport, Validator};
pub use crate::group::Merge;
pub use crate::member::{MemberRef, Model, Property, TypeToken};
pub use crate::member;
pub use crate::message::{FormatArg, Localizer, MessageResolver, ResourceType};
pub use crate::options::{RegistrationMode, RuleOptions};
pub use crate::registry::RuleRegistry;
pub use crate::rule::{Rule, RuleSet};
pub use crate::source::{ConfigureRules, DiscoveredRule, RuleSource};
