//! Failure message resolution
//!
//! [`MessageResolver::resolve`] turns a failed check into exactly one display
//! string. Sources are tried in priority order and each one may fail
//! silently, handing over to the next:
//!
//! 1. the rule's message function;
//! 2. the rule's explicit message, formatted with the check's format argument
//!    (or the member name when the check has none);
//! 3. a resource lookup through the injected [`Localizer`], then the resource
//!    type's static table;
//! 4. the rule's fallback message;
//! 5. the check's own default message;
//! 6. `Invalid value for {member}`.
//!
//! Templates use positional placeholders (`{0}`, `{1}`, ...) with `{{` and
//! `}}` as escapes. A template that does not fit its arguments is a soft
//! failure, never a panic.

use std::any::TypeId;
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt::{self, Display};
use std::sync::Arc;

use crate::check::LeafCheck;
use crate::member::Model;
use crate::options::RuleOptions;
use crate::rule::Rule;

// ============================================================================
// FORMAT ARGUMENTS
// ============================================================================

/// The argument a check contributes to message formatting.
///
/// Every shape normalizes to a flat positional list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatArg {
    /// A single value, e.g. a pattern.
    Scalar(String),
    /// A value followed by more values, e.g. `between {0} and {1}` bounds.
    Pair(String, Vec<String>),
    /// Any number of values.
    List(Vec<String>),
}

impl FormatArg {
    /// Creates a scalar argument.
    pub fn scalar(value: impl Display) -> Self {
        Self::Scalar(value.to_string())
    }

    /// Creates a scalar-plus-trailing-list argument.
    pub fn pair<I>(first: impl Display, rest: I) -> Self
    where
        I: IntoIterator,
        I::Item: Display,
    {
        Self::Pair(
            first.to_string(),
            rest.into_iter().map(|v| v.to_string()).collect(),
        )
    }

    /// Creates a list argument.
    pub fn list<I>(values: I) -> Self
    where
        I: IntoIterator,
        I::Item: Display,
    {
        Self::List(values.into_iter().map(|v| v.to_string()).collect())
    }

    /// Flattens into positional arguments.
    #[must_use]
    pub fn normalize(&self) -> Vec<String> {
        match self {
            Self::Scalar(value) => vec![value.clone()],
            Self::Pair(first, rest) => std::iter::once(first.clone())
                .chain(rest.iter().cloned())
                .collect(),
            Self::List(values) => values.clone(),
        }
    }
}

// ============================================================================
// POSITIONAL FORMATTING
// ============================================================================

/// A template that does not fit its arguments.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum FormatError {
    /// A placeholder index beyond the supplied arguments.
    #[error("placeholder {{{index}}} has no argument ({available} supplied)")]
    MissingArgument {
        /// Requested index.
        index: usize,
        /// Number of supplied arguments.
        available: usize,
    },

    /// An unescaped brace without its partner.
    #[error("unbalanced brace at byte {position}")]
    UnbalancedBrace {
        /// Byte offset of the brace.
        position: usize,
    },

    /// A placeholder whose index is not a number.
    #[error("invalid placeholder `{{{placeholder}}}`")]
    InvalidPlaceholder {
        /// Placeholder body.
        placeholder: String,
    },
}

/// Substitutes `{n}` placeholders with `args[n]`.
///
/// Alignment and format specifiers after `,` or `:` are accepted and ignored.
///
/// # Examples
///
/// ```rust,ignore
/// use nebula_rules::message::format_positional;
///
/// let text = format_positional("between {0} and {1}", &["1".into(), "9".into()])?;
/// assert_eq!(text, "between 1 and 9");
/// ```
pub fn format_positional(template: &str, args: &[String]) -> Result<String, FormatError> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.char_indices().peekable();

    while let Some((position, c)) = chars.next() {
        match c {
            '{' => {
                if chars.next_if(|&(_, next)| next == '{').is_some() {
                    out.push('{');
                    continue;
                }
                let mut placeholder = String::new();
                let mut closed = false;
                for (_, next) in chars.by_ref() {
                    if next == '}' {
                        closed = true;
                        break;
                    }
                    placeholder.push(next);
                }
                if !closed {
                    return Err(FormatError::UnbalancedBrace { position });
                }
                let index = placeholder
                    .split([',', ':'])
                    .next()
                    .unwrap_or_default()
                    .trim()
                    .parse::<usize>()
                    .map_err(|_| FormatError::InvalidPlaceholder {
                        placeholder: placeholder.clone(),
                    })?;
                let arg = args.get(index).ok_or(FormatError::MissingArgument {
                    index,
                    available: args.len(),
                })?;
                out.push_str(arg);
            }
            '}' => {
                if chars.next_if(|&(_, next)| next == '}').is_some() {
                    out.push('}');
                } else {
                    return Err(FormatError::UnbalancedBrace { position });
                }
            }
            _ => out.push(c),
        }
    }

    Ok(out)
}

// ============================================================================
// RESOURCES
// ============================================================================

/// A named set of localizable strings.
///
/// The optional static table is the last-resort lookup when the localizer
/// does not know a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceType {
    name: Cow<'static, str>,
    entries: &'static [(&'static str, &'static str)],
}

impl ResourceType {
    /// Creates a resource type with no static table.
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self {
            name: Cow::Borrowed(name),
            entries: &[],
        }
    }

    /// Creates a resource type with a runtime name.
    pub fn named(name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            name: name.into(),
            entries: &[],
        }
    }

    /// Attaches a static key/template table.
    #[must_use]
    pub const fn with_entries(mut self, entries: &'static [(&'static str, &'static str)]) -> Self {
        self.entries = entries;
        self
    }

    /// Returns the resource type name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Looks a key up in the static table.
    #[must_use]
    pub fn lookup(&self, key: &str) -> Option<&'static str> {
        self.entries
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, template)| *template)
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Looks up translated templates.
///
/// Returning `None` means "not found"; resolution continues with the next
/// source.
pub trait Localizer: Send + Sync {
    /// Resolves `key` in `resource` for `locale`.
    fn localize(&self, resource: &ResourceType, key: &str, locale: Option<&str>) -> Option<String>;
}

impl<F> Localizer for F
where
    F: Fn(&ResourceType, &str, Option<&str>) -> Option<String> + Send + Sync,
{
    fn localize(&self, resource: &ResourceType, key: &str, locale: Option<&str>) -> Option<String> {
        self(resource, key, locale)
    }
}

// ============================================================================
// MESSAGE RESOLVER
// ============================================================================

/// Resolves display strings for failed checks.
#[derive(Clone)]
pub struct MessageResolver {
    localizer: Option<Arc<dyn Localizer>>,
    default_resource: Option<ResourceType>,
    type_resources: HashMap<TypeId, ResourceType>,
    default_locale: Option<String>,
    conventional_keys: bool,
}

impl Default for MessageResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageResolver {
    /// Creates a resolver with no localizer and conventional keys enabled.
    #[must_use]
    pub fn new() -> Self {
        Self {
            localizer: None,
            default_resource: None,
            type_resources: HashMap::new(),
            default_locale: None,
            conventional_keys: true,
        }
    }

    /// Creates a resolver configured from rule options.
    #[must_use]
    pub fn from_options(options: &RuleOptions) -> Self {
        Self {
            default_locale: options.default_locale.clone(),
            conventional_keys: options.conventional_keys,
            ..Self::new()
        }
    }

    /// Sets the localizer.
    #[must_use = "builder methods must be chained or built"]
    pub fn with_localizer(mut self, localizer: impl Localizer + 'static) -> Self {
        self.localizer = Some(Arc::new(localizer));
        self
    }

    /// Sets the resource type used when a rule names none.
    #[must_use = "builder methods must be chained or built"]
    pub fn with_default_resource(mut self, resource: ResourceType) -> Self {
        self.default_resource = Some(resource);
        self
    }

    /// Declares the resource type of model `T`.
    ///
    /// Consulted after the rule-level and the default resource type.
    #[must_use = "builder methods must be chained or built"]
    pub fn with_type_resource<T: 'static>(mut self, resource: ResourceType) -> Self {
        self.type_resources.insert(TypeId::of::<T>(), resource);
        self
    }

    /// Sets the locale used when a rule carries none.
    #[must_use = "builder methods must be chained or built"]
    pub fn with_default_locale(mut self, locale: impl Into<String>) -> Self {
        self.default_locale = Some(locale.into());
        self
    }

    /// Enables or disables conventional `Member_Check` keys globally.
    #[must_use = "builder methods must be chained or built"]
    pub fn with_conventional_keys(mut self, enabled: bool) -> Self {
        self.conventional_keys = enabled;
        self
    }

    /// Resolves the message for a failed check.
    pub fn resolve<T: Model>(
        &self,
        instance: &T,
        member_name: &str,
        check: &dyn LeafCheck<T>,
        rule: Option<&Rule<T>>,
    ) -> String {
        if let Some(message) = rule.and_then(|r| r.message().resolver()).and_then(|f| f(instance)) {
            return message;
        }

        if let Some(message) = rule.and_then(|r| self.explicit(member_name, check, r)) {
            return message;
        }

        if let Some(message) = self.from_resources(member_name, check, rule) {
            return message;
        }

        if let Some(fallback) = rule.and_then(|r| r.message().fallback()) {
            return fallback.to_owned();
        }

        check
            .format_message(member_name)
            .unwrap_or_else(|| generic_message(member_name))
    }

    fn explicit<T: Model>(
        &self,
        member_name: &str,
        check: &dyn LeafCheck<T>,
        rule: &Rule<T>,
    ) -> Option<String> {
        let template = rule.message().message()?;
        format_soft(template, &message_args(member_name, check))
    }

    fn from_resources<T: Model>(
        &self,
        member_name: &str,
        check: &dyn LeafCheck<T>,
        rule: Option<&Rule<T>>,
    ) -> Option<String> {
        let spec = rule.map(Rule::message);
        let key = spec
            .and_then(|s| s.resource_key())
            .map(str::to_owned)
            .or_else(|| check.resource_name().map(str::to_owned))
            .or_else(|| {
                let conventional = self.conventional_keys
                    && spec.is_none_or(|s| s.use_conventional_keys());
                conventional.then(|| format!("{member_name}_{}", check.short_name()))
            })?;

        let resource = spec
            .and_then(|s| s.resource_type())
            .or(self.default_resource.as_ref())
            .or_else(|| self.type_resources.get(&TypeId::of::<T>()))?;

        let locale = spec
            .and_then(|s| s.locale())
            .or(self.default_locale.as_deref());

        let template = self
            .localizer
            .as_ref()
            .and_then(|l| l.localize(resource, &key, locale))
            .or_else(|| resource.lookup(&key).map(str::to_owned));

        let Some(template) = template else {
            tracing::trace!(resource = %resource, key = %key, "no resource entry, falling through");
            return None;
        };
        format_soft(&template, &message_args(member_name, check))
    }
}

impl fmt::Debug for MessageResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageResolver")
            .field("has_localizer", &self.localizer.is_some())
            .field("default_resource", &self.default_resource)
            .field("type_resources", &self.type_resources.len())
            .field("default_locale", &self.default_locale)
            .field("conventional_keys", &self.conventional_keys)
            .finish()
    }
}

/// The format argument of the check, or the member name when there is none.
fn message_args<T>(member_name: &str, check: &dyn LeafCheck<T>) -> Vec<String> {
    check
        .format_arg()
        .map_or_else(|| vec![member_name.to_owned()], |arg| arg.normalize())
}

fn format_soft(template: &str, args: &[String]) -> Option<String> {
    match format_positional(template, args) {
        Ok(message) => Some(message),
        Err(error) => {
            tracing::trace!(%error, template, "message template rejected, falling through");
            None
        }
    }
}

/// The last-resort message.
#[must_use]
pub fn generic_message(member_name: &str) -> String {
    format!("Invalid value for {member_name}")
}
