//! Member identity
//!
//! Rules are keyed by the member they check. Without runtime reflection a
//! member is described by a [`MemberRef`]: a stable name plus the
//! [`TypeToken`] of the type that declares it. Two member references denote
//! the same member when their names match and either declaring type is
//! assignable from the other, so rules declared against a shared base shape
//! still line up with the concrete model.
//!
//! A [`Property`] pairs a member reference with a typed accessor and is what
//! the builder consumes. The [`member!`](crate::member!) macro produces one
//! from a struct field.

use std::any::TypeId;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

// ============================================================================
// MODEL MARKER
// ============================================================================

/// Marker for types that can carry rules.
///
/// Rules are shared across threads and async conditions borrow the instance
/// across suspension points, so models must be `Send + Sync + 'static`.
pub trait Model: Send + Sync + 'static {}

impl<T: Send + Sync + 'static> Model for T {}

// ============================================================================
// TYPE TOKEN
// ============================================================================

/// Opaque identity of a declaring type.
///
/// Carries the declared supertypes so that member identity can follow
/// "is-a" relationships the model author opts into with [`TypeToken::extends`].
#[derive(Clone)]
pub struct TypeToken {
    id: TypeId,
    name: &'static str,
    supertypes: Arc<[TypeId]>,
}

impl TypeToken {
    /// Token for `T` with no declared supertypes.
    #[must_use]
    pub fn of<T: 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
            supertypes: Vec::new().into(),
        }
    }

    /// Declares `B` as a supertype of this token's type.
    #[must_use = "builder methods must be chained or built"]
    pub fn extends<B: 'static>(self) -> Self {
        let mut supertypes = self.supertypes.to_vec();
        supertypes.push(TypeId::of::<B>());
        Self {
            supertypes: supertypes.into(),
            ..self
        }
    }

    /// Returns the runtime type id.
    #[must_use]
    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Returns the fully qualified type name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns the type name without its module path.
    #[must_use]
    pub fn short_name(&self) -> &'static str {
        let base = self.name.split('<').next().unwrap_or(self.name);
        base.rsplit("::").next().unwrap_or(base)
    }

    /// Returns `true` if a value of `other` can stand in for this type.
    #[must_use]
    pub fn is_assignable_from(&self, other: &TypeToken) -> bool {
        self.id == other.id || other.supertypes.contains(&self.id)
    }

    /// Assignability in either direction.
    #[must_use]
    pub fn is_compatible_with(&self, other: &TypeToken) -> bool {
        self.is_assignable_from(other) || other.is_assignable_from(self)
    }
}

impl PartialEq for TypeToken {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeToken {}

impl Hash for TypeToken {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TypeToken").field(&self.name).finish()
    }
}

// ============================================================================
// MEMBER REF
// ============================================================================

/// Stable identity of a property or field.
#[derive(Clone)]
pub struct MemberRef {
    name: Arc<str>,
    declaring_type: TypeToken,
}

impl MemberRef {
    /// Creates a member reference declared on the given type.
    pub fn new(name: impl Into<Arc<str>>, declaring_type: TypeToken) -> Self {
        Self {
            name: name.into(),
            declaring_type,
        }
    }

    /// Creates a member reference declared on `T`.
    pub fn of<T: 'static>(name: impl Into<Arc<str>>) -> Self {
        Self::new(name, TypeToken::of::<T>())
    }

    /// Returns the member name used in messages and item paths.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the declaring type.
    #[must_use]
    pub fn declaring_type(&self) -> &TypeToken {
        &self.declaring_type
    }

    /// Name equality plus either-direction type compatibility.
    #[must_use]
    pub fn is_same_member(&self, other: &MemberRef) -> bool {
        self.name == other.name && self.declaring_type.is_compatible_with(&other.declaring_type)
    }
}

impl fmt::Debug for MemberRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MemberRef({self})")
    }
}

impl fmt::Display for MemberRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.declaring_type.short_name(), self.name)
    }
}

// ============================================================================
// PROPERTY
// ============================================================================

/// A member reference with a typed accessor.
///
/// # Examples
///
/// ```rust,ignore
/// use nebula_rules::member::Property;
///
/// struct User { email: String }
///
/// let email = Property::new("Email", |u: &User| &u.email);
/// assert_eq!(email.member().name(), "Email");
/// ```
pub struct Property<T, V> {
    member: MemberRef,
    accessor: fn(&T) -> &V,
}

impl<T: 'static, V> Property<T, V> {
    /// Creates a property declared on `T`.
    pub fn new(name: impl Into<Arc<str>>, accessor: fn(&T) -> &V) -> Self {
        Self {
            member: MemberRef::of::<T>(name),
            accessor,
        }
    }
}

impl<T, V> Property<T, V> {
    /// Overrides the declaring type, e.g. for members inherited from a shared shape.
    #[must_use = "builder methods must be chained or built"]
    pub fn declared_by(mut self, declaring_type: TypeToken) -> Self {
        self.member = MemberRef::new(self.member.name.clone(), declaring_type);
        self
    }

    /// Returns the member reference.
    #[must_use]
    pub fn member(&self) -> &MemberRef {
        &self.member
    }

    /// Reads the member from an instance.
    #[inline]
    pub fn get<'a>(&self, instance: &'a T) -> &'a V {
        (self.accessor)(instance)
    }
}

impl<T, V> Clone for Property<T, V> {
    fn clone(&self) -> Self {
        Self {
            member: self.member.clone(),
            accessor: self.accessor,
        }
    }
}

impl<T, V> fmt::Debug for Property<T, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Property")
            .field("member", &self.member)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Person {
        name: String,
    }

    struct Customer;

    struct Unrelated;

    #[test]
    fn same_member_requires_matching_name() {
        let a = MemberRef::of::<Person>("Name");
        let b = MemberRef::of::<Person>("Email");
        assert!(!a.is_same_member(&b));
    }

    #[test]
    fn same_member_follows_supertypes_in_either_direction() {
        let base = MemberRef::of::<Person>("Name");
        let derived = MemberRef::new("Name", TypeToken::of::<Customer>().extends::<Person>());

        assert!(base.is_same_member(&derived));
        assert!(derived.is_same_member(&base));
    }

    #[test]
    fn unrelated_types_do_not_match() {
        let a = MemberRef::of::<Person>("Name");
        let b = MemberRef::of::<Unrelated>("Name");
        assert!(!a.is_same_member(&b));
    }

    #[test]
    fn property_reads_through_accessor() {
        let name = Property::new("Name", |p: &Person| &p.name);
        let person = Person {
            name: "Ada".to_owned(),
        };
        assert_eq!(name.get(&person), "Ada");
        assert_eq!(name.member().to_string(), "Person.Name");
    }

    #[test]
    fn short_name_strips_module_path() {
        assert_eq!(TypeToken::of::<Person>().short_name(), "Person");
        assert_eq!(TypeToken::of::<Vec<Person>>().short_name(), "Vec");
    }
}
