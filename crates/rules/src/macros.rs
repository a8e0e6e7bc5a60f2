//! Member accessor macro.

// ============================================================================
// MEMBER MACRO
// ============================================================================

/// Creates a [`Property`](crate::member::Property) from a struct field.
///
/// The member name defaults to the field name; `as "Name"` overrides it, which
/// is how display names such as `Items` in `Items[3].OrderId` are chosen.
///
/// # Examples
///
/// ```rust,ignore
/// use nebula_rules::member;
///
/// struct Cart { items: Vec<Item>, note: String }
///
/// let note = member!(Cart, note);
/// let items = member!(Cart, items as "Items");
/// assert_eq!(items.member().name(), "Items");
/// ```
#[macro_export]
macro_rules! member {
    ($ty:ty, $field:ident) => {
        $crate::member::Property::<$ty, _>::new(stringify!($field), |model: &$ty| &model.$field)
    };
    ($ty:ty, $field:ident as $name:literal) => {
        $crate::member::Property::<$ty, _>::new($name, |model: &$ty| &model.$field)
    };
}
