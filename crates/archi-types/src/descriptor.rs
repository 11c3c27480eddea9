//! Type descriptors attached to slots, parameters, and context data

use std::fmt;

/// Unique identifier for a registered public type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeId(pub(crate) u32);

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeId({})", self.0)
    }
}

/// What a slot, parameter, or context's data claims to be.
///
/// Public types live in a [`TypeTable`](crate::TypeTable) and take part in
/// the declared-supertype relation. Private types are opaque tags that only
/// match themselves. The wildcard matches anything and marks places that
/// are intentionally unconstrained.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeDescriptor {
    /// A registered type, compatible with itself and its declared supertypes
    Public(TypeId),
    /// An opaque tag, compatible only with an identical tag
    Private(String),
    /// Compatible with everything
    Wildcard,
}

impl TypeDescriptor {
    /// Opaque private type with the given tag.
    pub fn private(tag: impl Into<String>) -> TypeDescriptor {
        TypeDescriptor::Private(tag.into())
    }

    /// Whether this descriptor is the wildcard.
    pub fn is_wildcard(&self) -> bool {
        matches!(self, TypeDescriptor::Wildcard)
    }
}
