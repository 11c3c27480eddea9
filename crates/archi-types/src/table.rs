//! Type registration and compatibility checking
//!
//! The table owns every public type: its name, its declared supertype, and
//! an optional value constructor that normalizes raw values before they are
//! committed to an image. Compatibility is nominal: a public type is
//! compatible with itself and with every ancestor along its declared
//! supertype chain.

use crate::descriptor::{TypeDescriptor, TypeId};
use crate::error::TypeError;
use archi_image::Value;
use rustc_hash::FxHashMap;

/// Hook that normalizes or rejects a value destined for a typed slot.
pub type Coercion = fn(Value) -> Result<Value, TypeError>;

/// Ids of the types every table starts with.
pub mod builtin {
    use crate::descriptor::TypeId;

    /// Unsigned integer scalars of any width
    pub const UINT: TypeId = TypeId(0);
    /// Signed integer scalars of any width
    pub const SINT: TypeId = TypeId(1);
    /// Floating point scalars
    pub const FLOAT: TypeId = TypeId(2);
    /// NUL-terminated strings
    pub const STRING: TypeId = TypeId(3);
    /// Raw byte arrays
    pub const BYTES: TypeId = TypeId(4);
    /// Word-sized index tuples
    pub const INDICES: TypeId = TypeId(5);
}

#[derive(Debug)]
struct TypeEntry {
    name: String,
    parent: Option<TypeId>,
    coerce: Option<Coercion>,
}

/// Registry of public types and their supertype chains.
#[derive(Debug)]
pub struct TypeTable {
    entries: Vec<TypeEntry>,
    by_name: FxHashMap<String, TypeId>,
}

impl Default for TypeTable {
    fn default() -> TypeTable {
        TypeTable::new()
    }
}

impl TypeTable {
    /// Creates a table populated with the builtin types.
    pub fn new() -> TypeTable {
        let mut table = TypeTable {
            entries: Vec::new(),
            by_name: FxHashMap::default(),
        };
        for (id, name) in [
            (builtin::UINT, "uint"),
            (builtin::SINT, "sint"),
            (builtin::FLOAT, "float"),
            (builtin::STRING, "string"),
            (builtin::BYTES, "bytes"),
            (builtin::INDICES, "indices"),
        ] {
            let registered = table.push_entry(name, None, None);
            debug_assert_eq!(registered, Ok(id));
        }
        table
    }

    fn push_entry(
        &mut self,
        name: &str,
        parent: Option<TypeId>,
        coerce: Option<Coercion>,
    ) -> Result<TypeId, TypeError> {
        if self.by_name.contains_key(name) {
            return Err(TypeError::DuplicateType {
                name: name.to_string(),
            });
        }
        if let Some(parent) = parent {
            self.entry(parent)?;
        }
        if self.entries.len() > u32::MAX as usize {
            return Err(TypeError::TableFull);
        }
        let id = TypeId(self.entries.len() as u32);
        self.entries.push(TypeEntry {
            name: name.to_string(),
            parent,
            coerce,
        });
        self.by_name.insert(name.to_string(), id);
        Ok(id)
    }

    fn entry(&self, id: TypeId) -> Result<&TypeEntry, TypeError> {
        self.entries
            .get(id.0 as usize)
            .ok_or(TypeError::UnknownId { id })
    }

    /// Registers a type, optionally below a declared supertype.
    pub fn register(&mut self, name: &str, parent: Option<TypeId>) -> Result<TypeId, TypeError> {
        self.push_entry(name, parent, None)
    }

    /// Registers a type with a value constructor. The constructor runs on
    /// every raw value bound to a slot or parameter of this type.
    pub fn register_with_coercion(
        &mut self,
        name: &str,
        parent: Option<TypeId>,
        coerce: Coercion,
    ) -> Result<TypeId, TypeError> {
        self.push_entry(name, parent, Some(coerce))
    }

    /// Looks up a type id by name.
    pub fn lookup(&self, name: &str) -> Option<TypeId> {
        self.by_name.get(name).copied()
    }

    /// Name of a registered type.
    pub fn name(&self, id: TypeId) -> Result<&str, TypeError> {
        Ok(&self.entry(id)?.name)
    }

    /// Declared supertype of a registered type.
    pub fn parent(&self, id: TypeId) -> Result<Option<TypeId>, TypeError> {
        Ok(self.entry(id)?.parent)
    }

    /// Whether `sub` is `sup` or lies below it on a declared supertype
    /// chain. Unissued ids are never subtypes of anything.
    pub fn is_subtype(&self, sub: TypeId, sup: TypeId) -> bool {
        let mut current = Some(sub);
        while let Some(id) = current {
            if id == sup {
                return true;
            }
            current = match self.entry(id) {
                Ok(entry) => entry.parent,
                Err(_) => return false,
            };
        }
        false
    }

    /// Whether a value of type `got` may flow into a place expecting
    /// `want`. The wildcard is compatible in both directions; private types
    /// match only their own tag; public types follow the supertype chain.
    pub fn compatible(&self, got: &TypeDescriptor, want: &TypeDescriptor) -> bool {
        match (got, want) {
            (TypeDescriptor::Wildcard, _) | (_, TypeDescriptor::Wildcard) => true,
            (TypeDescriptor::Private(a), TypeDescriptor::Private(b)) => a == b,
            (TypeDescriptor::Public(g), TypeDescriptor::Public(w)) => self.is_subtype(*g, *w),
            _ => false,
        }
    }

    /// Human-readable form of a descriptor, for error messages.
    pub fn describe(&self, descriptor: &TypeDescriptor) -> String {
        match descriptor {
            TypeDescriptor::Public(id) => match self.entry(*id) {
                Ok(entry) => entry.name.clone(),
                Err(_) => id.to_string(),
            },
            TypeDescriptor::Private(tag) => format!("private:{tag}"),
            TypeDescriptor::Wildcard => "*".to_string(),
        }
    }

    /// Runs the value constructor of `want` over `value`, if `want` is a
    /// public type that declares one. Other descriptors pass the value
    /// through untouched.
    pub fn coerce(&self, want: &TypeDescriptor, value: Value) -> Result<Value, TypeError> {
        if let TypeDescriptor::Public(id) = want {
            if let Some(coerce) = self.entry(*id)?.coerce {
                return coerce(value);
            }
        }
        Ok(value)
    }
}
