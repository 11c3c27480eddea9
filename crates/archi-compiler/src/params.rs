//! Typed values and parameter lists
//!
//! [`TypedValue`] pairs a raw payload with the type it claims to be, which
//! is what the registry checks against slot and parameter declarations.
//! [`Parameters`] collects the entries passed to a factory or an action:
//! raw values become the static part of the list, context references
//! become the dynamic part resolved at runtime.

use crate::context::Context;
use archi_image::{ImageResult, Value};
use archi_ir::Slot;
use archi_types::{builtin, TypeDescriptor};

/// A raw value with a type claim.
#[derive(Debug, Clone)]
pub struct TypedValue {
    /// The payload committed to the image
    pub value: Value,
    /// Type the payload claims
    pub ty: TypeDescriptor,
}

impl TypedValue {
    /// A value of an explicitly chosen type.
    pub fn new(value: Value, ty: TypeDescriptor) -> TypedValue {
        TypedValue { value, ty }
    }

    /// Unsigned 8-bit scalar.
    pub fn uint8(v: u8) -> TypedValue {
        TypedValue::new(Value::from_u8(v), TypeDescriptor::Public(builtin::UINT))
    }

    /// Unsigned 16-bit scalar.
    pub fn uint16(v: u16) -> TypedValue {
        TypedValue::new(Value::from_u16(v), TypeDescriptor::Public(builtin::UINT))
    }

    /// Unsigned 32-bit scalar.
    pub fn uint32(v: u32) -> TypedValue {
        TypedValue::new(Value::from_u32(v), TypeDescriptor::Public(builtin::UINT))
    }

    /// Unsigned 64-bit scalar.
    pub fn uint64(v: u64) -> TypedValue {
        TypedValue::new(Value::from_u64(v), TypeDescriptor::Public(builtin::UINT))
    }

    /// Signed 32-bit scalar.
    pub fn sint32(v: i32) -> TypedValue {
        TypedValue::new(Value::from_i32(v), TypeDescriptor::Public(builtin::SINT))
    }

    /// Signed 64-bit scalar.
    pub fn sint64(v: i64) -> TypedValue {
        TypedValue::new(Value::from_i64(v), TypeDescriptor::Public(builtin::SINT))
    }

    /// 32-bit float scalar.
    pub fn float32(v: f32) -> TypedValue {
        TypedValue::new(Value::from_f32(v), TypeDescriptor::Public(builtin::FLOAT))
    }

    /// 64-bit float scalar.
    pub fn float64(v: f64) -> TypedValue {
        TypedValue::new(Value::from_f64(v), TypeDescriptor::Public(builtin::FLOAT))
    }

    /// NUL-terminated string.
    pub fn string(s: &str) -> TypedValue {
        TypedValue::new(Value::c_str(s), TypeDescriptor::Public(builtin::STRING))
    }

    /// Raw byte array.
    pub fn bytes(payload: Vec<u8>) -> TypedValue {
        TypedValue::new(Value::bytes(payload), TypeDescriptor::Public(builtin::BYTES))
    }

    /// Word-sized index tuple.
    pub fn indices(indices: &[usize]) -> TypedValue {
        TypedValue::new(
            Value::index_array(indices),
            TypeDescriptor::Public(builtin::INDICES),
        )
    }

    /// Same value with different flags; the type claim is kept.
    pub fn with_flags(&self, flags: u64) -> ImageResult<TypedValue> {
        Ok(TypedValue::new(self.value.with_flags(flags)?, self.ty.clone()))
    }
}

/// Anything that can be written into a slot or bound to a parameter.
#[derive(Debug, Clone)]
pub enum SourceValue {
    /// A raw value committed to the image
    Value(TypedValue),
    /// The data of another context, resolved at runtime
    Context(Context),
    /// One slot of another context, resolved at runtime
    Slot(Context, Slot),
}

impl SourceValue {
    /// Reads `slot` of `source` at runtime.
    pub fn slot(source: &Context, slot: Slot) -> SourceValue {
        SourceValue::Slot(source.clone(), slot)
    }
}

impl From<TypedValue> for SourceValue {
    fn from(value: TypedValue) -> SourceValue {
        SourceValue::Value(value)
    }
}

impl From<&Context> for SourceValue {
    fn from(context: &Context) -> SourceValue {
        SourceValue::Context(context.clone())
    }
}

/// Entries destined for a factory creation or an action invocation.
///
/// Entries keep their declaration order; when both static and dynamic
/// entries are present, the runtime sees the merged list in exactly this
/// order. An optional parent chains the list to an existing parameter
/// context whose entries it overrides.
#[derive(Debug, Clone, Default)]
pub struct Parameters {
    parent: Option<Context>,
    entries: Vec<(String, SourceValue)>,
}

impl Parameters {
    /// Empty parameter list.
    pub fn new() -> Parameters {
        Parameters::default()
    }

    /// Empty list chained to a parent parameter context.
    pub fn with_parent(parent: &Context) -> Parameters {
        Parameters {
            parent: Some(parent.clone()),
            entries: Vec::new(),
        }
    }

    /// Appends an entry.
    pub fn set(mut self, name: impl Into<String>, value: impl Into<SourceValue>) -> Parameters {
        self.entries.push((name.into(), value.into()));
        self
    }

    /// Appends an entry reading `slot` of `source` at runtime.
    pub fn set_slot(self, name: impl Into<String>, source: &Context, slot: Slot) -> Parameters {
        self.set(name, SourceValue::slot(source, slot))
    }

    /// The parent context, if any.
    pub fn parent(&self) -> Option<&Context> {
        self.parent.as_ref()
    }

    /// Entries in declaration order.
    pub fn entries(&self) -> &[(String, SourceValue)] {
        &self.entries
    }

    /// Whether the list has no entries and no parent.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.parent.is_none()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_constructors_claim_builtin_types() {
        assert_eq!(
            TypedValue::uint32(7).ty,
            TypeDescriptor::Public(builtin::UINT)
        );
        assert_eq!(
            TypedValue::string("x").ty,
            TypeDescriptor::Public(builtin::STRING)
        );
        assert_eq!(TypedValue::string("x").value.payload(), b"x\0");
        assert_eq!(
            TypedValue::float64(1.5).ty,
            TypeDescriptor::Public(builtin::FLOAT)
        );
    }

    #[test]
    fn with_flags_keeps_the_type_claim() {
        let v = TypedValue::uint32(9).with_flags(0x5).unwrap();
        assert_eq!(v.value.flags(), 0x5);
        assert_eq!(v.ty, TypeDescriptor::Public(builtin::UINT));
        assert!(TypedValue::uint32(9).with_flags(u64::MAX).is_err());
    }

    #[test]
    fn entries_keep_declaration_order() {
        let params = Parameters::new()
            .set("width", TypedValue::uint32(640))
            .set("height", TypedValue::uint32(480))
            .set("width", TypedValue::uint32(800));
        let names: Vec<&str> = params.entries().iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["width", "height", "width"]);
        assert_eq!(params.len(), 3);
        assert!(!params.is_empty());
        assert!(Parameters::new().is_empty());
    }
}
