//! Context classes and their schemas
//!
//! A context class declares what the runtime object behind a context can
//! do: which slots may be read and written and at what type, which actions
//! exist and what parameters they take, and whether the class can be used
//! as a factory target. The compiler checks every operation against these
//! declarations before an instruction is emitted; the runtime trusts the
//! image.
//!
//! Most classes are data: build them with [`ClassSpec`]. Implement
//! [`ContextClass`] directly only when slot typing has to be computed.

use archi_types::TypeDescriptor;
use once_cell::sync::Lazy;
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// Data type tag carried by parameter-list contexts.
pub const PARAMETERS_TYPE: &str = "archi.parameters";

/// Data type tag carried by pointer-array contexts.
pub const ARRAY_TYPE: &str = "archi.array";

const WILDCARD: TypeDescriptor = TypeDescriptor::Wildcard;

static OPEN_SCHEMA: Lazy<ParameterSchema> = Lazy::new(ParameterSchema::open);
static BASE: Lazy<Arc<BaseClass>> = Lazy::new(|| Arc::new(BaseClass));
static PARAMETERS: Lazy<Arc<ParametersClass>> = Lazy::new(|| Arc::new(ParametersClass));
static ARRAY: Lazy<Arc<ArrayClass>> = Lazy::new(|| Arc::new(ArrayClass));

/// Declared parameter names and types for an action or a constructor.
///
/// A closed schema admits exactly the declared names. An open schema
/// admits any name, with declared names still checked at their declared
/// types and the rest accepted as wildcards.
#[derive(Debug, Clone, Default)]
pub struct ParameterSchema {
    entries: FxHashMap<String, TypeDescriptor>,
    open: bool,
}

impl ParameterSchema {
    /// Schema admitting any parameter name.
    pub fn open() -> ParameterSchema {
        ParameterSchema {
            entries: FxHashMap::default(),
            open: true,
        }
    }

    /// Schema admitting only the declared names.
    pub fn closed() -> ParameterSchema {
        ParameterSchema::default()
    }

    /// Declares a parameter.
    pub fn with(mut self, name: impl Into<String>, ty: TypeDescriptor) -> ParameterSchema {
        self.entries.insert(name.into(), ty);
        self
    }

    /// Type expected for `name`, or `None` if the schema rejects it.
    pub fn lookup(&self, name: &str) -> Option<&TypeDescriptor> {
        match self.entries.get(name) {
            Some(ty) => Some(ty),
            None if self.open => Some(&WILDCARD),
            None => None,
        }
    }

    /// Whether undeclared names are admitted.
    pub fn is_open(&self) -> bool {
        self.open
    }
}

/// What contexts of one class can do.
///
/// Slots are identified by name and arity: a plain slot has arity zero, an
/// element of an indexed family has the family name and the number of its
/// indices. Lookups return `None` for anything the class does not declare.
pub trait ContextClass {
    /// Class name, used in error messages.
    fn name(&self) -> &str;

    /// Type of the data a context of this class holds.
    fn data_type(&self) -> TypeDescriptor {
        TypeDescriptor::Wildcard
    }

    /// Type produced when reading `slot` with `arity` indices.
    fn getter_slot_type(&self, slot: &str, arity: usize) -> Option<TypeDescriptor>;

    /// Type expected when writing `slot` with `arity` indices.
    fn setter_slot_type(&self, slot: &str, arity: usize) -> Option<TypeDescriptor>;

    /// Parameter schema of `action` with `arity` indices.
    fn action_parameters(&self, action: &str, arity: usize) -> Option<&ParameterSchema>;

    /// Parameter schema for creating contexts of this class through a
    /// factory, or `None` if the class is not constructible.
    fn init_parameters(&self) -> Option<&ParameterSchema>;
}

/// The unconstrained class: every slot and action exists at the wildcard
/// type. Used for bindings whose real shape only the runtime knows.
#[derive(Debug)]
pub struct BaseClass;

impl ContextClass for BaseClass {
    fn name(&self) -> &str {
        "base"
    }

    fn getter_slot_type(&self, _slot: &str, _arity: usize) -> Option<TypeDescriptor> {
        Some(WILDCARD)
    }

    fn setter_slot_type(&self, _slot: &str, _arity: usize) -> Option<TypeDescriptor> {
        Some(WILDCARD)
    }

    fn action_parameters(&self, _action: &str, _arity: usize) -> Option<&ParameterSchema> {
        Some(&OPEN_SCHEMA)
    }

    fn init_parameters(&self) -> Option<&ParameterSchema> {
        Some(&OPEN_SCHEMA)
    }
}

/// Class of parameter-list contexts. Entries are written one flat name at
/// a time; the list itself takes no actions and no factory can build one.
#[derive(Debug)]
pub struct ParametersClass;

impl ContextClass for ParametersClass {
    fn name(&self) -> &str {
        "parameters"
    }

    fn data_type(&self) -> TypeDescriptor {
        TypeDescriptor::private(PARAMETERS_TYPE)
    }

    fn getter_slot_type(&self, _slot: &str, arity: usize) -> Option<TypeDescriptor> {
        (arity == 0).then_some(WILDCARD)
    }

    fn setter_slot_type(&self, _slot: &str, arity: usize) -> Option<TypeDescriptor> {
        (arity == 0).then_some(WILDCARD)
    }

    fn action_parameters(&self, _action: &str, _arity: usize) -> Option<&ParameterSchema> {
        None
    }

    fn init_parameters(&self) -> Option<&ParameterSchema> {
        None
    }
}

/// Class of pointer-array contexts. Elements are addressed with the empty
/// slot name and one index.
#[derive(Debug)]
pub struct ArrayClass;

impl ContextClass for ArrayClass {
    fn name(&self) -> &str {
        "array"
    }

    fn data_type(&self) -> TypeDescriptor {
        TypeDescriptor::private(ARRAY_TYPE)
    }

    fn getter_slot_type(&self, slot: &str, arity: usize) -> Option<TypeDescriptor> {
        (slot.is_empty() && arity == 1).then_some(WILDCARD)
    }

    fn setter_slot_type(&self, slot: &str, arity: usize) -> Option<TypeDescriptor> {
        (slot.is_empty() && arity == 1).then_some(WILDCARD)
    }

    fn action_parameters(&self, _action: &str, _arity: usize) -> Option<&ParameterSchema> {
        None
    }

    fn init_parameters(&self) -> Option<&ParameterSchema> {
        None
    }
}

/// Shared instance of [`BaseClass`].
pub fn base_class() -> Arc<dyn ContextClass> {
    BASE.clone()
}

/// Shared instance of [`ParametersClass`].
pub fn parameters_class() -> Arc<dyn ContextClass> {
    PARAMETERS.clone()
}

/// Shared instance of [`ArrayClass`].
pub fn array_class() -> Arc<dyn ContextClass> {
    ARRAY.clone()
}

/// Declarative class description.
///
/// Build one with the fluent methods and seal it with [`build`]; the
/// finished value is itself the [`ContextClass`] implementation.
///
/// [`build`]: ClassSpec::build
#[derive(Debug, Clone)]
pub struct ClassSpec {
    name: String,
    data_type: TypeDescriptor,
    getters: FxHashMap<(String, usize), TypeDescriptor>,
    setters: FxHashMap<(String, usize), TypeDescriptor>,
    actions: FxHashMap<(String, usize), ParameterSchema>,
    init: Option<ParameterSchema>,
}

impl ClassSpec {
    /// Starts a class with no slots, no actions, wildcard data, and no
    /// creation parameters.
    pub fn new(name: impl Into<String>) -> ClassSpec {
        ClassSpec {
            name: name.into(),
            data_type: TypeDescriptor::Wildcard,
            getters: FxHashMap::default(),
            setters: FxHashMap::default(),
            actions: FxHashMap::default(),
            init: None,
        }
    }

    /// Declares the type of the context's data.
    pub fn data_type(mut self, ty: TypeDescriptor) -> ClassSpec {
        self.data_type = ty;
        self
    }

    /// Declares a readable slot.
    pub fn getter(mut self, slot: impl Into<String>, arity: usize, ty: TypeDescriptor) -> ClassSpec {
        self.getters.insert((slot.into(), arity), ty);
        self
    }

    /// Declares a writable slot.
    pub fn setter(mut self, slot: impl Into<String>, arity: usize, ty: TypeDescriptor) -> ClassSpec {
        self.setters.insert((slot.into(), arity), ty);
        self
    }

    /// Declares a slot readable and writable at one type.
    pub fn slot(self, slot: impl Into<String>, arity: usize, ty: TypeDescriptor) -> ClassSpec {
        let slot = slot.into();
        self.getter(slot.clone(), arity, ty.clone()).setter(slot, arity, ty)
    }

    /// Declares an action.
    pub fn action(
        mut self,
        action: impl Into<String>,
        arity: usize,
        schema: ParameterSchema,
    ) -> ClassSpec {
        self.actions.insert((action.into(), arity), schema);
        self
    }

    /// Makes the class constructible through factories with the given
    /// creation parameters.
    pub fn constructible(mut self, schema: ParameterSchema) -> ClassSpec {
        self.init = Some(schema);
        self
    }

    /// Seals the spec into a shareable class.
    pub fn build(self) -> Arc<dyn ContextClass> {
        Arc::new(self)
    }
}

impl ContextClass for ClassSpec {
    fn name(&self) -> &str {
        &self.name
    }

    fn data_type(&self) -> TypeDescriptor {
        self.data_type.clone()
    }

    fn getter_slot_type(&self, slot: &str, arity: usize) -> Option<TypeDescriptor> {
        self.getters.get(&(slot.to_string(), arity)).cloned()
    }

    fn setter_slot_type(&self, slot: &str, arity: usize) -> Option<TypeDescriptor> {
        self.setters.get(&(slot.to_string(), arity)).cloned()
    }

    fn action_parameters(&self, action: &str, arity: usize) -> Option<&ParameterSchema> {
        self.actions.get(&(action.to_string(), arity))
    }

    fn init_parameters(&self) -> Option<&ParameterSchema> {
        self.init.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use archi_types::builtin;

    #[test]
    fn class_spec_discriminates_on_name_and_arity() {
        let class = ClassSpec::new("material")
            .slot("albedo", 0, TypeDescriptor::Public(builtin::STRING))
            .setter("layers", 1, TypeDescriptor::Public(builtin::UINT))
            .build();

        assert_eq!(class.name(), "material");
        assert!(class.getter_slot_type("albedo", 0).is_some());
        assert!(class.setter_slot_type("albedo", 0).is_some());
        assert!(class.getter_slot_type("albedo", 1).is_none());
        assert!(class.setter_slot_type("layers", 1).is_some());
        assert!(class.getter_slot_type("layers", 1).is_none());
        assert!(class.setter_slot_type("missing", 0).is_none());
    }

    #[test]
    fn schemas_distinguish_open_and_closed() {
        let closed = ParameterSchema::closed().with("width", TypeDescriptor::Public(builtin::UINT));
        assert!(closed.lookup("width").is_some());
        assert!(closed.lookup("depth").is_none());

        let open = ParameterSchema::open().with("width", TypeDescriptor::Public(builtin::UINT));
        assert_eq!(
            open.lookup("width"),
            Some(&TypeDescriptor::Public(builtin::UINT))
        );
        assert_eq!(open.lookup("depth"), Some(&TypeDescriptor::Wildcard));
    }

    #[test]
    fn builtin_classes_have_their_shapes() {
        let base = base_class();
        assert!(base.getter_slot_type("anything", 3).is_some());
        assert!(base.init_parameters().is_some());

        let params = parameters_class();
        assert!(params.setter_slot_type("entry", 0).is_some());
        assert!(params.setter_slot_type("entry", 1).is_none());
        assert!(params.init_parameters().is_none());
        assert_eq!(params.data_type(), TypeDescriptor::private(PARAMETERS_TYPE));

        let array = array_class();
        assert!(array.setter_slot_type("", 1).is_some());
        assert!(array.setter_slot_type("", 0).is_none());
        assert!(array.setter_slot_type("x", 1).is_none());
        assert!(array.action_parameters("push", 0).is_none());
    }

    #[test]
    fn unconfigured_class_rejects_everything() {
        let class = ClassSpec::new("opaque").build();
        assert!(class.getter_slot_type("x", 0).is_none());
        assert!(class.action_parameters("run", 0).is_none());
        assert!(class.init_parameters().is_none());
        assert!(class.data_type().is_wildcard());
    }
}
