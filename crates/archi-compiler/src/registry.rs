//! The compilation registry
//!
//! A [`Registry`] owns the live key space and the append-only instruction
//! log. Every operation validates keys, classes, slots, and types first
//! and emits instructions only once nothing can fail, so a rejected call
//! leaves the log exactly as it was.
//!
//! Parameter lists with a parent or with dynamic entries lower through a
//! temporary parameter context: the registry initializes it, fills it with
//! one set instruction per dynamic entry, lets the consuming instruction
//! reference it by key, and deletes it. Temporary keys come from a
//! per-registry monotonic counter, so identical graphs compile to
//! identical logs.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use archi_image::ensure_flags;
use archi_ir::{Instr, NamedValue, ParamList, Slot};
use archi_types::{TypeDescriptor, TypeTable};
use rustc_hash::FxHashMap;

use crate::class::{array_class, base_class, parameters_class, ContextClass, ParameterSchema};
use crate::context::Context;
use crate::error::{CompileError, CompileResult};
use crate::params::{Parameters, SourceValue, TypedValue};

static NEXT_REGISTRY_SERIAL: AtomicU64 = AtomicU64::new(1);

const TEMP_KEY_PREFIX: &str = ".archi.params.";

/// A dynamic parameter entry after validation.
enum DynSource {
    /// Reads the data of the context at the key
    Data(String),
    /// Reads a slot of the context at the key
    Slot(String, Slot),
}

/// A parameter list after validation, ready to emit.
struct CheckedParams {
    parent: Option<String>,
    statics: Vec<NamedValue>,
    dynamics: Vec<(String, DynSource)>,
}

impl CheckedParams {
    fn needs_context(&self) -> bool {
        self.parent.is_some() || !self.dynamics.is_empty()
    }
}

/// Owner of the live contexts and the instruction log.
pub struct Registry {
    serial: u64,
    types: TypeTable,
    live: FxHashMap<String, Context>,
    required: Vec<String>,
    log: Vec<Instr>,
    next_temp: u64,
}

impl Registry {
    /// Empty registry with the builtin type table.
    pub fn new() -> Registry {
        Registry {
            serial: NEXT_REGISTRY_SERIAL.fetch_add(1, Ordering::Relaxed),
            types: TypeTable::new(),
            live: FxHashMap::default(),
            required: Vec::new(),
            log: Vec::new(),
            next_temp: 0,
        }
    }

    /// The type table compatibility checks run against.
    pub fn types(&self) -> &TypeTable {
        &self.types
    }

    /// Mutable access for registering embedder types.
    pub fn types_mut(&mut self) -> &mut TypeTable {
        &mut self.types
    }

    /// The instruction log, in emission order.
    pub fn instructions(&self) -> &[Instr] {
        &self.log
    }

    /// Whether `key` is currently bound.
    pub fn contains(&self, key: &str) -> bool {
        self.live.contains_key(key)
    }

    /// The live context bound to `key`, if any.
    pub fn get(&self, key: &str) -> Option<&Context> {
        self.live.get(key)
    }

    /// Keys declared as supplied by the environment, in declaration order.
    pub fn required_keys(&self) -> &[String] {
        &self.required
    }

    /// Currently bound keys, sorted.
    pub fn live_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.live.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Declares `key` as bound by the embedding environment before the log
    /// runs. Emits nothing; the handle exists so later operations can
    /// reference the context.
    pub fn require(&mut self, key: &str, class: Arc<dyn ContextClass>) -> CompileResult<Context> {
        self.check_free(key)?;
        let data_type = class.data_type();
        self.required.push(key.to_string());
        Ok(self.bind(key, class, data_type))
    }

    /// Binds `key` to a context holding one raw value.
    pub fn assign_value(&mut self, key: &str, value: TypedValue) -> CompileResult<Context> {
        self.check_free(key)?;
        self.log.push(Instr::InitPointer {
            key: key.to_string(),
            value: value.value,
        });
        Ok(self.bind(key, base_class(), value.ty))
    }

    /// Binds `key` to an array of `count` null pointers. Elements are
    /// written afterwards through the empty slot name with one index.
    pub fn assign_array(&mut self, key: &str, count: usize, flags: u64) -> CompileResult<Context> {
        self.check_free(key)?;
        if count == 0 {
            return Err(CompileError::EmptyArray {
                key: key.to_string(),
            });
        }
        ensure_flags(flags)?;
        self.log.push(Instr::InitArray {
            key: key.to_string(),
            count,
            flags,
        });
        let class = array_class();
        let data_type = class.data_type();
        Ok(self.bind(key, class, data_type))
    }

    /// Binds `key` to a parameter-list context the runtime materializes.
    /// Unlike the temporaries behind factory calls and actions, the list
    /// stays live until deleted, so it can parent other lists.
    pub fn assign_parameters(&mut self, key: &str, params: &Parameters) -> CompileResult<Context> {
        self.check_free(key)?;
        let what = format!("parameter context {key:?}");
        let schema = ParameterSchema::open();
        let checked = self.check_params(&what, &schema, params)?;
        self.log.push(Instr::InitParameters {
            key: key.to_string(),
            parent: checked.parent,
            params: checked.statics,
        });
        self.emit_dynamics(key, checked.dynamics);
        let class = parameters_class();
        let data_type = class.data_type();
        Ok(self.bind(key, class, data_type))
    }

    /// Binds `key` to a context the factory behind `source` builds.
    /// `class` is the class of the product; its creation schema checks
    /// `params`.
    pub fn create_from(
        &mut self,
        key: &str,
        class: Arc<dyn ContextClass>,
        source: &Context,
        params: &Parameters,
    ) -> CompileResult<Context> {
        self.check_free(key)?;
        self.check_ours(source)?;
        let schema = class
            .init_parameters()
            .ok_or_else(|| CompileError::NotConstructible {
                class: class.name().to_string(),
            })?;
        let what = format!("creation of {key:?} as {}", class.name());
        let checked = self.check_params(&what, schema, params)?;
        let (param_list, temp) = self.emit_params(checked);
        self.log.push(Instr::InitFromContext {
            key: key.to_string(),
            source: source.key().to_string(),
            params: param_list,
        });
        self.delete_temp(temp);
        let data_type = class.data_type();
        Ok(self.bind(key, class, data_type))
    }

    /// Binds `key` to a context built from one slot of the factory behind
    /// `source`. The slot must be readable on the factory's class.
    pub fn create_from_slot(
        &mut self,
        key: &str,
        class: Arc<dyn ContextClass>,
        source: &Context,
        slot: Slot,
        params: &Parameters,
    ) -> CompileResult<Context> {
        self.check_free(key)?;
        self.check_ours(source)?;
        Self::check_slot(&slot)?;
        source
            .class()
            .getter_slot_type(&slot.name, slot.arity())
            .ok_or_else(|| CompileError::UnknownGetterSlot {
                class: source.class().name().to_string(),
                slot: slot.to_string(),
            })?;
        let schema = class
            .init_parameters()
            .ok_or_else(|| CompileError::NotConstructible {
                class: class.name().to_string(),
            })?;
        let what = format!("creation of {key:?} as {}", class.name());
        let checked = self.check_params(&what, schema, params)?;
        let (param_list, temp) = self.emit_params(checked);
        self.log.push(Instr::InitFromSlot {
            key: key.to_string(),
            source: source.key().to_string(),
            slot,
            params: param_list,
        });
        self.delete_temp(temp);
        let data_type = class.data_type();
        Ok(self.bind(key, class, data_type))
    }

    /// Binds `key` to a copy of an existing context. The copy keeps the
    /// original's class and data type.
    pub fn copy(&mut self, key: &str, original: &Context) -> CompileResult<Context> {
        self.check_free(key)?;
        self.check_ours(original)?;
        self.log.push(Instr::Copy {
            key: key.to_string(),
            original: original.key().to_string(),
        });
        let class = original.class().clone();
        let data_type = original.data_type().clone();
        Ok(self.bind(key, class, data_type))
    }

    /// Writes a value, another context's data, or another context's slot
    /// into `slot` of `target`.
    pub fn set(
        &mut self,
        target: &Context,
        slot: Slot,
        source: impl Into<SourceValue>,
    ) -> CompileResult<()> {
        let source = source.into();
        self.check_ours(target)?;
        Self::check_slot(&slot)?;
        let declared = target
            .class()
            .setter_slot_type(&slot.name, slot.arity())
            .ok_or_else(|| CompileError::UnknownSetterSlot {
                class: target.class().name().to_string(),
                slot: slot.to_string(),
            })?;
        let what = format!("slot {} of {:?}", slot, target.key());
        let key = target.key().to_string();
        match source {
            SourceValue::Value(typed) => {
                self.check_compatible(&what, &typed.ty, &declared)?;
                let value = self.types.coerce(&declared, typed.value)?;
                self.log.push(Instr::SetToValue { key, slot, value });
            }
            SourceValue::Context(data_source) => {
                self.check_ours(&data_source)?;
                self.check_compatible(&what, data_source.data_type(), &declared)?;
                self.log.push(Instr::SetToContextData {
                    key,
                    slot,
                    source: data_source.key().to_string(),
                });
            }
            SourceValue::Slot(slot_source, source_slot) => {
                self.check_ours(&slot_source)?;
                Self::check_slot(&source_slot)?;
                let got = slot_source
                    .class()
                    .getter_slot_type(&source_slot.name, source_slot.arity())
                    .ok_or_else(|| CompileError::UnknownGetterSlot {
                        class: slot_source.class().name().to_string(),
                        slot: source_slot.to_string(),
                    })?;
                self.check_compatible(&what, &got, &declared)?;
                self.log.push(Instr::SetToContextSlot {
                    key,
                    slot,
                    source: slot_source.key().to_string(),
                    source_slot,
                });
            }
        }
        Ok(())
    }

    /// Invokes `action` on `target` with `params`, checked against the
    /// action's declared schema.
    pub fn act(&mut self, target: &Context, action: Slot, params: &Parameters) -> CompileResult<()> {
        self.check_ours(target)?;
        Self::check_slot(&action)?;
        let schema = target
            .class()
            .action_parameters(&action.name, action.arity())
            .ok_or_else(|| CompileError::UnknownAction {
                class: target.class().name().to_string(),
                action: action.to_string(),
            })?;
        let what = format!("action {} of {:?}", action, target.key());
        let checked = self.check_params(&what, schema, params)?;
        let (param_list, temp) = self.emit_params(checked);
        self.log.push(Instr::Act {
            key: target.key().to_string(),
            action,
            params: param_list,
        });
        self.delete_temp(temp);
        Ok(())
    }

    /// Unbinds `context` and emits its deletion. Every clone of the handle
    /// observes the unbinding; the key may be bound again afterwards.
    pub fn delete(&mut self, context: &Context) -> CompileResult<()> {
        self.check_ours(context)?;
        self.live.remove(context.key());
        context.unbind();
        self.log.push(Instr::Delete {
            key: context.key().to_string(),
        });
        Ok(())
    }

    /// Appends an instruction the runtime skips.
    pub fn noop(&mut self) {
        self.log.push(Instr::Noop);
    }

    /// Runs `f` with `context` and deletes the context on every exit path.
    /// An error from `f` wins over one from the deletion.
    pub fn scoped<T>(
        &mut self,
        context: Context,
        f: impl FnOnce(&mut Registry, &Context) -> CompileResult<T>,
    ) -> CompileResult<T> {
        let result = f(self, &context);
        let deleted = self.delete(&context);
        let value = result?;
        deleted?;
        Ok(value)
    }

    fn bind(&mut self, key: &str, class: Arc<dyn ContextClass>, data_type: TypeDescriptor) -> Context {
        let context = Context::bind(key.to_string(), self.serial, class, data_type);
        self.live.insert(key.to_string(), context.clone());
        context
    }

    fn check_wire_str(text: &str) -> CompileResult<()> {
        if text.contains('\0') {
            return Err(CompileError::StrContainsNul {
                text: text.to_string(),
            });
        }
        Ok(())
    }

    fn check_key(key: &str) -> CompileResult<()> {
        if key.is_empty() {
            return Err(CompileError::EmptyKey);
        }
        Self::check_wire_str(key)
    }

    // Slot names may be empty (array elements), so only the encoding is
    // checked here.
    fn check_slot(slot: &Slot) -> CompileResult<()> {
        Self::check_wire_str(&slot.name)
    }

    fn check_free(&self, key: &str) -> CompileResult<()> {
        Self::check_key(key)?;
        if self.live.contains_key(key) {
            return Err(CompileError::DuplicateKey {
                key: key.to_string(),
            });
        }
        Ok(())
    }

    fn check_ours(&self, context: &Context) -> CompileResult<()> {
        if context.registry_serial() != self.serial {
            return Err(CompileError::ForeignContext {
                key: context.key().to_string(),
            });
        }
        if !context.is_bound() {
            return Err(CompileError::UnboundContext {
                key: context.key().to_string(),
            });
        }
        Ok(())
    }

    fn check_compatible(
        &self,
        what: &str,
        got: &TypeDescriptor,
        want: &TypeDescriptor,
    ) -> CompileResult<()> {
        if self.types.compatible(got, want) {
            return Ok(());
        }
        Err(CompileError::TypeMismatch {
            what: what.to_string(),
            want: self.types.describe(want),
            got: self.types.describe(got),
        })
    }

    /// Validates every entry of `params` against `schema` without touching
    /// the log. Static values are coerced here, so emission cannot fail.
    fn check_params(
        &self,
        what: &str,
        schema: &ParameterSchema,
        params: &Parameters,
    ) -> CompileResult<CheckedParams> {
        let parent = match params.parent() {
            Some(parent) => {
                self.check_ours(parent)?;
                if parent.data_type() != &parameters_class().data_type() {
                    return Err(CompileError::NotParameters {
                        key: parent.key().to_string(),
                    });
                }
                Some(parent.key().to_string())
            }
            None => None,
        };

        let mut statics = Vec::new();
        let mut dynamics = Vec::new();
        for (name, source) in params.entries() {
            if name.is_empty() {
                return Err(CompileError::EmptyParameterName {
                    what: what.to_string(),
                });
            }
            Self::check_wire_str(name)?;
            let declared = schema
                .lookup(name)
                .ok_or_else(|| CompileError::UnknownParameter {
                    what: what.to_string(),
                    name: name.clone(),
                })?;
            let entry_what = format!("parameter {name:?} of {what}");
            match source {
                SourceValue::Value(typed) => {
                    self.check_compatible(&entry_what, &typed.ty, declared)?;
                    let value = self.types.coerce(declared, typed.value.clone())?;
                    statics.push(NamedValue::new(name.clone(), value));
                }
                SourceValue::Context(data_source) => {
                    self.check_ours(data_source)?;
                    self.check_compatible(&entry_what, data_source.data_type(), declared)?;
                    dynamics.push((name.clone(), DynSource::Data(data_source.key().to_string())));
                }
                SourceValue::Slot(slot_source, slot) => {
                    self.check_ours(slot_source)?;
                    Self::check_slot(slot)?;
                    let got = slot_source
                        .class()
                        .getter_slot_type(&slot.name, slot.arity())
                        .ok_or_else(|| CompileError::UnknownGetterSlot {
                            class: slot_source.class().name().to_string(),
                            slot: slot.to_string(),
                        })?;
                    self.check_compatible(&entry_what, &got, declared)?;
                    dynamics.push((
                        name.clone(),
                        DynSource::Slot(slot_source.key().to_string(), slot.clone()),
                    ));
                }
            }
        }

        Ok(CheckedParams {
            parent,
            statics,
            dynamics,
        })
    }

    /// Emits a validated parameter list and returns what the consuming
    /// instruction should carry. Lists with a parent or dynamic entries
    /// materialize under a temporary key the caller must delete after the
    /// consumer; the rest travel inline.
    fn emit_params(&mut self, checked: CheckedParams) -> (ParamList, Option<String>) {
        if !checked.needs_context() {
            let list = if checked.statics.is_empty() {
                ParamList::Empty
            } else {
                ParamList::Inline(checked.statics)
            };
            return (list, None);
        }
        let temp = self.temp_key();
        self.log.push(Instr::InitParameters {
            key: temp.clone(),
            parent: checked.parent,
            params: checked.statics,
        });
        self.emit_dynamics(&temp, checked.dynamics);
        (ParamList::Context(temp.clone()), Some(temp))
    }

    /// Emits one set instruction per dynamic entry, in reverse declaration
    /// order. The runtime prepends each applied entry to the materialized
    /// list, so the reversal lands the walked list in declaration order.
    fn emit_dynamics(&mut self, key: &str, dynamics: Vec<(String, DynSource)>) {
        for (name, source) in dynamics.into_iter().rev() {
            let slot = Slot::named(name);
            let instr = match source {
                DynSource::Data(source) => Instr::SetToContextData {
                    key: key.to_string(),
                    slot,
                    source,
                },
                DynSource::Slot(source, source_slot) => Instr::SetToContextSlot {
                    key: key.to_string(),
                    slot,
                    source,
                    source_slot,
                },
            };
            self.log.push(instr);
        }
    }

    fn delete_temp(&mut self, temp: Option<String>) {
        if let Some(key) = temp {
            self.log.push(Instr::Delete { key });
        }
    }

    /// Next temporary key. The counter never repeats within one registry,
    /// and keys already bound by the embedder are skipped.
    fn temp_key(&mut self) -> String {
        loop {
            let key = format!("{TEMP_KEY_PREFIX}{}", self.next_temp);
            self.next_temp += 1;
            if !self.live.contains_key(&key) {
                return key;
            }
        }
    }
}

impl Default for Registry {
    fn default() -> Registry {
        Registry::new()
    }
}
