//! The archi instruction set
//!
//! A compiled image carries a log of instructions the runtime replays to
//! rebuild the object graph. The set is closed: every instruction the
//! format can express is a variant of [`Instr`], and every variant maps to
//! exactly one [`Opcode`] word on the wire.

use archi_image::Value;
use std::fmt;

/// Instruction discriminant, stored as the first word of every encoded
/// instruction.
#[repr(u64)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    /// Does nothing
    Noop = 0,
    /// Drops a key binding and finalizes its context
    Delete = 1,
    /// Binds a key to a copy of an existing context
    Copy = 2,
    /// Creates a parameter-list context
    InitParameters = 3,
    /// Creates a context holding a raw tagged value
    InitPointer = 4,
    /// Creates a pointer-array context
    InitArray = 5,
    /// Creates a context from a factory context
    InitFromContext = 6,
    /// Creates a context from a slot of a factory context
    InitFromSlot = 7,
    /// Writes a raw tagged value into a slot
    SetToValue = 8,
    /// Writes another context's data into a slot
    SetToContextData = 9,
    /// Writes another context's slot into a slot
    SetToContextSlot = 10,
    /// Invokes an action on a context
    Act = 11,
}

impl Opcode {
    /// Decodes an opcode word. Anything outside the closed set is `None`.
    pub fn from_word(word: usize) -> Option<Opcode> {
        match word {
            0 => Some(Opcode::Noop),
            1 => Some(Opcode::Delete),
            2 => Some(Opcode::Copy),
            3 => Some(Opcode::InitParameters),
            4 => Some(Opcode::InitPointer),
            5 => Some(Opcode::InitArray),
            6 => Some(Opcode::InitFromContext),
            7 => Some(Opcode::InitFromSlot),
            8 => Some(Opcode::SetToValue),
            9 => Some(Opcode::SetToContextData),
            10 => Some(Opcode::SetToContextSlot),
            11 => Some(Opcode::Act),
            _ => None,
        }
    }

    /// Wire form of this opcode.
    pub fn to_word(self) -> usize {
        self as u64 as usize
    }

    /// Uppercase mnemonic, as the runtime's trace output spells it.
    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Noop => "NOOP",
            Opcode::Delete => "DELETE",
            Opcode::Copy => "COPY",
            Opcode::InitParameters => "INIT_PARAMETERS",
            Opcode::InitPointer => "INIT_POINTER",
            Opcode::InitArray => "INIT_ARRAY",
            Opcode::InitFromContext => "INIT_FROM_CONTEXT",
            Opcode::InitFromSlot => "INIT_FROM_SLOT",
            Opcode::SetToValue => "SET_TO_VALUE",
            Opcode::SetToContextData => "SET_TO_CONTEXT_DATA",
            Opcode::SetToContextSlot => "SET_TO_CONTEXT_SLOT",
            Opcode::Act => "ACT",
        }
    }
}

/// A slot or action reference: a name plus the indices that select into it.
///
/// A plain slot has no indices. An element of an indexed slot family keeps
/// the shared name and carries its index tuple, so `layers[2]` and
/// `layers[5]` intern one name and two distinct index arrays.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Slot {
    /// Slot name, possibly shared by many indexed elements
    pub name: String,
    /// Index tuple, empty for plain slots
    pub indices: Vec<usize>,
}

impl Slot {
    /// Plain slot with no indices.
    pub fn named(name: impl Into<String>) -> Slot {
        Slot {
            name: name.into(),
            indices: Vec::new(),
        }
    }

    /// Indexed element of a slot family.
    pub fn indexed(name: impl Into<String>, indices: Vec<usize>) -> Slot {
        Slot {
            name: name.into(),
            indices,
        }
    }

    /// Number of indices, the arity schemas discriminate on.
    pub fn arity(&self) -> usize {
        self.indices.len()
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        for index in &self.indices {
            write!(f, "[{index}]")?;
        }
        Ok(())
    }
}

/// One entry of an inline parameter list.
#[derive(Debug, Clone)]
pub struct NamedValue {
    /// Parameter name
    pub name: String,
    /// Raw value bound to it
    pub value: Value,
}

impl NamedValue {
    /// Creates a named entry.
    pub fn new(name: impl Into<String>, value: Value) -> NamedValue {
        NamedValue {
            name: name.into(),
            value,
        }
    }
}

/// How an instruction carries its parameters.
///
/// The inline and keyed forms are mutually exclusive on the wire: an
/// instruction encodes either a pointer to an inline list of named raw
/// values, or the key of a parameter context assembled by earlier
/// instructions, never both.
#[derive(Debug, Clone)]
pub enum ParamList {
    /// No parameters
    Empty,
    /// Static values embedded in the image
    Inline(Vec<NamedValue>),
    /// Key of a previously initialized parameter context
    Context(String),
}

impl ParamList {
    /// Whether this list contributes nothing to the wire encoding.
    pub fn is_empty(&self) -> bool {
        match self {
            ParamList::Empty => true,
            ParamList::Inline(values) => values.is_empty(),
            ParamList::Context(_) => false,
        }
    }
}

/// One instruction of the replay log.
#[derive(Debug, Clone)]
pub enum Instr {
    /// Does nothing; a placeholder the runtime skips
    Noop,
    /// Unbinds `key` and finalizes the context it named
    Delete {
        /// Key to unbind
        key: String,
    },
    /// Binds `key` to a copy of the context named by `original`
    Copy {
        /// Key receiving the copy
        key: String,
        /// Key of the context being copied
        original: String,
    },
    /// Binds `key` to a fresh parameter list, optionally chained to a
    /// parent list whose entries it overrides
    InitParameters {
        /// Key receiving the list
        key: String,
        /// Key of the parent parameter context
        parent: Option<String>,
        /// Entries set at creation
        params: Vec<NamedValue>,
    },
    /// Binds `key` to a context holding one raw value
    InitPointer {
        /// Key receiving the context
        key: String,
        /// Value the context holds
        value: Value,
    },
    /// Binds `key` to an array of `count` null pointers
    InitArray {
        /// Key receiving the array
        key: String,
        /// Number of elements
        count: usize,
        /// Flags stored in the array's tagged value
        flags: u64,
    },
    /// Binds `key` to a context built by the factory context at `source`
    InitFromContext {
        /// Key receiving the new context
        key: String,
        /// Key of the factory context
        source: String,
        /// Creation parameters
        params: ParamList,
    },
    /// Binds `key` to a context built from one slot of the factory context
    InitFromSlot {
        /// Key receiving the new context
        key: String,
        /// Key of the factory context
        source: String,
        /// Slot of the factory the new context is built from
        slot: Slot,
        /// Creation parameters
        params: ParamList,
    },
    /// Writes a raw value into `slot` of the context at `key`
    SetToValue {
        /// Key of the target context
        key: String,
        /// Slot receiving the value
        slot: Slot,
        /// Value written
        value: Value,
    },
    /// Writes the data of the context at `source` into `slot`
    SetToContextData {
        /// Key of the target context
        key: String,
        /// Slot receiving the data
        slot: Slot,
        /// Key of the context whose data is read
        source: String,
    },
    /// Writes `source_slot` of the context at `source` into `slot`
    SetToContextSlot {
        /// Key of the target context
        key: String,
        /// Slot receiving the value
        slot: Slot,
        /// Key of the context whose slot is read
        source: String,
        /// Slot of the source context
        source_slot: Slot,
    },
    /// Invokes `action` on the context at `key`
    Act {
        /// Key of the context acted on
        key: String,
        /// Action to invoke
        action: Slot,
        /// Action parameters
        params: ParamList,
    },
}

impl Instr {
    /// Opcode this instruction encodes to.
    pub fn opcode(&self) -> Opcode {
        match self {
            Instr::Noop => Opcode::Noop,
            Instr::Delete { .. } => Opcode::Delete,
            Instr::Copy { .. } => Opcode::Copy,
            Instr::InitParameters { .. } => Opcode::InitParameters,
            Instr::InitPointer { .. } => Opcode::InitPointer,
            Instr::InitArray { .. } => Opcode::InitArray,
            Instr::InitFromContext { .. } => Opcode::InitFromContext,
            Instr::InitFromSlot { .. } => Opcode::InitFromSlot,
            Instr::SetToValue { .. } => Opcode::SetToValue,
            Instr::SetToContextData { .. } => Opcode::SetToContextData,
            Instr::SetToContextSlot { .. } => Opcode::SetToContextSlot,
            Instr::Act { .. } => Opcode::Act,
        }
    }

    /// Key the instruction binds or mutates, if it has one.
    pub fn key(&self) -> Option<&str> {
        match self {
            Instr::Noop => None,
            Instr::Delete { key }
            | Instr::Copy { key, .. }
            | Instr::InitParameters { key, .. }
            | Instr::InitPointer { key, .. }
            | Instr::InitArray { key, .. }
            | Instr::InitFromContext { key, .. }
            | Instr::InitFromSlot { key, .. }
            | Instr::SetToValue { key, .. }
            | Instr::SetToContextData { key, .. }
            | Instr::SetToContextSlot { key, .. }
            | Instr::Act { key, .. } => Some(key),
        }
    }
}
