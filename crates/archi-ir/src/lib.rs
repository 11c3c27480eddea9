//! Archi instruction set and wire encoding
//!
//! The closed instruction set a compiled image replays, the word-oriented
//! wire layout of each structure, and the encoder that lowers instruction
//! logs into relocatable memory blocks.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod encode;
pub mod instr;
pub mod pretty;
pub mod wire;

pub use encode::{EncodedLog, IrEncoder};
pub use instr::{Instr, NamedValue, Opcode, ParamList, Slot};
pub use pretty::PrettyPrint;
pub use wire::WireWriter;
