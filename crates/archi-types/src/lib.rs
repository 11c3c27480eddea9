//! Archi type system
//!
//! Descriptors and compatibility checking for the typed front end. Slots,
//! parameters, and context data carry a [`TypeDescriptor`]; the
//! [`TypeTable`] decides whether one descriptor may flow into another and
//! runs per-type value constructors.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod descriptor;
pub mod error;
pub mod table;

pub use descriptor::{TypeDescriptor, TypeId};
pub use error::TypeError;
pub use table::{builtin, Coercion, TypeTable};
