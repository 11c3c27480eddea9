//! Type table errors

use crate::descriptor::TypeId;
use thiserror::Error;

/// Errors raised by the type table
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TypeError {
    /// A type name registered twice
    #[error("type {name:?} is already registered")]
    DuplicateType {
        /// Name of the offending type
        name: String,
    },

    /// Reference to a type id the table never issued
    #[error("unknown type id {id}")]
    UnknownId {
        /// The unknown id
        id: TypeId,
    },

    /// The table ran out of type ids
    #[error("type table is full")]
    TableFull,

    /// A value constructor rejected its input
    #[error("cannot coerce value to {name}: {reason}")]
    CoercionFailed {
        /// Target type name
        name: String,
        /// Constructor's explanation
        reason: String,
    },
}
