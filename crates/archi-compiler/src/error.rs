//! Compilation errors
//!
//! Every front-end operation validates completely before it appends
//! anything to the instruction log, so an error here always leaves the
//! log exactly as it was.

use archi_image::ImageError;
use archi_types::TypeError;
use thiserror::Error;

/// Result alias for compilation operations
pub type CompileResult<T> = Result<T, CompileError>;

/// Errors raised while building an object graph or encoding an image
#[derive(Debug, Error)]
pub enum CompileError {
    /// A key bound while an earlier binding for it is still live
    #[error("key {key:?} is already bound")]
    DuplicateKey {
        /// The contested key
        key: String,
    },

    /// An empty context key
    #[error("context keys must be non-empty")]
    EmptyKey,

    /// A string that cannot be marshaled as a NUL-terminated wire string
    #[error("string {text:?} contains a NUL byte")]
    StrContainsNul {
        /// The offending string
        text: String,
    },

    /// A context handle used after its key was deleted
    #[error("context {key:?} is no longer bound")]
    UnboundContext {
        /// Key the handle was bound to
        key: String,
    },

    /// A context handle passed to a registry that did not create it
    #[error("context {key:?} belongs to a different registry")]
    ForeignContext {
        /// Key of the foreign handle
        key: String,
    },

    /// A setter slot the target's class does not declare
    #[error("class {class:?} has no setter slot {slot}")]
    UnknownSetterSlot {
        /// Class of the target context
        class: String,
        /// Slot that was addressed
        slot: String,
    },

    /// A getter slot the source's class does not declare
    #[error("class {class:?} has no getter slot {slot}")]
    UnknownGetterSlot {
        /// Class of the source context
        class: String,
        /// Slot that was addressed
        slot: String,
    },

    /// An action the class does not declare
    #[error("class {class:?} has no action {action}")]
    UnknownAction {
        /// Class of the context acted on
        class: String,
        /// Action that was invoked
        action: String,
    },

    /// A class used as a factory target without creation parameters
    #[error("class {class:?} declares no creation parameters")]
    NotConstructible {
        /// The class name
        class: String,
    },

    /// A parameter name the consumer's schema does not declare
    #[error("unknown parameter {name:?} for {what}")]
    UnknownParameter {
        /// What the parameters were destined for
        what: String,
        /// The undeclared name
        name: String,
    },

    /// A parameter entry with an empty name
    #[error("empty parameter name for {what}")]
    EmptyParameterName {
        /// What the parameters were destined for
        what: String,
    },

    /// A parent that is not a parameter-list context
    #[error("context {key:?} cannot be a parameter parent: not a parameter list")]
    NotParameters {
        /// Key of the rejected parent
        key: String,
    },

    /// A value or source whose type cannot flow into its destination
    #[error("type mismatch for {what}: expected {want}, got {got}")]
    TypeMismatch {
        /// The destination being written
        what: String,
        /// Declared type of the destination
        want: String,
        /// Type of the value that was offered
        got: String,
    },

    /// An array context declared with no elements
    #[error("array context {key:?} must have at least one element")]
    EmptyArray {
        /// Key of the rejected array
        key: String,
    },

    /// Error from the memory image layer
    #[error(transparent)]
    Image(#[from] ImageError),

    /// Error from the type table
    #[error(transparent)]
    Type(#[from] TypeError),

    /// Failure writing an image file
    #[error("failed to write image: {0}")]
    Io(#[from] std::io::Error),

    /// Failure rendering a manifest
    #[error("failed to render manifest: {0}")]
    Json(#[from] serde_json::Error),
}
