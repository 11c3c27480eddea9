//! Image construction errors

use crate::block::BlockId;
use thiserror::Error;

/// Result alias for image operations
pub type ImageResult<T> = Result<T, ImageError>;

/// Errors raised while building, packing, or marshaling a memory image
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ImageError {
    /// Flag word uses more bits than the tagged representation reserves
    #[error("flag value {flags:#x} does not fit in {bits} bits")]
    FlagsOverflow {
        /// Rejected flag value
        flags: u64,
        /// Number of usable flag bits
        bits: u32,
    },

    /// Array layout with zero elements
    #[error("array layout must describe at least one element")]
    ZeroCount,

    /// Multi-element array layout with zero-sized elements
    #[error("array layout with {count} elements must have a nonzero element size")]
    ZeroSizeArray {
        /// Declared element count
        count: usize,
    },

    /// Alignment that is not a power of two
    #[error("alignment {alignment} is not a power of two")]
    AlignmentNotPowerOfTwo {
        /// Rejected alignment
        alignment: usize,
    },

    /// Element size incompatible with the element alignment
    #[error("element size {size} is not a multiple of alignment {alignment}")]
    MisalignedElementSize {
        /// Declared element size
        size: usize,
        /// Declared element alignment
        alignment: usize,
    },

    /// Payload length disagrees with the layout
    #[error("payload is {actual} bytes but the layout describes {expected}")]
    PayloadSizeMismatch {
        /// Byte length implied by the layout
        expected: usize,
        /// Byte length of the provided payload
        actual: usize,
    },

    /// Block size override smaller than the payload it must hold
    #[error("block size override {size} is smaller than the {payload}-byte payload")]
    SizeOverrideTooSmall {
        /// Payload length in bytes
        payload: usize,
        /// Rejected size override
        size: usize,
    },

    /// Relocation field outside the bytes of its block
    #[error("relocation at offset {offset} does not fit in a {size}-byte block")]
    RelocOutOfBounds {
        /// Field offset of the relocation
        offset: usize,
        /// Size of the block carrying it
        size: usize,
    },

    /// Two distinct blocks registered under one cache key
    #[error("cache key {key} is already bound to a different block")]
    CacheConflict {
        /// Display form of the conflicting key
        key: String,
    },

    /// Block appended to a cluster that already holds it
    #[error("{id} is already part of this cluster")]
    DuplicateBlock {
        /// Offending block
        id: BlockId,
    },

    /// Block appended to a cluster while owned by another cluster
    #[error("{id} already belongs to another cluster")]
    BlockInUse {
        /// Offending block
        id: BlockId,
    },

    /// Header installed twice on one cluster
    #[error("cluster already has a header block")]
    HeaderAlreadySet,

    /// Relocation target that the placement pass never assigned an address
    #[error("{id} is referenced by a relocation but was never placed")]
    UnplacedBlock {
        /// Block missing from the placement
        id: BlockId,
    },
}
