//! Memory blocks and relocations
//!
//! A [`MemoryBlock`] pairs a [`Value`] with the relocations that must be
//! patched into its bytes once final addresses are known. Blocks are handed
//! around as `Rc` so relocations can name their target directly; the actual
//! address is resolved only during marshaling, against a placement computed
//! for the whole cluster.

use crate::error::{ImageError, ImageResult};
use crate::value::{Value, WORD};
use std::cell::Cell;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_BLOCK_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_CLUSTER_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identity of a block within the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(u64);

impl BlockId {
    fn next() -> BlockId {
        BlockId(NEXT_BLOCK_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "block#{}", self.0)
    }
}

/// Unique identity of a cluster, used to enforce single ownership of blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClusterId(u64);

impl ClusterId {
    pub(crate) fn next() -> ClusterId {
        ClusterId(NEXT_CLUSTER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// What a relocation field should point at once addresses exist.
#[derive(Debug, Clone)]
pub enum RelocTarget {
    /// Final address of another block
    Block(Rc<MemoryBlock>),
    /// Base address the image was marshaled for
    ImageBase,
    /// One past the last byte of the marshaled image
    ImageEnd,
    /// The null pointer
    Null,
}

/// A pointer-sized field inside a block that must be patched at marshal
/// time.
#[derive(Debug, Clone)]
pub struct Reloc {
    /// Byte offset of the field within the block
    pub offset: usize,
    /// Address the field receives
    pub target: RelocTarget,
}

impl Reloc {
    /// Relocation pointing at another block.
    pub fn block(offset: usize, target: Rc<MemoryBlock>) -> Reloc {
        Reloc {
            offset,
            target: RelocTarget::Block(target),
        }
    }

    /// Relocation receiving the image base address.
    pub fn image_base(offset: usize) -> Reloc {
        Reloc {
            offset,
            target: RelocTarget::ImageBase,
        }
    }

    /// Relocation receiving the image end address.
    pub fn image_end(offset: usize) -> Reloc {
        Reloc {
            offset,
            target: RelocTarget::ImageEnd,
        }
    }

    /// Relocation cleared to null.
    pub fn null(offset: usize) -> Reloc {
        Reloc {
            offset,
            target: RelocTarget::Null,
        }
    }
}

/// A value plus its relocations, ready to be placed in a cluster.
///
/// The block's size is normally the payload size of its value; a size
/// override reserves extra zeroed space after the payload. Each block
/// belongs to at most one cluster for its whole lifetime.
#[derive(Debug)]
pub struct MemoryBlock {
    id: BlockId,
    value: Value,
    size: usize,
    relocs: Vec<Reloc>,
    owner: Cell<Option<ClusterId>>,
}

impl MemoryBlock {
    /// Plain data block with no relocations.
    pub fn new(value: Value) -> Rc<MemoryBlock> {
        let size = value.byte_len();
        Rc::new(MemoryBlock {
            id: BlockId::next(),
            value,
            size,
            relocs: Vec::new(),
            owner: Cell::new(None),
        })
    }

    /// Block whose bytes contain pointer fields. Every relocation must fit
    /// inside the payload.
    pub fn with_relocs(value: Value, relocs: Vec<Reloc>) -> ImageResult<Rc<MemoryBlock>> {
        let size = value.byte_len();
        for reloc in &relocs {
            if reloc.offset + WORD > size {
                return Err(ImageError::RelocOutOfBounds {
                    offset: reloc.offset,
                    size,
                });
            }
        }
        Ok(Rc::new(MemoryBlock {
            id: BlockId::next(),
            value,
            size,
            relocs,
            owner: Cell::new(None),
        }))
    }

    /// Block occupying `size` bytes, zero-filled past the payload.
    pub fn with_size(value: Value, size: usize) -> ImageResult<Rc<MemoryBlock>> {
        if size < value.byte_len() {
            return Err(ImageError::SizeOverrideTooSmall {
                payload: value.byte_len(),
                size,
            });
        }
        Ok(Rc::new(MemoryBlock {
            id: BlockId::next(),
            value,
            size,
            relocs: Vec::new(),
            owner: Cell::new(None),
        }))
    }

    /// Identity of this block.
    pub fn id(&self) -> BlockId {
        self.id
    }

    /// The value this block carries.
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Bytes this block occupies in the image.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Address alignment this block requires.
    pub fn alignment(&self) -> usize {
        self.value.alignment()
    }

    /// Relocations to patch into this block.
    pub fn relocs(&self) -> &[Reloc] {
        &self.relocs
    }

    pub(crate) fn owner(&self) -> Option<ClusterId> {
        self.owner.get()
    }

    pub(crate) fn claim(&self, cluster: ClusterId) {
        self.owner.set(Some(cluster));
    }
}
