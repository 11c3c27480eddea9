//! Archi memory images
//!
//! Building blocks for flat, relocatable memory images: values with array
//! layouts, memory blocks with deferred relocations, an interning cache,
//! and clusters that pack and marshal into the final byte image.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod block;
pub mod cache;
pub mod cluster;
pub mod error;
pub mod value;

pub use block::{BlockId, MemoryBlock, Reloc, RelocTarget};
pub use cache::{BlockCache, CacheKey};
pub use cluster::{align_up, MemoryCluster, Placement, Totals};
pub use error::{ImageError, ImageResult};
pub use value::{ensure_flags, ArrayLayout, Value, FLAG_BITS, MAX_FLAGS, WORD};
