//! Block interning
//!
//! The cache maps content keys to already-encoded blocks so that repeated
//! strings, index tuples, and shared values marshal to a single allocation.
//! Strings and index tuples are interned by content; values are interned by
//! identity, since two equal payloads with distinct provenance must stay
//! distinct in the image.

use crate::block::MemoryBlock;
use crate::error::{ImageError, ImageResult};
use crate::value::Value;
use rustc_hash::FxHashMap;
use std::fmt;
use std::rc::Rc;

/// Key under which a block is interned.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// String contents, without the wire terminator
    Str(Box<str>),
    /// Index tuple contents
    Indices(Box<[usize]>),
    /// Identity of a shared [`Value`]
    Value(usize),
}

impl CacheKey {
    /// Key for a string interned by content.
    pub fn str(s: &str) -> CacheKey {
        CacheKey::Str(s.into())
    }

    /// Key for an index tuple interned by content.
    pub fn indices(indices: &[usize]) -> CacheKey {
        CacheKey::Indices(indices.into())
    }

    /// Key for a value interned by identity.
    pub fn value(value: &Value) -> CacheKey {
        CacheKey::Value(value.identity())
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheKey::Str(s) => write!(f, "str {s:?}"),
            CacheKey::Indices(ix) => write!(f, "indices {ix:?}"),
            CacheKey::Value(id) => write!(f, "value {id:#x}"),
        }
    }
}

/// Interning table from cache keys to blocks.
#[derive(Debug, Default)]
pub struct BlockCache {
    map: FxHashMap<CacheKey, Rc<MemoryBlock>>,
}

impl BlockCache {
    /// Creates an empty cache.
    pub fn new() -> BlockCache {
        BlockCache::default()
    }

    /// Number of interned blocks.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Looks up the block interned under `key`.
    pub fn get(&self, key: &CacheKey) -> Option<Rc<MemoryBlock>> {
        self.map.get(key).cloned()
    }

    /// Registers `block` under `key`. Re-registering the same block is a
    /// no-op; registering a different block under a live key is an error.
    pub fn insert(&mut self, key: CacheKey, block: Rc<MemoryBlock>) -> ImageResult<()> {
        if let Some(existing) = self.map.get(&key) {
            if existing.id() != block.id() {
                return Err(ImageError::CacheConflict {
                    key: key.to_string(),
                });
            }
            return Ok(());
        }
        self.map.insert(key, block);
        Ok(())
    }

    /// Returns the block interned under `key`, building and registering it
    /// on the first request.
    pub fn intern<F>(&mut self, key: CacheKey, make: F) -> ImageResult<Rc<MemoryBlock>>
    where
        F: FnOnce() -> ImageResult<Rc<MemoryBlock>>,
    {
        if let Some(block) = self.map.get(&key) {
            return Ok(block.clone());
        }
        let block = make()?;
        self.map.insert(key, block.clone());
        Ok(block)
    }
}
