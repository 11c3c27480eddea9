//! Image file assembly
//!
//! [`ImageFile`] lowers one registry, plus any extra named values, into a
//! single cluster: every instruction and operand becomes a block, the
//! top-level names become the contents list the header points at, and the
//! header itself carries the base address, end address, and magic bytes
//! the runtime checks before walking anything.
//!
//! Encoding fully materializes the image in memory; the only file
//! operation is one final write.

use std::fmt::Write as _;
use std::path::Path;
use std::rc::Rc;

use archi_image::{BlockCache, MemoryBlock, MemoryCluster, RelocTarget, Value, WORD};
use archi_ir::wire::{HEADER_SIZE, LIST_NODE_SIZE, MAGIC, NAMED_NODE_SIZE};
use archi_ir::{IrEncoder, WireWriter};
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{CompileError, CompileResult};
use crate::registry::Registry;

/// Name the instruction log appears under in the contents list.
pub const INSTRUCTIONS_CONTENT: &str = "archi.instructions";

/// One prepared contents entry, ready to stitch into the chain.
struct ContentEntry {
    name: Rc<MemoryBlock>,
    payload: Option<Rc<MemoryBlock>>,
    flags: u64,
    count: usize,
    size: usize,
    alignment: usize,
}

/// Assembles a registry and extra named values into an image.
pub struct ImageFile<'r> {
    registry: &'r Registry,
    extra: Vec<(String, Value)>,
}

impl<'r> ImageFile<'r> {
    /// An image carrying the registry's instruction log and nothing else.
    pub fn new(registry: &'r Registry) -> ImageFile<'r> {
        ImageFile {
            registry,
            extra: Vec::new(),
        }
    }

    /// Adds a named value to the contents list. Entries appear after the
    /// instruction log, in the order they were added.
    pub fn with_content(mut self, name: impl Into<String>, value: Value) -> ImageFile<'r> {
        self.extra.push((name.into(), value));
        self
    }

    /// Encodes everything into a fresh cluster with the header set. The
    /// cluster is not yet packed.
    pub fn build_cluster(&self) -> CompileResult<MemoryCluster> {
        let mut seen = FxHashSet::default();
        seen.insert(INSTRUCTIONS_CONTENT);
        for (name, _) in &self.extra {
            if name.contains('\0') {
                return Err(CompileError::StrContainsNul { text: name.clone() });
            }
            if !seen.insert(name.as_str()) {
                return Err(CompileError::DuplicateKey { key: name.clone() });
            }
        }

        let mut cache = BlockCache::new();
        let mut cluster = MemoryCluster::new();
        let mut encoder = IrEncoder::new(&mut cache, &mut cluster);

        let log = encoder.encode_log(self.registry.instructions())?;
        let mut entries = Vec::with_capacity(1 + self.extra.len());
        entries.push(ContentEntry {
            name: encoder.intern_str(INSTRUCTIONS_CONTENT)?,
            payload: log.head.clone(),
            flags: 0,
            count: log.len,
            size: LIST_NODE_SIZE,
            alignment: WORD,
        });
        for (name, value) in &self.extra {
            let layout = value.layout();
            entries.push(ContentEntry {
                name: encoder.intern_str(name)?,
                payload: encoder.intern_value(value)?,
                flags: value.flags(),
                count: layout.count,
                size: layout.size,
                alignment: layout.alignment,
            });
        }

        // Chain tail first so the header points at the first entry. The
        // instruction count goes into the tagged count field directly; an
        // empty log is a null head with count zero.
        let mut next: Option<Rc<MemoryBlock>> = None;
        for entry in entries.iter().rev() {
            let mut writer = WireWriter::with_capacity(NAMED_NODE_SIZE / WORD);
            writer.pointer(next.as_ref());
            writer.pointer(Some(&entry.name));
            writer.pointer(entry.payload.as_ref());
            writer.word(0);
            writer.flags(entry.flags);
            writer.word(entry.count);
            writer.word(entry.size);
            writer.word(entry.alignment);
            let node = writer.finish()?;
            cluster.push(node.clone())?;
            next = Some(node);
        }

        let mut writer = WireWriter::with_capacity(HEADER_SIZE / WORD);
        writer.reloc_to(RelocTarget::ImageBase);
        writer.reloc_to(RelocTarget::ImageEnd);
        writer.bytes(&MAGIC);
        writer.pointer(next.as_ref());
        cluster.set_header(writer.finish()?)?;

        Ok(cluster)
    }

    /// Builds, packs, and marshals the image for mapping at `base`.
    pub fn encode_at(&self, base: usize) -> CompileResult<Vec<u8>> {
        let mut cluster = self.build_cluster()?;
        cluster.pack();
        Ok(cluster.marshal(base)?)
    }

    /// Encodes the image and writes it in one operation.
    pub fn write_to(&self, path: impl AsRef<Path>, base: usize) -> CompileResult<()> {
        let bytes = self.encode_at(base)?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    /// Summary of the image for external launchers. Derived from the same
    /// packed layout the encode produces; building it never changes the
    /// image bytes.
    pub fn manifest(&self) -> CompileResult<Manifest> {
        let mut cluster = self.build_cluster()?;
        cluster.pack();
        let totals = cluster.totals();
        let mut contents = Vec::with_capacity(1 + self.extra.len());
        contents.push(INSTRUCTIONS_CONTENT.to_string());
        contents.extend(self.extra.iter().map(|(name, _)| name.clone()));
        Ok(Manifest {
            contents,
            instruction_count: self.registry.instructions().len(),
            required_keys: self.registry.required_keys().to_vec(),
            live_keys: self.registry.live_keys(),
            block_count: cluster.len() + 1,
            byte_size: totals.size,
        })
    }
}

/// What an image contains, without mapping it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Top-level content names, instruction log first
    pub contents: Vec<String>,
    /// Number of instructions in the log
    pub instruction_count: usize,
    /// Keys the runtime environment must bind before replaying
    pub required_keys: Vec<String>,
    /// Keys still bound when the image was encoded, sorted
    pub live_keys: Vec<String>,
    /// Number of blocks in the image, header included
    pub block_count: usize,
    /// Encoded image size in bytes
    pub byte_size: usize,
}

impl Manifest {
    /// Renders the manifest as pretty-printed JSON.
    pub fn to_json(&self) -> CompileResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Hex SHA-256 digest of an encoded image, for reproducibility checks.
pub fn image_digest(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        write!(out, "{byte:02x}").unwrap();
    }
    out
}
