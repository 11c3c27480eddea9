//! Wire layout of encoded instructions
//!
//! Every structure the runtime reads is a sequence of machine words in
//! native byte order; the image is mapped, never parsed. This module fixes
//! the field offsets of those structures and provides [`WireWriter`], which
//! assembles one structure's bytes while collecting the relocations for its
//! pointer fields.
//!
//! The tagged value is the common shape for data references: a pointer to
//! the payload, a reference count word the runtime owns (always zero in a
//! fresh image), a flag word, and the payload's element count, size, and
//! alignment.

use archi_image::{ArrayLayout, ImageResult, MemoryBlock, Reloc, RelocTarget, Value, WORD};
use std::rc::Rc;

// The flag field shares its word with two reserved tag bits, which only
// fits when words are 64 bits wide.
const _: () = assert!(WORD == 8);

/// Magic bytes at the head of every image file.
pub const MAGIC: [u8; 8] = *b"[archi]\0";

/// Header: base address field.
pub const HEADER_BASE: usize = 0;
/// Header: end address field.
pub const HEADER_END: usize = WORD;
/// Header: magic bytes.
pub const HEADER_MAGIC: usize = 2 * WORD;
/// Header: pointer to the first content list node.
pub const HEADER_CONTENTS: usize = 2 * WORD + MAGIC.len();
/// Total header size in bytes.
pub const HEADER_SIZE: usize = HEADER_CONTENTS + WORD;

/// Tagged value: payload pointer.
pub const TAGGED_PTR: usize = 0;
/// Tagged value: reference count word, zero at encode time.
pub const TAGGED_REFCOUNT: usize = WORD;
/// Tagged value: flag word.
pub const TAGGED_FLAGS: usize = 2 * WORD;
/// Tagged value: element count.
pub const TAGGED_COUNT: usize = 3 * WORD;
/// Tagged value: element size.
pub const TAGGED_SIZE_FIELD: usize = 4 * WORD;
/// Tagged value: element alignment.
pub const TAGGED_ALIGNMENT: usize = 5 * WORD;
/// Total tagged value size in bytes.
pub const TAGGED_SIZE: usize = 6 * WORD;

/// Named list node: pointer to the next node.
pub const NAMED_NODE_NEXT: usize = 0;
/// Named list node: pointer to the entry name.
pub const NAMED_NODE_NAME: usize = WORD;
/// Named list node: inline tagged value of the entry.
pub const NAMED_NODE_VALUE: usize = 2 * WORD;
/// Total named list node size in bytes.
pub const NAMED_NODE_SIZE: usize = 2 * WORD + TAGGED_SIZE;

/// Instruction list node: pointer to the next node.
pub const LIST_NODE_NEXT: usize = 0;
/// Instruction list node: pointer to the encoded instruction.
pub const LIST_NODE_INSTR: usize = WORD;
/// Total instruction list node size in bytes.
pub const LIST_NODE_SIZE: usize = 2 * WORD;

/// Slot reference: name pointer, index array pointer, index count.
pub const SLOT_REF_SIZE: usize = 3 * WORD;

/// Assembles the bytes and relocations of one wire structure.
///
/// Words are appended in field order; pointer fields are written as zero
/// and recorded as relocations against their target block. [`finish`]
/// yields a word-aligned block ready to join a cluster.
///
/// [`finish`]: WireWriter::finish
#[derive(Debug, Default)]
pub struct WireWriter {
    buf: Vec<u8>,
    relocs: Vec<Reloc>,
}

impl WireWriter {
    /// Creates an empty writer.
    pub fn new() -> WireWriter {
        WireWriter::default()
    }

    /// Creates a writer sized for `words` machine words.
    pub fn with_capacity(words: usize) -> WireWriter {
        WireWriter {
            buf: Vec::with_capacity(words * WORD),
            relocs: Vec::new(),
        }
    }

    /// Current length in bytes, the offset the next field lands at.
    pub fn offset(&self) -> usize {
        self.buf.len()
    }

    /// Appends an immediate word.
    pub fn word(&mut self, value: usize) {
        self.buf.extend_from_slice(&value.to_ne_bytes());
    }

    /// Appends a flag word.
    pub fn flags(&mut self, flags: u64) {
        self.word(flags as usize);
    }

    /// Appends raw bytes.
    pub fn bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Appends a pointer field targeting `block`, or null.
    pub fn pointer(&mut self, block: Option<&Rc<MemoryBlock>>) {
        match block {
            Some(block) => self.reloc_to(RelocTarget::Block(block.clone())),
            None => self.reloc_to(RelocTarget::Null),
        }
    }

    /// Appends a pointer field with an explicit relocation target.
    pub fn reloc_to(&mut self, target: RelocTarget) {
        self.relocs.push(Reloc {
            offset: self.buf.len(),
            target,
        });
        self.word(0);
    }

    /// Appends a tagged value: payload pointer, zero reference count,
    /// flags, and the payload layout.
    pub fn tagged(&mut self, data: Option<&Rc<MemoryBlock>>, flags: u64, layout: ArrayLayout) {
        self.pointer(data);
        self.word(0);
        self.flags(flags);
        self.word(layout.count);
        self.word(layout.size);
        self.word(layout.alignment);
    }

    /// Appends a slot reference: name pointer, index array pointer, index
    /// count.
    pub fn slot_ref(
        &mut self,
        name: &Rc<MemoryBlock>,
        indices: Option<&Rc<MemoryBlock>>,
        count: usize,
    ) {
        self.pointer(Some(name));
        self.pointer(indices);
        self.word(count);
    }

    /// Seals the structure into a word-aligned block.
    pub fn finish(self) -> ImageResult<Rc<MemoryBlock>> {
        let layout = ArrayLayout::new(1, self.buf.len(), WORD)?;
        let value = Value::new(self.buf, layout, 0)?;
        MemoryBlock::with_relocs(value, self.relocs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_constants_are_consistent() {
        assert_eq!(HEADER_SIZE, 4 * WORD);
        assert_eq!(TAGGED_SIZE, TAGGED_ALIGNMENT + WORD);
        assert_eq!(NAMED_NODE_SIZE, NAMED_NODE_VALUE + TAGGED_SIZE);
        assert_eq!(MAGIC.len(), 8);
        assert_eq!(&MAGIC[..7], b"[archi]");
        assert_eq!(MAGIC[7], 0);
    }

    #[test]
    fn writer_emits_words_in_order() {
        let mut writer = WireWriter::new();
        writer.word(3);
        writer.word(usize::MAX);
        assert_eq!(writer.offset(), 2 * WORD);

        let block = writer.finish().unwrap();
        assert_eq!(block.size(), 2 * WORD);
        assert_eq!(block.alignment(), WORD);
        assert_eq!(&block.value().payload()[..WORD], &3usize.to_ne_bytes());
        assert_eq!(&block.value().payload()[WORD..], &usize::MAX.to_ne_bytes());
    }

    #[test]
    fn pointer_fields_become_relocations() {
        let target = MemoryBlock::new(Value::from_u64(1));
        let mut writer = WireWriter::new();
        writer.word(7);
        writer.pointer(Some(&target));
        writer.pointer(None);
        writer.reloc_to(RelocTarget::ImageEnd);

        let block = writer.finish().unwrap();
        let offsets: Vec<usize> = block.relocs().iter().map(|r| r.offset).collect();
        assert_eq!(offsets, vec![WORD, 2 * WORD, 3 * WORD]);
        assert!(matches!(block.relocs()[0].target, RelocTarget::Block(_)));
        assert!(matches!(block.relocs()[1].target, RelocTarget::Null));
        assert!(matches!(block.relocs()[2].target, RelocTarget::ImageEnd));
    }

    #[test]
    fn tagged_values_embed_the_layout() {
        let payload = Value::index_array(&[5, 6, 7]);
        let data = MemoryBlock::new(payload.clone());
        let mut writer = WireWriter::new();
        writer.tagged(Some(&data), 0x9, payload.layout());
        assert_eq!(writer.offset(), TAGGED_SIZE);

        let block = writer.finish().unwrap();
        let bytes = block.value().payload();
        let word_at = |off: usize| {
            let mut buf = [0u8; WORD];
            buf.copy_from_slice(&bytes[off..off + WORD]);
            usize::from_ne_bytes(buf)
        };
        assert_eq!(word_at(TAGGED_REFCOUNT), 0);
        assert_eq!(word_at(TAGGED_FLAGS), 0x9);
        assert_eq!(word_at(TAGGED_COUNT), 3);
        assert_eq!(word_at(TAGGED_SIZE_FIELD), WORD);
        assert_eq!(word_at(TAGGED_ALIGNMENT), WORD);
    }
}
