//! Encoding instructions into memory blocks
//!
//! The encoder turns [`Instr`] values into wire structures inside a
//! cluster, interning strings and index tuples through a [`BlockCache`] so
//! the image stores each distinct key, name, and index tuple once. Shared
//! [`Value`]s are interned by identity. The full log additionally gets a
//! chain of list nodes, head first, which is what the image header's
//! contents table ultimately points at.

use crate::instr::{Instr, NamedValue, ParamList, Slot};
use crate::wire::{WireWriter, LIST_NODE_SIZE, NAMED_NODE_SIZE};
use archi_image::{
    BlockCache, CacheKey, ImageResult, MemoryBlock, MemoryCluster, Value, WORD,
};
use std::rc::Rc;

/// Result of encoding an instruction log.
#[derive(Debug)]
pub struct EncodedLog {
    /// First list node, `None` for an empty log
    pub head: Option<Rc<MemoryBlock>>,
    /// Number of instructions encoded
    pub len: usize,
}

/// Encodes instructions and their operand data into a cluster.
#[derive(Debug)]
pub struct IrEncoder<'a> {
    cache: &'a mut BlockCache,
    cluster: &'a mut MemoryCluster,
}

impl<'a> IrEncoder<'a> {
    /// Creates an encoder writing into `cluster`, interning through
    /// `cache`. Several encoders may share one cache across clusters of
    /// the same image only if they also share the cluster; interned blocks
    /// live in the cluster that first created them.
    pub fn new(cache: &'a mut BlockCache, cluster: &'a mut MemoryCluster) -> IrEncoder<'a> {
        IrEncoder { cache, cluster }
    }

    /// Interns a NUL-terminated string by content.
    pub fn intern_str(&mut self, s: &str) -> ImageResult<Rc<MemoryBlock>> {
        let cluster = &mut *self.cluster;
        self.cache.intern(CacheKey::str(s), || {
            let block = MemoryBlock::new(Value::c_str(s));
            cluster.push(block.clone())?;
            Ok(block)
        })
    }

    /// Interns an index tuple by content. Empty tuples encode to nothing.
    pub fn intern_indices(&mut self, indices: &[usize]) -> ImageResult<Option<Rc<MemoryBlock>>> {
        if indices.is_empty() {
            return Ok(None);
        }
        let cluster = &mut *self.cluster;
        let block = self.cache.intern(CacheKey::indices(indices), || {
            let block = MemoryBlock::new(Value::index_array(indices));
            cluster.push(block.clone())?;
            Ok(block)
        })?;
        Ok(Some(block))
    }

    /// Interns a value's payload by identity. Zero-sized payloads encode
    /// to nothing; their tagged fields still carry the layout.
    pub fn intern_value(&mut self, value: &Value) -> ImageResult<Option<Rc<MemoryBlock>>> {
        if value.byte_len() == 0 {
            return Ok(None);
        }
        let cluster = &mut *self.cluster;
        let block = self.cache.intern(CacheKey::value(value), || {
            let block = MemoryBlock::new(value.clone());
            cluster.push(block.clone())?;
            Ok(block)
        })?;
        Ok(Some(block))
    }

    fn slot_blocks(&mut self, slot: &Slot) -> ImageResult<(Rc<MemoryBlock>, Option<Rc<MemoryBlock>>)> {
        let name = self.intern_str(&slot.name)?;
        let indices = self.intern_indices(&slot.indices)?;
        Ok((name, indices))
    }

    /// Encodes a named value list as a chain of nodes and returns its
    /// head. The chain is built tail first, so walking `next` pointers
    /// visits entries in their declaration order.
    pub fn encode_named_values(
        &mut self,
        values: &[NamedValue],
    ) -> ImageResult<Option<Rc<MemoryBlock>>> {
        let mut next: Option<Rc<MemoryBlock>> = None;
        for entry in values.iter().rev() {
            let name = self.intern_str(&entry.name)?;
            let data = self.intern_value(&entry.value)?;
            let mut writer = WireWriter::with_capacity(NAMED_NODE_SIZE / WORD);
            writer.pointer(next.as_ref());
            writer.pointer(Some(&name));
            writer.tagged(data.as_ref(), entry.value.flags(), entry.value.layout());
            let node = writer.finish()?;
            self.cluster.push(node.clone())?;
            next = Some(node);
        }
        Ok(next)
    }

    fn param_blocks(
        &mut self,
        params: &ParamList,
    ) -> ImageResult<(Option<Rc<MemoryBlock>>, Option<Rc<MemoryBlock>>)> {
        match params {
            ParamList::Empty => Ok((None, None)),
            ParamList::Inline(values) => Ok((None, self.encode_named_values(values)?)),
            ParamList::Context(key) => Ok((Some(self.intern_str(key)?), None)),
        }
    }

    /// Encodes one instruction and appends it to the cluster.
    pub fn encode_instr(&mut self, instr: &Instr) -> ImageResult<Rc<MemoryBlock>> {
        let opcode = instr.opcode().to_word();
        let block = match instr {
            Instr::Noop => {
                let mut writer = WireWriter::with_capacity(1);
                writer.word(opcode);
                writer.finish()?
            }
            Instr::Delete { key } => {
                let key = self.intern_str(key)?;
                let mut writer = WireWriter::with_capacity(2);
                writer.word(opcode);
                writer.pointer(Some(&key));
                writer.finish()?
            }
            Instr::Copy { key, original } => {
                let key = self.intern_str(key)?;
                let original = self.intern_str(original)?;
                let mut writer = WireWriter::with_capacity(3);
                writer.word(opcode);
                writer.pointer(Some(&key));
                writer.pointer(Some(&original));
                writer.finish()?
            }
            Instr::InitParameters {
                key,
                parent,
                params,
            } => {
                let key = self.intern_str(key)?;
                let parent = match parent {
                    Some(parent) => Some(self.intern_str(parent)?),
                    None => None,
                };
                let head = self.encode_named_values(params)?;
                let mut writer = WireWriter::with_capacity(4);
                writer.word(opcode);
                writer.pointer(Some(&key));
                writer.pointer(parent.as_ref());
                writer.pointer(head.as_ref());
                writer.finish()?
            }
            Instr::InitPointer { key, value } => {
                let key = self.intern_str(key)?;
                let data = self.intern_value(value)?;
                let mut writer = WireWriter::with_capacity(8);
                writer.word(opcode);
                writer.pointer(Some(&key));
                writer.tagged(data.as_ref(), value.flags(), value.layout());
                writer.finish()?
            }
            Instr::InitArray { key, count, flags } => {
                let key = self.intern_str(key)?;
                let mut writer = WireWriter::with_capacity(4);
                writer.word(opcode);
                writer.pointer(Some(&key));
                writer.word(*count);
                writer.flags(*flags);
                writer.finish()?
            }
            Instr::InitFromContext {
                key,
                source,
                params,
            } => {
                let key = self.intern_str(key)?;
                let source = self.intern_str(source)?;
                let (params_key, inline) = self.param_blocks(params)?;
                let mut writer = WireWriter::with_capacity(5);
                writer.word(opcode);
                writer.pointer(Some(&key));
                writer.pointer(Some(&source));
                writer.pointer(params_key.as_ref());
                writer.pointer(inline.as_ref());
                writer.finish()?
            }
            Instr::InitFromSlot {
                key,
                source,
                slot,
                params,
            } => {
                let key = self.intern_str(key)?;
                let source = self.intern_str(source)?;
                let (slot_name, slot_indices) = self.slot_blocks(slot)?;
                let (params_key, inline) = self.param_blocks(params)?;
                let mut writer = WireWriter::with_capacity(8);
                writer.word(opcode);
                writer.pointer(Some(&key));
                writer.pointer(Some(&source));
                writer.slot_ref(&slot_name, slot_indices.as_ref(), slot.arity());
                writer.pointer(params_key.as_ref());
                writer.pointer(inline.as_ref());
                writer.finish()?
            }
            Instr::SetToValue { key, slot, value } => {
                let key = self.intern_str(key)?;
                let (slot_name, slot_indices) = self.slot_blocks(slot)?;
                let data = self.intern_value(value)?;
                let mut writer = WireWriter::with_capacity(11);
                writer.word(opcode);
                writer.pointer(Some(&key));
                writer.slot_ref(&slot_name, slot_indices.as_ref(), slot.arity());
                writer.tagged(data.as_ref(), value.flags(), value.layout());
                writer.finish()?
            }
            Instr::SetToContextData { key, slot, source } => {
                let key = self.intern_str(key)?;
                let (slot_name, slot_indices) = self.slot_blocks(slot)?;
                let source = self.intern_str(source)?;
                let mut writer = WireWriter::with_capacity(6);
                writer.word(opcode);
                writer.pointer(Some(&key));
                writer.slot_ref(&slot_name, slot_indices.as_ref(), slot.arity());
                writer.pointer(Some(&source));
                writer.finish()?
            }
            Instr::SetToContextSlot {
                key,
                slot,
                source,
                source_slot,
            } => {
                let key = self.intern_str(key)?;
                let (slot_name, slot_indices) = self.slot_blocks(slot)?;
                let source = self.intern_str(source)?;
                let (src_name, src_indices) = self.slot_blocks(source_slot)?;
                let mut writer = WireWriter::with_capacity(9);
                writer.word(opcode);
                writer.pointer(Some(&key));
                writer.slot_ref(&slot_name, slot_indices.as_ref(), slot.arity());
                writer.pointer(Some(&source));
                writer.slot_ref(&src_name, src_indices.as_ref(), source_slot.arity());
                writer.finish()?
            }
            Instr::Act {
                key,
                action,
                params,
            } => {
                let key = self.intern_str(key)?;
                let (action_name, action_indices) = self.slot_blocks(action)?;
                let (params_key, inline) = self.param_blocks(params)?;
                let mut writer = WireWriter::with_capacity(7);
                writer.word(opcode);
                writer.pointer(Some(&key));
                writer.slot_ref(&action_name, action_indices.as_ref(), action.arity());
                writer.pointer(params_key.as_ref());
                writer.pointer(inline.as_ref());
                writer.finish()?
            }
        };
        self.cluster.push(block.clone())?;
        Ok(block)
    }

    /// Encodes a full instruction log plus its list node chain. The head
    /// node references the first instruction; an empty log yields no
    /// blocks at all.
    pub fn encode_log(&mut self, instrs: &[Instr]) -> ImageResult<EncodedLog> {
        let mut blocks = Vec::with_capacity(instrs.len());
        for instr in instrs {
            blocks.push(self.encode_instr(instr)?);
        }
        let mut next: Option<Rc<MemoryBlock>> = None;
        for block in blocks.iter().rev() {
            let mut writer = WireWriter::with_capacity(LIST_NODE_SIZE / WORD);
            writer.pointer(next.as_ref());
            writer.pointer(Some(block));
            let node = writer.finish()?;
            self.cluster.push(node.clone())?;
            next = Some(node);
        }
        Ok(EncodedLog {
            head: next,
            len: instrs.len(),
        })
    }
}
