//! Block clusters, bin packing, and marshaling
//!
//! A [`MemoryCluster`] owns an ordered list of blocks plus an optional
//! header block pinned to the start of the image. Address assignment is a
//! single forward walk over that list, rounding up to each block's
//! alignment, so the list order fully determines the layout. [`pack`]
//! rearranges the list to minimize alignment padding; [`marshal`] produces
//! the final byte image for a chosen base address in two passes, copying
//! payloads first and patching relocations second so forward references
//! resolve like any other.
//!
//! [`pack`]: MemoryCluster::pack
//! [`marshal`]: MemoryCluster::marshal

use crate::block::{BlockId, ClusterId, MemoryBlock, RelocTarget};
use crate::error::{ImageError, ImageResult};
use crate::value::WORD;
use rustc_hash::{FxHashMap, FxHashSet};
use std::cell::Cell;
use std::rc::Rc;

/// Rounds `offset` up to the next multiple of `align`. An alignment of zero
/// or one leaves the offset unchanged; other alignments must be powers of
/// two.
pub fn align_up(offset: usize, align: usize) -> usize {
    if align <= 1 {
        offset
    } else {
        (offset + align - 1) & !(align - 1)
    }
}

/// Aggregate measurements of a cluster's layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Totals {
    /// Bytes the marshaled image occupies, padding included
    pub size: usize,
    /// Strictest alignment any block requires
    pub alignment: usize,
    /// Bytes lost to alignment padding
    pub padding: usize,
}

/// Addresses assigned to every block of a cluster for one base address.
#[derive(Debug)]
pub struct Placement {
    base: usize,
    end: usize,
    addresses: FxHashMap<BlockId, usize>,
}

impl Placement {
    /// Base address the placement was computed for.
    pub fn base(&self) -> usize {
        self.base
    }

    /// One past the last byte of the image.
    pub fn end(&self) -> usize {
        self.end
    }

    /// Address assigned to `id`, if the block is part of the placement.
    pub fn address_of(&self, id: BlockId) -> Option<usize> {
        self.addresses.get(&id).copied()
    }

    /// Resolves a relocation target to a concrete address.
    pub fn resolve(&self, target: &RelocTarget) -> ImageResult<usize> {
        match target {
            RelocTarget::Block(block) => self
                .address_of(block.id())
                .ok_or(ImageError::UnplacedBlock { id: block.id() }),
            RelocTarget::ImageBase => Ok(self.base),
            RelocTarget::ImageEnd => Ok(self.end),
            RelocTarget::Null => Ok(0),
        }
    }
}

/// An ordered collection of blocks that marshals into one contiguous image.
#[derive(Debug)]
pub struct MemoryCluster {
    id: ClusterId,
    header: Option<Rc<MemoryBlock>>,
    blocks: Vec<Rc<MemoryBlock>>,
    ids: FxHashSet<BlockId>,
    totals: Cell<Option<Totals>>,
}

impl Default for MemoryCluster {
    fn default() -> MemoryCluster {
        MemoryCluster::new()
    }
}

impl MemoryCluster {
    /// Creates an empty cluster.
    pub fn new() -> MemoryCluster {
        MemoryCluster {
            id: ClusterId::next(),
            header: None,
            blocks: Vec::new(),
            ids: FxHashSet::default(),
            totals: Cell::new(None),
        }
    }

    /// Installs the header block. The header always marshals at the base
    /// address, ahead of every packed block.
    pub fn set_header(&mut self, block: Rc<MemoryBlock>) -> ImageResult<()> {
        if self.header.is_some() {
            return Err(ImageError::HeaderAlreadySet);
        }
        self.claim(&block)?;
        self.ids.insert(block.id());
        self.header = Some(block);
        self.totals.set(None);
        Ok(())
    }

    /// Appends a block to the cluster, taking ownership of it.
    pub fn push(&mut self, block: Rc<MemoryBlock>) -> ImageResult<()> {
        self.claim(&block)?;
        self.ids.insert(block.id());
        self.blocks.push(block);
        self.totals.set(None);
        Ok(())
    }

    fn claim(&self, block: &MemoryBlock) -> ImageResult<()> {
        match block.owner() {
            Some(owner) if owner == self.id => Err(ImageError::DuplicateBlock { id: block.id() }),
            Some(_) => Err(ImageError::BlockInUse { id: block.id() }),
            None => {
                block.claim(self.id);
                Ok(())
            }
        }
    }

    /// Whether the cluster holds the block with this id.
    pub fn contains(&self, id: BlockId) -> bool {
        self.ids.contains(&id)
    }

    /// Number of blocks, header excluded.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Whether the cluster holds no blocks and no header.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty() && self.header.is_none()
    }

    /// Blocks in their current list order.
    pub fn blocks(&self) -> &[Rc<MemoryBlock>] {
        &self.blocks
    }

    /// The header block, if one was installed.
    pub fn header(&self) -> Option<&Rc<MemoryBlock>> {
        self.header.as_ref()
    }

    fn walk(&self, base: usize) -> (Placement, usize, usize) {
        let mut addresses =
            FxHashMap::with_capacity_and_hasher(self.ids.len(), Default::default());
        let mut cursor = base;
        let mut max_align = 1;
        let mut padding = 0;
        if let Some(header) = &self.header {
            addresses.insert(header.id(), cursor);
            cursor += header.size();
            max_align = max_align.max(header.alignment());
        }
        for block in &self.blocks {
            let align = block.alignment();
            max_align = max_align.max(align);
            let addr = align_up(cursor, align);
            padding += addr - cursor;
            addresses.insert(block.id(), addr);
            cursor = addr + block.size();
        }
        (
            Placement {
                base,
                end: cursor,
                addresses,
            },
            max_align,
            padding,
        )
    }

    /// Layout totals for the current list order. Recomputed lazily after
    /// every mutation.
    pub fn totals(&self) -> Totals {
        if let Some(totals) = self.totals.get() {
            return totals;
        }
        let (placement, alignment, padding) = self.walk(0);
        let totals = Totals {
            size: placement.end(),
            alignment,
            padding,
        };
        self.totals.set(Some(totals));
        totals
    }

    /// Assigns an address to every block for the given base. The header
    /// sits at `base`; the remaining blocks follow in list order, each
    /// rounded up to its alignment.
    pub fn place(&self, base: usize) -> Placement {
        self.walk(base).0
    }

    /// Reorders the block list to minimize alignment padding.
    ///
    /// Blocks are taken in order of decreasing alignment, then decreasing
    /// size, with the original insertion order breaking ties. Each block
    /// lands in the first earlier gap it fits, otherwise at the end of the
    /// image; splitting a gap keeps its remainders available for later,
    /// smaller blocks. The resulting assignment is written back as the new
    /// list order, so a subsequent [`place`] reproduces it (or better) and
    /// adding blocks can only grow the image.
    ///
    /// [`place`]: MemoryCluster::place
    pub fn pack(&mut self) {
        let start = self.header.as_ref().map(|h| h.size()).unwrap_or(0);
        let mut order = self.blocks.clone();
        order.sort_by(|a, b| {
            b.alignment()
                .cmp(&a.alignment())
                .then(b.size().cmp(&a.size()))
        });

        // (offset, length) gaps in ascending offset order
        let mut gaps: Vec<(usize, usize)> = Vec::new();
        let mut end = start;
        let mut placed: Vec<(usize, Rc<MemoryBlock>)> = Vec::with_capacity(order.len());

        for block in order {
            let size = block.size();
            let align = block.alignment();
            let mut chosen = None;
            for (i, &(gap_offset, gap_len)) in gaps.iter().enumerate() {
                let aligned = align_up(gap_offset, align);
                if aligned + size <= gap_offset + gap_len {
                    chosen = Some((i, aligned));
                    break;
                }
            }
            let offset = match chosen {
                Some((i, aligned)) => {
                    let (gap_offset, gap_len) = gaps[i];
                    let gap_end = gap_offset + gap_len;
                    let mut residual = Vec::new();
                    if aligned > gap_offset {
                        residual.push((gap_offset, aligned - gap_offset));
                    }
                    if gap_end > aligned + size {
                        residual.push((aligned + size, gap_end - (aligned + size)));
                    }
                    gaps.splice(i..=i, residual);
                    aligned
                }
                None => {
                    let aligned = align_up(end, align);
                    if aligned > end {
                        gaps.push((end, aligned - end));
                    }
                    end = aligned + size;
                    aligned
                }
            };
            placed.push((offset, block));
        }

        placed.sort_by_key(|(offset, _)| *offset);
        self.blocks = placed.into_iter().map(|(_, block)| block).collect();
        self.totals.set(None);
    }

    /// Marshals the cluster into a byte image for the given base address.
    ///
    /// Pass one copies every payload to its placed offset; pass two patches
    /// relocation fields from the completed placement, so a relocation may
    /// point at a block placed after its owner. The result depends only on
    /// the cluster contents, the list order, and `base`.
    pub fn marshal(&self, base: usize) -> ImageResult<Vec<u8>> {
        let placement = self.place(base);
        let mut image = vec![0u8; placement.end() - base];

        for block in self.header.iter().chain(self.blocks.iter()) {
            let offset = self.offset_of(&placement, block)?;
            let payload = block.value().payload();
            image[offset..offset + payload.len()].copy_from_slice(payload);
        }

        for block in self.header.iter().chain(self.blocks.iter()) {
            if block.relocs().is_empty() {
                continue;
            }
            let offset = self.offset_of(&placement, block)?;
            for reloc in block.relocs() {
                let address = placement.resolve(&reloc.target)?;
                let field = offset + reloc.offset;
                image[field..field + WORD].copy_from_slice(&address.to_ne_bytes());
            }
        }

        Ok(image)
    }

    fn offset_of(&self, placement: &Placement, block: &MemoryBlock) -> ImageResult<usize> {
        placement
            .address_of(block.id())
            .map(|addr| addr - placement.base())
            .ok_or(ImageError::UnplacedBlock { id: block.id() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::Reloc;
    use crate::value::Value;

    fn byte_block(len: usize) -> Rc<MemoryBlock> {
        MemoryBlock::new(Value::bytes(vec![0xAA; len]))
    }

    fn word_at(image: &[u8], offset: usize) -> usize {
        let mut bytes = [0u8; WORD];
        bytes.copy_from_slice(&image[offset..offset + WORD]);
        usize::from_ne_bytes(bytes)
    }

    #[test]
    fn empty_cluster_has_empty_totals() {
        let cluster = MemoryCluster::new();
        assert!(cluster.is_empty());
        assert_eq!(
            cluster.totals(),
            Totals {
                size: 0,
                alignment: 1,
                padding: 0
            }
        );
        assert_eq!(cluster.marshal(0x1000).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn totals_track_alignment_padding() {
        let mut cluster = MemoryCluster::new();
        cluster.push(byte_block(3)).unwrap();
        cluster.push(MemoryBlock::new(Value::from_u64(1))).unwrap();
        let totals = cluster.totals();
        // 3 bytes, then 5 bytes of padding up to the 8-aligned block
        assert_eq!(totals.size, 16);
        assert_eq!(totals.alignment, 8);
        assert_eq!(totals.padding, 5);
    }

    #[test]
    fn totals_invalidate_on_push_and_pack() {
        let mut cluster = MemoryCluster::new();
        cluster.push(byte_block(3)).unwrap();
        assert_eq!(cluster.totals().size, 3);
        cluster.push(MemoryBlock::new(Value::from_u64(1))).unwrap();
        assert_eq!(cluster.totals().size, 16);
        cluster.pack();
        // aligned block first, bytes fill the tail, no padding left
        assert_eq!(cluster.totals().size, 11);
        assert_eq!(cluster.totals().padding, 0);
    }

    #[test]
    fn duplicate_and_foreign_blocks_are_rejected() {
        let mut a = MemoryCluster::new();
        let mut b = MemoryCluster::new();
        let block = byte_block(4);
        a.push(block.clone()).unwrap();
        assert_eq!(
            a.push(block.clone()).unwrap_err(),
            ImageError::DuplicateBlock { id: block.id() }
        );
        assert_eq!(
            b.push(block.clone()).unwrap_err(),
            ImageError::BlockInUse { id: block.id() }
        );
        assert!(a.contains(block.id()));
        assert!(!b.contains(block.id()));
    }

    #[test]
    fn header_is_pinned_to_the_base() {
        let mut cluster = MemoryCluster::new();
        let header = MemoryBlock::new(Value::index_array(&[7, 8]));
        cluster.set_header(header.clone()).unwrap();
        cluster.push(MemoryBlock::new(Value::from_u32(5))).unwrap();
        cluster.pack();

        let placement = cluster.place(0x4000);
        assert_eq!(placement.address_of(header.id()), Some(0x4000));
        assert_eq!(placement.base(), 0x4000);

        let err = cluster
            .set_header(MemoryBlock::new(Value::unit()))
            .unwrap_err();
        assert_eq!(err, ImageError::HeaderAlreadySet);
    }

    #[test]
    fn place_respects_alignment_and_order() {
        let mut cluster = MemoryCluster::new();
        let a = byte_block(1);
        let b = MemoryBlock::new(Value::from_u64(2));
        let c = byte_block(2);
        cluster.push(a.clone()).unwrap();
        cluster.push(b.clone()).unwrap();
        cluster.push(c.clone()).unwrap();

        let placement = cluster.place(0x100);
        assert_eq!(placement.address_of(a.id()), Some(0x100));
        assert_eq!(placement.address_of(b.id()), Some(0x108));
        assert_eq!(placement.address_of(c.id()), Some(0x110));
        assert_eq!(placement.end(), 0x112);
    }

    #[test]
    fn pack_fills_gaps_with_smaller_blocks() {
        let mut cluster = MemoryCluster::new();
        let small = byte_block(2);
        let big = MemoryBlock::new(Value::index_array(&[1, 2, 3]));
        let tiny = byte_block(1);
        cluster.push(small.clone()).unwrap();
        cluster.push(big.clone()).unwrap();
        cluster.push(tiny.clone()).unwrap();
        cluster.pack();

        // the word-aligned block moves first, byte blocks trail it
        let order: Vec<BlockId> = cluster.blocks().iter().map(|b| b.id()).collect();
        assert_eq!(order[0], big.id());
        let totals = cluster.totals();
        assert_eq!(totals.padding, 0);
        assert_eq!(totals.size, 3 * WORD + 3);
    }

    #[test]
    fn pack_is_deterministic() {
        let build = |sizes: &[usize]| {
            let mut cluster = MemoryCluster::new();
            for &s in sizes {
                cluster.push(byte_block(s)).unwrap();
                cluster
                    .push(MemoryBlock::new(Value::from_u64(s as u64)))
                    .unwrap();
            }
            cluster.pack();
            cluster
        };
        let sizes = [3, 9, 1, 17, 5];
        let a = build(&sizes).marshal(0x2000).unwrap();
        let b = build(&sizes).marshal(0x2000).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn marshal_copies_payloads_at_placed_offsets() {
        let mut cluster = MemoryCluster::new();
        let a = MemoryBlock::new(Value::bytes(vec![1, 2, 3]));
        let b = MemoryBlock::new(Value::from_u32(0x11223344));
        cluster.push(a.clone()).unwrap();
        cluster.push(b.clone()).unwrap();

        let image = cluster.marshal(0).unwrap();
        assert_eq!(&image[0..3], &[1, 2, 3]);
        assert_eq!(image[3], 0); // padding byte stays zero
        assert_eq!(&image[4..8], &0x11223344u32.to_ne_bytes());
    }

    #[test]
    fn marshal_patches_forward_references() {
        let mut cluster = MemoryCluster::new();
        let target = MemoryBlock::new(Value::from_u64(99));
        let pointer = MemoryBlock::with_relocs(
            Value::index_array(&[0]),
            vec![Reloc::block(0, target.clone())],
        )
        .unwrap();
        // the pointer block comes first, its target is placed after it
        cluster.push(pointer).unwrap();
        cluster.push(target.clone()).unwrap();

        let base = 0x8000;
        let image = cluster.marshal(base).unwrap();
        let placement = cluster.place(base);
        assert_eq!(
            word_at(&image, 0),
            placement.address_of(target.id()).unwrap()
        );
    }

    #[test]
    fn marshal_resolves_base_end_and_null() {
        let mut cluster = MemoryCluster::new();
        let block = MemoryBlock::with_relocs(
            Value::index_array(&[0, 0, 0]),
            vec![
                Reloc::image_base(0),
                Reloc::image_end(WORD),
                Reloc::null(2 * WORD),
            ],
        )
        .unwrap();
        cluster.push(block).unwrap();

        let base = 0x6000;
        let image = cluster.marshal(base).unwrap();
        assert_eq!(word_at(&image, 0), base);
        assert_eq!(word_at(&image, WORD), base + image.len());
        assert_eq!(word_at(&image, 2 * WORD), 0);
    }

    #[test]
    fn marshal_rejects_relocations_to_unplaced_blocks() {
        let mut cluster = MemoryCluster::new();
        let stray = MemoryBlock::new(Value::from_u8(1));
        let block = MemoryBlock::with_relocs(
            Value::index_array(&[0]),
            vec![Reloc::block(0, stray.clone())],
        )
        .unwrap();
        cluster.push(block).unwrap();

        let err = cluster.marshal(0).unwrap_err();
        assert_eq!(err, ImageError::UnplacedBlock { id: stray.id() });
    }

    #[test]
    fn size_override_marshals_zero_tail() {
        let mut cluster = MemoryCluster::new();
        let block = MemoryBlock::with_size(Value::bytes(vec![0xFF; 2]), 6).unwrap();
        cluster.push(block).unwrap();
        let image = cluster.marshal(0).unwrap();
        assert_eq!(image, vec![0xFF, 0xFF, 0, 0, 0, 0]);
    }
}
