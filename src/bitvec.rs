//! Sparse bit-vector container.
//!
//! `BitVector` addresses up to 2^32 bits, split into 65536-bit blocks kept
//! sparsely in an ordered map. A block is stored as a bit-block, a GAP
//! block, or the `Full` marker; an absent entry is an all-zero block. The
//! codec treats this container as a collaborator: it consumes the
//! block-level operations defined here and never touches the map directly.

use std::collections::BTreeMap;
use std::fmt;

use crate::block::{
    self, BitData, DEFAULT_GAP_LEVELS, GAP_LEVELS, GAP_MAX_BITS,
};
use crate::ops::CombineOp;

/// Highest addressable bit index plus one never exceeds this.
pub const ID_MAX: u64 = 0xFFFF_FFFF;
/// Number of blocks in the 32-bit address space.
pub const TOTAL_BLOCKS: u64 = 65536;
/// Shift from a bit index to its block index.
pub const BLOCK_SHIFT: u32 = 16;

/// In-memory representation of one 65536-bit block.
#[derive(Clone)]
pub enum Block {
    /// Flat 2048-word bitmap.
    Bit(Box<BitData>),
    /// GAP block: header + increasing run ends, terminated by 65535.
    Gap(Vec<u16>),
    /// Every bit set.
    Full,
}

impl Block {
    /// Population count of the block.
    pub fn bit_count(&self) -> u32 {
        match self {
            Block::Bit(b) => block::bit_block_count(b),
            Block::Gap(g) => block::gap_bit_count(g),
            Block::Full => GAP_MAX_BITS,
        }
    }

    /// Materialize the block into `dst` (overwrites).
    pub(crate) fn materialize(&self, dst: &mut BitData) {
        match self {
            Block::Bit(b) => dst.copy_from_slice(&b[..]),
            Block::Gap(g) => block::gap_convert_to_bitset(dst, g),
            Block::Full => block::bit_block_set(dst, !0),
        }
    }
}

/// Serialization sizing statistics for a bit-vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Statistics {
    /// Hard upper bound on the serialized size in bytes.
    ///
    /// Pre-sizing the output buffer to this value is the contract of the
    /// raw `Serializer::serialize` entry point.
    pub max_serialize_mem: usize,
    /// Number of bit-blocks currently stored.
    pub bit_blocks: usize,
    /// Number of GAP blocks currently stored.
    pub gap_blocks: usize,
    /// Number of full-block markers currently stored.
    pub full_blocks: usize,
}

/// Sparse bit-vector over a 32-bit index space.
#[derive(Clone)]
pub struct BitVector {
    blocks: BTreeMap<u64, Block>,
    size: u64,
    glen: [u16; GAP_LEVELS],
}

impl Default for BitVector {
    fn default() -> Self {
        Self::new()
    }
}

impl BitVector {
    /// Create an empty bit-vector spanning the full address space.
    pub fn new() -> Self {
        BitVector {
            blocks: BTreeMap::new(),
            size: ID_MAX,
            glen: DEFAULT_GAP_LEVELS,
        }
    }

    /// Create an empty bit-vector with an explicit logical size.
    pub fn with_size(size: u64) -> Self {
        debug_assert!(size <= ID_MAX);
        BitVector {
            blocks: BTreeMap::new(),
            size,
            glen: DEFAULT_GAP_LEVELS,
        }
    }

    /// Build a bit-vector from bit indices.
    pub fn from_indices<I: IntoIterator<Item = u64>>(indices: I) -> Self {
        let mut bv = BitVector::new();
        for i in indices {
            bv.set(i);
        }
        bv
    }

    /// Logical size in bits.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// GAP length-class table.
    pub fn glen(&self) -> &[u16; GAP_LEVELS] {
        &self.glen
    }

    /// Grow (or shrink, truncating) the logical size.
    pub fn resize(&mut self, new_size: u64) {
        debug_assert!(new_size <= ID_MAX);
        if new_size < self.size {
            if new_size == 0 {
                self.blocks.clear();
            } else {
                self.keep_range(0, new_size - 1);
            }
        }
        self.size = new_size;
    }

    /// Set bit `idx`.
    pub fn set(&mut self, idx: u64) {
        debug_assert!(idx <= ID_MAX);
        let nb = idx >> BLOCK_SHIFT;
        let bit = (idx & (u64::from(GAP_MAX_BITS) - 1)) as u32;
        if matches!(self.blocks.get(&nb), Some(Block::Full)) {
            return;
        }
        let blk = self.deoptimize_block(nb);
        block::set_bit(blk, bit);
    }

    /// Clear bit `idx`.
    pub fn clear_bit(&mut self, idx: u64) {
        debug_assert!(idx <= ID_MAX);
        let nb = idx >> BLOCK_SHIFT;
        if !self.blocks.contains_key(&nb) {
            return;
        }
        let bit = (idx & (u64::from(GAP_MAX_BITS) - 1)) as u32;
        let blk = self.deoptimize_block(nb);
        block::clear_bit(blk, bit);
        if block::bit_block_is_all_zero(blk) {
            self.blocks.remove(&nb);
        }
    }

    /// Test bit `idx`.
    pub fn test(&self, idx: u64) -> bool {
        let nb = idx >> BLOCK_SHIFT;
        let bit = (idx & (u64::from(GAP_MAX_BITS) - 1)) as u32;
        match self.blocks.get(&nb) {
            None => false,
            Some(Block::Bit(b)) => block::test_bit(b, bit),
            Some(Block::Gap(g)) => block::gap_test(g, bit as u16),
            Some(Block::Full) => true,
        }
    }

    /// Total number of set bits.
    pub fn count(&self) -> u64 {
        self.blocks.values().map(|b| u64::from(b.bit_count())).sum()
    }

    /// True when no bit is set.
    pub fn is_empty(&self) -> bool {
        self.blocks.values().all(|b| b.bit_count() == 0)
    }

    /// Clear all bits (logical size is kept).
    pub fn clear(&mut self) {
        self.blocks.clear();
    }

    /// Clear every bit outside `from..=to`.
    pub fn keep_range(&mut self, from: u64, to: u64) {
        debug_assert!(from <= to);
        let nb_from = from >> BLOCK_SHIFT;
        let nb_to = to >> BLOCK_SHIFT;
        let dead: Vec<u64> = self
            .blocks
            .range(..nb_from)
            .map(|(&k, _)| k)
            .chain(self.blocks.range(nb_to + 1..).map(|(&k, _)| k))
            .collect();
        for k in dead {
            self.blocks.remove(&k);
        }
        let lo_bit = (from & (u64::from(GAP_MAX_BITS) - 1)) as u32;
        if lo_bit > 0 && self.blocks.contains_key(&nb_from) {
            let blk = self.deoptimize_block(nb_from);
            block::clear_bit_range(blk, 0, lo_bit - 1);
        }
        let hi_bit = (to & (u64::from(GAP_MAX_BITS) - 1)) as u32;
        if hi_bit < GAP_MAX_BITS - 1 && self.blocks.contains_key(&nb_to) {
            let blk = self.deoptimize_block(nb_to);
            block::clear_bit_range(blk, hi_bit + 1, GAP_MAX_BITS - 1);
        }
        for nb in [nb_from, nb_to] {
            if let Some(Block::Bit(b)) = self.blocks.get(&nb) {
                if block::bit_block_is_all_zero(b) {
                    self.blocks.remove(&nb);
                }
            }
        }
    }

    /// Collect all set-bit indices in ascending order.
    pub fn to_indices(&self) -> Vec<u64> {
        let mut out = Vec::new();
        for (&nb, blk) in &self.blocks {
            let base = nb << BLOCK_SHIFT;
            match blk {
                Block::Bit(b) => {
                    for (wi, &w) in b.iter().enumerate() {
                        let mut w = w;
                        while w != 0 {
                            out.push(base + wi as u64 * 32 + u64::from(w.trailing_zeros()));
                            w &= w - 1;
                        }
                    }
                }
                Block::Gap(g) => {
                    let len = block::gap_length(g);
                    let mut cur = g[0] & 1;
                    let mut pos = 0u64;
                    for &end in &g[1..len] {
                        if cur == 1 {
                            for p in pos..=u64::from(end) {
                                out.push(base + p);
                            }
                        }
                        pos = u64::from(end) + 1;
                        cur ^= 1;
                    }
                }
                Block::Full => out.extend(base..base + u64::from(GAP_MAX_BITS)),
            }
        }
        out
    }

    /// Convert blocks to their most compact representation.
    pub fn optimize(&mut self) {
        let keys: Vec<u64> = self.blocks.keys().copied().collect();
        for nb in keys {
            match self.blocks.get(&nb) {
                Some(Block::Bit(_)) => self.optimize_bit_block(nb),
                Some(Block::Gap(g)) => {
                    let bc = block::gap_bit_count(g);
                    if bc == 0 {
                        self.blocks.remove(&nb);
                    } else if bc == GAP_MAX_BITS {
                        self.blocks.insert(nb, Block::Full);
                    }
                }
                _ => {}
            }
        }
    }

    /// Compute serialization sizing statistics.
    pub fn calc_stat(&self) -> Statistics {
        let mut bit_blocks = 0;
        let mut gap_blocks = 0;
        let mut full_blocks = 0;
        for blk in self.blocks.values() {
            match blk {
                Block::Bit(_) => bit_blocks += 1,
                Block::Gap(_) => gap_blocks += 1,
                Block::Full => full_blocks += 1,
            }
        }
        let n = self.blocks.len();
        // header + worst-case block payloads + run tokens between blocks
        let max_serialize_mem = 32 + n * (BLOCK_WORDS_BYTES + 32) + 9 * (n + 1);
        Statistics {
            max_serialize_mem,
            bit_blocks,
            gap_blocks,
            full_blocks,
        }
    }

    // -- block manager operations consumed by the codec --------------------

    pub(crate) fn get_block(&self, nb: u64) -> Option<&Block> {
        self.blocks.get(&nb)
    }

    pub(crate) fn find_next_nz_block(&self, from: u64) -> Option<u64> {
        self.blocks.range(from..).next().map(|(&k, _)| k)
    }

    /// All-one check. `deep` inspects bit and GAP content; shallow trusts
    /// only the `Full` marker.
    pub(crate) fn is_block_all_one(&self, nb: u64, deep: bool) -> bool {
        match self.blocks.get(&nb) {
            Some(Block::Full) => true,
            Some(Block::Bit(b)) if deep => block::bit_block_is_all_one(b),
            Some(Block::Gap(g)) if deep => block::gap_bit_count(g) == GAP_MAX_BITS,
            _ => false,
        }
    }

    /// Ensure block `nb` is a bit-block and return it (zeroed when absent).
    pub(crate) fn deoptimize_block(&mut self, nb: u64) -> &mut BitData {
        let entry = self
            .blocks
            .entry(nb)
            .or_insert_with(|| Block::Bit(block::alloc_bit_data()));
        if !matches!(entry, Block::Bit(_)) {
            let mut data = block::alloc_bit_data();
            entry.materialize(&mut data);
            *entry = Block::Bit(data);
        }
        match self.blocks.get_mut(&nb) {
            Some(Block::Bit(b)) => b,
            _ => unreachable!("deoptimized block is a bit-block"),
        }
    }

    /// Allocate a zeroed bit-block at `nb` (replacing any previous content).
    pub(crate) fn make_bit_block(&mut self, nb: u64) -> &mut BitData {
        self.blocks.insert(nb, Block::Bit(block::alloc_bit_data()));
        match self.blocks.get_mut(&nb) {
            Some(Block::Bit(b)) => b,
            _ => unreachable!(),
        }
    }

    pub(crate) fn zero_block(&mut self, nb: u64) {
        self.blocks.remove(&nb);
    }

    pub(crate) fn set_block_all_set(&mut self, nb: u64) {
        self.blocks.insert(nb, Block::Full);
    }

    pub(crate) fn set_all_set(&mut self, from: u64, to: u64) {
        for nb in from..=to {
            self.blocks.insert(nb, Block::Full);
        }
    }

    pub(crate) fn set_all_zero(&mut self, from: u64, to: u64) {
        let dead: Vec<u64> = self.blocks.range(from..=to).map(|(&k, _)| k).collect();
        for k in dead {
            self.blocks.remove(&k);
        }
    }

    /// Store a GAP block (header level bits are rewritten to `level`).
    pub(crate) fn set_gap_block(&mut self, nb: u64, vals: &[u16], level: u8) {
        let len = block::gap_length(vals);
        let mut g = vals[..len].to_vec();
        block::set_gap_level(&mut g, level);
        self.blocks.insert(nb, Block::Gap(g));
    }

    pub(crate) fn block_bitcount(&self, nb: u64) -> u64 {
        self.blocks.get(&nb).map_or(0, |b| u64::from(b.bit_count()))
    }

    /// Total population of blocks `from..` (stream-tail finalization).
    pub(crate) fn count_from_block(&self, from: u64) -> u64 {
        self.blocks
            .range(from..)
            .map(|(_, b)| u64::from(b.bit_count()))
            .sum()
    }

    /// Indices of all stored blocks, in ascending order.
    pub(crate) fn block_keys(&self) -> Vec<u64> {
        self.blocks.keys().copied().collect()
    }

    /// Mutable bit data of block `nb`, when it is a bit-block.
    pub(crate) fn get_bit_data_mut(&mut self, nb: u64) -> Option<&mut BitData> {
        match self.blocks.get_mut(&nb) {
            Some(Block::Bit(b)) => Some(b),
            _ => None,
        }
    }

    /// `|self ∧ other|` without building the intersection.
    pub(crate) fn and_count_with(&self, other: &BitVector) -> u64 {
        let mut a = block::alloc_bit_data();
        let mut b = block::alloc_bit_data();
        let mut count = 0u64;
        for (&nb, blk) in &self.blocks {
            let Some(oblk) = other.blocks.get(&nb) else {
                continue;
            };
            blk.materialize(&mut a);
            oblk.materialize(&mut b);
            count += u64::from(block::bit_block_and_count(&a, &b));
        }
        count
    }

    /// Combine `arg` into block `nb` under `op`, normalizing empty results.
    pub(crate) fn combine_operation_with_block(
        &mut self,
        nb: u64,
        arg: &BitData,
        op: CombineOp,
    ) {
        match op {
            CombineOp::Or => {
                if matches!(self.blocks.get(&nb), Some(Block::Full)) {
                    return;
                }
                let blk = self.deoptimize_block(nb);
                block::bit_block_or(blk, arg);
            }
            CombineOp::And => {
                if !self.blocks.contains_key(&nb) {
                    return;
                }
                let blk = self.deoptimize_block(nb);
                block::bit_block_and(blk, arg);
            }
            CombineOp::Sub => {
                if !self.blocks.contains_key(&nb) {
                    return;
                }
                let blk = self.deoptimize_block(nb);
                block::bit_block_sub(blk, arg);
            }
            CombineOp::Xor => {
                let blk = self.deoptimize_block(nb);
                block::bit_block_xor(blk, arg);
            }
        }
        if let Some(Block::Bit(b)) = self.blocks.get(&nb) {
            if block::bit_block_is_all_zero(b) {
                self.blocks.remove(&nb);
            }
        }
    }

    /// Re-compress a bit-block in place when a cheaper representation fits.
    pub(crate) fn optimize_bit_block(&mut self, nb: u64) {
        let Some(Block::Bit(b)) = self.blocks.get(&nb) else {
            return;
        };
        let (runs, bc) = block::bit_block_change_bc(b);
        if bc == 0 {
            self.blocks.remove(&nb);
            return;
        }
        if bc == GAP_MAX_BITS {
            self.blocks.insert(nb, Block::Full);
            return;
        }
        let gap_len = runs as usize + 1;
        if let Some(level) = block::gap_calc_level(gap_len, &self.glen) {
            let mut g = vec![0u16; gap_len + 1];
            let Some(Block::Bit(b)) = self.blocks.get(&nb) else {
                return;
            };
            let len = block::bit_to_gap(&mut g, b, gap_len);
            debug_assert_eq!(len + 1, gap_len);
            if len > 0 {
                g.truncate(len + 1);
                block::set_gap_level(&mut g, level);
                self.blocks.insert(nb, Block::Gap(g));
            }
        }
    }
}

const BLOCK_WORDS_BYTES: usize = crate::block::BLOCK_WORDS * 4;

impl PartialEq for BitVector {
    fn eq(&self, other: &Self) -> bool {
        let mut a = block::alloc_bit_data();
        let mut b = block::alloc_bit_data();
        let keys: std::collections::BTreeSet<u64> = self
            .blocks
            .keys()
            .chain(other.blocks.keys())
            .copied()
            .collect();
        for nb in keys {
            match (self.blocks.get(&nb), other.blocks.get(&nb)) {
                (None, None) => {}
                (x, y) => {
                    block::bit_block_set(&mut a, 0);
                    block::bit_block_set(&mut b, 0);
                    if let Some(x) = x {
                        x.materialize(&mut a);
                    }
                    if let Some(y) = y {
                        y.materialize(&mut b);
                    }
                    if a != b {
                        return false;
                    }
                }
            }
        }
        true
    }
}

impl Eq for BitVector {}

impl fmt::Debug for BitVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BitVector")
            .field("size", &self.size)
            .field("blocks", &self.blocks.len())
            .field("count", &self.count())
            .finish()
    }
}
