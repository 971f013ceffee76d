//! Forward iterator over a serialized block-token stream.
//!
//! `SerialStreamIterator` exposes the stream as a small state machine
//! without materializing intermediate blocks: `next` consumes one token and
//! updates the state; `skip_mono_blocks` jumps over runs of constant
//! blocks; the typed accessors decode the current block fused with a set
//! operation against a caller block. Passing no destination to an accessor
//! is a valid dry read: the stream advances and only counts are produced.

use crate::bitvec::TOTAL_BLOCKS;
use crate::block::{self, BitData, GAP_LEVELS};
use crate::bytes::{Decoder, Endian};
use crate::deserializer::{
    read_bic_arr, read_bic_arr_inv, read_bic_gap, read_digest0_block, read_gap_block,
};
use crate::error::{Result, SerialError};
use crate::ops::SetOp;
use crate::tags::*;

/// Iterator state: what the stream cursor currently points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterState {
    /// Not positioned (constructor failure or end of stream).
    Unknown,
    /// Legacy framing: a plain array of 32-bit ids.
    ListIds,
    /// Between block tokens.
    Blocks,
    /// Inside a run of all-zero blocks.
    ZeroBlocks,
    /// Inside a run of all-set blocks.
    OneBlocks,
    /// Positioned on one bit-block encoding.
    BitBlock,
    /// Positioned on one GAP-block encoding.
    GapBlock,
}

/// Stream iterator over a serialized bit-vector.
pub struct SerialStreamIterator<'a, E: Endian> {
    dec: Decoder<'a, E>,
    end_of_stream: bool,
    bv_size: u64,
    state: IterState,
    id_cnt: u32,
    last_id: u32,
    glevels: [u16; GAP_LEVELS],
    block_type: u8,
    block_idx: u64,
    mono_block_cnt: u64,
    gap_head: u16,
    block_idx_arr: Vec<u16>,
}

impl<'a, E: Endian> SerialStreamIterator<'a, E> {
    /// Parse the stream header and position on the first token.
    pub fn new(buf: &'a [u8]) -> Result<Self> {
        let mut it = SerialStreamIterator {
            dec: Decoder::new(buf),
            end_of_stream: false,
            bv_size: 0,
            state: IterState::Unknown,
            id_cnt: 0,
            last_id: 0,
            glevels: [0; GAP_LEVELS],
            block_type: 0,
            block_idx: 0,
            mono_block_cnt: 0,
            gap_head: 0,
            block_idx_arr: vec![0u16; 65538],
        };

        let header_flag = it.dec.get_u8();
        if header_flag & HM_NO_BO == 0 {
            it.dec.get_u8();
        }
        if header_flag & HM_64_BIT != 0 {
            return Err(SerialError::format(
                "64-bit address stream cannot be read in 32-bit mode",
            ));
        }

        if header_flag & HM_ID_LIST != 0 {
            if header_flag & HM_RESIZE != 0 {
                it.bv_size = u64::from(it.dec.get_u32());
            }
            it.state = IterState::ListIds;
            it.id_cnt = it.dec.get_u32();
            it.next()?; // position on the first id
        } else {
            if header_flag & HM_NO_GAPL == 0 {
                for k in 0..GAP_LEVELS {
                    it.glevels[k] = it.dec.get_u16();
                }
            }
            if header_flag & HM_RESIZE != 0 {
                it.bv_size = u64::from(it.dec.get_u32());
            }
            it.state = IterState::Blocks;
        }
        Ok(it)
    }

    /// Serialized logical size (0 when the stream has no RESIZE header).
    pub fn bv_size(&self) -> u64 {
        self.bv_size
    }

    /// True once every token has been consumed.
    pub fn is_eof(&self) -> bool {
        self.end_of_stream
    }

    /// Current iterator state.
    pub fn state(&self) -> IterState {
        self.state
    }

    /// Current logical block index.
    pub fn block_idx(&self) -> u64 {
        self.block_idx
    }

    /// Current block-type tag.
    pub fn block_type(&self) -> u8 {
        self.block_type
    }

    /// Ids remaining in a legacy id-list stream.
    pub fn id_count(&self) -> u32 {
        self.id_cnt
    }

    /// Last id read from a legacy id-list stream.
    pub fn id(&self) -> u32 {
        self.last_id
    }

    /// Bytes consumed from the stream so far.
    pub fn dec_size(&self) -> usize {
        self.dec.pos()
    }

    /// Advance the state machine by one token (or one run element).
    pub fn next(&mut self) -> Result<()> {
        if self.is_eof() {
            self.block_idx += 1;
            return Ok(());
        }
        match self.state {
            IterState::ListIds => {
                if self.id_cnt == 0 {
                    self.end_of_stream = true;
                    self.state = IterState::Unknown;
                } else {
                    self.last_id = self.dec.get_u32();
                    self.id_cnt -= 1;
                }
            }
            IterState::Blocks => {
                if self.block_idx == TOTAL_BLOCKS {
                    self.end_of_stream = true;
                    self.state = IterState::Unknown;
                    return Ok(());
                }
                let bt = self.dec.get_u8();
                self.block_type = bt;

                if bt & 0x80 != 0 {
                    self.mono_block_cnt = u64::from(bt & 0x7F) - 1;
                    self.state = IterState::ZeroBlocks;
                    return Ok(());
                }
                match bt {
                    SET_BLOCK_AZERO | SET_BLOCK_END => {
                        self.end_of_stream = true;
                        self.state = IterState::Unknown;
                    }
                    SET_BLOCK_1ZERO => {
                        self.state = IterState::ZeroBlocks;
                        self.mono_block_cnt = 0;
                    }
                    SET_BLOCK_8ZERO => {
                        self.state = IterState::ZeroBlocks;
                        self.mono_block_cnt = u64::from(self.dec.get_u8()).saturating_sub(1);
                    }
                    SET_BLOCK_16ZERO => {
                        self.state = IterState::ZeroBlocks;
                        self.mono_block_cnt = u64::from(self.dec.get_u16()).saturating_sub(1);
                    }
                    SET_BLOCK_32ZERO => {
                        self.state = IterState::ZeroBlocks;
                        self.mono_block_cnt = u64::from(self.dec.get_u32()).saturating_sub(1);
                    }
                    SET_BLOCK_AONE => {
                        self.state = IterState::OneBlocks;
                        self.mono_block_cnt = TOTAL_BLOCKS - self.block_idx - 1;
                    }
                    SET_BLOCK_1ONE => {
                        self.state = IterState::OneBlocks;
                        self.mono_block_cnt = 0;
                    }
                    SET_BLOCK_8ONE => {
                        self.state = IterState::OneBlocks;
                        self.mono_block_cnt = u64::from(self.dec.get_u8()).saturating_sub(1);
                    }
                    SET_BLOCK_16ONE => {
                        self.state = IterState::OneBlocks;
                        self.mono_block_cnt = u64::from(self.dec.get_u16()).saturating_sub(1);
                    }
                    SET_BLOCK_32ONE => {
                        self.state = IterState::OneBlocks;
                        self.mono_block_cnt = u64::from(self.dec.get_u32()).saturating_sub(1);
                    }
                    SET_BLOCK_64ZERO | SET_BLOCK_64ONE => {
                        return Err(SerialError::format(
                            "64-bit block run in a 32-bit mode stream",
                        ));
                    }
                    SET_BLOCK_BIT
                    | SET_BLOCK_BIT_INTERVAL
                    | SET_BLOCK_BIT_0RUNS
                    | SET_BLOCK_ARRBIT
                    | SET_BLOCK_ARRBIT_INV
                    | SET_BLOCK_ARR_BIENC
                    | SET_BLOCK_ARR_BIENC_INV
                    | SET_BLOCK_BITGAP_BIENC
                    | SET_BLOCK_BIT_DIGEST0 => {
                        self.state = IterState::BitBlock;
                    }
                    SET_BLOCK_GAP | SET_BLOCK_GAP_EGAMMA | SET_BLOCK_GAP_BIENC => {
                        self.gap_head = self.dec.get_u16();
                        self.state = IterState::GapBlock;
                    }
                    SET_BLOCK_ARRGAP
                    | SET_BLOCK_ARRGAP_EGAMMA
                    | SET_BLOCK_ARRGAP_EGAMMA_INV
                    | SET_BLOCK_ARRGAP_INV
                    | SET_BLOCK_BIT_1BIT
                    | SET_BLOCK_ARRGAP_BIENC
                    | SET_BLOCK_ARRGAP_BIENC_INV => {
                        self.state = IterState::GapBlock;
                    }
                    t => {
                        return Err(SerialError::format(format!("unknown block type {t}")));
                    }
                }
            }
            IterState::ZeroBlocks | IterState::OneBlocks => {
                self.block_idx += 1;
                if self.mono_block_cnt == 0 {
                    self.state = IterState::Blocks;
                } else {
                    self.mono_block_cnt -= 1;
                }
            }
            IterState::Unknown | IterState::BitBlock | IterState::GapBlock => {
                return Err(SerialError::format("iterator advanced in invalid state"));
            }
        }
        Ok(())
    }

    /// Skip the remaining run of zero/one blocks, returning the new block
    /// index.
    pub fn skip_mono_blocks(&mut self) -> u64 {
        debug_assert!(matches!(
            self.state,
            IterState::ZeroBlocks | IterState::OneBlocks
        ));
        if self.mono_block_cnt == 0 {
            self.block_idx += 1;
        } else {
            self.block_idx += self.mono_block_cnt + 1;
            self.mono_block_cnt = 0;
        }
        self.state = IterState::Blocks;
        self.block_idx
    }

    /// Decode the current GAP block into `dst` (complete GAP form).
    pub fn get_gap_block(&mut self, dst: &mut [u16]) -> Result<()> {
        debug_assert!(matches!(self.state, IterState::GapBlock));
        read_gap_block(
            &mut self.dec,
            self.block_type,
            dst,
            self.gap_head,
            &mut self.block_idx_arr,
        )?;
        self.block_idx += 1;
        self.state = IterState::Blocks;
        Ok(())
    }

    /// Read a position-array block: sets the listed bits in `dst`, or
    /// performs a counting dry read when `dst` is `None`.
    pub fn get_arr_bit(&mut self, dst: Option<&mut BitData>, clear_target: bool) -> u32 {
        debug_assert!(
            self.block_type == SET_BLOCK_ARRBIT || self.block_type == SET_BLOCK_BIT_1BIT
        );
        let len = self.dec.get_u16();
        match dst {
            Some(d) => {
                if clear_target {
                    block::bit_block_set(d, 0);
                }
                if self.block_type == SET_BLOCK_BIT_1BIT {
                    // len holds the single bit position
                    block::set_bit(d, u32::from(len));
                    return 1;
                }
                for _ in 0..len {
                    let bit_idx = self.dec.get_u16();
                    block::set_bit(d, u32::from(bit_idx));
                }
                u32::from(len)
            }
            None => {
                if self.block_type == SET_BLOCK_BIT_1BIT {
                    return 1;
                }
                self.dec.skip(usize::from(len) * 2);
                u32::from(len)
            }
        }
    }

    // Inverted position array: all-ones minus the listed bits.
    fn get_inv_arr(&mut self, dst: Option<&mut BitData>) {
        let len = self.dec.get_u16();
        match dst {
            Some(d) => {
                block::bit_block_set(d, !0);
                for _ in 0..len {
                    let bit_idx = self.dec.get_u16();
                    block::clear_bit(d, u32::from(bit_idx));
                }
            }
            None => self.dec.skip(usize::from(len) * 2),
        }
    }

    /// Decode the current bit-block fused with `op` against `dst`.
    ///
    /// `tmp` is caller scratch. A `None` destination is a dry read; it is
    /// valid for `Assign`, `Count`, `CountB` and `CountA` (the other
    /// operations need target data and fail on a missing destination).
    pub fn get_bit_block(
        &mut self,
        dst: Option<&mut BitData>,
        tmp: &mut BitData,
        op: SetOp,
    ) -> Result<u32> {
        debug_assert!(matches!(self.state, IterState::BitBlock));
        let count = match op {
            SetOp::Assign => self.get_bit_block_assign(dst, tmp)?,
            SetOp::Or => self.get_bit_block_or(require(dst)?, tmp)?,
            SetOp::And => self.get_bit_block_and(require(dst)?, tmp)?,
            SetOp::Xor => self.get_bit_block_xor(require(dst)?, tmp)?,
            SetOp::Sub => self.get_bit_block_sub(require(dst)?, tmp)?,
            SetOp::Count | SetOp::CountB => self.get_bit_block_count(tmp)?,
            SetOp::CountA => self.get_bit_block_count_a(dst.as_deref(), tmp)?,
            SetOp::CountAnd => self.get_bit_block_count_and(require(dst)?, tmp)?,
            SetOp::CountOr => self.get_bit_block_count_or(require(dst)?, tmp)?,
            SetOp::CountXor => self.get_bit_block_count_xor(require(dst)?, tmp)?,
            SetOp::CountSubAb => self.get_bit_block_count_sub_ab(require(dst)?, tmp)?,
            SetOp::CountSubBa => self.get_bit_block_count_sub_ba(require(dst)?, tmp)?,
        };
        self.state = IterState::Blocks;
        self.block_idx += 1;
        Ok(count)
    }

    fn get_bit_block_assign(
        &mut self,
        mut dst: Option<&mut BitData>,
        tmp: &mut BitData,
    ) -> Result<u32> {
        match self.block_type {
            SET_BLOCK_BIT => match dst {
                Some(d) => self.dec.get_u32_into(&mut d[..]),
                None => self.dec.skip(block::BLOCK_WORDS * 4),
            },
            SET_BLOCK_BIT_0RUNS => {
                if let Some(d) = dst.as_deref_mut() {
                    block::bit_block_set(d, 0);
                }
                let mut run_type = self.dec.get_u8() != 0;
                let mut j = 0usize;
                while j < block::BLOCK_WORDS {
                    let run_length = self.dec.get_u16() as usize;
                    if run_type {
                        match dst.as_deref_mut() {
                            Some(d) => self.dec.get_u32_into(&mut d[j..j + run_length]),
                            None => self.dec.skip(run_length * 4),
                        }
                    }
                    j += run_length;
                    run_type = !run_type;
                }
            }
            SET_BLOCK_BIT_INTERVAL => {
                let head_idx = self.dec.get_u16() as usize;
                let tail_idx = self.dec.get_u16() as usize;
                match dst {
                    Some(d) => {
                        block::bit_block_set(d, 0);
                        self.dec.get_u32_into(&mut d[head_idx..=tail_idx]);
                    }
                    None => self.dec.skip((tail_idx - head_idx + 1) * 4),
                }
            }
            SET_BLOCK_ARRBIT | SET_BLOCK_BIT_1BIT => {
                self.get_arr_bit(dst, true);
            }
            SET_BLOCK_ARRBIT_INV => self.get_inv_arr(dst),
            SET_BLOCK_ARR_BIENC => {
                if let Some(d) = dst.as_deref_mut() {
                    block::bit_block_set(d, 0);
                }
                read_bic_arr(&mut self.dec, dst);
            }
            SET_BLOCK_ARR_BIENC_INV => {
                read_bic_arr_inv(&mut self.dec, tmp);
                if let Some(d) = dst {
                    d.copy_from_slice(&tmp[..]);
                }
            }
            SET_BLOCK_BITGAP_BIENC => {
                if let Some(d) = dst.as_deref_mut() {
                    block::bit_block_set(d, 0);
                }
                read_bic_gap(&mut self.dec, dst, &mut self.block_idx_arr);
            }
            SET_BLOCK_BIT_DIGEST0 => {
                if let Some(d) = dst.as_deref_mut() {
                    block::bit_block_set(d, 0);
                }
                read_digest0_block(&mut self.dec, dst);
            }
            t => return Err(unexpected_bit_block(t)),
        }
        Ok(0)
    }

    fn get_bit_block_or(&mut self, dst: &mut BitData, tmp: &mut BitData) -> Result<u32> {
        match self.block_type {
            SET_BLOCK_BIT => {
                self.dec.get_u32_or(&mut dst[..]);
            }
            SET_BLOCK_BIT_INTERVAL => {
                let head_idx = self.dec.get_u16() as usize;
                let tail_idx = self.dec.get_u16() as usize;
                for w in &mut dst[head_idx..=tail_idx] {
                    *w |= self.dec.get_u32();
                }
            }
            SET_BLOCK_BIT_0RUNS => {
                let mut run_type = self.dec.get_u8() != 0;
                let mut j = 0usize;
                while j < block::BLOCK_WORDS {
                    let run_length = self.dec.get_u16() as usize;
                    if run_type {
                        for w in &mut dst[j..j + run_length] {
                            *w |= self.dec.get_u32();
                        }
                    }
                    j += run_length;
                    run_type = !run_type;
                }
            }
            SET_BLOCK_BIT_1BIT | SET_BLOCK_ARRBIT => {
                self.get_arr_bit(Some(dst), false);
            }
            SET_BLOCK_ARRBIT_INV => {
                self.get_inv_arr(Some(tmp));
                block::bit_block_or(dst, tmp);
            }
            SET_BLOCK_ARR_BIENC => read_bic_arr(&mut self.dec, Some(dst)),
            SET_BLOCK_ARR_BIENC_INV => {
                read_bic_arr_inv(&mut self.dec, tmp);
                block::bit_block_or(dst, tmp);
            }
            SET_BLOCK_BITGAP_BIENC => {
                read_bic_gap(&mut self.dec, Some(dst), &mut self.block_idx_arr)
            }
            SET_BLOCK_BIT_DIGEST0 => read_digest0_block(&mut self.dec, Some(dst)),
            t => return Err(unexpected_bit_block(t)),
        }
        Ok(0)
    }

    fn get_bit_block_and(&mut self, dst: &mut BitData, tmp: &mut BitData) -> Result<u32> {
        match self.block_type {
            SET_BLOCK_BIT => self.dec.get_u32_and(&mut dst[..]),
            SET_BLOCK_BIT_0RUNS => {
                let mut run_type = self.dec.get_u8() != 0;
                let mut j = 0usize;
                while j < block::BLOCK_WORDS {
                    let run_length = self.dec.get_u16() as usize;
                    if run_type {
                        for w in &mut dst[j..j + run_length] {
                            *w &= self.dec.get_u32();
                        }
                    } else {
                        dst[j..j + run_length].fill(0);
                    }
                    j += run_length;
                    run_type = !run_type;
                }
            }
            SET_BLOCK_BIT_INTERVAL => {
                let head_idx = self.dec.get_u16() as usize;
                let tail_idx = self.dec.get_u16() as usize;
                dst[..head_idx].fill(0);
                for w in &mut dst[head_idx..=tail_idx] {
                    *w &= self.dec.get_u32();
                }
                dst[tail_idx + 1..].fill(0);
            }
            SET_BLOCK_BIT_1BIT | SET_BLOCK_ARRBIT => {
                self.get_arr_bit(Some(tmp), true);
                block::bit_block_and(dst, tmp);
            }
            SET_BLOCK_ARRBIT_INV => {
                self.get_inv_arr(Some(tmp));
                block::bit_block_and(dst, tmp);
            }
            SET_BLOCK_ARR_BIENC => {
                block::bit_block_set(tmp, 0);
                read_bic_arr(&mut self.dec, Some(tmp));
                block::bit_block_and(dst, tmp);
            }
            SET_BLOCK_ARR_BIENC_INV => {
                read_bic_arr_inv(&mut self.dec, tmp);
                block::bit_block_and(dst, tmp);
            }
            SET_BLOCK_BITGAP_BIENC => {
                block::bit_block_set(tmp, 0);
                read_bic_gap(&mut self.dec, Some(tmp), &mut self.block_idx_arr);
                block::bit_block_and(dst, tmp);
            }
            SET_BLOCK_BIT_DIGEST0 => {
                block::bit_block_set(tmp, 0);
                read_digest0_block(&mut self.dec, Some(tmp));
                block::bit_block_and(dst, tmp);
            }
            t => return Err(unexpected_bit_block(t)),
        }
        Ok(0)
    }

    fn get_bit_block_xor(&mut self, dst: &mut BitData, tmp: &mut BitData) -> Result<u32> {
        match self.block_type {
            SET_BLOCK_BIT => {
                for w in dst.iter_mut() {
                    *w ^= self.dec.get_u32();
                }
            }
            SET_BLOCK_BIT_0RUNS => {
                let mut run_type = self.dec.get_u8() != 0;
                let mut j = 0usize;
                while j < block::BLOCK_WORDS {
                    let run_length = self.dec.get_u16() as usize;
                    if run_type {
                        for w in &mut dst[j..j + run_length] {
                            *w ^= self.dec.get_u32();
                        }
                    }
                    j += run_length;
                    run_type = !run_type;
                }
            }
            SET_BLOCK_BIT_INTERVAL => {
                let head_idx = self.dec.get_u16() as usize;
                let tail_idx = self.dec.get_u16() as usize;
                for w in &mut dst[head_idx..=tail_idx] {
                    *w ^= self.dec.get_u32();
                }
            }
            SET_BLOCK_BIT_1BIT | SET_BLOCK_ARRBIT => {
                self.get_arr_bit(Some(tmp), true);
                block::bit_block_xor(dst, tmp);
            }
            SET_BLOCK_ARRBIT_INV => {
                self.get_inv_arr(Some(tmp));
                block::bit_block_xor(dst, tmp);
            }
            SET_BLOCK_ARR_BIENC => {
                block::bit_block_set(tmp, 0);
                read_bic_arr(&mut self.dec, Some(tmp));
                block::bit_block_xor(dst, tmp);
            }
            SET_BLOCK_ARR_BIENC_INV => {
                read_bic_arr_inv(&mut self.dec, tmp);
                block::bit_block_xor(dst, tmp);
            }
            SET_BLOCK_BITGAP_BIENC => {
                block::bit_block_set(tmp, 0);
                read_bic_gap(&mut self.dec, Some(tmp), &mut self.block_idx_arr);
                block::bit_block_xor(dst, tmp);
            }
            SET_BLOCK_BIT_DIGEST0 => {
                block::bit_block_set(tmp, 0);
                read_digest0_block(&mut self.dec, Some(tmp));
                block::bit_block_xor(dst, tmp);
            }
            t => return Err(unexpected_bit_block(t)),
        }
        Ok(0)
    }

    fn get_bit_block_sub(&mut self, dst: &mut BitData, tmp: &mut BitData) -> Result<u32> {
        match self.block_type {
            SET_BLOCK_BIT => {
                for w in dst.iter_mut() {
                    *w &= !self.dec.get_u32();
                }
            }
            SET_BLOCK_BIT_0RUNS => {
                let mut run_type = self.dec.get_u8() != 0;
                let mut j = 0usize;
                while j < block::BLOCK_WORDS {
                    let run_length = self.dec.get_u16() as usize;
                    if run_type {
                        for w in &mut dst[j..j + run_length] {
                            *w &= !self.dec.get_u32();
                        }
                    }
                    j += run_length;
                    run_type = !run_type;
                }
            }
            SET_BLOCK_BIT_INTERVAL => {
                let head_idx = self.dec.get_u16() as usize;
                let tail_idx = self.dec.get_u16() as usize;
                for w in &mut dst[head_idx..=tail_idx] {
                    *w &= !self.dec.get_u32();
                }
            }
            SET_BLOCK_BIT_1BIT | SET_BLOCK_ARRBIT => {
                self.get_arr_bit(Some(tmp), true);
                block::bit_block_sub(dst, tmp);
            }
            SET_BLOCK_ARRBIT_INV => {
                self.get_inv_arr(Some(tmp));
                block::bit_block_sub(dst, tmp);
            }
            SET_BLOCK_ARR_BIENC => {
                block::bit_block_set(tmp, 0);
                read_bic_arr(&mut self.dec, Some(tmp));
                block::bit_block_sub(dst, tmp);
            }
            SET_BLOCK_ARR_BIENC_INV => {
                read_bic_arr_inv(&mut self.dec, tmp);
                block::bit_block_sub(dst, tmp);
            }
            SET_BLOCK_BITGAP_BIENC => {
                block::bit_block_set(tmp, 0);
                read_bic_gap(&mut self.dec, Some(tmp), &mut self.block_idx_arr);
                block::bit_block_sub(dst, tmp);
            }
            SET_BLOCK_BIT_DIGEST0 => {
                block::bit_block_set(tmp, 0);
                read_digest0_block(&mut self.dec, Some(tmp));
                block::bit_block_sub(dst, tmp);
            }
            t => return Err(unexpected_bit_block(t)),
        }
        Ok(0)
    }

    fn get_bit_block_count(&mut self, tmp: &mut BitData) -> Result<u32> {
        let mut count = 0u32;
        match self.block_type {
            SET_BLOCK_BIT => {
                for _ in 0..block::BLOCK_WORDS {
                    count += self.dec.get_u32().count_ones();
                }
            }
            SET_BLOCK_BIT_0RUNS => {
                let mut run_type = self.dec.get_u8() != 0;
                let mut j = 0usize;
                while j < block::BLOCK_WORDS {
                    let run_length = self.dec.get_u16() as usize;
                    if run_type {
                        for _ in 0..run_length {
                            count += self.dec.get_u32().count_ones();
                        }
                    }
                    j += run_length;
                    run_type = !run_type;
                }
            }
            SET_BLOCK_BIT_INTERVAL => {
                let head_idx = self.dec.get_u16() as usize;
                let tail_idx = self.dec.get_u16() as usize;
                for _ in head_idx..=tail_idx {
                    count += self.dec.get_u32().count_ones();
                }
            }
            SET_BLOCK_ARRBIT => count += self.get_arr_bit(None, false),
            SET_BLOCK_BIT_1BIT => {
                count += 1;
                self.dec.get_u16();
            }
            SET_BLOCK_ARRBIT_INV => {
                self.get_inv_arr(Some(tmp));
                count += block::bit_block_count(tmp);
            }
            SET_BLOCK_ARR_BIENC => {
                block::bit_block_set(tmp, 0);
                read_bic_arr(&mut self.dec, Some(tmp));
                count += block::bit_block_count(tmp);
            }
            SET_BLOCK_ARR_BIENC_INV => {
                read_bic_arr_inv(&mut self.dec, tmp);
                count += block::bit_block_count(tmp);
            }
            SET_BLOCK_BITGAP_BIENC => {
                block::bit_block_set(tmp, 0);
                read_bic_gap(&mut self.dec, Some(tmp), &mut self.block_idx_arr);
                count += block::bit_block_count(tmp);
            }
            SET_BLOCK_BIT_DIGEST0 => {
                block::bit_block_set(tmp, 0);
                read_digest0_block(&mut self.dec, Some(tmp));
                count += block::bit_block_count(tmp);
            }
            t => return Err(unexpected_bit_block(t)),
        }
        Ok(count)
    }

    fn get_bit_block_count_a(
        &mut self,
        dst: Option<&BitData>,
        _tmp: &mut BitData,
    ) -> Result<u32> {
        let count = dst.map_or(0, block::bit_block_count);
        // dry-advance past the block payload
        match self.block_type {
            SET_BLOCK_BIT => self.dec.skip(block::BLOCK_WORDS * 4),
            SET_BLOCK_BIT_0RUNS => {
                let mut run_type = self.dec.get_u8() != 0;
                let mut j = 0usize;
                while j < block::BLOCK_WORDS {
                    let run_length = self.dec.get_u16() as usize;
                    if run_type {
                        self.dec.skip(run_length * 4);
                    }
                    j += run_length;
                    run_type = !run_type;
                }
            }
            SET_BLOCK_BIT_INTERVAL => {
                let head_idx = self.dec.get_u16() as usize;
                let tail_idx = self.dec.get_u16() as usize;
                self.dec.skip((tail_idx - head_idx + 1) * 4);
            }
            SET_BLOCK_ARRBIT => {
                self.get_arr_bit(None, false);
            }
            SET_BLOCK_BIT_1BIT => {
                self.dec.get_u16();
            }
            SET_BLOCK_ARRBIT_INV => self.get_inv_arr(None),
            SET_BLOCK_ARR_BIENC | SET_BLOCK_ARR_BIENC_INV => {
                read_bic_arr(&mut self.dec, None);
            }
            SET_BLOCK_BITGAP_BIENC => {
                read_bic_gap(&mut self.dec, None, &mut self.block_idx_arr);
            }
            SET_BLOCK_BIT_DIGEST0 => read_digest0_block(&mut self.dec, None),
            t => return Err(unexpected_bit_block(t)),
        }
        Ok(count)
    }

    fn get_bit_block_count_and(&mut self, dst: &BitData, tmp: &mut BitData) -> Result<u32> {
        let mut count = 0u32;
        match self.block_type {
            SET_BLOCK_BIT => {
                for &w in dst.iter() {
                    count += (w & self.dec.get_u32()).count_ones();
                }
            }
            SET_BLOCK_BIT_0RUNS => {
                let mut run_type = self.dec.get_u8() != 0;
                let mut j = 0usize;
                while j < block::BLOCK_WORDS {
                    let run_length = self.dec.get_u16() as usize;
                    if run_type {
                        for k in j..j + run_length {
                            count += (dst[k] & self.dec.get_u32()).count_ones();
                        }
                    }
                    j += run_length;
                    run_type = !run_type;
                }
            }
            SET_BLOCK_BIT_INTERVAL => {
                let head_idx = self.dec.get_u16() as usize;
                let tail_idx = self.dec.get_u16() as usize;
                for k in head_idx..=tail_idx {
                    count += (dst[k] & self.dec.get_u32()).count_ones();
                }
            }
            _ => {
                self.read_block_to_tmp(tmp)?;
                count += block::bit_block_and_count(dst, tmp);
            }
        }
        Ok(count)
    }

    fn get_bit_block_count_or(&mut self, dst: &BitData, tmp: &mut BitData) -> Result<u32> {
        let mut count = 0u32;
        match self.block_type {
            SET_BLOCK_BIT => {
                for &w in dst.iter() {
                    count += (w | self.dec.get_u32()).count_ones();
                }
            }
            SET_BLOCK_BIT_0RUNS => {
                let mut run_type = self.dec.get_u8() != 0;
                let mut j = 0usize;
                while j < block::BLOCK_WORDS {
                    let run_length = self.dec.get_u16() as usize;
                    if run_type {
                        for k in j..j + run_length {
                            count += (dst[k] | self.dec.get_u32()).count_ones();
                        }
                    } else {
                        for k in j..j + run_length {
                            count += dst[k].count_ones();
                        }
                    }
                    j += run_length;
                    run_type = !run_type;
                }
            }
            SET_BLOCK_BIT_INTERVAL => {
                let head_idx = self.dec.get_u16() as usize;
                let tail_idx = self.dec.get_u16() as usize;
                for k in 0..head_idx {
                    count += dst[k].count_ones();
                }
                for k in head_idx..=tail_idx {
                    count += (dst[k] | self.dec.get_u32()).count_ones();
                }
                for k in tail_idx + 1..block::BLOCK_WORDS {
                    count += dst[k].count_ones();
                }
            }
            _ => {
                self.read_block_to_tmp(tmp)?;
                count += block::bit_block_or_count(dst, tmp);
            }
        }
        Ok(count)
    }

    fn get_bit_block_count_xor(&mut self, dst: &BitData, tmp: &mut BitData) -> Result<u32> {
        let mut count = 0u32;
        match self.block_type {
            SET_BLOCK_BIT => {
                for &w in dst.iter() {
                    count += (w ^ self.dec.get_u32()).count_ones();
                }
            }
            SET_BLOCK_BIT_0RUNS => {
                let mut run_type = self.dec.get_u8() != 0;
                let mut j = 0usize;
                while j < block::BLOCK_WORDS {
                    let run_length = self.dec.get_u16() as usize;
                    if run_type {
                        for k in j..j + run_length {
                            count += (dst[k] ^ self.dec.get_u32()).count_ones();
                        }
                    } else {
                        for k in j..j + run_length {
                            count += dst[k].count_ones();
                        }
                    }
                    j += run_length;
                    run_type = !run_type;
                }
            }
            SET_BLOCK_BIT_INTERVAL => {
                let head_idx = self.dec.get_u16() as usize;
                let tail_idx = self.dec.get_u16() as usize;
                for k in 0..head_idx {
                    count += dst[k].count_ones();
                }
                for k in head_idx..=tail_idx {
                    count += (dst[k] ^ self.dec.get_u32()).count_ones();
                }
                for k in tail_idx + 1..block::BLOCK_WORDS {
                    count += dst[k].count_ones();
                }
            }
            _ => {
                self.read_block_to_tmp(tmp)?;
                count += block::bit_block_xor_count(dst, tmp);
            }
        }
        Ok(count)
    }

    fn get_bit_block_count_sub_ab(&mut self, dst: &BitData, tmp: &mut BitData) -> Result<u32> {
        let mut count = 0u32;
        match self.block_type {
            SET_BLOCK_BIT => {
                for &w in dst.iter() {
                    count += (w & !self.dec.get_u32()).count_ones();
                }
            }
            SET_BLOCK_BIT_0RUNS => {
                let mut run_type = self.dec.get_u8() != 0;
                let mut j = 0usize;
                while j < block::BLOCK_WORDS {
                    let run_length = self.dec.get_u16() as usize;
                    if run_type {
                        for k in j..j + run_length {
                            count += (dst[k] & !self.dec.get_u32()).count_ones();
                        }
                    } else {
                        for k in j..j + run_length {
                            count += dst[k].count_ones();
                        }
                    }
                    j += run_length;
                    run_type = !run_type;
                }
            }
            SET_BLOCK_BIT_INTERVAL => {
                let head_idx = self.dec.get_u16() as usize;
                let tail_idx = self.dec.get_u16() as usize;
                for k in 0..head_idx {
                    count += dst[k].count_ones();
                }
                for k in head_idx..=tail_idx {
                    count += (dst[k] & !self.dec.get_u32()).count_ones();
                }
                for k in tail_idx + 1..block::BLOCK_WORDS {
                    count += dst[k].count_ones();
                }
            }
            _ => {
                self.read_block_to_tmp(tmp)?;
                count += block::bit_block_sub_count(dst, tmp);
            }
        }
        Ok(count)
    }

    fn get_bit_block_count_sub_ba(&mut self, dst: &BitData, tmp: &mut BitData) -> Result<u32> {
        let mut count = 0u32;
        match self.block_type {
            SET_BLOCK_BIT => {
                for &w in dst.iter() {
                    count += (self.dec.get_u32() & !w).count_ones();
                }
            }
            SET_BLOCK_BIT_0RUNS => {
                let mut run_type = self.dec.get_u8() != 0;
                let mut j = 0usize;
                while j < block::BLOCK_WORDS {
                    let run_length = self.dec.get_u16() as usize;
                    if run_type {
                        for k in j..j + run_length {
                            count += (self.dec.get_u32() & !dst[k]).count_ones();
                        }
                    }
                    j += run_length;
                    run_type = !run_type;
                }
            }
            SET_BLOCK_BIT_INTERVAL => {
                let head_idx = self.dec.get_u16() as usize;
                let tail_idx = self.dec.get_u16() as usize;
                for k in head_idx..=tail_idx {
                    count += (self.dec.get_u32() & !dst[k]).count_ones();
                }
            }
            _ => {
                self.read_block_to_tmp(tmp)?;
                count += block::bit_block_sub_count(tmp, dst);
            }
        }
        Ok(count)
    }

    // Materialize the current array-framed block into tmp (for the counted
    // fallback paths).
    fn read_block_to_tmp(&mut self, tmp: &mut BitData) -> Result<()> {
        match self.block_type {
            SET_BLOCK_BIT_1BIT | SET_BLOCK_ARRBIT => {
                self.get_arr_bit(Some(tmp), true);
            }
            SET_BLOCK_ARRBIT_INV => self.get_inv_arr(Some(tmp)),
            SET_BLOCK_ARR_BIENC => {
                block::bit_block_set(tmp, 0);
                read_bic_arr(&mut self.dec, Some(tmp));
            }
            SET_BLOCK_ARR_BIENC_INV => read_bic_arr_inv(&mut self.dec, tmp),
            SET_BLOCK_BITGAP_BIENC => {
                block::bit_block_set(tmp, 0);
                read_bic_gap(&mut self.dec, Some(tmp), &mut self.block_idx_arr);
            }
            SET_BLOCK_BIT_DIGEST0 => {
                block::bit_block_set(tmp, 0);
                read_digest0_block(&mut self.dec, Some(tmp));
            }
            t => return Err(unexpected_bit_block(t)),
        }
        Ok(())
    }
}

fn require(dst: Option<&mut BitData>) -> Result<&mut BitData> {
    dst.ok_or_else(|| SerialError::format("bit-block operation requires a destination"))
}

fn unexpected_bit_block(t: u8) -> SerialError {
    SerialError::format(format!("unexpected bit block type {t}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitvec::BitVector;
    use crate::bytes::LittleEndian;
    use crate::serializer::Serializer;

    fn stream_of(bv: &BitVector) -> Vec<u8> {
        Serializer::new().serialize_to_vec(bv)
    }

    #[test]
    fn test_iterate_zero_run_and_bit_block() {
        let mut bv = BitVector::new();
        bv.set(5 << 16); // block 5
        let buf = stream_of(&bv);
        let mut it = SerialStreamIterator::<LittleEndian>::new(&buf).unwrap();
        assert_eq!(it.state(), IterState::Blocks);

        it.next().unwrap();
        assert_eq!(it.state(), IterState::ZeroBlocks);
        assert_eq!(it.skip_mono_blocks(), 5);

        it.next().unwrap();
        assert_eq!(it.state(), IterState::GapBlock); // bit_1bit is gap-framed
        assert_eq!(it.block_type(), SET_BLOCK_BIT_1BIT);

        let mut gap = vec![0u16; 16];
        it.get_gap_block(&mut gap).unwrap();
        assert_eq!(crate::block::gap_bit_count(&gap), 1);

        it.next().unwrap();
        assert!(it.is_eof());
    }

    #[test]
    fn test_one_run_states() {
        let mut bv = BitVector::new();
        for i in 0..(65536u64 * 2) {
            bv.set(i);
        }
        bv.set(65536 * 3 + 7);
        let buf = stream_of(&bv);
        let mut it = SerialStreamIterator::<LittleEndian>::new(&buf).unwrap();
        it.next().unwrap();
        assert_eq!(it.state(), IterState::OneBlocks);
        // two one-blocks consumed one step at a time, then back to tokens
        it.next().unwrap();
        assert_eq!(it.block_idx(), 1);
        assert_eq!(it.state(), IterState::OneBlocks);
        it.next().unwrap();
        assert_eq!(it.block_idx(), 2);
        assert_eq!(it.state(), IterState::Blocks);
    }

    #[test]
    fn test_count_without_target() {
        let bits = [7u64, 8, 9, 33000, 65535];
        let bv = BitVector::from_indices(bits.into_iter());
        let buf = stream_of(&bv);
        let mut it = SerialStreamIterator::<LittleEndian>::new(&buf).unwrap();
        let mut tmp = crate::block::alloc_bit_data();

        let mut count = 0u32;
        loop {
            if it.is_eof() {
                break;
            }
            match it.state() {
                IterState::Blocks => it.next().unwrap(),
                IterState::ZeroBlocks | IterState::OneBlocks => {
                    it.skip_mono_blocks();
                }
                IterState::BitBlock => {
                    count += it.get_bit_block(None, &mut tmp, SetOp::Count).unwrap();
                }
                IterState::GapBlock => {
                    let mut gap = vec![0u16; 65538];
                    it.get_gap_block(&mut gap).unwrap();
                    count += crate::block::gap_bit_count(&gap);
                }
                IterState::ListIds | IterState::Unknown => unreachable!(),
            }
        }
        assert_eq!(count, bits.len() as u32);
    }
}
