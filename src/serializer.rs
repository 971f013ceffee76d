//! Bit-vector serialization: block classification and stream emission.
//!
//! The serializer walks blocks in ascending index order. Runs of all-zero
//! and all-set blocks collapse into run tokens (with a one-byte shortcut
//! for short zero runs); every other block goes through a per-block model
//! classifier that estimates the cost of each candidate encoding in bits
//! and picks the minimum. Classifier scores are estimates: emitters for
//! bit-stream encodings re-check the bytes actually written and roll back
//! to the plain form when the speculation lost.
//!
//! Compression levels:
//!
//! - 0, 1 — blocks are stored as-is,
//! - 2 — adds run, single-bit, digest and 0-runs detection,
//! - 3 — adds bit-to-array models,
//! - 4 — adds Elias-gamma GAP models,
//! - 5 — (default) the binary-interpolative model family.

use crate::bitvec::{BitVector, Block, ID_MAX, TOTAL_BLOCKS};
use crate::block::{
    self, BitData, BIE_CUT_OFF, GAP_EQUIV_LEN, GAP_MAX_BITS, GAP_MAX_BITS_CMRZ,
    GAP_MAX_BUFF_LEN, WAVE_WORDS,
};
use crate::bytes::{Encoder, LittleEndian};
use crate::bitpack::BitWriter;
use crate::tags::*;

/// Maximum supported compression level.
pub const COMPRESSION_MAX: u8 = 5;
/// Default compression level.
pub const COMPRESSION_DEFAULT: u8 = 5;

const MAX_MODELS: usize = 64;
const BIE_BITS_PER_INT: u32 = 4;
const GAMMA_BITS_PER_INT: u32 = 6;

type Enc<'a> = Encoder<'a, LittleEndian>;

/// Bit-vector serializer.
///
/// Reusable across calls: the instance owns its scratch buffers, so
/// serializing many vectors through one `Serializer` amortizes
/// allocations. Not safe for concurrent use.
pub struct Serializer {
    compression_level: u8,
    gap_serial: bool,
    byte_order_serial: bool,

    bit_idx_arr: Vec<u16>,
    digest0: u64,
    bit_model_d0_size: u32,
    bit_model_0run_size: u32,
    scores: [u32; MAX_MODELS],
    models: [u8; MAX_MODELS],
    mod_size: usize,
    compression_stat: Box<[u64; 256]>,
}

impl Default for Serializer {
    fn default() -> Self {
        Self::new()
    }
}

impl Serializer {
    /// Create a serializer with the default compression level (5).
    pub fn new() -> Self {
        Serializer {
            compression_level: COMPRESSION_DEFAULT,
            gap_serial: false,
            byte_order_serial: true,
            bit_idx_arr: vec![0u16; GAP_MAX_BITS as usize + 2],
            digest0: 0,
            bit_model_d0_size: 0,
            bit_model_0run_size: 0,
            scores: [0; MAX_MODELS],
            models: [0; MAX_MODELS],
            mod_size: 0,
            compression_stat: Box::new([0; 256]),
        }
    }

    /// Set the compression level (0..=5); out-of-range values are ignored.
    pub fn set_compression_level(&mut self, clevel: u8) {
        if clevel <= COMPRESSION_MAX {
            self.compression_level = clevel;
        }
    }

    /// Current compression level.
    pub fn compression_level(&self) -> u8 {
        self.compression_level
    }

    /// When `true`, the header carries the GAP length-class table.
    pub fn gap_length_serialization(&mut self, value: bool) {
        self.gap_serial = value;
    }

    /// When `true` (the default), the header carries a byte-order byte.
    pub fn byte_order_serialization(&mut self, value: bool) {
        self.byte_order_serial = value;
    }

    /// Per-tag counters of the encodings chosen by the last `serialize`.
    pub fn compression_stat(&self) -> &[u64; 256] {
        &self.compression_stat
    }

    /// Serialize into a pre-sized buffer, returning the bytes written.
    ///
    /// The caller sizes `buf` from `BitVector::calc_stat`'s
    /// `max_serialize_mem`; that pre-size is a hard contract and the hot
    /// loop performs no other bounds management.
    pub fn serialize(&mut self, bv: &BitVector, buf: &mut [u8]) -> usize {
        self.reset_compression_stats();
        let mut enc = Encoder::new(buf);
        self.encode_header(bv, &mut enc);

        enum Run {
            Zero,
            One,
        }
        let mut i: u64 = 0;
        while i < TOTAL_BLOCKS {
            let run = match bv.get_block(i) {
                None => Run::Zero,
                Some(Block::Full) => Run::One,
                Some(Block::Gap(g)) => {
                    self.encode_gap_block(g, &mut enc);
                    i += 1;
                    continue;
                }
                Some(Block::Bit(b)) => {
                    let model = self.find_bit_best_encoding(b);
                    match model {
                        SET_BLOCK_AZERO => Run::Zero,
                        SET_BLOCK_AONE => Run::One,
                        _ => {
                            self.encode_bit_block(b, model, &mut enc);
                            i += 1;
                            continue;
                        }
                    }
                }
            };

            match run {
                Run::Zero => match bv.find_next_nz_block(i + 1) {
                    None => {
                        // the tail is empty: azero terminates without an
                        // end token
                        enc.put_u8(SET_BLOCK_AZERO);
                        return enc.size();
                    }
                    Some(next) => {
                        let nb = next - i;
                        if nb > 1 && nb < 128 {
                            // short zero run folded into one tag byte
                            enc.put_u8(0x80 | nb as u8);
                        } else {
                            encode_run(
                                &mut enc,
                                nb,
                                SET_BLOCK_1ZERO,
                                SET_BLOCK_8ZERO,
                                SET_BLOCK_16ZERO,
                                SET_BLOCK_32ZERO,
                            );
                        }
                        i = next;
                    }
                },
                Run::One => {
                    let mut j = i + 1;
                    while j < TOTAL_BLOCKS && bv.is_block_all_one(j, true) {
                        j += 1;
                    }
                    if j == TOTAL_BLOCKS {
                        enc.put_u8(SET_BLOCK_AONE);
                        break;
                    }
                    encode_run(
                        &mut enc,
                        j - i,
                        SET_BLOCK_1ONE,
                        SET_BLOCK_8ONE,
                        SET_BLOCK_16ONE,
                        SET_BLOCK_32ONE,
                    );
                    i = j;
                }
            }
        }
        enc.put_u8(SET_BLOCK_END);
        enc.size()
    }

    /// Serialize into a freshly sized buffer.
    pub fn serialize_to_vec(&mut self, bv: &BitVector) -> Vec<u8> {
        let stat = bv.calc_stat();
        let mut buf = vec![0u8; stat.max_serialize_mem];
        let len = self.serialize(bv, &mut buf);
        debug_assert!(len <= buf.len());
        buf.truncate(len);
        buf
    }

    /// Optimize, serialize, then discard the source vector's content.
    ///
    /// The three passes share one walk and one scratch block; the source is
    /// left empty, effectively moving its data into the returned buffer.
    pub fn optimize_serialize_destroy(&mut self, bv: &mut BitVector) -> Vec<u8> {
        bv.optimize();
        let buf = self.serialize_to_vec(bv);
        bv.clear();
        buf
    }

    // ---------------------------------------------------------------------

    fn reset_compression_stats(&mut self) {
        self.compression_stat.fill(0);
    }

    fn reset_models(&mut self) {
        self.mod_size = 0;
    }

    fn add_model(&mut self, model: u8, score: u32) {
        debug_assert!(self.mod_size < MAX_MODELS);
        self.scores[self.mod_size] = score;
        self.models[self.mod_size] = model;
        self.mod_size += 1;
    }

    fn best_model(&self) -> u8 {
        let mut min_score = GAP_MAX_BITS;
        let mut model = SET_BLOCK_BIT;
        for k in 0..self.mod_size {
            if self.scores[k] < min_score {
                min_score = self.scores[k];
                model = self.models[k];
            }
        }
        model
    }

    fn encode_header(&self, bv: &BitVector, enc: &mut Enc<'_>) {
        let mut flags = 0u8;
        if bv.size() == ID_MAX {
            flags |= HM_DEFAULT;
        } else {
            flags |= HM_RESIZE;
        }
        if !self.byte_order_serial {
            flags |= HM_NO_BO;
        }
        if !self.gap_serial {
            flags |= HM_NO_GAPL;
        }
        enc.put_u8(flags);
        if self.byte_order_serial {
            enc.put_u8(BO_LITTLE_ENDIAN);
        }
        if self.gap_serial {
            for &g in bv.glen() {
                enc.put_u16(g);
            }
        }
        if flags & HM_RESIZE != 0 {
            enc.put_u32(bv.size() as u32);
        }
    }

    // -- classifiers ------------------------------------------------------

    /// Best representation for a bit-block at the current level.
    fn find_bit_best_encoding(&mut self, blk: &BitData) -> u8 {
        self.reset_models();
        if self.compression_level >= 5 {
            return self.find_bit_best_encoding_l5(blk);
        }

        self.add_model(SET_BLOCK_BIT, GAP_MAX_BITS);
        if self.compression_level <= 1 {
            return SET_BLOCK_BIT;
        }

        self.bit_model_0run_size = block::bit_count_nonzero_size(blk);
        self.add_model(SET_BLOCK_BIT_0RUNS, self.bit_model_0run_size * 8);

        let d0 = block::calc_block_digest0(blk);
        self.digest0 = d0;
        if d0 == 0 {
            self.add_model(SET_BLOCK_AZERO, 0);
            return SET_BLOCK_AZERO;
        }
        let d0_bc = d0.count_ones();
        self.bit_model_d0_size = 8 + 32 * d0_bc * 4;
        if d0 != !0u64 {
            self.add_model(SET_BLOCK_BIT_DIGEST0, self.bit_model_d0_size * 8);
        }

        let (bit_gaps, bc) = if self.compression_level >= 4 {
            block::bit_block_change_bc(blk)
        } else {
            (65535, block::bit_block_count(blk))
        };
        debug_assert!(bc > 0);
        if bc == 1 {
            self.add_model(SET_BLOCK_BIT_1BIT, 16);
            return SET_BLOCK_BIT_1BIT;
        }
        let inverted_bc = GAP_MAX_BITS - bc;
        if inverted_bc == 0 {
            self.add_model(SET_BLOCK_AONE, 0);
            return SET_BLOCK_AONE;
        }

        if self.compression_level >= 3 {
            self.add_model(SET_BLOCK_ARRBIT, (2 + bc * 2) * 8);
            self.add_model(SET_BLOCK_ARRBIT_INV, (2 + inverted_bc * 2) * 8);

            if self.compression_level == 4 {
                if bit_gaps > 3 && bit_gaps < GAP_MAX_BUFF_LEN {
                    self.add_model(
                        SET_BLOCK_GAP_EGAMMA,
                        16 + (bit_gaps - 1) * GAMMA_BITS_PER_INT,
                    );
                }
                if bc < bit_gaps && bc < GAP_EQUIV_LEN {
                    self.add_model(SET_BLOCK_ARRGAP_EGAMMA, 16 + bc * GAMMA_BITS_PER_INT);
                }
                if inverted_bc > 3 && inverted_bc < bit_gaps && inverted_bc < GAP_EQUIV_LEN {
                    self.add_model(
                        SET_BLOCK_ARRGAP_EGAMMA_INV,
                        16 + inverted_bc * GAMMA_BITS_PER_INT,
                    );
                }
            }
        }
        self.best_model()
    }

    /// Level-5 classifier: the full binary-interpolative model family.
    fn find_bit_best_encoding_l5(&mut self, blk: &BitData) -> u8 {
        self.add_model(SET_BLOCK_BIT, GAP_MAX_BITS);

        self.bit_model_0run_size = block::bit_count_nonzero_size(blk);
        self.add_model(SET_BLOCK_BIT_0RUNS, self.bit_model_0run_size * 8);

        let d0 = block::calc_block_digest0(blk);
        self.digest0 = d0;
        if d0 == 0 {
            self.add_model(SET_BLOCK_AZERO, 0);
            return SET_BLOCK_AZERO;
        }
        let d0_bc = d0.count_ones();
        self.bit_model_d0_size = 8 + 32 * d0_bc * 4;
        if d0 != !0u64 {
            self.add_model(SET_BLOCK_BIT_DIGEST0, self.bit_model_d0_size * 8);
        }

        let (bit_gaps, bc) = block::bit_block_change_bc(blk);
        if bc == 1 {
            self.add_model(SET_BLOCK_BIT_1BIT, 16);
            return SET_BLOCK_BIT_1BIT;
        }
        let inverted_bc = GAP_MAX_BITS - bc;
        if inverted_bc == 0 {
            self.add_model(SET_BLOCK_AONE, 0);
            return SET_BLOCK_AONE;
        }

        self.add_model(SET_BLOCK_ARRBIT, (2 + bc * 2) * 8);
        self.add_model(SET_BLOCK_ARRBIT_INV, (2 + inverted_bc * 2) * 8);

        if bit_gaps > 3 && bit_gaps < GAP_MAX_BUFF_LEN {
            self.add_model(
                SET_BLOCK_GAP_BIENC,
                32 + (bit_gaps - 1) * BIE_BITS_PER_INT,
            );
        }
        if bc < bit_gaps && bc < GAP_EQUIV_LEN {
            self.add_model(SET_BLOCK_ARRGAP_BIENC, 16 * 3 + bc * BIE_BITS_PER_INT);
        } else if inverted_bc < bit_gaps && inverted_bc < GAP_EQUIV_LEN {
            self.add_model(
                SET_BLOCK_ARRGAP_BIENC_INV,
                16 * 3 + inverted_bc * BIE_BITS_PER_INT,
            );
        } else if bc >= GAP_EQUIV_LEN && bc < BIE_CUT_OFF {
            self.add_model(SET_BLOCK_ARR_BIENC, 16 * 3 + bc * BIE_BITS_PER_INT);
        } else if inverted_bc > 3 && inverted_bc >= GAP_EQUIV_LEN && inverted_bc < BIE_CUT_OFF {
            self.add_model(
                SET_BLOCK_ARR_BIENC_INV,
                16 * 3 + inverted_bc * BIE_BITS_PER_INT,
            );
        }
        if bit_gaps >= GAP_MAX_BUFF_LEN && bit_gaps < BIE_CUT_OFF {
            self.add_model(
                SET_BLOCK_BITGAP_BIENC,
                16 * 4 + (bit_gaps - 2) * BIE_BITS_PER_INT,
            );
        }
        self.best_model()
    }

    /// Best representation for a GAP block at the current level.
    fn find_gap_best_encoding(&self, gap: &[u16]) -> u8 {
        if self.compression_level <= 2 {
            return SET_BLOCK_GAP;
        }
        let len = block::gap_length(gap) as u32;
        let bc = block::gap_bit_count(gap);
        if bc == 1 {
            return SET_BLOCK_BIT_1BIT;
        }
        if bc < len {
            if self.compression_level < 4 {
                return SET_BLOCK_ARRGAP;
            }
            if self.compression_level == 4 {
                return SET_BLOCK_ARRGAP_EGAMMA;
            }
            return SET_BLOCK_ARRGAP_BIENC;
        }
        let inverted_bc = GAP_MAX_BITS - bc;
        if inverted_bc < len {
            if self.compression_level < 4 {
                return SET_BLOCK_ARRGAP_INV;
            }
            if self.compression_level == 4 {
                return SET_BLOCK_ARRGAP_EGAMMA_INV;
            }
            return SET_BLOCK_ARRGAP_BIENC_INV;
        }
        if len < 6 {
            return SET_BLOCK_GAP;
        }
        if self.compression_level == 4 {
            return SET_BLOCK_GAP_EGAMMA;
        }
        SET_BLOCK_GAP_BIENC
    }

    // -- emitters ---------------------------------------------------------

    // Runs closure `f` with the instance scratch index array detached, so
    // emitters can borrow both the array and `self`.
    fn with_idx_arr<R>(
        &mut self,
        f: impl FnOnce(&mut Self, &mut [u16]) -> R,
    ) -> R {
        let mut arr = std::mem::take(&mut self.bit_idx_arr);
        let r = f(self, &mut arr[..]);
        self.bit_idx_arr = arr;
        r
    }

    fn encode_gap_block(&mut self, gap: &[u16], enc: &mut Enc<'_>) {
        let choice = self.find_gap_best_encoding(gap);
        match choice {
            SET_BLOCK_BIT_1BIT => self.with_idx_arr(|s, arr| {
                let n =
                    block::gap_convert_to_arr(arr, gap, (GAP_EQUIV_LEN - 10) as usize, false);
                debug_assert_eq!(n, 1);
                enc.put_u8(SET_BLOCK_BIT_1BIT);
                enc.put_u16(arr[0]);
                s.compression_stat[SET_BLOCK_BIT_1BIT as usize] += 1;
            }),
            SET_BLOCK_ARRGAP
            | SET_BLOCK_ARRGAP_EGAMMA
            | SET_BLOCK_ARRGAP_INV
            | SET_BLOCK_ARRGAP_EGAMMA_INV => self.with_idx_arr(|s, arr| {
                let invert = matches!(
                    choice,
                    SET_BLOCK_ARRGAP_INV | SET_BLOCK_ARRGAP_EGAMMA_INV
                );
                let n =
                    block::gap_convert_to_arr(arr, gap, (GAP_EQUIV_LEN - 10) as usize, invert);
                debug_assert!(n > 0);
                s.gamma_gap_array(&arr[..n], enc, invert);
            }),
            SET_BLOCK_GAP_BIENC => self.interpolated_encode_gap_block(gap, enc),
            SET_BLOCK_ARRGAP_BIENC | SET_BLOCK_ARRGAP_BIENC_INV => self.with_idx_arr(|s, arr| {
                let invert = choice == SET_BLOCK_ARRGAP_BIENC_INV;
                let n =
                    block::gap_convert_to_arr(arr, gap, (GAP_EQUIV_LEN - 64) as usize, invert);
                debug_assert!(n > 0);
                s.interpolated_gap_array(&arr[..n], enc, invert);
            }),
            _ => self.gamma_gap_block(gap, enc),
        }
    }

    fn encode_bit_block(&mut self, blk: &BitData, model: u8, enc: &mut Enc<'_>) {
        match model {
            SET_BLOCK_BIT_1BIT => match block::bit_block_find_first(blk) {
                Some(bit_idx) => {
                    enc.put_u8(SET_BLOCK_BIT_1BIT);
                    enc.put_u16(bit_idx as u16);
                    self.compression_stat[SET_BLOCK_BIT_1BIT as usize] += 1;
                }
                None => unreachable!("1-bit model on an empty block"),
            },
            SET_BLOCK_ARRBIT => self.encode_bit_array(blk, enc, false),
            SET_BLOCK_ARRBIT_INV => self.encode_bit_array(blk, enc, true),
            SET_BLOCK_GAP_EGAMMA => self.gamma_gap_bit_block(blk, enc),
            SET_BLOCK_BIT_0RUNS => self.encode_bit_interval(blk, enc),
            SET_BLOCK_ARRGAP_EGAMMA => self.gamma_arr_bit_block(blk, enc, false),
            SET_BLOCK_ARRGAP_EGAMMA_INV => self.gamma_arr_bit_block(blk, enc, true),
            SET_BLOCK_ARRGAP_BIENC => self.bienc_arr_bit_block(blk, enc, false),
            SET_BLOCK_ARRGAP_BIENC_INV => self.bienc_arr_bit_block(blk, enc, true),
            SET_BLOCK_ARR_BIENC => self.interpolated_arr_bit_block(blk, enc, false),
            SET_BLOCK_ARR_BIENC_INV => self.interpolated_arr_bit_block(blk, enc, true),
            SET_BLOCK_GAP_BIENC => self.interpolated_gap_bit_block(blk, enc),
            SET_BLOCK_BITGAP_BIENC => self.bienc_gap_bit_block(blk, enc),
            SET_BLOCK_BIT_DIGEST0 => {
                let d0 = self.digest0;
                self.encode_bit_digest(blk, enc, d0);
            }
            _ => {
                enc.put_prefixed_array_u32(SET_BLOCK_BIT, &blk[..]);
                self.compression_stat[SET_BLOCK_BIT as usize] += 1;
            }
        }
    }

    /// Plain GAP block, gamma-compressed when the level allows it.
    fn gamma_gap_block(&mut self, gap: &[u16], enc: &mut Enc<'_>) {
        let len = block::gap_length(gap);
        if len > 3 && self.compression_level > 3 {
            let pos0 = enc.pos();
            enc.put_u8(SET_BLOCK_GAP_EGAMMA);
            enc.put_u16(gap[0]);
            {
                let mut bout = BitWriter::new(&mut *enc);
                let mut prev = gap[1];
                bout.gamma(u32::from(prev) + 1);
                for &curr in &gap[2..len - 1] {
                    bout.gamma(u32::from(curr - prev));
                    prev = curr;
                }
                bout.flush();
            }
            let gamma_size = enc.pos() - pos0;
            if gamma_size > (len - 1) * 2 {
                enc.set_pos(pos0);
            } else {
                self.compression_stat[SET_BLOCK_GAP_EGAMMA as usize] += 1;
                return;
            }
        }
        enc.put_u8(SET_BLOCK_GAP);
        enc.put_u16_slice(&gap[..len - 1]);
        self.compression_stat[SET_BLOCK_GAP as usize] += 1;
    }

    /// GAP block as interpolative-coded run ends.
    fn interpolated_encode_gap_block(&mut self, gap: &[u16], enc: &mut Enc<'_>) {
        let len = block::gap_length(gap);
        if len > 3 {
            let pos0 = enc.pos();
            let min_v = gap[1];
            debug_assert_eq!(gap[len - 1], 65535);
            enc.put_u8(SET_BLOCK_GAP_BIENC);
            enc.put_u16(gap[0]);
            enc.put_u16(min_v);
            {
                let mut bout = BitWriter::new(&mut *enc);
                bout.bic_encode_u16(&gap[2..len - 1], min_v, 65535);
                bout.flush();
            }
            let enc_size = enc.pos() - pos0;
            if enc_size > (len - 1) * 2 {
                enc.set_pos(pos0);
            } else {
                self.compression_stat[SET_BLOCK_GAP_BIENC as usize] += 1;
                return;
            }
        }
        enc.put_u8(SET_BLOCK_GAP);
        enc.put_u16_slice(&gap[..len - 1]);
        self.compression_stat[SET_BLOCK_GAP as usize] += 1;
    }

    /// Sorted position array as gamma-coded deltas.
    fn gamma_gap_array(&mut self, arr: &[u16], enc: &mut Enc<'_>, inverted: bool) {
        let mut scode = if inverted {
            SET_BLOCK_ARRGAP_EGAMMA_INV
        } else {
            SET_BLOCK_ARRGAP_EGAMMA
        };
        if self.compression_level > 3 && arr.len() > 1 {
            let pos0 = enc.pos();
            enc.put_u8(scode);
            {
                let mut bout = BitWriter::new(&mut *enc);
                bout.gamma(arr.len() as u32);
                let mut prev = arr[0];
                bout.gamma(u32::from(prev) + 1);
                for &curr in &arr[1..] {
                    bout.gamma(u32::from(curr - prev));
                    prev = curr;
                }
                bout.flush();
            }
            let gamma_size = enc.pos() - pos0;
            let plain_size = 2 + arr.len() * 2;
            if gamma_size >= plain_size {
                enc.set_pos(pos0);
            } else {
                self.compression_stat[scode as usize] += 1;
                return;
            }
        }
        scode = if inverted {
            SET_BLOCK_ARRGAP_INV
        } else {
            SET_BLOCK_ARRGAP
        };
        enc.put_prefixed_array_u16(scode, arr, true);
        self.compression_stat[scode as usize] += 1;
    }

    /// Sorted position array under interpolative coding.
    fn interpolated_gap_array(&mut self, arr: &[u16], enc: &mut Enc<'_>, inverted: bool) {
        debug_assert!(arr.len() <= 65535);
        let mut scode = if inverted {
            SET_BLOCK_ARRGAP_BIENC_INV
        } else {
            SET_BLOCK_ARRGAP_BIENC
        };
        if arr.len() > 4 {
            let pos0 = enc.pos();
            let min_v = arr[0];
            let max_v = arr[arr.len() - 1];
            debug_assert!(max_v > min_v);
            enc.put_u8(scode);
            enc.put_u16(min_v);
            enc.put_u16(max_v);
            {
                let mut bout = BitWriter::new(&mut *enc);
                bout.gamma(arr.len() as u32 - 4);
                bout.bic_encode_u16(&arr[1..arr.len() - 1], min_v, max_v);
                bout.flush();
            }
            let enc_size = enc.pos() - pos0;
            let raw_size = 2 + arr.len() * 2;
            if enc_size >= raw_size {
                enc.set_pos(pos0);
            } else {
                self.compression_stat[scode as usize] += 1;
                return;
            }
        }
        scode = if inverted {
            SET_BLOCK_ARRGAP_INV
        } else {
            SET_BLOCK_ARRGAP
        };
        enc.put_prefixed_array_u16(scode, arr, true);
        self.compression_stat[scode as usize] += 1;
    }

    /// Bit-block as a plain position list (or its complement).
    fn encode_bit_array(&mut self, blk: &BitData, enc: &mut Enc<'_>, inverted: bool) {
        self.with_idx_arr(|s, arr| {
            let n = block::bit_convert_to_arr(arr, blk, GAP_MAX_BITS_CMRZ, inverted);
            if n > 0 {
                let scode = if inverted {
                    SET_BLOCK_ARRBIT_INV
                } else {
                    SET_BLOCK_ARRBIT
                };
                enc.put_prefixed_array_u16(scode, &arr[..n], true);
                s.compression_stat[scode as usize] += 1;
                return;
            }
            let d0 = s.digest0;
            s.encode_bit_digest(blk, enc, d0);
        })
    }

    fn gamma_gap_bit_block(&mut self, blk: &BitData, enc: &mut Enc<'_>) {
        self.with_idx_arr(|s, arr| {
            let len = block::bit_to_gap(arr, blk, GAP_EQUIV_LEN as usize);
            debug_assert!(len > 0);
            s.gamma_gap_block(&arr[..=len], enc);
        })
    }

    fn gamma_arr_bit_block(&mut self, blk: &BitData, enc: &mut Enc<'_>, inverted: bool) {
        self.with_idx_arr(|s, arr| {
            let n = block::bit_convert_to_arr(arr, blk, GAP_EQUIV_LEN, inverted);
            if n > 0 {
                s.gamma_gap_array(&arr[..n], enc, inverted);
                return;
            }
            enc.put_prefixed_array_u32(SET_BLOCK_BIT, &blk[..]);
            s.compression_stat[SET_BLOCK_BIT as usize] += 1;
        })
    }

    fn bienc_arr_bit_block(&mut self, blk: &BitData, enc: &mut Enc<'_>, inverted: bool) {
        self.with_idx_arr(|s, arr| {
            let n = block::bit_convert_to_arr(arr, blk, GAP_EQUIV_LEN, inverted);
            if n > 0 {
                s.interpolated_gap_array(&arr[..n], enc, inverted);
                return;
            }
            let d0 = s.digest0;
            s.encode_bit_digest(blk, enc, d0);
        })
    }

    fn interpolated_gap_bit_block(&mut self, blk: &BitData, enc: &mut Enc<'_>) {
        self.with_idx_arr(|s, arr| {
            let len = block::bit_to_gap(arr, blk, GAP_MAX_BITS as usize);
            debug_assert!(len > 0);
            s.interpolated_encode_gap_block(&arr[..=len], enc);
        })
    }

    /// Bit-block as an interpolative-coded GAP sequence.
    fn bienc_gap_bit_block(&mut self, blk: &BitData, enc: &mut Enc<'_>) {
        self.with_idx_arr(|s, arr| {
            let len = block::bit_to_gap(arr, blk, GAP_MAX_BITS as usize);
            debug_assert!(len > 0 && len as u32 <= BIE_CUT_OFF);
            let pos0 = enc.pos();
            {
                let head = arr[0] & 1;
                let min_v = arr[1];
                debug_assert_eq!(arr[len], 65535);
                enc.put_u8(SET_BLOCK_BITGAP_BIENC);
                enc.put_u8(head as u8);
                enc.put_u16(len as u16);
                enc.put_u16(min_v);
                let mut bout = BitWriter::new(&mut *enc);
                bout.bic_encode_u16(&arr[2..len], min_v, 65535);
                bout.flush();
            }
            let enc_size = enc.pos() - pos0;
            let raw_size = BLOCK_BYTES;
            if enc_size >= raw_size {
                enc.set_pos(pos0);
            } else {
                s.compression_stat[SET_BLOCK_BITGAP_BIENC as usize] += 1;
                return;
            }
            let d0 = s.digest0;
            s.encode_bit_digest(blk, enc, d0);
        })
    }

    /// Bit-block as an interpolative-coded position array.
    fn interpolated_arr_bit_block(&mut self, blk: &BitData, enc: &mut Enc<'_>, inverted: bool) {
        self.with_idx_arr(|s, arr| {
            let n = block::bit_convert_to_arr(arr, blk, GAP_MAX_BITS_CMRZ, inverted);
            if n > 0 {
                let scode = if inverted {
                    SET_BLOCK_ARR_BIENC_INV
                } else {
                    SET_BLOCK_ARR_BIENC
                };
                let pos0 = enc.pos();
                {
                    let min_v = arr[0];
                    let max_v = arr[n - 1];
                    debug_assert!(max_v > min_v);
                    enc.put_u8(scode);
                    enc.put_u16(min_v);
                    enc.put_u16(max_v);
                    enc.put_u16(n as u16);
                    let mut bout = BitWriter::new(&mut *enc);
                    bout.bic_encode_u16(&arr[1..n - 1], min_v, max_v);
                    bout.flush();
                }
                let enc_size = enc.pos() - pos0;
                let rollback = enc_size >= BLOCK_BYTES
                    || (s.digest0 != !0u64 && enc_size as u32 > s.bit_model_d0_size);
                if !rollback {
                    s.compression_stat[scode as usize] += 1;
                    return;
                }
                enc.set_pos(pos0);
            }
            let d0 = s.digest0;
            s.encode_bit_digest(blk, enc, d0);
        })
    }

    /// Bit-block with alternating zero / data word runs.
    fn encode_bit_interval(&mut self, blk: &BitData, enc: &mut Enc<'_>) {
        enc.put_u8(SET_BLOCK_BIT_0RUNS);
        enc.put_u8(u8::from(blk[0] != 0));
        let mut i = 0usize;
        while i < block::BLOCK_WORDS {
            if blk[i] == 0 {
                let j = block::zero_run_end(blk, i);
                enc.put_u16((j - i) as u16);
                i = j;
            } else {
                let j = block::nonzero_run_end(blk, i);
                enc.put_u16((j - i) as u16);
                enc.put_u32_slice(&blk[i..j]);
                i = j;
            }
        }
        self.compression_stat[SET_BLOCK_BIT_0RUNS as usize] += 1;
    }

    /// Digest-driven emit: only non-empty waves are streamed.
    fn encode_bit_digest(&mut self, blk: &BitData, enc: &mut Enc<'_>, d0: u64) {
        if d0 != !0u64 {
            if self.bit_model_0run_size < self.bit_model_d0_size {
                self.encode_bit_interval(blk, enc);
                return;
            }
            enc.put_u8(SET_BLOCK_BIT_DIGEST0);
            enc.put_u64(d0);
            let mut d = d0;
            while d != 0 {
                let wave = d.trailing_zeros() as usize;
                let off = wave * WAVE_WORDS;
                enc.put_u32_slice(&blk[off..off + WAVE_WORDS]);
                d &= d - 1;
            }
            self.compression_stat[SET_BLOCK_BIT_DIGEST0 as usize] += 1;
        } else {
            if (self.bit_model_0run_size as usize) < BLOCK_BYTES {
                self.encode_bit_interval(blk, enc);
                return;
            }
            enc.put_prefixed_array_u32(SET_BLOCK_BIT, &blk[..]);
            self.compression_stat[SET_BLOCK_BIT as usize] += 1;
        }
    }
}

const BLOCK_BYTES: usize = block::BLOCK_WORDS * 4;

fn encode_run(enc: &mut Enc<'_>, nb: u64, t1: u8, t8: u8, t16: u8, t32: u8) {
    if nb == 1 {
        enc.put_u8(t1);
    } else if nb < 256 {
        enc.put_u8(t8);
        enc.put_u8(nb as u8);
    } else if nb < 65536 {
        enc.put_u8(t16);
        enc.put_u16(nb as u16);
    } else {
        enc.put_u8(t32);
        enc.put_u32(nb as u32);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitvec::BitVector;

    fn serialize(bv: &BitVector, level: u8) -> (Vec<u8>, Serializer) {
        let mut ser = Serializer::new();
        ser.set_compression_level(level);
        let buf = ser.serialize_to_vec(bv);
        (buf, ser)
    }

    #[test]
    fn test_empty_vector_is_tiny() {
        let bv = BitVector::new();
        let (buf, _) = serialize(&bv, 5);
        // flags, byte-order, azero
        assert_eq!(buf.len(), 3);
        assert_eq!(buf[2], SET_BLOCK_AZERO);
    }

    #[test]
    fn test_single_bit_stream_shape() {
        let mut bv = BitVector::new();
        bv.set(1_000_000); // block 15, offset 16960
        let (buf, _) = serialize(&bv, 5);
        assert_eq!(buf[2], 0x80 | 15); // short zero-run shortcut
        assert_eq!(buf[3], SET_BLOCK_BIT_1BIT);
        assert_eq!(u16::from_le_bytes([buf[4], buf[5]]), 16960);
        assert_eq!(buf[6], SET_BLOCK_AZERO);
        assert_eq!(buf.len(), 7);
    }

    #[test]
    fn test_full_first_block_stream_shape() {
        let mut bv = BitVector::new();
        for i in 0..65536u64 {
            bv.set(i);
        }
        let (buf, _) = serialize(&bv, 5);
        assert_eq!(buf[2], SET_BLOCK_1ONE);
        assert_eq!(buf[3], SET_BLOCK_AZERO);
        assert_eq!(buf.len(), 4);
    }

    #[test]
    fn test_alternating_block_stays_plain() {
        let mut bv = BitVector::new();
        for i in (0..65536u64).step_by(2) {
            bv.set(i);
        }
        let (buf, ser) = serialize(&bv, 5);
        assert!(buf.len() >= 8194);
        assert_eq!(ser.compression_stat()[SET_BLOCK_BIT as usize], 1);
    }

    #[test]
    fn test_sparse_block_picks_arrgap_bienc() {
        let bits = [1000u64, 1007, 1100, 1203, 1300, 1405, 1500, 1608, 1700, 1800];
        let bv = BitVector::from_indices(bits.into_iter());
        let (buf, ser) = serialize(&bv, 5);
        assert_eq!(ser.compression_stat()[SET_BLOCK_ARRGAP_BIENC as usize], 1);
        assert!(buf.len() < 2 + 2 * bits.len() + 8);
    }

    #[test]
    fn test_level_bounds_respected() {
        let mut ser = Serializer::new();
        ser.set_compression_level(9);
        assert_eq!(ser.compression_level(), COMPRESSION_DEFAULT);
        ser.set_compression_level(0);
        assert_eq!(ser.compression_level(), 0);
    }

    #[test]
    fn test_level0_is_plain_bit() {
        let bv = BitVector::from_indices([1u64, 2, 3].into_iter());
        let (buf, ser) = serialize(&bv, 0);
        assert_eq!(ser.compression_stat()[SET_BLOCK_BIT as usize], 1);
        // header + tag + 8 KiB + azero
        assert_eq!(buf.len(), 2 + 1 + 8192 + 1);
    }

    #[test]
    fn test_gap_levels_in_header() {
        let bv = BitVector::from_indices([5u64].into_iter());
        let mut ser = Serializer::new();
        ser.gap_length_serialization(true);
        let buf = ser.serialize_to_vec(&bv);
        assert_eq!(buf[0] & HM_NO_GAPL, 0);
        let g0 = u16::from_le_bytes([buf[2], buf[3]]);
        assert_eq!(g0, crate::block::DEFAULT_GAP_LEVELS[0]);
    }

    #[test]
    fn test_destructive_serialize_empties_source() {
        let mut bv = BitVector::from_indices([7u64, 70_000, 700_000].into_iter());
        let mut ser = Serializer::new();
        let buf = ser.optimize_serialize_destroy(&mut bv);
        assert!(bv.is_empty());
        assert!(!buf.is_empty());
    }
}
