//! Stream decoding: shared token readers and the OR-merge deserializer.
//!
//! Deserialization is always additive: every decoded block is combined into
//! the target with logical OR, which is what lets a vector be resumed from
//! several blobs. The token readers in this module are shared with the
//! stream iterator; they re-materialize individual block encodings and
//! support dry reads (no destination) that only advance the stream.

use crate::bitpack::BitReader;
use crate::bitvec::{BitVector, Block, TOTAL_BLOCKS};
use crate::block::{
    self, BitData, GAP_LEVELS, WAVE_WORDS,
};
use crate::bytes::{BigEndian, Decoder, Endian, LittleEndian};
use crate::error::{Result, SerialError};
use crate::ops::CombineOp;
use crate::tags::*;

// ---------------------------------------------------------------------------
// shared token readers

/// Read an id-list style block body into `dst`, returning the id count.
pub(crate) fn read_id_list<E: Endian>(
    dec: &mut Decoder<'_, E>,
    block_type: u8,
    dst: &mut [u16],
) -> Result<usize> {
    match block_type {
        SET_BLOCK_BIT_1BIT => {
            dst[0] = dec.get_u16();
            Ok(1)
        }
        SET_BLOCK_ARRGAP | SET_BLOCK_ARRGAP_INV => {
            let len = dec.get_u16() as usize;
            dec.get_u16_into(&mut dst[..len]);
            Ok(len)
        }
        SET_BLOCK_ARRGAP_EGAMMA | SET_BLOCK_ARRGAP_EGAMMA_INV => {
            let mut bin = BitReader::new(dec);
            let len = bin.gamma() as usize;
            let mut prev = 0u16;
            for (k, slot) in dst[..len].iter_mut().enumerate() {
                let mut bit_idx = bin.gamma() as u16;
                if k == 0 {
                    // the first id was stored off by one so it never gammas 0
                    bit_idx = bit_idx.wrapping_sub(1);
                }
                bit_idx = bit_idx.wrapping_add(prev);
                prev = bit_idx;
                *slot = bit_idx;
            }
            Ok(len)
        }
        SET_BLOCK_ARRGAP_BIENC | SET_BLOCK_ARRGAP_BIENC_INV => {
            let min_v = dec.get_u16();
            let max_v = dec.get_u16();
            let mut bin = BitReader::new(dec);
            let len = bin.gamma() as usize + 4;
            dst[0] = min_v;
            dst[len - 1] = max_v;
            bin.bic_decode_u16(&mut dst[1..len - 1], min_v, max_v);
            Ok(len)
        }
        t => Err(SerialError::format(format!(
            "unexpected id-list block type {t}"
        ))),
    }
}

/// Read a GAP-encoded block into `dst` (complete GAP form, header + runs).
///
/// `gap_head` must already be consumed from the stream for the headed
/// encodings (`gap`, `gap_egamma`, `gap_bienc`); `id_array` is scratch for
/// the array-framed encodings.
pub(crate) fn read_gap_block<E: Endian>(
    dec: &mut Decoder<'_, E>,
    block_type: u8,
    dst: &mut [u16],
    gap_head: u16,
    id_array: &mut [u16],
) -> Result<()> {
    match block_type {
        SET_BLOCK_GAP => {
            let len = (gap_head >> 3) as usize + 1;
            dst[0] = gap_head;
            dec.get_u16_into(&mut dst[1..len - 1]);
            dst[len - 1] = 65535;
        }
        SET_BLOCK_BIT_1BIT => {
            let bit_idx = dec.get_u16();
            block::gap_set_array(dst, &[bit_idx]);
        }
        SET_BLOCK_ARRGAP
        | SET_BLOCK_ARRGAP_INV
        | SET_BLOCK_ARRGAP_EGAMMA
        | SET_BLOCK_ARRGAP_EGAMMA_INV
        | SET_BLOCK_ARRGAP_BIENC
        | SET_BLOCK_ARRGAP_BIENC_INV => {
            let arr_len = read_id_list(dec, block_type, id_array)?;
            dst[0] = 0;
            block::gap_set_array(dst, &id_array[..arr_len]);
        }
        SET_BLOCK_GAP_EGAMMA => {
            let len = (gap_head >> 3) as usize - 1;
            dst[0] = gap_head;
            let mut bin = BitReader::new(dec);
            let mut gap_sum = (bin.gamma() as u16).wrapping_sub(1);
            dst[1] = gap_sum;
            for slot in &mut dst[2..len + 1] {
                gap_sum = gap_sum.wrapping_add(bin.gamma() as u16);
                *slot = gap_sum;
            }
            dst[len + 1] = 65535;
        }
        SET_BLOCK_GAP_BIENC => {
            let len = (gap_head >> 3) as usize;
            dst[0] = gap_head;
            let min_v = dec.get_u16();
            dst[1] = min_v;
            let mut bin = BitReader::new(dec);
            bin.bic_decode_u16(&mut dst[2..len], min_v, 65535);
            dst[len] = 65535;
        }
        t => {
            return Err(SerialError::format(format!(
                "unexpected GAP block type {t}"
            )))
        }
    }

    if matches!(
        block_type,
        SET_BLOCK_ARRGAP_INV | SET_BLOCK_ARRGAP_EGAMMA_INV | SET_BLOCK_ARRGAP_BIENC_INV
    ) {
        block::gap_invert(dst);
    }
    Ok(())
}

/// Read an interpolative-coded position array, setting bits in `blk`
/// (dry read when `blk` is `None`).
pub(crate) fn read_bic_arr<E: Endian>(dec: &mut Decoder<'_, E>, blk: Option<&mut BitData>) {
    let min_v = dec.get_u16();
    let max_v = dec.get_u16();
    let arr_len = (dec.get_u16() as usize).saturating_sub(2);
    let mut bin = BitReader::new(dec);
    match blk {
        None => bin.bic_decode_u16_dry(arr_len, min_v, max_v),
        Some(blk) => {
            block::set_bit(blk, u32::from(min_v));
            block::set_bit(blk, u32::from(max_v));
            bin.bic_decode_u16_bitset(&mut blk[..], arr_len, min_v, max_v);
        }
    }
}

/// Read an inverted interpolative-coded array into `blk` (overwrites).
pub(crate) fn read_bic_arr_inv<E: Endian>(dec: &mut Decoder<'_, E>, blk: &mut BitData) {
    block::bit_block_set(blk, 0);
    read_bic_arr(dec, Some(blk));
    block::bit_block_invert(blk);
}

/// Read an interpolative-coded GAP sequence, OR-ing its runs into `blk`.
pub(crate) fn read_bic_gap<E: Endian>(
    dec: &mut Decoder<'_, E>,
    blk: Option<&mut BitData>,
    id_array: &mut [u16],
) {
    let head = u16::from(dec.get_u8());
    let arr_len = dec.get_u16() as usize;
    let min_v = dec.get_u16();

    id_array[0] = head;
    id_array[1] = min_v;
    id_array[arr_len] = 65535;
    let mut bin = BitReader::new(dec);
    bin.bic_decode_u16(&mut id_array[2..arr_len], min_v, 65535);

    if let Some(blk) = blk {
        block::gap_add_to_bitset(blk, id_array, arr_len);
    }
}

/// Read a digest-framed bit-block, OR-ing streamed waves into `blk`.
pub(crate) fn read_digest0_block<E: Endian>(
    dec: &mut Decoder<'_, E>,
    mut blk: Option<&mut BitData>,
) {
    let mut d0 = dec.get_u64();
    while d0 != 0 {
        let wave = d0.trailing_zeros() as usize;
        let off = wave * WAVE_WORDS;
        match blk.as_deref_mut() {
            None => dec.skip(WAVE_WORDS * 4),
            Some(b) => {
                for w in &mut b[off..off + WAVE_WORDS] {
                    *w |= dec.get_u32();
                }
            }
        }
        d0 &= d0 - 1;
    }
}

/// Read a 0-runs encoded bit-block into `blk` (overwrites).
pub(crate) fn read_0runs_block<E: Endian>(dec: &mut Decoder<'_, E>, blk: &mut BitData) {
    block::bit_block_set(blk, 0);
    let mut run_type = dec.get_u8() != 0;
    let mut j = 0usize;
    while j < block::BLOCK_WORDS {
        let run_length = dec.get_u16() as usize;
        if run_type {
            let run_end = j + run_length;
            while j < run_end {
                blk[j] = dec.get_u32();
                j += 1;
            }
        } else {
            j += run_length;
        }
        run_type = !run_type;
    }
}

// ---------------------------------------------------------------------------
// OR-merge deserializer

/// Bit-vector deserializer (OR-merges the stream into the target).
///
/// Holds its own scratch block and index arrays; reusable across calls but
/// not safe for concurrent use.
pub struct Deserializer {
    temp_block: Box<BitData>,
    gap_temp: Vec<u16>,
    id_array: Vec<u16>,
}

impl Default for Deserializer {
    fn default() -> Self {
        Self::new()
    }
}

impl Deserializer {
    /// Create a deserializer with fresh scratch buffers.
    pub fn new() -> Self {
        Deserializer {
            temp_block: block::alloc_bit_data(),
            gap_temp: vec![0u16; 65538],
            id_array: vec![0u16; 65538],
        }
    }

    /// Deserialize `buf` into `bv` (OR-merge), returning bytes consumed.
    ///
    /// Existing bits of `bv` are preserved; the decoded stream is unioned
    /// in.
    pub fn deserialize(&mut self, bv: &mut BitVector, buf: &[u8]) -> Result<usize> {
        let flags = buf[0];
        let bo = if flags & HM_NO_BO == 0 {
            buf[1]
        } else {
            BO_LITTLE_ENDIAN
        };
        match bo {
            BO_LITTLE_ENDIAN => self.deserialize_with::<LittleEndian>(bv, buf),
            BO_BIG_ENDIAN => self.deserialize_with::<BigEndian>(bv, buf),
            other => Err(SerialError::format(format!(
                "unknown byte-order marker {other}"
            ))),
        }
    }

    fn deserialize_with<E: Endian>(&mut self, bv: &mut BitVector, buf: &[u8]) -> Result<usize> {
        let mut dec = Decoder::<E>::new(buf);
        let header_flag = dec.get_u8();
        if header_flag & HM_NO_BO == 0 {
            dec.get_u8();
        }
        if header_flag & HM_64_BIT != 0 {
            return Err(SerialError::format(
                "64-bit address stream cannot be read in 32-bit mode",
            ));
        }

        if header_flag & HM_ID_LIST != 0 {
            // legacy framing: the body is a plain list of 32-bit ids
            if header_flag & HM_RESIZE != 0 {
                let bv_size = u64::from(dec.get_u32());
                if bv_size > bv.size() {
                    bv.resize(bv_size);
                }
            }
            let cnt = dec.get_u32();
            for _ in 0..cnt {
                let idx = dec.get_u32();
                bv.set(u64::from(idx));
            }
            return Ok(dec.pos());
        }

        if header_flag & HM_NO_GAPL == 0 {
            for _ in 0..GAP_LEVELS {
                dec.get_u16();
            }
        }
        if header_flag & HM_RESIZE != 0 {
            let bv_size = u64::from(dec.get_u32());
            if bv_size > bv.size() {
                bv.resize(bv_size);
            }
        }

        let mut i: u64 = 0;
        while i < TOTAL_BLOCKS {
            let btype = dec.get_u8();

            // short zero-run packed into the tag byte
            if btype & 0x80 != 0 {
                i += u64::from(btype & 0x7F);
                continue;
            }

            match btype {
                SET_BLOCK_AZERO | SET_BLOCK_END => break,
                SET_BLOCK_1ZERO => i += 1,
                SET_BLOCK_8ZERO => i += u64::from(dec.get_u8()),
                SET_BLOCK_16ZERO => i += u64::from(dec.get_u16()),
                SET_BLOCK_32ZERO => i += u64::from(dec.get_u32()),
                SET_BLOCK_AONE => {
                    bv.set_all_set(i, TOTAL_BLOCKS - 1);
                    // a one-run to the end is still followed by the end token
                    dec.get_u8();
                    break;
                }
                SET_BLOCK_1ONE => {
                    bv.set_block_all_set(i);
                    i += 1;
                }
                SET_BLOCK_8ONE => {
                    let nb = u64::from(dec.get_u8());
                    if nb > 0 {
                        bv.set_all_set(i, i + nb - 1);
                    }
                    i += nb;
                }
                SET_BLOCK_16ONE => {
                    let nb = u64::from(dec.get_u16());
                    if nb > 0 {
                        bv.set_all_set(i, i + nb - 1);
                    }
                    i += nb;
                }
                SET_BLOCK_32ONE => {
                    let nb = u64::from(dec.get_u32());
                    if nb > 0 {
                        bv.set_all_set(i, i + nb - 1);
                    }
                    i += nb;
                }
                SET_BLOCK_64ZERO | SET_BLOCK_64ONE => {
                    return Err(SerialError::format(
                        "64-bit block run in a 32-bit mode stream",
                    ));
                }
                SET_BLOCK_BIT => {
                    if bv.get_block(i).is_none() {
                        let blk = bv.make_bit_block(i);
                        dec.get_u32_into(&mut blk[..]);
                    } else {
                        dec.get_u32_into(&mut self.temp_block[..]);
                        bv.combine_operation_with_block(i, &self.temp_block, CombineOp::Or);
                    }
                    i += 1;
                }
                SET_BLOCK_BIT_1BIT => {
                    let bit_idx = dec.get_u16();
                    bv.set((i << 16) + u64::from(bit_idx));
                    i += 1;
                }
                SET_BLOCK_BIT_0RUNS => {
                    read_0runs_block(&mut dec, &mut self.temp_block);
                    bv.combine_operation_with_block(i, &self.temp_block, CombineOp::Or);
                    i += 1;
                }
                SET_BLOCK_BIT_INTERVAL => {
                    let head_idx = dec.get_u16() as usize;
                    let tail_idx = dec.get_u16() as usize;
                    block::bit_block_set(&mut self.temp_block, 0);
                    dec.get_u32_into(&mut self.temp_block[head_idx..=tail_idx]);
                    bv.combine_operation_with_block(i, &self.temp_block, CombineOp::Or);
                    i += 1;
                }
                SET_BLOCK_GAP
                | SET_BLOCK_ARRGAP
                | SET_BLOCK_GAP_EGAMMA
                | SET_BLOCK_ARRGAP_EGAMMA
                | SET_BLOCK_ARRGAP_EGAMMA_INV
                | SET_BLOCK_ARRGAP_INV
                | SET_BLOCK_GAP_BIENC
                | SET_BLOCK_ARRGAP_BIENC
                | SET_BLOCK_ARRGAP_BIENC_INV => {
                    self.deserialize_gap(btype, &mut dec, bv, i)?;
                    i += 1;
                }
                SET_BLOCK_ARRBIT => {
                    let len = dec.get_u16() as usize;
                    if matches!(bv.get_block(i), Some(Block::Full)) {
                        dec.skip(len * 2); // nothing to add
                    } else {
                        let blk = bv.deoptimize_block(i);
                        for _ in 0..len {
                            let bit_idx = dec.get_u16();
                            block::set_bit(blk, u32::from(bit_idx));
                        }
                    }
                    i += 1;
                }
                SET_BLOCK_ARRBIT_INV
                | SET_BLOCK_ARR_BIENC
                | SET_BLOCK_ARR_BIENC_INV
                | SET_BLOCK_BITGAP_BIENC
                | SET_BLOCK_BIT_DIGEST0 => {
                    self.decode_bit_block(btype, &mut dec, bv, i)?;
                    i += 1;
                }
                t => {
                    return Err(SerialError::format(format!("unknown block type {t}")));
                }
            }
        }
        Ok(dec.pos())
    }

    fn decode_bit_block<E: Endian>(
        &mut self,
        btype: u8,
        dec: &mut Decoder<'_, E>,
        bv: &mut BitVector,
        nb: u64,
    ) -> Result<()> {
        match btype {
            SET_BLOCK_ARRBIT_INV => {
                block::bit_block_set(&mut self.temp_block, !0);
                let len = dec.get_u16() as usize;
                for _ in 0..len {
                    let bit_idx = dec.get_u16();
                    block::clear_bit(&mut self.temp_block, u32::from(bit_idx));
                }
                bv.combine_operation_with_block(nb, &self.temp_block, CombineOp::Or);
            }
            SET_BLOCK_ARR_BIENC => {
                let blk = bv.deoptimize_block(nb);
                read_bic_arr(dec, Some(blk));
            }
            SET_BLOCK_ARR_BIENC_INV => {
                read_bic_arr_inv(dec, &mut self.temp_block);
                bv.combine_operation_with_block(nb, &self.temp_block, CombineOp::Or);
            }
            SET_BLOCK_BITGAP_BIENC => {
                let blk = bv.deoptimize_block(nb);
                read_bic_gap(dec, Some(blk), &mut self.id_array);
            }
            SET_BLOCK_BIT_DIGEST0 => {
                let blk = bv.deoptimize_block(nb);
                read_digest0_block(dec, Some(blk));
            }
            t => {
                return Err(SerialError::format(format!(
                    "unexpected bit block type {t}"
                )))
            }
        }
        Ok(())
    }

    fn deserialize_gap<E: Endian>(
        &mut self,
        btype: u8,
        dec: &mut Decoder<'_, E>,
        bv: &mut BitVector,
        nb: u64,
    ) -> Result<()> {
        match btype {
            SET_BLOCK_GAP => {
                let gap_head = dec.get_u16();
                let len = (gap_head >> 3) as usize + 1;
                self.gap_temp[0] = gap_head;
                dec.get_u16_into(&mut self.gap_temp[1..len - 1]);
                self.gap_temp[len - 1] = 65535;
            }
            SET_BLOCK_ARRGAP | SET_BLOCK_ARRGAP_EGAMMA | SET_BLOCK_ARRGAP_BIENC => {
                let arr_len = read_id_list(dec, btype, &mut self.id_array)?;
                self.gap_temp[0] = 0;
                block::gap_set_array(&mut self.gap_temp, &self.id_array[..arr_len]);
            }
            SET_BLOCK_GAP_EGAMMA | SET_BLOCK_GAP_BIENC => {
                let gap_head = dec.get_u16();
                read_gap_block(dec, btype, &mut self.gap_temp, gap_head, &mut self.id_array)?;
            }
            SET_BLOCK_ARRGAP_EGAMMA_INV | SET_BLOCK_ARRGAP_INV | SET_BLOCK_ARRGAP_BIENC_INV => {
                read_gap_block(dec, btype, &mut self.gap_temp, 0, &mut self.id_array)?;
            }
            t => {
                return Err(SerialError::format(format!(
                    "unexpected GAP block type {t}"
                )))
            }
        }
        self.store_or_merge_gap(bv, nb);
        Ok(())
    }

    // Store the decoded GAP directly when it fits a level and the slot is
    // empty, otherwise materialize and OR-merge.
    fn store_or_merge_gap(&mut self, bv: &mut BitVector, nb: u64) {
        let gl = block::gap_length(&self.gap_temp);
        match block::gap_calc_level(gl, bv.glen()) {
            Some(level) if bv.get_block(nb).is_none() => {
                bv.set_gap_block(nb, &self.gap_temp[..gl], level);
            }
            _ => {
                block::gap_convert_to_bitset(&mut self.temp_block, &self.gap_temp[..gl]);
                bv.combine_operation_with_block(nb, &self.temp_block, CombineOp::Or);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serializer::Serializer;

    fn roundtrip_at(bv: &BitVector, level: u8) -> BitVector {
        let mut ser = Serializer::new();
        ser.set_compression_level(level);
        let buf = ser.serialize_to_vec(bv);
        let mut out = BitVector::new();
        let consumed = Deserializer::new().deserialize(&mut out, &buf).unwrap();
        assert_eq!(consumed, buf.len());
        out
    }

    #[test]
    fn test_roundtrip_shapes_all_levels() {
        let shapes: Vec<BitVector> = vec![
            BitVector::new(),
            BitVector::from_indices([0u64].into_iter()),
            BitVector::from_indices([1_000_000u64].into_iter()),
            BitVector::from_indices((0..65536u64).collect::<Vec<_>>().into_iter()),
            BitVector::from_indices((0..200_000u64).step_by(3).collect::<Vec<_>>().into_iter()),
            BitVector::from_indices(
                [5u64, 100, 70_000, 70_001, 1 << 24, (1 << 32) - 1]
                    .into_iter(),
            ),
        ];
        for bv in &shapes {
            for level in 0..=5 {
                let out = roundtrip_at(bv, level);
                assert_eq!(&out, bv, "level {level}");
            }
        }
    }

    #[test]
    fn test_roundtrip_optimized_gap_blocks() {
        let mut bv = BitVector::new();
        for i in (0..3000u64).step_by(7) {
            bv.set(i);
        }
        for i in 200_000..200_050u64 {
            bv.set(i);
        }
        bv.optimize();
        for level in 0..=5 {
            assert_eq!(roundtrip_at(&bv, level), bv, "level {level}");
        }
    }

    #[test]
    fn test_additive_merge() {
        let a = BitVector::from_indices([1u64, 2, 100_000].into_iter());
        let b = BitVector::from_indices([2u64, 3, 900_000].into_iter());
        let buf = Serializer::new().serialize_to_vec(&a);
        let mut target = b.clone();
        Deserializer::new().deserialize(&mut target, &buf).unwrap();
        let expected = BitVector::from_indices([1u64, 2, 3, 100_000, 900_000].into_iter());
        assert_eq!(target, expected);
    }

    #[test]
    fn test_resize_header_grows_target() {
        let mut a = BitVector::with_size(1 << 20);
        a.set(12345);
        let buf = Serializer::new().serialize_to_vec(&a);
        let mut out = BitVector::with_size(16);
        Deserializer::new().deserialize(&mut out, &buf).unwrap();
        assert_eq!(out.size(), 1 << 20);
        assert!(out.test(12345));
    }

    #[test]
    fn test_id_list_legacy_body() {
        // hand-built legacy stream: flags(ID_LIST|NO_GAPL), bo, count, ids
        let mut buf = vec![0u8; 64];
        {
            let mut enc = crate::bytes::Encoder::<LittleEndian>::new(&mut buf);
            enc.put_u8(HM_ID_LIST | HM_NO_GAPL);
            enc.put_u8(BO_LITTLE_ENDIAN);
            enc.put_u32(3);
            enc.put_u32(7);
            enc.put_u32(65536);
            enc.put_u32(1_000_000);
        }
        let mut out = BitVector::new();
        Deserializer::new().deserialize(&mut out, &buf).unwrap();
        assert_eq!(out.to_indices(), vec![7, 65536, 1_000_000]);
    }

    #[test]
    fn test_unknown_tag_rejected() {
        let mut buf = vec![0u8; 8];
        buf[0] = HM_DEFAULT | HM_NO_BO | HM_NO_GAPL;
        buf[1] = 60; // above the defined tag range, high bit clear
        let mut out = BitVector::new();
        let err = Deserializer::new().deserialize(&mut out, &buf).unwrap_err();
        assert!(matches!(err, SerialError::SerialFormat(_)));
    }

    #[test]
    fn test_reserved_tags_rejected() {
        for tag in [SET_BLOCK_SGAPBIT, SET_BLOCK_SGAPGAP, SET_BLOCK_GAPBIT] {
            let mut buf = vec![0u8; 8];
            buf[0] = HM_DEFAULT | HM_NO_BO | HM_NO_GAPL;
            buf[1] = tag;
            let mut out = BitVector::new();
            let err = Deserializer::new().deserialize(&mut out, &buf).unwrap_err();
            assert!(matches!(err, SerialError::SerialFormat(_)), "tag {tag}");
        }
    }

    #[test]
    fn test_64bit_stream_rejected() {
        let mut buf = vec![0u8; 8];
        buf[0] = HM_DEFAULT | HM_NO_BO | HM_NO_GAPL | HM_64_BIT;
        let mut out = BitVector::new();
        let err = Deserializer::new().deserialize(&mut out, &buf).unwrap_err();
        assert!(matches!(err, SerialError::SerialFormat(_)));
    }

    #[test]
    fn test_one_run_to_last_block_consumes_end() {
        // a full tail through block 65535 serializes as a one-run-to-end
        // token plus the end byte; bytes consumed must cover both
        let mut bv = BitVector::new();
        for i in (65530u64 << 16)..(1u64 << 32) {
            bv.set(i);
        }
        bv.optimize();
        let buf = Serializer::new().serialize_to_vec(&bv);
        let mut out = BitVector::new();
        let consumed = Deserializer::new().deserialize(&mut out, &buf).unwrap();
        assert_eq!(consumed, buf.len());
        assert_eq!(out.count(), 6 * 65536);
        assert_eq!(out, bv);
    }

    #[test]
    fn test_high_bit_shortcut_skips_blocks() {
        let mut bv = BitVector::new();
        bv.set(3 << 16); // block 3, bit 0
        let buf = Serializer::new().serialize_to_vec(&bv);
        assert_eq!(buf[2], 0x80 | 3);
        let mut out = BitVector::new();
        Deserializer::new().deserialize(&mut out, &buf).unwrap();
        assert_eq!(out.to_indices(), vec![3 << 16]);
    }
}
