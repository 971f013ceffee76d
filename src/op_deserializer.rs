//! Set algebra between a bit-vector and a serialized stream.
//!
//! `OperationDeserializer` walks a serialized stream block-by-block through
//! the stream iterator and applies the selected operation against the
//! target vector's block at the same index, without first materializing the
//! whole stream. Run tokens are handled wholesale (an all-zero run under
//! AND clears the covered target range without decoding anything); bit and
//! GAP blocks dispatch to the iterator's fused accessors.
//!
//! Counting operations never modify the target. `exit_on_one` turns any
//! operation into an existence probe: iteration stops at the first block
//! that contributes to the count, and the returned value may be partial.

use crate::bitvec::{BitVector, Block, ID_MAX};
use crate::block::{self, BitData, GAP_MAX_BITS};
use crate::bytes::{BigEndian, Endian, LittleEndian};
use crate::error::{Result, SerialError};
use crate::ops::SetOp;
use crate::stream::{IterState, SerialStreamIterator};
use crate::tags::{BO_BIG_ENDIAN, BO_LITTLE_ENDIAN, HM_NO_BO};

/// Operation-applying deserializer.
///
/// All entry points are stateless; scratch blocks are either supplied by
/// the caller (`temp`) or allocated per call.
pub struct OperationDeserializer;

impl OperationDeserializer {
    /// Apply `op` between `bv` and the serialized vector in `buf`.
    ///
    /// Returns the operation count (population for counting operations,
    /// an unspecified non-zero value on early exit). `Assign` clears the
    /// target first and then behaves as `Or`.
    pub fn deserialize(
        bv: &mut BitVector,
        buf: &[u8],
        temp: Option<&mut BitData>,
        op: SetOp,
        exit_on_one: bool,
    ) -> Result<u64> {
        let mut op = op;
        if op == SetOp::Assign {
            bv.clear();
            op = SetOp::Or;
        }
        let mut own_temp;
        let temp = match temp {
            Some(t) => t,
            None => {
                own_temp = block::alloc_bit_data();
                &mut *own_temp
            }
        };
        match stream_byte_order(buf)? {
            BO_LITTLE_ENDIAN => run::<LittleEndian>(bv, buf, temp, op, exit_on_one, None),
            _ => run::<BigEndian>(bv, buf, temp, op, exit_on_one, None),
        }
    }

    /// Intersect `bv` with the serialized vector restricted to bits
    /// `from..=to`.
    ///
    /// The target is first limited to the range, then AND-combined with the
    /// stream; iteration stops once the stream passes the range.
    pub fn deserialize_range(
        bv: &mut BitVector,
        buf: &[u8],
        temp: Option<&mut BitData>,
        from: u64,
        to: u64,
    ) -> Result<()> {
        debug_assert!(from <= to);
        bv.keep_range(from, to);
        let mut own_temp;
        let temp = match temp {
            Some(t) => t,
            None => {
                own_temp = block::alloc_bit_data();
                &mut *own_temp
            }
        };
        let range = Some((from, to));
        match stream_byte_order(buf)? {
            BO_LITTLE_ENDIAN => {
                run::<LittleEndian>(bv, buf, temp, SetOp::And, false, range)?;
            }
            _ => {
                run::<BigEndian>(bv, buf, temp, SetOp::And, false, range)?;
            }
        }
        Ok(())
    }
}

fn stream_byte_order(buf: &[u8]) -> Result<u8> {
    let flags = buf[0];
    let bo = if flags & HM_NO_BO == 0 {
        buf[1]
    } else {
        BO_LITTLE_ENDIAN
    };
    match bo {
        BO_LITTLE_ENDIAN | BO_BIG_ENDIAN => Ok(bo),
        other => Err(SerialError::format(format!(
            "unknown byte-order marker {other}"
        ))),
    }
}

fn run<E: Endian>(
    bv: &mut BitVector,
    buf: &[u8],
    temp: &mut BitData,
    op: SetOp,
    exit_on_one: bool,
    range: Option<(u64, u64)>,
) -> Result<u64> {
    let mut sit = SerialStreamIterator::<E>::new(buf)?;
    let mut it_d = IteratorDeserializer::default();
    if let Some((_, to)) = range {
        it_d.set_range_to(to);
    }
    it_d.deserialize(bv, &mut sit, temp, op, exit_on_one)
}

/// Walks the stream iterator and recombines with the target per block.
#[derive(Default)]
struct IteratorDeserializer {
    is_range_set: bool,
    nb_range_to: u64,
}

impl IteratorDeserializer {
    fn set_range_to(&mut self, to: u64) {
        self.is_range_set = true;
        self.nb_range_to = to >> crate::bitvec::BLOCK_SHIFT;
    }

    fn deserialize<E: Endian>(
        &mut self,
        bv: &mut BitVector,
        sit: &mut SerialStreamIterator<'_, E>,
        temp: &mut BitData,
        op: SetOp,
        exit_on_one: bool,
    ) -> Result<u64> {
        debug_assert!(op != SetOp::Assign);
        let mut count: u64 = 0;
        let mut gap_temp = vec![0u16; 65538];
        let mut gap_scratch = block::alloc_bit_data();

        if sit.bv_size() > 0 && sit.bv_size() > bv.size() {
            bv.resize(sit.bv_size());
        }

        if sit.state() == IterState::ListIds {
            return process_id_list(bv, sit, op);
        }

        let mut bv_block_idx: u64 = 0;
        loop {
            let mut sop = op;
            if sit.is_eof() {
                count += finalize_target_vector(bv, op, bv_block_idx);
                return Ok(count);
            }

            match sit.state() {
                IterState::Blocks => {
                    sit.next()?;
                    continue;
                }

                IterState::BitBlock => {
                    debug_assert_eq!(sit.block_idx(), bv_block_idx);
                    if bv.get_block(bv_block_idx).is_none() {
                        match op {
                            SetOp::And
                            | SetOp::Sub
                            | SetOp::CountAnd
                            | SetOp::CountSubAb
                            | SetOp::CountA => {
                                // one side is empty: the result is empty,
                                // only the stream needs to advance
                                sop = SetOp::Assign;
                            }
                            SetOp::Or | SetOp::Xor | SetOp::Assign => {
                                bv.make_bit_block(bv_block_idx);
                            }
                            SetOp::Count
                            | SetOp::CountXor
                            | SetOp::CountOr
                            | SetOp::CountSubBa
                            | SetOp::CountB => sop = SetOp::Count,
                        }
                    } else if !matches!(bv.get_block(bv_block_idx), Some(Block::Bit(_))) {
                        bv.deoptimize_block(bv_block_idx);
                    }

                    let dst = bv.get_bit_data_mut(bv_block_idx);
                    let c = sit.get_bit_block(dst, temp, sop)?;
                    count += u64::from(c);
                    if exit_on_one && count > 0 {
                        return Ok(count);
                    }
                    match op {
                        SetOp::And | SetOp::Sub | SetOp::Xor | SetOp::Or => {
                            bv.optimize_bit_block(bv_block_idx)
                        }
                        _ => {}
                    }
                }

                IterState::ZeroBlocks => {
                    debug_assert_eq!(bv_block_idx, sit.block_idx());
                    match op {
                        SetOp::Assign
                        | SetOp::Sub
                        | SetOp::CountAnd
                        | SetOp::Or
                        | SetOp::Xor
                        | SetOp::CountSubBa
                        | SetOp::Count
                        | SetOp::CountB => {
                            // a zero stream run contributes nothing to the
                            // stream cardinality
                            bv_block_idx = sit.skip_mono_blocks();
                            continue;
                        }
                        SetOp::And => {
                            let nb_start = bv_block_idx;
                            bv_block_idx = sit.skip_mono_blocks();
                            bv.set_all_zero(nb_start, bv_block_idx - 1);
                            continue;
                        }
                        _ => {}
                    }
                    // counting against a zero stream block: the target block
                    // passes through unchanged
                    let blk_count = bv.block_bitcount(bv_block_idx);
                    sit.next()?;
                    count += blk_count;
                    if exit_on_one && count > 0 {
                        return Ok(count);
                    }
                }

                IterState::OneBlocks => {
                    debug_assert_eq!(bv_block_idx, sit.block_idx());
                    let have = bv.get_block(bv_block_idx).is_some();
                    let blk_count = bv.block_bitcount(bv_block_idx);
                    sit.next()?;
                    match op {
                        SetOp::Or | SetOp::Assign => bv.set_block_all_set(bv_block_idx),
                        SetOp::CountOr | SetOp::CountB | SetOp::Count => {
                            count += u64::from(GAP_MAX_BITS);
                        }
                        SetOp::Sub => bv.zero_block(bv_block_idx),
                        SetOp::CountSubAb | SetOp::And => {}
                        SetOp::CountAnd | SetOp::CountA => count += blk_count,
                        SetOp::Xor => {
                            if have {
                                let blk = bv.deoptimize_block(bv_block_idx);
                                block::bit_block_invert(blk);
                            } else {
                                bv.set_block_all_set(bv_block_idx);
                            }
                        }
                        SetOp::CountXor | SetOp::CountSubBa => {
                            count += u64::from(GAP_MAX_BITS) - blk_count;
                        }
                    }
                    if exit_on_one && count > 0 {
                        return Ok(count);
                    }
                }

                IterState::GapBlock => {
                    debug_assert_eq!(bv_block_idx, sit.block_idx());
                    sit.get_gap_block(&mut gap_temp)?;
                    let gl = block::gap_length(&gap_temp);

                    if op.is_const() {
                        count += combine_count_gap(
                            bv,
                            bv_block_idx,
                            &gap_temp[..gl],
                            op,
                            temp,
                            &mut gap_scratch,
                        );
                        if exit_on_one && count > 0 {
                            return Ok(count);
                        }
                    } else {
                        let have = bv.get_block(bv_block_idx).is_some();
                        if !have {
                            match sop {
                                SetOp::And | SetOp::Sub => {}
                                SetOp::Or | SetOp::Xor => {
                                    match block::gap_calc_level(gl, bv.glen()) {
                                        Some(level) => {
                                            bv.set_gap_block(
                                                bv_block_idx,
                                                &gap_temp[..gl],
                                                level,
                                            );
                                        }
                                        None => {
                                            // too long for any GAP level
                                            block::gap_convert_to_bitset(
                                                temp,
                                                &gap_temp[..gl],
                                            );
                                            let blk = bv.make_bit_block(bv_block_idx);
                                            blk.copy_from_slice(&temp[..]);
                                        }
                                    }
                                }
                                _ => {
                                    return Err(SerialError::format(
                                        "invalid operation on GAP block",
                                    ))
                                }
                            }
                        } else {
                            block::gap_convert_to_bitset(temp, &gap_temp[..gl]);
                            match sop.combine_op() {
                                Some(cop) => {
                                    bv.combine_operation_with_block(bv_block_idx, temp, cop)
                                }
                                None => {
                                    return Err(SerialError::format(
                                        "invalid operation on GAP block",
                                    ))
                                }
                            }
                        }
                        if exit_on_one && bv.block_bitcount(bv_block_idx) > 0 {
                            return Ok(1);
                        }
                    }
                }

                IterState::ListIds | IterState::Unknown => {
                    return Err(SerialError::format("invalid stream iterator state"));
                }
            }

            bv_block_idx += 1;
            if self.is_range_set && bv_block_idx > self.nb_range_to {
                break;
            }
        }
        Ok(count)
    }
}

// Counting operation between the target block and a decoded GAP block.
fn combine_count_gap(
    bv: &BitVector,
    nb: u64,
    gap: &[u16],
    op: SetOp,
    temp: &mut BitData,
    scratch: &mut BitData,
) -> u64 {
    block::gap_convert_to_bitset(temp, gap);
    let b = u64::from(block::bit_block_count(temp));
    let (t, and) = match bv.get_block(nb) {
        None => (0, 0),
        Some(Block::Bit(blk)) => (
            u64::from(block::bit_block_count(blk)),
            u64::from(block::bit_block_and_count(blk, temp)),
        ),
        Some(Block::Full) => (u64::from(GAP_MAX_BITS), b),
        Some(Block::Gap(g)) => {
            block::gap_convert_to_bitset(scratch, g);
            (
                u64::from(block::bit_block_count(scratch)),
                u64::from(block::bit_block_and_count(scratch, temp)),
            )
        }
    };
    match op {
        SetOp::Count | SetOp::CountB => b,
        SetOp::CountA => t,
        SetOp::CountAnd => and,
        SetOp::CountOr => t + b - and,
        SetOp::CountXor => t + b - 2 * and,
        SetOp::CountSubAb => t - and,
        SetOp::CountSubBa => b - and,
        _ => 0,
    }
}

// Zero the target tail or count its remaining bits once the stream ends
// before the block space does.
fn finalize_target_vector(bv: &mut BitVector, op: SetOp, bv_block_idx: u64) -> u64 {
    match op {
        SetOp::Or
        | SetOp::Sub
        | SetOp::Xor
        | SetOp::Count
        | SetOp::CountB
        | SetOp::CountAnd
        | SetOp::CountSubBa => 0,
        SetOp::Assign | SetOp::And => {
            let nblock_last = ID_MAX >> crate::bitvec::BLOCK_SHIFT;
            if bv_block_idx <= nblock_last {
                bv.set_all_zero(bv_block_idx, nblock_last);
            }
            0
        }
        SetOp::CountA | SetOp::CountOr | SetOp::CountXor | SetOp::CountSubAb => {
            bv.count_from_block(bv_block_idx)
        }
    }
}

// Legacy id-list body: every operation works off the plain id sequence.
fn process_id_list<E: Endian>(
    bv: &mut BitVector,
    sit: &mut SerialStreamIterator<'_, E>,
    op: SetOp,
) -> Result<u64> {
    // the constructor consumed the first id already
    let remaining = u64::from(sit.id_count());
    let total = remaining + 1;
    let mut count = 0u64;
    match op {
        SetOp::And => {
            let mut bv_tmp = BitVector::new();
            load_id_list(&mut bv_tmp, sit, total, true)?;
            intersect_with(bv, &bv_tmp);
        }
        SetOp::Or | SetOp::Assign => load_id_list(bv, sit, total, true)?,
        SetOp::Sub => load_id_list(bv, sit, total, false)?,
        SetOp::Xor => {
            for _ in 0..total {
                let id = u64::from(sit.id());
                if bv.test(id) {
                    bv.clear_bit(id);
                } else {
                    bv.set(id);
                }
                sit.next()?;
            }
        }
        SetOp::Count | SetOp::CountB => {
            for _ in 0..total {
                count += 1;
                sit.next()?;
            }
        }
        SetOp::CountA => return Ok(bv.count()),
        SetOp::CountAnd => {
            for _ in 0..total {
                count += u64::from(bv.test(u64::from(sit.id())));
                sit.next()?;
            }
        }
        SetOp::CountOr | SetOp::CountXor | SetOp::CountSubAb | SetOp::CountSubBa => {
            let mut bv_tmp = BitVector::new();
            load_id_list(&mut bv_tmp, sit, total, true)?;
            let a = bv.count();
            let b = bv_tmp.count();
            let and = bv.and_count_with(&bv_tmp);
            count = match op {
                SetOp::CountOr => a + b - and,
                SetOp::CountXor => a + b - 2 * and,
                SetOp::CountSubAb => a - and,
                SetOp::CountSubBa => b - and,
                _ => 0,
            };
        }
    }
    Ok(count)
}

fn load_id_list<E: Endian>(
    bv: &mut BitVector,
    sit: &mut SerialStreamIterator<'_, E>,
    total: u64,
    set_clear: bool,
) -> Result<()> {
    for _ in 0..total {
        let id = u64::from(sit.id());
        if set_clear {
            bv.set(id);
        } else {
            bv.clear_bit(id);
        }
        sit.next()?;
    }
    Ok(())
}

fn intersect_with(bv: &mut BitVector, other: &BitVector) {
    let mut scratch = block::alloc_bit_data();
    for nb in bv.block_keys() {
        match other.get_block(nb) {
            None => bv.zero_block(nb),
            Some(oblk) => {
                oblk.materialize(&mut scratch);
                bv.combine_operation_with_block(nb, &scratch, crate::ops::CombineOp::And);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serializer::Serializer;

    fn ser(bv: &BitVector) -> Vec<u8> {
        Serializer::new().serialize_to_vec(bv)
    }

    #[test]
    fn test_and_against_stream() {
        let mut a = BitVector::from_indices([0u64, 5, 10].into_iter());
        let b = BitVector::from_indices([5u64, 10, 99].into_iter());
        let buf = ser(&b);
        OperationDeserializer::deserialize(&mut a, &buf, None, SetOp::And, false).unwrap();
        assert_eq!(a.to_indices(), vec![5, 10]);
    }

    #[test]
    fn test_count_and_against_stream() {
        let mut a = BitVector::from_indices([0u64, 5, 10].into_iter());
        let b = BitVector::from_indices([5u64, 10, 99].into_iter());
        let buf = ser(&b);
        let count =
            OperationDeserializer::deserialize(&mut a, &buf, None, SetOp::CountAnd, false)
                .unwrap();
        assert_eq!(count, 2);
        // counting must not modify the target
        assert_eq!(a.to_indices(), vec![0, 5, 10]);
    }

    #[test]
    fn test_assign_replaces_target() {
        let mut a = BitVector::from_indices([1u64, 2, 3].into_iter());
        let b = BitVector::from_indices([70_000u64].into_iter());
        let buf = ser(&b);
        OperationDeserializer::deserialize(&mut a, &buf, None, SetOp::Assign, false).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_range_restriction() {
        let mut a = BitVector::from_indices([10u64, 100, 70_000, 200_000].into_iter());
        let b = BitVector::from_indices([10u64, 100, 70_000, 300_000].into_iter());
        let buf = ser(&b);
        OperationDeserializer::deserialize_range(&mut a, &buf, None, 50, 80_000).unwrap();
        assert_eq!(a.to_indices(), vec![100, 70_000]);
    }

    #[test]
    fn test_early_exit_is_nonzero_iff_nonempty() {
        let mut a = BitVector::from_indices([1u64, 1 << 20].into_iter());
        let b = BitVector::from_indices([1u64 << 20].into_iter());
        let buf = ser(&b);
        let count = OperationDeserializer::deserialize(
            &mut a.clone(),
            &buf,
            None,
            SetOp::CountAnd,
            true,
        )
        .unwrap();
        assert!(count > 0);

        let disjoint = BitVector::from_indices([2u64].into_iter());
        let buf = ser(&disjoint);
        let count =
            OperationDeserializer::deserialize(&mut a, &buf, None, SetOp::CountAnd, true)
                .unwrap();
        assert_eq!(count, 0);
    }
}
