//! Set-operation equivalence against serialized streams.
//!
//! Every operation the engine supports is checked bit-exact against a
//! reference computed on plain index sets, over fixtures that exercise the
//! different block encodings (run tokens, GAP forms, interpolative arrays,
//! digest blocks). Also covers range restriction, early exit, byte-order
//! dispatch, legacy id-list bodies and the decode-only interval encoding.

use std::collections::BTreeSet;

use bvser::tags;
use bvser::{BitVector, OperationDeserializer, Serializer, SetOp};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn ref_indices(bv: &BitVector) -> BTreeSet<u64> {
    bv.to_indices().into_iter().collect()
}

fn ref_op(a: &BTreeSet<u64>, b: &BTreeSet<u64>, op: SetOp) -> BTreeSet<u64> {
    match op {
        SetOp::And => a.intersection(b).copied().collect(),
        SetOp::Or => a.union(b).copied().collect(),
        SetOp::Xor => a.symmetric_difference(b).copied().collect(),
        SetOp::Sub => a.difference(b).copied().collect(),
        _ => unreachable!("not a materializing operation"),
    }
}

fn ref_count(a: &BTreeSet<u64>, b: &BTreeSet<u64>, op: SetOp) -> u64 {
    let and = a.intersection(b).count() as u64;
    let (na, nb) = (a.len() as u64, b.len() as u64);
    match op {
        SetOp::CountAnd => and,
        SetOp::CountOr => na + nb - and,
        SetOp::CountXor => na + nb - 2 * and,
        SetOp::CountSubAb => na - and,
        SetOp::CountSubBa => nb - and,
        SetOp::CountA => na,
        SetOp::Count | SetOp::CountB => nb,
        _ => unreachable!("not a counting operation"),
    }
}

fn random_vector(rng: &mut StdRng, blocks: u64, density_permille: u32) -> BitVector {
    let mut bv = BitVector::new();
    for nb in 0..blocks {
        // vary density per block so different encodings get picked
        let d = match nb % 4 {
            0 => density_permille / 10,
            1 => density_permille,
            2 => density_permille * 5,
            _ => 0,
        };
        if d == 0 {
            continue;
        }
        for bit in 0..65536u64 {
            if rng.gen_range(0..1000) < d {
                bv.set((nb << 16) + bit);
            }
        }
    }
    bv
}

fn fixture_pair(seed: u64) -> (BitVector, BitVector) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut a = random_vector(&mut rng, 6, 40);
    let mut b = random_vector(&mut rng, 6, 40);
    // add full blocks and far bits to bring run tokens into play
    for i in (4u64 << 16)..(5 << 16) {
        b.set(i);
        a.set(i);
    }
    for i in (200u64 << 16)..(200 << 16) + 300 {
        a.set(i);
    }
    b.set(1 << 30);
    a.optimize();
    (a, b)
}

#[test]
fn materializing_ops_match_reference() {
    let (a, b) = fixture_pair(7);
    let buf = Serializer::new().serialize_to_vec(&b);
    let (sa, sb) = (ref_indices(&a), ref_indices(&b));

    for op in [SetOp::And, SetOp::Or, SetOp::Xor, SetOp::Sub] {
        let mut target = a.clone();
        OperationDeserializer::deserialize(&mut target, &buf, None, op, false).unwrap();
        let expected = ref_op(&sa, &sb, op);
        assert_eq!(
            ref_indices(&target),
            expected,
            "operation {op:?} diverged from reference"
        );
    }
}

#[test]
fn counting_ops_match_reference() {
    let (a, b) = fixture_pair(11);
    let buf = Serializer::new().serialize_to_vec(&b);
    let (sa, sb) = (ref_indices(&a), ref_indices(&b));

    for op in [
        SetOp::Count,
        SetOp::CountAnd,
        SetOp::CountOr,
        SetOp::CountXor,
        SetOp::CountSubAb,
        SetOp::CountSubBa,
        SetOp::CountA,
        SetOp::CountB,
    ] {
        let mut target = a.clone();
        let count =
            OperationDeserializer::deserialize(&mut target, &buf, None, op, false).unwrap();
        assert_eq!(count, ref_count(&sa, &sb, op), "count {op:?}");
        assert_eq!(target, a, "counting op {op:?} modified the target");
    }
}

#[test]
fn count_ignores_target_bits_under_stream_zero_runs() {
    // bare Count must agree with its CountB alias even when the target has
    // bits inside the stream's zero runs
    let a = BitVector::from_indices([(50u64 << 16) + 9, (51 << 16) + 10].into_iter());
    let b = BitVector::from_indices([1u64, 2, 3, (90u64 << 16) + 4].into_iter());
    let buf = Serializer::new().serialize_to_vec(&b);

    let count =
        OperationDeserializer::deserialize(&mut a.clone(), &buf, None, SetOp::Count, false)
            .unwrap();
    let count_b =
        OperationDeserializer::deserialize(&mut a.clone(), &buf, None, SetOp::CountB, false)
            .unwrap();
    assert_eq!(count, b.count());
    assert_eq!(count, count_b);
}

#[test]
fn assign_equals_stream_content() {
    let (a, b) = fixture_pair(13);
    let buf = Serializer::new().serialize_to_vec(&b);
    let mut target = a;
    OperationDeserializer::deserialize(&mut target, &buf, None, SetOp::Assign, false).unwrap();
    assert_eq!(target, b);
}

#[test]
fn ops_against_destructively_serialized_stream() {
    let (a, b) = fixture_pair(17);
    let mut b_src = b.clone();
    let buf = Serializer::new().optimize_serialize_destroy(&mut b_src);
    assert!(b_src.is_empty());

    let mut target = a.clone();
    OperationDeserializer::deserialize(&mut target, &buf, None, SetOp::Or, false).unwrap();
    let expected = ref_op(&ref_indices(&a), &ref_indices(&b), SetOp::Or);
    assert_eq!(ref_indices(&target), expected);
}

#[test]
fn range_restriction_matches_masked_and() {
    let (a, b) = fixture_pair(23);
    let buf = Serializer::new().serialize_to_vec(&b);
    let (sa, sb) = (ref_indices(&a), ref_indices(&b));

    // range boundaries inside blocks on both ends
    let (from, to) = (70_000u64, (3 << 16) + 12_345);
    let mut target = a.clone();
    OperationDeserializer::deserialize_range(&mut target, &buf, None, from, to).unwrap();

    let expected: BTreeSet<u64> = sa
        .intersection(&sb)
        .copied()
        .filter(|&i| i >= from && i <= to)
        .collect();
    assert_eq!(ref_indices(&target), expected);
}

#[test]
fn early_exit_detects_intersection() {
    let a = BitVector::from_indices([(7u64 << 16) + 3].into_iter());
    let b = BitVector::from_indices([(7u64 << 16) + 3, 1 << 28].into_iter());
    let buf = Serializer::new().serialize_to_vec(&b);

    let count = OperationDeserializer::deserialize(
        &mut a.clone(),
        &buf,
        None,
        SetOp::CountAnd,
        true,
    )
    .unwrap();
    assert!(count > 0, "intersecting vectors must early-exit non-zero");

    let disjoint = BitVector::from_indices([5u64].into_iter());
    let count = OperationDeserializer::deserialize(
        &mut disjoint.clone(),
        &buf,
        None,
        SetOp::CountAnd,
        true,
    )
    .unwrap();
    assert_eq!(count, 0, "disjoint vectors must report empty");
}

#[test]
fn big_endian_stream_decodes() {
    // hand-built big-endian stream: flags, bo=0, then a 1-bit block and a
    // 16-bit one-run, ending with azero
    let mut raw = vec![0u8; 64];
    let len;
    {
        let mut enc = bvser::bytes::Encoder::<bvser::bytes::BigEndian>::new(&mut raw);
        enc.put_u8(tags::HM_DEFAULT | tags::HM_NO_GAPL);
        enc.put_u8(tags::BO_BIG_ENDIAN);
        enc.put_u8(tags::SET_BLOCK_BIT_1BIT);
        enc.put_u16(300);
        enc.put_u8(tags::SET_BLOCK_16ONE);
        enc.put_u16(2);
        enc.put_u8(tags::SET_BLOCK_AZERO);
        len = enc.size();
    }
    raw.truncate(len);

    let mut out = BitVector::new();
    bvser::deserialize(&mut out, &raw).unwrap();
    assert!(out.test(300));
    assert_eq!(out.count(), 1 + 2 * 65536);

    // the operation engine dispatches on the same byte-order marker
    let mut target = BitVector::from_indices([300u64, (1u64 << 16) + 5, 999].into_iter());
    let count =
        OperationDeserializer::deserialize(&mut target, &raw, None, SetOp::CountAnd, false)
            .unwrap();
    assert_eq!(count, 2); // bit 300 and the bit inside the one-run
}

#[test]
fn interval_encoding_decodes() {
    // the interval form (tag 17) is decode-only: head word, tail word, then
    // the raw words of [head..=tail]
    let mut raw = vec![0u8; 64];
    let len;
    {
        let mut enc = bvser::bytes::Encoder::<bvser::bytes::LittleEndian>::new(&mut raw);
        enc.put_u8(tags::HM_DEFAULT | tags::HM_NO_BO | tags::HM_NO_GAPL);
        enc.put_u8(tags::SET_BLOCK_BIT_INTERVAL);
        enc.put_u16(2); // head word
        enc.put_u16(3); // tail word
        enc.put_u32(0xFFFF_0000);
        enc.put_u32(0x0000_00FF);
        enc.put_u8(tags::SET_BLOCK_AZERO);
        len = enc.size();
    }
    raw.truncate(len);

    let mut out = BitVector::new();
    bvser::deserialize(&mut out, &raw).unwrap();
    assert_eq!(out.count(), 24);
    assert!(out.test(64 + 16) && out.test(96));

    // fused AND against the interval form
    let mut target = BitVector::from_indices([80u64, 96, 200].into_iter());
    let n = OperationDeserializer::deserialize(&mut target, &raw, None, SetOp::CountAnd, false)
        .unwrap();
    assert_eq!(n, 2);
}

#[test]
fn id_list_ops_match_reference() {
    // legacy framing: plain u32 id list body
    let ids: Vec<u64> = vec![3, 64, 70_000, 70_001, 1 << 20];
    let mut raw = vec![0u8; 64];
    let len;
    {
        let mut enc = bvser::bytes::Encoder::<bvser::bytes::LittleEndian>::new(&mut raw);
        enc.put_u8(tags::HM_ID_LIST | tags::HM_NO_BO | tags::HM_NO_GAPL);
        enc.put_u32(ids.len() as u32);
        for &id in &ids {
            enc.put_u32(id as u32);
        }
        len = enc.size();
    }
    raw.truncate(len);

    let a = BitVector::from_indices([3u64, 5, 70_001, 1 << 21].into_iter());
    let sa = ref_indices(&a);
    let sb: BTreeSet<u64> = ids.iter().copied().collect();

    for op in [SetOp::And, SetOp::Or, SetOp::Sub, SetOp::Xor] {
        let mut target = a.clone();
        OperationDeserializer::deserialize(&mut target, &raw, None, op, false).unwrap();
        assert_eq!(ref_indices(&target), ref_op(&sa, &sb, op), "id-list {op:?}");
    }
    for op in [
        SetOp::CountAnd,
        SetOp::CountOr,
        SetOp::CountXor,
        SetOp::CountSubAb,
        SetOp::CountSubBa,
        SetOp::CountA,
        SetOp::CountB,
    ] {
        let count =
            OperationDeserializer::deserialize(&mut a.clone(), &raw, None, op, false).unwrap();
        assert_eq!(count, ref_count(&sa, &sb, op), "id-list {op:?}");
    }
}

#[test]
fn stream_iterator_counts_without_target() {
    let (_, b) = fixture_pair(31);
    let buf = Serializer::new().serialize_to_vec(&b);
    let mut empty = BitVector::new();
    let count =
        OperationDeserializer::deserialize(&mut empty, &buf, None, SetOp::CountB, false)
            .unwrap();
    assert_eq!(count, b.count());
    assert!(empty.is_empty(), "counting must not populate the target");
}
