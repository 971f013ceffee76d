//! Benchmarks for bit-vector serialization and stream operations.
//!
//! Run with: `cargo bench`

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use bvser::{BitVector, Deserializer, OperationDeserializer, Serializer, SetOp};

fn make_vector(blocks: u64, step: u64) -> BitVector {
    let mut bv = BitVector::new();
    for nb in 0..blocks {
        for bit in (0..65536u64).step_by(step as usize) {
            bv.set((nb << 16) + bit);
        }
    }
    bv
}

fn bench_serialize(c: &mut Criterion) {
    let mut group = c.benchmark_group("serialize");
    for (name, step) in [("sparse", 613u64), ("medium", 17), ("dense", 3)] {
        let bv = make_vector(8, step);
        let bytes = bv.count() / 8;
        group.throughput(Throughput::Bytes(bytes));
        group.bench_with_input(BenchmarkId::from_parameter(name), &bv, |b, bv| {
            let mut ser = Serializer::new();
            b.iter(|| ser.serialize_to_vec(bv));
        });
    }
    group.finish();
}

fn bench_deserialize(c: &mut Criterion) {
    let mut group = c.benchmark_group("deserialize");
    for (name, step) in [("sparse", 613u64), ("medium", 17), ("dense", 3)] {
        let bv = make_vector(8, step);
        let buf = Serializer::new().serialize_to_vec(&bv);
        group.throughput(Throughput::Bytes(buf.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(name), &buf, |b, buf| {
            let mut deser = Deserializer::new();
            b.iter(|| {
                let mut out = BitVector::new();
                deser.deserialize(&mut out, buf).unwrap();
                out
            });
        });
    }
    group.finish();
}

fn bench_stream_ops(c: &mut Criterion) {
    let mut group = c.benchmark_group("stream_ops");
    let a = make_vector(8, 13);
    let b = make_vector(8, 17);
    let buf = Serializer::new().serialize_to_vec(&b);
    group.throughput(Throughput::Bytes(buf.len() as u64));

    for (name, op) in [
        ("and", SetOp::And),
        ("or", SetOp::Or),
        ("count_and", SetOp::CountAnd),
        ("count_xor", SetOp::CountXor),
    ] {
        group.bench_with_input(BenchmarkId::from_parameter(name), &buf, |bch, buf| {
            bch.iter(|| {
                let mut target = a.clone();
                OperationDeserializer::deserialize(&mut target, buf, None, op, false).unwrap()
            });
        });
    }
    group.finish();
}

fn bench_compression_levels(c: &mut Criterion) {
    let mut group = c.benchmark_group("levels");
    let bv = make_vector(4, 29);
    for level in [0u8, 3, 4, 5] {
        group.bench_with_input(BenchmarkId::from_parameter(level), &bv, |b, bv| {
            let mut ser = Serializer::new();
            ser.set_compression_level(level);
            b.iter(|| ser.serialize_to_vec(bv));
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_serialize,
    bench_deserialize,
    bench_stream_ops,
    bench_compression_levels
);
criterion_main!(benches);
