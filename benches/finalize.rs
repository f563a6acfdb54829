extern crate datastream;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use datastream::prelude::*;
use std::hint::black_box;

/// Builds a stream of `records` child blocks, each holding a few primitives and a string,
/// with the root holding one pointer per child and every child pointing back at the root.
fn build_stream(records: usize) -> Stream {
    let mut stream = Stream::new(StreamConfig::default()).unwrap();
    let root = stream.root();

    let mut children = Vec::with_capacity(records);
    for index in 0..records {
        children.push(stream.open_block().unwrap());
        stream.write_uint32(index as u32).unwrap();
        stream.write_float64(index as f64).unwrap();
        stream.write_string("record").unwrap();
        stream.write_pointer(root).unwrap();
        stream.close_block().unwrap();
    }
    for child in children {
        stream.write_pointer(child).unwrap();
    }

    stream
}

/// Benchmark the layout and patch passes for growing block counts
fn bench_finalize(c: &mut Criterion) {
    let mut group = c.benchmark_group("finalize");

    for records in [16usize, 256, 4096] {
        let size = build_stream(records).finalize().unwrap().len();
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(records), &records, |b, &n| {
            b.iter_batched(
                || build_stream(n),
                |stream| black_box(stream.finalize().unwrap()),
                criterion::BatchSize::LargeInput,
            );
        });
    }

    group.finish();
}

/// Benchmark writing primitives into a single block
fn bench_write_primitives(c: &mut Criterion) {
    c.bench_function("write_primitives", |b| {
        b.iter(|| {
            let mut stream = Stream::new(StreamConfig::default()).unwrap();
            for i in 0..1024u32 {
                stream.write_uint8(black_box(i as u8)).unwrap();
                stream.write_uint32(black_box(i)).unwrap();
                stream.write_uint16(black_box(i as u16)).unwrap();
                stream.write_uint64(black_box(u64::from(i))).unwrap();
            }
            black_box(stream)
        });
    });
}

criterion_group!(benches, bench_finalize, bench_write_primitives);
criterion_main!(benches);
