//! Benchmarks for the binary primitive layer
//!
//! Measures:
//! - Zig-zag varint encoding and decoding across small and large magnitudes
//! - Length-prefixed string throughput
//!
//! Platform: Cross-platform, in-memory only

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use opcua_avro::binary::{BinaryReader, BinaryWriter};
use std::hint::black_box;

fn longs(magnitude: i64) -> Vec<i64> {
    (0..1024).map(|i| if i % 2 == 0 { magnitude - i } else { -magnitude + i }).collect()
}

fn bench_varints(c: &mut Criterion) {
    let mut group = c.benchmark_group("varint");

    for magnitude in [63i64, 1 << 20, i64::MAX / 2] {
        let values = longs(magnitude);
        let mut writer = BinaryWriter::unbounded(Vec::new());
        for value in &values {
            writer.write_long(*value).expect("encode");
        }
        let encoded = writer.into_inner();
        group.throughput(Throughput::Elements(values.len() as u64));

        group.bench_with_input(BenchmarkId::new("write_long", magnitude), &values, |b, values| {
            b.iter(|| {
                let mut writer = BinaryWriter::unbounded(Vec::with_capacity(encoded.len()));
                for value in values {
                    writer.write_long(black_box(*value)).expect("encode");
                }
                black_box(writer.into_inner())
            })
        });

        group.bench_with_input(BenchmarkId::new("read_long", magnitude), &encoded, |b, encoded| {
            b.iter(|| {
                let mut reader = BinaryReader::new(encoded.as_slice());
                let mut sum = 0i64;
                for _ in 0..values.len() {
                    sum = sum.wrapping_add(reader.read_long().expect("decode"));
                }
                black_box(sum)
            })
        });
    }

    group.finish();
}

fn bench_strings(c: &mut Criterion) {
    let text = "Boiler 1 / Temperature ".repeat(16);
    let mut writer = BinaryWriter::unbounded(Vec::new());
    for _ in 0..256 {
        writer.write_string(&text).expect("encode");
    }
    let encoded = writer.into_inner();

    let mut group = c.benchmark_group("string");
    group.throughput(Throughput::Bytes(encoded.len() as u64));

    group.bench_function("read_string", |b| {
        b.iter(|| {
            let mut reader = BinaryReader::new(encoded.as_slice());
            for _ in 0..256 {
                black_box(reader.read_string().expect("decode"));
            }
        })
    });

    group.finish();
}

criterion_group!(benches, bench_varints, bench_strings);
criterion_main!(benches);
