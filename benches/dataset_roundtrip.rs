//! Benchmarks for schema-validated data set messages
//!
//! Measures:
//! - Encoding and decoding the boiler data set in both field shapes
//! - Structure-bearing pump messages
//! - Appending to an in-memory deflate container
//!
//! Platform: Cross-platform, in-memory only

use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use opcua_avro::test_utils::{boiler_metadata, boiler_sample, compile, pump_metadata, pump_sample};
use opcua_avro::types::FieldContent;
use opcua_avro::{Compression, ContainerOptions, ContainerWriter, SchemaDecoder, SchemaEncoder};
use std::hint::black_box;

fn encode_all(schema: &opcua_avro::schema::Schema, samples: &[opcua_avro::types::DataSet]) -> Vec<u8> {
    let mut encoder = SchemaEncoder::new(Vec::new(), schema.clone());
    for sample in samples {
        encoder.write_data_set(sample).expect("encode");
        encoder.finish_message().expect("complete message");
    }
    encoder.finish().expect("finish")
}

fn bench_boiler(c: &mut Criterion) {
    let mut group = c.benchmark_group("boiler_data_set");

    for content in [FieldContent::RawData, FieldContent::DataValue] {
        let schema = compile(&boiler_metadata(), content).expect("boiler schema");
        let samples: Vec<_> = (0..256).map(|n| boiler_sample(n, content)).collect();
        let encoded = encode_all(&schema, &samples);
        group.throughput(Throughput::Elements(samples.len() as u64));

        group.bench_function(format!("encode_{content:?}"), |b| {
            b.iter(|| black_box(encode_all(&schema, black_box(&samples))))
        });

        group.bench_function(format!("decode_{content:?}"), |b| {
            b.iter(|| {
                let mut decoder = SchemaDecoder::new(encoded.as_slice(), schema.clone());
                for _ in 0..samples.len() {
                    black_box(decoder.read_data_set().expect("decode"));
                    decoder.finish_message().expect("complete message");
                }
            })
        });
    }

    group.finish();
}

fn bench_pump(c: &mut Criterion) {
    let schema = compile(&pump_metadata(), FieldContent::RawData).expect("pump schema");
    let samples: Vec<_> = (0..256).map(pump_sample).collect();

    let mut group = c.benchmark_group("pump_data_set");
    group.throughput(Throughput::Elements(samples.len() as u64));
    group.bench_function("encode_structure", |b| b.iter(|| black_box(encode_all(&schema, &samples))));
    group.finish();
}

fn bench_container(c: &mut Criterion) {
    let schema = compile(&boiler_metadata(), FieldContent::RawData).expect("boiler schema");
    let samples: Vec<_> = (0..1000).map(|n| boiler_sample(n, FieldContent::RawData)).collect();
    let options = ContainerOptions { compression: Compression::Deflate, ..ContainerOptions::default() };

    let mut group = c.benchmark_group("container");
    group.throughput(Throughput::Elements(samples.len() as u64));
    group.bench_function("append_deflate", |b| {
        b.iter(|| {
            let mut writer = ContainerWriter::new(Vec::new(), schema.clone(), options.clone()).expect("header");
            for sample in &samples {
                writer.append_data_set(sample).expect("append");
            }
            black_box(writer.finish().expect("finish"))
        })
    });
    group.finish();
}

criterion_group!(benches, bench_boiler, bench_pump, bench_container);
criterion_main!(benches);
