// Criterion benchmarks for the covekv-common protocol layer
//
// Run benchmarks with:
//   cargo bench -p covekv-common

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use prost::Message;

use covekv_common::protocol::messages::{CoverageEntryPb, CoverageReq, CoverageResp};

fn plan_response(entries: usize) -> CoverageResp {
    CoverageResp {
        entries: (0..entries)
            .map(|i| CoverageEntryPb {
                cover_context: vec![i as u8; 24],
                keyspace_desc: format!("slice {i} of 64"),
                ip: format!("10.0.0.{}", i % 8 + 1),
                port: 8087,
            })
            .collect(),
        done: None,
    }
}

fn bench_request_encoding(c: &mut Criterion) {
    let mut group = c.benchmark_group("request_encoding");

    group.bench_function("encode_minimal", |b| {
        let req = CoverageReq {
            bucket_type: b"default".to_vec(),
            bucket: b"users".to_vec(),
            ..Default::default()
        };
        b.iter(|| black_box(&req).encode_to_vec());
    });

    group.bench_function("encode_with_contexts", |b| {
        let req = CoverageReq {
            bucket_type: b"default".to_vec(),
            bucket: b"users".to_vec(),
            min_partitions: Some(64),
            replace_cover: Some(vec![7u8; 24]),
            unavailable_cover: (0..16).map(|i| vec![i as u8; 24]).collect(),
        };
        b.iter(|| black_box(&req).encode_to_vec());
    });

    group.finish();
}

fn bench_response_decoding(c: &mut Criterion) {
    let mut group = c.benchmark_group("response_decoding");

    let small = plan_response(4).encode_to_vec();
    let medium = plan_response(64).encode_to_vec();
    let large = plan_response(512).encode_to_vec();

    group.bench_function("decode_small", |b| {
        b.iter(|| CoverageResp::decode(black_box(small.as_slice())));
    });

    group.bench_function("decode_medium", |b| {
        b.iter(|| CoverageResp::decode(black_box(medium.as_slice())));
    });

    group.bench_function("decode_large", |b| {
        b.iter(|| CoverageResp::decode(black_box(large.as_slice())));
    });

    group.finish();
}

criterion_group!(benches, bench_request_encoding, bench_response_decoding);
criterion_main!(benches);
