//! Criterion benchmarks for the posattr codecs.
//!
//! Covers code construction, entropy coding of a token stream with random
//! access, and Golomb coding of postings lists.

use criterion::{BatchSize, Criterion, Throughput, criterion_group, criterion_main};
use posattr::golomb::{golomb_parameter, read_gaps, write_gaps};
use posattr::huffman::{CodeDescriptor, HuffmanPaths, HuffmanReader, compress};
use posattr::storage::blob::{AccessMode, Blob, ItemWidth};
use posattr::util::bits::{BitReader, BitWriter};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::hint::black_box;

/// Generate a skewed token stream over `types` ids.
fn generate_stream(len: usize, types: usize) -> Vec<u32> {
    let mut rng = StdRng::seed_from_u64(17);
    (0..len)
        .map(|_| {
            let r: f64 = rng.random();
            (r * r * r * types as f64) as u32
        })
        .collect()
}

fn frequencies(stream: &[u32], types: usize) -> Vec<u32> {
    let mut freqs = vec![0u32; types];
    for &id in stream {
        freqs[id as usize] += 1;
    }
    freqs
}

fn bench_code_construction(c: &mut Criterion) {
    let mut group = c.benchmark_group("code_construction");
    let stream = generate_stream(1_000_000, 50_000);
    let freqs = frequencies(&stream, 50_000);

    group.throughput(Throughput::Elements(freqs.len() as u64));
    group.bench_function("descriptor_50k_types", |b| {
        b.iter(|| CodeDescriptor::from_frequencies(black_box(&freqs)).unwrap())
    });
    group.finish();
}

fn bench_entropy_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("entropy_codec");
    group.sample_size(20);
    let stream = generate_stream(200_000, 5_000);
    let freqs = frequencies(&stream, 5_000);

    group.throughput(Throughput::Elements(stream.len() as u64));
    group.bench_function("encode_200k_tokens", |b| {
        b.iter_batched(
            || tempfile::tempdir().unwrap(),
            |dir| {
                let (huf, hcd, syn) = (
                    dir.path().join("w.huf"),
                    dir.path().join("w.hcd"),
                    dir.path().join("w.huf.syn"),
                );
                let paths = HuffmanPaths {
                    stream: &huf,
                    descriptor: &hcd,
                    sync: &syn,
                };
                black_box(compress(&stream, &freqs, paths).unwrap());
            },
            BatchSize::PerIteration,
        )
    });

    let dir = tempfile::tempdir().unwrap();
    let (huf, hcd, syn) = (
        dir.path().join("w.huf"),
        dir.path().join("w.hcd"),
        dir.path().join("w.huf.syn"),
    );
    let paths = HuffmanPaths {
        stream: &huf,
        descriptor: &hcd,
        sync: &syn,
    };
    let (descriptor, _) = compress(&stream, &freqs, paths).unwrap();
    let stream_blob = Blob::acquire(&huf, ItemWidth::Byte, AccessMode::ReadMap).unwrap();
    let sync_blob = Blob::acquire(&syn, ItemWidth::Int, AccessMode::ReadMap).unwrap();
    let reader = HuffmanReader::new(&descriptor, &stream_blob, &sync_blob).unwrap();

    group.bench_function("decode_200k_tokens", |b| {
        b.iter(|| reader.decode_range(0, reader.len()).unwrap())
    });

    group.throughput(Throughput::Elements(1_000));
    group.bench_function("random_access_1k", |b| {
        let mut rng = StdRng::seed_from_u64(5);
        let positions: Vec<usize> = (0..1_000)
            .map(|_| rng.random_range(0..reader.len()))
            .collect();
        b.iter(|| {
            for &position in &positions {
                black_box(reader.get(position).unwrap());
            }
        })
    });
    group.finish();
}

fn bench_gap_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("gap_codec");
    let corpus_size = 10_000_000u32;
    let mut rng = StdRng::seed_from_u64(9);
    let mut positions: Vec<u32> = (0..100_000)
        .map(|_| rng.random_range(0..corpus_size))
        .collect();
    positions.sort_unstable();
    positions.dedup();
    let b_param = golomb_parameter(positions.len() as u32, corpus_size);

    let mut writer = BitWriter::new(Vec::new());
    write_gaps(&mut writer, &positions, b_param).unwrap();
    let encoded = writer.finish().unwrap();

    group.throughput(Throughput::Elements(positions.len() as u64));
    group.bench_function("encode_postings", |b| {
        b.iter(|| {
            let mut writer = BitWriter::new(Vec::with_capacity(encoded.len()));
            write_gaps(&mut writer, black_box(&positions), b_param).unwrap();
            writer.finish().unwrap()
        })
    });
    group.bench_function("decode_postings", |b| {
        b.iter(|| {
            read_gaps(&mut BitReader::new(black_box(&encoded)), positions.len(), b_param).unwrap()
        })
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_code_construction,
    bench_entropy_codec,
    bench_gap_codec
);

criterion_main!(benches);
