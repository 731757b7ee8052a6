//! Benchmarks for the token codec
//!
//! Tests the per-request cost of validating and decoding public tokens, and
//! the per-upload cost of generating a name.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use imgrelay::token::TokenCodec;

const KEY: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";
const IV: &str = "a0a1a2a3a4a5a6a7a8a9aaabacadaeaf";

fn bench_encode(c: &mut Criterion) {
    let codec = TokenCodec::from_hex(KEY, IV).unwrap();
    let mut group = c.benchmark_group("token_encode");

    for name in ["3fa9c01b_404img", "a-much-longer-internal-name-with-marker_404img"] {
        group.bench_with_input(BenchmarkId::from_parameter(name.len()), name, |b, name| {
            b.iter(|| codec.encode(black_box(name)).unwrap())
        });
    }

    group.finish();
}

fn bench_validate(c: &mut Criterion) {
    let codec = TokenCodec::from_hex(KEY, IV).unwrap();
    let valid = codec.encode("3fa9c01b_404img").unwrap();

    let mut group = c.benchmark_group("token_validate");
    group.bench_function("valid", |b| b.iter(|| codec.validate(black_box(&valid))));
    group.bench_function("garbage", |b| {
        b.iter(|| codec.validate(black_box("definitely-not-a-token")))
    });
    group.bench_function("with_extension", |b| {
        let filename = format!("{valid}.png");
        b.iter(|| codec.validate(TokenCodec::strip_extension(black_box(&filename))))
    });
    group.finish();
}

fn bench_generate_name(c: &mut Criterion) {
    let codec = TokenCodec::from_hex(KEY, IV).unwrap();
    c.bench_function("generate_name", |b| {
        b.iter(|| codec.generate_name(black_box(Some("png"))).unwrap())
    });
}

criterion_group!(benches, bench_encode, bench_validate, bench_generate_name);
criterion_main!(benches);
