//! Benchmarks for the compilation pipeline.
//!
//! Measures decoding alone, the full pipeline for single methods of different shapes, and
//! whole units compiled sequentially and on the rayon pool.

extern crate cilaot;

use std::{hint::black_box, sync::Arc};

use cilaot::{
    cil::{BytecodeDecoder, OpcodeTable},
    file::MethodBody,
    prelude::*,
};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

fn int_sig(params: usize) -> MethodSignature {
    MethodSignature::new(vec![CompType::Int32; params], Some(CompType::Int32))
}

fn compiler(parallel: bool) -> Compiler {
    let mut registry = CallRegistry::new();
    registry.register(0x0A00_0001, CallSignature::new("Math.Max", int_sig(2)));
    Compiler::new(
        Arc::new(Ref64::new()),
        registry,
        CompilerConfig::default().with_parallel(parallel),
    )
}

/// A counting loop with two locals.
fn sum_loop() -> MethodSource {
    let code = vec![
        0x16, 0x0A, 0x16, 0x0B, 0x2B, 0x08, 0x06, 0x07, 0x58, 0x0A, 0x07, 0x17, 0x58, 0x0B, 0x07,
        0x02, 0x32, 0xF4, 0x06, 0x2A,
    ];
    let info = MethodInfo::new("Bench.Sum", int_sig(1)).with_locals(vec![CompType::Int32; 2]);
    MethodSource::new(info, code)
}

/// A chain of `n` calls whose results are summed, keeping values live across every call.
fn call_chain(n: usize) -> MethodSource {
    let mut code = vec![0x16]; // ldc.i4.0
    for _ in 0..n {
        code.extend_from_slice(&[0x02, 0x03, 0x28, 0x01, 0x00, 0x00, 0x0A, 0x58]);
    }
    code.push(0x2A);
    MethodSource::new(MethodInfo::new(format!("Bench.Chain{n}"), int_sig(2)), code)
}

/// `n` diamonds in sequence, each joining a value computed on both arms.
fn diamonds(n: usize) -> MethodSource {
    let mut code = vec![0x02]; // ldarg.0
    for _ in 0..n {
        // dup; brtrue.s +3; ldc.i4.1; br.s +1; ldc.i4.2; add
        code.extend_from_slice(&[0x25, 0x2D, 0x03, 0x17, 0x2B, 0x01, 0x18, 0x58]);
    }
    code.push(0x2A);
    MethodSource::new(MethodInfo::new(format!("Bench.Diamonds{n}"), int_sig(1)), code)
}

fn bench_decode(c: &mut Criterion) {
    let table = OpcodeTable::standard();
    let source = diamonds(64);
    let info = source.info.clone();

    c.bench_function("decode_diamonds_64", |b| {
        b.iter(|| {
            let graph = BytecodeDecoder::new(&table)
                .decode(&MethodBody::new(black_box(&source.bytes)), info.clone())
                .unwrap();
            black_box(graph)
        });
    });
}

fn bench_compile_method(c: &mut Criterion) {
    let compiler = compiler(false);
    let mut group = c.benchmark_group("compile_method");

    let loop_source = sum_loop();
    group.bench_function("sum_loop", |b| {
        b.iter(|| black_box(compiler.compile_method(black_box(&loop_source)).unwrap()));
    });

    for n in [4, 16, 64] {
        let source = call_chain(n);
        group.bench_with_input(BenchmarkId::new("call_chain", n), &source, |b, source| {
            b.iter(|| black_box(compiler.compile_method(source).unwrap()));
        });

        let source = diamonds(n);
        group.bench_with_input(BenchmarkId::new("diamonds", n), &source, |b, source| {
            b.iter(|| black_box(compiler.compile_method(source).unwrap()));
        });
    }
    group.finish();
}

fn bench_compile_unit(c: &mut Criterion) {
    let sources: Vec<MethodSource> = (0..256)
        .map(|i| match i % 3 {
            0 => sum_loop(),
            1 => call_chain(8),
            _ => diamonds(8),
        })
        .collect();

    let mut group = c.benchmark_group("compile_unit");
    group.throughput(Throughput::Elements(sources.len() as u64));
    for parallel in [false, true] {
        let compiler = compiler(parallel);
        let label = if parallel { "parallel" } else { "sequential" };
        group.bench_function(label, |b| {
            b.iter(|| black_box(compiler.compile_unit(&sources).unwrap()));
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_decode,
    bench_compile_method,
    bench_compile_unit
);
criterion_main!(benches);
