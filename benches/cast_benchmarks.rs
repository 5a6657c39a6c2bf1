//! 类型转换性能基准测试
//!
//! 测试数值提升、降级、字符串解析以及函数调用分发的开销

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use polyglot_core::reflect::cast;
use polyglot_core::{Function, Signature, TypeId, Value};
use std::hint::black_box;

fn bench_numeric_casts(c: &mut Criterion) {
    let mut group = c.benchmark_group("numeric_casts");

    let targets = [
        TypeId::Bool,
        TypeId::Char,
        TypeId::Short,
        TypeId::Int,
        TypeId::Long,
        TypeId::Float,
        TypeId::Double,
    ];

    for target in targets {
        group.bench_with_input(BenchmarkId::new("from_long", target), &target, |b, &target| {
            b.iter(|| black_box(cast(Value::long(123_456), target)));
        });
        group.bench_with_input(BenchmarkId::new("from_double", target), &target, |b, &target| {
            b.iter(|| black_box(cast(Value::double(3.75), target)));
        });
    }

    group.finish();
}

fn bench_string_casts(c: &mut Criterion) {
    let mut group = c.benchmark_group("string_casts");

    group.bench_function("parse_int", |b| {
        b.iter(|| black_box(cast(Value::string("1234"), TypeId::Int)));
    });

    group.bench_function("parse_double", |b| {
        b.iter(|| black_box(cast(Value::string("3.1416"), TypeId::Double)));
    });

    group.bench_function("stringify_array", |b| {
        let value = Value::array((0..16).map(Value::int).collect());
        b.iter(|| black_box(cast(value.clone(), TypeId::String)));
    });

    group.finish();
}

fn bench_function_call(c: &mut Criterion) {
    let mut group = c.benchmark_group("function_call");

    let sum = Function::from_closure("sum", Signature::new(2), |args| {
        Some(Value::long(args[0].to_long().ok()? + args[1].to_long().ok()?))
    })
    .unwrap();
    let args = [Value::long(3), Value::long(4)];

    group.bench_function("closure_sum", |b| {
        b.iter(|| black_box(sum.call(&args)));
    });

    group.finish();
}

criterion_group!(benches, bench_numeric_casts, bench_string_casts, bench_function_call);
criterion_main!(benches);
