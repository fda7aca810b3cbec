//! Table walker benchmarks.
//!
//! Compares the generic walker over Rust closures with the `_initterm`
//! export over `extern "C"` entries, for dense and sparse tables.

use std::sync::atomic::{AtomicU64, Ordering};

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use modrt_abi::VoidHook;
use modrt_abi::initterm_abi::{_initterm, _initterm_e};
use modrt_core::{run_all, run_all_or_fail};

static HITS: AtomicU64 = AtomicU64::new(0);

extern "C" fn bump() {
    HITS.fetch_add(1, Ordering::Relaxed);
}

fn bump_rust() {
    HITS.fetch_add(1, Ordering::Relaxed);
}

fn succeed() -> i32 {
    0
}

extern "C" fn bump_ok() -> i32 {
    HITS.fetch_add(1, Ordering::Relaxed);
    0
}

/// Every `stride`-th slot is populated; the rest are null.
fn sparse<T: Copy>(len: usize, stride: usize, entry: T) -> Vec<Option<T>> {
    (0..len)
        .map(|i| (i % stride == 0).then_some(entry))
        .collect()
}

fn bench_run_all(c: &mut Criterion) {
    let sizes: &[usize] = &[8, 64, 512, 4096];
    let mut group = c.benchmark_group("run_all");

    for &size in sizes {
        group.throughput(Throughput::Elements(size as u64));

        let dense: Vec<Option<fn()>> = vec![Some(bump_rust as fn()); size];
        group.bench_with_input(BenchmarkId::new("closure_dense", size), &dense, |b, t| {
            b.iter(|| black_box(run_all(black_box(t))));
        });

        let hooks: Vec<Option<VoidHook>> = sparse(size, 4, bump as VoidHook);
        group.bench_with_input(BenchmarkId::new("initterm_sparse", size), &hooks, |b, t| {
            let range = t.as_ptr_range();
            b.iter(|| unsafe { _initterm(black_box(range.start), black_box(range.end)) });
        });
    }
    group.finish();
}

fn bench_run_all_or_fail(c: &mut Criterion) {
    let sizes: &[usize] = &[8, 512];
    let mut group = c.benchmark_group("run_all_or_fail");

    for &size in sizes {
        group.throughput(Throughput::Elements(size as u64));

        let dense: Vec<Option<fn() -> i32>> = vec![Some(succeed as fn() -> i32); size];
        group.bench_with_input(BenchmarkId::new("closure_dense", size), &dense, |b, t| {
            b.iter(|| black_box(run_all_or_fail(black_box(t)).is_ok()));
        });

        let hooks = sparse(size, 2, bump_ok as extern "C" fn() -> i32);
        group.bench_with_input(BenchmarkId::new("initterm_e_sparse", size), &hooks, |b, t| {
            let range = t.as_ptr_range();
            b.iter(|| black_box(unsafe { _initterm_e(range.start, range.end) }));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_run_all, bench_run_all_or_fail);
criterion_main!(benches);
