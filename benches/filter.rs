//! Benchmarks for candidate filtering.
//!
//! Measures the cost of one poll of the candidate table:
//! - The filter predicate on its own
//! - A full refresh of the sorted view, serial and on the rayon pool
//! - Branch classification of raw encodings

extern crate branchwatch;

use branchwatch::filter::{AddressBound, Column, FilterConfig, FilterEngine, SortOrder, SymbolField};
use branchwatch::instruction::{classify, BranchKind};
use branchwatch::watch::{BranchWatch, CandidateKey, CandidateStore};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::hint::black_box;

/// Encodings of every branch kind, cycled through when building stores.
const ENCODINGS: [u32; 12] = [
    0x4800_0010, // b
    0x4800_0011, // bl
    0x4082_0010, // bne
    0x4082_0011, // bnel
    0x4e80_0020, // blr
    0x4e80_0021, // blrl
    0x4d82_0020, // beqlr
    0x4d82_0021, // beqlrl
    0x4e80_0420, // bctr
    0x4e80_0421, // bctrl
    0x4c82_0420, // bnectr
    0x4c82_0421, // bnectrl
];

/// A store with `count` distinct candidates spread over the 24MiB of MEM1.
fn build_store(count: u32) -> CandidateStore {
    let mut store = CandidateStore::new();
    store.start();
    for i in 0..count {
        let origin = 0x8000_0000 + (i * 0x9e37) % 0x0180_0000 / 4 * 4;
        let destination = 0x8000_0000 + (i * 0x7f4b) % 0x0180_0000 / 4 * 4;
        let instruction = ENCODINGS[i as usize % ENCODINGS.len()];
        let key = CandidateKey::new(origin, destination, instruction);
        for _ in 0..=(i % 3) {
            store.record_hit(key, i % 5 != 0);
        }
    }
    for row in 0..store.row_count() {
        let name = format!("fn_{:08x}", 0x8000_0000 + row * 0x40);
        store.set_symbols(row, Some(name), None).unwrap();
    }
    store
}

/// A configuration touching every dimension of the predicate.
fn busy_config() -> FilterConfig {
    let mut config = FilterConfig::default();
    config.set_branch_kind(BranchKind::Blr, false);
    config.set_condition(false, false);
    config.set_address_bound(AddressBound::OriginMin, "80100000");
    config.set_address_bound(AddressBound::DestinationMax, "81000000");
    config.set_symbol_pattern(SymbolField::Origin, "FN_8");
    config
}

/// Benchmark the predicate over every row.
fn bench_matches(c: &mut Criterion) {
    let store = build_store(10_000);
    let config = busy_config();

    c.bench_function("filter_matches_10k", |b| {
        b.iter(|| {
            let visible = store.rows().filter(|r| config.matches(black_box(r))).count();
            black_box(visible)
        });
    });
}

/// Benchmark a full refresh of the sorted view, serial against parallel.
fn bench_refresh(c: &mut Criterion) {
    let mut group = c.benchmark_group("filter_refresh");
    for count in [1_000u32, 10_000, 100_000] {
        let store = build_store(count);
        for (name, threshold) in [("serial", usize::MAX), ("parallel", 0)] {
            group.bench_with_input(BenchmarkId::new(name, count), &store, |b, store| {
                let mut engine = FilterEngine::new().with_parallel_threshold(threshold);
                engine.restore(busy_config());
                engine.set_sort_order(SortOrder {
                    column: Column::TotalHits,
                    ascending: false,
                });
                b.iter(|| {
                    engine.invalidate();
                    black_box(engine.visible_rows(store).len())
                });
            });
        }
    }
    group.finish();
}

/// Benchmark classification of branch and non-branch encodings.
fn bench_classify(c: &mut Criterion) {
    let encodings: Vec<u32> = (0..4096u32)
        .map(|i| {
            if i % 4 == 0 {
                0x7c08_02a6 + i
            } else {
                ENCODINGS[i as usize % ENCODINGS.len()]
            }
        })
        .collect();

    c.bench_function("classify_4k", |b| {
        b.iter(|| {
            let branches = encodings
                .iter()
                .filter(|&&raw| classify(black_box(raw)).is_some())
                .count();
            black_box(branches)
        });
    });
}

criterion_group!(benches, bench_matches, bench_refresh, bench_classify);
criterion_main!(benches);
