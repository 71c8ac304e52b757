// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Benchmarks for the ledger engine.
//!
//! Run with: cargo bench
//!
//! Benchmarks include:
//! - Single-threaded spend and purchase processing
//! - Multi-threaded transfers, including contended pairs
//! - Duplicate payment event storms
//! - History paging
//! - Scaling with number of threads

use coin_ledger::{AccountId, Engine, ExternalRef, PageRequest};
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use rayon::prelude::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

// =============================================================================
// Helper Functions
// =============================================================================

fn engine_with_accounts(count: u64, balance: i64) -> Engine {
    let engine = Engine::new();
    for id in 1..=count {
        engine.open_account(AccountId(id)).unwrap();
        if balance > 0 {
            engine.reward(AccountId(id), balance, "seed").unwrap();
        }
    }
    engine
}

// =============================================================================
// Single-Threaded Benchmarks
// =============================================================================

fn bench_single_spend(c: &mut Criterion) {
    c.bench_function("single_spend", |b| {
        let engine = engine_with_accounts(1, i64::MAX / 2);
        b.iter(|| {
            engine.spend(black_box(AccountId(1)), black_box(1)).unwrap();
        })
    });
}

fn bench_single_purchase(c: &mut Criterion) {
    c.bench_function("single_purchase", |b| {
        let engine = engine_with_accounts(1, 0);
        let mut n = 0u64;
        b.iter(|| {
            n += 1;
            engine
                .purchase(AccountId(1), 100, ExternalRef::new(format!("cs_{n}")))
                .unwrap();
        })
    });
}

fn bench_mixed_operations(c: &mut Criterion) {
    let mut group = c.benchmark_group("mixed_operations");

    for count in [100, 1_000, 10_000].iter() {
        group.throughput(Throughput::Elements(*count as u64 * 3));
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            b.iter(|| {
                let engine = engine_with_accounts(2, 0);
                for i in 0..count {
                    engine
                        .purchase(AccountId(1), 100, ExternalRef::new(format!("cs_{i}")))
                        .unwrap();
                    let _ = engine.spend(AccountId(1), 50);
                    let _ = engine.transfer(AccountId(1), AccountId(2), 25);
                }
                black_box(&engine);
            })
        });
    }
    group.finish();
}

fn bench_history_paging(c: &mut Criterion) {
    let mut group = c.benchmark_group("history_paging");

    for records in [100, 10_000].iter() {
        let engine = engine_with_accounts(1, 0);
        for _ in 0..*records {
            engine.reward(AccountId(1), 1, "tick").unwrap();
        }
        group.bench_with_input(
            BenchmarkId::from_parameter(records),
            records,
            |b, _| {
                b.iter(|| {
                    engine
                        .list_transactions(AccountId(1), black_box(PageRequest::new(3, 25)))
                        .unwrap()
                })
            },
        );
    }
    group.finish();
}

// =============================================================================
// Multi-Threaded Benchmarks
// =============================================================================

fn bench_parallel_transfers_disjoint_pairs(c: &mut Criterion) {
    let mut group = c.benchmark_group("parallel_transfers_disjoint_pairs");

    for count in [1_000, 10_000].iter() {
        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            b.iter_batched(
                || Arc::new(engine_with_accounts(200, 1_000_000)),
                |engine| {
                    (0..count as u64).into_par_iter().for_each(|i| {
                        let from = (i % 100) * 2 + 1;
                        engine
                            .transfer(AccountId(from), AccountId(from + 1), 1)
                            .unwrap();
                    });
                    black_box(&engine);
                },
                criterion::BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

fn bench_parallel_transfers_contended(c: &mut Criterion) {
    let mut group = c.benchmark_group("parallel_transfers_contended");

    for count in [1_000, 10_000].iter() {
        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            b.iter_batched(
                || Arc::new(engine_with_accounts(2, 1_000_000)),
                |engine| {
                    // Both directions on the same pair.
                    (0..count as u64).into_par_iter().for_each(|i| {
                        let (from, to) = if i % 2 == 0 { (1, 2) } else { (2, 1) };
                        let _ = engine.transfer(AccountId(from), AccountId(to), 1);
                    });
                    black_box(&engine);
                },
                criterion::BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

fn bench_duplicate_event_storm(c: &mut Criterion) {
    let mut group = c.benchmark_group("duplicate_event_storm");

    for copies in [10, 100, 1_000].iter() {
        group.throughput(Throughput::Elements(*copies as u64));
        group.bench_with_input(BenchmarkId::from_parameter(copies), copies, |b, &copies| {
            b.iter_batched(
                || Arc::new(engine_with_accounts(1, 0)),
                |engine| {
                    (0..copies).into_par_iter().for_each(|_| {
                        engine
                            .purchase(AccountId(1), 100, ExternalRef::new("cs_storm"))
                            .unwrap();
                    });
                    black_box(&engine);
                },
                criterion::BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

// =============================================================================
// Scaling Benchmarks
// =============================================================================

fn bench_thread_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("thread_scaling");
    let total_operations = 50_000u64;

    for num_threads in [1, 2, 4, 8].iter() {
        group.throughput(Throughput::Elements(total_operations));
        group.bench_with_input(
            BenchmarkId::from_parameter(num_threads),
            num_threads,
            |b, &num_threads| {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(num_threads)
                    .build()
                    .unwrap();

                b.iter(|| {
                    let engine = Arc::new(engine_with_accounts(1_000, 0));
                    let counter = AtomicU64::new(0);

                    pool.install(|| {
                        (0..total_operations).into_par_iter().for_each(|i| {
                            let n = counter.fetch_add(1, Ordering::Relaxed);
                            let account = AccountId(i % 1_000 + 1);
                            if i % 2 == 0 {
                                engine
                                    .purchase(account, 10, ExternalRef::new(format!("cs_{n}")))
                                    .unwrap();
                            } else {
                                let _ = engine.spend(account, 5);
                            }
                        });
                    });

                    black_box(&engine);
                })
            },
        );
    }
    group.finish();
}

criterion_group!(
    single_threaded,
    bench_single_spend,
    bench_single_purchase,
    bench_mixed_operations,
    bench_history_paging,
);

criterion_group!(
    multi_threaded,
    bench_parallel_transfers_disjoint_pairs,
    bench_parallel_transfers_contended,
    bench_duplicate_event_storm,
);

criterion_group!(scaling, bench_thread_scaling);

criterion_main!(single_threaded, multi_threaded, scaling);
