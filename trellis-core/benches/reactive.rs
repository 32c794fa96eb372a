//! Benchmarks for the reactive core: write fan-out, derived chains, and
//! batched delivery.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use trellis_core::reactive::{batch, Cell, Derived, Reaction, Scope};

fn cell_write_fanout(c: &mut Criterion) {
    let mut group = c.benchmark_group("cell_write_fanout");

    for subscribers in [1usize, 10, 100] {
        group.bench_function(format!("{subscribers}_reactions"), |b| {
            let scope = Scope::root();
            let cell = Cell::new(&scope, 0u64);

            let reactions: Vec<Reaction> = (0..subscribers)
                .map(|_| {
                    let cell = cell.clone();
                    Reaction::new(&scope, move |_| {
                        black_box(cell.get());
                    })
                })
                .collect();

            let mut value = 0u64;
            b.iter(|| {
                value += 1;
                cell.set(value);
            });

            drop(reactions);
            scope.dispose();
        });
    }
    group.finish();
}

fn derived_chain(c: &mut Criterion) {
    c.bench_function("derived_chain_depth_10", |b| {
        let scope = Scope::root();
        let head = Cell::new(&scope, 0u64);

        let mut tail = {
            let head = head.clone();
            Derived::new(&scope, move || head.get() + 1)
        };
        for _ in 0..9 {
            let prev = tail.clone();
            tail = Derived::new(&scope, move || prev.get() + 1);
        }

        let mut value = 0u64;
        b.iter(|| {
            value += 1;
            head.set(value);
            black_box(tail.get());
        });

        scope.dispose();
    });
}

fn batched_writes(c: &mut Criterion) {
    c.bench_function("batched_100_writes", |b| {
        let scope = Scope::root();
        let cells: Vec<Cell<u64>> = (0..100).map(|_| Cell::new(&scope, 0u64)).collect();

        let reactions: Vec<Reaction> = cells
            .iter()
            .map(|cell| {
                let cell = cell.clone();
                Reaction::new(&scope, move |_| {
                    black_box(cell.get());
                })
            })
            .collect();

        let mut value = 0u64;
        b.iter(|| {
            value += 1;
            batch(|| {
                for cell in &cells {
                    cell.set(value);
                }
            });
        });

        drop(reactions);
        scope.dispose();
    });
}

criterion_group!(benches, cell_write_fanout, derived_chain, batched_writes);
criterion_main!(benches);
