#[macro_use]
extern crate criterion;

use criterion::{BatchSize, BenchmarkId, Criterion};
use merkle_forest::{Hash, Leaf, MemForest};
use rand::seq::SliceRandom;
use rand::thread_rng;

const POOL_NODES: usize = 1024;

/// Create a leaf from an integer (for benchmarking).
fn leaf_of(i: u64) -> Leaf {
    let mut bytes = [0u8; 32];
    bytes[24..].copy_from_slice(&i.to_be_bytes());
    Leaf::new(Hash(bytes), false)
}

fn prepare_forest(count: u64) -> MemForest {
    let leaves: Vec<Leaf> = (0..count).map(leaf_of).collect();
    let mut forest = MemForest::new(POOL_NODES);
    forest.add(&leaves).expect("add");
    forest
}

fn bench(c: &mut Criterion) {
    {
        let mut group = c.benchmark_group("forest insertion");
        let inputs = [1_000u64, 10_000, 100_000];
        for input in inputs.iter() {
            group.bench_with_input(BenchmarkId::new("leaves", input), &input, |b, &&size| {
                b.iter(|| prepare_forest(size));
            });
        }
    }

    c.bench_function("forest prove", |b| {
        let forest = prepare_forest(100_000);
        let mut rng = thread_rng();
        let hashes: Vec<Hash> = (0..100_000).map(|i| leaf_of(i).hash).collect();
        b.iter(|| {
            forest
                .prove(&[*hashes.choose(&mut rng).expect("leaf")])
                .expect("prove")
        });
    });

    c.bench_function("forest remove 100 of 10k", |b| {
        let mut rng = thread_rng();
        b.iter_batched(
            || {
                let forest = prepare_forest(10_000);
                let mut targets: Vec<u64> = (0..10_000).collect();
                targets.shuffle(&mut rng);
                targets.truncate(100);
                (forest, targets)
            },
            |(mut forest, targets)| forest.modify(&[], &targets).expect("remove"),
            BatchSize::LargeInput,
        );
    });
}

criterion_group!(
    name = benches;
    config = Criterion::default().sample_size(20);
    targets = bench
);
criterion_main!(benches);
