use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::{rngs::StdRng, Rng, SeedableRng};

use avlmap::AvlMap;

const N: usize = 100_000;

pub fn benchmarks(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(0);
    let keys: Vec<i32> = (1..=N).map(|_| rng.gen()).collect();

    c.bench_function("map_insert", |b| {
        let mut map = AvlMap::new();
        b.iter(|| {
            for key in &keys {
                map.insert(*key, *key);
            }
        })
    });

    let mut map = AvlMap::new();
    for key in &keys {
        map.insert(*key, *key);
    }

    c.bench_function("map_get", |b| {
        b.iter(|| {
            for key in &keys {
                black_box(map.get(key));
            }
        })
    });

    c.bench_function("map_iter", |b| {
        b.iter(|| {
            for (k, v) in &map {
                black_box((k, v));
            }
        })
    });

    c.bench_function("map_remove", |b| {
        let mut map = map.clone();
        b.iter(|| {
            for key in &keys {
                map.remove(key);
            }
        })
    });
}

criterion_group!(benches, benchmarks);
criterion_main!(benches);
