// Benchmarks for signature generation, forest build/query and scoring
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::prelude::*;
use rand::rngs::StdRng;
use unionx::{same_domain_prob, ColumnKey, CosineForest, ForestConfig, MinHashForest, MinHashSignature, MinHasher};

fn random_domain(rng: &mut StdRng, size: usize) -> Vec<String> {
    (0..size)
        .map(|_| format!("value-{}", rng.random_range(0..50_000u32)))
        .collect()
}

fn random_signatures(count: usize, num_hash: usize) -> Vec<MinHashSignature> {
    let mut rng = StdRng::seed_from_u64(42);
    let hasher = MinHasher::new(1, num_hash);
    (0..count)
        .map(|_| hasher.signature(random_domain(&mut rng, 200)))
        .collect()
}

fn benchmark_signature(c: &mut Criterion) {
    let mut group = c.benchmark_group("minhash_signature");
    let mut rng = StdRng::seed_from_u64(1);

    for size in [100, 1000, 10000].iter() {
        let domain = random_domain(&mut rng, *size);
        let hasher = MinHasher::new(1, 256);
        group.bench_with_input(BenchmarkId::new("unionx", size), size, |b, _| {
            b.iter(|| black_box(hasher.signature(black_box(&domain))));
        });
    }

    group.finish();
}

fn benchmark_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("forest_build");
    group.sample_size(10);

    for size in [1000, 10000].iter() {
        let sigs = random_signatures(*size, 256);
        group.bench_with_input(BenchmarkId::new("minhash", size), size, |b, _| {
            b.iter(|| {
                let mut forest = MinHashForest::new(ForestConfig::default()).unwrap();
                for (i, sig) in sigs.iter().enumerate() {
                    forest.add(ColumnKey::new("table", i).unwrap(), sig).unwrap();
                }
                forest.index();
                black_box(forest.bucket_count())
            });
        });
    }

    group.finish();
}

fn benchmark_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("forest_query");

    let sigs = random_signatures(10000, 256);
    let mut forest = MinHashForest::new(ForestConfig::default()).unwrap();
    for (i, sig) in sigs.iter().enumerate() {
        forest.add(ColumnKey::new(format!("table{}", i / 10), i % 10).unwrap(), sig).unwrap();
    }
    forest.index();
    let queries: Vec<MinHashSignature> = sigs[..5].to_vec();
    let k = forest.params().k;

    group.bench_function("full_prefix", |b| {
        b.iter(|| black_box(forest.query(&queries).unwrap().down_to(k).count()));
    });
    group.bench_function("first_100_shrinking", |b| {
        b.iter(|| black_box(forest.query(&queries).unwrap().take(100).count()));
    });

    let mut rng = StdRng::seed_from_u64(7);
    let mut cosine = CosineForest::new(ForestConfig::default(), 100, 3).unwrap();
    for i in 0..5000 {
        let v: Vec<f64> = (0..100).map(|_| rng.random_range(-1.0..1.0)).collect();
        cosine.add(ColumnKey::new("emb", i).unwrap(), &v).unwrap();
    }
    cosine.index();
    let probe: Vec<Vec<f64>> = (0..3)
        .map(|_| (0..100).map(|_| rng.random_range(-1.0..1.0)).collect())
        .collect();
    let ck = cosine.inner().params().k;
    group.bench_function("cosine_full_prefix", |b| {
        b.iter(|| black_box(cosine.query(&probe).unwrap().down_to(ck).count()));
    });

    group.finish();
}

fn benchmark_significance(c: &mut Criterion) {
    let mut group = c.benchmark_group("same_domain_prob");

    for size in [100usize, 10_000, 1_000_000].iter() {
        group.bench_with_input(BenchmarkId::new("unionx", size), size, |b, &size| {
            b.iter(|| black_box(same_domain_prob(black_box(0.3), size, size / 2)));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_signature,
    benchmark_build,
    benchmark_query,
    benchmark_significance
);
criterion_main!(benches);
