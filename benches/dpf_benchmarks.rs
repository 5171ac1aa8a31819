use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::rngs::StdRng;
use rand::SeedableRng;

fn bench_dpf_generate(c: &mut Criterion) {
    let mut group = c.benchmark_group("dpf_generate");
    for depth in [8usize, 12, 16] {
        let size = 1u64 << depth;
        group.bench_with_input(BenchmarkId::from_parameter(depth), &size, |b, &size| {
            let mut rng = StdRng::seed_from_u64(42);
            b.iter(|| {
                let (k0, k1) =
                    dpf_tree_lib::generate(size, size / 2, black_box(1), &mut rng).unwrap();
                black_box((k0, k1))
            });
        });
    }
    group.finish();
}

fn bench_dpf_eval_full(c: &mut Criterion) {
    let mut group = c.benchmark_group("dpf_eval_full");
    for depth in [8usize, 10, 12] {
        let size = 1u64 << depth;
        let mut rng = StdRng::seed_from_u64(42);
        let (k0, _) = dpf_tree_lib::generate(size, size / 3, 1, &mut rng).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(depth), &k0, |b, key| {
            b.iter(|| black_box(key.eval_full()))
        });
    }
    group.finish();
}

fn bench_dpf_eval_point(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(42);
    let (k0, _) = dpf_tree_lib::generate(1 << 16, 12345, 1, &mut rng).unwrap();
    c.bench_function("dpf_eval_point_depth16", |b| {
        b.iter(|| black_box(k0.eval(black_box(54321)).unwrap()))
    });
}

criterion_group!(
    benches,
    bench_dpf_generate,
    bench_dpf_eval_full,
    bench_dpf_eval_point
);
criterion_main!(benches);
