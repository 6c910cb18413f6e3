use criterion::{black_box, criterion_group, criterion_main, Criterion};

use lattice_query::rrf;

fn bench_fusion(c: &mut Criterion) {
    let lists: Vec<Vec<String>> = (0..3)
        .map(|offset| {
            (0..100)
                .map(|i| format!("proj:function:src/mod{}.ts:fn{}:0", (i + offset) % 40, i))
                .collect()
        })
        .collect();

    c.bench_function("rrf_fuse_3x100", |b| {
        b.iter(|| rrf::fuse(black_box(&lists), black_box(60.0)))
    });
}

criterion_group!(benches, bench_fusion);
criterion_main!(benches);
