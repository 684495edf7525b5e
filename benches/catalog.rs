//! Catalog Tree Benchmarks
//!
//! Builds trees the size of a large warehouse catalog and applies the
//! expansion policy.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use odbc_client::CatalogTree;

fn build(catalogs: usize, schemas: usize, tables: usize) -> CatalogTree {
    let mut tree = CatalogTree::new();
    for c in 0..catalogs {
        let catalog = format!("db{c}");
        for s in 0..schemas {
            let schema = format!("schema{s}");
            for t in 0..tables {
                let kind = if t % 10 == 0 { "VIEW" } else { "TABLE" };
                tree.add_table(Some(&catalog), Some(&schema), kind, &format!("table{t}"));
            }
            tree.add_table(Some(&catalog), Some(&schema), "SYSTEM TABLE", "sys_objects");
            tree.add_procedure(Some(&catalog), Some(&schema), "refresh;1");
        }
    }
    tree
}

fn bench_build(c: &mut Criterion) {
    c.bench_function("build_4x8x200", |b| {
        b.iter(|| build(black_box(4), black_box(8), black_box(200)));
    });
}

fn bench_expansion(c: &mut Criterion) {
    let tree = build(4, 8, 200);

    c.bench_function("apply_expansion_4x8x200", |b| {
        b.iter(|| {
            let mut tree = tree.clone();
            tree.apply_expansion();
            tree
        });
    });

    c.bench_function("render_4x8x200", |b| {
        b.iter(|| black_box(&tree).render());
    });
}

criterion_group!(benches, bench_build, bench_expansion);
criterion_main!(benches);
