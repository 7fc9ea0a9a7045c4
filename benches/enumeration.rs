use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use qjoin_core::prelude::*;
use qjoin_planner::{optimize, JoinRequest, JoinStage, RelationDecl};

fn make_chain(n: usize) -> (JoinRequest, InMemoryCatalog) {
    let mut req = JoinRequest::new();
    let mut catalog = InMemoryCatalog::new();
    for i in 0..n {
        let (a, b) = (format!("f{i}"), format!("f{}", i + 1));
        req = req.relation(RelationDecl::new(format!("r{i}"), &[a.as_str(), b.as_str()]));
        catalog.add_relation(format!("r{i}"), 100 + 37 * i as u64);
    }
    for i in 1..n {
        let f = format!("f{i}");
        req = req.stage(JoinStage::new(&format!("r{}", i - 1), &f, &format!("r{i}"), &f));
    }
    (req, catalog)
}

/// Every relation joins on `k`; the implied edges make a clique.
fn make_clique(n: usize) -> (JoinRequest, InMemoryCatalog) {
    let mut req = JoinRequest::new();
    let mut catalog = InMemoryCatalog::new();
    for i in 0..n {
        req = req.relation(RelationDecl::new(format!("r{i}"), &["k"]));
        catalog.add_relation(format!("r{i}"), 50 + 11 * i as u64);
    }
    for i in 1..n {
        req = req.stage(JoinStage::new(&format!("r{}", i - 1), "k", &format!("r{i}"), "k"));
    }
    (req, catalog)
}

fn bench_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("chain");
    for n in [8, 12, 16] {
        let (req, catalog) = make_chain(n);
        let cfg = EnumerationConfig {
            tree_shape: TreeShape::Bushy,
            ..Default::default()
        };
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| optimize(&req, &catalog, &NoRows, &cfg, &CancelToken::new()).unwrap())
        });
    }
    group.finish();
}

fn bench_clique(c: &mut Criterion) {
    let mut group = c.benchmark_group("clique");
    for shape in [TreeShape::LeftDeep, TreeShape::ZigZag, TreeShape::Bushy] {
        let (req, catalog) = make_clique(8);
        let cfg = EnumerationConfig {
            tree_shape: shape,
            ..Default::default()
        };
        group.bench_with_input(BenchmarkId::from_parameter(shape), &shape, |b, _| {
            b.iter(|| optimize(&req, &catalog, &NoRows, &cfg, &CancelToken::new()).unwrap())
        });
    }
    group.finish();
}

criterion_group!(enumeration, bench_chain, bench_clique);
criterion_main!(enumeration);
