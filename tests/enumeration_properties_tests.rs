//! Structural properties of enumeration that hold for any input graph.

use qjoin_core::cancel::CancelToken;
use qjoin_core::catalog::{IndexDef, InMemoryCatalog};
use qjoin_core::config::{EnumerationConfig, TreeShape};
use qjoin_core::id::PlanId;
use qjoin_core::store::NoRows;
use qjoin_io::MemoryStore;
use qjoin_planner::enumerate::enumerate;
use qjoin_planner::estimate::CardinalityEstimator;
use qjoin_planner::plan::PlanShape;
use qjoin_planner::{optimize, JoinGraph, JoinRequest, JoinStage, RelationDecl};

/// `r0 - r1 - ... - r{n-1}`, each pair on its own field so no implicit
/// edges appear.
fn chain(n: usize) -> (JoinRequest, InMemoryCatalog) {
    let mut req = JoinRequest::new();
    let mut catalog = InMemoryCatalog::new();
    for i in 0..n {
        let fields = [format!("f{i}"), format!("f{}", i + 1)];
        let fields: Vec<&str> = fields.iter().map(String::as_str).collect();
        req = req.relation(RelationDecl::new(&format!("r{i}"), &fields));
        catalog.add_relation(format!("r{i}"), 10 * (i as u64 + 1) * (i as u64 % 3 + 1));
    }
    for i in 1..n {
        let field = format!("f{i}");
        req = req.stage(JoinStage::new(&format!("r{}", i - 1), &field, &format!("r{i}"), &field));
    }
    (req, catalog)
}

/// Star: `hub` joins every spoke on a distinct field; spokes have lookup indexes.
fn star(spokes: usize) -> (JoinRequest, InMemoryCatalog) {
    let hub_fields: Vec<String> = (0..spokes).map(|i| format!("s{i}")).collect();
    let hub_refs: Vec<&str> = hub_fields.iter().map(String::as_str).collect();
    let mut req = JoinRequest::new().relation(RelationDecl::new("hub", &hub_refs));
    let mut catalog = InMemoryCatalog::new();
    catalog.add_relation("hub", 5000);
    for (i, field) in hub_fields.iter().enumerate() {
        let name = format!("spoke{i}");
        req = req
            .relation(RelationDecl::new(&name, &[field.as_str()]))
            .stage(JoinStage::new("hub", field, &name, field));
        catalog.add_relation(name.clone(), 20 + 30 * i as u64);
        catalog.add_index(&name, IndexDef::new(&[field.as_str()], true));
    }
    (req, catalog)
}

fn for_each_shape(mut f: impl FnMut(TreeShape)) {
    for shape in [TreeShape::LeftDeep, TreeShape::ZigZag, TreeShape::Bushy] {
        f(shape);
    }
}

#[test]
fn test_every_enumerated_plan_covers_a_connected_set() {
    for (req, catalog) in [chain(6), star(4)] {
        let graph = JoinGraph::build(&req).unwrap();
        for_each_shape(|shape| {
            let cfg = EnumerationConfig {
                tree_shape: shape,
                ..Default::default()
            }
            .with_window(0, graph.len());
            let mut est =
                CardinalityEstimator::new(&graph, &catalog, &NoRows, &cfg, &CancelToken::new()).unwrap();
            let e = enumerate(&mut est, &cfg, &CancelToken::new()).unwrap();

            for i in 0..e.arena.len() {
                let node = e.arena.get(PlanId::new(i as u32));
                assert!(graph.is_connected(node.set), "{shape}: {}", node.set);
                assert_eq!(node.order.len(), node.set.len());
                if let PlanShape::Join { left, right, .. } = node.shape {
                    let (l, r) = (e.arena.get(left), e.arena.get(right));
                    assert!(l.set.is_disjoint(r.set));
                    assert_eq!(l.set.union(r.set), node.set);
                    // No join is cheaper than producing its outer input.
                    assert!(node.cost >= l.cost, "{shape}: {}", e.arena.render(PlanId::new(i as u32), &graph));
                }
            }
        });
    }
}

#[test]
fn test_chain_enumerates_exactly_its_connected_subsets() {
    let (req, catalog) = chain(6);
    let graph = JoinGraph::build(&req).unwrap();
    let cfg = EnumerationConfig::default();
    let mut est = CardinalityEstimator::new(&graph, &catalog, &NoRows, &cfg, &CancelToken::new()).unwrap();
    let e = enumerate(&mut est, &cfg, &CancelToken::new()).unwrap();

    // A chain of n relations has n(n+1)/2 contiguous runs.
    assert_eq!(e.table.len(), 21);
    assert_eq!(e.stats.subsets_explored, 21);
    assert_eq!(e.stats.levels_completed, 6);
    assert!(e.stats.complete);
}

#[test]
fn test_left_deep_plans_keep_base_relations_on_the_right() {
    let (req, catalog) = star(4);
    let cfg = EnumerationConfig {
        tree_shape: TreeShape::LeftDeep,
        ..Default::default()
    };
    let out = optimize(&req, &catalog, &NoRows, &cfg, &CancelToken::new()).unwrap();
    let mut tree = &out.plan.tree;
    while let qjoin_planner::PlanTree::Join { left, right, .. } = tree {
        assert!(matches!(**right, qjoin_planner::PlanTree::Scan { .. }));
        tree = left.as_ref();
    }
}

#[test]
fn test_exact_estimates_ignore_sampling_settings() {
    let store = MemoryStore::new();
    store
        .insert_rows("facts", &["d"], (0..500).map(|i| vec![i % 50]).collect())
        .unwrap();
    store
        .insert_rows("dims", &["d"], (0..50).map(|i| vec![i]).collect())
        .unwrap();
    store.create_index("dims", IndexDef::new(&["d"], true)).unwrap();
    let req = JoinRequest::new()
        .relation(RelationDecl::new("facts", &["d"]))
        .relation(RelationDecl::new("dims", &["d"]))
        .stage(JoinStage::new("facts", "d", "dims", "d"));
    let catalog = store.snapshot().unwrap();

    let mut seen = Vec::new();
    for (sampling_size, seed) in [(1, None), (7, Some(1)), (5000, Some(2)), (100, None)] {
        let cfg = EnumerationConfig {
            sampling_size,
            sampling_seed: seed,
            ..Default::default()
        };
        let out = optimize(&req, &catalog, &store, &cfg, &CancelToken::new()).unwrap();
        seen.push((
            out.report.winning_plan.join_tree.clone(),
            out.report.winning_plan.cardinality_estimate,
        ));
    }
    assert!(seen.iter().all(|s| s == &seen[0]));
    assert_eq!(seen[0].1, Some(500));
}

#[test]
fn test_same_input_gives_same_report() {
    let (req, catalog) = star(5);
    let cfg = EnumerationConfig::default().with_window(0, 5);
    let a = optimize(&req, &catalog, &NoRows, &cfg, &CancelToken::new()).unwrap();
    let b = optimize(&req, &catalog, &NoRows, &cfg, &CancelToken::new()).unwrap();
    assert_eq!(a.report.winning_plan, b.report.winning_plan);
    assert_eq!(a.report.rejected_plans, b.report.rejected_plans);
    assert_eq!(a.report.edge_estimates, b.report.edge_estimates);
}

#[test]
fn test_concurrent_requests_share_one_snapshot() {
    let (req, catalog) = star(4);
    let snapshot = catalog.into_snapshot();
    let cfg = EnumerationConfig::default();
    let expected = optimize(&req, snapshot.as_ref(), &NoRows, &cfg, &CancelToken::new())
        .unwrap()
        .report
        .winning_plan
        .join_tree;

    std::thread::scope(|s| {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                s.spawn(|| {
                    optimize(&req, snapshot.as_ref(), &NoRows, &cfg, &CancelToken::new())
                        .unwrap()
                        .report
                        .winning_plan
                        .join_tree
                })
            })
            .collect();
        for h in handles {
            assert_eq!(h.join().unwrap(), expected);
        }
    });
}
