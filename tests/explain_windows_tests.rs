//! Subset-level windows: which levels are reported in ALL-plans mode must
//! never change the plan that wins.

use qjoin_core::cancel::CancelToken;
use qjoin_core::config::{EnumerationConfig, TreeShape};
use qjoin_exec::Executor;
use qjoin_io::MemoryStore;
use qjoin_planner::{optimize, FallbackReason, JoinRequest, JoinStage, RelationDecl};

/// Four relations joined on the same field through three stages. The
/// implicit edges make the graph a clique.
fn clique() -> (MemoryStore, JoinRequest) {
    let store = MemoryStore::new();
    let sizes = [("r1", 40, 10), ("r2", 25, 5), ("r3", 60, 20), ("r4", 8, 8)];
    for (name, rows, modulo) in sizes {
        store
            .insert_rows(name, &["k", "v"], (0..rows).map(|i| vec![i % modulo, i]).collect())
            .unwrap();
    }
    let request = JoinRequest::new()
        .relation(RelationDecl::new("r1", &["k", "v"]))
        .relation(RelationDecl::new("r2", &["k", "v"]))
        .relation(RelationDecl::new("r3", &["k", "v"]))
        .relation(RelationDecl::new("r4", &["k", "v"]))
        .stage(JoinStage::new("r1", "k", "r2", "k"))
        .stage(JoinStage::new("r2", "k", "r3", "k"))
        .stage(JoinStage::new("r3", "k", "r4", "k"));
    (store, request)
}

fn seeded(min: usize, max: usize) -> EnumerationConfig {
    EnumerationConfig {
        sampling_seed: Some(2024),
        sampling_size: 16,
        ..Default::default()
    }
    .with_window(min, max)
}

/// Rows the full join returns, computed directly.
fn expected_rows() -> usize {
    // k in 0..5 appears in every relation; count matches per key.
    let count = |rows: i64, modulo: i64, k: i64| (0..rows).filter(|i| i % modulo == k).count();
    (0..5)
        .map(|k| count(40, 10, k) * count(25, 5, k) * count(60, 20, k) * count(8, 8, k))
        .sum()
}

#[test]
fn test_winning_order_is_identical_across_windows() {
    let (store, request) = clique();
    let catalog = store.snapshot().unwrap();

    let windows = [(0, 1), (1, 2), (2, 3), (3, 4), (0, 4)];
    let mut winners = Vec::new();
    for (min, max) in windows {
        let out = optimize(&request, &catalog, &store, &seeded(min, max), &CancelToken::new()).unwrap();
        let w = &out.report.winning_plan;
        assert!(w.join_optimization_used, "window [{min}, {max}]");
        assert_eq!(w.fallback_reason, None);
        assert_eq!(w.join_order.len(), 4);
        assert!(out.report.stats.complete);
        winners.push((w.join_order.clone(), w.join_tree.clone(), w.fingerprint.clone()));
    }
    for other in &winners[1..] {
        assert_eq!(other, &winners[0]);
    }
}

#[test]
fn test_default_sampling_gives_one_winner_for_every_window() {
    // Every relation is larger than the sample, so estimates come from sampling.
    let store = MemoryStore::new();
    let sizes = [("r1", 4000, 10), ("r2", 2500, 5), ("r3", 6000, 20), ("r4", 800, 8)];
    for (name, rows, modulo) in sizes {
        store
            .insert_rows(name, &["k", "v"], (0..rows).map(|i| vec![i % modulo, i]).collect())
            .unwrap();
    }
    let (_, request) = clique();
    let catalog = store.snapshot().unwrap();

    let mut winners = Vec::new();
    for (min, max) in [(0, 1), (1, 2), (2, 3), (3, 4), (0, 4)] {
        let cfg = EnumerationConfig {
            sampling_size: 16,
            ..Default::default()
        }
        .with_window(min, max);
        assert_eq!(cfg.sampling_seed, None);
        for _ in 0..5 {
            let out = optimize(&request, &catalog, &store, &cfg, &CancelToken::new()).unwrap();
            let w = &out.report.winning_plan;
            assert!(w.join_optimization_used, "window [{min}, {max}]");
            winners.push((w.join_order.clone(), w.join_tree.clone(), w.fingerprint.clone()));
        }
    }
    winners.dedup();
    assert_eq!(winners.len(), 1, "{winners:?}");
}

#[test]
fn test_window_only_changes_rejected_plans() {
    let (store, request) = clique();
    let catalog = store.snapshot().unwrap();

    let low = optimize(&request, &catalog, &store, &seeded(0, 1), &CancelToken::new()).unwrap();
    let high = optimize(&request, &catalog, &store, &seeded(3, 4), &CancelToken::new()).unwrap();

    assert!(low.report.rejected_plans.iter().all(|p| p.level <= 1));
    assert!(high.report.rejected_plans.iter().all(|p| p.level == 3));
    assert!(!high.report.rejected_plans.is_empty());
    // Sorted most-complete first, then cheapest.
    for pair in low.report.rejected_plans.windows(2) {
        assert!(pair[0].level > pair[1].level || pair[0].cost <= pair[1].cost);
    }
}

#[test]
fn test_every_window_executes_to_the_same_rows() {
    let (store, request) = clique();
    let catalog = store.snapshot().unwrap();
    let exec = Executor::new(&store);
    let expected = expected_rows();

    for (min, max) in [(0, 1), (2, 3), (0, 4)] {
        let out = optimize(&request, &catalog, &store, &seeded(min, max), &CancelToken::new()).unwrap();
        assert_eq!(exec.run(&out.graph, &out.plan).unwrap().rows, expected);
    }
}

#[test]
fn test_unreachable_window_falls_back_to_default_plan() {
    let (store, request) = clique();
    let catalog = store.snapshot().unwrap();

    let out = optimize(&request, &catalog, &store, &seeded(64, 64), &CancelToken::new()).unwrap();
    let w = &out.report.winning_plan;
    assert!(!w.join_optimization_used);
    assert_eq!(w.fallback_reason, Some(FallbackReason::UnreachableWindow));
    assert_eq!(w.join_order, vec!["r1", "r2", "r3", "r4"]);
    assert_eq!(w.cardinality_estimate, None);
    assert!(out.report.rejected_plans.is_empty());

    let summary = Executor::new(&store).run(&out.graph, &out.plan).unwrap();
    assert_eq!(summary.rows, expected_rows());
}

#[test]
fn test_windows_agree_for_every_tree_shape() {
    let (store, request) = clique();
    let catalog = store.snapshot().unwrap();

    for shape in [TreeShape::LeftDeep, TreeShape::ZigZag, TreeShape::Bushy] {
        let run = |min, max| {
            let cfg = EnumerationConfig {
                tree_shape: shape,
                ..seeded(min, max)
            };
            optimize(&request, &catalog, &store, &cfg, &CancelToken::new())
                .unwrap()
                .report
                .winning_plan
                .join_tree
        };
        assert_eq!(run(0, 0), run(0, 4), "{shape}");
    }
}

#[test]
fn test_markdown_lists_winner_and_rejected_total() {
    let (store, request) = clique();
    let catalog = store.snapshot().unwrap();
    let out = optimize(&request, &catalog, &store, &seeded(0, 4), &CancelToken::new()).unwrap();

    let md = out.report.to_markdown(2);
    assert!(md.contains("### Winning plan"));
    assert!(md.contains(&out.report.winning_plan.join_tree));
    let total = format!("### Rejected plans (total: {})", out.report.rejected_plans.len());
    assert!(md.contains(&total));
}
