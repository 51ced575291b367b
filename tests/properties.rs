use approx::assert_relative_eq;
use proptest::prelude::*;

use keepgen::codegen::{leaf_ratio, serialize_tree, Resolver};
use keepgen::config::HostBinding;
use keepgen::{ClusterModel, FittedEnsemble, FittedModel, FittedTree};

/// Complete tree of `depth` levels laid out in preorder.
fn complete_tree(depth: usize, thresholds: &[f64], leaves: &[(u32, u32)]) -> FittedTree {
    struct Arrays {
        left: Vec<i64>,
        right: Vec<i64>,
        feature: Vec<i64>,
        threshold: Vec<f64>,
        value: Vec<Vec<f64>>,
        next_threshold: usize,
        next_leaf: usize,
    }

    fn grow(a: &mut Arrays, depth: usize, thresholds: &[f64], leaves: &[(u32, u32)]) -> i64 {
        let id = a.left.len();
        a.left.push(-1);
        a.right.push(-1);
        a.feature.push(-2);
        a.threshold.push(-2.0);
        if depth == 0 {
            let (discard, keep) = leaves[a.next_leaf % leaves.len()];
            a.next_leaf += 1;
            a.value.push(vec![discard as f64, keep as f64]);
            return id as i64;
        }
        a.value.push(vec![0.0, 0.0]);
        a.feature[id] = (depth % 3) as i64;
        a.threshold[id] = thresholds[a.next_threshold % thresholds.len()];
        a.next_threshold += 1;
        let l = grow(a, depth - 1, thresholds, leaves);
        let r = grow(a, depth - 1, thresholds, leaves);
        a.left[id] = l;
        a.right[id] = r;
        id as i64
    }

    let mut a = Arrays {
        left: Vec::new(),
        right: Vec::new(),
        feature: Vec::new(),
        threshold: Vec::new(),
        value: Vec::new(),
        next_threshold: 0,
        next_leaf: 0,
    };
    grow(&mut a, depth, thresholds, leaves);
    FittedTree::from_arrays(a.left, a.right, a.feature, a.threshold, a.value).unwrap()
}

fn feature_names() -> Vec<String> {
    ["cl.glue", "rdb0.act_ranking", "rdb1.sum_uip1_used"].iter().map(|s| s.to_string()).collect()
}

fn tree_strategy() -> impl Strategy<Value = FittedTree> {
    (
        0usize..5,
        prop::collection::vec(-1.0e6f64..1.0e6, 1..16),
        prop::collection::vec((0u32..50, 0u32..50), 1..32),
    )
        .prop_map(|(depth, thresholds, leaves)| complete_tree(depth, &thresholds, &leaves))
}

proptest! {
    #[test]
    fn resolver_is_idempotent(
        prefix in prop::sample::select(vec!["", "cl.", "rdb0.", "rdb1.", "rdb12.", "x."]),
        body in "[a-z][a-z0-9_.]{0,20}",
    ) {
        let resolver = Resolver::for_host(&HostBinding::default());
        let once = resolver.resolve(&format!("{}{}", prefix, body));
        prop_assert_eq!(resolver.resolve(&once), once.clone());
        prop_assert!(!once.contains("rdb0.") && !once.contains("rdb1."));
    }

    #[test]
    fn shape_resolver_is_idempotent(body in "(red_|irred_)?[a-zA-Z][a-zA-Z0-9_]{0,16}") {
        let resolver = Resolver::shape_features();
        let once = resolver.resolve(&format!("szfeat_cur.{}", body));
        prop_assert_eq!(resolver.resolve(&once), once.clone());
    }

    #[test]
    fn serializer_is_deterministic(tree in tree_strategy()) {
        let names = feature_names();
        let host = HostBinding::default();
        let first = serialize_tree(&tree, &names, "estimator_p_0", &host, 0).unwrap();
        let second = serialize_tree(&tree, &names, "estimator_p_0", &host, 0).unwrap();
        prop_assert_eq!(&first, &second);
        prop_assert_eq!(first.matches("return ").count(), tree.leaf_count());
        prop_assert_eq!(first.matches("if ( ").count(), tree.node_count() - tree.leaf_count());
    }

    #[test]
    fn compiled_keep_is_a_majority_of_leaf_votes(
        trees in prop::collection::vec(tree_strategy(), 1..6),
        row in prop::collection::vec(-2.0e6f64..2.0e6, 3),
    ) {
        let model = FittedModel::Ensemble(FittedEnsemble::new(trees.clone()).unwrap());
        let votes = trees
            .iter()
            .filter(|t| leaf_ratio(t.distribution(t.leaf_for(&row))) < 1.0)
            .count();
        prop_assert_eq!(model.compiled_keep(&row), 2 * votes >= trees.len());
    }

    #[test]
    fn router_picks_a_nearest_center(
        centers in prop::collection::vec(prop::collection::vec(-100.0f64..100.0, 2), 1..8),
        point in prop::collection::vec(-100.0f64..100.0, 2),
    ) {
        let model = ClusterModel::new(centers.clone()).unwrap();
        let chosen = model.which_is_closest(&point).unwrap();
        let dist = |c: &[f64]| c.iter().zip(&point).map(|(a, b)| (a - b) * (a - b)).sum::<f64>();
        let best = centers.iter().map(|c| dist(c.as_slice())).fold(f64::INFINITY, f64::min);
        assert_relative_eq!(dist(centers[chosen].as_slice()), best);
        prop_assert!(centers[..chosen].iter().all(|c| dist(c.as_slice()) > best));
    }
}
