//! Property tests for rank fusion: determinism, bounded scores, and
//! permutation-stable tie-breaking.

use proptest::prelude::*;

use lattice_query::rrf;

fn id_strategy() -> impl Strategy<Value = String> {
    "[a-f]{1,3}"
}

fn list_strategy() -> impl Strategy<Value = Vec<String>> {
    proptest::collection::vec(id_strategy(), 0..12).prop_map(|mut ids| {
        ids.sort();
        ids.dedup();
        ids
    })
}

proptest! {
    #[test]
    fn fusion_is_deterministic(lists in proptest::collection::vec(list_strategy(), 0..4)) {
        prop_assert_eq!(rrf::fuse(&lists, 60.0), rrf::fuse(&lists, 60.0));
    }

    #[test]
    fn every_input_id_appears_exactly_once(lists in proptest::collection::vec(list_strategy(), 0..4)) {
        let fused = rrf::fuse(&lists, 60.0);
        let mut fused_ids: Vec<&String> = fused.iter().map(|(id, _)| id).collect();
        fused_ids.sort();
        fused_ids.dedup();
        prop_assert_eq!(fused_ids.len(), fused.len(), "no id may appear twice");

        let mut input_ids: Vec<&String> = lists.iter().flatten().collect();
        input_ids.sort();
        input_ids.dedup();
        prop_assert_eq!(input_ids.len(), fused.len());
    }

    #[test]
    fn scores_are_positive_and_bounded(lists in proptest::collection::vec(list_strategy(), 1..4)) {
        let k = 60.0;
        let fused = rrf::fuse(&lists, k);
        let max_possible = lists.len() as f64 / (k + 1.0);
        for (_, score) in fused {
            prop_assert!(score > 0.0);
            prop_assert!(score <= max_possible + 1e-12);
        }
    }

    #[test]
    fn ranking_is_monotone_in_score(lists in proptest::collection::vec(list_strategy(), 0..4)) {
        let fused = rrf::fuse(&lists, 60.0);
        for pair in fused.windows(2) {
            prop_assert!(pair[0].1 >= pair[1].1);
            if (pair[0].1 - pair[1].1).abs() < 1e-15 {
                prop_assert!(pair[0].0 < pair[1].0, "ties must break lexicographically");
            }
        }
    }
}
