//! Reciprocal Rank Fusion. Deterministic given identical input lists:
//! `score(id) = Σ_lists 1 / (k + rank)`, ranks starting at 1, ties broken
//! by descending score then lexicographic id.

/// Default `k` constant.
pub const DEFAULT_RRF_K: f64 = 60.0;

/// Fuse ranked id lists into one ranking.
pub fn fuse(lists: &[Vec<String>], k: f64) -> Vec<(String, f64)> {
    let mut scores: std::collections::BTreeMap<String, f64> = std::collections::BTreeMap::new();
    for list in lists {
        for (rank, id) in list.iter().enumerate() {
            *scores.entry(id.clone()).or_default() += 1.0 / (k + (rank + 1) as f64);
        }
    }
    let mut fused: Vec<(String, f64)> = scores.into_iter().collect();
    // BTreeMap iteration already yields lexicographic order, so a stable
    // sort by descending score leaves ties id-ordered.
    fused.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    fused
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn rotated_lists_tie_and_break_lexicographically() {
        let lists = vec![ids(&["A", "B", "C"]), ids(&["B", "C", "A"]), ids(&["C", "A", "B"])];
        let fused = fuse(&lists, DEFAULT_RRF_K);
        let order: Vec<&str> = fused.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(order, vec!["A", "B", "C"]);
        assert!((fused[0].1 - fused[1].1).abs() < 1e-12);
        assert!((fused[1].1 - fused[2].1).abs() < 1e-12);
    }

    #[test]
    fn agreement_on_first_place_wins() {
        let lists = vec![ids(&["X", "Y"]), ids(&["X", "Z"]), ids(&["Y", "X"])];
        let fused = fuse(&lists, DEFAULT_RRF_K);
        assert_eq!(fused[0].0, "X");
    }

    #[test]
    fn fusion_is_deterministic() {
        let lists = vec![ids(&["m", "n", "o"]), ids(&["o", "m"])];
        assert_eq!(fuse(&lists, 60.0), fuse(&lists, 60.0));
    }

    #[test]
    fn empty_input_fuses_to_empty() {
        assert!(fuse(&[], DEFAULT_RRF_K).is_empty());
        assert!(fuse(&[Vec::new()], DEFAULT_RRF_K).is_empty());
    }
}
