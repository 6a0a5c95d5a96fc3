use proptest::prelude::*;

use mdrag_core::types::{ChunkMetadata, RankedCandidate};
use mdrag_hybrid::fusion::{reciprocal_rank_fusion, DEFAULT_RRF_K};

fn meta() -> ChunkMetadata {
    ChunkMetadata { source: "p.md".into(), headers: vec![], position: 0, sub_position: None }
}

fn dense_list(ids: &[u8]) -> Vec<RankedCandidate> {
    ids.iter().enumerate().map(|(r, id)| RankedCandidate::dense(format!("c{id}"), String::new(), meta(), r as f32 / 10.0)).collect()
}

fn sparse_list(ids: &[u8]) -> Vec<RankedCandidate> {
    ids.iter().enumerate().map(|(r, id)| RankedCandidate::sparse(format!("c{id}"), String::new(), meta(), 100.0 - r as f32)).collect()
}

fn unique(ids: Vec<u8>) -> Vec<u8> {
    let mut seen = std::collections::HashSet::new();
    ids.into_iter().filter(|id| seen.insert(*id)).collect()
}

proptest! {
    #[test]
    fn fused_scores_are_sorted_and_keys_unique(
        dense in prop::collection::vec(0u8..20, 0..12).prop_map(unique),
        sparse in prop::collection::vec(0u8..20, 0..12).prop_map(unique),
        alpha in 0.0f64..=1.0,
        top_k in 1usize..15,
    ) {
        let fused = reciprocal_rank_fusion(&dense_list(&dense), &sparse_list(&sparse), alpha, DEFAULT_RRF_K, top_k).unwrap();
        prop_assert!(fused.len() <= top_k);
        prop_assert!(fused.windows(2).all(|w| w[0].fused_score >= w[1].fused_score));
        let mut keys: Vec<&str> = fused.iter().map(|f| f.candidate.id.as_str()).collect();
        keys.sort_unstable();
        keys.dedup();
        prop_assert_eq!(keys.len(), fused.len());
    }

    #[test]
    fn leading_both_lists_means_leading_the_fusion(
        rest in prop::collection::vec(1u8..20, 0..10).prop_map(unique),
        alpha in 0.01f64..0.99,
    ) {
        let mut dense = vec![0u8];
        dense.extend(&rest);
        let mut sparse = vec![0u8];
        sparse.extend(rest.iter().rev());
        let fused = reciprocal_rank_fusion(&dense_list(&dense), &sparse_list(&sparse), alpha, DEFAULT_RRF_K, 20).unwrap();
        prop_assert_eq!(fused[0].candidate.id.as_str(), "c0");
    }
}
