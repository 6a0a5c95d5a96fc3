//! Weighted reciprocal rank fusion of a dense and a sparse candidate list.
//!
//! A candidate at 1-based rank `r` contributes `alpha / (k + r)` from the
//! dense list and `(1 - alpha) / (k + r)` from the sparse list.
use std::collections::HashMap;

use mdrag_core::error::{Error, Result};
use mdrag_core::types::{FusedResult, RankedCandidate, RetrievalType};

/// Conventional smoothing constant.
pub const DEFAULT_RRF_K: u32 = 60;

/// Fuse `dense` (ascending distance) and `sparse` (descending BM25), both
/// already in rank order. Returns at most `top_k` results by descending fused
/// score; equal scores keep first-seen order, dense list first. Each result
/// carries the candidate that introduced its key.
pub fn reciprocal_rank_fusion(
    dense: &[RankedCandidate],
    sparse: &[RankedCandidate],
    alpha: f64,
    k: u32,
    top_k: usize,
) -> Result<Vec<FusedResult>> {
    if !(0.0..=1.0).contains(&alpha) {
        return Err(Error::InvalidConfig(format!("fusion alpha must be within [0, 1], got {alpha}")));
    }

    let mut order: Vec<FusedResult> = Vec::with_capacity(dense.len() + sparse.len());
    let mut slots: HashMap<String, usize> = HashMap::new();

    for (list, weight) in [(dense, alpha), (sparse, 1.0 - alpha)] {
        for (rank, candidate) in list.iter().enumerate() {
            let contribution = weight / (f64::from(k) + (rank + 1) as f64);
            let key = candidate.fusion_key();
            let slot = *slots.entry(key).or_insert_with(|| {
                let mut introduced = candidate.clone();
                introduced.retrieval_type = RetrievalType::Hybrid;
                order.push(FusedResult { candidate: introduced, fused_score: 0.0, distance: None, bm25: None });
                order.len() - 1
            });
            let fused = &mut order[slot];
            fused.fused_score += contribution;
            if let Some(d) = candidate.score.distance() {
                fused.distance.get_or_insert(d);
            }
            if let Some(s) = candidate.score.bm25() {
                fused.bm25.get_or_insert(s);
            }
        }
    }

    // stable sort keeps first-seen order among ties
    order.sort_by(|a, b| b.fused_score.partial_cmp(&a.fused_score).unwrap_or(std::cmp::Ordering::Equal));
    order.truncate(top_k);
    Ok(order)
}
