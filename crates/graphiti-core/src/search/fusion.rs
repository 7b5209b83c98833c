/*
Copyright 2024, Zep Software, Inc.

Licensed under the Apache License, Version 2.0 (the "License");
you may not use this file except in compliance with the License.
You may obtain a copy of the License at

    http://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing, software
distributed under the License is distributed on an "AS IS" BASIS,
WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
See the License for the specific language governing permissions and
limitations under the License.
*/

//! Fusion and reranking of per-method search results into a single ranked list.
//!
//! Every search kind (nodes, edges, episodes, communities) runs one or more independent
//! search methods (similarity, full-text, BFS) and ends up with several separately-ranked
//! candidate lists. The functions here combine those into one list according to whichever
//! reranker the kind's config selects.

use std::cmp::Ordering;
use std::collections::HashMap;

use uuid::Uuid;

use crate::search::utils::cosine_similarity;

const RRF_K: f64 = 60.0;

/// Reciprocal rank fusion over however many per-method ranked lists a search produced.
/// Each list is assumed sorted best-first; ties in the fused score are broken by UUID,
/// lexicographically, so the result is deterministic regardless of input order.
pub fn reciprocal_rank_fusion(ranked_lists: &[Vec<Uuid>]) -> HashMap<Uuid, f64> {
    let mut scores: HashMap<Uuid, f64> = HashMap::new();
    for list in ranked_lists {
        for (rank, uuid) in list.iter().enumerate() {
            *scores.entry(*uuid).or_insert(0.0) += 1.0 / (RRF_K + (rank + 1) as f64);
        }
    }
    scores
}

/// Order candidates by fused RRF score, breaking ties by UUID lexicographic order.
pub fn rrf_order(ranked_lists: &[Vec<Uuid>]) -> Vec<Uuid> {
    let scores = reciprocal_rank_fusion(ranked_lists);
    let mut uuids: Vec<Uuid> = scores.keys().copied().collect();
    uuids.sort_by(|a, b| {
        scores[b]
            .partial_cmp(&scores[a])
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.to_string().cmp(&b.to_string()))
    });
    uuids
}

/// Greedy maximal-marginal-relevance selection: repeatedly pick whichever remaining
/// candidate maximizes `lambda * relevance - (1 - lambda) * max_similarity_to_selected`.
/// Candidates with no embedding are treated as maximally novel (never penalized) and keep
/// their relative relevance order among themselves.
pub fn mmr_order(candidates: Vec<(Uuid, f64, Option<Vec<f32>>)>, lambda: f64, limit: usize) -> Vec<Uuid> {
    let mut remaining = candidates;
    remaining.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));

    let mut selected: Vec<(Uuid, Option<Vec<f32>>)> = Vec::new();
    while !remaining.is_empty() && selected.len() < limit {
        let mut best_idx = 0;
        let mut best_score = f64::NEG_INFINITY;
        for (idx, (_, relevance, embedding)) in remaining.iter().enumerate() {
            let novelty_penalty = match embedding {
                Some(vec) => selected
                    .iter()
                    .filter_map(|(_, sel_embedding)| sel_embedding.as_ref())
                    .map(|sel_vec| cosine_similarity(vec, sel_vec))
                    .fold(0.0_f64, f64::max),
                None => 0.0,
            };
            let mmr_score = lambda * relevance - (1.0 - lambda) * novelty_penalty;
            if mmr_score > best_score {
                best_score = mmr_score;
                best_idx = idx;
            }
        }
        let (uuid, _, embedding) = remaining.remove(best_idx);
        selected.push((uuid, embedding));
    }

    selected.into_iter().map(|(uuid, _)| uuid).collect()
}

/// Order candidates by ascending graph distance from a center node, falling back to the
/// fused relevance score as a tie-break. Candidates with unknown distance (unreachable,
/// or no center node supplied) sort after every reachable one.
pub fn node_distance_order(
    candidates: &[Uuid],
    distances: &HashMap<Uuid, usize>,
    fused_scores: &HashMap<Uuid, f64>,
) -> Vec<Uuid> {
    let mut ordered = candidates.to_vec();
    ordered.sort_by(|a, b| {
        let dist_a = distances.get(a).copied().unwrap_or(usize::MAX);
        let dist_b = distances.get(b).copied().unwrap_or(usize::MAX);
        dist_a.cmp(&dist_b).then_with(|| {
            let score_a = fused_scores.get(a).copied().unwrap_or(0.0);
            let score_b = fused_scores.get(b).copied().unwrap_or(0.0);
            score_b.partial_cmp(&score_a).unwrap_or(Ordering::Equal)
        })
    });
    ordered
}

/// Order candidates by descending episode-mention count, falling back to the fused
/// relevance score as a tie-break.
pub fn episode_mentions_order(
    candidates: &[Uuid],
    mention_counts: &HashMap<Uuid, usize>,
    fused_scores: &HashMap<Uuid, f64>,
) -> Vec<Uuid> {
    let mut ordered = candidates.to_vec();
    ordered.sort_by(|a, b| {
        let count_a = mention_counts.get(a).copied().unwrap_or(0);
        let count_b = mention_counts.get(b).copied().unwrap_or(0);
        count_b.cmp(&count_a).then_with(|| {
            let score_a = fused_scores.get(a).copied().unwrap_or(0.0);
            let score_b = fused_scores.get(b).copied().unwrap_or(0.0);
            score_b.partial_cmp(&score_a).unwrap_or(Ordering::Equal)
        })
    });
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uuid_n(n: u128) -> Uuid {
        Uuid::from_u128(n)
    }

    #[test]
    fn rrf_prefers_items_ranked_highly_across_lists() {
        let a = uuid_n(1);
        let b = uuid_n(2);
        let c = uuid_n(3);
        let lists = vec![vec![a, b, c], vec![b, a, c]];
        let order = rrf_order(&lists);
        assert_eq!(order[0], a);
        assert_eq!(order[1], b);
        assert_eq!(order[2], c);
    }

    #[test]
    fn rrf_breaks_ties_by_uuid() {
        let a = uuid_n(1);
        let b = uuid_n(2);
        let lists = vec![vec![a, b], vec![b, a]];
        let order = rrf_order(&lists);
        // both tie on fused score; lexicographically smaller uuid string wins
        let expected_first = if a.to_string() < b.to_string() { a } else { b };
        assert_eq!(order[0], expected_first);
    }

    #[test]
    fn mmr_prefers_relevance_then_novelty() {
        let a = uuid_n(1);
        let b = uuid_n(2);
        let c = uuid_n(3);
        let candidates = vec![
            (a, 0.9, Some(vec![1.0, 0.0])),
            (b, 0.85, Some(vec![1.0, 0.0])), // near-duplicate of a
            (c, 0.5, Some(vec![0.0, 1.0])),  // novel direction
        ];
        let order = mmr_order(candidates, 0.5, 3);
        assert_eq!(order[0], a);
        // c should outrank b despite lower raw relevance, since b duplicates a
        assert_eq!(order[1], c);
    }

    #[test]
    fn node_distance_orders_by_closeness() {
        let a = uuid_n(1);
        let b = uuid_n(2);
        let mut distances = HashMap::new();
        distances.insert(a, 2);
        distances.insert(b, 1);
        let fused = HashMap::new();
        let order = node_distance_order(&[a, b], &distances, &fused);
        assert_eq!(order, vec![b, a]);
    }
}
