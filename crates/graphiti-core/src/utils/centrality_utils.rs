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

//! Offline centrality precomputation: PageRank, degree, and betweenness over each
//! group's entity/`RELATES_TO` subgraph, stored on `EntityNode` for the search layer's
//! centrality boost (§4.6). Staleness between runs is acceptable, so this is a batch
//! job rather than something kept live as edges are added.

use std::collections::{HashMap, VecDeque};

use uuid::Uuid;

use crate::{
    errors::GraphitiError,
    nodes::{EntityNode, Node, NodeCentrality},
    types::GraphitiClients,
    utils::community_utils::{fetch_entity_adjacency, fetch_group_entities},
};

const PAGERANK_DAMPING: f64 = 0.85;
const PAGERANK_ITERATIONS: usize = 20;

/// Recompute and persist PageRank/degree/betweenness for every entity in the given
/// groups. Returns the refreshed nodes.
pub async fn compute_centrality(
    clients: &GraphitiClients,
    group_ids: &[String],
) -> Result<Vec<EntityNode>, GraphitiError> {
    let mut refreshed = Vec::new();

    for group_id in group_ids {
        let entities = fetch_group_entities(clients, group_id).await?;
        if entities.is_empty() {
            continue;
        }

        let adjacency = fetch_entity_adjacency(clients, group_id, &entities).await?;
        let pagerank = pagerank_scores(&entities, &adjacency);
        let degree = degree_scores(&entities, &adjacency);
        let betweenness = betweenness_scores(&entities, &adjacency);

        for mut entity in entities {
            let uuid = entity.base.uuid;
            entity.centrality = Some(NodeCentrality {
                pagerank: pagerank.get(&uuid).copied().unwrap_or(0.0),
                degree: degree.get(&uuid).copied().unwrap_or(0.0),
                betweenness: betweenness.get(&uuid).copied().unwrap_or(0.0),
            });
            entity.save(clients.database.as_ref()).await?;
            refreshed.push(entity);
        }
    }

    Ok(refreshed)
}

/// Degree centrality, normalized by the largest possible degree in the subgraph
/// (`n - 1`) so scores fall in `[0, 1]` regardless of graph size.
fn degree_scores(entities: &[EntityNode], adjacency: &HashMap<Uuid, Vec<Uuid>>) -> HashMap<Uuid, f64> {
    let max_degree = (entities.len().saturating_sub(1)).max(1) as f64;
    entities
        .iter()
        .map(|n| {
            let degree = adjacency.get(&n.base.uuid).map(|neighbors| neighbors.len()).unwrap_or(0);
            (n.base.uuid, degree as f64 / max_degree)
        })
        .collect()
}

/// Power-iteration PageRank over the undirected adjacency (each edge treated as a
/// reciprocal link), uniform teleportation, fixed iteration count.
fn pagerank_scores(entities: &[EntityNode], adjacency: &HashMap<Uuid, Vec<Uuid>>) -> HashMap<Uuid, f64> {
    let n = entities.len();
    if n == 0 {
        return HashMap::new();
    }

    let mut order: Vec<Uuid> = entities.iter().map(|e| e.base.uuid).collect();
    order.sort();

    let mut scores: HashMap<Uuid, f64> = order.iter().map(|u| (*u, 1.0 / n as f64)).collect();
    let base = (1.0 - PAGERANK_DAMPING) / n as f64;

    for _ in 0..PAGERANK_ITERATIONS {
        let mut next: HashMap<Uuid, f64> = order.iter().map(|u| (*u, base)).collect();

        for node in &order {
            let neighbors = match adjacency.get(node) {
                Some(ns) if !ns.is_empty() => ns,
                _ => continue,
            };
            let share = PAGERANK_DAMPING * scores[node] / neighbors.len() as f64;
            for neighbor in neighbors {
                *next.entry(*neighbor).or_insert(base) += share;
            }
        }

        scores = next;
    }

    scores
}

/// Brandes' algorithm for betweenness centrality on an unweighted, undirected graph,
/// normalized to `[0, 1]` by the number of ordered pairs excluding the node itself.
fn betweenness_scores(entities: &[EntityNode], adjacency: &HashMap<Uuid, Vec<Uuid>>) -> HashMap<Uuid, f64> {
    let n = entities.len();
    let mut betweenness: HashMap<Uuid, f64> = entities.iter().map(|e| (e.base.uuid, 0.0)).collect();
    if n < 3 {
        return betweenness;
    }

    for source in entities.iter().map(|e| e.base.uuid) {
        let mut stack = Vec::new();
        let mut predecessors: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        let mut sigma: HashMap<Uuid, f64> = entities.iter().map(|e| (e.base.uuid, 0.0)).collect();
        let mut distance: HashMap<Uuid, i64> = entities.iter().map(|e| (e.base.uuid, -1)).collect();

        sigma.insert(source, 1.0);
        distance.insert(source, 0);

        let mut queue = VecDeque::new();
        queue.push_back(source);

        while let Some(v) = queue.pop_front() {
            stack.push(v);
            let Some(neighbors) = adjacency.get(&v) else { continue };
            for &w in neighbors {
                if distance.get(&w).copied().unwrap_or(-1) < 0 {
                    distance.insert(w, distance[&v] + 1);
                    queue.push_back(w);
                }
                if distance.get(&w).copied().unwrap_or(-1) == distance[&v] + 1 {
                    *sigma.entry(w).or_insert(0.0) += sigma[&v];
                    predecessors.entry(w).or_default().push(v);
                }
            }
        }

        let mut delta: HashMap<Uuid, f64> = entities.iter().map(|e| (e.base.uuid, 0.0)).collect();
        while let Some(w) = stack.pop() {
            if let Some(preds) = predecessors.get(&w) {
                for &v in preds {
                    let contribution = (sigma[&v] / sigma[&w]) * (1.0 + delta[&w]);
                    *delta.entry(v).or_insert(0.0) += contribution;
                }
            }
            if w != source {
                *betweenness.entry(w).or_insert(0.0) += delta[&w];
            }
        }
    }

    // Each shortest path was counted once per direction in the undirected traversal.
    let normalizer = ((n - 1) * (n - 2)) as f64;
    for value in betweenness.values_mut() {
        *value /= normalizer.max(1.0) * 2.0;
    }

    betweenness
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(name: &str) -> EntityNode {
        EntityNode::new(name.to_string(), "group".to_string(), String::new())
    }

    #[test]
    fn degree_scores_normalize_by_max_possible_degree() {
        let a = node("a");
        let b = node("b");
        let c = node("c");
        let mut adjacency = HashMap::new();
        adjacency.insert(a.base.uuid, vec![b.base.uuid, c.base.uuid]);
        adjacency.insert(b.base.uuid, vec![a.base.uuid]);
        adjacency.insert(c.base.uuid, vec![a.base.uuid]);

        let entities = vec![a.clone(), b.clone(), c.clone()];
        let scores = degree_scores(&entities, &adjacency);
        assert_eq!(scores[&a.base.uuid], 1.0);
        assert_eq!(scores[&b.base.uuid], 0.5);
    }

    #[test]
    fn pagerank_favors_the_hub_in_a_star_graph() {
        let hub = node("hub");
        let leaves: Vec<EntityNode> = (0..4).map(|i| node(&format!("leaf{i}"))).collect();

        let mut adjacency = HashMap::new();
        adjacency.insert(hub.base.uuid, leaves.iter().map(|l| l.base.uuid).collect());
        for leaf in &leaves {
            adjacency.insert(leaf.base.uuid, vec![hub.base.uuid]);
        }

        let mut entities = vec![hub.clone()];
        entities.extend(leaves.iter().cloned());

        let scores = pagerank_scores(&entities, &adjacency);
        let hub_score = scores[&hub.base.uuid];
        for leaf in &leaves {
            assert!(hub_score > scores[&leaf.base.uuid]);
        }
    }

    #[test]
    fn betweenness_is_highest_for_the_bridge_node() {
        // a - bridge - b: bridge sits on every shortest path between a and b.
        let a = node("a");
        let bridge = node("bridge");
        let b = node("b");

        let mut adjacency = HashMap::new();
        adjacency.insert(a.base.uuid, vec![bridge.base.uuid]);
        adjacency.insert(bridge.base.uuid, vec![a.base.uuid, b.base.uuid]);
        adjacency.insert(b.base.uuid, vec![bridge.base.uuid]);

        let entities = vec![a.clone(), bridge.clone(), b.clone()];
        let scores = betweenness_scores(&entities, &adjacency);
        assert!(scores[&bridge.base.uuid] > scores[&a.base.uuid]);
        assert!(scores[&bridge.base.uuid] > scores[&b.base.uuid]);
    }
}
