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

use std::collections::HashMap;

use uuid::Uuid;

use crate::{
    edges::{Edge, EntityEdge},
    errors::GraphitiError,
    nodes::{CommunityNode, EntityNode, EpisodicNode, Node},
    search::{
        fusion, utils::*, CommunityReranker, CommunitySearchMethod, EdgeReranker, EdgeSearchMethod,
        EpisodeReranker, EpisodeSearchMethod, NodeReranker, NodeSearchMethod, SearchConfig,
        SearchFilters, SearchResult, SearchResults,
    },
    types::GraphitiClients,
};

/// Main search interface for Graphiti
pub struct GraphitiSearch {
    clients: GraphitiClients,
}

impl GraphitiSearch {
    pub fn new(clients: GraphitiClients) -> Self {
        Self { clients }
    }

    /// Perform a comprehensive search across all entity types
    pub async fn search(
        &self,
        query: &str,
        config: &SearchConfig,
        filters: &SearchFilters,
        group_ids: Option<&[String]>,
    ) -> Result<SearchResults, GraphitiError> {
        // Create a cache key for the entire search operation
        let cache_key = format!(
            "search:{}:{}:{:?}:{:?}",
            query,
            serde_json::to_string(config).unwrap_or_default(),
            serde_json::to_string(filters).unwrap_or_default(),
            group_ids
        );

        // Try to get cached results first
        if let Ok(Some(cached_bytes)) = self.clients.cache.get(&cache_key).await {
            if let Ok(cached_results) = serde_json::from_slice::<SearchResults>(&cached_bytes) {
                return Ok(cached_results);
            }
        }

        let mut results = SearchResults::new();

        // Search nodes
        let node_results = self
            .search_nodes(
                query,
                &config.node_search_config.search_methods,
                &config.node_search_config.reranker,
                config.node_search_config.mmr_lambda,
                filters,
                group_ids,
                config.limit,
                config.centrality_alpha,
            )
            .await?;
        results.nodes = node_results;

        // Search edges
        let edge_results = self
            .search_edges(
                query,
                &config.edge_search_config.search_methods,
                &config.edge_search_config.reranker,
                config.edge_search_config.mmr_lambda,
                filters,
                group_ids,
                config.limit,
            )
            .await?;
        results.edges = edge_results;

        // Search episodes
        let episode_results = self
            .search_episodes(
                query,
                &config.episode_search_config.search_methods,
                &config.episode_search_config.reranker,
                filters,
                group_ids,
                config.limit,
            )
            .await?;
        results.episodes = episode_results;

        // Search communities
        let community_results = self
            .search_communities(
                query,
                &config.community_search_config.search_methods,
                &config.community_search_config.reranker,
                config.community_search_config.mmr_lambda,
                filters,
                group_ids,
                config.limit,
            )
            .await?;
        results.communities = community_results;

        // Cache the results for future use
        if let Ok(serialized) = serde_json::to_vec(&results) {
            let _ = self.clients.cache.set(&cache_key, serialized).await;
        }

        Ok(results)
    }

    /// Rerank via the cross encoder: score `(query, passage)` for every candidate and return
    /// uuids in descending order of that score. Falls back to fused-score order if the cross
    /// encoder call fails or a passage can't be matched back to its uuid.
    async fn cross_encoder_order(
        &self,
        query: &str,
        passages_by_uuid: &[(Uuid, String)],
        fallback: Vec<Uuid>,
    ) -> Vec<Uuid> {
        let passages: Vec<String> = passages_by_uuid.iter().map(|(_, text)| text.clone()).collect();
        let Ok(ranked) = self.clients.cross_encoder.rank(query, &passages).await else {
            return fallback;
        };

        let text_to_uuid: HashMap<&str, Uuid> =
            passages_by_uuid.iter().map(|(uuid, text)| (text.as_str(), *uuid)).collect();

        let mut seen = std::collections::HashSet::new();
        let mut order = Vec::new();
        for (text, _score) in &ranked {
            if let Some(uuid) = text_to_uuid.get(text.as_str()) {
                if seen.insert(*uuid) {
                    order.push(*uuid);
                }
            }
        }
        if order.is_empty() { fallback } else { order }
    }

    /// Search for entity nodes
    #[allow(clippy::too_many_arguments)]
    pub async fn search_nodes(
        &self,
        query: &str,
        search_methods: &[NodeSearchMethod],
        reranker: &NodeReranker,
        mmr_lambda: f64,
        filters: &SearchFilters,
        group_ids: Option<&[String]>,
        limit: usize,
        centrality_alpha: Option<f64>,
    ) -> Result<Vec<SearchResult<EntityNode>>, GraphitiError> {
        if search_methods.is_empty() {
            return Ok(Vec::new());
        }

        let mut ranked_lists: Vec<Vec<Uuid>> = Vec::new();
        let mut items: HashMap<Uuid, EntityNode> = HashMap::new();

        // Get query embedding if needed for similarity search, with cache support
        let query_vector = if search_methods.contains(&NodeSearchMethod::CosimeSimilarity) {
            let cache_key = format!("embedding:{}", query);

            if let Ok(Some(cached_bytes)) = self.clients.cache.get(&cache_key).await {
                if let Ok(cached_vector) = serde_json::from_slice::<Vec<f32>>(&cached_bytes) {
                    Some(cached_vector)
                } else {
                    let vector = self.clients.embedder.embed_query(query).await?;
                    if let Ok(serialized) = serde_json::to_vec(&vector) {
                        let _ = self.clients.cache.set(&cache_key, serialized).await;
                    }
                    Some(vector)
                }
            } else {
                let vector = self.clients.embedder.embed_query(query).await?;
                if let Ok(serialized) = serde_json::to_vec(&vector) {
                    let _ = self.clients.cache.set(&cache_key, serialized).await;
                }
                Some(vector)
            }
        } else {
            None
        };

        for method in search_methods {
            let results = match method {
                NodeSearchMethod::CosimeSimilarity => {
                    if let Some(ref vector) = query_vector {
                        node_similarity_search(&self.clients, vector, filters, group_ids, limit * 2).await?
                    } else {
                        Vec::new()
                    }
                }
                NodeSearchMethod::Bm25 => {
                    node_fulltext_search(&self.clients, query, filters, group_ids, limit * 2).await?
                }
                NodeSearchMethod::Bfs => {
                    let Some(center) = filters.center_node_uuid else { continue };
                    let distances = bfs_distances(&self.clients, center, MAX_SEARCH_DEPTH).await?;
                    let mut bfs_hits = Vec::new();
                    for (uuid, depth) in &distances {
                        if *uuid == center {
                            continue;
                        }
                        if let Some(data) = self.clients.database.get_node(&uuid.to_string()).await? {
                            if let Ok(node) = node_data_to_entity_node(&data) {
                                bfs_hits.push(SearchResult { item: node, score: 1.0 / (*depth as f64 + 1.0) });
                            }
                        }
                    }
                    bfs_hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
                    bfs_hits.truncate(limit * 2);
                    bfs_hits
                }
            };
            let mut ranked = Vec::with_capacity(results.len());
            for result in results {
                let uuid = result.item.uuid();
                ranked.push(uuid);
                items.entry(uuid).or_insert(result.item);
            }
            ranked_lists.push(ranked);
        }

        let fused = fusion::reciprocal_rank_fusion(&ranked_lists);
        let order = match reranker {
            NodeReranker::Rrf => fusion::rrf_order(&ranked_lists),
            NodeReranker::Mmr => {
                let candidates = items
                    .iter()
                    .map(|(uuid, node)| (*uuid, fused.get(uuid).copied().unwrap_or(0.0), node.name_embedding.clone()))
                    .collect();
                fusion::mmr_order(candidates, mmr_lambda, limit)
            }
            NodeReranker::CrossEncoder => {
                let passages: Vec<(Uuid, String)> = items
                    .iter()
                    .map(|(uuid, node)| (*uuid, format!("{}: {}", node.base.name, node.summary)))
                    .collect();
                self.cross_encoder_order(query, &passages, fusion::rrf_order(&ranked_lists)).await
            }
            NodeReranker::NodeDistance => {
                if let Some(center) = filters.center_node_uuid {
                    let distances = bfs_distances(&self.clients, center, MAX_SEARCH_DEPTH).await?;
                    let candidate_uuids: Vec<Uuid> = items.keys().copied().collect();
                    fusion::node_distance_order(&candidate_uuids, &distances, &fused)
                } else {
                    fusion::rrf_order(&ranked_lists)
                }
            }
            NodeReranker::EpisodeMentions => {
                let mut counts = HashMap::new();
                for uuid in items.keys() {
                    counts.insert(*uuid, node_mention_count(&self.clients, *uuid).await?);
                }
                let candidate_uuids: Vec<Uuid> = items.keys().copied().collect();
                fusion::episode_mentions_order(&candidate_uuids, &counts, &fused)
            }
        };

        let mut all_results: Vec<SearchResult<EntityNode>> = order
            .into_iter()
            .filter_map(|uuid| items.remove(&uuid).map(|item| SearchResult { item, score: fused.get(&uuid).copied().unwrap_or(0.0) }))
            .collect();

        if let Some(alpha) = centrality_alpha {
            for result in &mut all_results {
                let pagerank = result.item.centrality.map(|c| c.pagerank).unwrap_or(0.0);
                result.score *= 1.0 + alpha * pagerank;
            }
            all_results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        }

        all_results.truncate(limit);

        Ok(all_results)
    }

    /// Search for entity edges
    #[allow(clippy::too_many_arguments)]
    pub async fn search_edges(
        &self,
        query: &str,
        search_methods: &[EdgeSearchMethod],
        reranker: &EdgeReranker,
        mmr_lambda: f64,
        filters: &SearchFilters,
        group_ids: Option<&[String]>,
        limit: usize,
    ) -> Result<Vec<SearchResult<EntityEdge>>, GraphitiError> {
        if search_methods.is_empty() {
            return Ok(Vec::new());
        }

        let mut ranked_lists: Vec<Vec<Uuid>> = Vec::new();
        let mut items: HashMap<Uuid, EntityEdge> = HashMap::new();

        let query_vector = if search_methods.contains(&EdgeSearchMethod::CosimeSimilarity) {
            Some(self.clients.embedder.embed_query(query).await?)
        } else {
            None
        };

        for method in search_methods {
            let results = match method {
                EdgeSearchMethod::CosimeSimilarity => {
                    if let Some(ref vector) = query_vector {
                        let vector_f64: Vec<f64> = vector.iter().map(|&x| x as f64).collect();
                        edge_similarity_search(
                            &self.clients,
                            &vector_f64,
                            None, // source_node_uuid: unconstrained
                            None, // target_node_uuid: unconstrained
                            filters,
                            group_ids,
                            limit * 2,
                            0.0,
                        )
                        .await?
                    } else {
                        Vec::new()
                    }
                }
                EdgeSearchMethod::Bm25 => {
                    edge_fulltext_search(&self.clients, query, filters, group_ids, limit * 2).await?
                }
                EdgeSearchMethod::Bfs => {
                    let origins = filters.center_node_uuid.map(|uuid| vec![uuid.to_string()]);
                    edge_bfs_search(&self.clients, origins.as_deref(), MAX_SEARCH_DEPTH, filters, limit * 2).await?
                }
            };
            let mut ranked = Vec::with_capacity(results.len());
            for result in results {
                let uuid = result.item.uuid();
                ranked.push(uuid);
                items.entry(uuid).or_insert(result.item);
            }
            ranked_lists.push(ranked);
        }

        let fused = fusion::reciprocal_rank_fusion(&ranked_lists);
        let order = match reranker {
            EdgeReranker::Rrf => fusion::rrf_order(&ranked_lists),
            EdgeReranker::Mmr => {
                let candidates = items
                    .iter()
                    .map(|(uuid, edge)| (*uuid, fused.get(uuid).copied().unwrap_or(0.0), edge.fact_embedding.clone()))
                    .collect();
                fusion::mmr_order(candidates, mmr_lambda, limit)
            }
            EdgeReranker::CrossEncoder => {
                let passages: Vec<(Uuid, String)> =
                    items.iter().map(|(uuid, edge)| (*uuid, edge.fact.clone())).collect();
                self.cross_encoder_order(query, &passages, fusion::rrf_order(&ranked_lists)).await
            }
            EdgeReranker::NodeDistance => {
                if let Some(center) = filters.center_node_uuid {
                    let distances = bfs_distances(&self.clients, center, MAX_SEARCH_DEPTH).await?;
                    let mut edge_distances = HashMap::new();
                    for (uuid, edge) in &items {
                        let source_dist = distances.get(&edge.base.source_node_uuid).copied();
                        let target_dist = distances.get(&edge.base.target_node_uuid).copied();
                        if let Some(dist) = source_dist.into_iter().chain(target_dist).min() {
                            edge_distances.insert(*uuid, dist);
                        }
                    }
                    let candidate_uuids: Vec<Uuid> = items.keys().copied().collect();
                    fusion::node_distance_order(&candidate_uuids, &edge_distances, &fused)
                } else {
                    fusion::rrf_order(&ranked_lists)
                }
            }
            EdgeReranker::EpisodeMentions => {
                let counts: HashMap<Uuid, usize> =
                    items.iter().map(|(uuid, edge)| (*uuid, edge.episodes.len())).collect();
                let candidate_uuids: Vec<Uuid> = items.keys().copied().collect();
                fusion::episode_mentions_order(&candidate_uuids, &counts, &fused)
            }
        };

        let mut all_results: Vec<SearchResult<EntityEdge>> = order
            .into_iter()
            .filter_map(|uuid| items.remove(&uuid).map(|item| SearchResult { item, score: fused.get(&uuid).copied().unwrap_or(0.0) }))
            .collect();
        all_results.truncate(limit);

        Ok(all_results)
    }

    /// Search for episodic nodes
    pub async fn search_episodes(
        &self,
        query: &str,
        search_methods: &[EpisodeSearchMethod],
        reranker: &EpisodeReranker,
        filters: &SearchFilters,
        group_ids: Option<&[String]>,
        limit: usize,
    ) -> Result<Vec<SearchResult<EpisodicNode>>, GraphitiError> {
        if search_methods.is_empty() {
            return Ok(Vec::new());
        }

        let mut ranked_lists: Vec<Vec<Uuid>> = Vec::new();
        let mut items: HashMap<Uuid, EpisodicNode> = HashMap::new();

        for method in search_methods {
            let results = match method {
                EpisodeSearchMethod::Bm25 => {
                    episode_fulltext_search(&self.clients, query, filters, group_ids, limit * 2).await?
                }
            };
            let mut ranked = Vec::with_capacity(results.len());
            for result in results {
                let uuid = result.item.uuid();
                ranked.push(uuid);
                items.entry(uuid).or_insert(result.item);
            }
            ranked_lists.push(ranked);
        }

        let fused = fusion::reciprocal_rank_fusion(&ranked_lists);
        let order = match reranker {
            EpisodeReranker::Rrf => fusion::rrf_order(&ranked_lists),
            EpisodeReranker::CrossEncoder => {
                let passages: Vec<(Uuid, String)> = items
                    .iter()
                    .map(|(uuid, episode)| (*uuid, episode.content.chars().take(500).collect()))
                    .collect();
                self.cross_encoder_order(query, &passages, fusion::rrf_order(&ranked_lists)).await
            }
        };

        let mut all_results: Vec<SearchResult<EpisodicNode>> = order
            .into_iter()
            .filter_map(|uuid| items.remove(&uuid).map(|item| SearchResult { item, score: fused.get(&uuid).copied().unwrap_or(0.0) }))
            .collect();
        all_results.truncate(limit);

        Ok(all_results)
    }

    /// Search for community nodes
    #[allow(clippy::too_many_arguments)]
    pub async fn search_communities(
        &self,
        query: &str,
        search_methods: &[CommunitySearchMethod],
        reranker: &CommunityReranker,
        mmr_lambda: f64,
        _filters: &SearchFilters,
        group_ids: Option<&[String]>,
        limit: usize,
    ) -> Result<Vec<SearchResult<CommunityNode>>, GraphitiError> {
        if search_methods.is_empty() {
            return Ok(Vec::new());
        }

        let mut ranked_lists: Vec<Vec<Uuid>> = Vec::new();
        let mut items: HashMap<Uuid, CommunityNode> = HashMap::new();

        let query_vector = if search_methods.contains(&CommunitySearchMethod::CosimeSimilarity) {
            Some(self.clients.embedder.embed_query(query).await?)
        } else {
            None
        };

        for method in search_methods {
            let results = match method {
                CommunitySearchMethod::CosimeSimilarity => {
                    if let Some(ref vector) = query_vector {
                        let vector_f64: Vec<f64> = vector.iter().map(|&x| x as f64).collect();
                        community_similarity_search(&self.clients, &vector_f64, limit * 2).await?
                    } else {
                        Vec::new()
                    }
                }
                CommunitySearchMethod::Bm25 => {
                    community_fulltext_search(&self.clients, query, group_ids, limit * 2).await?
                }
            };
            let mut ranked = Vec::with_capacity(results.len());
            for result in results {
                let uuid = result.item.uuid();
                ranked.push(uuid);
                items.entry(uuid).or_insert(result.item);
            }
            ranked_lists.push(ranked);
        }

        let fused = fusion::reciprocal_rank_fusion(&ranked_lists);
        let order = match reranker {
            CommunityReranker::Rrf => fusion::rrf_order(&ranked_lists),
            CommunityReranker::Mmr => {
                let candidates = items
                    .iter()
                    .map(|(uuid, community)| {
                        (*uuid, fused.get(uuid).copied().unwrap_or(0.0), community.name_embedding.clone())
                    })
                    .collect();
                fusion::mmr_order(candidates, mmr_lambda, limit)
            }
            CommunityReranker::CrossEncoder => {
                let passages: Vec<(Uuid, String)> = items
                    .iter()
                    .map(|(uuid, community)| (*uuid, format!("{}: {}", community.base.name, community.summary)))
                    .collect();
                self.cross_encoder_order(query, &passages, fusion::rrf_order(&ranked_lists)).await
            }
        };

        let mut all_results: Vec<SearchResult<CommunityNode>> = order
            .into_iter()
            .filter_map(|uuid| items.remove(&uuid).map(|item| SearchResult { item, score: fused.get(&uuid).copied().unwrap_or(0.0) }))
            .collect();
        all_results.truncate(limit);

        Ok(all_results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_config_creation() {
        let config = SearchConfig::default();
        assert_eq!(config.limit, 10);
    }

    #[test]
    fn test_search_filters_creation() {
        let filters = SearchFilters::new().with_node_labels(vec!["Entity".to_string()]);
        assert!(filters.node_labels.is_some());
    }
}
