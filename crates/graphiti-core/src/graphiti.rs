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

//! Main Graphiti orchestrator - equivalent to Python's graphiti.py

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    cache::{Cache, CacheConfig},
    cross_encoder::{CrossEncoderClient, OpenAIRerankerClient},
    database::{create_database, DatabaseConfig, GraphDatabase},
    edges::{Edge, EntityEdge, EpisodicEdge},
    embedder::{EmbedderClient, OpenAiEmbedder},
    entity_types::ExtractionTypes,
    errors::GraphitiError,
    llm_client::{openai_client::OpenAiClient, LlmClient},
    nodes::{BaseNode, EntityNode, EpisodeType, EpisodicNode},
    search::{GraphitiSearch, SearchConfig, SearchFilters, SearchResults},
    types::GraphitiClients,
    utils::{
        bulk_utils::{
            add_nodes_and_edges_bulk, build_duplicate_of_edges, dedupe_edges_bulk,
            dedupe_nodes_bulk, extract_edge_dates_bulk, fill_node_attributes,
            invalidate_contradicted_edges, resolve_edge_pointers,
            retrieve_previous_episodes_bulk, RawEpisode,
        },
        datetime_utils::utc_now,
        extract_utils::{extract_edges, extract_nodes},
    },
};

/// Number of prior episodes in the same group pulled in as extraction context.
const EPISODE_WINDOW_LEN: usize = 3;

/// Results from adding an episode
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddEpisodeResults {
    pub episode: EpisodicNode,
    pub nodes: Vec<EntityNode>,
    pub edges: Vec<EntityEdge>,
    /// Previously-stored edges whose `fact` was contradicted by this episode, now marked
    /// invalid.
    pub invalidated_edges: Vec<EntityEdge>,
}

/// Configuration for Graphiti
#[derive(Debug, Clone)]
pub struct GraphitiConfig {
    pub database_config: DatabaseConfig,
    pub store_raw_episode_content: bool,
    pub cache_config: Option<CacheConfig>,
}

impl Default for GraphitiConfig {
    fn default() -> Self {
        Self {
            database_config: DatabaseConfig::default(),
            store_raw_episode_content: true,
            cache_config: Some(CacheConfig::default()),
        }
    }
}

/// Main Graphiti orchestrator for temporal graph operations
pub struct Graphiti {
    clients: GraphitiClients,
    database: Arc<dyn GraphDatabase + Send + Sync>,
    store_raw_episode_content: bool,
}

impl Graphiti {
    /// Initialize a new Graphiti instance
    pub async fn new(config: GraphitiConfig) -> Result<Self, GraphitiError> {
        // Initialize database using the abstraction layer
        let database = create_database(config.database_config).await?;

        // Initialize cache if configured
        let cache: Option<Arc<dyn Cache + Send + Sync>> =
            if let Some(cache_config) = config.cache_config {
                Some(Arc::new(crate::cache::memory_cache::MemoryCache::new(
                    cache_config,
                )))
            } else {
                None
            };

        // Initialize default clients
        let llm_client: Arc<dyn LlmClient> =
            Arc::new(OpenAiClient::new(Default::default(), false)?);
        let embedder: Arc<dyn EmbedderClient> = Arc::new(OpenAiEmbedder::new(Default::default())?);
        let cross_encoder: Arc<dyn CrossEncoderClient> =
            Arc::new(OpenAIRerankerClient::new(Default::default())?);

        // Wrap with cache if available
        let cached_llm_client = if let Some(cache) = &cache {
            crate::llm_client::CachedLlmClient::new(llm_client, cache.clone())
        } else {
            crate::llm_client::CachedLlmClient::new(
                llm_client,
                Arc::new(crate::cache::memory_cache::MemoryCache::new(
                    CacheConfig::default(),
                )),
            )
        };

        let cached_embedder = if let Some(cache) = &cache {
            crate::embedder::CachedEmbedderClient::new(embedder, cache.clone())
        } else {
            crate::embedder::CachedEmbedderClient::new(
                embedder,
                Arc::new(crate::cache::memory_cache::MemoryCache::new(
                    CacheConfig::default(),
                )),
            )
        };

        let database_arc: Arc<dyn GraphDatabase + Send + Sync> = Arc::from(database);

        let clients = GraphitiClients::new(
            database_arc.clone(),
            Arc::new(cached_llm_client),
            Arc::new(cached_embedder),
            cross_encoder,
            cache.unwrap_or_else(|| {
                Arc::new(crate::cache::memory_cache::MemoryCache::new(
                    CacheConfig::default(),
                ))
            }),
        );

        Ok(Self {
            clients,
            database: database_arc,
            store_raw_episode_content: config.store_raw_episode_content,
        })
    }

    /// Initialize with custom clients
    pub async fn with_clients(
        config: GraphitiConfig,
        llm_client: Arc<dyn LlmClient>,
        embedder: Arc<dyn EmbedderClient>,
        cross_encoder: Arc<dyn CrossEncoderClient>,
    ) -> Result<Self, GraphitiError> {
        // Initialize database using the abstraction layer
        let database = create_database(config.database_config).await?;

        // Initialize cache if configured
        let cache: Option<Arc<dyn Cache + Send + Sync>> =
            if let Some(cache_config) = config.cache_config {
                Some(Arc::new(crate::cache::memory_cache::MemoryCache::new(
                    cache_config,
                )))
            } else {
                None
            };

        let database_arc = database;

        let clients = GraphitiClients::new(
            database_arc.clone(),
            llm_client,
            embedder,
            cross_encoder,
            cache.unwrap_or_else(|| {
                Arc::new(crate::cache::memory_cache::MemoryCache::new(
                    CacheConfig::default(),
                ))
            }),
        );

        Ok(Self {
            clients,
            database: database_arc,
            store_raw_episode_content: config.store_raw_episode_content,
        })
    }

    /// Close the database connections
    pub async fn close(&self) -> Result<(), GraphitiError> {
        self.database.close().await?;
        Ok(())
    }

    /// Build database indices and constraints, clearing the database first if requested.
    pub async fn build_indices_and_constraints(
        &self,
        delete_existing: bool,
    ) -> Result<(), GraphitiError> {
        if delete_existing {
            self.database.clear_database().await?;
        }
        self.database.build_indices_and_constraints().await?;
        Ok(())
    }

    /// Add a single episode to the graph
    pub async fn add_episode(
        &self,
        name: String,
        content: String,
        source: EpisodeType,
        source_description: String,
        group_id: String,
        reference_time: Option<DateTime<Utc>>,
        update_communities: bool,
        extraction_types: ExtractionTypes,
    ) -> Result<AddEpisodeResults, GraphitiError> {
        let reference_time = reference_time.unwrap_or_else(utc_now);

        // Create the episodic node
        let base_node = BaseNode::new(name, group_id.clone()).with_created_at(reference_time);

        let episode = EpisodicNode {
            base: base_node,
            source,
            source_description,
            content: if self.store_raw_episode_content {
                content.clone()
            } else {
                String::new()
            },
            valid_at: reference_time,
            entity_edges: Vec::new(),
        };

        self.ingest_episode(episode, update_communities, &extraction_types).await
    }

    /// Run the full extract -> dedupe -> save pipeline for a single episode that has
    /// not yet been persisted.
    async fn ingest_episode(
        &self,
        episode: EpisodicNode,
        update_communities: bool,
        extraction_types: &ExtractionTypes,
    ) -> Result<AddEpisodeResults, GraphitiError> {
        let group_id = episode.base.group_id.clone();

        // Pull in prior episodes from the same group as extraction context.
        let previous_episodes_by_window =
            retrieve_previous_episodes_bulk(&self.clients, std::slice::from_ref(&episode), EPISODE_WINDOW_LEN)
                .await?;
        let previous_episodes = previous_episodes_by_window
            .into_iter()
            .next()
            .map(|(_, previous)| previous)
            .unwrap_or_default();

        let extracted_nodes =
            extract_nodes(self.clients.llm_client.as_ref(), &episode, &previous_episodes, extraction_types).await?;

        // Entity resolution completes before edge extraction begins: extraction needs the
        // resolved canonical entity list, not the raw, possibly-duplicate extraction.
        let (deduped_nodes, uuid_map) =
            dedupe_nodes_bulk(&self.clients, self.clients.llm_client.as_ref(), extracted_nodes).await?;
        let nodes = fill_node_attributes(
            self.clients.llm_client.as_ref(),
            deduped_nodes,
            &episode,
            &previous_episodes,
            extraction_types,
        )
        .await?;

        let duplicate_of_edges =
            build_duplicate_of_edges(&self.clients, &group_id, &uuid_map).await?;

        let episodic_edges: Vec<EpisodicEdge> = nodes
            .iter()
            .map(|node| EpisodicEdge::new(group_id.clone(), episode.base.uuid, node.base.uuid))
            .collect();

        let mut edges =
            extract_edges(self.clients.llm_client.as_ref(), &episode, &nodes, &previous_episodes, extraction_types)
                .await?;
        resolve_edge_pointers(&mut edges, &uuid_map);

        edges = dedupe_edges_bulk(&self.clients, self.clients.llm_client.as_ref(), edges).await?;

        edges = extract_edge_dates_bulk(
            self.clients.llm_client.as_ref(),
            edges,
            vec![(episode.clone(), previous_episodes)],
        )
        .await?;

        let invalidated_edges = invalidate_contradicted_edges(
            &self.clients,
            self.clients.llm_client.as_ref(),
            &edges,
        )
        .await?;
        for invalidated in &invalidated_edges {
            invalidated.save(self.database.as_ref()).await?;
        }

        edges.extend(duplicate_of_edges);

        add_nodes_and_edges_bulk(
            &self.clients,
            vec![episode.clone()],
            episodic_edges,
            nodes.clone(),
            edges.clone(),
        )
        .await?;

        if update_communities {
            for node in &nodes {
                crate::utils::update_community_for_entity(&self.clients, node).await?;
            }
        }

        Ok(AddEpisodeResults {
            episode,
            nodes,
            edges,
            invalidated_edges,
        })
    }

    /// Add multiple episodes in bulk. `cancellation`, if given, is polled before each
    /// episode starts; flipping it mid-batch stops further episodes from beginning (episodes
    /// already in flight still finish) rather than aborting the whole future immediately.
    pub async fn add_episodes_bulk(
        &self,
        raw_episodes: Vec<RawEpisode>,
        update_communities: bool,
        extraction_types: ExtractionTypes,
        cancellation: Option<std::sync::Arc<std::sync::atomic::AtomicBool>>,
    ) -> Result<Vec<AddEpisodeResults>, GraphitiError> {
        // Convert raw episodes to episodic nodes
        let episodes: Vec<EpisodicNode> = raw_episodes
            .into_iter()
            .map(|raw| {
                let base_node = BaseNode::new(raw.name, raw.group_id.clone())
                    .with_created_at(raw.reference_time);

                EpisodicNode {
                    base: base_node,
                    source: raw.source,
                    source_description: raw.source_description,
                    content: if self.store_raw_episode_content {
                        raw.content
                    } else {
                        String::new()
                    },
                    valid_at: raw.reference_time,
                    entity_edges: Vec::new(),
                }
            })
            .collect();

        // Episodes within the batch are ingested independently of one another (each
        // resolves its own previous-episode window against what is already persisted),
        // bounded by the same semaphore used for other LLM/driver fan-out.
        let futures: Vec<_> = episodes
            .into_iter()
            .map(|episode| {
                let extraction_types = &extraction_types;
                let cancellation = cancellation.clone();
                async move {
                    crate::helpers::check_cancelled(cancellation.as_deref())?;
                    self.ingest_episode(episode, update_communities, extraction_types).await
                }
            })
            .collect();

        crate::helpers::semaphore_gather(futures, None)
            .await
            .into_iter()
            .collect::<Result<Vec<_>, _>>()
    }

    /// Cluster entities into communities by label propagation and (re)generate each
    /// community's summary from its members, across the given groups.
    pub async fn build_communities(
        &self,
        group_ids: &[String],
    ) -> Result<Vec<crate::nodes::CommunityNode>, GraphitiError> {
        crate::utils::build_communities(&self.clients, group_ids).await
    }

    /// Recompute and persist PageRank/degree/betweenness centrality for every entity in
    /// the given groups, for the search layer's centrality boost. Offline/batch; call
    /// periodically rather than per-episode.
    pub async fn compute_centrality(
        &self,
        group_ids: &[String],
    ) -> Result<Vec<EntityNode>, GraphitiError> {
        crate::utils::compute_centrality(&self.clients, group_ids).await
    }

    /// Remove an episode, deleting entity edges uniquely attributable to it and
    /// stripping its UUID from the provenance of edges that have other supporting
    /// episodes.
    pub async fn remove_episode(&self, episode_uuid: Uuid) -> Result<(), GraphitiError> {
        let database = self.database.as_ref();

        let mentions = database
            .find_edges(Some(&episode_uuid.to_string()), None, Some("MENTIONS"))
            .await?;
        let mentioned_node_uuids: Vec<String> =
            mentions.iter().map(|m| m.target_id.clone()).collect();

        let mut candidate_edges = Vec::new();
        for node_uuid in &mentioned_node_uuids {
            candidate_edges.extend(
                database
                    .find_edges(Some(node_uuid), None, Some("RELATES_TO"))
                    .await?,
            );
            candidate_edges.extend(
                database
                    .find_edges(None, Some(node_uuid), Some("RELATES_TO"))
                    .await?,
            );
        }

        let mut seen = std::collections::HashSet::new();
        for data in candidate_edges {
            let Ok(mut edge) = crate::search::utils::edge_data_to_entity_edge(&data) else {
                continue;
            };
            if !seen.insert(edge.base.uuid) {
                continue;
            }
            if !edge.episodes.contains(&episode_uuid) {
                continue;
            }

            if edge.episodes.len() == 1 && edge.episodes[0] == episode_uuid {
                edge.delete(database).await?;
            } else {
                edge.episodes.retain(|uuid| *uuid != episode_uuid);
                edge.save(database).await?;
            }
        }

        database.delete_node(&episode_uuid.to_string()).await?;
        Ok(())
    }

    /// Physically merge `duplicate` into `canonical`, outside of the per-episode dedup
    /// path. See `utils::merge_node_into` for the rewiring/attribute-union semantics.
    pub async fn merge_node_into(
        &self,
        canonical_uuid: Uuid,
        duplicate_uuid: Uuid,
    ) -> Result<(), GraphitiError> {
        crate::utils::merge_node_into(&self.clients, canonical_uuid, duplicate_uuid).await
    }

    /// Search the graph, optionally scoped to a set of group ids
    pub async fn search(
        &self,
        query: &str,
        config: Option<SearchConfig>,
        filters: Option<SearchFilters>,
        group_ids: Option<&[String]>,
    ) -> Result<SearchResults, GraphitiError> {
        let search = GraphitiSearch::new(self.clients.clone());
        let default_config = SearchConfig::default();
        let default_filters = SearchFilters::default();
        search
            .search(
                query,
                config.as_ref().unwrap_or(&default_config),
                filters.as_ref().unwrap_or(&default_filters),
                group_ids,
            )
            .await
    }

    /// Get access to the clients for advanced operations
    pub fn clients(&self) -> &GraphitiClients {
        &self.clients
    }

    /// Get the underlying database driver for backward compatibility
    /// This is temporary until all utilities are migrated to use the database abstraction
    pub fn get_neo4j_driver(&self) -> Option<&neo4rs::Graph> {
        if let Some(neo4j_db) = self
            .database
            .as_any()
            .downcast_ref::<crate::database::neo4j::Neo4jDatabase>()
        {
            Some(neo4j_db.get_graph())
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_graphiti_config_default() {
        let config = GraphitiConfig::default();
        assert_eq!(config.database_config.uri, "bolt://localhost:7687");
        assert_eq!(config.database_config.username, Some("neo4j".to_string()));
        assert_eq!(
            config.database_config.password,
            Some("password".to_string())
        );
        assert!(config.store_raw_episode_content);
    }

    #[tokio::test]
    #[ignore] // Requires database connection
    async fn test_graphiti_initialization() {
        // This test requires a Neo4j database to be running
        // and proper credentials to be configured
    }
}
