use anyhow::Result;
use graphiti_core::{
    database::{QueryParameter, GraphDatabase},
    embedder::openai::{OpenAiEmbedder, OpenAiEmbedderConfig},
    llm_client::{openai_client::OpenAiClient, config::LlmConfig},
    cross_encoder::openai_reranker_client::OpenAIRerankerClient,
    nodes::{BaseNode, CommunityNode, EpisodeType, EpisodicNode, EntityNode, Node},
    edges::EntityEdge,
    entity_types::ExtractionTypes,
    search::{
        utils::{edge_data_to_entity_edge, node_data_to_episodic_node},
        SearchConfig, SearchFilters, SearchResults,
    },
    Graphiti, GraphitiConfig,
};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;
use chrono::{DateTime, Utc};

use crate::config::Settings;

/// Service layer that manages Graphiti instances and provides high-level operations
pub struct GraphitiService {
    graphiti: Graphiti,
}

impl GraphitiService {
    /// Create a new GraphitiService
    pub async fn new(settings: Settings) -> Result<Self> {
        let config = GraphitiConfig {
            database_config: graphiti_core::database::config::DatabaseConfig {
                database_type: graphiti_core::database::config::DatabaseType::Neo4j,
                uri: settings.neo4j_uri.clone(),
                username: Some(settings.neo4j_user.clone()),
                password: Some(settings.neo4j_password.clone()),
                database: None,
                pool_size: Some(10),
                timeout_seconds: Some(30),
                additional_config: std::collections::HashMap::new(),
            },
            store_raw_episode_content: true,
            cache_config: None,
        };

        // Create LLM client
        let llm_config = LlmConfig {
            api_key: Some(settings.openai_api_key.clone()),
            model: settings.model_name.clone(),
            base_url: settings.openai_base_url.clone(),
            temperature: 0.0,
            max_tokens: 8192,
            small_model: None,
        };
        let llm_client = Arc::new(OpenAiClient::new(llm_config, false)
            .map_err(|e| anyhow::anyhow!("Failed to create LLM client: {:?}", e))?);

        // Create embedder
        let embedder_config = OpenAiEmbedderConfig {
            api_key: Some(settings.openai_api_key.clone()),
            embedding_model: settings.embedding_model_name.clone()
                .unwrap_or_else(|| "text-embedding-ada-002".to_string()),
            base_url: settings.openai_base_url.clone(),
            ..Default::default()
        };
        let embedder = Arc::new(OpenAiEmbedder::new(embedder_config)
            .map_err(|e| anyhow::anyhow!("Failed to create embedder: {:?}", e))?);

        // Create cross encoder (reranker)
        let cross_encoder = Arc::new(OpenAIRerankerClient::new(Default::default())
            .map_err(|e| anyhow::anyhow!("Failed to create cross encoder: {:?}", e))?);

        // Create Graphiti instance
        let graphiti = Graphiti::with_clients(config, llm_client, embedder, cross_encoder)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to create Graphiti: {:?}", e))?;

        Ok(Self { graphiti })
    }

    /// Add an episode to the graph
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
    ) -> Result<EpisodicNode> {
        let result = self.graphiti.add_episode(
            name,
            content,
            source,
            source_description,
            group_id,
            reference_time,
            update_communities,
            extraction_types,
        ).await
        .map_err(|e| anyhow::anyhow!("Failed to add episode: {:?}", e))?;

        Ok(result.episode)
    }

    /// Cluster entities into communities and (re)generate their summaries
    pub async fn build_communities(&self, group_ids: Vec<String>) -> Result<Vec<CommunityNode>> {
        self.graphiti
            .build_communities(&group_ids)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to build communities: {:?}", e))
    }

    /// Recompute and persist PageRank/degree/betweenness centrality for every entity in
    /// the given groups
    pub async fn compute_centrality(&self, group_ids: Vec<String>) -> Result<Vec<EntityNode>> {
        self.graphiti
            .compute_centrality(&group_ids)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to compute centrality: {:?}", e))
    }

    /// Search for relevant edges
    pub async fn search(
        &self,
        query: String,
        group_ids: Option<Vec<String>>,
        num_results: Option<usize>,
        center_node_uuid: Option<Uuid>,
    ) -> Result<SearchResults> {
        let mut filters = SearchFilters::default();
        if let Some(uuid) = center_node_uuid {
            filters = filters.with_center_node_uuid(uuid);
        }

        let mut config = SearchConfig::default();
        if let Some(limit) = num_results {
            config.limit = limit;
        }

        self.graphiti
            .search(&query, Some(config), Some(filters), group_ids.as_deref())
            .await
            .map_err(|e| anyhow::anyhow!("Failed to search: {:?}", e))
    }

    /// Create and persist a standalone entity node, bypassing episode extraction.
    pub async fn save_entity_node(
        &self,
        uuid: Uuid,
        group_id: String,
        name: String,
        summary: String,
    ) -> Result<EntityNode> {
        let mut node = EntityNode::new(name, group_id, summary);
        node.base.uuid = uuid;
        node.generate_name_embedding(self.graphiti.clients().embedder.as_ref())
            .await
            .map_err(|e| anyhow::anyhow!("Failed to embed entity node: {:?}", e))?;
        node.save(self.graphiti.clients().database.as_ref())
            .await
            .map_err(|e| anyhow::anyhow!("Failed to save entity node: {:?}", e))?;
        Ok(node)
    }

    /// Get an entity edge by UUID
    pub async fn get_entity_edge(&self, uuid: Uuid) -> Result<Option<EntityEdge>> {
        let data = self
            .graphiti
            .clients()
            .database
            .get_edge(&uuid.to_string())
            .await
            .map_err(|e| anyhow::anyhow!("Failed to get entity edge: {:?}", e))?;

        data.map(|d| {
            edge_data_to_entity_edge(&d).map_err(|e| anyhow::anyhow!("Failed to decode entity edge: {:?}", e))
        })
        .transpose()
    }

    /// Delete an entity edge
    pub async fn delete_entity_edge(&self, uuid: Uuid) -> Result<()> {
        self.graphiti
            .clients()
            .database
            .delete_edge(&uuid.to_string())
            .await
            .map_err(|e| anyhow::anyhow!("Failed to delete entity edge: {:?}", e))
    }

    /// Delete every node and edge belonging to a group
    pub async fn delete_group(&self, group_id: String) -> Result<()> {
        BaseNode::delete_by_group_id(self.graphiti.clients().database.as_ref(), &group_id)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to delete group: {:?}", e))
    }

    /// Look up a single episode by UUID
    pub async fn get_episode(&self, uuid: Uuid) -> Result<Option<EpisodicNode>> {
        let data = self
            .graphiti
            .clients()
            .database
            .get_node(&uuid.to_string())
            .await
            .map_err(|e| anyhow::anyhow!("Failed to get episode: {:?}", e))?;

        data.map(|d| {
            node_data_to_episodic_node(&d).map_err(|e| anyhow::anyhow!("Failed to decode episode: {:?}", e))
        })
        .transpose()
    }

    /// Merge a duplicate node into its canonical representative
    pub async fn merge_node(&self, canonical_uuid: Uuid, duplicate_uuid: Uuid) -> Result<()> {
        self.graphiti
            .merge_node_into(canonical_uuid, duplicate_uuid)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to merge node: {:?}", e))
    }

    /// Delete an episode
    pub async fn delete_episode(&self, uuid: Uuid) -> Result<()> {
        self.graphiti
            .remove_episode(uuid)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to delete episode: {:?}", e))
    }

    /// Retrieve the most recent `last_n` episodes at or before `reference_time`, across
    /// the given groups.
    pub async fn retrieve_episodes(
        &self,
        group_ids: Vec<String>,
        last_n: usize,
        reference_time: DateTime<Utc>,
    ) -> Result<Vec<EpisodicNode>> {
        let database = self.graphiti.clients().database.as_ref();
        let mut episodes = Vec::new();

        for group_id in &group_ids {
            let mut properties = HashMap::new();
            properties.insert("group_id".to_string(), QueryParameter::String(group_id.clone()));

            let nodes = database
                .find_nodes(Some("Episodic"), properties)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to retrieve episodes: {:?}", e))?;

            for data in &nodes {
                let episode = node_data_to_episodic_node(data)
                    .map_err(|e| anyhow::anyhow!("Failed to decode episode: {:?}", e))?;
                if episode.valid_at <= reference_time {
                    episodes.push(episode);
                }
            }
        }

        episodes.sort_by(|a, b| b.valid_at.cmp(&a.valid_at));
        episodes.truncate(last_n);
        Ok(episodes)
    }

    /// Wipe the entire graph database
    pub async fn clear_data(&self) -> Result<()> {
        self.graphiti
            .clients()
            .database
            .clear_database()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to clear data: {:?}", e))
    }
}
