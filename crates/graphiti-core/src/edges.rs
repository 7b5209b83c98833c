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

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::{
    database::traits::QueryParameter,
    database::GraphDatabase,
    errors::GraphitiError,
    nodes::json_to_query_parameter,
};

/// Base trait for all edge types in the graph
#[async_trait]
pub trait Edge: Send + Sync {
    fn uuid(&self) -> Uuid;
    fn group_id(&self) -> &str;
    fn source_node_uuid(&self) -> Uuid;
    fn target_node_uuid(&self) -> Uuid;
    fn created_at(&self) -> DateTime<Utc>;

    /// Save the edge to the database
    async fn save(&self, database: &dyn GraphDatabase) -> Result<(), GraphitiError>;

    /// Delete the edge from the database
    async fn delete(&self, database: &dyn GraphDatabase) -> Result<(), GraphitiError>;

    /// Get additional attributes as key-value pairs
    fn attributes(&self) -> HashMap<String, serde_json::Value>;
}

/// Base edge implementation with common fields
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaseEdge {
    pub uuid: Uuid,
    pub group_id: String,
    pub source_node_uuid: Uuid,
    pub target_node_uuid: Uuid,
    pub created_at: DateTime<Utc>,
}

impl BaseEdge {
    pub fn new(group_id: String, source_node_uuid: Uuid, target_node_uuid: Uuid) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            group_id,
            source_node_uuid,
            target_node_uuid,
            created_at: Utc::now(),
        }
    }

    pub fn with_uuid(mut self, uuid: Uuid) -> Self {
        self.uuid = uuid;
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }
}

impl PartialEq for BaseEdge {
    fn eq(&self, other: &Self) -> bool {
        self.uuid == other.uuid
    }
}

impl std::hash::Hash for BaseEdge {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.uuid.hash(state);
    }
}

/// Episodic edge represents a connection between an episode and a mentioned entity (MENTIONS).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodicEdge {
    #[serde(flatten)]
    pub base: BaseEdge,
}

impl EpisodicEdge {
    pub fn new(group_id: String, episode_uuid: Uuid, entity_uuid: Uuid) -> Self {
        Self {
            base: BaseEdge::new(group_id, episode_uuid, entity_uuid),
        }
    }
}

#[async_trait]
impl Edge for EpisodicEdge {
    fn uuid(&self) -> Uuid {
        self.base.uuid
    }

    fn group_id(&self) -> &str {
        &self.base.group_id
    }

    fn source_node_uuid(&self) -> Uuid {
        self.base.source_node_uuid
    }

    fn target_node_uuid(&self) -> Uuid {
        self.base.target_node_uuid
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.base.created_at
    }

    async fn save(&self, database: &dyn GraphDatabase) -> Result<(), GraphitiError> {
        let mut properties = HashMap::new();
        properties.insert("uuid".to_string(), QueryParameter::String(self.base.uuid.to_string()));
        properties.insert("group_id".to_string(), QueryParameter::String(self.base.group_id.clone()));
        properties.insert(
            "created_at".to_string(),
            QueryParameter::String(self.base.created_at.to_rfc3339()),
        );
        properties.insert(
            "source_node_uuid".to_string(),
            QueryParameter::String(self.base.source_node_uuid.to_string()),
        );
        properties.insert(
            "target_node_uuid".to_string(),
            QueryParameter::String(self.base.target_node_uuid.to_string()),
        );

        database
            .create_edge(
                &self.base.source_node_uuid.to_string(),
                &self.base.target_node_uuid.to_string(),
                "MENTIONS",
                properties,
            )
            .await?;
        Ok(())
    }

    async fn delete(&self, database: &dyn GraphDatabase) -> Result<(), GraphitiError> {
        database.delete_edge(&self.base.uuid.to_string()).await?;
        Ok(())
    }

    fn attributes(&self) -> HashMap<String, serde_json::Value> {
        HashMap::new()
    }
}

/// Entity edge represents a fact relating two entities (RELATES_TO).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityEdge {
    #[serde(flatten)]
    pub base: BaseEdge,
    pub name: String,
    pub fact: String,
    /// Embedding of `fact`, used for vector similarity dedup and search.
    pub fact_embedding: Option<Vec<f32>>,
    pub episodes: Vec<Uuid>,
    /// When this edge's underlying record stopped being considered current (ingestion time).
    pub expired_at: Option<DateTime<Utc>>,
    /// When the asserted fact started holding (world time). None if unknown.
    pub valid_at: Option<DateTime<Utc>>,
    /// When the asserted fact stopped holding (world time).
    pub invalid_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub attributes: HashMap<String, serde_json::Value>,
}

impl EntityEdge {
    pub fn new(
        group_id: String,
        source_entity_uuid: Uuid,
        target_entity_uuid: Uuid,
        name: String,
        fact: String,
        valid_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            base: BaseEdge::new(group_id, source_entity_uuid, target_entity_uuid),
            name,
            fact,
            fact_embedding: None,
            episodes: Vec::new(),
            expired_at: None,
            valid_at,
            invalid_at: None,
            attributes: HashMap::new(),
        }
    }

    pub fn with_episodes(mut self, episodes: Vec<Uuid>) -> Self {
        self.episodes = episodes;
        self
    }

    pub fn with_expired_at(mut self, expired_at: DateTime<Utc>) -> Self {
        self.expired_at = Some(expired_at);
        self
    }

    pub fn with_invalid_at(mut self, invalid_at: DateTime<Utc>) -> Self {
        self.invalid_at = Some(invalid_at);
        self
    }

    /// True while the fact is considered current: no invalidation and no expiry recorded.
    pub fn is_valid(&self) -> bool {
        self.invalid_at.is_none() && self.expired_at.is_none()
    }

    /// Populate `fact_embedding` from the embedder if it is not already set.
    pub async fn generate_embedding(
        &mut self,
        embedder: &dyn crate::embedder::EmbedderClient,
    ) -> Result<(), GraphitiError> {
        if self.fact_embedding.is_none() {
            let raw = embedder.create(self.fact.trim()).await?;
            self.fact_embedding = Some(crate::helpers::normalize_l2(&raw));
        }
        Ok(())
    }
}

#[async_trait]
impl Edge for EntityEdge {
    fn uuid(&self) -> Uuid {
        self.base.uuid
    }

    fn group_id(&self) -> &str {
        &self.base.group_id
    }

    fn source_node_uuid(&self) -> Uuid {
        self.base.source_node_uuid
    }

    fn target_node_uuid(&self) -> Uuid {
        self.base.target_node_uuid
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.base.created_at
    }

    async fn save(&self, database: &dyn GraphDatabase) -> Result<(), GraphitiError> {
        let mut properties = HashMap::new();
        properties.insert("uuid".to_string(), QueryParameter::String(self.base.uuid.to_string()));
        properties.insert("name".to_string(), QueryParameter::String(self.name.clone()));
        properties.insert("group_id".to_string(), QueryParameter::String(self.base.group_id.clone()));
        properties.insert(
            "created_at".to_string(),
            QueryParameter::String(self.base.created_at.to_rfc3339()),
        );
        properties.insert("fact".to_string(), QueryParameter::String(self.fact.clone()));
        properties.insert(
            "source_node_uuid".to_string(),
            QueryParameter::String(self.base.source_node_uuid.to_string()),
        );
        properties.insert(
            "target_node_uuid".to_string(),
            QueryParameter::String(self.base.target_node_uuid.to_string()),
        );
        properties.insert(
            "episodes".to_string(),
            QueryParameter::List(self.episodes.iter().map(|u| QueryParameter::String(u.to_string())).collect()),
        );
        properties.insert(
            "expired_at".to_string(),
            self.expired_at.map(|dt| QueryParameter::String(dt.to_rfc3339())).unwrap_or(QueryParameter::Null),
        );
        properties.insert(
            "valid_at".to_string(),
            self.valid_at.map(|dt| QueryParameter::String(dt.to_rfc3339())).unwrap_or(QueryParameter::Null),
        );
        properties.insert(
            "invalid_at".to_string(),
            self.invalid_at.map(|dt| QueryParameter::String(dt.to_rfc3339())).unwrap_or(QueryParameter::Null),
        );
        if let Some(ref embedding) = self.fact_embedding {
            properties.insert(
                "fact_embedding".to_string(),
                QueryParameter::List(embedding.iter().map(|v| QueryParameter::Float(*v as f64)).collect()),
            );
        }
        for (key, value) in &self.attributes {
            properties.insert(key.clone(), json_to_query_parameter(value));
        }

        if database.get_edge(&self.base.uuid.to_string()).await?.is_some() {
            database.update_edge(&self.base.uuid.to_string(), properties).await?;
        } else {
            database
                .create_edge(
                    &self.base.source_node_uuid.to_string(),
                    &self.base.target_node_uuid.to_string(),
                    "RELATES_TO",
                    properties,
                )
                .await?;
        }

        Ok(())
    }

    async fn delete(&self, database: &dyn GraphDatabase) -> Result<(), GraphitiError> {
        database.delete_edge(&self.base.uuid.to_string()).await?;
        Ok(())
    }

    fn attributes(&self) -> HashMap<String, serde_json::Value> {
        let mut attrs = self.attributes.clone();
        attrs.insert("name".to_string(), serde_json::Value::String(self.name.clone()));
        attrs.insert("fact".to_string(), serde_json::Value::String(self.fact.clone()));
        attrs.insert("episodes".to_string(), serde_json::to_value(&self.episodes).unwrap());

        if let Some(valid_at) = self.valid_at {
            attrs.insert("valid_at".to_string(), serde_json::Value::String(valid_at.to_rfc3339()));
        }
        if let Some(expired_at) = self.expired_at {
            attrs.insert("expired_at".to_string(), serde_json::Value::String(expired_at.to_rfc3339()));
        }
        if let Some(invalid_at) = self.invalid_at {
            attrs.insert("invalid_at".to_string(), serde_json::Value::String(invalid_at.to_rfc3339()));
        }

        attrs
    }
}

impl AsRef<EntityEdge> for EntityEdge {
    fn as_ref(&self) -> &EntityEdge {
        self
    }
}

impl AsMut<EntityEdge> for EntityEdge {
    fn as_mut(&mut self) -> &mut EntityEdge {
        self
    }
}

/// Community edge represents a membership relationship between an entity and a community (HAS_MEMBER).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommunityEdge {
    #[serde(flatten)]
    pub base: BaseEdge,
}

impl CommunityEdge {
    pub fn new(group_id: String, community_uuid: Uuid, entity_uuid: Uuid) -> Self {
        Self {
            base: BaseEdge::new(group_id, community_uuid, entity_uuid),
        }
    }
}

#[async_trait]
impl Edge for CommunityEdge {
    fn uuid(&self) -> Uuid {
        self.base.uuid
    }

    fn group_id(&self) -> &str {
        &self.base.group_id
    }

    fn source_node_uuid(&self) -> Uuid {
        self.base.source_node_uuid
    }

    fn target_node_uuid(&self) -> Uuid {
        self.base.target_node_uuid
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.base.created_at
    }

    async fn save(&self, database: &dyn GraphDatabase) -> Result<(), GraphitiError> {
        let mut properties = HashMap::new();
        properties.insert("uuid".to_string(), QueryParameter::String(self.base.uuid.to_string()));
        properties.insert("group_id".to_string(), QueryParameter::String(self.base.group_id.clone()));
        properties.insert(
            "created_at".to_string(),
            QueryParameter::String(self.base.created_at.to_rfc3339()),
        );
        properties.insert(
            "source_node_uuid".to_string(),
            QueryParameter::String(self.base.source_node_uuid.to_string()),
        );
        properties.insert(
            "target_node_uuid".to_string(),
            QueryParameter::String(self.base.target_node_uuid.to_string()),
        );

        database
            .create_edge(
                &self.base.source_node_uuid.to_string(),
                &self.base.target_node_uuid.to_string(),
                "HAS_MEMBER",
                properties,
            )
            .await?;
        Ok(())
    }

    async fn delete(&self, database: &dyn GraphDatabase) -> Result<(), GraphitiError> {
        database.delete_edge(&self.base.uuid.to_string()).await?;
        Ok(())
    }

    fn attributes(&self) -> HashMap<String, serde_json::Value> {
        HashMap::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_edge_creation() {
        let source = Uuid::new_v4();
        let target = Uuid::new_v4();
        let edge = BaseEdge::new("group1".to_string(), source, target);

        assert_eq!(edge.group_id, "group1");
        assert_eq!(edge.source_node_uuid, source);
        assert_eq!(edge.target_node_uuid, target);
    }

    #[test]
    fn test_entity_edge_creation() {
        let source = Uuid::new_v4();
        let target = Uuid::new_v4();
        let edge = EntityEdge::new(
            "group1".to_string(),
            source,
            target,
            "relationship".to_string(),
            "entity1 relates to entity2".to_string(),
            Some(Utc::now()),
        );

        assert_eq!(edge.name, "relationship");
        assert_eq!(edge.fact, "entity1 relates to entity2");
        assert_eq!(edge.base.source_node_uuid, source);
        assert_eq!(edge.base.target_node_uuid, target);
        assert!(edge.is_valid());
    }

    #[test]
    fn test_entity_edge_invalidated_is_not_valid() {
        let mut edge = EntityEdge::new(
            "group1".to_string(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            "rel".to_string(),
            "fact".to_string(),
            None,
        );
        edge.invalid_at = Some(Utc::now());
        assert!(!edge.is_valid());
    }

    #[test]
    fn test_episodic_edge_creation() {
        let episode = Uuid::new_v4();
        let entity = Uuid::new_v4();
        let edge = EpisodicEdge::new("group1".to_string(), episode, entity);

        assert_eq!(edge.base.source_node_uuid, episode);
        assert_eq!(edge.base.target_node_uuid, entity);
    }
}
