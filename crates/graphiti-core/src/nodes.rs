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
};

/// Enumeration of different types of episodes that can be processed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum EpisodeType {
    /// A standard message-type episode. Content is formatted as "actor: content".
    Message,
    /// An episode containing a JSON string with structured data.
    Json,
    /// A plain text episode.
    Text,
}

impl EpisodeType {
    pub fn from_str(s: &str) -> Result<Self, GraphitiError> {
        match s.to_lowercase().as_str() {
            "message" => Ok(EpisodeType::Message),
            "json" => Ok(EpisodeType::Json),
            "text" => Ok(EpisodeType::Text),
            _ => Err(GraphitiError::InvalidInput(format!(
                "Episode type: {} not implemented",
                s
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EpisodeType::Message => "message",
            EpisodeType::Json => "json",
            EpisodeType::Text => "text",
        }
    }
}

/// Base trait for all node types in the graph
#[async_trait]
pub trait Node: Send + Sync {
    fn uuid(&self) -> Uuid;
    fn name(&self) -> &str;
    fn group_id(&self) -> &str;
    fn labels(&self) -> &[String];
    fn created_at(&self) -> DateTime<Utc>;

    /// Save the node to the database (create if absent, otherwise update).
    async fn save(&self, database: &dyn GraphDatabase) -> Result<(), GraphitiError>;

    /// Delete the node from the database
    async fn delete(&self, database: &dyn GraphDatabase) -> Result<(), GraphitiError>;

    /// Get additional attributes as key-value pairs
    fn attributes(&self) -> HashMap<String, serde_json::Value>;
}

/// Base node implementation with common fields
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaseNode {
    pub uuid: Uuid,
    pub name: String,
    pub group_id: String,
    pub labels: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl BaseNode {
    pub fn new(name: String, group_id: String) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            name,
            group_id,
            labels: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_uuid(mut self, uuid: Uuid) -> Self {
        self.uuid = uuid;
        self
    }

    pub fn with_labels(mut self, labels: Vec<String>) -> Self {
        self.labels = labels;
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Delete all nodes (and their edges) tagged with a given group_id.
    pub async fn delete_by_group_id(
        database: &dyn GraphDatabase,
        group_id: &str,
    ) -> Result<(), GraphitiError> {
        database.delete_by_group_id(group_id).await?;
        Ok(())
    }

    fn base_properties(&self) -> HashMap<String, QueryParameter> {
        let mut properties = HashMap::new();
        properties.insert("uuid".to_string(), QueryParameter::String(self.uuid.to_string()));
        properties.insert("name".to_string(), QueryParameter::String(self.name.clone()));
        properties.insert("group_id".to_string(), QueryParameter::String(self.group_id.clone()));
        properties.insert(
            "created_at".to_string(),
            QueryParameter::String(self.created_at.to_rfc3339()),
        );
        properties
    }
}

impl PartialEq for BaseNode {
    fn eq(&self, other: &Self) -> bool {
        self.uuid == other.uuid
    }
}

impl std::hash::Hash for BaseNode {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.uuid.hash(state);
    }
}

/// Episodic node represents a specific episode or event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodicNode {
    #[serde(flatten)]
    pub base: BaseNode,
    pub source: EpisodeType,
    pub source_description: String,
    pub content: String,
    pub valid_at: DateTime<Utc>,
    pub entity_edges: Vec<Uuid>,
}

impl EpisodicNode {
    pub fn new(
        name: String,
        group_id: String,
        source: EpisodeType,
        source_description: String,
        content: String,
        valid_at: DateTime<Utc>,
    ) -> Self {
        let mut base = BaseNode::new(name, group_id);
        base.labels = vec!["Episodic".to_string()];
        Self {
            base,
            source,
            source_description,
            content,
            valid_at,
            entity_edges: Vec::new(),
        }
    }
}

#[async_trait]
impl Node for EpisodicNode {
    fn uuid(&self) -> Uuid {
        self.base.uuid
    }

    fn name(&self) -> &str {
        &self.base.name
    }

    fn group_id(&self) -> &str {
        &self.base.group_id
    }

    fn labels(&self) -> &[String] {
        &self.base.labels
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.base.created_at
    }

    async fn save(&self, database: &dyn GraphDatabase) -> Result<(), GraphitiError> {
        let mut properties = self.base.base_properties();
        properties.insert(
            "source".to_string(),
            QueryParameter::String(self.source.as_str().to_string()),
        );
        properties.insert(
            "source_description".to_string(),
            QueryParameter::String(self.source_description.clone()),
        );
        properties.insert("content".to_string(), QueryParameter::String(self.content.clone()));
        properties.insert(
            "valid_at".to_string(),
            QueryParameter::String(self.valid_at.to_rfc3339()),
        );
        properties.insert(
            "entity_edges".to_string(),
            QueryParameter::List(
                self.entity_edges
                    .iter()
                    .map(|u| QueryParameter::String(u.to_string()))
                    .collect(),
            ),
        );

        let uuid_str = self.base.uuid.to_string();
        if database.get_node(&uuid_str).await?.is_some() {
            database.update_node(&uuid_str, properties).await?;
        } else {
            database.create_node(self.base.labels.clone(), properties).await?;
        }

        Ok(())
    }

    async fn delete(&self, database: &dyn GraphDatabase) -> Result<(), GraphitiError> {
        database.delete_node(&self.base.uuid.to_string()).await?;
        Ok(())
    }

    fn attributes(&self) -> HashMap<String, serde_json::Value> {
        let mut attrs = HashMap::new();
        attrs.insert("source".to_string(), serde_json::to_value(&self.source).unwrap());
        attrs.insert(
            "source_description".to_string(),
            serde_json::Value::String(self.source_description.clone()),
        );
        attrs.insert("content".to_string(), serde_json::Value::String(self.content.clone()));
        attrs.insert(
            "valid_at".to_string(),
            serde_json::Value::String(self.valid_at.to_rfc3339()),
        );
        attrs.insert("entity_edges".to_string(), serde_json::to_value(&self.entity_edges).unwrap());
        attrs
    }
}

/// Per-node graph centrality, precomputed offline by a periodic job rather than kept
/// live; staleness between runs is acceptable.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct NodeCentrality {
    pub pagerank: f64,
    pub degree: f64,
    pub betweenness: f64,
}

/// Entity node represents a person, place, thing, or concept extracted from episodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityNode {
    #[serde(flatten)]
    pub base: BaseNode,
    pub summary: String,
    /// Free-form attributes extracted for this entity (e.g. an entity-type's custom fields).
    #[serde(default)]
    pub attributes: HashMap<String, serde_json::Value>,
    /// Embedding of `name`, used for vector similarity dedup and search.
    pub name_embedding: Option<Vec<f32>>,
    /// Precomputed PageRank/degree/betweenness, if a centrality pass has run since this
    /// node was created.
    #[serde(default)]
    pub centrality: Option<NodeCentrality>,
}

impl EntityNode {
    pub fn new(name: String, group_id: String, summary: String) -> Self {
        let mut base = BaseNode::new(name, group_id);
        base.labels = vec!["Entity".to_string()];
        Self {
            base,
            summary,
            attributes: HashMap::new(),
            name_embedding: None,
            centrality: None,
        }
    }

    pub fn with_name_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.name_embedding = Some(embedding);
        self
    }

    pub fn with_attributes(mut self, attributes: HashMap<String, serde_json::Value>) -> Self {
        self.attributes = attributes;
        self
    }

    /// Populate `name_embedding` from the embedder if it is not already set.
    pub async fn generate_name_embedding(
        &mut self,
        embedder: &dyn crate::embedder::EmbedderClient,
    ) -> Result<(), GraphitiError> {
        if self.name_embedding.is_none() {
            let raw = embedder.create(self.base.name.trim()).await?;
            self.name_embedding = Some(crate::helpers::normalize_l2(&raw));
        }
        Ok(())
    }
}

#[async_trait]
impl Node for EntityNode {
    fn uuid(&self) -> Uuid {
        self.base.uuid
    }

    fn name(&self) -> &str {
        &self.base.name
    }

    fn group_id(&self) -> &str {
        &self.base.group_id
    }

    fn labels(&self) -> &[String] {
        &self.base.labels
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.base.created_at
    }

    async fn save(&self, database: &dyn GraphDatabase) -> Result<(), GraphitiError> {
        let mut properties = self.base.base_properties();
        properties.insert("summary".to_string(), QueryParameter::String(self.summary.clone()));

        if let Some(ref embedding) = self.name_embedding {
            properties.insert(
                "name_embedding".to_string(),
                QueryParameter::List(embedding.iter().map(|v| QueryParameter::Float(*v as f64)).collect()),
            );
        }

        if let Some(centrality) = self.centrality {
            properties.insert("pagerank_centrality".to_string(), QueryParameter::Float(centrality.pagerank));
            properties.insert("degree_centrality".to_string(), QueryParameter::Float(centrality.degree));
            properties.insert(
                "betweenness_centrality".to_string(),
                QueryParameter::Float(centrality.betweenness),
            );
        }

        for (key, value) in &self.attributes {
            properties.insert(key.clone(), json_to_query_parameter(value));
        }

        let uuid_str = self.base.uuid.to_string();
        if database.get_node(&uuid_str).await?.is_some() {
            database.update_node(&uuid_str, properties).await?;
        } else {
            database.create_node(self.base.labels.clone(), properties).await?;
        }

        Ok(())
    }

    async fn delete(&self, database: &dyn GraphDatabase) -> Result<(), GraphitiError> {
        database.delete_node(&self.base.uuid.to_string()).await?;
        Ok(())
    }

    fn attributes(&self) -> HashMap<String, serde_json::Value> {
        let mut attrs = self.attributes.clone();
        attrs.insert("summary".to_string(), serde_json::Value::String(self.summary.clone()));
        if let Some(ref embedding) = self.name_embedding {
            attrs.insert("name_embedding".to_string(), serde_json::to_value(embedding).unwrap());
        }
        if let Some(centrality) = self.centrality {
            attrs.insert("centrality".to_string(), serde_json::to_value(centrality).unwrap());
        }
        attrs
    }
}

/// Community node represents a cluster of densely-connected entities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommunityNode {
    #[serde(flatten)]
    pub base: BaseNode,
    pub summary: String,
    pub name_embedding: Option<Vec<f32>>,
}

impl CommunityNode {
    pub fn new(name: String, group_id: String, summary: String) -> Self {
        let mut base = BaseNode::new(name, group_id);
        base.labels = vec!["Community".to_string()];
        Self {
            base,
            summary,
            name_embedding: None,
        }
    }

    pub fn with_name_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.name_embedding = Some(embedding);
        self
    }

    /// Populate `name_embedding` from the embedder if it is not already set.
    pub async fn generate_name_embedding(
        &mut self,
        embedder: &dyn crate::embedder::EmbedderClient,
    ) -> Result<(), GraphitiError> {
        if self.name_embedding.is_none() {
            let raw = embedder.create(self.base.name.trim()).await?;
            self.name_embedding = Some(crate::helpers::normalize_l2(&raw));
        }
        Ok(())
    }
}

#[async_trait]
impl Node for CommunityNode {
    fn uuid(&self) -> Uuid {
        self.base.uuid
    }

    fn name(&self) -> &str {
        &self.base.name
    }

    fn group_id(&self) -> &str {
        &self.base.group_id
    }

    fn labels(&self) -> &[String] {
        &self.base.labels
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.base.created_at
    }

    async fn save(&self, database: &dyn GraphDatabase) -> Result<(), GraphitiError> {
        let mut properties = self.base.base_properties();
        properties.insert("summary".to_string(), QueryParameter::String(self.summary.clone()));

        if let Some(ref embedding) = self.name_embedding {
            properties.insert(
                "name_embedding".to_string(),
                QueryParameter::List(embedding.iter().map(|v| QueryParameter::Float(*v as f64)).collect()),
            );
        }

        let uuid_str = self.base.uuid.to_string();
        if database.get_node(&uuid_str).await?.is_some() {
            database.update_node(&uuid_str, properties).await?;
        } else {
            database.create_node(self.base.labels.clone(), properties).await?;
        }

        Ok(())
    }

    async fn delete(&self, database: &dyn GraphDatabase) -> Result<(), GraphitiError> {
        database.delete_node(&self.base.uuid.to_string()).await?;
        Ok(())
    }

    fn attributes(&self) -> HashMap<String, serde_json::Value> {
        let mut attrs = HashMap::new();
        attrs.insert("summary".to_string(), serde_json::Value::String(self.summary.clone()));
        if let Some(ref embedding) = self.name_embedding {
            attrs.insert("name_embedding".to_string(), serde_json::to_value(embedding).unwrap());
        }
        attrs
    }
}

/// Convert a `serde_json::Value` into a driver-agnostic `QueryParameter`.
pub fn json_to_query_parameter(value: &serde_json::Value) -> QueryParameter {
    match value {
        serde_json::Value::Null => QueryParameter::Null,
        serde_json::Value::Bool(b) => QueryParameter::Boolean(*b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                QueryParameter::Integer(i)
            } else {
                QueryParameter::Float(n.as_f64().unwrap_or(0.0))
            }
        }
        serde_json::Value::String(s) => QueryParameter::String(s.clone()),
        serde_json::Value::Array(arr) => QueryParameter::List(arr.iter().map(json_to_query_parameter).collect()),
        serde_json::Value::Object(obj) => {
            QueryParameter::Map(obj.iter().map(|(k, v)| (k.clone(), json_to_query_parameter(v))).collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_episode_type_from_str() {
        assert_eq!(EpisodeType::from_str("message").unwrap(), EpisodeType::Message);
        assert_eq!(EpisodeType::from_str("json").unwrap(), EpisodeType::Json);
        assert_eq!(EpisodeType::from_str("text").unwrap(), EpisodeType::Text);
        assert!(EpisodeType::from_str("invalid").is_err());
    }

    #[test]
    fn test_base_node_creation() {
        let node = BaseNode::new("Test Node".to_string(), "group1".to_string());
        assert_eq!(node.name, "Test Node");
        assert_eq!(node.group_id, "group1");
        assert_ne!(node.uuid, Uuid::nil());
    }

    #[test]
    fn test_episodic_node_creation() {
        let node = EpisodicNode::new(
            "Episode 1".to_string(),
            "group1".to_string(),
            EpisodeType::Text,
            "Test source".to_string(),
            "Test content".to_string(),
            Utc::now(),
        );

        assert_eq!(node.name(), "Episode 1");
        assert_eq!(node.source, EpisodeType::Text);
        assert_eq!(node.content, "Test content");
        assert_eq!(node.labels(), &["Episodic".to_string()]);
    }

    #[test]
    fn test_entity_node_attributes_roundtrip() {
        let mut attrs = HashMap::new();
        attrs.insert("role".to_string(), serde_json::json!("engineer"));
        let node = EntityNode::new("Alice".to_string(), "group1".to_string(), "An engineer".to_string())
            .with_attributes(attrs);
        assert_eq!(node.attributes.get("role").unwrap(), &serde_json::json!("engineer"));
    }
}
