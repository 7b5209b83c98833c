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

//! Per-episode node and edge extraction, driving the `prompts::extract_nodes` and
//! `prompts::extract_edges` message builders against an `LlmClient`.

use std::collections::HashMap;

use chrono::DateTime;
use uuid::Uuid;

use crate::{
    edges::EntityEdge,
    entity_types::ExtractionTypes,
    errors::GraphitiError,
    llm_client::{LlmClient, ModelSize},
    nodes::{EntityNode, EpisodeType, EpisodicNode},
};

fn to_llm_messages(messages: Vec<crate::prompts::Message>) -> Vec<crate::llm_client::Message> {
    messages.into_iter().map(Into::into).collect()
}

/// Extract candidate entity nodes mentioned in `episode`, classifying against the
/// episode's own source type (message / json / plain text). `types` steers classification
/// (declared entity types) and drops any entity classified into an excluded type.
pub async fn extract_nodes(
    llm_client: &dyn LlmClient,
    episode: &EpisodicNode,
    previous_episodes: &[EpisodicNode],
    types: &ExtractionTypes,
) -> Result<Vec<EntityNode>, GraphitiError> {
    let mut context = HashMap::new();
    context.insert(
        "previous_episodes".to_string(),
        serde_json::Value::Array(
            previous_episodes
                .iter()
                .map(|e| serde_json::Value::String(e.content.clone()))
                .collect(),
        ),
    );
    context.insert(
        "episode_content".to_string(),
        serde_json::Value::String(episode.content.clone()),
    );
    context.insert("entity_types".to_string(), entity_types_context(types));
    context.insert("custom_prompt".to_string(), serde_json::Value::String(String::new()));

    let messages = match episode.source {
        EpisodeType::Message => crate::prompts::extract_nodes::extract_message(&context),
        EpisodeType::Json => crate::prompts::extract_nodes::extract_json(&context),
        EpisodeType::Text => crate::prompts::extract_nodes::extract_text(&context),
    };

    let response = llm_client
        .generate_response(&to_llm_messages(messages), None, None, ModelSize::Medium)
        .await?;

    let mut nodes = Vec::new();
    if let Some(entities) = response.get("extracted_entities").and_then(|v| v.as_array()) {
        for entity in entities {
            let Some(name) = entity.get("name").and_then(|v| v.as_str()) else {
                continue;
            };
            if name.trim().is_empty() {
                continue;
            }
            let entity_type_id = entity.get("entity_type_id").and_then(|v| v.as_i64()).unwrap_or(0) as i32;
            let entity_type = types.entity_type_name(entity_type_id);
            if let Some(type_name) = entity_type {
                if types.excluded_entity_types.iter().any(|excluded| excluded == type_name) {
                    continue;
                }
            }

            let mut node = EntityNode::new(name.to_string(), episode.base.group_id.clone(), String::new());
            if let Some(type_name) = entity_type {
                node.base.labels.push(type_name.to_string());
            }
            nodes.push(node);
        }
    }

    Ok(nodes)
}

/// Renders declared entity types as the `<ENTITY TYPES>` context the extraction prompts
/// expect: an array of `{entity_type_id, name, description}`, 1-indexed to match
/// `ExtractionTypes::entity_type_name`.
fn entity_types_context(types: &ExtractionTypes) -> serde_json::Value {
    serde_json::Value::Array(
        types
            .entity_types
            .iter()
            .enumerate()
            .map(|(idx, t)| {
                serde_json::json!({
                    "entity_type_id": idx as i32 + 1,
                    "name": t.name,
                    "description": t.description,
                })
            })
            .collect(),
    )
}

/// A node's user-declared type label, i.e. the first label beyond the implicit `Entity`
/// one every `EntityNode` carries; `"Entity"` if none was assigned.
fn node_type_label(node: &EntityNode) -> &str {
    node.base
        .labels
        .iter()
        .find(|label| label.as_str() != "Entity")
        .map(|label| label.as_str())
        .unwrap_or("Entity")
}

/// Extract fact edges between previously-extracted `nodes`, mentioned in `episode`.
/// Nodes are referenced back to the LLM by their position in `nodes` so the response
/// can be resolved to real UUIDs without the model ever seeing them.
pub async fn extract_edges(
    llm_client: &dyn LlmClient,
    episode: &EpisodicNode,
    nodes: &[EntityNode],
    previous_episodes: &[EpisodicNode],
    types: &ExtractionTypes,
) -> Result<Vec<EntityEdge>, GraphitiError> {
    if nodes.len() < 2 {
        return Ok(Vec::new());
    }

    let node_refs: Vec<serde_json::Value> = nodes
        .iter()
        .enumerate()
        .map(|(idx, n)| serde_json::json!({"id": idx, "name": n.base.name}))
        .collect();

    let mut context = HashMap::new();
    context.insert(
        "previous_episodes".to_string(),
        serde_json::Value::Array(
            previous_episodes
                .iter()
                .map(|e| serde_json::Value::String(e.content.clone()))
                .collect(),
        ),
    );
    context.insert(
        "episode_content".to_string(),
        serde_json::Value::String(episode.content.clone()),
    );
    context.insert("nodes".to_string(), serde_json::Value::Array(node_refs));
    context.insert(
        "reference_time".to_string(),
        serde_json::Value::String(episode.valid_at.to_rfc3339()),
    );
    context.insert(
        "edge_types".to_string(),
        serde_json::Value::Array(
            types
                .edge_types
                .iter()
                .map(|t| serde_json::json!({"name": t.name, "description": t.description}))
                .collect(),
        ),
    );

    let messages = crate::prompts::extract_edges::edge(&context);
    let response = llm_client
        .generate_response(&to_llm_messages(messages), None, None, ModelSize::Medium)
        .await?;

    let mut edges = Vec::new();
    if let Some(raw_edges) = response.get("edges").and_then(|v| v.as_array()) {
        for raw in raw_edges {
            let Some(relation_type) = raw.get("relation_type").and_then(|v| v.as_str()) else {
                continue;
            };
            let Some(fact) = raw.get("fact").and_then(|v| v.as_str()) else {
                continue;
            };
            let source_idx = raw.get("source_entity_id").and_then(|v| v.as_u64());
            let target_idx = raw.get("target_entity_id").and_then(|v| v.as_u64());
            let (Some(source_idx), Some(target_idx)) = (source_idx, target_idx) else {
                continue;
            };
            let (Some(source), Some(target)) =
                (nodes.get(source_idx as usize), nodes.get(target_idx as usize))
            else {
                continue;
            };
            if source.base.uuid == target.base.uuid {
                continue;
            }
            if let Some(allowed) =
                types.allowed_relation_labels(node_type_label(source), node_type_label(target))
            {
                if !allowed.iter().any(|label| label == relation_type) {
                    continue;
                }
            }

            let valid_at = raw
                .get("valid_at")
                .and_then(|v| v.as_str())
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| dt.with_timezone(&chrono::Utc));
            let invalid_at = raw
                .get("invalid_at")
                .and_then(|v| v.as_str())
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| dt.with_timezone(&chrono::Utc));

            let mut entity_edge = EntityEdge::new(
                episode.base.group_id.clone(),
                source.base.uuid,
                target.base.uuid,
                relation_type.to_string(),
                fact.to_string(),
                valid_at,
            )
            .with_episodes(vec![episode.base.uuid]);
            entity_edge.invalid_at = invalid_at;

            edges.push(entity_edge);
        }
    }

    Ok(edges)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_from_empty_name_is_skipped() {
        let entity: serde_json::Value = serde_json::json!({"name": "", "entity_type_id": 0});
        assert_eq!(entity.get("name").and_then(|v| v.as_str()), Some(""));
    }

    #[test]
    fn unresolvable_edge_indices_are_rejected() {
        let nodes: Vec<EntityNode> = vec![EntityNode::new("Alice".to_string(), "g".to_string(), String::new())];
        assert!(nodes.get(5usize).is_none());
        let _ = Uuid::new_v4();
    }

    #[test]
    fn node_type_label_falls_back_to_entity() {
        let plain = EntityNode::new("Alice".to_string(), "g".to_string(), String::new());
        assert_eq!(node_type_label(&plain), "Entity");

        let mut typed = EntityNode::new("Acme".to_string(), "g".to_string(), String::new());
        typed.base.labels.push("Company".to_string());
        assert_eq!(node_type_label(&typed), "Company");
    }

    #[test]
    fn entity_types_context_is_one_indexed() {
        let types = ExtractionTypes {
            entity_types: vec![crate::entity_types::EntityTypeSpec {
                name: "Person".to_string(),
                description: "a human".to_string(),
            }],
            ..Default::default()
        };
        let context = entity_types_context(&types);
        let first = &context.as_array().unwrap()[0];
        assert_eq!(first["entity_type_id"], 1);
        assert_eq!(first["name"], "Person");
    }
}
