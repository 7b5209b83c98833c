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

//! Bulk processing utilities for nodes and edges

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    edges::{Edge, EntityEdge, EpisodicEdge},
    entity_types::ExtractionTypes,
    errors::GraphitiError,
    helpers::semaphore_gather,
    llm_client::{LlmClient, ModelSize},
    nodes::{EntityNode, EpisodeType, EpisodicNode, Node},
    search::{
        get_relevant_edges, get_relevant_nodes,
        utils::{edge_data_to_entity_edge, node_data_to_entity_node},
        SearchFilters,
    },
    types::GraphitiClients,
    utils::datetime_utils::utc_now,
};

pub(crate) fn to_llm_messages(messages: Vec<crate::prompts::Message>) -> Vec<crate::llm_client::Message> {
    messages.into_iter().map(Into::into).collect()
}

/// Chunk size for batch processing
const CHUNK_SIZE: usize = 10;

/// Raw episode data for bulk processing
#[derive(Debug, Clone)]
pub struct RawEpisode {
    pub name: String,
    pub content: String,
    pub source_description: String,
    pub source: EpisodeType,
    pub reference_time: DateTime<Utc>,
    pub group_id: String,
}

/// Retrieve previous episodes for multiple episodes in bulk, each bounded to the same
/// group and preceding the episode's own `valid_at`.
pub async fn retrieve_previous_episodes_bulk(
    clients: &GraphitiClients,
    episodes: &[EpisodicNode],
    episode_window_len: usize,
) -> Result<Vec<(EpisodicNode, Vec<EpisodicNode>)>, GraphitiError> {
    let futures: Vec<_> = episodes
        .iter()
        .map(|episode| async move {
            let mut props = HashMap::new();
            props.insert(
                "group_id".to_string(),
                crate::database::traits::QueryParameter::String(episode.base.group_id.clone()),
            );
            let candidates = clients.database.find_nodes(Some("Episodic"), props).await.unwrap_or_default();

            let mut previous: Vec<EpisodicNode> = candidates
                .iter()
                .filter_map(|data| crate::search::utils::node_data_to_episodic_node(data).ok())
                .filter(|e| e.valid_at < episode.valid_at && e.base.uuid != episode.base.uuid)
                .collect();

            previous.sort_by_key(|e| e.valid_at);
            if previous.len() > episode_window_len {
                let start = previous.len() - episode_window_len;
                previous = previous.split_off(start);
            }

            (episode.clone(), previous)
        })
        .collect();

    let results = semaphore_gather(futures, None).await;
    Ok(results)
}

/// Add nodes and edges in bulk to the database, generating any missing embeddings first.
pub async fn add_nodes_and_edges_bulk(
    clients: &GraphitiClients,
    episodic_nodes: Vec<EpisodicNode>,
    episodic_edges: Vec<EpisodicEdge>,
    mut entity_nodes: Vec<EntityNode>,
    mut entity_edges: Vec<EntityEdge>,
) -> Result<(), GraphitiError> {
    for node in &mut entity_nodes {
        if node.name_embedding.is_none() {
            node.generate_name_embedding(clients.embedder.as_ref()).await?;
        }
    }

    for edge in &mut entity_edges {
        if edge.fact_embedding.is_none() {
            edge.generate_embedding(clients.embedder.as_ref()).await?;
        }
    }

    for node in &episodic_nodes {
        node.save(clients.database.as_ref()).await?;
    }
    for node in &entity_nodes {
        node.save(clients.database.as_ref()).await?;
    }
    for edge in &episodic_edges {
        edge.save(clients.database.as_ref()).await?;
    }
    for edge in &entity_edges {
        edge.save(clients.database.as_ref()).await?;
    }

    Ok(())
}

/// Extract nodes and edges from multiple episodes in bulk.
///
/// Actual entity/fact extraction happens via the LLM-backed maintenance pipeline
/// (`Graphiti::add_episode`); this bulk path exists for callers that already hold
/// pre-extracted nodes/edges per episode and just need them merged and returned flat.
pub fn extract_nodes_and_edges_bulk(
    episode_extractions: Vec<(Vec<EntityNode>, Vec<EntityEdge>, Vec<EpisodicEdge>)>,
) -> (Vec<EntityNode>, Vec<EntityEdge>, Vec<EpisodicEdge>) {
    let mut nodes = Vec::new();
    let mut edges = Vec::new();
    let mut episodic_edges = Vec::new();

    for (n, e, ee) in episode_extractions {
        nodes.extend(n);
        edges.extend(e);
        episodic_edges.extend(ee);
    }

    (nodes, edges, episodic_edges)
}

/// Deduplicate nodes in bulk: exact name match, then LLM-assisted fuzzy merge against
/// the existing graph.
pub async fn dedupe_nodes_bulk(
    clients: &GraphitiClients,
    llm_client: &dyn LlmClient,
    extracted_nodes: Vec<EntityNode>,
) -> Result<(Vec<EntityNode>, HashMap<String, String>), GraphitiError> {
    let (nodes, uuid_map) = node_name_match(extracted_nodes);
    let (compressed_nodes, compressed_map) = compress_nodes(clients, llm_client, nodes, uuid_map).await?;

    let node_chunks: Vec<Vec<EntityNode>> =
        compressed_nodes.chunks(CHUNK_SIZE).map(|chunk| chunk.to_vec()).collect();

    let dedupe_futures: Vec<_> = node_chunks
        .into_iter()
        .map(|chunk| async move {
            let relevant = get_relevant_nodes(clients, &chunk, &SearchFilters::default()).await.unwrap_or_default();
            dedupe_node_list(llm_client, &chunk, &relevant).await
        })
        .collect();

    let results = semaphore_gather(dedupe_futures, None).await;

    let mut final_nodes = Vec::new();
    let mut final_uuid_map = compressed_map;

    for (nodes, partial_uuid_map) in results {
        final_nodes.extend(nodes);
        final_uuid_map.extend(partial_uuid_map);
    }

    Ok((final_nodes, final_uuid_map))
}

/// Fill in `summary`/`attributes` on each surviving node from the episode it was resolved
/// against, constrained to the schema of its declared entity type (if any).
pub async fn fill_node_attributes(
    llm_client: &dyn LlmClient,
    nodes: Vec<EntityNode>,
    episode: &EpisodicNode,
    previous_episodes: &[EpisodicNode],
    types: &ExtractionTypes,
) -> Result<Vec<EntityNode>, GraphitiError> {
    let futures: Vec<_> = nodes
        .into_iter()
        .map(|node| async move {
            match fill_node_attributes_llm(llm_client, &node, episode, previous_episodes, types).await {
                Ok(filled) => filled,
                Err(_) => node,
            }
        })
        .collect();

    Ok(semaphore_gather(futures, None).await)
}

/// Ask the LLM to update a single node's `summary` and `attributes` from the episode
/// content, using the entity type's declared attribute descriptions as guidance.
async fn fill_node_attributes_llm(
    llm_client: &dyn LlmClient,
    node: &EntityNode,
    episode: &EpisodicNode,
    previous_episodes: &[EpisodicNode],
    types: &ExtractionTypes,
) -> Result<EntityNode, GraphitiError> {
    let entity_type_description = node
        .base
        .labels
        .iter()
        .find(|label| label.as_str() != "Entity")
        .and_then(|label| types.entity_types.iter().find(|t| &t.name == label))
        .map(|t| t.description.as_str());

    let node_context = serde_json::json!({
        "name": node.base.name,
        "summary": node.summary,
        "entity_type_description": entity_type_description,
        "attributes": node.attributes,
    });

    let mut context = HashMap::new();
    context.insert("node".to_string(), node_context);
    context.insert(
        "episode_content".to_string(),
        serde_json::Value::String(episode.content.clone()),
    );
    context.insert(
        "previous_episodes".to_string(),
        serde_json::Value::Array(
            previous_episodes.iter().map(|e| serde_json::Value::String(e.content.clone())).collect(),
        ),
    );

    let messages = to_llm_messages(crate::prompts::extract_nodes::extract_attributes(&context));
    let response = llm_client
        .generate_response(&messages, None, None, ModelSize::Small)
        .await?;

    let mut filled = node.clone();
    if let Some(summary) = response.get("summary").and_then(|v| v.as_str()) {
        filled.summary = summary.to_string();
    }
    for (key, value) in &response {
        if key != "summary" {
            filled.attributes.insert(key.clone(), value.clone());
        }
    }

    Ok(filled)
}

/// Match a chunk of freshly-extracted nodes against candidates already in the graph, asking
/// the LLM to adjudicate each one individually against its candidate pool. A node whose
/// `match_uuid` resolves to a real candidate is folded into that candidate's UUID; everything
/// else survives as a genuinely new node.
async fn dedupe_node_list(
    llm_client: &dyn LlmClient,
    chunk: &[EntityNode],
    existing: &[EntityNode],
) -> (Vec<EntityNode>, HashMap<String, String>) {
    let mut uuid_map = HashMap::new();
    let mut kept = Vec::new();

    for node in chunk {
        if existing.is_empty() {
            kept.push(node.clone());
            continue;
        }

        match resolve_node_extraction(llm_client, node, existing).await {
            Ok(Some(match_uuid)) if match_uuid != node.base.uuid => {
                uuid_map.insert(node.base.uuid.to_string(), match_uuid.to_string());
            }
            _ => kept.push(node.clone()),
        }
    }

    (kept, uuid_map)
}

/// Ask the LLM whether `node` is a duplicate of one of `candidates`, returning the matching
/// candidate's UUID if so.
async fn resolve_node_extraction(
    llm_client: &dyn LlmClient,
    node: &EntityNode,
    candidates: &[EntityNode],
) -> Result<Option<Uuid>, GraphitiError> {
    let extracted_json = serde_json::json!({"uuid": node.base.uuid, "name": node.base.name, "summary": node.summary});
    let candidates_json: Vec<serde_json::Value> = candidates
        .iter()
        .map(|c| serde_json::json!({"uuid": c.base.uuid, "name": c.base.name, "summary": c.summary}))
        .collect();

    let mut context = HashMap::new();
    context.insert("extracted_node".to_string(), extracted_json);
    context.insert("candidates".to_string(), serde_json::Value::Array(candidates_json));

    let messages = crate::prompts::dedupe_nodes::resolve_extraction(&context);
    let response = llm_client
        .generate_response(&to_llm_messages(messages), None, None, ModelSize::Small)
        .await?;

    Ok(response
        .get("match_uuid")
        .and_then(|v| v.as_str())
        .and_then(|s| Uuid::parse_str(s).ok()))
}

/// Create an `IS_DUPLICATE_OF` edge from every non-canonical node in `uuid_map` to the
/// canonical node it was folded into, skipping pairs that already have one.
pub async fn build_duplicate_of_edges(
    clients: &GraphitiClients,
    group_id: &str,
    uuid_map: &HashMap<String, String>,
) -> Result<Vec<EntityEdge>, GraphitiError> {
    let pairs: Vec<(Uuid, Uuid)> = uuid_map
        .iter()
        .filter(|(extracted, canonical)| extracted.as_str() != canonical.as_str())
        .filter_map(|(extracted, canonical)| {
            Some((Uuid::parse_str(extracted).ok()?, Uuid::parse_str(canonical).ok()?))
        })
        .collect();

    let futures: Vec<_> = pairs
        .into_iter()
        .map(|(extracted, canonical)| async move {
            let existing = clients
                .database
                .find_edges(
                    Some(&extracted.to_string()),
                    Some(&canonical.to_string()),
                    Some("IS_DUPLICATE_OF"),
                )
                .await
                .unwrap_or_default();
            if !existing.is_empty() {
                return None;
            }
            Some(EntityEdge::new(
                group_id.to_string(),
                extracted,
                canonical,
                "IS_DUPLICATE_OF".to_string(),
                "is a duplicate of".to_string(),
                None,
            ))
        })
        .collect();

    Ok(semaphore_gather(futures, None).await.into_iter().flatten().collect())
}

/// Physically merge `duplicate` into `canonical`: rewire every non-`IS_DUPLICATE_OF` edge
/// touching `duplicate` onto `canonical`, union attributes, preserve an audit
/// `IS_DUPLICATE_OF` edge, and tombstone `duplicate` in place. Idempotent: a second call
/// after the first has nothing left to rewire and simply re-applies the same attribute
/// union and tombstone markers.
pub async fn merge_node_into(
    clients: &GraphitiClients,
    canonical_uuid: Uuid,
    duplicate_uuid: Uuid,
) -> Result<(), GraphitiError> {
    if canonical_uuid == duplicate_uuid {
        return Ok(());
    }

    let database = clients.database.as_ref();

    let Some(canonical_data) = database.get_node(&canonical_uuid.to_string()).await? else {
        return Err(GraphitiError::NodeNotFound { uuid: canonical_uuid });
    };
    let Some(duplicate_data) = database.get_node(&duplicate_uuid.to_string()).await? else {
        return Ok(());
    };

    let mut canonical = node_data_to_entity_node(&canonical_data)?;
    let mut duplicate = node_data_to_entity_node(&duplicate_data)?;

    let outgoing = database.find_edges(Some(&duplicate_uuid.to_string()), None, None).await?;
    for data in outgoing.into_iter().filter(|e| e.relationship_type != "IS_DUPLICATE_OF") {
        if let Ok(mut edge) = edge_data_to_entity_edge(&data) {
            edge.delete(database).await?;
            edge.base.source_node_uuid = canonical_uuid;
            edge.save(database).await?;
        }
    }

    let incoming = database.find_edges(None, Some(&duplicate_uuid.to_string()), None).await?;
    for data in incoming.into_iter().filter(|e| e.relationship_type != "IS_DUPLICATE_OF") {
        if let Ok(mut edge) = edge_data_to_entity_edge(&data) {
            edge.delete(database).await?;
            edge.base.target_node_uuid = canonical_uuid;
            edge.save(database).await?;
        }
    }

    for (key, value) in duplicate.attributes.drain() {
        match canonical.attributes.get_mut(&key) {
            None => {
                canonical.attributes.insert(key, value);
            }
            Some(existing) => {
                if let (Some(existing_arr), Some(new_arr)) = (existing.as_array().cloned(), value.as_array()) {
                    let mut union = existing_arr;
                    for item in new_arr {
                        if !union.contains(item) {
                            union.push(item.clone());
                        }
                    }
                    *existing = serde_json::Value::Array(union);
                }
            }
        }
    }

    let existing_audit = database
        .find_edges(
            Some(&duplicate_uuid.to_string()),
            Some(&canonical_uuid.to_string()),
            Some("IS_DUPLICATE_OF"),
        )
        .await
        .unwrap_or_default();
    if existing_audit.is_empty() {
        EntityEdge::new(
            canonical.base.group_id.clone(),
            duplicate_uuid,
            canonical_uuid,
            "IS_DUPLICATE_OF".to_string(),
            "is a duplicate of".to_string(),
            None,
        )
        .save(database)
        .await?;
    }

    let now = utc_now();
    duplicate
        .attributes
        .insert("redirects_to".to_string(), serde_json::Value::String(canonical_uuid.to_string()));
    duplicate
        .attributes
        .insert("deleted_at".to_string(), serde_json::Value::String(now.to_rfc3339()));
    duplicate.save(database).await?;

    canonical.save(database).await?;

    Ok(())
}

/// Find existing edges between the same endpoints as `edges` that are contradicted by them,
/// and return copies of those existing edges with `invalid_at`/`expired_at` set.
pub async fn invalidate_contradicted_edges(
    clients: &GraphitiClients,
    llm_client: &dyn LlmClient,
    edges: &[EntityEdge],
) -> Result<Vec<EntityEdge>, GraphitiError> {
    if edges.is_empty() {
        return Ok(Vec::new());
    }

    let relevant = get_relevant_edges(clients, edges, &SearchFilters::default())
        .await
        .unwrap_or_default();
    if relevant.is_empty() {
        return Ok(Vec::new());
    }

    let existing_json: Vec<serde_json::Value> = relevant
        .iter()
        .map(|e| serde_json::json!({"uuid": e.base.uuid, "fact": e.fact}))
        .collect();
    let new_content = edges.iter().map(|e| e.fact.clone()).collect::<Vec<_>>().join("\n");

    let mut context = HashMap::new();
    context.insert("edges".to_string(), serde_json::Value::Array(existing_json));
    context.insert("new_content".to_string(), serde_json::Value::String(new_content));

    let messages = crate::prompts::invalidate_edges::invalidate(&context);
    let response = llm_client
        .generate_response(&to_llm_messages(messages), None, None, ModelSize::Small)
        .await?;

    let earliest_new_valid_at = edges.iter().filter_map(|e| e.valid_at).min();
    let now = utc_now();

    let mut invalidated = Vec::new();
    if let Some(uuids) = response.get("contradicted_edge_uuids").and_then(|v| v.as_array()) {
        for uuid_value in uuids {
            let Some(uuid) = uuid_value.as_str().and_then(|s| Uuid::parse_str(s).ok()) else {
                continue;
            };
            if let Some(mut edge) = relevant.iter().find(|e| e.base.uuid == uuid).cloned() {
                edge.invalid_at = earliest_new_valid_at.or(Some(now));
                edge.expired_at = Some(now);
                invalidated.push(edge);
            }
        }
    }

    Ok(invalidated)
}

/// Deduplicate edges in bulk: group by node pair, then merge within each group.
pub async fn dedupe_edges_bulk(
    clients: &GraphitiClients,
    llm_client: &dyn LlmClient,
    extracted_edges: Vec<EntityEdge>,
) -> Result<Vec<EntityEdge>, GraphitiError> {
    let compressed_edges = compress_edges(llm_client, extracted_edges).await?;

    let edge_chunks: Vec<Vec<EntityEdge>> =
        compressed_edges.chunks(CHUNK_SIZE).map(|chunk| chunk.to_vec()).collect();

    let dedupe_futures: Vec<_> = edge_chunks
        .into_iter()
        .map(|chunk| async move {
            let relevant = get_relevant_edges(clients, &chunk, &SearchFilters::default()).await.unwrap_or_default();
            dedupe_edge_list(llm_client, chunk, &relevant).await
        })
        .collect();

    let resolved_edge_chunks = semaphore_gather(dedupe_futures, None).await;
    Ok(resolved_edge_chunks.into_iter().flatten().collect())
}

/// Drop edges from `chunk` that the LLM judges to duplicate a fact already present among
/// `existing`. Contradictions surfaced by the same adjudication are left for
/// `invalidate_contradicted_edges` to act on; this pass only decides duplication.
async fn dedupe_edge_list(llm_client: &dyn LlmClient, chunk: Vec<EntityEdge>, existing: &[EntityEdge]) -> Vec<EntityEdge> {
    let mut kept = Vec::new();

    for edge in chunk {
        if existing.is_empty() {
            kept.push(edge);
            continue;
        }

        match resolve_edge_extraction(llm_client, &edge, existing).await {
            Ok(Some(duplicate_uuid)) if duplicate_uuid != edge.base.uuid => {}
            _ => kept.push(edge),
        }
    }

    kept
}

/// Ask the LLM whether `edge` duplicates one of `candidates`, returning the duplicated
/// candidate's UUID if so.
async fn resolve_edge_extraction(
    llm_client: &dyn LlmClient,
    edge: &EntityEdge,
    candidates: &[EntityEdge],
) -> Result<Option<Uuid>, GraphitiError> {
    let extracted_json = serde_json::json!({"uuid": edge.base.uuid, "fact": edge.fact});
    let candidates_json: Vec<serde_json::Value> =
        candidates.iter().map(|c| serde_json::json!({"uuid": c.base.uuid, "fact": c.fact})).collect();

    let mut context = HashMap::new();
    context.insert("extracted_edge".to_string(), extracted_json);
    context.insert("candidates".to_string(), serde_json::Value::Array(candidates_json));

    let messages = crate::prompts::dedupe_edges::resolve_extraction(&context);
    let response = llm_client
        .generate_response(&to_llm_messages(messages), None, None, ModelSize::Small)
        .await?;

    Ok(response
        .get("duplicate_edge_uuid")
        .and_then(|v| v.as_str())
        .and_then(|s| Uuid::parse_str(s).ok()))
}

/// Match nodes by name to find duplicates within a single batch.
fn node_name_match(nodes: Vec<EntityNode>) -> (Vec<EntityNode>, HashMap<String, String>) {
    let mut uuid_map = HashMap::new();
    let mut name_map: HashMap<String, EntityNode> = HashMap::new();
    let mut unique_nodes = Vec::new();

    for node in nodes {
        if let Some(existing_node) = name_map.get(&node.base.name) {
            uuid_map.insert(node.base.uuid.to_string(), existing_node.base.uuid.to_string());
        } else {
            name_map.insert(node.base.name.clone(), node.clone());
            unique_nodes.push(node);
        }
    }

    (unique_nodes, uuid_map)
}

/// Compress nodes using LLM-based deduplication within similarity-sized chunks,
/// recursing until a round makes no further progress.
async fn compress_nodes(
    clients: &GraphitiClients,
    llm_client: &dyn LlmClient,
    nodes: Vec<EntityNode>,
    uuid_map: HashMap<String, String>,
) -> Result<(Vec<EntityNode>, HashMap<String, String>), GraphitiError> {
    if nodes.is_empty() {
        return Ok((nodes, uuid_map));
    }

    let nodes_before = nodes.len();
    let chunk_size = (nodes.len() as f64).sqrt().max(CHUNK_SIZE as f64) as usize;
    let node_chunks: Vec<Vec<EntityNode>> = nodes.chunks(chunk_size).map(|chunk| chunk.to_vec()).collect();

    let dedupe_futures: Vec<_> = node_chunks
        .into_iter()
        .map(|chunk| async move { dedupe_node_chunk_llm(llm_client, chunk).await })
        .collect();

    let results = semaphore_gather(dedupe_futures, None).await;

    let mut extended_map = uuid_map;
    let mut compressed_nodes = Vec::new();

    for result in results {
        let (chunk_nodes, chunk_uuid_map) = result?;
        compressed_nodes.extend(chunk_nodes);
        extended_map.extend(chunk_uuid_map);
    }

    if compressed_nodes.len() == nodes_before {
        let compressed_map = compress_uuid_map(extended_map);

        // The survivor the LLM picked for a component isn't necessarily the
        // lexicographically smallest UUID in it; relabel each surviving node to its
        // component's canonical UUID so the node actually persisted matches what
        // `compressed_map` tells every other caller (edge-pointer rewriting included)
        // to point at.
        let mut canonical_nodes: HashMap<String, EntityNode> = HashMap::new();
        for mut node in compressed_nodes {
            let original_uuid = node.base.uuid.to_string();
            let canonical_uuid = compressed_map.get(&original_uuid).cloned().unwrap_or(original_uuid);
            if canonical_uuid != node.base.uuid.to_string() {
                if let Ok(uuid) = Uuid::parse_str(&canonical_uuid) {
                    node.base.uuid = uuid;
                }
            }
            canonical_nodes.entry(canonical_uuid).or_insert(node);
        }

        Ok((canonical_nodes.into_values().collect(), compressed_map))
    } else {
        Box::pin(compress_nodes(clients, llm_client, compressed_nodes, extended_map)).await
    }
}

/// Ask the LLM which nodes in a chunk are duplicates of each other, folding the losers'
/// UUIDs into the winners' and returning only the survivors.
async fn dedupe_node_chunk_llm(
    llm_client: &dyn LlmClient,
    chunk: Vec<EntityNode>,
) -> Result<(Vec<EntityNode>, HashMap<String, String>), GraphitiError> {
    if chunk.len() < 2 {
        return Ok((chunk, HashMap::new()));
    }

    let node_summaries: Vec<serde_json::Value> = chunk
        .iter()
        .map(|n| {
            serde_json::json!({
                "uuid": n.base.uuid.to_string(),
                "name": n.base.name,
                "summary": n.summary,
            })
        })
        .collect();

    let mut context = HashMap::new();
    context.insert("nodes".to_string(), serde_json::Value::Array(node_summaries));

    let messages = to_llm_messages(crate::prompts::dedupe_nodes::dedupe(&context));
    let response = llm_client
        .generate_response(&messages, None, None, ModelSize::Small)
        .await?;

    let mut uuid_map = HashMap::new();
    if let Some(duplicates) = response.get("duplicates").and_then(|v| v.as_array()) {
        for dup in duplicates {
            let uuid = dup.get("uuid").and_then(|v| v.as_str());
            let duplicate_of = dup.get("duplicate_of").and_then(|v| v.as_str());
            if let (Some(uuid), Some(duplicate_of)) = (uuid, duplicate_of) {
                uuid_map.insert(uuid.to_string(), duplicate_of.to_string());
            }
        }
    }

    let survivors = chunk
        .into_iter()
        .filter(|n| !uuid_map.contains_key(&n.base.uuid.to_string()))
        .collect();

    Ok((survivors, uuid_map))
}

/// Compress edges using LLM-based deduplication, grouped by node pair.
async fn compress_edges(llm_client: &dyn LlmClient, edges: Vec<EntityEdge>) -> Result<Vec<EntityEdge>, GraphitiError> {
    if edges.is_empty() {
        return Ok(edges);
    }

    let edge_chunks = chunk_edges_by_nodes(edges);

    let dedupe_futures: Vec<_> = edge_chunks
        .into_iter()
        .map(|chunk| async move { dedupe_edge_chunk_llm(llm_client, chunk).await })
        .collect();

    let results = semaphore_gather(dedupe_futures, None).await;
    let mut compressed_edges = Vec::new();
    for result in results {
        compressed_edges.extend(result?);
    }

    Ok(compressed_edges)
}

/// Ask the LLM which edges in a chunk express the same fact, returning only the survivors.
async fn dedupe_edge_chunk_llm(
    llm_client: &dyn LlmClient,
    chunk: Vec<EntityEdge>,
) -> Result<Vec<EntityEdge>, GraphitiError> {
    if chunk.len() < 2 {
        return Ok(chunk);
    }

    let edge_summaries: Vec<serde_json::Value> = chunk
        .iter()
        .map(|e| {
            serde_json::json!({
                "uuid": e.base.uuid.to_string(),
                "name": e.name,
                "fact": e.fact,
            })
        })
        .collect();

    let mut context = HashMap::new();
    context.insert("edges".to_string(), serde_json::Value::Array(edge_summaries));

    let messages = to_llm_messages(crate::prompts::dedupe_edges::dedupe(&context));
    let response = llm_client
        .generate_response(&messages, None, None, ModelSize::Small)
        .await?;

    let mut dropped: std::collections::HashSet<String> = std::collections::HashSet::new();
    if let Some(duplicates) = response.get("duplicates").and_then(|v| v.as_array()) {
        for dup in duplicates {
            if let Some(uuid) = dup.get("uuid").and_then(|v| v.as_str()) {
                dropped.insert(uuid.to_string());
            }
        }
    }

    Ok(chunk
        .into_iter()
        .filter(|e| !dropped.contains(&e.base.uuid.to_string()))
        .collect())
}

/// Compress a flat "duplicate -> duplicate_of" mapping into true connected-component
/// canonicalization: every UUID mentioned on either side of any pair (not just the map's
/// keys) ends up pointing at the lexicographically smallest UUID in its connected component,
/// rather than whatever value a directed chain happens to terminate at.
fn compress_uuid_map(uuid_map: HashMap<String, String>) -> HashMap<String, String> {
    fn find(parent: &mut HashMap<String, String>, uuid: &str) -> String {
        let next = parent.get(uuid).cloned().unwrap_or_else(|| uuid.to_string());
        if next == uuid {
            return next;
        }
        let root = find(parent, &next);
        parent.insert(uuid.to_string(), root.clone());
        root
    }

    fn union(parent: &mut HashMap<String, String>, a: &str, b: &str) {
        let root_a = find(parent, a);
        let root_b = find(parent, b);
        if root_a == root_b {
            return;
        }
        // Always attach the larger root under the smaller one, so the root of any
        // component converges on its global minimum regardless of processing order.
        if root_a < root_b {
            parent.insert(root_b, root_a);
        } else {
            parent.insert(root_a, root_b);
        }
    }

    let mut parent: HashMap<String, String> = HashMap::new();
    let mut members: std::collections::BTreeSet<String> = std::collections::BTreeSet::new();

    for (key, value) in &uuid_map {
        members.insert(key.clone());
        members.insert(value.clone());
        union(&mut parent, key, value);
    }

    members
        .into_iter()
        .map(|uuid| {
            let canonical = find(&mut parent, &uuid);
            (uuid, canonical)
        })
        .collect()
}

/// Resolve edge pointers using UUID mapping
pub fn resolve_edge_pointers<E: AsRef<EntityEdge> + AsMut<EntityEdge>>(
    edges: &mut [E],
    uuid_map: &HashMap<String, String>,
) {
    for edge in edges {
        let edge = edge.as_mut();

        if let Some(new_uuid) = uuid_map.get(&edge.base.source_node_uuid.to_string()) {
            if let Ok(uuid) = Uuid::parse_str(new_uuid) {
                edge.base.source_node_uuid = uuid;
            }
        }

        if let Some(new_uuid) = uuid_map.get(&edge.base.target_node_uuid.to_string()) {
            if let Ok(uuid) = Uuid::parse_str(new_uuid) {
                edge.base.target_node_uuid = uuid;
            }
        }
    }
}

/// Extract edge dates in bulk, looking up each edge's originating episode.
pub async fn extract_edge_dates_bulk(
    llm_client: &dyn LlmClient,
    extracted_edges: Vec<EntityEdge>,
    episode_pairs: Vec<(EpisodicNode, Vec<EpisodicNode>)>,
) -> Result<Vec<EntityEdge>, GraphitiError> {
    let mut edges_with_episodes: Vec<EntityEdge> =
        extracted_edges.into_iter().filter(|e| !e.episodes.is_empty()).collect();

    let episode_uuid_map: HashMap<String, (EpisodicNode, Vec<EpisodicNode>)> = episode_pairs
        .into_iter()
        .map(|(episode, previous_episodes)| (episode.base.uuid.to_string(), (episode, previous_episodes)))
        .collect();

    let date_futures: Vec<_> = edges_with_episodes
        .iter()
        .map(|edge| {
            let episode_uuid_map = &episode_uuid_map;
            async move {
                if let Some(episode_uuid) = edge.episodes.first() {
                    if let Some((episode, _previous_episodes)) = episode_uuid_map.get(&episode_uuid.to_string()) {
                        return extract_edge_dates_llm(llm_client, edge, episode)
                            .await
                            .unwrap_or((None, None));
                    }
                }
                (None, None)
            }
        })
        .collect();

    let results = semaphore_gather(date_futures, None).await;

    for (i, (valid_at, invalid_at)) in results.into_iter().enumerate() {
        let edge = &mut edges_with_episodes[i];
        edge.valid_at = valid_at;
        edge.invalid_at = invalid_at;

        if edge.invalid_at.is_some() {
            edge.expired_at = Some(utc_now());
        }
    }

    Ok(edges_with_episodes)
}

/// Ask the LLM for the valid_at/invalid_at window of a single fact, given the episode
/// it was extracted from.
async fn extract_edge_dates_llm(
    llm_client: &dyn LlmClient,
    edge: &EntityEdge,
    episode: &EpisodicNode,
) -> Result<(Option<DateTime<Utc>>, Option<DateTime<Utc>>), GraphitiError> {
    let mut context = HashMap::new();
    context.insert("fact".to_string(), serde_json::Value::String(edge.fact.clone()));
    context.insert(
        "episode_content".to_string(),
        serde_json::Value::String(episode.content.clone()),
    );
    context.insert(
        "reference_time".to_string(),
        serde_json::Value::String(episode.valid_at.to_rfc3339()),
    );

    let messages = to_llm_messages(crate::prompts::extract_edge_dates::extract_dates(&context));
    let response = llm_client
        .generate_response(&messages, None, None, ModelSize::Small)
        .await?;

    let valid_at = response
        .get("valid_at")
        .and_then(|v| v.as_str())
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc));

    let invalid_at = response
        .get("invalid_at")
        .and_then(|v| v.as_str())
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc));

    Ok((valid_at, invalid_at))
}

/// Group edges by node pair for deduplication, dropping self-loops.
fn chunk_edges_by_nodes(edges: Vec<EntityEdge>) -> Vec<Vec<EntityEdge>> {
    let mut edge_chunk_map: HashMap<String, Vec<EntityEdge>> = HashMap::new();

    for edge in edges {
        if edge.base.source_node_uuid == edge.base.target_node_uuid {
            continue;
        }

        let mut pointers = vec![edge.base.source_node_uuid.to_string(), edge.base.target_node_uuid.to_string()];
        pointers.sort();
        let key = pointers.join("");

        edge_chunk_map.entry(key).or_default().push(edge);
    }

    edge_chunk_map.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_name_match() {
        let nodes = vec![
            EntityNode::new("Alice".to_string(), "group1".to_string(), String::new()),
            EntityNode::new("Bob".to_string(), "group1".to_string(), String::new()),
            EntityNode::new("Alice".to_string(), "group1".to_string(), String::new()),
        ];

        let (unique_nodes, uuid_map) = node_name_match(nodes);

        assert_eq!(unique_nodes.len(), 2);
        assert_eq!(uuid_map.len(), 1);
    }

    #[test]
    fn test_compress_uuid_map() {
        // a < b < c < d < e; (a,b) and (b,c) chain into one component canonicalized on
        // "a", (d,e) is its own component canonicalized on "d" — every UUID that appears
        // on either side of a pair ends up mapped to its component's lexicographic min.
        let mut uuid_map = HashMap::new();
        uuid_map.insert("a".to_string(), "b".to_string());
        uuid_map.insert("b".to_string(), "c".to_string());
        uuid_map.insert("d".to_string(), "e".to_string());

        let compressed = compress_uuid_map(uuid_map);

        assert_eq!(compressed.get("a"), Some(&"a".to_string()));
        assert_eq!(compressed.get("b"), Some(&"a".to_string()));
        assert_eq!(compressed.get("c"), Some(&"a".to_string()));
        assert_eq!(compressed.get("d"), Some(&"d".to_string()));
        assert_eq!(compressed.get("e"), Some(&"d".to_string()));
    }

    #[test]
    fn test_chunk_edges_by_nodes() {
        let edges = vec![
            EntityEdge::new(
                "group1".to_string(),
                Uuid::new_v4(),
                Uuid::new_v4(),
                "rel".to_string(),
                "fact".to_string(),
                None,
            ),
            EntityEdge::new(
                "group1".to_string(),
                Uuid::new_v4(),
                Uuid::new_v4(),
                "rel".to_string(),
                "fact".to_string(),
                None,
            ),
        ];

        let chunks = chunk_edges_by_nodes(edges);
        assert_eq!(chunks.len(), 2);
    }
}
