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

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    database::traits::{EdgeData, NodeData, QueryParameter},
    edges::EntityEdge,
    embedder::EmbedderClient,
    errors::GraphitiError,
    nodes::{BaseNode, CommunityNode, EntityNode, EpisodeType, EpisodicNode},
    search::{SearchFilters, SearchResult},
    types::GraphitiClients,
};

pub const RELEVANT_SCHEMA_LIMIT: usize = 10;
pub const DEFAULT_MIN_SCORE: f64 = 0.6;
pub const DEFAULT_MMR_LAMBDA: f64 = 0.5;
pub const MAX_SEARCH_DEPTH: i32 = 3;
pub const MAX_QUERY_LENGTH: usize = 32;

fn get_string(props: &HashMap<String, QueryParameter>, key: &str) -> Option<String> {
    match props.get(key) {
        Some(QueryParameter::String(s)) => Some(s.clone()),
        _ => None,
    }
}

fn get_uuid(props: &HashMap<String, QueryParameter>, key: &str) -> Option<Uuid> {
    get_string(props, key).and_then(|s| s.parse().ok())
}

fn get_datetime(props: &HashMap<String, QueryParameter>, key: &str) -> Option<DateTime<Utc>> {
    get_string(props, key).and_then(|s| DateTime::parse_from_rfc3339(&s).ok().map(|d| d.with_timezone(&Utc)))
}

fn get_embedding(props: &HashMap<String, QueryParameter>, key: &str) -> Option<Vec<f32>> {
    match props.get(key) {
        Some(QueryParameter::List(items)) => Some(
            items
                .iter()
                .map(|p| match p {
                    QueryParameter::Float(f) => *f as f32,
                    QueryParameter::Integer(i) => *i as f32,
                    _ => 0.0,
                })
                .collect(),
        ),
        _ => None,
    }
}

fn get_float(props: &HashMap<String, QueryParameter>, key: &str) -> Option<f64> {
    match props.get(key) {
        Some(QueryParameter::Float(f)) => Some(*f),
        Some(QueryParameter::Integer(i)) => Some(*i as f64),
        _ => None,
    }
}

fn get_uuid_list(props: &HashMap<String, QueryParameter>, key: &str) -> Vec<Uuid> {
    match props.get(key) {
        Some(QueryParameter::List(items)) => items
            .iter()
            .filter_map(|p| match p {
                QueryParameter::String(s) => s.parse().ok(),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Reverse of `nodes::json_to_query_parameter`, used to reconstruct free-form attributes.
fn query_param_to_json(value: &QueryParameter) -> serde_json::Value {
    match value {
        QueryParameter::String(s) => serde_json::Value::String(s.clone()),
        QueryParameter::Integer(i) => serde_json::Value::Number((*i).into()),
        QueryParameter::Float(f) => serde_json::Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        QueryParameter::Boolean(b) => serde_json::Value::Bool(*b),
        QueryParameter::Null => serde_json::Value::Null,
        QueryParameter::List(items) => serde_json::Value::Array(items.iter().map(query_param_to_json).collect()),
        QueryParameter::Map(map) => {
            serde_json::Value::Object(map.iter().map(|(k, v)| (k.clone(), query_param_to_json(v))).collect())
        }
    }
}

/// Property keys that are surfaced as typed struct fields rather than free-form attributes.
const ENTITY_NODE_RESERVED_KEYS: &[&str] = &[
    "uuid",
    "name",
    "group_id",
    "created_at",
    "summary",
    "name_embedding",
    "labels",
    "pagerank_centrality",
    "degree_centrality",
    "betweenness_centrality",
];

fn base_node_from_props(props: &HashMap<String, QueryParameter>, labels: Vec<String>) -> BaseNode {
    BaseNode::new(
        get_string(props, "name").unwrap_or_default(),
        get_string(props, "group_id").unwrap_or_default(),
    )
    .with_uuid(get_uuid(props, "uuid").unwrap_or_else(Uuid::new_v4))
    .with_labels(labels)
    .with_created_at(get_datetime(props, "created_at").unwrap_or_else(Utc::now))
}

pub fn node_data_to_entity_node(data: &NodeData) -> Result<EntityNode, GraphitiError> {
    let base = base_node_from_props(&data.properties, data.labels.clone());
    let mut attributes = HashMap::new();
    for (key, value) in &data.properties {
        if !ENTITY_NODE_RESERVED_KEYS.contains(&key.as_str()) {
            attributes.insert(key.clone(), query_param_to_json(value));
        }
    }

    let centrality = match (
        get_float(&data.properties, "pagerank_centrality"),
        get_float(&data.properties, "degree_centrality"),
        get_float(&data.properties, "betweenness_centrality"),
    ) {
        (None, None, None) => None,
        (pagerank, degree, betweenness) => Some(crate::nodes::NodeCentrality {
            pagerank: pagerank.unwrap_or(0.0),
            degree: degree.unwrap_or(0.0),
            betweenness: betweenness.unwrap_or(0.0),
        }),
    };

    Ok(EntityNode {
        base,
        summary: get_string(&data.properties, "summary").unwrap_or_default(),
        attributes,
        name_embedding: get_embedding(&data.properties, "name_embedding"),
        centrality,
    })
}

pub fn node_data_to_episodic_node(data: &NodeData) -> Result<EpisodicNode, GraphitiError> {
    let base = base_node_from_props(&data.properties, data.labels.clone());
    let source = get_string(&data.properties, "source")
        .map(|s| EpisodeType::from_str(&s))
        .transpose()?
        .unwrap_or(EpisodeType::Text);

    Ok(EpisodicNode {
        base,
        source,
        source_description: get_string(&data.properties, "source_description").unwrap_or_default(),
        content: get_string(&data.properties, "content").unwrap_or_default(),
        valid_at: get_datetime(&data.properties, "valid_at").unwrap_or_else(Utc::now),
        entity_edges: get_uuid_list(&data.properties, "entity_edges"),
    })
}

pub fn node_data_to_community_node(data: &NodeData) -> Result<CommunityNode, GraphitiError> {
    let base = base_node_from_props(&data.properties, data.labels.clone());
    Ok(CommunityNode {
        base,
        summary: get_string(&data.properties, "summary").unwrap_or_default(),
        name_embedding: get_embedding(&data.properties, "name_embedding"),
    })
}

const ENTITY_EDGE_RESERVED_KEYS: &[&str] = &[
    "uuid",
    "name",
    "group_id",
    "created_at",
    "fact",
    "source_node_uuid",
    "target_node_uuid",
    "episodes",
    "expired_at",
    "valid_at",
    "invalid_at",
    "fact_embedding",
];

pub fn edge_data_to_entity_edge(data: &EdgeData) -> Result<EntityEdge, GraphitiError> {
    let props = &data.properties;
    let mut attributes = HashMap::new();
    for (key, value) in props {
        if !ENTITY_EDGE_RESERVED_KEYS.contains(&key.as_str()) {
            attributes.insert(key.clone(), query_param_to_json(value));
        }
    }

    Ok(EntityEdge {
        base: crate::edges::BaseEdge {
            uuid: get_uuid(props, "uuid").unwrap_or_else(Uuid::new_v4),
            group_id: get_string(props, "group_id").unwrap_or_default(),
            source_node_uuid: get_uuid(props, "source_node_uuid").ok_or_else(|| {
                GraphitiError::Validation { message: "edge missing source_node_uuid".to_string() }
            })?,
            target_node_uuid: get_uuid(props, "target_node_uuid").ok_or_else(|| {
                GraphitiError::Validation { message: "edge missing target_node_uuid".to_string() }
            })?,
            created_at: get_datetime(props, "created_at").unwrap_or_else(Utc::now),
        },
        name: get_string(props, "name").unwrap_or_default(),
        fact: get_string(props, "fact").unwrap_or_default(),
        fact_embedding: get_embedding(props, "fact_embedding"),
        episodes: get_uuid_list(props, "episodes"),
        expired_at: get_datetime(props, "expired_at"),
        valid_at: get_datetime(props, "valid_at"),
        invalid_at: get_datetime(props, "invalid_at"),
        attributes,
    })
}

/// Sanitize a query string for Lucene full-text search.
pub fn lucene_sanitize(query: &str) -> String {
    let mut sanitized = String::with_capacity(query.len());
    for c in query.chars() {
        match c {
            '+' | '-' | '&' | '|' | '!' | '(' | ')' | '{' | '}' | '[' | ']' | '^' | '"' | '~' | '*' | '?' | ':'
            | '\\' | 'O' | 'R' | 'N' | 'T' | 'A' | 'D' => {
                sanitized.push('\\');
                sanitized.push(c);
            }
            c if c.is_alphanumeric() || c.is_whitespace() => sanitized.push(c),
            _ => {}
        }
    }
    sanitized
}

/// Build a full-text search query string with group filtering.
pub fn fulltext_query(query: &str, group_ids: Option<&[String]>) -> String {
    let mut group_ids_filter = String::new();
    if let Some(groups) = group_ids {
        let group_filters: Vec<String> = groups.iter().map(|g| format!("group_id:\"{}\"", g)).collect();
        if !group_filters.is_empty() {
            group_ids_filter = group_filters.join(" OR ");
            group_ids_filter.push_str(" AND ");
        }
    }

    let lucene_query = lucene_sanitize(query);

    if lucene_query.split_whitespace().count() + group_ids.map_or(0, |g| g.len()) >= MAX_QUERY_LENGTH {
        return String::new();
    }

    format!("{}({})", group_ids_filter, lucene_query)
}

/// Get episodes mentioned by a set of edges (via `EntityEdge::episodes`).
pub async fn get_episodes_by_mentions(
    clients: &GraphitiClients,
    _nodes: &[EntityNode],
    edges: &[EntityEdge],
    limit: usize,
) -> Result<Vec<EpisodicNode>, GraphitiError> {
    let mut episode_uuids: Vec<Uuid> = edges.iter().flat_map(|e| e.episodes.iter().cloned()).collect();
    episode_uuids.dedup();
    episode_uuids.truncate(limit);

    let mut episodes = Vec::new();
    for uuid in episode_uuids {
        if let Some(data) = clients.database.get_node(&uuid.to_string()).await? {
            episodes.push(node_data_to_episodic_node(&data)?);
        }
    }

    Ok(episodes)
}

/// Get entity nodes mentioned by a set of episodes (via `EpisodicNode::entity_edges`).
pub async fn get_mentioned_nodes(
    clients: &GraphitiClients,
    episodes: &[EpisodicNode],
) -> Result<Vec<EntityNode>, GraphitiError> {
    let mut entity_uuids = std::collections::HashSet::new();
    for episode in episodes {
        for entity_uuid in &episode.entity_edges {
            entity_uuids.insert(*entity_uuid);
        }
    }

    let mut nodes = Vec::new();
    for uuid in entity_uuids {
        if let Some(data) = clients.database.get_node(&uuid.to_string()).await? {
            nodes.push(node_data_to_entity_node(&data)?);
        }
    }

    Ok(nodes)
}

/// Get the communities a set of entity nodes belong to (via HAS_MEMBER edges).
pub async fn get_communities_by_nodes(
    clients: &GraphitiClients,
    nodes: &[EntityNode],
) -> Result<Vec<CommunityNode>, GraphitiError> {
    let mut communities = Vec::new();
    for node in nodes {
        let edges = clients
            .database
            .find_edges(None, Some(&node.base.uuid.to_string()), Some("HAS_MEMBER"))
            .await?;
        for edge in edges {
            if let Some(data) = clients.database.get_node(&edge.source_id).await? {
                communities.push(node_data_to_community_node(&data)?);
            }
        }
    }

    Ok(communities)
}

/// Fetch every node referenced by `chunk`, keyed by name, for LLM-based dedup context.
/// Candidate pool size per extracted node, per search modality, when looking for entities
/// it might be a duplicate of.
pub const RELEVANT_NODE_CANDIDATES: usize = 10;

/// Hybrid candidate retrieval for node resolution: each node in `chunk` is matched against
/// the existing graph both by full-text/fuzzy name search and by vector similarity over its
/// name embedding, exactly the "fuzzy exact match" + "vector over name_embedding" pairing
/// node resolution calls for. Candidates from both modalities are pooled and deduplicated by
/// UUID; the LLM adjudication step (`dedupe_node_list`) decides which, if any, is a match.
pub async fn get_relevant_nodes(
    clients: &GraphitiClients,
    chunk: &[EntityNode],
    filters: &SearchFilters,
) -> Result<Vec<EntityNode>, GraphitiError> {
    let group_ids: Vec<String> = {
        let mut seen = std::collections::HashSet::new();
        chunk
            .iter()
            .map(|n| n.base.group_id.clone())
            .filter(|g| seen.insert(g.clone()))
            .collect()
    };
    let group_ids = if group_ids.is_empty() { None } else { Some(group_ids.as_slice()) };

    let mut relevant: HashMap<String, EntityNode> = HashMap::new();
    for node in chunk.iter().take(RELEVANT_SCHEMA_LIMIT) {
        let fulltext_hits =
            node_fulltext_search(clients, &node.base.name, filters, group_ids, RELEVANT_NODE_CANDIDATES)
                .await
                .unwrap_or_default();
        for hit in fulltext_hits {
            relevant.entry(hit.item.base.uuid.to_string()).or_insert(hit.item);
        }

        let embedding = match &node.name_embedding {
            Some(e) => e.clone(),
            None => {
                let raw = clients.embedder.create(node.base.name.trim()).await?;
                crate::helpers::normalize_l2(&raw)
            }
        };

        let vector_hits = node_similarity_search(clients, &embedding, filters, group_ids, RELEVANT_NODE_CANDIDATES)
            .await
            .unwrap_or_default();
        for hit in vector_hits {
            relevant.entry(hit.item.base.uuid.to_string()).or_insert(hit.item);
        }
    }

    Ok(relevant.into_values().collect())
}

/// Candidate pool size per extracted edge, per search modality, when looking for facts it might
/// duplicate or contradict.
pub const RELEVANT_EDGE_CANDIDATES: usize = 10;

/// Hybrid candidate retrieval for edge resolution: each edge in `chunk` is matched against facts
/// already connecting the same node pair both by BM25/fuzzy search over the fact text and by
/// vector similarity over the fact embedding. Candidates from both modalities are pooled and
/// deduplicated by UUID; the LLM adjudication step (`dedupe_edge_list`) decides duplication and
/// contradiction.
pub async fn get_relevant_edges(
    clients: &GraphitiClients,
    chunk: &[EntityEdge],
    filters: &SearchFilters,
) -> Result<Vec<EntityEdge>, GraphitiError> {
    let mut relevant: HashMap<String, EntityEdge> = HashMap::new();

    for edge in chunk.iter().take(RELEVANT_SCHEMA_LIMIT) {
        let source = edge.base.source_node_uuid.to_string();
        let target = edge.base.target_node_uuid.to_string();

        let existing = clients.database.find_edges(Some(&source), Some(&target), None).await?;
        for d in existing {
            let e = edge_data_to_entity_edge(&d)?;
            relevant.entry(e.base.uuid.to_string()).or_insert(e);
        }

        let fulltext_hits =
            edge_fulltext_search(clients, &edge.fact, filters, None, RELEVANT_EDGE_CANDIDATES)
                .await
                .unwrap_or_default();
        for hit in fulltext_hits {
            if hit.item.base.source_node_uuid.to_string() == source
                && hit.item.base.target_node_uuid.to_string() == target
            {
                relevant.entry(hit.item.base.uuid.to_string()).or_insert(hit.item);
            }
        }

        let embedding: Vec<f64> = match &edge.fact_embedding {
            Some(e) => e.iter().map(|&v| v as f64).collect(),
            None => {
                let raw = clients.embedder.create(edge.fact.trim()).await?;
                crate::helpers::normalize_l2(&raw).iter().map(|&v| v as f64).collect()
            }
        };

        let vector_hits = edge_similarity_search(
            clients,
            &embedding,
            Some(&source),
            Some(&target),
            filters,
            None,
            RELEVANT_EDGE_CANDIDATES,
            DEFAULT_MIN_SCORE,
        )
        .await
        .unwrap_or_default();
        for hit in vector_hits {
            relevant.entry(hit.item.base.uuid.to_string()).or_insert(hit.item);
        }
    }

    Ok(relevant.into_values().collect())
}

/// Perform full-text search on edges.
pub async fn edge_fulltext_search(
    clients: &GraphitiClients,
    query: &str,
    _search_filter: &SearchFilters,
    group_ids: Option<&[String]>,
    limit: usize,
) -> Result<Vec<SearchResult<EntityEdge>>, GraphitiError> {
    let fuzzy_query = fulltext_query(query, group_ids);
    if fuzzy_query.is_empty() {
        return Ok(Vec::new());
    }

    let nodes = clients.database.fulltext_search(&fuzzy_query, vec!["RELATES_TO".to_string()]).await?;
    let mut results = Vec::new();
    for (rank, data) in nodes.into_iter().take(limit).enumerate() {
        if let Some(edge_data) = clients.database.get_edge(&data.id).await? {
            let score = 1.0 / (rank as f64 + 1.0);
            results.push(SearchResult { item: edge_data_to_entity_edge(&edge_data)?, score });
        }
    }
    Ok(results)
}

/// Perform vector similarity search on edges.
pub async fn edge_similarity_search(
    clients: &GraphitiClients,
    search_vector: &[f64],
    source_node_uuid: Option<&str>,
    target_node_uuid: Option<&str>,
    _search_filter: &SearchFilters,
    _group_ids: Option<&[String]>,
    limit: usize,
    min_score: f64,
) -> Result<Vec<SearchResult<EntityEdge>>, GraphitiError> {
    if search_vector.is_empty() {
        return Ok(Vec::new());
    }

    let edges = clients.database.find_edges(source_node_uuid, target_node_uuid, None).await?;
    let query_vec: Vec<f32> = search_vector.iter().map(|&v| v as f32).collect();

    let mut results = Vec::new();
    for edge_data in edges {
        let edge = edge_data_to_entity_edge(&edge_data)?;
        let Some(ref embedding) = edge.fact_embedding else { continue };
        let score = cosine_similarity(&query_vec, embedding);
        if score >= min_score {
            results.push(SearchResult { item: edge, score });
        }
    }

    results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    results.truncate(limit);
    Ok(results)
}

/// Perform breadth-first search on edges starting from a set of origin nodes.
pub async fn edge_bfs_search(
    clients: &GraphitiClients,
    bfs_origin_node_uuids: Option<&[String]>,
    bfs_max_depth: i32,
    _search_filter: &SearchFilters,
    limit: usize,
) -> Result<Vec<SearchResult<EntityEdge>>, GraphitiError> {
    let Some(origin_uuids) = bfs_origin_node_uuids else {
        return Ok(Vec::new());
    };
    if origin_uuids.is_empty() {
        return Ok(Vec::new());
    }

    let mut visited: std::collections::HashSet<String> = origin_uuids.iter().cloned().collect();
    let mut frontier: Vec<String> = origin_uuids.to_vec();
    let mut results = Vec::new();

    for depth in 0..bfs_max_depth.max(0) {
        if results.len() >= limit || frontier.is_empty() {
            break;
        }
        let mut next_frontier = Vec::new();
        for node_uuid in &frontier {
            let edges = clients.database.find_edges(Some(node_uuid), None, None).await?;
            for edge_data in edges {
                let edge = edge_data_to_entity_edge(&edge_data)?;
                let target = edge.base.target_node_uuid.to_string();
                let score = 1.0 / (depth as f64 + 1.0);
                results.push(SearchResult { item: edge, score });
                if visited.insert(target.clone()) {
                    next_frontier.push(target);
                }
                if results.len() >= limit {
                    break;
                }
            }
        }
        frontier = next_frontier;
    }

    results.truncate(limit);
    Ok(results)
}

/// Node vector similarity search.
pub async fn node_similarity_search(
    clients: &GraphitiClients,
    query_vector: &[f32],
    _filters: &SearchFilters,
    group_ids: Option<&[String]>,
    limit: usize,
) -> Result<Vec<SearchResult<EntityNode>>, GraphitiError> {
    if limit == 0 || query_vector.is_empty() {
        return Ok(Vec::new());
    }
    if let Some(groups) = group_ids {
        if groups.is_empty() {
            return Ok(Vec::new());
        }
    }

    let embedding: Vec<f64> = query_vector.iter().map(|&v| v as f64).collect();
    let hits = clients.database.vector_search(embedding, "Entity", limit).await?;

    let mut results = Vec::new();
    for (data, score) in hits {
        if score < DEFAULT_MIN_SCORE {
            continue;
        }
        if let Some(groups) = group_ids {
            let node_group = get_string(&data.properties, "group_id").unwrap_or_default();
            if !groups.iter().any(|g| g == &node_group) {
                continue;
            }
        }
        results.push(SearchResult { item: node_data_to_entity_node(&data)?, score });
    }

    results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    Ok(results)
}

/// Node full-text search using the backend's fulltext index.
pub async fn node_fulltext_search(
    clients: &GraphitiClients,
    query: &str,
    _filters: &SearchFilters,
    group_ids: Option<&[String]>,
    limit: usize,
) -> Result<Vec<SearchResult<EntityNode>>, GraphitiError> {
    if query.is_empty() || limit == 0 {
        return Ok(Vec::new());
    }

    let search_query = fulltext_query(query, group_ids);
    if search_query.is_empty() {
        return Ok(Vec::new());
    }

    let nodes = clients.database.fulltext_search(&search_query, vec!["Entity".to_string()]).await?;

    let mut results = Vec::new();
    for (rank, data) in nodes.into_iter().take(limit).enumerate() {
        let score = 1.0 / (rank as f64 + 1.0);
        results.push(SearchResult { item: node_data_to_entity_node(&data)?, score });
    }
    Ok(results)
}

/// Episode full-text search using the backend's fulltext index.
pub async fn episode_fulltext_search(
    clients: &GraphitiClients,
    query: &str,
    _filters: &SearchFilters,
    group_ids: Option<&[String]>,
    limit: usize,
) -> Result<Vec<SearchResult<EpisodicNode>>, GraphitiError> {
    if query.is_empty() || limit == 0 {
        return Ok(Vec::new());
    }

    let search_query = fulltext_query(query, group_ids);
    if search_query.is_empty() {
        return Ok(Vec::new());
    }

    let nodes = clients.database.fulltext_search(&search_query, vec!["Episodic".to_string()]).await?;

    let mut results = Vec::new();
    for (rank, data) in nodes.into_iter().take(limit).enumerate() {
        let score = 1.0 / (rank as f64 + 1.0);
        results.push(SearchResult { item: node_data_to_episodic_node(&data)?, score });
    }
    Ok(results)
}

/// Community vector similarity search.
pub async fn community_similarity_search(
    clients: &GraphitiClients,
    query_vector: &[f64],
    limit: usize,
) -> Result<Vec<SearchResult<CommunityNode>>, GraphitiError> {
    if limit == 0 || query_vector.is_empty() {
        return Ok(Vec::new());
    }

    let hits = clients.database.vector_search(query_vector.to_vec(), "Community", limit).await?;
    let mut results = Vec::new();
    for (data, score) in hits {
        if score < DEFAULT_MIN_SCORE {
            continue;
        }
        results.push(SearchResult { item: node_data_to_community_node(&data)?, score });
    }
    results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    Ok(results)
}

/// Community full-text search.
pub async fn community_fulltext_search(
    clients: &GraphitiClients,
    query: &str,
    group_ids: Option<&[String]>,
    limit: usize,
) -> Result<Vec<SearchResult<CommunityNode>>, GraphitiError> {
    let search_query = fulltext_query(query, group_ids);
    if search_query.is_empty() {
        return Ok(Vec::new());
    }

    let nodes = clients.database.fulltext_search(&search_query, vec!["Community".to_string()]).await?;
    let mut results = Vec::new();
    for (rank, data) in nodes.into_iter().take(limit).enumerate() {
        let score = 1.0 / (rank as f64 + 1.0);
        results.push(SearchResult { item: node_data_to_community_node(&data)?, score });
    }
    Ok(results)
}

/// Breadth-first distances from `center` over `RELATES_TO` edges, walked in both directions,
/// used by node-distance reranking. `center` itself has distance 0.
pub async fn bfs_distances(
    clients: &GraphitiClients,
    center: Uuid,
    max_depth: i32,
) -> Result<HashMap<Uuid, usize>, GraphitiError> {
    let mut distances = HashMap::new();
    distances.insert(center, 0usize);
    let mut frontier = vec![center];

    for depth in 1..=max_depth.max(0) as usize {
        if frontier.is_empty() {
            break;
        }
        let mut next_frontier = Vec::new();
        for node in &frontier {
            let outgoing = clients.database.find_edges(Some(&node.to_string()), None, Some("RELATES_TO")).await?;
            let incoming = clients.database.find_edges(None, Some(&node.to_string()), Some("RELATES_TO")).await?;
            for edge_data in outgoing.iter().chain(incoming.iter()) {
                let edge = edge_data_to_entity_edge(edge_data)?;
                let neighbor =
                    if edge.base.source_node_uuid == *node { edge.base.target_node_uuid } else { edge.base.source_node_uuid };
                if !distances.contains_key(&neighbor) {
                    distances.insert(neighbor, depth);
                    next_frontier.push(neighbor);
                }
            }
        }
        frontier = next_frontier;
    }

    Ok(distances)
}

/// Count of `MENTIONS` edges pointing at a node, i.e. how many episodes reference it.
pub async fn node_mention_count(clients: &GraphitiClients, node_uuid: Uuid) -> Result<usize, GraphitiError> {
    let edges = clients.database.find_edges(None, Some(&node_uuid.to_string()), Some("MENTIONS")).await?;
    Ok(edges.len())
}

/// Calculate cosine similarity between two vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        (dot_product / (norm_a * norm_b)) as f64
    }
}

/// Calculate Manhattan distance between two vectors.
pub fn manhattan_distance(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() {
        return f64::INFINITY;
    }

    a.iter().zip(b.iter()).map(|(x, y)| (x - y).abs() as f64).sum()
}

/// Calculate Euclidean distance between two vectors.
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() {
        return f64::INFINITY;
    }

    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let diff = (x - y) as f64;
            diff * diff
        })
        .sum::<f64>()
        .sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lucene_sanitize() {
        assert_eq!(lucene_sanitize("test+query"), "test\\+query");
        assert_eq!(lucene_sanitize("hello world"), "hello world");
        assert_eq!(lucene_sanitize("query*"), "query\\*");
        assert_eq!(lucene_sanitize("ORDER"), "\\O\\R\\D\\E\\R");
    }

    #[test]
    fn test_cosine_similarity() {
        let a = vec![1.0, 2.0, 3.0];
        let b = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-6);

        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!((cosine_similarity(&a, &b) - 0.0).abs() < 1e-6);
    }

    #[test]
    fn test_euclidean_distance() {
        let a = vec![0.0, 0.0];
        let b = vec![3.0, 4.0];
        assert!((euclidean_distance(&a, &b) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_manhattan_distance() {
        let a = vec![0.0, 0.0];
        let b = vec![3.0, 4.0];
        assert!((manhattan_distance(&a, &b) - 7.0).abs() < 1e-6);
    }

    #[test]
    fn test_fulltext_query() {
        let query = fulltext_query("test query", None);
        assert_eq!(query, "(test query)");

        let groups = vec!["group1".to_string(), "group2".to_string()];
        let query = fulltext_query("test", Some(&groups));
        assert!(query.contains("group_id:\"group1\""));
        assert!(query.contains("group_id:\"group2\""));
        assert!(query.contains("test"));
    }

    #[test]
    fn test_node_data_to_entity_node_roundtrip() {
        let mut properties = HashMap::new();
        properties.insert("uuid".to_string(), QueryParameter::String(Uuid::new_v4().to_string()));
        properties.insert("name".to_string(), QueryParameter::String("Alice".to_string()));
        properties.insert("group_id".to_string(), QueryParameter::String("g1".to_string()));
        properties.insert("created_at".to_string(), QueryParameter::String(Utc::now().to_rfc3339()));
        properties.insert("summary".to_string(), QueryParameter::String("An engineer".to_string()));
        properties.insert("role".to_string(), QueryParameter::String("engineer".to_string()));

        let data = NodeData { id: "123".to_string(), labels: vec!["Entity".to_string()], properties };
        let node = node_data_to_entity_node(&data).unwrap();

        assert_eq!(node.base.name, "Alice");
        assert_eq!(node.summary, "An engineer");
        assert_eq!(node.attributes.get("role").unwrap(), &serde_json::json!("engineer"));
    }
}
