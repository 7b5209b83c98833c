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

//! Community detection and summarization: clusters entities by label propagation and
//! keeps each cluster's summary up to date as new entities join.

use std::collections::{HashMap, HashSet};

use uuid::Uuid;

use crate::{
    edges::{CommunityEdge, Edge},
    errors::GraphitiError,
    llm_client::LlmClient,
    nodes::{CommunityNode, EntityNode, Node},
    search::utils::{edge_data_to_entity_edge, node_data_to_community_node, node_data_to_entity_node},
    types::GraphitiClients,
    utils::bulk_utils::to_llm_messages,
};

/// Maximum label-propagation rounds before giving up on convergence.
const MAX_PROPAGATION_ROUNDS: usize = 10;

/// Member count above which a cluster's summary is built by map-reduce instead of a
/// single LLM call.
const SUMMARY_FANOUT: usize = 10;

/// Rebuild every community for the given groups from scratch via label propagation.
pub async fn build_communities(
    clients: &GraphitiClients,
    group_ids: &[String],
) -> Result<Vec<CommunityNode>, GraphitiError> {
    let mut communities = Vec::new();

    for group_id in group_ids {
        let entities = fetch_group_entities(clients, group_id).await?;
        if entities.is_empty() {
            continue;
        }

        let adjacency = fetch_entity_adjacency(clients, group_id, &entities).await?;
        let clusters = label_propagate(&entities, &adjacency);

        for member_uuids in clusters {
            let members: Vec<&EntityNode> = member_uuids
                .iter()
                .filter_map(|uuid| entities.iter().find(|n| &n.base.uuid == uuid))
                .collect();
            if members.is_empty() {
                continue;
            }

            let community = build_community_node(
                clients,
                group_id,
                &members.iter().map(|n| (*n).clone()).collect::<Vec<_>>(),
            )
            .await?;

            for member in &members {
                CommunityEdge::new(group_id.clone(), community.base.uuid, member.base.uuid)
                    .save(clients.database.as_ref())
                    .await?;
            }

            communities.push(community);
        }
    }

    Ok(communities)
}

/// Incrementally fold a newly-created entity into an existing community: adopt the
/// majority community label among its neighbors and refresh that community's summary.
pub async fn update_community_for_entity(
    clients: &GraphitiClients,
    entity: &EntityNode,
) -> Result<(), GraphitiError> {
    let database = clients.database.as_ref();

    let outgoing = database
        .find_edges(Some(&entity.base.uuid.to_string()), None, Some("RELATES_TO"))
        .await?;
    let incoming = database
        .find_edges(None, Some(&entity.base.uuid.to_string()), Some("RELATES_TO"))
        .await?;

    let mut neighbor_uuids: Vec<Uuid> = Vec::new();
    for data in outgoing.iter().chain(incoming.iter()) {
        if let Ok(edge) = edge_data_to_entity_edge(data) {
            let neighbor = if edge.base.source_node_uuid == entity.base.uuid {
                edge.base.target_node_uuid
            } else {
                edge.base.source_node_uuid
            };
            neighbor_uuids.push(neighbor);
        }
    }

    // (community_uuid, neighbor_name) votes, one per neighbor that already belongs to a
    // community.
    let mut votes: Vec<(Uuid, String)> = Vec::new();
    for neighbor_uuid in &neighbor_uuids {
        let memberships = database
            .find_edges(None, Some(&neighbor_uuid.to_string()), Some("HAS_MEMBER"))
            .await?;
        let Some(membership) = memberships.first() else { continue };
        let Ok(community_uuid) = Uuid::parse_str(&membership.source_id) else { continue };
        let neighbor_name = database
            .get_node(&neighbor_uuid.to_string())
            .await?
            .and_then(|data| node_data_to_entity_node(&data).ok())
            .map(|node| node.base.name)
            .unwrap_or_default();
        votes.push((community_uuid, neighbor_name));
    }

    let Some(winning_community) = majority_label(&votes) else {
        return Ok(());
    };

    CommunityEdge::new(entity.base.group_id.clone(), winning_community, entity.base.uuid)
        .save(database)
        .await?;

    let member_data = database
        .find_edges(Some(&winning_community.to_string()), None, Some("HAS_MEMBER"))
        .await?;
    let mut members = Vec::new();
    for data in &member_data {
        if let Some(node_data) = database.get_node(&data.target_id).await? {
            if let Ok(node) = node_data_to_entity_node(&node_data) {
                members.push(node);
            }
        }
    }

    if let Some(node_data) = database.get_node(&winning_community.to_string()).await? {
        let mut community = node_data_to_community_node(&node_data)?;
        community.summary = summarize_cluster(
            clients.llm_client.as_ref(),
            members.iter().map(|n| (n.base.name.clone(), n.summary.clone())).collect(),
        )
        .await?;
        community.save(database).await?;
    }

    Ok(())
}

pub(crate) async fn fetch_group_entities(
    clients: &GraphitiClients,
    group_id: &str,
) -> Result<Vec<EntityNode>, GraphitiError> {
    let mut properties = HashMap::new();
    properties.insert(
        "group_id".to_string(),
        crate::database::QueryParameter::String(group_id.to_string()),
    );

    let data = clients.database.find_nodes(Some("Entity"), properties).await?;
    data.iter().map(node_data_to_entity_node).collect()
}

pub(crate) async fn fetch_entity_adjacency(
    clients: &GraphitiClients,
    group_id: &str,
    entities: &[EntityNode],
) -> Result<HashMap<Uuid, Vec<Uuid>>, GraphitiError> {
    let known: HashSet<Uuid> = entities.iter().map(|n| n.base.uuid).collect();
    let edge_data = clients.database.find_edges(None, None, Some("RELATES_TO")).await?;

    let mut adjacency: HashMap<Uuid, Vec<Uuid>> = known.iter().map(|uuid| (*uuid, Vec::new())).collect();
    for data in &edge_data {
        let Ok(edge) = edge_data_to_entity_edge(data) else { continue };
        if edge.base.group_id != group_id {
            continue;
        }
        let (a, b) = (edge.base.source_node_uuid, edge.base.target_node_uuid);
        if known.contains(&a) && known.contains(&b) {
            adjacency.entry(a).or_default().push(b);
            adjacency.entry(b).or_default().push(a);
        }
    }

    Ok(adjacency)
}

/// Label propagation: every node starts in its own label and repeatedly adopts the
/// majority label among its neighbors, ties broken by the lexicographically smallest
/// neighbor name, until convergence or a round cap.
fn label_propagate(entities: &[EntityNode], adjacency: &HashMap<Uuid, Vec<Uuid>>) -> Vec<Vec<Uuid>> {
    let names: HashMap<Uuid, String> = entities.iter().map(|n| (n.base.uuid, n.base.name.clone())).collect();
    let mut labels: HashMap<Uuid, Uuid> = entities.iter().map(|n| (n.base.uuid, n.base.uuid)).collect();

    let mut order: Vec<Uuid> = entities.iter().map(|n| n.base.uuid).collect();
    order.sort();

    for _ in 0..MAX_PROPAGATION_ROUNDS {
        let mut changed = false;

        for &node in &order {
            let neighbors = match adjacency.get(&node) {
                Some(n) if !n.is_empty() => n,
                _ => continue,
            };

            let mut votes: Vec<(Uuid, String)> = Vec::new();
            for neighbor in neighbors {
                if let Some(label) = labels.get(neighbor) {
                    votes.push((*label, names.get(neighbor).cloned().unwrap_or_default()));
                }
            }

            if let Some(majority) = majority_label(&votes) {
                if labels.get(&node) != Some(&majority) {
                    labels.insert(node, majority);
                    changed = true;
                }
            }
        }

        if !changed {
            break;
        }
    }

    let mut clusters: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
    for (node, label) in labels {
        clusters.entry(label).or_default().push(node);
    }
    clusters.into_values().collect()
}

/// Pick the most frequent label among `votes`, breaking ties by the lexicographically
/// smallest neighbor name attached to a tied label.
fn majority_label(votes: &[(Uuid, String)]) -> Option<Uuid> {
    if votes.is_empty() {
        return None;
    }

    let mut counts: HashMap<Uuid, usize> = HashMap::new();
    let mut best_name: HashMap<Uuid, String> = HashMap::new();
    for (label, name) in votes {
        *counts.entry(*label).or_insert(0) += 1;
        best_name
            .entry(*label)
            .and_modify(|existing| {
                if name < existing {
                    *existing = name.clone();
                }
            })
            .or_insert_with(|| name.clone());
    }

    let max_count = *counts.values().max().unwrap();
    counts
        .into_iter()
        .filter(|(_, count)| *count == max_count)
        .min_by(|(a, _), (b, _)| best_name[a].cmp(&best_name[b]))
        .map(|(label, _)| label)
}

async fn build_community_node(
    clients: &GraphitiClients,
    group_id: &str,
    members: &[EntityNode],
) -> Result<CommunityNode, GraphitiError> {
    let mut sorted_names: Vec<&str> = members.iter().map(|n| n.base.name.as_str()).collect();
    sorted_names.sort();
    let representative = sorted_names.first().copied().unwrap_or("Unnamed");

    let summary = summarize_cluster(
        clients.llm_client.as_ref(),
        members.iter().map(|n| (n.base.name.clone(), n.summary.clone())).collect(),
    )
    .await?;

    let mut community = CommunityNode::new(format!("{representative} community"), group_id.to_string(), summary);
    community.generate_name_embedding(clients.embedder.as_ref()).await?;
    community.save(clients.database.as_ref()).await?;
    Ok(community)
}

/// Synthesize a single summary out of a set of (name, summary) pairs, falling back to
/// hierarchical map-reduce once the set is larger than the fanout.
async fn summarize_cluster(
    llm_client: &dyn LlmClient,
    members: Vec<(String, String)>,
) -> Result<String, GraphitiError> {
    if members.len() <= SUMMARY_FANOUT {
        let node_summaries: Vec<serde_json::Value> = members
            .iter()
            .map(|(name, summary)| serde_json::json!({ "name": name, "summary": summary }))
            .collect();

        let mut context = HashMap::new();
        context.insert("nodes".to_string(), serde_json::Value::Array(node_summaries));
        context.insert("context_messages".to_string(), serde_json::Value::Array(Vec::new()));

        let messages = to_llm_messages(crate::prompts::summarize_nodes::summarize(&context));
        let summary = llm_client.generate_text(&messages).await?;
        return Ok(summary.trim().to_string());
    }

    let mut reduced = Vec::new();
    for chunk in members.chunks(SUMMARY_FANOUT) {
        let chunk_summary = Box::pin(summarize_cluster(llm_client, chunk.to_vec())).await?;
        reduced.push((chunk[0].0.clone(), chunk_summary));
    }

    Box::pin(summarize_cluster(llm_client, reduced)).await
}
