use graphiti_core::entity_types::{EdgeTypeMapEntry, EdgeTypeSpec, EntityTypeSpec};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use super::common::Message;

/// Request to add messages to the graph
#[derive(Debug, Deserialize, Validate)]
pub struct AddMessagesRequest {
    pub group_id: String,
    #[validate(length(min = 1))]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub update_communities: bool,
    /// User-declared entity types steering node-extraction classification.
    #[serde(default)]
    pub entity_types: Vec<EntityTypeSpec>,
    /// Entity type names whose extracted entities should be dropped.
    #[serde(default)]
    pub excluded_entity_types: Vec<String>,
    /// User-declared fact/relation types steering edge-extraction classification.
    #[serde(default)]
    pub edge_types: Vec<EdgeTypeSpec>,
    /// Per-`(source_type, target_type)` allowed relation labels.
    #[serde(default)]
    pub edge_type_map: Vec<EdgeTypeMapEntry>,
}

/// Request to add an entity node
#[derive(Debug, Deserialize, Validate)]
pub struct AddEntityNodeRequest {
    pub uuid: Uuid,
    pub group_id: String,
    #[validate(length(min = 1))]
    pub name: String,
    pub summary: String,
}

/// Request to merge a duplicate node into its canonical representative
#[derive(Debug, Deserialize, Validate)]
pub struct MergeNodeRequest {
    pub canonical_uuid: Uuid,
    pub duplicate_uuid: Uuid,
}

/// Request to cluster entities into communities across a set of groups
#[derive(Debug, Deserialize, Validate)]
pub struct BuildCommunitiesRequest {
    #[validate(length(min = 1))]
    pub group_ids: Vec<String>,
}

/// Request to recompute centrality (PageRank/degree/betweenness) across a set of groups
#[derive(Debug, Deserialize, Validate)]
pub struct ComputeCentralityRequest {
    #[validate(length(min = 1))]
    pub group_ids: Vec<String>,
}
