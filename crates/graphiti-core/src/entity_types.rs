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

//! User-declared entity/edge type constraints accepted by `Graphiti::add_episode`, steering
//! `ExtractNodes`/`ExtractEdges` classification and constraining which relation labels are
//! allowed between which entity type pairs.

use serde::{Deserialize, Serialize};

/// A user-declared entity type: a label and a natural-language description used to steer
/// node-extraction classification. `entity_type_id` in the extraction response is the
/// type's 1-based position in the caller's `entity_types` list; `0`/unmatched means the
/// default untyped `Entity` label.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityTypeSpec {
    pub name: String,
    pub description: String,
}

/// A user-declared fact/relation type, surfaced to the edge extractor as one of the
/// "most important types of facts" to look for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeTypeSpec {
    pub name: String,
    pub description: String,
}

/// One entry of the edge type map: for entities classified as `source_type`/`target_type`,
/// only `allowed_relation_labels` may connect them. Pairs with no matching entry are left
/// unconstrained.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeTypeMapEntry {
    pub source_type: String,
    pub target_type: String,
    pub allowed_relation_labels: Vec<String>,
}

/// Bundles every optional type constraint `AddEpisode` accepts. The default is empty,
/// which leaves extraction exactly as unconstrained as it was before these existed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionTypes {
    pub entity_types: Vec<EntityTypeSpec>,
    pub excluded_entity_types: Vec<String>,
    pub edge_types: Vec<EdgeTypeSpec>,
    pub edge_type_map: Vec<EdgeTypeMapEntry>,
}

impl ExtractionTypes {
    /// The entity type name for a 1-based `entity_type_id`, or `None` for the untyped default.
    pub fn entity_type_name(&self, entity_type_id: i32) -> Option<&str> {
        if entity_type_id <= 0 {
            return None;
        }
        self.entity_types
            .get((entity_type_id - 1) as usize)
            .map(|t| t.name.as_str())
    }

    /// Allowed relation labels for a `(source_type, target_type)` pair, if the caller
    /// declared a constraint for it.
    pub fn allowed_relation_labels(&self, source_type: &str, target_type: &str) -> Option<&[String]> {
        self.edge_type_map
            .iter()
            .find(|entry| entry.source_type == source_type && entry.target_type == target_type)
            .map(|entry| entry.allowed_relation_labels.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_unconstrained() {
        let types = ExtractionTypes::default();
        assert_eq!(types.entity_type_name(1), None);
        assert_eq!(types.allowed_relation_labels("Person", "Company"), None);
    }

    #[test]
    fn entity_type_name_is_one_indexed() {
        let types = ExtractionTypes {
            entity_types: vec![
                EntityTypeSpec { name: "Person".to_string(), description: String::new() },
                EntityTypeSpec { name: "Company".to_string(), description: String::new() },
            ],
            ..Default::default()
        };
        assert_eq!(types.entity_type_name(0), None);
        assert_eq!(types.entity_type_name(1), Some("Person"));
        assert_eq!(types.entity_type_name(2), Some("Company"));
        assert_eq!(types.entity_type_name(3), None);
    }

    #[test]
    fn edge_type_map_lookup_is_directional() {
        let types = ExtractionTypes {
            edge_type_map: vec![EdgeTypeMapEntry {
                source_type: "Person".to_string(),
                target_type: "Company".to_string(),
                allowed_relation_labels: vec!["WORKS_AT".to_string()],
            }],
            ..Default::default()
        };
        assert_eq!(
            types.allowed_relation_labels("Person", "Company"),
            Some(&["WORKS_AT".to_string()][..])
        );
        assert_eq!(types.allowed_relation_labels("Company", "Person"), None);
    }
}
