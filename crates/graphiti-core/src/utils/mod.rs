pub mod bulk_utils;
pub mod centrality_utils;
pub mod community_utils;
pub mod datetime_utils;
pub mod extract_utils;

pub use bulk_utils::{
    add_nodes_and_edges_bulk, build_duplicate_of_edges, dedupe_edges_bulk, dedupe_nodes_bulk,
    extract_edge_dates_bulk, extract_nodes_and_edges_bulk, invalidate_contradicted_edges,
    merge_node_into, resolve_edge_pointers, retrieve_previous_episodes_bulk, RawEpisode,
};
pub use centrality_utils::compute_centrality;
pub use community_utils::{build_communities, update_community_for_entity};
pub use datetime_utils::{format_for_db, from_timestamp, parse_from_db, to_timestamp, utc_now};
pub use extract_utils::{extract_edges, extract_nodes};
