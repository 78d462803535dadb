pub mod models;
mod queries;
pub mod sqlite;

pub use sqlite::Database;

use crate::error::Result;
use chrono::{DateTime, Utc};
use models::*;

/// Persistence contract the scan loops write through.
///
/// Implementations must hand out node ids that increase monotonically and
/// are usable by the very next insert, and must tolerate two callers
/// writing different subtrees concurrently (one store value per loop).
pub trait EntitlementStore: Send {
    fn list_filesystems(&self) -> Result<Vec<Filesystem>>;

    fn list_exclusion_patterns(&self) -> Result<Vec<String>>;

    /// All known subtrees, least recently scanned first.
    fn list_top_level_subtrees(&self) -> Result<Vec<TopLevelSubtree>>;

    /// Inserts the subtree unless its path is already registered for the
    /// filesystem. Returns the new id, or `None` when it already existed.
    fn register_top_level_subtree(&self, subtree: &NewTopLevelSubtree) -> Result<Option<i64>>;

    /// Deletes every node of the subtree; entitlements go with them.
    fn delete_subtree_nodes(&self, top_level_id: i64) -> Result<usize>;

    /// Deletes the node at `full_path` and all nodes below it.
    fn delete_nodes_at_or_below(&self, top_level_id: i64, full_path: &str) -> Result<usize>;

    fn insert_node(&self, node: &NewNode) -> Result<i64>;

    fn insert_entitlement(&self, entitlement: &NewEntitlement) -> Result<i64>;

    /// Stamps `last_scanned`, refreshes the subtree's own attributes from
    /// its root node and recomputes the tree-wide timestamps.
    fn complete_subtree_scan(&self, top_level_id: i64, scanned_at: DateTime<Utc>) -> Result<()>;

    /// Recomputes tree-wide last access/write from the current node rows.
    fn refresh_tree_timestamps(&self, top_level_id: i64) -> Result<()>;

    fn add_rescan_request(&self, full_path: &str) -> Result<i64>;

    fn pending_rescan_requests(&self) -> Result<Vec<RescanRequest>>;

    fn mark_rescan_processed(&self, request_id: i64, processed_at: DateTime<Utc>) -> Result<()>;

    /// Deepest node whose path is `full_path` or one of its ancestors.
    fn find_closest_node(&self, full_path: &str) -> Result<Option<ClosestNode>>;
}
