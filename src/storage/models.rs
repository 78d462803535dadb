use chrono::{DateTime, Utc};
use serde::Serialize;

/// A configured scan root.
#[derive(Debug, Clone)]
pub struct Filesystem {
    pub id: i64,
    pub drive_root: String,
    pub provider: Option<String>,
    pub share: Option<String>,
    /// Name of the credential set used to mount the share; resolved by the host.
    pub credentials_ref: Option<String>,
    pub depth: u32,
}

#[derive(Debug, Clone)]
pub struct NewFilesystem {
    pub drive_root: String,
    pub provider: Option<String>,
    pub share: Option<String>,
    pub credentials_ref: Option<String>,
    pub depth: u32,
}

/// An immediate child directory of a filesystem root; the unit of
/// scheduling and locking.
#[derive(Debug, Clone)]
pub struct TopLevelSubtree {
    pub id: i64,
    pub filesystem_id: i64,
    pub full_path: String,
    pub name: String,
    pub scan_depth: u32,
    pub first_seen: DateTime<Utc>,
    pub last_scanned: DateTime<Utc>,
    pub last_access: Option<DateTime<Utc>>,
    pub last_write: Option<DateTime<Utc>>,
    pub last_tree_access: Option<DateTime<Utc>>,
    pub last_tree_write: Option<DateTime<Utc>>,
    pub data_owner: Option<String>,
    pub is_protected: bool,
}

#[derive(Debug, Clone)]
pub struct NewTopLevelSubtree {
    pub filesystem_id: i64,
    pub full_path: String,
    pub name: String,
    pub scan_depth: u32,
    pub first_seen: DateTime<Utc>,
    pub last_access: Option<DateTime<Utc>>,
    pub last_write: Option<DateTime<Utc>>,
    pub data_owner: Option<String>,
    pub is_protected: bool,
}

/// One directory visited during a walk.
#[derive(Debug, Clone)]
pub struct Node {
    pub id: i64,
    pub full_path: String,
    pub name: String,
    pub level: u32,
    pub top_level_id: i64,
    pub parent_id: Option<i64>,
    pub owner: String,
    pub is_protected: bool,
    pub last_access: Option<DateTime<Utc>>,
    pub last_write: Option<DateTime<Utc>>,
    pub discovered_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewNode {
    pub full_path: String,
    pub name: String,
    pub level: u32,
    pub top_level_id: i64,
    pub parent_id: Option<i64>,
    pub owner: String,
    pub is_protected: bool,
    pub last_access: DateTime<Utc>,
    pub last_write: DateTime<Utc>,
    pub discovered_at: DateTime<Utc>,
}

/// One explicit access-control entry of a node.
#[derive(Debug, Clone)]
pub struct Entitlement {
    pub id: i64,
    pub node_id: i64,
    pub principal: String,
    pub principal_class: String,
    pub access_rights: String,
    pub access_type: String,
    pub inheritance_flags: String,
    pub propagation_flags: String,
    pub discovered_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewEntitlement {
    pub node_id: i64,
    pub principal: String,
    pub principal_class: String,
    pub access_rights: String,
    pub access_type: String,
    pub inheritance_flags: String,
    pub propagation_flags: String,
    pub discovered_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct RescanRequest {
    pub id: i64,
    pub full_path: String,
    pub requested_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

/// Deepest recorded node on the way to a requested path, with the depth
/// bound of its subtree.
#[derive(Debug, Clone)]
pub struct ClosestNode {
    pub node: Node,
    pub max_level: u32,
}

/// Flattened node + entitlement row for reporting.
#[derive(Debug, Clone, Serialize)]
pub struct EntitlementReportRow {
    pub top_level_path: String,
    pub full_path: String,
    pub level: u32,
    pub owner: String,
    pub is_protected: bool,
    pub principal: String,
    pub principal_class: String,
    pub access_rights: String,
    pub access_type: String,
    pub inheritance_flags: String,
    pub propagation_flags: String,
}
