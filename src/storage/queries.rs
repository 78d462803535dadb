use super::models::*;
use super::sqlite::Database;
use super::EntitlementStore;
use crate::error::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use tracing::debug;

const NODE_COLUMNS: &str = "n.id, n.full_path, n.name, n.level, n.top_level_id, n.parent_id, \
     n.owner, n.is_protected, n.last_access, n.last_write, n.discovered_at";

const SUBTREE_COLUMNS: &str = "id, filesystem_id, full_path, name, scan_depth, first_seen, \
     last_scanned, last_access, last_write, last_tree_access, last_tree_write, data_owner, \
     is_protected";

fn node_from_row(row: &Row) -> rusqlite::Result<Node> {
    Ok(Node {
        id: row.get(0)?,
        full_path: row.get(1)?,
        name: row.get(2)?,
        level: row.get(3)?,
        top_level_id: row.get(4)?,
        parent_id: row.get(5)?,
        owner: row.get(6)?,
        is_protected: row.get(7)?,
        last_access: row.get(8)?,
        last_write: row.get(9)?,
        discovered_at: row.get(10)?,
    })
}

fn subtree_from_row(row: &Row) -> rusqlite::Result<TopLevelSubtree> {
    Ok(TopLevelSubtree {
        id: row.get(0)?,
        filesystem_id: row.get(1)?,
        full_path: row.get(2)?,
        name: row.get(3)?,
        scan_depth: row.get(4)?,
        first_seen: row.get(5)?,
        last_scanned: row.get(6)?,
        last_access: row.get(7)?,
        last_write: row.get(8)?,
        last_tree_access: row.get(9)?,
        last_tree_write: row.get(10)?,
        data_owner: row.get(11)?,
        is_protected: row.get(12)?,
    })
}

/// Path comparisons go through `substr`, which drops the column collation,
/// hence the explicit `COLLATE NOCASE`. A prefix only counts when it ends
/// on a separator boundary.
const AT_OR_BELOW: &str = r"(full_path = ?2
        OR (length(full_path) > length(?2)
            AND substr(full_path, 1, length(?2)) = ?2 COLLATE NOCASE
            AND (substr(full_path, length(?2) + 1, 1) IN ('/', '\')
                 OR substr(?2, -1, 1) IN ('/', '\'))))";

impl EntitlementStore for Database {
    fn list_filesystems(&self) -> Result<Vec<Filesystem>> {
        let mut stmt = self.connection().prepare_cached(
            "SELECT id, drive_root, provider, share, credentials_ref, depth \
             FROM filesystem ORDER BY id",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(Filesystem {
                    id: row.get(0)?,
                    drive_root: row.get(1)?,
                    provider: row.get(2)?,
                    share: row.get(3)?,
                    credentials_ref: row.get(4)?,
                    depth: row.get(5)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn list_exclusion_patterns(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .connection()
            .prepare_cached("SELECT pattern FROM exclusion_pattern ORDER BY id")?;
        let rows = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(rows)
    }

    fn list_top_level_subtrees(&self) -> Result<Vec<TopLevelSubtree>> {
        let sql = format!(
            "SELECT {} FROM top_level_subtree ORDER BY last_scanned ASC, id ASC",
            SUBTREE_COLUMNS
        );
        let mut stmt = self.connection().prepare_cached(&sql)?;
        let rows = stmt
            .query_map([], subtree_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn register_top_level_subtree(&self, subtree: &NewTopLevelSubtree) -> Result<Option<i64>> {
        // a never-scanned subtree sorts first
        let never = DateTime::<Utc>::from_timestamp(0, 0).unwrap_or_default();
        let inserted = self.connection().execute(
            "INSERT INTO top_level_subtree \
             (filesystem_id, full_path, name, scan_depth, first_seen, last_scanned, \
              last_access, last_write, data_owner, is_protected) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10) \
             ON CONFLICT(filesystem_id, full_path) DO NOTHING",
            params![
                subtree.filesystem_id,
                subtree.full_path,
                subtree.name,
                subtree.scan_depth,
                subtree.first_seen,
                never,
                subtree.last_access,
                subtree.last_write,
                subtree.data_owner,
                subtree.is_protected,
            ],
        )?;
        if inserted == 0 {
            Ok(None)
        } else {
            Ok(Some(self.connection().last_insert_rowid()))
        }
    }

    fn delete_subtree_nodes(&self, top_level_id: i64) -> Result<usize> {
        // counted up front: rows removed by the parent cascade are not
        // reported as changes
        let deleted: usize = self.connection().query_row(
            "SELECT COUNT(*) FROM node WHERE top_level_id = ?1",
            params![top_level_id],
            |row| row.get(0),
        )?;
        self.connection().execute(
            "DELETE FROM node WHERE top_level_id = ?1",
            params![top_level_id],
        )?;
        debug!("Deleted {} nodes of subtree {}", deleted, top_level_id);
        Ok(deleted)
    }

    fn delete_nodes_at_or_below(&self, top_level_id: i64, full_path: &str) -> Result<usize> {
        let filter = format!("WHERE top_level_id = ?1 AND {}", AT_OR_BELOW);
        let deleted: usize = self.connection().query_row(
            &format!("SELECT COUNT(*) FROM node {}", filter),
            params![top_level_id, full_path],
            |row| row.get(0),
        )?;
        self.connection().execute(
            &format!("DELETE FROM node {}", filter),
            params![top_level_id, full_path],
        )?;
        debug!("Deleted {} nodes at or below {}", deleted, full_path);
        Ok(deleted)
    }

    fn insert_node(&self, node: &NewNode) -> Result<i64> {
        let mut stmt = self.connection().prepare_cached(
            "INSERT INTO node \
             (full_path, name, level, top_level_id, parent_id, owner, is_protected, \
              last_access, last_write, discovered_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        )?;
        stmt.execute(params![
            node.full_path,
            node.name,
            node.level,
            node.top_level_id,
            node.parent_id,
            node.owner,
            node.is_protected,
            node.last_access,
            node.last_write,
            node.discovered_at,
        ])?;
        Ok(self.connection().last_insert_rowid())
    }

    fn insert_entitlement(&self, entitlement: &NewEntitlement) -> Result<i64> {
        let mut stmt = self.connection().prepare_cached(
            "INSERT INTO entitlement \
             (node_id, principal, principal_class, access_rights, access_type, \
              inheritance_flags, propagation_flags, discovered_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )?;
        stmt.execute(params![
            entitlement.node_id,
            entitlement.principal,
            entitlement.principal_class,
            entitlement.access_rights,
            entitlement.access_type,
            entitlement.inheritance_flags,
            entitlement.propagation_flags,
            entitlement.discovered_at,
        ])?;
        Ok(self.connection().last_insert_rowid())
    }

    fn complete_subtree_scan(&self, top_level_id: i64, scanned_at: DateTime<Utc>) -> Result<()> {
        self.connection().execute(
            "UPDATE top_level_subtree SET \
                 last_scanned = ?2, \
                 last_access = COALESCE((SELECT last_access FROM node \
                     WHERE top_level_id = ?1 AND parent_id IS NULL LIMIT 1), last_access), \
                 last_write = COALESCE((SELECT last_write FROM node \
                     WHERE top_level_id = ?1 AND parent_id IS NULL LIMIT 1), last_write), \
                 data_owner = COALESCE((SELECT owner FROM node \
                     WHERE top_level_id = ?1 AND parent_id IS NULL LIMIT 1), data_owner), \
                 is_protected = COALESCE((SELECT is_protected FROM node \
                     WHERE top_level_id = ?1 AND parent_id IS NULL LIMIT 1), is_protected) \
             WHERE id = ?1",
            params![top_level_id, scanned_at],
        )?;
        self.refresh_tree_timestamps(top_level_id)
    }

    fn refresh_tree_timestamps(&self, top_level_id: i64) -> Result<()> {
        self.connection().execute(
            "UPDATE top_level_subtree SET \
                 last_tree_access = (SELECT MAX(last_access) FROM node WHERE top_level_id = ?1), \
                 last_tree_write = (SELECT MAX(last_write) FROM node WHERE top_level_id = ?1) \
             WHERE id = ?1",
            params![top_level_id],
        )?;
        Ok(())
    }

    fn add_rescan_request(&self, full_path: &str) -> Result<i64> {
        self.connection().execute(
            "INSERT INTO rescan_request (full_path, requested_at) VALUES (?1, ?2)",
            params![full_path, Utc::now()],
        )?;
        Ok(self.connection().last_insert_rowid())
    }

    fn pending_rescan_requests(&self) -> Result<Vec<RescanRequest>> {
        let mut stmt = self.connection().prepare_cached(
            "SELECT id, full_path, requested_at, processed_at FROM rescan_request \
             WHERE processed_at IS NULL ORDER BY id",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(RescanRequest {
                    id: row.get(0)?,
                    full_path: row.get(1)?,
                    requested_at: row.get(2)?,
                    processed_at: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn mark_rescan_processed(&self, request_id: i64, processed_at: DateTime<Utc>) -> Result<()> {
        self.connection().execute(
            "UPDATE rescan_request SET processed_at = ?2 WHERE id = ?1",
            params![request_id, processed_at],
        )?;
        Ok(())
    }

    fn find_closest_node(&self, full_path: &str) -> Result<Option<ClosestNode>> {
        let sql = format!(
            r"SELECT {}, t.scan_depth
              FROM node n
              JOIN top_level_subtree t ON t.id = n.top_level_id
              WHERE length(n.full_path) <= length(?1)
                AND substr(?1, 1, length(n.full_path)) = n.full_path COLLATE NOCASE
                AND (length(?1) = length(n.full_path)
                     OR substr(?1, length(n.full_path) + 1, 1) IN ('/', '\')
                     OR substr(n.full_path, -1, 1) IN ('/', '\'))
              ORDER BY n.level DESC, n.id DESC
              LIMIT 1",
            NODE_COLUMNS
        );
        let closest = self
            .connection()
            .query_row(&sql, params![full_path], |row| {
                Ok(ClosestNode {
                    node: node_from_row(row)?,
                    max_level: row.get(11)?,
                })
            })
            .optional()?;
        Ok(closest)
    }
}

// Reporting and administration, outside the scan contract.
impl Database {
    pub fn add_filesystem(&self, filesystem: &NewFilesystem) -> rusqlite::Result<i64> {
        self.connection().execute(
            "INSERT INTO filesystem (drive_root, provider, share, credentials_ref, depth) \
             VALUES (?1, ?2, ?3, ?4, ?5) \
             ON CONFLICT(drive_root) DO UPDATE SET \
                 provider = excluded.provider, \
                 share = excluded.share, \
                 credentials_ref = excluded.credentials_ref, \
                 depth = excluded.depth",
            params![
                filesystem.drive_root,
                filesystem.provider,
                filesystem.share,
                filesystem.credentials_ref,
                filesystem.depth,
            ],
        )?;
        self.connection().query_row(
            "SELECT id FROM filesystem WHERE drive_root = ?1",
            params![filesystem.drive_root],
            |row| row.get(0),
        )
    }

    pub fn add_exclusion_pattern(&self, pattern: &str) -> rusqlite::Result<bool> {
        let inserted = self.connection().execute(
            "INSERT INTO exclusion_pattern (pattern) VALUES (?1) ON CONFLICT(pattern) DO NOTHING",
            params![pattern],
        )?;
        Ok(inserted > 0)
    }

    pub fn get_top_level_subtree(&self, id: i64) -> rusqlite::Result<Option<TopLevelSubtree>> {
        let sql = format!("SELECT {} FROM top_level_subtree WHERE id = ?1", SUBTREE_COLUMNS);
        self.connection()
            .query_row(&sql, params![id], subtree_from_row)
            .optional()
    }

    /// Nodes of a subtree in insertion order.
    pub fn nodes_for_subtree(&self, top_level_id: i64) -> rusqlite::Result<Vec<Node>> {
        let sql = format!(
            "SELECT {} FROM node n WHERE n.top_level_id = ?1 ORDER BY n.id",
            NODE_COLUMNS
        );
        let mut stmt = self.connection().prepare(&sql)?;
        let rows = stmt
            .query_map(params![top_level_id], node_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn entitlements_for_node(&self, node_id: i64) -> rusqlite::Result<Vec<Entitlement>> {
        let mut stmt = self.connection().prepare_cached(
            "SELECT id, node_id, principal, principal_class, access_rights, access_type, \
                    inheritance_flags, propagation_flags, discovered_at \
             FROM entitlement WHERE node_id = ?1 ORDER BY id",
        )?;
        let rows = stmt
            .query_map(params![node_id], |row| {
                Ok(Entitlement {
                    id: row.get(0)?,
                    node_id: row.get(1)?,
                    principal: row.get(2)?,
                    principal_class: row.get(3)?,
                    access_rights: row.get(4)?,
                    access_type: row.get(5)?,
                    inheritance_flags: row.get(6)?,
                    propagation_flags: row.get(7)?,
                    discovered_at: row.get(8)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn count_nodes(&self) -> rusqlite::Result<i64> {
        self.connection()
            .query_row("SELECT COUNT(*) FROM node", [], |row| row.get(0))
    }

    pub fn count_entitlements(&self) -> rusqlite::Result<i64> {
        self.connection()
            .query_row("SELECT COUNT(*) FROM entitlement", [], |row| row.get(0))
    }

    pub fn entitlement_report(&self) -> rusqlite::Result<Vec<EntitlementReportRow>> {
        let mut stmt = self.connection().prepare(
            "SELECT t.full_path, n.full_path, n.level, n.owner, n.is_protected, \
                    e.principal, e.principal_class, e.access_rights, e.access_type, \
                    e.inheritance_flags, e.propagation_flags \
             FROM entitlement e \
             JOIN node n ON n.id = e.node_id \
             JOIN top_level_subtree t ON t.id = n.top_level_id \
             ORDER BY t.full_path, n.full_path, e.id",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(EntitlementReportRow {
                    top_level_path: row.get(0)?,
                    full_path: row.get(1)?,
                    level: row.get(2)?,
                    owner: row.get(3)?,
                    is_protected: row.get(4)?,
                    principal: row.get(5)?,
                    principal_class: row.get(6)?,
                    access_rights: row.get(7)?,
                    access_type: row.get(8)?,
                    inheritance_flags: row.get(9)?,
                    propagation_flags: row.get(10)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}
