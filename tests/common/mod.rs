#![allow(dead_code)]

use acl_inventory::acl::{AccessEntry, AccessRights, AccessType, SecurityDescriptor};
use acl_inventory::identity::{ClassOverrides, IdentityCache, IdentitySource, PrincipalEntry};
use acl_inventory::storage::models::{NewFilesystem, NewTopLevelSubtree};
use acl_inventory::storage::{Database, EntitlementStore};
use chrono::Utc;

pub const ALICE: &str = "S-1-5-21-100-200-300-1001";
pub const FINANCE: &str = "S-1-5-21-100-200-300-2001";
pub const GHOST: &str = "S-1-5-21-100-200-300-9999";
pub const ADMINS: &str = "S-1-5-32-544";
pub const EVERYONE: &str = "S-1-1-0";

struct Directory;

impl IdentitySource for Directory {
    fn enumerate_principals(&self) -> acl_inventory::Result<Vec<PrincipalEntry>> {
        Ok(vec![
            principal(ALICE, "alice", "user"),
            principal(FINANCE, "Finance-RW", "group"),
        ])
    }
}

fn principal(sid: &str, name: &str, object_class: &str) -> PrincipalEntry {
    PrincipalEntry {
        sid: sid.to_string(),
        name: name.to_string(),
        object_class: object_class.to_string(),
        canonical_name: String::new(),
        distinguished_name: String::new(),
        path: String::new(),
    }
}

pub fn identities() -> IdentityCache {
    IdentityCache::warm_up(
        &Directory,
        &ClassOverrides::new(vec!["Administrators".to_string()], vec![]),
    )
}

/// Owned by alice, with one explicit grant and one inherited entry.
pub fn owned_by_alice(explicit: Vec<AccessEntry>) -> SecurityDescriptor {
    let mut entries = explicit;
    entries.push(AccessEntry::explicit(EVERYONE, AccessRights::READ, AccessType::Allow).inherited());
    SecurityDescriptor {
        owner_sid: Some(ALICE.to_string()),
        entries,
        inheritance_disabled: false,
    }
}

pub fn grant(sid: &str, rights: AccessRights) -> AccessEntry {
    AccessEntry::explicit(sid, rights, AccessType::Allow)
}

/// In-memory store with one filesystem and one registered subtree.
pub fn store_with_subtree(root: &str, top: &str, depth: u32) -> (Database, i64) {
    let db = Database::open_in_memory().unwrap();
    let filesystem_id = db
        .add_filesystem(&NewFilesystem {
            drive_root: root.to_string(),
            provider: None,
            share: None,
            credentials_ref: None,
            depth,
        })
        .unwrap();
    let top_level_id = db
        .register_top_level_subtree(&NewTopLevelSubtree {
            filesystem_id,
            full_path: top.to_string(),
            name: top.rsplit('/').next().unwrap_or(top).to_string(),
            scan_depth: depth,
            first_seen: Utc::now(),
            last_access: None,
            last_write: None,
            data_owner: None,
            is_protected: false,
        })
        .unwrap()
        .unwrap();
    (db, top_level_id)
}
