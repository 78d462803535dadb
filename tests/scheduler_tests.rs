mod common;

use acl_inventory::acl::{AccessRights, SecurityDescriptor};
use acl_inventory::platform::{FileSystemAccess, MemoryFs};
use acl_inventory::scanner::{FullScanLoop, ScanContext, ScanKind, TargetedScanLoop};
use acl_inventory::storage::models::NewFilesystem;
use acl_inventory::storage::{Database, EntitlementStore};
use acl_inventory::ScanHandle;
use common::*;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

struct Fixture {
    _dir: TempDir,
    db_path: std::path::PathBuf,
    fs: Arc<MemoryFs>,
    context: ScanContext,
}

impl Fixture {
    /// /fs with T (A, A1, deep), U and a recycle bin; depth 3.
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("inventory.db");
        let db = Database::open(&db_path).unwrap();
        db.add_filesystem(&NewFilesystem {
            drive_root: "/fs".to_string(),
            provider: None,
            share: None,
            credentials_ref: None,
            depth: 3,
        })
        .unwrap();
        db.add_exclusion_pattern("*/$RECYCLE.BIN").unwrap();

        let fs = Arc::new(MemoryFs::new());
        fs.add_dir("/fs", SecurityDescriptor::default())
            .add_dir("/fs/$RECYCLE.BIN", owned_by_alice(vec![]))
            .add_dir("/fs/T", owned_by_alice(vec![grant(FINANCE, AccessRights::MODIFY)]))
            .add_dir("/fs/T/A", owned_by_alice(vec![]))
            .add_dir("/fs/T/A/A1", owned_by_alice(vec![grant(ALICE, AccessRights::FULL_CONTROL)]))
            .add_dir("/fs/T/A/A1/deep", owned_by_alice(vec![]))
            .add_dir("/fs/U", owned_by_alice(vec![]));

        let shared: Arc<dyn FileSystemAccess> = fs.clone();
        let context = ScanContext::new(shared, Arc::new(identities()))
            .with_lock_wait_log_interval(Duration::from_millis(20));
        Self {
            _dir: dir,
            db_path,
            fs,
            context,
        }
    }

    fn db(&self) -> Database {
        Database::open(&self.db_path).unwrap()
    }

    fn full(&self) -> FullScanLoop<Database> {
        FullScanLoop::new(self.db(), self.context.clone(), Duration::from_millis(20))
    }

    fn targeted(&self) -> TargetedScanLoop<Database> {
        TargetedScanLoop::new(self.db(), self.context.clone(), Duration::from_millis(20))
    }

    fn subtree_id(&self, path: &str) -> i64 {
        self.db()
            .list_top_level_subtrees()
            .unwrap()
            .into_iter()
            .find(|s| s.full_path == path)
            .unwrap()
            .id
    }

    fn node_paths(&self, top: i64) -> Vec<String> {
        self.db()
            .nodes_for_subtree(top)
            .unwrap()
            .into_iter()
            .map(|n| n.full_path)
            .collect()
    }
}

#[test]
fn test_full_pass_discovers_and_scans() {
    let fixture = Fixture::new();

    let summary = fixture.full().run_pass().unwrap();
    assert_eq!(summary.filesystems, 1);
    assert_eq!(summary.discovered, 2);
    assert_eq!(summary.subtrees_scanned, 2);
    assert_eq!(summary.subtrees_failed, 0);

    let subtrees = fixture.db().list_top_level_subtrees().unwrap();
    let mut names: Vec<&str> = subtrees.iter().map(|s| s.name.as_str()).collect();
    names.sort();
    assert_eq!(names, vec!["T", "U"]);

    let t = fixture.subtree_id("/fs/T");
    assert_eq!(
        fixture.node_paths(t),
        vec!["/fs/T", "/fs/T/A", "/fs/T/A/A1"]
    );
    let subtree = fixture.db().get_top_level_subtree(t).unwrap().unwrap();
    assert_eq!(subtree.data_owner.as_deref(), Some("alice"));
    assert!(subtree.last_tree_write.is_some());

    // a second pass finds nothing new
    let summary = fixture.full().run_pass().unwrap();
    assert_eq!(summary.discovered, 0);
    assert_eq!(summary.subtrees_scanned, 2);
}

#[test]
fn test_full_pass_replaces_previous_results() {
    let fixture = Fixture::new();
    let full = fixture.full();
    full.run_pass().unwrap();
    let t = fixture.subtree_id("/fs/T");
    let entitlements_before = fixture.db().count_entitlements().unwrap();

    fixture.fs.remove_dir("/fs/T/A/A1");
    full.run_pass().unwrap();

    assert_eq!(fixture.node_paths(t), vec!["/fs/T", "/fs/T/A"]);
    assert_eq!(fixture.db().count_entitlements().unwrap(), entitlements_before - 1);
}

#[test]
fn test_targeted_rescan_replaces_only_the_affected_branch() {
    let fixture = Fixture::new();
    fixture.full().run_pass().unwrap();
    let t = fixture.subtree_id("/fs/T");
    let before = fixture.db().nodes_for_subtree(t).unwrap();
    let root_id = before[0].id;
    let old_a = before[1].id;

    fixture
        .fs
        .add_dir("/fs/T/A/fresh", owned_by_alice(vec![grant(FINANCE, AccessRights::READ)]))
        .add_dir("/fs/T/A/fresh/too-deep", owned_by_alice(vec![]));
    let db = fixture.db();
    db.add_rescan_request("/fs/T/A/fresh/").unwrap();

    let summary = fixture.targeted().run_pass().unwrap();
    assert_eq!(summary.requests, 1);
    assert_eq!(summary.rescanned, 1);
    assert_eq!(summary.stats.folders, 3);

    let after = db.nodes_for_subtree(t).unwrap();
    assert_eq!(
        after.iter().map(|n| n.full_path.as_str()).collect::<Vec<_>>(),
        vec!["/fs/T", "/fs/T/A", "/fs/T/A/A1", "/fs/T/A/fresh"]
    );
    assert_eq!(after[0].id, root_id);
    assert!(after[1].id > old_a);
    assert_eq!(after[1].parent_id, Some(root_id));
    assert_eq!(after[3].parent_id, Some(after[1].id));
    assert!(db.pending_rescan_requests().unwrap().is_empty());
}

#[test]
fn test_unresolvable_request_is_marked_processed() {
    let fixture = Fixture::new();
    fixture.full().run_pass().unwrap();
    let db = fixture.db();
    db.add_rescan_request("/nowhere/at/all").unwrap();

    let summary = fixture.targeted().run_pass().unwrap();
    assert_eq!(summary.unresolved, 1);
    assert_eq!(summary.rescanned, 0);
    assert!(db.pending_rescan_requests().unwrap().is_empty());
}

#[test]
fn test_targeted_scan_waits_for_subtree_lock() {
    let fixture = Fixture::new();
    fixture.full().run_pass().unwrap();
    let t = fixture.subtree_id("/fs/T");
    let db = fixture.db();
    db.add_rescan_request("/fs/T/A").unwrap();

    let locks = Arc::clone(&fixture.context.locks);
    let guard = locks.acquire(t, ScanKind::Full);

    let targeted = fixture.targeted();
    let worker = thread::spawn(move || targeted.run_pass().unwrap());

    thread::sleep(Duration::from_millis(150));
    assert!(!worker.is_finished());
    assert_eq!(db.pending_rescan_requests().unwrap().len(), 1);

    drop(guard);
    let summary = worker.join().unwrap();
    assert_eq!(summary.rescanned, 1);
    assert!(db.pending_rescan_requests().unwrap().is_empty());
    assert_eq!(locks.holder(t), None);
}

#[test]
fn test_full_scan_waits_for_targeted_rescan() {
    let fixture = Fixture::new();
    fixture.full().run_pass().unwrap();
    let t = fixture.subtree_id("/fs/T");
    let db = fixture.db();
    let before: Vec<i64> = db.nodes_for_subtree(t).unwrap().iter().map(|n| n.id).collect();

    let locks = Arc::clone(&fixture.context.locks);
    let guard = locks.acquire(t, ScanKind::Targeted);

    let full = fixture.full();
    let worker = thread::spawn(move || full.run_pass().unwrap());

    thread::sleep(Duration::from_millis(150));
    assert!(!worker.is_finished());
    let during: Vec<i64> = db.nodes_for_subtree(t).unwrap().iter().map(|n| n.id).collect();
    assert_eq!(during, before);

    drop(guard);
    let summary = worker.join().unwrap();
    assert_eq!(summary.subtrees_scanned, 2);
    let after = db.nodes_for_subtree(t).unwrap();
    assert_eq!(after.len(), before.len());
    assert!(after.iter().all(|n| !before.contains(&n.id)));
    assert_eq!(locks.holder(t), None);
}

#[test]
fn test_unreadable_top_level_folder_counts_as_failed() {
    let fixture = Fixture::new();
    fixture.full().run_pass().unwrap();
    let t = fixture.subtree_id("/fs/T");
    let scanned_before = fixture.db().get_top_level_subtree(t).unwrap().unwrap().last_scanned;

    fixture.fs.deny_metadata("/fs/T");
    thread::sleep(Duration::from_millis(20));
    let summary = fixture.full().run_pass().unwrap();

    assert_eq!(summary.subtrees_scanned, 1);
    assert_eq!(summary.subtrees_failed, 1);
    let subtree = fixture.db().get_top_level_subtree(t).unwrap().unwrap();
    assert_eq!(subtree.last_scanned, scanned_before);
    assert!(fixture.node_paths(t).is_empty());
}

#[test]
fn test_stop_ends_full_pass_between_subtrees() {
    let fixture = Fixture::new();
    fixture.full().run_pass().unwrap();
    fixture.context.stop.stop();

    let summary = fixture.full().run_pass().unwrap();
    assert_eq!(summary.subtrees_scanned, 0);
}

#[test]
fn test_running_loops_serve_requests_and_stop() {
    let fixture = Fixture::new();
    let handle = ScanHandle::spawn(
        fixture.context.clone(),
        Some(fixture.full()),
        Some(fixture.targeted()),
    )
    .unwrap();
    let db = fixture.db();

    let deadline = Instant::now() + Duration::from_secs(10);
    while db.list_top_level_subtrees().unwrap().len() < 2 {
        assert!(Instant::now() < deadline, "full scan never ran");
        thread::sleep(Duration::from_millis(10));
    }

    fixture.fs.add_dir("/fs/U/late", owned_by_alice(vec![]));
    db.add_rescan_request("/fs/U/late").unwrap();
    let u = fixture.subtree_id("/fs/U");
    while !fixture.node_paths(u).contains(&"/fs/U/late".to_string())
        || !db.pending_rescan_requests().unwrap().is_empty()
    {
        assert!(Instant::now() < deadline, "rescan never happened");
        thread::sleep(Duration::from_millis(10));
    }

    assert_eq!(handle.running(), 2);
    let stop = handle.stop_signal();
    handle.shutdown();
    assert!(stop.is_stopped());
    assert!(Path::new(&fixture.db_path).exists());
}

#[test]
fn test_share_with_excluded_child() {
    const OWNER: &str = "S-1-5-21-100-200-300-500";
    let fs = Arc::new(MemoryFs::new());
    fs.add_dir("/share", SecurityDescriptor::default())
        .add_dir("/share/A", owned_by_alice(vec![]))
        .add_dir(
            "/share/A/sub",
            SecurityDescriptor {
                owner_sid: Some(OWNER.to_string()),
                entries: vec![grant(OWNER, AccessRights::FULL_CONTROL)],
                inheritance_disabled: false,
            },
        )
        .add_dir("/share/B", owned_by_alice(vec![grant(FINANCE, AccessRights::READ)]))
        .add_dir("/share/B/inner", owned_by_alice(vec![]));

    let db = Database::open_in_memory().unwrap();
    db.add_filesystem(&NewFilesystem {
        drive_root: "/share".to_string(),
        provider: None,
        share: None,
        credentials_ref: None,
        depth: 2,
    })
    .unwrap();
    db.add_exclusion_pattern("*/B").unwrap();

    let shared: Arc<dyn FileSystemAccess> = fs;
    let context = ScanContext::new(shared, Arc::new(identities()));
    let full = FullScanLoop::new(db, context, Duration::from_secs(60));
    full.run_pass().unwrap();

    let db = full.store();
    let subtrees = db.list_top_level_subtrees().unwrap();
    assert_eq!(subtrees.len(), 1);
    let nodes = db.nodes_for_subtree(subtrees[0].id).unwrap();
    assert_eq!(
        nodes.iter().map(|n| (n.full_path.as_str(), n.level)).collect::<Vec<_>>(),
        vec![("/share/A", 1), ("/share/A/sub", 2)]
    );
    assert_eq!(db.count_nodes().unwrap(), 2);
    assert_eq!(db.count_entitlements().unwrap(), 1);

    let entitlements = db.entitlements_for_node(nodes[1].id).unwrap();
    assert_eq!(entitlements[0].access_rights, "FullControl");
    assert_eq!(entitlements[0].access_type, "Allow");
    assert_eq!(entitlements[0].principal, OWNER);
    assert_eq!(nodes[1].owner, OWNER);
}

#[test]
fn test_repeated_walks_leave_one_generation() {
    let fixture = Fixture::new();
    let full = fixture.full();
    full.run_pass().unwrap();
    let t = fixture.subtree_id("/fs/T");
    let db = fixture.db();

    let snapshot = |db: &Database| {
        db.nodes_for_subtree(t)
            .unwrap()
            .into_iter()
            .map(|n| {
                let rights: Vec<String> = db
                    .entitlements_for_node(n.id)
                    .unwrap()
                    .into_iter()
                    .map(|e| format!("{} {} {}", e.principal, e.access_type, e.access_rights))
                    .collect();
                (n.full_path, n.level, n.owner, rights)
            })
            .collect::<Vec<_>>()
    };

    let first = snapshot(&db);
    let first_max_id = db.nodes_for_subtree(t).unwrap().iter().map(|n| n.id).max().unwrap();

    full.run_pass().unwrap();

    assert_eq!(snapshot(&db), first);
    assert!(db
        .nodes_for_subtree(t)
        .unwrap()
        .iter()
        .all(|n| n.id > first_max_id));
}
