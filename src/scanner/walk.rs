use crate::acl::SecurityDescriptor;
use crate::exclusion::ExclusionMatcher;
use crate::identity::IdentityCache;
use crate::platform::FileSystemAccess;
use crate::progress::{ProgressReporter, SilentReporter};
use crate::storage::models::{NewEntitlement, NewNode};
use crate::storage::EntitlementStore;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tracing::{debug, error, warn};

/// Longest path (in characters) the walker will visit.
pub const DEFAULT_MAX_PATH_LENGTH: usize = 248;

/// Recorded as a node's owner when the owner could not be read.
pub const UNKNOWN_OWNER: &str = "<unknown>";

static SILENT: SilentReporter = SilentReporter;

/// Counters for one walk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WalkStats {
    /// Directories that passed the length and exclusion checks.
    pub folders: u64,
    /// Explicit entries seen, whether or not they were stored.
    pub entitlements: u64,
    pub protected: u64,
    pub nodes_written: u64,
    pub excluded: u64,
    pub too_long: u64,
    pub failures: u64,
    pub deepest_level: u32,
    /// Whether the starting directory itself was written as a node.
    pub root_recorded: bool,
}

impl WalkStats {
    pub fn absorb(&mut self, other: &WalkStats) {
        self.folders += other.folders;
        self.entitlements += other.entitlements;
        self.protected += other.protected;
        self.nodes_written += other.nodes_written;
        self.excluded += other.excluded;
        self.too_long += other.too_long;
        self.failures += other.failures;
        self.deepest_level = self.deepest_level.max(other.deepest_level);
        self.root_recorded |= other.root_recorded;
    }
}

struct Frame {
    path: PathBuf,
    level: u32,
    parent_id: Option<i64>,
}

/// Depth-bounded pre-order traversal that records each directory as a node
/// and its explicit access entries as entitlements.
///
/// A directory's node is written before any of its children are visited, so
/// children always reference an existing parent id. Failures on one path
/// abandon that path (and what lies below it) and the walk carries on with
/// its siblings.
pub struct TreeWalker<'a> {
    fs: &'a dyn FileSystemAccess,
    identities: &'a IdentityCache,
    exclusions: &'a ExclusionMatcher,
    store: &'a dyn EntitlementStore,
    reporter: &'a dyn ProgressReporter,
    max_path_length: usize,
}

impl<'a> TreeWalker<'a> {
    pub fn new(
        fs: &'a dyn FileSystemAccess,
        identities: &'a IdentityCache,
        exclusions: &'a ExclusionMatcher,
        store: &'a dyn EntitlementStore,
    ) -> Self {
        Self {
            fs,
            identities,
            exclusions,
            store,
            reporter: &SILENT,
            max_path_length: DEFAULT_MAX_PATH_LENGTH,
        }
    }

    pub fn with_reporter(mut self, reporter: &'a dyn ProgressReporter) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn with_max_path_length(mut self, max_path_length: usize) -> Self {
        self.max_path_length = max_path_length;
        self
    }

    /// Walks `root` (recorded at `start_level`) down to `max_level`
    /// inclusive. `parent_id` is the parent node of `root`, if any.
    ///
    /// Nothing is written when `start_level` already lies below
    /// `max_level`. Callers check [`WalkStats::root_recorded`] to tell a
    /// walk that recorded its root from one that could not.
    pub fn walk(
        &self,
        root: &Path,
        start_level: u32,
        max_level: u32,
        top_level_id: i64,
        parent_id: Option<i64>,
    ) -> WalkStats {
        let mut stats = WalkStats::default();
        if start_level > max_level {
            warn!(
                "{} is at level {}, below the scan depth {}; nothing recorded",
                root.display(),
                start_level,
                max_level
            );
            return stats;
        }

        let mut stack = vec![Frame {
            path: root.to_path_buf(),
            level: start_level,
            parent_id,
        }];
        let mut is_root = true;

        while let Some(frame) = stack.pop() {
            let visited = self.visit(&frame, top_level_id, &mut stats);
            if is_root {
                stats.root_recorded = visited.is_some();
                is_root = false;
            }
            let Some(node_id) = visited else {
                continue;
            };
            stats.deepest_level = stats.deepest_level.max(frame.level);

            if frame.level < max_level {
                match self.fs.list_child_directories(&frame.path) {
                    Ok(children) => {
                        // reversed so the first child is popped first
                        stack.extend(children.into_iter().rev().map(|child| Frame {
                            path: child,
                            level: frame.level + 1,
                            parent_id: Some(node_id),
                        }));
                    }
                    Err(e) => {
                        warn!(
                            "Listing subdirectories of {} failed: {}",
                            frame.path.display(),
                            e
                        );
                        stats.failures += 1;
                    }
                }
            }

            self.reporter.on_walk_progress(frame.level, &stats);
        }

        stats
    }

    /// Records one directory. Returns its node id when the walk may descend.
    fn visit(&self, frame: &Frame, top_level_id: i64, stats: &mut WalkStats) -> Option<i64> {
        let path = &frame.path;
        let full_path = path.to_string_lossy().into_owned();

        let length = full_path.chars().count();
        if length > self.max_path_length {
            warn!("Path too long ({} characters): {}", length, full_path);
            stats.too_long += 1;
            return None;
        }

        if self.exclusions.is_excluded(path) {
            debug!("Excluded: {}", full_path);
            stats.excluded += 1;
            return None;
        }

        stats.folders += 1;

        let times = match self.fs.read_metadata(path) {
            Ok(times) => times,
            Err(e) => {
                warn!("Reading timestamps of {} failed: {}", full_path, e);
                stats.failures += 1;
                return None;
            }
        };

        let security = match self.fs.read_security(path) {
            Ok(security) => security,
            Err(e) => {
                warn!("Reading security of {} failed: {}", full_path, e);
                stats.failures += 1;
                return None;
            }
        };

        let owner = match security.owner_sid.as_deref() {
            Some(sid) => self.identities.resolve_name(sid).to_string(),
            None => {
                warn!("Owner of {} could not be read", full_path);
                UNKNOWN_OWNER.to_string()
            }
        };
        if security.inheritance_disabled {
            stats.protected += 1;
        }

        let discovered_at = Utc::now();
        let node = NewNode {
            name: node_name(path, &full_path),
            full_path,
            level: frame.level,
            top_level_id,
            parent_id: frame.parent_id,
            owner,
            is_protected: security.inheritance_disabled,
            last_access: times.last_access,
            last_write: times.last_write,
            discovered_at,
        };

        let node_id = match self.store.insert_node(&node) {
            Ok(id) => id,
            Err(e) => {
                error!("Recording node {} failed: {}", node.full_path, e);
                stats.failures += 1;
                return None;
            }
        };
        stats.nodes_written += 1;

        self.record_entitlements(node_id, &node.full_path, &security, discovered_at, stats);
        Some(node_id)
    }

    /// Stores the explicit entries of one node. The first failed insert
    /// skips the node's remaining entries.
    fn record_entitlements(
        &self,
        node_id: i64,
        full_path: &str,
        security: &SecurityDescriptor,
        discovered_at: DateTime<Utc>,
        stats: &mut WalkStats,
    ) {
        for entry in security.explicit_entries() {
            stats.entitlements += 1;
            let entitlement = NewEntitlement {
                node_id,
                principal: self.identities.resolve_name(&entry.principal_sid).to_string(),
                principal_class: self
                    .identities
                    .resolve_class(&entry.principal_sid)
                    .to_string(),
                access_rights: entry.rights.to_string(),
                access_type: entry.access_type.to_string(),
                inheritance_flags: entry.inheritance.to_string(),
                propagation_flags: entry.propagation.to_string(),
                discovered_at,
            };
            if let Err(e) = self.store.insert_entitlement(&entitlement) {
                error!(
                    "Recording entitlement of {} for {} failed, skipping the rest of the node: {}",
                    entitlement.principal, full_path, e
                );
                stats.failures += 1;
                break;
            }
        }
    }
}

/// Final path component, or the whole path for roots such as `D:\` or `/`.
fn node_name(path: &Path, full_path: &str) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| full_path.to_string())
}
