use super::{ScanContext, ScanKind, WalkStats};
use crate::error::{Error, Result};
use crate::exclusion::ExclusionMatcher;
use crate::storage::models::{Filesystem, NewTopLevelSubtree, TopLevelSubtree};
use crate::storage::EntitlementStore;
use chrono::Utc;
use std::collections::HashSet;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Default)]
pub struct FullPassSummary {
    pub filesystems: usize,
    pub discovered: usize,
    pub subtrees_scanned: usize,
    pub subtrees_failed: usize,
    pub stats: WalkStats,
}

/// Periodically rediscovers top-level directories and rescans every known
/// subtree from scratch, least recently scanned first.
pub struct FullScanLoop<S: EntitlementStore> {
    store: S,
    context: ScanContext,
    interval: Duration,
}

impl<S: EntitlementStore> FullScanLoop<S> {
    pub fn new(store: S, context: ScanContext, interval: Duration) -> Self {
        Self {
            store,
            context,
            interval,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Runs passes until the stop signal fires.
    pub fn run(&self) {
        info!("Full scan loop started");
        while !self.context.stop.is_stopped() {
            if let Err(e) = self.run_pass() {
                error!("Full scan pass failed: {}", e);
            }
            if self.context.stop.wait_timeout(self.interval) {
                break;
            }
        }
        info!("Full scan loop stopped");
    }

    pub fn run_pass(&self) -> Result<FullPassSummary> {
        let start = Instant::now();
        self.context.reporter.on_pass_start(ScanKind::Full);

        let filesystems = self.store.list_filesystems()?;
        let exclusions = ExclusionMatcher::new(&self.store.list_exclusion_patterns()?);
        debug!(
            "Full pass: {} filesystems, {} exclusion patterns",
            filesystems.len(),
            exclusions.len()
        );

        let mut summary = FullPassSummary {
            filesystems: filesystems.len(),
            ..Default::default()
        };

        let known: HashSet<(i64, String)> = self
            .store
            .list_top_level_subtrees()?
            .into_iter()
            .map(|subtree| (subtree.filesystem_id, subtree.full_path.to_lowercase()))
            .collect();
        for filesystem in &filesystems {
            summary.discovered += self.discover_top_level(filesystem, &exclusions, &known);
        }

        for subtree in self.store.list_top_level_subtrees()? {
            if self.context.stop.is_stopped() {
                info!("Stop requested, ending full pass early");
                break;
            }
            match self.scan_subtree(&subtree, &exclusions) {
                Ok(stats) => {
                    summary.subtrees_scanned += 1;
                    summary.stats.absorb(&stats);
                }
                Err(e) => {
                    error!("Full scan of {} failed: {}", subtree.full_path, e);
                    summary.subtrees_failed += 1;
                }
            }
        }

        let elapsed = start.elapsed().as_secs_f64();
        info!(
            "Full pass complete in {:.2}s: {} subtrees, {} folders, {} entitlements, {} new",
            elapsed,
            summary.subtrees_scanned,
            summary.stats.folders,
            summary.stats.entitlements,
            summary.discovered
        );
        self.context
            .reporter
            .on_pass_complete(ScanKind::Full, summary.subtrees_scanned, elapsed);
        Ok(summary)
    }

    /// Registers immediate children of the filesystem root that are not yet
    /// known. Returns how many were added.
    fn discover_top_level(
        &self,
        filesystem: &Filesystem,
        exclusions: &ExclusionMatcher,
        known: &HashSet<(i64, String)>,
    ) -> usize {
        let root = Path::new(&filesystem.drive_root);
        let children = match self.context.fs.list_child_directories(root) {
            Ok(children) => children,
            Err(e) => {
                warn!("Listing {} failed: {}", filesystem.drive_root, e);
                return 0;
            }
        };

        let mut discovered = 0;
        for child in children {
            let full_path = child.to_string_lossy().into_owned();
            if exclusions.is_excluded(&child) {
                debug!("Excluded top-level folder: {}", full_path);
                continue;
            }
            if known.contains(&(filesystem.id, full_path.to_lowercase())) {
                continue;
            }

            let times = match self.context.fs.read_metadata(&child) {
                Ok(times) => times,
                Err(e) => {
                    warn!("Reading timestamps of {} failed: {}", full_path, e);
                    continue;
                }
            };
            let security = match self.context.fs.read_security(&child) {
                Ok(security) => security,
                Err(e) => {
                    warn!("Reading security of {} failed: {}", full_path, e);
                    continue;
                }
            };

            let subtree = NewTopLevelSubtree {
                filesystem_id: filesystem.id,
                name: child
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_else(|| full_path.clone()),
                full_path,
                scan_depth: filesystem.depth,
                first_seen: Utc::now(),
                last_access: Some(times.last_access),
                last_write: Some(times.last_write),
                data_owner: security
                    .owner_sid
                    .as_deref()
                    .map(|sid| self.context.identities.resolve_name(sid).to_string()),
                is_protected: security.inheritance_disabled,
            };

            match self.store.register_top_level_subtree(&subtree) {
                Ok(Some(id)) => {
                    info!("New top-level folder {} (id {})", subtree.full_path, id);
                    discovered += 1;
                }
                Ok(None) => {}
                Err(e) => error!("Registering {} failed: {}", subtree.full_path, e),
            }
        }
        discovered
    }

    /// Replaces every node of one subtree with a fresh walk. Fails when the
    /// top-level folder itself cannot be read.
    fn scan_subtree(
        &self,
        subtree: &TopLevelSubtree,
        exclusions: &ExclusionMatcher,
    ) -> Result<WalkStats> {
        let start = Instant::now();
        self.context
            .reporter
            .on_subtree_start(ScanKind::Full, &subtree.full_path, subtree.scan_depth);

        let _guard = self.context.locks.acquire(subtree.id, ScanKind::Full);

        let removed = self.store.delete_subtree_nodes(subtree.id)?;
        debug!("Cleared {} nodes of {}", removed, subtree.full_path);

        let stats = self.context.walker(&self.store, exclusions).walk(
            Path::new(&subtree.full_path),
            1,
            subtree.scan_depth,
            subtree.id,
            None,
        );
        if !stats.root_recorded {
            // last_scanned is left as it was
            return Err(Error::Other(format!(
                "top-level folder {} could not be recorded",
                subtree.full_path
            )));
        }
        self.store.complete_subtree_scan(subtree.id, Utc::now())?;

        let elapsed = start.elapsed().as_secs_f64();
        info!(
            "Scanned {} in {:.2}s: {} folders, {} entitlements, {} protected",
            subtree.full_path, elapsed, stats.folders, stats.entitlements, stats.protected
        );
        self.context
            .reporter
            .on_subtree_complete(ScanKind::Full, &subtree.full_path, &stats, elapsed);
        Ok(stats)
    }
}
