use super::{ScanContext, ScanKind, WalkStats};
use crate::error::{Error, Result};
use crate::exclusion::ExclusionMatcher;
use crate::storage::models::{ClosestNode, RescanRequest};
use crate::storage::EntitlementStore;
use chrono::Utc;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// How often a request is re-resolved when a full scan keeps replacing the
/// subtree underneath it.
const MAX_RESOLVE_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, Default)]
pub struct TargetedPassSummary {
    pub requests: usize,
    pub rescanned: usize,
    pub unresolved: usize,
    pub failed: usize,
    pub stats: WalkStats,
}

/// Services rescan requests by re-walking only the affected part of a
/// subtree, starting at the deepest node already recorded for the path.
pub struct TargetedScanLoop<S: EntitlementStore> {
    store: S,
    context: ScanContext,
    interval: Duration,
}

impl<S: EntitlementStore> TargetedScanLoop<S> {
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

    pub fn run(&self) {
        info!("Targeted scan loop started");
        while !self.context.stop.is_stopped() {
            if let Err(e) = self.run_pass() {
                error!("Targeted scan pass failed: {}", e);
            }
            if self.context.stop.wait_timeout(self.interval) {
                break;
            }
        }
        info!("Targeted scan loop stopped");
    }

    /// Handles every pending request once. Each request is marked processed
    /// whatever its outcome.
    pub fn run_pass(&self) -> Result<TargetedPassSummary> {
        let requests = self.store.pending_rescan_requests()?;
        let mut summary = TargetedPassSummary {
            requests: requests.len(),
            ..Default::default()
        };
        if requests.is_empty() {
            return Ok(summary);
        }

        let start = Instant::now();
        self.context.reporter.on_pass_start(ScanKind::Targeted);
        let exclusions = ExclusionMatcher::new(&self.store.list_exclusion_patterns()?);
        info!("{} rescan requests pending", requests.len());

        for request in &requests {
            if self.context.stop.is_stopped() {
                info!("Stop requested, leaving remaining rescan requests");
                break;
            }
            match self.process_request(request, &exclusions) {
                Ok(Some(stats)) => {
                    summary.rescanned += 1;
                    summary.stats.absorb(&stats);
                }
                Ok(None) => summary.unresolved += 1,
                Err(e) => {
                    error!("Rescan of {} failed: {}", request.full_path, e);
                    summary.failed += 1;
                }
            }
            if let Err(e) = self.store.mark_rescan_processed(request.id, Utc::now()) {
                error!("Marking rescan request {} processed failed: {}", request.id, e);
            }
        }

        let elapsed = start.elapsed().as_secs_f64();
        info!(
            "Targeted pass complete in {:.2}s: {} rescanned, {} unresolved, {} failed",
            elapsed, summary.rescanned, summary.unresolved, summary.failed
        );
        self.context
            .reporter
            .on_pass_complete(ScanKind::Targeted, summary.rescanned, elapsed);
        Ok(summary)
    }

    /// Returns `None` when no recorded node covers the requested path.
    fn process_request(
        &self,
        request: &RescanRequest,
        exclusions: &ExclusionMatcher,
    ) -> Result<Option<WalkStats>> {
        let requested = normalize_request_path(&request.full_path);

        for _ in 0..MAX_RESOLVE_ATTEMPTS {
            let Some(candidate) = self.store.find_closest_node(requested)? else {
                warn!("No scanned folder covers {}, request {} dropped", requested, request.id);
                return Ok(None);
            };

            let _guard = self
                .context
                .locks
                .acquire(candidate.node.top_level_id, ScanKind::Targeted);

            // a full scan may have replaced the subtree while we waited
            match self.store.find_closest_node(requested)? {
                Some(current) if current.node.top_level_id == candidate.node.top_level_id => {
                    return self.rescan_from(&current, exclusions).map(Some);
                }
                Some(current) => {
                    debug!(
                        "{} moved from subtree {} to {}, resolving again",
                        requested, candidate.node.top_level_id, current.node.top_level_id
                    );
                }
                None => {
                    warn!("{} disappeared while waiting, request {} dropped", requested, request.id);
                    return Ok(None);
                }
            }
        }

        warn!("Could not pin down a subtree for {}, request {} dropped", requested, request.id);
        Ok(None)
    }

    /// Caller holds the subtree lock. Fails when the starting folder cannot
    /// be recorded again; whatever lay below it is gone until the next pass.
    fn rescan_from(&self, closest: &ClosestNode, exclusions: &ExclusionMatcher) -> Result<WalkStats> {
        let start = Instant::now();
        let node = &closest.node;
        self.context
            .reporter
            .on_subtree_start(ScanKind::Targeted, &node.full_path, closest.max_level);

        let removed = self
            .store
            .delete_nodes_at_or_below(node.top_level_id, &node.full_path)?;
        debug!("Cleared {} nodes at or below {}", removed, node.full_path);

        let stats = self.context.walker(&self.store, exclusions).walk(
            Path::new(&node.full_path),
            node.level,
            closest.max_level,
            node.top_level_id,
            node.parent_id,
        );
        self.store.refresh_tree_timestamps(node.top_level_id)?;
        if !stats.root_recorded {
            return Err(Error::Other(format!(
                "{} could not be recorded again",
                node.full_path
            )));
        }

        let elapsed = start.elapsed().as_secs_f64();
        info!(
            "Rescanned {} in {:.2}s: {} folders, {} entitlements",
            node.full_path, elapsed, stats.folders, stats.entitlements
        );
        self.context
            .reporter
            .on_subtree_complete(ScanKind::Targeted, &node.full_path, &stats, elapsed);
        Ok(stats)
    }
}

/// Trims whitespace and trailing separators, keeping bare roots intact.
pub fn normalize_request_path(raw: &str) -> &str {
    let trimmed = raw.trim();
    let stripped = trimmed.trim_end_matches(|c: char| c == '/' || c == '\\');
    if stripped.is_empty() || stripped.ends_with(':') {
        trimmed
    } else {
        stripped
    }
}
