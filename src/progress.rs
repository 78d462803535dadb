use crate::scanner::{ScanKind, WalkStats};

/// Trait for observing scan progress.
///
/// The CLI implements it with indicatif spinners; the background service
/// runs with [`SilentReporter`] and relies on tracing output.
/// All methods have default no-op implementations.
pub trait ProgressReporter: Send + Sync {
    fn on_pass_start(&self, _kind: ScanKind) {}
    fn on_subtree_start(&self, _kind: ScanKind, _path: &str, _max_level: u32) {}
    fn on_walk_progress(&self, _level: u32, _stats: &WalkStats) {}
    fn on_subtree_complete(
        &self,
        _kind: ScanKind,
        _path: &str,
        _stats: &WalkStats,
        _duration_secs: f64,
    ) {
    }
    fn on_pass_complete(&self, _kind: ScanKind, _subtrees: usize, _duration_secs: f64) {}
}

/// No-op progress reporter for silent operation.
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {}
