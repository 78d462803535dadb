//! Scan loops and the tree walker they share.

pub mod full;
pub mod lock;
pub mod signal;
pub mod targeted;
pub mod walk;

pub use full::{FullPassSummary, FullScanLoop};
pub use lock::{ScanKind, SubtreeGuard, SubtreeLocks};
pub use signal::StopSignal;
pub use targeted::{TargetedPassSummary, TargetedScanLoop};
pub use walk::{TreeWalker, WalkStats};

use crate::exclusion::ExclusionMatcher;
use crate::identity::IdentityCache;
use crate::platform::FileSystemAccess;
use crate::progress::{ProgressReporter, SilentReporter};
use crate::storage::EntitlementStore;
use std::sync::Arc;
use std::time::Duration;

/// Everything the two loops share. Cloning is cheap; every clone sees the
/// same locks and stop signal.
#[derive(Clone)]
pub struct ScanContext {
    pub fs: Arc<dyn FileSystemAccess>,
    pub identities: Arc<IdentityCache>,
    pub locks: Arc<SubtreeLocks>,
    pub stop: Arc<StopSignal>,
    pub reporter: Arc<dyn ProgressReporter>,
    pub max_path_length: usize,
}

impl ScanContext {
    pub fn new(fs: Arc<dyn FileSystemAccess>, identities: Arc<IdentityCache>) -> Self {
        Self {
            fs,
            identities,
            locks: Arc::new(SubtreeLocks::new(Duration::from_secs(5))),
            stop: Arc::new(StopSignal::new()),
            reporter: Arc::new(SilentReporter),
            max_path_length: walk::DEFAULT_MAX_PATH_LENGTH,
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn with_max_path_length(mut self, max_path_length: usize) -> Self {
        self.max_path_length = max_path_length;
        self
    }

    pub fn with_lock_wait_log_interval(mut self, interval: Duration) -> Self {
        self.locks = Arc::new(SubtreeLocks::new(interval));
        self
    }

    pub fn walker<'a>(
        &'a self,
        store: &'a dyn EntitlementStore,
        exclusions: &'a ExclusionMatcher,
    ) -> TreeWalker<'a> {
        TreeWalker::new(self.fs.as_ref(), self.identities.as_ref(), exclusions, store)
            .with_reporter(self.reporter.as_ref())
            .with_max_path_length(self.max_path_length)
    }
}
