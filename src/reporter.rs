use acl_inventory::scanner::{ScanKind, WalkStats};
use acl_inventory::ProgressReporter;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// CLI progress reporter: one spinner per subtree being walked.
pub struct CliReporter {
    bar: Mutex<Option<ProgressBar>>,
}

impl CliReporter {
    pub fn new() -> Self {
        Self {
            bar: Mutex::new(None),
        }
    }

    fn spinner(message: String) -> ProgressBar {
        let pb = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");
        pb.set_style(style);
        pb.set_message(message);
        pb.enable_steady_tick(Duration::from_millis(80));
        pb
    }

    fn set_bar(&self, pb: ProgressBar) {
        let mut guard = self.bar.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(old) = guard.take() {
            old.finish_and_clear();
        }
        *guard = Some(pb);
    }

    fn finish_bar(&self) {
        let mut guard = self.bar.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(pb) = guard.take() {
            pb.finish_and_clear();
        }
    }
}

impl ProgressReporter for CliReporter {
    fn on_subtree_start(&self, kind: ScanKind, path: &str, max_level: u32) {
        self.set_bar(Self::spinner(format!(
            "{} scan of {} (to level {})...",
            kind, path, max_level
        )));
    }

    fn on_walk_progress(&self, level: u32, stats: &WalkStats) {
        let guard = self.bar.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(pb) = guard.as_ref() {
            pb.set_message(format!(
                "Scanning... {} folders, {} entitlements (level {})",
                stats.folders, stats.entitlements, level
            ));
        }
    }

    fn on_subtree_complete(&self, kind: ScanKind, path: &str, stats: &WalkStats, duration_secs: f64) {
        self.finish_bar();
        eprintln!(
            "  \x1b[32m✓\x1b[0m {} scan of {}: {} folders, {} entitlements in {:.2}s",
            kind, path, stats.folders, stats.entitlements, duration_secs
        );
    }

    fn on_pass_complete(&self, kind: ScanKind, subtrees: usize, duration_secs: f64) {
        self.finish_bar();
        eprintln!(
            "  \x1b[32m✓\x1b[0m {} pass complete: {} subtrees in {:.2}s",
            kind, subtrees, duration_secs
        );
    }
}
