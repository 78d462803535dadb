use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::identity::{ClassOverrides, CsvIdentitySource, EmptyIdentitySource, IdentityCache};
use crate::platform::FileSystemAccess;
use crate::progress::ProgressReporter;
use crate::scanner::{FullPassSummary, FullScanLoop, ScanContext, StopSignal, TargetedScanLoop};
use crate::storage::{Database, EntitlementStore};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{error, info, warn};

/// Wires configuration, identities, storage and the two scan loops.
pub struct ScanService {
    config: AppConfig,
}

impl ScanService {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Enumerates the configured identity source once. Without a source,
    /// only built-in principals resolve.
    pub fn load_identities(&self) -> IdentityCache {
        let overrides = ClassOverrides::from_config(&self.config.identity);
        match &self.config.identity.source_path {
            Some(path) => IdentityCache::warm_up(&CsvIdentitySource::new(path), &overrides),
            None => {
                warn!("No identity source configured, principals will stay unresolved");
                IdentityCache::warm_up(&EmptyIdentitySource, &overrides)
            }
        }
    }

    pub fn open_store(&self) -> Result<Database> {
        Ok(Database::open(&self.config.database_path)?)
    }

    pub fn context(
        &self,
        fs: Arc<dyn FileSystemAccess>,
        reporter: Arc<dyn ProgressReporter>,
    ) -> ScanContext {
        ScanContext::new(fs, Arc::new(self.load_identities()))
            .with_reporter(reporter)
            .with_max_path_length(self.config.max_path_length)
            .with_lock_wait_log_interval(self.config.lock_wait_log_interval())
    }

    /// One full pass on the calling thread.
    pub fn scan_once(&self, context: ScanContext) -> Result<FullPassSummary> {
        let store = self.open_store()?;
        FullScanLoop::new(store, context, self.config.full_scan_interval()).run_pass()
    }

    /// Starts both loops on their own threads, each with its own store
    /// connection. A loop whose store cannot be opened is skipped; if
    /// neither can start, the error is returned.
    pub fn start(&self, context: ScanContext) -> Result<ScanHandle> {
        let mut last_error = None;
        let full = match self.open_store() {
            Ok(store) => Some(FullScanLoop::new(
                store,
                context.clone(),
                self.config.full_scan_interval(),
            )),
            Err(e) => {
                error!("Full scan loop not started: {}", e);
                last_error = Some(e);
                None
            }
        };
        let targeted = match self.open_store() {
            Ok(store) => Some(TargetedScanLoop::new(
                store,
                context.clone(),
                self.config.targeted_scan_interval(),
            )),
            Err(e) => {
                error!("Targeted scan loop not started: {}", e);
                last_error = Some(e);
                None
            }
        };
        if let (None, None, Some(e)) = (&full, &targeted, last_error) {
            return Err(e);
        }
        ScanHandle::spawn(context, full, targeted)
    }
}

/// Running scan loops.
pub struct ScanHandle {
    stop: Arc<StopSignal>,
    workers: Vec<JoinHandle<()>>,
}

impl ScanHandle {
    pub fn spawn<F, T>(
        context: ScanContext,
        full: Option<FullScanLoop<F>>,
        targeted: Option<TargetedScanLoop<T>>,
    ) -> Result<Self>
    where
        F: EntitlementStore + 'static,
        T: EntitlementStore + 'static,
    {
        let mut workers = Vec::new();
        let spawned = (|| -> std::io::Result<()> {
            if let Some(full) = full {
                workers.push(
                    thread::Builder::new()
                        .name("full-scan".to_string())
                        .spawn(move || full.run())?,
                );
            }
            if let Some(targeted) = targeted {
                workers.push(
                    thread::Builder::new()
                        .name("targeted-scan".to_string())
                        .spawn(move || targeted.run())?,
                );
            }
            Ok(())
        })();
        if let Err(e) = spawned {
            context.stop.stop();
            return Err(e.into());
        }
        if workers.is_empty() {
            return Err(Error::Other("no scan loop could be started".to_string()));
        }
        info!("{} scan loops running", workers.len());
        Ok(Self {
            stop: context.stop,
            workers,
        })
    }

    pub fn stop_signal(&self) -> Arc<StopSignal> {
        Arc::clone(&self.stop)
    }

    pub fn running(&self) -> usize {
        self.workers.iter().filter(|worker| !worker.is_finished()).count()
    }

    /// Blocks until the loops exit. They exit only after a stop.
    pub fn wait(self) {
        for worker in self.workers {
            if worker.join().is_err() {
                error!("A scan loop panicked");
            }
        }
    }

    pub fn shutdown(self) {
        info!("Stopping scan loops");
        self.stop.stop();
        self.wait();
    }
}
