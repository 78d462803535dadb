pub mod acl;
pub mod config;
pub mod engine;
pub mod error;
pub mod exclusion;
pub mod identity;
pub mod platform;
pub mod progress;
pub mod scanner;
pub mod storage;

pub use config::AppConfig;
pub use engine::{ScanHandle, ScanService};
pub use error::{Error, Result};
pub use progress::{ProgressReporter, SilentReporter};
