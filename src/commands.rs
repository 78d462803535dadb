use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "acl-inventory")]
#[command(about = "Inventories folder ownership and explicit permissions", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the full and targeted scan loops until Ctrl-C
    Run,
    /// Run a single full pass and exit
    ScanOnce,
    /// Register a filesystem root to scan
    AddFilesystem {
        /// Root directory, e.g. D:\ or /srv/shares
        root: String,
        /// Deepest level recorded below the root (1 = top-level folders only)
        #[arg(short, long, default_value_t = 3, value_parser = clap::value_parser!(u32).range(1..))]
        depth: u32,
        #[arg(long)]
        provider: Option<String>,
        #[arg(long)]
        share: Option<String>,
        /// Name of the credential set used to mount the share
        #[arg(long)]
        credentials: Option<String>,
    },
    /// Add a path exclusion pattern (* or % match any run of characters)
    AddExclusion { pattern: String },
    /// Queue a targeted rescan of a path
    RequestRescan { path: String },
    /// List known top-level subtrees
    ListSubtrees,
    /// Write every recorded entitlement to a CSV file
    ExportEntitlements {
        #[arg(short, long, default_value = "entitlements.csv")]
        output: String,
    },
    /// Print configuration values
    PrintConfig,
    /// Truncate scan result tables
    TruncateDb,
}
