//! Security identifier → principal resolution.
//!
//! The cache is built once from a full enumeration of the identity source
//! and never mutated afterwards, so it is shared between scan loops behind a
//! plain `Arc` with no locking.

pub mod csv_source;

pub use csv_source::CsvIdentitySource;

use crate::config::IdentityConfig;
use crate::error::Result;
use ahash::AHashMap;
use serde::Deserialize;
use std::fmt;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Coarse principal class stored alongside every entitlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrincipalClass {
    User,
    Group,
    Computer,
    System,
    /// Sentinel for identifiers the source does not know (deleted accounts).
    Deleted,
}

impl PrincipalClass {
    /// Maps a directory object class (the most derived `objectClass` value).
    pub fn from_object_class(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "group" => PrincipalClass::Group,
            "computer" => PrincipalClass::Computer,
            "system" => PrincipalClass::System,
            _ => PrincipalClass::User,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PrincipalClass::User => "user",
            PrincipalClass::Group => "group",
            PrincipalClass::Computer => "computer",
            PrincipalClass::System => "system",
            PrincipalClass::Deleted => "deleted",
        }
    }
}

impl fmt::Display for PrincipalClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One user or group object as delivered by an identity source.
#[derive(Debug, Clone, Deserialize)]
pub struct PrincipalEntry {
    pub sid: String,
    pub name: String,
    pub object_class: String,
    #[serde(default)]
    pub canonical_name: String,
    #[serde(default)]
    pub distinguished_name: String,
    #[serde(default)]
    pub path: String,
}

/// Cached view of a principal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityRecord {
    pub sid: String,
    pub name: String,
    pub distinguished_name: String,
    pub canonical_name: String,
    pub path: String,
    pub class: PrincipalClass,
}

/// Anything that can enumerate all user and group principals.
pub trait IdentitySource {
    fn enumerate_principals(&self) -> Result<Vec<PrincipalEntry>>;
}

/// Source used when no directory export is configured.
pub struct EmptyIdentitySource;

impl IdentitySource for EmptyIdentitySource {
    fn enumerate_principals(&self) -> Result<Vec<PrincipalEntry>> {
        Ok(Vec::new())
    }
}

/// Names promoted to [`PrincipalClass::System`] regardless of object class.
#[derive(Debug, Clone, Default)]
pub struct ClassOverrides {
    exact: Vec<String>,
    prefixes: Vec<String>,
}

impl ClassOverrides {
    pub fn new(exact: Vec<String>, prefixes: Vec<String>) -> Self {
        Self { exact, prefixes }
    }

    pub fn from_config(config: &IdentityConfig) -> Self {
        Self::new(
            config.system_accounts.clone(),
            config.system_prefixes.clone(),
        )
    }

    pub fn is_system(&self, name: &str) -> bool {
        self.exact.iter().any(|exact| exact == name)
            || self.prefixes.iter().any(|prefix| name.starts_with(prefix.as_str()))
    }

    pub fn classify(&self, name: &str, object_class: &str) -> PrincipalClass {
        if self.is_system(name) {
            PrincipalClass::System
        } else {
            PrincipalClass::from_object_class(object_class)
        }
    }
}

// Built-in principals that never appear in a directory enumeration.
const WELL_KNOWN_SIDS: &[(&str, &str)] = &[
    ("S-1-1-0", "Everyone"),
    ("S-1-3-0", "CREATOR OWNER"),
    ("S-1-3-1", "CREATOR GROUP"),
    ("S-1-5-7", "ANONYMOUS LOGON"),
    ("S-1-5-11", "Authenticated Users"),
    ("S-1-5-18", "SYSTEM"),
    ("S-1-5-19", "LOCAL SERVICE"),
    ("S-1-5-20", "NETWORK SERVICE"),
    ("S-1-5-32-544", "Administrators"),
    ("S-1-5-32-545", "Users"),
    ("S-1-5-32-547", "Power Users"),
    ("S-1-5-32-549", "Server Operators"),
    ("S-1-5-32-551", "Backup Operators"),
];

pub const UNRESOLVED_CLASS: PrincipalClass = PrincipalClass::Deleted;

#[derive(Debug, Default)]
pub struct IdentityCache {
    records: AHashMap<String, IdentityRecord>,
}

impl IdentityCache {
    /// Enumerates `source` once and builds the cache.
    ///
    /// The well-known built-in principals (`Everyone`, `SYSTEM`,
    /// `Administrators`, ...) are always seeded as class `system`, so they
    /// never degrade to `deleted`, not even when the source fails. A
    /// failing source is not fatal: the cache then holds only those
    /// built-ins and every other lookup degrades to the unresolved
    /// sentinels.
    pub fn warm_up(source: &dyn IdentitySource, overrides: &ClassOverrides) -> Self {
        let start = Instant::now();
        let mut records: AHashMap<String, IdentityRecord> = AHashMap::new();

        for (sid, name) in WELL_KNOWN_SIDS {
            records.insert(
                (*sid).to_string(),
                IdentityRecord {
                    sid: (*sid).to_string(),
                    name: (*name).to_string(),
                    distinguished_name: String::new(),
                    canonical_name: String::new(),
                    path: String::new(),
                    class: PrincipalClass::System,
                },
            );
        }
        let built_in = records.len();

        match source.enumerate_principals() {
            Ok(entries) => {
                records.reserve(entries.len());
                for entry in entries {
                    if records.contains_key(&entry.sid) {
                        debug!("Duplicate principal {} ({}) ignored", entry.sid, entry.name);
                        continue;
                    }
                    let class = overrides.classify(&entry.name, &entry.object_class);
                    records.insert(
                        entry.sid.clone(),
                        IdentityRecord {
                            sid: entry.sid,
                            name: entry.name,
                            distinguished_name: entry.distinguished_name,
                            canonical_name: entry.canonical_name,
                            path: entry.path,
                            class,
                        },
                    );
                }
            }
            Err(err) => {
                warn!("Reading identity source failed, continuing unresolved: {}", err);
            }
        }

        info!(
            "{} principals cached ({} built-in) in {:.2}s",
            records.len(),
            built_in,
            start.elapsed().as_secs_f64()
        );
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, sid: &str) -> Option<&IdentityRecord> {
        self.records.get(sid)
    }

    pub fn is_known(&self, sid: &str) -> bool {
        self.records.contains_key(sid)
    }

    /// Display name, or the SID itself when unresolved.
    pub fn resolve_name<'a>(&'a self, sid: &'a str) -> &'a str {
        self.records
            .get(sid)
            .map(|record| record.name.as_str())
            .unwrap_or(sid)
    }

    /// Principal class, or [`PrincipalClass::Deleted`] when unresolved.
    pub fn resolve_class(&self, sid: &str) -> PrincipalClass {
        self.records
            .get(sid)
            .map(|record| record.class)
            .unwrap_or(UNRESOLVED_CLASS)
    }
}
