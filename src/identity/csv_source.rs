use super::{IdentitySource, PrincipalEntry};
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Principal export with a header row:
/// `sid,name,object_class,canonical_name,distinguished_name,path`.
pub struct CsvIdentitySource {
    path: PathBuf,
}

impl CsvIdentitySource {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl IdentitySource for CsvIdentitySource {
    fn enumerate_principals(&self) -> Result<Vec<PrincipalEntry>> {
        debug!("Reading principals from {}", self.path.display());
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_path(&self.path)
            .map_err(|e| Error::Identity(format!("{}: {}", self.path.display(), e)))?;

        let mut entries = Vec::new();
        for (line, record) in reader.deserialize::<PrincipalEntry>().enumerate() {
            match record {
                Ok(entry) if !entry.sid.is_empty() => entries.push(entry),
                Ok(_) => warn!("Principal row {} has no SID, skipped", line + 2),
                Err(e) => warn!("Principal row {} unreadable: {}", line + 2, e),
            }
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{ClassOverrides, IdentityCache, PrincipalClass};
    use std::fs;

    #[test]
    fn test_reads_export_and_skips_bad_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("principals.csv");
        fs::write(
            &path,
            "sid,name,object_class,canonical_name,distinguished_name,path\n\
             S-1-5-21-7-7-7-1104,jdoe,user,corp/Users/jdoe,\"CN=jdoe,DC=corp\",LDAP://dc1/CN=jdoe\n\
             ,orphan,user,,,\n\
             S-1-5-21-7-7-7-2201, Finance-RW ,group,,,\n",
        )
        .unwrap();

        let source = CsvIdentitySource::new(&path);
        let entries = source.enumerate_principals().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].distinguished_name, "CN=jdoe,DC=corp");

        let cache = IdentityCache::warm_up(&source, &ClassOverrides::default());
        assert_eq!(cache.resolve_name("S-1-5-21-7-7-7-2201"), "Finance-RW");
        assert_eq!(cache.resolve_class("S-1-5-21-7-7-7-2201"), PrincipalClass::Group);
    }

    #[test]
    fn test_missing_file_is_an_identity_error() {
        let source = CsvIdentitySource::new("/nonexistent/principals.csv");
        match source.enumerate_principals() {
            Err(Error::Identity(_)) => {}
            other => panic!("expected identity error, got {:?}", other.map(|e| e.len())),
        }
    }
}
