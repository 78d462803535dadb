//! Filesystem capability used by the walker: child enumeration, directory
//! timestamps and security descriptors. Every call may fail; failures are
//! local to the path asked about.

pub mod memory;
#[cfg(unix)]
pub mod unix;
#[cfg(target_os = "windows")]
pub mod windows;

use crate::acl::SecurityDescriptor;
use chrono::{DateTime, Utc};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub use memory::MemoryFs;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectoryTimes {
    pub last_access: DateTime<Utc>,
    pub last_write: DateTime<Utc>,
}

pub trait FileSystemAccess: Send + Sync {
    /// Immediate subdirectories of `path`, in a stable order.
    fn list_child_directories(&self, path: &Path) -> io::Result<Vec<PathBuf>>;

    fn read_metadata(&self, path: &Path) -> io::Result<DirectoryTimes>;

    fn read_security(&self, path: &Path) -> io::Result<SecurityDescriptor>;
}

/// The host operating system's filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeFs;

impl FileSystemAccess for NativeFs {
    fn list_child_directories(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        let mut children = Vec::new();
        for entry in WalkDir::new(path)
            .min_depth(1)
            .max_depth(1)
            .follow_links(false)
            .sort_by_file_name()
        {
            let entry = entry?;
            if entry.file_type().is_dir() {
                children.push(entry.into_path());
            }
        }
        Ok(children)
    }

    fn read_metadata(&self, path: &Path) -> io::Result<DirectoryTimes> {
        let metadata = fs::metadata(path)?;
        if !metadata.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} is not a directory", path.display()),
            ));
        }
        Ok(DirectoryTimes {
            last_access: DateTime::<Utc>::from(metadata.accessed()?),
            last_write: DateTime::<Utc>::from(metadata.modified()?),
        })
    }

    #[cfg(target_os = "windows")]
    fn read_security(&self, path: &Path) -> io::Result<SecurityDescriptor> {
        windows::read_security(path)
    }

    #[cfg(unix)]
    fn read_security(&self, path: &Path) -> io::Result<SecurityDescriptor> {
        unix::read_security(path)
    }

    #[cfg(not(any(unix, target_os = "windows")))]
    fn read_security(&self, path: &Path) -> io::Result<SecurityDescriptor> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            format!("no security descriptor support for {}", path.display()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_lists_only_directories_sorted() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("beta")).unwrap();
        fs::create_dir(dir.path().join("alpha")).unwrap();
        fs::create_dir_all(dir.path().join("alpha").join("nested")).unwrap();
        fs::write(dir.path().join("file.txt"), b"x").unwrap();

        let children = NativeFs.list_child_directories(dir.path()).unwrap();
        let names: Vec<_> = children
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["alpha", "beta"]);
    }

    #[test]
    fn test_native_enumeration_failure_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("gone");
        assert!(NativeFs.list_child_directories(&missing).is_err());
        assert!(NativeFs.read_metadata(&missing).is_err());
    }

    #[test]
    fn test_native_metadata_rejects_files() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("file.txt");
        fs::write(&file, b"x").unwrap();
        assert!(NativeFs.read_metadata(&file).is_err());
        assert!(NativeFs.read_metadata(dir.path()).is_ok());
    }
}
