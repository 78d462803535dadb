use super::{DirectoryTimes, FileSystemAccess};
use crate::acl::SecurityDescriptor;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

#[derive(Debug, Clone)]
struct MemoryDir {
    times: DirectoryTimes,
    security: SecurityDescriptor,
}

#[derive(Debug, Default)]
struct MemoryTree {
    dirs: BTreeMap<PathBuf, MemoryDir>,
    deny_listing: HashSet<PathBuf>,
    deny_metadata: HashSet<PathBuf>,
    deny_security: HashSet<PathBuf>,
}

/// Directory tree held in memory, for dry runs and tests.
///
/// Children are the registered paths whose parent is the listed path,
/// returned in name order. Failures can be injected per path.
#[derive(Debug, Default)]
pub struct MemoryFs {
    tree: Mutex<MemoryTree>,
}

fn default_times() -> DirectoryTimes {
    // 2024-01-01T00:00:00Z
    let stamp = DateTime::<Utc>::from_timestamp(1_704_067_200, 0).unwrap_or_default();
    DirectoryTimes {
        last_access: stamp,
        last_write: stamp,
    }
}

fn denied(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::PermissionDenied,
        format!("access denied: {}", path.display()),
    )
}

fn missing(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("no such directory: {}", path.display()),
    )
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_tree<T>(&self, f: impl FnOnce(&mut MemoryTree) -> T) -> T {
        let mut tree = self.tree.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut tree)
    }

    pub fn add_dir<P: AsRef<Path>>(&self, path: P, security: SecurityDescriptor) -> &Self {
        let path = path.as_ref().to_path_buf();
        self.with_tree(|tree| {
            tree.dirs.insert(
                path,
                MemoryDir {
                    times: default_times(),
                    security,
                },
            );
        });
        self
    }

    pub fn set_times<P: AsRef<Path>>(&self, path: P, times: DirectoryTimes) -> &Self {
        self.with_tree(|tree| {
            if let Some(dir) = tree.dirs.get_mut(path.as_ref()) {
                dir.times = times;
            }
        });
        self
    }

    pub fn set_security<P: AsRef<Path>>(&self, path: P, security: SecurityDescriptor) -> &Self {
        self.with_tree(|tree| {
            if let Some(dir) = tree.dirs.get_mut(path.as_ref()) {
                dir.security = security;
            }
        });
        self
    }

    /// Removes `path` and everything below it.
    pub fn remove_dir<P: AsRef<Path>>(&self, path: P) -> &Self {
        let path = path.as_ref();
        self.with_tree(|tree| tree.dirs.retain(|candidate, _| !candidate.starts_with(path)));
        self
    }

    pub fn deny_listing<P: AsRef<Path>>(&self, path: P) -> &Self {
        self.with_tree(|tree| tree.deny_listing.insert(path.as_ref().to_path_buf()));
        self
    }

    pub fn deny_metadata<P: AsRef<Path>>(&self, path: P) -> &Self {
        self.with_tree(|tree| tree.deny_metadata.insert(path.as_ref().to_path_buf()));
        self
    }

    pub fn deny_security<P: AsRef<Path>>(&self, path: P) -> &Self {
        self.with_tree(|tree| tree.deny_security.insert(path.as_ref().to_path_buf()));
        self
    }
}

impl FileSystemAccess for MemoryFs {
    fn list_child_directories(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        self.with_tree(|tree| {
            if tree.deny_listing.contains(path) {
                return Err(denied(path));
            }
            if !tree.dirs.contains_key(path) {
                return Err(missing(path));
            }
            Ok(tree
                .dirs
                .keys()
                .filter(|candidate| candidate.parent() == Some(path))
                .cloned()
                .collect())
        })
    }

    fn read_metadata(&self, path: &Path) -> io::Result<DirectoryTimes> {
        self.with_tree(|tree| {
            if tree.deny_metadata.contains(path) {
                return Err(denied(path));
            }
            tree.dirs
                .get(path)
                .map(|dir| dir.times)
                .ok_or_else(|| missing(path))
        })
    }

    fn read_security(&self, path: &Path) -> io::Result<SecurityDescriptor> {
        self.with_tree(|tree| {
            if tree.deny_security.contains(path) {
                return Err(denied(path));
            }
            tree.dirs
                .get(path)
                .map(|dir| dir.security.clone())
                .ok_or_else(|| missing(path))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_children_in_name_order() {
        let fs = MemoryFs::new();
        fs.add_dir("/r", SecurityDescriptor::default())
            .add_dir("/r/b", SecurityDescriptor::default())
            .add_dir("/r/a", SecurityDescriptor::default())
            .add_dir("/r/a/deep", SecurityDescriptor::default());

        let children = fs.list_child_directories(Path::new("/r")).unwrap();
        assert_eq!(children, vec![PathBuf::from("/r/a"), PathBuf::from("/r/b")]);
    }

    #[test]
    fn test_injected_failures() {
        let fs = MemoryFs::new();
        fs.add_dir("/r", SecurityDescriptor::default()).deny_security("/r");
        assert_eq!(
            fs.read_security(Path::new("/r")).unwrap_err().kind(),
            io::ErrorKind::PermissionDenied
        );
        assert!(fs.read_metadata(Path::new("/r")).is_ok());
        assert_eq!(
            fs.read_metadata(Path::new("/missing")).unwrap_err().kind(),
            io::ErrorKind::NotFound
        );
    }

    #[test]
    fn test_remove_dir_drops_subtree() {
        let fs = MemoryFs::new();
        fs.add_dir("/r", SecurityDescriptor::default())
            .add_dir("/r/a", SecurityDescriptor::default())
            .add_dir("/r/a/x", SecurityDescriptor::default())
            .add_dir("/r/ab", SecurityDescriptor::default());
        fs.remove_dir("/r/a");
        let children = fs.list_child_directories(Path::new("/r")).unwrap();
        assert_eq!(children, vec![PathBuf::from("/r/ab")]);
    }
}
