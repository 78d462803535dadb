//! POSIX projection of ownership and mode bits onto the NTFS model.
//!
//! Owners and groups use the `S-1-22-1-<uid>` / `S-1-22-2-<gid>` identifier
//! form Samba exposes for unmapped Unix accounts, so shares exported from a
//! Unix host resolve the same way whether they are walked locally or over
//! SMB. Each permission class becomes one explicit entry.

use crate::acl::{AccessEntry, AccessRights, AccessType, SecurityDescriptor};
use std::fs;
use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::Path;

pub const EVERYONE_SID: &str = "S-1-1-0";

pub fn unix_user_sid(uid: u32) -> String {
    format!("S-1-22-1-{}", uid)
}

pub fn unix_group_sid(gid: u32) -> String {
    format!("S-1-22-2-{}", gid)
}

/// Maps one `rwx` triple.
pub fn rights_from_mode_bits(bits: u32) -> AccessRights {
    let mut rights = AccessRights::empty();
    if bits & 0o4 != 0 {
        rights |= AccessRights::READ;
    }
    if bits & 0o2 != 0 {
        rights |= AccessRights::WRITE | AccessRights::DELETE_SUBDIRECTORIES_AND_FILES;
    }
    if bits & 0o1 != 0 {
        rights |= AccessRights::EXECUTE_FILE;
    }
    rights
}

pub fn read_security(path: &Path) -> io::Result<SecurityDescriptor> {
    let metadata = fs::metadata(path)?;
    let mode = metadata.mode();

    let classes = [
        (unix_user_sid(metadata.uid()), (mode >> 6) & 0o7),
        (unix_group_sid(metadata.gid()), (mode >> 3) & 0o7),
        (EVERYONE_SID.to_string(), mode & 0o7),
    ];

    let entries = classes
        .iter()
        .filter(|(_, bits)| *bits != 0)
        .map(|(sid, bits)| AccessEntry::explicit(sid, rights_from_mode_bits(*bits), AccessType::Allow))
        .collect();

    Ok(SecurityDescriptor {
        owner_sid: Some(unix_user_sid(metadata.uid())),
        entries,
        inheritance_disabled: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    #[test]
    fn test_mode_bits_projection() {
        assert_eq!(rights_from_mode_bits(0o5), AccessRights::READ_AND_EXECUTE);
        assert_eq!(rights_from_mode_bits(0), AccessRights::empty());
        assert!(rights_from_mode_bits(0o7).contains(AccessRights::WRITE));
    }

    #[test]
    fn test_reads_owner_and_entries() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("shared");
        fs::create_dir(&target).unwrap();
        fs::set_permissions(&target, fs::Permissions::from_mode(0o750)).unwrap();

        let descriptor = read_security(&target).unwrap();
        let uid = fs::metadata(&target).unwrap().uid();
        assert_eq!(descriptor.owner_sid, Some(unix_user_sid(uid)));
        // no entry for the "other" class
        assert_eq!(descriptor.entries.len(), 2);
        assert!(descriptor.entries.iter().all(|e| !e.is_inherited));
        assert_eq!(descriptor.entries[1].rights, AccessRights::READ_AND_EXECUTE);
    }
}
