//! Access-control values as read from a directory's security descriptor.
//!
//! Flag values follow the NTFS access mask and ACE header layout so the
//! Windows capability can hand raw masks over unchanged; the Unix and
//! in-memory capabilities build the same values from their own sources.

use bitflags::bitflags;
use std::fmt;

bitflags! {
    /// NTFS file-system rights carried by one access-control entry.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AccessRights: u32 {
        const READ_DATA = 0x0000_0001;
        const WRITE_DATA = 0x0000_0002;
        const APPEND_DATA = 0x0000_0004;
        const READ_EXTENDED_ATTRIBUTES = 0x0000_0008;
        const WRITE_EXTENDED_ATTRIBUTES = 0x0000_0010;
        const EXECUTE_FILE = 0x0000_0020;
        const DELETE_SUBDIRECTORIES_AND_FILES = 0x0000_0040;
        const READ_ATTRIBUTES = 0x0000_0080;
        const WRITE_ATTRIBUTES = 0x0000_0100;
        const DELETE = 0x0001_0000;
        const READ_PERMISSIONS = 0x0002_0000;
        const CHANGE_PERMISSIONS = 0x0004_0000;
        const TAKE_OWNERSHIP = 0x0008_0000;
        const SYNCHRONIZE = 0x0010_0000;
        const GENERIC_ALL = 0x1000_0000;
        const GENERIC_EXECUTE = 0x2000_0000;
        const GENERIC_WRITE = 0x4000_0000;
        const GENERIC_READ = 0x8000_0000;

        const READ = Self::READ_DATA.bits()
            | Self::READ_EXTENDED_ATTRIBUTES.bits()
            | Self::READ_ATTRIBUTES.bits()
            | Self::READ_PERMISSIONS.bits();
        const WRITE = Self::WRITE_DATA.bits()
            | Self::APPEND_DATA.bits()
            | Self::WRITE_EXTENDED_ATTRIBUTES.bits()
            | Self::WRITE_ATTRIBUTES.bits();
        const READ_AND_EXECUTE = Self::READ.bits() | Self::EXECUTE_FILE.bits();
        const MODIFY = Self::READ_AND_EXECUTE.bits() | Self::WRITE.bits() | Self::DELETE.bits();
        const FULL_CONTROL = 0x001F_01FF;
    }
}

// Composite names are taken greedily, widest first.
const RIGHTS_NAMES: &[(&str, AccessRights)] = &[
    ("FullControl", AccessRights::FULL_CONTROL),
    ("Modify", AccessRights::MODIFY),
    ("ReadAndExecute", AccessRights::READ_AND_EXECUTE),
    ("Read", AccessRights::READ),
    ("Write", AccessRights::WRITE),
    ("ReadData", AccessRights::READ_DATA),
    ("WriteData", AccessRights::WRITE_DATA),
    ("AppendData", AccessRights::APPEND_DATA),
    ("ReadExtendedAttributes", AccessRights::READ_EXTENDED_ATTRIBUTES),
    ("WriteExtendedAttributes", AccessRights::WRITE_EXTENDED_ATTRIBUTES),
    ("ExecuteFile", AccessRights::EXECUTE_FILE),
    ("DeleteSubdirectoriesAndFiles", AccessRights::DELETE_SUBDIRECTORIES_AND_FILES),
    ("ReadAttributes", AccessRights::READ_ATTRIBUTES),
    ("WriteAttributes", AccessRights::WRITE_ATTRIBUTES),
    ("Delete", AccessRights::DELETE),
    ("ReadPermissions", AccessRights::READ_PERMISSIONS),
    ("ChangePermissions", AccessRights::CHANGE_PERMISSIONS),
    ("TakeOwnership", AccessRights::TAKE_OWNERSHIP),
    ("Synchronize", AccessRights::SYNCHRONIZE),
    ("GenericAll", AccessRights::GENERIC_ALL),
    ("GenericExecute", AccessRights::GENERIC_EXECUTE),
    ("GenericWrite", AccessRights::GENERIC_WRITE),
    ("GenericRead", AccessRights::GENERIC_READ),
];

impl fmt::Display for AccessRights {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("None");
        }
        let mut remaining = self.bits();
        let mut names: Vec<String> = Vec::new();
        for (name, mask) in RIGHTS_NAMES {
            if remaining & mask.bits() == mask.bits() {
                names.push((*name).to_string());
                remaining &= !mask.bits();
            }
        }
        if remaining != 0 {
            names.push(format!("0x{:08X}", remaining));
        }
        f.write_str(&names.join(", "))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessType {
    Allow,
    Deny,
}

impl fmt::Display for AccessType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessType::Allow => f.write_str("Allow"),
            AccessType::Deny => f.write_str("Deny"),
        }
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct InheritanceFlags: u8 {
        const CONTAINER_INHERIT = 0x01;
        const OBJECT_INHERIT = 0x02;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PropagationFlags: u8 {
        const NO_PROPAGATE_INHERIT = 0x01;
        const INHERIT_ONLY = 0x02;
    }
}

fn write_flag_names(f: &mut fmt::Formatter<'_>, names: &[&str]) -> fmt::Result {
    if names.is_empty() {
        f.write_str("None")
    } else {
        f.write_str(&names.join(", "))
    }
}

impl fmt::Display for InheritanceFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = Vec::new();
        if self.contains(InheritanceFlags::CONTAINER_INHERIT) {
            names.push("ContainerInherit");
        }
        if self.contains(InheritanceFlags::OBJECT_INHERIT) {
            names.push("ObjectInherit");
        }
        write_flag_names(f, &names)
    }
}

impl fmt::Display for PropagationFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = Vec::new();
        if self.contains(PropagationFlags::NO_PROPAGATE_INHERIT) {
            names.push("NoPropagateInherit");
        }
        if self.contains(PropagationFlags::INHERIT_ONLY) {
            names.push("InheritOnly");
        }
        write_flag_names(f, &names)
    }
}

// ACE header flag bits (winnt.h)
const OBJECT_INHERIT_ACE: u8 = 0x01;
const CONTAINER_INHERIT_ACE: u8 = 0x02;
const NO_PROPAGATE_INHERIT_ACE: u8 = 0x04;
const INHERIT_ONLY_ACE: u8 = 0x08;
const INHERITED_ACE: u8 = 0x10;

/// Splits raw ACE header flags into (inheritance, propagation, inherited).
pub fn decode_ace_flags(flags: u8) -> (InheritanceFlags, PropagationFlags, bool) {
    let mut inheritance = InheritanceFlags::empty();
    if flags & CONTAINER_INHERIT_ACE != 0 {
        inheritance |= InheritanceFlags::CONTAINER_INHERIT;
    }
    if flags & OBJECT_INHERIT_ACE != 0 {
        inheritance |= InheritanceFlags::OBJECT_INHERIT;
    }

    let mut propagation = PropagationFlags::empty();
    if flags & NO_PROPAGATE_INHERIT_ACE != 0 {
        propagation |= PropagationFlags::NO_PROPAGATE_INHERIT;
    }
    if flags & INHERIT_ONLY_ACE != 0 {
        propagation |= PropagationFlags::INHERIT_ONLY;
    }

    (inheritance, propagation, flags & INHERITED_ACE != 0)
}

/// One access-control entry of a directory's DACL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessEntry {
    pub principal_sid: String,
    pub rights: AccessRights,
    pub access_type: AccessType,
    pub inheritance: InheritanceFlags,
    pub propagation: PropagationFlags,
    /// Set when the entry was propagated from an ancestor directory.
    pub is_inherited: bool,
}

impl AccessEntry {
    pub fn explicit(principal_sid: &str, rights: AccessRights, access_type: AccessType) -> Self {
        Self {
            principal_sid: principal_sid.to_string(),
            rights,
            access_type,
            inheritance: InheritanceFlags::empty(),
            propagation: PropagationFlags::empty(),
            is_inherited: false,
        }
    }

    pub fn inherited(mut self) -> Self {
        self.is_inherited = true;
        self
    }
}

/// Owner and DACL of a directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecurityDescriptor {
    /// `None` when the owner could not be read; the ACL may still be usable.
    pub owner_sid: Option<String>,
    pub entries: Vec<AccessEntry>,
    /// True when inheritance from the parent is disabled (protected DACL).
    pub inheritance_disabled: bool,
}

impl SecurityDescriptor {
    /// Entries set directly on this directory.
    pub fn explicit_entries(&self) -> impl Iterator<Item = &AccessEntry> {
        self.entries.iter().filter(|entry| !entry.is_inherited)
    }
}
