use crate::acl::{decode_ace_flags, AccessEntry, AccessRights, AccessType, SecurityDescriptor};
use std::ffi::OsStr;
use std::io;
use std::iter::once;
use std::mem;
use std::os::windows::ffi::OsStrExt;
use std::path::Path;
use std::ptr;
use std::slice;
use winapi::shared::minwindef::{DWORD, LPVOID};
use winapi::shared::sddl::ConvertSidToStringSidW;
use winapi::shared::winerror::ERROR_SUCCESS;
use winapi::um::accctrl::SE_FILE_OBJECT;
use winapi::um::aclapi::GetNamedSecurityInfoW;
use winapi::um::securitybaseapi::{GetAce, GetAclInformation, GetSecurityDescriptorControl};
use winapi::um::winbase::LocalFree;
use winapi::um::winnt::{
    AclSizeInformation, ACCESS_ALLOWED_ACE, ACCESS_ALLOWED_ACE_TYPE, ACCESS_DENIED_ACE_TYPE,
    ACE_HEADER, ACL_SIZE_INFORMATION, DACL_SECURITY_INFORMATION, OWNER_SECURITY_INFORMATION,
    PACL, PSECURITY_DESCRIPTOR, PSID, SECURITY_DESCRIPTOR_CONTROL, SE_DACL_PROTECTED,
};

/// Frees a buffer handed out by the security API.
struct LocalBuffer(LPVOID);

impl Drop for LocalBuffer {
    fn drop(&mut self) {
        if !self.0.is_null() {
            unsafe {
                LocalFree(self.0 as _);
            }
        }
    }
}

fn to_wide(path: &Path) -> Vec<u16> {
    OsStr::new(path).encode_wide().chain(once(0)).collect()
}

unsafe fn sid_to_string(sid: PSID) -> io::Result<String> {
    let mut raw: *mut u16 = ptr::null_mut();
    if ConvertSidToStringSidW(sid, &mut raw) == 0 {
        return Err(io::Error::last_os_error());
    }
    let buffer = LocalBuffer(raw as LPVOID);
    let mut len = 0;
    while *raw.add(len) != 0 {
        len += 1;
    }
    let value = String::from_utf16_lossy(slice::from_raw_parts(raw, len));
    drop(buffer);
    Ok(value)
}

unsafe fn read_entries(dacl: PACL) -> io::Result<Vec<AccessEntry>> {
    if dacl.is_null() {
        return Ok(Vec::new());
    }

    let mut info: ACL_SIZE_INFORMATION = mem::zeroed();
    if GetAclInformation(
        dacl,
        &mut info as *mut _ as LPVOID,
        mem::size_of::<ACL_SIZE_INFORMATION>() as DWORD,
        AclSizeInformation,
    ) == 0
    {
        return Err(io::Error::last_os_error());
    }

    let mut entries = Vec::with_capacity(info.AceCount as usize);
    for index in 0..info.AceCount {
        let mut ace: LPVOID = ptr::null_mut();
        if GetAce(dacl, index, &mut ace) == 0 {
            return Err(io::Error::last_os_error());
        }
        let header = &*(ace as *const ACE_HEADER);
        let access_type = match header.AceType {
            ACCESS_ALLOWED_ACE_TYPE => AccessType::Allow,
            ACCESS_DENIED_ACE_TYPE => AccessType::Deny,
            // object, callback and audit entries are not file-system entitlements
            _ => continue,
        };
        // allowed and denied entries share one layout
        let body = &*(ace as *const ACCESS_ALLOWED_ACE);
        let sid = &body.SidStart as *const DWORD as PSID;
        let (inheritance, propagation, is_inherited) = decode_ace_flags(header.AceFlags);

        entries.push(AccessEntry {
            principal_sid: sid_to_string(sid)?,
            rights: AccessRights::from_bits_retain(body.Mask),
            access_type,
            inheritance,
            propagation,
            is_inherited,
        });
    }
    Ok(entries)
}

pub fn read_security(path: &Path) -> io::Result<SecurityDescriptor> {
    let wide = to_wide(path);
    let mut owner: PSID = ptr::null_mut();
    let mut dacl: PACL = ptr::null_mut();
    let mut descriptor: PSECURITY_DESCRIPTOR = ptr::null_mut();

    unsafe {
        let status = GetNamedSecurityInfoW(
            wide.as_ptr(),
            SE_FILE_OBJECT,
            OWNER_SECURITY_INFORMATION | DACL_SECURITY_INFORMATION,
            &mut owner,
            ptr::null_mut(),
            &mut dacl,
            ptr::null_mut(),
            &mut descriptor,
        );
        if status != ERROR_SUCCESS {
            return Err(io::Error::from_raw_os_error(status as i32));
        }
        let _descriptor = LocalBuffer(descriptor);

        let mut control: SECURITY_DESCRIPTOR_CONTROL = 0;
        let mut revision: DWORD = 0;
        if GetSecurityDescriptorControl(descriptor, &mut control, &mut revision) == 0 {
            return Err(io::Error::last_os_error());
        }

        let owner_sid = if owner.is_null() {
            None
        } else {
            sid_to_string(owner).ok()
        };

        Ok(SecurityDescriptor {
            owner_sid,
            entries: read_entries(dacl)?,
            inheritance_disabled: control & SE_DACL_PROTECTED != 0,
        })
    }
}
