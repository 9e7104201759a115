//! The attribute-provider contract (§4.2).
//!
//! The CORE never hands out `&Inode` directly to a provider — `vfs-mem`'s
//! `Inode` implements `InodeMeta` and providers are written against that
//! narrower interface, so the provider set can be unit-tested without an
//! arena or a tree lock.

use bitflags::bitflags;

use crate::error::VfsResult;

/// A tagged union of every value shape an attribute can hold, replacing the
/// distilled spec's reflective "class token" maps (§9).
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Bool(bool),
    Int(i64),
    Timestamp(i64),
    Principal(String),
    Permissions(PermissionSet),
    Bytes(Vec<u8>),
    AclEntries(Vec<AclEntry>),
}

impl AttributeValue {
    pub fn as_bool(&self) -> VfsResult<bool> {
        match self {
            Self::Bool(b) => Ok(*b),
            _ => Err(crate::error::errors::invalid_argument(
                "expected a boolean attribute value",
            )),
        }
    }

    pub fn as_int(&self) -> VfsResult<i64> {
        match self {
            Self::Int(v) => Ok(*v),
            _ => Err(crate::error::errors::invalid_argument(
                "expected an integer attribute value",
            )),
        }
    }

    pub fn as_timestamp(&self) -> VfsResult<i64> {
        match self {
            Self::Timestamp(v) => Ok(*v),
            _ => Err(crate::error::errors::invalid_argument(
                "expected a timestamp attribute value",
            )),
        }
    }

    pub fn as_principal(&self) -> VfsResult<&str> {
        match self {
            Self::Principal(v) => Ok(v.as_str()),
            _ => Err(crate::error::errors::invalid_argument(
                "expected a principal attribute value",
            )),
        }
    }

    pub fn as_permissions(&self) -> VfsResult<PermissionSet> {
        match self {
            Self::Permissions(v) => Ok(*v),
            _ => Err(crate::error::errors::invalid_argument(
                "expected a permission-set attribute value",
            )),
        }
    }

    pub fn as_bytes(&self) -> VfsResult<&[u8]> {
        match self {
            Self::Bytes(v) => Ok(v.as_slice()),
            _ => Err(crate::error::errors::invalid_argument(
                "expected a byte-blob attribute value",
            )),
        }
    }

    pub fn as_acl_entries(&self) -> VfsResult<&[AclEntry]> {
        match self {
            Self::AclEntries(v) => Ok(v.as_slice()),
            _ => Err(crate::error::errors::invalid_argument(
                "expected an ACL-entry-list attribute value",
            )),
        }
    }
}

bitflags! {
    /// POSIX rwx permission bits, laid out so `.bits()` matches the standard
    /// `0oXYZ` octal mode encoding used by the `unix` provider.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PermissionSet: u32 {
        const OWNER_READ    = 0o400;
        const OWNER_WRITE   = 0o200;
        const OWNER_EXECUTE = 0o100;
        const GROUP_READ    = 0o040;
        const GROUP_WRITE   = 0o020;
        const GROUP_EXECUTE = 0o010;
        const OTHERS_READ   = 0o004;
        const OTHERS_WRITE  = 0o002;
        const OTHERS_EXECUTE = 0o001;
    }
}

impl PermissionSet {
    /// The usual default for a freshly created regular file (`0o644`).
    pub fn default_file() -> Self {
        Self::OWNER_READ | Self::OWNER_WRITE | Self::GROUP_READ | Self::OTHERS_READ
    }

    /// The usual default for a freshly created directory (`0o755`).
    pub fn default_directory() -> Self {
        Self::default_file() | Self::OWNER_EXECUTE | Self::GROUP_EXECUTE | Self::OTHERS_EXECUTE
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AclEntryType {
    Allow,
    Deny,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AclEntry {
    pub entry_type: AclEntryType,
    pub flags: u32,
    pub permissions: PermissionSet,
    pub principal: String,
}

/// The minimal metadata surface a provider needs; implemented by
/// `vfs_mem::inode::Inode`.
pub trait InodeMeta {
    fn file_key(&self) -> u64;
    fn kind(&self) -> crate::flags::FileKind;
    fn size(&self) -> u64;
    fn links(&self) -> u64;
    fn creation_time(&self) -> i64;
    fn last_access_time(&self) -> i64;
    fn last_modified_time(&self) -> i64;
    fn set_creation_time(&self, millis: i64);
    fn set_last_access_time(&self, millis: i64);
    fn set_last_modified_time(&self, millis: i64);

    fn raw_get(&self, key: &str) -> Option<AttributeValue>;
    fn raw_set(&self, key: &str, value: AttributeValue);
    fn raw_delete(&self, key: &str);
    fn raw_keys(&self) -> Vec<String>;
}

/// One view (`basic`, `owner`, `posix`, `unix`, `dos`, `acl`, `user`) over an
/// inode's attribute map. `inherits()` lets a provider answer reads for
/// attributes owned by another view (e.g. `unix` inherits `posix`'s
/// permission set to derive `mode`) without inheriting its write behavior.
pub trait AttributeProvider: Send + Sync {
    fn name(&self) -> &'static str;

    fn fixed_attributes(&self) -> &'static [&'static str];

    fn inherits(&self) -> &'static [&'static str] {
        &[]
    }

    /// Stamps default values on a freshly created inode, then applies any
    /// user-supplied creation-time attributes belonging to this view.
    fn set_initial(
        &self,
        inode: &dyn InodeMeta,
        create_attrs: &[(String, AttributeValue)],
    ) -> VfsResult<()>;

    fn get(&self, inode: &dyn InodeMeta, attribute: &str) -> VfsResult<AttributeValue>;

    fn set(
        &self,
        inode: &dyn InodeMeta,
        attribute: &str,
        value: AttributeValue,
        creation_time: bool,
    ) -> VfsResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_file_mode_is_0o644() {
        assert_eq!(PermissionSet::default_file().bits(), 0o644);
    }

    #[test]
    fn default_directory_mode_is_0o755() {
        assert_eq!(PermissionSet::default_directory().bits(), 0o755);
    }

    #[test]
    fn value_accessors_reject_wrong_variant() {
        let v = AttributeValue::Bool(true);
        assert!(v.as_int().is_err());
        assert!(v.as_bool().is_ok());
    }
}
