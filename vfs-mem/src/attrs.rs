//! Standard attribute providers and the composing `AttributeService`
//! (§4.2).

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use vfs_core::attr::{AttributeProvider, AttributeValue, InodeMeta, PermissionSet};
use vfs_core::error::{errors, VfsResult};
use vfs_core::flags::FileKind;

/// Deterministic name→integer interning for the `unix` view's `uid`/`gid`.
/// No shared table is kept (that would be a global); the same principal
/// name always hashes to the same id within a process, which is all the
/// `unix` view's read-only derivation needs.
fn intern_principal(name: &str) -> i64 {
    let mut hasher = DefaultHasher::new();
    name.hash(&mut hasher);
    (hasher.finish() & 0x7fff_ffff) as i64
}

fn attr_of(key: &str, view: &str) -> Option<String> {
    key.strip_prefix(view).and_then(|rest| rest.strip_prefix(':')).map(str::to_string)
}

fn owned_for_view<'a>(
    create_attrs: &'a [(String, AttributeValue)],
    view: &str,
) -> impl Iterator<Item = (String, &'a AttributeValue)> {
    create_attrs
        .iter()
        .filter_map(move |(k, v)| attr_of(k, view).map(|name| (name, v)))
}

pub struct BasicProvider;

impl AttributeProvider for BasicProvider {
    fn name(&self) -> &'static str {
        "basic"
    }

    fn fixed_attributes(&self) -> &'static [&'static str] {
        &[
            "size",
            "fileKey",
            "isDirectory",
            "isRegularFile",
            "isSymbolicLink",
            "isOther",
            "creationTime",
            "lastAccessTime",
            "lastModifiedTime",
        ]
    }

    fn set_initial(
        &self,
        inode: &dyn InodeMeta,
        create_attrs: &[(String, AttributeValue)],
    ) -> VfsResult<()> {
        for (name, value) in owned_for_view(create_attrs, "basic") {
            self.set(inode, &name, value.clone(), true)?;
        }
        Ok(())
    }

    fn get(&self, inode: &dyn InodeMeta, attribute: &str) -> VfsResult<AttributeValue> {
        Ok(match attribute {
            "size" => AttributeValue::Int(inode.size() as i64),
            "fileKey" => AttributeValue::Int(inode.file_key() as i64),
            "isDirectory" => AttributeValue::Bool(inode.kind() == FileKind::Directory),
            "isRegularFile" => AttributeValue::Bool(inode.kind() == FileKind::Regular),
            "isSymbolicLink" => AttributeValue::Bool(inode.kind() == FileKind::Symlink),
            "isOther" => AttributeValue::Bool(false),
            "creationTime" => AttributeValue::Timestamp(inode.creation_time()),
            "lastAccessTime" => AttributeValue::Timestamp(inode.last_access_time()),
            "lastModifiedTime" => AttributeValue::Timestamp(inode.last_modified_time()),
            other => return Err(errors::unsupported_operation(format!("basic:{other}"))),
        })
    }

    fn set(
        &self,
        inode: &dyn InodeMeta,
        attribute: &str,
        value: AttributeValue,
        _creation_time: bool,
    ) -> VfsResult<()> {
        match attribute {
            "creationTime" => inode.set_creation_time(value.as_timestamp()?),
            "lastAccessTime" => inode.set_last_access_time(value.as_timestamp()?),
            "lastModifiedTime" => inode.set_last_modified_time(value.as_timestamp()?),
            "size" | "fileKey" | "isDirectory" | "isRegularFile" | "isSymbolicLink" | "isOther" => {
                return Err(errors::invalid_argument(format!(
                    "basic:{attribute} is read-only"
                )))
            }
            other => return Err(errors::unsupported_operation(format!("basic:{other}"))),
        }
        Ok(())
    }
}

pub struct OwnerProvider {
    pub default_owner: String,
}

impl AttributeProvider for OwnerProvider {
    fn name(&self) -> &'static str {
        "owner"
    }

    fn fixed_attributes(&self) -> &'static [&'static str] {
        &["owner"]
    }

    fn set_initial(
        &self,
        inode: &dyn InodeMeta,
        create_attrs: &[(String, AttributeValue)],
    ) -> VfsResult<()> {
        let owner = owned_for_view(create_attrs, "owner")
            .find(|(name, _)| name == "owner")
            .map(|(_, v)| v.clone())
            .unwrap_or_else(|| AttributeValue::Principal(self.default_owner.clone()));
        owner.as_principal()?;
        inode.raw_set("owner:owner", owner);
        Ok(())
    }

    fn get(&self, inode: &dyn InodeMeta, attribute: &str) -> VfsResult<AttributeValue> {
        if attribute != "owner" {
            return Err(errors::unsupported_operation(format!("owner:{attribute}")));
        }
        Ok(inode
            .raw_get("owner:owner")
            .unwrap_or_else(|| AttributeValue::Principal(self.default_owner.clone())))
    }

    fn set(
        &self,
        inode: &dyn InodeMeta,
        attribute: &str,
        value: AttributeValue,
        _creation_time: bool,
    ) -> VfsResult<()> {
        if attribute != "owner" {
            return Err(errors::unsupported_operation(format!("owner:{attribute}")));
        }
        value.as_principal()?;
        inode.raw_set("owner:owner", value);
        Ok(())
    }
}

pub struct PosixProvider {
    pub default_group: String,
}

impl AttributeProvider for PosixProvider {
    fn name(&self) -> &'static str {
        "posix"
    }

    fn fixed_attributes(&self) -> &'static [&'static str] {
        &["group", "permissions"]
    }

    fn inherits(&self) -> &'static [&'static str] {
        &["basic", "owner"]
    }

    fn set_initial(
        &self,
        inode: &dyn InodeMeta,
        create_attrs: &[(String, AttributeValue)],
    ) -> VfsResult<()> {
        let group = owned_for_view(create_attrs, "posix")
            .find(|(name, _)| name == "group")
            .map(|(_, v)| v.clone())
            .unwrap_or_else(|| AttributeValue::Principal(self.default_group.clone()));
        group.as_principal()?;
        inode.raw_set("posix:group", group);

        let default_perms = match inode.kind() {
            FileKind::Directory => PermissionSet::default_directory(),
            _ => PermissionSet::default_file(),
        };
        let perms = owned_for_view(create_attrs, "posix")
            .find(|(name, _)| name == "permissions")
            .map(|(_, v)| v.clone())
            .unwrap_or(AttributeValue::Permissions(default_perms));
        perms.as_permissions()?;
        inode.raw_set("posix:permissions", perms);
        Ok(())
    }

    fn get(&self, inode: &dyn InodeMeta, attribute: &str) -> VfsResult<AttributeValue> {
        match attribute {
            "group" => Ok(inode
                .raw_get("posix:group")
                .unwrap_or_else(|| AttributeValue::Principal(self.default_group.clone()))),
            "permissions" => Ok(inode.raw_get("posix:permissions").unwrap_or_else(|| {
                AttributeValue::Permissions(match inode.kind() {
                    FileKind::Directory => PermissionSet::default_directory(),
                    _ => PermissionSet::default_file(),
                })
            })),
            other => Err(errors::unsupported_operation(format!("posix:{other}"))),
        }
    }

    fn set(
        &self,
        inode: &dyn InodeMeta,
        attribute: &str,
        value: AttributeValue,
        _creation_time: bool,
    ) -> VfsResult<()> {
        match attribute {
            "group" => {
                value.as_principal()?;
                inode.raw_set("posix:group", value);
            }
            "permissions" => {
                value.as_permissions()?;
                inode.raw_set("posix:permissions", value);
            }
            other => return Err(errors::unsupported_operation(format!("posix:{other}"))),
        }
        Ok(())
    }
}

/// Derived, read-only view: every attribute is computed from `basic`,
/// `owner` and `posix`'s stored values rather than having storage of its
/// own.
pub struct UnixProvider;

impl AttributeProvider for UnixProvider {
    fn name(&self) -> &'static str {
        "unix"
    }

    fn fixed_attributes(&self) -> &'static [&'static str] {
        &["uid", "gid", "mode", "nlink", "ino", "dev", "rdev", "ctime"]
    }

    fn inherits(&self) -> &'static [&'static str] {
        &["basic", "owner", "posix"]
    }

    fn set_initial(&self, _inode: &dyn InodeMeta, _create_attrs: &[(String, AttributeValue)]) -> VfsResult<()> {
        Ok(())
    }

    fn get(&self, inode: &dyn InodeMeta, attribute: &str) -> VfsResult<AttributeValue> {
        Ok(match attribute {
            "uid" => {
                let owner = inode.raw_get("owner:owner");
                let name = match &owner {
                    Some(AttributeValue::Principal(p)) => p.as_str(),
                    _ => "unknown",
                };
                AttributeValue::Int(intern_principal(name))
            }
            "gid" => {
                let group = inode.raw_get("posix:group");
                let name = match &group {
                    Some(AttributeValue::Principal(p)) => p.as_str(),
                    _ => "unknown",
                };
                AttributeValue::Int(intern_principal(name))
            }
            "mode" => {
                let perms = match inode.raw_get("posix:permissions") {
                    Some(AttributeValue::Permissions(p)) => p,
                    _ => match inode.kind() {
                        FileKind::Directory => PermissionSet::default_directory(),
                        _ => PermissionSet::default_file(),
                    },
                };
                let type_bits: u32 = match inode.kind() {
                    FileKind::Directory => 0o040000,
                    FileKind::Regular => 0o100000,
                    FileKind::Symlink => 0o120000,
                };
                AttributeValue::Int((type_bits | perms.bits()) as i64)
            }
            "nlink" => AttributeValue::Int(inode.links() as i64),
            "ino" => AttributeValue::Int(inode.file_key() as i64),
            "dev" => AttributeValue::Int(1),
            "rdev" => AttributeValue::Int(0),
            "ctime" => AttributeValue::Timestamp(inode.creation_time()),
            other => return Err(errors::unsupported_operation(format!("unix:{other}"))),
        })
    }

    fn set(
        &self,
        _inode: &dyn InodeMeta,
        attribute: &str,
        _value: AttributeValue,
        _creation_time: bool,
    ) -> VfsResult<()> {
        Err(errors::invalid_argument(format!(
            "unix:{attribute} is a derived, read-only view"
        )))
    }
}

pub struct DosProvider;

const DOS_ATTRS: &[&str] = &["readonly", "hidden", "archive", "system"];

impl AttributeProvider for DosProvider {
    fn name(&self) -> &'static str {
        "dos"
    }

    fn fixed_attributes(&self) -> &'static [&'static str] {
        DOS_ATTRS
    }

    fn inherits(&self) -> &'static [&'static str] {
        &["basic", "owner"]
    }

    fn set_initial(
        &self,
        inode: &dyn InodeMeta,
        create_attrs: &[(String, AttributeValue)],
    ) -> VfsResult<()> {
        for attr in DOS_ATTRS {
            let value = owned_for_view(create_attrs, "dos")
                .find(|(name, _)| name == attr)
                .map(|(_, v)| v.clone())
                .unwrap_or(AttributeValue::Bool(false));
            value.as_bool()?;
            inode.raw_set(&format!("dos:{attr}"), value);
        }
        Ok(())
    }

    fn get(&self, inode: &dyn InodeMeta, attribute: &str) -> VfsResult<AttributeValue> {
        if !DOS_ATTRS.contains(&attribute) {
            return Err(errors::unsupported_operation(format!("dos:{attribute}")));
        }
        Ok(inode
            .raw_get(&format!("dos:{attribute}"))
            .unwrap_or(AttributeValue::Bool(false)))
    }

    fn set(
        &self,
        inode: &dyn InodeMeta,
        attribute: &str,
        value: AttributeValue,
        _creation_time: bool,
    ) -> VfsResult<()> {
        if !DOS_ATTRS.contains(&attribute) {
            return Err(errors::unsupported_operation(format!("dos:{attribute}")));
        }
        value.as_bool()?;
        inode.raw_set(&format!("dos:{attribute}"), value);
        Ok(())
    }
}

pub struct AclProvider;

impl AttributeProvider for AclProvider {
    fn name(&self) -> &'static str {
        "acl"
    }

    fn fixed_attributes(&self) -> &'static [&'static str] {
        &["acl"]
    }

    fn inherits(&self) -> &'static [&'static str] {
        &["owner"]
    }

    fn set_initial(
        &self,
        inode: &dyn InodeMeta,
        create_attrs: &[(String, AttributeValue)],
    ) -> VfsResult<()> {
        let acl = owned_for_view(create_attrs, "acl")
            .find(|(name, _)| name == "acl")
            .map(|(_, v)| v.clone())
            .unwrap_or(AttributeValue::AclEntries(Vec::new()));
        acl.as_acl_entries()?;
        inode.raw_set("acl:acl", acl);
        Ok(())
    }

    fn get(&self, inode: &dyn InodeMeta, attribute: &str) -> VfsResult<AttributeValue> {
        if attribute != "acl" {
            return Err(errors::unsupported_operation(format!("acl:{attribute}")));
        }
        Ok(inode
            .raw_get("acl:acl")
            .unwrap_or(AttributeValue::AclEntries(Vec::new())))
    }

    fn set(
        &self,
        inode: &dyn InodeMeta,
        attribute: &str,
        value: AttributeValue,
        _creation_time: bool,
    ) -> VfsResult<()> {
        if attribute != "acl" {
            return Err(errors::unsupported_operation(format!("acl:{attribute}")));
        }
        value.as_acl_entries()?;
        inode.raw_set("acl:acl", value);
        Ok(())
    }
}

/// Arbitrary user-defined attributes, stored as opaque byte arrays under
/// whatever name the caller chooses; unlike the other views this one has
/// no fixed attribute set.
pub struct UserProvider;

impl AttributeProvider for UserProvider {
    fn name(&self) -> &'static str {
        "user"
    }

    fn fixed_attributes(&self) -> &'static [&'static str] {
        &[]
    }

    fn set_initial(
        &self,
        inode: &dyn InodeMeta,
        create_attrs: &[(String, AttributeValue)],
    ) -> VfsResult<()> {
        for (name, value) in owned_for_view(create_attrs, "user") {
            value.as_bytes()?;
            inode.raw_set(&format!("user:{name}"), value.clone());
        }
        Ok(())
    }

    fn get(&self, inode: &dyn InodeMeta, attribute: &str) -> VfsResult<AttributeValue> {
        inode
            .raw_get(&format!("user:{attribute}"))
            .ok_or_else(|| errors::not_found(format!("user:{attribute}")))
    }

    fn set(
        &self,
        inode: &dyn InodeMeta,
        attribute: &str,
        value: AttributeValue,
        _creation_time: bool,
    ) -> VfsResult<()> {
        value.as_bytes()?;
        inode.raw_set(&format!("user:{attribute}"), value);
        Ok(())
    }
}

/// Composes a registered provider set and dispatches `"view:name"`-keyed
/// requests to the right one.
pub struct AttributeService {
    providers: HashMap<&'static str, Box<dyn AttributeProvider>>,
}

impl AttributeService {
    pub fn new(providers: Vec<Box<dyn AttributeProvider>>) -> Self {
        let mut map = HashMap::new();
        for provider in providers {
            map.insert(provider.name(), provider);
        }
        Self { providers: map }
    }

    fn split(key: &str) -> VfsResult<(&str, &str)> {
        key.split_once(':')
            .ok_or_else(|| errors::invalid_argument(format!("attribute key must be 'view:name': {key}")))
    }

    fn provider(&self, view: &str) -> VfsResult<&dyn AttributeProvider> {
        self.providers
            .get(view)
            .map(|p| p.as_ref())
            .ok_or_else(|| errors::unsupported_operation(format!("unknown attribute view {view}")))
    }

    pub fn has_view(&self, view: &str) -> bool {
        self.providers.contains_key(view)
    }

    pub fn supported_views(&self) -> Vec<&'static str> {
        self.providers.keys().copied().collect()
    }

    pub fn get_attribute(&self, inode: &dyn InodeMeta, key: &str) -> VfsResult<AttributeValue> {
        let (view, name) = Self::split(key)?;
        self.provider(view)?.get(inode, name)
    }

    pub fn set_attribute(
        &self,
        inode: &dyn InodeMeta,
        key: &str,
        value: AttributeValue,
        create: bool,
    ) -> VfsResult<()> {
        let (view, name) = Self::split(key)?;
        self.provider(view)?.set(inode, name, value, create)
    }

    pub fn delete_attribute(&self, inode: &dyn InodeMeta, key: &str) -> VfsResult<()> {
        let (view, _name) = Self::split(key)?;
        if view != "user" {
            return Err(errors::unsupported_operation(
                "only user: attributes may be deleted",
            ));
        }
        inode.raw_delete(key);
        Ok(())
    }

    /// `names: None` means "all fixed attributes of `view`" (the `*`
    /// wildcard selector of §6's `read_attributes`).
    pub fn read_attributes(
        &self,
        inode: &dyn InodeMeta,
        view: &str,
        names: Option<&[&str]>,
    ) -> VfsResult<HashMap<String, AttributeValue>> {
        let provider = self.provider(view)?;
        let attrs: Vec<String> = match names {
            Some(n) => n.iter().map(|s| s.to_string()).collect(),
            None => provider.fixed_attributes().iter().map(|s| s.to_string()).collect(),
        };
        let mut out = HashMap::new();
        for attr in attrs {
            out.insert(attr.clone(), provider.get(inode, &attr)?);
        }
        Ok(out)
    }

    /// Applies every registered provider's default stamping, then any
    /// matching user-supplied creation attributes, for a freshly created
    /// inode (§4.5 Create).
    pub fn set_initial_attributes(
        &self,
        inode: &dyn InodeMeta,
        create_attrs: &[(String, AttributeValue)],
    ) -> VfsResult<()> {
        for (key, _) in create_attrs {
            let (view, _) = Self::split(key)?;
            if !self.has_view(view) {
                return Err(errors::unsupported_operation(format!(
                    "unknown attribute view {view}"
                )));
            }
        }
        for provider in self.providers.values() {
            provider.set_initial(inode, create_attrs)?;
        }
        Ok(())
    }
}

/// The default provider set: `basic` is always included; the rest follow
/// `MemFsConfig::attribute_views`, with `posix` requiring `owner`'s storage
/// and `unix` requiring `posix`'s (§6).
pub fn standard_providers(views: &[&str], default_owner: &str, default_group: &str) -> Vec<Box<dyn AttributeProvider>> {
    let mut providers: Vec<Box<dyn AttributeProvider>> = vec![Box::new(BasicProvider)];
    let want = |name: &str| views.contains(&name);
    let needs_owner = want("owner") || want("posix") || want("unix") || want("dos") || want("acl");
    if needs_owner {
        providers.push(Box::new(OwnerProvider {
            default_owner: default_owner.to_string(),
        }));
    }
    let needs_posix = want("posix") || want("unix");
    if needs_posix {
        providers.push(Box::new(PosixProvider {
            default_group: default_group.to_string(),
        }));
    }
    if want("unix") {
        providers.push(Box::new(UnixProvider));
    }
    if want("dos") {
        providers.push(Box::new(DosProvider));
    }
    if want("acl") {
        providers.push(Box::new(AclProvider));
    }
    if want("user") {
        providers.push(Box::new(UserProvider));
    }
    providers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytes::ByteStore;
    use crate::inode::{now_millis, Content, Inode};

    fn file_inode() -> Inode {
        Inode::new(7, Content::Regular(ByteStore::new(16)), now_millis())
    }

    #[test]
    fn basic_provider_reports_kind_and_rejects_readonly_write() {
        let inode = file_inode();
        let provider = BasicProvider;
        assert_eq!(provider.get(&inode, "isRegularFile").unwrap(), AttributeValue::Bool(true));
        assert!(provider.set(&inode, "size", AttributeValue::Int(1), false).is_err());
    }

    #[test]
    fn unix_view_derives_mode_from_posix_permissions() {
        let inode = file_inode();
        let posix = PosixProvider { default_group: "users".into() };
        posix.set_initial(&inode, &[]).unwrap();
        let unix = UnixProvider;
        let mode = unix.get(&inode, "mode").unwrap().as_int().unwrap();
        assert_eq!(mode & 0o777, 0o644);
        assert_eq!(mode & 0o170000, 0o100000);
        assert!(unix.set(&inode, "mode", AttributeValue::Int(0), false).is_err());
    }

    #[test]
    fn user_provider_is_pure_key_value() {
        let inode = file_inode();
        let provider = UserProvider;
        assert!(provider.get(&inode, "tag").is_err());
        provider
            .set(&inode, "tag", AttributeValue::Bytes(b"v1".to_vec()), false)
            .unwrap();
        assert_eq!(
            provider.get(&inode, "tag").unwrap(),
            AttributeValue::Bytes(b"v1".to_vec())
        );
    }

    #[test]
    fn attribute_service_rejects_unknown_view() {
        let inode = file_inode();
        let service = AttributeService::new(standard_providers(&["owner"], "root", "root"));
        let err = service.get_attribute(&inode, "posix:group").unwrap_err();
        assert_eq!(err.kind(), vfs_core::VfsErrorKind::UnsupportedOperation);
    }
}
