//! Directory content: a `VfsName → InodeId` table plus `.`/`..` sentinels
//! (§4.3).

use std::collections::HashMap;

use vfs_core::error::{errors, VfsResult};
use vfs_core::path::VfsName;

use crate::inode::InodeId;

/// The content of a directory inode. `.` and `..` are not stored in
/// `children`/`order` — they are derived from `self_id`/`parent_id` so that
/// reading `entries()` never has to filter them out.
pub struct DirectoryTable {
    self_id: InodeId,
    parent_id: InodeId,
    order: Vec<VfsName>,
    children: HashMap<VfsName, InodeId>,
}

impl DirectoryTable {
    pub fn new(self_id: InodeId, parent_id: InodeId) -> Self {
        Self {
            self_id,
            parent_id,
            order: Vec::new(),
            children: HashMap::new(),
        }
    }

    pub fn self_id(&self) -> InodeId {
        self.self_id
    }

    pub fn parent_id(&self) -> InodeId {
        self.parent_id
    }

    /// Rewritten atomically (under the tree write lock, by the caller) when
    /// this directory is moved or re-parented.
    pub fn set_parent(&mut self, parent_id: InodeId) {
        self.parent_id = parent_id;
    }

    pub fn get(&self, name: &VfsName) -> Option<InodeId> {
        if name.is_current() {
            return Some(self.self_id);
        }
        if name.is_parent() {
            return Some(self.parent_id);
        }
        self.children.get(name).copied()
    }

    /// Returns the `VfsName` as it was originally linked (preserving its
    /// display spelling), looked up by canonical equality.
    pub fn stored_name(&self, name: &VfsName) -> Option<VfsName> {
        self.children.get_key_value(name).map(|(k, _)| k.clone())
    }

    /// Reverse lookup: the name under which `child` is linked, if any.
    /// Linear in entry count; used only by `to_real_path`, never on a hot
    /// path.
    pub fn name_of(&self, child: InodeId) -> Option<VfsName> {
        self.children
            .iter()
            .find(|(_, id)| **id == child)
            .map(|(name, _)| name.clone())
    }

    pub fn link(&mut self, name: VfsName, inode: InodeId) -> VfsResult<()> {
        if name.is_current() || name.is_parent() {
            return Err(errors::invalid_argument("cannot link . or .. directly"));
        }
        if self.children.contains_key(&name) {
            return Err(errors::already_exists(name.display().to_string()));
        }
        self.order.push(name.clone());
        self.children.insert(name, inode);
        Ok(())
    }

    pub fn unlink(&mut self, name: &VfsName) -> VfsResult<InodeId> {
        if name.is_current() || name.is_parent() {
            return Err(errors::invalid_argument("cannot unlink . or .. directly"));
        }
        let inode = self
            .children
            .remove(name)
            .ok_or_else(|| errors::not_found(name.display().to_string()))?;
        self.order.retain(|n| n != name);
        Ok(inode)
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    /// An insertion-order snapshot of user-visible entries, excluding `.`
    /// and `..`.
    pub fn entries(&self) -> Vec<(VfsName, InodeId)> {
        self.order
            .iter()
            .map(|name| {
                let id = *self.children.get(name).expect("order and children agree");
                (name.clone(), id)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn n(s: &str) -> VfsName {
        VfsName::raw(s).unwrap()
    }

    #[test]
    fn dot_and_dotdot_resolve_without_being_stored() {
        let dt = DirectoryTable::new(5, 2);
        assert_eq!(dt.get(&n(".")), Some(5));
        assert_eq!(dt.get(&n("..")), Some(2));
        assert!(dt.entries().is_empty());
    }

    #[test]
    fn link_rejects_duplicate_and_unlink_rejects_missing() {
        let mut dt = DirectoryTable::new(1, 0);
        dt.link(n("a"), 10).unwrap();
        assert!(dt.link(n("a"), 11).is_err());
        assert!(dt.unlink(&n("missing")).is_err());
        assert_eq!(dt.unlink(&n("a")).unwrap(), 10);
    }

    #[test]
    fn entries_preserve_insertion_order() {
        let mut dt = DirectoryTable::new(1, 0);
        dt.link(n("b"), 2).unwrap();
        dt.link(n("a"), 1).unwrap();
        dt.link(n("c"), 3).unwrap();
        let names: Vec<String> = dt
            .entries()
            .into_iter()
            .map(|(n, _)| n.display().to_string())
            .collect();
        assert_eq!(names, vec!["b", "a", "c"]);
    }
}
