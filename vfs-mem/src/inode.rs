//! File identity and content (§3, §4.2).

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use vfs_core::attr::{AttributeValue, InodeMeta};
use vfs_core::flags::FileKind;
use vfs_core::path::VfsPathBuf;

use crate::bytes::ByteStore;
use crate::channel::LockTable;
use crate::dir::DirectoryTable;

pub type InodeId = u64;

pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is before the epoch")
        .as_millis() as i64
}

/// The typed content variant a regular/directory/symlink inode holds.
pub enum Content {
    Directory(DirectoryTable),
    Regular(ByteStore),
    Symlink(VfsPathBuf),
}

impl Content {
    pub fn kind(&self) -> FileKind {
        match self {
            Content::Directory(_) => FileKind::Directory,
            Content::Regular(_) => FileKind::Regular,
            Content::Symlink(_) => FileKind::Symlink,
        }
    }

    pub fn as_directory(&self) -> Option<&DirectoryTable> {
        match self {
            Content::Directory(dt) => Some(dt),
            _ => None,
        }
    }

    pub fn as_directory_mut(&mut self) -> Option<&mut DirectoryTable> {
        match self {
            Content::Directory(dt) => Some(dt),
            _ => None,
        }
    }
}

struct Meta {
    creation_time: i64,
    last_access_time: i64,
    last_modified_time: i64,
    links: u64,
    open_handles: u64,
    attributes: HashMap<String, AttributeValue>,
}

/// Identity (stable `id`) plus mutable metadata and content. Reachability
/// and link accounting are owned by `FileTree`/`DirectoryTable`; an `Inode`
/// only tracks its own counters.
pub struct Inode {
    id: InodeId,
    content: RwLock<Content>,
    meta: RwLock<Meta>,
    /// Advisory file locks (§4.6). Lives on the inode, not the channel, so
    /// locks held by one channel are visible to `try_lock`/`lock` calls
    /// made through any other channel open on the same file.
    locks: LockTable,
}

impl Inode {
    pub fn new(id: InodeId, content: Content, now: i64) -> Self {
        Self {
            id,
            content: RwLock::new(content),
            meta: RwLock::new(Meta {
                creation_time: now,
                last_access_time: now,
                last_modified_time: now,
                links: 0,
                open_handles: 0,
                attributes: HashMap::new(),
            }),
            locks: LockTable::new(),
        }
    }

    pub fn locks(&self) -> &LockTable {
        &self.locks
    }

    pub fn id(&self) -> InodeId {
        self.id
    }

    pub fn content(&self) -> RwLockReadGuard<'_, Content> {
        self.content.read()
    }

    pub fn content_mut(&self) -> RwLockWriteGuard<'_, Content> {
        self.content.write()
    }

    pub fn is_directory(&self) -> bool {
        matches!(&*self.content(), Content::Directory(_))
    }

    pub fn increment_links(&self) {
        self.meta.write().links += 1;
    }

    /// Decrements the link count and returns the new value.
    pub fn decrement_links(&self) -> u64 {
        let mut meta = self.meta.write();
        meta.links = meta.links.saturating_sub(1);
        meta.links
    }

    pub fn links(&self) -> u64 {
        self.meta.read().links
    }

    pub fn open_handle(&self) {
        self.meta.write().open_handles += 1;
    }

    pub fn close_handle(&self) -> u64 {
        let mut meta = self.meta.write();
        meta.open_handles = meta.open_handles.saturating_sub(1);
        meta.open_handles
    }

    pub fn open_handles(&self) -> u64 {
        self.meta.read().open_handles
    }

    /// An inode whose link count and open-handle count have both reached
    /// zero is no longer reachable from anywhere and may be dropped from
    /// the arena (§3 Lifecycle, §5 Resource cleanup).
    pub fn is_orphaned(&self) -> bool {
        let meta = self.meta.read();
        meta.links == 0 && meta.open_handles == 0
    }

    pub fn touch_access(&self, now: i64) {
        self.meta.write().last_access_time = now;
    }

    pub fn touch_modified(&self, now: i64) {
        self.meta.write().last_modified_time = now;
    }

    fn size_bytes(&self) -> u64 {
        match &*self.content() {
            Content::Regular(store) => store.size() as u64,
            _ => 0,
        }
    }
}

impl InodeMeta for Inode {
    fn file_key(&self) -> u64 {
        self.id
    }

    fn kind(&self) -> FileKind {
        self.content().kind()
    }

    fn size(&self) -> u64 {
        self.size_bytes()
    }

    fn links(&self) -> u64 {
        self.links()
    }

    fn creation_time(&self) -> i64 {
        self.meta.read().creation_time
    }

    fn last_access_time(&self) -> i64 {
        self.meta.read().last_access_time
    }

    fn last_modified_time(&self) -> i64 {
        self.meta.read().last_modified_time
    }

    fn set_creation_time(&self, millis: i64) {
        self.meta.write().creation_time = millis;
    }

    fn set_last_access_time(&self, millis: i64) {
        self.meta.write().last_access_time = millis;
    }

    fn set_last_modified_time(&self, millis: i64) {
        self.meta.write().last_modified_time = millis;
    }

    fn raw_get(&self, key: &str) -> Option<AttributeValue> {
        self.meta.read().attributes.get(key).cloned()
    }

    fn raw_set(&self, key: &str, value: AttributeValue) {
        self.meta.write().attributes.insert(key.to_string(), value);
    }

    fn raw_delete(&self, key: &str) {
        self.meta.write().attributes.remove(key);
    }

    fn raw_keys(&self) -> Vec<String> {
        self.meta.read().attributes.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_accounting_saturates_at_zero() {
        let inode = Inode::new(1, Content::Regular(ByteStore::new(16)), now_millis());
        assert_eq!(inode.decrement_links(), 0);
        inode.increment_links();
        inode.increment_links();
        assert_eq!(inode.decrement_links(), 1);
    }

    #[test]
    fn orphaned_requires_both_zero_links_and_handles() {
        let inode = Inode::new(1, Content::Regular(ByteStore::new(16)), now_millis());
        inode.increment_links();
        inode.open_handle();
        assert!(!inode.is_orphaned());
        inode.decrement_links();
        assert!(!inode.is_orphaned());
        inode.close_handle();
        assert!(inode.is_orphaned());
    }
}
