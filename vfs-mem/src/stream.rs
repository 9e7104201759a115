//! `DirectoryStream`: an iterator over an immutable directory snapshot
//! (§4.8).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use vfs_core::attr::AttributeValue;
use vfs_core::error::{errors, VfsResult};
use vfs_core::flags::{CopyOptions, FileKind, LinkHandling, OpenOptions, ResolveFlags};
use vfs_core::path::{VfsName, VfsPathBuf};

use crate::channel::SeekableByteChannel;
use crate::inode::InodeId;
use crate::tree::FileTree;

pub type EntryFilter = Arc<dyn Fn(&VfsName) -> bool + Send + Sync>;

/// A snapshot taken once, at construction, under the tree read lock;
/// mutations to the directory after that point are not reflected.
pub struct DirectoryStream {
    directory: InodeId,
    base_path: VfsPathBuf,
    entries: Vec<(VfsName, InodeId)>,
    filter: Option<EntryFilter>,
    cursor: AtomicUsize,
    closed: AtomicBool,
}

impl DirectoryStream {
    pub fn new(tree: &FileTree, directory: InodeId, base_path: VfsPathBuf, filter: Option<EntryFilter>) -> VfsResult<Self> {
        let inode = tree.inode(directory)?;
        let content = inode.content();
        let dt = content
            .as_directory()
            .ok_or_else(|| errors::not_a_directory(base_path.to_string()))?;
        Ok(Self {
            directory,
            base_path,
            entries: dt.entries(),
            filter,
            cursor: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        })
    }

    pub fn directory(&self) -> InodeId {
        self.directory
    }

    fn matches(&self, name: &VfsName) -> bool {
        self.filter.as_ref().map(|f| f(name)).unwrap_or(true)
    }

    /// Consumes the snapshot incrementally; each call resumes after the
    /// last entry a previous call returned. A stream may be driven this
    /// way or via `iterator()`, but once closed, both fail `BadHandle`.
    pub fn next_batch(&self, max: usize) -> VfsResult<Vec<VfsPathBuf>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(errors::bad_handle("directory stream is closed"));
        }
        let mut out = Vec::new();
        loop {
            let idx = self.cursor.fetch_add(1, Ordering::AcqRel);
            if idx >= self.entries.len() {
                self.cursor.store(self.entries.len(), Ordering::Release);
                break;
            }
            let (name, _) = &self.entries[idx];
            if self.matches(name) {
                let mut names = self.base_path.names().to_vec();
                names.push(name.clone());
                out.push(VfsPathBuf::from_parts(self.base_path.root().map(str::to_string), names));
                if out.len() >= max {
                    break;
                }
            }
        }
        Ok(out)
    }

    /// Returns every remaining matching entry as full paths, exhausting the
    /// stream's cursor in one call.
    pub fn iterator(&self) -> VfsResult<Vec<VfsPathBuf>> {
        self.next_batch(usize::MAX)
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

impl Drop for DirectoryStream {
    fn drop(&mut self) {
        self.close();
    }
}

/// A `DirectoryStream` that is also a handle: every operation is bound to
/// the directory's `InodeId` rather than a path, so it keeps working after
/// the directory is renamed or moved elsewhere in the tree, as long as the
/// inode itself is still live (§4.8).
pub struct SecureDirectoryStream {
    tree: Arc<FileTree>,
    directory: InodeId,
    base_path: VfsPathBuf,
    entries: Vec<(VfsName, InodeId)>,
    filter: Option<EntryFilter>,
    cursor: AtomicUsize,
    closed: AtomicBool,
}

impl SecureDirectoryStream {
    pub fn new(
        tree: Arc<FileTree>,
        directory: InodeId,
        base_path: VfsPathBuf,
        filter: Option<EntryFilter>,
    ) -> VfsResult<Self> {
        let inode = tree.inode(directory)?;
        let content = inode.content();
        let dt = content
            .as_directory()
            .ok_or_else(|| errors::not_a_directory(base_path.to_string()))?;
        let entries = dt.entries();
        drop(content);
        Ok(Self {
            tree,
            directory,
            base_path,
            entries,
            filter,
            cursor: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        })
    }

    pub fn directory(&self) -> InodeId {
        self.directory
    }

    fn check_open(&self) -> VfsResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(errors::bad_handle("directory stream is closed"));
        }
        Ok(())
    }

    fn matches(&self, name: &VfsName) -> bool {
        self.filter.as_ref().map(|f| f(name)).unwrap_or(true)
    }

    pub fn next_batch(&self, max: usize) -> VfsResult<Vec<VfsPathBuf>> {
        self.check_open()?;
        let mut out = Vec::new();
        loop {
            let idx = self.cursor.fetch_add(1, Ordering::AcqRel);
            if idx >= self.entries.len() {
                self.cursor.store(self.entries.len(), Ordering::Release);
                break;
            }
            let (name, _) = &self.entries[idx];
            if self.matches(name) {
                let mut names = self.base_path.names().to_vec();
                names.push(name.clone());
                out.push(VfsPathBuf::from_parts(self.base_path.root().map(str::to_string), names));
                if out.len() >= max {
                    break;
                }
            }
        }
        Ok(out)
    }

    pub fn iterator(&self) -> VfsResult<Vec<VfsPathBuf>> {
        self.next_batch(usize::MAX)
    }

    /// Opens (and optionally creates) `name` resolved directly against the
    /// bound directory inode.
    pub fn new_byte_channel(&self, name: &VfsName, options: &OpenOptions) -> VfsResult<SeekableByteChannel> {
        self.check_open()?;
        let existing = self.tree.lookup_in(self.directory, name, options.resolve.link_handling());
        let id = match existing {
            Ok(id) => {
                if options.flags.contains(vfs_core::flags::OpenFlags::CREATE_NEW) {
                    return Err(errors::already_exists(name.display().to_string()));
                }
                if options.flags.contains(vfs_core::flags::OpenFlags::TRUNCATE) {
                    let inode = self.tree.inode(id)?;
                    if let crate::inode::Content::Regular(store) = &*inode.content() {
                        store.truncate(0);
                    }
                }
                id
            }
            Err(e)
                if e.kind() == vfs_core::VfsErrorKind::NotFound
                    && (options.flags.contains(vfs_core::flags::OpenFlags::CREATE)
                        || options.flags.contains(vfs_core::flags::OpenFlags::CREATE_NEW)) =>
            {
                self.tree
                    .create_in(self.directory, name.clone(), FileKind::Regular, None, &options.attrs)?
            }
            Err(e) => return Err(e),
        };
        let inode = self.tree.inode(id)?;
        SeekableByteChannel::open(inode, options.flags)
    }

    /// Opens a child directory as a nested secure stream, still bound by
    /// inode rather than path.
    pub fn new_directory_stream(&self, name: &VfsName, filter: Option<EntryFilter>) -> VfsResult<SecureDirectoryStream> {
        self.check_open()?;
        let id = self.tree.lookup_in(self.directory, name, LinkHandling::Follow)?;
        let mut names = self.base_path.names().to_vec();
        names.push(name.clone());
        let path = VfsPathBuf::from_parts(self.base_path.root().map(str::to_string), names);
        SecureDirectoryStream::new(self.tree.clone(), id, path, filter)
    }

    pub fn delete_file(&self, name: &VfsName) -> VfsResult<()> {
        self.check_open()?;
        let id = self.tree.lookup_in(self.directory, name, LinkHandling::NoFollow)?;
        let inode = self.tree.inode(id)?;
        if inode.is_directory() {
            return Err(errors::is_a_directory(name.display().to_string()));
        }
        self.tree.delete_in(self.directory, name)
    }

    pub fn delete_directory(&self, name: &VfsName) -> VfsResult<()> {
        self.check_open()?;
        let id = self.tree.lookup_in(self.directory, name, LinkHandling::NoFollow)?;
        let inode = self.tree.inode(id)?;
        if !inode.is_directory() {
            return Err(errors::not_a_directory(name.display().to_string()));
        }
        self.tree.delete_in(self.directory, name)
    }

    /// Moves `name` out of this stream's directory and into `target`'s,
    /// under `dst_name`. Both endpoints are inode-bound, so this is safe
    /// even if either directory has since been renamed.
    pub fn move_(
        &self,
        name: &VfsName,
        target: &SecureDirectoryStream,
        dst_name: VfsName,
        options: CopyOptions,
    ) -> VfsResult<()> {
        self.check_open()?;
        target.check_open()?;
        self.tree.rename_in(self.directory, name, target.directory, dst_name, options)
    }

    pub fn read_attributes(
        &self,
        name: &VfsName,
        view: &str,
        names: Option<&[&str]>,
        resolve: ResolveFlags,
    ) -> VfsResult<HashMap<String, AttributeValue>> {
        self.check_open()?;
        let id = self.tree.lookup_in(self.directory, name, resolve.link_handling())?;
        let inode = self.tree.inode(id)?;
        self.tree.attrs().read_attributes(inode.as_ref(), view, names)
    }

    pub fn set_attribute(
        &self,
        name: &VfsName,
        key: &str,
        value: AttributeValue,
        resolve: ResolveFlags,
    ) -> VfsResult<()> {
        self.check_open()?;
        let id = self.tree.lookup_in(self.directory, name, resolve.link_handling())?;
        let inode = self.tree.inode(id)?;
        self.tree.attrs().set_attribute(inode.as_ref(), key, value, false)
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

impl Drop for SecureDirectoryStream {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attrs::{standard_providers, AttributeService};
    use vfs_core::flags::{FileKind, LinkHandling};

    fn tree() -> FileTree {
        FileTree::new(&["/"], 64, AttributeService::new(standard_providers(&[], "root", "root")))
    }

    #[test]
    fn snapshot_excludes_later_additions() {
        let t = tree();
        t.create(&VfsPathBuf::new(b"/a"), FileKind::Regular, None, &[]).unwrap();
        let dir = t.lookup(&VfsPathBuf::new(b"/"), LinkHandling::Follow).unwrap();
        let stream = DirectoryStream::new(&t, dir, VfsPathBuf::new(b"/"), None).unwrap();
        t.create(&VfsPathBuf::new(b"/b"), FileKind::Regular, None, &[]).unwrap();
        let entries = stream.iterator().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].to_string(), "/a");
    }

    #[test]
    fn closed_stream_rejects_further_reads() {
        let t = tree();
        let dir = t.lookup(&VfsPathBuf::new(b"/"), LinkHandling::Follow).unwrap();
        let stream = DirectoryStream::new(&t, dir, VfsPathBuf::new(b"/"), None).unwrap();
        stream.close();
        assert!(stream.iterator().is_err());
    }

    #[test]
    fn filter_is_applied_lazily_during_iteration() {
        let t = tree();
        t.create(&VfsPathBuf::new(b"/keep.txt"), FileKind::Regular, None, &[]).unwrap();
        t.create(&VfsPathBuf::new(b"/skip.log"), FileKind::Regular, None, &[]).unwrap();
        let dir = t.lookup(&VfsPathBuf::new(b"/"), LinkHandling::Follow).unwrap();
        let filter: EntryFilter = Arc::new(|name| name.display().ends_with(".txt"));
        let stream = DirectoryStream::new(&t, dir, VfsPathBuf::new(b"/"), Some(filter)).unwrap();
        let entries = stream.iterator().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].to_string(), "/keep.txt");
    }

    fn arc_tree() -> Arc<FileTree> {
        Arc::new(tree())
    }

    #[test]
    fn secure_stream_operations_survive_the_directory_being_moved() {
        let t = arc_tree();
        t.create(&VfsPathBuf::new(b"/d1"), FileKind::Directory, None, &[]).unwrap();
        t.create(&VfsPathBuf::new(b"/d2"), FileKind::Directory, None, &[]).unwrap();
        let name = VfsName::raw("f").unwrap();
        let file_id = t.create(&VfsPathBuf::new(b"/d1/f"), FileKind::Regular, None, &[]).unwrap();
        if let crate::inode::Content::Regular(store) = &*t.inode(file_id).unwrap().content() {
            store.write(0, b"hi");
        }

        // Snapshot is taken here, with "f" already present, so the later
        // `iterator()` call below reflects this moment — not anything that
        // happens afterward (§4.8: immutable snapshot at construction).
        let dir = t.lookup(&VfsPathBuf::new(b"/d1"), LinkHandling::Follow).unwrap();
        let secure = SecureDirectoryStream::new(t.clone(), dir, VfsPathBuf::new(b"/d1"), None).unwrap();

        t.rename(&VfsPathBuf::new(b"/d1"), &VfsPathBuf::new(b"/d2/d1"), CopyOptions::empty()).unwrap();

        // The directory moved, but `secure` is bound to its inode, not the
        // old path, so its name-relative operations are still reachable.
        let entries = secure.iterator().unwrap();
        assert_eq!(entries.len(), 1);

        let read_back = secure
            .new_byte_channel(&name, &OpenOptions { flags: vfs_core::flags::OpenFlags::READ, ..Default::default() })
            .unwrap();
        let mut buf = [0u8; 2];
        read_back.read(&mut buf).unwrap();
        assert_eq!(&buf, b"hi");

        secure.delete_file(&name).unwrap();
        assert!(t.lookup_in(dir, &name, LinkHandling::NoFollow).is_err());
    }

    #[test]
    fn secure_move_between_two_bound_directories() {
        let t = arc_tree();
        t.create(&VfsPathBuf::new(b"/d1"), FileKind::Directory, None, &[]).unwrap();
        t.create(&VfsPathBuf::new(b"/d2"), FileKind::Directory, None, &[]).unwrap();
        let d1 = t.lookup(&VfsPathBuf::new(b"/d1"), LinkHandling::Follow).unwrap();
        let d2 = t.lookup(&VfsPathBuf::new(b"/d2"), LinkHandling::Follow).unwrap();
        let secure1 = SecureDirectoryStream::new(t.clone(), d1, VfsPathBuf::new(b"/d1"), None).unwrap();
        let secure2 = SecureDirectoryStream::new(t.clone(), d2, VfsPathBuf::new(b"/d2"), None).unwrap();

        let name = VfsName::raw("f").unwrap();
        secure1
            .new_byte_channel(&name, &OpenOptions { flags: vfs_core::flags::OpenFlags::WRITE | vfs_core::flags::OpenFlags::CREATE, ..Default::default() })
            .unwrap();
        secure1.move_(&name, &secure2, name.clone(), CopyOptions::empty()).unwrap();

        assert!(secure1.iterator().unwrap().is_empty());
        assert_eq!(secure2.iterator().unwrap().len(), 1);
    }
}
