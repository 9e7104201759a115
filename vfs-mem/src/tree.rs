//! The inode arena and every structural operation over it (§4.5).
//!
//! A single `parking_lot::RwLock` guards the whole arena. `FileTree`'s
//! public API only accepts absolute `VfsPath` values — resolving a relative
//! path against a working directory is `FileSystemView`'s job, one layer up,
//! so the tree never needs to know about a "starting inode" at all.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use vfs_core::attr::AttributeValue;
use vfs_core::error::{errors, VfsResult};
use vfs_core::flags::{CopyOptions, FileKind, LinkHandling};
use vfs_core::path::{VfsName, VfsPath, VfsPathBuf};

use crate::attrs::AttributeService;
use crate::bytes::ByteStore;
use crate::dir::DirectoryTable;
use crate::inode::{now_millis, Content, Inode, InodeId};

const MAX_SYMLINK_DEPTH: u32 = 40;

/// The outcome of resolving a path one component short of requiring the
/// terminal entry to exist — lets `create` avoid a second traversal.
pub enum ResolveOutcome {
    Found(InodeId),
    ParentFound { parent: InodeId, missing: VfsName },
}

struct Arena {
    inodes: HashMap<InodeId, Arc<Inode>>,
    /// The pseudo-directory whose children are the filesystem's named
    /// roots (e.g. `/`, or `C:\` and `D:\` on a multi-root configuration).
    /// Its linkage to each root directory is a sentinel like `.`/`..` and
    /// is never counted toward that root directory's link count.
    super_root: InodeId,
}

pub struct FileTree {
    lock: RwLock<Arena>,
    next_id: AtomicU64,
    block_size: usize,
    attrs: AttributeService,
}

impl FileTree {
    pub fn new(roots: &[&str], block_size: usize, attrs: AttributeService) -> Self {
        let super_root_id = 0;
        let mut inodes = HashMap::new();
        let now = now_millis();
        let super_root_dir = DirectoryTable::new(super_root_id, super_root_id);
        inodes.insert(
            super_root_id,
            Arc::new(Inode::new(super_root_id, Content::Directory(super_root_dir), now)),
        );

        let mut next_id = super_root_id + 1;
        {
            let super_root = inodes.get(&super_root_id).unwrap();
            let mut content = super_root.content_mut();
            let dt = content.as_directory_mut().expect("freshly created directory");
            for root in roots {
                let root_id = next_id;
                next_id += 1;
                let root_dir = DirectoryTable::new(root_id, root_id);
                let root_inode = Arc::new(Inode::new(root_id, Content::Directory(root_dir), now));
                inodes.insert(root_id, root_inode);
                // Bootstrapping a root is a sentinel linkage, like `.`/`..`
                // — it is never counted toward the root directory's own
                // link count, so root directories always report `links() == 0`.
                dt.link(VfsName::raw(*root).expect("root name is non-empty"), root_id)
                    .expect("fresh super-root has no duplicate roots");
            }
        }

        Self {
            lock: RwLock::new(Arena {
                inodes,
                super_root: super_root_id,
            }),
            next_id: AtomicU64::new(next_id),
            block_size,
            attrs,
        }
    }

    pub fn attrs(&self) -> &AttributeService {
        &self.attrs
    }

    fn allocate_id(&self) -> InodeId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn get(arena: &Arena, id: InodeId) -> VfsResult<Arc<Inode>> {
        arena
            .inodes
            .get(&id)
            .cloned()
            .ok_or_else(|| errors::not_found(format!("stale inode {id}")))
    }

    fn directory_entry(inode: &Inode, name: &VfsName) -> VfsResult<Option<InodeId>> {
        let content = inode.content();
        let dt = content
            .as_directory()
            .ok_or_else(|| errors::not_a_directory("expected a directory"))?;
        Ok(dt.get(name))
    }

    /// Resolves `path` (which must be absolute) to an inode, following
    /// intermediate symlinks unconditionally and the terminal one only when
    /// `link_handling` is `Follow`.
    fn resolve(&self, arena: &Arena, path: &VfsPath, link_handling: LinkHandling) -> VfsResult<ResolveOutcome> {
        if !path.is_absolute() {
            return Err(errors::invalid_path("FileTree only resolves absolute paths"));
        }
        let root = path
            .root()
            .filter(|r| !r.is_empty())
            .ok_or_else(|| errors::invalid_path("missing root"))?;
        let root_inode = Self::get(arena, arena.super_root)?;
        let start = Self::directory_entry(&root_inode, &VfsName::raw(root)?)?
            .ok_or_else(|| errors::not_found(root.to_string()))?;
        self.resolve_from(arena, start, path.names(), link_handling)
    }

    /// Core traversal shared by absolute-path lookup and the directory-
    /// relative operations a secure directory stream exposes (§4.8): both
    /// just differ in their starting inode. A relative symlink target
    /// encountered along the way resolves against `dir`, the directory
    /// entry currently being traversed — never against some cwd the
    /// traversal has no notion of.
    fn resolve_from(
        &self,
        arena: &Arena,
        start: InodeId,
        names: &[VfsName],
        link_handling: LinkHandling,
    ) -> VfsResult<ResolveOutcome> {
        let mut current = start;
        let mut remaining: VecDeque<VfsName> = names.iter().cloned().collect();
        if remaining.is_empty() {
            return Ok(ResolveOutcome::Found(current));
        }

        let mut depth = 0u32;
        while let Some(name) = remaining.pop_front() {
            let is_terminal = remaining.is_empty();
            let inode = Self::get(arena, current)?;
            let next = match Self::directory_entry(&inode, &name)? {
                Some(id) => id,
                None => {
                    if is_terminal {
                        return Ok(ResolveOutcome::ParentFound { parent: current, missing: name });
                    }
                    return Err(errors::not_found(name.display().to_string()));
                }
            };

            let next_inode = Self::get(arena, next)?;
            let should_follow = !is_terminal || link_handling == LinkHandling::Follow;
            if should_follow {
                if let Content::Symlink(target) = &*next_inode.content() {
                    depth += 1;
                    if depth > MAX_SYMLINK_DEPTH {
                        return Err(errors::loop_error(name.display().to_string()));
                    }
                    if target.is_absolute() {
                        current = arena.super_root;
                        let target_root = target
                            .root()
                            .filter(|r| !r.is_empty())
                            .ok_or_else(|| errors::invalid_path("missing root"))?;
                        let root_inode = Self::get(arena, current)?;
                        current = Self::directory_entry(&root_inode, &VfsName::raw(target_root)?)?
                            .ok_or_else(|| errors::not_found(target_root.to_string()))?;
                        for n in target.names().iter().rev() {
                            remaining.push_front(n.clone());
                        }
                    } else {
                        // Relative target: resolved against `current`, the
                        // directory containing this symlink entry.
                        for n in target.names().iter().rev() {
                            remaining.push_front(n.clone());
                        }
                    }
                    continue;
                }
            }
            current = next;
        }
        Ok(ResolveOutcome::Found(current))
    }

    pub fn lookup(&self, path: &VfsPath, link_handling: LinkHandling) -> VfsResult<InodeId> {
        let arena = self.lock.read();
        match self.resolve(&arena, path, link_handling)? {
            ResolveOutcome::Found(id) => Ok(id),
            ResolveOutcome::ParentFound { missing, .. } => Err(errors::not_found(missing.display().to_string())),
        }
    }

    pub fn inode(&self, id: InodeId) -> VfsResult<Arc<Inode>> {
        let arena = self.lock.read();
        Self::get(&arena, id)
    }

    /// Resolves `name` directly against `dir`, bypassing path lookup
    /// entirely. Backs a secure directory stream's path-relative
    /// operations (§4.8): since `dir` is an `InodeId`, not a `VfsPath`,
    /// this keeps working after `dir` is moved elsewhere in the tree.
    pub fn lookup_in(&self, dir: InodeId, name: &VfsName, link_handling: LinkHandling) -> VfsResult<InodeId> {
        let arena = self.lock.read();
        match self.resolve_from(&arena, dir, std::slice::from_ref(name), link_handling)? {
            ResolveOutcome::Found(id) => Ok(id),
            ResolveOutcome::ParentFound { missing, .. } => Err(errors::not_found(missing.display().to_string())),
        }
    }

    /// Directory-relative `create` for the secure stream variant; see
    /// `lookup_in`.
    pub fn create_in(
        &self,
        dir: InodeId,
        name: VfsName,
        kind: FileKind,
        symlink_target: Option<VfsPathBuf>,
        attrs: &[(String, AttributeValue)],
    ) -> VfsResult<InodeId> {
        let mut arena = self.lock.write();
        let parent_inode = Self::get(&arena, dir)?;
        if !parent_inode.is_directory() {
            return Err(errors::not_a_directory("bound directory is no longer a directory"));
        }
        let content = parent_inode.content();
        let exists = content.as_directory().expect("just checked").get(&name).is_some();
        drop(content);
        if exists {
            return Err(errors::already_exists(name.display().to_string()));
        }

        let id = self.allocate_id();
        let now = now_millis();
        let content = match kind {
            FileKind::Directory => Content::Directory(DirectoryTable::new(id, dir)),
            other => self.new_content(other, symlink_target),
        };
        let inode = Arc::new(Inode::new(id, content, now));
        arena.inodes.insert(id, inode.clone());
        self.link_in_parent(&arena, dir, name, id)?;
        self.attrs.set_initial_attributes(inode.as_ref(), attrs)?;
        Ok(id)
    }

    /// Directory-relative `delete`; see `lookup_in`.
    pub fn delete_in(&self, dir: InodeId, name: &VfsName) -> VfsResult<()> {
        let mut arena = self.lock.write();
        let child = {
            let parent_inode = Self::get(&arena, dir)?;
            let content = parent_inode.content();
            let dt = content.as_directory().ok_or_else(|| errors::not_a_directory("bound directory is no longer a directory"))?;
            dt.get(name).ok_or_else(|| errors::not_found(name.display().to_string()))?
        };
        let child_inode = Self::get(&arena, child)?;
        if child_inode.is_directory() {
            let content = child_inode.content();
            let dt = content.as_directory().expect("just checked");
            if !dt.is_empty() {
                return Err(errors::directory_not_empty(name.display().to_string()));
            }
        }
        self.unlink_from_parent(&arena, dir, name)?;
        Self::sweep_orphans(&mut arena, &[child]);
        Ok(())
    }

    /// Directory-relative `move`/rename between two (possibly distinct)
    /// bound directories; see `lookup_in`.
    pub fn rename_in(
        &self,
        src_dir: InodeId,
        src_name: &VfsName,
        dst_dir: InodeId,
        dst_name: VfsName,
        options: CopyOptions,
    ) -> VfsResult<()> {
        let mut arena = self.lock.write();
        let source_id = {
            let parent_inode = Self::get(&arena, src_dir)?;
            let content = parent_inode.content();
            let dt = content.as_directory().ok_or_else(|| errors::not_a_directory("bound directory is no longer a directory"))?;
            dt.get(src_name).ok_or_else(|| errors::not_found(src_name.display().to_string()))?
        };
        let existing_dest = {
            let parent_inode = Self::get(&arena, dst_dir)?;
            let content = parent_inode.content();
            let dt = content.as_directory().ok_or_else(|| errors::not_a_directory("bound directory is no longer a directory"))?;
            dt.get(&dst_name)
        };
        if let Some(dest_id) = existing_dest {
            if dest_id == source_id && src_dir == dst_dir {
                return Ok(());
            }
            if !options.contains(CopyOptions::REPLACE_EXISTING) {
                return Err(errors::already_exists(dst_name.display().to_string()));
            }
            let source_inode = Self::get(&arena, source_id)?;
            let dest_inode = Self::get(&arena, dest_id)?;
            if source_inode.is_directory() != dest_inode.is_directory() {
                return Err(errors::invalid_argument("cannot replace a directory with a non-directory or vice versa"));
            }
            if dest_inode.is_directory() {
                let content = dest_inode.content();
                let dt = content.as_directory().expect("just checked");
                if !dt.is_empty() {
                    return Err(errors::directory_not_empty(dst_name.display().to_string()));
                }
            }
        }

        let source_inode = Self::get(&arena, source_id)?;
        if source_inode.is_directory() {
            self.check_not_descendant(&arena, dst_dir, source_id)?;
        }

        if let Some(dest_id) = existing_dest {
            self.unlink_from_parent(&arena, dst_dir, &dst_name)?;
            Self::sweep_orphans(&mut arena, &[dest_id]);
        }
        self.unlink_from_parent(&arena, src_dir, src_name)?;
        self.link_in_parent(&arena, dst_dir, dst_name, source_id)?;
        Ok(())
    }

    fn new_content(&self, kind: FileKind, symlink_target: Option<VfsPathBuf>) -> Content {
        match kind {
            FileKind::Directory => Content::Directory(DirectoryTable::new(0, 0)),
            FileKind::Regular => Content::Regular(ByteStore::new(self.block_size)),
            FileKind::Symlink => {
                Content::Symlink(symlink_target.expect("symlink creation always supplies a target"))
            }
        }
    }

    fn link_in_parent(&self, arena: &Arena, parent: InodeId, name: VfsName, child: InodeId) -> VfsResult<()> {
        let parent_inode = Self::get(arena, parent)?;
        {
            let mut content = parent_inode.content_mut();
            let dt = content
                .as_directory_mut()
                .ok_or_else(|| errors::not_a_directory("parent is not a directory"))?;
            dt.link(name, child)?;
        }
        let child_inode = Self::get(arena, child)?;
        child_inode.increment_links();
        if child_inode.is_directory() {
            let mut content = child_inode.content_mut();
            let dt = content.as_directory_mut().expect("just checked is_directory");
            dt.set_parent(parent);
        }
        Ok(())
    }

    fn unlink_from_parent(&self, arena: &Arena, parent: InodeId, name: &VfsName) -> VfsResult<InodeId> {
        let parent_inode = Self::get(arena, parent)?;
        let child = {
            let mut content = parent_inode.content_mut();
            let dt = content
                .as_directory_mut()
                .ok_or_else(|| errors::not_a_directory("parent is not a directory"))?;
            dt.unlink(name)?
        };
        let child_inode = Self::get(arena, child)?;
        let remaining = child_inode.decrement_links();
        if remaining == 0 && child_inode.open_handles() == 0 {
            drop(child_inode);
            // Safe to drop: no other entry can reference an inode whose
            // link count just reached zero under this write lock.
        }
        Ok(child)
    }

    /// Drops orphaned inodes (zero links, zero open handles) from the
    /// arena. Called after any operation that may have produced one.
    fn sweep_orphans(arena: &mut Arena, candidates: &[InodeId]) {
        for id in candidates {
            if let Some(inode) = arena.inodes.get(id) {
                if inode.is_orphaned() {
                    arena.inodes.remove(id);
                }
            }
        }
    }

    pub fn create(
        &self,
        path: &VfsPath,
        kind: FileKind,
        symlink_target: Option<VfsPathBuf>,
        attrs: &[(String, AttributeValue)],
    ) -> VfsResult<InodeId> {
        let mut arena = self.lock.write();
        let (parent, name) = match self.resolve(&arena, path, LinkHandling::Follow)? {
            ResolveOutcome::ParentFound { parent, missing } => (parent, missing),
            ResolveOutcome::Found(_) => return Err(errors::already_exists(path.to_string())),
        };

        let parent_inode = Self::get(&arena, parent)?;
        if !parent_inode.is_directory() {
            return Err(errors::not_a_directory(path.to_string()));
        }

        let id = self.allocate_id();
        let now = now_millis();
        let content = match kind {
            FileKind::Directory => Content::Directory(DirectoryTable::new(id, parent)),
            other => self.new_content(other, symlink_target),
        };
        let inode = Arc::new(Inode::new(id, content, now));
        arena.inodes.insert(id, inode.clone());

        self.link_in_parent(&arena, parent, name, id)?;
        self.attrs.set_initial_attributes(inode.as_ref(), attrs)?;
        Ok(id)
    }

    /// Hard link: hooks a second name to an existing regular/symlink
    /// inode. Both source and destination must resolve within this tree;
    /// there is only ever one `FileTree` per process so `CrossDevice` is
    /// unreachable here and is a façade-layer concern (documented in the
    /// grounding ledger).
    pub fn link(&self, existing: &VfsPath, link_path: &VfsPath) -> VfsResult<InodeId> {
        let mut arena = self.lock.write();
        let source = match self.resolve(&arena, existing, LinkHandling::NoFollow)? {
            ResolveOutcome::Found(id) => id,
            ResolveOutcome::ParentFound { .. } => return Err(errors::not_found(existing.to_string())),
        };
        let source_inode = Self::get(&arena, source)?;
        if source_inode.is_directory() {
            return Err(errors::is_a_directory(existing.to_string()));
        }

        let (parent, name) = match self.resolve(&arena, link_path, LinkHandling::Follow)? {
            ResolveOutcome::ParentFound { parent, missing } => (parent, missing),
            ResolveOutcome::Found(_) => return Err(errors::already_exists(link_path.to_string())),
        };
        self.link_in_parent(&arena, parent, name, source)?;
        Ok(source)
    }

    pub fn symlink(
        &self,
        link_path: &VfsPath,
        target: VfsPathBuf,
        attrs: &[(String, AttributeValue)],
    ) -> VfsResult<InodeId> {
        self.create(link_path, FileKind::Symlink, Some(target), attrs)
    }

    pub fn read_symlink(&self, path: &VfsPath) -> VfsResult<VfsPathBuf> {
        let arena = self.lock.read();
        let id = match self.resolve(&arena, path, LinkHandling::NoFollow)? {
            ResolveOutcome::Found(id) => id,
            ResolveOutcome::ParentFound { .. } => return Err(errors::not_found(path.to_string())),
        };
        let inode = Self::get(&arena, id)?;
        match &*inode.content() {
            Content::Symlink(target) => Ok(target.clone()),
            _ => Err(errors::invalid_argument(format!("{path} is not a symbolic link"))),
        }
    }

    pub fn delete(&self, path: &VfsPath) -> VfsResult<()> {
        let mut arena = self.lock.write();
        let name = path
            .file_name()
            .cloned()
            .ok_or_else(|| errors::invalid_argument("cannot delete a root"))?;
        let parent_path = path.parent().ok_or_else(|| errors::invalid_argument("cannot delete a root"))?;
        let parent = match self.resolve(&arena, &parent_path, LinkHandling::Follow)? {
            ResolveOutcome::Found(p) => p,
            ResolveOutcome::ParentFound { .. } => return Err(errors::not_found(path.to_string())),
        };

        let child = {
            let parent_inode = Self::get(&arena, parent)?;
            let content = parent_inode.content();
            let dt = content.as_directory().ok_or_else(|| errors::not_a_directory(path.to_string()))?;
            dt.get(&name).ok_or_else(|| errors::not_found(path.to_string()))?
        };
        let child_inode = Self::get(&arena, child)?;
        if child_inode.is_directory() {
            let content = child_inode.content();
            let dt = content.as_directory().expect("just checked");
            if !dt.is_empty() {
                return Err(errors::directory_not_empty(path.to_string()));
            }
        }

        self.unlink_from_parent(&arena, parent, &name)?;
        Self::sweep_orphans(&mut arena, &[child]);
        Ok(())
    }

    fn check_not_descendant(&self, arena: &Arena, ancestor_candidate: InodeId, moved: InodeId) -> VfsResult<()> {
        if ancestor_candidate == moved {
            return Err(errors::invalid_argument("cannot move a directory into itself"));
        }
        let mut current = ancestor_candidate;
        loop {
            let inode = Self::get(arena, current)?;
            let parent = {
                let content = inode.content();
                match content.as_directory() {
                    Some(dt) => dt.parent_id(),
                    None => return Ok(()),
                }
            };
            if parent == current {
                return Ok(());
            }
            if parent == moved {
                return Err(errors::invalid_argument("cannot move a directory into its own descendant"));
            }
            current = parent;
        }
    }

    pub fn rename(&self, from: &VfsPath, to: &VfsPath, options: CopyOptions) -> VfsResult<()> {
        let mut arena = self.lock.write();
        let source_parent_path = from.parent().ok_or_else(|| errors::invalid_argument("cannot rename a root"))?;
        let source_name = from.file_name().cloned().ok_or_else(|| errors::invalid_argument("cannot rename a root"))?;
        let dest_parent_path = to.parent().ok_or_else(|| errors::invalid_argument("cannot rename to a root"))?;
        let dest_name = to.file_name().cloned().ok_or_else(|| errors::invalid_argument("cannot rename to a root"))?;

        let source_parent = match self.resolve(&arena, &source_parent_path, LinkHandling::Follow)? {
            ResolveOutcome::Found(id) => id,
            ResolveOutcome::ParentFound { .. } => return Err(errors::not_found(from.to_string())),
        };
        let dest_parent = match self.resolve(&arena, &dest_parent_path, LinkHandling::Follow)? {
            ResolveOutcome::Found(id) => id,
            ResolveOutcome::ParentFound { .. } => return Err(errors::not_found(to.to_string())),
        };

        let source_id = {
            let parent_inode = Self::get(&arena, source_parent)?;
            let content = parent_inode.content();
            let dt = content.as_directory().ok_or_else(|| errors::not_a_directory(from.to_string()))?;
            dt.get(&source_name).ok_or_else(|| errors::not_found(from.to_string()))?
        };

        let existing_dest = {
            let parent_inode = Self::get(&arena, dest_parent)?;
            let content = parent_inode.content();
            let dt = content.as_directory().ok_or_else(|| errors::not_a_directory(to.to_string()))?;
            dt.get(&dest_name)
        };

        if let Some(dest_id) = existing_dest {
            if dest_id == source_id && source_parent == dest_parent {
                return Ok(());
            }
            if !options.contains(CopyOptions::REPLACE_EXISTING) {
                return Err(errors::already_exists(to.to_string()));
            }
            let source_inode = Self::get(&arena, source_id)?;
            let dest_inode = Self::get(&arena, dest_id)?;
            if source_inode.is_directory() != dest_inode.is_directory() {
                return Err(errors::invalid_argument("cannot replace a directory with a non-directory or vice versa"));
            }
            if dest_inode.is_directory() {
                let content = dest_inode.content();
                let dt = content.as_directory().expect("just checked");
                if !dt.is_empty() {
                    return Err(errors::directory_not_empty(to.to_string()));
                }
            }
        }

        let source_inode = Self::get(&arena, source_id)?;
        if source_inode.is_directory() {
            self.check_not_descendant(&arena, dest_parent, source_id)?;
        }

        if let Some(dest_id) = existing_dest {
            self.unlink_from_parent(&arena, dest_parent, &dest_name)?;
            Self::sweep_orphans(&mut arena, &[dest_id]);
        }

        self.unlink_from_parent(&arena, source_parent, &source_name)?;
        self.link_in_parent(&arena, dest_parent, dest_name, source_id)?;
        Ok(())
    }

    pub fn copy(&self, from: &VfsPath, to: &VfsPath, options: CopyOptions) -> VfsResult<InodeId> {
        let mut arena = self.lock.write();
        let source_id = match self.resolve(&arena, from, LinkHandling::Follow)? {
            ResolveOutcome::Found(id) => id,
            ResolveOutcome::ParentFound { .. } => return Err(errors::not_found(from.to_string())),
        };

        let dest_parent_path = to.parent().ok_or_else(|| errors::invalid_argument("cannot copy to a root"))?;
        let dest_name = to.file_name().cloned().ok_or_else(|| errors::invalid_argument("cannot copy to a root"))?;
        let dest_parent = match self.resolve(&arena, &dest_parent_path, LinkHandling::Follow)? {
            ResolveOutcome::Found(id) => id,
            ResolveOutcome::ParentFound { .. } => return Err(errors::not_found(to.to_string())),
        };

        let existing_dest = {
            let parent_inode = Self::get(&arena, dest_parent)?;
            let content = parent_inode.content();
            let dt = content.as_directory().ok_or_else(|| errors::not_a_directory(to.to_string()))?;
            dt.get(&dest_name)
        };
        if existing_dest.is_some() && !options.contains(CopyOptions::REPLACE_EXISTING) {
            return Err(errors::already_exists(to.to_string()));
        }

        let source_inode = Self::get(&arena, source_id)?;
        let now = now_millis();
        let new_id = self.allocate_id();
        let new_content = match &*source_inode.content() {
            Content::Directory(_) => Content::Directory(DirectoryTable::new(new_id, 0)),
            Content::Regular(store) => Content::Regular(store.copy()),
            Content::Symlink(target) => Content::Symlink(target.clone()),
        };
        let new_inode = Arc::new(Inode::new(new_id, new_content, now));
        arena.inodes.insert(new_id, new_inode.clone());

        if options.contains(CopyOptions::COPY_ATTRIBUTES) {
            for key in source_inode.raw_keys() {
                if let Some(value) = source_inode.raw_get(&key) {
                    new_inode.raw_set(&key, value);
                }
            }
        } else {
            self.attrs.set_initial_attributes(new_inode.as_ref(), &[])?;
        }

        if let Some(dest_id) = existing_dest {
            self.unlink_from_parent(&arena, dest_parent, &dest_name)?;
            Self::sweep_orphans(&mut arena, &[dest_id]);
        }
        self.link_in_parent(&arena, dest_parent, dest_name, new_id)?;
        Ok(new_id)
    }

    /// Canonicalizes `path`: resolves every symlink and emits the stored
    /// canonical spelling of each traversed directory entry, accumulated
    /// forward during traversal (files and symlinks have no parent pointer
    /// to walk backward from).
    pub fn to_real_path(&self, path: &VfsPath) -> VfsResult<VfsPathBuf> {
        let arena = self.lock.read();
        let normalized = path.normalize();
        if !normalized.is_absolute() {
            return Err(errors::invalid_path("to_real_path requires an absolute path"));
        }
        let root = normalized.root().filter(|r| !r.is_empty()).ok_or_else(|| errors::invalid_path("missing root"))?;

        let mut accumulated: Vec<VfsName> = Vec::new();
        let mut current = arena.super_root;
        let root_inode = Self::get(&arena, current)?;
        current = Self::directory_entry(&root_inode, &VfsName::raw(root)?)?
            .ok_or_else(|| errors::not_found(root.to_string()))?;

        let mut remaining: VecDeque<VfsName> = normalized.names().iter().cloned().collect();
        let mut depth = 0u32;
        while let Some(name) = remaining.pop_front() {
            let parent_inode = Self::get(&arena, current)?;
            let content = parent_inode.content();
            let dt = content.as_directory().ok_or_else(|| errors::not_a_directory(path.to_string()))?;
            let next = dt.get(&name).ok_or_else(|| errors::not_found(name.display().to_string()))?;
            let stored = dt.stored_name(&name).unwrap_or(name);
            drop(content);

            let next_inode = Self::get(&arena, next)?;
            if let Content::Symlink(target) = &*next_inode.content() {
                depth += 1;
                if depth > MAX_SYMLINK_DEPTH {
                    return Err(errors::loop_error(path.to_string()));
                }
                if target.is_absolute() {
                    accumulated.clear();
                    current = arena.super_root;
                    let target_root = target.root().filter(|r| !r.is_empty()).ok_or_else(|| errors::invalid_path("missing root"))?;
                    let root_inode = Self::get(&arena, current)?;
                    current = Self::directory_entry(&root_inode, &VfsName::raw(target_root)?)?
                        .ok_or_else(|| errors::not_found(target_root.to_string()))?;
                } else {
                    accumulated.push(stored);
                    accumulated.pop();
                }
                for n in target.names().iter().rev() {
                    remaining.push_front(n.clone());
                }
                continue;
            }

            accumulated.push(stored);
            current = next;
        }

        Ok(VfsPathBuf::from_parts(Some(root.to_string()), accumulated))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attrs::{standard_providers, AttributeService};
    use pretty_assertions::assert_eq;

    fn tree() -> FileTree {
        FileTree::new(&["/"], 64, AttributeService::new(standard_providers(&[], "root", "root")))
    }

    fn p(s: &str) -> VfsPathBuf {
        VfsPathBuf::new(s.as_bytes())
    }

    #[test]
    fn create_then_lookup_finds_the_file() {
        let t = tree();
        let id = t.create(&p("/a"), FileKind::Regular, None, &[]).unwrap();
        assert_eq!(t.lookup(&p("/a"), LinkHandling::Follow).unwrap(), id);
    }

    #[test]
    fn create_duplicate_fails_already_exists() {
        let t = tree();
        t.create(&p("/a"), FileKind::Regular, None, &[]).unwrap();
        let err = t.create(&p("/a"), FileKind::Regular, None, &[]).unwrap_err();
        assert_eq!(err.kind(), vfs_core::VfsErrorKind::AlreadyExists);
    }

    #[test]
    fn delete_nonempty_directory_fails() {
        let t = tree();
        t.create(&p("/d"), FileKind::Directory, None, &[]).unwrap();
        t.create(&p("/d/f"), FileKind::Regular, None, &[]).unwrap();
        let err = t.delete(&p("/d")).unwrap_err();
        assert_eq!(err.kind(), vfs_core::VfsErrorKind::DirectoryNotEmpty);
    }

    #[test]
    fn delete_removes_entry_and_orphans_inode() {
        let t = tree();
        let id = t.create(&p("/a"), FileKind::Regular, None, &[]).unwrap();
        t.delete(&p("/a")).unwrap();
        assert!(t.lookup(&p("/a"), LinkHandling::Follow).is_err());
        assert!(t.inode(id).is_err());
    }

    #[test]
    fn hard_link_shares_inode_and_bumps_link_count() {
        let t = tree();
        let id = t.create(&p("/a"), FileKind::Regular, None, &[]).unwrap();
        t.link(&p("/a"), &p("/b")).unwrap();
        assert_eq!(t.lookup(&p("/b"), LinkHandling::Follow).unwrap(), id);
        assert_eq!(t.inode(id).unwrap().links(), 2);
    }

    #[test]
    fn hard_link_on_directory_rejected() {
        let t = tree();
        t.create(&p("/d"), FileKind::Directory, None, &[]).unwrap();
        let err = t.link(&p("/d"), &p("/d2")).unwrap_err();
        assert_eq!(err.kind(), vfs_core::VfsErrorKind::IsADirectory);
    }

    #[test]
    fn symlink_resolves_to_target() {
        let t = tree();
        t.create(&p("/a"), FileKind::Regular, None, &[]).unwrap();
        t.symlink(&p("/link"), p("/a"), &[]).unwrap();
        let target_id = t.lookup(&p("/a"), LinkHandling::Follow).unwrap();
        assert_eq!(t.lookup(&p("/link"), LinkHandling::Follow).unwrap(), target_id);
        let nofollow_id = t.lookup(&p("/link"), LinkHandling::NoFollow).unwrap();
        assert_ne!(nofollow_id, target_id);
    }

    #[test]
    fn self_referential_symlink_is_a_loop() {
        let t = tree();
        t.symlink(&p("/loop"), p("/loop"), &[]).unwrap();
        let err = t.lookup(&p("/loop"), LinkHandling::Follow).unwrap_err();
        assert_eq!(err.kind(), vfs_core::VfsErrorKind::Loop);
    }

    #[test]
    fn rename_moves_entry_between_directories() {
        let t = tree();
        t.create(&p("/d1"), FileKind::Directory, None, &[]).unwrap();
        t.create(&p("/d2"), FileKind::Directory, None, &[]).unwrap();
        let id = t.create(&p("/d1/f"), FileKind::Regular, None, &[]).unwrap();
        t.rename(&p("/d1/f"), &p("/d2/f"), CopyOptions::empty()).unwrap();
        assert!(t.lookup(&p("/d1/f"), LinkHandling::Follow).is_err());
        assert_eq!(t.lookup(&p("/d2/f"), LinkHandling::Follow).unwrap(), id);
    }

    #[test]
    fn rename_onto_existing_without_replace_existing_fails() {
        let t = tree();
        t.create(&p("/a"), FileKind::Regular, None, &[]).unwrap();
        t.create(&p("/b"), FileKind::Regular, None, &[]).unwrap();
        let err = t.rename(&p("/a"), &p("/b"), CopyOptions::empty()).unwrap_err();
        assert_eq!(err.kind(), vfs_core::VfsErrorKind::AlreadyExists);
    }

    #[test]
    fn rename_directory_into_its_own_descendant_rejected() {
        let t = tree();
        t.create(&p("/d"), FileKind::Directory, None, &[]).unwrap();
        t.create(&p("/d/sub"), FileKind::Directory, None, &[]).unwrap();
        let err = t.rename(&p("/d"), &p("/d/sub/moved"), CopyOptions::empty()).unwrap_err();
        assert_eq!(err.kind(), vfs_core::VfsErrorKind::InvalidArgument);
    }

    #[test]
    fn copy_regular_file_is_independent() {
        let t = tree();
        let id = t.create(&p("/a"), FileKind::Regular, None, &[]).unwrap();
        let inode = t.inode(id).unwrap();
        if let Content::Regular(store) = &*inode.content() {
            store.write(0, b"hi");
        }
        let copy_id = t.copy(&p("/a"), &p("/b"), CopyOptions::empty()).unwrap();
        assert_ne!(copy_id, id);
        let copy_inode = t.inode(copy_id).unwrap();
        let mut buf = [0u8; 2];
        if let Content::Regular(store) = &*copy_inode.content() {
            store.read(0, &mut buf);
        }
        assert_eq!(&buf, b"hi");
    }

    #[test]
    fn copy_of_a_directory_has_its_own_self_id() {
        let t = tree();
        t.create(&p("/d"), FileKind::Directory, None, &[]).unwrap();
        let copy_id = t.copy(&p("/d"), &p("/d2"), CopyOptions::empty()).unwrap();
        assert_eq!(t.lookup(&p("/d2/."), LinkHandling::Follow).unwrap(), copy_id);
    }

    #[test]
    fn to_real_path_resolves_symlinks_and_preserves_stored_spelling() {
        let t = tree();
        t.create(&p("/Dir"), FileKind::Directory, None, &[]).unwrap();
        t.create(&p("/Dir/File"), FileKind::Regular, None, &[]).unwrap();
        t.symlink(&p("/link"), p("/Dir"), &[]).unwrap();
        let real = t.to_real_path(&p("/link/File")).unwrap();
        assert_eq!(real.to_string(), "/Dir/File");
    }
}
