//! `MemFsConfig`/`MemFs`/`FileSystemView`: the façade-facing entry point
//! (§6).
//!
//! `FileTree`'s own API only accepts absolute paths; `FileSystemView` is
//! the layer that resolves a relative path against its stored working
//! directory before ever calling into the tree.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::debug;
use vfs_core::attr::AttributeValue;
use vfs_core::error::{errors, VfsResult};
use vfs_core::flags::{
    CopyOptions, CreateOptions, DeleteMode, FileKind, Features, LinkHandling, OpenOptions,
    ResolveFlags,
};
use vfs_core::path::{Normalizer, PathType, UnixPathType, VfsPath, VfsPathBuf};
use vfs_core::path_service::PathService;
use vfs_core::watch::{WatchEvents, WatchModifiers};

use crate::attrs::{standard_providers, AttributeService};
use crate::channel::SeekableByteChannel;
use crate::inode::Inode;
use crate::stream::{DirectoryStream, EntryFilter, SecureDirectoryStream};
use crate::tree::FileTree;
use crate::watch::{WatchKey, WatchService};

pub struct MemFsConfig {
    pub path_type: Box<dyn PathType>,
    pub roots: Vec<String>,
    pub working_directory: String,
    pub features: Features,
    pub attribute_views: Vec<&'static str>,
    pub name_canonicalization: Vec<Normalizer>,
    pub block_size: usize,
    pub default_owner: String,
    pub default_group: String,
}

impl Default for MemFsConfig {
    fn default() -> Self {
        Self {
            path_type: Box::new(UnixPathType),
            roots: vec!["/".to_string()],
            working_directory: "/".to_string(),
            features: Features::SYMBOLIC_LINKS | Features::LINKS,
            attribute_views: vec!["basic", "owner", "posix"],
            name_canonicalization: Vec::new(),
            block_size: crate::bytes::DEFAULT_BLOCK_SIZE,
            default_owner: "root".to_string(),
            default_group: "root".to_string(),
        }
    }
}

/// The filesystem instance: owns the tree, the path/attribute services and
/// the watch service. `open_view` hands out a `FileSystemView` bound to its
/// own working directory; several views may share one `MemFs`.
pub struct MemFs {
    tree: Arc<FileTree>,
    path_service: PathService,
    roots: Vec<String>,
    features: Features,
    watch: WatchService,
    closed: AtomicBool,
}

impl MemFs {
    pub fn new(config: MemFsConfig) -> VfsResult<Self> {
        if config.roots.is_empty() {
            return Err(errors::invalid_argument("MemFsConfig::roots must be non-empty"));
        }
        let providers = standard_providers(&config.attribute_views, &config.default_owner, &config.default_group);
        let attrs = AttributeService::new(providers);
        let roots: Vec<&str> = config.roots.iter().map(String::as_str).collect();
        let tree = Arc::new(FileTree::new(&roots, config.block_size, attrs));
        let path_service = PathService::new(config.path_type, config.name_canonicalization);
        let watch = WatchService::new(Arc::downgrade(&tree));
        Ok(Self {
            tree,
            path_service,
            roots: config.roots,
            features: config.features,
            watch,
            closed: AtomicBool::new(false),
        })
    }

    pub fn roots(&self) -> VfsResult<Vec<VfsPathBuf>> {
        self.check_open()?;
        self.roots
            .iter()
            .map(|r| self.path_service.parse(r, &[]))
            .collect()
    }

    pub fn path_service(&self) -> &PathService {
        &self.path_service
    }

    pub fn tree(&self) -> &Arc<FileTree> {
        &self.tree
    }

    pub fn features(&self) -> Features {
        self.features
    }

    fn check_open(&self) -> VfsResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(errors::filesystem_closed("filesystem is closed"));
        }
        Ok(())
    }

    pub fn open_view(self: &Arc<Self>, working_directory: VfsPathBuf) -> FileSystemView {
        FileSystemView {
            fs: self.clone(),
            working_directory,
        }
    }

    pub fn close(&self) {
        debug!("closing filesystem: invalidating channels, watch keys and directory streams");
        self.closed.store(true, Ordering::Release);
        self.watch.close();
    }
}

/// The path-based operations a façade actually calls (§6): every relative
/// path is resolved against `working_directory` before reaching the tree.
pub struct FileSystemView {
    fs: Arc<MemFs>,
    working_directory: VfsPathBuf,
}

impl FileSystemView {
    pub fn get_path(&self, first: &str, more: &[&str]) -> VfsResult<VfsPathBuf> {
        self.fs.path_service.parse(first, more)
    }

    pub fn get_working_directory(&self) -> &VfsPath {
        &self.working_directory
    }

    fn absolute(&self, path: &VfsPath) -> VfsPathBuf {
        self.working_directory.resolve(path).normalize()
    }

    pub fn lookup(&self, path: &VfsPath, resolve: ResolveFlags) -> VfsResult<Arc<Inode>> {
        self.fs.check_open()?;
        let abs = self.absolute(path);
        let id = self.fs.tree.lookup(&abs, resolve.link_handling())?;
        self.fs.tree.inode(id)
    }

    pub fn create(&self, path: &VfsPath, kind: FileKind, options: &CreateOptions) -> VfsResult<Arc<Inode>> {
        self.fs.check_open()?;
        if kind == FileKind::Symlink && !self.fs.features.contains(Features::SYMBOLIC_LINKS) {
            return Err(errors::unsupported_operation("symbolic links are disabled"));
        }
        let abs = self.absolute(path);
        let id = self.fs.tree.create(&abs, kind, None, &options.attrs)?;
        self.fs.tree.inode(id)
    }

    pub fn delete(&self, path: &VfsPath, mode: DeleteMode) -> VfsResult<()> {
        self.fs.check_open()?;
        let abs = self.absolute(path);
        if mode != DeleteMode::Any {
            let id = self.fs.tree.lookup(&abs, LinkHandling::NoFollow)?;
            let inode = self.fs.tree.inode(id)?;
            let is_dir = inode.is_directory();
            match mode {
                DeleteMode::DirOnly if !is_dir => return Err(errors::not_a_directory(path.to_string())),
                DeleteMode::NonDirOnly if is_dir => return Err(errors::is_a_directory(path.to_string())),
                _ => {}
            }
        }
        self.fs.tree.delete(&abs)
    }

    pub fn link(&self, link_path: &VfsPath, existing_path: &VfsPath) -> VfsResult<()> {
        self.fs.check_open()?;
        if !self.fs.features.contains(Features::LINKS) {
            return Err(errors::unsupported_operation("hard links are disabled"));
        }
        let existing = self.absolute(existing_path);
        let link = self.absolute(link_path);
        self.fs.tree.link(&existing, &link)?;
        Ok(())
    }

    pub fn symlink(&self, link_path: &VfsPath, target_path: &VfsPath, attrs: &[(String, AttributeValue)]) -> VfsResult<()> {
        self.fs.check_open()?;
        if !self.fs.features.contains(Features::SYMBOLIC_LINKS) {
            return Err(errors::unsupported_operation("symbolic links are disabled"));
        }
        let link = self.absolute(link_path);
        self.fs.tree.symlink(&link, target_path.clone(), attrs)?;
        Ok(())
    }

    pub fn read_symlink(&self, path: &VfsPath) -> VfsResult<VfsPathBuf> {
        self.fs.check_open()?;
        let abs = self.absolute(path);
        self.fs.tree.read_symlink(&abs)
    }

    pub fn copy(&self, src: &VfsPath, dst: &VfsPath, options: CopyOptions) -> VfsResult<()> {
        self.fs.check_open()?;
        let abs_src = self.absolute(src);
        let abs_dst = self.absolute(dst);
        self.fs.tree.copy(&abs_src, &abs_dst, options)?;
        Ok(())
    }

    pub fn move_(&self, src: &VfsPath, dst: &VfsPath, options: CopyOptions) -> VfsResult<()> {
        self.fs.check_open()?;
        let abs_src = self.absolute(src);
        let abs_dst = self.absolute(dst);
        self.fs.tree.rename(&abs_src, &abs_dst, options)
    }

    pub fn open_channel(&self, path: &VfsPath, options: &OpenOptions) -> VfsResult<SeekableByteChannel> {
        self.fs.check_open()?;
        let abs = self.absolute(path);
        let existing = self.fs.tree.lookup(&abs, options.resolve.link_handling());
        let id = match existing {
            Ok(id) => {
                if options.flags.contains(vfs_core::flags::OpenFlags::CREATE_NEW) {
                    return Err(errors::already_exists(path.to_string()));
                }
                if options.flags.contains(vfs_core::flags::OpenFlags::TRUNCATE) {
                    let inode = self.fs.tree.inode(id)?;
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
                self.fs.tree.create(&abs, FileKind::Regular, None, &options.attrs)?
            }
            Err(e) => return Err(e),
        };
        let inode = self.fs.tree.inode(id)?;
        SeekableByteChannel::open(inode, options.flags)
    }

    pub fn new_directory_stream(&self, path: &VfsPath, filter: Option<EntryFilter>) -> VfsResult<DirectoryStream> {
        self.fs.check_open()?;
        let abs = self.absolute(path);
        let id = self.fs.tree.lookup(&abs, LinkHandling::Follow)?;
        DirectoryStream::new(&self.fs.tree, id, abs, filter)
    }

    /// Like `new_directory_stream`, but the returned stream's own
    /// operations are bound to the directory's inode rather than `path` —
    /// they keep working even if the directory is later moved elsewhere.
    /// Requires `Features::SECURE_DIRECTORY_STREAMS`.
    pub fn new_secure_directory_stream(&self, path: &VfsPath, filter: Option<EntryFilter>) -> VfsResult<SecureDirectoryStream> {
        self.fs.check_open()?;
        if !self.fs.features.contains(Features::SECURE_DIRECTORY_STREAMS) {
            return Err(errors::unsupported_operation("secure directory streams are disabled"));
        }
        let abs = self.absolute(path);
        let id = self.fs.tree.lookup(&abs, LinkHandling::Follow)?;
        SecureDirectoryStream::new(self.fs.tree.clone(), id, abs, filter)
    }

    pub fn read_attributes(
        &self,
        path: &VfsPath,
        view: &str,
        names: Option<&[&str]>,
        resolve: ResolveFlags,
    ) -> VfsResult<std::collections::HashMap<String, AttributeValue>> {
        self.fs.check_open()?;
        let abs = self.absolute(path);
        let id = self.fs.tree.lookup(&abs, resolve.link_handling())?;
        let inode = self.fs.tree.inode(id)?;
        self.fs.tree.attrs().read_attributes(inode.as_ref(), view, names)
    }

    pub fn set_attribute(&self, path: &VfsPath, key: &str, value: AttributeValue, resolve: ResolveFlags) -> VfsResult<()> {
        self.fs.check_open()?;
        let abs = self.absolute(path);
        let id = self.fs.tree.lookup(&abs, resolve.link_handling())?;
        let inode = self.fs.tree.inode(id)?;
        self.fs.tree.attrs().set_attribute(inode.as_ref(), key, value, false)
    }

    pub fn register(&self, path: &VfsPath, events: WatchEvents, modifiers: WatchModifiers) -> VfsResult<WatchKey> {
        self.fs.check_open()?;
        let abs = self.absolute(path);
        let id = self.fs.tree.lookup(&abs, LinkHandling::Follow)?;
        self.fs.watch.register(id, events, modifiers)
    }

    pub fn to_real_path(&self, path: &VfsPath) -> VfsResult<VfsPathBuf> {
        self.fs.check_open()?;
        let abs = self.absolute(path);
        self.fs.tree.to_real_path(&abs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vfs_core::flags::OpenFlags;

    fn view() -> FileSystemView {
        let fs = Arc::new(MemFs::new(MemFsConfig::default()).unwrap());
        fs.open_view(VfsPathBuf::new(b"/"))
    }

    #[test]
    fn relative_path_resolves_against_working_directory() {
        let v = view();
        v.create(&VfsPathBuf::new(b"dir"), FileKind::Directory, &CreateOptions::default()).unwrap();
        let found = v.lookup(&VfsPathBuf::new(b"dir"), ResolveFlags::empty());
        assert!(found.is_ok());
    }

    #[test]
    fn open_channel_with_create_then_write_then_read() {
        let v = view();
        let options = OpenOptions {
            flags: OpenFlags::READ | OpenFlags::WRITE | OpenFlags::CREATE | OpenFlags::CREATE_NEW,
            ..Default::default()
        };
        let chan = v.open_channel(&VfsPathBuf::new(b"/f"), &options).unwrap();
        chan.write(b"hi").unwrap();
        chan.seek(0).unwrap();
        let mut buf = [0u8; 2];
        chan.read(&mut buf).unwrap();
        assert_eq!(&buf, b"hi");
    }

    #[test]
    fn delete_then_lookup_fails_not_found() {
        let v = view();
        v.create(&VfsPathBuf::new(b"/a"), FileKind::Regular, &CreateOptions::default()).unwrap();
        v.delete(&VfsPathBuf::new(b"/a"), DeleteMode::Any).unwrap();
        let err = v.lookup(&VfsPathBuf::new(b"/a"), ResolveFlags::empty()).unwrap_err();
        assert_eq!(err.kind(), vfs_core::VfsErrorKind::NotFound);
    }

    #[test]
    fn hard_link_survives_original_deletion() {
        let v = view();
        v.create(&VfsPathBuf::new(b"/a"), FileKind::Regular, &CreateOptions::default()).unwrap();
        v.link(&VfsPathBuf::new(b"/b"), &VfsPathBuf::new(b"/a")).unwrap();
        v.delete(&VfsPathBuf::new(b"/a"), DeleteMode::Any).unwrap();
        assert!(v.lookup(&VfsPathBuf::new(b"/b"), ResolveFlags::empty()).is_ok());
    }

    #[test]
    fn secure_directory_stream_rejected_unless_feature_enabled() {
        let v = view();
        v.create(&VfsPathBuf::new(b"/d"), FileKind::Directory, &CreateOptions::default()).unwrap();
        let err = v.new_secure_directory_stream(&VfsPathBuf::new(b"/d"), None).unwrap_err();
        assert_eq!(err.kind(), vfs_core::VfsErrorKind::UnsupportedOperation);
    }

    #[test]
    fn secure_directory_stream_available_when_feature_enabled() {
        let config = MemFsConfig {
            features: Features::SYMBOLIC_LINKS | Features::LINKS | Features::SECURE_DIRECTORY_STREAMS,
            ..Default::default()
        };
        let fs = Arc::new(MemFs::new(config).unwrap());
        let v = fs.open_view(VfsPathBuf::new(b"/"));
        v.create(&VfsPathBuf::new(b"/d"), FileKind::Directory, &CreateOptions::default()).unwrap();
        assert!(v.new_secure_directory_stream(&VfsPathBuf::new(b"/d"), None).is_ok());
    }
}
