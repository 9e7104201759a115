//! Path types, the attribute-provider contract, and the error taxonomy
//! shared by every in-memory-filesystem backend in this workspace.
//!
//! No backend logic lives here — `vfs-mem` is where inodes, directory
//! tables and byte stores actually get built.

pub mod attr;
pub mod error;
pub mod flags;
pub mod path;
pub mod path_service;
pub mod watch;

pub use attr::{AclEntry, AclEntryType, AttributeProvider, AttributeValue, InodeMeta, PermissionSet};
pub use error::{VfsError, VfsErrorKind, VfsResult};
pub use flags::{
    CopyOptions, CreateOptions, DeleteMode, FileKind, Features, LinkHandling, OpenFlags,
    OpenOptions, RenameOptions, ResolveFlags,
};
pub use path::{
    case_fold_ascii, case_fold_unicode, nfc, parse_with, Normalizer, PathType, UnixPathType,
    VfsName, VfsPath, VfsPathBuf, WindowsPathType,
};
pub use path_service::PathService;
pub use watch::{WatchEvent, WatchEventKind, WatchEvents, WatchModifiers};
