//! The concrete in-memory filesystem backend: inode arena, directory
//! tables, byte stores, the file tree, attribute providers, channels,
//! watch service and directory streams.

pub mod attrs;
pub mod bytes;
pub mod channel;
pub mod dir;
pub mod fs;
pub mod inode;
pub mod stream;
pub mod tree;
pub mod watch;

pub use attrs::{standard_providers, AttributeService};
pub use bytes::{ByteStore, DEFAULT_BLOCK_SIZE};
pub use channel::{LockGuard, LockKind, LockTable, SeekableByteChannel};
pub use dir::DirectoryTable;
pub use fs::{FileSystemView, MemFs, MemFsConfig};
pub use inode::{Content, Inode, InodeId};
pub use stream::{DirectoryStream, EntryFilter, SecureDirectoryStream};
pub use tree::{FileTree, ResolveOutcome};
pub use watch::{KeyState, WatchKey, WatchService};
