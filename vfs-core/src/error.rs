use std::io;

/// Stable classification of every failure the CORE can produce.
///
/// Façades translate these into their own exception hierarchy; the CORE
/// itself never retries or logs on error, it only classifies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VfsErrorKind {
    NotFound,
    AlreadyExists,
    NotADirectory,
    IsADirectory,
    DirectoryNotEmpty,
    /// Symlink resolution exceeded the traversal depth limit.
    Loop,
    /// Operation spans two independent filesystem instances.
    CrossDevice,
    InvalidPath,
    InvalidArgument,
    UnsupportedOperation,
    ReadOnly,
    FilesystemClosed,
    ClosedChannel,
    ClosedService,
    Interrupted,
    LockConflict,
    OverlappingLock,
    /// A directory-stream or watch-key handle was reused after `close()`.
    BadHandle,
    Io,
}

impl VfsErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not found",
            Self::AlreadyExists => "already exists",
            Self::NotADirectory => "not a directory",
            Self::IsADirectory => "is a directory",
            Self::DirectoryNotEmpty => "directory not empty",
            Self::Loop => "too many levels of symbolic links",
            Self::CrossDevice => "cross-device link",
            Self::InvalidPath => "invalid path",
            Self::InvalidArgument => "invalid argument",
            Self::UnsupportedOperation => "operation not supported",
            Self::ReadOnly => "read-only filesystem",
            Self::FilesystemClosed => "filesystem closed",
            Self::ClosedChannel => "channel closed",
            Self::ClosedService => "service closed",
            Self::Interrupted => "interrupted",
            Self::LockConflict => "lock conflict",
            Self::OverlappingLock => "overlapping lock",
            Self::BadHandle => "stale handle",
            Self::Io => "io error",
        }
    }
}

/// The CORE's single error type. `context` carries an operation-specific
/// message (e.g. the offending path); `source` carries a wrapped cause for
/// the `Io` variant.
#[derive(Debug, thiserror::Error)]
#[error("{kind}: {context}", kind = self.kind.as_str())]
pub struct VfsError {
    kind: VfsErrorKind,
    context: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl VfsError {
    pub fn new(kind: VfsErrorKind, context: impl Into<String>) -> Self {
        Self {
            kind,
            context: context.into(),
            source: None,
        }
    }

    pub fn with_source(
        kind: VfsErrorKind,
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind,
            context: context.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn kind(&self) -> VfsErrorKind {
        self.kind
    }

    pub fn context(&self) -> &str {
        &self.context
    }
}

impl From<io::Error> for VfsError {
    fn from(err: io::Error) -> Self {
        let kind = match err.kind() {
            io::ErrorKind::NotFound => VfsErrorKind::NotFound,
            io::ErrorKind::AlreadyExists => VfsErrorKind::AlreadyExists,
            io::ErrorKind::Interrupted => VfsErrorKind::Interrupted,
            _ => VfsErrorKind::Io,
        };
        VfsError::with_source(kind, "io", err)
    }
}

pub type VfsResult<T> = Result<T, VfsError>;

/// Convenience constructors, mirroring the shape of `vfs_core::VfsErrorKind`
/// equality assertions used throughout the teacher's integration tests
/// (`err.kind() == VfsErrorKind::NotFound`, etc).
macro_rules! ctor {
    ($name:ident, $kind:ident) => {
        pub fn $name(context: impl Into<String>) -> VfsError {
            VfsError::new(VfsErrorKind::$kind, context)
        }
    };
}

#[allow(non_snake_case)]
pub mod errors {
    use super::*;

    ctor!(not_found, NotFound);
    ctor!(already_exists, AlreadyExists);
    ctor!(not_a_directory, NotADirectory);
    ctor!(is_a_directory, IsADirectory);
    ctor!(directory_not_empty, DirectoryNotEmpty);
    ctor!(loop_error, Loop);
    ctor!(cross_device, CrossDevice);
    ctor!(invalid_path, InvalidPath);
    ctor!(invalid_argument, InvalidArgument);
    ctor!(unsupported_operation, UnsupportedOperation);
    ctor!(read_only, ReadOnly);
    ctor!(filesystem_closed, FilesystemClosed);
    ctor!(closed_channel, ClosedChannel);
    ctor!(closed_service, ClosedService);
    ctor!(interrupted, Interrupted);
    ctor!(lock_conflict, LockConflict);
    ctor!(overlapping_lock, OverlappingLock);
    ctor!(bad_handle, BadHandle);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_round_trips_through_display() {
        let err = VfsError::new(VfsErrorKind::NotFound, "/a/b");
        assert_eq!(err.kind(), VfsErrorKind::NotFound);
        assert_eq!(err.context(), "/a/b");
        assert_eq!(err.to_string(), "not found: /a/b");
    }

    #[test]
    fn io_error_maps_not_found() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "missing");
        let err: VfsError = io_err.into();
        assert_eq!(err.kind(), VfsErrorKind::NotFound);
    }
}
