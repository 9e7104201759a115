//! Bitflags and option structs exchanged between the façade and the CORE.
//!
//! Shapes follow the workspace convention seen across the sibling backends:
//! small `bitflags!` structs for on/off knobs, plain option structs grouping
//! the knobs relevant to one operation.

use bitflags::bitflags;

use crate::attr::AttributeValue;

bitflags! {
    /// Flags accepted by `FileSystemView::open_channel`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct OpenFlags: u32 {
        const READ       = 1 << 0;
        const WRITE      = 1 << 1;
        const APPEND     = 1 << 2;
        const CREATE     = 1 << 3;
        const CREATE_NEW = 1 << 4;
        const TRUNCATE   = 1 << 5;
    }
}

/// Which way a terminal symlink is handled during lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkHandling {
    Follow,
    NoFollow,
}

bitflags! {
    /// Lookup modifiers threaded through every path-taking operation.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ResolveFlags: u32 {
        /// Do not follow the terminal component if it is a symlink.
        const NOFOLLOW = 1 << 0;
    }
}

impl ResolveFlags {
    pub fn link_handling(self) -> LinkHandling {
        if self.contains(Self::NOFOLLOW) {
            LinkHandling::NoFollow
        } else {
            LinkHandling::Follow
        }
    }
}

bitflags! {
    /// Optional behaviors a `MemFsConfig` may enable; mirrors §6's
    /// `features` configuration set.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Features: u32 {
        const SYMBOLIC_LINKS             = 1 << 0;
        const LINKS                      = 1 << 1;
        const SECURE_DIRECTORY_STREAMS   = 1 << 2;
        const GROUPS                     = 1 << 3;
    }
}

bitflags! {
    /// Shared by `copy` and `move_`; only `REPLACE_EXISTING` applies to
    /// `move_`, both apply to `copy`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CopyOptions: u32 {
        const REPLACE_EXISTING = 1 << 0;
        const COPY_ATTRIBUTES  = 1 << 1;
    }
}

pub type RenameOptions = CopyOptions;

/// The kind of content a freshly created inode will hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileKind {
    Directory,
    Regular,
    Symlink,
}

/// Which entry kinds `delete` is willing to remove.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeleteMode {
    Any,
    DirOnly,
    NonDirOnly,
}

#[derive(Debug, Clone, Default)]
pub struct OpenOptions {
    pub flags: OpenFlags,
    pub resolve: ResolveFlags,
    pub attrs: Vec<(String, AttributeValue)>,
}

impl Default for OpenFlags {
    fn default() -> Self {
        OpenFlags::READ
    }
}

#[derive(Debug, Clone, Default)]
pub struct CreateOptions {
    pub resolve: ResolveFlags,
    pub attrs: Vec<(String, AttributeValue)>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_flags_select_link_handling() {
        assert_eq!(ResolveFlags::empty().link_handling(), LinkHandling::Follow);
        assert_eq!(
            ResolveFlags::NOFOLLOW.link_handling(),
            LinkHandling::NoFollow
        );
    }
}
