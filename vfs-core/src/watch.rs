//! Watch-event shapes shared between `vfs-mem`'s `WatchService` and its
//! callers (§4.7, §6).

use bitflags::bitflags;

use crate::path::VfsPathBuf;

bitflags! {
    /// Event kinds a caller may register interest in.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct WatchEvents: u8 {
        const CREATE   = 1 << 0;
        const DELETE   = 1 << 1;
        const MODIFY   = 1 << 2;
        const OVERFLOW = 1 << 3;
    }
}

/// Reserved extension point for registration modifiers (e.g. sensitivity
/// hints); the CORE does not currently define any, matching the "kept
/// tunable, not guessed" stance of SPEC_FULL §9.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchModifiers;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatchEventKind {
    Create,
    Delete,
    Modify,
    Overflow,
}

/// One queued event: `count` is always 1 except for a collapsed
/// `Overflow`, whose `count` is the number of events it replaced.
#[derive(Debug, Clone, PartialEq)]
pub struct WatchEvent {
    pub kind: WatchEventKind,
    pub count: usize,
    pub relative_path: VfsPathBuf,
}

impl WatchEvent {
    pub fn overflow(count: usize) -> Self {
        Self {
            kind: WatchEventKind::Overflow,
            count,
            relative_path: VfsPathBuf::from_parts(None, Vec::new()),
        }
    }
}
