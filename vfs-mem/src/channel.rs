//! `SeekableByteChannel` and the advisory per-inode lock table (§4.6).

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace};
use vfs_core::error::{errors, VfsResult};
use vfs_core::flags::OpenFlags;

use crate::bytes::ByteStore;
use crate::inode::{now_millis, Inode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockKind {
    Shared,
    Exclusive,
}

#[derive(Debug, Clone, Copy)]
struct LockRange {
    position: u64,
    size: u64,
    kind: LockKind,
    channel_id: u64,
}

impl LockRange {
    fn overlaps(&self, other: &LockRange) -> bool {
        let self_end = self.position.saturating_add(self.size);
        let other_end = other.position.saturating_add(other.size);
        self.position < other_end && other.position < self_end
    }

    fn conflicts(&self, other: &LockRange) -> bool {
        self.channel_id != other.channel_id
            && self.overlaps(other)
            && (self.kind == LockKind::Exclusive || other.kind == LockKind::Exclusive)
    }
}

/// Advisory lock table for one inode. Non-enforcing: no read or write is
/// ever blocked by a held lock, this only arbitrates `try_lock`/`lock`
/// callers against each other.
#[derive(Default)]
pub struct LockTable {
    ranges: Mutex<Vec<LockRange>>,
    condvar: Condvar,
}

static NEXT_CHANNEL_ID: AtomicU64 = AtomicU64::new(1);

pub fn next_channel_id() -> u64 {
    NEXT_CHANNEL_ID.fetch_add(1, Ordering::Relaxed)
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_lock(&self, position: u64, size: u64, kind: LockKind, channel_id: u64) -> Option<LockGuard<'_>> {
        let candidate = LockRange { position, size, kind, channel_id };
        let mut ranges = self.ranges.lock();
        if ranges.iter().any(|r| r.conflicts(&candidate)) {
            trace!(position, size, channel_id, ?kind, "try_lock: overlapping lock");
            return None;
        }
        ranges.push(candidate);
        debug!(position, size, channel_id, ?kind, "lock acquired");
        Some(LockGuard { table: self, range: candidate })
    }

    /// Blocks until the lock can be acquired. `is_cancelled` is polled
    /// between wakeups so a cooperative cancellation can unblock the wait
    /// with `Interrupted`.
    pub fn lock(
        &self,
        position: u64,
        size: u64,
        kind: LockKind,
        channel_id: u64,
        is_cancelled: impl Fn() -> bool,
    ) -> VfsResult<LockGuard<'_>> {
        let candidate = LockRange { position, size, kind, channel_id };
        let mut ranges = self.ranges.lock();
        loop {
            if !ranges.iter().any(|r| r.conflicts(&candidate)) {
                ranges.push(candidate);
                return Ok(LockGuard { table: self, range: candidate });
            }
            if is_cancelled() {
                return Err(errors::interrupted("lock wait cancelled"));
            }
            self.condvar.wait_for(&mut ranges, std::time::Duration::from_millis(20));
        }
    }

    fn release(&self, range: LockRange) {
        let mut ranges = self.ranges.lock();
        if let Some(pos) = ranges.iter().position(|r| {
            r.position == range.position
                && r.size == range.size
                && r.channel_id == range.channel_id
                && r.kind == range.kind
        }) {
            ranges.remove(pos);
        }
        drop(ranges);
        self.condvar.notify_all();
    }
}

pub struct LockGuard<'a> {
    table: &'a LockTable,
    range: LockRange,
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        self.table.release(self.range);
    }
}

/// A position cursor plus open-mode flags over a shared `ByteStore`. Cheap
/// to clone the underlying `Arc<Inode>`, but each channel owns its own
/// cursor and close state.
pub struct SeekableByteChannel {
    id: u64,
    inode: Arc<Inode>,
    flags: OpenFlags,
    position: AtomicUsize,
    closed: std::sync::atomic::AtomicBool,
}

impl SeekableByteChannel {
    pub fn open(inode: Arc<Inode>, flags: OpenFlags) -> VfsResult<Self> {
        let store_len = match &*inode.content() {
            crate::inode::Content::Regular(store) => store.size(),
            _ => return Err(errors::invalid_argument("channel is not over a regular file")),
        };
        inode.open_handle();
        let position = if flags.contains(OpenFlags::APPEND) { store_len } else { 0 };
        Ok(Self {
            id: next_channel_id(),
            inode,
            flags,
            position: AtomicUsize::new(position),
            closed: std::sync::atomic::AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    fn check_open(&self) -> VfsResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(errors::closed_channel("channel is closed"));
        }
        Ok(())
    }

    pub fn position(&self) -> usize {
        self.position.load(Ordering::Acquire)
    }

    pub fn seek(&self, pos: usize) -> VfsResult<()> {
        self.check_open()?;
        self.position.store(pos, Ordering::Release);
        Ok(())
    }

    pub fn size(&self) -> VfsResult<usize> {
        self.check_open()?;
        match &*self.inode.content() {
            crate::inode::Content::Regular(store) => Ok(store.size()),
            _ => Err(errors::invalid_argument("channel is not over a regular file")),
        }
    }

    pub fn read(&self, buf: &mut [u8]) -> VfsResult<usize> {
        self.check_open()?;
        if !self.flags.contains(OpenFlags::READ) {
            return Err(errors::invalid_argument("channel not opened for reading"));
        }
        let pos = self.position.load(Ordering::Acquire);
        let n = match &*self.inode.content() {
            crate::inode::Content::Regular(store) => store.read(pos, buf),
            _ => return Err(errors::invalid_argument("channel is not over a regular file")),
        };
        self.position.fetch_add(n, Ordering::AcqRel);
        self.inode.touch_access(now_millis());
        Ok(n)
    }

    pub fn write(&self, buf: &[u8]) -> VfsResult<usize> {
        self.check_open()?;
        if !self.flags.contains(OpenFlags::WRITE) {
            return Err(errors::invalid_argument("channel not opened for writing"));
        }
        let n = match &*self.inode.content() {
            crate::inode::Content::Regular(store) => {
                if self.flags.contains(OpenFlags::APPEND) {
                    let (offset, n) = store.append(buf);
                    self.position.store(offset + n, Ordering::Release);
                    n
                } else {
                    let pos = self.position.load(Ordering::Acquire);
                    let n = store.write(pos, buf);
                    self.position.fetch_add(n, Ordering::AcqRel);
                    n
                }
            }
            _ => return Err(errors::invalid_argument("channel is not over a regular file")),
        };
        self.inode.touch_modified(now_millis());
        Ok(n)
    }

    pub fn truncate(&self, n: usize) -> VfsResult<()> {
        self.check_open()?;
        if !self.flags.contains(OpenFlags::WRITE) {
            return Err(errors::invalid_argument("channel not opened for writing"));
        }
        match &*self.inode.content() {
            crate::inode::Content::Regular(store) => store.truncate(n),
            _ => return Err(errors::invalid_argument("channel is not over a regular file")),
        }
        self.inode.touch_modified(now_millis());
        Ok(())
    }

    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.inode.close_handle();
        }
    }

    /// Non-blocking advisory lock over `[position, position+size)`,
    /// tracked on the backing inode so it is visible to every channel open
    /// on the same file (§4.6).
    pub fn try_lock(&self, position: u64, size: u64, kind: LockKind) -> VfsResult<Option<LockGuard<'_>>> {
        self.check_open()?;
        Ok(self.inode.locks().try_lock(position, size, kind, self.id))
    }

    /// Blocks until the lock can be acquired; `is_cancelled` is polled so a
    /// cooperative cancellation can unblock the wait with `Interrupted`.
    pub fn lock(
        &self,
        position: u64,
        size: u64,
        kind: LockKind,
        is_cancelled: impl Fn() -> bool,
    ) -> VfsResult<LockGuard<'_>> {
        self.check_open()?;
        self.inode.locks().lock(position, size, kind, self.id, is_cancelled)
    }
}

impl Drop for SeekableByteChannel {
    fn drop(&mut self) {
        self.close();
    }
}
