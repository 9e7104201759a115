//! `AsyncFileChannel`: the position-explicit async wrapper over a regular-
//! file Inode (§4.6).
//!
//! Every call names its own position, so there is no shared seek cursor the
//! way `SeekableByteChannel` has one; the only thing shared across calls on
//! the same channel is submission order, enforced by an internal
//! `async-lock::Mutex` rather than by whatever the executor happens to do.

use std::future::Future;
use std::sync::Arc;

use async_lock::Mutex as AsyncMutex;
use vfs_core::error::{errors, VfsResult};
use vfs_mem::inode::now_millis;
use vfs_mem::{Content, Inode, LockGuard, LockKind};

use crate::runtime::VfsRuntime;

/// Checked once, immediately before a submitted operation touches the
/// backing store. An operation found cancelled at that point is reported
/// `Interrupted` without performing any I/O; one that has already passed
/// the check runs to completion even if the caller stops polling its
/// future (§4.6 — "one in flight may complete normally").
pub type CancelCheck = Arc<dyn Fn() -> bool + Send + Sync>;

fn not_cancelled() -> CancelCheck {
    Arc::new(|| false)
}

/// Async wrapper over a regular-file `Inode`, dispatching each operation to
/// a `VfsRuntime`. Cheap to construct per caller; cloning the channel shares
/// the same FIFO order lock and the same underlying inode.
pub struct AsyncFileChannel<R> {
    id: u64,
    inode: Arc<Inode>,
    runtime: Arc<R>,
    order: AsyncMutex<()>,
    closed: std::sync::atomic::AtomicBool,
}

impl<R: VfsRuntime> AsyncFileChannel<R> {
    pub fn open(inode: Arc<Inode>, runtime: Arc<R>) -> VfsResult<Self> {
        if !matches!(&*inode.content(), Content::Regular(_)) {
            return Err(errors::invalid_argument("async channel is not over a regular file"));
        }
        inode.open_handle();
        Ok(Self {
            id: vfs_mem::channel::next_channel_id(),
            inode,
            runtime,
            order: AsyncMutex::new(()),
            closed: std::sync::atomic::AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Submits `op` to the runtime behind this channel's FIFO order lock;
    /// `op` receives the cancellation check so it can bail out before
    /// touching the store.
    fn submit<T, F>(&self, cancelled: CancelCheck, op: F) -> impl Future<Output = VfsResult<T>> + '_
    where
        T: Send + 'static,
        F: FnOnce(&Inode, &CancelCheck) -> VfsResult<T> + Send + 'static,
    {
        let inode = self.inode.clone();
        let runtime = self.runtime.clone();
        let order = &self.order;
        async move {
            let _permit = order.lock().await;
            runtime.spawn_blocking(move || op(&inode, &cancelled)).await
        }
    }

    pub async fn read_at(&self, position: u64, len: usize) -> VfsResult<Vec<u8>> {
        self.read_at_cancellable(position, len, not_cancelled()).await
    }

    pub async fn read_at_cancellable(&self, position: u64, len: usize, cancelled: CancelCheck) -> VfsResult<Vec<u8>> {
        self.submit(cancelled, move |inode, cancelled| {
            if cancelled() {
                return Err(errors::interrupted("read cancelled before it began"));
            }
            match &*inode.content() {
                Content::Regular(store) => {
                    let mut buf = vec![0u8; len];
                    let n = store.read(position as usize, &mut buf);
                    buf.truncate(n);
                    inode.touch_access(now_millis());
                    Ok(buf)
                }
                _ => Err(errors::invalid_argument("async channel is not over a regular file")),
            }
        })
        .await
    }

    pub async fn write_at(&self, position: u64, data: Vec<u8>) -> VfsResult<usize> {
        self.write_at_cancellable(position, data, not_cancelled()).await
    }

    pub async fn write_at_cancellable(&self, position: u64, data: Vec<u8>, cancelled: CancelCheck) -> VfsResult<usize> {
        self.submit(cancelled, move |inode, cancelled| {
            if cancelled() {
                return Err(errors::interrupted("write cancelled before it began"));
            }
            match &*inode.content() {
                Content::Regular(store) => {
                    let n = store.write(position as usize, &data);
                    inode.touch_modified(now_millis());
                    Ok(n)
                }
                _ => Err(errors::invalid_argument("async channel is not over a regular file")),
            }
        })
        .await
    }

    pub async fn truncate(&self, len: usize) -> VfsResult<()> {
        self.truncate_cancellable(len, not_cancelled()).await
    }

    pub async fn truncate_cancellable(&self, len: usize, cancelled: CancelCheck) -> VfsResult<()> {
        self.submit(cancelled, move |inode, cancelled| {
            if cancelled() {
                return Err(errors::interrupted("truncate cancelled before it began"));
            }
            match &*inode.content() {
                Content::Regular(store) => {
                    store.truncate(len);
                    inode.touch_modified(now_millis());
                    Ok(())
                }
                _ => Err(errors::invalid_argument("async channel is not over a regular file")),
            }
        })
        .await
    }

    /// Non-blocking advisory lock, tracked on the backing inode exactly
    /// like `SeekableByteChannel`'s — the two channel types share the same
    /// lock table (§4.6).
    pub fn try_lock(&self, position: u64, size: u64, kind: LockKind) -> Option<LockGuard<'_>> {
        self.inode.locks().try_lock(position, size, kind, self.id)
    }

    pub fn close(&self) {
        if !self.closed.swap(true, std::sync::atomic::Ordering::AcqRel) {
            self.inode.close_handle();
        }
    }
}

impl<R> Drop for AsyncFileChannel<R> {
    fn drop(&mut self) {
        if !self.closed.swap(true, std::sync::atomic::Ordering::AcqRel) {
            self.inode.close_handle();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::InlineTestRuntime;
    use pretty_assertions::assert_eq;
    use vfs_mem::ByteStore;

    fn file() -> Arc<Inode> {
        Arc::new(Inode::new(1, Content::Regular(ByteStore::new(16)), now_millis()))
    }

    #[test]
    fn write_then_read_round_trip_at_explicit_positions() {
        let inode = file();
        let chan = AsyncFileChannel::open(inode, Arc::new(InlineTestRuntime)).unwrap();
        futures::executor::block_on(async {
            chan.write_at(0, b"hello".to_vec()).await.unwrap();
            let buf = chan.read_at(0, 5).await.unwrap();
            assert_eq!(buf, b"hello");
        });
    }

    #[test]
    fn cancelled_before_start_is_reported_without_touching_the_store() {
        let inode = file();
        let chan = AsyncFileChannel::open(inode, Arc::new(InlineTestRuntime)).unwrap();
        futures::executor::block_on(async {
            let err = chan
                .write_at_cancellable(0, b"hi".to_vec(), Arc::new(|| true))
                .await
                .unwrap_err();
            assert_eq!(err.kind(), vfs_core::VfsErrorKind::Interrupted);
            assert_eq!(chan.read_at(0, 2).await.unwrap(), vec![0, 0]);
        });
    }

    #[test]
    fn locks_are_visible_across_sync_and_async_channels_on_the_same_inode() {
        let inode = file();
        let sync_chan =
            vfs_mem::SeekableByteChannel::open(inode.clone(), vfs_core::flags::OpenFlags::READ | vfs_core::flags::OpenFlags::WRITE)
                .unwrap();
        let async_chan = AsyncFileChannel::open(inode, Arc::new(InlineTestRuntime)).unwrap();
        let guard = sync_chan.try_lock(0, 4, LockKind::Exclusive).unwrap();
        assert!(guard.is_some());
        assert!(async_chan.try_lock(0, 4, LockKind::Shared).is_none());
    }
}
