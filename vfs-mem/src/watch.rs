//! Polling directory watcher (§4.7).
//!
//! A single background thread holds weak references to every registered
//! key, diffs a fresh directory snapshot against the key's last snapshot on
//! each tick, and queues the resulting events. The thread starts on the
//! first `register` and stops when the last `WatchKey` handle is dropped
//! (or the service is closed) — `cancel()` marks a key invalid but does not
//! by itself release the `Arc` the worker holds a weak reference to.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use smallvec::SmallVec;
use tracing::{debug, trace, warn};
use vfs_core::error::{errors, VfsResult};
use vfs_core::path::{VfsName, VfsPathBuf};
use vfs_core::watch::{WatchEvent, WatchEventKind, WatchEvents, WatchModifiers};

use crate::inode::InodeId;
use crate::tree::FileTree;

const DEFAULT_QUEUE_CAPACITY: usize = 256;
const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyState {
    Ready,
    Signalled,
    Invalid,
}

type Snapshot = HashMap<VfsName, (i64, InodeId)>;

struct KeyInner {
    directory: InodeId,
    relative_root: VfsPathBuf,
    events: WatchEvents,
    _modifiers: WatchModifiers,
    queue: Mutex<(Vec<WatchEvent>, KeyState)>,
    condvar: Condvar,
    last_snapshot: Mutex<Option<Snapshot>>,
}

/// A registration handle. Cloning shares the same underlying queue; the
/// background poller and every `WatchKey` clone observe the same state.
#[derive(Clone)]
pub struct WatchKey {
    inner: Arc<KeyInner>,
}

impl WatchKey {
    pub fn state(&self) -> KeyState {
        self.inner.queue.lock().1
    }

    /// Pops all currently queued events without blocking.
    pub fn poll(&self) -> Vec<WatchEvent> {
        let mut guard = self.inner.queue.lock();
        std::mem::take(&mut guard.0)
    }

    /// Blocks until at least one event is queued or the key becomes
    /// invalid, then returns the queued batch.
    pub fn take(&self) -> VfsResult<Vec<WatchEvent>> {
        let mut guard = self.inner.queue.lock();
        loop {
            if guard.1 == KeyState::Invalid {
                return Err(errors::closed_service("watch service closed"));
            }
            if !guard.0.is_empty() {
                return Ok(std::mem::take(&mut guard.0));
            }
            self.inner.condvar.wait_for(&mut guard, POLL_INTERVAL);
        }
    }

    /// SIGNALLED → READY; re-queues with the service if events accumulated
    /// while this call was in flight. Returns `false` if the key is
    /// already `Invalid`.
    pub fn reset(&self) -> bool {
        let mut guard = self.inner.queue.lock();
        if guard.1 == KeyState::Invalid {
            return false;
        }
        guard.1 = if guard.0.is_empty() { KeyState::Ready } else { KeyState::Signalled };
        true
    }

    pub fn cancel(&self) {
        let mut guard = self.inner.queue.lock();
        guard.1 = KeyState::Invalid;
        drop(guard);
        self.inner.condvar.notify_all();
        debug!(directory = self.inner.directory, "watch key cancelled");
    }
}

struct ServiceInner {
    keys: Mutex<Vec<Weak<KeyInner>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

static NEXT_KEY_ID: AtomicU64 = AtomicU64::new(1);

/// Owns the background poller lifecycle; `register` starts the thread
/// lazily, `close` tears it down.
pub struct WatchService {
    inner: Arc<ServiceInner>,
    tree: Weak<FileTree>,
}

impl WatchService {
    pub fn new(tree: Weak<FileTree>) -> Self {
        Self {
            inner: Arc::new(ServiceInner {
                keys: Mutex::new(Vec::new()),
                worker: Mutex::new(None),
                closed: AtomicBool::new(false),
            }),
            tree,
        }
    }

    pub fn register(&self, directory: InodeId, events: WatchEvents, modifiers: WatchModifiers) -> VfsResult<WatchKey> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(errors::closed_service("watch service closed"));
        }
        let _ = NEXT_KEY_ID.fetch_add(1, Ordering::Relaxed);
        // Seed the baseline snapshot now, synchronously, rather than on the
        // first poll tick: otherwise a create/delete/modify that happens
        // between `register` returning and the worker's first tick would be
        // absorbed into that tick's "initial" snapshot and never reported.
        let initial = self
            .tree
            .upgrade()
            .and_then(|tree| snapshot_of(&tree, directory).ok());
        let inner = Arc::new(KeyInner {
            directory,
            relative_root: VfsPathBuf::from_parts(None, Vec::new()),
            events,
            _modifiers: modifiers,
            queue: Mutex::new((Vec::new(), KeyState::Ready)),
            condvar: Condvar::new(),
            last_snapshot: Mutex::new(initial),
        });

        let mut keys = self.inner.keys.lock();
        keys.retain(|k| k.strong_count() > 0);
        keys.push(Arc::downgrade(&inner));
        let was_empty_before = keys.len() == 1;
        drop(keys);

        if was_empty_before {
            self.start_worker();
        }

        debug!(directory, "watch key registered");
        Ok(WatchKey { inner })
    }

    fn start_worker(&self) {
        let mut worker = self.inner.worker.lock();
        if worker.is_some() {
            return;
        }
        debug!("starting watch poll worker");
        let inner = self.inner.clone();
        let tree = self.tree.clone();
        *worker = Some(std::thread::spawn(move || poll_loop(inner, tree)));
    }

    pub fn close(&self) {
        debug!("closing watch service");
        self.inner.closed.store(true, Ordering::Release);
        let keys = self.inner.keys.lock();
        for weak in keys.iter() {
            if let Some(key) = weak.upgrade() {
                let mut guard = key.queue.lock();
                guard.1 = KeyState::Invalid;
                drop(guard);
                key.condvar.notify_all();
            }
        }
        drop(keys);
        if let Some(handle) = self.inner.worker.lock().take() {
            let _ = handle.join();
        }
    }
}

impl Drop for WatchService {
    fn drop(&mut self) {
        self.close();
    }
}

fn snapshot_of(tree: &FileTree, directory: InodeId) -> VfsResult<Snapshot> {
    let inode = tree.inode(directory)?;
    let content = inode.content();
    let dt = content.as_directory().ok_or_else(|| errors::not_a_directory("watched path is not a directory"))?;
    let mut snap = Snapshot::new();
    for (name, id) in dt.entries() {
        if let Ok(child) = tree.inode(id) {
            snap.insert(name, (child.last_modified_time(), id));
        }
    }
    Ok(snap)
}

fn diff_into_queue(key: &KeyInner, old: &Snapshot, new: &Snapshot) {
    let mut created: SmallVec<[VfsName; 4]> = SmallVec::new();
    let mut deleted: SmallVec<[VfsName; 4]> = SmallVec::new();
    let mut modified: SmallVec<[VfsName; 4]> = SmallVec::new();

    for (name, value) in new {
        match old.get(name) {
            None => created.push(name.clone()),
            Some(old_value) if old_value != value => modified.push(name.clone()),
            _ => {}
        }
    }
    for name in old.keys() {
        if !new.contains_key(name) {
            deleted.push(name.clone());
        }
    }

    let mut guard = key.queue.lock();
    let (queue, state) = &mut *guard;
    let mut push = |kind: WatchEventKind, name: &VfsName| {
        if queue.len() >= DEFAULT_QUEUE_CAPACITY {
            queue.truncate(DEFAULT_QUEUE_CAPACITY - 1);
            queue.push(WatchEvent::overflow(1));
            warn!(directory = key.directory, capacity = DEFAULT_QUEUE_CAPACITY, "watch queue overflowed");
            return;
        }
        queue.push(WatchEvent {
            kind,
            count: 1,
            relative_path: VfsPathBuf::from_parts(None, vec![name.clone()]),
        });
    };
    if key.events.contains(WatchEvents::CREATE) {
        for n in &created {
            push(WatchEventKind::Create, n);
        }
    }
    if key.events.contains(WatchEvents::DELETE) {
        for n in &deleted {
            push(WatchEventKind::Delete, n);
        }
    }
    if key.events.contains(WatchEvents::MODIFY) {
        for n in &modified {
            push(WatchEventKind::Modify, n);
        }
    }
    if !queue.is_empty() && *state == KeyState::Ready {
        *state = KeyState::Signalled;
        trace!(directory = key.directory, "watch key READY -> SIGNALLED");
    }
    drop(guard);
    key.condvar.notify_all();
}

fn poll_loop(service: Arc<ServiceInner>, tree: Weak<FileTree>) {
    loop {
        std::thread::sleep(POLL_INTERVAL);
        if service.closed.load(Ordering::Acquire) {
            return;
        }
        let Some(tree) = tree.upgrade() else { return };

        let mut keys = service.keys.lock();
        keys.retain(|k| k.strong_count() > 0);
        if keys.is_empty() {
            debug!("watch poll worker stopping: no live keys");
            service.worker.lock().take();
            return;
        }
        let live: Vec<Arc<KeyInner>> = keys.iter().filter_map(|w| w.upgrade()).collect();
        drop(keys);
        trace!(count = live.len(), "watch poll tick");

        for key in live {
            let new_snapshot = match snapshot_of(&tree, key.directory) {
                Ok(s) => s,
                Err(_) => {
                    key.queue.lock().1 = KeyState::Invalid;
                    warn!(directory = key.directory, "watched directory became invalid");
                    continue;
                }
            };
            let mut last = key.last_snapshot.lock();
            if let Some(old) = last.as_ref() {
                diff_into_queue(&key, old, &new_snapshot);
            }
            *last = Some(new_snapshot);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attrs::{standard_providers, AttributeService};
    use vfs_core::flags::FileKind;
    use vfs_core::path::VfsPathBuf as P;

    fn tree() -> Arc<FileTree> {
        Arc::new(FileTree::new(&["/"], 64, AttributeService::new(standard_providers(&[], "root", "root"))))
    }

    #[test]
    fn register_increments_and_register_of_same_directory_does_not_duplicate_thread() {
        let t = tree();
        let service = WatchService::new(Arc::downgrade(&t));
        let dir = t.lookup(&P::new(b"/"), vfs_core::flags::LinkHandling::Follow).unwrap();
        let key1 = service.register(dir, WatchEvents::CREATE, WatchModifiers::default()).unwrap();
        let key2 = service.register(dir, WatchEvents::CREATE, WatchModifiers::default()).unwrap();
        assert_eq!(key1.state(), KeyState::Ready);
        assert_eq!(key2.state(), KeyState::Ready);
        service.close();
    }

    #[test]
    fn cancel_marks_key_invalid() {
        let t = tree();
        let service = WatchService::new(Arc::downgrade(&t));
        let dir = t.lookup(&P::new(b"/"), vfs_core::flags::LinkHandling::Follow).unwrap();
        let key = service.register(dir, WatchEvents::CREATE, WatchModifiers::default()).unwrap();
        key.cancel();
        assert_eq!(key.state(), KeyState::Invalid);
        service.close();
    }

    #[test]
    fn diff_detects_create_and_delete() {
        let t = tree();
        let dir = t.lookup(&P::new(b"/"), vfs_core::flags::LinkHandling::Follow).unwrap();
        let key_inner = Arc::new(KeyInner {
            directory: dir,
            relative_root: P::from_parts(None, Vec::new()),
            events: WatchEvents::CREATE | WatchEvents::DELETE,
            _modifiers: WatchModifiers::default(),
            queue: Mutex::new((Vec::new(), KeyState::Ready)),
            condvar: Condvar::new(),
            last_snapshot: Mutex::new(None),
        });
        let old: Snapshot = Snapshot::new();
        t.create(&P::new(b"/a"), FileKind::Regular, None, &[]).unwrap();
        let new = snapshot_of(&t, dir).unwrap();
        diff_into_queue(&key_inner, &old, &new);
        let events = key_inner.queue.lock().0.clone();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, WatchEventKind::Create);
    }
}
