use std::sync::Arc;

use vfs_core::flags::{CreateOptions, FileKind, ResolveFlags};
use vfs_core::path::VfsPathBuf;
use vfs_mem::{MemFs, MemFsConfig};
use vfs_rt::{AsyncFileChannel, InlineTestRuntime};

fn p(s: &str) -> VfsPathBuf {
    VfsPathBuf::new(s.as_bytes())
}

#[test]
fn async_channel_reads_back_what_it_wrote_at_an_explicit_position() {
    let fs = Arc::new(MemFs::new(MemFsConfig::default()).expect("new fs"));
    let v = fs.open_view(p("/"));
    v.create(&p("/file"), FileKind::Regular, &CreateOptions::default()).unwrap();
    let inode = v.lookup(&p("/file"), ResolveFlags::empty()).unwrap();

    let chan = AsyncFileChannel::open(inode, Arc::new(InlineTestRuntime)).unwrap();
    futures::executor::block_on(async {
        chan.write_at(0, b"hello world".to_vec()).await.unwrap();
        let buf = chan.read_at(6, 5).await.unwrap();
        assert_eq!(buf, b"world");
    });
}

#[test]
fn closing_twice_does_not_double_release_the_open_handle() {
    let fs = Arc::new(MemFs::new(MemFsConfig::default()).expect("new fs"));
    let v = fs.open_view(p("/"));
    v.create(&p("/file"), FileKind::Regular, &CreateOptions::default()).unwrap();
    let inode = v.lookup(&p("/file"), ResolveFlags::empty()).unwrap();

    assert_eq!(inode.open_handles(), 0);
    let chan = AsyncFileChannel::open(inode.clone(), Arc::new(InlineTestRuntime)).unwrap();
    assert_eq!(inode.open_handles(), 1);
    chan.close();
    chan.close();
    drop(chan);
    assert_eq!(inode.open_handles(), 0);
}
