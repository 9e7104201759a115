use std::sync::Arc;

use vfs_core::flags::{
    CopyOptions, CreateOptions, DeleteMode, FileKind, OpenFlags, OpenOptions, ResolveFlags,
};
use vfs_core::path::VfsPathBuf;
use vfs_core::{VfsErrorKind, VfsResult};
use vfs_mem::{MemFs, MemFsConfig};

fn view() -> vfs_mem::FileSystemView {
    let fs = Arc::new(MemFs::new(MemFsConfig::default()).expect("new fs"));
    fs.open_view(VfsPathBuf::new(b"/"))
}

fn p(s: &str) -> VfsPathBuf {
    VfsPathBuf::new(s.as_bytes())
}

fn assert_err_kind<T>(result: VfsResult<T>, kind: VfsErrorKind) {
    match result {
        Ok(_) => panic!("expected error"),
        Err(err) => assert_eq!(err.kind(), kind),
    }
}

fn open_rw() -> OpenOptions {
    OpenOptions {
        flags: OpenFlags::READ | OpenFlags::WRITE,
        ..Default::default()
    }
}

#[test]
fn file_crud_roundtrip() {
    let v = view();
    let options = OpenOptions {
        flags: OpenFlags::READ | OpenFlags::WRITE | OpenFlags::CREATE | OpenFlags::CREATE_NEW,
        ..Default::default()
    };
    let chan = v.open_channel(&p("/file"), &options).expect("open");
    chan.write(b"hello").expect("write");
    chan.truncate(2).expect("truncate");
    assert_eq!(chan.size().expect("size"), 2);
}

#[test]
fn directory_listing_reflects_creation_order() {
    let v = view();
    v.create(&p("/dir"), FileKind::Directory, &CreateOptions::default()).unwrap();
    v.create(&p("/dir/b"), FileKind::Regular, &CreateOptions::default()).unwrap();
    v.create(&p("/dir/a"), FileKind::Regular, &CreateOptions::default()).unwrap();
    v.create(&p("/dir/c"), FileKind::Regular, &CreateOptions::default()).unwrap();

    let stream = v.new_directory_stream(&p("/dir"), None).unwrap();
    let entries = stream.iterator().unwrap();
    let names: Vec<String> = entries.iter().map(|e| e.to_string()).collect();
    assert_eq!(names, vec!["/dir/b", "/dir/a", "/dir/c"]);
}

#[test]
fn rename_refuses_to_replace_without_the_flag_and_succeeds_with_it() {
    let v = view();
    v.create(&p("/a"), FileKind::Regular, &CreateOptions::default()).unwrap();
    v.create(&p("/b"), FileKind::Regular, &CreateOptions::default()).unwrap();

    assert_err_kind(v.move_(&p("/a"), &p("/b"), CopyOptions::empty()), VfsErrorKind::AlreadyExists);

    v.move_(&p("/a"), &p("/b"), CopyOptions::REPLACE_EXISTING).unwrap();
    assert_err_kind(v.lookup(&p("/a"), ResolveFlags::empty()), VfsErrorKind::NotFound);
    assert!(v.lookup(&p("/b"), ResolveFlags::empty()).is_ok());
}

#[test]
fn symlink_roundtrip_and_loop_detection() {
    let v = view();
    v.symlink(&p("/link"), &p("/target"), &[]).unwrap();
    assert_eq!(v.read_symlink(&p("/link")).unwrap().to_string(), "/target");

    v.symlink(&p("/cycle-a"), &p("/cycle-b"), &[]).unwrap();
    v.symlink(&p("/cycle-b"), &p("/cycle-a"), &[]).unwrap();
    assert_err_kind(v.lookup(&p("/cycle-a"), ResolveFlags::empty()), VfsErrorKind::Loop);
}

#[test]
fn hardlink_and_unlink_lifetime() {
    let v = view();
    v.create(&p("/file"), FileKind::Regular, &CreateOptions::default()).unwrap();
    let chan = v.open_channel(&p("/file"), &open_rw()).unwrap();
    chan.write(b"data").unwrap();

    v.link(&p("/file2"), &p("/file")).unwrap();
    let inode = v.lookup(&p("/file"), ResolveFlags::empty()).unwrap();
    assert_eq!(inode.links(), 2);

    v.delete(&p("/file"), DeleteMode::Any).unwrap();
    assert_err_kind(v.lookup(&p("/file"), ResolveFlags::empty()), VfsErrorKind::NotFound);

    let inode2 = v.lookup(&p("/file2"), ResolveFlags::empty()).unwrap();
    assert_eq!(inode2.links(), 1);

    // The open channel keeps the content alive even after both names are gone.
    v.delete(&p("/file2"), DeleteMode::Any).unwrap();
    chan.seek(0).unwrap();
    let mut buf = [0u8; 4];
    chan.read(&mut buf).unwrap();
    assert_eq!(&buf, b"data");
}

#[test]
fn deleting_a_non_empty_directory_fails() {
    let v = view();
    v.create(&p("/dir"), FileKind::Directory, &CreateOptions::default()).unwrap();
    v.create(&p("/dir/child"), FileKind::Regular, &CreateOptions::default()).unwrap();
    assert_err_kind(v.delete(&p("/dir"), DeleteMode::Any), VfsErrorKind::DirectoryNotEmpty);
}

#[test]
fn watch_service_observes_a_create_within_a_registered_directory() {
    let v = view();
    v.create(&p("/watched"), FileKind::Directory, &CreateOptions::default()).unwrap();
    let key = v
        .register(&p("/watched"), vfs_core::watch::WatchEvents::CREATE, vfs_core::watch::WatchModifiers::default())
        .unwrap();

    v.create(&p("/watched/x"), FileKind::Regular, &CreateOptions::default()).unwrap();

    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
    let mut events = Vec::new();
    while events.is_empty() && std::time::Instant::now() < deadline {
        events = key.poll();
        if events.is_empty() {
            std::thread::sleep(std::time::Duration::from_millis(20));
        }
    }
    assert!(events
        .iter()
        .any(|e| e.kind == vfs_core::watch::WatchEventKind::Create && e.relative_path.to_string() == "x"));
}
