use vfs_core::path::{UnixPathType, WindowsPathType};
use vfs_core::path_service::PathService;
use vfs_core::{VfsErrorKind, VfsResult};

fn assert_err_kind<T>(result: VfsResult<T>, kind: VfsErrorKind) {
    match result {
        Ok(_) => panic!("expected error"),
        Err(err) => assert_eq!(err.kind(), kind),
    }
}

#[test]
fn unix_path_service_parses_and_formats_round_trip() {
    let svc = PathService::new(Box::new(UnixPathType), Vec::new());
    let p = svc.parse("/a/b/../c", &[]).unwrap();
    assert_eq!(svc.format(&p.normalize()), "/a/c");
}

#[test]
fn windows_path_service_rejects_drive_relative_paths() {
    let svc = PathService::new(Box::new(WindowsPathType), Vec::new());
    assert_err_kind(svc.parse("C:relative", &[]), VfsErrorKind::InvalidPath);
}

#[test]
fn windows_path_service_accepts_unc_roots() {
    let svc = PathService::new(Box::new(WindowsPathType), Vec::new());
    let p = svc.parse(r"\\host\share\dir\file.txt", &[]).unwrap();
    assert_eq!(svc.format(&p), r"\\host\share\dir\file.txt");
}

#[test]
fn glob_star_does_not_cross_a_separator() {
    let svc = PathService::new(Box::new(UnixPathType), Vec::new());
    assert!(svc.matches("/a/*.txt", "/a/b.txt").unwrap());
    assert!(!svc.matches("/a/*.txt", "/a/b/c.txt").unwrap());
}

#[test]
fn glob_double_star_matches_any_depth() {
    let svc = PathService::new(Box::new(UnixPathType), Vec::new());
    assert!(svc.matches("**/*.ext", "/a/b/c.ext").unwrap());
    assert!(svc.matches("**/*.ext", "/c.ext").unwrap());
    assert!(!svc.matches("**/*.ext", "/c.txt").unwrap());
}

#[test]
fn glob_brace_alternation_and_character_class() {
    let svc = PathService::new(Box::new(UnixPathType), Vec::new());
    assert!(svc.matches("/a.{txt,md}", "/a.txt").unwrap());
    assert!(svc.matches("/a.{txt,md}", "/a.md").unwrap());
    assert!(!svc.matches("/a.{txt,md}", "/a.rs").unwrap());

    assert!(svc.matches("/[!a]b", "/cb").unwrap());
    assert!(!svc.matches("/[!a]b", "/ab").unwrap());
}

#[test]
fn regex_prefix_passes_through_to_the_host_engine() {
    let svc = PathService::new(Box::new(UnixPathType), Vec::new());
    assert!(svc.matches(r"regex:^/a/\d+$", "/a/123").unwrap());
    assert!(!svc.matches(r"regex:^/a/\d+$", "/a/x").unwrap());
}

#[test]
fn relativize_then_resolve_recovers_the_original_path() {
    let svc = PathService::new(Box::new(UnixPathType), Vec::new());
    let a = svc.parse("/a/b", &[]).unwrap();
    let b = svc.parse("/a/c/d", &[]).unwrap();
    let rel = a.relativize(&b).unwrap();
    assert_eq!(a.resolve(&rel).normalize().to_string(), b.normalize().to_string());
}
