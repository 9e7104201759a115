use crate::error::{errors, VfsResult};
use crate::path::name::VfsName;
use crate::path::path::VfsPath;

/// A parsing/formatting strategy for one path grammar flavor.
///
/// Mirrors the distilled spec's jimfs-derived `PathType` abstraction: the
/// CORE is agnostic to which flavor a given `FileTree` uses, it only ever
/// calls through this trait.
pub trait PathType: Send + Sync {
    /// Identifies the root substring (if any) and splits the remainder into
    /// raw name strings, in order, dropping empty segments.
    fn parse_raw(&self, raw: &str) -> VfsResult<(Option<String>, Vec<String>)>;

    fn format(&self, path: &VfsPath) -> String;

    fn is_separator(&self, c: char) -> bool;
}

fn build_path(
    root: Option<String>,
    names: Vec<String>,
) -> VfsResult<VfsPath> {
    let names = names
        .into_iter()
        .map(VfsName::raw)
        .collect::<VfsResult<Vec<_>>>()?;
    Ok(VfsPath::from_parts(root, names))
}

/// Unix grammar: separator `/`, single root string `/`, no reserved
/// characters except NUL (already rejected by `VfsName::new`).
#[derive(Debug, Default, Clone, Copy)]
pub struct UnixPathType;

impl PathType for UnixPathType {
    fn parse_raw(&self, raw: &str) -> VfsResult<(Option<String>, Vec<String>)> {
        let root = raw.starts_with('/').then(|| "/".to_string());
        let body = root.as_ref().map_or(raw, |r| &raw[r.len()..]);
        let names = body
            .split('/')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        Ok((root, names))
    }

    fn format(&self, path: &VfsPath) -> String {
        let mut out = String::new();
        if let Some(root) = path.root() {
            out.push_str(root);
        }
        for (i, name) in path.names().iter().enumerate() {
            if i > 0 {
                out.push('/');
            }
            out.push_str(name.display());
        }
        out
    }

    fn is_separator(&self, c: char) -> bool {
        c == '/'
    }
}

/// Windows grammar: canonical separator `\`, `/` also accepted; roots are
/// `X:\` (drive) or `\\host\share\` (UNC); reserved characters
/// `<>:"|?*` and control codes 0..31; trailing spaces before a separator are
/// illegal; `X:relative` (drive-relative, no separator after the colon) is
/// rejected because this CORE has no per-drive working directory concept.
#[derive(Debug, Default, Clone, Copy)]
pub struct WindowsPathType;

const RESERVED: &[char] = &['<', '>', ':', '"', '|', '?', '*'];

impl WindowsPathType {
    fn validate_chars(&self, s: &str) -> VfsResult<()> {
        for c in s.chars() {
            if (c as u32) < 32 || RESERVED.contains(&c) {
                return Err(errors::invalid_path(format!(
                    "reserved character {c:?} in path component"
                )));
            }
        }
        Ok(())
    }

    fn split_root(&self, raw: &str) -> VfsResult<(Option<String>, &str)> {
        if let Some(rest) = raw.strip_prefix(r"\\") {
            // UNC: \\host\share\...
            let mut parts = rest.splitn(3, |c| c == '\\' || c == '/');
            let host = parts.next().filter(|s| !s.is_empty());
            let share = parts.next().filter(|s| !s.is_empty());
            let (host, share) = match (host, share) {
                (Some(h), Some(s)) => (h, s),
                _ => return Err(errors::invalid_path("malformed UNC root")),
            };
            let root = format!(r"\\{host}\{share}\");
            let remainder = parts.next().unwrap_or("");
            return Ok((Some(root), remainder));
        }
        let bytes = raw.as_bytes();
        if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
            let drive = &raw[..2];
            if let Some(rest) = raw[2..].strip_prefix(['\\', '/']) {
                return Ok((Some(format!(r"{drive}\")), rest));
            }
            if raw[2..].is_empty() {
                return Ok((Some(format!(r"{drive}\")), ""));
            }
            return Err(errors::invalid_path(format!(
                "drive-relative path not supported: {raw:?}"
            )));
        }
        Ok((None, raw))
    }
}

impl PathType for WindowsPathType {
    fn parse_raw(&self, raw: &str) -> VfsResult<(Option<String>, Vec<String>)> {
        self.validate_chars(raw)?;
        let (root, body) = self.split_root(raw)?;
        let mut names = Vec::new();
        for seg in body.split(['\\', '/']).filter(|s| !s.is_empty()) {
            if seg.ends_with(' ') {
                return Err(errors::invalid_path(format!(
                    "trailing space before separator in {raw:?}"
                )));
            }
            names.push(seg.to_string());
        }
        Ok((root, names))
    }

    fn format(&self, path: &VfsPath) -> String {
        let mut out = String::new();
        if let Some(root) = path.root() {
            out.push_str(root);
        }
        for (i, name) in path.names().iter().enumerate() {
            if i > 0 {
                out.push('\\');
            }
            out.push_str(name.display());
        }
        out
    }

    fn is_separator(&self, c: char) -> bool {
        c == '\\' || c == '/'
    }
}

/// Parses `raw` with `pt`, building a `VfsName` for each segment (no
/// canonicalization; callers that need canonicalized names go through
/// `PathService`).
pub fn parse_with(pt: &dyn PathType, raw: &str) -> VfsResult<VfsPath> {
    let (root, names) = pt.parse_raw(raw)?;
    build_path(root, names)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unix_parses_absolute_path() {
        let p = parse_with(&UnixPathType, "/a/b/c").unwrap();
        assert!(p.is_absolute());
        assert_eq!(p.name_count(), 3);
        assert_eq!(UnixPathType.format(&p), "/a/b/c");
    }

    #[test]
    fn unix_relative_path_has_no_root() {
        let p = parse_with(&UnixPathType, "a/b").unwrap();
        assert!(!p.is_absolute());
    }

    #[test]
    fn windows_drive_root() {
        let p = parse_with(&WindowsPathType, r"C:\a\b").unwrap();
        assert_eq!(p.root(), Some(r"C:\"));
        assert_eq!(p.name_count(), 2);
        assert_eq!(WindowsPathType.format(&p), r"C:\a\b");
    }

    #[test]
    fn windows_accepts_forward_slash() {
        let p = parse_with(&WindowsPathType, "C:/a/b").unwrap();
        assert_eq!(p.root(), Some(r"C:\"));
    }

    #[test]
    fn windows_unc_root() {
        let p = parse_with(&WindowsPathType, r"\\host\share\dir").unwrap();
        assert_eq!(p.root(), Some(r"\\host\share\"));
        assert_eq!(p.name_count(), 1);
    }

    #[test]
    fn windows_rejects_drive_relative() {
        assert!(parse_with(&WindowsPathType, "C:a").is_err());
    }

    #[test]
    fn windows_rejects_reserved_char() {
        assert!(parse_with(&WindowsPathType, r"C:\a<b").is_err());
    }

    #[test]
    fn windows_rejects_trailing_space_segment() {
        assert!(parse_with(&WindowsPathType, r"C:\a \b").is_err());
    }
}
