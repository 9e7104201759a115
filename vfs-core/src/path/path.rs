use std::fmt;

use crate::error::{errors, VfsResult};
use crate::path::name::{Normalizer, VfsName};

/// An immutable sequence of path components with an optional root.
///
/// `VfsPath` is the low-level value type: it does not know about Unix vs
/// Windows separator grammar (that is `PathType`'s job, invoked through
/// `PathService`) and performs no canonicalization of its own beyond what is
/// handed to it in already-built `VfsName`s. Absolute iff `root` is `Some`.
#[derive(Debug, Clone)]
pub struct VfsPath {
    root: Option<String>,
    names: Vec<VfsName>,
}

impl VfsPath {
    pub fn from_parts(root: Option<String>, names: Vec<VfsName>) -> Self {
        Self { root, names }
    }

    /// Low-level constructor splitting on `/` with no other canonicalization.
    /// Intended for internal callers (tests, trait default impls); façade
    /// code should go through `PathService::parse` for locale-correct
    /// parsing of user-supplied paths.
    pub fn new(raw: impl AsRef<[u8]>) -> Self {
        let raw = String::from_utf8_lossy(raw.as_ref()).into_owned();
        let root = raw.starts_with('/').then(|| "/".to_string());
        let names = raw
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| VfsName::raw(s).expect("split on separator cannot produce empty segment"))
            .collect();
        Self { root, names }
    }

    pub fn root(&self) -> Option<&str> {
        self.root.as_deref()
    }

    pub fn is_absolute(&self) -> bool {
        self.root.is_some()
    }

    pub fn name_count(&self) -> usize {
        self.names.len()
    }

    pub fn get_name(&self, index: usize) -> Option<&VfsName> {
        self.names.get(index)
    }

    pub fn names(&self) -> &[VfsName] {
        &self.names
    }

    pub fn file_name(&self) -> Option<&VfsName> {
        self.names.last()
    }

    pub fn subpath(&self, begin: usize, end: usize) -> VfsResult<VfsPath> {
        if begin > end || end > self.names.len() {
            return Err(errors::invalid_argument("subpath range out of bounds"));
        }
        Ok(VfsPath {
            root: None,
            names: self.names[begin..end].to_vec(),
        })
    }

    pub fn parent(&self) -> Option<VfsPath> {
        if self.names.is_empty() {
            return None;
        }
        Some(VfsPath {
            root: self.root.clone(),
            names: self.names[..self.names.len() - 1].to_vec(),
        })
    }

    /// Collapses `.` and `..` components. For an absolute path, a leading
    /// `..` beyond the root is dropped rather than escaping the root, so
    /// `normalize(normalize(p)) == normalize(p)` always holds.
    pub fn normalize(&self) -> VfsPath {
        let mut out: Vec<VfsName> = Vec::with_capacity(self.names.len());
        for name in &self.names {
            if name.is_current() {
                continue;
            }
            if name.is_parent() {
                match out.last() {
                    Some(last) if !last.is_parent() => {
                        out.pop();
                    }
                    _ if self.root.is_none() => out.push(name.clone()),
                    _ => { /* absolute: drop, cannot escape root */ }
                }
                continue;
            }
            out.push(name.clone());
        }
        VfsPath {
            root: self.root.clone(),
            names: out,
        }
    }

    /// `self.resolve(other)`: if `other` is absolute, returns `other`;
    /// otherwise appends `other`'s names to `self`.
    pub fn resolve(&self, other: &VfsPath) -> VfsPath {
        if other.is_absolute() {
            return other.clone();
        }
        let mut names = self.names.clone();
        names.extend(other.names.iter().cloned());
        VfsPath {
            root: self.root.clone(),
            names,
        }
    }

    pub fn resolve_sibling(&self, other: &VfsPath) -> VfsPath {
        match self.parent() {
            Some(parent) => parent.resolve(other),
            None => other.clone(),
        }
    }

    /// `a.resolve(a.relativize(b)).normalize() == b.normalize()` when both
    /// are absolute under the same root (or both relative).
    pub fn relativize(&self, other: &VfsPath) -> VfsResult<VfsPath> {
        if self.is_absolute() != other.is_absolute() {
            return Err(errors::invalid_argument(
                "cannot relativize paths of different kind (absolute vs relative)",
            ));
        }
        if self.is_absolute() && self.root != other.root {
            return Err(errors::invalid_argument(
                "cannot relativize paths with different roots",
            ));
        }
        let a = self.normalize();
        let b = other.normalize();
        let common = a
            .names
            .iter()
            .zip(b.names.iter())
            .take_while(|(x, y)| x == y)
            .count();
        let mut names = Vec::new();
        for _ in common..a.names.len() {
            names.push(VfsName::raw("..").expect(".. is always valid"));
        }
        names.extend(b.names[common..].iter().cloned());
        Ok(VfsPath { root: None, names })
    }

    pub fn starts_with(&self, other: &VfsPath) -> bool {
        if self.root != other.root {
            return false;
        }
        if other.names.len() > self.names.len() {
            return false;
        }
        self.names
            .iter()
            .zip(other.names.iter())
            .all(|(a, b)| a == b)
    }

    pub fn ends_with(&self, other: &VfsPath) -> bool {
        if other.is_absolute() && self.root != other.root {
            return false;
        }
        if other.names.len() > self.names.len() {
            return false;
        }
        let offset = self.names.len() - other.names.len();
        self.names[offset..]
            .iter()
            .zip(other.names.iter())
            .all(|(a, b)| a == b)
    }

    pub fn with_canonicalization(&self, normalizers: &[Normalizer]) -> VfsResult<VfsPath> {
        let names = self
            .names
            .iter()
            .map(|n| VfsName::new(n.display().to_string(), normalizers))
            .collect::<VfsResult<Vec<_>>>()?;
        Ok(VfsPath {
            root: self.root.clone(),
            names,
        })
    }
}

impl PartialEq for VfsPath {
    fn eq(&self, other: &Self) -> bool {
        self.root == other.root && self.names == other.names
    }
}
impl Eq for VfsPath {}

impl fmt::Display for VfsPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(root) = &self.root {
            f.write_str(root)?;
        }
        for (i, name) in self.names.iter().enumerate() {
            if i > 0 || self.root.is_none() {
                if i > 0 {
                    f.write_str("/")?;
                }
            }
            write!(f, "{name}")?;
        }
        Ok(())
    }
}

/// Alias kept distinct from `VfsPath` at call sites that want to signal "an
/// owned, possibly-being-built path" in line with the distilled spec's
/// `Path`/`PathBuf` split; both are the same owned representation here since
/// the CORE never hands out a borrowed path view.
pub type VfsPathBuf = VfsPath;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn normalize_collapses_dot_and_dotdot() {
        let p = VfsPath::new(b"/a/./b/../c");
        assert_eq!(p.normalize().to_string(), "/a/c");
    }

    #[test]
    fn normalize_is_idempotent() {
        let p = VfsPath::new(b"/a/../../b");
        assert_eq!(p.normalize().normalize(), p.normalize());
    }

    #[test]
    fn normalize_does_not_escape_root() {
        let p = VfsPath::new(b"/../../a");
        assert_eq!(p.normalize().to_string(), "/a");
    }

    #[test]
    fn relativize_then_resolve_round_trips() {
        let a = VfsPath::new(b"/a/b");
        let b = VfsPath::new(b"/a/c/d");
        let rel = a.relativize(&b).unwrap();
        assert_eq!(a.resolve(&rel).normalize().to_string(), b.normalize().to_string());
    }

    #[test]
    fn starts_with_is_component_wise() {
        let p = VfsPath::new(b"/foobar/baz");
        let prefix = VfsPath::new(b"/foo");
        assert!(!p.starts_with(&prefix));
        let prefix2 = VfsPath::new(b"/foobar");
        assert!(p.starts_with(&prefix2));
    }
}
