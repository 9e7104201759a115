use std::fmt;
use std::hash::{Hash, Hasher};

use crate::error::{errors, VfsResult};

/// A single path component: a canonical string used for equality/hashing,
/// and the original display string preserved verbatim.
///
/// `.` and `..` are distinguished, globally-unique singleton names
/// regardless of any configured canonicalization — two names both spelled
/// `.` are always equal, and never equal to anything normalization would
/// otherwise fold them into.
#[derive(Debug, Clone)]
pub struct VfsName {
    display: String,
    canonical: String,
}

/// One step of name canonicalization, composed in configuration order.
pub type Normalizer = fn(&str) -> String;

pub fn nfc(s: &str) -> String {
    // Byte-identity placeholder: true NFC requires a Unicode normalization
    // table this crate does not vendor. Callers needing true NFC/NFD/NFKC
    // behavior supply their own `Normalizer`.
    s.to_string()
}

pub fn case_fold_ascii(s: &str) -> String {
    s.to_ascii_lowercase()
}

pub fn case_fold_unicode(s: &str) -> String {
    s.to_lowercase()
}

impl VfsName {
    pub const CURRENT: &'static str = ".";
    pub const PARENT: &'static str = "..";

    /// Builds a name, rejecting the empty string and embedded NUL bytes.
    pub fn new(display: impl Into<String>, normalizers: &[Normalizer]) -> VfsResult<Self> {
        let display = display.into();
        if display.is_empty() {
            return Err(errors::invalid_path("empty path component"));
        }
        if display.contains('\0') {
            return Err(errors::invalid_path(display));
        }
        let canonical = if display == Self::CURRENT || display == Self::PARENT {
            display.clone()
        } else {
            normalizers.iter().fold(display.clone(), |s, f| f(&s))
        };
        Ok(Self { display, canonical })
    }

    /// Builds a name applying no canonicalization at all.
    pub fn raw(display: impl Into<String>) -> VfsResult<Self> {
        Self::new(display, &[])
    }

    /// The single name making up the canonical empty path (§4.1: "empty
    /// input produces the canonical empty path"). Not reachable through
    /// `new`/`raw`, which reject the empty string for ordinary segments.
    pub fn empty() -> Self {
        Self {
            display: String::new(),
            canonical: String::new(),
        }
    }

    pub fn display(&self) -> &str {
        &self.display
    }

    pub fn canonical(&self) -> &str {
        &self.canonical
    }

    pub fn is_current(&self) -> bool {
        self.display == Self::CURRENT
    }

    pub fn is_parent(&self) -> bool {
        self.display == Self::PARENT
    }
}

impl fmt::Display for VfsName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display)
    }
}

impl PartialEq for VfsName {
    fn eq(&self, other: &Self) -> bool {
        self.canonical == other.canonical
    }
}
impl Eq for VfsName {}

impl Hash for VfsName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical.hash(state);
    }
}
