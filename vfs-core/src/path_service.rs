//! Creates canonical `VfsPath` values for one `PathType`/canonicalization
//! policy, and compiles glob/regex patterns for directory-stream filters
//! (§4.1).

use regex::Regex;

use crate::error::{errors, VfsResult};
use crate::path::name::{Normalizer, VfsName};
use crate::path::path::VfsPath;
use crate::path::path_type::PathType;

/// Binds one `PathType` and an ordered list of name normalizers into a
/// single value factory, mirroring the distilled spec's `PathService`.
pub struct PathService {
    path_type: Box<dyn PathType>,
    normalizers: Vec<Normalizer>,
}

impl PathService {
    pub fn new(path_type: Box<dyn PathType>, normalizers: Vec<Normalizer>) -> Self {
        Self {
            path_type,
            normalizers,
        }
    }

    pub fn path_type(&self) -> &dyn PathType {
        self.path_type.as_ref()
    }

    /// Joins `first` and `more` with the path type's canonical separator
    /// before delegating to it for root/segment splitting, then builds a
    /// `VfsPath` applying the configured canonicalization to each segment.
    /// Empty input (no segments at all) yields the canonical empty relative
    /// path: one empty-string name, no root.
    pub fn parse(&self, first: &str, more: &[&str]) -> VfsResult<VfsPath> {
        if first.is_empty() && more.is_empty() {
            return Ok(VfsPath::from_parts(None, vec![VfsName::empty()]));
        }
        let sep = self.separator();
        let mut joined = first.to_string();
        for part in more {
            if !joined.is_empty() && !joined.ends_with(sep) {
                joined.push(sep);
            }
            joined.push_str(part);
        }
        let (root, raw_names) = self.path_type.parse_raw(&joined)?;
        let names = raw_names
            .into_iter()
            .map(|n| VfsName::new(n, &self.normalizers))
            .collect::<VfsResult<Vec<_>>>()?;
        Ok(VfsPath::from_parts(root, names))
    }

    pub fn format(&self, path: &VfsPath) -> String {
        self.path_type.format(path)
    }

    fn separator(&self) -> char {
        if self.path_type.is_separator('/') && !self.path_type.is_separator('\\') {
            '/'
        } else {
            '\\'
        }
    }

    /// Compiles a glob (or `regex:`-prefixed) pattern string into a
    /// `Regex` anchored against a full path, per §4.1.
    pub fn compile_pattern(&self, pattern: &str) -> VfsResult<Regex> {
        if let Some(raw) = pattern.strip_prefix("regex:") {
            return Regex::new(raw)
                .map_err(|e| errors::invalid_argument(format!("bad regex pattern: {e}")));
        }
        let compiled = glob_to_regex(pattern, &self.separators());
        Regex::new(&compiled)
            .map_err(|e| errors::invalid_argument(format!("bad glob pattern: {e}")))
    }

    pub fn matches(&self, pattern: &str, candidate: &str) -> VfsResult<bool> {
        Ok(self.compile_pattern(pattern)?.is_match(candidate))
    }

    fn separators(&self) -> Vec<char> {
        ('\u{0}'..='\u{7f}')
            .filter(|c| self.path_type.is_separator(*c))
            .collect()
    }
}

/// Translates glob syntax to an anchored regex pattern.
///
/// `*` matches any run of non-separator characters, `**` matches anything
/// including separators, `?` matches one non-separator character, `[...]`
/// is a character class (`[!...]` negates it), `{a,b,c}` is a top-level,
/// non-nested alternation, and a literal separator in the pattern matches
/// any of `separators`.
fn glob_to_regex(pattern: &str, separators: &[char]) -> String {
    let sep_class: String = separators.iter().collect::<String>();
    let sep_class_escaped = regex::escape(&sep_class);
    let non_sep = format!("[^{sep_class_escaped}]");

    let mut out = String::from("^");
    let chars: Vec<char> = pattern.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if separators.contains(&c) {
            out.push('[');
            out.push_str(&sep_class_escaped);
            out.push(']');
            i += 1;
            continue;
        }
        match c {
            '*' => {
                if i + 1 < chars.len() && chars[i + 1] == '*' {
                    out.push_str(".*");
                    i += 2;
                } else {
                    out.push_str(&non_sep);
                    out.push('*');
                    i += 1;
                }
            }
            '?' => {
                out.push_str(&non_sep);
                i += 1;
            }
            '[' => {
                let mut j = i + 1;
                let mut class = String::from("[");
                if j < chars.len() && (chars[j] == '!' || chars[j] == '^') {
                    class.push('^');
                    j += 1;
                }
                while j < chars.len() && chars[j] != ']' {
                    class.push(chars[j]);
                    j += 1;
                }
                class.push(']');
                out.push_str(&class);
                i = j + 1;
            }
            '{' => {
                let mut j = i + 1;
                let mut alt = String::new();
                while j < chars.len() && chars[j] != '}' {
                    alt.push(chars[j]);
                    j += 1;
                }
                out.push('(');
                out.push_str(
                    &alt.split(',')
                        .map(regex::escape)
                        .collect::<Vec<_>>()
                        .join("|"),
                );
                out.push(')');
                i = j + 1;
            }
            other => {
                out.push_str(&regex::escape(&other.to_string()));
                i += 1;
            }
        }
    }
    out.push('$');
    out
}
