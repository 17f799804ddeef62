//! Hierarchical paths and working-directory resolution.
//!
//! [`FsPath`] is a structural path (scheme, authority, segments). Two paths
//! are equal when their components are equal, so `a/b/` and `a/./b` compare
//! equal to `a/b`. [`PathResolver`] owns the per-adapter working directory.

use std::fmt;
use std::str::FromStr;

use parking_lot::RwLock;

use crate::error::{FsError, FsResult};

/// URI scheme served by the adapters.
pub const GLUSTERFS_SCHEME: &str = "glusterfs";

/// An immutable hierarchical path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FsPath {
    scheme: Option<String>,
    authority: Option<String>,
    absolute: bool,
    segments: Vec<String>,
}

impl FsPath {
    /// The root path `/`.
    pub fn root() -> Self {
        Self {
            scheme: None,
            authority: None,
            absolute: true,
            segments: Vec::new(),
        }
    }

    /// Parse a path string.
    ///
    /// Accepts `scheme://authority/a/b`, `/a/b` and `a/b`. Empty input is
    /// rejected.
    pub fn parse(input: &str) -> FsResult<Self> {
        if input.is_empty() {
            return Err(FsError::invalid_path("empty path"));
        }

        let (scheme, authority, rest) = match input.split_once("://") {
            Some((scheme, rest)) if is_scheme(scheme) => {
                let (authority, path) = match rest.find('/') {
                    Some(idx) => (&rest[..idx], &rest[idx..]),
                    None => (rest, "/"),
                };
                let authority = (!authority.is_empty()).then(|| authority.to_string());
                (Some(scheme.to_ascii_lowercase()), authority, path)
            }
            _ => (None, None, input),
        };

        let absolute = rest.starts_with('/') || scheme.is_some();
        let mut path = Self {
            scheme,
            authority,
            absolute,
            segments: Vec::new(),
        };
        path.push_segments(rest.split('/'));
        Ok(path)
    }

    fn push_segments<'a>(&mut self, parts: impl IntoIterator<Item = &'a str>) {
        for part in parts {
            match part {
                "" | "." => {}
                ".." => {
                    let can_pop = self
                        .segments
                        .last()
                        .is_some_and(|last| last != "..");
                    if can_pop {
                        self.segments.pop();
                    } else if !self.absolute {
                        self.segments.push("..".to_string());
                    }
                }
                name => self.segments.push(name.to_string()),
            }
        }
    }

    /// Returns true if the path starts at the root.
    pub fn is_absolute(&self) -> bool {
        self.absolute
    }

    /// Returns true for `/`.
    pub fn is_root(&self) -> bool {
        self.absolute && self.segments.is_empty()
    }

    /// URI scheme, if qualified.
    pub fn scheme(&self) -> Option<&str> {
        self.scheme.as_deref()
    }

    /// URI authority, if qualified.
    pub fn authority(&self) -> Option<&str> {
        self.authority.as_deref()
    }

    /// Path segments, root first.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Last segment, `None` for the root.
    pub fn name(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// Parent path, `None` for the root or a single relative segment.
    pub fn parent(&self) -> Option<FsPath> {
        if self.segments.is_empty() || (!self.absolute && self.segments.len() == 1) {
            return None;
        }
        let mut parent = self.clone();
        parent.segments.pop();
        Some(parent)
    }

    /// Append a single child name.
    pub fn child(&self, name: &str) -> FsPath {
        let mut child = self.clone();
        child.push_segments(name.split('/'));
        child
    }

    /// Join `other` onto this path. An absolute `other` replaces this path.
    pub fn join(&self, other: &FsPath) -> FsPath {
        if other.absolute {
            return other.clone();
        }
        let mut joined = self.clone();
        joined.push_segments(other.segments.iter().map(String::as_str));
        joined
    }

    /// Drop scheme and authority.
    pub fn unqualified(&self) -> FsPath {
        Self {
            scheme: None,
            authority: None,
            absolute: self.absolute,
            segments: self.segments.clone(),
        }
    }

    /// Attach a scheme and authority to an absolute path.
    pub fn qualified(&self, scheme: &str, authority: Option<&str>) -> FsPath {
        Self {
            scheme: Some(scheme.to_string()),
            authority: authority.filter(|a| !a.is_empty()).map(str::to_string),
            absolute: true,
            segments: self.segments.clone(),
        }
    }

    /// Returns true if `prefix`'s segments lead this path's segments.
    pub fn starts_with(&self, prefix: &FsPath) -> bool {
        self.absolute == prefix.absolute && self.segments.starts_with(&prefix.segments)
    }

    /// Re-root this path after removing `prefix`'s segments.
    pub fn strip_prefix(&self, prefix: &FsPath) -> Option<FsPath> {
        if !self.starts_with(prefix) {
            return None;
        }
        Some(Self {
            scheme: None,
            authority: None,
            absolute: true,
            segments: self.segments[prefix.segments.len()..].to_vec(),
        })
    }

    /// The slash-separated path without scheme or authority.
    ///
    /// Absolute paths have exactly one leading slash and no trailing slash
    /// (except `/` itself).
    pub fn path_str(&self) -> String {
        let joined = self.segments.join("/");
        if self.absolute {
            format!("/{joined}")
        } else {
            joined
        }
    }

    /// Every ancestor from the first segment down to this path (absolute paths only).
    pub fn lineage(&self) -> Vec<FsPath> {
        (1..=self.segments.len())
            .map(|n| Self {
                scheme: self.scheme.clone(),
                authority: self.authority.clone(),
                absolute: self.absolute,
                segments: self.segments[..n].to_vec(),
            })
            .collect()
    }
}

fn is_scheme(s: &str) -> bool {
    let mut chars = s.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

impl fmt::Display for FsPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(scheme) = &self.scheme {
            write!(f, "{}://{}", scheme, self.authority.as_deref().unwrap_or(""))?;
        }
        f.write_str(&self.path_str())
    }
}

impl FromStr for FsPath {
    type Err = FsError;

    fn from_str(s: &str) -> FsResult<Self> {
        Self::parse(s)
    }
}

impl TryFrom<&str> for FsPath {
    type Error = FsError;

    fn try_from(s: &str) -> FsResult<Self> {
        Self::parse(s)
    }
}

/// Resolves paths against a mutable working directory.
///
/// One resolver per adapter instance. The working directory only changes
/// through [`PathResolver::set_working_directory`].
#[derive(Debug)]
pub struct PathResolver {
    scheme: String,
    working_dir: RwLock<FsPath>,
}

impl PathResolver {
    /// Create a resolver with an absolute initial working directory.
    pub fn new(scheme: impl Into<String>, working_dir: FsPath) -> FsResult<Self> {
        if !working_dir.is_absolute() {
            return Err(FsError::invalid_path(format!(
                "working directory must be absolute: {working_dir}"
            )));
        }
        Ok(Self {
            scheme: scheme.into(),
            working_dir: RwLock::new(working_dir.unqualified()),
        })
    }

    /// Current working directory (absolute, unqualified).
    pub fn working_directory(&self) -> FsPath {
        self.working_dir.read().clone()
    }

    /// Resolve `path` and make it the working directory.
    pub fn set_working_directory(&self, path: &FsPath) -> FsResult<()> {
        let resolved = self.resolve(path)?;
        *self.working_dir.write() = resolved;
        Ok(())
    }

    /// Resolve a path to its absolute, unqualified form.
    ///
    /// Absolute paths are returned unchanged (minus their qualifier), so a
    /// path already under the working directory is never double-prefixed.
    pub fn resolve(&self, path: &FsPath) -> FsResult<FsPath> {
        self.check_scheme(path)?;
        if path.is_absolute() {
            return Ok(path.unqualified());
        }
        Ok(self.working_dir.read().join(path))
    }

    fn check_scheme(&self, path: &FsPath) -> FsResult<()> {
        match path.scheme() {
            Some(scheme) if !scheme.eq_ignore_ascii_case(&self.scheme) => Err(
                FsError::invalid_path(format!("wrong filesystem: {path}, expected {}", self.scheme)),
            ),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> FsPath {
        FsPath::parse(s).unwrap()
    }

    #[test]
    fn test_parse_forms() {
        let abs = p("/a/b");
        assert!(abs.is_absolute());
        assert_eq!(abs.segments(), &["a", "b"]);

        let rel = p("a/b");
        assert!(!rel.is_absolute());
        assert_eq!(rel.path_str(), "a/b");

        let q = p("glusterfs://server1:24007/vol/data");
        assert_eq!(q.scheme(), Some("glusterfs"));
        assert_eq!(q.authority(), Some("server1:24007"));
        assert_eq!(q.path_str(), "/vol/data");
        assert_eq!(q.to_string(), "glusterfs://server1:24007/vol/data");

        let no_auth = p("glusterfs:///user/amy");
        assert_eq!(no_auth.authority(), None);
        assert_eq!(no_auth.to_string(), "glusterfs:///user/amy");
    }

    #[test]
    fn test_empty_rejected() {
        assert!(matches!(FsPath::parse(""), Err(FsError::InvalidPath(_))));
    }

    #[test]
    fn test_structural_equality() {
        assert_eq!(p("/a/b/"), p("/a/b"));
        assert_eq!(p("/a/./b"), p("/a//b"));
        assert_eq!(p("/a/x/../b"), p("/a/b"));
        assert_eq!(p("/../a"), p("/a"));
        assert_ne!(p("a/b"), p("/a/b"));
        assert_eq!(p("../x").path_str(), "../x");
    }

    #[test]
    fn test_root_string_form() {
        assert_eq!(FsPath::root().path_str(), "/");
        assert_eq!(p("/").path_str(), "/");
        assert!(p("///").is_root());
    }

    #[test]
    fn test_parent_and_name() {
        let path = p("/a/b/c.txt");
        assert_eq!(path.name(), Some("c.txt"));
        assert_eq!(path.parent(), Some(p("/a/b")));
        assert_eq!(p("/a").parent(), Some(FsPath::root()));
        assert_eq!(FsPath::root().parent(), None);
        assert_eq!(p("x").parent(), None);
    }

    #[test]
    fn test_lineage_order() {
        let lineage = p("/a/b/c").lineage();
        assert_eq!(lineage, vec![p("/a"), p("/a/b"), p("/a/b/c")]);
    }

    #[test]
    fn test_resolve_relative_and_absolute() {
        let resolver = PathResolver::new(GLUSTERFS_SCHEME, p("/user/amy")).unwrap();
        assert_eq!(resolver.resolve(&p("data/x")).unwrap(), p("/user/amy/data/x"));
        assert_eq!(resolver.resolve(&p("/tmp/x")).unwrap(), p("/tmp/x"));
        assert_eq!(resolver.resolve(&p("../bob")).unwrap(), p("/user/bob"));
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let resolver = PathResolver::new(GLUSTERFS_SCHEME, p("/user/amy")).unwrap();
        for input in ["x", "/user/amy/x", "a/../b", "glusterfs://h/q", "/"] {
            let once = resolver.resolve(&p(input)).unwrap();
            let twice = resolver.resolve(&once).unwrap();
            assert_eq!(once, twice, "input {input}");
        }
    }

    #[test]
    fn test_working_dir_prefix_not_doubled() {
        let resolver = PathResolver::new(GLUSTERFS_SCHEME, p("/user/amy")).unwrap();
        let resolved = resolver.resolve(&p("/user/amy/part-0000")).unwrap();
        assert_eq!(resolved.path_str(), "/user/amy/part-0000");
    }

    #[test]
    fn test_set_working_directory() {
        let resolver = PathResolver::new(GLUSTERFS_SCHEME, FsPath::root()).unwrap();
        resolver.set_working_directory(&p("jobs")).unwrap();
        assert_eq!(resolver.working_directory(), p("/jobs"));
        resolver.set_working_directory(&p("run1")).unwrap();
        assert_eq!(resolver.working_directory(), p("/jobs/run1"));
    }

    #[test]
    fn test_foreign_scheme_rejected() {
        let resolver = PathResolver::new(GLUSTERFS_SCHEME, FsPath::root()).unwrap();
        let err = resolver.resolve(&p("hdfs://nn/x")).unwrap_err();
        assert!(matches!(err, FsError::InvalidPath(_)));
    }

    #[test]
    fn test_qualify() {
        let q = p("/a/b").qualified("glusterfs", Some("srv"));
        assert_eq!(q.to_string(), "glusterfs://srv/a/b");
        assert_eq!(q.unqualified(), p("/a/b"));
    }

    #[test]
    fn test_strip_prefix() {
        assert_eq!(p("/mnt/g/a/b").strip_prefix(&p("/mnt/g")), Some(p("/a/b")));
        assert_eq!(p("/mnt/g").strip_prefix(&p("/mnt/g")), Some(FsPath::root()));
        assert_eq!(p("/mnt/gx").strip_prefix(&p("/mnt/g")), None);
    }
}
