//! Tree operations shared by both adapters.
//!
//! Each adapter supplies single-entry primitives through [`TreeOps`]; the
//! multi-step algorithms (parent creation, recursive delete, rename target
//! selection) live here once.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::{FsError, FsResult};
use crate::path::FsPath;

/// Attempts for one directory level before giving up.
pub const MKDIR_ATTEMPTS: u32 = 5;

/// What a path currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

/// Single-entry primitives over resolved absolute paths.
#[async_trait]
pub trait TreeOps: Send + Sync {
    /// `None` if nothing exists at `path`.
    async fn kind(&self, path: &FsPath) -> FsResult<Option<EntryKind>>;

    /// Create one directory whose parent exists.
    async fn make_dir(&self, path: &FsPath) -> FsResult<()>;

    /// Names of the entries directly under a directory.
    async fn child_names(&self, path: &FsPath) -> FsResult<Vec<String>>;

    /// Remove a file or an empty directory.
    async fn remove_entry(&self, path: &FsPath, kind: EntryKind) -> FsResult<()>;
}

fn backoff_delay(attempt: u32) -> Duration {
    // 10ms, 20ms, 40ms, 80ms, max 160ms
    let millis = match attempt {
        0 => 10,
        1 => 20,
        2 => 40,
        3 => 80,
        _ => 160,
    };
    Duration::from_millis(millis)
}

/// Create `path` and every missing ancestor, parents first.
///
/// Succeeds if `path` already is a directory. An ancestor or the target
/// being a file is `AlreadyExists`.
pub async fn mkdirs(ops: &dyn TreeOps, path: &FsPath) -> FsResult<()> {
    for dir in path.lineage() {
        match ops.kind(&dir).await? {
            Some(EntryKind::Directory) => continue,
            Some(EntryKind::File) => {
                return Err(FsError::already_exists(format!(
                    "{} exists and is not a directory",
                    dir.path_str()
                )));
            }
            None => make_dir_with_retry(ops, &dir).await?,
        }
    }
    Ok(())
}

/// Create one directory, tolerating a concurrent creator.
///
/// After a failed attempt the directory counts as created if it now exists
/// as a directory.
async fn make_dir_with_retry(ops: &dyn TreeOps, dir: &FsPath) -> FsResult<()> {
    let mut attempt = 0;
    loop {
        let err = match ops.make_dir(dir).await {
            Ok(()) => return Ok(()),
            Err(err) => err,
        };
        if ops.kind(dir).await? == Some(EntryKind::Directory) {
            debug!(path = %dir, "directory created concurrently");
            return Ok(());
        }
        attempt += 1;
        if attempt >= MKDIR_ATTEMPTS {
            return Err(err);
        }
        let delay = backoff_delay(attempt - 1);
        warn!(error = %err, path = %dir, attempt, ?delay, "mkdir failed; retrying");
        tokio::time::sleep(delay).await;
    }
}

/// Make sure the parent directory of `path` exists.
pub async fn ensure_parent(ops: &dyn TreeOps, path: &FsPath) -> FsResult<()> {
    match path.parent() {
        Some(parent) if !parent.is_root() => mkdirs(ops, &parent).await,
        _ => Ok(()),
    }
}

/// Delete `path`.
///
/// A populated directory needs `recursive`. Recursive deletes remove
/// children before parents and stop at the first failure with
/// [`FsError::PartialDelete`] listing what is left.
pub async fn remove_tree(ops: &dyn TreeOps, path: &FsPath, recursive: bool) -> FsResult<()> {
    let kind = ops
        .kind(path)
        .await?
        .ok_or_else(|| FsError::not_found(path.path_str()))?;

    if kind == EntryKind::File {
        return ops.remove_entry(path, kind).await;
    }

    let children = ops.child_names(path).await?;
    if !children.is_empty() && !recursive {
        return Err(FsError::directory_not_empty(path.path_str()));
    }

    // Pre-order walk; deleting in reverse puts children before parents.
    let mut entries = vec![(path.clone(), kind)];
    let mut stack = vec![(path.clone(), children)];
    while let Some((dir, names)) = stack.pop() {
        for name in names {
            let child = dir.child(&name);
            match ops.kind(&child).await? {
                Some(EntryKind::Directory) => {
                    entries.push((child.clone(), EntryKind::Directory));
                    let grandchildren = ops.child_names(&child).await?;
                    stack.push((child, grandchildren));
                }
                Some(EntryKind::File) => entries.push((child, EntryKind::File)),
                None => {}
            }
        }
    }

    let total = entries.len();
    for (idx, (entry, kind)) in entries.iter().enumerate().rev() {
        if let Err(err) = ops.remove_entry(entry, *kind).await {
            let undeleted: Vec<String> = entries[..=idx]
                .iter()
                .rev()
                .map(|(p, _)| p.path_str())
                .collect();
            warn!(
                error = %err,
                path = %path,
                failed = %entry,
                deleted = total - undeleted.len(),
                "recursive delete aborted"
            );
            return Err(FsError::PartialDelete {
                path: path.path_str(),
                failed: entry.path_str(),
                undeleted,
                source: Box::new(err),
            });
        }
    }
    Ok(())
}

/// `[start, start + len)` cut to a file of `file_len` bytes, as `(start, len)`.
///
/// `None` when nothing of the range lies inside the file.
pub fn clamp_range(file_len: u64, start: u64, len: u64) -> Option<(u64, u64)> {
    let end = start.saturating_add(len).min(file_len);
    (start < end).then(|| (start, end - start))
}

/// Final destination of a rename: into `dst` when it is a directory.
///
/// An entry already at the destination is `AlreadyExists`; renames never
/// replace. Returns `src` itself when it already sits at the destination.
pub async fn rename_target(ops: &dyn TreeOps, src: &FsPath, dst: &FsPath) -> FsResult<FsPath> {
    let target = match ops.kind(dst).await? {
        Some(EntryKind::Directory) => {
            let name = src
                .name()
                .ok_or_else(|| FsError::invalid_argument("cannot move the root directory"))?;
            dst.child(name)
        }
        _ => dst.clone(),
    };
    if target != *src && ops.kind(&target).await?.is_some() {
        return Err(FsError::already_exists(target.path_str()));
    }
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::{BTreeMap, HashSet};

    /// Flat map of path -> kind with injectable failures.
    #[derive(Default)]
    struct FakeTree {
        entries: Mutex<BTreeMap<String, EntryKind>>,
        fail_remove: Mutex<HashSet<String>>,
        fail_mkdir_once: Mutex<HashSet<String>>,
        removed: Mutex<Vec<String>>,
    }

    impl FakeTree {
        fn with(paths: &[(&str, EntryKind)]) -> Self {
            let tree = Self::default();
            for (p, k) in paths {
                tree.entries.lock().insert(p.to_string(), *k);
            }
            tree
        }
    }

    #[async_trait]
    impl TreeOps for FakeTree {
        async fn kind(&self, path: &FsPath) -> FsResult<Option<EntryKind>> {
            if path.is_root() {
                return Ok(Some(EntryKind::Directory));
            }
            Ok(self.entries.lock().get(&path.path_str()).copied())
        }

        async fn make_dir(&self, path: &FsPath) -> FsResult<()> {
            let key = path.path_str();
            if self.fail_mkdir_once.lock().remove(&key) {
                // Someone else wins the race.
                self.entries.lock().insert(key.clone(), EntryKind::Directory);
                return Err(FsError::already_exists(key));
            }
            self.entries.lock().insert(key, EntryKind::Directory);
            Ok(())
        }

        async fn child_names(&self, path: &FsPath) -> FsResult<Vec<String>> {
            let prefix = format!("{}/", path.path_str().trim_end_matches('/'));
            Ok(self
                .entries
                .lock()
                .keys()
                .filter_map(|k| k.strip_prefix(&prefix))
                .filter(|rest| !rest.contains('/'))
                .map(str::to_string)
                .collect())
        }

        async fn remove_entry(&self, path: &FsPath, _kind: EntryKind) -> FsResult<()> {
            let key = path.path_str();
            if self.fail_remove.lock().contains(&key) {
                return Err(FsError::backend(format!("cannot remove {key}")));
            }
            self.entries.lock().remove(&key);
            self.removed.lock().push(key);
            Ok(())
        }
    }

    fn p(s: &str) -> FsPath {
        FsPath::parse(s).unwrap()
    }

    #[tokio::test]
    async fn test_mkdirs_creates_ancestors() {
        let tree = FakeTree::default();
        mkdirs(&tree, &p("/a/b/c")).await.unwrap();
        for d in ["/a", "/a/b", "/a/b/c"] {
            assert_eq!(tree.kind(&p(d)).await.unwrap(), Some(EntryKind::Directory));
        }
        // Idempotent.
        mkdirs(&tree, &p("/a/b/c")).await.unwrap();
    }

    #[tokio::test]
    async fn test_mkdirs_through_file_fails() {
        let tree = FakeTree::with(&[("/a", EntryKind::File)]);
        let err = mkdirs(&tree, &p("/a/b")).await.unwrap_err();
        assert!(matches!(err, FsError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_mkdirs_tolerates_race() {
        let tree = FakeTree::default();
        tree.fail_mkdir_once.lock().insert("/a".into());
        mkdirs(&tree, &p("/a/b")).await.unwrap();
        assert_eq!(tree.kind(&p("/a/b")).await.unwrap(), Some(EntryKind::Directory));
    }

    #[tokio::test]
    async fn test_remove_nonrecursive_populated() {
        let tree = FakeTree::with(&[("/d", EntryKind::Directory), ("/d/f", EntryKind::File)]);
        let err = remove_tree(&tree, &p("/d"), false).await.unwrap_err();
        assert!(matches!(err, FsError::DirectoryNotEmpty(_)));
        assert!(tree.kind(&p("/d/f")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_remove_recursive_children_first() {
        let tree = FakeTree::with(&[
            ("/d", EntryKind::Directory),
            ("/d/e", EntryKind::Directory),
            ("/d/e/f", EntryKind::File),
            ("/d/g", EntryKind::File),
        ]);
        remove_tree(&tree, &p("/d"), true).await.unwrap();
        let removed = tree.removed.lock().clone();
        assert_eq!(removed.last().map(String::as_str), Some("/d"));
        let pos = |s: &str| removed.iter().position(|r| r == s).unwrap();
        assert!(pos("/d/e/f") < pos("/d/e"));
        assert!(tree.entries.lock().is_empty());
    }

    #[tokio::test]
    async fn test_remove_recursive_reports_partial() {
        let tree = FakeTree::with(&[
            ("/d", EntryKind::Directory),
            ("/d/a", EntryKind::File),
            ("/d/b", EntryKind::File),
        ]);
        tree.fail_remove.lock().insert("/d/a".into());
        let err = remove_tree(&tree, &p("/d"), true).await.unwrap_err();
        match err {
            FsError::PartialDelete { failed, undeleted, .. } => {
                assert_eq!(failed, "/d/a");
                assert_eq!(undeleted, vec!["/d/a".to_string(), "/d".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(tree.kind(&p("/d/b")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_remove_missing() {
        let tree = FakeTree::default();
        assert!(remove_tree(&tree, &p("/nope"), true).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_rename_target_into_directory() {
        let tree = FakeTree::with(&[("/dst", EntryKind::Directory)]);
        assert_eq!(rename_target(&tree, &p("/src/f"), &p("/dst")).await.unwrap(), p("/dst/f"));
        assert_eq!(rename_target(&tree, &p("/src/f"), &p("/g")).await.unwrap(), p("/g"));
    }

    #[tokio::test]
    async fn test_rename_target_never_replaces() {
        let tree = FakeTree::with(&[
            ("/src", EntryKind::Directory),
            ("/src/f", EntryKind::File),
            ("/g", EntryKind::File),
            ("/dst", EntryKind::Directory),
            ("/dst/f", EntryKind::File),
        ]);
        let err = rename_target(&tree, &p("/src/f"), &p("/g")).await.unwrap_err();
        assert!(matches!(err, FsError::AlreadyExists(ref path) if path == "/g"));
        let err = rename_target(&tree, &p("/src/f"), &p("/dst")).await.unwrap_err();
        assert!(matches!(err, FsError::AlreadyExists(ref path) if path == "/dst/f"));
        assert_eq!(rename_target(&tree, &p("/src/f"), &p("/src")).await.unwrap(), p("/src/f"));
    }

    #[test]
    fn test_clamp_range() {
        assert_eq!(clamp_range(300, 0, 128 * 100_000), Some((0, 300)));
        assert_eq!(clamp_range(300, 100, 50), Some((100, 50)));
        assert_eq!(clamp_range(300, 10_000, 10), None);
        assert_eq!(clamp_range(300, 300, 1), None);
        assert_eq!(clamp_range(300, u64::MAX - 10, 5), None);
        assert_eq!(clamp_range(300, 0, 0), None);
        assert_eq!(clamp_range(0, 0, 10), None);
    }
}
