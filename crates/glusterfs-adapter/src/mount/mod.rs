//! Local-mount adapter.
//!
//! Mounts the volume through the FUSE client once, then serves every
//! operation with ordinary local file I/O under the mount point. Logical
//! paths are volume-rooted: `/data/x` lives at `<mount>/data/x`. A path
//! that already points under the mount point is taken as-is.
//!
//! With quick-read enabled, `open` asks the locality oracle whether every
//! block of the file has a replica on this host in one brick file, and if
//! so reads that brick file directly instead of going through FUSE.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use tokio::fs;
use tokio::io::{BufReader, BufWriter};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::GlusterConfig;
use crate::error::{FsError, FsResult};
use crate::filesystem::FileSystem;
use crate::locality::{LocalityOracle, PathInfoOracle, ShellXattrSource, local_hostname, local_replica};
use crate::ops::{self, EntryKind, TreeOps};
use crate::path::{FsPath, GLUSTERFS_SCHEME, PathResolver};
use crate::shell::{AclBackup, CommandRunner, Shell};
use crate::stream::{FsInputStream, FsOutputStream, ReadStream, Statistics, StreamSource};
use crate::types::{BlockLocation, CreateOptions, FileStatus, FsPermission, FsStatus};

/// Lifecycle of the mount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountState {
    Uninitialized,
    Mounting,
    Mounted,
    Closed,
}

/// [`TreeOps`] over the mounted directory tree.
struct LocalTree<'a>(&'a LocalMountFileSystem);

#[async_trait]
impl<'a> TreeOps for LocalTree<'a> {
    async fn kind(&self, path: &FsPath) -> FsResult<Option<EntryKind>> {
        let local = self.0.local_path(path);
        match fs::metadata(&local).await {
            Ok(meta) if meta.is_dir() => Ok(Some(EntryKind::Directory)),
            Ok(_) => Ok(Some(EntryKind::File)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(FsError::from_io(err, local.display())),
        }
    }

    async fn make_dir(&self, path: &FsPath) -> FsResult<()> {
        let local = self.0.local_path(path);
        fs::create_dir(&local)
            .await
            .map_err(|e| FsError::from_io(e, local.display()))
    }

    async fn child_names(&self, path: &FsPath) -> FsResult<Vec<String>> {
        let local = self.0.local_path(path);
        let mut entries = fs::read_dir(&local)
            .await
            .map_err(|e| FsError::from_io(e, local.display()))?;
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }

    async fn remove_entry(&self, path: &FsPath, kind: EntryKind) -> FsResult<()> {
        let local = self.0.local_path(path);
        let result = match kind {
            EntryKind::File => fs::remove_file(&local).await,
            EntryKind::Directory => fs::remove_dir(&local).await,
        };
        result.map_err(|e| FsError::from_io(e, local.display()))
    }
}

/// Filesystem served from a FUSE mount of the volume.
pub struct LocalMountFileSystem {
    config: GlusterConfig,
    shell: Shell,
    state: RwLock<MountState>,
    resolver: PathResolver,
    oracle: Arc<dyn LocalityOracle>,
    hostname: String,
    stats: Arc<Statistics>,
    mount_point: PathBuf,
    authority: String,
}

impl std::fmt::Debug for LocalMountFileSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalMountFileSystem")
            .field("mount_point", &self.mount_point)
            .field("authority", &self.authority)
            .field("hostname", &self.hostname)
            .finish_non_exhaustive()
    }
}

impl LocalMountFileSystem {
    /// Create an adapter. Nothing is mounted until [`initialize`](Self::initialize).
    pub fn new(config: GlusterConfig, runner: Arc<dyn CommandRunner>) -> FsResult<Self> {
        let shell = Shell::new(runner);
        let hostname = local_hostname();
        let oracle = PathInfoOracle::new(Arc::new(ShellXattrSource::new(shell.clone())), hostname.clone());
        Ok(Self {
            mount_point: config.mount.clone().unwrap_or_default(),
            authority: config.authority().unwrap_or_default(),
            resolver: PathResolver::new(GLUSTERFS_SCHEME, FsPath::root())?,
            state: RwLock::new(MountState::Uninitialized),
            oracle: Arc::new(oracle),
            stats: Arc::new(Statistics::new()),
            hostname,
            shell,
            config,
        })
    }

    /// Replace the locality oracle.
    pub fn with_oracle(mut self, oracle: Arc<dyn LocalityOracle>) -> Self {
        self.oracle = oracle;
        self
    }

    /// Override the host name used for quick-read and host ordering.
    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self
    }

    /// Mount the volume. Runs once; later calls are no-ops.
    ///
    /// Concurrent callers wait for the first one and observe its result.
    pub async fn initialize(&self) -> FsResult<()> {
        let mut state = self.state.write().await;
        match *state {
            MountState::Mounted => return Ok(()),
            MountState::Closed => return Err(FsError::config("filesystem is closed")),
            MountState::Uninitialized | MountState::Mounting => {}
        }

        let (volume, server, mount) = self.config.mount_settings()?;
        *state = MountState::Mounting;
        match self.shell.ensure_mounted(server, volume, mount).await {
            Ok(outcome) => {
                info!(server, volume, mount_point = %mount.display(), ?outcome, "glusterfs ready");
                *state = MountState::Mounted;
                Ok(())
            }
            Err(err) => {
                *state = MountState::Uninitialized;
                Err(err)
            }
        }
    }

    pub async fn state(&self) -> MountState {
        *self.state.read().await
    }

    pub fn mount_point(&self) -> &Path {
        &self.mount_point
    }

    async fn ensure_mounted(&self) -> FsResult<()> {
        match *self.state.read().await {
            MountState::Mounted => Ok(()),
            other => Err(FsError::config(format!("filesystem is not mounted ({other:?})"))),
        }
    }

    fn mount_fs_path(&self) -> FsPath {
        FsPath::parse(&self.mount_point.to_string_lossy()).unwrap_or_else(|_| FsPath::root())
    }

    /// Resolve to a volume-rooted logical path.
    fn logical(&self, path: &FsPath) -> FsResult<FsPath> {
        let absolute = self.resolver.resolve(path)?;
        Ok(absolute
            .strip_prefix(&self.mount_fs_path())
            .filter(|_| !self.mount_point.as_os_str().is_empty())
            .unwrap_or(absolute))
    }

    /// Location of a logical path under the mount point.
    fn local_path(&self, logical: &FsPath) -> PathBuf {
        let mut local = self.mount_point.clone();
        for segment in logical.segments() {
            local.push(segment);
        }
        local
    }

    fn tree(&self) -> LocalTree<'_> {
        LocalTree(self)
    }

    fn backend_key(&self, logical: &FsPath) -> String {
        self.local_path(logical).to_string_lossy().into_owned()
    }

    async fn metadata(&self, logical: &FsPath) -> FsResult<std::fs::Metadata> {
        let local = self.local_path(logical);
        fs::metadata(&local)
            .await
            .map_err(|e| FsError::from_io(e, logical.path_str()))
    }

    fn status_from(&self, logical: &FsPath, meta: &std::fs::Metadata) -> FileStatus {
        let mtime = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        let qualified = logical.qualified(GLUSTERFS_SCHEME, Some(&self.authority));
        if meta.is_dir() {
            FileStatus::directory(qualified, mtime)
        } else {
            FileStatus::file(qualified, meta.len(), mtime)
        }
    }

    /// Brick file to read instead of the mounted one, if quick-read applies.
    async fn quick_read_source(&self, logical: &FsPath, length: u64) -> Option<PathBuf> {
        if !self.config.quick_read {
            return None;
        }
        let key = self.backend_key(logical);
        let hints = match self.oracle.quick_read_possible(&key, 0, length).await {
            Ok(Some(hints)) => hints,
            Ok(None) => return None,
            Err(err) => {
                warn!(error = %err, path = %logical, "quick-read lookup failed; reading through mount");
                return None;
            }
        };
        local_replica(&hints, &self.hostname).map(PathBuf::from)
    }

    /// Save the ACLs under `path` (recursively) to a temporary file.
    pub async fn backup_acl(&self, path: &FsPath) -> FsResult<AclBackup> {
        self.ensure_mounted().await?;
        let logical = self.logical(path)?;
        self.shell.backup_acl(&self.local_path(&logical)).await
    }

    /// Re-apply ACLs saved by [`backup_acl`](Self::backup_acl).
    pub async fn restore_acl(&self, backup: &AclBackup) -> FsResult<()> {
        self.ensure_mounted().await?;
        self.shell.restore_acl(backup).await
    }
}

#[async_trait]
impl FileSystem for LocalMountFileSystem {
    fn uri(&self) -> String {
        format!("{GLUSTERFS_SCHEME}://{}", self.authority)
    }

    fn working_directory(&self) -> FsPath {
        self.resolver.working_directory()
    }

    fn set_working_directory(&self, path: &FsPath) -> FsResult<()> {
        let logical = self.logical(path)?;
        self.resolver.set_working_directory(&logical)
    }

    /// The volume root.
    fn home_directory(&self) -> FsPath {
        FsPath::root()
    }

    fn qualify(&self, path: &FsPath) -> FsPath {
        let logical = self.logical(path).unwrap_or_else(|_| path.unqualified());
        logical.qualified(GLUSTERFS_SCHEME, Some(&self.authority))
    }

    async fn exists(&self, path: &FsPath) -> FsResult<bool> {
        self.ensure_mounted().await?;
        let logical = self.logical(path)?;
        Ok(self.tree().kind(&logical).await?.is_some())
    }

    async fn mkdirs(&self, path: &FsPath, permission: Option<FsPermission>) -> FsResult<()> {
        self.ensure_mounted().await?;
        let logical = self.logical(path)?;
        ops::mkdirs(&self.tree(), &logical).await?;
        if let Some(permission) = permission {
            self.set_permission(&logical, permission).await?;
        }
        Ok(())
    }

    async fn list_status(&self, path: &FsPath) -> FsResult<Vec<FileStatus>> {
        self.ensure_mounted().await?;
        let logical = self.logical(path)?;
        let meta = self.metadata(&logical).await?;
        if !meta.is_dir() {
            return Ok(vec![self.status_from(&logical, &meta)]);
        }

        let mut statuses = Vec::new();
        for name in self.tree().child_names(&logical).await? {
            let child = logical.child(&name);
            match self.metadata(&child).await {
                Ok(meta) => statuses.push(self.status_from(&child, &meta)),
                Err(err) if err.is_not_found() => {
                    debug!(path = %child, "entry vanished while listing");
                }
                Err(err) => return Err(err),
            }
        }
        statuses.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(statuses)
    }

    async fn get_file_status(&self, path: &FsPath) -> FsResult<FileStatus> {
        self.ensure_mounted().await?;
        let logical = self.logical(path)?;
        let meta = self.metadata(&logical).await?;
        Ok(self.status_from(&logical, &meta))
    }

    async fn load_permission_info(&self, status: &mut FileStatus) -> FsResult<()> {
        if status.permissions_loaded() {
            return Ok(());
        }
        self.ensure_mounted().await?;
        let logical = self.logical(&status.path.unqualified())?;
        status.perms = self.shell.permission_info(&self.local_path(&logical)).await?;
        Ok(())
    }

    async fn open(&self, path: &FsPath) -> FsResult<FsInputStream> {
        self.ensure_mounted().await?;
        let logical = self.logical(path)?;
        let meta = self.metadata(&logical).await?;
        if meta.is_dir() {
            return Err(FsError::is_a_directory(logical.path_str()));
        }

        let capacity = self.config.tuned_buffer_size();
        if let Some(brick) = self.quick_read_source(&logical, meta.len()).await {
            match fs::File::open(&brick).await {
                Ok(file) => {
                    debug!(path = %logical, brick = %brick.display(), "reading local replica");
                    let stream: Box<dyn ReadStream> = Box::new(BufReader::with_capacity(capacity, file));
                    return Ok(FsInputStream::new(
                        stream,
                        self.stats.clone(),
                        StreamSource::LocalReplica,
                        self.qualify(&logical),
                    ));
                }
                Err(err) => {
                    warn!(error = %err, brick = %brick.display(), "local replica unreadable; reading through mount");
                }
            }
        }

        let local = self.local_path(&logical);
        let file = fs::File::open(&local)
            .await
            .map_err(|e| FsError::from_io(e, logical.path_str()))?;
        Ok(FsInputStream::new(
            Box::new(BufReader::with_capacity(capacity, file)),
            self.stats.clone(),
            StreamSource::Mount,
            self.qualify(&logical),
        ))
    }

    async fn create(&self, path: &FsPath, options: CreateOptions) -> FsResult<FsOutputStream> {
        self.ensure_mounted().await?;
        let logical = self.logical(path)?;
        match self.tree().kind(&logical).await? {
            Some(EntryKind::Directory) => return Err(FsError::is_a_directory(logical.path_str())),
            Some(EntryKind::File) if !options.overwrite => {
                return Err(FsError::already_exists(logical.path_str()));
            }
            _ => {}
        }

        ops::ensure_parent(&self.tree(), &logical).await?;
        let local = self.local_path(&logical);
        let file = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&local)
            .await
            .map_err(|e| FsError::from_io(e, logical.path_str()))?;
        if let Some(permission) = options.permission {
            fs::set_permissions(&local, std::fs::Permissions::from_mode(permission.mode()))
                .await
                .map_err(|e| FsError::from_io(e, logical.path_str()))?;
        }

        let capacity = options
            .buffer_size
            .unwrap_or_else(|| self.config.tuned_buffer_size());
        Ok(FsOutputStream::new(
            Box::new(BufWriter::with_capacity(capacity, file)),
            self.stats.clone(),
            self.qualify(&logical),
        ))
    }

    async fn append(&self, path: &FsPath) -> FsResult<FsOutputStream> {
        Err(FsError::unsupported(format!(
            "append is not supported on the mount adapter: {path}"
        )))
    }

    async fn rename(&self, src: &FsPath, dst: &FsPath) -> FsResult<()> {
        self.ensure_mounted().await?;
        let src = self.logical(src)?;
        let dst = self.logical(dst)?;
        if self.tree().kind(&src).await?.is_none() {
            return Err(FsError::not_found(src.path_str()));
        }
        let target = ops::rename_target(&self.tree(), &src, &dst).await?;
        if target == src {
            return Ok(());
        }
        let (from, to) = (self.local_path(&src), self.local_path(&target));
        debug!(src = %src, dst = %target, "rename");
        fs::rename(&from, &to)
            .await
            .map_err(|e| FsError::from_io(e, format!("{} -> {}", src, target)))
    }

    async fn delete(&self, path: &FsPath, recursive: bool) -> FsResult<()> {
        self.ensure_mounted().await?;
        let logical = self.logical(path)?;
        ops::remove_tree(&self.tree(), &logical, recursive).await
    }

    async fn get_file_block_locations(
        &self,
        status: &FileStatus,
        start: u64,
        len: u64,
    ) -> FsResult<Vec<BlockLocation>> {
        self.ensure_mounted().await?;
        let Some((start, len)) = ops::clamp_range(status.length, start, len) else {
            return Ok(Vec::new());
        };
        let logical = self.logical(&status.path.unqualified())?;
        match self.oracle.block_locations(&self.backend_key(&logical), start, len).await {
            Ok(locations) => Ok(locations),
            Err(err) => {
                warn!(error = %err, path = %logical, "block locations unavailable");
                Ok(Vec::new())
            }
        }
    }

    async fn get_block_size(&self, path: &FsPath) -> FsResult<u64> {
        self.ensure_mounted().await?;
        let logical = self.logical(path)?;
        let meta = self.metadata(&logical).await?;
        match self.oracle.block_size(&self.backend_key(&logical)).await {
            Ok(size) if size > 0 => Ok(size),
            Ok(_) => Ok(meta.len()),
            Err(err) => {
                warn!(error = %err, path = %logical, "block size unavailable");
                Ok(meta.len())
            }
        }
    }

    async fn get_replication(&self, path: &FsPath) -> FsResult<u16> {
        self.ensure_mounted().await?;
        let logical = self.logical(path)?;
        self.metadata(&logical).await?;
        match self.oracle.replication(&self.backend_key(&logical)).await {
            Ok(replication) => Ok(replication),
            Err(err) => {
                warn!(error = %err, path = %logical, "replication unavailable");
                Ok(1)
            }
        }
    }

    async fn get_status(&self) -> FsResult<FsStatus> {
        self.ensure_mounted().await?;

        #[cfg(unix)]
        {
            use rustix::fs::statvfs;

            let stat = statvfs(&self.mount_point)
                .map_err(|e| FsError::from_io(e.into(), self.mount_point.display()))?;
            let frsize = stat.f_frsize;
            Ok(FsStatus {
                capacity: stat.f_blocks * frsize,
                used: stat.f_blocks.saturating_sub(stat.f_bfree) * frsize,
                remaining: stat.f_bavail * frsize,
            })
        }

        #[cfg(not(unix))]
        {
            Err(FsError::unsupported("statvfs"))
        }
    }

    async fn set_owner(
        &self,
        path: &FsPath,
        owner: Option<&str>,
        group: Option<&str>,
    ) -> FsResult<()> {
        if owner.is_none() && group.is_none() {
            return Err(FsError::invalid_argument("owner and group are both unset"));
        }
        self.ensure_mounted().await?;
        let logical = self.logical(path)?;
        self.metadata(&logical).await?;
        let local = self.local_path(&logical);
        match (owner, group) {
            (Some(owner), group) => self.shell.chown(&local, owner, group).await,
            (None, Some(group)) => self.shell.chgrp(&local, group).await,
            (None, None) => Ok(()),
        }
    }

    async fn set_permission(&self, path: &FsPath, permission: FsPermission) -> FsResult<()> {
        self.ensure_mounted().await?;
        let logical = self.logical(path)?;
        let local = self.local_path(&logical);
        fs::set_permissions(&local, std::fs::Permissions::from_mode(permission.mode()))
            .await
            .map_err(|e| FsError::from_io(e, logical.path_str()))
    }

    fn statistics(&self) -> Arc<Statistics> {
        self.stats.clone()
    }

    async fn close(&self) -> FsResult<()> {
        let mut state = self.state.write().await;
        if *state != MountState::Closed {
            info!(mount_point = %self.mount_point.display(), "closing glusterfs mount adapter");
            *state = MountState::Closed;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Backend;
    use crate::shell::CommandOutput;
    use crate::testing::ScriptedRunner;
    use tempfile::TempDir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    async fn setup() -> (TempDir, Arc<ScriptedRunner>, LocalMountFileSystem) {
        let dir = TempDir::new().unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        runner.respond("mountpoint", CommandOutput::ok(""));
        let config = GlusterConfig::new(Backend::Fuse)
            .with_volume("gv0")
            .with_server("g1")
            .with_mount(dir.path());
        let fs = LocalMountFileSystem::new(config, runner.clone()).unwrap();
        fs.initialize().await.unwrap();
        (dir, runner, fs)
    }

    fn p(s: &str) -> FsPath {
        FsPath::parse(s).unwrap()
    }

    #[tokio::test]
    async fn test_missing_settings_fatal() {
        let runner = Arc::new(ScriptedRunner::new());
        let config = GlusterConfig::new(Backend::Fuse).with_volume("gv0");
        let fs = LocalMountFileSystem::new(config, runner).unwrap();
        let err = fs.initialize().await.unwrap_err();
        assert!(matches!(err, FsError::Config(_)));
        assert_eq!(fs.state().await, MountState::Uninitialized);
    }

    #[tokio::test]
    async fn test_operations_need_mount() {
        let runner = Arc::new(ScriptedRunner::new());
        let config = GlusterConfig::new(Backend::Fuse);
        let fs = LocalMountFileSystem::new(config, runner).unwrap();
        let err = fs.exists(&p("/x")).await.unwrap_err();
        assert!(matches!(err, FsError::Config(_)));
    }

    #[tokio::test]
    async fn test_initialize_once() {
        let (_dir, runner, fs) = setup().await;
        fs.initialize().await.unwrap();
        assert_eq!(fs.state().await, MountState::Mounted);
        assert_eq!(runner.calls_to("mountpoint").len(), 1);
    }

    #[tokio::test]
    async fn test_path_under_mount_not_doubled() {
        let (dir, _runner, fs) = setup().await;
        std::fs::write(dir.path().join("f.txt"), b"x").unwrap();

        let via_mount = FsPath::parse(&dir.path().join("f.txt").to_string_lossy()).unwrap();
        assert!(fs.exists(&via_mount).await.unwrap());
        assert!(fs.exists(&p("/f.txt")).await.unwrap());
        let status = fs.get_file_status(&via_mount).await.unwrap();
        assert_eq!(status.path.to_string(), "glusterfs://g1/f.txt");
    }

    #[tokio::test]
    async fn test_owner_placeholder_until_loaded() {
        let (_dir, runner, fs) = setup().await;
        fs.create(&p("/f"), CreateOptions::new()).await.unwrap().close().await.unwrap();
        runner.respond("ls", CommandOutput::ok("-rw-r----- 1 amy hadoop 0 Jan 1 00:00 f\n"));

        let mut status = fs.get_file_status(&p("/f")).await.unwrap();
        assert_eq!(status.owner(), "root");
        fs.load_permission_info(&mut status).await.unwrap();
        assert_eq!(status.owner(), "amy");
        assert_eq!(status.group(), "hadoop");
        assert_eq!(status.permission().map(|p| p.mode()), Some(0o640));
    }

    #[tokio::test]
    async fn test_append_unsupported() {
        let (_dir, _runner, fs) = setup().await;
        let err = fs.append(&p("/f")).await.unwrap_err();
        assert!(matches!(err, FsError::Unsupported(_)));
    }

    #[tokio::test]
    async fn test_set_owner_uses_chown_and_chgrp() {
        let (dir, runner, fs) = setup().await;
        std::fs::write(dir.path().join("f"), b"").unwrap();
        runner.respond("chown", CommandOutput::ok(""));
        runner.respond("chgrp", CommandOutput::ok(""));

        fs.set_owner(&p("/f"), Some("amy"), Some("hadoop")).await.unwrap();
        fs.set_owner(&p("/f"), None, Some("hadoop")).await.unwrap();
        let local = dir.path().join("f").to_string_lossy().into_owned();
        assert_eq!(runner.calls_to("chown"), vec![vec!["--".to_string(), "amy:hadoop".to_string(), local.clone()]]);
        assert_eq!(runner.calls_to("chgrp"), vec![vec!["--".to_string(), "hadoop".to_string(), local]]);
    }

    #[tokio::test]
    async fn test_set_permission() {
        let (dir, _runner, fs) = setup().await;
        std::fs::write(dir.path().join("f"), b"").unwrap();
        fs.set_permission(&p("/f"), FsPermission::from_mode(0o600)).await.unwrap();
        let mode = std::fs::metadata(dir.path().join("f")).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[tokio::test]
    async fn test_get_status_reports_capacity() {
        let (_dir, _runner, fs) = setup().await;
        let status = fs.get_status().await.unwrap();
        assert!(status.capacity > 0);
        assert!(status.remaining <= status.capacity);
    }

    #[tokio::test]
    async fn test_close_then_fail() {
        let (_dir, _runner, fs) = setup().await;
        fs.close().await.unwrap();
        assert!(matches!(fs.exists(&p("/")).await.unwrap_err(), FsError::Config(_)));
        assert!(matches!(fs.initialize().await.unwrap_err(), FsError::Config(_)));
    }

    #[tokio::test]
    async fn test_round_trip_through_mount() {
        let (_dir, _runner, fs) = setup().await;
        let mut out = fs.create(&p("/a/b/data"), CreateOptions::new()).await.unwrap();
        out.write_all(b"hello").await.unwrap();
        out.close().await.unwrap();

        let mut input = fs.open(&p("/a/b/data")).await.unwrap();
        assert_eq!(input.source(), StreamSource::Mount);
        let mut data = Vec::new();
        input.read_to_end(&mut data).await.unwrap();
        assert_eq!(data, b"hello");
        assert_eq!(fs.statistics().bytes_read(), 5);
    }
}
