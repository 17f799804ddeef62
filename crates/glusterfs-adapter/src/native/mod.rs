//! Native-client adapter.
//!
//! Talks to a volume through the client-library traits in [`volume`]. The
//! library only knows volume-absolute paths and per-file handles, so this
//! adapter supplies the rest of the filesystem contract on top: working
//! directory resolution, parent creation, recursive delete, rename with a
//! copy fallback, and block placement from the pathinfo xattr.

pub mod memory;
pub mod volume;

use std::io::SeekFrom;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncSeekExt, AsyncWriteExt, BufWriter};
use tracing::{debug, info, warn};

use crate::config::GlusterConfig;
use crate::error::{FsError, FsResult};
use crate::filesystem::FileSystem;
use crate::locality::{LocalityOracle, PathInfoOracle, VolumeXattrSource, local_hostname};
use crate::ops::{self, EntryKind, TreeOps};
use crate::path::{FsPath, GLUSTERFS_SCHEME, PathResolver};
use crate::shell::{CommandRunner, Shell};
use crate::stream::{FsInputStream, FsOutputStream, Statistics, StreamSource};
use crate::types::{
    BlockLocation, CreateOptions, FileStatus, FsPermission, FsStatus, PermissionInfo,
};

use self::volume::{Volume, VolumeConnector, VolumeStat};

/// [`TreeOps`] over a connected volume.
struct VolumeTree<'a>(&'a dyn Volume);

#[async_trait]
impl<'a> TreeOps for VolumeTree<'a> {
    async fn kind(&self, path: &FsPath) -> FsResult<Option<EntryKind>> {
        let stat = self.0.open(&path.path_str()).stat().await?;
        Ok(stat.map(|st| if st.is_dir { EntryKind::Directory } else { EntryKind::File }))
    }

    async fn make_dir(&self, path: &FsPath) -> FsResult<()> {
        self.0.open(&path.path_str()).mkdir().await
    }

    async fn child_names(&self, path: &FsPath) -> FsResult<Vec<String>> {
        self.0.open(&path.path_str()).list_files().await
    }

    async fn remove_entry(&self, path: &FsPath, _kind: EntryKind) -> FsResult<()> {
        self.0.open(&path.path_str()).delete().await
    }
}

/// Filesystem served through a native volume connection.
pub struct NativeFileSystem {
    volume: Arc<dyn Volume>,
    resolver: PathResolver,
    oracle: Arc<dyn LocalityOracle>,
    shell: Shell,
    stats: Arc<Statistics>,
    authority: String,
    buffer_size: usize,
}

impl std::fmt::Debug for NativeFileSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeFileSystem")
            .field("volume", &self.volume.name())
            .field("authority", &self.authority)
            .field("working_directory", &self.resolver.working_directory())
            .finish_non_exhaustive()
    }
}

impl NativeFileSystem {
    /// Connect to the configured volume.
    ///
    /// Server and volume default to `localhost` and `gv0`. The working
    /// directory starts at `/user/<name>` and is created if missing; failing
    /// to create it is logged, not fatal.
    pub async fn connect(
        config: &GlusterConfig,
        connector: &dyn VolumeConnector,
        runner: Arc<dyn CommandRunner>,
    ) -> FsResult<Self> {
        let server = config.native_server();
        let volume_name = config.native_volume();
        let volume = connector.connect(server, volume_name).await?;
        info!(server, volume = volume_name, "connected to volume");

        let buffer_size = config.tuned_buffer_size();
        if config.buffer_size != Some(buffer_size) {
            debug!(requested = ?config.buffer_size, buffer_size, "tuned I/O buffer size");
        }

        let working_dir = FsPath::root().child("user").child(&whoami::username());
        let oracle = PathInfoOracle::new(
            Arc::new(VolumeXattrSource::new(volume.clone())),
            local_hostname(),
        );
        let fs = Self {
            resolver: PathResolver::new(GLUSTERFS_SCHEME, working_dir.clone())?,
            oracle: Arc::new(oracle),
            shell: Shell::new(runner),
            stats: Arc::new(Statistics::new()),
            authority: config.authority().unwrap_or_else(|| server.to_string()),
            buffer_size,
            volume,
        };

        if let Err(err) = ops::mkdirs(&fs.tree(), &working_dir).await {
            warn!(error = %err, path = %working_dir, "could not create working directory");
        }
        Ok(fs)
    }

    /// Replace the locality oracle.
    pub fn with_oracle(mut self, oracle: Arc<dyn LocalityOracle>) -> Self {
        self.oracle = oracle;
        self
    }

    /// Read buffer size after tuning.
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    pub fn volume(&self) -> &Arc<dyn Volume> {
        &self.volume
    }

    fn tree(&self) -> VolumeTree<'_> {
        VolumeTree(self.volume.as_ref())
    }

    fn status_from(&self, path: &FsPath, st: &VolumeStat) -> FileStatus {
        let qualified = self.qualify(path);
        let status = if st.is_dir {
            FileStatus::directory(qualified, st.mtime)
        } else {
            FileStatus::file(qualified, st.length, st.mtime)
        };
        status.with_perms(PermissionInfo::loaded(
            Some(st.uid.to_string()),
            Some(st.gid.to_string()),
            Some(FsPermission::from_mode(st.mode)),
        ))
    }

    async fn stat(&self, path: &FsPath) -> FsResult<Option<VolumeStat>> {
        self.volume.open(&path.path_str()).stat().await
    }

    async fn require_stat(&self, path: &FsPath) -> FsResult<VolumeStat> {
        self.stat(path)
            .await?
            .ok_or_else(|| FsError::not_found(path.path_str()))
    }

    async fn resolve_uid(&self, user: &str) -> FsResult<i64> {
        match user.parse::<i64>() {
            Ok(uid) => Ok(uid),
            Err(_) => Ok(i64::from(self.shell.uid_of(user).await?)),
        }
    }

    async fn resolve_gid(&self, group: &str) -> FsResult<i64> {
        match group.parse::<i64>() {
            Ok(gid) => Ok(gid),
            Err(_) => Ok(i64::from(self.shell.gid_of(group).await?)),
        }
    }

    fn output(&self, writer: Box<dyn volume::VolumeWriter>, capacity: usize, path: &FsPath) -> FsOutputStream {
        FsOutputStream::new(
            Box::new(BufWriter::with_capacity(capacity, writer)),
            self.stats.clone(),
            self.qualify(path),
        )
    }

    /// Copy `src` to `dst` across handles, directories recursively.
    async fn copy_tree(&self, src: &FsPath, dst: &FsPath) -> FsResult<()> {
        let mut pending = vec![(src.clone(), dst.clone())];
        while let Some((from, to)) = pending.pop() {
            let from_file = self.volume.open(&from.path_str());
            let to_file = self.volume.open(&to.path_str());
            let st = from_file.require_stat().await?;
            if st.is_dir {
                to_file.mkdir().await?;
                for name in from_file.list_files().await? {
                    pending.push((from.child(&name), to.child(&name)));
                }
            } else {
                to_file.create_new_file().await?;
                let mut reader = from_file.buffered_input_stream(self.buffer_size).await?;
                let mut writer = to_file.output_stream().await?;
                tokio::io::copy(&mut reader, &mut writer).await?;
                writer.shutdown().await?;
            }
            to_file.chmod(st.mode).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl FileSystem for NativeFileSystem {
    fn uri(&self) -> String {
        format!("{GLUSTERFS_SCHEME}://{}", self.authority)
    }

    fn working_directory(&self) -> FsPath {
        self.resolver.working_directory()
    }

    fn set_working_directory(&self, path: &FsPath) -> FsResult<()> {
        self.resolver.set_working_directory(path)
    }

    fn qualify(&self, path: &FsPath) -> FsPath {
        let absolute = self
            .resolver
            .resolve(path)
            .unwrap_or_else(|_| path.unqualified());
        absolute.qualified(GLUSTERFS_SCHEME, Some(&self.authority))
    }

    async fn exists(&self, path: &FsPath) -> FsResult<bool> {
        let path = self.resolver.resolve(path)?;
        Ok(self.stat(&path).await?.is_some())
    }

    async fn mkdirs(&self, path: &FsPath, permission: Option<FsPermission>) -> FsResult<()> {
        let path = self.resolver.resolve(path)?;
        ops::mkdirs(&self.tree(), &path).await?;
        if let Some(permission) = permission {
            self.volume.open(&path.path_str()).chmod(permission.mode()).await?;
        }
        Ok(())
    }

    async fn list_status(&self, path: &FsPath) -> FsResult<Vec<FileStatus>> {
        let path = self.resolver.resolve(path)?;
        let st = self.require_stat(&path).await?;
        if !st.is_dir {
            return Ok(vec![self.status_from(&path, &st)]);
        }

        let names = self.volume.open(&path.path_str()).list_files().await?;
        let mut statuses = Vec::with_capacity(names.len());
        for name in names {
            let child = path.child(&name);
            match self.stat(&child).await? {
                Some(st) => statuses.push(self.status_from(&child, &st)),
                None => debug!(path = %child, "entry vanished while listing"),
            }
        }
        statuses.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(statuses)
    }

    async fn get_file_status(&self, path: &FsPath) -> FsResult<FileStatus> {
        let path = self.resolver.resolve(path)?;
        let st = self.require_stat(&path).await?;
        Ok(self.status_from(&path, &st))
    }

    async fn load_permission_info(&self, status: &mut FileStatus) -> FsResult<()> {
        if status.permissions_loaded() {
            return Ok(());
        }
        let path = status.path.unqualified();
        let st = self.require_stat(&path).await?;
        status.perms = self.status_from(&path, &st).perms;
        Ok(())
    }

    async fn open(&self, path: &FsPath) -> FsResult<FsInputStream> {
        let path = self.resolver.resolve(path)?;
        let file = self.volume.open(&path.path_str());
        let st = file
            .stat()
            .await?
            .ok_or_else(|| FsError::not_found(path.path_str()))?;
        if st.is_dir {
            return Err(FsError::is_a_directory(path.path_str()));
        }
        let stream = file.buffered_input_stream(self.buffer_size).await?;
        Ok(FsInputStream::new(
            stream,
            self.stats.clone(),
            StreamSource::Native,
            self.qualify(&path),
        ))
    }

    async fn create(&self, path: &FsPath, options: CreateOptions) -> FsResult<FsOutputStream> {
        let path = self.resolver.resolve(path)?;
        let file = self.volume.open(&path.path_str());
        match file.stat().await? {
            Some(st) if st.is_dir => return Err(FsError::is_a_directory(path.path_str())),
            Some(_) if !options.overwrite => {
                return Err(FsError::already_exists(path.path_str()));
            }
            Some(_) => {
                debug!(path = %path, "replacing existing file");
                file.delete().await?;
            }
            None => {}
        }

        ops::ensure_parent(&self.tree(), &path).await?;
        file.create_new_file().await?;
        if let Some(permission) = options.permission {
            file.chmod(permission.mode()).await?;
        }
        let writer = file.output_stream().await?;
        let capacity = options.buffer_size.unwrap_or(self.buffer_size);
        Ok(self.output(writer, capacity, &path))
    }

    async fn append(&self, path: &FsPath) -> FsResult<FsOutputStream> {
        let path = self.resolver.resolve(path)?;
        let file = self.volume.open(&path.path_str());
        let st = file
            .stat()
            .await?
            .ok_or_else(|| FsError::not_found(path.path_str()))?;
        if st.is_dir {
            return Err(FsError::is_a_directory(path.path_str()));
        }
        let mut writer = file.output_stream().await?;
        writer.seek(SeekFrom::Start(st.length)).await?;
        Ok(self.output(writer, self.buffer_size, &path))
    }

    async fn rename(&self, src: &FsPath, dst: &FsPath) -> FsResult<()> {
        let src = self.resolver.resolve(src)?;
        let dst = self.resolver.resolve(dst)?;
        self.require_stat(&src).await?;

        let target = ops::rename_target(&self.tree(), &src, &dst).await?;
        if target == src {
            return Ok(());
        }

        let native = self
            .volume
            .open(&src.path_str())
            .rename_to(&target.path_str())
            .await;
        if let Err(err) = native {
            warn!(error = %err, src = %src, dst = %target, "native rename failed; copying instead");
            self.copy_tree(&src, &target).await?;
            ops::remove_tree(&self.tree(), &src, true).await?;
        }
        Ok(())
    }

    async fn delete(&self, path: &FsPath, recursive: bool) -> FsResult<()> {
        let path = self.resolver.resolve(path)?;
        ops::remove_tree(&self.tree(), &path, recursive).await
    }

    async fn get_file_block_locations(
        &self,
        status: &FileStatus,
        start: u64,
        len: u64,
    ) -> FsResult<Vec<BlockLocation>> {
        let Some((start, len)) = ops::clamp_range(status.length, start, len) else {
            return Ok(Vec::new());
        };
        let path = status.path.unqualified();
        match self.oracle.block_locations(&path.path_str(), start, len).await {
            Ok(locations) => Ok(locations),
            Err(err) => {
                warn!(error = %err, path = %path, "block locations unavailable");
                Ok(Vec::new())
            }
        }
    }

    async fn get_block_size(&self, path: &FsPath) -> FsResult<u64> {
        let path = self.resolver.resolve(path)?;
        let st = self.require_stat(&path).await?;
        match self.oracle.block_size(&path.path_str()).await {
            Ok(size) if size > 0 => Ok(size),
            Ok(_) => Ok(st.length),
            Err(err) => {
                warn!(error = %err, path = %path, "block size unavailable");
                Ok(st.length)
            }
        }
    }

    async fn get_replication(&self, path: &FsPath) -> FsResult<u16> {
        let path = self.resolver.resolve(path)?;
        self.require_stat(&path).await?;
        match self.oracle.replication(&path.path_str()).await {
            Ok(replication) => Ok(replication),
            Err(err) => {
                warn!(error = %err, path = %path, "replication unavailable");
                Ok(1)
            }
        }
    }

    async fn get_status(&self) -> FsResult<FsStatus> {
        self.volume.statvfs().await
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
        let path = self.resolver.resolve(path)?;
        let file = self.volume.open(&path.path_str());
        let st = file.require_stat().await?;
        let uid = match owner {
            Some(owner) => self.resolve_uid(owner).await?,
            None => i64::from(st.uid),
        };
        let gid = match group {
            Some(group) => self.resolve_gid(group).await?,
            None => i64::from(st.gid),
        };
        file.chown(uid, gid).await
    }

    async fn set_permission(&self, path: &FsPath, permission: FsPermission) -> FsResult<()> {
        let path = self.resolver.resolve(path)?;
        let file = self.volume.open(&path.path_str());
        file.require_stat().await?;
        file.chmod(permission.mode()).await
    }

    fn statistics(&self) -> Arc<Statistics> {
        self.stats.clone()
    }

    async fn close(&self) -> FsResult<()> {
        info!(volume = self.volume.name(), "closing native filesystem");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Backend, TUNED_BUFFER_SIZE};
    use crate::native::memory::{MemoryConnector, MemoryVolume};
    use crate::testing::ScriptedRunner;
    use tokio::io::AsyncReadExt;

    async fn connect(config: GlusterConfig) -> (NativeFileSystem, MemoryVolume) {
        let connector = MemoryConnector::new(MemoryVolume::new("gv0"));
        let fs = NativeFileSystem::connect(&config, &connector, Arc::new(ScriptedRunner::new()))
            .await
            .unwrap();
        (fs, connector.volume().clone())
    }

    fn p(s: &str) -> FsPath {
        FsPath::parse(s).unwrap()
    }

    #[tokio::test]
    async fn test_connect_defaults() {
        let connector = MemoryConnector::new(MemoryVolume::new("gv0"));
        let config = GlusterConfig::new(Backend::Native).with_buffer_size(4096);
        let fs = NativeFileSystem::connect(&config, &connector, Arc::new(ScriptedRunner::new()))
            .await
            .unwrap();

        assert_eq!(
            connector.connections(),
            vec![("localhost".to_string(), "gv0".to_string())]
        );
        assert_eq!(fs.buffer_size(), TUNED_BUFFER_SIZE);
        assert_eq!(fs.uri(), "glusterfs://localhost");

        let home = fs.working_directory();
        assert_eq!(home, fs.home_directory());
        assert!(fs.exists(&home).await.unwrap());
    }

    #[tokio::test]
    async fn test_relative_paths_use_working_directory() {
        let (fs, vol) = connect(GlusterConfig::new(Backend::Native)).await;
        let mut out = fs.create(&p("data.txt"), CreateOptions::new()).await.unwrap();
        out.write_all(b"abc").await.unwrap();
        out.close().await.unwrap();

        let abs = fs.working_directory().child("data.txt");
        assert_eq!(vol.contents(&abs.path_str()).as_deref(), Some(&b"abc"[..]));

        let status = fs.get_file_status(&p("data.txt")).await.unwrap();
        assert_eq!(status.path.to_string(), format!("glusterfs://localhost{}", abs.path_str()));
    }

    #[tokio::test]
    async fn test_append_positions_at_end() {
        let (fs, vol) = connect(GlusterConfig::new(Backend::Native)).await;
        let mut out = fs.create(&p("/log"), CreateOptions::new()).await.unwrap();
        out.write_all(b"one").await.unwrap();
        out.close().await.unwrap();

        let mut out = fs.append(&p("/log")).await.unwrap();
        out.write_all(b"two").await.unwrap();
        out.close().await.unwrap();
        assert_eq!(vol.contents("/log").as_deref(), Some(&b"onetwo"[..]));

        assert!(fs.append(&p("/missing")).await.unwrap_err().is_not_found());
        fs.mkdirs(&p("/dir"), None).await.unwrap();
        assert!(matches!(
            fs.append(&p("/dir")).await.unwrap_err(),
            FsError::IsADirectory(_)
        ));
    }

    #[tokio::test]
    async fn test_rename_falls_back_to_copy() {
        let (fs, vol) = connect(GlusterConfig::new(Backend::Native)).await;
        fs.mkdirs(&p("/src/sub"), None).await.unwrap();
        let mut out = fs.create(&p("/src/sub/f"), CreateOptions::new()).await.unwrap();
        out.write_all(b"payload").await.unwrap();
        out.close().await.unwrap();

        vol.fail_renames(true);
        fs.rename(&p("/src"), &p("/dst")).await.unwrap();

        assert!(!fs.exists(&p("/src")).await.unwrap());
        assert_eq!(vol.contents("/dst/sub/f").as_deref(), Some(&b"payload"[..]));
    }

    #[tokio::test]
    async fn test_read_at_and_position() {
        let (fs, _vol) = connect(GlusterConfig::new(Backend::Native)).await;
        let mut out = fs.create(&p("/f"), CreateOptions::new()).await.unwrap();
        out.write_all(b"0123456789").await.unwrap();
        out.close().await.unwrap();

        let mut input = fs.open(&p("/f")).await.unwrap();
        assert_eq!(input.source(), StreamSource::Native);
        let mut buf = [0u8; 2];
        input.read_at(8, &mut buf).await.unwrap();
        assert_eq!(&buf, b"89");
        assert_eq!(input.position().await.unwrap(), 10);

        input.seek_to(0).await.unwrap();
        let mut rest = Vec::new();
        input.read_to_end(&mut rest).await.unwrap();
        assert_eq!(rest, b"0123456789");
    }

    #[tokio::test]
    async fn test_set_owner_keeps_unset_fields() {
        let connector = MemoryConnector::new(MemoryVolume::with_owner("gv0", 100, 200));
        let runner = Arc::new(ScriptedRunner::new());
        runner.respond("getent", crate::shell::CommandOutput::ok("hadoop:x:500:\n"));
        let fs = NativeFileSystem::connect(&GlusterConfig::new(Backend::Native), &connector, runner)
            .await
            .unwrap();
        fs.create(&p("/f"), CreateOptions::new()).await.unwrap().close().await.unwrap();

        fs.set_owner(&p("/f"), None, Some("hadoop")).await.unwrap();
        let st = connector.volume().open("/f").require_stat().await.unwrap();
        assert_eq!((st.uid, st.gid), (100, 500));

        fs.set_owner(&p("/f"), Some("42"), None).await.unwrap();
        let st = connector.volume().open("/f").require_stat().await.unwrap();
        assert_eq!((st.uid, st.gid), (42, 500));

        let err = fs.set_owner(&p("/f"), None, None).await.unwrap_err();
        assert!(matches!(err, FsError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_block_size_falls_back_to_length() {
        let (fs, vol) = connect(GlusterConfig::new(Backend::Native)).await;
        let mut out = fs.create(&p("/f"), CreateOptions::new()).await.unwrap();
        out.write_all(&[7u8; 300]).await.unwrap();
        out.close().await.unwrap();
        assert_eq!(fs.get_block_size(&p("/f")).await.unwrap(), 300);

        vol.set_pathinfo("/f", "(<STRIPE:v-stripe-0:[128]> <POSIX(/b1):h1:/b1/f> <POSIX(/b2):h2:/b2/f>)");
        assert_eq!(fs.get_block_size(&p("/f")).await.unwrap(), 128);

        let status = fs.get_file_status(&p("/f")).await.unwrap();
        let locations = fs.get_file_block_locations(&status, 0, 300).await.unwrap();
        assert_eq!(locations.len(), 3);
        assert_eq!(locations[1].hosts, vec!["h2"]);
    }
}
