//! Surface of the native GlusterFS client library.
//!
//! The adapter only talks to a volume through these traits. A connector
//! produces a [`Volume`]; a volume hands out [`VolumeFile`] handles bound to
//! one path. Handles are cheap and never shared: opening the same path
//! twice yields two independent handles.

use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use tokio::io::{AsyncSeek, AsyncWrite, BufReader};

use crate::error::{FsError, FsResult};
use crate::stream::ReadStream;
use crate::types::FsStatus;

/// Writable, seekable stream from [`VolumeFile::output_stream`].
pub trait VolumeWriter: AsyncWrite + AsyncSeek + Unpin + Send {}

impl<T: AsyncWrite + AsyncSeek + Unpin + Send> VolumeWriter for T {}

/// Metadata of one volume entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeStat {
    pub length: u64,
    pub is_dir: bool,
    /// Permission bits.
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub mtime: SystemTime,
}

/// Opens volume connections.
#[async_trait]
pub trait VolumeConnector: Send + Sync {
    async fn connect(&self, server: &str, volume: &str) -> FsResult<Arc<dyn Volume>>;
}

/// A connected volume.
#[async_trait]
pub trait Volume: Send + Sync {
    fn name(&self) -> &str;

    /// Handle for `path` (volume-absolute). Does not touch the volume.
    fn open(&self, path: &str) -> Box<dyn VolumeFile>;

    async fn statvfs(&self) -> FsResult<FsStatus>;

    /// Extended attribute value, `None` if absent.
    async fn getxattr(&self, path: &str, name: &str) -> FsResult<Option<String>>;
}

/// Handle bound to one path on a volume.
#[async_trait]
pub trait VolumeFile: Send + Sync {
    fn path(&self) -> &str;

    /// `None` if nothing exists at the path.
    async fn stat(&self) -> FsResult<Option<VolumeStat>>;

    /// Create an empty regular file. Fails if the path exists.
    async fn create_new_file(&self) -> FsResult<()>;

    /// Create one directory. The parent must exist.
    async fn mkdir(&self) -> FsResult<()>;

    /// Remove a file or an empty directory.
    async fn delete(&self) -> FsResult<()>;

    /// Move to `dst` (volume-absolute).
    async fn rename_to(&self, dst: &str) -> FsResult<()>;

    /// Entry names directly under a directory.
    async fn list_files(&self) -> FsResult<Vec<String>>;

    async fn chmod(&self, mode: u32) -> FsResult<()>;

    /// Change ownership; `-1` leaves an id unchanged.
    async fn chown(&self, uid: i64, gid: i64) -> FsResult<()>;

    /// Stream over the file's bytes from offset 0.
    async fn input_stream(&self) -> FsResult<Box<dyn ReadStream>>;

    /// Stream writing the existing file from offset 0, without truncating.
    async fn output_stream(&self) -> FsResult<Box<dyn VolumeWriter>>;

    async fn exists(&self) -> FsResult<bool> {
        Ok(self.stat().await?.is_some())
    }

    async fn is_directory(&self) -> FsResult<bool> {
        Ok(self.stat().await?.is_some_and(|st| st.is_dir))
    }

    /// Stat that treats a missing entry as `NotFound`.
    async fn require_stat(&self) -> FsResult<VolumeStat> {
        self.stat()
            .await?
            .ok_or_else(|| FsError::not_found(self.path().to_string()))
    }

    async fn length(&self) -> FsResult<u64> {
        Ok(self.require_stat().await?.length)
    }

    async fn uid(&self) -> FsResult<u32> {
        Ok(self.require_stat().await?.uid)
    }

    async fn gid(&self) -> FsResult<u32> {
        Ok(self.require_stat().await?.gid)
    }

    /// [`VolumeFile::input_stream`] behind a read buffer of `capacity` bytes.
    async fn buffered_input_stream(&self, capacity: usize) -> FsResult<Box<dyn ReadStream>> {
        let raw = self.input_stream().await?;
        Ok(Box::new(BufReader::with_capacity(capacity, raw)))
    }
}
