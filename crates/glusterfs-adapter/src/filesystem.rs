//! The filesystem contract both adapters implement.
//!
//! Path arguments may be relative; they resolve against the adapter's
//! working directory. Returned statuses carry host-qualified absolute paths.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::FsResult;
use crate::path::FsPath;
use crate::stream::{FsInputStream, FsOutputStream, Statistics};
use crate::types::{BlockLocation, CreateOptions, DEFAULT_BLOCK_SIZE, FileStatus, FsPermission, FsStatus};

/// Hierarchical filesystem operations.
#[async_trait]
pub trait FileSystem: Send + Sync {
    // ========================================================================
    // Identity and working directory
    // ========================================================================

    /// Filesystem URI, e.g. `glusterfs://server1`.
    fn uri(&self) -> String;

    /// Absolute working directory.
    fn working_directory(&self) -> FsPath;

    /// Change the working directory. Relative paths resolve against the
    /// current one.
    fn set_working_directory(&self, path: &FsPath) -> FsResult<()>;

    /// `/user/<name>` for the current user.
    fn home_directory(&self) -> FsPath {
        FsPath::root().child("user").child(&whoami::username())
    }

    /// Attach this filesystem's scheme and authority to a path.
    fn qualify(&self, path: &FsPath) -> FsPath;

    // ========================================================================
    // Metadata
    // ========================================================================

    async fn exists(&self, path: &FsPath) -> FsResult<bool>;

    /// Create a directory and any missing parents. Idempotent.
    async fn mkdirs(&self, path: &FsPath, permission: Option<FsPermission>) -> FsResult<()>;

    /// A file yields its own status; a directory yields its children
    /// sorted by name.
    async fn list_status(&self, path: &FsPath) -> FsResult<Vec<FileStatus>>;

    async fn get_file_status(&self, path: &FsPath) -> FsResult<FileStatus>;

    /// Fill in owner, group and permission. No-op once loaded.
    async fn load_permission_info(&self, status: &mut FileStatus) -> FsResult<()>;

    // ========================================================================
    // Data
    // ========================================================================

    async fn open(&self, path: &FsPath) -> FsResult<FsInputStream>;

    /// Create a file, replacing an existing one only with `overwrite`.
    /// Missing parents are created.
    async fn create(&self, path: &FsPath, options: CreateOptions) -> FsResult<FsOutputStream>;

    /// Open an existing file for writing at its end.
    async fn append(&self, path: &FsPath) -> FsResult<FsOutputStream>;

    /// Rename `src` to `dst`, or into `dst` if it is an existing directory.
    async fn rename(&self, src: &FsPath, dst: &FsPath) -> FsResult<()>;

    /// Delete a file or directory. Populated directories need `recursive`.
    async fn delete(&self, path: &FsPath, recursive: bool) -> FsResult<()>;

    // ========================================================================
    // Placement
    // ========================================================================

    /// Hosts for `[start, start + len)`. Empty when placement is unknown.
    async fn get_file_block_locations(
        &self,
        status: &FileStatus,
        start: u64,
        len: u64,
    ) -> FsResult<Vec<BlockLocation>>;

    fn default_block_size(&self) -> u64 {
        DEFAULT_BLOCK_SIZE
    }

    /// Block size of one file, falling back to its length when unknown.
    async fn get_block_size(&self, path: &FsPath) -> FsResult<u64>;

    async fn get_replication(&self, path: &FsPath) -> FsResult<u16>;

    async fn get_status(&self) -> FsResult<FsStatus>;

    // ========================================================================
    // Ownership
    // ========================================================================

    /// Change owner and/or group. At least one must be given.
    async fn set_owner(
        &self,
        path: &FsPath,
        owner: Option<&str>,
        group: Option<&str>,
    ) -> FsResult<()>;

    async fn set_permission(&self, path: &FsPath, permission: FsPermission) -> FsResult<()>;

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Counters shared by all streams this adapter opened.
    fn statistics(&self) -> Arc<Statistics>;

    async fn close(&self) -> FsResult<()>;
}
