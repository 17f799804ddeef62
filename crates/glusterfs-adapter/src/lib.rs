//! # glusterfs-adapter
//!
//! GlusterFS behind a generic hierarchical filesystem contract.
//!
//! Key components:
//!
//! - [`FileSystem`] - The contract (open/create/rename/delete/stat/list/...)
//! - [`LocalMountFileSystem`] - Mounts the volume via FUSE, then local file I/O
//! - [`NativeFileSystem`] - Talks to the volume through the client library
//! - [`LocalityOracle`] - Block placement from the pathinfo xattr
//! - [`Shell`] - Typed wrappers over the OS commands the mount adapter runs
//! - [`FsInputStream`] / [`FsOutputStream`] - Streams that feed [`Statistics`]
//!
//! ## Design Decisions
//!
//! - **Volume-rooted paths**: callers see `/a/b`; the mount adapter maps it
//!   under the mount point, the native adapter hands it to the volume.
//! - **Explicit collaborators**: commands run through a [`CommandRunner`],
//!   the client library sits behind [`VolumeConnector`]. Both are swapped
//!   for doubles in tests.
//! - **Degrade on placement errors**: block locations, block size and
//!   replication fall back to defaults when the xattr is unavailable.

pub mod config;
pub mod error;
pub mod filesystem;
pub mod locality;
pub mod mount;
pub mod native;
pub mod ops;
pub mod path;
pub mod shell;
pub mod stream;
pub mod testing;
pub mod types;

use std::sync::Arc;

pub use config::{Backend, GlusterConfig};
pub use error::{FsError, FsResult};
pub use filesystem::FileSystem;
pub use locality::{BrickHint, LocalityOracle, PathInfoOracle};
pub use mount::{LocalMountFileSystem, MountState};
pub use native::NativeFileSystem;
pub use native::memory::{MemoryConnector, MemoryVolume};
pub use native::volume::{Volume, VolumeConnector, VolumeFile, VolumeStat};
pub use path::{FsPath, PathResolver};
pub use shell::{CommandOutput, CommandRunner, Shell, TokioCommandRunner};
pub use stream::{FsInputStream, FsOutputStream, Statistics, StreamSource};
pub use types::{BlockLocation, CreateOptions, FileStatus, FsPermission, FsStatus};

/// Collaborators an adapter is built with.
#[derive(Clone)]
pub struct AdapterEnv {
    /// Runs OS commands (mount, ls, chown, getfattr, id lookups).
    pub runner: Arc<dyn CommandRunner>,
    /// Client library entry point; required for the native backend.
    pub connector: Option<Arc<dyn VolumeConnector>>,
}

impl Default for AdapterEnv {
    fn default() -> Self {
        Self {
            runner: Arc::new(TokioCommandRunner),
            connector: None,
        }
    }
}

impl AdapterEnv {
    pub fn with_connector(mut self, connector: Arc<dyn VolumeConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    pub fn with_runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.runner = runner;
        self
    }
}

/// Build and initialize the adapter `config.backend` selects.
pub async fn open_filesystem(
    config: GlusterConfig,
    env: AdapterEnv,
) -> FsResult<Arc<dyn FileSystem>> {
    match config.backend {
        Backend::Fuse => {
            let fs = LocalMountFileSystem::new(config, env.runner)?;
            fs.initialize().await?;
            Ok(Arc::new(fs))
        }
        Backend::Native => {
            let connector = env
                .connector
                .ok_or_else(|| FsError::config("native backend needs a volume connector"))?;
            let fs = NativeFileSystem::connect(&config, connector.as_ref(), env.runner).await?;
            Ok(Arc::new(fs))
        }
    }
}
