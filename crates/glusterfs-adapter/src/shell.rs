//! External command bridge.
//!
//! Every OS interaction the mount adapter needs (mounting, `ls -ld`,
//! ownership changes, xattr and ACL queries, id lookups) goes through a
//! [`CommandRunner`]. Commands are argument vectors, never shell lines.

use std::io;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::{FsError, FsResult};
use crate::types::{FsPermission, PermissionInfo};

/// Extended attribute carrying brick placement.
pub const PATHINFO_XATTR: &str = "trusted.glusterfs.pathinfo";

/// Captured result of one command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code; `None` if the process was killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Exit 0 with the given stdout.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Non-zero exit with the given stderr.
    pub fn exit(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Runs external programs.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args` and wait for it.
    ///
    /// An `Err` means the program could not be spawned at all.
    async fn run(&self, program: &str, args: &[String]) -> io::Result<CommandOutput>;
}

/// [`CommandRunner`] backed by `tokio::process`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioCommandRunner;

#[async_trait]
impl CommandRunner for TokioCommandRunner {
    async fn run(&self, program: &str, args: &[String]) -> io::Result<CommandOutput> {
        let output = Command::new(program).args(args).output().await?;
        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// How [`Shell::ensure_mounted`] got to a usable mount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountOutcome {
    /// The mount point was already mounted.
    AlreadyMounted,
    /// The mount command succeeded.
    Mounted,
    /// The mount command failed but a concurrent actor mounted the volume.
    MountedConcurrently,
    /// The mount binary could not be spawned; continuing without it.
    SpawnFailed,
}

/// ACL snapshot written by [`Shell::backup_acl`]. The file is removed on drop.
#[derive(Debug)]
pub struct AclBackup {
    file: NamedTempFile,
}

impl AclBackup {
    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

/// Typed wrappers over the commands the adapters use.
#[derive(Clone)]
pub struct Shell {
    runner: Arc<dyn CommandRunner>,
}

impl std::fmt::Debug for Shell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shell").finish_non_exhaustive()
    }
}

fn arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

impl Shell {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    /// Run a command and return its stdout.
    ///
    /// Exit codes listed in `tolerated` yield an empty string. Any other
    /// non-zero exit is a [`FsError::Process`]; a spawn failure is
    /// [`FsError::Io`].
    pub async fn exec(&self, program: &str, args: &[String], tolerated: &[i32]) -> FsResult<String> {
        let output = self
            .runner
            .run(program, args)
            .await
            .map_err(|e| FsError::Io(io::Error::new(e.kind(), format!("failed to run {program}: {e}"))))?;

        match output.code {
            Some(0) => Ok(output.stdout),
            Some(code) if tolerated.contains(&code) => {
                debug!(program, code, "tolerated exit code");
                Ok(String::new())
            }
            code => Err(FsError::Process {
                command: std::iter::once(program)
                    .chain(args.iter().map(String::as_str))
                    .collect::<Vec<_>>()
                    .join(" "),
                code,
                stderr: output.stderr.trim().to_string(),
            }),
        }
    }

    /// Returns true if `dir` is a mount point (`mountpoint -q`).
    pub async fn is_mounted(&self, dir: &Path) -> FsResult<bool> {
        let args = vec!["-q".to_string(), arg(dir)];
        let output = self
            .runner
            .run("mountpoint", &args)
            .await
            .map_err(|e| FsError::Io(io::Error::new(e.kind(), format!("failed to run mountpoint: {e}"))))?;
        Ok(output.success())
    }

    /// Make sure `server:/volume` is mounted at `mount_point`.
    ///
    /// Already mounted: nothing to do. Mount binary missing: warn and carry
    /// on. Mount exits non-zero: re-check, and fail with `Config` only if the
    /// volume is still not mounted.
    pub async fn ensure_mounted(
        &self,
        server: &str,
        volume: &str,
        mount_point: &Path,
    ) -> FsResult<MountOutcome> {
        match self.is_mounted(mount_point).await {
            Ok(true) => {
                debug!(mount_point = %mount_point.display(), "volume already mounted");
                return Ok(MountOutcome::AlreadyMounted);
            }
            Ok(false) => {}
            Err(err) => {
                warn!(error = %err, mount_point = %mount_point.display(), "mount check failed; attempting mount");
            }
        }

        let source = format!("{server}:/{volume}");
        let args = vec![
            "-t".to_string(),
            "glusterfs".to_string(),
            source.clone(),
            arg(mount_point),
        ];
        match self.exec("mount", &args, &[]).await {
            Ok(_) => {
                info!(source = %source, mount_point = %mount_point.display(), "mounted volume");
                Ok(MountOutcome::Mounted)
            }
            Err(FsError::Io(err)) => {
                warn!(error = %err, source = %source, "mount command unavailable; continuing without mounting");
                Ok(MountOutcome::SpawnFailed)
            }
            Err(err) => {
                if matches!(self.is_mounted(mount_point).await, Ok(true)) {
                    info!(source = %source, mount_point = %mount_point.display(), "volume mounted concurrently");
                    return Ok(MountOutcome::MountedConcurrently);
                }
                Err(FsError::config(format!(
                    "could not mount {source} at {}: {err}",
                    mount_point.display()
                )))
            }
        }
    }

    /// Owner, group and permission bits from `ls -ld`.
    ///
    /// Exit code 1 means no data: the info is marked loaded with every field
    /// unset.
    pub async fn permission_info(&self, path: &Path) -> FsResult<PermissionInfo> {
        let stdout = self
            .exec("ls", &["-ld".to_string(), arg(path)], &[1])
            .await?;
        Ok(parse_ls_line(&stdout))
    }

    /// `chown -- user[:group] path`.
    pub async fn chown(&self, path: &Path, user: &str, group: Option<&str>) -> FsResult<()> {
        let owner = match group {
            Some(group) => format!("{user}:{group}"),
            None => user.to_string(),
        };
        self.exec("chown", &["--".to_string(), owner, arg(path)], &[]).await?;
        Ok(())
    }

    /// `chgrp -- group path`.
    pub async fn chgrp(&self, path: &Path, group: &str) -> FsResult<()> {
        self.exec("chgrp", &["--".to_string(), group.to_string(), arg(path)], &[]).await?;
        Ok(())
    }

    /// Raw `trusted.glusterfs.pathinfo` value, `None` when unavailable.
    pub async fn pathinfo(&self, path: &Path) -> FsResult<Option<String>> {
        let args = vec![
            "--absolute-names".to_string(),
            "--only-values".to_string(),
            "-n".to_string(),
            PATHINFO_XATTR.to_string(),
            arg(path),
        ];
        let stdout = self.exec("getfattr", &args, &[1]).await?;
        let value = stdout.trim();
        Ok((!value.is_empty()).then(|| value.to_string()))
    }

    /// Save the ACLs under `path` (recursively) into a temporary file.
    pub async fn backup_acl(&self, path: &Path) -> FsResult<AclBackup> {
        let stdout = self
            .exec("getfacl", &["-pPdEsR".to_string(), arg(path)], &[])
            .await?;
        let file = tempfile::Builder::new()
            .prefix("glusterfs-acl-")
            .tempfile()?;
        tokio::fs::write(file.path(), stdout.as_bytes()).await?;
        debug!(path = %path.display(), backup = %file.path().display(), "saved ACLs");
        Ok(AclBackup { file })
    }

    /// Re-apply ACLs saved by [`Shell::backup_acl`].
    pub async fn restore_acl(&self, backup: &AclBackup) -> FsResult<()> {
        let flag = format!("--restore={}", backup.path().display());
        self.exec("setfacl", &[flag], &[]).await?;
        Ok(())
    }

    /// Numeric uid for a user name or number.
    pub async fn uid_of(&self, user: &str) -> FsResult<u32> {
        if let Ok(uid) = user.parse() {
            return Ok(uid);
        }
        let stdout = self.exec("id", &["-u".to_string(), user.to_string()], &[]).await?;
        stdout
            .trim()
            .parse()
            .map_err(|_| FsError::other(format!("unexpected `id -u {user}` output: {stdout}")))
    }

    /// Numeric gid for a group name or number.
    pub async fn gid_of(&self, group: &str) -> FsResult<u32> {
        if let Ok(gid) = group.parse() {
            return Ok(gid);
        }
        let stdout = self
            .exec("getent", &["group".to_string(), group.to_string()], &[])
            .await?;
        stdout
            .trim()
            .split(':')
            .nth(2)
            .and_then(|gid| gid.parse().ok())
            .ok_or_else(|| FsError::other(format!("unexpected `getent group {group}` output: {stdout}")))
    }
}

/// Parse the first line of `ls -ld` output.
///
/// Tokens: permission string, link count, owner, group. The permission
/// string is cut to 10 characters (drops ACL `+` and SELinux `.` markers).
fn parse_ls_line(stdout: &str) -> PermissionInfo {
    let tokens: Vec<&str> = stdout
        .lines()
        .next()
        .unwrap_or("")
        .split_whitespace()
        .take(4)
        .collect();
    if tokens.len() < 4 {
        return PermissionInfo::loaded(None, None, None);
    }

    let symbolic: String = tokens[0].chars().take(10).collect();
    let permission = match FsPermission::from_symbolic(&symbolic) {
        Ok(perm) => Some(perm),
        Err(err) => {
            debug!(error = %err, "ignoring unparseable permission string");
            None
        }
    };
    PermissionInfo::loaded(
        Some(tokens[2].to_string()),
        Some(tokens[3].to_string()),
        permission,
    )
}
