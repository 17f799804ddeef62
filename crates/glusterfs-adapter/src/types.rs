//! Value types returned by the filesystem contract.

use std::fmt;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::error::{FsError, FsResult};
use crate::path::FsPath;

/// Block size reported for files when the volume gives no better answer (64 MiB).
pub const DEFAULT_BLOCK_SIZE: u64 = 1 << 26;

/// Owner and group reported before permission info is loaded.
pub const PLACEHOLDER_OWNER: &str = "root";

/// Unix permission bits, including setuid/setgid/sticky.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FsPermission(u16);

impl FsPermission {
    /// Create from a numeric mode; bits above 0o7777 are dropped.
    pub fn from_mode(mode: u32) -> Self {
        Self((mode & 0o7777) as u16)
    }

    /// Numeric mode.
    pub fn mode(&self) -> u32 {
        u32::from(self.0)
    }

    /// Default mode for new files.
    pub fn file_default() -> Self {
        Self(0o644)
    }

    /// Default mode for new directories.
    pub fn dir_default() -> Self {
        Self(0o755)
    }

    /// Parse an `ls`-style permission string such as `drwxr-sr-t`.
    ///
    /// The leading file-type character is optional.
    pub fn from_symbolic(s: &str) -> FsResult<Self> {
        let bits: Vec<char> = s.chars().collect();
        let bits = match bits.len() {
            10 => &bits[1..],
            9 => &bits[..],
            _ => return Err(FsError::invalid_argument(format!("bad permission string: {s}"))),
        };

        let mut mode = 0u16;
        for (triple, chunk) in bits.chunks(3).enumerate() {
            let shift = 6 - 3 * triple as u16;
            if chunk[0] == 'r' {
                mode |= 0o4 << shift;
            }
            if chunk[1] == 'w' {
                mode |= 0o2 << shift;
            }
            let (exec, special) = match chunk[2] {
                'x' => (true, false),
                's' | 't' => (true, true),
                'S' | 'T' => (false, true),
                _ => (false, false),
            };
            if exec {
                mode |= 0o1 << shift;
            }
            if special {
                mode |= match triple {
                    0 => 0o4000,
                    1 => 0o2000,
                    _ => 0o1000,
                };
            }
        }
        Ok(Self(mode))
    }
}

impl fmt::Display for FsPermission {
    /// Nine-character symbolic form, e.g. `rwxr-x---`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let specials = [(0o4000, 's'), (0o2000, 's'), (0o1000, 't')];
        for (triple, (special_bit, special_char)) in specials.into_iter().enumerate() {
            let shift = 6 - 3 * triple as u16;
            let bits = (self.0 >> shift) & 0o7;
            let exec = bits & 0o1 != 0;
            let special = self.0 & special_bit != 0;
            let x = match (exec, special) {
                (true, true) => special_char,
                (false, true) => special_char.to_ascii_uppercase(),
                (true, false) => 'x',
                (false, false) => '-',
            };
            write!(
                f,
                "{}{}{}",
                if bits & 0o4 != 0 { 'r' } else { '-' },
                if bits & 0o2 != 0 { 'w' } else { '-' },
                x
            )?;
        }
        Ok(())
    }
}

/// Owner, group and permission bits of a file.
///
/// Adapters backed by `ls -ld` fill this lazily; until `loaded` is set the
/// accessors report the placeholder owner.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionInfo {
    pub loaded: bool,
    pub owner: Option<String>,
    pub group: Option<String>,
    pub permission: Option<FsPermission>,
}

impl PermissionInfo {
    /// Info that has been fetched from the backend.
    pub fn loaded(
        owner: Option<String>,
        group: Option<String>,
        permission: Option<FsPermission>,
    ) -> Self {
        Self {
            loaded: true,
            owner,
            group,
            permission,
        }
    }
}

/// Snapshot of a file's metadata.
#[derive(Debug, Clone)]
pub struct FileStatus {
    /// Host-qualified absolute path.
    pub path: FsPath,
    pub length: u64,
    pub is_dir: bool,
    pub replication: u16,
    pub block_size: u64,
    pub modification_time: SystemTime,
    pub perms: PermissionInfo,
}

impl FileStatus {
    /// Status for a directory: length 0, replication 1, block size 0.
    pub fn directory(path: FsPath, modification_time: SystemTime) -> Self {
        Self {
            path,
            length: 0,
            is_dir: true,
            replication: 1,
            block_size: 0,
            modification_time,
            perms: PermissionInfo::default(),
        }
    }

    /// Status for a regular file with the default block size.
    pub fn file(path: FsPath, length: u64, modification_time: SystemTime) -> Self {
        Self {
            path,
            length,
            is_dir: false,
            replication: 1,
            block_size: DEFAULT_BLOCK_SIZE,
            modification_time,
            perms: PermissionInfo::default(),
        }
    }

    pub fn with_perms(mut self, perms: PermissionInfo) -> Self {
        self.perms = perms;
        self
    }

    pub fn is_file(&self) -> bool {
        !self.is_dir
    }

    /// Owner name, or the placeholder until permission info is loaded.
    pub fn owner(&self) -> &str {
        self.perms.owner.as_deref().unwrap_or(PLACEHOLDER_OWNER)
    }

    /// Group name, or the placeholder until permission info is loaded.
    pub fn group(&self) -> &str {
        self.perms.group.as_deref().unwrap_or(PLACEHOLDER_OWNER)
    }

    pub fn permission(&self) -> Option<FsPermission> {
        self.perms.permission
    }

    pub fn permissions_loaded(&self) -> bool {
        self.perms.loaded
    }
}

/// Hosts holding the bytes `[offset, offset + length)` of a file.
///
/// The first host is the most preferred one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockLocation {
    pub offset: u64,
    pub length: u64,
    pub hosts: Vec<String>,
}

impl BlockLocation {
    pub fn new(offset: u64, length: u64, hosts: Vec<String>) -> Self {
        Self {
            offset,
            length,
            hosts,
        }
    }
}

/// Space usage of a volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FsStatus {
    /// Total bytes.
    pub capacity: u64,
    /// Bytes in use.
    pub used: u64,
    /// Bytes available to unprivileged writers.
    pub remaining: u64,
}

/// Options for [`create`](crate::FileSystem::create).
///
/// Replication and block size are fixed by the volume layout, so create
/// takes neither.
#[derive(Debug, Clone, Default)]
pub struct CreateOptions {
    pub overwrite: bool,
    pub buffer_size: Option<usize>,
    pub permission: Option<FsPermission>,
}

impl CreateOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace an existing file instead of failing.
    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = Some(size);
        self
    }

    pub fn with_permission(mut self, permission: FsPermission) -> Self {
        self.permission = Some(permission);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbolic_roundtrip() {
        for s in ["rwxr-x---", "rw-r--r--", "rwsr-sr-t", "rwSr--r-T", "---------"] {
            let perm = FsPermission::from_symbolic(s).unwrap();
            assert_eq!(perm.to_string(), s);
        }
    }

    #[test]
    fn test_symbolic_with_type_char() {
        assert_eq!(FsPermission::from_symbolic("drwxr-xr-x").unwrap().mode(), 0o755);
        assert_eq!(FsPermission::from_symbolic("-rw-------").unwrap().mode(), 0o600);
        assert_eq!(FsPermission::from_symbolic("drwxrwxrwt").unwrap().mode(), 0o1777);
    }

    #[test]
    fn test_symbolic_bad_length() {
        assert!(FsPermission::from_symbolic("rwx").is_err());
    }

    #[test]
    fn test_from_mode_masks_type_bits() {
        assert_eq!(FsPermission::from_mode(0o100644).mode(), 0o644);
    }

    #[test]
    fn test_directory_status_defaults() {
        let st = FileStatus::directory(FsPath::root(), SystemTime::UNIX_EPOCH);
        assert_eq!(st.length, 0);
        assert_eq!(st.replication, 1);
        assert_eq!(st.block_size, 0);
        assert!(st.is_dir);
    }

    #[test]
    fn test_placeholder_owner_until_loaded() {
        let path = FsPath::parse("/f").unwrap();
        let st = FileStatus::file(path, 3, SystemTime::UNIX_EPOCH);
        assert_eq!(st.owner(), "root");
        assert!(!st.permissions_loaded());
        assert_eq!(st.block_size, DEFAULT_BLOCK_SIZE);

        let st = st.with_perms(PermissionInfo::loaded(Some("amy".into()), None, None));
        assert_eq!(st.owner(), "amy");
        assert!(st.permissions_loaded());
    }

    #[test]
    fn test_create_options_builders() {
        let opts = CreateOptions::new();
        assert!(!opts.overwrite);
        assert_eq!(opts.buffer_size, None);
        assert_eq!(opts.permission, None);

        let opts = CreateOptions::new()
            .overwrite(true)
            .with_buffer_size(4096)
            .with_permission(FsPermission::from_mode(0o640));
        assert!(opts.overwrite);
        assert_eq!(opts.buffer_size, Some(4096));
        assert_eq!(opts.permission.map(|p| p.mode()), Some(0o640));
    }
}
