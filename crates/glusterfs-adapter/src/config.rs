//! Adapter configuration.
//!
//! Loadable from TOML or from the Hadoop-style property keys the calling
//! framework passes around:
//!
//! ```toml
//! backend = "fuse"
//! volume = "gv0"
//! server = "gluster1"
//! mount = "/mnt/glusterfs"
//! quick_read = "yes"
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{FsError, FsResult};

/// Buffer size the framework uses when nobody tuned it.
pub const SUBOPTIMAL_BUFFER_SIZE: usize = 4096;

/// Buffer size used in place of an unset or untuned one (128 KiB).
pub const TUNED_BUFFER_SIZE: usize = 128 * 1024;

/// Volume used by the native client when none is configured.
pub const DEFAULT_VOLUME: &str = "gv0";

/// Server used by the native client when none is configured.
pub const DEFAULT_SERVER: &str = "localhost";

/// Which adapter serves the filesystem.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// OS mount through the FUSE client, then local file I/O.
    #[default]
    Fuse,
    /// Direct volume connection through the client library.
    Native,
}

impl Backend {
    fn parse(s: &str) -> FsResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fuse" | "mount" => Ok(Self::Fuse),
            "native" | "gfapi" => Ok(Self::Native),
            other => Err(FsError::config(format!("unknown backend: {other}"))),
        }
    }
}

/// Configuration for either adapter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlusterConfig {
    #[serde(default)]
    pub backend: Backend,

    /// Volume name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<String>,

    /// Volume server host.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,

    /// Local mount point (FUSE backend).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mount: Option<PathBuf>,

    /// Read from a local brick when every block has a replica on this host.
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub quick_read: bool,

    /// I/O buffer size hint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buffer_size: Option<usize>,

    /// Filesystem URI, e.g. `glusterfs://gluster1`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
}

impl GlusterConfig {
    pub fn new(backend: Backend) -> Self {
        Self {
            backend,
            ..Self::default()
        }
    }

    /// Parse from a TOML string.
    pub fn from_toml_str(s: &str) -> FsResult<Self> {
        toml::from_str(s).map_err(|e| FsError::config(format!("invalid config: {e}")))
    }

    /// Load from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> FsResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| FsError::config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Build from Hadoop-style properties.
    ///
    /// `fs.glusterfs.volname` wins over `fs.glusterfs.volume`. Unknown keys
    /// are ignored.
    pub fn from_properties(props: &HashMap<String, String>) -> FsResult<Self> {
        let get = |key: &str| {
            props
                .get(key)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        let backend = match get("fs.glusterfs.backend") {
            Some(b) => Backend::parse(&b)?,
            None => Backend::default(),
        };
        let buffer_size = match get("io.file.buffer.size") {
            Some(v) => Some(v.parse::<usize>().map_err(|_| {
                FsError::config(format!("io.file.buffer.size is not a number: {v}"))
            })?),
            None => None,
        };

        Ok(Self {
            backend,
            volume: get("fs.glusterfs.volname").or_else(|| get("fs.glusterfs.volume")),
            server: get("fs.glusterfs.server"),
            mount: get("fs.glusterfs.mount").map(PathBuf::from),
            quick_read: get("quick.slave.io").is_some_and(|v| parse_flag(&v)),
            buffer_size,
            uri: get("fs.default.name"),
        })
    }

    pub fn with_volume(mut self, volume: impl Into<String>) -> Self {
        self.volume = Some(volume.into());
        self
    }

    pub fn with_server(mut self, server: impl Into<String>) -> Self {
        self.server = Some(server.into());
        self
    }

    pub fn with_mount(mut self, mount: impl Into<PathBuf>) -> Self {
        self.mount = Some(mount.into());
        self
    }

    pub fn with_quick_read(mut self, enabled: bool) -> Self {
        self.quick_read = enabled;
        self
    }

    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = Some(size);
        self
    }

    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    /// Volume, server and mount point, all required by the FUSE backend.
    /// Blank values count as unset.
    pub fn mount_settings(&self) -> FsResult<(&str, &str, &Path)> {
        let volume = self
            .volume
            .as_deref()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| FsError::config("fs.glusterfs.volname is not set"))?;
        let server = self
            .server
            .as_deref()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| FsError::config("fs.glusterfs.server is not set"))?;
        let mount = self
            .mount
            .as_deref()
            .filter(|m| !m.as_os_str().is_empty())
            .ok_or_else(|| FsError::config("fs.glusterfs.mount is not set"))?;
        Ok((volume, server, mount))
    }

    /// Volume for the native client, falling back to `gv0`.
    pub fn native_volume(&self) -> &str {
        self.volume.as_deref().unwrap_or(DEFAULT_VOLUME)
    }

    /// Server for the native client, falling back to `localhost`.
    pub fn native_server(&self) -> &str {
        self.server.as_deref().unwrap_or(DEFAULT_SERVER)
    }

    /// Buffer size with the untuned 4 KiB default replaced by 128 KiB.
    pub fn tuned_buffer_size(&self) -> usize {
        match self.buffer_size {
            None | Some(SUBOPTIMAL_BUFFER_SIZE) | Some(0) => TUNED_BUFFER_SIZE,
            Some(size) => size,
        }
    }

    /// Authority of the configured URI, or the server name.
    pub fn authority(&self) -> Option<String> {
        let from_uri = self.uri.as_deref().and_then(|uri| {
            let rest = uri.split_once("://").map(|(_, rest)| rest)?;
            let authority = rest.split('/').next().unwrap_or("");
            (!authority.is_empty()).then(|| authority.to_string())
        });
        from_uri.or_else(|| self.server.clone())
    }
}

fn parse_flag(v: &str) -> bool {
    matches!(
        v.trim().to_ascii_lowercase().as_str(),
        "yes" | "on" | "1" | "true"
    )
}

fn deserialize_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
        Text(String),
    }

    Ok(match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => b,
        Flag::Int(i) => i == 1,
        Flag::Text(s) => parse_flag(&s),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_from_toml() {
        let config = GlusterConfig::from_toml_str(
            r#"
            backend = "native"
            volume = "data"
            server = "g1"
            quick_read = "yes"
            buffer_size = 4096
            "#,
        )
        .unwrap();
        assert_eq!(config.backend, Backend::Native);
        assert_eq!(config.native_volume(), "data");
        assert!(config.quick_read);
        assert_eq!(config.tuned_buffer_size(), TUNED_BUFFER_SIZE);
    }

    #[test]
    fn test_quick_read_flag_forms() {
        for (text, expected) in [("\"on\"", true), ("\"1\"", true), ("true", true), ("\"no\"", false), ("1", true)] {
            let config = GlusterConfig::from_toml_str(&format!("quick_read = {text}")).unwrap();
            assert_eq!(config.quick_read, expected, "{text}");
        }
    }

    #[test]
    fn test_from_properties() {
        let config = GlusterConfig::from_properties(&props(&[
            ("fs.glusterfs.volume", "ignored"),
            ("fs.glusterfs.volname", "vol1"),
            ("fs.glusterfs.server", "gluster1"),
            ("fs.glusterfs.mount", "/mnt/g"),
            ("quick.slave.io", "On"),
            ("io.file.buffer.size", "65536"),
            ("fs.default.name", "glusterfs://gluster1:9000"),
        ]))
        .unwrap();
        let (volume, server, mount) = config.mount_settings().unwrap();
        assert_eq!(volume, "vol1");
        assert_eq!(server, "gluster1");
        assert_eq!(mount, Path::new("/mnt/g"));
        assert!(config.quick_read);
        assert_eq!(config.tuned_buffer_size(), 65536);
        assert_eq!(config.authority().as_deref(), Some("gluster1:9000"));
    }

    #[test]
    fn test_bad_buffer_size() {
        let err = GlusterConfig::from_properties(&props(&[("io.file.buffer.size", "lots")]))
            .unwrap_err();
        assert!(matches!(err, FsError::Config(_)));
    }

    #[test]
    fn test_mount_settings_missing() {
        let config = GlusterConfig::new(Backend::Fuse).with_volume("v").with_server("s");
        let err = config.mount_settings().unwrap_err();
        assert!(err.to_string().contains("fs.glusterfs.mount"));
    }

    #[test]
    fn test_mount_settings_blank() {
        for (text, key) in [
            ("volume = \"\"\nserver = \"g1\"\nmount = \"/mnt/g\"", "fs.glusterfs.volname"),
            ("volume = \"v\"\nserver = \" \"\nmount = \"/mnt/g\"", "fs.glusterfs.server"),
            ("volume = \"v\"\nserver = \"g1\"\nmount = \"\"", "fs.glusterfs.mount"),
        ] {
            let config = GlusterConfig::from_toml_str(text).unwrap();
            let err = config.mount_settings().unwrap_err();
            assert!(matches!(err, FsError::Config(_)));
            assert!(err.to_string().contains(key), "{err}");
        }
    }

    #[test]
    fn test_native_defaults() {
        let config = GlusterConfig::new(Backend::Native);
        assert_eq!(config.native_volume(), "gv0");
        assert_eq!(config.native_server(), "localhost");
        assert_eq!(config.tuned_buffer_size(), TUNED_BUFFER_SIZE);
        assert_eq!(config.with_buffer_size(8192).tuned_buffer_size(), 8192);
    }
}
