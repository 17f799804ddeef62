//! Block locality from brick placement.
//!
//! GlusterFS does not hand out block maps. Placement is derived from the
//! `trusted.glusterfs.pathinfo` xattr, which names every brick (host and
//! on-brick path) holding the file. The oracle turns that into:
//!
//! - a replication factor
//! - a block size (the stripe size, 0 when unknown)
//! - ordered block-location hints, local host first
//! - quick-read hints, used to read a local brick file directly

pub mod pathinfo;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::FsResult;
use crate::native::volume::Volume;
use crate::shell::{PATHINFO_XATTR, Shell};
use crate::types::BlockLocation;

pub use pathinfo::{Brick, PathInfo};

/// Fetches the raw pathinfo xattr for a backend path.
#[async_trait]
pub trait XattrSource: Send + Sync {
    /// `Ok(None)` when the attribute is unavailable.
    async fn pathinfo(&self, path: &str) -> FsResult<Option<String>>;
}

/// Reads the xattr with `getfattr` through the command bridge.
#[derive(Debug, Clone)]
pub struct ShellXattrSource {
    shell: Shell,
}

impl ShellXattrSource {
    pub fn new(shell: Shell) -> Self {
        Self { shell }
    }
}

#[async_trait]
impl XattrSource for ShellXattrSource {
    async fn pathinfo(&self, path: &str) -> FsResult<Option<String>> {
        self.shell.pathinfo(Path::new(path)).await
    }
}

/// Reads the xattr through the native volume handle.
#[derive(Clone)]
pub struct VolumeXattrSource {
    volume: Arc<dyn Volume>,
}

impl VolumeXattrSource {
    pub fn new(volume: Arc<dyn Volume>) -> Self {
        Self { volume }
    }
}

#[async_trait]
impl XattrSource for VolumeXattrSource {
    async fn pathinfo(&self, path: &str) -> FsResult<Option<String>> {
        self.volume.getxattr(path, PATHINFO_XATTR).await
    }
}

/// Bytes `[offset, offset + length)` and the bricks holding them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrickHint {
    pub offset: u64,
    pub length: u64,
    pub replicas: Vec<Brick>,
}

/// Answers placement questions for backend paths.
#[async_trait]
pub trait LocalityOracle: Send + Sync {
    /// Number of copies of each block.
    async fn replication(&self, path: &str) -> FsResult<u16>;

    /// Preferred block size in bytes; 0 when unknown.
    async fn block_size(&self, path: &str) -> FsResult<u64>;

    /// Ordered hints covering `[start, start + len)`; empty when unknown.
    async fn block_locations(&self, path: &str, start: u64, len: u64)
    -> FsResult<Vec<BlockLocation>>;

    /// Brick hints keyed by offset, `None` when placement is unknown.
    async fn quick_read_possible(
        &self,
        path: &str,
        start: u64,
        len: u64,
    ) -> FsResult<Option<BTreeMap<u64, BrickHint>>>;
}

/// [`LocalityOracle`] fed by an [`XattrSource`].
#[derive(Clone)]
pub struct PathInfoOracle {
    source: Arc<dyn XattrSource>,
    hostname: String,
}

impl PathInfoOracle {
    pub fn new(source: Arc<dyn XattrSource>, hostname: impl Into<String>) -> Self {
        Self {
            source,
            hostname: hostname.into(),
        }
    }

    async fn load(&self, path: &str) -> FsResult<Option<PathInfo>> {
        let Some(raw) = self.source.pathinfo(path).await? else {
            debug!(path, "no pathinfo xattr");
            return Ok(None);
        };
        match PathInfo::parse(&raw) {
            Ok(info) => Ok(Some(info)),
            Err(err) => {
                warn!(error = %err, path, "unparseable pathinfo");
                Ok(None)
            }
        }
    }

    fn hints(info: &PathInfo, start: u64, len: u64) -> Vec<BrickHint> {
        let stripe = info.stripe_size.filter(|s| *s > 0);
        let Some(stripe) = stripe else {
            return vec![BrickHint {
                offset: start,
                length: len,
                replicas: info.groups.iter().flatten().cloned().collect(),
            }];
        };

        let end = start.saturating_add(len);
        let mut hints = Vec::new();
        let mut chunk = start / stripe;
        loop {
            let chunk_start = chunk.saturating_mul(stripe).max(start);
            let chunk_end = chunk.saturating_add(1).saturating_mul(stripe).min(end);
            let group = &info.groups[(chunk % info.groups.len() as u64) as usize];
            hints.push(BrickHint {
                offset: chunk_start,
                length: chunk_end.saturating_sub(chunk_start),
                replicas: group.clone(),
            });
            if chunk_end >= end {
                break;
            }
            chunk += 1;
        }
        hints
    }

    /// Distinct hosts of `replicas`, this host first.
    fn ordered_hosts(&self, replicas: &[Brick]) -> Vec<String> {
        let mut hosts: Vec<String> = Vec::new();
        for brick in replicas {
            if !hosts.iter().any(|h| h.eq_ignore_ascii_case(&brick.host)) {
                hosts.push(brick.host.clone());
            }
        }
        if let Some(idx) = hosts.iter().position(|h| host_matches(h, &self.hostname)) {
            let local = hosts.remove(idx);
            hosts.insert(0, local);
        }
        hosts
    }
}

#[async_trait]
impl LocalityOracle for PathInfoOracle {
    async fn replication(&self, path: &str) -> FsResult<u16> {
        Ok(self.load(path).await?.map_or(1, |info| info.replication()))
    }

    async fn block_size(&self, path: &str) -> FsResult<u64> {
        Ok(self
            .load(path)
            .await?
            .and_then(|info| info.stripe_size)
            .unwrap_or(0))
    }

    async fn block_locations(
        &self,
        path: &str,
        start: u64,
        len: u64,
    ) -> FsResult<Vec<BlockLocation>> {
        let Some(info) = self.load(path).await? else {
            return Ok(Vec::new());
        };
        Ok(Self::hints(&info, start, len)
            .into_iter()
            .map(|hint| {
                let hosts = self.ordered_hosts(&hint.replicas);
                BlockLocation::new(hint.offset, hint.length, hosts)
            })
            .collect())
    }

    async fn quick_read_possible(
        &self,
        path: &str,
        start: u64,
        len: u64,
    ) -> FsResult<Option<BTreeMap<u64, BrickHint>>> {
        Ok(self.load(path).await?.map(|info| {
            Self::hints(&info, start, len)
                .into_iter()
                .map(|hint| (hint.offset, hint))
                .collect()
        }))
    }
}

/// Host name comparison that tolerates FQDN vs short name.
pub fn host_matches(a: &str, b: &str) -> bool {
    if a.eq_ignore_ascii_case(b) {
        return true;
    }
    let short = |h: &str| h.split('.').next().unwrap_or(h).to_ascii_lowercase();
    short(a) == short(b)
}

/// Brick file to read directly when every hint has a replica on `hostname`
/// in one and the same brick file.
pub fn local_replica(hints: &BTreeMap<u64, BrickHint>, hostname: &str) -> Option<String> {
    let mut local: Option<&str> = None;
    for hint in hints.values() {
        let brick = hint
            .replicas
            .iter()
            .find(|brick| host_matches(&brick.host, hostname))?;
        match local {
            None => local = Some(&brick.path),
            Some(path) if path == brick.path => {}
            Some(_) => return None,
        }
    }
    local.map(str::to_string)
}

/// This machine's host name, `localhost` if it cannot be read.
pub fn local_hostname() -> String {
    match hostname::get() {
        Ok(name) => name.to_string_lossy().into_owned(),
        Err(err) => {
            warn!(error = %err, "could not read hostname");
            "localhost".to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    #[derive(Default)]
    struct MapSource(Mutex<HashMap<String, String>>);

    #[async_trait]
    impl XattrSource for MapSource {
        async fn pathinfo(&self, path: &str) -> FsResult<Option<String>> {
            Ok(self.0.lock().get(path).cloned())
        }
    }

    fn oracle(entries: &[(&str, &str)], host: &str) -> PathInfoOracle {
        let source = MapSource::default();
        for (path, value) in entries {
            source.0.lock().insert(path.to_string(), value.to_string());
        }
        PathInfoOracle::new(Arc::new(source), host)
    }

    const REPLICATED: &str = "(<DISTRIBUTE:v-dht> (<REPLICATE:v-replicate-0> \
        <POSIX(/b1):h1:/b1/f> <POSIX(/b1):h2.example.com:/b1/f>))";

    const STRIPED: &str = "(<STRIPE:v-stripe-0:[100]> <POSIX(/b1):h1:/b1/f> <POSIX(/b2):h2:/b2/f>)";

    #[tokio::test]
    async fn test_replication_and_block_size() {
        let o = oracle(&[("/f", REPLICATED), ("/s", STRIPED)], "h1");
        assert_eq!(o.replication("/f").await.unwrap(), 2);
        assert_eq!(o.block_size("/f").await.unwrap(), 0);
        assert_eq!(o.block_size("/s").await.unwrap(), 100);
        assert_eq!(o.replication("/missing").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_local_host_first() {
        let o = oracle(&[("/f", REPLICATED)], "h2");
        let locs = o.block_locations("/f", 0, 10).await.unwrap();
        assert_eq!(locs.len(), 1);
        assert_eq!(locs[0].hosts, vec!["h2.example.com", "h1"]);
    }

    #[tokio::test]
    async fn test_striped_locations() {
        let o = oracle(&[("/s", STRIPED)], "elsewhere");
        let locs = o.block_locations("/s", 50, 200).await.unwrap();
        let summary: Vec<(u64, u64, &str)> = locs
            .iter()
            .map(|l| (l.offset, l.length, l.hosts[0].as_str()))
            .collect();
        assert_eq!(summary, vec![(50, 50, "h1"), (100, 100, "h2"), (200, 50, "h1")]);
    }

    #[tokio::test]
    async fn test_striped_range_at_end_of_offsets() {
        let o = oracle(&[("/s", STRIPED)], "h1");
        let locs = o.block_locations("/s", u64::MAX - 10, 5).await.unwrap();
        assert_eq!(locs.len(), 1);
        assert_eq!(locs[0].offset, u64::MAX - 10);
        assert_eq!(locs[0].length, 5);

        let locs = o.block_locations("/s", u64::MAX - 10, u64::MAX).await.unwrap();
        assert_eq!(locs.len(), 1);
        assert_eq!(locs[0].length, 10);
    }

    #[tokio::test]
    async fn test_unknown_path_gives_empty() {
        let o = oracle(&[], "h1");
        assert!(o.block_locations("/x", 0, 10).await.unwrap().is_empty());
        assert!(o.quick_read_possible("/x", 0, 10).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_local_replica_all_blocks() {
        let o = oracle(&[("/f", REPLICATED), ("/s", STRIPED)], "h1");

        let hints = o.quick_read_possible("/f", 0, 10).await.unwrap().unwrap();
        assert_eq!(local_replica(&hints, "h1").as_deref(), Some("/b1/f"));
        assert_eq!(local_replica(&hints, "h2").as_deref(), Some("/b1/f"));
        assert_eq!(local_replica(&hints, "h9"), None);

        // Striped: h1 only holds every other chunk.
        let hints = o.quick_read_possible("/s", 0, 200).await.unwrap().unwrap();
        assert_eq!(hints.len(), 2);
        assert_eq!(local_replica(&hints, "h1"), None);
    }

    #[test]
    fn test_host_matches() {
        assert!(host_matches("Node1", "node1"));
        assert!(host_matches("node1.example.com", "node1"));
        assert!(!host_matches("node1", "node2"));
    }
}
