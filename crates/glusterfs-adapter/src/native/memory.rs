//! In-memory volume.
//!
//! Implements the client-library traits over a path map. Used for scratch
//! volumes and testing; all data is lost when the last handle drops. There
//! is no replication and no networking: pathinfo xattrs are whatever the
//! caller stored with [`MemoryVolume::set_xattr`].

use std::collections::HashMap;
use std::io::{self, Cursor, SeekFrom};
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};
use std::time::SystemTime;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::io::{AsyncSeek, AsyncWrite};

use crate::error::{FsError, FsResult};
use crate::native::volume::{Volume, VolumeConnector, VolumeFile, VolumeStat, VolumeWriter};
use crate::shell::PATHINFO_XATTR;
use crate::stream::ReadStream;
use crate::types::FsStatus;

const DEFAULT_CAPACITY: u64 = 1 << 30;

#[derive(Debug, Clone, Copy)]
struct Meta {
    mode: u32,
    uid: u32,
    gid: u32,
    mtime: SystemTime,
}

#[derive(Debug, Clone)]
enum Entry {
    File { data: Vec<u8>, meta: Meta },
    Directory { meta: Meta },
}

impl Entry {
    fn meta(&self) -> &Meta {
        match self {
            Entry::File { meta, .. } => meta,
            Entry::Directory { meta } => meta,
        }
    }

    fn meta_mut(&mut self) -> &mut Meta {
        match self {
            Entry::File { meta, .. } => meta,
            Entry::Directory { meta } => meta,
        }
    }

    fn stat(&self) -> VolumeStat {
        let meta = self.meta();
        let (length, is_dir) = match self {
            Entry::File { data, .. } => (data.len() as u64, false),
            Entry::Directory { .. } => (0, true),
        };
        VolumeStat {
            length,
            is_dir,
            mode: meta.mode,
            uid: meta.uid,
            gid: meta.gid,
            mtime: meta.mtime,
        }
    }
}

#[derive(Debug)]
struct Shared {
    entries: RwLock<HashMap<String, Entry>>,
    xattrs: RwLock<HashMap<(String, String), String>>,
    owner: (u32, u32),
    capacity: u64,
    fail_renames: AtomicBool,
}

impl Shared {
    fn new_meta(&self, mode: u32) -> Meta {
        Meta {
            mode,
            uid: self.owner.0,
            gid: self.owner.1,
            mtime: SystemTime::now(),
        }
    }
}

/// Normalize to `/a/b`; the root is `/`.
fn normalize(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            name => segments.push(name),
        }
    }
    format!("/{}", segments.join("/"))
}

fn parent_of(path: &str) -> Option<String> {
    if path == "/" {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some("/".to_string()),
        Some(idx) => Some(path[..idx].to_string()),
        None => None,
    }
}

/// Keys of the direct children of `dir`.
fn child_prefix(dir: &str) -> String {
    if dir == "/" {
        "/".to_string()
    } else {
        format!("{dir}/")
    }
}

/// In-memory [`Volume`].
#[derive(Debug, Clone)]
pub struct MemoryVolume {
    name: String,
    shared: Arc<Shared>,
}

impl Default for MemoryVolume {
    fn default() -> Self {
        Self::new("memory")
    }
}

impl MemoryVolume {
    /// Create an empty volume owned by uid/gid 0.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_owner(name, 0, 0)
    }

    /// Create an empty volume whose new entries belong to `uid`/`gid`.
    pub fn with_owner(name: impl Into<String>, uid: u32, gid: u32) -> Self {
        let shared = Shared {
            entries: RwLock::new(HashMap::new()),
            xattrs: RwLock::new(HashMap::new()),
            owner: (uid, gid),
            capacity: DEFAULT_CAPACITY,
            fail_renames: AtomicBool::new(false),
        };
        let root = Entry::Directory {
            meta: shared.new_meta(0o755),
        };
        shared.entries.write().insert("/".to_string(), root);
        Self {
            name: name.into(),
            shared: Arc::new(shared),
        }
    }

    /// Store an extended attribute.
    pub fn set_xattr(&self, path: &str, name: &str, value: impl Into<String>) {
        self.shared
            .xattrs
            .write()
            .insert((normalize(path), name.to_string()), value.into());
    }

    /// Store the brick placement xattr for `path`.
    pub fn set_pathinfo(&self, path: &str, value: impl Into<String>) {
        self.set_xattr(path, PATHINFO_XATTR, value);
    }

    /// Make every native rename fail with a backend error.
    pub fn fail_renames(&self, fail: bool) {
        self.shared.fail_renames.store(fail, Ordering::Relaxed);
    }

    /// Whole contents of a file, for assertions.
    pub fn contents(&self, path: &str) -> Option<Vec<u8>> {
        match self.shared.entries.read().get(&normalize(path)) {
            Some(Entry::File { data, .. }) => Some(data.clone()),
            _ => None,
        }
    }
}

#[async_trait]
impl Volume for MemoryVolume {
    fn name(&self) -> &str {
        &self.name
    }

    fn open(&self, path: &str) -> Box<dyn VolumeFile> {
        Box::new(MemoryFile {
            shared: self.shared.clone(),
            path: normalize(path),
        })
    }

    async fn statvfs(&self) -> FsResult<FsStatus> {
        let used: u64 = self
            .shared
            .entries
            .read()
            .values()
            .map(|e| match e {
                Entry::File { data, .. } => data.len() as u64,
                Entry::Directory { .. } => 0,
            })
            .sum();
        Ok(FsStatus {
            capacity: self.shared.capacity,
            used,
            remaining: self.shared.capacity.saturating_sub(used),
        })
    }

    async fn getxattr(&self, path: &str, name: &str) -> FsResult<Option<String>> {
        let path = normalize(path);
        if !self.shared.entries.read().contains_key(&path) {
            return Err(FsError::not_found(path));
        }
        Ok(self
            .shared
            .xattrs
            .read()
            .get(&(path, name.to_string()))
            .cloned())
    }
}

/// Handle on one path of a [`MemoryVolume`].
#[derive(Debug)]
pub struct MemoryFile {
    shared: Arc<Shared>,
    path: String,
}

impl MemoryFile {
    fn check_parent(&self, entries: &HashMap<String, Entry>) -> FsResult<()> {
        let parent = parent_of(&self.path)
            .ok_or_else(|| FsError::already_exists(self.path.clone()))?;
        match entries.get(&parent) {
            Some(Entry::Directory { .. }) => Ok(()),
            Some(Entry::File { .. }) => Err(FsError::not_a_directory(parent)),
            None => Err(FsError::not_found(parent)),
        }
    }
}

#[async_trait]
impl VolumeFile for MemoryFile {
    fn path(&self) -> &str {
        &self.path
    }

    async fn stat(&self) -> FsResult<Option<VolumeStat>> {
        Ok(self.shared.entries.read().get(&self.path).map(Entry::stat))
    }

    async fn create_new_file(&self) -> FsResult<()> {
        let mut entries = self.shared.entries.write();
        if entries.contains_key(&self.path) {
            return Err(FsError::already_exists(self.path.clone()));
        }
        self.check_parent(&entries)?;
        let file = Entry::File {
            data: Vec::new(),
            meta: self.shared.new_meta(0o644),
        };
        entries.insert(self.path.clone(), file);
        Ok(())
    }

    async fn mkdir(&self) -> FsResult<()> {
        let mut entries = self.shared.entries.write();
        if entries.contains_key(&self.path) {
            return Err(FsError::already_exists(self.path.clone()));
        }
        self.check_parent(&entries)?;
        let dir = Entry::Directory {
            meta: self.shared.new_meta(0o755),
        };
        entries.insert(self.path.clone(), dir);
        Ok(())
    }

    async fn delete(&self) -> FsResult<()> {
        if self.path == "/" {
            return Err(FsError::invalid_argument("cannot remove root"));
        }
        let mut entries = self.shared.entries.write();
        match entries.get(&self.path) {
            Some(Entry::File { .. }) => {}
            Some(Entry::Directory { .. }) => {
                let prefix = child_prefix(&self.path);
                if entries.keys().any(|k| k.starts_with(&prefix)) {
                    return Err(FsError::directory_not_empty(self.path.clone()));
                }
            }
            None => return Err(FsError::not_found(self.path.clone())),
        }
        entries.remove(&self.path);
        self.shared
            .xattrs
            .write()
            .retain(|(p, _), _| p != &self.path);
        Ok(())
    }

    async fn rename_to(&self, dst: &str) -> FsResult<()> {
        if self.shared.fail_renames.load(Ordering::Relaxed) {
            return Err(FsError::backend(format!("rename of {} refused", self.path)));
        }
        let dst = normalize(dst);
        let mut entries = self.shared.entries.write();

        if !entries.contains_key(&self.path) {
            return Err(FsError::not_found(self.path.clone()));
        }
        if entries.contains_key(&dst) {
            return Err(FsError::already_exists(dst));
        }
        if dst.starts_with(&child_prefix(&self.path)) {
            return Err(FsError::invalid_argument(format!(
                "cannot move {} into itself",
                self.path
            )));
        }
        let dst_parent = parent_of(&dst).ok_or_else(|| FsError::already_exists("/"))?;
        match entries.get(&dst_parent) {
            Some(Entry::Directory { .. }) => {}
            Some(Entry::File { .. }) => return Err(FsError::not_a_directory(dst_parent)),
            None => return Err(FsError::not_found(dst_parent)),
        }

        let prefix = child_prefix(&self.path);
        let moved: Vec<String> = entries
            .keys()
            .filter(|k| **k == self.path || k.starts_with(&prefix))
            .cloned()
            .collect();
        for old in moved {
            if let Some(entry) = entries.remove(&old) {
                let new = format!("{dst}{}", &old[self.path.len()..]);
                entries.insert(new, entry);
            }
        }
        Ok(())
    }

    async fn list_files(&self) -> FsResult<Vec<String>> {
        let entries = self.shared.entries.read();
        match entries.get(&self.path) {
            Some(Entry::Directory { .. }) => {}
            Some(Entry::File { .. }) => return Err(FsError::not_a_directory(self.path.clone())),
            None => return Err(FsError::not_found(self.path.clone())),
        }
        let prefix = child_prefix(&self.path);
        let mut names: Vec<String> = entries
            .keys()
            .filter_map(|k| k.strip_prefix(&prefix))
            .filter(|rest| !rest.is_empty() && !rest.contains('/'))
            .map(str::to_string)
            .collect();
        names.sort();
        Ok(names)
    }

    async fn chmod(&self, mode: u32) -> FsResult<()> {
        let mut entries = self.shared.entries.write();
        let entry = entries
            .get_mut(&self.path)
            .ok_or_else(|| FsError::not_found(self.path.clone()))?;
        entry.meta_mut().mode = mode & 0o7777;
        Ok(())
    }

    async fn chown(&self, uid: i64, gid: i64) -> FsResult<()> {
        let mut entries = self.shared.entries.write();
        let meta = entries
            .get_mut(&self.path)
            .ok_or_else(|| FsError::not_found(self.path.clone()))?
            .meta_mut();
        if uid >= 0 {
            meta.uid = uid as u32;
        }
        if gid >= 0 {
            meta.gid = gid as u32;
        }
        Ok(())
    }

    async fn input_stream(&self) -> FsResult<Box<dyn ReadStream>> {
        match self.shared.entries.read().get(&self.path) {
            Some(Entry::File { data, .. }) => Ok(Box::new(Cursor::new(data.clone()))),
            Some(Entry::Directory { .. }) => Err(FsError::is_a_directory(self.path.clone())),
            None => Err(FsError::not_found(self.path.clone())),
        }
    }

    async fn output_stream(&self) -> FsResult<Box<dyn VolumeWriter>> {
        match self.shared.entries.read().get(&self.path) {
            Some(Entry::File { .. }) => {}
            Some(Entry::Directory { .. }) => {
                return Err(FsError::is_a_directory(self.path.clone()));
            }
            None => return Err(FsError::not_found(self.path.clone())),
        }
        Ok(Box::new(MemoryWriter {
            shared: self.shared.clone(),
            path: self.path.clone(),
            pos: 0,
        }))
    }
}

/// Writes straight into the volume's copy of the file.
#[derive(Debug)]
struct MemoryWriter {
    shared: Arc<Shared>,
    path: String,
    pos: u64,
}

impl MemoryWriter {
    fn len(&self) -> io::Result<u64> {
        match self.shared.entries.read().get(&self.path) {
            Some(Entry::File { data, .. }) => Ok(data.len() as u64),
            _ => Err(io::Error::new(io::ErrorKind::NotFound, self.path.clone())),
        }
    }
}

impl AsyncWrite for MemoryWriter {
    fn poll_write(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let pos = self.pos as usize;
        {
            let mut entries = self.shared.entries.write();
            let Some(Entry::File { data, meta }) = entries.get_mut(&self.path) else {
                return Poll::Ready(Err(io::Error::new(
                    io::ErrorKind::NotFound,
                    self.path.clone(),
                )));
            };
            let end = pos + buf.len();
            if data.len() < end {
                data.resize(end, 0);
            }
            data[pos..end].copy_from_slice(buf);
            meta.mtime = SystemTime::now();
        }
        self.pos += buf.len() as u64;
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

impl AsyncSeek for MemoryWriter {
    fn start_seek(mut self: Pin<&mut Self>, position: SeekFrom) -> io::Result<()> {
        let target = match position {
            SeekFrom::Start(n) => Some(n),
            SeekFrom::End(off) => self.len()?.checked_add_signed(off),
            SeekFrom::Current(off) => self.pos.checked_add_signed(off),
        };
        self.pos = target.ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "seek before start of file")
        })?;
        Ok(())
    }

    fn poll_complete(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<u64>> {
        Poll::Ready(Ok(self.pos))
    }
}

/// [`VolumeConnector`] handing out one shared [`MemoryVolume`].
#[derive(Debug, Default)]
pub struct MemoryConnector {
    volume: MemoryVolume,
    connections: Mutex<Vec<(String, String)>>,
}

impl MemoryConnector {
    pub fn new(volume: MemoryVolume) -> Self {
        Self {
            volume,
            connections: Mutex::new(Vec::new()),
        }
    }

    pub fn volume(&self) -> &MemoryVolume {
        &self.volume
    }

    /// `(server, volume)` of every connect call so far.
    pub fn connections(&self) -> Vec<(String, String)> {
        self.connections.lock().clone()
    }
}

#[async_trait]
impl VolumeConnector for MemoryConnector {
    async fn connect(&self, server: &str, volume: &str) -> FsResult<Arc<dyn Volume>> {
        self.connections
            .lock()
            .push((server.to_string(), volume.to_string()));
        Ok(Arc::new(self.volume.clone()))
    }
}
