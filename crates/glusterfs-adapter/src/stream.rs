//! Byte-counting stream wrappers and the stream handles returned to callers.

use std::io::{self, SeekFrom};
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll, ready};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt, AsyncWrite, AsyncWriteExt, ReadBuf};

use crate::path::FsPath;

/// I/O counters shared by every stream one adapter opens.
///
/// Counters only grow.
#[derive(Debug, Default)]
pub struct Statistics {
    bytes_read: AtomicU64,
    bytes_written: AtomicU64,
    read_ops: AtomicU64,
    write_ops: AtomicU64,
}

/// Point-in-time copy of [`Statistics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatisticsSnapshot {
    pub bytes_read: u64,
    pub bytes_written: u64,
    pub read_ops: u64,
    pub write_ops: u64,
}

impl Statistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_bytes_read(&self, n: u64) {
        self.bytes_read.fetch_add(n, Ordering::Relaxed);
    }

    pub fn increment_bytes_written(&self, n: u64) {
        self.bytes_written.fetch_add(n, Ordering::Relaxed);
    }

    pub fn increment_read_ops(&self) {
        self.read_ops.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_write_ops(&self) {
        self.write_ops.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read.load(Ordering::Relaxed)
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> StatisticsSnapshot {
        StatisticsSnapshot {
            bytes_read: self.bytes_read(),
            bytes_written: self.bytes_written(),
            read_ops: self.read_ops.load(Ordering::Relaxed),
            write_ops: self.write_ops.load(Ordering::Relaxed),
        }
    }
}

/// Counts bytes read through `inner`.
#[derive(Debug)]
pub struct TrackingReader<R> {
    inner: R,
    stats: Arc<Statistics>,
    count: u64,
}

impl<R> TrackingReader<R> {
    pub fn new(inner: R, stats: Arc<Statistics>) -> Self {
        Self {
            inner,
            stats,
            count: 0,
        }
    }

    /// Bytes read through this wrapper.
    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for TrackingReader<R> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let before = buf.filled().len();
        ready!(Pin::new(&mut self.inner).poll_read(cx, buf))?;
        let n = (buf.filled().len() - before) as u64;
        if n > 0 {
            self.count += n;
            self.stats.increment_bytes_read(n);
            self.stats.increment_read_ops();
        }
        Poll::Ready(Ok(()))
    }
}

impl<R: AsyncSeek + Unpin> AsyncSeek for TrackingReader<R> {
    fn start_seek(mut self: Pin<&mut Self>, position: SeekFrom) -> io::Result<()> {
        Pin::new(&mut self.inner).start_seek(position)
    }

    fn poll_complete(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<u64>> {
        Pin::new(&mut self.inner).poll_complete(cx)
    }
}

/// Counts bytes written through `inner`.
#[derive(Debug)]
pub struct TrackingWriter<W> {
    inner: W,
    stats: Arc<Statistics>,
    count: u64,
}

impl<W> TrackingWriter<W> {
    pub fn new(inner: W, stats: Arc<Statistics>) -> Self {
        Self {
            inner,
            stats,
            count: 0,
        }
    }

    /// Bytes written through this wrapper.
    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: AsyncWrite + Unpin> AsyncWrite for TrackingWriter<W> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let n = ready!(Pin::new(&mut self.inner).poll_write(cx, buf))?;
        if n > 0 {
            self.count += n as u64;
            self.stats.increment_bytes_written(n as u64);
            self.stats.increment_write_ops();
        }
        Poll::Ready(Ok(n))
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

/// Readable, seekable backend stream.
pub trait ReadStream: AsyncRead + AsyncSeek + Unpin + Send {}

impl<T: AsyncRead + AsyncSeek + Unpin + Send> ReadStream for T {}

/// Writable backend stream.
pub trait WriteStream: AsyncWrite + Unpin + Send {}

impl<T: AsyncWrite + Unpin + Send> WriteStream for T {}

/// Where an input stream's bytes come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamSource {
    /// The file under the FUSE mount.
    Mount,
    /// A brick file on this host, bypassing FUSE.
    LocalReplica,
    /// The native client library.
    Native,
}

/// Input stream returned by `open`.
pub struct FsInputStream {
    inner: TrackingReader<Box<dyn ReadStream>>,
    source: StreamSource,
    path: FsPath,
}

impl std::fmt::Debug for FsInputStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FsInputStream")
            .field("path", &self.path)
            .field("source", &self.source)
            .field("bytes_read", &self.inner.count())
            .finish()
    }
}

impl FsInputStream {
    pub fn new(
        inner: Box<dyn ReadStream>,
        stats: Arc<Statistics>,
        source: StreamSource,
        path: FsPath,
    ) -> Self {
        Self {
            inner: TrackingReader::new(inner, stats),
            source,
            path,
        }
    }

    pub fn source(&self) -> StreamSource {
        self.source
    }

    pub fn path(&self) -> &FsPath {
        &self.path
    }

    /// Bytes read from this stream so far.
    pub fn bytes_read(&self) -> u64 {
        self.inner.count()
    }

    /// Move to absolute offset `pos`.
    pub async fn seek_to(&mut self, pos: u64) -> io::Result<u64> {
        self.inner.seek(SeekFrom::Start(pos)).await
    }

    /// Current offset as tracked by the backend stream.
    pub async fn position(&mut self) -> io::Result<u64> {
        self.inner.stream_position().await
    }

    /// Seek to `position`, then read into `buf`. Leaves the stream there.
    pub async fn read_at(&mut self, position: u64, buf: &mut [u8]) -> io::Result<usize> {
        self.seek_to(position).await?;
        self.inner.read(buf).await
    }
}

impl AsyncRead for FsInputStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncSeek for FsInputStream {
    fn start_seek(mut self: Pin<&mut Self>, position: SeekFrom) -> io::Result<()> {
        Pin::new(&mut self.inner).start_seek(position)
    }

    fn poll_complete(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<u64>> {
        Pin::new(&mut self.inner).poll_complete(cx)
    }
}

/// Output stream returned by `create` and `append`.
pub struct FsOutputStream {
    inner: TrackingWriter<Box<dyn WriteStream>>,
    path: FsPath,
}

impl std::fmt::Debug for FsOutputStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FsOutputStream")
            .field("path", &self.path)
            .field("bytes_written", &self.inner.count())
            .finish()
    }
}

impl FsOutputStream {
    pub fn new(inner: Box<dyn WriteStream>, stats: Arc<Statistics>, path: FsPath) -> Self {
        Self {
            inner: TrackingWriter::new(inner, stats),
            path,
        }
    }

    pub fn path(&self) -> &FsPath {
        &self.path
    }

    pub fn bytes_written(&self) -> u64 {
        self.inner.count()
    }

    /// Flush and close the underlying stream.
    pub async fn close(mut self) -> io::Result<()> {
        self.inner.shutdown().await
    }
}

impl AsyncWrite for FsOutputStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}
