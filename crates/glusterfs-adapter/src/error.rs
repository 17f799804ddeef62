//! Adapter error types.

use std::io;
use thiserror::Error;

/// Adapter error type.
#[derive(Debug, Error)]
pub enum FsError {
    /// Missing or invalid configuration, or a failed mount.
    #[error("configuration error: {0}")]
    Config(String),

    /// File or directory not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Path already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Directory not empty.
    #[error("directory not empty: {0}")]
    DirectoryNotEmpty(String),

    /// Expected a directory.
    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// Expected a file.
    #[error("is a directory: {0}")]
    IsADirectory(String),

    /// Operation not supported by this adapter.
    #[error("not supported: {0}")]
    Unsupported(String),

    /// Invalid path.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// Invalid argument to an operation.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// External command exited with an unexpected status.
    #[error("command `{command}` failed (exit code {code:?}): {stderr}")]
    Process {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    /// Recursive delete stopped at the first failing entry.
    #[error("delete of {path} stopped at {failed}; {} entries left undeleted", .undeleted.len())]
    PartialDelete {
        path: String,
        failed: String,
        undeleted: Vec<String>,
        #[source]
        source: Box<FsError>,
    },

    /// Error reported by the storage backend.
    #[error("backend error: {0}")]
    Backend(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

impl FsError {
    /// Create a Config error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a NotFound error.
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound(path.into())
    }

    /// Create an AlreadyExists error.
    pub fn already_exists(path: impl Into<String>) -> Self {
        Self::AlreadyExists(path.into())
    }

    /// Create a DirectoryNotEmpty error.
    pub fn directory_not_empty(path: impl Into<String>) -> Self {
        Self::DirectoryNotEmpty(path.into())
    }

    /// Create a NotADirectory error.
    pub fn not_a_directory(path: impl Into<String>) -> Self {
        Self::NotADirectory(path.into())
    }

    /// Create an IsADirectory error.
    pub fn is_a_directory(path: impl Into<String>) -> Self {
        Self::IsADirectory(path.into())
    }

    /// Create an Unsupported error.
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }

    /// Create an InvalidPath error.
    pub fn invalid_path(path: impl Into<String>) -> Self {
        Self::InvalidPath(path.into())
    }

    /// Create an InvalidArgument error.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create a Backend error.
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }

    /// Create an Other error.
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Map an `io::Error` raised while touching `path`, keeping the path in the message.
    pub fn from_io(err: io::Error, path: impl std::fmt::Display) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Self::NotFound(path.to_string()),
            io::ErrorKind::AlreadyExists => Self::AlreadyExists(path.to_string()),
            io::ErrorKind::DirectoryNotEmpty => Self::DirectoryNotEmpty(path.to_string()),
            io::ErrorKind::NotADirectory => Self::NotADirectory(path.to_string()),
            io::ErrorKind::IsADirectory => Self::IsADirectory(path.to_string()),
            _ => Self::Io(io::Error::new(err.kind(), format!("{path}: {err}"))),
        }
    }

    /// Returns true for `NotFound`.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Convert FsError to std::io::Error for compatibility.
impl From<FsError> for io::Error {
    fn from(e: FsError) -> Self {
        match e {
            FsError::NotFound(msg) => io::Error::new(io::ErrorKind::NotFound, msg),
            FsError::AlreadyExists(msg) => io::Error::new(io::ErrorKind::AlreadyExists, msg),
            FsError::DirectoryNotEmpty(msg) => {
                io::Error::new(io::ErrorKind::DirectoryNotEmpty, msg)
            }
            FsError::NotADirectory(msg) => io::Error::new(io::ErrorKind::NotADirectory, msg),
            FsError::IsADirectory(msg) => io::Error::new(io::ErrorKind::IsADirectory, msg),
            FsError::Unsupported(msg) => io::Error::new(io::ErrorKind::Unsupported, msg),
            FsError::InvalidPath(msg) | FsError::InvalidArgument(msg) => {
                io::Error::new(io::ErrorKind::InvalidInput, msg)
            }
            FsError::Io(e) => e,
            other => io::Error::other(other.to_string()),
        }
    }
}

/// Adapter result type.
pub type FsResult<T> = Result<T, FsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_io_keeps_path() {
        let err = FsError::from_io(io::Error::from(io::ErrorKind::NotFound), "/a/b");
        assert!(matches!(err, FsError::NotFound(ref p) if p == "/a/b"));

        let err = FsError::from_io(io::Error::from(io::ErrorKind::PermissionDenied), "/a/b");
        assert!(err.to_string().contains("/a/b"));
    }

    #[test]
    fn test_into_io_error_kind() {
        let io_err: io::Error = FsError::unsupported("append").into();
        assert_eq!(io_err.kind(), io::ErrorKind::Unsupported);

        let io_err: io::Error = FsError::directory_not_empty("/d").into();
        assert_eq!(io_err.kind(), io::ErrorKind::DirectoryNotEmpty);
    }

    #[test]
    fn test_partial_delete_message() {
        let err = FsError::PartialDelete {
            path: "/d".into(),
            failed: "/d/x".into(),
            undeleted: vec!["/d/x".into(), "/d".into()],
            source: Box::new(FsError::other("boom")),
        };
        let msg = err.to_string();
        assert!(msg.contains("/d/x"));
        assert!(msg.contains("2 entries"));
    }
}
