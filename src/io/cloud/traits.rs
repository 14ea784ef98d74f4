//! Core traits for object storage access.
//!
//! The scan only ever needs a narrow slice of an object store: paginated
//! listing, whole-object reads, streamed object reads, and inclusive
//! byte-range reads. Everything is synchronous; implementations that talk to
//! async SDKs block internally.

use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::io::{Cursor, Read};

// ============================================================================
// Core Error Type
// ============================================================================

/// Generic error type for object storage operations
#[derive(Debug, Clone)]
pub struct CloudIOError {
    pub message: String,
    pub kind: ErrorKind,
    pub source: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Authentication,
    Authorization,
    NotFound,
    /// A byte range that starts past the end of the object (HTTP 416).
    InvalidRange,
    InvalidInput,
    /// The bytes arrived but could not be decoded (bad compressed stream).
    Corrupt,
    Network,
    Timeout,
    ServiceUnavailable,
    RateLimited,
    InternalError,
    Other,
}

impl ErrorKind {
    /// Whether retrying the same request can reasonably succeed.
    #[must_use]
    pub const fn is_transient(self) -> bool {
        matches!(
            self,
            Self::Network | Self::Timeout | Self::ServiceUnavailable | Self::RateLimited
        )
    }
}

impl fmt::Display for CloudIOError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)?;
        if let Some(source) = &self.source {
            write!(f, " ({source})")?;
        }
        Ok(())
    }
}

impl Error for CloudIOError {}

impl CloudIOError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind,
            source: None,
        }
    }

    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    #[must_use]
    pub const fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }
}

impl From<std::io::Error> for CloudIOError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind as Io;
        let kind = match err.kind() {
            Io::NotFound => ErrorKind::NotFound,
            Io::PermissionDenied => ErrorKind::Authorization,
            Io::TimedOut | Io::WouldBlock => ErrorKind::Timeout,
            Io::ConnectionReset
            | Io::ConnectionAborted
            | Io::ConnectionRefused
            | Io::BrokenPipe
            | Io::Interrupted
            | Io::UnexpectedEof => ErrorKind::Network,
            Io::InvalidData => ErrorKind::Corrupt,
            Io::InvalidInput => ErrorKind::InvalidInput,
            _ => ErrorKind::Other,
        };
        Self::new(kind, err.to_string())
    }
}

pub type CloudResult<T> = Result<T, CloudIOError>;

// ============================================================================
// ObjectIO - Object Storage
// ============================================================================

/// Metadata for an object in storage
#[derive(Debug, Clone)]
pub struct ObjectMetadata {
    pub key: String,
    /// Size in bytes when the store reports it; listings may omit it.
    pub size: Option<u64>,
    pub custom_metadata: HashMap<String, String>,
}

impl ObjectMetadata {
    pub fn new(key: impl Into<String>, size: Option<u64>) -> Self {
        Self {
            key: key.into(),
            size,
            custom_metadata: HashMap::new(),
        }
    }
}

/// One page of a paginated listing.
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub objects: Vec<ObjectMetadata>,
    /// Opaque token for the next page; `None` when the listing is complete.
    pub next_token: Option<String>,
}

/// Trait for object storage operations
pub trait ObjectIO: Send + Sync {
    /// Upload data to object storage
    ///
    /// # Errors
    ///
    /// Returns an error if the bucket is not writable or the upload fails
    fn put_object(&self, bucket: &str, key: &str, data: &[u8]) -> CloudResult<()>;

    /// Download a whole object
    ///
    /// # Errors
    ///
    /// Returns an error if the object doesn't exist, permissions are not enough, or the download fails
    fn get_object(&self, bucket: &str, key: &str) -> CloudResult<Vec<u8>>;

    /// Open an object as a byte stream, front to back.
    ///
    /// Compressed partitions are decoded straight off this reader, so stores
    /// backed by files or network bodies should hand those out directly
    /// instead of buffering the object. The default reads the whole object.
    ///
    /// Read errors surface as [`std::io::Error`]s whose kind tells transport
    /// failures (`TimedOut`, `ConnectionAborted`, ...) apart from bad data.
    ///
    /// # Errors
    ///
    /// Returns an error if the object doesn't exist, permissions are not enough, or the request fails
    fn open_object(&self, bucket: &str, key: &str) -> CloudResult<Box<dyn Read + Send>> {
        let data = self.get_object(bucket, key)?;
        Ok(Box::new(Cursor::new(data)))
    }

    /// Download the inclusive byte range `start..=end` of an object.
    ///
    /// A range reaching past the end of the object returns the bytes that
    /// exist; a range *starting* past the end fails with
    /// [`ErrorKind::InvalidRange`].
    ///
    /// # Errors
    ///
    /// Returns an error if the object doesn't exist, the range is unsatisfiable, or the download fails
    fn get_range(&self, bucket: &str, key: &str, start: u64, end: u64) -> CloudResult<Vec<u8>>;

    /// List one page of objects, in key order, optionally under a prefix.
    ///
    /// # Errors
    ///
    /// Returns an error if the bucket doesn't exist, permissions are not enough, or the listing fails
    fn list_page(
        &self,
        bucket: &str,
        prefix: Option<&str>,
        token: Option<&str>,
        page_size: usize,
    ) -> CloudResult<ListPage>;
}

/// Clamp an inclusive range request against a known object length.
///
/// Shared by in-memory and filesystem stores so both answer range requests
/// identically.
///
/// # Errors
///
/// Returns [`ErrorKind::InvalidRange`] if `start` is at or past `len`, or
/// [`ErrorKind::InvalidInput`] if `end < start`.
pub fn clamp_range(len: u64, start: u64, end: u64) -> CloudResult<(u64, u64)> {
    if end < start {
        return Err(CloudIOError::new(
            ErrorKind::InvalidInput,
            format!("malformed range bytes={start}-{end}"),
        ));
    }
    if start >= len {
        return Err(CloudIOError::new(
            ErrorKind::InvalidRange,
            format!("range start {start} beyond object length {len}"),
        ));
    }
    Ok((start, end.min(len - 1)))
}
