//! Pluggable decompression for compressed partitions.
//!
//! A partition is flagged compressed purely by its name suffix (`.gz`,
//! `.zst`, ...). The flagged object's bytes are wrapped with the matching
//! codec's decoder, and everything downstream sees plain JSONL bytes.
//!
//! ## Built-in Codecs
//!
//! When enabled via feature flags, the following codecs are available:
//! - **Gzip** (`.gz`) - via `flate2` crate (feature: `compression-gzip`)
//! - **Zstd** (`.zst`) - via `zstd` crate (feature: `compression-zstd`)
//! - **Bzip2** (`.bz2`) - via `bzip2` crate (feature: `compression-bzip2`)
//! - **Xz** (`.xz`) - via `xz2` crate (feature: `compression-xz`)
//!
//! ## Custom Codec Implementation
//! ```
//! use linesieve::io::compression::{CodecSet, CompressionCodec};
//! use std::io::Read;
//! use std::sync::Arc;
//!
//! struct Identity;
//!
//! impl CompressionCodec for Identity {
//!     fn name(&self) -> &str { "identity" }
//!     fn extensions(&self) -> &[&str] { &[".id"] }
//!     fn wrap_reader_dyn(&self, reader: Box<dyn Read + Send>) -> std::io::Result<Box<dyn Read + Send>> {
//!         Ok(reader)
//!     }
//! }
//!
//! let codecs = CodecSet::builtin().with(Arc::new(Identity));
//! assert!(codecs.detect("part-0.jsonl.id").is_some());
//! assert!(codecs.detect("part-0.jsonl").is_none());
//! ```

use std::fmt;
use std::io::Read;
use std::sync::Arc;

/// Pluggable decompression codec.
pub trait CompressionCodec: Send + Sync {
    /// Human-readable codec name (e.g., "gzip", "zstd").
    fn name(&self) -> &str;

    /// Name suffixes associated with this codec, lowercase with the leading
    /// dot (e.g., `&[".gz", ".gzip"]`).
    fn extensions(&self) -> &[&str];

    /// Wrap a reader with decompression.
    ///
    /// # Errors
    ///
    /// Returns an error if the decoder cannot be initialised (for codecs that
    /// read a header eagerly).
    fn wrap_reader_dyn(&self, reader: Box<dyn Read + Send>) -> std::io::Result<Box<dyn Read + Send>>;
}

/// The codecs a run may use, checked in order.
#[derive(Clone)]
pub struct CodecSet {
    codecs: Vec<Arc<dyn CompressionCodec>>,
}

impl fmt::Debug for CodecSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.codecs.iter().map(|c| c.name()))
            .finish()
    }
}

impl Default for CodecSet {
    fn default() -> Self {
        Self::builtin()
    }
}

impl CodecSet {
    /// Every codec compiled into this build.
    #[must_use]
    pub fn builtin() -> Self {
        Self {
            codecs: vec![
                #[cfg(feature = "compression-gzip")]
                Arc::new(GzipCodec),
                #[cfg(feature = "compression-zstd")]
                Arc::new(ZstdCodec),
                #[cfg(feature = "compression-bzip2")]
                Arc::new(Bzip2Codec),
                #[cfg(feature = "compression-xz")]
                Arc::new(XzCodec),
            ],
        }
    }

    /// No codecs: every partition is read as plain bytes.
    #[must_use]
    pub const fn none() -> Self {
        Self { codecs: Vec::new() }
    }

    #[must_use]
    pub fn with(mut self, codec: Arc<dyn CompressionCodec>) -> Self {
        self.codecs.push(codec);
        self
    }

    /// Codec whose suffix matches `name`, case-insensitively.
    #[must_use]
    pub fn detect(&self, name: &str) -> Option<Arc<dyn CompressionCodec>> {
        let lower = name.to_lowercase();
        self.codecs
            .iter()
            .find(|codec| codec.extensions().iter().any(|ext| lower.ends_with(ext)))
            .cloned()
    }
}

// ============================================================================
// Built-in Codec Implementations
// ============================================================================

#[cfg(feature = "compression-gzip")]
struct GzipCodec;

#[cfg(feature = "compression-gzip")]
impl CompressionCodec for GzipCodec {
    fn name(&self) -> &str {
        "gzip"
    }

    fn extensions(&self) -> &[&str] {
        &[".gz", ".gzip"]
    }

    fn wrap_reader_dyn(&self, reader: Box<dyn Read + Send>) -> std::io::Result<Box<dyn Read + Send>> {
        // Multi-member so concatenated gzip files decode completely.
        use flate2::read::MultiGzDecoder;
        Ok(Box::new(MultiGzDecoder::new(reader)))
    }
}

#[cfg(feature = "compression-zstd")]
struct ZstdCodec;

#[cfg(feature = "compression-zstd")]
impl CompressionCodec for ZstdCodec {
    fn name(&self) -> &str {
        "zstd"
    }

    fn extensions(&self) -> &[&str] {
        &[".zst", ".zstd"]
    }

    fn wrap_reader_dyn(&self, reader: Box<dyn Read + Send>) -> std::io::Result<Box<dyn Read + Send>> {
        zstd::stream::read::Decoder::new(reader).map(|d| Box::new(d) as Box<dyn Read + Send>)
    }
}

#[cfg(feature = "compression-bzip2")]
struct Bzip2Codec;

#[cfg(feature = "compression-bzip2")]
impl CompressionCodec for Bzip2Codec {
    fn name(&self) -> &str {
        "bzip2"
    }

    fn extensions(&self) -> &[&str] {
        &[".bz2", ".bzip2"]
    }

    fn wrap_reader_dyn(&self, reader: Box<dyn Read + Send>) -> std::io::Result<Box<dyn Read + Send>> {
        use bzip2::read::MultiBzDecoder;
        Ok(Box::new(MultiBzDecoder::new(reader)))
    }
}

#[cfg(feature = "compression-xz")]
struct XzCodec;

#[cfg(feature = "compression-xz")]
impl CompressionCodec for XzCodec {
    fn name(&self) -> &str {
        "xz"
    }

    fn extensions(&self) -> &[&str] {
        &[".xz"]
    }

    fn wrap_reader_dyn(&self, reader: Box<dyn Read + Send>) -> std::io::Result<Box<dyn Read + Send>> {
        use xz2::read::XzDecoder;
        Ok(Box::new(XzDecoder::new_multi_decoder(reader)))
    }
}
