//! Chunk fetching: turns one partition into an ordered series of byte chunks.
//!
//! Plain partitions are read as consecutive inclusive byte ranges of a fixed
//! size, without knowing the object length up front; the partition ends on a
//! short read or when the store reports the range as unsatisfiable.
//! Compressed partitions are opened as one object stream and decoded on the
//! fly into chunks of the same size, so the caller sees one contract for both
//! and memory stays bounded by the chunk size either way.
//!
//! [`ChunkStream::next_chunk`] performs at most one request and only advances
//! its position when that request succeeds, which makes it safe to retry.

use crate::io::cloud::traits::{CloudIOError, CloudResult, ErrorKind, ObjectIO, ObjectMetadata};
use crate::io::compression::{CodecSet, CompressionCodec};
use std::fmt;
use std::io::Read;
use std::sync::Arc;
use thiserror::Error;

/// One listed unit of the corpus.
#[derive(Clone)]
pub struct PartitionRef {
    pub key: Arc<str>,
    pub size_hint: Option<u64>,
    codec: Option<Arc<dyn CompressionCodec>>,
}

impl fmt::Debug for PartitionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PartitionRef")
            .field("key", &self.key)
            .field("size_hint", &self.size_hint)
            .field("codec", &self.codec.as_ref().map(|c| c.name().to_string()))
            .finish()
    }
}

impl PartitionRef {
    /// Build a reference, flagging it compressed when the key's suffix names
    /// one of `codecs`.
    pub fn new(key: impl Into<Arc<str>>, size_hint: Option<u64>, codecs: &CodecSet) -> Self {
        let key = key.into();
        let codec = codecs.detect(&key);
        Self {
            key,
            size_hint,
            codec,
        }
    }

    #[must_use]
    pub fn from_metadata(meta: ObjectMetadata, codecs: &CodecSet) -> Self {
        Self::new(meta.key, meta.size, codecs)
    }

    #[must_use]
    pub const fn is_compressed(&self) -> bool {
        self.codec.is_some()
    }

    #[must_use]
    pub fn codec_name(&self) -> Option<&str> {
        self.codec.as_deref().map(CompressionCodec::name)
    }
}

/// Bytes from one fetch, in partition order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ByteChunk {
    pub partition: Arc<str>,
    /// Offset of `data[0]` within the (decompressed) partition stream.
    pub offset: u64,
    pub data: Vec<u8>,
    /// No more chunks follow for this partition.
    pub last: bool,
}

/// Why a partition could not be read to the end.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("transient failure on {partition} persisted after {attempts} attempts: {source}")]
    Transient {
        partition: Arc<str>,
        attempts: u32,
        source: CloudIOError,
    },

    #[error("permanent failure on {partition}: {source}")]
    Permanent {
        partition: Arc<str>,
        source: CloudIOError,
    },
}

impl FetchError {
    /// Classify a final (post-retry) error for `partition`.
    #[must_use]
    pub fn classify(partition: Arc<str>, attempts: u32, source: CloudIOError) -> Self {
        if source.is_transient() {
            Self::Transient {
                partition,
                attempts,
                source,
            }
        } else {
            Self::Permanent { partition, source }
        }
    }

    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

enum State {
    Ranged { offset: u64 },
    /// Open (or reopen) the object stream, skipping `resume_at` decoded bytes.
    StreamPending { resume_at: u64 },
    Streaming { reader: Box<dyn Read + Send>, offset: u64 },
    Done,
}

/// Chunk iterator over a single partition.
pub struct ChunkStream<'a> {
    store: &'a dyn ObjectIO,
    bucket: &'a str,
    partition: PartitionRef,
    chunk_size: u64,
    state: State,
}

impl<'a> ChunkStream<'a> {
    pub fn new(store: &'a dyn ObjectIO, bucket: &'a str, partition: PartitionRef, chunk_size: u64) -> Self {
        let state = if partition.is_compressed() {
            State::StreamPending { resume_at: 0 }
        } else {
            State::Ranged { offset: 0 }
        };
        Self {
            store,
            bucket,
            partition,
            chunk_size: chunk_size.max(1),
            state,
        }
    }

    #[must_use]
    pub const fn partition(&self) -> &PartitionRef {
        &self.partition
    }

    #[must_use]
    pub const fn is_done(&self) -> bool {
        matches!(self.state, State::Done)
    }

    /// Fetch the next chunk, or `None` once the final chunk was returned.
    ///
    /// # Errors
    ///
    /// Returns the store's error unchanged (the position is not advanced), or
    /// an [`ErrorKind::Corrupt`] error if a compressed stream fails to decode.
    pub fn next_chunk(&mut self) -> CloudResult<Option<ByteChunk>> {
        match &mut self.state {
            State::Done => Ok(None),
            State::Ranged { offset } => {
                let start = *offset;
                let end = start + self.chunk_size - 1;
                match self.store.get_range(self.bucket, &self.partition.key, start, end) {
                    Ok(data) => {
                        let len = data.len() as u64;
                        let last = len < self.chunk_size
                            || self.partition.size_hint.is_some_and(|size| start + len >= size);
                        *offset = start + len;
                        if last {
                            self.state = State::Done;
                        }
                        Ok(Some(self.chunk(start, data, last)))
                    }
                    // Reading past the end is how an object of unknown length ends.
                    Err(err) if err.kind == ErrorKind::InvalidRange => {
                        self.state = State::Done;
                        Ok(Some(self.chunk(start, Vec::new(), true)))
                    }
                    Err(err) => Err(err),
                }
            }
            State::StreamPending { resume_at } => {
                let resume_at = *resume_at;
                let mut reader = self.open_stream()?;
                if resume_at > 0 {
                    // Decoded bytes already handed out before the stream broke.
                    let skipped = std::io::copy(&mut reader.by_ref().take(resume_at), &mut std::io::sink())
                        .map_err(|e| self.stream_error(&e))?;
                    if skipped < resume_at {
                        self.state = State::Done;
                        return Err(CloudIOError::new(
                            ErrorKind::Corrupt,
                            format!("{} shrank to {skipped} bytes on reopen", self.partition.key),
                        ));
                    }
                }
                self.state = State::Streaming {
                    reader,
                    offset: resume_at,
                };
                self.next_chunk()
            }
            State::Streaming { reader, offset } => {
                let start = *offset;
                let mut data = Vec::with_capacity(usize::try_from(self.chunk_size).unwrap_or(usize::MAX).min(1 << 20));
                let read = reader
                    .by_ref()
                    .take(self.chunk_size)
                    .read_to_end(&mut data);
                if let Err(e) = read {
                    let err = self.stream_error(&e);
                    // A transport failure reopens the stream on the next call
                    // and resumes at the first byte not yet returned.
                    self.state = if err.is_transient() {
                        State::StreamPending { resume_at: start }
                    } else {
                        State::Done
                    };
                    return Err(err);
                }
                let last = (data.len() as u64) < self.chunk_size;
                *offset = start + data.len() as u64;
                if last {
                    self.state = State::Done;
                }
                Ok(Some(self.chunk(start, data, last)))
            }
        }
    }

    fn open_stream(&self) -> CloudResult<Box<dyn Read + Send>> {
        let Some(codec) = self.partition.codec.clone() else {
            return Err(CloudIOError::new(ErrorKind::Other, "stream state without codec"));
        };
        let raw = self.store.open_object(self.bucket, &self.partition.key)?;
        codec.wrap_reader_dyn(raw).map_err(|e| self.stream_error(&e))
    }

    fn chunk(&self, offset: u64, data: Vec<u8>, last: bool) -> ByteChunk {
        ByteChunk {
            partition: Arc::clone(&self.partition.key),
            offset,
            data,
            last,
        }
    }

    fn stream_error(&self, err: &std::io::Error) -> CloudIOError {
        if is_transport_failure(err.kind()) {
            return CloudIOError::from(std::io::Error::new(err.kind(), err.to_string()))
                .with_source(format!("reading {}", self.partition.key));
        }
        CloudIOError::new(
            ErrorKind::Corrupt,
            format!(
                "decode {} stream of {}",
                self.partition.codec_name().unwrap_or("compressed"),
                self.partition.key
            ),
        )
        .with_source(err.to_string())
    }
}

/// I/O error kinds raised by the underlying transport rather than by the
/// decoder. Everything else from a decoding reader means the bytes are bad.
const fn is_transport_failure(kind: std::io::ErrorKind) -> bool {
    use std::io::ErrorKind as Io;
    matches!(
        kind,
        Io::TimedOut
            | Io::WouldBlock
            | Io::ConnectionReset
            | Io::ConnectionAborted
            | Io::BrokenPipe
            | Io::Interrupted
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::cloud::fake::FakeObjectIO;

    #[test]
    fn test_ranged_chunks_cover_object_once() {
        let store = FakeObjectIO::new();
        store.put_object("b", "k.jsonl", b"0123456789").unwrap();
        let part = PartitionRef::new("k.jsonl", None, &CodecSet::none());
        let mut stream = ChunkStream::new(&store, "b", part, 4);

        let mut seen = Vec::new();
        while let Some(chunk) = stream.next_chunk().unwrap() {
            assert_eq!(chunk.offset as usize, seen.len());
            seen.extend_from_slice(&chunk.data);
            if chunk.last {
                break;
            }
        }
        assert_eq!(seen, b"0123456789");
        assert!(stream.is_done());
        assert_eq!(stream.next_chunk().unwrap(), None);
        assert_eq!(&*stream.partition().key, "k.jsonl");
    }

    #[test]
    fn test_failed_fetch_does_not_advance() {
        let store = FakeObjectIO::new();
        store.put_object("b", "k", b"abcdef").unwrap();
        store.fail_next("k", ErrorKind::Timeout, 1);
        let mut stream = ChunkStream::new(&store, "b", PartitionRef::new("k", Some(6), &CodecSet::none()), 3);

        assert_eq!(stream.next_chunk().unwrap_err().kind, ErrorKind::Timeout);
        let chunk = stream.next_chunk().unwrap().unwrap();
        assert_eq!((chunk.offset, chunk.data.as_slice(), chunk.last), (0, &b"abc"[..], false));
        let chunk = stream.next_chunk().unwrap().unwrap();
        assert_eq!((chunk.offset, chunk.last), (3, true));
    }

    #[test]
    fn test_classification() {
        let key: Arc<str> = Arc::from("k");
        let t = FetchError::classify(Arc::clone(&key), 3, CloudIOError::new(ErrorKind::Network, "x"));
        assert!(t.is_transient());
        let p = FetchError::classify(key, 1, CloudIOError::new(ErrorKind::NotFound, "x"));
        assert!(!p.is_transient());
    }
}
