//! # Linesieve
//!
//! A **record picker** for very large JSON Lines corpora kept in object
//! storage. Linesieve streams each partition in bounded chunks, stitches the
//! chunks back into lines, decodes every line as a JSON object, keeps the
//! records whose text passes a length and keyword predicate, and writes a
//! selection of them to an append-mode CSV file.
//!
//! ## Key Features
//!
//! - **Bounded memory** - ranged fetches of a fixed size; nothing is ever read whole
//! - **Three selection policies** - first N, all, or a uniform random sample of N
//! - **Resilient fetching** - transient failures are retried with backoff;
//!   a partition that keeps failing is skipped and counted, not fatal
//! - **Script-aware keywords** - word boundaries for ASCII keywords, plain
//!   containment for CJK and other scripts, optional regular expressions
//! - **Compressed partitions** - gzip, zstd, bzip2 and xz behind feature flags
//! - **Deterministic sampling** - the same seed over the same input picks the same rows
//! - **Pluggable storage** - in-memory, local directory, or anonymous HTTP(S)
//!
//! ## Quick Start
//!
//! ```
//! use linesieve::io::cloud::{FakeObjectIO, ObjectIO};
//! use linesieve::{MatchMode, Matcher, RunContext, Runner, SelectionPolicy, VecSink};
//! # use anyhow::Result;
//!
//! # fn main() -> Result<()> {
//! let store = FakeObjectIO::new();
//! store.put_object(
//!     "corpus",
//!     "cc/part-00.jsonl",
//!     b"{\"id\":\"a\",\"content\":\"rust is fun\"}\n{\"id\":\"b\",\"content\":\"trusty\"}\n",
//! )?;
//!
//! let matcher = Matcher::new(1, 100, &["rust"], MatchMode::Literal)?;
//! let runner = Runner::new(&store, "corpus", matcher, SelectionPolicy::Prefix { limit: 10 });
//!
//! let mut sink = VecSink::new();
//! let summary = runner.run(&mut RunContext::new(42), &mut sink)?;
//!
//! assert_eq!(sink.rows.len(), 1);
//! assert_eq!(sink.rows[0].id, "a");
//! assert_eq!(summary.matches_seen, 1);
//! # Ok(())
//! # }
//! ```
//!
//! ## Core Concepts
//!
//! ### Partitions and chunks
//!
//! A partition is one object in the store. Plain partitions are read as
//! consecutive inclusive byte ranges; a range past the end of the object (or
//! a short read) ends the partition. Compressed partitions are read as one
//! stream through their codec and re-cut into chunks of the same size. See
//! [`source`].
//!
//! ### Line reassembly
//!
//! Chunk boundaries fall anywhere, including inside a multi-byte character.
//! [`LineReassembler`] keeps the trailing fragment of each chunk until the
//! next separator arrives, so the lines it yields are identical no matter how
//! the partition was cut.
//!
//! ### Selection
//!
//! - [`SelectionPolicy::Prefix`] writes the first `limit` matches and stops fetching
//! - [`SelectionPolicy::Exhaustive`] writes every match
//! - [`SelectionPolicy::Reservoir`] holds a uniform sample and writes it at the end
//!
//! ### Failure handling
//!
//! Transport errors carry an [`ErrorKind`](io::cloud::ErrorKind); only
//! network, timeout, throttling and unavailability are retried. Every skip is
//! counted in the [`RunSummary`]. Listing failures, output failures, and a
//! run in which every partition ran out of retries are fatal, and the output
//! is still flushed first.
//!
//! ## Feature Flags
//!
//! - `compression-gzip`, `compression-zstd`, `compression-bzip2`, `compression-xz` - codecs
//! - `http` - anonymous HTTP(S) object store (`reqwest`, blocking)
//!
//! All of them are on by default.
//!
//! ## Module Overview
//!
//! - [`io`] - object store seam, stores, retry and listing helpers, codecs
//! - [`source`] - chunk fetching per partition
//! - [`reassembly`] - chunk-to-line reassembly
//! - [`record`] - line decoding and text extraction
//! - [`matcher`] - length and keyword predicate
//! - [`selection`] - selection policies, reservoir, ids
//! - [`output`] - CSV schema handling and sinks
//! - [`runner`] - the drive loop
//! - [`summary`] - run counters
//! - [`config`] - command-line and environment options

pub mod config;
pub mod io;
pub mod matcher;
pub mod output;
pub mod reassembly;
pub mod record;
pub mod runner;
pub mod selection;
pub mod source;
pub mod summary;

// Re-exports
pub use matcher::{MatchMode, Matcher};
pub use output::{CsvSink, RowSink, VecSink};
pub use reassembly::LineReassembler;
pub use record::{FieldFallback, Record};
pub use runner::{PartitionSource, RunContext, RunError, Runner};
pub use selection::{MatchedRecord, SelectionPolicy};
pub use summary::{RunSummary, StopReason};
