//! Object storage access for corpus partitions.
//!
//! The scan needs three things from a store: a paginated listing, whole-object
//! reads (for compressed partitions), and inclusive byte-range reads (for
//! plain ones). [`ObjectIO`] captures exactly that, synchronously, so the
//! drive loop stays a plain sequential loop.
//!
//! ## Implementations
//!
//! - [`FakeObjectIO`] - In-memory store with scripted fault injection, for tests
//! - [`LocalObjectIO`] - Directory-backed store for local corpora
//! - `HttpObjectIO` - Anonymous ranged GETs against a public bucket (feature: `http`)
//!
//! ## Error Handling
//!
//! All operations return [`CloudResult<T>`] where the error is [`CloudIOError`].
//! [`ErrorKind::is_transient`] decides whether a failure is worth retrying:
//! - `Network` / `Timeout` / `ServiceUnavailable` / `RateLimited` - transient
//! - `NotFound` / `InvalidRange` / `InvalidInput` / `Corrupt` / auth errors - permanent
//!
//! ## Example
//! ```
//! use linesieve::io::cloud::*;
//!
//! # fn main() -> CloudResult<()> {
//! let storage = FakeObjectIO::new();
//! storage.put_object("bucket", "part-0.jsonl", b"{\"content\":\"hi\"}\n")?;
//!
//! let head = storage.get_range("bucket", "part-0.jsonl", 0, 3)?;
//! assert_eq!(head, b"{\"co");
//! # Ok(())
//! # }
//! ```

pub mod fake;
pub mod helpers;
#[cfg(feature = "http")]
pub mod http;
pub mod local;
pub mod traits;

pub use fake::*;
pub use local::*;
pub use traits::*;
