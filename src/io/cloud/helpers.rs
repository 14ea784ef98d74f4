//! Retry and pagination helpers shared by the fetch loop.
//!
//! - [`retry_with_backoff`] / [`retry_with_backoff_observed`] - Retry transient failures with exponential backoff
//! - [`retry_until_stopped`] - The same, abandoning the backoff as soon as a stop flag is raised
//! - [`PartitionLister`] - Lazy, restartable iterator over a paginated listing

use crate::io::cloud::traits::{CloudIOError, CloudResult, ErrorKind, ObjectIO, ObjectMetadata};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

// ============================================================================
// Retry Helper
// ============================================================================

/// Configuration for retry behavior
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    /// Total attempts per request, including the first one.
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 100,
            max_delay_ms: 5000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Same attempt budget without any sleeping; handy in tests.
    #[must_use]
    pub const fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay_ms: 0,
            max_delay_ms: 0,
            backoff_multiplier: 1.0,
        }
    }

    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    fn next_delay(&self, delay_ms: u64) -> u64 {
        let grown = (delay_ms as f64 * self.backoff_multiplier.max(1.0)) as u64;
        grown.min(self.max_delay_ms)
    }
}

/// Retry a function with exponential backoff
///
/// Only errors whose kind is transient (see [`ErrorKind::is_transient`]) are
/// retried; anything else is returned on the spot.
///
/// # Errors
///
/// Returns the first permanent error, or the last transient error once
/// `max_attempts` is exhausted.
pub fn retry_with_backoff<F, T>(config: &RetryConfig, operation: F) -> CloudResult<T>
where
    F: FnMut() -> CloudResult<T>,
{
    retry_with_backoff_observed(config, |_, _| {}, operation)
}

/// [`retry_with_backoff`] that reports every failed attempt that is about to
/// be retried as `(attempt, error)`, with `attempt` counted from 1.
///
/// # Errors
///
/// Same as [`retry_with_backoff`].
pub fn retry_with_backoff_observed<F, O, T>(
    config: &RetryConfig,
    on_retry: O,
    operation: F,
) -> CloudResult<T>
where
    F: FnMut() -> CloudResult<T>,
    O: FnMut(u32, &CloudIOError),
{
    retry_until_stopped(config, &AtomicBool::new(false), on_retry, operation)
}

/// [`retry_with_backoff_observed`] that gives up as soon as `stop` is raised.
///
/// The flag is checked before every retry and polled while backing off, so a
/// stop request never waits out a long delay. The error that triggered the
/// abandoned retry is returned.
///
/// # Errors
///
/// Same as [`retry_with_backoff`], plus the pending transient error when
/// `stop` is raised.
pub fn retry_until_stopped<F, O, T>(
    config: &RetryConfig,
    stop: &AtomicBool,
    mut on_retry: O,
    mut operation: F,
) -> CloudResult<T>
where
    F: FnMut() -> CloudResult<T>,
    O: FnMut(u32, &CloudIOError),
{
    let mut attempt = 0;
    let mut delay_ms = config.initial_delay_ms;

    loop {
        attempt += 1;
        match operation() {
            Ok(result) => return Ok(result),
            Err(err) => {
                if !err.is_transient() || attempt >= config.max_attempts.max(1) {
                    return Err(err);
                }
                if stop.load(Ordering::Relaxed) {
                    return Err(err);
                }
                on_retry(attempt, &err);
                if !sleep_unless_stopped(Duration::from_millis(delay_ms), stop) {
                    return Err(err);
                }
                delay_ms = config.next_delay(delay_ms);
            }
        }
    }
}

const STOP_POLL: Duration = Duration::from_millis(50);

/// Sleep for `delay` in short slices. Returns `false` if `stop` was raised.
fn sleep_unless_stopped(delay: Duration, stop: &AtomicBool) -> bool {
    let deadline = Instant::now() + delay;
    loop {
        if stop.load(Ordering::Relaxed) {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        std::thread::sleep((deadline - now).min(STOP_POLL));
    }
}

// ============================================================================
// Partition Listing
// ============================================================================

/// Lazy iterator over every object under a prefix.
///
/// Pages are requested only when the previous one has been consumed, so a
/// run that stops early never lists the rest of the bucket. Transient listing
/// failures are retried with the lister's [`RetryConfig`]; once an error is
/// yielded the iterator is finished. [`PartitionLister::restart`] rewinds to
/// the first page.
pub struct PartitionLister<'a> {
    store: &'a dyn ObjectIO,
    bucket: String,
    prefix: Option<String>,
    page_size: usize,
    retry: RetryConfig,
    stop: Arc<AtomicBool>,
    buffered: VecDeque<ObjectMetadata>,
    next_token: Option<String>,
    started: bool,
    finished: bool,
    retries: u64,
}

impl<'a> PartitionLister<'a> {
    pub fn new(store: &'a dyn ObjectIO, bucket: impl Into<String>, prefix: Option<String>) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            prefix,
            page_size: 1000,
            retry: RetryConfig::default(),
            stop: Arc::new(AtomicBool::new(false)),
            buffered: VecDeque::new(),
            next_token: None,
            started: false,
            finished: false,
            retries: 0,
        }
    }

    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    #[must_use]
    pub const fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Stop retrying a failed page once `stop` is raised.
    #[must_use]
    pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = stop;
        self
    }

    /// Listing retries performed so far.
    #[must_use]
    pub const fn retries(&self) -> u64 {
        self.retries
    }

    /// Rewind to the first page.
    pub fn restart(&mut self) {
        self.buffered.clear();
        self.next_token = None;
        self.started = false;
        self.finished = false;
    }

    fn fetch_page(&mut self) -> CloudResult<()> {
        let token = self.next_token.take();
        let store = self.store;
        let (bucket, prefix, page_size) = (&self.bucket, self.prefix.as_deref(), self.page_size);
        let mut retries = 0;
        let page = retry_until_stopped(
            &self.retry,
            &self.stop,
            |attempt, err| {
                retries += 1;
                warn!(attempt, error = %err, "listing failed, retrying");
            },
            || store.list_page(bucket, prefix, token.as_deref(), page_size),
        );
        self.retries += retries;
        let page = page?;
        debug!(objects = page.objects.len(), more = page.next_token.is_some(), "listed page");
        self.started = true;
        self.buffered.extend(page.objects);
        self.next_token = page.next_token;
        Ok(())
    }
}

impl Iterator for PartitionLister<'_> {
    type Item = CloudResult<ObjectMetadata>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(object) = self.buffered.pop_front() {
                return Some(Ok(object));
            }
            if self.finished || (self.started && self.next_token.is_none()) {
                return None;
            }
            if let Err(err) = self.fetch_page() {
                self.finished = true;
                return Some(Err(err));
            }
        }
    }
}

/// Reject keys a store could never serve before any request is made.
///
/// # Errors
///
/// Returns [`ErrorKind::InvalidInput`] for empty or absolute keys.
pub fn validate_key_path(key: &str) -> CloudResult<()> {
    if key.is_empty() {
        return Err(CloudIOError::new(ErrorKind::InvalidInput, "key cannot be empty"));
    }
    if key.starts_with('/') {
        return Err(CloudIOError::new(
            ErrorKind::InvalidInput,
            format!("key must be relative: {key}"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_grows_and_caps() {
        let config = RetryConfig {
            max_attempts: 5,
            initial_delay_ms: 100,
            max_delay_ms: 350,
            backoff_multiplier: 2.0,
        };
        assert_eq!(config.next_delay(100), 200);
        assert_eq!(config.next_delay(200), 350);
        assert_eq!(config.next_delay(350), 350);
    }

    #[test]
    fn test_permanent_error_not_retried() {
        let mut calls = 0;
        let result: CloudResult<()> = retry_with_backoff(&RetryConfig::immediate(5), || {
            calls += 1;
            Err(CloudIOError::new(ErrorKind::NotFound, "gone"))
        });
        assert_eq!(result.unwrap_err().kind, ErrorKind::NotFound);
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_raised_stop_cuts_backoff_short() {
        let config = RetryConfig {
            max_attempts: 10,
            initial_delay_ms: 5_000,
            max_delay_ms: 5_000,
            backoff_multiplier: 1.0,
        };
        let stop = Arc::new(AtomicBool::new(false));
        let raiser = {
            let stop = Arc::clone(&stop);
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(100));
                stop.store(true, Ordering::Relaxed);
            })
        };

        let started = Instant::now();
        let mut calls = 0;
        let result: CloudResult<()> = retry_until_stopped(&config, &stop, |_, _| {}, || {
            calls += 1;
            Err(CloudIOError::new(ErrorKind::Timeout, "slow"))
        });
        raiser.join().unwrap();

        assert_eq!(result.unwrap_err().kind, ErrorKind::Timeout);
        assert_eq!(calls, 1);
        assert!(started.elapsed() < Duration::from_secs(2), "waited {:?}", started.elapsed());
    }

    #[test]
    fn test_stop_already_raised_skips_retry() {
        let stop = AtomicBool::new(true);
        let mut calls = 0;
        let result: CloudResult<()> = retry_until_stopped(&RetryConfig::immediate(5), &stop, |_, _| {}, || {
            calls += 1;
            Err(CloudIOError::new(ErrorKind::Network, "down"))
        });
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_validate_key_path() {
        assert!(validate_key_path("path/to/key").is_ok());
        assert!(validate_key_path("").is_err());
        assert!(validate_key_path("/absolute/path").is_err());
    }
}
