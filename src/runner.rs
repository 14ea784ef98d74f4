//! The resilient drive loop.
//!
//! Partitions are processed strictly one after another in listing order:
//! fetch a chunk, reassemble lines, decode, match, select, repeat. Fetches
//! are retried with backoff on transient errors; a partition whose budget
//! runs out, or that fails permanently, is skipped and counted rather than
//! aborting the run. The loop ends when the listing is exhausted, when a
//! prefix policy has its rows, or when the stop flag is raised; in every case
//! the selector and the sink are finalised before returning.
//!
//! ```
//! use linesieve::io::cloud::{FakeObjectIO, ObjectIO};
//! use linesieve::matcher::{MatchMode, Matcher};
//! use linesieve::output::VecSink;
//! use linesieve::runner::{RunContext, Runner};
//! use linesieve::selection::SelectionPolicy;
//!
//! # fn main() -> anyhow::Result<()> {
//! let store = FakeObjectIO::new();
//! store.put_object("corpus", "part-0.jsonl", "{\"content\":\"abc ももクロ xyz\"}\n{\"content\":\"ab\"}\n".as_bytes())?;
//!
//! let matcher = Matcher::new(5, 50, &["ももクロ"], MatchMode::Literal)?;
//! let runner = Runner::new(&store, "corpus", matcher, SelectionPolicy::Exhaustive);
//! let mut sink = VecSink::new();
//! let summary = runner.run(&mut RunContext::new(42), &mut sink)?;
//!
//! assert_eq!(summary.lines_scanned, 2);
//! assert_eq!(sink.rows.len(), 1);
//! # Ok(())
//! # }
//! ```

use crate::io::cloud::helpers::{PartitionLister, RetryConfig, retry_until_stopped};
use crate::io::cloud::traits::{CloudIOError, CloudResult, ObjectIO};
use crate::io::compression::CodecSet;
use crate::matcher::Matcher;
use crate::output::RowSink;
use crate::reassembly::LineReassembler;
use crate::record::{DecodeError, FieldFallback, decode};
use crate::selection::{Flow, MatchedRecord, SelectionPolicy, Selector, SplitMix64};
use crate::source::{ChunkStream, FetchError, PartitionRef};
use crate::summary::{RunSummary, StopReason};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, trace, warn};

/// Default bytes per ranged fetch (100 MiB).
pub const DEFAULT_CHUNK_SIZE: u64 = 100 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum RunError {
    #[error("listing partitions failed: {0}")]
    Listing(#[source] CloudIOError),

    #[error("all {count} partitions failed after exhausting their retry budget")]
    AllPartitionsFailed { count: u64 },

    #[error(transparent)]
    Output(#[from] anyhow::Error),
}

/// Per-run mutable state that must not be global: the random generator,
/// the retry budget, and the stop flag.
#[derive(Debug)]
pub struct RunContext {
    pub rng: SplitMix64,
    pub retry: RetryConfig,
    stop: Arc<AtomicBool>,
}

impl RunContext {
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            rng: SplitMix64::new(seed),
            retry: RetryConfig::default(),
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    #[must_use]
    pub const fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Observe an externally owned stop flag.
    #[must_use]
    pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = stop;
        self
    }

    /// Handle that stops the run when set to `true`.
    #[must_use]
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }
}

/// Where the partitions come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartitionSource {
    /// Everything the store lists under an optional prefix.
    Listing { prefix: Option<String> },
    /// Exactly these keys, in this order.
    Keys(Vec<String>),
}

enum Partitions<'a> {
    Listed(PartitionLister<'a>),
    Keys(std::vec::IntoIter<String>),
}

impl Partitions<'_> {
    fn next(&mut self, codecs: &CodecSet) -> Option<CloudResult<PartitionRef>> {
        match self {
            Self::Listed(lister) => lister
                .next()
                .map(|r| r.map(|meta| PartitionRef::from_metadata(meta, codecs))),
            Self::Keys(keys) => keys.next().map(|k| Ok(PartitionRef::new(k, None, codecs))),
        }
    }

    fn retries(&self) -> u64 {
        match self {
            Self::Listed(lister) => lister.retries(),
            Self::Keys(_) => 0,
        }
    }
}

enum PartitionOutcome {
    Completed,
    Skipped(FetchError),
    Stopped(StopReason),
}

/// Configured scan over one bucket.
pub struct Runner<'a> {
    store: &'a dyn ObjectIO,
    bucket: String,
    source: PartitionSource,
    codecs: CodecSet,
    chunk_size: u64,
    page_size: usize,
    fallback: FieldFallback,
    matcher: Matcher,
    policy: SelectionPolicy,
}

impl<'a> Runner<'a> {
    pub fn new(
        store: &'a dyn ObjectIO,
        bucket: impl Into<String>,
        matcher: Matcher,
        policy: SelectionPolicy,
    ) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            source: PartitionSource::Listing { prefix: None },
            codecs: CodecSet::builtin(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            page_size: 1000,
            fallback: FieldFallback::default(),
            matcher,
            policy,
        }
    }

    #[must_use]
    pub fn with_source(mut self, source: PartitionSource) -> Self {
        self.source = source;
        self
    }

    #[must_use]
    pub fn with_codecs(mut self, codecs: CodecSet) -> Self {
        self.codecs = codecs;
        self
    }

    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    #[must_use]
    pub const fn with_fallback(mut self, fallback: FieldFallback) -> Self {
        self.fallback = fallback;
        self
    }

    /// Scan every partition and write the selection to `sink`.
    ///
    /// # Errors
    ///
    /// Returns [`RunError`] if the listing fails, if every partition ran out
    /// of retries, or if the sink fails. The sink is finalised first in all
    /// of these cases.
    pub fn run(&self, ctx: &mut RunContext, sink: &mut dyn RowSink) -> Result<RunSummary, RunError> {
        let (summary, result) = self.run_with_summary(ctx, sink);
        result.map(|()| summary)
    }

    /// Like [`Runner::run`], but hands back the counters gathered up to the
    /// point of failure as well.
    pub fn run_with_summary(&self, ctx: &mut RunContext, sink: &mut dyn RowSink) -> (RunSummary, Result<(), RunError>) {
        let started = Instant::now();
        let mut summary = RunSummary::default();
        let mut selector = Selector::new(self.policy);
        info!(
            bucket = %self.bucket,
            policy = self.policy.name(),
            keywords = ?self.matcher.keywords(),
            "scan started"
        );

        let driven = self.drive(ctx, &mut selector, sink, &mut summary);

        // Finalise on every path: held reservoir rows first, then the sink.
        let held = selector.held();
        let finalised = selector
            .finish(sink)
            .and_then(|written| sink.finish().map(|()| written));
        summary.elapsed = started.elapsed();

        let result = match finalised {
            Ok(written) => {
                summary.rows_written = written as u64;
                if held > 0 {
                    info!(rows = held, "reservoir flushed");
                }
                driven
            }
            Err(err) => Err(RunError::Output(err)),
        };
        match &result {
            Ok(()) => info!(%summary, "scan finished"),
            Err(err) => warn!(%summary, error = %err, "scan aborted"),
        }
        (summary, result)
    }

    fn drive(
        &self,
        ctx: &mut RunContext,
        selector: &mut Selector,
        sink: &mut dyn RowSink,
        summary: &mut RunSummary,
    ) -> Result<(), RunError> {
        let mut partitions = match &self.source {
            PartitionSource::Listing { prefix } => Partitions::Listed(
                PartitionLister::new(self.store, self.bucket.clone(), prefix.clone())
                    .with_page_size(self.page_size)
                    .with_retry(ctx.retry)
                    .with_stop_flag(ctx.stop_handle()),
            ),
            PartitionSource::Keys(keys) => Partitions::Keys(keys.clone().into_iter()),
        };

        let driven = loop {
            if ctx.is_cancelled() {
                break Ok(Some(StopReason::Cancelled));
            }
            if selector.is_complete() {
                break Ok(Some(StopReason::PrefixComplete));
            }
            let Some(next) = partitions.next(&self.codecs) else {
                break Ok(None);
            };
            let partition = match next {
                Ok(p) => p,
                Err(_) if ctx.is_cancelled() => break Ok(Some(StopReason::Cancelled)),
                Err(err) => break Err(RunError::Listing(err)),
            };
            summary.partitions_listed += 1;

            match self.scan_partition(ctx, &partition, selector, sink, summary) {
                Ok(PartitionOutcome::Completed) => summary.partitions_completed += 1,
                Ok(PartitionOutcome::Skipped(err)) => {
                    warn!(partition = %partition.key, error = %err, "partition skipped");
                    if err.is_transient() {
                        summary.partitions_skipped_transient += 1;
                    } else {
                        summary.partitions_skipped_permanent += 1;
                    }
                }
                Ok(PartitionOutcome::Stopped(reason)) => break Ok(Some(reason)),
                Err(err) => break Err(err),
            }
        };
        // Listing retries count however the loop ended.
        summary.retries += partitions.retries();
        let outcome = driven?;

        if let Some(reason) = outcome {
            info!(%reason, "stopping early");
            summary.stop_reason = reason;
            return Ok(());
        }
        summary.stop_reason = StopReason::Exhausted;
        if summary.partitions_listed > 0
            && summary.partitions_skipped_transient == summary.partitions_listed
        {
            return Err(RunError::AllPartitionsFailed {
                count: summary.partitions_listed,
            });
        }
        Ok(())
    }

    fn scan_partition(
        &self,
        ctx: &mut RunContext,
        partition: &PartitionRef,
        selector: &mut Selector,
        sink: &mut dyn RowSink,
        summary: &mut RunSummary,
    ) -> Result<PartitionOutcome, RunError> {
        info!(
            partition = %partition.key,
            codec = partition.codec_name().unwrap_or("none"),
            "scanning partition"
        );
        let mut stream = ChunkStream::new(self.store, &self.bucket, partition.clone(), self.chunk_size);
        let mut lines = LineReassembler::new();

        loop {
            if ctx.is_cancelled() {
                return Ok(PartitionOutcome::Stopped(StopReason::Cancelled));
            }

            let mut retries = 0u32;
            let fetched = retry_until_stopped(
                &ctx.retry,
                &ctx.stop,
                |attempt, err| {
                    retries += 1;
                    warn!(partition = %partition.key, attempt, error = %err, "fetch failed, retrying");
                },
                || stream.next_chunk(),
            );
            summary.retries += u64::from(retries);

            let chunk = match fetched {
                Ok(Some(chunk)) => chunk,
                Ok(None) => break,
                Err(err) => {
                    if lines.discard() > 0 {
                        summary.fragments_discarded += 1;
                    }
                    if ctx.is_cancelled() {
                        return Ok(PartitionOutcome::Stopped(StopReason::Cancelled));
                    }
                    let failure = FetchError::classify(Arc::clone(&partition.key), retries + 1, err);
                    return Ok(PartitionOutcome::Skipped(failure));
                }
            };
            summary.chunks_fetched += 1;
            summary.bytes_fetched += chunk.data.len() as u64;

            let mut stop = None;
            for line in lines.feed(&chunk.data) {
                if ctx.is_cancelled() {
                    stop = Some(StopReason::Cancelled);
                    break;
                }
                if self.process_line(&line, ctx, selector, sink, summary)? == Flow::Complete {
                    stop = Some(StopReason::PrefixComplete);
                    break;
                }
            }
            if let Some(reason) = stop {
                return Ok(PartitionOutcome::Stopped(reason));
            }

            debug!(
                partition = %partition.key,
                offset = chunk.offset,
                bytes = chunk.data.len(),
                carry = lines.pending(),
                matches = selector.offered(),
                written = selector.written(),
                held = selector.held(),
                "chunk processed"
            );

            if chunk.last {
                if let Some(tail) = lines.flush()
                    && self.process_line(&tail, ctx, selector, sink, summary)? == Flow::Complete
                {
                    return Ok(PartitionOutcome::Stopped(StopReason::PrefixComplete));
                }
                break;
            }
        }
        Ok(PartitionOutcome::Completed)
    }

    fn process_line(
        &self,
        line: &str,
        ctx: &mut RunContext,
        selector: &mut Selector,
        sink: &mut dyn RowSink,
        summary: &mut RunSummary,
    ) -> Result<Flow, RunError> {
        summary.lines_scanned += 1;
        let record = match decode(line, self.fallback) {
            Ok(record) => record,
            Err(DecodeError::Blank) => {
                summary.blank_lines += 1;
                return Ok(Flow::Continue);
            }
            Err(err) => {
                summary.decode_errors += 1;
                debug!(error = %err, "skipping undecodable line");
                return Ok(Flow::Continue);
            }
        };
        if !self.matcher.matches(&record.text) {
            return Ok(Flow::Continue);
        }
        summary.matches_seen += 1;
        let matched = MatchedRecord::from_record(record);
        trace!(id = %matched.id, length = matched.length, "match");
        Ok(selector.offer(matched, &mut ctx.rng, sink)?)
    }
}
