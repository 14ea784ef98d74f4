//! Selection policies over the stream of matched records.
//!
//! - [`SelectionPolicy::Prefix`] - the first `limit` matches, then stop the run
//! - [`SelectionPolicy::Exhaustive`] - every match, never stops early
//! - [`SelectionPolicy::Reservoir`] - a uniform sample of `capacity` matches,
//!   written only once the stream has ended
//!
//! Prefix and exhaustive rows go to the sink as soon as they are offered.
//! Reservoir rows are held until [`Selector::finish`], because a later swap can
//! evict any of them.

pub mod reservoir;
pub mod rng;

pub use reservoir::ReservoirState;
pub use rng::SplitMix64;

use crate::output::RowSink;
use crate::record::Record;
use anyhow::Result;
use sha2::{Digest, Sha256};
use std::fmt::Write as _;
use std::str::FromStr;

/// A record that passed the predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedRecord {
    pub id: String,
    pub text: String,
    /// Character count of `text`.
    pub length: usize,
}

impl MatchedRecord {
    /// Take the record's own id if it has one, otherwise derive one from the
    /// text so identical payloads always get identical ids.
    #[must_use]
    pub fn from_record(record: Record) -> Self {
        let id = record
            .explicit_id()
            .unwrap_or_else(|| derive_id(&record.text));
        let length = record.text.chars().count();
        Self {
            id,
            text: record.text,
            length,
        }
    }
}

/// First 128 bits of SHA-256 over the text, as lowercase hex.
#[must_use]
pub fn derive_id(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    digest[..16].iter().fold(String::with_capacity(32), |mut out, b| {
        let _ = write!(out, "{b:02x}");
        out
    })
}

/// Which records of the matched stream end up in the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionPolicy {
    Prefix { limit: usize },
    Exhaustive,
    Reservoir { capacity: usize },
}

impl SelectionPolicy {
    /// Build a policy from a mode name and the configured limit.
    ///
    /// # Errors
    ///
    /// Returns an error message for unknown modes.
    pub fn from_mode(mode: &str, limit: usize) -> Result<Self, String> {
        let kind: PolicyKind = mode.parse()?;
        Ok(match kind {
            PolicyKind::Prefix => Self::Prefix { limit },
            PolicyKind::Exhaustive => Self::Exhaustive,
            PolicyKind::Reservoir => Self::Reservoir { capacity: limit },
        })
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Prefix { .. } => "simple",
            Self::Exhaustive => "all",
            Self::Reservoir { .. } => "random",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PolicyKind {
    Prefix,
    Exhaustive,
    Reservoir,
}

impl FromStr for PolicyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "simple" | "prefix" => Ok(Self::Prefix),
            "all" | "exhaustive" => Ok(Self::Exhaustive),
            "random" | "reservoir" | "sample" => Ok(Self::Reservoir),
            other => Err(format!(
                "unknown mode {other:?} (expected simple, random, or all)"
            )),
        }
    }
}

/// Whether the run should keep reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// The policy has everything it will ever emit; stop fetching.
    Complete,
}

enum Engine {
    Prefix { limit: usize, emitted: usize },
    Exhaustive,
    Reservoir(ReservoirState<MatchedRecord>),
}

/// Running state of one policy.
pub struct Selector {
    engine: Engine,
    offered: u64,
    written: usize,
}

impl Selector {
    #[must_use]
    pub fn new(policy: SelectionPolicy) -> Self {
        let engine = match policy {
            SelectionPolicy::Prefix { limit } => Engine::Prefix { limit, emitted: 0 },
            SelectionPolicy::Exhaustive => Engine::Exhaustive,
            SelectionPolicy::Reservoir { capacity } => {
                Engine::Reservoir(ReservoirState::new(capacity))
            }
        };
        Self {
            engine,
            offered: 0,
            written: 0,
        }
    }

    /// Feed the next match in encounter order.
    ///
    /// # Errors
    ///
    /// Returns an error if the sink fails to write an emitted row.
    pub fn offer(
        &mut self,
        record: MatchedRecord,
        rng: &mut SplitMix64,
        sink: &mut dyn RowSink,
    ) -> Result<Flow> {
        if self.is_complete() {
            return Ok(Flow::Complete);
        }
        self.offered += 1;
        match &mut self.engine {
            Engine::Prefix { limit, emitted } => {
                sink.write(&record)?;
                *emitted += 1;
                self.written += 1;
                Ok(if *emitted >= *limit {
                    Flow::Complete
                } else {
                    Flow::Continue
                })
            }
            Engine::Exhaustive => {
                sink.write(&record)?;
                self.written += 1;
                Ok(Flow::Continue)
            }
            Engine::Reservoir(state) => {
                state.offer(record, rng);
                Ok(Flow::Continue)
            }
        }
    }

    /// Whether a prefix policy has reached its bound.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        matches!(self.engine, Engine::Prefix { limit, emitted } if emitted >= limit)
    }

    /// Matches offered so far.
    #[must_use]
    pub const fn offered(&self) -> u64 {
        self.offered
    }

    /// Rows already handed to the sink.
    #[must_use]
    pub const fn written(&self) -> usize {
        self.written
    }

    /// Records currently held back (reservoir only).
    #[must_use]
    pub fn held(&self) -> usize {
        match &self.engine {
            Engine::Reservoir(state) => state.items().len(),
            _ => 0,
        }
    }

    /// End of stream: write out anything held back. Returns the total rows
    /// written by this selector.
    ///
    /// # Errors
    ///
    /// Returns an error if the sink fails to write a held row.
    pub fn finish(self, sink: &mut dyn RowSink) -> Result<usize> {
        let mut written = self.written;
        if let Engine::Reservoir(state) = self.engine {
            for record in state.into_items() {
                sink.write(&record)?;
                written += 1;
            }
        }
        Ok(written)
    }
}
