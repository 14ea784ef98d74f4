//! Command-line and environment configuration.
//!
//! Every option can be given as a flag or as the environment variable the
//! picker has always read (`KEYWORD`, `MODE`, `LIMIT`, ...). A `.env` file in
//! the working directory is loaded first, so it fills in whatever the real
//! environment leaves unset. [`PickerArgs::validate`] turns the raw values
//! into runtime types and rejects bad combinations before anything is fetched.

use crate::io::cloud::helpers::RetryConfig;
use crate::matcher::{MatchMode, Matcher, MatcherError};
use crate::record::FieldFallback;
use crate::runner::{DEFAULT_CHUNK_SIZE, PartitionSource};
use crate::selection::SelectionPolicy;
use clap::Parser;
use clap::builder::BoolishValueParser;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_KEYWORD: &str = "ももクロ";
pub const DEFAULT_BUCKET: &str = "abeja-cc-ja";
pub const DEFAULT_KEY: &str = "common_crawl_0.jsonl";
pub const DEFAULT_REGION: &str = "ap-northeast-1";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Matcher(#[from] MatcherError),

    #[error("{0}")]
    UnknownMode(String),

    #[error("limit must be at least 1 in {mode} mode")]
    ZeroLimit { mode: &'static str },

    #[error("no keywords given")]
    NoKeywords,

    #[error("chunk size must be at least 1 byte")]
    ZeroChunk,

    #[error("retry budget must allow at least one attempt")]
    ZeroAttempts,

    #[error("--prefix needs a listable store; use --local-dir or name objects with --key")]
    PrefixWithoutListing,
}

/// Raw options as given on the command line or in the environment.
#[derive(Parser, Debug, Clone)]
#[command(name = "linesieve")]
#[command(about = "Pick keyword-matching records out of large JSONL corpora", long_about = None)]
pub struct PickerArgs {
    /// Keyword(s) to look for; comma-separated keywords are OR-ed
    #[arg(long, short = 'k', env = "KEYWORD", default_value = DEFAULT_KEYWORD)]
    pub keyword: String,

    /// Selection mode: simple (first N), random (uniform sample of N), all
    #[arg(long, short = 'm', env = "MODE", default_value = "simple")]
    pub mode: String,

    /// Rows to keep in simple and random modes
    #[arg(long, short = 'n', env = "LIMIT", default_value_t = 2000)]
    pub limit: usize,

    /// Minimum text length in characters (inclusive)
    #[arg(long = "min-len", env = "MINL", default_value_t = 100)]
    pub min_len: usize,

    /// Maximum text length in characters (inclusive)
    #[arg(long = "max-len", env = "MAXL", default_value_t = 2000)]
    pub max_len: usize,

    /// Seed for random mode
    #[arg(long, env = "SEED", default_value_t = 42)]
    pub seed: u64,

    /// Output CSV; appended to unless --overwrite is set
    #[arg(long, short = 'o', env = "OUTFILE", default_value = "output.csv")]
    pub outfile: PathBuf,

    /// Truncate the output file instead of appending
    #[arg(long, env = "OVERWRITE", action = clap::ArgAction::SetTrue, value_parser = BoolishValueParser::new())]
    pub overwrite: bool,

    /// Treat each keyword as a regular expression
    #[arg(long = "use-regex", env = "USE_REGEX", action = clap::ArgAction::SetTrue, value_parser = BoolishValueParser::new())]
    pub use_regex: bool,

    /// Only read text from the known text fields, never the first string field
    #[arg(long = "strict-fields", action = clap::ArgAction::SetTrue)]
    pub strict_fields: bool,

    /// Bytes per ranged fetch
    #[arg(long, env = "CHUNK", default_value_t = DEFAULT_CHUNK_SIZE)]
    pub chunk: u64,

    /// Remote bucket name
    #[arg(long, env = "BUCKET", default_value = DEFAULT_BUCKET)]
    pub bucket: String,

    /// Object key(s) to scan; may be repeated
    #[arg(long, env = "KEY", value_delimiter = ',')]
    pub key: Vec<String>,

    /// Scan every object under this prefix (listable stores only)
    #[arg(long, env = "PREFIX")]
    pub prefix: Option<String>,

    /// Bucket region, used to build the default endpoint
    #[arg(long, env = "REGION", default_value = DEFAULT_REGION)]
    pub region: String,

    /// Endpoint URL overriding the regional S3 one
    #[arg(long, env = "ENDPOINT")]
    pub endpoint: Option<String>,

    /// Read partitions from a local directory instead of a bucket
    #[arg(long = "local-dir", env = "LOCAL_DIR")]
    pub local_dir: Option<PathBuf>,

    /// Attempts per request, including the first
    #[arg(long, env = "RETRIES", default_value_t = 3)]
    pub retries: u32,

    /// Idle timeout in seconds: the longest wait to connect, for a response
    /// head, or for any single body read. Not a deadline on the whole chunk.
    #[arg(long, env = "TIMEOUT", default_value_t = 60)]
    pub timeout: u64,

    /// Write the run summary as JSON to this path
    #[arg(long = "summary-json")]
    pub summary_json: Option<PathBuf>,

    /// Verbose logging
    #[arg(long, env = "DEBUG", action = clap::ArgAction::SetTrue, value_parser = BoolishValueParser::new())]
    pub debug: bool,
}

/// Where partitions are read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    Local { root: PathBuf },
    Http { endpoint: String, timeout: Duration },
}

/// Validated runtime configuration.
#[derive(Debug, Clone)]
pub struct PickerConfig {
    pub matcher: Matcher,
    pub policy: SelectionPolicy,
    pub retry: RetryConfig,
    pub fallback: FieldFallback,
    pub seed: u64,
    pub chunk_size: u64,
    pub backend: Backend,
    pub bucket: String,
    pub source: PartitionSource,
    pub outfile: PathBuf,
    pub overwrite: bool,
    pub summary_json: Option<PathBuf>,
}

impl PickerArgs {
    /// Split the keyword option on commas, dropping blanks.
    #[must_use]
    pub fn keywords(&self) -> Vec<String> {
        self.keyword
            .split(',')
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(ToString::to_string)
            .collect()
    }

    /// Check the options and build the runtime configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for inverted length bounds, an unknown mode, a
    /// zero limit where one is needed, no keywords, an invalid pattern, a
    /// zero chunk size or retry budget, or a prefix without a listable store.
    pub fn validate(&self) -> Result<PickerConfig, ConfigError> {
        let policy =
            SelectionPolicy::from_mode(&self.mode, self.limit).map_err(ConfigError::UnknownMode)?;
        if self.limit == 0 && !matches!(policy, SelectionPolicy::Exhaustive) {
            return Err(ConfigError::ZeroLimit {
                mode: policy.name(),
            });
        }

        let keywords = self.keywords();
        if keywords.is_empty() {
            return Err(ConfigError::NoKeywords);
        }
        let mode = if self.use_regex {
            MatchMode::Pattern
        } else {
            MatchMode::Literal
        };
        let matcher = Matcher::new(self.min_len, self.max_len, &keywords, mode)?;

        if self.chunk == 0 {
            return Err(ConfigError::ZeroChunk);
        }
        if self.retries == 0 {
            return Err(ConfigError::ZeroAttempts);
        }

        let (backend, source) = match &self.local_dir {
            Some(root) => {
                let source = if self.key.is_empty() {
                    PartitionSource::Listing {
                        prefix: self.prefix.clone(),
                    }
                } else {
                    PartitionSource::Keys(self.key.clone())
                };
                (Backend::Local { root: root.clone() }, source)
            }
            None => {
                if self.prefix.is_some() {
                    return Err(ConfigError::PrefixWithoutListing);
                }
                let endpoint = self
                    .endpoint
                    .clone()
                    .unwrap_or_else(|| s3_endpoint(&self.bucket, &self.region));
                let keys = if self.key.is_empty() {
                    vec![DEFAULT_KEY.to_string()]
                } else {
                    self.key.clone()
                };
                (
                    Backend::Http {
                        endpoint,
                        timeout: Duration::from_secs(self.timeout.max(1)),
                    },
                    PartitionSource::Keys(keys),
                )
            }
        };

        Ok(PickerConfig {
            matcher,
            policy,
            retry: RetryConfig {
                max_attempts: self.retries,
                ..RetryConfig::default()
            },
            fallback: if self.strict_fields {
                FieldFallback::Strict
            } else {
                FieldFallback::FirstString
            },
            seed: self.seed,
            chunk_size: self.chunk,
            backend,
            bucket: self.bucket.clone(),
            source,
            outfile: self.outfile.clone(),
            overwrite: self.overwrite,
            summary_json: self.summary_json.clone(),
        })
    }
}

/// Virtual-hosted S3 endpoint for a bucket in a region.
#[must_use]
pub fn s3_endpoint(bucket: &str, region: &str) -> String {
    format!("https://{bucket}.s3.{region}.amazonaws.com")
}

/// Load `.env` from the working directory if there is one.
///
/// Returns the path that was loaded, or `None` when no file exists.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_dotenv() -> Result<Option<PathBuf>, dotenvy::Error> {
    match dotenvy::dotenv() {
        Ok(path) => Ok(Some(path)),
        Err(err) if err.not_found() => Ok(None),
        Err(err) => Err(err),
    }
}
