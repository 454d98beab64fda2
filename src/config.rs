//! Configuration for streaming reads.
//!
//! This module provides the fine-grained options a read channel consumes:
//! the access-pattern hint, the in-place seek window, ranged-request sizing,
//! per-RPC deadlines, checksum enforcement, and retry/backoff tuning.

use std::time::Duration;

use clap::Parser;

use crate::backoff::BackoffFactory;

/// Access-pattern hint, borrowed from POSIX `fadvise` terminology.
///
/// Controls how large a range each streaming request asks for, and whether
/// the channel adapts when it observes non-sequential access.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Fadvise {
    /// Whole-object streaming: new requests run to end of object.
    ///
    /// Best when the caller reads front to back and wants one long-lived
    /// stream instead of many ranged requests.
    Sequential,

    /// Bounded ranged requests sized to the caller's buffer (floored at the
    /// configured minimum).
    ///
    /// Best for scattered access where streaming to end of object would
    /// waste bandwidth on bytes the caller will seek past.
    Random,

    /// Sequential until a non-trivial seek is observed, then random for the
    /// rest of the channel's lifetime.
    #[default]
    Auto,
}

impl std::str::FromStr for Fadvise {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sequential" | "seq" => Ok(Fadvise::Sequential),
            "random" | "rand" => Ok(Fadvise::Random),
            "auto" | "adaptive" => Ok(Fadvise::Auto),
            _ => Err(format!(
                "Unknown fadvise value: {}. Use 'sequential', 'random', or 'auto'.",
                s
            )),
        }
    }
}

impl std::fmt::Display for Fadvise {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Fadvise::Sequential => write!(f, "sequential"),
            Fadvise::Random => write!(f, "random"),
            Fadvise::Auto => write!(f, "auto"),
        }
    }
}

/// Options consumed by the read channel.
#[derive(Parser, Debug, Clone)]
#[command(name = "blobstore-read")]
#[command(about = "Streaming read options for the blobstore read channel")]
pub struct ReadOptions {
    // === Access pattern ===
    /// Access-pattern hint: sequential, random, or auto
    #[arg(long, env = "BLOBSTORE_READ_FADVISE", default_value = "auto")]
    pub fadvise: String,

    /// Maximum forward seek distance absorbed by discarding bytes from the
    /// open stream instead of reissuing a request
    #[arg(
        long,
        env = "BLOBSTORE_READ_INPLACE_SEEK_LIMIT",
        default_value = "8388608"
    )]
    pub inplace_seek_limit: u64,

    /// Floor for the read limit of ranged requests in random mode
    #[arg(
        long,
        env = "BLOBSTORE_READ_MIN_RANGE_REQUEST_SIZE",
        default_value = "2097152"
    )]
    pub min_range_request_size: u64,

    // === Deadlines ===
    /// Deadline for the stream open and each message receive, in
    /// milliseconds
    #[arg(long, env = "BLOBSTORE_READ_TIMEOUT_MILLIS", default_value = "60000")]
    pub read_timeout_millis: u64,

    /// Deadline for the metadata fetch at open, in milliseconds
    #[arg(
        long,
        env = "BLOBSTORE_READ_METADATA_TIMEOUT_MILLIS",
        default_value = "30000"
    )]
    pub metadata_timeout_millis: u64,

    // === Integrity ===
    /// Validate per-chunk CRC32-C when the server provides it
    #[arg(long, env = "BLOBSTORE_READ_CHECKSUMS_ENABLED", default_value = "true")]
    pub checksums_enabled: bool,

    // === Retries ===
    /// Initial retry delay in milliseconds
    #[arg(
        long,
        env = "BLOBSTORE_READ_RETRY_INITIAL_DELAY_MILLIS",
        default_value = "200"
    )]
    pub retry_initial_delay_millis: u64,

    /// Maximum retry delay in milliseconds
    #[arg(
        long,
        env = "BLOBSTORE_READ_RETRY_MAX_DELAY_MILLIS",
        default_value = "10000"
    )]
    pub retry_max_delay_millis: u64,

    /// Multiplier applied to the retry delay after each attempt
    #[arg(long, env = "BLOBSTORE_READ_RETRY_MULTIPLIER", default_value = "2.0")]
    pub retry_multiplier: f64,

    /// Maximum retry attempts per RPC-issuing step
    #[arg(long, env = "BLOBSTORE_READ_MAX_RETRY_ATTEMPTS", default_value = "5")]
    pub max_retry_attempts: usize,
}

impl ReadOptions {
    /// Create a new ReadOptions builder.
    pub fn builder() -> ReadOptionsBuilder {
        ReadOptionsBuilder::default()
    }

    /// Get the parsed access-pattern hint.
    pub fn fadvise(&self) -> Fadvise {
        self.fadvise.parse().unwrap_or_default()
    }

    /// Deadline applied to the stream open and each message receive.
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_millis)
    }

    /// Deadline applied to the metadata fetch at open.
    pub fn metadata_timeout(&self) -> Duration {
        Duration::from_millis(self.metadata_timeout_millis)
    }

    /// Backoff factory configured from the retry knobs.
    pub fn backoff_factory(&self) -> BackoffFactory {
        BackoffFactory::new(
            Duration::from_millis(self.retry_initial_delay_millis),
            Duration::from_millis(self.retry_max_delay_millis),
            self.retry_multiplier,
            self.max_retry_attempts,
        )
    }

    /// Validate that the options are consistent.
    pub fn validate(&self) -> Result<(), OptionsError> {
        self.fadvise
            .parse::<Fadvise>()
            .map_err(|_| OptionsError::UnknownFadvise {
                value: self.fadvise.clone(),
            })?;

        if self.min_range_request_size == 0 {
            return Err(OptionsError::ZeroMinRangeRequest);
        }

        if self.retry_multiplier < 1.0 {
            return Err(OptionsError::MultiplierTooSmall {
                value: self.retry_multiplier,
            });
        }

        Ok(())
    }
}

/// Configuration validation failures.
#[derive(Debug, thiserror::Error)]
pub enum OptionsError {
    #[error("unknown fadvise value '{value}': use 'sequential', 'random', or 'auto'")]
    UnknownFadvise { value: String },

    #[error("min_range_request_size must be positive")]
    ZeroMinRangeRequest,

    #[error("retry_multiplier must be at least 1.0, got {value}")]
    MultiplierTooSmall { value: f64 },
}

/// Builder for ReadOptions.
#[derive(Default)]
pub struct ReadOptionsBuilder {
    fadvise: Option<Fadvise>,
    inplace_seek_limit: Option<u64>,
    min_range_request_size: Option<u64>,
    read_timeout_millis: Option<u64>,
    metadata_timeout_millis: Option<u64>,
    checksums_enabled: Option<bool>,
    retry_initial_delay_millis: Option<u64>,
    retry_max_delay_millis: Option<u64>,
    retry_multiplier: Option<f64>,
    max_retry_attempts: Option<usize>,
}

impl ReadOptionsBuilder {
    pub fn fadvise(mut self, fadvise: Fadvise) -> Self {
        self.fadvise = Some(fadvise);
        self
    }

    pub fn inplace_seek_limit(mut self, bytes: u64) -> Self {
        self.inplace_seek_limit = Some(bytes);
        self
    }

    pub fn min_range_request_size(mut self, bytes: u64) -> Self {
        self.min_range_request_size = Some(bytes);
        self
    }

    pub fn read_timeout_millis(mut self, millis: u64) -> Self {
        self.read_timeout_millis = Some(millis);
        self
    }

    pub fn metadata_timeout_millis(mut self, millis: u64) -> Self {
        self.metadata_timeout_millis = Some(millis);
        self
    }

    pub fn checksums_enabled(mut self, enabled: bool) -> Self {
        self.checksums_enabled = Some(enabled);
        self
    }

    pub fn retry_initial_delay_millis(mut self, millis: u64) -> Self {
        self.retry_initial_delay_millis = Some(millis);
        self
    }

    pub fn retry_max_delay_millis(mut self, millis: u64) -> Self {
        self.retry_max_delay_millis = Some(millis);
        self
    }

    pub fn retry_multiplier(mut self, multiplier: f64) -> Self {
        self.retry_multiplier = Some(multiplier);
        self
    }

    pub fn max_retry_attempts(mut self, attempts: usize) -> Self {
        self.max_retry_attempts = Some(attempts);
        self
    }

    pub fn build(self) -> Result<ReadOptions, OptionsError> {
        let options = ReadOptions {
            fadvise: self.fadvise.unwrap_or_default().to_string(),
            inplace_seek_limit: self.inplace_seek_limit.unwrap_or(8388608),
            min_range_request_size: self.min_range_request_size.unwrap_or(2097152),
            read_timeout_millis: self.read_timeout_millis.unwrap_or(60000),
            metadata_timeout_millis: self.metadata_timeout_millis.unwrap_or(30000),
            checksums_enabled: self.checksums_enabled.unwrap_or(true),
            retry_initial_delay_millis: self.retry_initial_delay_millis.unwrap_or(200),
            retry_max_delay_millis: self.retry_max_delay_millis.unwrap_or(10000),
            retry_multiplier: self.retry_multiplier.unwrap_or(2.0),
            max_retry_attempts: self.max_retry_attempts.unwrap_or(5),
        };

        options.validate()?;

        Ok(options)
    }
}
