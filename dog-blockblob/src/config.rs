use std::collections::BTreeMap;
use std::time::Duration;

use crate::{BlockId, UploadError, UploadResult};

/// Largest number of blocks a single block blob may be committed from
pub const BACKEND_MAX_BLOCKS: u32 = 50_000;

/// Largest object the backend accepts (200 GiB)
pub const BACKEND_MAX_OBJECT_BYTES: u64 = 200 * 1024 * 1024 * 1024;

/// Largest payload the backend accepts for a single staged block (4000 MiB)
pub const BACKEND_MAX_BLOCK_BYTES: usize = 4000 * 1024 * 1024;

/// Default block size (1 MiB)
pub const DEFAULT_BLOCK_SIZE: usize = 1 << 20;

/// Configuration for chunked block blob uploads
#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Maximum payload size of a single block
    pub block_size: usize,

    /// Number of concurrent upload workers (and the depth of the chunk queue)
    pub pool_size: usize,

    /// Timeout applied to each individual block upload attempt
    pub timeout: Duration,

    /// Retries after the first attempt before a block is given up on
    pub max_retries: u32,

    /// Upper bound on blocks per object
    pub max_blocks: u32,

    /// Upper bound on object size, checked when the input length is known up front
    pub max_object_bytes: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            pool_size: 10,
            timeout: Duration::from_secs(30),
            max_retries: 5,
            max_blocks: BACKEND_MAX_BLOCKS,
            max_object_bytes: BACKEND_MAX_OBJECT_BYTES,
        }
    }
}

impl UploadConfig {
    /// Create a new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a config from `DOG_BLOCKBLOB_*` environment variables over the defaults
    pub fn from_env() -> UploadResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> UploadResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = parse_var(&lookup, "DOG_BLOCKBLOB_BLOCK_SIZE")? {
            config.block_size = value;
        }
        if let Some(value) = parse_var(&lookup, "DOG_BLOCKBLOB_POOL_SIZE")? {
            config.pool_size = value;
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "DOG_BLOCKBLOB_TIMEOUT_SECS")? {
            config.timeout = Duration::from_secs(secs);
        }
        if let Some(value) = parse_var(&lookup, "DOG_BLOCKBLOB_MAX_RETRIES")? {
            config.max_retries = value;
        }

        config.validate()?;
        Ok(config)
    }

    /// Set block size
    pub fn with_block_size(mut self, bytes: usize) -> Self {
        self.block_size = bytes;
        self
    }

    /// Set worker pool size
    pub fn with_pool_size(mut self, workers: usize) -> Self {
        self.pool_size = workers;
        self
    }

    /// Set per-attempt timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set retry budget per block
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set max blocks per object
    pub fn with_max_blocks(mut self, max: u32) -> Self {
        self.max_blocks = max;
        self
    }

    /// Set max object size
    pub fn with_max_object_bytes(mut self, bytes: u64) -> Self {
        self.max_object_bytes = bytes;
        self
    }

    /// Total attempts a block gets, the first one included
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Reject settings the engine cannot honour
    pub fn validate(&self) -> UploadResult<()> {
        check_block_size(self.block_size)?;
        if self.pool_size == 0 {
            return Err(UploadError::invalid("pool_size must be greater than zero"));
        }
        if self.timeout.is_zero() {
            return Err(UploadError::invalid("timeout must be greater than zero"));
        }
        if self.max_blocks == 0 || self.max_blocks > BACKEND_MAX_BLOCKS.min(BlockId::MAX_SEQUENCE) {
            return Err(UploadError::invalid(format!(
                "max_blocks must be 1-{}",
                BACKEND_MAX_BLOCKS.min(BlockId::MAX_SEQUENCE)
            )));
        }
        if self.max_object_bytes > BACKEND_MAX_OBJECT_BYTES {
            return Err(UploadError::invalid(format!(
                "max_object_bytes {} exceeds backend limit {}",
                self.max_object_bytes, BACKEND_MAX_OBJECT_BYTES
            )));
        }
        Ok(())
    }

    /// Apply per-call overrides on top of this config
    pub fn merged_with(&self, options: &UploadOptions) -> Self {
        let mut config = self.clone();
        if let Some(block_size) = options.block_size {
            config.block_size = block_size;
        }
        if let Some(pool_size) = options.pool_size {
            config.pool_size = pool_size;
        }
        if let Some(timeout) = options.timeout {
            config.timeout = timeout;
        }
        if let Some(max_retries) = options.max_retries {
            config.max_retries = max_retries;
        }
        config
    }
}

/// Block sizes must be non-zero and within what one staged block may carry
pub(crate) fn check_block_size(block_size: usize) -> UploadResult<()> {
    if block_size == 0 {
        return Err(UploadError::invalid("block_size must be greater than zero"));
    }
    if block_size > BACKEND_MAX_BLOCK_BYTES {
        return Err(UploadError::invalid(format!(
            "block_size {block_size} exceeds backend limit {BACKEND_MAX_BLOCK_BYTES}"
        )));
    }
    Ok(())
}

fn parse_var<T, F>(lookup: &F, key: &str) -> UploadResult<Option<T>>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| UploadError::invalid(format!("{key} has invalid value {raw:?}"))),
    }
}

/// Per-call options for `upload_object`
#[derive(Debug, Clone, Default)]
pub struct UploadOptions {
    pub block_size: Option<usize>,
    pub pool_size: Option<usize>,
    pub timeout: Option<Duration>,
    pub max_retries: Option<u32>,
    pub commit: CommitOptions,
}

impl UploadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_block_size(mut self, bytes: usize) -> Self {
        self.block_size = Some(bytes);
        self
    }

    pub fn with_pool_size(mut self, workers: usize) -> Self {
        self.pool_size = Some(workers);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = Some(retries);
        self
    }

    pub fn with_content_type<S: Into<String>>(mut self, content_type: S) -> Self {
        self.commit.content_type = Some(content_type.into());
        self
    }

    pub fn with_metadata<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.commit.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_commit_options(mut self, commit: CommitOptions) -> Self {
        self.commit = commit;
        self
    }
}

/// Object-level settings forwarded to the commit call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitOptions {
    pub content_type: Option<String>,
    pub content_encoding: Option<String>,
    pub cache_control: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

impl CommitOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_content_type<S: Into<String>>(mut self, content_type: S) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_content_encoding<S: Into<String>>(mut self, encoding: S) -> Self {
        self.content_encoding = Some(encoding.into());
        self
    }

    pub fn with_cache_control<S: Into<String>>(mut self, cache_control: S) -> Self {
        self.cache_control = Some(cache_control.into());
        self
    }

    pub fn with_metadata<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}
