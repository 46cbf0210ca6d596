use std::time::Duration;
use thiserror::Error;

use crate::BlockId;

/// Result type for block blob uploads
pub type UploadResult<T> = Result<T, UploadError>;

/// Errors that can occur while uploading a block blob
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Invalid request: {message}")]
    Invalid { message: String },

    #[error("Storage backend error: {source}")]
    Backend {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Upload of block {block_id} timed out after {after:?}")]
    Timeout { block_id: BlockId, after: Duration },

    #[error("Block {block_id} lost after {attempts} attempts: {reason}")]
    BlockLost {
        block_id: BlockId,
        attempts: u32,
        reason: String,
    },

    #[error("Input needs more than {max} blocks")]
    TooManyBlocks { max: u32 },

    #[error("Block list is empty, nothing to commit")]
    EmptyBlockList,

    #[error("Block list is incomplete: {committed} of {expected} blocks uploaded (missing {missing:?})")]
    IncompleteBlockList {
        expected: u32,
        committed: u32,
        missing: Vec<u32>,
    },

    #[error("Block list contains sequence {sequence} more than once")]
    DuplicateBlock { sequence: u32 },

    #[error("Commit failed: {source}")]
    Commit {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Worker pool closed before all chunks were dispatched")]
    PoolClosed,

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

impl UploadError {
    /// Create a backend error from any error type
    pub fn backend<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Backend {
            source: Box::new(error),
        }
    }

    /// Create an invalid request error
    pub fn invalid<S: Into<String>>(message: S) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    /// Wrap a failed commit call
    pub fn commit(error: UploadError) -> Self {
        match error {
            Self::Backend { source } => Self::Commit { source },
            other => Self::Commit {
                source: Box::new(other),
            },
        }
    }
}
