use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{BlockId, CommitOptions, UploadSessionId};

/// Receipt returned after a block blob has been committed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadReceipt {
    pub session_id: UploadSessionId,
    pub container: String,
    pub blob_name: String,
    /// Block ids in committed order
    pub block_ids: Vec<BlockId>,
    pub size_bytes: u64,
    pub content_type: Option<String>,
    pub metadata: BTreeMap<String, String>,
    pub committed_at: DateTime<Utc>,
}

impl UploadReceipt {
    /// Create a new receipt stamped with the current time
    pub fn new<C, B>(session_id: UploadSessionId, container: C, blob_name: B, block_ids: Vec<BlockId>, size_bytes: u64) -> Self
    where
        C: Into<String>,
        B: Into<String>,
    {
        Self {
            session_id,
            container: container.into(),
            blob_name: blob_name.into(),
            block_ids,
            size_bytes,
            content_type: None,
            metadata: BTreeMap::new(),
            committed_at: Utc::now(),
        }
    }

    /// Copy the object-level settings that went into the commit
    pub fn with_commit_options(mut self, options: &CommitOptions) -> Self {
        self.content_type = options.content_type.clone();
        self.metadata = options.metadata.clone();
        self
    }

    /// Number of blocks the object was committed from
    pub fn block_count(&self) -> usize {
        self.block_ids.len()
    }
}
