use bytes::Bytes;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A contiguous piece of the input, numbered from 1 in read order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub sequence: u32,
    pub payload: Bytes,
}

impl Chunk {
    pub fn new(sequence: u32, payload: Bytes) -> Self {
        Self { sequence, payload }
    }

    /// Identifier this chunk is staged under, `None` past [`BlockId::MAX_SEQUENCE`]
    pub fn block_id(&self) -> Option<BlockId> {
        BlockId::from_sequence(self.sequence)
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// Fixed-width block identifier.
///
/// Identifiers are the zero-padded decimal sequence number, so sorting them
/// as strings gives the same order as sorting the sequence numbers.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BlockId(String);

impl BlockId {
    /// Digits in every block identifier
    pub const WIDTH: usize = 5;

    /// Largest sequence number that fits in `WIDTH` digits
    pub const MAX_SEQUENCE: u32 = 99_999;

    /// Identifier for `sequence`, or `None` when it needs more than `WIDTH` digits
    pub fn from_sequence(sequence: u32) -> Option<Self> {
        (sequence <= Self::MAX_SEQUENCE).then(|| Self(format!("{:0width$}", sequence, width = Self::WIDTH)))
    }

    /// Recover the sequence number this identifier was built from
    pub fn sequence(&self) -> Option<u32> {
        if self.0.len() != Self::WIDTH {
            return None;
        }
        self.0.parse().ok()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// State of a block on the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockStatus {
    /// Staged but not yet part of any committed object
    Uncommitted,
    /// Part of the committed object
    Committed,
}

/// Acknowledgement for a block that was staged successfully
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedBlock {
    pub sequence: u32,
    pub block_id: BlockId,
    pub status: BlockStatus,
    pub size_bytes: u64,
    pub content_md5: String,
    pub attempts: u32,
}

/// Tracking state of one dispatched chunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingUpload {
    Dispatched,
    Completed(BlockId),
    Failed(String),
}

impl PendingUpload {
    pub fn is_resolved(&self) -> bool {
        !matches!(self, Self::Dispatched)
    }
}

/// One completed block in a block list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockListEntry {
    pub sequence: u32,
    pub block_id: BlockId,
    pub size_bytes: u64,
}

/// Completed blocks in the order the workers finished them
#[derive(Debug, Clone, Default)]
pub struct BlockList {
    entries: Vec<BlockListEntry>,
    emitted: u32,
}

impl BlockList {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, block: &UploadedBlock) {
        self.entries.push(BlockListEntry {
            sequence: block.sequence,
            block_id: block.block_id.clone(),
            size_bytes: block.size_bytes,
        });
    }

    /// Record how many chunks the source produced in total
    pub(crate) fn seal(&mut self, emitted: u32) {
        self.emitted = emitted;
    }

    pub fn entries(&self) -> &[BlockListEntry] {
        &self.entries
    }

    /// Number of chunks the source emitted for this upload
    pub fn emitted(&self) -> u32 {
        self.emitted
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_bytes(&self) -> u64 {
        self.entries.iter().map(|e| e.size_bytes).sum()
    }
}

/// Unique identifier for one `upload_object` call
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UploadSessionId(pub String);

impl UploadSessionId {
    pub fn new() -> Self {
        Self(format!("ses_{}", Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for UploadSessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for UploadSessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
