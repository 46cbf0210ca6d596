use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine as _;
use bytes::Bytes;

use crate::{BlockId, CommitOptions, UploadResult};

/// Block storage primitives the upload engine needs from a backend.
///
/// Authentication, request signing and plain single-shot object calls stay
/// with the backend client; the engine only stages blocks and commits them.
#[async_trait]
pub trait BlockStore: Send + Sync {
    /// Stage one block as uncommitted, returning the backend's content-md5 acknowledgement
    async fn create_block(
        &self,
        container: &str,
        blob_name: &str,
        block_id: &BlockId,
        content: Bytes,
        options: &BlockOptions,
    ) -> UploadResult<String>;

    /// Finalize the object from previously staged blocks, in the given order
    async fn commit_blocks(
        &self,
        container: &str,
        blob_name: &str,
        block_ids: &[BlockId],
        options: &CommitOptions,
    ) -> UploadResult<()>;
}

/// Per-block request options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockOptions {
    /// Base64 MD5 of the block content, sent as the integrity header
    pub content_md5: String,
}

impl BlockOptions {
    pub fn for_content(content: &[u8]) -> Self {
        Self {
            content_md5: content_md5(content),
        }
    }
}

/// Base64-encoded MD5 digest, the format block storage expects in `Content-MD5`
pub fn content_md5(data: &[u8]) -> String {
    let digest = md5::compute(data);
    B64.encode(digest.0)
}
