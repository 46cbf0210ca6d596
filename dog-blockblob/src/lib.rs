//! # dog-blockblob: Chunked block blob uploads
//!
//! `dog-blockblob` uploads large objects to block storage by splitting them
//! into fixed-size blocks, staging the blocks in parallel through a bounded
//! worker pool, and committing them as one object in upload order.
//!
//! ## Key Features
//!
//! - **Bounded concurrency**: a fixed pool of workers fed from a queue of the same size
//! - **Per-block retries**: each block is retried on its own with a fresh timeout per attempt
//! - **Integrity headers**: every block carries a base64 MD5 of its content
//! - **Ordered commits**: blocks finish in any order but are always committed in sequence
//! - **All or nothing**: a block list with lost blocks is never committed
//! - **Backend agnostic**: anything implementing [`BlockStore`] can be uploaded to
//!
//! ## Quick Start
//!
//! ```rust
//! use dog_blockblob::prelude::*;
//!
//! # #[tokio::main]
//! # async fn main() -> UploadResult<()> {
//! let uploader = BlockBlobUploader::new(MemoryBlockStore::new(), UploadConfig::default());
//!
//! let options = UploadOptions::new()
//!     .with_block_size(4)
//!     .with_content_type("text/plain");
//!
//! let receipt = uploader
//!     .upload_object("media", "hello.txt", b"Hello, world!".to_vec(), options)
//!     .await?;
//!
//! assert_eq!(receipt.block_count(), 4);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ChunkSource ──▶ UploadCoordinator ──▶ WorkerPool ──▶ BlockUploader ──▶ BlockStore::create_block
//!                        │
//!                        └──▶ commit (sorted) ──▶ BlockStore::commit_blocks
//! ```

pub mod adapter;
mod commit;
mod config;
mod coordinator;
mod error;
mod memory_store;
mod pool;
mod receipt;
mod session;
mod source;
pub mod store;
mod types;
mod uploader;

// Re-export main types for clean API
pub use adapter::BlockBlobUploader;
pub use commit::{commit_block_list, ordered_block_ids};
pub use config::{
    CommitOptions, UploadConfig, UploadOptions, BACKEND_MAX_BLOCKS, BACKEND_MAX_BLOCK_BYTES, BACKEND_MAX_OBJECT_BYTES,
    DEFAULT_BLOCK_SIZE,
};
pub use coordinator::UploadCoordinator;
pub use error::{UploadError, UploadResult};
pub use memory_store::{CommittedObject, MemoryBlockStore, MemoryStoreError};
pub use receipt::UploadReceipt;
pub use session::UploadSession;
pub use source::{ChunkSource, ChunkStream, UploadInput};
pub use store::{content_md5, BlockOptions, BlockStore};
pub use types::{
    BlockId, BlockList, BlockListEntry, BlockStatus, Chunk, PendingUpload, UploadSessionId,
    UploadedBlock,
};
pub use uploader::BlockUploader;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        BlockBlobUploader, BlockStore, CommitOptions, MemoryBlockStore, UploadConfig, UploadError,
        UploadInput, UploadOptions, UploadReceipt, UploadResult,
    };
}
