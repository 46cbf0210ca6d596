use std::collections::BTreeMap;
use std::sync::Arc;

use futures_util::StreamExt;
use tracing::{debug, error, info, warn};

use crate::pool::{BlockOutcome, WorkerPool};
use crate::{BlockList, BlockUploader, ChunkSource, PendingUpload, UploadConfig, UploadError, UploadResult};

/// Feeds a chunk source through a worker pool and collects the staged blocks.
///
/// Results come back in completion order, not upload order. Only this
/// coordinator touches the block list; workers hand their results over a
/// channel.
pub struct UploadCoordinator {
    uploader: Arc<BlockUploader>,
    pool_size: usize,
    max_blocks: u32,
}

impl UploadCoordinator {
    pub fn new(uploader: Arc<BlockUploader>, config: &UploadConfig) -> Self {
        Self {
            uploader,
            pool_size: config.pool_size,
            max_blocks: config.max_blocks,
        }
    }

    /// Upload every chunk of `source` and return the blocks that made it.
    ///
    /// Lost blocks are left out of the list rather than failing the call.
    /// An empty list is reported as [`UploadError::EmptyBlockList`]. The
    /// worker pool is shut down before this returns, on success and on error.
    pub async fn upload_all(&self, source: ChunkSource) -> UploadResult<BlockList> {
        if self.pool_size == 0 {
            return Err(UploadError::invalid("pool_size must be greater than zero"));
        }

        let mut pool = WorkerPool::spawn(self.pool_size, self.uploader.clone());
        let mut pending: BTreeMap<u32, PendingUpload> = BTreeMap::new();
        let mut blocks = BlockList::new();
        let mut emitted = 0;

        let mut chunks = source.into_stream();
        while let Some(chunk) = chunks.next().await {
            let chunk = chunk?;
            if chunk.sequence > self.max_blocks {
                error!(max_blocks = self.max_blocks, "Input needs more blocks than allowed, aborting");
                return Err(UploadError::TooManyBlocks { max: self.max_blocks });
            }

            emitted = chunk.sequence;
            pending.insert(chunk.sequence, PendingUpload::Dispatched);
            pool.submit(chunk).await?;

            for outcome in pool.completed() {
                record(&mut pending, &mut blocks, outcome);
            }
        }

        debug!(emitted, in_flight = in_flight(&pending), "Source exhausted, draining workers");
        for outcome in pool.drain().await {
            record(&mut pending, &mut blocks, outcome);
        }
        blocks.seal(emitted);

        let mut lost = 0;
        for (sequence, state) in pending.iter_mut() {
            if !state.is_resolved() {
                *state = PendingUpload::Failed("worker stopped before reporting".to_string());
                warn!(sequence, "Block never reported back");
            }
            if matches!(state, PendingUpload::Failed(_)) {
                lost += 1;
            }
        }

        if blocks.is_empty() {
            error!(emitted, lost, "Empty block list");
            return Err(UploadError::EmptyBlockList);
        }

        info!(blocks = blocks.len(), lost, emitted, "Done uploading blocks");
        Ok(blocks)
    }
}

fn in_flight(pending: &BTreeMap<u32, PendingUpload>) -> usize {
    pending.values().filter(|state| !state.is_resolved()).count()
}

fn record(pending: &mut BTreeMap<u32, PendingUpload>, blocks: &mut BlockList, outcome: BlockOutcome) {
    let state = match outcome.result {
        Ok(block) => {
            blocks.push(&block);
            PendingUpload::Completed(block.block_id)
        }
        Err(e) => PendingUpload::Failed(e.to_string()),
    };
    pending.insert(outcome.sequence, state);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BlockId, BlockOptions, BlockStore, CommitOptions, MemoryBlockStore};
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::time::Duration;

    /// Stages blocks with a delay that shrinks as the block id grows
    struct ReversingStore {
        inner: MemoryBlockStore,
        lose: Option<u32>,
    }

    #[async_trait]
    impl BlockStore for ReversingStore {
        async fn create_block(
            &self,
            container: &str,
            blob_name: &str,
            block_id: &BlockId,
            content: Bytes,
            options: &BlockOptions,
        ) -> UploadResult<String> {
            let sequence = block_id.sequence().unwrap_or_default();
            if Some(sequence) == self.lose {
                return Err(UploadError::backend(std::io::Error::other("connection reset")));
            }
            tokio::time::sleep(Duration::from_millis(100 - sequence as u64)).await;
            self.inner.create_block(container, blob_name, block_id, content, options).await
        }

        async fn commit_blocks(
            &self,
            container: &str,
            blob_name: &str,
            block_ids: &[BlockId],
            options: &CommitOptions,
        ) -> UploadResult<()> {
            self.inner.commit_blocks(container, blob_name, block_ids, options).await
        }
    }

    fn coordinator(store: Arc<ReversingStore>, pool_size: usize) -> UploadCoordinator {
        let config = UploadConfig::default().with_pool_size(pool_size);
        let uploader = BlockUploader::new(store, "c", "b", &config);
        UploadCoordinator::new(Arc::new(uploader), &config)
    }

    #[tokio::test(start_paused = true)]
    async fn collects_every_block_in_completion_order() {
        let store = Arc::new(ReversingStore { inner: MemoryBlockStore::new(), lose: None });
        let source = ChunkSource::from_bytes(vec![1u8; 40], 10).unwrap();

        let blocks = coordinator(store, 4).upload_all(source).await.unwrap();

        assert_eq!(blocks.emitted(), 4);
        let order: Vec<u32> = blocks.entries().iter().map(|e| e.sequence).collect();
        assert_eq!(order, vec![4, 3, 2, 1]);
    }

    #[tokio::test(start_paused = true)]
    async fn lost_blocks_are_left_out() {
        let store = Arc::new(ReversingStore { inner: MemoryBlockStore::new(), lose: Some(2) });
        let source = ChunkSource::from_bytes(vec![1u8; 30], 10).unwrap();

        let blocks = coordinator(store, 2).upload_all(source).await.unwrap();

        assert_eq!(blocks.emitted(), 3);
        assert_eq!(blocks.len(), 2);
        assert!(blocks.entries().iter().all(|e| e.sequence != 2));
    }

    #[tokio::test(start_paused = true)]
    async fn empty_source_reports_empty_block_list() {
        let store = Arc::new(ReversingStore { inner: MemoryBlockStore::new(), lose: None });
        let source = ChunkSource::from_bytes(Bytes::new(), 10).unwrap();

        let result = coordinator(store, 2).upload_all(source).await;
        assert!(matches!(result, Err(UploadError::EmptyBlockList)));
    }

    #[tokio::test(start_paused = true)]
    async fn too_many_blocks_aborts_dispatch() {
        let store = Arc::new(ReversingStore { inner: MemoryBlockStore::new(), lose: None });
        let config = UploadConfig::default().with_pool_size(1).with_max_blocks(3);
        let uploader = BlockUploader::new(store, "c", "b", &config);
        let source = ChunkSource::from_bytes(vec![0u8; 50], 10).unwrap();

        let result = UploadCoordinator::new(Arc::new(uploader), &config).upload_all(source).await;
        assert!(matches!(result, Err(UploadError::TooManyBlocks { max: 3 })));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_workers_is_rejected_before_dispatch() {
        let store = Arc::new(ReversingStore { inner: MemoryBlockStore::new(), lose: None });
        let source = ChunkSource::from_bytes(vec![1u8; 10], 4).unwrap();

        let result = coordinator(store.clone(), 0).upload_all(source).await;

        match result {
            Err(UploadError::Invalid { message }) => assert!(message.contains("pool_size")),
            other => panic!("expected invalid pool size, got {other:?}"),
        }
        assert!(store.inner.uncommitted_blocks("c", "b").is_empty());
    }
}
