use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, error};

use crate::{
    BlockId, BlockOptions, BlockStatus, BlockStore, Chunk, UploadConfig, UploadError, UploadResult,
    UploadedBlock,
};

/// Uploads single blocks of one blob, retrying each block on its own.
///
/// Every attempt runs under a fresh timeout. A timeout counts as a failed
/// attempt just like a backend error. Once `max_retries` retries have failed
/// the block is reported lost; the caller decides what a lost block means for
/// the object.
pub struct BlockUploader {
    store: Arc<dyn BlockStore>,
    container: String,
    blob_name: String,
    timeout: Duration,
    max_retries: u32,
}

impl BlockUploader {
    pub fn new<C, B>(store: Arc<dyn BlockStore>, container: C, blob_name: B, config: &UploadConfig) -> Self
    where
        C: Into<String>,
        B: Into<String>,
    {
        Self {
            store,
            container: container.into(),
            blob_name: blob_name.into(),
            timeout: config.timeout,
            max_retries: config.max_retries,
        }
    }

    /// Stage `chunk` as an uncommitted block
    pub async fn upload(&self, chunk: Chunk) -> UploadResult<UploadedBlock> {
        let block_id = chunk.block_id().ok_or_else(|| {
            UploadError::invalid(format!(
                "sequence {} exceeds the largest block id {}",
                chunk.sequence,
                BlockId::MAX_SEQUENCE
            ))
        })?;
        let options = BlockOptions::for_content(&chunk.payload);
        let mut retries = 0;

        loop {
            match self.attempt(&block_id, chunk.payload.clone(), &options).await {
                Ok(ack) => {
                    debug!(block_id = %block_id, content_md5 = %ack, "Done uploading block");
                    return Ok(UploadedBlock {
                        sequence: chunk.sequence,
                        block_id,
                        status: BlockStatus::Uncommitted,
                        size_bytes: chunk.len() as u64,
                        content_md5: ack,
                        attempts: retries + 1,
                    });
                }
                Err(e) => {
                    debug!(block_id = %block_id, error = %e, "Failed to upload block");

                    if retries < self.max_retries {
                        retries += 1;
                        debug!(block_id = %block_id, retry = retries, "Retrying block upload");
                        continue;
                    }

                    error!(
                        block_id = %block_id,
                        retries,
                        error = %e,
                        "Complete failure to upload block"
                    );
                    return Err(UploadError::BlockLost {
                        block_id,
                        attempts: retries + 1,
                        reason: e.to_string(),
                    });
                }
            }
        }
    }

    async fn attempt(
        &self,
        block_id: &BlockId,
        content: Bytes,
        options: &BlockOptions,
    ) -> UploadResult<String> {
        debug!(block_id = %block_id, bytes = content.len(), "Uploading block");

        let call = self
            .store
            .create_block(&self.container, &self.blob_name, block_id, content, options);

        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(UploadError::Timeout {
                block_id: block_id.clone(),
                after: self.timeout,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CommitOptions, MemoryBlockStore};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tracing_test::traced_test;

    /// Fails the first `failures` calls, then delegates to a memory store
    struct FlakyStore {
        inner: MemoryBlockStore,
        failures: u32,
        calls: AtomicU32,
        stall: bool,
    }

    impl FlakyStore {
        fn failing(failures: u32) -> Self {
            Self {
                inner: MemoryBlockStore::new(),
                failures,
                calls: AtomicU32::new(0),
                stall: false,
            }
        }

        fn stalling(failures: u32) -> Self {
            Self {
                stall: true,
                ..Self::failing(failures)
            }
        }
    }

    #[async_trait]
    impl BlockStore for FlakyStore {
        async fn create_block(
            &self,
            container: &str,
            blob_name: &str,
            block_id: &BlockId,
            content: Bytes,
            options: &BlockOptions,
        ) -> UploadResult<String> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                if self.stall {
                    std::future::pending::<()>().await;
                }
                return Err(UploadError::backend(std::io::Error::other("503 server busy")));
            }
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

    fn uploader(store: Arc<FlakyStore>, config: &UploadConfig) -> BlockUploader {
        BlockUploader::new(store, "media", "video.mp4", config)
    }

    fn chunk(sequence: u32) -> Chunk {
        Chunk::new(sequence, Bytes::from(vec![sequence as u8; 64]))
    }

    #[tokio::test]
    async fn first_attempt_success() {
        let store = Arc::new(FlakyStore::failing(0));
        let block = uploader(store.clone(), &UploadConfig::default())
            .upload(chunk(3))
            .await
            .unwrap();

        assert_eq!(block.block_id.as_str(), "00003");
        assert_eq!(block.status, BlockStatus::Uncommitted);
        assert_eq!(block.attempts, 1);
        assert_eq!(block.size_bytes, 64);
        assert_eq!(block.content_md5, crate::store::content_md5(&[3u8; 64]));
    }

    #[tokio::test]
    async fn retries_until_success_without_duplicates() {
        let store = Arc::new(FlakyStore::failing(3));
        let block = uploader(store.clone(), &UploadConfig::default())
            .upload(chunk(1))
            .await
            .unwrap();

        assert_eq!(block.attempts, 4);
        assert_eq!(store.calls.load(Ordering::SeqCst), 4);
        assert_eq!(store.inner.uncommitted_blocks("media", "video.mp4"), vec![BlockId::from_sequence(1).unwrap()]);
    }

    #[tokio::test]
    #[traced_test]
    async fn gives_up_after_retry_budget() {
        let store = Arc::new(FlakyStore::failing(u32::MAX));
        let result = uploader(store.clone(), &UploadConfig::default()).upload(chunk(2)).await;

        match result {
            Err(UploadError::BlockLost { block_id, attempts, reason }) => {
                assert_eq!(block_id.as_str(), "00002");
                assert_eq!(attempts, 6);
                assert!(reason.contains("503"));
            }
            other => panic!("expected lost block, got {other:?}"),
        }
        assert_eq!(store.calls.load(Ordering::SeqCst), 6);
        assert!(logs_contain("Complete failure to upload block"));
    }

    #[tokio::test(start_paused = true)]
    async fn timeouts_count_as_failed_attempts() {
        let store = Arc::new(FlakyStore::stalling(2));
        let config = UploadConfig::default().with_timeout(Duration::from_secs(30));
        let started = tokio::time::Instant::now();

        let block = uploader(store.clone(), &config).upload(chunk(1)).await.unwrap();

        assert_eq!(block.attempts, 3);
        assert!(started.elapsed() >= Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn every_attempt_timing_out_loses_the_block() {
        let store = Arc::new(FlakyStore::stalling(u32::MAX));
        let config = UploadConfig::default().with_max_retries(2);

        let result = uploader(store.clone(), &config).upload(chunk(1)).await;

        assert!(matches!(result, Err(UploadError::BlockLost { attempts: 3, .. })));
        assert_eq!(store.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn sequence_without_block_id_is_never_sent() {
        let store = Arc::new(FlakyStore::failing(0));
        let result = uploader(store.clone(), &UploadConfig::default())
            .upload(chunk(BlockId::MAX_SEQUENCE + 1))
            .await;

        assert!(matches!(result, Err(UploadError::Invalid { .. })));
        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
    }
}
