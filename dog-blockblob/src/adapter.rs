use std::sync::Arc;

use bytes::Bytes;

use crate::{BlockStore, UploadConfig, UploadInput, UploadOptions, UploadReceipt, UploadResult, UploadSession};

/// Chunked upload entry point - embed this next to whatever block storage client you use
pub struct BlockBlobUploader {
    store: Arc<dyn BlockStore>,
    config: UploadConfig,
}

impl BlockBlobUploader {
    /// Create a new uploader over `store`
    pub fn new<S: BlockStore + 'static>(store: S, config: UploadConfig) -> Self {
        Self {
            store: Arc::new(store),
            config,
        }
    }

    /// Create an uploader sharing an existing store handle
    pub fn with_shared_store(store: Arc<dyn BlockStore>, config: UploadConfig) -> Self {
        Self { store, config }
    }

    /// Get configuration
    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    /// Upload `input` as `container/blob_name`, split into blocks and committed in order.
    ///
    /// Fails without committing anything when a block could not be staged
    /// after all its retries.
    pub async fn upload_object<I: Into<UploadInput>>(
        &self,
        container: &str,
        blob_name: &str,
        input: I,
        options: UploadOptions,
    ) -> UploadResult<UploadReceipt> {
        let config = self.config.merged_with(&options);
        UploadSession::new(self.store.clone(), container, blob_name, config)
            .run(input.into(), options.commit)
            .await
    }

    /// Like [`upload_object`](Self::upload_object), but guesses whether `content_or_path`
    /// is content or a file path with [`UploadInput::classify`]
    pub async fn upload_content_or_path<B: Into<Bytes>>(
        &self,
        container: &str,
        blob_name: &str,
        content_or_path: B,
        options: UploadOptions,
    ) -> UploadResult<UploadReceipt> {
        self.upload_object(container, blob_name, UploadInput::classify(content_or_path), options)
            .await
    }
}
