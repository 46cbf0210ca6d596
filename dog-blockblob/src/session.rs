use std::sync::Arc;

use tracing::{info, instrument};

use crate::commit::commit_block_list;
use crate::{
    BlockStore, BlockUploader, ChunkSource, CommitOptions, UploadConfig, UploadCoordinator, UploadError,
    UploadInput, UploadReceipt, UploadResult, UploadSessionId,
};

/// One chunked upload of one blob, from reading the input to the final commit.
///
/// The session owns its worker pool for the duration of [`UploadSession::run`];
/// the pool is gone by the time `run` returns, whatever the outcome.
pub struct UploadSession {
    id: UploadSessionId,
    store: Arc<dyn BlockStore>,
    container: String,
    blob_name: String,
    config: UploadConfig,
}

impl UploadSession {
    pub fn new<C, B>(store: Arc<dyn BlockStore>, container: C, blob_name: B, config: UploadConfig) -> Self
    where
        C: Into<String>,
        B: Into<String>,
    {
        Self {
            id: UploadSessionId::new(),
            store,
            container: container.into(),
            blob_name: blob_name.into(),
            config,
        }
    }

    pub fn id(&self) -> &UploadSessionId {
        &self.id
    }

    /// Upload `input` in blocks and commit them as a single object
    #[instrument(skip_all, fields(session_id = %self.id, container = %self.container, blob = %self.blob_name))]
    pub async fn run(self, input: UploadInput, commit: CommitOptions) -> UploadResult<UploadReceipt> {
        self.config.validate()?;

        let source = ChunkSource::open(input, self.config.block_size).await?;
        if let Some(len) = source.len_hint() {
            if len > self.config.max_object_bytes {
                return Err(UploadError::invalid(format!(
                    "Object size {} exceeds maximum {}",
                    len, self.config.max_object_bytes
                )));
            }
        }

        let uploader = BlockUploader::new(self.store.clone(), self.container.as_str(), self.blob_name.as_str(), &self.config);
        let coordinator = UploadCoordinator::new(Arc::new(uploader), &self.config);
        let block_list = coordinator.upload_all(source).await?;

        let block_ids = commit_block_list(
            self.store.as_ref(),
            &self.container,
            &self.blob_name,
            &block_list,
            &commit,
        )
        .await?;
        info!(blocks = block_ids.len(), bytes = block_list.total_bytes(), "Uploading done");

        Ok(
            UploadReceipt::new(self.id, self.container, self.blob_name, block_ids, block_list.total_bytes())
                .with_commit_options(&commit),
        )
    }
}
