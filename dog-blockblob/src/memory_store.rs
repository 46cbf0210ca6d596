use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use parking_lot::RwLock;
use thiserror::Error;

use crate::store::content_md5;
use crate::{BlockId, BlockOptions, BlockStatus, BlockStore, CommitOptions, UploadError, UploadResult};

type ObjectKey = (String, String);

/// Errors raised by [`MemoryBlockStore`], surfaced as backend errors
#[derive(Error, Debug)]
pub enum MemoryStoreError {
    #[error("Content-MD5 mismatch for block {block_id}: header {expected}, computed {actual}")]
    Md5Mismatch {
        block_id: BlockId,
        expected: String,
        actual: String,
    },

    #[error("Block {block_id} was never staged for {container}/{blob_name}")]
    UnknownBlock {
        container: String,
        blob_name: String,
        block_id: BlockId,
    },

    #[error("Refusing to commit an empty block list")]
    EmptyCommit,
}

/// An object assembled by a commit
#[derive(Debug, Clone)]
pub struct CommittedObject {
    pub content: Bytes,
    pub block_ids: Vec<BlockId>,
    pub options: CommitOptions,
}

#[derive(Default)]
struct State {
    staged: HashMap<ObjectKey, BTreeMap<BlockId, Bytes>>,
    committed: HashMap<ObjectKey, CommittedObject>,
}

/// In-process block store.
///
/// Blocks are staged per `(container, blob)` and checked against their
/// Content-MD5 header. Committing assembles the object in the order given and
/// discards every staged block of that blob, like a block blob service does.
#[derive(Default)]
pub struct MemoryBlockStore {
    state: RwLock<State>,
}

impl MemoryBlockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The committed object, if any
    pub fn object(&self, container: &str, blob_name: &str) -> Option<CommittedObject> {
        self.state.read().committed.get(&key(container, blob_name)).cloned()
    }

    /// Staged block ids not yet part of a commit, in id order
    pub fn uncommitted_blocks(&self, container: &str, blob_name: &str) -> Vec<BlockId> {
        self.state
            .read()
            .staged
            .get(&key(container, blob_name))
            .map(|blocks| blocks.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Every block the store knows for a blob with its state
    pub fn block_list(&self, container: &str, blob_name: &str) -> Vec<(BlockId, BlockStatus)> {
        let state = self.state.read();
        let object_key = key(container, blob_name);

        let committed = state
            .committed
            .get(&object_key)
            .map(|object| object.block_ids.clone())
            .unwrap_or_default()
            .into_iter()
            .map(|id| (id, BlockStatus::Committed));

        let uncommitted = state
            .staged
            .get(&object_key)
            .map(|blocks| blocks.keys().cloned().collect::<Vec<_>>())
            .unwrap_or_default()
            .into_iter()
            .map(|id| (id, BlockStatus::Uncommitted));

        committed.chain(uncommitted).collect()
    }
}

fn key(container: &str, blob_name: &str) -> ObjectKey {
    (container.to_string(), blob_name.to_string())
}

#[async_trait]
impl BlockStore for MemoryBlockStore {
    async fn create_block(
        &self,
        container: &str,
        blob_name: &str,
        block_id: &BlockId,
        content: Bytes,
        options: &BlockOptions,
    ) -> UploadResult<String> {
        let actual = content_md5(&content);
        if actual != options.content_md5 {
            return Err(UploadError::backend(MemoryStoreError::Md5Mismatch {
                block_id: block_id.clone(),
                expected: options.content_md5.clone(),
                actual,
            }));
        }

        self.state
            .write()
            .staged
            .entry(key(container, blob_name))
            .or_default()
            .insert(block_id.clone(), content);

        Ok(actual)
    }

    async fn commit_blocks(
        &self,
        container: &str,
        blob_name: &str,
        block_ids: &[BlockId],
        options: &CommitOptions,
    ) -> UploadResult<()> {
        if block_ids.is_empty() {
            return Err(UploadError::backend(MemoryStoreError::EmptyCommit));
        }

        let object_key = key(container, blob_name);
        let mut state = self.state.write();

        let content = {
            let staged = state.staged.get(&object_key);
            let mut content = BytesMut::new();
            for block_id in block_ids {
                let block = staged.and_then(|blocks| blocks.get(block_id)).ok_or_else(|| {
                    UploadError::backend(MemoryStoreError::UnknownBlock {
                        container: container.to_string(),
                        blob_name: blob_name.to_string(),
                        block_id: block_id.clone(),
                    })
                })?;
                content.extend_from_slice(block);
            }
            content.freeze()
        };

        state.staged.remove(&object_key);
        state.committed.insert(
            object_key,
            CommittedObject {
                content,
                block_ids: block_ids.to_vec(),
                options: options.clone(),
            },
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(data: &'static [u8]) -> (Bytes, BlockOptions) {
        (Bytes::from_static(data), BlockOptions::for_content(data))
    }

    #[tokio::test]
    async fn commit_assembles_in_given_order() {
        let store = MemoryBlockStore::new();
        let (b1, o1) = block(b"hello ");
        let (b2, o2) = block(b"world");

        store.create_block("media", "greeting", &BlockId::from_sequence(2).unwrap(), b2, &o2).await.unwrap();
        store.create_block("media", "greeting", &BlockId::from_sequence(1).unwrap(), b1, &o1).await.unwrap();
        assert_eq!(store.uncommitted_blocks("media", "greeting").len(), 2);

        let ids = vec![BlockId::from_sequence(1).unwrap(), BlockId::from_sequence(2).unwrap()];
        let options = CommitOptions::new().with_content_type("text/plain");
        store.commit_blocks("media", "greeting", &ids, &options).await.unwrap();

        let object = store.object("media", "greeting").unwrap();
        assert_eq!(object.content, Bytes::from_static(b"hello world"));
        assert_eq!(object.options.content_type.as_deref(), Some("text/plain"));
        assert!(store.uncommitted_blocks("media", "greeting").is_empty());
        assert_eq!(
            store.block_list("media", "greeting"),
            vec![(ids[0].clone(), BlockStatus::Committed), (ids[1].clone(), BlockStatus::Committed)]
        );
    }

    #[tokio::test]
    async fn rejects_corrupted_block() {
        let store = MemoryBlockStore::new();
        let (_, options) = block(b"expected");

        let result = store
            .create_block("media", "blob", &BlockId::from_sequence(1).unwrap(), Bytes::from_static(b"tampered"), &options)
            .await;

        assert!(matches!(result, Err(UploadError::Backend { .. })));
        assert!(store.uncommitted_blocks("media", "blob").is_empty());
    }

    #[tokio::test]
    async fn commit_requires_staged_blocks() {
        let store = MemoryBlockStore::new();
        let ids = vec![BlockId::from_sequence(1).unwrap()];

        let result = store.commit_blocks("media", "blob", &ids, &CommitOptions::new()).await;
        assert!(matches!(result, Err(UploadError::Backend { .. })));

        let result = store.commit_blocks("media", "blob", &[], &CommitOptions::new()).await;
        assert!(matches!(result, Err(UploadError::Backend { .. })));
        assert!(store.object("media", "blob").is_none());
    }
}
