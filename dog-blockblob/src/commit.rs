use tracing::{debug, info};

use crate::{BlockId, BlockList, BlockStore, CommitOptions, UploadError, UploadResult};

/// Restore upload order and check the block list is whole.
///
/// Workers finish in any order, so the list is always sorted by sequence
/// number here. A list that is empty, holds a sequence twice, or misses any
/// chunk the source emitted is rejected.
pub fn ordered_block_ids(block_list: &BlockList) -> UploadResult<Vec<BlockId>> {
    if block_list.is_empty() {
        return Err(UploadError::EmptyBlockList);
    }

    debug!(
        order = ?block_list.entries().iter().map(|e| e.block_id.as_str()).collect::<Vec<_>>(),
        "Block list order"
    );

    let mut entries = block_list.entries().to_vec();
    entries.sort_by_key(|entry| entry.sequence);

    if let Some(pair) = entries.windows(2).find(|pair| pair[0].sequence == pair[1].sequence) {
        return Err(UploadError::DuplicateBlock {
            sequence: pair[0].sequence,
        });
    }

    let expected = block_list.emitted();
    if entries.len() != expected as usize {
        let missing = (1..=expected)
            .filter(|sequence| entries.binary_search_by_key(sequence, |e| e.sequence).is_err())
            .collect();
        return Err(UploadError::IncompleteBlockList {
            expected,
            committed: entries.len() as u32,
            missing,
        });
    }

    let ordered: Vec<BlockId> = entries.into_iter().map(|entry| entry.block_id).collect();
    debug!(
        order = ?ordered.iter().map(BlockId::as_str).collect::<Vec<_>>(),
        "Block list fixed"
    );

    Ok(ordered)
}

/// Commit a complete block list as one object, returning the ids in committed order.
///
/// Nothing is retried here; block failures were already retried by the uploader.
pub async fn commit_block_list(
    store: &dyn BlockStore,
    container: &str,
    blob_name: &str,
    block_list: &BlockList,
    options: &CommitOptions,
) -> UploadResult<Vec<BlockId>> {
    let ordered = ordered_block_ids(block_list)?;

    info!(blocks = ordered.len(), "Done uploading, committing");
    store
        .commit_blocks(container, blob_name, &ordered, options)
        .await
        .map_err(UploadError::commit)?;

    Ok(ordered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BlockStatus, UploadedBlock};

    fn list(completed: &[u32], emitted: u32) -> BlockList {
        let mut list = BlockList::new();
        for &sequence in completed {
            list.push(&UploadedBlock {
                sequence,
                block_id: BlockId::from_sequence(sequence).unwrap(),
                status: BlockStatus::Uncommitted,
                size_bytes: 1,
                content_md5: String::new(),
                attempts: 1,
            });
        }
        list.seal(emitted);
        list
    }

    #[test]
    fn sorts_completion_order_back_to_upload_order() {
        let ids = ordered_block_ids(&list(&[3, 1, 5, 2, 4], 5)).unwrap();
        let ids: Vec<&str> = ids.iter().map(BlockId::as_str).collect();
        assert_eq!(ids, vec!["00001", "00002", "00003", "00004", "00005"]);
    }

    #[test]
    fn rejects_missing_blocks() {
        match ordered_block_ids(&list(&[5, 1, 3, 4], 5)) {
            Err(UploadError::IncompleteBlockList { expected, committed, missing }) => {
                assert_eq!(expected, 5);
                assert_eq!(committed, 4);
                assert_eq!(missing, vec![2]);
            }
            other => panic!("expected incomplete list, got {other:?}"),
        }
    }

    #[test]
    fn rejects_duplicates_and_empty_lists() {
        assert!(matches!(
            ordered_block_ids(&list(&[1, 2, 2], 3)),
            Err(UploadError::DuplicateBlock { sequence: 2 })
        ));
        assert!(matches!(ordered_block_ids(&list(&[], 0)), Err(UploadError::EmptyBlockList)));
    }
}
