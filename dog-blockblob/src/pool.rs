use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::{BlockUploader, Chunk, UploadError, UploadResult, UploadedBlock};

/// Result a worker reports for one chunk
#[derive(Debug)]
pub(crate) struct BlockOutcome {
    pub sequence: u32,
    pub result: UploadResult<UploadedBlock>,
}

/// Fixed set of upload workers fed from a bounded chunk queue.
///
/// The queue holds at most `size` chunks and exactly `size` workers pull
/// from it, so no more than `size` uploads run at once and at most
/// `2 * size` chunks are held in memory. Workers report to a single results
/// channel that only the owner of the pool reads. Dropping the pool aborts
/// any worker still running.
pub(crate) struct WorkerPool {
    queue: Option<mpsc::Sender<Chunk>>,
    results: mpsc::UnboundedReceiver<BlockOutcome>,
    workers: JoinSet<()>,
}

impl WorkerPool {
    pub fn spawn(size: usize, uploader: Arc<BlockUploader>) -> Self {
        let (queue_tx, queue_rx) = mpsc::channel::<Chunk>(size);
        let queue_rx = Arc::new(Mutex::new(queue_rx));
        let (results_tx, results_rx) = mpsc::unbounded_channel();

        let mut workers = JoinSet::new();
        for worker in 0..size {
            let queue = queue_rx.clone();
            let results = results_tx.clone();
            let uploader = uploader.clone();

            workers.spawn(async move {
                loop {
                    let next = queue.lock().await.recv().await;
                    let Some(chunk) = next else {
                        break;
                    };

                    let sequence = chunk.sequence;
                    let result = uploader.upload(chunk).await;
                    if results.send(BlockOutcome { sequence, result }).is_err() {
                        break;
                    }
                }
                debug!(worker, "Upload worker stopped");
            });
        }

        Self {
            queue: Some(queue_tx),
            results: results_rx,
            workers,
        }
    }

    /// Queue a chunk, waiting while the queue is full
    pub async fn submit(&mut self, chunk: Chunk) -> UploadResult<()> {
        let queue = self.queue.as_ref().ok_or(UploadError::PoolClosed)?;
        queue.send(chunk).await.map_err(|_| UploadError::PoolClosed)
    }

    /// Outcomes that are already available, without waiting
    pub fn completed(&mut self) -> Vec<BlockOutcome> {
        let mut ready = Vec::new();
        while let Ok(outcome) = self.results.try_recv() {
            ready.push(outcome);
        }
        ready
    }

    /// Close the queue, wait for every queued and running upload, then stop the workers
    pub async fn drain(mut self) -> Vec<BlockOutcome> {
        self.queue.take();

        let mut remaining = Vec::new();
        while let Some(outcome) = self.results.recv().await {
            remaining.push(outcome);
        }

        while let Some(joined) = self.workers.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "Upload worker ended abnormally");
            }
        }

        remaining
    }
}
