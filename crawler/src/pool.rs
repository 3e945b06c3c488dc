use crate::job::{CardJob, JobOutcome};
use crate::model::ListingId;
use crawler_core::{Error, Result};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolReport {
    pub ingested: usize,
    pub skipped: usize,
}

impl PoolReport {
    fn record(&mut self, outcome: JobOutcome) {
        match outcome {
            JobOutcome::Ingested => self.ingested += 1,
            JobOutcome::AlreadyStored => self.skipped += 1,
        }
    }

    fn merge(&mut self, other: PoolReport) {
        self.ingested += other.ingested;
        self.skipped += other.skipped;
    }
}

/// Fixed number of workers draining one queue of listing ids.
///
/// The first failed job stops the whole run: remaining workers are aborted and the
/// error is returned with the listing it happened on.
pub struct WorkerPool {
    job: CardJob,
    workers: usize,
}

impl WorkerPool {
    pub fn new(job: CardJob, workers: usize) -> Self {
        Self {
            job,
            workers: workers.max(1),
        }
    }

    #[instrument(skip(self, ids), fields(jobs = ids.len(), workers = self.workers))]
    pub async fn run(&self, ids: Vec<ListingId>) -> Result<PoolReport> {
        if ids.is_empty() {
            return Ok(PoolReport::default());
        }

        // Everything is enqueued up front, so the queue never blocks the producer.
        let (tx, rx) = mpsc::channel::<ListingId>(ids.len());
        for id in ids {
            tx.send(id)
                .await
                .map_err(|e| Error::Internal(format!("job queue closed early: {e}")))?;
        }
        drop(tx);

        let rx = Arc::new(Mutex::new(rx));
        let mut workers = JoinSet::new();
        for worker in 0..self.workers {
            workers.spawn(drain(worker, self.job.clone(), Arc::clone(&rx)));
        }

        let mut report = PoolReport::default();
        while let Some(joined) = workers.join_next().await {
            let failure = match joined {
                Ok(Ok(partial)) => {
                    report.merge(partial);
                    continue;
                }
                Ok(Err(e)) => e,
                Err(join_err) => Error::Internal(format!("worker task failed: {join_err}")),
            };

            error!(error = %failure, "Job failed, stopping the remaining workers");
            workers.abort_all();
            return Err(failure);
        }

        info!(
            ingested = report.ingested,
            skipped = report.skipped,
            "All jobs completed"
        );
        Ok(report)
    }
}

async fn drain(
    worker: usize,
    job: CardJob,
    queue: Arc<Mutex<mpsc::Receiver<ListingId>>>,
) -> Result<PoolReport> {
    let mut report = PoolReport::default();
    loop {
        let next = queue.lock().await.recv().await;
        let Some(id) = next else {
            debug!(worker, "Queue drained");
            return Ok(report);
        };
        report.record(job.run(id).await?);
    }
}
