use crate::ledger::KnownIdLedger;
use crate::pool::WorkerPool;
use crate::store::CardStore;
use crate::walker::CatalogWalker;
use crawler_core::Result;
use metrics::{gauge, histogram};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub pages_fetched: u32,
    pub candidates: usize,
    pub ingested: usize,
    pub skipped: usize,
    pub ledger_size: usize,
}

/// Drives walk, ingestion and ledger upkeep once per polling interval.
pub struct Pipeline {
    walker: CatalogWalker,
    pool: WorkerPool,
    store: Arc<dyn CardStore>,
    ledger_capacity: usize,
    poll_interval: Duration,
}

impl Pipeline {
    pub fn new(
        walker: CatalogWalker,
        pool: WorkerPool,
        store: Arc<dyn CardStore>,
        ledger_capacity: usize,
        poll_interval: Duration,
    ) -> Self {
        Self {
            walker,
            pool,
            store,
            ledger_capacity,
            poll_interval,
        }
    }

    /// Seed the ledger from the records already in storage.
    pub async fn bootstrap_ledger(&self) -> Result<KnownIdLedger> {
        let keys = self.store.list_keys().await?;
        let mut ledger = KnownIdLedger::load(&keys);
        let dropped = ledger.truncate_to_capacity(self.ledger_capacity);

        gauge!("crawler_ledger_size").set(ledger.len() as f64);
        info!(
            stored = keys.len(),
            known = ledger.len(),
            dropped,
            newest = ?ledger.newest(),
            "Ledger loaded from storage"
        );
        Ok(ledger)
    }

    #[instrument(skip(self, ledger))]
    pub async fn run_cycle(&self, ledger: &mut KnownIdLedger) -> Result<CycleReport> {
        let started = Instant::now();

        let walk = self.walker.discover(ledger).await?;
        let candidates = walk.new_ids.len();
        let pool_report = self.pool.run(walk.new_ids).await?;

        let dropped = ledger.truncate_to_capacity(self.ledger_capacity);
        gauge!("crawler_ledger_size").set(ledger.len() as f64);
        histogram!("crawler_cycle_duration_ms").record(started.elapsed().as_millis() as f64);

        let report = CycleReport {
            pages_fetched: walk.pages_fetched,
            candidates,
            ingested: pool_report.ingested,
            skipped: pool_report.skipped,
            ledger_size: ledger.len(),
        };

        info!(
            pages = report.pages_fetched,
            candidates = report.candidates,
            ingested = report.ingested,
            skipped = report.skipped,
            ledger = report.ledger_size,
            dropped,
            duration_ms = started.elapsed().as_millis(),
            "Cycle completed"
        );
        Ok(report)
    }

    /// Bootstrap and run a single cycle.
    pub async fn run_once(&self) -> Result<CycleReport> {
        let mut ledger = self.bootstrap_ledger().await?;
        self.run_cycle(&mut ledger).await
    }

    /// Run cycles until Ctrl-C.
    pub async fn run_continuous(&self) -> Result<()> {
        self.run_until(async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Shutdown signal received"),
                Err(e) => {
                    error!(error = %e, "Failed to listen for shutdown signal");
                    std::future::pending::<()>().await;
                }
            }
        })
        .await
    }

    /// Run cycles back to back, each started one poll interval after the previous one
    /// started (or right away when a cycle overran). `shutdown` is only honoured between
    /// cycles; a cycle in progress always runs to completion.
    pub async fn run_until(&self, shutdown: impl Future<Output = ()>) -> Result<()> {
        let mut ledger = self.bootstrap_ledger().await?;
        tokio::pin!(shutdown);

        loop {
            let started = Instant::now();
            self.run_cycle(&mut ledger).await?;

            let pause = pause_before_next_cycle(self.poll_interval, started.elapsed());
            info!(pause_secs = pause.as_secs(), "Waiting for the next cycle");

            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutting down pipeline");
                    return Ok(());
                }
                _ = tokio::time::sleep(pause) => {}
            }
        }
    }
}

/// Time left in the polling interval after a cycle; zero once the cycle overran it.
fn pause_before_next_cycle(interval: Duration, cycle_elapsed: Duration) -> Duration {
    interval.saturating_sub(cycle_elapsed)
}
