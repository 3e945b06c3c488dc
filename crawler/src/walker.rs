use crate::ingest::ListingSource;
use crate::ledger::KnownIdLedger;
use crate::model::{CatalogEntry, ListingId};
use crawler_core::Result;
use metrics::counter;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Listings discovered by one walk over the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkOutcome {
    pub pages_fetched: u32,
    /// New ids in the order they were seen, first page first.
    pub new_ids: Vec<ListingId>,
}

/// Pages through the newest-first catalog until it reaches listings the ledger already knows.
///
/// Paging has no upper bound besides convergence and the end of the catalog: when every
/// listing on the site is new, the whole catalog is walked.
pub struct CatalogWalker {
    source: Arc<dyn ListingSource>,
}

impl CatalogWalker {
    pub fn new(source: Arc<dyn ListingSource>) -> Self {
        Self { source }
    }

    /// Walk the catalog and record every new id in the ledger before returning it.
    #[instrument(skip(self, ledger), fields(known = ledger.len()))]
    pub async fn discover(&self, ledger: &mut KnownIdLedger) -> Result<WalkOutcome> {
        let known = ledger.snapshot();

        let (entries, pages_fetched) = if ledger.is_empty() {
            info!("Ledger is empty, taking the first catalog page as is");
            (self.source.fetch_catalog_page(1).await?, 1)
        } else {
            self.walk_to_known(&known).await?
        };

        // A repeat across pages is rejected by the insert
        let new_ids: Vec<ListingId> = entries
            .iter()
            .map(|e| e.id)
            .filter(|id| !known.contains(id) && ledger.insert(*id))
            .collect();

        counter!("crawler_candidates_discovered").increment(new_ids.len() as u64);
        info!(
            pages = pages_fetched,
            entries = entries.len(),
            new = new_ids.len(),
            "Catalog walk finished"
        );

        Ok(WalkOutcome {
            pages_fetched,
            new_ids,
        })
    }

    async fn walk_to_known(
        &self,
        known: &HashSet<ListingId>,
    ) -> Result<(Vec<CatalogEntry>, u32)> {
        let mut accumulated = Vec::new();
        let mut page = 1u32;

        loop {
            let entries = self.source.fetch_catalog_page(page).await?;
            if entries.is_empty() {
                warn!(page, "Reached the end of the catalog without meeting a known listing");
                return Ok((accumulated, page));
            }

            // Promoted tiles float regardless of age, so they never prove we caught up.
            let converged = entries
                .iter()
                .any(|e| !e.promoted && known.contains(&e.id));

            debug!(page, entries = entries.len(), converged, "Catalog page scanned");
            accumulated.extend(entries);

            if converged {
                return Ok((accumulated, page));
            }
            page += 1;
        }
    }
}
