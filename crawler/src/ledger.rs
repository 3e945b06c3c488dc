use crate::model::ListingId;
use std::collections::{BTreeSet, HashSet};

/// Bounded record of listing ids that were already ingested.
///
/// Ids are kept ordered so truncation always keeps the newest (largest) ones.
#[derive(Debug, Clone, Default)]
pub struct KnownIdLedger {
    ids: BTreeSet<ListingId>,
}

impl KnownIdLedger {
    /// Seeds the ledger from record keys found in storage. Keys that are not
    /// listing ids are skipped.
    pub fn load<I, S>(existing_keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let ids = existing_keys
            .into_iter()
            .filter_map(|key| key.as_ref().trim().parse::<ListingId>().ok())
            .collect();
        Self { ids }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    #[cfg(test)]
    pub fn contains(&self, id: ListingId) -> bool {
        self.ids.contains(&id)
    }

    /// Hash set copy of the current membership, taken once per walk.
    pub fn snapshot(&self) -> HashSet<ListingId> {
        self.ids.iter().copied().collect()
    }

    /// Returns `true` when the id was not known before.
    pub fn insert(&mut self, id: ListingId) -> bool {
        self.ids.insert(id)
    }

    #[cfg(test)]
    pub fn extend<I: IntoIterator<Item = ListingId>>(&mut self, ids: I) {
        self.ids.extend(ids);
    }

    /// Drops the smallest ids until at most `capacity` remain. Returns how many were dropped.
    pub fn truncate_to_capacity(&mut self, capacity: usize) -> usize {
        let mut dropped = 0;
        while self.ids.len() > capacity {
            self.ids.pop_first();
            dropped += 1;
        }
        dropped
    }

    pub fn newest(&self) -> Option<ListingId> {
        self.ids.last().copied()
    }

    #[cfg(test)]
    pub fn oldest(&self) -> Option<ListingId> {
        self.ids.first().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn load_ignores_foreign_entries() {
        let ledger = KnownIdLedger::load(["164921", "lost+found", ".tmp", "100", " 7 "]);
        assert_eq!(ledger.len(), 3);
        assert!(ledger.contains(ListingId(164921)));
        assert!(ledger.contains(ListingId(7)));
    }

    #[test]
    fn truncation_keeps_newest_ids() {
        let mut ledger = KnownIdLedger::default();
        for id in [5, 1, 9, 3, 7, 2, 8] {
            ledger.insert(ListingId(id));
        }

        assert_eq!(ledger.truncate_to_capacity(3), 4);

        let mut kept: Vec<_> = ledger.snapshot().into_iter().map(ListingId::get).collect();
        kept.sort_unstable();
        assert_eq!(kept, vec![7, 8, 9]);
        assert_eq!(ledger.oldest(), Some(ListingId(7)));
        assert_eq!(ledger.newest(), Some(ListingId(9)));
    }

    #[test]
    fn truncation_below_capacity_is_noop() {
        let mut ledger = KnownIdLedger::load(["1", "2"]);
        assert_eq!(ledger.truncate_to_capacity(10), 0);
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn insert_reports_novelty() {
        let mut ledger = KnownIdLedger::default();
        assert!(ledger.insert(ListingId(100)));
        assert!(!ledger.insert(ListingId(100)));
    }

    proptest! {
        #[test]
        fn truncation_keeps_exactly_the_largest(
            ids in proptest::collection::vec(-1_000i64..1_000_000, 0..300),
            capacity in 0usize..120,
        ) {
            let mut ledger = KnownIdLedger::default();
            for id in &ids {
                ledger.insert(ListingId(*id));
            }
            ledger.truncate_to_capacity(capacity);

            let mut expected: Vec<i64> = ids.clone();
            expected.sort_unstable();
            expected.dedup();
            let expected: HashSet<ListingId> = expected
                .into_iter()
                .rev()
                .take(capacity)
                .map(ListingId)
                .collect();

            prop_assert!(ledger.len() <= capacity);
            prop_assert_eq!(ledger.snapshot(), expected);
        }
    }
}
