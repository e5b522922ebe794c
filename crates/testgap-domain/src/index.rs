//! Coverage counters grouped by top-level type.

use std::collections::BTreeMap;

use crate::{CounterKey, CoverageCounterRecord, DomainError, TopLevelTypeKey};

/// Pre-indexed coverage counters, one sorted group per top-level type.
///
/// Records sharing a [`CounterKey`] are merged on construction, so every
/// compiled method appears at most once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoverageIndex {
    groups: BTreeMap<TopLevelTypeKey, Vec<CoverageCounterRecord>>,
}

impl CoverageIndex {
    /// Index counter records, summing duplicates.
    pub fn new<I>(records: I) -> Result<Self, DomainError>
    where
        I: IntoIterator<Item = CoverageCounterRecord>,
    {
        let mut by_key: BTreeMap<CounterKey, Vec<CoverageCounterRecord>> = BTreeMap::new();
        for record in records {
            by_key.entry(record.key()).or_default().push(record);
        }

        let mut groups: BTreeMap<TopLevelTypeKey, Vec<CoverageCounterRecord>> = BTreeMap::new();
        for (_, duplicates) in by_key {
            let merged = CoverageCounterRecord::merge(duplicates)?;
            groups.entry(merged.top_level_key()).or_default().push(merged);
        }
        for group in groups.values_mut() {
            group.sort();
        }

        Ok(Self { groups })
    }

    /// Counters belonging to one top-level type, in record order.
    pub fn group(&self, key: &TopLevelTypeKey) -> &[CoverageCounterRecord] {
        self.groups.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn keys(&self) -> impl Iterator<Item = &TopLevelTypeKey> {
        self.groups.keys()
    }

    /// Total number of counters.
    pub fn len(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// All counters, ordered by type key then record order.
    pub fn records(&self) -> impl Iterator<Item = &CoverageCounterRecord> {
        self.groups.values().flatten()
    }
}
