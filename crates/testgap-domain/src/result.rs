//! Classification of parsed methods against coverage counters.

use std::collections::{BTreeMap, BTreeSet};

use tracing::warn;

use crate::{CoverageCounterRecord, ParsedMethod};

/// Outcome of resolving parsed methods against coverage counters.
///
/// `resolved`, `unresolved` and `empty` are disjoint. Claimants of an
/// ambiguous counter are listed under that counter and also in
/// `unresolved`; they never stay in `resolved`.
///
/// Results are combined with [`CoverageResult::merge`], which re-derives
/// ambiguity over the union every time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoverageResult {
    resolved: BTreeMap<ParsedMethod, CoverageCounterRecord>,
    ambiguous: BTreeMap<CoverageCounterRecord, BTreeSet<ParsedMethod>>,
    unresolved: BTreeSet<ParsedMethod>,
    empty: BTreeSet<ParsedMethod>,
}

impl CoverageResult {
    /// Build a result from raw buckets and demote shared counters.
    pub fn new(
        resolved: BTreeMap<ParsedMethod, CoverageCounterRecord>,
        unresolved: BTreeSet<ParsedMethod>,
        empty: BTreeSet<ParsedMethod>,
    ) -> Self {
        let mut result = Self {
            resolved,
            ambiguous: BTreeMap::new(),
            unresolved,
            empty,
        };
        result.demote_ambiguous();
        result
    }

    /// A result holding only empty-bodied methods.
    pub fn from_empty<I>(methods: I) -> Self
    where
        I: IntoIterator<Item = ParsedMethod>,
    {
        Self {
            empty: methods.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Combine two results. Ambiguity is recomputed over the union.
    ///
    /// A method classified in both results keeps its classification from
    /// `other`, so the buckets stay disjoint.
    pub fn merge(mut self, other: CoverageResult) -> CoverageResult {
        for method in other
            .resolved
            .keys()
            .chain(&other.unresolved)
            .chain(&other.empty)
        {
            self.forget(method);
        }

        self.resolved.extend(other.resolved);
        for (counter, claimants) in other.ambiguous {
            self.ambiguous.entry(counter).or_default().extend(claimants);
        }
        self.unresolved.extend(other.unresolved);
        self.empty.extend(other.empty);
        self.demote_ambiguous();
        self
    }

    /// Fold result fragments into one accumulator, left to right.
    pub fn fold<I>(fragments: I) -> CoverageResult
    where
        I: IntoIterator<Item = CoverageResult>,
    {
        fragments
            .into_iter()
            .fold(CoverageResult::default(), CoverageResult::merge)
    }

    pub fn resolved(&self) -> &BTreeMap<ParsedMethod, CoverageCounterRecord> {
        &self.resolved
    }

    pub fn ambiguous(&self) -> &BTreeMap<CoverageCounterRecord, BTreeSet<ParsedMethod>> {
        &self.ambiguous
    }

    pub fn unresolved(&self) -> &BTreeSet<ParsedMethod> {
        &self.unresolved
    }

    pub fn empty(&self) -> &BTreeSet<ParsedMethod> {
        &self.empty
    }

    /// Number of distinct methods across all buckets.
    pub fn len(&self) -> usize {
        self.resolved.len() + self.unresolved.len() + self.empty.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn forget(&mut self, method: &ParsedMethod) {
        self.resolved.remove(method);
        self.unresolved.remove(method);
        self.empty.remove(method);
        self.ambiguous.retain(|_, claimants| {
            claimants.remove(method);
            !claimants.is_empty()
        });
    }

    /// Move every non-initializer method sharing a counter with another
    /// non-initializer method out of `resolved`. A counter that is already
    /// ambiguous takes in every further claimant.
    fn demote_ambiguous(&mut self) {
        let mut claims: BTreeMap<&CoverageCounterRecord, Vec<&ParsedMethod>> = BTreeMap::new();
        for (method, counter) in &self.resolved {
            if !method.kind.is_initializer() {
                claims.entry(counter).or_default().push(method);
            }
        }

        let contested: Vec<(CoverageCounterRecord, Vec<ParsedMethod>)> = claims
            .into_iter()
            .filter(|(counter, claimants)| {
                claimants.len() > 1 || self.ambiguous.contains_key(*counter)
            })
            .map(|(counter, claimants)| {
                (
                    counter.clone(),
                    claimants.into_iter().cloned().collect(),
                )
            })
            .collect();

        for (counter, claimants) in contested {
            for method in &claimants {
                self.resolved.remove(method);
                self.unresolved.insert(method.clone());
            }
            let all = self.ambiguous.entry(counter.clone()).or_default();
            all.extend(claimants);
            warn!(
                counter = %counter,
                claimants = all.len(),
                "coverage counter claimed by several methods"
            );
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
