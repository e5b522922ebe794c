//! Test gap summary over the new or changed methods of one analysis.

use std::collections::{BTreeMap, BTreeSet};

use testgap_types::{AmbiguousGroup, MethodRef, MethodSets};

use crate::{CoverageCounterRecord, CoverageResult, ParsedMethod};

/// Buckets of new or changed methods after coverage resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestGapSummary {
    /// Resolved methods with at least one covered instruction.
    pub covered: BTreeMap<ParsedMethod, CoverageCounterRecord>,
    /// Resolved methods with no covered instruction.
    pub uncovered: BTreeMap<ParsedMethod, CoverageCounterRecord>,
    /// Methods without executable code.
    pub empty: BTreeSet<ParsedMethod>,
    /// Methods no counter could be attributed to, ambiguous ones included.
    pub unresolvable: BTreeSet<ParsedMethod>,
    /// Counters claimed by several methods.
    pub ambiguous: BTreeMap<CoverageCounterRecord, BTreeSet<ParsedMethod>>,
}

impl TestGapSummary {
    /// Restrict a resolver result to `changed` and split resolved methods
    /// by coverage.
    ///
    /// A changed method absent from every bucket of `result` counts as
    /// unresolvable.
    pub fn assemble(changed: &BTreeSet<ParsedMethod>, result: &CoverageResult) -> Self {
        let mut summary = TestGapSummary::default();

        for method in changed {
            if let Some(counter) = result.resolved().get(method) {
                let bucket = if counter.is_covered() {
                    &mut summary.covered
                } else {
                    &mut summary.uncovered
                };
                bucket.insert(method.clone(), counter.clone());
            } else if result.empty().contains(method) {
                summary.empty.insert(method.clone());
            } else {
                summary.unresolvable.insert(method.clone());
            }
        }

        for (counter, claimants) in result.ambiguous() {
            let relevant: BTreeSet<ParsedMethod> =
                claimants.intersection(changed).cloned().collect();
            if !relevant.is_empty() {
                summary.ambiguous.insert(counter.clone(), relevant);
            }
        }

        summary
    }

    /// Number of changed methods, each counted once.
    pub fn total(&self) -> usize {
        self.covered.len() + self.uncovered.len() + self.empty.len() + self.unresolvable.len()
    }

    /// Number of distinct methods listed under some ambiguous counter.
    pub fn ambiguous_method_count(&self) -> usize {
        self.ambiguous
            .values()
            .flatten()
            .collect::<BTreeSet<_>>()
            .len()
    }

    /// uncovered / (covered + uncovered), or 0 when both are 0.
    pub fn test_gap_ratio(&self) -> f64 {
        test_gap_ratio(self.covered.len(), self.uncovered.len())
    }

    /// Report listing of every bucket.
    pub fn method_sets(&self) -> MethodSets {
        MethodSets {
            covered: self.covered.keys().map(method_ref).collect(),
            uncovered: self.uncovered.keys().map(method_ref).collect(),
            empty: self.empty.iter().map(method_ref).collect(),
            unresolvable: self.unresolvable.iter().map(method_ref).collect(),
            ambiguous: self
                .ambiguous
                .iter()
                .map(|(counter, claimants)| AmbiguousGroup {
                    counter: counter.to_string(),
                    methods: claimants.iter().map(method_ref).collect(),
                })
                .collect(),
        }
    }
}

/// uncovered / (covered + uncovered), defined as 0 for an empty population.
///
/// ```
/// use testgap_domain::test_gap_ratio;
///
/// assert_eq!(test_gap_ratio(0, 0), 0.0);
/// assert_eq!(test_gap_ratio(3, 1), 0.25);
/// ```
pub fn test_gap_ratio(covered: usize, uncovered: usize) -> f64 {
    let total = covered + uncovered;
    if total == 0 {
        return 0.0;
    }
    uncovered as f64 / total as f64
}

/// Report view of a parsed method.
pub fn method_ref(method: &ParsedMethod) -> MethodRef {
    MethodRef {
        path: method.path.clone(),
        type_name: method.top_level_type.clone(),
        name: method.qualified_name(),
        signature: method.argument_types.join(","),
        kind: method.kind.as_str().to_string(),
        line: method.first_line().or(Some(method.declaration_line)),
    }
}
