//! Pure domain logic for testgap.
//!
//! This crate matches parsed Java method declarations against JaCoCo
//! method counters, computes which methods are new or changed between two
//! revisions, and evaluates the resulting test gap under a policy. It has
//! no I/O; parsing, decoding and repository access live in adapters.

use thiserror::Error;

use testgap_types::{
    CODE_AMBIGUOUS_METHOD, CODE_GAP_ABOVE_THRESHOLD, CODE_UNCOVERED_METHOD,
    CODE_UNRESOLVED_METHOD, Finding, Location, Severity, VerdictStatus, compute_fingerprint,
};

mod counter;
mod index;
mod method;
mod method_diff;
mod normalize;
mod resolver;
mod result;
mod summary;

pub use counter::{CounterKey, CoverageCounterRecord, TopLevelTypeKey, parse_descriptor_arguments};
pub use index::CoverageIndex;
pub use method::{MethodIdentity, MethodKind, ParsedMethod, ScopeSegment};
pub use method_diff::{drop_accessors, new_or_changed};
pub use normalize::{expected_compiled_arguments, normalize_type};
pub use resolver::CoverageResolver;
pub use result::CoverageResult;
pub use summary::{TestGapSummary, method_ref, test_gap_ratio};

// ============================================================================
// Errors
// ============================================================================

/// Errors raised by degenerate domain operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("cannot merge an empty set of coverage counters")]
    EmptyMerge,

    #[error("cannot merge coverage counters of different methods: {left} and {right}")]
    MismatchedMerge { left: String, right: String },
}

// ============================================================================
// Policy Configuration
// ============================================================================

/// Determines when the evaluation should fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailOn {
    /// Fail if there are any error-level findings.
    #[default]
    Error,
    /// Fail if there are any warn-level or error-level findings.
    Warn,
    /// Never fail (always pass unless there's a runtime error).
    Never,
}

/// How to report methods that could not be attributed to a counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnresolvedBehavior {
    /// No findings for unresolved or ambiguous methods.
    Skip,
    #[default]
    Warn,
    Fail,
}

impl UnresolvedBehavior {
    fn severity(&self) -> Option<Severity> {
        match self {
            UnresolvedBehavior::Skip => None,
            UnresolvedBehavior::Warn => Some(Severity::Warn),
            UnresolvedBehavior::Fail => Some(Severity::Error),
        }
    }
}

/// Policy configuration for test gap evaluation.
#[derive(Debug, Clone)]
pub struct Policy {
    /// Largest tolerated test gap, in percent.
    pub max_test_gap_pct: f64,
    /// Uncovered methods tolerated before they become errors.
    pub max_uncovered_methods: Option<u32>,
    /// Severity of unresolved and ambiguous methods.
    pub unresolved: UnresolvedBehavior,
    /// Determines when the evaluation should fail.
    pub fail_on: FailOn,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            max_test_gap_pct: 100.0,
            max_uncovered_methods: None,
            unresolved: UnresolvedBehavior::Warn,
            fail_on: FailOn::Error,
        }
    }
}

// ============================================================================
// Evaluation Input/Output
// ============================================================================

/// Input for policy evaluation.
#[derive(Debug, Clone)]
pub struct EvalInput {
    pub summary: TestGapSummary,
    pub policy: Policy,
}

/// Metrics from the evaluation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metrics {
    pub changed_methods_total: u32,
    pub covered_methods: u32,
    pub uncovered_methods: u32,
    pub empty_methods: u32,
    /// Unresolved methods, ambiguous claimants included.
    pub unresolved_methods: u32,
    pub ambiguous_methods: u32,
    /// uncovered / (covered + uncovered).
    pub test_gap_ratio: f64,
}

/// Output from policy evaluation.
#[derive(Debug, Clone)]
pub struct EvalOutput {
    /// List of findings (sorted deterministically).
    pub findings: Vec<Finding>,
    /// Overall verdict.
    pub verdict: VerdictStatus,
    /// Aggregated metrics.
    pub metrics: Metrics,
}

// ============================================================================
// Evaluation Logic
// ============================================================================

/// Evaluate a test gap summary under the given policy.
///
/// Emits one finding per uncovered method, one per unresolved or
/// ambiguous method (unless skipped by policy) and one when the gap ratio
/// exceeds the threshold, then sorts findings and derives the verdict.
pub fn evaluate(input: EvalInput) -> EvalOutput {
    let EvalInput { summary, policy } = input;
    let mut findings = Vec::new();

    let uncovered_count = summary.uncovered.len() as u32;
    let uncovered_severity = match policy.max_uncovered_methods {
        Some(max) if uncovered_count <= max => Severity::Info,
        _ => Severity::Error,
    };

    for (method, counter) in &summary.uncovered {
        findings.push(method_finding(
            method,
            uncovered_severity,
            CODE_UNCOVERED_METHOD,
            format!(
                "New or changed {} `{}` is not covered by any test.",
                kind_label(method.kind),
                method.qualified_name()
            ),
            serde_json::json!({
                "counter": counter.to_string(),
                "covered_instructions": counter.covered_instructions,
            }),
        ));
    }

    if let Some(severity) = policy.unresolved.severity() {
        let mut ambiguous_methods = std::collections::BTreeSet::new();
        for (counter, claimants) in &summary.ambiguous {
            for method in claimants {
                ambiguous_methods.insert(method);
                findings.push(method_finding(
                    method,
                    severity,
                    CODE_AMBIGUOUS_METHOD,
                    format!(
                        "Coverage of `{}` is ambiguous: {} methods match the same counter.",
                        method.qualified_name(),
                        claimants.len()
                    ),
                    serde_json::json!({
                        "counter": counter.to_string(),
                        "claimants": claimants.iter().map(ParsedMethod::qualified_name).collect::<Vec<_>>(),
                    }),
                ));
            }
        }

        for method in &summary.unresolvable {
            if ambiguous_methods.contains(method) {
                continue;
            }
            findings.push(method_finding(
                method,
                severity,
                CODE_UNRESOLVED_METHOD,
                format!(
                    "No coverage data found for new or changed {} `{}`.",
                    kind_label(method.kind),
                    method.qualified_name()
                ),
                serde_json::json!({ "kind": method.kind.as_str() }),
            ));
        }
    }

    let ratio = summary.test_gap_ratio();
    let gap_pct = ratio * 100.0;
    let classified = summary.covered.len() + summary.uncovered.len();
    if classified > 0 && gap_pct > policy.max_test_gap_pct {
        let fp = compute_fingerprint(&[CODE_GAP_ABOVE_THRESHOLD, "testgap"]);
        findings.push(Finding {
            severity: Severity::Error,
            code: CODE_GAP_ABOVE_THRESHOLD.to_string(),
            message: format!(
                "Test gap {:.1}% is above the maximum of {:.1}%.",
                gap_pct, policy.max_test_gap_pct
            ),
            location: None,
            data: Some(serde_json::json!({
                "actual_pct": gap_pct,
                "max_pct": policy.max_test_gap_pct,
            })),
            fingerprint: Some(fp),
        });
    }

    sort_findings(&mut findings);
    let verdict = determine_verdict(&findings, &policy);

    let metrics = Metrics {
        changed_methods_total: summary.total() as u32,
        covered_methods: summary.covered.len() as u32,
        uncovered_methods: uncovered_count,
        empty_methods: summary.empty.len() as u32,
        unresolved_methods: summary.unresolvable.len() as u32,
        ambiguous_methods: summary.ambiguous_method_count() as u32,
        test_gap_ratio: ratio,
    };

    EvalOutput {
        findings,
        verdict,
        metrics,
    }
}

fn kind_label(kind: MethodKind) -> &'static str {
    match kind {
        MethodKind::Constructor
        | MethodKind::EnumConstructor
        | MethodKind::InnerClassConstructor => "constructor",
        MethodKind::InstanceInitializer => "instance initializer",
        MethodKind::StaticInitializer => "static initializer",
        MethodKind::InstanceMethod | MethodKind::StaticMethod => "method",
        MethodKind::LambdaMethod => "lambda",
    }
}

fn method_finding(
    method: &ParsedMethod,
    severity: Severity,
    code: &str,
    message: String,
    data: serde_json::Value,
) -> Finding {
    let line = method.first_line().unwrap_or(method.declaration_line);
    let column = method.column.to_string();
    let name = method.qualified_name();
    let signature = method.argument_types.join(",");
    let fp = compute_fingerprint(&[code, &method.path, &name, &signature, &column]);
    Finding {
        severity,
        code: code.to_string(),
        message,
        location: Some(Location {
            path: method.path.clone(),
            line: Some(line),
            col: Some(method.column),
        }),
        data: Some(data),
        fingerprint: Some(fp),
    }
}

/// Sort findings deterministically.
///
/// Order: severity (error > warn > info) > path > line > code > message
pub fn sort_findings(findings: &mut [Finding]) {
    findings.sort_by(|a, b| {
        // Severity: error > warn > info (reverse order of Ord)
        let severity_cmp = b.severity.cmp(&a.severity);
        if severity_cmp != std::cmp::Ordering::Equal {
            return severity_cmp;
        }

        let path_a = a.location.as_ref().map(|l| l.path.as_str()).unwrap_or("");
        let path_b = b.location.as_ref().map(|l| l.path.as_str()).unwrap_or("");
        let path_cmp = path_a.cmp(path_b);
        if path_cmp != std::cmp::Ordering::Equal {
            return path_cmp;
        }

        // Line (ascending, None last)
        let line_a = a.location.as_ref().and_then(|l| l.line).unwrap_or(u32::MAX);
        let line_b = b.location.as_ref().and_then(|l| l.line).unwrap_or(u32::MAX);
        let line_cmp = line_a.cmp(&line_b);
        if line_cmp != std::cmp::Ordering::Equal {
            return line_cmp;
        }

        let code_cmp = a.code.cmp(&b.code);
        if code_cmp != std::cmp::Ordering::Equal {
            return code_cmp;
        }

        a.message.cmp(&b.message)
    });
}

/// Determine the verdict based on findings and policy.
pub fn determine_verdict(findings: &[Finding], policy: &Policy) -> VerdictStatus {
    let has_errors = findings.iter().any(|f| f.severity == Severity::Error);
    let has_warns = findings.iter().any(|f| f.severity == Severity::Warn);

    match policy.fail_on {
        FailOn::Error => {
            if has_errors {
                VerdictStatus::Fail
            } else if has_warns {
                VerdictStatus::Warn
            } else {
                VerdictStatus::Pass
            }
        }
        FailOn::Warn => {
            if has_errors || has_warns {
                VerdictStatus::Fail
            } else {
                VerdictStatus::Pass
            }
        }
        FailOn::Never => {
            if has_errors || has_warns {
                VerdictStatus::Warn
            } else {
                VerdictStatus::Pass
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, BTreeSet};

    use super::*;

    fn method(name: &str, line: u32) -> ParsedMethod {
        ParsedMethod {
            path: "src/main/java/com/acme/Foo.java".to_string(),
            top_level_type: "com.acme.Foo".to_string(),
            lines: vec![line],
            declaration_line: line - 1,
            column: 5,
            kind: MethodKind::InstanceMethod,
            name: name.to_string(),
            scope: vec![ScopeSegment::Type("Foo".to_string())],
            argument_types: Vec::new(),
            type_parameters: BTreeMap::new(),
            outer_type: None,
            is_empty: false,
            relevant_code: format!("{}();", name),
        }
    }

    fn counter(name: &str, line: u32, covered: u64) -> CoverageCounterRecord {
        CoverageCounterRecord {
            declaring_type: "com/acme/Foo".to_string(),
            name: name.to_string(),
            descriptor: "()V".to_string(),
            line: Some(line),
            covered_instructions: covered,
        }
    }

    fn summary(covered: &[(&str, u32)], uncovered: &[(&str, u32)]) -> TestGapSummary {
        TestGapSummary {
            covered: covered
                .iter()
                .map(|(n, l)| (method(n, *l), counter(n, *l, 3)))
                .collect(),
            uncovered: uncovered
                .iter()
                .map(|(n, l)| (method(n, *l), counter(n, *l, 0)))
                .collect(),
            ..TestGapSummary::default()
        }
    }

    fn input(summary: TestGapSummary) -> EvalInput {
        EvalInput {
            summary,
            policy: Policy::default(),
        }
    }

    #[test]
    fn test_all_methods_covered_pass() {
        let output = evaluate(input(summary(&[("a", 3), ("b", 8)], &[])));

        assert_eq!(output.verdict, VerdictStatus::Pass);
        assert!(output.findings.is_empty());
        assert_eq!(output.metrics.covered_methods, 2);
        assert_eq!(output.metrics.test_gap_ratio, 0.0);
    }

    #[test]
    fn test_uncovered_method_fails() {
        let output = evaluate(input(summary(&[("a", 3)], &[("b", 8)])));

        assert_eq!(output.verdict, VerdictStatus::Fail);
        assert_eq!(output.findings.len(), 1);
        let finding = &output.findings[0];
        assert_eq!(finding.code, CODE_UNCOVERED_METHOD);
        assert_eq!(finding.severity, Severity::Error);
        assert_eq!(finding.location.as_ref().unwrap().line, Some(8));
        assert!(finding.message.contains("Foo.b"));
        assert_eq!(output.metrics.test_gap_ratio, 0.5);
    }

    #[test]
    fn test_max_uncovered_methods_downgrades_to_info() {
        let mut inp = input(summary(&[("a", 3)], &[("b", 8)]));
        inp.policy.max_uncovered_methods = Some(1);

        let output = evaluate(inp);

        assert_eq!(output.verdict, VerdictStatus::Pass);
        assert_eq!(output.findings[0].severity, Severity::Info);
    }

    #[test]
    fn test_gap_threshold_finding() {
        let mut inp = input(summary(&[("a", 3), ("b", 5), ("c", 7)], &[("d", 9)]));
        inp.policy.max_uncovered_methods = Some(10);
        inp.policy.max_test_gap_pct = 20.0;

        let output = evaluate(inp);

        assert_eq!(output.verdict, VerdictStatus::Fail);
        let gap = output
            .findings
            .iter()
            .find(|f| f.code == CODE_GAP_ABOVE_THRESHOLD)
            .expect("gap finding");
        assert!(gap.location.is_none());
        assert!(gap.message.contains("25.0%"));
    }

    #[test]
    fn test_gap_threshold_ignores_empty_population() {
        let mut inp = input(TestGapSummary::default());
        inp.policy.max_test_gap_pct = 0.0;

        let output = evaluate(inp);

        assert_eq!(output.verdict, VerdictStatus::Pass);
        assert!(output.findings.is_empty());
        assert!(!output.metrics.test_gap_ratio.is_nan());
    }

    #[test]
    fn test_unresolved_behaviors() {
        let mut s = TestGapSummary::default();
        s.unresolvable.insert(method("lost", 4));

        let warn = evaluate(input(s.clone()));
        assert_eq!(warn.verdict, VerdictStatus::Warn);
        assert_eq!(warn.findings[0].code, CODE_UNRESOLVED_METHOD);

        let mut skip = input(s.clone());
        skip.policy.unresolved = UnresolvedBehavior::Skip;
        let skip = evaluate(skip);
        assert_eq!(skip.verdict, VerdictStatus::Pass);
        assert!(skip.findings.is_empty());
        assert_eq!(skip.metrics.unresolved_methods, 1);

        let mut fail = input(s);
        fail.policy.unresolved = UnresolvedBehavior::Fail;
        assert_eq!(evaluate(fail).verdict, VerdictStatus::Fail);
    }

    #[test]
    fn test_ambiguous_methods_get_ambiguous_code_only() {
        let a = method("a", 3);
        let b = method("b", 3);
        let mut s = TestGapSummary::default();
        s.unresolvable.insert(a.clone());
        s.unresolvable.insert(b.clone());
        s.ambiguous
            .insert(counter("a", 3, 1), BTreeSet::from([a.clone(), b.clone()]));

        let output = evaluate(input(s));

        assert_eq!(output.findings.len(), 2);
        assert!(
            output
                .findings
                .iter()
                .all(|f| f.code == CODE_AMBIGUOUS_METHOD)
        );
        assert_eq!(output.metrics.ambiguous_methods, 2);
        assert_eq!(output.metrics.unresolved_methods, 2);
    }

    #[test]
    fn test_fail_on_never() {
        let mut inp = input(summary(&[], &[("b", 8)]));
        inp.policy.fail_on = FailOn::Never;
        assert_eq!(evaluate(inp).verdict, VerdictStatus::Warn);
    }

    #[test]
    fn test_fail_on_warn() {
        let mut s = TestGapSummary::default();
        s.unresolvable.insert(method("lost", 4));
        let mut inp = input(s);
        inp.policy.fail_on = FailOn::Warn;
        assert_eq!(evaluate(inp).verdict, VerdictStatus::Fail);
    }

    #[test]
    fn test_findings_sorted_and_fingerprinted() {
        let mut s = summary(&[], &[("z", 20), ("a", 4)]);
        s.unresolvable.insert(method("m", 1));

        let output = evaluate(input(s));

        let order: Vec<_> = output
            .findings
            .iter()
            .map(|f| (f.severity, f.location.as_ref().and_then(|l| l.line)))
            .collect();
        assert_eq!(
            order,
            vec![
                (Severity::Error, Some(4)),
                (Severity::Error, Some(20)),
                (Severity::Warn, Some(1)),
            ]
        );
        for finding in &output.findings {
            let fp = finding.fingerprint.as_ref().unwrap();
            assert_eq!(fp.len(), 64);
            assert!(fp.chars().all(|c| c.is_ascii_hexdigit()));
        }
    }

    #[test]
    fn test_fingerprint_stable_across_line_moves() {
        let a = evaluate(input(summary(&[], &[("run", 4)])));
        let b = evaluate(input(summary(&[], &[("run", 40)])));
        assert_eq!(a.findings[0].fingerprint, b.findings[0].fingerprint);
    }
}
