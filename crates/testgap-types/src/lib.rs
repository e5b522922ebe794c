//! Core types and DTOs for testgap.
//!
//! This crate defines the data transfer objects used throughout testgap,
//! including the report schema, findings, verdicts, and error codes.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

// ============================================================================
// Schema and Code Constants
// ============================================================================

/// Schema identifier for the testgap report format.
pub const SCHEMA_ID: &str = "testgap.report.v1";

/// Code for a new or changed method that no test executed.
pub const CODE_UNCOVERED_METHOD: &str = "testgap.method.uncovered";

/// Code for a new or changed method with no matching coverage counter.
pub const CODE_UNRESOLVED_METHOD: &str = "testgap.method.unresolved";

/// Code for a method that shares its only coverage counter with another method.
pub const CODE_AMBIGUOUS_METHOD: &str = "testgap.method.ambiguous";

/// Code for a test gap ratio above the configured maximum.
pub const CODE_GAP_ABOVE_THRESHOLD: &str = "testgap.gap_above_threshold";

/// Code for an invalid JaCoCo XML report.
pub const CODE_INVALID_JACOCO: &str = "testgap.input.invalid_jacoco";

/// Code for source text that could not be parsed.
pub const CODE_INVALID_SOURCE: &str = "testgap.input.invalid_source";

/// Code for a previous-state expression that resolves to nothing.
pub const CODE_UNRESOLVABLE_REFERENCE: &str = "testgap.git.unresolvable_reference";

/// Code for runtime errors.
pub const CODE_RUNTIME_ERROR: &str = "tool.runtime_error";

// ============================================================================
// Verdict Reason Tokens
// ============================================================================

/// Reason: no new or changed methods were found.
pub const REASON_NO_CHANGED_METHODS: &str = "no_changed_methods";

/// Reason: every new or changed method was executed by a test.
pub const REASON_METHODS_COVERED: &str = "methods_covered";

/// Reason: some new or changed methods were never executed.
pub const REASON_UNCOVERED_METHODS: &str = "uncovered_methods";

/// Reason: some methods could not be matched to coverage counters.
pub const REASON_UNRESOLVED_METHODS: &str = "unresolved_methods";

/// Reason: the test gap ratio exceeds the configured maximum.
pub const REASON_GAP_ABOVE_THRESHOLD: &str = "gap_above_threshold";

/// Reason: the run aborted on invalid input or a repository error.
pub const REASON_TOOL_ERROR: &str = "tool_error";

// ============================================================================
// Fingerprint
// ============================================================================

/// Compute a SHA-256 fingerprint from pipe-delimited parts.
///
/// Joins all parts with `|`, hashes with SHA-256, and returns lowercase hex.
pub fn compute_fingerprint(parts: &[&str]) -> String {
    let input = parts.join("|");
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let result = hasher.finalize();
    format!("{:x}", result)
}

// ============================================================================
// Code Registry
// ============================================================================

/// Metadata for a testgap code.
#[derive(Debug, Clone, Copy)]
pub struct CodeInfo {
    pub code: &'static str,
    pub name: &'static str,
    pub short_description: &'static str,
    pub full_description: &'static str,
    pub remediation: &'static str,
    pub help_uri: &'static str,
}

/// Registry of all testgap codes.
pub const CODE_REGISTRY: &[CodeInfo] = &[
    CodeInfo {
        code: CODE_UNCOVERED_METHOD,
        name: "UncoveredMethod",
        short_description: "Uncovered new or changed method",
        full_description: "A method added or modified between the compared states has a coverage counter with zero covered instructions.",
        remediation: "Add or extend a test that executes the method, then regenerate the JaCoCo report.",
        help_uri: "https://github.com/testgap/testgap/blob/main/docs/codes.md#uncovered",
    },
    CodeInfo {
        code: CODE_UNRESOLVED_METHOD,
        name: "UnresolvedMethod",
        short_description: "Method without coverage counter",
        full_description: "No coverage counter could be matched to a new or changed method. The class may be missing from the report or compiled differently than expected.",
        remediation: "Make sure the JaCoCo report was produced from the analyzed revision and includes the class.",
        help_uri: "https://github.com/testgap/testgap/blob/main/docs/codes.md#unresolved",
    },
    CodeInfo {
        code: CODE_AMBIGUOUS_METHOD,
        name: "AmbiguousMethod",
        short_description: "Method shares a coverage counter",
        full_description: "Several methods matched the same coverage counter, so none of them can be attributed reliably.",
        remediation: "Review the listed methods manually; splitting declarations across lines removes most ambiguities.",
        help_uri: "https://github.com/testgap/testgap/blob/main/docs/codes.md#ambiguous",
    },
    CodeInfo {
        code: CODE_GAP_ABOVE_THRESHOLD,
        name: "GapAboveThreshold",
        short_description: "Test gap above threshold",
        full_description: "The share of uncovered methods among new or changed methods exceeds the configured maximum.",
        remediation: "Add tests for the uncovered methods or adjust max_test_gap_pct.",
        help_uri: "https://github.com/testgap/testgap/blob/main/docs/codes.md#gap_above_threshold",
    },
    CodeInfo {
        code: CODE_INVALID_JACOCO,
        name: "InvalidJacoco",
        short_description: "Invalid JaCoCo XML input",
        full_description: "A coverage report could not be decoded as JaCoCo XML.",
        remediation: "Regenerate the report with the JaCoCo XML formatter and make sure it is not truncated.",
        help_uri: "https://github.com/testgap/testgap/blob/main/docs/codes.md#invalid_jacoco",
    },
    CodeInfo {
        code: CODE_INVALID_SOURCE,
        name: "InvalidSource",
        short_description: "Unparsable source file",
        full_description: "A changed source file contains syntax the parser could not recover from.",
        remediation: "Fix the syntax error or exclude the path via [paths] exclude.",
        help_uri: "https://github.com/testgap/testgap/blob/main/docs/codes.md#invalid_source",
    },
    CodeInfo {
        code: CODE_UNRESOLVABLE_REFERENCE,
        name: "UnresolvableReference",
        short_description: "Unresolvable previous state",
        full_description: "The requested previous state (revision, branch or tag pattern) does not resolve to a commit.",
        remediation: "Check the revision spelling, fetch missing refs, or widen the name pattern.",
        help_uri: "https://github.com/testgap/testgap/blob/main/docs/codes.md#unresolvable_reference",
    },
    CodeInfo {
        code: CODE_RUNTIME_ERROR,
        name: "RuntimeError",
        short_description: "Tool runtime error",
        full_description: "testgap failed due to a runtime or internal error.",
        remediation: "Re-run with --verbose and file a bug if reproducible.",
        help_uri: "https://github.com/testgap/testgap/blob/main/docs/codes.md#runtime_error",
    },
];

/// Lookup code metadata by code string.
pub fn explain(code: &str) -> Option<&'static CodeInfo> {
    CODE_REGISTRY.iter().find(|info| info.code == code)
}

// ============================================================================
// Enums
// ============================================================================

/// Severity level for findings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warn,
    Error,
}

/// Status of the overall verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerdictStatus {
    Pass,
    Warn,
    Fail,
}

// ============================================================================
// Structs
// ============================================================================

/// Information about the tool that generated the report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    /// Name of the tool.
    pub name: String,
    /// Version of the tool.
    pub version: String,
}

impl Default for Tool {
    fn default() -> Self {
        Self {
            name: "testgap".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Information about the run timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    /// ISO 8601 timestamp when the run started.
    pub started_at: String,
    /// ISO 8601 timestamp when the run ended.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<String>,
    /// Duration of the run in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl Default for Run {
    fn default() -> Self {
        Self {
            started_at: chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            ended_at: None,
            duration_ms: None,
        }
    }
}

/// Counts of findings by severity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerdictCounts {
    pub info: u32,
    pub warn: u32,
    pub error: u32,
}

/// The overall verdict of the analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verdict {
    /// Overall status.
    pub status: VerdictStatus,
    /// Counts of findings by severity.
    pub counts: VerdictCounts,
    /// Reasons for the verdict.
    pub reasons: Vec<String>,
}

impl Default for Verdict {
    fn default() -> Self {
        Self {
            status: VerdictStatus::Pass,
            counts: VerdictCounts::default(),
            reasons: Vec::new(),
        }
    }
}

/// Location of a finding in the source code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    /// Repo-relative path to the file (forward slashes).
    pub path: String,
    /// Line number (1-indexed).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    /// Column number (1-indexed).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub col: Option<u32>,
}

/// A single finding from the analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    /// Severity of the finding.
    pub severity: Severity,
    /// Full code (e.g., "testgap.method.uncovered").
    pub code: String,
    /// Human-readable message describing the finding.
    pub message: String,
    /// Location of the finding in source code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    /// Additional structured data about the finding.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    /// SHA-256 fingerprint for deduplication (`^[a-f0-9]{64}$`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
}

/// A method as it appears in the report.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MethodRef {
    /// Repo-relative path of the declaring file.
    pub path: String,
    /// Fully-qualified name of the top-level type.
    pub type_name: String,
    /// Dotted scope and name, e.g. `Outer.Inner.run`.
    pub name: String,
    /// Declared argument types joined with `,`.
    pub signature: String,
    /// Declaration kind (`method`, `constructor`, `lambda`, ...).
    pub kind: String,
    /// First line carrying code, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
}

/// Methods that competed for one coverage counter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmbiguousGroup {
    /// The contested counter, rendered as `type#name desc`.
    pub counter: String,
    /// All methods that claimed it.
    pub methods: Vec<MethodRef>,
}

/// Per-bucket method listings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodSets {
    pub covered: Vec<MethodRef>,
    pub uncovered: Vec<MethodRef>,
    pub empty: Vec<MethodRef>,
    pub unresolvable: Vec<MethodRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ambiguous: Vec<AmbiguousGroup>,
}

/// Information about the inputs used for the analysis.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Inputs {
    /// Object id of the previous state.
    pub previous: String,
    /// Object id of the current state, or `WORKING_TREE`.
    pub current: String,
    /// The expression the previous state was resolved from, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_expression: Option<String>,
    /// Paths to JaCoCo XML reports.
    pub coverage_paths: Vec<String>,
}

/// Aggregated data about the analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportData {
    /// Number of new or changed methods analyzed.
    pub changed_methods_total: u32,
    pub covered_methods: u32,
    pub uncovered_methods: u32,
    pub empty_methods: u32,
    pub unresolved_methods: u32,
    pub ambiguous_methods: u32,
    /// Number of changed files excluded as test sources or by path filters.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub excluded_files_count: u32,
    /// Number of accessor methods skipped by policy.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub skipped_accessors_count: u32,
    /// uncovered / (covered + uncovered), 0 when nothing was classified.
    pub test_gap_ratio: f64,
    /// Maximum tolerated test gap in percent.
    pub max_test_gap_pct: f64,
    /// Information about the inputs.
    pub inputs: Inputs,
    /// Method listings per bucket.
    pub methods: MethodSets,
}

fn is_zero(n: &u32) -> bool {
    *n == 0
}

impl Default for ReportData {
    fn default() -> Self {
        Self {
            changed_methods_total: 0,
            covered_methods: 0,
            uncovered_methods: 0,
            empty_methods: 0,
            unresolved_methods: 0,
            ambiguous_methods: 0,
            excluded_files_count: 0,
            skipped_accessors_count: 0,
            test_gap_ratio: 0.0,
            max_test_gap_pct: 0.0,
            inputs: Inputs::default(),
            methods: MethodSets::default(),
        }
    }
}

/// The full test gap report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub schema: String,
    pub tool: Tool,
    pub run: Run,
    pub verdict: Verdict,
    pub findings: Vec<Finding>,
    pub data: ReportData,
}

impl Report {
    /// Create a new report with default values.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Default for Report {
    fn default() -> Self {
        Self {
            schema: SCHEMA_ID.to_string(),
            tool: Tool::default(),
            run: Run::default(),
            verdict: Verdict::default(),
            findings: Vec::new(),
            data: ReportData::default(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_fingerprint_known_values() {
        assert_eq!(
            compute_fingerprint(&["a", "b"]),
            "0eab8a0a3380abf4c7d1fb0b43b66aafbb64a4b953e4eb2dccca579461912d0c"
        );
        assert_eq!(
            compute_fingerprint(&[]),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_explain_returns_code_info() {
        let info = explain(CODE_UNCOVERED_METHOD).expect("code should exist");
        assert_eq!(info.code, CODE_UNCOVERED_METHOD);
        assert_eq!(info.name, "UncoveredMethod");
        assert!(explain("testgap.missing.code").is_none());
    }

    #[test]
    fn test_registry_codes_are_unique() {
        let mut codes: Vec<_> = CODE_REGISTRY.iter().map(|info| info.code).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), CODE_REGISTRY.len());
    }

    #[test]
    fn test_severity_serialization() {
        assert_eq!(serde_json::to_string(&Severity::Info).unwrap(), "\"info\"");
        assert_eq!(serde_json::to_string(&Severity::Warn).unwrap(), "\"warn\"");
        assert_eq!(
            serde_json::to_string(&Severity::Error).unwrap(),
            "\"error\""
        );
    }

    #[test]
    fn test_verdict_status_serialization() {
        assert_eq!(
            serde_json::to_string(&VerdictStatus::Pass).unwrap(),
            "\"pass\""
        );
        assert_eq!(
            serde_json::to_string(&VerdictStatus::Fail).unwrap(),
            "\"fail\""
        );
    }

    #[test]
    fn test_report_default() {
        let report = Report::new();

        assert_eq!(report.schema, SCHEMA_ID);
        assert_eq!(report.tool.name, "testgap");
        assert_eq!(report.verdict.status, VerdictStatus::Pass);
        assert!(report.findings.is_empty());
        assert_eq!(report.data.test_gap_ratio, 0.0);
    }

    #[test]
    fn test_report_data_skips_zero_counters() {
        let value = serde_json::to_value(ReportData::default()).unwrap();
        assert!(value.get("excluded_files_count").is_none());
        assert!(value.get("skipped_accessors_count").is_none());
        assert!(value["methods"].get("ambiguous").is_none());
    }
}
