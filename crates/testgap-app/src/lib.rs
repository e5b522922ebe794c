//! Application orchestration for testgap.
//!
//! This crate provides the high-level `check` function that runs the
//! whole test gap analysis:
//!
//! 1. Decode and merge the JaCoCo reports
//! 2. Collect the changed source files between two repository states
//! 3. Parse both sides of every changed file and keep the new or changed
//!    methods
//! 4. Resolve coverage counters for the current side
//! 5. Evaluate the test gap against the policy
//! 6. Build and return a report with markdown and annotations
//!
//! # Example
//!
//! ```rust,ignore
//! use testgap_app::{check, CheckRequest, Comparison};
//!
//! let request = CheckRequest {
//!     root: ".".into(),
//!     comparison: Comparison::Revision("main".to_string()),
//!     coverage_texts: vec![std::fs::read_to_string("target/site/jacoco/jacoco.xml")?],
//!     coverage_paths: vec!["target/site/jacoco/jacoco.xml".to_string()],
//!     ..Default::default()
//! };
//!
//! let result = check(request)?;
//! println!("Exit code: {}", result.exit_code);
//! ```

use std::cell::Cell;
use std::collections::BTreeSet;
use std::path::PathBuf;

use testgap_adapters_coverage::{JacocoDecoder, merge_reports};
use testgap_adapters_git::{
    ChangeScanner, GitChangeSet, GitError, RefKind, RepoLocation, RepoState, WORKING_TREE,
};
use testgap_adapters_java::JavaParser;
use testgap_config::{
    DEFAULT_SOURCE_PATTERN, DEFAULT_TEST_PATTERNS, matches_any_pattern, should_include_path,
};
pub use testgap_domain::{FailOn, UnresolvedBehavior};
use testgap_domain::{
    CoverageIndex, CoverageResolver, DomainError, EvalInput, EvalOutput, Policy, TestGapSummary,
    drop_accessors, evaluate, new_or_changed,
};
pub use testgap_ports::Clock;
use testgap_ports::{CoverageDecoder, SourceParser};
use testgap_render::{
    DEFAULT_MAX_ANNOTATIONS, DEFAULT_MAX_ROWS, render_annotations, render_markdown,
};
use testgap_types::{
    CODE_AMBIGUOUS_METHOD, CODE_GAP_ABOVE_THRESHOLD, CODE_INVALID_JACOCO, CODE_INVALID_SOURCE,
    CODE_RUNTIME_ERROR, CODE_UNRESOLVABLE_REFERENCE, CODE_UNRESOLVED_METHOD, Finding, Inputs,
    Location, REASON_GAP_ABOVE_THRESHOLD, REASON_METHODS_COVERED, REASON_NO_CHANGED_METHODS,
    REASON_TOOL_ERROR, REASON_UNCOVERED_METHODS, REASON_UNRESOLVED_METHODS, Report, ReportData,
    Run, SCHEMA_ID, Severity, Tool, Verdict, VerdictCounts, VerdictStatus, compute_fingerprint,
};
use thiserror::Error;
use tracing::{debug, info, warn};

// ============================================================================
// Clock
// ============================================================================

/// System clock implementation that returns the actual current time.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> chrono::DateTime<chrono::Utc> {
        chrono::Utc::now()
    }
}

// ============================================================================
// Request and Result Types
// ============================================================================

/// Which two repository states to compare.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Comparison {
    /// Uncommitted changes against HEAD.
    #[default]
    WorkingTree,
    /// A revision expression (`main`, `HEAD~3`, an object id) against HEAD.
    Revision(String),
    /// The most recent tag whose name matches the pattern, against HEAD.
    PreviousTag(String),
    /// The most recent branch whose name matches the pattern, against HEAD.
    PreviousBranch(String),
}

/// Request for a test gap check.
#[derive(Debug, Clone)]
pub struct CheckRequest {
    /// Directory inside the repository to analyze.
    pub root: PathBuf,
    pub comparison: Comparison,
    /// JaCoCo XML documents.
    pub coverage_texts: Vec<String>,
    /// Paths the coverage texts were read from, for reporting.
    pub coverage_paths: Vec<String>,
    /// Determines when the evaluation should fail.
    pub fail_on: FailOn,
    /// Largest tolerated test gap, in percent.
    pub max_test_gap_pct: f64,
    /// Uncovered methods tolerated before they become errors.
    pub max_uncovered_methods: Option<u32>,
    /// Severity of unresolved and ambiguous methods.
    pub unresolved: UnresolvedBehavior,
    /// Keep getter/setter shaped methods in the analysis.
    pub include_accessors: bool,
    /// Glob patterns for files to include (empty means all).
    pub include_patterns: Vec<String>,
    /// Glob patterns for files to exclude.
    pub exclude_patterns: Vec<String>,
    /// Glob pattern selecting source files.
    pub source_pattern: String,
    /// Glob patterns identifying test sources, which are never analyzed.
    pub test_patterns: Vec<String>,
    /// Repo-relative directory to restrict the scan to. Overrides the
    /// directory implied by `root`.
    pub sub_directory: Option<String>,
}

impl Default for CheckRequest {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            comparison: Comparison::default(),
            coverage_texts: Vec::new(),
            coverage_paths: Vec::new(),
            fail_on: FailOn::Error,
            max_test_gap_pct: 100.0,
            max_uncovered_methods: None,
            unresolved: UnresolvedBehavior::Warn,
            include_accessors: false,
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
            source_pattern: DEFAULT_SOURCE_PATTERN.to_string(),
            test_patterns: DEFAULT_TEST_PATTERNS.iter().map(|p| p.to_string()).collect(),
            sub_directory: None,
        }
    }
}

impl CheckRequest {
    /// Whether a changed path takes part in the analysis, ignoring the
    /// parser's own file type check.
    fn accepts_path(&self, path: &str) -> bool {
        matches_any_pattern(path, std::slice::from_ref(&self.source_pattern))
            && !matches_any_pattern(path, &self.test_patterns)
            && should_include_path(path, &self.include_patterns, &self.exclude_patterns)
    }

    fn previous_expression(&self) -> Option<String> {
        match &self.comparison {
            Comparison::Revision(expression) => Some(expression.clone()),
            _ => None,
        }
    }
}

/// Result of a test gap check.
#[derive(Debug, Clone)]
pub struct CheckResult {
    /// The generated report.
    pub report: Report,
    /// Markdown rendering of the report.
    pub markdown: String,
    /// GitHub annotations rendering of the report.
    pub annotations: String,
    /// Exit code: 0 = pass, 1 = tool error, 2 = policy failure.
    pub exit_code: i32,
}

// ============================================================================
// Errors
// ============================================================================

/// Errors that abort a check without a report.
#[derive(Debug, Error)]
pub enum AppError {
    /// Repository access failed.
    #[error("Git error: {0}")]
    Git(String),

    /// Coverage counters could not be combined.
    #[error("Domain error: {0}")]
    Domain(String),
}

impl From<GitError> for AppError {
    fn from(e: GitError) -> Self {
        AppError::Git(e.to_string())
    }
}

impl From<DomainError> for AppError {
    fn from(e: DomainError) -> Self {
        AppError::Domain(e.to_string())
    }
}

// ============================================================================
// Main Check Function
// ============================================================================

/// Run a test gap check with the Java parser, the JaCoCo decoder and the
/// system clock.
///
/// Invalid inputs (malformed coverage XML, unparsable sources, unknown
/// revisions) produce an error report with exit code 1. Only failures
/// that leave nothing to report are returned as `AppError`.
pub fn check(request: CheckRequest) -> Result<CheckResult, AppError> {
    check_with_clock(request, &SystemClock)
}

/// Run a test gap check with a custom clock.
///
/// This allows for deterministic testing with fixed timestamps.
pub fn check_with_clock<C: Clock>(
    request: CheckRequest,
    clock: &C,
) -> Result<CheckResult, AppError> {
    check_with(request, &JavaParser, &JacocoDecoder, clock)
}

/// Run a test gap check with custom collaborators.
pub fn check_with<P, D, C>(
    request: CheckRequest,
    parser: &P,
    decoder: &D,
    clock: &C,
) -> Result<CheckResult, AppError>
where
    P: SourceParser,
    D: CoverageDecoder,
    C: Clock,
{
    let started_at = clock.now();

    // Coverage first: a broken report makes the rest pointless.
    if request.coverage_texts.is_empty() {
        return Ok(build_error_result(
            &request,
            started_at,
            CODE_INVALID_JACOCO,
            "No JaCoCo report was supplied.",
            None,
            None,
            clock,
        ));
    }

    let mut decoded = Vec::with_capacity(request.coverage_texts.len());
    for (idx, text) in request.coverage_texts.iter().enumerate() {
        match decoder.decode(text) {
            Ok(records) => decoded.push(records),
            Err(e) => {
                let source = request
                    .coverage_paths
                    .get(idx)
                    .map(String::as_str)
                    .unwrap_or("<input>");
                warn!(source, error = %e, "invalid coverage report");
                return Ok(build_error_result(
                    &request,
                    started_at,
                    CODE_INVALID_JACOCO,
                    &format!("Failed to decode JaCoCo report {}: {}", source, e),
                    None,
                    None,
                    clock,
                ));
            }
        }
    }
    let records = merge_reports(decoded)?;
    debug!(counters = records.len(), "decoded coverage reports");

    // Changed files.
    let location = RepoLocation::discover(&request.root)?;
    let location = match request.sub_directory.as_deref() {
        Some(dir) => location.with_sub_directory(Some(dir)),
        None => location,
    };
    let scanner = ChangeScanner::new(location);

    let excluded = Cell::new(0u32);
    let filter = |path: &str| {
        if !parser.accepts(path) {
            return false;
        }
        if request.accepts_path(path) {
            true
        } else {
            excluded.set(excluded.get() + 1);
            false
        }
    };

    let changes = match scan(&scanner, &request.comparison, filter) {
        Ok(changes) => changes,
        Err(e) if is_reference_error(&e) => {
            warn!(error = %e, "previous state not resolvable");
            return Ok(build_error_result(
                &request,
                started_at,
                CODE_UNRESOLVABLE_REFERENCE,
                &e.to_string(),
                None,
                None,
                clock,
            ));
        }
        Err(e) => return Err(e.into()),
    };
    let excluded_files_count = excluded.get();
    info!(
        previous = %changes.previous,
        current = %changes.current,
        files = changes.len(),
        excluded = excluded_files_count,
        "collected changed files"
    );

    // Methods on both sides.
    let mut current_methods = Vec::new();
    let mut changed = BTreeSet::new();
    for change in changes.iter() {
        let old = match change.previous_content() {
            Some(text) => match parser.parse(change.path(), text) {
                Ok(methods) => methods,
                Err(e) => {
                    return Ok(invalid_source(
                        &request,
                        &changes,
                        change.path(),
                        &e,
                        started_at,
                        clock,
                    ));
                }
            },
            None => Vec::new(),
        };
        let new = match change.current_content() {
            Some(text) => match parser.parse(change.path(), text) {
                Ok(methods) => methods,
                Err(e) => {
                    return Ok(invalid_source(
                        &request,
                        &changes,
                        change.path(),
                        &e,
                        started_at,
                        clock,
                    ));
                }
            },
            None => Vec::new(),
        };

        let file_changed = new_or_changed(old.iter(), new.iter().cloned());
        debug!(
            path = change.path(),
            methods = new.len(),
            changed = file_changed.len(),
            "compared file"
        );
        changed.extend(file_changed);
        current_methods.extend(new);
    }

    let (changed, skipped_accessors) = if request.include_accessors {
        (changed, 0)
    } else {
        drop_accessors(changed)
    };

    // Resolution runs on every current method of the changed files so
    // that positional lambda pairing and ambiguity see the whole type.
    let resolver = CoverageResolver::new(CoverageIndex::new(records)?);
    let result = resolver.resolve(current_methods);
    let summary = TestGapSummary::assemble(&changed, &result);
    let method_sets = summary.method_sets();

    let policy = Policy {
        max_test_gap_pct: request.max_test_gap_pct,
        max_uncovered_methods: request.max_uncovered_methods,
        unresolved: request.unresolved,
        fail_on: request.fail_on,
    };
    let output = evaluate(EvalInput { summary, policy });
    info!(
        verdict = ?output.verdict,
        changed = output.metrics.changed_methods_total,
        uncovered = output.metrics.uncovered_methods,
        unresolved = output.metrics.unresolved_methods,
        "evaluated test gap"
    );

    let ended_at = clock.now();
    let reasons = build_reasons(&output);
    let counts = count_findings(&output.findings);

    let report = Report {
        schema: SCHEMA_ID.to_string(),
        tool: Tool::default(),
        run: build_run(started_at, ended_at),
        verdict: Verdict {
            status: output.verdict,
            counts,
            reasons,
        },
        data: ReportData {
            changed_methods_total: output.metrics.changed_methods_total,
            covered_methods: output.metrics.covered_methods,
            uncovered_methods: output.metrics.uncovered_methods,
            empty_methods: output.metrics.empty_methods,
            unresolved_methods: output.metrics.unresolved_methods,
            ambiguous_methods: output.metrics.ambiguous_methods,
            excluded_files_count,
            skipped_accessors_count: skipped_accessors as u32,
            test_gap_ratio: output.metrics.test_gap_ratio,
            max_test_gap_pct: request.max_test_gap_pct,
            inputs: build_inputs(&request, Some(&changes)),
            methods: method_sets,
        },
        findings: output.findings,
    };

    let exit_code = match report.verdict.status {
        VerdictStatus::Pass | VerdictStatus::Warn => 0,
        VerdictStatus::Fail => 2,
    };

    Ok(CheckResult {
        markdown: render_markdown(&report, DEFAULT_MAX_ROWS),
        annotations: render_annotations(&report, DEFAULT_MAX_ANNOTATIONS),
        report,
        exit_code,
    })
}

fn scan<F>(
    scanner: &ChangeScanner,
    comparison: &Comparison,
    filter: F,
) -> Result<GitChangeSet, GitError>
where
    F: Fn(&str) -> bool,
{
    match comparison {
        Comparison::WorkingTree => scanner.compare_working_tree_with_head(filter),
        Comparison::Revision(expression) => {
            let previous = if expression == WORKING_TREE {
                RepoState::WorkingTree
            } else {
                scanner.resolve(expression)?
            };
            scanner.compare_head_with_repo_state(&previous, filter)
        }
        Comparison::PreviousTag(pattern) => {
            scanner.compare_head_with_previous(RefKind::Tag, pattern, filter)
        }
        Comparison::PreviousBranch(pattern) => {
            scanner.compare_head_with_previous(RefKind::Branch, pattern, filter)
        }
    }
}

/// Errors caused by the requested previous state rather than the
/// repository itself.
fn is_reference_error(error: &GitError) -> bool {
    matches!(
        error,
        GitError::UnresolvableReference { .. }
            | GitError::NoMatchingReference { .. }
            | GitError::InvalidPattern { .. }
            | GitError::WorkingTreeNotComparable
    )
}

// ============================================================================
// Report Building
// ============================================================================

fn build_run(
    started_at: chrono::DateTime<chrono::Utc>,
    ended_at: chrono::DateTime<chrono::Utc>,
) -> Run {
    Run {
        started_at: started_at.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        ended_at: Some(ended_at.format("%Y-%m-%dT%H:%M:%SZ").to_string()),
        duration_ms: Some((ended_at - started_at).num_milliseconds().max(0) as u64),
    }
}

fn build_inputs(request: &CheckRequest, changes: Option<&GitChangeSet>) -> Inputs {
    let (previous, current) = match changes {
        Some(changes) => (
            changes.previous.as_str().to_string(),
            changes.current.as_str().to_string(),
        ),
        None => {
            let current = match request.comparison {
                Comparison::WorkingTree => WORKING_TREE.to_string(),
                _ => String::new(),
            };
            (String::new(), current)
        }
    };
    Inputs {
        previous,
        current,
        previous_expression: request.previous_expression(),
        coverage_paths: request.coverage_paths.clone(),
    }
}

fn count_findings(findings: &[Finding]) -> VerdictCounts {
    let count = |severity: Severity| findings.iter().filter(|f| f.severity == severity).count() as u32;
    VerdictCounts {
        info: count(Severity::Info),
        warn: count(Severity::Warn),
        error: count(Severity::Error),
    }
}

fn invalid_source<E: std::fmt::Display, C: Clock>(
    request: &CheckRequest,
    changes: &GitChangeSet,
    path: &str,
    error: &E,
    started_at: chrono::DateTime<chrono::Utc>,
    clock: &C,
) -> CheckResult {
    warn!(path, error = %error, "unparsable source file");
    build_error_result(
        request,
        started_at,
        CODE_INVALID_SOURCE,
        &format!("Failed to parse {}: {}", path, error),
        Some(path),
        Some(changes),
        clock,
    )
}

/// Build an error result for invalid input.
fn build_error_result<C: Clock>(
    request: &CheckRequest,
    started_at: chrono::DateTime<chrono::Utc>,
    code: &str,
    message: &str,
    path: Option<&str>,
    changes: Option<&GitChangeSet>,
    clock: &C,
) -> CheckResult {
    let ended_at = clock.now();
    let report = build_error_report(request, started_at, ended_at, code, message, path, changes);
    let markdown = render_markdown(&report, DEFAULT_MAX_ROWS);
    let annotations = render_annotations(&report, DEFAULT_MAX_ANNOTATIONS);

    CheckResult {
        report,
        markdown,
        annotations,
        exit_code: 1,
    }
}

fn build_error_report(
    request: &CheckRequest,
    started_at: chrono::DateTime<chrono::Utc>,
    ended_at: chrono::DateTime<chrono::Utc>,
    code: &str,
    message: &str,
    path: Option<&str>,
    changes: Option<&GitChangeSet>,
) -> Report {
    let input_fp = compute_fingerprint(&[code, path.unwrap_or(""), "testgap"]);
    let runtime_fp = compute_fingerprint(&[CODE_RUNTIME_ERROR, "testgap"]);

    let findings = vec![
        Finding {
            severity: Severity::Error,
            code: code.to_string(),
            message: message.to_string(),
            location: path.map(|p| Location {
                path: p.to_string(),
                line: None,
                col: None,
            }),
            data: None,
            fingerprint: Some(input_fp),
        },
        Finding {
            severity: Severity::Error,
            code: CODE_RUNTIME_ERROR.to_string(),
            message: "testgap failed due to a runtime error.".to_string(),
            location: None,
            data: None,
            fingerprint: Some(runtime_fp),
        },
    ];

    Report {
        schema: SCHEMA_ID.to_string(),
        tool: Tool::default(),
        run: build_run(started_at, ended_at),
        verdict: Verdict {
            status: VerdictStatus::Fail,
            counts: VerdictCounts {
                info: 0,
                warn: 0,
                error: findings.len() as u32,
            },
            reasons: vec![REASON_TOOL_ERROR.to_string()],
        },
        findings,
        data: ReportData {
            max_test_gap_pct: request.max_test_gap_pct,
            inputs: build_inputs(request, changes),
            ..Default::default()
        },
    }
}

/// Build verdict reasons based on evaluation output.
fn build_reasons(output: &EvalOutput) -> Vec<String> {
    let mut reasons = Vec::new();

    if output.metrics.changed_methods_total == 0 {
        reasons.push(REASON_NO_CHANGED_METHODS.to_string());
        return reasons;
    }

    if output.metrics.uncovered_methods > 0 {
        reasons.push(REASON_UNCOVERED_METHODS.to_string());
    }
    if output
        .findings
        .iter()
        .any(|f| f.code == CODE_UNRESOLVED_METHOD || f.code == CODE_AMBIGUOUS_METHOD)
    {
        reasons.push(REASON_UNRESOLVED_METHODS.to_string());
    }
    if output
        .findings
        .iter()
        .any(|f| f.code == CODE_GAP_ABOVE_THRESHOLD)
    {
        reasons.push(REASON_GAP_ABOVE_THRESHOLD.to_string());
    }
    if reasons.is_empty() {
        reasons.push(REASON_METHODS_COVERED.to_string());
    }

    reasons
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use git2::{IndexAddOption, Repository, Signature, Time};
    use std::path::Path;
    use tempfile::TempDir;
    use testgap_types::CODE_UNCOVERED_METHOD;

    const CART: &str = include_str!("../../../fixtures/java/Cart.java");
    const COVERED_XML: &str = include_str!("../../../fixtures/jacoco/covered.xml");
    const UNCOVERED_XML: &str = include_str!("../../../fixtures/jacoco/uncovered.xml");
    const MALFORMED_XML: &str = include_str!("../../../fixtures/jacoco/malformed.xml");

    const CART_PATH: &str = "src/main/java/com/acme/shop/Cart.java";

    /// A test clock that returns a fixed time.
    struct FixedClock {
        time: chrono::DateTime<chrono::Utc>,
    }

    impl FixedClock {
        fn new(timestamp: &str) -> Self {
            Self {
                time: chrono::DateTime::parse_from_rfc3339(timestamp)
                    .unwrap()
                    .with_timezone(&chrono::Utc),
            }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> chrono::DateTime<chrono::Utc> {
            self.time
        }
    }

    struct Repo {
        dir: TempDir,
        repo: Repository,
    }

    impl Repo {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let repo = Repository::init(dir.path()).unwrap();
            let repo = Self { dir, repo };
            repo.write("README.md", "shop\n");
            repo.commit("initial", 1_700_000_000);
            repo
        }

        fn path(&self) -> &Path {
            self.dir.path()
        }

        fn write(&self, path: &str, content: &str) {
            let full = self.dir.path().join(path);
            std::fs::create_dir_all(full.parent().unwrap()).unwrap();
            std::fs::write(full, content).unwrap();
        }

        fn commit(&self, message: &str, time: i64) -> String {
            let mut index = self.repo.index().unwrap();
            index
                .add_all(["*"].iter(), IndexAddOption::DEFAULT, None)
                .unwrap();
            index.write().unwrap();
            let tree = self.repo.find_tree(index.write_tree().unwrap()).unwrap();
            let sig = Signature::new("dev", "dev@example.com", &Time::new(time, 0)).unwrap();
            let parents = match self.repo.head() {
                Ok(head) => vec![head.peel_to_commit().unwrap()],
                Err(_) => Vec::new(),
            };
            let parent_refs: Vec<_> = parents.iter().collect();
            self.repo
                .commit(Some("HEAD"), &sig, &sig, message, &tree, &parent_refs)
                .unwrap()
                .to_string()
        }

        fn tag(&self, name: &str) {
            let head = self.repo.head().unwrap().peel_to_commit().unwrap();
            self.repo
                .tag_lightweight(name, head.as_object(), false)
                .unwrap();
        }
    }

    fn request(repo: &Repo, comparison: Comparison, xml: &str) -> CheckRequest {
        CheckRequest {
            root: repo.path().to_path_buf(),
            comparison,
            coverage_texts: vec![xml.to_string()],
            coverage_paths: vec!["target/site/jacoco/jacoco.xml".to_string()],
            ..Default::default()
        }
    }

    fn clock() -> FixedClock {
        FixedClock::new("2026-02-02T00:00:00Z")
    }

    // ========================================================================
    // End-to-end tests with fixtures
    // ========================================================================

    #[test]
    fn test_e2e_new_file_covered() {
        let repo = Repo::new();
        repo.write(CART_PATH, CART);

        let result = check_with_clock(request(&repo, Comparison::WorkingTree, COVERED_XML), &clock()).unwrap();

        assert_eq!(result.report.schema, SCHEMA_ID);
        assert_eq!(result.report.verdict.status, VerdictStatus::Pass);
        assert_eq!(result.report.verdict.reasons, vec![REASON_METHODS_COVERED]);
        assert_eq!(result.report.data.changed_methods_total, 5);
        assert_eq!(result.report.data.covered_methods, 5);
        assert_eq!(result.report.data.uncovered_methods, 0);
        assert_eq!(result.report.data.skipped_accessors_count, 1);
        assert_eq!(result.report.data.test_gap_ratio, 0.0);
        assert_eq!(result.report.data.inputs.current, WORKING_TREE);
        assert!(result.report.findings.is_empty());
        assert_eq!(result.exit_code, 0);
        assert!(result.markdown.contains("testgap"));
        assert!(result.annotations.is_empty());
    }

    #[test]
    fn test_e2e_new_file_uncovered() {
        let repo = Repo::new();
        repo.write(CART_PATH, CART);

        let result = check_with_clock(request(&repo, Comparison::WorkingTree, UNCOVERED_XML), &clock()).unwrap();

        assert_eq!(result.report.verdict.status, VerdictStatus::Fail);
        assert_eq!(result.report.data.uncovered_methods, 5);
        assert_eq!(result.report.data.test_gap_ratio, 1.0);
        assert!(
            result
                .report
                .verdict
                .reasons
                .contains(&REASON_UNCOVERED_METHODS.to_string())
        );
        let uncovered = result
            .report
            .findings
            .iter()
            .filter(|f| f.code == CODE_UNCOVERED_METHOD)
            .count();
        assert_eq!(uncovered, 5);
        assert_eq!(result.exit_code, 2);
        assert!(result.annotations.contains("::error file=src/main/java/com/acme/shop/Cart.java"));
    }

    #[test]
    fn test_e2e_include_accessors() {
        let repo = Repo::new();
        repo.write(CART_PATH, CART);

        let mut req = request(&repo, Comparison::WorkingTree, COVERED_XML);
        req.include_accessors = true;
        let result = check_with_clock(req, &clock()).unwrap();

        assert_eq!(result.report.data.changed_methods_total, 6);
        assert_eq!(result.report.data.skipped_accessors_count, 0);
        // getItems has no counter in the fixture.
        assert_eq!(result.report.data.unresolved_methods, 1);
        assert_eq!(result.report.verdict.status, VerdictStatus::Warn);
        assert_eq!(result.exit_code, 0);
    }

    #[test]
    fn test_e2e_unchanged_methods_are_ignored() {
        let repo = Repo::new();
        repo.write(CART_PATH, CART);
        repo.commit("add cart", 1_700_000_100);

        // Whitespace only: every method keeps its identity.
        let shifted = CART.replace("import java.util.List;\n", "import java.util.List;\n\n\n");
        repo.write(CART_PATH, &shifted);

        let result = check_with_clock(request(&repo, Comparison::WorkingTree, UNCOVERED_XML), &clock()).unwrap();

        assert_eq!(result.report.data.changed_methods_total, 0);
        assert_eq!(result.report.verdict.status, VerdictStatus::Pass);
        assert_eq!(result.report.verdict.reasons, vec![REASON_NO_CHANGED_METHODS]);
    }

    #[test]
    fn test_e2e_changed_method_only() {
        let repo = Repo::new();
        repo.write(CART_PATH, CART);
        repo.commit("add cart", 1_700_000_100);

        let edited = CART.replace(
            "        items.add(new Item(name, price));",
            "        items.add(new Item(name.trim(), price));",
        );
        repo.write(CART_PATH, &edited);
        repo.commit("trim names", 1_700_000_200);

        let result = check_with_clock(
            request(&repo, Comparison::Revision("HEAD~1".to_string()), UNCOVERED_XML),
            &clock(),
        )
        .unwrap();

        assert_eq!(result.report.data.changed_methods_total, 1);
        assert_eq!(result.report.data.methods.uncovered.len(), 1);
        assert_eq!(result.report.data.methods.uncovered[0].name, "add");
        assert_eq!(
            result.report.data.inputs.previous_expression.as_deref(),
            Some("HEAD~1")
        );
        assert_ne!(result.report.data.inputs.current, WORKING_TREE);
        assert_eq!(result.exit_code, 2);
    }

    #[test]
    fn test_e2e_previous_tag() {
        let repo = Repo::new();
        repo.tag("v1.0.0");
        repo.write(CART_PATH, CART);
        repo.commit("add cart", 1_700_000_100);

        let result = check_with_clock(
            request(&repo, Comparison::PreviousTag(r"v\d+\.\d+\.\d+".to_string()), COVERED_XML),
            &clock(),
        )
        .unwrap();

        assert_eq!(result.report.data.changed_methods_total, 5);
        assert_eq!(result.report.verdict.status, VerdictStatus::Pass);
        assert_eq!(result.report.data.inputs.previous_expression, None);
    }

    #[test]
    fn test_e2e_test_sources_and_excludes_are_skipped() {
        let repo = Repo::new();
        repo.write(CART_PATH, CART);
        repo.write(
            "src/test/java/com/acme/shop/CartTest.java",
            "package com.acme.shop;\nclass CartTest { void run() { new Cart(); } }\n",
        );
        repo.write(
            "generated/Gen.java",
            "class Gen { void run() { go(); } }\n",
        );

        let mut req = request(&repo, Comparison::WorkingTree, COVERED_XML);
        req.exclude_patterns = vec!["generated/**".to_string()];
        let result = check_with_clock(req, &clock()).unwrap();

        assert_eq!(result.report.data.changed_methods_total, 5);
        assert_eq!(result.report.data.excluded_files_count, 2);
    }

    #[test]
    fn test_timestamps_come_from_clock() {
        let repo = Repo::new();
        let result = check_with_clock(request(&repo, Comparison::WorkingTree, COVERED_XML), &clock()).unwrap();

        assert_eq!(result.report.run.started_at, "2026-02-02T00:00:00Z");
        assert_eq!(result.report.run.ended_at.as_deref(), Some("2026-02-02T00:00:00Z"));
        assert_eq!(result.report.run.duration_ms, Some(0));
    }

    // ========================================================================
    // Error reports
    // ========================================================================

    #[test]
    fn test_malformed_jacoco_is_error_report() {
        let repo = Repo::new();
        let result = check_with_clock(request(&repo, Comparison::WorkingTree, MALFORMED_XML), &clock()).unwrap();

        assert_eq!(result.exit_code, 1);
        assert_eq!(result.report.verdict.status, VerdictStatus::Fail);
        assert_eq!(result.report.verdict.reasons, vec![REASON_TOOL_ERROR]);
        assert_eq!(result.report.findings[0].code, CODE_INVALID_JACOCO);
        assert!(
            result.report.findings[0]
                .message
                .contains("target/site/jacoco/jacoco.xml")
        );
        assert_eq!(result.report.findings[1].code, CODE_RUNTIME_ERROR);
    }

    #[test]
    fn test_missing_coverage_is_error_report() {
        let repo = Repo::new();
        let mut req = request(&repo, Comparison::WorkingTree, COVERED_XML);
        req.coverage_texts.clear();
        let result = check_with_clock(req, &clock()).unwrap();

        assert_eq!(result.exit_code, 1);
        assert_eq!(result.report.findings[0].code, CODE_INVALID_JACOCO);
    }

    #[test]
    fn test_unparsable_source_is_error_report() {
        let repo = Repo::new();
        repo.write("src/main/java/Broken.java", "class Broken { void f( { }\n");

        let result = check_with_clock(request(&repo, Comparison::WorkingTree, COVERED_XML), &clock()).unwrap();

        assert_eq!(result.exit_code, 1);
        assert_eq!(result.report.findings[0].code, CODE_INVALID_SOURCE);
        assert_eq!(
            result.report.findings[0].location.as_ref().map(|l| l.path.as_str()),
            Some("src/main/java/Broken.java")
        );
        assert_eq!(result.report.data.inputs.current, WORKING_TREE);
    }

    #[test]
    fn test_unknown_revision_is_error_report() {
        let repo = Repo::new();
        let result = check_with_clock(
            request(&repo, Comparison::Revision("no-such-branch".to_string()), COVERED_XML),
            &clock(),
        )
        .unwrap();

        assert_eq!(result.exit_code, 1);
        assert_eq!(result.report.findings[0].code, CODE_UNRESOLVABLE_REFERENCE);
        assert_eq!(
            result.report.data.inputs.previous_expression.as_deref(),
            Some("no-such-branch")
        );
    }

    #[test]
    fn test_unmatched_tag_pattern_is_error_report() {
        let repo = Repo::new();
        let result = check_with_clock(
            request(&repo, Comparison::PreviousTag("release-.*".to_string()), COVERED_XML),
            &clock(),
        )
        .unwrap();

        assert_eq!(result.exit_code, 1);
        assert_eq!(result.report.findings[0].code, CODE_UNRESOLVABLE_REFERENCE);
    }

    #[test]
    fn test_working_tree_as_previous_is_error_report() {
        let repo = Repo::new();
        let result = check_with_clock(
            request(&repo, Comparison::Revision(WORKING_TREE.to_string()), COVERED_XML),
            &clock(),
        )
        .unwrap();

        assert_eq!(result.exit_code, 1);
        assert_eq!(result.report.findings[0].code, CODE_UNRESOLVABLE_REFERENCE);
    }

    #[test]
    fn test_outside_repository_is_app_error() {
        let dir = tempfile::tempdir().unwrap();
        let req = CheckRequest {
            root: dir.path().to_path_buf(),
            coverage_texts: vec![COVERED_XML.to_string()],
            ..Default::default()
        };
        let err = check_with_clock(req, &clock()).unwrap_err();
        assert!(matches!(err, AppError::Git(_)));
    }

    // ========================================================================
    // Reasons
    // ========================================================================

    fn output(changed: u32, uncovered: u32, codes: &[&str]) -> EvalOutput {
        EvalOutput {
            findings: codes
                .iter()
                .map(|code| Finding {
                    severity: Severity::Error,
                    code: code.to_string(),
                    message: String::new(),
                    location: None,
                    data: None,
                    fingerprint: None,
                })
                .collect(),
            verdict: VerdictStatus::Fail,
            metrics: testgap_domain::Metrics {
                changed_methods_total: changed,
                uncovered_methods: uncovered,
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_build_reasons_no_changes() {
        assert_eq!(build_reasons(&output(0, 0, &[])), vec![REASON_NO_CHANGED_METHODS]);
    }

    #[test]
    fn test_build_reasons_combined() {
        let reasons = build_reasons(&output(
            3,
            2,
            &[CODE_UNCOVERED_METHOD, CODE_AMBIGUOUS_METHOD, CODE_GAP_ABOVE_THRESHOLD],
        ));
        assert_eq!(
            reasons,
            vec![
                REASON_UNCOVERED_METHODS,
                REASON_UNRESOLVED_METHODS,
                REASON_GAP_ABOVE_THRESHOLD
            ]
        );
    }

    #[test]
    fn test_build_reasons_all_covered() {
        assert_eq!(build_reasons(&output(2, 0, &[])), vec![REASON_METHODS_COVERED]);
    }

    #[test]
    fn test_request_accepts_path() {
        let req = CheckRequest {
            include_patterns: vec!["src/**".to_string()],
            ..Default::default()
        };
        assert!(req.accepts_path("src/main/java/A.java"));
        assert!(!req.accepts_path("src/test/java/ATest.java"));
        assert!(!req.accepts_path("src/main/java/ATest.java"));
        assert!(!req.accepts_path("lib/B.java"));
        assert!(!req.accepts_path("src/main/resources/a.xml"));
    }
}
