//! Rendering utilities for testgap reports.
//!
//! This crate provides renderers that convert a `Report` into:
//! - Markdown for PR comments
//! - GitHub workflow annotation commands
//!
//! # Example
//!
//! ```rust
//! use testgap_render::{render_annotations, render_markdown};
//! use testgap_types::Report;
//!
//! let report = Report::default();
//! let markdown = render_markdown(&report, 10);
//! let annotations = render_annotations(&report, 25);
//! assert!(markdown.starts_with("## testgap"));
//! assert!(annotations.is_empty());
//! ```

use testgap_types::{MethodRef, Report, Severity, VerdictStatus};

/// Default maximum number of methods to show per markdown table.
pub const DEFAULT_MAX_ROWS: usize = 10;

/// Default maximum number of GitHub annotations to emit.
pub const DEFAULT_MAX_ANNOTATIONS: usize = 25;

/// Returns an emoji representing the verdict status.
///
/// # Examples
///
/// ```rust
/// use testgap_render::status_emoji;
/// use testgap_types::VerdictStatus;
///
/// assert_eq!(status_emoji(&VerdictStatus::Pass), "\u{2705}");
/// assert_eq!(status_emoji(&VerdictStatus::Fail), "\u{274C}");
/// ```
pub fn status_emoji(status: &VerdictStatus) -> &'static str {
    match status {
        VerdictStatus::Pass => "\u{2705}",
        VerdictStatus::Warn => "\u{26A0}\u{FE0F}",
        VerdictStatus::Fail => "\u{274C}",
    }
}

fn status_label(status: &VerdictStatus) -> &'static str {
    match status {
        VerdictStatus::Pass => "pass",
        VerdictStatus::Warn => "warn",
        VerdictStatus::Fail => "fail",
    }
}

/// Renders the report as a Markdown comment for pull requests.
///
/// Uncovered and unresolved methods are listed in tables of at most
/// `max_rows` rows each.
///
/// # Example Output
///
/// ```markdown
/// ## testgap: Test Gap Report
///
/// **Status**: [emoji] [status]
///
/// ### Summary
/// - **Test gap**: X.X%
/// - **New or changed methods**: N
/// - **Covered**: N
/// - **Uncovered**: N
/// - **Empty**: N
/// - **Unresolved**: N
///
/// ### Uncovered Methods
///
/// | File | Line | Method | Kind |
/// |------|------|--------|------|
/// | src/A.java | 3 | A.run() | instance_method |
/// ```
pub fn render_markdown(report: &Report, max_rows: usize) -> String {
    let mut output = String::new();

    output.push_str("## testgap: Test Gap Report\n\n");

    let emoji = status_emoji(&report.verdict.status);
    let label = status_label(&report.verdict.status);
    output.push_str(&format!("**Status**: {} {}\n\n", emoji, label));

    let data = &report.data;
    output.push_str("### Summary\n");
    output.push_str(&format!(
        "- **Test gap**: {:.1}%\n",
        data.test_gap_ratio * 100.0
    ));
    output.push_str(&format!(
        "- **New or changed methods**: {}\n",
        data.changed_methods_total
    ));
    output.push_str(&format!("- **Covered**: {}\n", data.covered_methods));
    output.push_str(&format!("- **Uncovered**: {}\n", data.uncovered_methods));
    output.push_str(&format!("- **Empty**: {}\n", data.empty_methods));
    output.push_str(&format!("- **Unresolved**: {}\n", data.unresolved_methods));
    if data.ambiguous_methods > 0 {
        output.push_str(&format!("- **Ambiguous**: {}\n", data.ambiguous_methods));
    }
    if data.skipped_accessors_count > 0 {
        output.push_str(&format!(
            "- **Skipped accessors**: {}\n",
            data.skipped_accessors_count
        ));
    }

    push_method_table(
        &mut output,
        "Uncovered Methods",
        &data.methods.uncovered,
        max_rows,
    );
    push_method_table(
        &mut output,
        "Unresolved Methods",
        &data.methods.unresolvable,
        max_rows,
    );

    output.push_str("\n<details>\n");
    output.push_str("<summary>Reproduce locally</summary>\n\n");
    output.push_str("```bash\n");

    let inputs = &data.inputs;
    let mut cmd_parts = vec!["testgap check".to_string()];
    if inputs.current == "WORKING_TREE" {
        cmd_parts.push("--working-tree".to_string());
    } else {
        let base = inputs
            .previous_expression
            .clone()
            .filter(|expr| !expr.is_empty())
            .unwrap_or_else(|| inputs.previous.clone());
        if base.is_empty() {
            cmd_parts.push("--base <rev>".to_string());
        } else {
            cmd_parts.push(format!("--base {}", base));
        }
    }
    if inputs.coverage_paths.is_empty() {
        cmd_parts.push("--jacoco <jacoco.xml>".to_string());
    } else {
        for path in &inputs.coverage_paths {
            cmd_parts.push(format!("--jacoco {}", path));
        }
    }

    output.push_str(&cmd_parts.join(" \\\n  "));
    output.push_str("\n```\n\n");
    output.push_str("</details>\n");

    output
}

fn push_method_table(output: &mut String, title: &str, methods: &[MethodRef], max_rows: usize) {
    if methods.is_empty() {
        return;
    }

    output.push_str(&format!("\n### {}\n\n", title));
    output.push_str("| File | Line | Method | Kind |\n");
    output.push_str("|------|------|--------|------|\n");

    for method in methods.iter().take(max_rows) {
        let line = method
            .line
            .map(|l| l.to_string())
            .unwrap_or_else(|| "-".to_string());
        output.push_str(&format!(
            "| {} | {} | {}({}) | {} |\n",
            method.path,
            line,
            method.name,
            method.signature.replace(',', ", "),
            method.kind
        ));
    }

    if methods.len() > max_rows {
        output.push('\n');
        output.push_str(&format!(
            "*Showing {} of {} methods*\n",
            max_rows.min(methods.len()),
            methods.len()
        ));
    }
}

/// Renders the report as GitHub workflow annotation commands.
///
/// Findings without a location are skipped.
///
/// # Example Output
///
/// ```text
/// ::error file=src/A.java,line=3,col=5::New or changed method `A.run` is not covered by any test.
/// ```
pub fn render_annotations(report: &Report, max_annotations: usize) -> String {
    let mut output = String::new();

    for finding in report
        .findings
        .iter()
        .filter(|f| f.location.is_some())
        .take(max_annotations)
    {
        if let Some(location) = &finding.location {
            let level = match finding.severity {
                Severity::Error => "error",
                Severity::Warn => "warning",
                Severity::Info => "notice",
            };

            let mut params = vec![format!("file={}", location.path)];
            if let Some(line) = location.line {
                params.push(format!("line={}", line));
            }
            if let Some(col) = location.col {
                params.push(format!("col={}", col));
            }

            output.push_str(&format!(
                "::{} {}::{}\n",
                level,
                params.join(","),
                escape_annotation(&finding.message)
            ));
        }
    }

    output
}

/// Escape the characters GitHub treats specially in command messages.
fn escape_annotation(message: &str) -> String {
    message
        .replace('%', "%25")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}

// ============================================================================
// Tests
// ============================================================================
