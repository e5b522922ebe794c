//! Extraction of the relevant code of a method body.
//!
//! Comments and nested declarations are blanked out byte by byte so the
//! remaining text keeps its line structure.

use std::ops::Range;

use tree_sitter::Node;

/// Node kinds blanked out in full.
const MASKED_KINDS: &[&str] = &[
    "line_comment",
    "block_comment",
    "class_body",
    "class_declaration",
    "interface_declaration",
    "enum_declaration",
    "record_declaration",
    "annotation_type_declaration",
];

/// Relevant code of one body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RelevantCode {
    /// 1-indexed lines that still carry code.
    pub lines: Vec<u32>,
    /// Whitespace-collapsed text.
    pub text: String,
}

/// Compute the relevant code of `body`.
///
/// Block bodies contribute the text between their braces; expression
/// bodies (lambdas) contribute the whole expression.
pub(crate) fn relevant_code(body: Node<'_>, source: &str) -> RelevantCode {
    let (region, first_row) = interior(body);

    let mut masks = Vec::new();
    collect_masks(body, &mut masks);

    let mut bytes: Vec<u8> = source.as_bytes().get(region.clone()).unwrap_or_default().to_vec();
    for mask in masks {
        let start = mask.start.max(region.start) - region.start;
        let end = mask.end.min(region.end).saturating_sub(region.start);
        for byte in bytes.iter_mut().take(end).skip(start) {
            if *byte != b'\n' {
                *byte = b' ';
            }
        }
    }
    let masked = String::from_utf8_lossy(&bytes);

    let lines = masked
        .split('\n')
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, _)| first_row + idx as u32 + 1)
        .collect();
    let text = masked.split_whitespace().collect::<Vec<_>>().join(" ");

    RelevantCode { lines, text }
}

/// Byte range of the body interior and its 0-indexed starting row.
fn interior(body: Node<'_>) -> (Range<usize>, u32) {
    let range = body.byte_range();
    let row = body.start_position().row as u32;
    if matches!(body.kind(), "block" | "constructor_body") && range.len() >= 2 {
        (range.start + 1..range.end - 1, row)
    } else {
        (range, row)
    }
}

fn collect_masks(node: Node<'_>, masks: &mut Vec<Range<usize>>) {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if MASKED_KINDS.contains(&child.kind()) {
            masks.push(child.byte_range());
        } else if child.kind() == "lambda_expression" {
            if let Some(body) = child.child_by_field_name("body") {
                masks.push(body.byte_range());
            }
            if let Some(params) = child.child_by_field_name("parameters") {
                collect_masks(params, masks);
            }
        } else {
            collect_masks(child, masks);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
