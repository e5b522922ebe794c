//! Normalization of source-level argument types to compiled simple names.

use std::collections::BTreeMap;

use crate::{MethodKind, ParsedMethod};

/// Upper bound on type-parameter substitutions, guarding cyclic bounds
/// such as `<A extends B, B extends A>`.
const MAX_ERASURE_DEPTH: usize = 8;

/// Normalize one declared argument type.
///
/// Annotations and generic arguments are dropped, qualified names reduce to
/// their simple name, varargs become one array dimension and type
/// parameters are replaced by their erasure bound.
///
/// ```
/// use std::collections::BTreeMap;
/// use testgap_domain::normalize_type;
///
/// let mut params = BTreeMap::new();
/// params.insert("T".to_string(), "Comparable<T>".to_string());
/// assert_eq!(normalize_type("java.util.Map<String, T>", &params), "Map");
/// assert_eq!(normalize_type("T...", &params), "Comparable[]");
/// ```
pub fn normalize_type(raw: &str, type_parameters: &BTreeMap<String, String>) -> String {
    normalize_with_depth(raw, type_parameters, 0)
}

fn normalize_with_depth(
    raw: &str,
    type_parameters: &BTreeMap<String, String>,
    depth: usize,
) -> String {
    let text = strip_generics(&strip_annotations(raw));
    let mut text: String = text.chars().filter(|c| !c.is_whitespace()).collect();

    let mut dims = 0usize;
    loop {
        if let Some(rest) = text.strip_suffix("...") {
            text = rest.to_string();
            dims += 1;
        } else if let Some(rest) = text.strip_suffix("[]") {
            text = rest.to_string();
            dims += 1;
        } else {
            break;
        }
    }

    let simple = text.rsplit_once('.').map_or(text.as_str(), |(_, s)| s);
    let base = match type_parameters.get(simple) {
        Some(bound) if depth < MAX_ERASURE_DEPTH => {
            normalize_with_depth(bound, type_parameters, depth + 1)
        }
        Some(_) => "Object".to_string(),
        None => simple.to_string(),
    };

    format!("{}{}", base, "[]".repeat(dims))
}

/// Remove `@Annotation` and `@Annotation(...)` tokens.
fn strip_annotations(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '@' {
            out.push(c);
            continue;
        }
        while let Some(&next) = chars.peek() {
            if next.is_alphanumeric() || next == '_' || next == '.' || next == '$' {
                chars.next();
            } else {
                break;
            }
        }
        while chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
        }
        if chars.peek() == Some(&'(') {
            let mut depth = 0usize;
            for inner in chars.by_ref() {
                match inner {
                    '(' => depth += 1,
                    ')' => {
                        depth -= 1;
                        if depth == 0 {
                            break;
                        }
                    }
                    _ => {}
                }
            }
        }
    }

    out
}

/// Remove every `<...>` section, including nested ones.
fn strip_generics(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut depth = 0usize;
    for c in raw.chars() {
        match c {
            '<' => depth += 1,
            '>' => depth = depth.saturating_sub(1),
            _ if depth == 0 => out.push(c),
            _ => {}
        }
    }
    out
}

/// The argument list the compiler emits for a constructor.
///
/// Enum constructors gain leading `(String, int)`; inner-class constructors
/// gain the outer type. Other kinds return their normalized declared list.
pub fn expected_compiled_arguments(method: &ParsedMethod) -> Vec<String> {
    let mut args = Vec::with_capacity(method.argument_types.len() + 2);
    match method.kind {
        MethodKind::EnumConstructor => {
            args.push("String".to_string());
            args.push("int".to_string());
        }
        MethodKind::InnerClassConstructor => {
            if let Some(outer) = &method.outer_type {
                args.push(normalize_type(outer, &BTreeMap::new()));
            }
        }
        _ => {}
    }
    args.extend(
        method
            .argument_types
            .iter()
            .map(|arg| normalize_type(arg, &method.type_parameters)),
    );
    args
}

// ============================================================================
// Tests
// ============================================================================
