//! Java source parser for testgap.
//!
//! This crate walks a tree-sitter-java syntax tree and produces one
//! [`ParsedMethod`] for every method-like declaration that carries code:
//! methods and constructors with a body, compact record constructors,
//! instance and static initializer blocks, and lambda expressions. Nested
//! named, local, anonymous and enum-constant classes are walked as well.

mod body;

use std::collections::BTreeMap;

use thiserror::Error;
use tracing::debug;
use tree_sitter::{Node, Parser};

use testgap_domain::{MethodKind, ParsedMethod, ScopeSegment};
use testgap_ports::SourceParser;

use body::relevant_code;

// ============================================================================
// Errors
// ============================================================================

/// Errors that can occur while parsing Java sources.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum JavaParseError {
    /// The source contains syntax tree-sitter could not parse cleanly.
    #[error("Syntax error in {path} at line {line}")]
    Syntax { path: String, line: u32 },

    /// The Java grammar could not be loaded.
    #[error("Failed to load Java grammar: {0}")]
    Language(String),

    /// tree-sitter returned no tree.
    #[error("Failed to parse {path}")]
    NoTree { path: String },
}

// ============================================================================
// Parser
// ============================================================================

/// [`SourceParser`] for `.java` files.
#[derive(Debug, Clone, Copy, Default)]
pub struct JavaParser;

impl SourceParser for JavaParser {
    type Error = JavaParseError;

    fn parse(&self, path: &str, source: &str) -> Result<Vec<ParsedMethod>, Self::Error> {
        parse_java(path, source)
    }

    fn accepts(&self, path: &str) -> bool {
        path.ends_with(".java")
    }
}

/// Parse one Java compilation unit into its method declarations.
///
/// Methods are returned in source order.
///
/// # Examples
///
/// ```
/// use testgap_adapters_java::parse_java;
///
/// let source = "package a;\nclass A {\n  int f(int x) {\n    return x;\n  }\n}\n";
/// let methods = parse_java("src/a/A.java", source).unwrap();
///
/// assert_eq!(methods.len(), 1);
/// assert_eq!(methods[0].top_level_type, "a.A");
/// assert_eq!(methods[0].lines, vec![4]);
/// ```
pub fn parse_java(path: &str, source: &str) -> Result<Vec<ParsedMethod>, JavaParseError> {
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_java::LANGUAGE.into())
        .map_err(|e| JavaParseError::Language(e.to_string()))?;
    let tree = parser
        .parse(source, None)
        .ok_or_else(|| JavaParseError::NoTree {
            path: path.to_string(),
        })?;

    let root = tree.root_node();
    if root.has_error() {
        let line = first_error_line(root).unwrap_or(1);
        return Err(JavaParseError::Syntax {
            path: path.to_string(),
            line,
        });
    }

    let mut walker = Walker {
        path,
        source,
        package: package_name(root, source),
        methods: Vec::new(),
    };
    walker.visit(root, &Context::default());

    debug!(path = %path, methods = walker.methods.len(), "parsed Java source");
    Ok(walker.methods)
}

fn first_error_line(node: Node<'_>) -> Option<u32> {
    if node.is_error() || node.is_missing() {
        return Some(node.start_position().row as u32 + 1);
    }
    let mut cursor = node.walk();
    let children: Vec<_> = node.children(&mut cursor).collect();
    children
        .into_iter()
        .filter(|child| child.has_error())
        .find_map(first_error_line)
}

fn package_name(root: Node<'_>, source: &str) -> Option<String> {
    let mut cursor = root.walk();
    let package = root
        .children(&mut cursor)
        .find(|child| child.kind() == "package_declaration")?;
    let mut cursor = package.walk();
    let name = package
        .named_children(&mut cursor)
        .find(|child| matches!(child.kind(), "identifier" | "scoped_identifier"))?;
    Some(compact(text(name, source)))
}

// ============================================================================
// Walk
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TypeKind {
    Class,
    Interface,
    Enum,
    Record,
    Anonymous,
}

/// One enclosing type while walking.
#[derive(Debug, Clone)]
struct TypeFrame {
    kind: TypeKind,
    /// Holds an outer instance, so its constructors gain a leading argument.
    is_inner: bool,
    /// Simple name of the type whose instance is captured.
    outer: Option<String>,
    /// Record component types, used by the compact constructor.
    components: Vec<String>,
}

#[derive(Debug, Clone, Default)]
struct Context {
    top_level: Option<String>,
    scope: Vec<ScopeSegment>,
    type_parameters: BTreeMap<String, String>,
    types: Vec<TypeFrame>,
    /// Inside a static method or static initializer.
    static_context: bool,
}

impl Context {
    fn nearest_type_name(&self) -> Option<String> {
        self.scope.iter().rev().find_map(|segment| match segment {
            ScopeSegment::Type(name) => Some(Some(name.clone())),
            ScopeSegment::Anonymous => Some(None),
            ScopeSegment::Method(_) => None,
        })?
    }

    fn in_method(&self) -> bool {
        matches!(self.scope.last(), Some(ScopeSegment::Method(_)))
    }
}

struct Walker<'s> {
    path: &'s str,
    source: &'s str,
    package: Option<String>,
    methods: Vec<ParsedMethod>,
}

/// What an emitted declaration contributes besides its node.
struct Declaration<'t> {
    body: Node<'t>,
    kind: MethodKind,
    name: String,
    argument_types: Vec<String>,
}

impl<'s> Walker<'s> {
    fn visit(&mut self, node: Node<'_>, ctx: &Context) {
        match node.kind() {
            "class_declaration"
            | "interface_declaration"
            | "enum_declaration"
            | "record_declaration"
            | "annotation_type_declaration" => self.visit_type(node, ctx),
            "object_creation_expression" => {
                let mut cursor = node.walk();
                for child in node.children(&mut cursor) {
                    if child.kind() == "class_body" {
                        self.visit_anonymous(child, ctx);
                    } else {
                        self.visit(child, ctx);
                    }
                }
            }
            "lambda_expression" => self.visit_lambda(node, ctx),
            _ => self.visit_children(node, ctx),
        }
    }

    fn visit_children(&mut self, node: Node<'_>, ctx: &Context) {
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            self.visit(child, ctx);
        }
    }

    fn visit_type(&mut self, node: Node<'_>, ctx: &Context) {
        let Some(name) = node
            .child_by_field_name("name")
            .map(|n| text(n, self.source).to_string())
        else {
            return;
        };

        let kind = match node.kind() {
            "class_declaration" => TypeKind::Class,
            "enum_declaration" => TypeKind::Enum,
            "record_declaration" => TypeKind::Record,
            _ => TypeKind::Interface,
        };
        let enclosing = ctx.types.last().map(|frame| frame.kind);
        let is_inner = kind == TypeKind::Class
            && !has_modifier(node, "static")
            && match enclosing {
                None | Some(TypeKind::Interface) => false,
                Some(_) if ctx.in_method() => !ctx.static_context,
                Some(_) => true,
            };
        let outer = if is_inner {
            ctx.nearest_type_name()
        } else {
            None
        };
        let components = match (kind, node.child_by_field_name("parameters")) {
            (TypeKind::Record, Some(params)) => parameter_types(params, self.source),
            _ => Vec::new(),
        };

        let mut inner = ctx.clone();
        if inner.top_level.is_none() {
            inner.top_level = Some(match &self.package {
                Some(package) => format!("{}.{}", package, name),
                None => name.clone(),
            });
        }
        inner.scope.push(ScopeSegment::Type(name));
        add_type_parameters(node, self.source, &mut inner.type_parameters);
        inner.types.push(TypeFrame {
            kind,
            is_inner,
            outer,
            components,
        });
        inner.static_context = false;

        if let Some(body) = node.child_by_field_name("body") {
            self.visit_members(body, &inner);
        }
    }

    fn visit_anonymous(&mut self, body: Node<'_>, ctx: &Context) {
        let mut inner = ctx.clone();
        inner.scope.push(ScopeSegment::Anonymous);
        inner.types.push(TypeFrame {
            kind: TypeKind::Anonymous,
            is_inner: true,
            outer: ctx.nearest_type_name(),
            components: Vec::new(),
        });
        inner.static_context = false;
        self.visit_members(body, &inner);
    }

    /// Walk the members of a class, interface, enum or annotation body.
    fn visit_members(&mut self, body: Node<'_>, ctx: &Context) {
        let mut cursor = body.walk();
        for member in body.named_children(&mut cursor) {
            match member.kind() {
                "method_declaration" => self.visit_method(member, ctx),
                "constructor_declaration" | "compact_constructor_declaration" => {
                    self.visit_constructor(member, ctx)
                }
                "block" => {
                    self.visit_initializer(member, member, MethodKind::InstanceInitializer, ctx)
                }
                "static_initializer" => {
                    let mut inner = member.walk();
                    let block = member
                        .named_children(&mut inner)
                        .find(|child| child.kind() == "block");
                    if let Some(block) = block {
                        self.visit_initializer(member, block, MethodKind::StaticInitializer, ctx);
                    }
                }
                "enum_constant" => {
                    let mut inner = member.walk();
                    for child in member.named_children(&mut inner) {
                        if child.kind() == "class_body" {
                            self.visit_anonymous(child, ctx);
                        } else {
                            self.visit(child, ctx);
                        }
                    }
                }
                "enum_body_declarations" => self.visit_members(member, ctx),
                _ => self.visit(member, ctx),
            }
        }
    }

    fn visit_method(&mut self, node: Node<'_>, ctx: &Context) {
        let (Some(name), Some(body)) = (
            node.child_by_field_name("name"),
            node.child_by_field_name("body"),
        ) else {
            return;
        };
        let name = text(name, self.source).to_string();
        let is_static = has_modifier(node, "static");

        let mut params = ctx.type_parameters.clone();
        add_type_parameters(node, self.source, &mut params);
        let argument_types = node
            .child_by_field_name("parameters")
            .map(|p| parameter_types(p, self.source))
            .unwrap_or_default();

        let kind = if is_static {
            MethodKind::StaticMethod
        } else {
            MethodKind::InstanceMethod
        };
        self.emit_with_parameters(
            node,
            Declaration {
                body,
                kind,
                name: name.clone(),
                argument_types,
            },
            ctx,
            &params,
        );

        let mut inner = ctx.clone();
        inner.scope.push(ScopeSegment::Method(name));
        inner.type_parameters = params;
        inner.static_context = is_static;
        self.visit_children(body, &inner);
    }

    fn visit_constructor(&mut self, node: Node<'_>, ctx: &Context) {
        let (Some(name), Some(body)) = (
            node.child_by_field_name("name"),
            node.child_by_field_name("body"),
        ) else {
            return;
        };
        let name = text(name, self.source).to_string();
        let frame = ctx.types.last();

        let argument_types = if node.kind() == "compact_constructor_declaration" {
            frame.map(|f| f.components.clone()).unwrap_or_default()
        } else {
            node.child_by_field_name("parameters")
                .map(|p| parameter_types(p, self.source))
                .unwrap_or_default()
        };
        let kind = match frame {
            Some(f) if f.kind == TypeKind::Enum => MethodKind::EnumConstructor,
            Some(f) if f.is_inner => MethodKind::InnerClassConstructor,
            _ => MethodKind::Constructor,
        };

        let mut params = ctx.type_parameters.clone();
        add_type_parameters(node, self.source, &mut params);
        self.emit_with_parameters(
            node,
            Declaration {
                body,
                kind,
                name: name.clone(),
                argument_types,
            },
            ctx,
            &params,
        );

        let mut inner = ctx.clone();
        inner.scope.push(ScopeSegment::Method(name));
        inner.type_parameters = params;
        inner.static_context = false;
        self.visit_children(body, &inner);
    }

    fn visit_initializer(
        &mut self,
        node: Node<'_>,
        block: Node<'_>,
        kind: MethodKind,
        ctx: &Context,
    ) {
        let name = match kind {
            MethodKind::StaticInitializer => "<clinit>",
            _ => "<init>",
        };
        self.emit_with_parameters(
            node,
            Declaration {
                body: block,
                kind,
                name: name.to_string(),
                argument_types: Vec::new(),
            },
            ctx,
            &ctx.type_parameters,
        );

        let mut inner = ctx.clone();
        inner.scope.push(ScopeSegment::Method(name.to_string()));
        inner.static_context = kind == MethodKind::StaticInitializer;
        self.visit_children(block, &inner);
    }

    fn visit_lambda(&mut self, node: Node<'_>, ctx: &Context) {
        let Some(body) = node.child_by_field_name("body") else {
            return;
        };
        let argument_types = node
            .child_by_field_name("parameters")
            .filter(|p| p.kind() == "formal_parameters")
            .map(|p| parameter_types(p, self.source))
            .unwrap_or_default();

        self.emit_with_parameters(
            node,
            Declaration {
                body,
                kind: MethodKind::LambdaMethod,
                name: "lambda".to_string(),
                argument_types,
            },
            ctx,
            &ctx.type_parameters,
        );

        let mut inner = ctx.clone();
        inner.scope.push(ScopeSegment::Method("lambda".to_string()));
        self.visit(body, &inner);
    }

    fn emit_with_parameters(
        &mut self,
        node: Node<'_>,
        declaration: Declaration<'_>,
        ctx: &Context,
        type_parameters: &BTreeMap<String, String>,
    ) {
        let Some(top_level_type) = ctx.top_level.clone() else {
            return;
        };
        let code = relevant_code(declaration.body, self.source);
        let outer_type = match declaration.kind {
            MethodKind::InnerClassConstructor => ctx.types.last().and_then(|f| f.outer.clone()),
            _ => None,
        };
        let start = node.start_position();

        self.methods.push(ParsedMethod {
            path: self.path.to_string(),
            top_level_type,
            is_empty: code.lines.is_empty(),
            lines: code.lines,
            declaration_line: start.row as u32 + 1,
            column: start.column as u32 + 1,
            kind: declaration.kind,
            name: declaration.name,
            scope: ctx.scope.clone(),
            argument_types: declaration.argument_types,
            type_parameters: type_parameters.clone(),
            outer_type,
            relevant_code: code.text,
        });
    }
}

// ============================================================================
// Syntax helpers
// ============================================================================

fn text<'s>(node: Node<'_>, source: &'s str) -> &'s str {
    source.get(node.byte_range()).unwrap_or("")
}

fn compact(raw: &str) -> String {
    raw.chars().filter(|c| !c.is_whitespace()).collect()
}

fn has_modifier(node: Node<'_>, modifier: &str) -> bool {
    let mut cursor = node.walk();
    let Some(modifiers) = node
        .children(&mut cursor)
        .find(|child| child.kind() == "modifiers")
    else {
        return false;
    };
    let mut cursor = modifiers.walk();
    let found = modifiers
        .children(&mut cursor)
        .any(|child| child.kind() == modifier);
    found
}

/// Declared parameter types, whitespace removed, with `[]` for varargs and
/// dimensions written after the parameter name.
fn parameter_types(params: Node<'_>, source: &str) -> Vec<String> {
    let mut types = Vec::new();
    let mut cursor = params.walk();
    for param in params.named_children(&mut cursor) {
        match param.kind() {
            "formal_parameter" => {
                let Some(ty) = param.child_by_field_name("type") else {
                    continue;
                };
                let dims = param
                    .child_by_field_name("dimensions")
                    .map(|d| text(d, source).matches('[').count())
                    .unwrap_or(0);
                types.push(format!("{}{}", compact(text(ty, source)), "[]".repeat(dims)));
            }
            "spread_parameter" => {
                let mut inner = param.walk();
                let children: Vec<_> = param.children(&mut inner).collect();
                let start = children
                    .iter()
                    .find(|c| c.kind() != "modifiers")
                    .map(|c| c.start_byte());
                let end = children
                    .iter()
                    .find(|c| c.kind() == "...")
                    .map(|c| c.start_byte());
                if let (Some(start), Some(end)) = (start, end) {
                    let raw = source.get(start..end).unwrap_or("");
                    types.push(format!("{}[]", compact(raw)));
                }
            }
            _ => {}
        }
    }
    types
}

/// Add `name -> first bound` for every type parameter of `node`.
fn add_type_parameters(node: Node<'_>, source: &str, map: &mut BTreeMap<String, String>) {
    let Some(params) = node.child_by_field_name("type_parameters") else {
        return;
    };
    let mut cursor = params.walk();
    for param in params.named_children(&mut cursor) {
        if param.kind() != "type_parameter" {
            continue;
        }
        let mut inner = param.walk();
        let children: Vec<_> = param.named_children(&mut inner).collect();
        let Some(name) = children
            .iter()
            .find(|c| matches!(c.kind(), "type_identifier" | "identifier"))
        else {
            continue;
        };
        let bound = children
            .iter()
            .find(|c| c.kind() == "type_bound")
            .and_then(|b| b.named_child(0))
            .map(|b| compact(text(b, source)))
            .unwrap_or_else(|| "Object".to_string());
        map.insert(text(*name, source).to_string(), bound);
    }
}

// ============================================================================
// Tests
// ============================================================================


// ============================================================================
// Integration Tests (with actual fixture files)
// ============================================================================

#[cfg(test)]
mod integration_tests {
    use super::*;

    #[test]
    fn test_parse_cart_fixture() {
        let source = include_str!("../../../fixtures/java/Cart.java");
        let methods = parse_java("src/main/java/com/acme/shop/Cart.java", source).unwrap();

        let names: Vec<_> = methods.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["Cart", "add", "total", "lambda", "getItems", "Item"]);

        let item = methods.iter().find(|m| m.name == "Item").unwrap();
        assert_eq!(item.kind, MethodKind::InnerClassConstructor);
        assert_eq!(item.outer_type.as_deref(), Some("Cart"));
        assert!(methods.iter().all(|m| m.top_level_type == "com.acme.shop.Cart"));
    }

    #[test]
    fn test_double_brace_initializer_resolves_to_anonymous_constructor() {
        use testgap_domain::{CoverageCounterRecord, CoverageIndex, CoverageResolver};

        let source = "package com.acme;\n\nimport java.util.ArrayList;\nimport java.util.List;\n\nclass Foo {\n  List<Integer> build() {\n    return new ArrayList<Integer>() {{\n      add(1);\n    }};\n  }\n}\n";
        let methods = parse_java("src/main/java/com/acme/Foo.java", source).unwrap();
        let init = methods
            .iter()
            .find(|m| m.kind == MethodKind::InstanceInitializer)
            .unwrap()
            .clone();
        assert_eq!(init.enclosing_type_name(), None);
        assert_eq!(init.lines, vec![9]);

        let record = |ty: &str, name: &str, desc: &str, line: u32, covered: u64| {
            CoverageCounterRecord {
                declaring_type: ty.to_string(),
                name: name.to_string(),
                descriptor: desc.to_string(),
                line: Some(line),
                covered_instructions: covered,
            }
        };
        let anonymous_ctor = record("com/acme/Foo$1", "<init>", "(Lcom/acme/Foo;)V", 8, 9);
        let build = record("com/acme/Foo", "build", "()Ljava/util/List;", 8, 5);
        let counters = vec![
            record("com/acme/Foo", "<init>", "()V", 6, 3),
            build.clone(),
            anonymous_ctor.clone(),
        ];

        let resolver = CoverageResolver::new(CoverageIndex::new(counters).unwrap());
        let result = resolver.resolve(methods.clone());

        assert_eq!(result.resolved().get(&init), Some(&anonymous_ctor));
        let build_method = methods.iter().find(|m| m.name == "build").unwrap();
        assert_eq!(result.resolved().get(build_method), Some(&build));
        assert!(result.unresolved().is_empty());
    }
}
