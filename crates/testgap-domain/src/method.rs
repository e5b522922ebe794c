//! Parsed method declarations and their structural identity.

use std::collections::BTreeMap;
use std::fmt;

use crate::TopLevelTypeKey;

// ============================================================================
// Method Kind
// ============================================================================

/// The declaration variant a [`ParsedMethod`] was produced from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MethodKind {
    /// Constructor of a top-level or static nested class, or a record.
    Constructor,
    /// Constructor of an enum; the compiler prepends `(String, int)`.
    EnumConstructor,
    /// Constructor of a non-static nested, local or anonymous class; the
    /// compiler prepends the outer instance.
    InnerClassConstructor,
    /// `{ ... }` block in a class body.
    InstanceInitializer,
    /// `static { ... }` block in a class body.
    StaticInitializer,
    InstanceMethod,
    StaticMethod,
    /// Lambda expression compiled to a synthetic `lambda$...$N` method.
    LambdaMethod,
}

impl MethodKind {
    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            MethodKind::Constructor => "constructor",
            MethodKind::EnumConstructor => "enum_constructor",
            MethodKind::InnerClassConstructor => "inner_class_constructor",
            MethodKind::InstanceInitializer => "instance_initializer",
            MethodKind::StaticInitializer => "static_initializer",
            MethodKind::InstanceMethod => "instance_method",
            MethodKind::StaticMethod => "static_method",
            MethodKind::LambdaMethod => "lambda",
        }
    }

    /// True for the three constructor variants.
    pub fn is_constructor(&self) -> bool {
        matches!(
            self,
            MethodKind::Constructor
                | MethodKind::EnumConstructor
                | MethodKind::InnerClassConstructor
        )
    }

    /// True for instance and static initializer blocks.
    pub fn is_initializer(&self) -> bool {
        matches!(
            self,
            MethodKind::InstanceInitializer | MethodKind::StaticInitializer
        )
    }
}

impl fmt::Display for MethodKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Scope
// ============================================================================

/// One lexical level enclosing a declaration.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ScopeSegment {
    /// A named class, interface, enum or record.
    Type(String),
    /// An anonymous class body.
    Anonymous,
    /// A method, constructor or initializer that encloses a local type or
    /// lambda.
    Method(String),
}

impl fmt::Display for ScopeSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeSegment::Type(name) | ScopeSegment::Method(name) => f.write_str(name),
            ScopeSegment::Anonymous => f.write_str("<anonymous>"),
        }
    }
}

// ============================================================================
// Parsed Method
// ============================================================================

/// A method-like declaration extracted from one source file.
///
/// The derived ordering sorts by path and then by position, which is the
/// order reports list methods in.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ParsedMethod {
    /// Repo-relative path of the declaring file (forward slashes).
    pub path: String,
    /// Fully-qualified name of the outermost type of the file.
    pub top_level_type: String,
    /// Lines carrying relevant code, ascending. Empty for empty bodies.
    pub lines: Vec<u32>,
    /// Line of the declaration's first token (1-indexed).
    pub declaration_line: u32,
    /// Column of the declaration's first token (1-indexed).
    pub column: u32,
    pub kind: MethodKind,
    /// Declared name. Initializers use `<init>`/`<clinit>`, lambdas `lambda`.
    pub name: String,
    /// Enclosing types and methods, outermost first.
    pub scope: Vec<ScopeSegment>,
    /// Argument types as written, with whitespace removed.
    pub argument_types: Vec<String>,
    /// Type parameter name to erasure bound for every enclosing generic
    /// declaration.
    pub type_parameters: BTreeMap<String, String>,
    /// Simple name of the outer type for inner-class constructors.
    pub outer_type: Option<String>,
    /// True when the body carries no executable code.
    pub is_empty: bool,
    /// Body text with comments and nested declarations masked out,
    /// whitespace-collapsed.
    pub relevant_code: String,
}

/// Position-independent identity of a [`ParsedMethod`].
///
/// Two methods with the same identity are considered unchanged between two
/// revisions even when they moved to other lines.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MethodIdentity<'a> {
    pub argument_types: &'a [String],
    pub name: &'a str,
    pub relevant_code: &'a str,
    pub scope: &'a [ScopeSegment],
    pub top_level_type: &'a str,
    pub kind: MethodKind,
}

impl ParsedMethod {
    /// Structural identity, excluding path, lines and column.
    pub fn identity(&self) -> MethodIdentity<'_> {
        MethodIdentity {
            argument_types: &self.argument_types,
            name: &self.name,
            relevant_code: &self.relevant_code,
            scope: &self.scope,
            top_level_type: &self.top_level_type,
            kind: self.kind,
        }
    }

    /// The grouping key shared with coverage counters of the same type.
    pub fn top_level_key(&self) -> TopLevelTypeKey {
        TopLevelTypeKey::from_type_name(&self.top_level_type)
    }

    /// First line carrying relevant code.
    pub fn first_line(&self) -> Option<u32> {
        self.lines.first().copied()
    }

    /// Simple name of the nearest enclosing named type.
    ///
    /// `None` when the nearest enclosing type is anonymous.
    pub fn enclosing_type_name(&self) -> Option<&str> {
        self.scope.iter().rev().find_map(|segment| match segment {
            ScopeSegment::Type(name) => Some(Some(name.as_str())),
            ScopeSegment::Anonymous => Some(None),
            ScopeSegment::Method(_) => None,
        })?
    }

    /// Dotted scope plus name, e.g. `Outer.Inner.run`.
    pub fn qualified_name(&self) -> String {
        let mut parts: Vec<String> = self.scope.iter().map(ToString::to_string).collect();
        parts.push(self.name.clone());
        parts.join(".")
    }

    /// Getter/setter shaped methods: plain methods whose name starts with
    /// `get` or `set`.
    pub fn is_accessor(&self) -> bool {
        matches!(
            self.kind,
            MethodKind::InstanceMethod | MethodKind::StaticMethod
        ) && (self.name.starts_with("get") || self.name.starts_with("set"))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn method(name: &str, lines: Vec<u32>) -> ParsedMethod {
        ParsedMethod {
            path: "src/main/java/com/acme/Foo.java".to_string(),
            top_level_type: "com.acme.Foo".to_string(),
            lines,
            declaration_line: 3,
            column: 5,
            kind: MethodKind::InstanceMethod,
            name: name.to_string(),
            scope: vec![ScopeSegment::Type("Foo".to_string())],
            argument_types: vec!["int".to_string()],
            type_parameters: BTreeMap::new(),
            outer_type: None,
            is_empty: false,
            relevant_code: "return x;".to_string(),
        }
    }

    #[test]
    fn test_identity_ignores_position() {
        let a = method("run", vec![4]);
        let mut b = method("run", vec![14]);
        b.column = 9;
        b.declaration_line = 13;

        assert_ne!(a, b);
        assert_eq!(a.identity(), b.identity());
    }

    #[test]
    fn test_identity_includes_body() {
        let a = method("run", vec![4]);
        let mut b = a.clone();
        b.relevant_code = "return x + 1;".to_string();

        assert_ne!(a.identity(), b.identity());
    }

    #[test]
    fn test_enclosing_type_name_skips_methods() {
        let mut m = method("lambda", vec![4]);
        m.scope = vec![
            ScopeSegment::Type("Foo".to_string()),
            ScopeSegment::Type("Bar".to_string()),
            ScopeSegment::Method("run".to_string()),
        ];
        assert_eq!(m.enclosing_type_name(), Some("Bar"));
    }

    #[test]
    fn test_enclosing_type_name_anonymous() {
        let mut m = method("run", vec![4]);
        m.scope = vec![
            ScopeSegment::Type("Foo".to_string()),
            ScopeSegment::Method("start".to_string()),
            ScopeSegment::Anonymous,
        ];
        assert_eq!(m.enclosing_type_name(), None);
    }

    #[test]
    fn test_qualified_name() {
        let mut m = method("run", vec![4]);
        m.scope = vec![
            ScopeSegment::Type("Foo".to_string()),
            ScopeSegment::Anonymous,
        ];
        assert_eq!(m.qualified_name(), "Foo.<anonymous>.run");
    }

    #[test]
    fn test_is_accessor() {
        assert!(method("getName", vec![4]).is_accessor());
        assert!(method("setName", vec![4]).is_accessor());
        assert!(!method("name", vec![4]).is_accessor());

        let mut ctor = method("getter", vec![4]);
        ctor.kind = MethodKind::Constructor;
        assert!(!ctor.is_accessor());
    }

    #[test]
    fn test_kind_predicates() {
        assert!(MethodKind::EnumConstructor.is_constructor());
        assert!(MethodKind::InnerClassConstructor.is_constructor());
        assert!(!MethodKind::InstanceInitializer.is_constructor());
        assert!(MethodKind::StaticInitializer.is_initializer());
        assert!(!MethodKind::LambdaMethod.is_initializer());
        assert_eq!(MethodKind::LambdaMethod.to_string(), "lambda");
    }
}
