//! Coverage counter records as decoded from instrumentation reports.

use std::fmt;

use crate::DomainError;

// ============================================================================
// Top-Level Type Key
// ============================================================================

/// Grouping key: the dotted fully-qualified name of the outermost type.
///
/// Nested and synthetic suffixes (`$Inner`, `$1`) are stripped so that a
/// source file and every class compiled from it share one key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TopLevelTypeKey(String);

impl TopLevelTypeKey {
    /// Build a key from a dotted or slash-separated type name.
    pub fn from_type_name(name: &str) -> Self {
        let top = match name.find('$') {
            Some(idx) => &name[..idx],
            None => name,
        };
        Self(top.replace('/', "."))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TopLevelTypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Counter Record
// ============================================================================

/// Identity of a compiled method within a coverage report.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CounterKey {
    pub declaring_type: String,
    pub name: String,
    pub descriptor: String,
    pub line: Option<u32>,
}

/// Covered instruction count for one compiled method.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CoverageCounterRecord {
    /// Internal, slash-separated name of the declaring class, e.g.
    /// `com/acme/Foo$Inner`.
    pub declaring_type: String,
    /// Compiled method name (`<init>`, `<clinit>`, `lambda$run$0`, ...).
    pub name: String,
    /// JVM method descriptor, e.g. `(Ljava/lang/String;I)V`.
    pub descriptor: String,
    /// Source line of the method as reported by the instrumentation tool.
    pub line: Option<u32>,
    /// Number of instructions executed at least once.
    pub covered_instructions: u64,
}

impl CoverageCounterRecord {
    pub fn key(&self) -> CounterKey {
        CounterKey {
            declaring_type: self.declaring_type.clone(),
            name: self.name.clone(),
            descriptor: self.descriptor.clone(),
            line: self.line,
        }
    }

    /// Sum the covered instructions of records describing the same method.
    ///
    /// Fails on an empty input and on records with differing keys.
    pub fn merge<I>(records: I) -> Result<Self, DomainError>
    where
        I: IntoIterator<Item = CoverageCounterRecord>,
    {
        let mut iter = records.into_iter();
        let mut merged = iter.next().ok_or(DomainError::EmptyMerge)?;
        for record in iter {
            if record.key() != merged.key() {
                return Err(DomainError::MismatchedMerge {
                    left: merged.to_string(),
                    right: record.to_string(),
                });
            }
            merged.covered_instructions = merged
                .covered_instructions
                .saturating_add(record.covered_instructions);
        }
        Ok(merged)
    }

    pub fn top_level_key(&self) -> TopLevelTypeKey {
        TopLevelTypeKey::from_type_name(&self.declaring_type)
    }

    pub fn is_covered(&self) -> bool {
        self.covered_instructions > 0
    }

    pub fn is_constructor(&self) -> bool {
        self.name == "<init>"
    }

    pub fn is_static_initializer(&self) -> bool {
        self.name == "<clinit>"
    }

    /// Synthetic index `N` of a `lambda$<enclosing>$N` method.
    pub fn lambda_index(&self) -> Option<u32> {
        let rest = self.name.strip_prefix("lambda$")?;
        let (_, index) = rest.rsplit_once('$')?;
        index.parse().ok()
    }

    pub fn is_lambda(&self) -> bool {
        self.lambda_index().is_some()
    }

    /// Simple name of the declaring class: `com/acme/Foo$Inner` is `Inner`.
    pub fn enclosing_type_name(&self) -> &str {
        let simple = self
            .declaring_type
            .rsplit_once('/')
            .map_or(self.declaring_type.as_str(), |(_, s)| s);
        simple.rsplit_once('$').map_or(simple, |(_, s)| s)
    }

    /// Source-level simple name of the declaring class, comparable with
    /// [`crate::ParsedMethod::enclosing_type_name`].
    ///
    /// `None` for anonymous classes (`Foo$1`). Local classes (`Foo$1Local`)
    /// lose their numeric prefix.
    pub fn source_type_name(&self) -> Option<&str> {
        let name = self.enclosing_type_name();
        let stripped = name.trim_start_matches(|c: char| c.is_ascii_digit());
        if stripped.is_empty() {
            None
        } else {
            Some(stripped)
        }
    }

    /// Argument types of the descriptor as simple names.
    ///
    /// `(Ljava/lang/String;[I)V` yields `["String", "int[]"]`. Returns
    /// `None` for malformed descriptors.
    pub fn argument_types(&self) -> Option<Vec<String>> {
        parse_descriptor_arguments(&self.descriptor)
    }
}

impl fmt::Display for CoverageCounterRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}{}", self.declaring_type, self.name, self.descriptor)?;
        if let Some(line) = self.line {
            write!(f, "@{}", line)?;
        }
        Ok(())
    }
}

// ============================================================================
// Descriptor Parsing
// ============================================================================

/// Parse the argument list of a JVM method descriptor into simple names.
pub fn parse_descriptor_arguments(descriptor: &str) -> Option<Vec<String>> {
    let inner = descriptor.strip_prefix('(')?;
    let end = inner.find(')')?;
    let mut chars = inner[..end].chars();
    let mut args = Vec::new();

    loop {
        let mut dims = 0usize;
        let mut c = match chars.next() {
            Some(c) => c,
            None => break,
        };
        while c == '[' {
            dims += 1;
            c = chars.next()?;
        }

        let base = match c {
            'B' => "byte".to_string(),
            'C' => "char".to_string(),
            'D' => "double".to_string(),
            'F' => "float".to_string(),
            'I' => "int".to_string(),
            'J' => "long".to_string(),
            'S' => "short".to_string(),
            'Z' => "boolean".to_string(),
            'L' => {
                let mut name = String::new();
                loop {
                    match chars.next()? {
                        ';' => break,
                        ch => name.push(ch),
                    }
                }
                simple_binary_name(&name).to_string()
            }
            _ => return None,
        };

        args.push(format!("{}{}", base, "[]".repeat(dims)));
    }

    Some(args)
}

fn simple_binary_name(internal: &str) -> &str {
    let simple = internal.rsplit_once('/').map_or(internal, |(_, s)| s);
    simple.rsplit_once('$').map_or(simple, |(_, s)| s)
}

// ============================================================================
// Tests
// ============================================================================
