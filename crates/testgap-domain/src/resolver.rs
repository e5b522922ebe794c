//! Matching parsed methods to coverage counters.
//!
//! Resolution runs per top-level type. Within one type four passes run in
//! order, each consuming the methods it settles:
//!
//! 1. instance initializers to a constructor counter,
//! 2. static initializers to the `<clinit>` counter,
//! 3. constructors by compiled argument list,
//! 4. remaining methods and lambdas by source line.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::{
    CoverageCounterRecord, CoverageIndex, CoverageResult, MethodKind, ParsedMethod,
    TopLevelTypeKey, expected_compiled_arguments,
};

/// Resolves parsed methods against a fixed [`CoverageIndex`].
#[derive(Debug, Clone)]
pub struct CoverageResolver {
    index: CoverageIndex,
}

impl CoverageResolver {
    pub fn new(index: CoverageIndex) -> Self {
        Self { index }
    }

    pub fn index(&self) -> &CoverageIndex {
        &self.index
    }

    /// Classify every method. Empty bodies skip matching entirely.
    pub fn resolve<I>(&self, methods: I) -> CoverageResult
    where
        I: IntoIterator<Item = ParsedMethod>,
    {
        let mut empty = BTreeSet::new();
        let mut groups: BTreeMap<TopLevelTypeKey, BTreeSet<ParsedMethod>> = BTreeMap::new();
        for method in methods {
            if method.is_empty {
                empty.insert(method);
            } else {
                groups.entry(method.top_level_key()).or_default().insert(method);
            }
        }

        let fragments = groups
            .into_iter()
            .map(|(key, methods)| self.resolve_group(&key, methods));
        CoverageResult::fold(std::iter::once(CoverageResult::from_empty(empty)).chain(fragments))
    }

    fn resolve_group(&self, key: &TopLevelTypeKey, methods: BTreeSet<ParsedMethod>) -> CoverageResult {
        let counters = self.index.group(key);
        let mut group = GroupResolution::new(counters);

        let mut instance_initializers = Vec::new();
        let mut static_initializers = Vec::new();
        let mut constructors = Vec::new();
        let mut others = Vec::new();
        for method in methods {
            match method.kind {
                MethodKind::InstanceInitializer => instance_initializers.push(method),
                MethodKind::StaticInitializer => static_initializers.push(method),
                kind if kind.is_constructor() => constructors.push(method),
                _ => others.push(method),
            }
        }

        group.resolve_instance_initializers(instance_initializers);
        group.resolve_static_initializers(static_initializers);
        group.resolve_constructors(constructors);
        group.resolve_by_line(others);

        debug!(
            type_name = %key,
            counters = counters.len(),
            resolved = group.resolved.len(),
            unresolved = group.unresolved.len(),
            "resolved type"
        );

        CoverageResult::new(group.resolved, group.unresolved, BTreeSet::new())
    }
}

// ============================================================================
// Per-Type Passes
// ============================================================================

struct GroupResolution<'a> {
    counters: &'a [CoverageCounterRecord],
    claimed: BTreeSet<usize>,
    resolved: BTreeMap<ParsedMethod, CoverageCounterRecord>,
    unresolved: BTreeSet<ParsedMethod>,
}

impl<'a> GroupResolution<'a> {
    fn new(counters: &'a [CoverageCounterRecord]) -> Self {
        Self {
            counters,
            claimed: BTreeSet::new(),
            resolved: BTreeMap::new(),
            unresolved: BTreeSet::new(),
        }
    }

    fn claim(&mut self, method: ParsedMethod, counter: usize) {
        self.claimed.insert(counter);
        self.resolved.insert(method, self.counters[counter].clone());
    }

    /// Indices of counters matching `pred`, in record order.
    fn select(&self, pred: impl Fn(&CoverageCounterRecord) -> bool) -> Vec<usize> {
        self.counters
            .iter()
            .enumerate()
            .filter(|(_, c)| pred(c))
            .map(|(i, _)| i)
            .collect()
    }

    /// Pass 1. Initializer code is copied into every constructor of its
    /// class, so the initializer is credited to a constructor counter.
    /// Initializers of anonymous classes compete for the constructors of
    /// all anonymous classes of the type.
    fn resolve_instance_initializers(&mut self, methods: Vec<ParsedMethod>) {
        for (enclosing, initializers) in by_enclosing_type(methods) {
            let constructors = self.select(|c| {
                c.is_constructor() && c.source_type_name() == enclosing.as_deref()
            });

            if initializers.len() == 1 && constructors.len() == 1 {
                for method in initializers {
                    self.claim(method, constructors[0]);
                }
                continue;
            }

            let mut best: Option<usize> = None;
            for &idx in &constructors {
                let covered = self.counters[idx].covered_instructions;
                let better = match best {
                    Some(b) => covered > self.counters[b].covered_instructions,
                    None => covered > 0,
                };
                if better {
                    best = Some(idx);
                }
            }

            match best {
                Some(idx) => {
                    for method in initializers {
                        self.claim(method, idx);
                    }
                }
                None => self.unresolved.extend(initializers),
            }
        }
    }

    /// Pass 2. All static blocks of a class compile into one `<clinit>`.
    fn resolve_static_initializers(&mut self, methods: Vec<ParsedMethod>) {
        for (enclosing, initializers) in by_enclosing_type(methods) {
            let clinit = self.select(|c| {
                c.is_static_initializer() && c.source_type_name() == enclosing.as_deref()
            });
            match clinit.first() {
                Some(&idx) => {
                    for method in initializers {
                        self.claim(method, idx);
                    }
                }
                None => self.unresolved.extend(initializers),
            }
        }
    }

    /// Pass 3. Constructor lines are unreliable, so only the compiled
    /// argument list and the declaring class name are compared.
    fn resolve_constructors(&mut self, methods: Vec<ParsedMethod>) {
        for method in methods {
            let expected = expected_compiled_arguments(&method);
            let enclosing = method.enclosing_type_name();
            let candidates = self.select(|c| {
                c.is_constructor()
                    && c.source_type_name() == enclosing
                    && c.argument_types().as_ref() == Some(&expected)
            });

            if let [only] = candidates.as_slice() {
                self.claim(method, *only);
            } else {
                debug!(
                    method = %method.qualified_name(),
                    candidates = candidates.len(),
                    "constructor not matched"
                );
                self.unresolved.insert(method);
            }
        }
    }

    /// Pass 4. Unique method/counter pairs per declaring class and line;
    /// lambdas on one line pair positionally by column and synthetic index.
    fn resolve_by_line(&mut self, methods: Vec<ParsedMethod>) {
        let mut plain_methods: BTreeMap<LineKey, Vec<ParsedMethod>> = BTreeMap::new();
        let mut lambda_methods: BTreeMap<LineKey, Vec<ParsedMethod>> = BTreeMap::new();
        for method in methods {
            let enclosing = method.enclosing_type_name().map(str::to_string);
            match method.first_line() {
                Some(line) if method.kind == MethodKind::LambdaMethod => lambda_methods
                    .entry((enclosing, line))
                    .or_default()
                    .push(method),
                Some(line) => plain_methods
                    .entry((enclosing, line))
                    .or_default()
                    .push(method),
                None => {
                    self.unresolved.insert(method);
                }
            }
        }

        let mut plain_counters: BTreeMap<LineKey, Vec<usize>> = BTreeMap::new();
        let mut lambda_counters: BTreeMap<LineKey, Vec<usize>> = BTreeMap::new();
        for (idx, counter) in self.counters.iter().enumerate() {
            if self.claimed.contains(&idx)
                || counter.is_constructor()
                || counter.is_static_initializer()
            {
                continue;
            }
            let Some(line) = counter.line else { continue };
            let key = (counter.source_type_name().map(str::to_string), line);
            if counter.is_lambda() {
                lambda_counters.entry(key).or_default().push(idx);
            } else {
                plain_counters.entry(key).or_default().push(idx);
            }
        }

        for (key, mut candidates) in plain_methods {
            let counters = plain_counters.get(&key).map(Vec::as_slice).unwrap_or(&[]);
            match (candidates.len(), counters) {
                (1, [only]) => {
                    if let Some(method) = candidates.pop() {
                        self.claim(method, *only);
                    }
                }
                _ => self.unresolved.extend(candidates),
            }
        }

        for (key, mut lambdas) in lambda_methods {
            let mut counters = lambda_counters.remove(&key).unwrap_or_default();
            if lambdas.len() != counters.len() {
                debug!(
                    line = key.1,
                    parsed = lambdas.len(),
                    compiled = counters.len(),
                    "lambda count mismatch"
                );
                self.unresolved.extend(lambdas);
                continue;
            }

            lambdas.sort_by(|a, b| a.column.cmp(&b.column).then_with(|| a.cmp(b)));
            counters.sort_by_key(|&idx| (self.counters[idx].lambda_index(), idx));
            for (method, idx) in lambdas.into_iter().zip(counters) {
                self.claim(method, idx);
            }
        }
    }
}

/// Declaring class simple name (`None` for anonymous classes) and line.
type LineKey = (Option<String>, u32);

/// Partition methods by the simple name of their nearest enclosing type.
fn by_enclosing_type(methods: Vec<ParsedMethod>) -> BTreeMap<Option<String>, Vec<ParsedMethod>> {
    let mut groups: BTreeMap<Option<String>, Vec<ParsedMethod>> = BTreeMap::new();
    for method in methods {
        let key = method.enclosing_type_name().map(str::to_string);
        groups.entry(key).or_default().push(method);
    }
    groups
}

// ============================================================================
// Tests
// ============================================================================
