//! Resolution of the two states to compare, and the comparison itself.

use std::fmt;

use git2::{ReferenceType, Repository};
use regex::Regex;
use tracing::{debug, info};

use crate::{GitChangeSet, GitError, RepoLocation, RepoState, TreeDiffer};

// ============================================================================
// Reference Kinds
// ============================================================================

/// Which family of references a name pattern is matched against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefKind {
    /// Local branches and remote-tracking branches.
    Branch,
    Tag,
}

impl RefKind {
    fn prefixes(&self) -> &'static [&'static str] {
        match self {
            RefKind::Branch => &["refs/heads/", "refs/remotes/"],
            RefKind::Tag => &["refs/tags/"],
        }
    }

    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            RefKind::Branch => "branch",
            RefKind::Tag => "tag",
        }
    }
}

impl fmt::Display for RefKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A reference paired with the commit it points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefEntry {
    /// Full reference name, e.g. `refs/tags/v1.2.0`.
    pub name: String,
    /// Object id of the peeled commit.
    pub commit: String,
    /// Commit time in seconds since the epoch.
    pub time: i64,
}

impl RefEntry {
    /// Last `/`-separated component of the reference name.
    pub fn leaf(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }
}

/// Pick the previous state among references matching `pattern`.
///
/// Entries are ordered by commit time, then by name. If `head` is among
/// the matches the entry after its last occurrence is chosen (or the
/// newest, when HEAD is already newest); otherwise the newest match.
pub fn select_previous<'a>(
    entries: &'a [RefEntry],
    pattern: &Regex,
    head: &str,
) -> Option<&'a RefEntry> {
    let mut matching: Vec<&RefEntry> = entries
        .iter()
        .filter(|entry| pattern.is_match(entry.leaf()))
        .collect();
    matching.sort_by(|a, b| a.time.cmp(&b.time).then_with(|| a.name.cmp(&b.name)));

    let last = matching.len().checked_sub(1)?;
    let chosen = match matching.iter().rposition(|entry| entry.commit == head) {
        Some(pos) => (pos + 1).min(last),
        None => last,
    };
    matching.get(chosen).copied()
}

/// Compile a pattern that must match a whole reference leaf name.
pub fn leaf_pattern(pattern: &str) -> Result<Regex, GitError> {
    Regex::new(&format!("^(?:{})$", pattern)).map_err(|source| GitError::InvalidPattern {
        pattern: pattern.to_string(),
        source,
    })
}

// ============================================================================
// Change Scanner
// ============================================================================

/// Answers "what changed" for the three supported comparisons.
#[derive(Debug, Clone)]
pub struct ChangeScanner {
    location: RepoLocation,
}

impl ChangeScanner {
    pub fn new(location: RepoLocation) -> Self {
        Self { location }
    }

    pub fn location(&self) -> &RepoLocation {
        &self.location
    }

    /// Uncommitted changes: previous is HEAD, current the working tree.
    pub fn compare_working_tree_with_head<F>(&self, filter: F) -> Result<GitChangeSet, GitError>
    where
        F: Fn(&str) -> bool,
    {
        let head = self.head()?;
        self.compare(head, RepoState::WorkingTree, filter)
    }

    /// Changes from an explicit `previous` state up to HEAD.
    pub fn compare_head_with_repo_state<F>(
        &self,
        previous: &RepoState,
        filter: F,
    ) -> Result<GitChangeSet, GitError>
    where
        F: Fn(&str) -> bool,
    {
        let head = self.head()?;
        self.compare(previous.clone(), head, filter)
    }

    /// Changes from the previous matching branch or tag up to HEAD.
    pub fn compare_head_with_previous<F>(
        &self,
        kind: RefKind,
        pattern: &str,
        filter: F,
    ) -> Result<GitChangeSet, GitError>
    where
        F: Fn(&str) -> bool,
    {
        let previous = self.resolve_previous(kind, pattern)?;
        self.compare_head_with_repo_state(&previous, filter)
    }

    /// Resolve a revision expression (`HEAD^`, `v1.0`, an id, ...) to a
    /// commit.
    pub fn resolve(&self, expression: &str) -> Result<RepoState, GitError> {
        let repo = self.location.open()?;
        resolve_expression(&repo, expression)
    }

    /// The commit HEAD points at.
    pub fn head(&self) -> Result<RepoState, GitError> {
        self.resolve("HEAD")
    }

    /// Resolve the previous branch or tag relative to HEAD.
    pub fn resolve_previous(&self, kind: RefKind, pattern: &str) -> Result<RepoState, GitError> {
        let regex = leaf_pattern(pattern)?;
        let repo = self.location.open()?;
        let head = resolve_expression(&repo, "HEAD")?;
        let entries = list_refs(&repo, kind)?;

        let chosen = select_previous(&entries, &regex, head.as_str()).ok_or_else(|| {
            GitError::NoMatchingReference {
                kind: kind.to_string(),
                pattern: pattern.to_string(),
            }
        })?;

        info!(
            kind = %kind,
            pattern,
            reference = %chosen.name,
            commit = %chosen.commit,
            "resolved previous state"
        );
        RepoState::object(&chosen.commit).map_err(|_| GitError::UnresolvableReference {
            expression: chosen.name.clone(),
        })
    }

    /// References of `kind` with their commits, in repository order.
    pub fn references(&self, kind: RefKind) -> Result<Vec<RefEntry>, GitError> {
        let repo = self.location.open()?;
        list_refs(&repo, kind)
    }

    fn compare<F>(
        &self,
        previous: RepoState,
        current: RepoState,
        filter: F,
    ) -> Result<GitChangeSet, GitError>
    where
        F: Fn(&str) -> bool,
    {
        let changes = TreeDiffer::new(self.location.clone()).scan(&previous, &current, filter)?;
        Ok(GitChangeSet {
            previous,
            current,
            changes,
        })
    }
}

fn resolve_expression(repo: &Repository, expression: &str) -> Result<RepoState, GitError> {
    let unresolvable = || GitError::UnresolvableReference {
        expression: expression.to_string(),
    };
    let object = repo.revparse_single(expression).map_err(|_| unresolvable())?;
    let commit = object.peel_to_commit().map_err(|_| unresolvable())?;
    let state = RepoState::object(&commit.id().to_string())?;
    debug!(expression, state = %state, "resolved expression");
    Ok(state)
}

fn list_refs(repo: &Repository, kind: RefKind) -> Result<Vec<RefEntry>, GitError> {
    let mut entries = Vec::new();
    for reference in repo.references()? {
        let reference = reference?;
        if reference.kind() == Some(ReferenceType::Symbolic) {
            continue;
        }
        let Some(name) = reference.name() else {
            continue;
        };
        if !kind.prefixes().iter().any(|prefix| name.starts_with(prefix)) {
            continue;
        }
        let Ok(commit) = reference.peel_to_commit() else {
            debug!(reference = name, "skipping reference without commit");
            continue;
        };
        entries.push(RefEntry {
            name: name.to_string(),
            commit: commit.id().to_string(),
            time: commit.time().seconds(),
        });
    }
    Ok(entries)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_repo::TestRepo;

    fn entry(name: &str, commit: &str, time: i64) -> RefEntry {
        RefEntry {
            name: format!("refs/tags/{}", name),
            commit: commit.to_string(),
            time,
        }
    }

    fn all(_: &str) -> bool {
        true
    }

    #[test]
    fn test_leaf() {
        let e = RefEntry {
            name: "refs/remotes/origin/release/2.0".to_string(),
            commit: String::new(),
            time: 0,
        };
        assert_eq!(e.leaf(), "2.0");
    }

    #[test]
    fn test_select_previous_head_not_tagged_picks_newest() {
        let entries = vec![entry("v1", "a", 10), entry("v3", "c", 30), entry("v2", "b", 20)];
        let regex = leaf_pattern("v\\d+").unwrap();
        assert_eq!(select_previous(&entries, &regex, "head").unwrap().name, "refs/tags/v3");
    }

    #[test]
    fn test_select_previous_head_tagged_picks_next_entry() {
        let entries = vec![entry("v1", "a", 10), entry("v2", "b", 20), entry("v3", "c", 30)];
        let regex = leaf_pattern("v\\d+").unwrap();
        assert_eq!(select_previous(&entries, &regex, "a").unwrap().name, "refs/tags/v2");
    }

    #[test]
    fn test_select_previous_head_newest_clamps_to_last() {
        let entries = vec![entry("v1", "a", 10), entry("v2", "b", 20)];
        let regex = leaf_pattern("v\\d+").unwrap();
        assert_eq!(select_previous(&entries, &regex, "b").unwrap().name, "refs/tags/v2");
    }

    #[test]
    fn test_select_previous_requires_full_leaf_match() {
        let entries = vec![entry("v1", "a", 10), entry("v1-rc", "b", 20)];
        let regex = leaf_pattern("v\\d+").unwrap();
        assert_eq!(select_previous(&entries, &regex, "x").unwrap().name, "refs/tags/v1");
        let regex = leaf_pattern("nothing").unwrap();
        assert!(select_previous(&entries, &regex, "x").is_none());
    }

    #[test]
    fn test_select_previous_ties_break_by_name() {
        let entries = vec![entry("b", "2", 10), entry("a", "1", 10)];
        let regex = leaf_pattern(".*").unwrap();
        assert_eq!(select_previous(&entries, &regex, "x").unwrap().name, "refs/tags/b");
    }

    #[test]
    fn test_leaf_pattern_rejects_invalid_regex() {
        assert!(matches!(
            leaf_pattern("("),
            Err(GitError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn test_compare_working_tree_with_head() {
        let repo = TestRepo::new();
        repo.write("A.java", "class A {}\n");
        let head = repo.commit("first", 1_000);
        repo.write("A.java", "class A { int x; }\n");

        let scanner = ChangeScanner::new(repo.location());
        let set = scanner.compare_working_tree_with_head(all).unwrap();

        assert_eq!(set.previous, head);
        assert_eq!(set.current, RepoState::WorkingTree);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_compare_head_with_repo_state() {
        let repo = TestRepo::new();
        repo.write("A.java", "class A {}\n");
        let first = repo.commit("first", 1_000);
        repo.write("B.java", "class B {}\n");
        let second = repo.commit("second", 2_000);

        let scanner = ChangeScanner::new(repo.location());
        let set = scanner.compare_head_with_repo_state(&first, all).unwrap();

        assert_eq!(set.previous, first);
        assert_eq!(set.current, second);
        assert_eq!(set.iter().map(|c| c.path()).collect::<Vec<_>>(), vec!["B.java"]);
    }

    #[test]
    fn test_resolve_expressions() {
        let repo = TestRepo::new();
        repo.write("A.java", "class A {}\n");
        let first = repo.commit("first", 1_000);
        repo.write("A.java", "class A { }\n");
        let second = repo.commit("second", 2_000);

        let scanner = ChangeScanner::new(repo.location());
        assert_eq!(scanner.resolve("HEAD").unwrap(), second);
        assert_eq!(scanner.resolve("HEAD^").unwrap(), first);
        assert_eq!(scanner.resolve(first.as_str()).unwrap(), first);
        assert!(matches!(
            scanner.resolve("no-such-branch"),
            Err(GitError::UnresolvableReference { ref expression }) if expression == "no-such-branch"
        ));
    }

    #[test]
    fn test_compare_head_with_previous_tag() {
        let repo = TestRepo::new();
        repo.write("A.java", "class A {}\n");
        let v1 = repo.commit("v1", 1_000);
        repo.tag_lightweight("release-1", &v1);
        repo.write("A.java", "class A { int a; }\n");
        let v2 = repo.commit("v2", 2_000);
        repo.tag_annotated("release-2", &v2, 2_100);
        repo.write("A.java", "class A { int b; }\n");
        repo.commit("work", 3_000);

        let scanner = ChangeScanner::new(repo.location());
        let previous = scanner.resolve_previous(RefKind::Tag, "release-\\d+").unwrap();
        assert_eq!(previous, v2);

        let set = scanner
            .compare_head_with_previous(RefKind::Tag, "release-\\d+", all)
            .unwrap();
        assert_eq!(set.previous, v2);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_compare_head_with_previous_branch() {
        let repo = TestRepo::new();
        repo.write("A.java", "class A {}\n");
        let base = repo.commit("base", 1_000);
        repo.branch("develop", &base);

        let scanner = ChangeScanner::new(repo.location());
        let previous = scanner.resolve_previous(RefKind::Branch, "develop").unwrap();
        assert_eq!(previous, base);
    }

    #[test]
    fn test_compare_head_with_previous_no_match() {
        let repo = TestRepo::new();
        repo.write("A.java", "class A {}\n");
        let head = repo.commit("first", 1_000);
        repo.tag_lightweight("v1", &head);

        let scanner = ChangeScanner::new(repo.location());
        let err = scanner
            .compare_head_with_previous(RefKind::Tag, "release-.*", all)
            .unwrap_err();
        assert!(matches!(err, GitError::NoMatchingReference { .. }));
    }

    #[test]
    fn test_references_skip_other_kinds() {
        let repo = TestRepo::new();
        repo.write("A.java", "class A {}\n");
        let head = repo.commit("first", 1_000);
        repo.tag_lightweight("v1", &head);

        let scanner = ChangeScanner::new(repo.location());
        let tags = scanner.references(RefKind::Tag).unwrap();
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].leaf(), "v1");
        let branches = scanner.references(RefKind::Branch).unwrap();
        assert!(branches.iter().all(|b| b.name.starts_with("refs/heads/")));
    }
}
