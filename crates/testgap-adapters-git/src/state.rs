//! Repository states and the file changes between them.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::GitError;

/// Marker string identifying the live working tree.
pub const WORKING_TREE: &str = "WORKING_TREE";

// ============================================================================
// Repo State
// ============================================================================

/// A point in repository history, or the uncommitted working tree.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RepoState {
    /// A commit, identified by its 40-character lowercase hex object id.
    Object(String),
    /// Files as they currently are on disk.
    WorkingTree,
}

impl RepoState {
    /// Build a state from a full object id.
    ///
    /// ```
    /// use testgap_adapters_git::RepoState;
    ///
    /// let id = "0123456789abcdef0123456789abcdef01234567";
    /// assert_eq!(RepoState::object(id).unwrap().as_str(), id);
    /// assert!(RepoState::object("HEAD").is_err());
    /// ```
    pub fn object(id: &str) -> Result<Self, GitError> {
        if id.len() == 40 && id.bytes().all(|b| b.is_ascii_hexdigit()) {
            Ok(RepoState::Object(id.to_ascii_lowercase()))
        } else {
            Err(GitError::InvalidObjectId(id.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            RepoState::Object(id) => id,
            RepoState::WorkingTree => WORKING_TREE,
        }
    }

    pub fn is_working_tree(&self) -> bool {
        matches!(self, RepoState::WorkingTree)
    }
}

impl FromStr for RepoState {
    type Err = GitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == WORKING_TREE {
            Ok(RepoState::WorkingTree)
        } else {
            RepoState::object(s)
        }
    }
}

impl fmt::Display for RepoState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// File Change
// ============================================================================

/// Whole-file contents of one path on both sides of a comparison.
///
/// At least one side is present; exactly one of [`is_creation`],
/// [`is_change`] and [`is_deletion`] holds.
///
/// [`is_creation`]: FileChange::is_creation
/// [`is_change`]: FileChange::is_change
/// [`is_deletion`]: FileChange::is_deletion
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FileChange {
    path: String,
    previous: Option<String>,
    current: Option<String>,
}

impl FileChange {
    /// Fails with [`GitError::EmptyFileChange`] when both sides are absent.
    pub fn new(
        path: impl Into<String>,
        previous: Option<String>,
        current: Option<String>,
    ) -> Result<Self, GitError> {
        let path = path.into().replace('\\', "/");
        if previous.is_none() && current.is_none() {
            return Err(GitError::EmptyFileChange { path });
        }
        Ok(Self {
            path,
            previous,
            current,
        })
    }

    /// Repo-relative path with forward slashes.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn previous_content(&self) -> Option<&str> {
        self.previous.as_deref()
    }

    pub fn current_content(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn is_creation(&self) -> bool {
        self.previous.is_none() && self.current.is_some()
    }

    pub fn is_change(&self) -> bool {
        self.previous.is_some() && self.current.is_some()
    }

    pub fn is_deletion(&self) -> bool {
        self.previous.is_some() && self.current.is_none()
    }
}

// ============================================================================
// Change Set
// ============================================================================

/// All file changes between two repository states.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitChangeSet {
    pub previous: RepoState,
    pub current: RepoState,
    pub changes: BTreeSet<FileChange>,
}

impl GitChangeSet {
    /// Iterate changes in path order.
    pub fn iter(&self) -> impl Iterator<Item = &FileChange> {
        self.changes.iter()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_repo_state_parse() {
        let id = "ABCDEF0123456789abcdef0123456789abcdef01";
        let state: RepoState = id.parse().unwrap();
        assert_eq!(state.as_str(), id.to_ascii_lowercase());
        assert_eq!(
            "WORKING_TREE".parse::<RepoState>().unwrap(),
            RepoState::WorkingTree
        );
        assert!(matches!(
            "abc".parse::<RepoState>(),
            Err(GitError::InvalidObjectId(_))
        ));
        assert!("g".repeat(40).parse::<RepoState>().is_err());
    }

    #[test]
    fn test_repo_state_equality_by_identity() {
        let a = RepoState::object(&"a".repeat(40)).unwrap();
        let b = RepoState::object(&"A".repeat(40)).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, RepoState::WorkingTree);
        assert_eq!(RepoState::WorkingTree.to_string(), WORKING_TREE);
    }

    #[test]
    fn test_file_change_requires_one_side() {
        let err = FileChange::new("src/A.java", None, None).unwrap_err();
        assert!(matches!(err, GitError::EmptyFileChange { ref path } if path == "src/A.java"));
    }

    #[test]
    fn test_file_change_kinds() {
        let created = FileChange::new("A.java", None, Some("x".into())).unwrap();
        assert!(created.is_creation());
        let changed = FileChange::new("A.java", Some("x".into()), Some("y".into())).unwrap();
        assert!(changed.is_change());
        let deleted = FileChange::new("A.java", Some("x".into()), None).unwrap();
        assert!(deleted.is_deletion());
        assert_eq!(deleted.previous_content(), Some("x"));
        assert_eq!(deleted.current_content(), None);
    }

    #[test]
    fn test_file_change_normalizes_separators() {
        let change = FileChange::new("src\\main\\A.java", None, Some(String::new())).unwrap();
        assert_eq!(change.path(), "src/main/A.java");
    }

    proptest! {
        #[test]
        fn file_change_kinds_are_exclusive(
            previous in proptest::option::of(".{0,8}"),
            current in proptest::option::of(".{0,8}"),
        ) {
            match FileChange::new("p", previous.clone(), current.clone()) {
                Ok(change) => {
                    let kinds = [change.is_creation(), change.is_change(), change.is_deletion()];
                    prop_assert_eq!(kinds.iter().filter(|k| **k).count(), 1);
                }
                Err(_) => prop_assert!(previous.is_none() && current.is_none()),
            }
        }
    }
}
