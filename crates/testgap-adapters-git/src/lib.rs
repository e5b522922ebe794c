//! Change detection adapters for testgap.
//!
//! This crate compares two repository states through libgit2 and yields
//! the whole-file contents of every path that differs between them, so
//! that both sides can be re-parsed.

use thiserror::Error;

mod differ;
mod scanner;
mod state;

#[cfg(test)]
mod test_repo;

pub use differ::{RepoLocation, TreeDiffer, decode_text};
pub use scanner::{ChangeScanner, RefEntry, RefKind, leaf_pattern, select_previous};
pub use state::{FileChange, GitChangeSet, RepoState, WORKING_TREE};

/// Errors that can occur while reading repository state.
#[derive(Debug, Error)]
pub enum GitError {
    /// A revision expression does not resolve to a commit.
    #[error("unresolvable reference: {expression}")]
    UnresolvableReference { expression: String },

    /// No branch or tag leaf name matches the pattern.
    #[error("no {kind} matches pattern `{pattern}`")]
    NoMatchingReference { kind: String, pattern: String },

    /// The reference pattern is not a valid regular expression.
    #[error("invalid reference pattern `{pattern}`: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("invalid object id: {0}")]
    InvalidObjectId(String),

    /// A file change was built with neither side present.
    #[error("file change for {path} has neither previous nor current content")]
    EmptyFileChange { path: String },

    /// The working tree cannot be the previous side of a comparison.
    #[error("the working tree can only be the current state of a comparison")]
    WorkingTreeNotComparable,

    #[error("repository has no working directory")]
    BareRepository,

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Git(#[from] git2::Error),
}
