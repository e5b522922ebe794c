//! Whole-file tree comparison.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use git2::{Delta, DiffDelta, DiffOptions, Oid, Repository, Tree};
use tracing::debug;

use crate::{FileChange, GitError, RepoState};

/// Number of leading bytes inspected for NUL when sniffing binary files.
const BINARY_SNIFF_LEN: usize = 8000;

// ============================================================================
// Repository Location
// ============================================================================

/// Where a repository lives and which part of it is analyzed.
///
/// Only paths are stored; every operation opens its own handle and drops
/// it before returning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoLocation {
    git_dir: PathBuf,
    sub_directory: Option<String>,
}

impl RepoLocation {
    /// Discover the repository containing `path`.
    ///
    /// When `path` is below the top-level working directory, the relative
    /// remainder becomes the sub-directory every scan is restricted to.
    pub fn discover(path: impl AsRef<Path>) -> Result<Self, GitError> {
        let path = path.as_ref();
        let repo = Repository::discover(path)?;
        let workdir = repo.workdir().ok_or(GitError::BareRepository)?;

        let canonical_path = canonicalize(path)?;
        let canonical_workdir = canonicalize(workdir)?;
        let sub_directory = canonical_path
            .strip_prefix(&canonical_workdir)
            .ok()
            .map(|rel| {
                rel.components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect::<Vec<_>>()
                    .join("/")
            })
            .filter(|rel| !rel.is_empty());

        debug!(
            git_dir = %repo.path().display(),
            sub_directory = sub_directory.as_deref().unwrap_or(""),
            "discovered repository"
        );

        Ok(Self {
            git_dir: repo.path().to_path_buf(),
            sub_directory,
        })
    }

    /// Restrict scans to `sub_directory` (repo-relative, forward slashes).
    pub fn with_sub_directory(mut self, sub_directory: Option<&str>) -> Self {
        self.sub_directory = sub_directory
            .map(|s| s.trim_matches('/').replace('\\', "/"))
            .filter(|s| !s.is_empty());
        self
    }

    pub fn sub_directory(&self) -> Option<&str> {
        self.sub_directory.as_deref()
    }

    pub(crate) fn open(&self) -> Result<Repository, GitError> {
        Ok(Repository::open(&self.git_dir)?)
    }

    /// Whether a repo-relative path lies inside the sub-directory.
    pub fn contains(&self, path: &str) -> bool {
        match &self.sub_directory {
            Some(dir) => path
                .strip_prefix(dir.as_str())
                .is_some_and(|rest| rest.starts_with('/')),
            None => true,
        }
    }
}

fn canonicalize(path: &Path) -> Result<PathBuf, GitError> {
    path.canonicalize().map_err(|source| GitError::Io {
        path: path.display().to_string(),
        source,
    })
}

// ============================================================================
// Tree Differ
// ============================================================================

/// Computes whole-file changes between two repository states.
///
/// Renames surface as a deletion plus a creation. Binary content on either
/// side drops the path entirely.
#[derive(Debug, Clone)]
pub struct TreeDiffer {
    location: RepoLocation,
}

impl TreeDiffer {
    pub fn new(location: RepoLocation) -> Self {
        Self { location }
    }

    /// Changes from `previous` to `current`, restricted to the configured
    /// sub-directory and then to paths accepted by `filter`.
    ///
    /// `previous` must be a commit; `current` may be the working tree, in
    /// which case files are read from disk and untracked files count as
    /// creations.
    pub fn scan<F>(
        &self,
        previous: &RepoState,
        current: &RepoState,
        filter: F,
    ) -> Result<BTreeSet<FileChange>, GitError>
    where
        F: Fn(&str) -> bool,
    {
        let repo = self.location.open()?;
        let old_tree = tree_for(&repo, previous)?;

        let mut opts = DiffOptions::new();
        opts.ignore_filemode(true);

        let diff = match current {
            RepoState::WorkingTree => {
                opts.include_untracked(true)
                    .recurse_untracked_dirs(true)
                    .show_untracked_content(true);
                repo.diff_tree_to_workdir_with_index(Some(&old_tree), Some(&mut opts))?
            }
            RepoState::Object(_) => {
                let new_tree = tree_for(&repo, current)?;
                repo.diff_tree_to_tree(Some(&old_tree), Some(&new_tree), Some(&mut opts))?
            }
        };

        let mut changes = BTreeSet::new();
        for delta in diff.deltas() {
            let Some(path) = delta_path(&delta) else {
                continue;
            };
            if !self.location.contains(&path) || !filter(&path) {
                continue;
            }

            let (old_side, new_side) = match delta.status() {
                Delta::Added | Delta::Untracked => (false, true),
                Delta::Deleted => (true, false),
                Delta::Modified | Delta::Typechange | Delta::Conflicted => (true, true),
                _ => continue,
            };

            let previous_text = if old_side {
                match read_blob(&repo, delta.old_file().id())? {
                    Some(text) => Some(text),
                    None => {
                        debug!(path = %path, "skipping binary file");
                        continue;
                    }
                }
            } else {
                None
            };

            let current_text = if new_side {
                let text = match current {
                    RepoState::WorkingTree => read_workdir_file(&repo, &path)?,
                    RepoState::Object(_) => read_blob(&repo, delta.new_file().id())?,
                };
                match text {
                    Some(text) => Some(text),
                    None => {
                        debug!(path = %path, "skipping binary file");
                        continue;
                    }
                }
            } else {
                None
            };

            changes.insert(FileChange::new(path, previous_text, current_text)?);
        }

        debug!(
            previous = %previous,
            current = %current,
            changes = changes.len(),
            "scanned tree difference"
        );
        Ok(changes)
    }
}

fn delta_path(delta: &DiffDelta<'_>) -> Option<String> {
    delta
        .new_file()
        .path()
        .or_else(|| delta.old_file().path())
        .and_then(Path::to_str)
        .map(|p| p.replace('\\', "/"))
}

pub(crate) fn tree_for<'r>(repo: &'r Repository, state: &RepoState) -> Result<Tree<'r>, GitError> {
    match state {
        RepoState::Object(id) => {
            let oid = Oid::from_str(id)?;
            let commit = repo
                .find_commit(oid)
                .map_err(|_| GitError::UnresolvableReference {
                    expression: id.clone(),
                })?;
            Ok(commit.tree()?)
        }
        RepoState::WorkingTree => Err(GitError::WorkingTreeNotComparable),
    }
}

/// Blob content as text, or `None` for binary or non-UTF-8 data.
fn read_blob(repo: &Repository, id: Oid) -> Result<Option<String>, GitError> {
    let blob = repo.find_blob(id)?;
    if blob.is_binary() {
        return Ok(None);
    }
    Ok(String::from_utf8(blob.content().to_vec()).ok())
}

/// Working-tree file content as text, or `None` for binary data.
fn read_workdir_file(repo: &Repository, path: &str) -> Result<Option<String>, GitError> {
    let workdir = repo.workdir().ok_or(GitError::BareRepository)?;
    let full = workdir.join(path);
    let bytes = std::fs::read(&full).map_err(|source| GitError::Io {
        path: full.display().to_string(),
        source,
    })?;
    Ok(decode_text(bytes))
}

/// Decode bytes as UTF-8 text unless they look binary.
pub fn decode_text(bytes: Vec<u8>) -> Option<String> {
    let sniff = &bytes[..bytes.len().min(BINARY_SNIFF_LEN)];
    if sniff.contains(&0) {
        return None;
    }
    String::from_utf8(bytes).ok()
}

// ============================================================================
// Tests
// ============================================================================
