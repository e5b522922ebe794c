//! Throwaway repositories for adapter tests.

use std::fs;
use std::path::Path;

use git2::{IndexAddOption, Oid, Repository, Signature, Time};
use tempfile::TempDir;

use crate::{RepoLocation, RepoState};

pub struct TestRepo {
    dir: TempDir,
    repo: Repository,
}

impl TestRepo {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let repo = Repository::init(dir.path()).expect("init repository");
        Self { dir, repo }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn location(&self) -> RepoLocation {
        RepoLocation::discover(self.dir.path()).expect("discover repository")
    }

    pub fn write(&self, path: &str, content: &str) {
        self.write_bytes(path, content.as_bytes());
    }

    pub fn write_bytes(&self, path: &str, content: &[u8]) {
        let full = self.dir.path().join(path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).expect("create dirs");
        }
        fs::write(full, content).expect("write file");
    }

    pub fn remove(&self, path: &str) {
        fs::remove_file(self.dir.path().join(path)).expect("remove file");
    }

    fn signature(time: i64) -> Signature<'static> {
        Signature::new("testgap", "testgap@example.com", &Time::new(time, 0)).expect("signature")
    }

    /// Stage everything and commit at `time` (seconds since the epoch).
    pub fn commit(&self, message: &str, time: i64) -> RepoState {
        let mut index = self.repo.index().expect("index");
        index
            .add_all(["*"].iter(), IndexAddOption::DEFAULT, None)
            .expect("add all");
        index.update_all(["*"].iter(), None).expect("update all");
        index.write().expect("write index");
        let tree_id = index.write_tree().expect("write tree");
        let tree = self.repo.find_tree(tree_id).expect("find tree");

        let sig = Self::signature(time);
        let parent = self.repo.head().ok().and_then(|h| h.peel_to_commit().ok());
        let parents: Vec<_> = parent.iter().collect();
        let oid = self
            .repo
            .commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
            .expect("commit");
        RepoState::object(&oid.to_string()).expect("object id")
    }

    fn object(&self, state: &RepoState) -> git2::Object<'_> {
        let oid = Oid::from_str(state.as_str()).expect("oid");
        self.repo.find_object(oid, None).expect("object")
    }

    pub fn tag_lightweight(&self, name: &str, state: &RepoState) {
        let object = self.object(state);
        self.repo
            .tag_lightweight(name, &object, false)
            .expect("lightweight tag");
    }

    pub fn tag_annotated(&self, name: &str, state: &RepoState, time: i64) {
        let object = self.object(state);
        self.repo
            .tag(name, &object, &Self::signature(time), name, false)
            .expect("annotated tag");
    }

    pub fn branch(&self, name: &str, state: &RepoState) {
        let commit = self
            .repo
            .find_commit(Oid::from_str(state.as_str()).expect("oid"))
            .expect("commit");
        self.repo.branch(name, &commit, false).expect("branch");
    }
}
