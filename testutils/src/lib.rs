// Copyright 2024 The gitcore Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Throwaway repository builder and graph-shape assertions shared by
//! gitcore's own multi-module tests.

use std::collections::HashSet;
use std::path::PathBuf;

use gitcore::digest::{CommitId, TreeId};
use gitcore::graph::{self, CommitProvider};
use gitcore::object::ObjectFlags;
use gitcore::object::ObjectType;
use gitcore::object::commit::{Signature, Timestamp};
use gitcore::object::tree::Tree;
use gitcore::repo::Repository;
use tempfile::TempDir;

/// A bare repository rooted in a temp directory, torn down when dropped.
/// `write_commit` builds commits directly against the object store,
/// sidestepping the staged index, which is exactly what graph and ref-store
/// scenarios need.
pub struct TestRepo {
    _dir: TempDir,
    git_dir: PathBuf,
    repo: Repository,
}

impl TestRepo {
    pub fn init() -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        let git_dir = dir.path().join(".git");
        std::fs::create_dir_all(git_dir.join("objects")).unwrap();
        std::fs::create_dir_all(git_dir.join("refs")).unwrap();
        std::fs::write(git_dir.join("HEAD"), b"ref: refs/heads/main\n").unwrap();
        let repo = Repository::open(&git_dir).expect("open freshly initialized repository");
        Self {
            _dir: dir,
            git_dir,
            repo,
        }
    }

    pub fn repo(&self) -> &Repository {
        &self.repo
    }

    pub fn git_dir(&self) -> &std::path::Path {
        &self.git_dir
    }

    /// Writes the empty tree object and returns its id. Every commit built
    /// by this harness points at it: graph and ref-store scenarios don't
    /// exercise tree contents, only commit/parent shape.
    pub fn empty_tree(&self) -> TreeId {
        let tree = Tree::empty();
        let digest = self
            .repo
            .objects()
            .unwrap()
            .write(ObjectType::Tree, &tree.serialize())
            .unwrap();
        TreeId::new(digest)
    }

    /// Writes a commit object with the given parents and committer seconds,
    /// all pointed at the empty tree, and returns its id.
    pub fn write_commit(&self, parents: &[CommitId], seconds: i64) -> CommitId {
        self.write_commit_with_tree(&self.empty_tree().hex(), parents, seconds)
    }

    pub fn write_commit_with_tree(&self, tree_hex: &str, parents: &[CommitId], seconds: i64) -> CommitId {
        let mut text = format!("tree {tree_hex}\n");
        for parent in parents {
            text.push_str(&format!("parent {}\n", parent.hex()));
        }
        let signature = Signature {
            name: "Test Author".to_owned(),
            email: "author@example.com".to_owned(),
            timestamp: Timestamp {
                seconds,
                tz_offset_minutes: 0,
            },
        };
        text.push_str(&format!("author {signature}\ncommitter {signature}\n\ntest commit"));
        let digest = self
            .repo
            .objects()
            .unwrap()
            .write(ObjectType::Commit, text.as_bytes())
            .unwrap();
        CommitId::new(digest)
    }

    /// Points `refs/heads/<name>` at `target`, with no old-value check.
    pub fn set_branch(&self, name: &str, target: CommitId) {
        self.repo
            .refs()
            .update(&format!("refs/heads/{name}"), target.digest(), None, None)
            .unwrap();
    }
}

/// Asserts that `actual` contains exactly the commits in `expected`,
/// ignoring order, with a message naming the symmetric difference on
/// failure rather than just "assertion failed".
pub fn assert_commit_set_eq(actual: impl IntoIterator<Item = CommitId>, expected: impl IntoIterator<Item = CommitId>) {
    let actual: HashSet<CommitId> = actual.into_iter().collect();
    let expected: HashSet<CommitId> = expected.into_iter().collect();
    if actual != expected {
        let missing: Vec<_> = expected.difference(&actual).collect();
        let extra: Vec<_> = actual.difference(&expected).collect();
        panic!("commit sets differ: missing {missing:?}, unexpected {extra:?}");
    }
}

/// Every ancestor of `tip` (including itself), for tests that want "is this
/// commit set exactly the ancestry of X".
pub fn ancestors_of<P: CommitProvider>(provider: &P, tip: CommitId) -> Vec<CommitId>
where
    P::Error: std::fmt::Debug,
{
    let mut flags = graph::FlagTable::new();
    graph::mark_reachable(provider, &mut flags, [tip], ObjectFlags::REACHABLE).unwrap();
    let mut visited = vec![tip];
    let mut stack = vec![tip];
    let mut seen = HashSet::from([tip]);
    while let Some(id) = stack.pop() {
        for parent in provider.parents(id).unwrap() {
            if seen.insert(parent) {
                visited.push(parent);
                stack.push(parent);
            }
        }
    }
    visited
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_commit_round_trips_through_the_repository() {
        let repo = TestRepo::init();
        let root = repo.write_commit(&[], 1_000);
        let tip = repo.write_commit(&[root], 2_000);
        let commit = repo.repo().read_commit(tip).unwrap();
        assert_eq!(commit.parents(), &[root]);
    }

    #[test]
    fn assert_commit_set_eq_ignores_order() {
        let repo = TestRepo::init();
        let a = repo.write_commit(&[], 1);
        let b = repo.write_commit(&[], 2);
        assert_commit_set_eq([b, a], [a, b]);
    }

    #[test]
    #[should_panic(expected = "commit sets differ")]
    fn assert_commit_set_eq_panics_on_mismatch() {
        let repo = TestRepo::init();
        let a = repo.write_commit(&[], 1);
        let b = repo.write_commit(&[], 2);
        assert_commit_set_eq([a], [a, b]);
    }

    #[test]
    fn set_branch_points_refs_heads_at_target() {
        let repo = TestRepo::init();
        let tip = repo.write_commit(&[], 1);
        repo.set_branch("main", tip);
        let (_, digest, _) = repo.repo().refs().resolve("refs/heads/main", true).unwrap();
        assert_eq!(digest, tip.digest());
    }
}
