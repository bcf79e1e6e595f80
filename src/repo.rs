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

//! Binds the object store, ref store, index, and configuration of one
//! on-disk repository together, discovering or opening it the way the
//! environment tells it to.

use std::cell::OnceCell;
use std::env;
use std::path::{Path, PathBuf};

use crate::config::{ConfigSource, StackedConfig};
use crate::digest::CommitId;
use crate::error::{IoResultExt as _, ObjectError, RepoError};
use crate::graph::CommitProvider;
use crate::index::Index;
use crate::object::ObjectType;
use crate::object::commit::{Commit, Graft, GraftTable, Timestamp};
use crate::refs::RefStore;
use crate::store::ObjectStore;

/// One on-disk repository: its git directory, an optional working tree, and
/// the lazily-opened store/ref/index/graft state that hangs off it.
#[derive(Debug)]
pub struct Repository {
    git_dir: PathBuf,
    work_tree: Option<PathBuf>,
    config: StackedConfig,
    objects: OnceCell<ObjectStore>,
    refs: OnceCell<RefStore>,
    index: OnceCell<Index>,
    grafts: OnceCell<GraftTable>,
    object_dir_override: Option<PathBuf>,
    index_path_override: Option<PathBuf>,
}

fn gitdir_file_target(dir: &Path, contents: &str) -> Option<PathBuf> {
    let target = contents.trim().strip_prefix("gitdir: ")?.trim();
    let target = Path::new(target);
    Some(if target.is_absolute() {
        target.to_path_buf()
    } else {
        dir.join(target)
    })
}

fn looks_like_git_dir(dir: &Path) -> bool {
    dir.join("HEAD").is_file() && dir.join("objects").is_dir() && dir.join("refs").is_dir()
}

impl Repository {
    /// Walks upward from `start_dir` looking for a `.git` directory, a
    /// `.git` file pointing elsewhere (the worktree/submodule redirect), or
    /// a directory that is itself laid out like a bare repository.
    /// `GIT_DIR` short-circuits the walk entirely when set.
    pub fn discover(start_dir: impl AsRef<Path>) -> Result<Self, RepoError> {
        if let Ok(git_dir) = env::var("GIT_DIR") {
            return Self::open(PathBuf::from(git_dir));
        }

        let start_dir = start_dir.as_ref();
        let mut dir = start_dir.to_path_buf();
        loop {
            let candidate = dir.join(".git");
            if candidate.is_dir() {
                return Self::open(candidate);
            }
            if candidate.is_file() {
                let contents = std::fs::read_to_string(&candidate).context(&candidate).map_err(RepoError::Io)?;
                if let Some(target) = gitdir_file_target(&dir, &contents) {
                    return Self::open(target);
                }
            }
            if looks_like_git_dir(&dir) {
                return Self::open(dir);
            }
            dir = match dir.parent() {
                Some(parent) => parent.to_path_buf(),
                None => return Err(RepoError::NotARepository(start_dir.to_path_buf())),
            };
        }
    }

    /// Binds directly to `git_dir` without walking the filesystem to find
    /// it. `core.repositoryformatversion` is validated before anything else
    /// runs: an unrecognized version is a hard error.
    pub fn open(git_dir: impl Into<PathBuf>) -> Result<Self, RepoError> {
        let git_dir = git_dir.into();

        let mut config = StackedConfig::new();
        let config_path = git_dir.join("config");
        if config_path.is_file() {
            let text = std::fs::read_to_string(&config_path).context(&config_path).map_err(RepoError::Io)?;
            config.load_ini(ConfigSource::Repo, &text);
        }
        config.load_env(env::vars());

        let version = config.core_repository_format_version()?;
        if version != 0 {
            return Err(RepoError::UnsupportedRepositoryFormatVersion(version));
        }

        let work_tree = match env::var("GIT_WORK_TREE") {
            Ok(path) => Some(PathBuf::from(path)),
            Err(_) if config.core_bare()? => None,
            Err(_) => git_dir.parent().map(Path::to_path_buf),
        };

        Ok(Self {
            git_dir,
            work_tree,
            config,
            objects: OnceCell::new(),
            refs: OnceCell::new(),
            index: OnceCell::new(),
            grafts: OnceCell::new(),
            object_dir_override: env::var("GIT_OBJECT_DIRECTORY").ok().map(PathBuf::from),
            index_path_override: env::var("GIT_INDEX_FILE").ok().map(PathBuf::from),
        })
    }

    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    pub fn work_tree(&self) -> Option<&Path> {
        self.work_tree.as_deref()
    }

    pub fn config(&self) -> &StackedConfig {
        &self.config
    }

    /// The object store, opened (and its `info/alternates` chain resolved)
    /// on first access.
    pub fn objects(&self) -> Result<&ObjectStore, RepoError> {
        if let Some(store) = self.objects.get() {
            return Ok(store);
        }
        let primary = self
            .object_dir_override
            .clone()
            .unwrap_or_else(|| self.git_dir.join("objects"));
        let store = ObjectStore::open(primary)?;
        Ok(self.objects.get_or_init(|| store))
    }

    pub fn refs(&self) -> &RefStore {
        self.refs.get_or_init(|| RefStore::new(self.git_dir.clone()))
    }

    /// The staged index, read from `GIT_INDEX_FILE` or `<git_dir>/index` on
    /// first access. An absent file reads as an empty index.
    pub fn index(&self) -> Result<&Index, RepoError> {
        if let Some(index) = self.index.get() {
            return Ok(index);
        }
        let path = self
            .index_path_override
            .clone()
            .unwrap_or_else(|| self.git_dir.join("index"));
        let index = Index::read(&path)?;
        Ok(self.index.get_or_init(|| index))
    }

    /// The graft table, read from `GIT_GRAFT_FILE` or
    /// `<git_dir>/info/grafts` on first access. A graft line with no parent
    /// digests listed marks the commit shallow.
    pub fn grafts(&self) -> Result<&GraftTable, RepoError> {
        if let Some(grafts) = self.grafts.get() {
            return Ok(grafts);
        }
        let path = env::var("GIT_GRAFT_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| self.git_dir.join("info").join("grafts"));
        let table = load_grafts(&path)?;
        Ok(self.grafts.get_or_init(|| table))
    }

    /// Reads and parses the commit object `id`, applying the repository's
    /// graft table.
    pub fn read_commit(&self, id: CommitId) -> Result<Commit, RepoError> {
        let (object_type, payload) = self.objects()?.read(&id.digest())?;
        if object_type != ObjectType::Commit {
            return Err(RepoError::Object(ObjectError::Corrupt {
                digest: id.digest(),
                reason: format!("expected a commit object, found {}", object_type.as_str()),
            }));
        }
        let text = std::str::from_utf8(&payload).map_err(|_| {
            RepoError::Object(ObjectError::Corrupt {
                digest: id.digest(),
                reason: "commit payload is not valid UTF-8".to_owned(),
            })
        })?;
        let grafts = self.grafts()?;
        Commit::parse(id, text, grafts).map_err(|e| {
            RepoError::Object(ObjectError::Corrupt {
                digest: id.digest(),
                reason: e.to_string(),
            })
        })
    }
}

impl CommitProvider for Repository {
    type Error = RepoError;

    fn parents(&self, id: CommitId) -> Result<Vec<CommitId>, Self::Error> {
        Ok(self.read_commit(id)?.parents().to_vec())
    }

    fn timestamp(&self, id: CommitId) -> Result<Timestamp, Self::Error> {
        Ok(self.read_commit(id)?.committer().timestamp)
    }
}

fn load_grafts(path: &Path) -> Result<GraftTable, RepoError> {
    let mut table = GraftTable::new();
    if !path.is_file() {
        return Ok(table);
    }
    let text = std::fs::read_to_string(path).context(path).map_err(RepoError::Io)?;
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut ids = line.split_whitespace();
        let Some(commit_hex) = ids.next() else { continue };
        let Ok(commit) = CommitId::from_hex(commit_hex) else { continue };
        let parents: Vec<CommitId> = ids.filter_map(|hex| CommitId::from_hex(hex).ok()).collect();
        if parents.is_empty() {
            table.insert(commit, Graft::Shallow);
        } else {
            table.insert(commit, Graft::Parents(parents));
        }
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::commit::Signature;

    fn write_commit(store: &ObjectStore, tree: &str, parents: &[CommitId], seconds: i64) -> CommitId {
        let mut text = format!("tree {tree}\n");
        for parent in parents {
            text.push_str(&format!("parent {}\n", parent.hex()));
        }
        let signature = Signature {
            name: "A".to_owned(),
            email: "a@example.com".to_owned(),
            timestamp: Timestamp {
                seconds,
                tz_offset_minutes: 0,
            },
        };
        text.push_str(&format!("author {signature}\ncommitter {signature}\n\nmsg"));
        let digest = store.write(ObjectType::Commit, text.as_bytes()).unwrap();
        CommitId::new(digest)
    }

    fn init_bare(dir: &Path) {
        std::fs::create_dir_all(dir.join("objects")).unwrap();
        std::fs::create_dir_all(dir.join("refs")).unwrap();
        std::fs::write(dir.join("HEAD"), b"ref: refs/heads/main\n").unwrap();
    }

    #[test]
    fn open_rejects_unsupported_format_version() {
        let dir = tempfile::tempdir().unwrap();
        init_bare(dir.path());
        std::fs::write(dir.path().join("config"), "[core]\n\trepositoryformatversion = 9\n").unwrap();
        let err = Repository::open(dir.path()).unwrap_err();
        assert!(matches!(err, RepoError::UnsupportedRepositoryFormatVersion(9)));
    }

    #[test]
    fn discover_walks_up_to_a_bare_layout() {
        let dir = tempfile::tempdir().unwrap();
        init_bare(dir.path());
        let nested = dir.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();
        let repo = Repository::discover(&nested).unwrap();
        assert_eq!(repo.git_dir(), dir.path());
    }

    #[test]
    fn discover_fails_outside_any_repository() {
        let dir = tempfile::tempdir().unwrap();
        let err = Repository::discover(dir.path()).unwrap_err();
        assert!(matches!(err, RepoError::NotARepository(_)));
    }

    #[test]
    fn read_commit_round_trips_through_the_object_store() {
        let dir = tempfile::tempdir().unwrap();
        init_bare(dir.path());
        let repo = Repository::open(dir.path()).unwrap();
        let tree_hex = "0".repeat(39) + "a";
        let id = write_commit(repo.objects().unwrap(), &tree_hex, &[], 100);
        let commit = repo.read_commit(id).unwrap();
        assert_eq!(commit.tree().hex(), tree_hex);
        assert_eq!(repo.parents(id).unwrap(), Vec::<CommitId>::new());
        assert_eq!(repo.timestamp(id).unwrap().seconds, 100);
    }

    #[test]
    fn grafts_mark_a_commit_shallow() {
        let dir = tempfile::tempdir().unwrap();
        init_bare(dir.path());
        let repo = Repository::open(dir.path()).unwrap();
        let tree_hex = "0".repeat(39) + "a";
        let parent = write_commit(repo.objects().unwrap(), &tree_hex, &[], 1);
        let child = write_commit(repo.objects().unwrap(), &tree_hex, &[parent], 2);

        std::fs::create_dir_all(dir.path().join("info")).unwrap();
        std::fs::write(dir.path().join("info").join("grafts"), format!("{}\n", child.hex())).unwrap();

        assert_eq!(repo.parents(child).unwrap(), Vec::<CommitId>::new());
    }
}
