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

//! Ref store: named pointers under `refs/`, a `packed-refs` snapshot, and
//! the symbolic-chain resolution that backs `HEAD`.

pub mod reflog;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::digest::Digest;
use crate::error::{IoResultExt as _, RefError};
use crate::lock::LockFile;
use crate::object::commit::Signature;
use reflog::ReflogEntry;

const MAX_SYMBOLIC_DEPTH: usize = 5;

/// What a name resolved to after following (or not following) symbolic
/// links.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resolved {
    Digest(Digest),
    /// Only returned when `resolve` is called with `deref = false` and the
    /// name's immediate value is itself symbolic.
    Symbolic(String),
}

fn is_forbidden_component(component: &str) -> bool {
    component.starts_with('.')
        || component == ".."
        || component.ends_with(".lock")
        || component
            .chars()
            .any(|c| c.is_ascii_control() || "~^:?*[\\".contains(c))
}

/// Validates `name` against the on-disk naming rules: no component starting
/// with `.`, no `..`, no control characters or `~^:?*[\`, no trailing
/// `.lock`, no leading or doubled `/`.
pub fn check_ref_format(name: &str) -> Result<(), RefError> {
    if name.is_empty() || name.starts_with('/') || name.ends_with('/') || name.contains("//") {
        return Err(RefError::InvalidName(name.to_owned()));
    }
    for component in name.split('/') {
        if component.is_empty() || is_forbidden_component(component) {
            return Err(RefError::InvalidName(name.to_owned()));
        }
    }
    Ok(())
}

fn loose_ref_path(git_dir: &Path, name: &str) -> PathBuf {
    git_dir.join(name)
}

fn read_loose_ref(git_dir: &Path, name: &str) -> Result<Option<String>, RefError> {
    let path = loose_ref_path(git_dir, name);
    if !path.is_file() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(&path).context(&path).map_err(RefError::Io)?;
    Ok(Some(content.trim_end().to_owned()))
}

fn read_packed_refs(git_dir: &Path) -> Result<BTreeMap<String, Digest>, RefError> {
    let path = git_dir.join("packed-refs");
    let mut entries = BTreeMap::new();
    if !path.is_file() {
        return Ok(entries);
    }
    let content = std::fs::read_to_string(&path).context(&path).map_err(RefError::Io)?;
    for line in content.lines() {
        if line.starts_with('#') || line.starts_with('^') {
            continue;
        }
        if let Some((hex, name)) = line.split_once(' ') {
            if let Ok(digest) = Digest::from_hex(hex) {
                entries.insert(name.to_owned(), digest);
            }
        }
    }
    Ok(entries)
}

/// One directory of loose refs plus the matching `packed-refs` snapshot.
#[derive(Debug)]
pub struct RefStore {
    git_dir: PathBuf,
}

impl RefStore {
    pub fn new(git_dir: impl Into<PathBuf>) -> Self {
        Self {
            git_dir: git_dir.into(),
        }
    }

    /// Reads `name`'s immediate value: a loose ref shadows a packed one.
    fn read_one(&self, name: &str) -> Result<Option<Resolved>, RefError> {
        if let Some(content) = read_loose_ref(&self.git_dir, name)? {
            if let Some(target) = content.strip_prefix("ref: ") {
                return Ok(Some(Resolved::Symbolic(target.trim().to_owned())));
            }
            let digest = Digest::from_hex(content.trim())
                .map_err(|_| RefError::InvalidName(content.clone()))?;
            return Ok(Some(Resolved::Digest(digest)));
        }
        let packed = read_packed_refs(&self.git_dir)?;
        Ok(packed.get(name).map(|d| Resolved::Digest(*d)))
    }

    /// Resolves `name`, following symbolic chains up to [`MAX_SYMBOLIC_DEPTH`]
    /// unless `deref` is false. Returns the name actually holding the
    /// digest, the digest, and whether that final hop was symbolic.
    pub fn resolve(&self, name: &str, deref: bool) -> Result<(String, Digest, bool), RefError> {
        check_ref_format(name)?;
        let mut current = name.to_owned();
        let mut visited = vec![current.clone()];
        let mut was_symbolic = false;
        loop {
            match self.read_one(&current)?.ok_or_else(|| RefError::NotFound(current.clone()))? {
                Resolved::Digest(digest) => {
                    tracing::trace!(name, %digest, was_symbolic, "resolved reference");
                    return Ok((current, digest, was_symbolic));
                }
                Resolved::Symbolic(target) => {
                    was_symbolic = true;
                    if !deref {
                        return Err(RefError::SelfReferential(current));
                    }
                    if visited.contains(&target) {
                        return Err(RefError::SelfReferential(target));
                    }
                    if visited.len() >= MAX_SYMBOLIC_DEPTH {
                        return Err(RefError::ChainTooDeep(name.to_owned()));
                    }
                    visited.push(target.clone());
                    current = target;
                }
            }
        }
    }

    /// Acquires `name`'s lock, verifies `old_digest` (when given) against
    /// the current value, writes `new_digest`, and appends a reflog record
    /// when `committer` is supplied.
    #[tracing::instrument(skip(self, committer))]
    pub fn update(
        &self,
        name: &str,
        new_digest: Digest,
        old_digest: Option<Digest>,
        committer: Option<(&Signature, &str)>,
    ) -> Result<(), RefError> {
        check_ref_format(name)?;
        let path = loose_ref_path(&self.git_dir, name);
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).context(dir).map_err(RefError::Io)?;
        }

        let current = self.read_one(name)?;
        let current_digest = match &current {
            Some(Resolved::Digest(d)) => Some(*d),
            _ => None,
        };
        if let Some(expected) = old_digest {
            if current_digest != Some(expected) {
                tracing::warn!(name, ?current_digest, ?expected, "ref update rejected by compare-and-swap");
                return Err(RefError::Cas {
                    name: name.to_owned(),
                    expected: old_digest,
                });
            }
        }

        let mut lock = LockFile::acquire(&path).map_err(|e| match e {
            crate::error::LockError::AlreadyLocked { path } => {
                RefError::InvalidName(format!("{} is locked", path.display()))
            }
            crate::error::LockError::Io(path_error) => RefError::Io(path_error),
        })?;
        lock.write_all(format!("{new_digest}\n").as_bytes())
            .map_err(|e| match e {
                crate::error::LockError::Io(path_error) => RefError::Io(path_error),
                crate::error::LockError::AlreadyLocked { .. } => unreachable!(),
            })?;
        lock.commit().map_err(|e| match e {
            crate::error::LockError::Io(path_error) => RefError::Io(path_error),
            crate::error::LockError::AlreadyLocked { .. } => unreachable!(),
        })?;

        if let Some((signature, message)) = committer {
            reflog::append(
                &self.git_dir,
                name,
                &ReflogEntry {
                    old_digest: current_digest.unwrap_or(Digest::NULL),
                    new_digest,
                    committer: signature.clone(),
                    message: message.to_owned(),
                },
            )?;
        }
        tracing::info!(name, %new_digest, "updated reference");
        Ok(())
    }

    /// Locks, verifies, unlinks `name`, and appends a final reflog record.
    #[tracing::instrument(skip(self, committer))]
    pub fn delete(
        &self,
        name: &str,
        old_digest: Option<Digest>,
        committer: Option<(&Signature, &str)>,
    ) -> Result<(), RefError> {
        check_ref_format(name)?;
        let path = loose_ref_path(&self.git_dir, name);
        let current_digest = match self.read_one(name)? {
            Some(Resolved::Digest(d)) => Some(d),
            Some(Resolved::Symbolic(_)) | None => None,
        };
        if let Some(expected) = old_digest {
            if current_digest != Some(expected) {
                tracing::warn!(name, ?current_digest, ?expected, "ref delete rejected by compare-and-swap");
                return Err(RefError::Cas {
                    name: name.to_owned(),
                    expected: old_digest,
                });
            }
        }

        let lock = LockFile::acquire(&path).map_err(|e| match e {
            crate::error::LockError::AlreadyLocked { path } => {
                RefError::InvalidName(format!("{} is locked", path.display()))
            }
            crate::error::LockError::Io(path_error) => RefError::Io(path_error),
        })?;
        if path.is_file() {
            std::fs::remove_file(&path).context(&path).map_err(RefError::Io)?;
        }
        lock.rollback();

        if let (Some(digest), Some((signature, message))) = (current_digest, committer) {
            reflog::append(
                &self.git_dir,
                name,
                &ReflogEntry {
                    old_digest: digest,
                    new_digest: Digest::NULL,
                    committer: signature.clone(),
                    message: message.to_owned(),
                },
            )?;
        }
        tracing::info!(name, "deleted reference");
        Ok(())
    }

    /// Enumerates refs under `prefix` in lexicographic order, merging loose
    /// and packed sources with loose taking precedence.
    pub fn for_each(&self, prefix: &str, mut callback: impl FnMut(&str, Digest)) -> Result<(), RefError> {
        let mut merged = read_packed_refs(&self.git_dir)?;

        let refs_dir = self.git_dir.join("refs");
        if refs_dir.is_dir() {
            let mut stack = vec![refs_dir.clone()];
            while let Some(dir) = stack.pop() {
                for entry in std::fs::read_dir(&dir).context(&dir).map_err(RefError::Io)? {
                    let entry = entry.context(&dir).map_err(RefError::Io)?;
                    let path = entry.path();
                    if path.is_dir() {
                        stack.push(path);
                        continue;
                    }
                    let name = path
                        .strip_prefix(&self.git_dir)
                        .unwrap()
                        .to_string_lossy()
                        .replace('\\', "/");
                    if let Some(Resolved::Digest(digest)) = self.read_one(&name)? {
                        merged.insert(name, digest);
                    }
                }
            }
        }

        for (name, digest) in merged.range(prefix.to_owned()..) {
            if !name.starts_with(prefix) {
                break;
            }
            callback(name, *digest);
        }
        Ok(())
    }
}
