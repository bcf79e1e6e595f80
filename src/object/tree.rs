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

//! Tree entries and the binary tree-object format: a sequence of
//! `<mode> SP <name> NUL <20-byte digest>` records in "path-order".

use thiserror::Error;

use crate::digest::{BlobId, Digest, TreeId};
use crate::path::{RepoPathComponent, RepoPathComponentBuf};

/// Valid (and tolerated) file modes for a tree entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    Regular,
    Executable,
    Symlink,
    Subtree,
    /// `0100664`, tolerated only when the tree is parsed in non-strict mode.
    RegularGroupWritable,
}

impl Mode {
    pub fn octal(self) -> u32 {
        match self {
            Self::Regular => 0o100644,
            Self::Executable => 0o100755,
            Self::Symlink => 0o120000,
            Self::Subtree => 0o040000,
            Self::RegularGroupWritable => 0o100664,
        }
    }

    pub fn from_octal(mode: u32, strict: bool) -> Option<Self> {
        match mode {
            0o100644 => Some(Self::Regular),
            0o100755 => Some(Self::Executable),
            0o120000 => Some(Self::Symlink),
            0o040000 => Some(Self::Subtree),
            0o100664 if !strict => Some(Self::RegularGroupWritable),
            _ => None,
        }
    }

    pub fn is_subtree(self) -> bool {
        matches!(self, Self::Subtree)
    }
}

/// What a tree entry's digest identifies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TreeValue {
    Blob(BlobId),
    Tree(TreeId),
}

impl TreeValue {
    pub fn digest(self) -> Digest {
        match self {
            Self::Blob(id) => id.digest(),
            Self::Tree(id) => id.digest(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct TreeEntry {
    pub name: RepoPathComponentBuf,
    pub mode: Mode,
    pub value: TreeValue,
}

/// Errors rejected while parsing a tree's binary payload.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TreeParseError {
    #[error("truncated tree entry")]
    Truncated,
    #[error("invalid mode {0:o}")]
    InvalidMode(u32),
    #[error("empty or malformed entry name")]
    InvalidName,
    #[error("duplicate entry name {0:?}")]
    DuplicateName(String),
    #[error("entries out of path-order at {0:?}")]
    OutOfOrder(String),
}

#[derive(Clone, Debug, Default)]
pub struct Tree {
    id: Option<TreeId>,
    entries: Vec<TreeEntry>,
}

/// Compares two entry names the way tree order does: a literal byte-for-byte
/// compare over their shared length, falling back to a virtual trailing `/`
/// for whichever name is fully consumed at that point and names a subtree.
/// Two names that are byte-for-byte identical compare `Equal` regardless of
/// type — that's a duplicate entry, not an ordering tie, matching git's own
/// `verify_ordered` (the `if (!c1 && !c2) return TREE_HAS_DUPS` check runs
/// before either zero byte is turned into a `/`).
fn compare_entry_order(name1: &str, is_subtree1: bool, name2: &str, is_subtree2: bool) -> std::cmp::Ordering {
    let b1 = name1.as_bytes();
    let b2 = name2.as_bytes();
    let len = b1.len().min(b2.len());
    match b1[..len].cmp(&b2[..len]) {
        std::cmp::Ordering::Equal => {}
        other => return other,
    }
    let c1 = b1.get(len).copied();
    let c2 = b2.get(len).copied();
    if c1.is_none() && c2.is_none() {
        return std::cmp::Ordering::Equal;
    }
    let c1 = c1.or(is_subtree1.then_some(b'/'));
    let c2 = c2.or(is_subtree2.then_some(b'/'));
    c1.cmp(&c2)
}

impl Tree {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parses the binary on-disk payload, validating path-order and
    /// rejecting duplicate names. `strict` controls whether the tolerated
    /// `0100664` mode is accepted.
    pub fn parse(id: TreeId, data: &[u8], strict: bool) -> Result<Self, TreeParseError> {
        let mut entries = Vec::new();
        let mut prev: Option<(String, bool)> = None;
        let mut rest = data;
        while !rest.is_empty() {
            let space = rest
                .iter()
                .position(|&b| b == b' ')
                .ok_or(TreeParseError::Truncated)?;
            let mode_str =
                std::str::from_utf8(&rest[..space]).map_err(|_| TreeParseError::InvalidMode(0))?;
            let mode_num =
                u32::from_str_radix(mode_str, 8).map_err(|_| TreeParseError::InvalidMode(0))?;
            let mode = Mode::from_octal(mode_num, strict)
                .ok_or(TreeParseError::InvalidMode(mode_num))?;
            rest = &rest[space + 1..];

            let nul = rest
                .iter()
                .position(|&b| b == 0)
                .ok_or(TreeParseError::Truncated)?;
            if nul == 0 {
                return Err(TreeParseError::InvalidName);
            }
            let name = std::str::from_utf8(&rest[..nul]).map_err(|_| TreeParseError::InvalidName)?;
            rest = &rest[nul + 1..];

            if rest.len() < 20 {
                return Err(TreeParseError::Truncated);
            }
            let digest = Digest::from_slice(&rest[..20]).ok_or(TreeParseError::Truncated)?;
            rest = &rest[20..];

            if let Some((prev_name, prev_is_subtree)) = &prev {
                match compare_entry_order(name, mode.is_subtree(), prev_name, *prev_is_subtree) {
                    std::cmp::Ordering::Equal => {
                        return Err(TreeParseError::DuplicateName(name.to_owned()));
                    }
                    std::cmp::Ordering::Less => {
                        return Err(TreeParseError::OutOfOrder(name.to_owned()));
                    }
                    std::cmp::Ordering::Greater => {}
                }
            }
            prev = Some((name.to_owned(), mode.is_subtree()));

            let value = if mode.is_subtree() {
                TreeValue::Tree(TreeId::new(digest))
            } else {
                TreeValue::Blob(BlobId::new(digest))
            };
            let name =
                RepoPathComponentBuf::new(name).map_err(|_| TreeParseError::InvalidName)?;
            entries.push(TreeEntry { name, mode, value });
        }
        Ok(Self {
            id: Some(id),
            entries,
        })
    }

    /// Serializes entries back to the canonical binary form. Entries must
    /// already be in path-order (callers build trees via [`Self::from_sorted_entries`]).
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for entry in &self.entries {
            out.extend(format!("{:o} ", entry.mode.octal()).into_bytes());
            out.extend(entry.name.as_str().as_bytes());
            out.push(0);
            out.extend(entry.value.digest().as_bytes());
        }
        out
    }

    /// Builds a tree from entries already in path-order; returns an error on
    /// duplicate or misordered names, matching what [`Self::parse`] enforces.
    pub fn from_sorted_entries(entries: Vec<TreeEntry>) -> Result<Self, TreeParseError> {
        for window in entries.windows(2) {
            let (prev, current) = (&window[0], &window[1]);
            match compare_entry_order(
                current.name.as_str(),
                current.mode.is_subtree(),
                prev.name.as_str(),
                prev.mode.is_subtree(),
            ) {
                std::cmp::Ordering::Equal => {
                    return Err(TreeParseError::DuplicateName(current.name.as_str().to_owned()));
                }
                std::cmp::Ordering::Less => {
                    return Err(TreeParseError::OutOfOrder(current.name.as_str().to_owned()));
                }
                std::cmp::Ordering::Greater => {}
            }
        }
        Ok(Self { id: None, entries })
    }

    pub fn id(&self) -> Option<TreeId> {
        self.id
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[TreeEntry] {
        &self.entries
    }

    pub fn entry(&self, name: &RepoPathComponent) -> Option<&TreeEntry> {
        self.entries.iter().find(|e| &*e.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, is_dir: bool, byte: u8) -> TreeEntry {
        let mut bytes = [0u8; 20];
        bytes[19] = byte;
        let digest = Digest::from_bytes(bytes);
        let (mode, value) = if is_dir {
            (Mode::Subtree, TreeValue::Tree(TreeId::new(digest)))
        } else {
            (Mode::Regular, TreeValue::Blob(BlobId::new(digest)))
        };
        TreeEntry {
            name: RepoPathComponentBuf::new(name).unwrap(),
            mode,
            value,
        }
    }

    #[test]
    fn serialize_then_parse_round_trips() {
        let tree =
            Tree::from_sorted_entries(vec![entry("abc", false, 1), entry("dir", true, 2)]).unwrap();
        let bytes = tree.serialize();
        let id = TreeId::from_hex("0000000000000000000000000000000000000a").unwrap();
        let parsed = Tree::parse(id, &bytes, true).unwrap();
        assert_eq!(parsed.entries().len(), 2);
        assert_eq!(parsed.entries()[0].name.as_str(), "abc");
    }

    #[test]
    fn dir_sorts_after_same_named_prefix() {
        // "dir" as a subtree sorts after "dir.txt" as a blob: '.' (0x2e) <
        // '/' (0x2f), so the virtual trailing slash puts the subtree later.
        let tree = Tree::from_sorted_entries(vec![entry("dir.txt", false, 1), entry("dir", true, 2)]);
        assert!(tree.is_ok());
    }

    #[test]
    fn rejects_duplicate_names() {
        let err = Tree::from_sorted_entries(vec![entry("a", false, 1), entry("a", false, 2)])
            .unwrap_err();
        assert_eq!(err, TreeParseError::DuplicateName("a".to_owned()));
    }

    #[test]
    fn blob_and_subtree_with_the_same_name_are_duplicates() {
        // A blob "a" and a subtree "a" are the same literal name; that's a
        // TREE_HAS_DUPS case regardless of the two entries' differing modes.
        let err = Tree::from_sorted_entries(vec![entry("a", false, 1), entry("a", true, 2)]).unwrap_err();
        assert_eq!(err, TreeParseError::DuplicateName("a".to_owned()));
    }

    #[test]
    fn rejects_out_of_order_names() {
        let err = Tree::from_sorted_entries(vec![entry("b", false, 1), entry("a", false, 2)])
            .unwrap_err();
        assert_eq!(err, TreeParseError::OutOfOrder("a".to_owned()));
    }
}
