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

//! The staged index: a binary snapshot of what would be committed next,
//! plus the cache-tree extension that memoizes already-known subtree
//! digests so a commit doesn't have to rehash unchanged directories.

use std::io::{self};
use std::path::Path;

use sha1::{Digest as _, Sha1};

use crate::digest::Digest;
use crate::error::{IndexError, IoResultExt as _};
use crate::lock::LockFile;
use crate::path::{RepoPath, RepoPathBuf};

const SIGNATURE: [u8; 4] = *b"DIRC";
const ENTRY_PREFIX_LEN: usize = 62;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexEntry {
    pub ctime_secs: u32,
    pub ctime_nanos: u32,
    pub mtime_secs: u32,
    pub mtime_nanos: u32,
    pub dev: u32,
    pub ino: u32,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u32,
    pub digest: Digest,
    pub flags: u16,
    pub path: RepoPathBuf,
}

fn read_u32(data: &[u8], pos: &mut usize) -> Result<u32, IndexError> {
    let bytes = data.get(*pos..*pos + 4).ok_or(IndexError::BadChecksum)?;
    *pos += 4;
    Ok(u32::from_be_bytes(bytes.try_into().unwrap()))
}

fn read_u16(data: &[u8], pos: &mut usize) -> Result<u16, IndexError> {
    let bytes = data.get(*pos..*pos + 2).ok_or(IndexError::BadChecksum)?;
    *pos += 2;
    Ok(u16::from_be_bytes(bytes.try_into().unwrap()))
}

impl IndexEntry {
    fn parse(data: &[u8], pos: &mut usize) -> Result<Self, IndexError> {
        let start = *pos;
        let ctime_secs = read_u32(data, pos)?;
        let ctime_nanos = read_u32(data, pos)?;
        let mtime_secs = read_u32(data, pos)?;
        let mtime_nanos = read_u32(data, pos)?;
        let dev = read_u32(data, pos)?;
        let ino = read_u32(data, pos)?;
        let mode = read_u32(data, pos)?;
        let uid = read_u32(data, pos)?;
        let gid = read_u32(data, pos)?;
        let size = read_u32(data, pos)?;
        let digest_bytes = data.get(*pos..*pos + 20).ok_or(IndexError::BadChecksum)?;
        let digest = Digest::from_slice(digest_bytes).unwrap();
        *pos += 20;
        let flags = read_u16(data, pos)?;
        debug_assert_eq!(*pos - start, ENTRY_PREFIX_LEN);

        let nul = data[*pos..]
            .iter()
            .position(|&b| b == 0)
            .ok_or(IndexError::BadChecksum)?;
        let path_bytes = &data[*pos..*pos + nul];
        let path_str = std::str::from_utf8(path_bytes).map_err(|_| IndexError::BadChecksum)?;
        let path = RepoPathBuf::from_internal_string(path_str).map_err(|_| IndexError::BadChecksum)?;
        *pos += nul + 1;

        let entry_len = ENTRY_PREFIX_LEN + nul + 1;
        let padded = entry_len.div_ceil(8) * 8;
        *pos += padded - entry_len;

        Ok(Self {
            ctime_secs,
            ctime_nanos,
            mtime_secs,
            mtime_nanos,
            dev,
            ino,
            mode,
            uid,
            gid,
            size,
            digest,
            flags,
            path,
        })
    }

    fn serialize(&self, out: &mut Vec<u8>) {
        out.extend(self.ctime_secs.to_be_bytes());
        out.extend(self.ctime_nanos.to_be_bytes());
        out.extend(self.mtime_secs.to_be_bytes());
        out.extend(self.mtime_nanos.to_be_bytes());
        out.extend(self.dev.to_be_bytes());
        out.extend(self.ino.to_be_bytes());
        out.extend(self.mode.to_be_bytes());
        out.extend(self.uid.to_be_bytes());
        out.extend(self.gid.to_be_bytes());
        out.extend(self.size.to_be_bytes());
        out.extend(self.digest.as_bytes());
        out.extend(self.flags.to_be_bytes());
        out.extend(self.path.as_internal_str().as_bytes());
        out.push(0);
        let entry_len = ENTRY_PREFIX_LEN + self.path.as_internal_str().len() + 1;
        let padded = entry_len.div_ceil(8) * 8;
        out.resize(out.len() + (padded - entry_len), 0);
    }
}

/// Recursive memo of which subtrees are already known to match an object
/// digest, invalidated along the path of any entry that changes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CacheTreeNode {
    pub name: String,
    /// `None` when this node's digest is not currently trusted.
    pub valid: Option<(i64, Digest)>,
    pub children: Vec<CacheTreeNode>,
}

impl CacheTreeNode {
    fn root() -> Self {
        Self {
            name: String::new(),
            valid: None,
            children: Vec::new(),
        }
    }

    /// Invalidates this node and every node along `path`'s component chain.
    fn invalidate(&mut self, path: &RepoPath) {
        self.valid = None;
        let mut node = self;
        for component in path.components() {
            let name = component.as_str().to_owned();
            let idx = match node.children.iter().position(|c| c.name == name) {
                Some(idx) => idx,
                None => {
                    node.children.push(CacheTreeNode {
                        name,
                        valid: None,
                        children: Vec::new(),
                    });
                    node.children.len() - 1
                }
            };
            node = &mut node.children[idx];
            node.valid = None;
        }
    }

    fn serialize(&self, out: &mut Vec<u8>) {
        out.extend(self.name.as_bytes());
        out.push(0);
        match &self.valid {
            Some((entry_count, digest)) => {
                out.extend(entry_count.to_string().as_bytes());
                out.extend(format!(" {}\n", self.children.len()).as_bytes());
                out.extend(digest.as_bytes());
            }
            None => {
                out.extend(b"-1");
                out.extend(format!(" {}\n", self.children.len()).as_bytes());
            }
        }
        for child in &self.children {
            child.serialize(out);
        }
    }

    fn parse(data: &[u8], pos: &mut usize) -> Result<Self, IndexError> {
        let nul = data[*pos..]
            .iter()
            .position(|&b| b == 0)
            .ok_or(IndexError::BadChecksum)?;
        let name = std::str::from_utf8(&data[*pos..*pos + nul])
            .map_err(|_| IndexError::BadChecksum)?
            .to_owned();
        *pos += nul + 1;

        let line_end = data[*pos..]
            .iter()
            .position(|&b| b == b'\n')
            .ok_or(IndexError::BadChecksum)?;
        let line = std::str::from_utf8(&data[*pos..*pos + line_end]).map_err(|_| IndexError::BadChecksum)?;
        *pos += line_end + 1;
        let (count_str, subtree_str) = line.split_once(' ').ok_or(IndexError::BadChecksum)?;
        let entry_count: i64 = count_str.parse().map_err(|_| IndexError::BadChecksum)?;
        let subtree_count: usize = subtree_str.parse().map_err(|_| IndexError::BadChecksum)?;

        let valid = if entry_count >= 0 {
            let digest_bytes = data.get(*pos..*pos + 20).ok_or(IndexError::BadChecksum)?;
            *pos += 20;
            Some((entry_count, Digest::from_slice(digest_bytes).unwrap()))
        } else {
            None
        };

        let mut children = Vec::with_capacity(subtree_count);
        for _ in 0..subtree_count {
            children.push(Self::parse(data, pos)?);
        }
        Ok(Self { name, valid, children })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatComparison {
    Unchanged,
    Modified,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PathspecMatch {
    None,
    Exact,
    Recursive,
}

pub fn match_pathspec(pathspec: &str, entry_path: &str) -> PathspecMatch {
    if pathspec.is_empty() || pathspec == entry_path {
        return PathspecMatch::Exact;
    }
    if entry_path.starts_with(pathspec) && entry_path.as_bytes().get(pathspec.len()) == Some(&b'/') {
        return PathspecMatch::Recursive;
    }
    PathspecMatch::None
}

#[derive(Debug, Default)]
pub struct Index {
    entries: Vec<IndexEntry>,
    pub cache_tree: CacheTreeNode,
}

impl Index {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            cache_tree: CacheTreeNode::root(),
        }
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// Binary-searches the sorted entry array for `path`.
    pub fn find(&self, path: &RepoPath) -> Result<usize, usize> {
        self.entries.binary_search_by(|e| e.path.as_internal_str().cmp(path.as_internal_str()))
    }

    /// Inserts or replaces `entry`, invalidating every cache-tree node that
    /// covers its path.
    pub fn add_entry(&mut self, entry: IndexEntry) {
        let path = entry.path.clone();
        match self.find(&path) {
            Ok(i) => self.entries[i] = entry,
            Err(i) => self.entries.insert(i, entry),
        }
        self.cache_tree.invalidate(&path);
    }

    pub fn remove_entry(&mut self, path: &RepoPath) -> bool {
        match self.find(path) {
            Ok(i) => {
                self.entries.remove(i);
                self.cache_tree.invalidate(path);
                true
            }
            Err(_) => false,
        }
    }

    pub fn compare_stat(entry: &IndexEntry, mtime_secs: u32, mtime_nanos: u32, size: u32) -> StatComparison {
        if entry.mtime_secs == mtime_secs && entry.mtime_nanos == mtime_nanos && entry.size == size {
            StatComparison::Unchanged
        } else {
            StatComparison::Modified
        }
    }

    /// Parses a complete index file already read into memory, verifying the
    /// trailing digest and refusing unknown extensions whose signature
    /// begins with a lowercase letter.
    pub fn parse(data: &[u8]) -> Result<Self, IndexError> {
        if data.len() < 12 + 20 {
            return Err(IndexError::BadChecksum);
        }
        let (body, trailer) = data.split_at(data.len() - 20);
        let computed: [u8; 20] = Sha1::digest(body).into();
        if computed != trailer {
            return Err(IndexError::BadChecksum);
        }

        let mut pos = 0;
        if &data[0..4] != &SIGNATURE {
            return Err(IndexError::BadSignature);
        }
        pos += 4;
        let version = read_u32(data, &mut pos)?;
        if version != 2 && version != 3 {
            return Err(IndexError::UnsupportedVersion(version));
        }
        let count = read_u32(data, &mut pos)? as usize;

        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            entries.push(IndexEntry::parse(data, &mut pos)?);
        }
        for window in entries.windows(2) {
            if window[0].path.as_internal_str() >= window[1].path.as_internal_str() {
                return Err(IndexError::NotSorted(entries.len()));
            }
        }

        let mut cache_tree = CacheTreeNode::root();
        while pos + 8 <= body.len() {
            let signature = std::str::from_utf8(&data[pos..pos + 4]).unwrap_or("????").to_owned();
            let mut len_pos = pos + 4;
            let ext_len = read_u32(data, &mut len_pos)? as usize;
            let ext_start = pos + 8;
            let ext_end = ext_start + ext_len;
            if ext_end > body.len() {
                return Err(IndexError::BadChecksum);
            }
            if signature == "TREE" {
                let mut inner_pos = ext_start;
                cache_tree = CacheTreeNode::parse(data, &mut inner_pos)?;
            } else if signature.starts_with(|c: char| c.is_ascii_lowercase()) {
                return Err(IndexError::UnknownExtension(signature));
            }
            pos = ext_end;
        }

        Ok(Self { entries, cache_tree })
    }

    /// Streams the header, sorted entries, and cache-tree extension,
    /// appending a trailing digest over everything written so far.
    pub fn write_to(&self, writer: &mut impl io::Write) -> io::Result<()> {
        let mut body = Vec::new();
        body.extend(SIGNATURE);
        body.extend(2u32.to_be_bytes());
        body.extend((self.entries.len() as u32).to_be_bytes());
        for entry in &self.entries {
            entry.serialize(&mut body);
        }

        let mut tree_bytes = Vec::new();
        self.cache_tree.serialize(&mut tree_bytes);
        body.extend(*b"TREE");
        body.extend((tree_bytes.len() as u32).to_be_bytes());
        body.extend(tree_bytes);

        let digest: [u8; 20] = Sha1::digest(&body).into();
        writer.write_all(&body)?;
        writer.write_all(&digest)?;
        Ok(())
    }

    #[tracing::instrument]
    pub fn read(path: &Path) -> Result<Self, IndexError> {
        if !path.is_file() {
            tracing::debug!("no index file present, starting empty");
            return Ok(Self::new());
        }
        let data = std::fs::read(path).context(path).map_err(IndexError::Io)?;
        let index = Self::parse(&data)?;
        tracing::debug!(entry_count = index.entries.len(), "read index");
        Ok(index)
    }

    /// Writes through the lock-file protocol: stream to `<path>.lock`, then
    /// rename onto `path`.
    #[tracing::instrument(skip(self))]
    pub fn write(&self, path: &Path) -> Result<(), IndexError> {
        let mut lock = LockFile::acquire(path).map_err(IndexError::Lock)?;
        let mut buf = Vec::new();
        self.write_to(&mut buf).expect("writing to a Vec cannot fail");
        lock.write_all(&buf).map_err(IndexError::Lock)?;
        lock.commit().map_err(IndexError::Lock)?;
        tracing::debug!(entry_count = self.entries.len(), "wrote index");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_entry(path: &str, digest_byte: u8) -> IndexEntry {
        let mut bytes = [0u8; 20];
        bytes[19] = digest_byte;
        IndexEntry {
            ctime_secs: 1,
            ctime_nanos: 0,
            mtime_secs: 2,
            mtime_nanos: 0,
            dev: 0,
            ino: 0,
            mode: 0o100644,
            uid: 0,
            gid: 0,
            size: 12,
            digest: Digest::from_bytes(bytes),
            flags: path.len() as u16,
            path: RepoPathBuf::from_internal_string(path).unwrap(),
        }
    }

    #[test]
    fn add_then_find_round_trips() {
        let mut index = Index::new();
        index.add_entry(sample_entry("src/main.rs", 1));
        index.add_entry(sample_entry("README.md", 2));
        assert_eq!(index.find(RepoPath::from_internal_str("README.md").unwrap()), Ok(0));
        assert_eq!(index.find(RepoPath::from_internal_str("src/main.rs").unwrap()), Ok(1));
        assert_eq!(index.find(RepoPath::from_internal_str("missing").unwrap()), Err(1));
    }

    #[test]
    fn adding_entry_invalidates_cache_tree_path() {
        let mut index = Index::new();
        index.cache_tree.valid = Some((2, Digest::NULL));
        index.add_entry(sample_entry("src/main.rs", 1));
        assert_eq!(index.cache_tree.valid, None);
    }

    #[test]
    fn serialize_then_parse_round_trips() {
        let mut index = Index::new();
        index.add_entry(sample_entry("README.md", 2));
        index.add_entry(sample_entry("src/main.rs", 1));

        let mut buf = Vec::new();
        index.write_to(&mut buf).unwrap();
        let parsed = Index::parse(&buf).unwrap();
        assert_eq!(parsed.entries().len(), 2);
        assert_eq!(parsed.entries()[0].path.as_internal_str(), "README.md");
        assert_eq!(parsed.entries()[1].path.as_internal_str(), "src/main.rs");
    }

    #[test]
    fn match_pathspec_distinguishes_exact_and_recursive() {
        assert_eq!(match_pathspec("src/main.rs", "src/main.rs"), PathspecMatch::Exact);
        assert_eq!(match_pathspec("src", "src/main.rs"), PathspecMatch::Recursive);
        assert_eq!(match_pathspec("src", "srcfoo.rs"), PathspecMatch::None);
    }
}
