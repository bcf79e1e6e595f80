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

//! Commit objects: the textual grammar `tree`/`parent*`/`author`/`committer`
//! header followed by a blank line and the message body, plus the graft
//! table that can override a commit's parsed parent list.

use std::collections::HashMap;
use std::fmt;

use thiserror::Error;

use crate::digest::{CommitId, TreeId};

/// Seconds since the Unix epoch plus a signed timezone offset, as recorded
/// literally in `author`/`committer` lines (`<epoch> <+HHMM|-HHMM>`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp {
    pub seconds: i64,
    pub tz_offset_minutes: i32,
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.tz_offset_minutes < 0 { '-' } else { '+' };
        let abs = self.tz_offset_minutes.unsigned_abs();
        write!(f, "{} {sign}{:02}{:02}", self.seconds, abs / 60, abs % 60)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Signature {
    pub name: String,
    pub email: String,
    pub timestamp: Timestamp,
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <{}> {}", self.name, self.email, self.timestamp)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CommitParseError {
    #[error("commit has no tree line")]
    MissingTree,
    #[error("malformed hex digest in {0} line")]
    MalformedHex(&'static str),
    #[error("commit has no author line")]
    MissingAuthor,
    #[error("commit has no committer line")]
    MissingCommitter,
    #[error("malformed identity line: {0:?}")]
    MalformedIdentity(String),
    #[error("commit header is missing the blank line separating it from the message")]
    MissingBlankLine,
}

pub(crate) fn parse_ident_line(line: &str) -> Result<Signature, CommitParseError> {
    // "Name <email> <epoch> <+zzzz>"
    let email_start = line
        .find('<')
        .ok_or_else(|| CommitParseError::MalformedIdentity(line.to_owned()))?;
    let email_end = line
        .find('>')
        .ok_or_else(|| CommitParseError::MalformedIdentity(line.to_owned()))?;
    if email_end < email_start {
        return Err(CommitParseError::MalformedIdentity(line.to_owned()));
    }
    let name = line[..email_start].trim_end().to_owned();
    let email = line[email_start + 1..email_end].to_owned();
    let rest = line[email_end + 1..].trim();
    let mut parts = rest.split_whitespace();
    let seconds: i64 = parts
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| CommitParseError::MalformedIdentity(line.to_owned()))?;
    let tz = parts
        .next()
        .ok_or_else(|| CommitParseError::MalformedIdentity(line.to_owned()))?;
    let tz_offset_minutes = parse_tz_offset(tz)
        .ok_or_else(|| CommitParseError::MalformedIdentity(line.to_owned()))?;
    Ok(Signature {
        name,
        email,
        timestamp: Timestamp {
            seconds,
            tz_offset_minutes,
        },
    })
}

fn parse_tz_offset(tz: &str) -> Option<i32> {
    let (sign, digits) = match tz.split_at_checked(1)? {
        ("+", rest) => (1, rest),
        ("-", rest) => (-1, rest),
        _ => return None,
    };
    if digits.len() != 4 {
        return None;
    }
    let hours: i32 = digits[0..2].parse().ok()?;
    let minutes: i32 = digits[2..4].parse().ok()?;
    Some(sign * (hours * 60 + minutes))
}

/// Override for a commit's stored parent list, consulted during parse.
/// `Shallow` marks the commit as having no recorded predecessors (a "grafted"
/// cut point), corresponding to the historical `nr_parent < 0` encoding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Graft {
    Parents(Vec<CommitId>),
    Shallow,
}

/// Maps commit digests to an overriding parent list, applied transparently
/// during [`Commit::parse`].
#[derive(Clone, Debug, Default)]
pub struct GraftTable {
    overrides: HashMap<CommitId, Graft>,
}

impl GraftTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, commit: CommitId, graft: Graft) {
        self.overrides.insert(commit, graft);
    }

    pub fn get(&self, commit: &CommitId) -> Option<&Graft> {
        self.overrides.get(commit)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Commit {
    id: CommitId,
    tree: TreeId,
    parents: Vec<CommitId>,
    author: Signature,
    committer: Signature,
    encoding: Option<String>,
    message: String,
}

impl Commit {
    /// Parses the textual on-disk grammar, applying any [`Graft`] override
    /// for `id` found in `grafts`.
    pub fn parse(id: CommitId, text: &str, grafts: &GraftTable) -> Result<Self, CommitParseError> {
        let mut lines = text.split('\n');
        let tree_line = lines.next().ok_or(CommitParseError::MissingTree)?;
        let tree_hex = tree_line
            .strip_prefix("tree ")
            .ok_or(CommitParseError::MissingTree)?;
        let tree =
            TreeId::from_hex(tree_hex).map_err(|_| CommitParseError::MalformedHex("tree"))?;

        let mut parents = Vec::new();
        let mut encoding = None;
        let mut author = None;
        let mut committer = None;
        let mut line = lines.next();
        while let Some(text) = line {
            if let Some(hex) = text.strip_prefix("parent ") {
                let parent =
                    CommitId::from_hex(hex).map_err(|_| CommitParseError::MalformedHex("parent"))?;
                parents.push(parent);
            } else if let Some(rest) = text.strip_prefix("author ") {
                author = Some(parse_ident_line(rest)?);
            } else if let Some(rest) = text.strip_prefix("committer ") {
                committer = Some(parse_ident_line(rest)?);
            } else if let Some(rest) = text.strip_prefix("encoding ") {
                encoding = Some(rest.to_owned());
            } else if text.is_empty() {
                break;
            }
            line = lines.next();
        }
        if line.is_none() {
            return Err(CommitParseError::MissingBlankLine);
        }
        let author = author.ok_or(CommitParseError::MissingAuthor)?;
        let committer = committer.ok_or(CommitParseError::MissingCommitter)?;
        let message = lines.collect::<Vec<_>>().join("\n");

        let parents = match grafts.get(&id) {
            Some(Graft::Parents(overridden)) => overridden.clone(),
            Some(Graft::Shallow) => Vec::new(),
            None => parents,
        };

        Ok(Self {
            id,
            tree,
            parents,
            author,
            committer,
            encoding,
            message,
        })
    }

    pub fn serialize(&self) -> String {
        let mut out = format!("tree {}\n", self.tree);
        for parent in &self.parents {
            out.push_str(&format!("parent {parent}\n"));
        }
        out.push_str(&format!("author {}\n", self.author));
        out.push_str(&format!("committer {}\n", self.committer));
        if let Some(encoding) = &self.encoding {
            out.push_str(&format!("encoding {encoding}\n"));
        }
        out.push('\n');
        out.push_str(&self.message);
        out
    }

    pub fn id(&self) -> CommitId {
        self.id
    }

    pub fn tree(&self) -> TreeId {
        self.tree
    }

    pub fn parents(&self) -> &[CommitId] {
        &self.parents
    }

    pub fn is_merge(&self) -> bool {
        self.parents.len() > 1
    }

    pub fn author(&self) -> &Signature {
        &self.author
    }

    pub fn committer(&self) -> &Signature {
        &self.committer
    }

    pub fn encoding(&self) -> Option<&str> {
        self.encoding.as_deref()
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Orders commits by committer timestamp, most recent first, matching the
/// priority used by the date-ordered graph walk (§4.H).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ByCommitterTimestamp(pub CommitId, pub Timestamp);

impl PartialOrd for ByCommitterTimestamp {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ByCommitterTimestamp {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.1.cmp(&other.1).then_with(|| self.0.cmp(&other.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn commit_id(byte: u8) -> CommitId {
        let mut bytes = [0u8; 20];
        bytes[19] = byte;
        CommitId::new(crate::digest::Digest::from_bytes(bytes))
    }

    fn sample_text(tree_hex: &str, parents: &[&str]) -> String {
        let mut text = format!("tree {tree_hex}\n");
        for p in parents {
            text.push_str(&format!("parent {p}\n"));
        }
        text.push_str("author A <a@example.com> 1000000000 +0000\n");
        text.push_str("committer C <c@example.com> 1000000100 -0130\n");
        text.push('\n');
        text.push_str("subject line\n\nbody");
        text
    }

    #[test]
    fn parses_well_formed_commit() {
        let tree_hex = "0".repeat(39) + "a";
        let text = sample_text(&tree_hex, &[]);
        let commit = Commit::parse(commit_id(1), &text, &GraftTable::new()).unwrap();
        assert_eq!(commit.tree().hex(), tree_hex);
        assert!(commit.parents().is_empty());
        assert_eq!(commit.committer().timestamp.tz_offset_minutes, -90);
        assert!(commit.message().starts_with("subject line"));
    }

    #[test]
    fn missing_blank_line_is_rejected() {
        let text = "tree 0000000000000000000000000000000000000a\nauthor A <a@x> 1 +0000\ncommitter C <c@x> 1 +0000";
        let err = Commit::parse(commit_id(1), text, &GraftTable::new()).unwrap_err();
        assert_eq!(err, CommitParseError::MissingBlankLine);
    }

    #[test]
    fn graft_overrides_parsed_parents() {
        let tree_hex = "0".repeat(39) + "a";
        let parent_hex = "0".repeat(39) + "b";
        let text = sample_text(&tree_hex, &[&parent_hex]);
        let mut grafts = GraftTable::new();
        grafts.insert(commit_id(1), Graft::Shallow);
        let commit = Commit::parse(commit_id(1), &text, &grafts).unwrap();
        assert!(commit.parents().is_empty());
    }

    #[test]
    fn serialize_then_parse_round_trips() {
        let tree_hex = "0".repeat(39) + "a";
        let text = sample_text(&tree_hex, &[]);
        let commit = Commit::parse(commit_id(1), &text, &GraftTable::new()).unwrap();
        let reserialized = commit.serialize();
        let reparsed = Commit::parse(commit_id(1), &reserialized, &GraftTable::new()).unwrap();
        assert_eq!(commit, reparsed);
    }
}
