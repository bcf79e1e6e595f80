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

//! Per-ref reflogs: `logs/<refname>`, one append-only line per update in
//! `<old_hex> <new_hex> <name> <<email>> <ts> <tz>\t<msg>\n` form.

use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use crate::digest::Digest;
use crate::error::{IoResultExt as _, RefError};
use crate::object::commit::{Signature, Timestamp};

pub fn reflog_path(git_dir: &Path, name: &str) -> PathBuf {
    git_dir.join("logs").join(name)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReflogEntry {
    pub old_digest: Digest,
    pub new_digest: Digest,
    pub committer: Signature,
    pub message: String,
}

fn format_entry(entry: &ReflogEntry) -> String {
    format!(
        "{} {} {} <{}> {}\t{}\n",
        entry.old_digest,
        entry.new_digest,
        entry.committer.name,
        entry.committer.email,
        entry.committer.timestamp,
        entry.message
    )
}

/// Appends one record, creating `logs/<name>` and its parent directories on
/// first use.
pub fn append(git_dir: &Path, name: &str, entry: &ReflogEntry) -> Result<(), RefError> {
    let path = reflog_path(git_dir, name);
    let dir = path.parent().unwrap();
    std::fs::create_dir_all(dir).context(dir).map_err(RefError::Io)?;
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .context(&path)
        .map_err(RefError::Io)?;
    file.write_all(format_entry(entry).as_bytes())
        .context(&path)
        .map_err(RefError::Io)
}

fn parse_line(line: &str) -> Option<ReflogEntry> {
    let (old_hex, rest) = line.split_once(' ')?;
    let (new_hex, rest) = rest.split_once(' ')?;
    let (identity, message) = rest.split_once('\t')?;
    let email_start = identity.find('<')?;
    let email_end = identity.find('>')?;
    let name = identity[..email_start].trim_end().to_owned();
    let email = identity[email_start + 1..email_end].to_owned();
    let ts_part = identity[email_end + 1..].trim();
    let (seconds_str, tz_str) = ts_part.split_once(' ')?;
    let seconds: i64 = seconds_str.parse().ok()?;
    let sign = if tz_str.starts_with('-') { -1 } else { 1 };
    let digits = &tz_str[1..];
    let hours: i32 = digits.get(0..2)?.parse().ok()?;
    let minutes: i32 = digits.get(2..4)?.parse().ok()?;
    Some(ReflogEntry {
        old_digest: Digest::from_hex(old_hex).ok()?,
        new_digest: Digest::from_hex(new_hex).ok()?,
        committer: Signature {
            name,
            email,
            timestamp: Timestamp {
                seconds,
                tz_offset_minutes: sign * (hours * 60 + minutes),
            },
        },
        message: message.to_owned(),
    })
}

/// Streams the reflog for `name` oldest-first (the file's natural order,
/// since entries are always appended).
pub fn for_each_entry(
    git_dir: &Path,
    name: &str,
    mut callback: impl FnMut(&ReflogEntry),
) -> Result<(), RefError> {
    let path = reflog_path(git_dir, name);
    if !path.is_file() {
        return Ok(());
    }
    let text = std::fs::read_to_string(&path).context(&path).map_err(RefError::Io)?;
    for line in text.lines() {
        if let Some(entry) = parse_line(line) {
            callback(&entry);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_entry(old: u8, new: u8) -> ReflogEntry {
        let mut old_bytes = [0u8; 20];
        old_bytes[19] = old;
        let mut new_bytes = [0u8; 20];
        new_bytes[19] = new;
        ReflogEntry {
            old_digest: Digest::from_bytes(old_bytes),
            new_digest: Digest::from_bytes(new_bytes),
            committer: Signature {
                name: "A".to_owned(),
                email: "a@example.com".to_owned(),
                timestamp: Timestamp {
                    seconds: 1_000_000,
                    tz_offset_minutes: -90,
                },
            },
            message: "commit: subject".to_owned(),
        }
    }

    #[test]
    fn append_then_stream_round_trips_oldest_first() {
        let dir = tempfile::tempdir().unwrap();
        append(dir.path(), "refs/heads/main", &sample_entry(0, 1)).unwrap();
        append(dir.path(), "refs/heads/main", &sample_entry(1, 2)).unwrap();

        let mut seen = Vec::new();
        for_each_entry(dir.path(), "refs/heads/main", |entry| {
            seen.push(entry.clone());
        })
        .unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].new_digest, sample_entry(0, 1).new_digest);
        assert_eq!(seen[1].new_digest, sample_entry(1, 2).new_digest);
    }

    #[test]
    fn missing_reflog_yields_no_entries() {
        let dir = tempfile::tempdir().unwrap();
        let mut count = 0;
        for_each_entry(dir.path(), "refs/heads/absent", |_| count += 1).unwrap();
        assert_eq!(count, 0);
    }
}
