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

//! Renders a [`Commit`] as text in one of the traditional pretty-print
//! formats, or against a caller-supplied template.
//!
//! Re-encoding the message body from its declared `encoding` header into an
//! output encoding is out of scope here (no charset-conversion crate is in
//! the dependency stack): anything other than `"utf-8"` is passed through
//! unchanged rather than transcoded.

use crate::object::Commit;
use crate::object::commit::Signature;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Format<'a> {
    Raw,
    Medium,
    Short,
    Full,
    Fuller,
    Oneline,
    Email,
    UserFormat(&'a str),
}

/// Number of leading hex digits used for an abbreviated digest. A real
/// abbreviation would grow this until it's unambiguous against the rest of
/// the object set; this formatter has no such context, so it uses a fixed
/// length.
const ABBREV_LEN: usize = 7;

fn subject_and_body(message: &str) -> (&str, &str) {
    match message.split_once('\n') {
        Some((subject, rest)) => (subject, rest.trim_start_matches('\n')),
        None => (message, ""),
    }
}

fn is_non_ascii(byte: u8) -> bool {
    byte & 0x80 != 0 || byte == 0x1b
}

fn needs_rfc2047(text: &str) -> bool {
    let bytes = text.as_bytes();
    bytes.iter().enumerate().any(|(i, &b)| {
        is_non_ascii(b) || (b == b'=' && bytes.get(i + 1) == Some(&b'?'))
    })
}

/// Encodes `text` as an RFC 2047 `=?charset?q?...?=` quoted-printable word if
/// it contains any byte that isn't plain ASCII; otherwise returns it as-is.
pub fn rfc2047_encode(text: &str, charset: &str) -> String {
    if !needs_rfc2047(text) {
        return text.to_owned();
    }
    let mut out = format!("=?{charset}?q?");
    for &byte in text.as_bytes() {
        if is_non_ascii(byte) || byte == b'=' || byte == b'?' || byte == b'_' {
            out.push_str(&format!("={byte:02X}"));
        } else if byte == b' ' {
            out.push('_');
        } else {
            out.push(byte as char);
        }
    }
    out.push_str("?=");
    out
}

fn format_signature_line(label: &str, signature: &Signature) -> String {
    format!("{label}: {} <{}> {}\n", signature.name, signature.email, signature.timestamp)
}

fn format_email_header(label: &str, signature: &Signature, charset: &str) -> String {
    format!(
        "{label}: {} <{}>\n",
        rfc2047_encode(&signature.name, charset),
        signature.email
    )
}

fn indent_body(body: &str) -> String {
    body.lines().map(|line| format!("    {line}\n")).collect()
}

/// Renders `commit` in one of the traditional pretty formats.
pub fn format_commit(commit: &Commit, format: Format<'_>) -> String {
    let charset = commit.encoding().unwrap_or("utf-8");
    let (subject, body) = subject_and_body(commit.message());

    match format {
        Format::Raw => commit.serialize(),
        Format::Oneline => format!("{} {subject}\n", short_hex(&commit.id().hex())),
        Format::Short => {
            let mut out = format!("commit {}\n", commit.id().hex());
            if commit.is_merge() {
                out.push_str(&merge_line(commit));
            }
            out.push_str(&format_signature_line("Author", commit.author()));
            out.push('\n');
            out.push_str(&indent_body(subject));
            out
        }
        Format::Medium => {
            let mut out = format!("commit {}\n", commit.id().hex());
            if commit.is_merge() {
                out.push_str(&merge_line(commit));
            }
            out.push_str(&format_signature_line("Author", commit.author()));
            out.push_str(&format!("Date:   {}\n", commit.committer().timestamp));
            out.push('\n');
            out.push_str(&indent_body(commit.message()));
            out
        }
        Format::Full => {
            let mut out = format!("commit {}\n", commit.id().hex());
            if commit.is_merge() {
                out.push_str(&merge_line(commit));
            }
            out.push_str(&format_signature_line("Author", commit.author()));
            out.push_str(&format_signature_line("Commit", commit.committer()));
            out.push('\n');
            out.push_str(&indent_body(commit.message()));
            out
        }
        Format::Fuller => {
            let mut out = format!("commit {}\n", commit.id().hex());
            if commit.is_merge() {
                out.push_str(&merge_line(commit));
            }
            out.push_str(&format!("Author:     {} <{}>\n", commit.author().name, commit.author().email));
            out.push_str(&format!("AuthorDate: {}\n", commit.author().timestamp));
            out.push_str(&format!("Commit:     {} <{}>\n", commit.committer().name, commit.committer().email));
            out.push_str(&format!("CommitDate: {}\n", commit.committer().timestamp));
            out.push('\n');
            out.push_str(&indent_body(commit.message()));
            out
        }
        Format::Email => {
            let mut out = format!("From {} Mon Sep 17 00:00:00 2001\n", commit.id().hex());
            out.push_str(&format_email_header("From", commit.author(), charset));
            out.push_str(&format!("Date: {}\n", commit.author().timestamp));
            out.push_str(&format!("Subject: [PATCH] {}\n", rfc2047_encode(subject, charset)));
            if commit.is_merge() {
                out.push_str(&merge_line(commit));
            }
            out.push('\n');
            out.push_str(body);
            out
        }
        Format::UserFormat(template) => render_template(commit, template),
    }
}

fn merge_line(commit: &Commit) -> String {
    let parents: Vec<String> = commit.parents().iter().map(|p| short_hex(&p.hex()).to_owned()).collect();
    format!("Merge: {}\n", parents.join(" "))
}

fn short_hex(hex: &str) -> &str {
    &hex[..ABBREV_LEN.min(hex.len())]
}

/// Expands `%`-escapes in `template` against `commit`: `%H`/`%h` (full/short
/// commit digest), `%T`/`%t` (full/short tree digest), `%P`/`%p`
/// (full/short parent digests, space-separated), `%an`/`%ae`/`%ad` (author
/// name/email/date), `%cn`/`%ce`/`%cd` (committer name/email/date), `%s`
/// (subject), `%b` (body), `%e` (encoding), `%n` (newline), `%%` (literal
/// `%`).
pub fn render_template(commit: &Commit, template: &str) -> String {
    let (subject, body) = subject_and_body(commit.message());
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        let Some(&next) = chars.peek() else {
            out.push('%');
            break;
        };
        // Two-letter tokens (%an, %ae, %ad, %cn, %ce, %cd) need a lookahead.
        let token = if matches!(next, 'a' | 'c') {
            chars.next();
            let Some(&third) = chars.peek() else {
                out.push('%');
                out.push(next);
                continue;
            };
            chars.next();
            format!("{next}{third}")
        } else {
            chars.next();
            next.to_string()
        };
        match token.as_str() {
            "H" => out.push_str(&commit.id().hex()),
            "h" => out.push_str(short_hex(&commit.id().hex())),
            "T" => out.push_str(&commit.tree().hex()),
            "t" => out.push_str(short_hex(&commit.tree().hex())),
            "P" => out.push_str(&commit.parents().iter().map(|p| p.hex()).collect::<Vec<_>>().join(" ")),
            "p" => out.push_str(
                &commit
                    .parents()
                    .iter()
                    .map(|p| short_hex(&p.hex()).to_owned())
                    .collect::<Vec<_>>()
                    .join(" "),
            ),
            "an" => out.push_str(&commit.author().name),
            "ae" => out.push_str(&commit.author().email),
            "ad" => out.push_str(&commit.author().timestamp.to_string()),
            "cn" => out.push_str(&commit.committer().name),
            "ce" => out.push_str(&commit.committer().email),
            "cd" => out.push_str(&commit.committer().timestamp.to_string()),
            "s" => out.push_str(subject),
            "b" => out.push_str(body),
            "e" => out.push_str(commit.encoding().unwrap_or("utf-8")),
            "n" => out.push('\n'),
            "%" => out.push('%'),
            other => {
                out.push('%');
                out.push_str(other);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::{CommitId, Digest};
    use crate::object::commit::GraftTable;

    fn ascii_commit() -> Commit {
        let tree_hex = "0".repeat(39) + "a";
        let text = format!(
            "tree {tree_hex}\nauthor A Author <a@example.com> 1700000000 +0000\ncommitter C Committer <c@example.com> 1700000100 +0000\n\nadd widget\n\nlonger body here"
        );
        let id = CommitId::new(Digest::from_bytes([1; 20]));
        Commit::parse(id, &text, &GraftTable::new()).unwrap()
    }

    fn merge_commit() -> Commit {
        let tree_hex = "0".repeat(39) + "a";
        let parent_hex = "0".repeat(39) + "b";
        let parent2_hex = "0".repeat(39) + "c";
        let text = format!(
            "tree {tree_hex}\nparent {parent_hex}\nparent {parent2_hex}\nauthor A <a@x> 1 +0000\ncommitter C <c@x> 1 +0000\n\nMerge branches"
        );
        let id = CommitId::new(Digest::from_bytes([2; 20]));
        Commit::parse(id, &text, &GraftTable::new()).unwrap()
    }

    #[test]
    fn oneline_is_hash_and_subject() {
        let commit = ascii_commit();
        let out = format_commit(&commit, Format::Oneline);
        assert!(out.starts_with(short_hex(&commit.id().hex())));
        assert!(out.contains("add widget"));
    }

    #[test]
    fn full_includes_both_identities_and_body() {
        let commit = ascii_commit();
        let out = format_commit(&commit, Format::Full);
        assert!(out.contains("Author: A Author"));
        assert!(out.contains("Commit: C Committer"));
        assert!(out.contains("longer body here"));
    }

    #[test]
    fn merge_commit_gets_merge_header() {
        let commit = merge_commit();
        let out = format_commit(&commit, Format::Medium);
        assert!(out.starts_with_merge_header());
    }

    trait StartsWithMerge {
        fn starts_with_merge_header(&self) -> bool;
    }
    impl StartsWithMerge for str {
        fn starts_with_merge_header(&self) -> bool {
            self.lines().any(|l| l.starts_with("Merge:"))
        }
    }

    #[test]
    fn rfc2047_passes_plain_ascii_through() {
        assert_eq!(rfc2047_encode("Plain Name", "utf-8"), "Plain Name");
    }

    #[test]
    fn rfc2047_quotes_non_ascii() {
        let encoded = rfc2047_encode("Caf\u{e9}", "utf-8");
        assert!(encoded.starts_with("=?utf-8?q?"));
        assert!(encoded.ends_with("?="));
        assert!(encoded.contains("Caf"));
    }

    #[test]
    fn template_expands_known_tokens() {
        let commit = ascii_commit();
        let out = render_template(&commit, "%h %an <%ae>: %s%n");
        assert!(out.starts_with(short_hex(&commit.id().hex())));
        assert!(out.contains("A Author <a@example.com>: add widget"));
        assert!(out.ends_with('\n'));
    }

    #[test]
    fn template_passes_through_unknown_token() {
        let commit = ascii_commit();
        let out = render_template(&commit, "%z");
        assert_eq!(out, "%z");
    }
}
