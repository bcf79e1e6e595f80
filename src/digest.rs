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

//! The 20-byte content digest that identifies every object, plus hex
//! encoding and short-prefix resolution.

use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;

/// Number of bytes in a digest (SHA-1 output size).
pub const DIGEST_LEN: usize = 20;

/// Error returned when a hex string cannot be decoded into a [`Digest`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DigestParseError {
    #[error("expected {DIGEST_LEN0} hex digits, got {0}", DIGEST_LEN0 = DIGEST_LEN * 2)]
    WrongLength(usize),
    #[error("invalid hex digit at offset {0}")]
    InvalidHex(usize),
}

/// A fixed 20-byte cryptographic digest identifying an object's type-tagged
/// content. The all-zero digest is a sentinel for "absent/unborn".
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Digest([u8; DIGEST_LEN]);

impl Digest {
    pub const NULL: Self = Self([0; DIGEST_LEN]);

    pub const fn from_bytes(bytes: [u8; DIGEST_LEN]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        <[u8; DIGEST_LEN]>::try_from(bytes).ok().map(Self)
    }

    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }

    pub fn is_null(&self) -> bool {
        self.0 == [0; DIGEST_LEN]
    }

    /// Parses a canonical 40-character lowercase hex string.
    pub fn from_hex(hex: impl AsRef<[u8]>) -> Result<Self, DigestParseError> {
        let hex = hex.as_ref();
        if hex.len() != DIGEST_LEN * 2 {
            return Err(DigestParseError::WrongLength(hex.len()));
        }
        let mut out = [0u8; DIGEST_LEN];
        for (i, chunk) in hex.chunks_exact(2).enumerate() {
            let hi = hex_value(chunk[0]).ok_or(DigestParseError::InvalidHex(i * 2))?;
            let lo = hex_value(chunk[1]).ok_or(DigestParseError::InvalidHex(i * 2 + 1))?;
            out[i] = (hi << 4) | lo;
        }
        Ok(Self(out))
    }

    /// Returns the canonical 40-character lowercase hex representation.
    pub fn to_hex(self) -> String {
        hex::encode(self.0)
    }
}

impl FromStr for Digest {
    type Err = DigestParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s.as_bytes())
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.to_hex())
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.to_hex())
    }
}

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

/// Marker for the kind of object a [`Digest`] identifies. Lets callers keep
/// `ObjectId<Tree>` and `ObjectId<Commit>` from being accidentally swapped
/// while sharing all encode/decode/ordering logic.
pub trait ObjectKind {
    const NAME: &'static str;
}

macro_rules! object_kind {
    ($name:ident, $label:literal) => {
        #[derive(Clone, Copy, Debug, PartialEq, Eq)]
        pub enum $name {}
        impl ObjectKind for $name {
            const NAME: &'static str = $label;
        }
    };
}

object_kind!(Blob, "blob");
object_kind!(Tree, "tree");
object_kind!(Commit, "commit");
object_kind!(Tag, "tag");

/// A [`Digest`] known (by the type system) to identify an object of kind `K`.
pub struct ObjectId<K> {
    digest: Digest,
    _kind: PhantomData<fn() -> K>,
}

impl<K> ObjectId<K> {
    pub const fn new(digest: Digest) -> Self {
        Self {
            digest,
            _kind: PhantomData,
        }
    }

    pub fn digest(&self) -> Digest {
        self.digest
    }

    pub fn from_hex(hex: impl AsRef<[u8]>) -> Result<Self, DigestParseError> {
        Digest::from_hex(hex).map(Self::new)
    }

    pub fn hex(&self) -> String {
        self.digest.to_hex()
    }
}

impl<K: ObjectKind> fmt::Debug for ObjectId<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", K::NAME, self.hex())
    }
}

impl<K> fmt::Display for ObjectId<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.digest, f)
    }
}

impl<K> Clone for ObjectId<K> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<K> Copy for ObjectId<K> {}
impl<K> PartialEq for ObjectId<K> {
    fn eq(&self, other: &Self) -> bool {
        self.digest == other.digest
    }
}
impl<K> Eq for ObjectId<K> {}
impl<K> PartialOrd for ObjectId<K> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl<K> Ord for ObjectId<K> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.digest.cmp(&other.digest)
    }
}
impl<K> std::hash::Hash for ObjectId<K> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.digest.hash(state);
    }
}

pub type BlobId = ObjectId<Blob>;
pub type TreeId = ObjectId<Tree>;
pub type CommitId = ObjectId<Commit>;
pub type TagId = ObjectId<Tag>;

/// A partial hex prefix used for short-hash abbreviation and lookup.
///
/// For odd-length prefixes the lower 4 bits of the last stored byte are
/// zero-filled (e.g. the prefix `"abc"` is stored as the two bytes `ab`,
/// `c0`, with `has_odd_byte` set).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HexPrefix {
    min_prefix_bytes: Vec<u8>,
    has_odd_byte: bool,
}

impl HexPrefix {
    pub fn try_from_hex(prefix: impl AsRef<[u8]>) -> Option<Self> {
        let prefix = prefix.as_ref();
        let mut min_prefix_bytes = Vec::with_capacity(prefix.len().div_ceil(2));
        let mut chunks = prefix.chunks_exact(2);
        for chunk in &mut chunks {
            let hi = hex_value(chunk[0])?;
            let lo = hex_value(chunk[1])?;
            min_prefix_bytes.push((hi << 4) | lo);
        }
        let has_odd_byte = match chunks.remainder() {
            [] => false,
            &[hi] => {
                min_prefix_bytes.push(hex_value(hi)? << 4);
                true
            }
            _ => unreachable!(),
        };
        Some(Self {
            min_prefix_bytes,
            has_odd_byte,
        })
    }

    pub fn hex(&self) -> String {
        let mut s = hex::encode(&self.min_prefix_bytes);
        if self.has_odd_byte {
            s.pop();
        }
        s
    }

    /// Returns the full digest this prefix denotes, if the prefix has exactly
    /// 40 hex digits.
    pub fn as_full_digest(&self) -> Option<Digest> {
        if self.has_odd_byte {
            return None;
        }
        Digest::from_slice(&self.min_prefix_bytes)
    }

    fn split_odd_byte(&self) -> (Option<u8>, &[u8]) {
        if self.has_odd_byte {
            let (&odd, prefix) = self.min_prefix_bytes.split_last().unwrap();
            (Some(odd), prefix)
        } else {
            (None, &self.min_prefix_bytes)
        }
    }

    pub fn matches(&self, digest: &Digest) -> bool {
        let bytes = digest.as_bytes();
        let (maybe_odd, prefix) = self.split_odd_byte();
        if !bytes.starts_with(prefix) {
            return false;
        }
        match maybe_odd {
            Some(odd) => matches!(bytes.get(prefix.len()), Some(v) if v & 0xf0 == odd),
            None => true,
        }
    }
}

/// Outcome of resolving a [`HexPrefix`] against a set of digests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrefixResolution<T> {
    NoMatch,
    SingleMatch(T),
    AmbiguousMatch,
}

/// Resolves `prefix` against a sorted, deduplicated slice of digests.
///
/// Abbreviation is advisory: a prefix that is unique now may become
/// ambiguous once more objects are written, since this only consults the
/// digests passed in at call time.
pub fn resolve_prefix(sorted_digests: &[Digest], prefix: &HexPrefix) -> PrefixResolution<Digest> {
    let start = sorted_digests.partition_point(|d| d.as_bytes().as_slice() < prefix.min_prefix_bytes.as_slice());
    let mut matches = sorted_digests[start..].iter().take_while(|d| prefix.matches(d));
    match (matches.next(), matches.next()) {
        (None, _) => PrefixResolution::NoMatch,
        (Some(d), None) => PrefixResolution::SingleMatch(*d),
        (Some(_), Some(_)) => PrefixResolution::AmbiguousMatch,
    }
}

/// Returns the length (in hex digits) of the shortest prefix of `digest` that
/// is still unique within `sorted_digests`.
pub fn shortest_unique_prefix_len(sorted_digests: &[Digest], digest: &Digest) -> usize {
    let pos = sorted_digests.partition_point(|d| d < digest);
    let prev = pos.checked_sub(1).map(|i| &sorted_digests[i]);
    let next = sorted_digests.get(pos + usize::from(sorted_digests.get(pos) == Some(digest)));
    let shared_with = |other: Option<&Digest>| {
        other
            .map(|o| common_hex_len(digest.as_bytes(), o.as_bytes()))
            .unwrap_or(0)
    };
    1 + shared_with(prev).max(shared_with(next))
}

/// Length, in hex digits, of the common prefix of two byte sequences.
fn common_hex_len(a: &[u8], b: &[u8]) -> usize {
    std::iter::zip(a, b)
        .enumerate()
        .find_map(|(i, (x, y))| match x ^ y {
            0 => None,
            d if d & 0xf0 == 0 => Some(i * 2 + 1),
            _ => Some(i * 2),
        })
        .unwrap_or_else(|| a.len().min(b.len()) * 2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_round_trip() {
        let d = Digest::from_hex("ce013625030ba8dba906f756967f9e9ca394464").unwrap();
        assert_eq!(d.to_hex(), "ce013625030ba8dba906f756967f9e9ca394464");
    }

    #[test]
    fn null_digest_is_all_zero() {
        assert!(Digest::NULL.is_null());
        assert!(!Digest::from_hex("ce013625030ba8dba906f756967f9e9ca394464").unwrap().is_null());
    }

    #[test]
    fn wrong_length_is_rejected() {
        assert_eq!(Digest::from_hex("abcd"), Err(DigestParseError::WrongLength(4)));
    }

    #[test]
    fn invalid_hex_digit_is_rejected() {
        let s = "zz013625030ba8dba906f756967f9e9ca394464";
        assert_eq!(Digest::from_hex(s), Err(DigestParseError::InvalidHex(0)));
    }

    #[test]
    fn prefix_matches() {
        let id = Digest::from_hex("1234500000000000000000000000000000000a").unwrap();
        assert!(HexPrefix::try_from_hex("1234").unwrap().matches(&id));
        assert!(HexPrefix::try_from_hex("12345").unwrap().matches(&id));
        assert!(!HexPrefix::try_from_hex("12346").unwrap().matches(&id));
        assert!(!HexPrefix::try_from_hex("a").unwrap().matches(&id));
    }

    #[test]
    fn resolve_prefix_distinguishes_ambiguous() {
        let a = Digest::from_hex("aaaa000000000000000000000000000000000a").unwrap();
        let b = Digest::from_hex("aaaa000000000000000000000000000000000b").unwrap();
        let c = Digest::from_hex("bbbb000000000000000000000000000000000a").unwrap();
        let mut all = [a, b, c];
        all.sort();
        assert_eq!(
            resolve_prefix(&all, &HexPrefix::try_from_hex("bb").unwrap()),
            PrefixResolution::SingleMatch(c)
        );
        assert_eq!(
            resolve_prefix(&all, &HexPrefix::try_from_hex("aaaa").unwrap()),
            PrefixResolution::AmbiguousMatch
        );
        assert_eq!(
            resolve_prefix(&all, &HexPrefix::try_from_hex("cccc").unwrap()),
            PrefixResolution::NoMatch
        );
    }
}
