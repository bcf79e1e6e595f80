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

//! The four object variants (blob/tree/commit/tag) and the flag bitset
//! shared by every node in the object table.

pub mod blob;
pub mod commit;
pub mod tag;
pub mod tree;

pub use blob::Blob;
pub use commit::Commit;
pub use tag::Tag;
pub use tree::Tree;

use crate::digest::Digest;

/// Which variant an [`Object`] holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ObjectType {
    Blob,
    Tree,
    Commit,
    Tag,
}

impl ObjectType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Blob => "blob",
            Self::Tree => "tree",
            Self::Commit => "commit",
            Self::Tag => "tag",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "blob" => Some(Self::Blob),
            "tree" => Some(Self::Tree),
            "commit" => Some(Self::Commit),
            "tag" => Some(Self::Tag),
            _ => None,
        }
    }
}

bitflags::bitflags! {
    /// Engine-reserved and user-available bits tracked per object during
    /// traversal (reachability marking, merge-base, bisection). Transient
    /// flags are cleared on every exit path of the traversal that set them.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct ObjectFlags: u32 {
        const REACHABLE       = 1 << 0;
        const SEEN            = 1 << 1;
        const UNINTERESTING   = 1 << 2;
        const BOUNDARY        = 1 << 3;
        const TMP_MARK        = 1 << 4;
        const SYMMETRIC_LEFT  = 1 << 5;
        const COUNTED         = 1 << 6;
        const STALE           = 1 << 7;
        const RESULT          = 1 << 8;
        const PARENT1         = 1 << 9;
        const PARENT2         = 1 << 10;
        const TREECHANGE      = 1 << 11;
        /// Mask of the 16 bits user code (callers outside the graph engine)
        /// may repurpose freely between traversals.
        const USER_MASK       = 0xFFFF_0000;
    }
}

/// Payload shared by every node kept in the object table, regardless of
/// variant. `parsed` guards the one-time decode of `payload` into the
/// variant-specific struct; `used` records whether reachability analysis
/// ever referenced this object.
#[derive(Debug)]
pub struct ObjectHeader {
    pub digest: Digest,
    pub object_type: ObjectType,
    pub parsed: bool,
    pub used: bool,
    pub flags: ObjectFlags,
}

impl ObjectHeader {
    pub fn new(digest: Digest, object_type: ObjectType) -> Self {
        Self {
            digest,
            object_type,
            parsed: false,
            used: false,
            flags: ObjectFlags::empty(),
        }
    }
}

/// A fully-typed object node: the header plus its decoded payload, once
/// parsing has occurred.
#[derive(Debug)]
pub enum Object {
    Blob(Blob),
    Tree(Tree),
    Commit(Commit),
    Tag(Tag),
}

impl Object {
    pub fn object_type(&self) -> ObjectType {
        match self {
            Self::Blob(_) => ObjectType::Blob,
            Self::Tree(_) => ObjectType::Tree,
            Self::Commit(_) => ObjectType::Commit,
            Self::Tag(_) => ObjectType::Tag,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_type_round_trips_through_str() {
        for t in [ObjectType::Blob, ObjectType::Tree, ObjectType::Commit, ObjectType::Tag] {
            assert_eq!(ObjectType::from_str(t.as_str()), Some(t));
        }
        assert_eq!(ObjectType::from_str("bogus"), None);
    }

    #[test]
    fn user_mask_does_not_overlap_engine_bits() {
        let engine_bits = ObjectFlags::REACHABLE
            | ObjectFlags::SEEN
            | ObjectFlags::UNINTERESTING
            | ObjectFlags::BOUNDARY
            | ObjectFlags::TMP_MARK
            | ObjectFlags::SYMMETRIC_LEFT
            | ObjectFlags::COUNTED
            | ObjectFlags::STALE
            | ObjectFlags::RESULT
            | ObjectFlags::PARENT1
            | ObjectFlags::PARENT2
            | ObjectFlags::TREECHANGE;
        assert!((engine_bits & ObjectFlags::USER_MASK).is_empty());
    }
}
