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

//! Process-wide object table: a digest-keyed interning arena that hands out
//! stable handles. Entries are never moved once inserted, so a [`Handle`]
//! stays valid even as the table grows and rehashes.

use std::cell::RefCell;
use std::fmt;
use std::marker::PhantomData;

use hashbrown::HashTable;

use crate::digest::Digest;

/// A stable reference to an interned value of type `T`. Indexes into the
/// table's backing storage, which only ever appends.
pub struct Handle<T> {
    index: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T> Copy for Handle<T> {}
impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}
impl<T> Eq for Handle<T> {}
impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({})", self.index)
    }
}

struct Slot<T> {
    digest: Digest,
    value: T,
}

/// An append-only arena of `T`s keyed by [`Digest`], with O(1) lookup by
/// digest and stable [`Handle`]s that survive rehashing.
///
/// Slots are stored in a `Vec` that never reallocates element addresses out
/// from under a live `&T` because callers only ever hold handles, never
/// references across an `intern` call; the hash table maps digest to index
/// and is rebuilt in place on growth, leaving the slot vector untouched.
pub struct Table<T> {
    slots: Vec<Slot<T>>,
    index: RefCell<HashTable<u32>>,
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Table<T> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            index: RefCell::new(HashTable::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn hash_of(digest: &Digest) -> u64 {
        // The digest is already a uniformly-distributed cryptographic hash;
        // folding its leading bytes avoids hashing all 20 bytes per lookup.
        u64::from_le_bytes(digest.as_bytes()[0..8].try_into().unwrap())
    }

    pub fn get(&self, digest: &Digest) -> Option<Handle<T>> {
        let hash = Self::hash_of(digest);
        let index = self.index.borrow();
        index
            .find(hash, |&i| &self.slots[i as usize].digest == digest)
            .map(|&i| Handle {
                index: i,
                _marker: PhantomData,
            })
    }

    /// Returns the handle for `digest`, inserting `make_value()` if absent.
    pub fn intern(&mut self, digest: Digest, make_value: impl FnOnce() -> T) -> Handle<T> {
        if let Some(handle) = self.get(&digest) {
            return handle;
        }
        let new_index = self.slots.len() as u32;
        self.slots.push(Slot {
            digest,
            value: make_value(),
        });
        let hash = Self::hash_of(&digest);
        self.index.get_mut().insert_unique(hash, new_index, |&i| {
            Self::hash_of(&self.slots[i as usize].digest)
        });
        Handle {
            index: new_index,
            _marker: PhantomData,
        }
    }

    pub fn digest(&self, handle: Handle<T>) -> Digest {
        self.slots[handle.index as usize].digest
    }

    pub fn value(&self, handle: Handle<T>) -> &T {
        &self.slots[handle.index as usize].value
    }

    pub fn value_mut(&mut self, handle: Handle<T>) -> &mut T {
        &mut self.slots[handle.index as usize].value
    }

    pub fn iter(&self) -> impl Iterator<Item = (Digest, &T)> {
        self.slots.iter().map(|slot| (slot.digest, &slot.value))
    }
}
