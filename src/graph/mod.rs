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

//! Commit-graph traversal: reachability marking, a date-ordered priority
//! walk, and a two-pass topological sort. Engine flags live in a
//! caller-local [`FlagTable`] rather than on shared object state, so a
//! traversal has nothing to clean up on any exit path, early return
//! included — the table is simply dropped.

pub mod bisect;
pub mod merge_base;

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};

use crate::digest::CommitId;
use crate::object::ObjectFlags;
use crate::object::commit::Timestamp;

/// Read-only access to parent edges and commit dates, the only two things a
/// traversal needs to know about a commit.
pub trait CommitProvider {
    type Error;

    fn parents(&self, id: CommitId) -> Result<Vec<CommitId>, Self::Error>;
    fn timestamp(&self, id: CommitId) -> Result<Timestamp, Self::Error>;
}

/// Per-traversal flag bits, keyed by commit. Never persisted: each
/// traversal entry point creates its own and lets it go out of scope.
#[derive(Debug, Default)]
pub struct FlagTable {
    bits: HashMap<CommitId, ObjectFlags>,
}

impl FlagTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: CommitId) -> ObjectFlags {
        self.bits.get(&id).copied().unwrap_or(ObjectFlags::empty())
    }

    pub fn insert(&mut self, id: CommitId, flags: ObjectFlags) {
        self.bits.insert(id, flags);
    }

    pub fn add(&mut self, id: CommitId, flag: ObjectFlags) {
        let updated = self.get(id) | flag;
        self.bits.insert(id, updated);
    }
}

/// Transitively marks `tips` and every ancestor reachable from them with
/// `flag`. Idempotent: a commit that already carries `flag` is not
/// revisited, so this terminates even on a graph with merges.
pub fn mark_reachable<P: CommitProvider>(
    provider: &P,
    flags: &mut FlagTable,
    tips: impl IntoIterator<Item = CommitId>,
    flag: ObjectFlags,
) -> Result<(), P::Error> {
    let mut stack: Vec<CommitId> = tips.into_iter().collect();
    let mut visited = 0usize;
    while let Some(id) = stack.pop() {
        if flags.get(id).contains(flag) {
            continue;
        }
        flags.add(id, flag);
        visited += 1;
        stack.extend(provider.parents(id)?);
    }
    tracing::debug!(visited, ?flag, "reachability walk finished");
    Ok(())
}

#[derive(Debug)]
struct DatedId {
    timestamp: Timestamp,
    sequence: u64,
    id: CommitId,
}

impl PartialEq for DatedId {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
impl Eq for DatedId {}

impl Ord for DatedId {
    fn cmp(&self, other: &Self) -> Ordering {
        // Newest timestamp has highest priority; ties favour whichever
        // entry was enqueued first.
        self.timestamp
            .cmp(&other.timestamp)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}
impl PartialOrd for DatedId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A max-heap of commits ordered by date, used to implement the "pop the
/// newest unmarked commit" step shared by several traversals.
pub struct DateOrderedQueue<'p, P> {
    provider: &'p P,
    heap: BinaryHeap<DatedId>,
    next_sequence: u64,
}

impl<'p, P: CommitProvider> DateOrderedQueue<'p, P> {
    pub fn new(provider: &'p P) -> Self {
        Self {
            provider,
            heap: BinaryHeap::new(),
            next_sequence: 0,
        }
    }

    pub fn push(&mut self, id: CommitId) -> Result<(), P::Error> {
        let timestamp = self.provider.timestamp(id)?;
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.heap.push(DatedId { timestamp, sequence, id });
        Ok(())
    }

    /// Returns the newest unmarked commit, marks it with `flag`, and
    /// enqueues its parents. Entries already carrying `flag` are skipped
    /// rather than re-emitted.
    pub fn pop_most_recent(&mut self, flags: &mut FlagTable, flag: ObjectFlags) -> Result<Option<CommitId>, P::Error> {
        while let Some(entry) = self.heap.pop() {
            if flags.get(entry.id).contains(flag) {
                continue;
            }
            flags.add(entry.id, flag);
            for parent in self.provider.parents(entry.id)? {
                self.push(parent)?;
            }
            return Ok(Some(entry.id));
        }
        Ok(None)
    }
}

enum WorkQueue {
    Lifo(Vec<CommitId>),
    ByDate(BinaryHeap<DatedId>),
}

impl WorkQueue {
    fn push<P: CommitProvider>(&mut self, id: CommitId, provider: &P, next_sequence: &mut u64) -> Result<(), P::Error> {
        match self {
            Self::Lifo(stack) => stack.push(id),
            Self::ByDate(heap) => {
                let timestamp = provider.timestamp(id)?;
                let sequence = *next_sequence;
                *next_sequence += 1;
                heap.push(DatedId { timestamp, sequence, id });
            }
        }
        Ok(())
    }

    fn pop(&mut self) -> Option<CommitId> {
        match self {
            Self::Lifo(stack) => stack.pop(),
            Self::ByDate(heap) => heap.pop().map(|entry| entry.id),
        }
    }
}

/// Two-pass Kahn's algorithm restricted to `commits`: only edges whose
/// target is also in `commits` count toward indegree. The output preserves
/// "a commit appears before its ancestors".
pub fn topo_sort<P: CommitProvider>(provider: &P, commits: &[CommitId], lifo: bool) -> Result<Vec<CommitId>, P::Error> {
    let members: HashSet<CommitId> = commits.iter().copied().collect();
    let mut indegree: HashMap<CommitId, usize> = commits.iter().map(|&id| (id, 0)).collect();
    for &id in commits {
        for parent in provider.parents(id)? {
            if let Some(count) = indegree.get_mut(&parent) {
                *count += 1;
            }
        }
    }

    let mut next_sequence = 0u64;
    let mut queue = if lifo {
        WorkQueue::Lifo(Vec::new())
    } else {
        WorkQueue::ByDate(BinaryHeap::new())
    };
    for &id in commits {
        if indegree[&id] == 0 {
            queue.push(id, provider, &mut next_sequence)?;
        }
    }

    let mut output = Vec::with_capacity(commits.len());
    while let Some(id) = queue.pop() {
        if !members.contains(&id) {
            continue;
        }
        output.push(id);
        for parent in provider.parents(id)? {
            if let Some(count) = indegree.get_mut(&parent) {
                *count -= 1;
                if *count == 0 {
                    queue.push(parent, provider, &mut next_sequence)?;
                }
            }
        }
    }
    tracing::debug!(input = commits.len(), output = output.len(), lifo, "topo sort finished");
    Ok(output)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// An in-memory commit graph for exercising traversal algorithms without
    /// an object store.
    #[derive(Default)]
    pub struct FakeGraph {
        pub parents: HashMap<CommitId, Vec<CommitId>>,
        pub timestamps: HashMap<CommitId, Timestamp>,
    }

    impl FakeGraph {
        pub fn add(&mut self, id: CommitId, seconds: i64, parents: &[CommitId]) {
            self.timestamps.insert(
                id,
                Timestamp {
                    seconds,
                    tz_offset_minutes: 0,
                },
            );
            self.parents.insert(id, parents.to_vec());
        }
    }

    impl CommitProvider for FakeGraph {
        type Error = std::convert::Infallible;

        fn parents(&self, id: CommitId) -> Result<Vec<CommitId>, Self::Error> {
            Ok(self.parents.get(&id).cloned().unwrap_or_default())
        }

        fn timestamp(&self, id: CommitId) -> Result<Timestamp, Self::Error> {
            Ok(self.timestamps[&id])
        }
    }

    pub fn commit_id(byte: u8) -> CommitId {
        let mut bytes = [0u8; 20];
        bytes[19] = byte;
        CommitId::new(crate::digest::Digest::from_bytes(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn mark_reachable_covers_all_ancestors() {
        let a = commit_id(1);
        let b = commit_id(2);
        let c = commit_id(3);
        let mut graph = FakeGraph::default();
        graph.add(c, 1, &[]);
        graph.add(b, 2, &[c]);
        graph.add(a, 3, &[b]);

        let mut flags = FlagTable::new();
        mark_reachable(&graph, &mut flags, [a], ObjectFlags::REACHABLE).unwrap();
        for id in [a, b, c] {
            assert!(flags.get(id).contains(ObjectFlags::REACHABLE));
        }
    }

    #[test]
    fn date_ordered_queue_pops_newest_first() {
        let old = commit_id(1);
        let new = commit_id(2);
        let mut graph = FakeGraph::default();
        graph.add(old, 100, &[]);
        graph.add(new, 200, &[]);

        let mut queue = DateOrderedQueue::new(&graph);
        queue.push(old).unwrap();
        queue.push(new).unwrap();
        let mut flags = FlagTable::new();
        assert_eq!(queue.pop_most_recent(&mut flags, ObjectFlags::SEEN).unwrap(), Some(new));
        assert_eq!(queue.pop_most_recent(&mut flags, ObjectFlags::SEEN).unwrap(), Some(old));
        assert_eq!(queue.pop_most_recent(&mut flags, ObjectFlags::SEEN).unwrap(), None);
    }

    #[test]
    fn topo_sort_keeps_commits_before_ancestors() {
        let root = commit_id(1);
        let middle = commit_id(2);
        let tip = commit_id(3);
        let mut graph = FakeGraph::default();
        graph.add(root, 1, &[]);
        graph.add(middle, 2, &[root]);
        graph.add(tip, 3, &[middle]);

        let order = topo_sort(&graph, &[root, middle, tip], false).unwrap();
        let pos = |id| order.iter().position(|&x| x == id).unwrap();
        assert!(pos(tip) < pos(middle));
        assert!(pos(middle) < pos(root));
    }

    #[test]
    fn topo_sort_handles_merge_commit() {
        let base = commit_id(1);
        let left = commit_id(2);
        let right = commit_id(3);
        let merge = commit_id(4);
        let mut graph = FakeGraph::default();
        graph.add(base, 1, &[]);
        graph.add(left, 2, &[base]);
        graph.add(right, 3, &[base]);
        graph.add(merge, 4, &[left, right]);

        let order = topo_sort(&graph, &[base, left, right, merge], false).unwrap();
        assert_eq!(order.len(), 4);
        let pos = |id| order.iter().position(|&x| x == id).unwrap();
        assert_eq!(pos(merge), 0);
        assert!(pos(base) > pos(left));
        assert!(pos(base) > pos(right));
    }
}
