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

//! Lowest common ancestor of two commits, computed with the same
//! flag-propagation trick used by the historical `git merge-base`: walk a
//! date-ordered list, tag commits with which side(s) reach them, and mark a
//! commit `STALE` once both sides have passed through it.

use std::collections::{BinaryHeap, HashMap, HashSet};

use super::{CommitProvider, DatedId};
use crate::digest::CommitId;
use crate::object::ObjectFlags;

fn seed<P: CommitProvider>(
    provider: &P,
    flags: &mut HashMap<CommitId, ObjectFlags>,
    heap: &mut BinaryHeap<DatedId>,
    sequence: &mut u64,
    id: CommitId,
    flag: ObjectFlags,
) -> Result<(), P::Error> {
    let before = flags.get(&id).copied().unwrap_or(ObjectFlags::empty());
    if before.contains(flag) {
        return Ok(());
    }
    flags.insert(id, before | flag);
    let timestamp = provider.timestamp(id)?;
    let entry = DatedId {
        timestamp,
        sequence: *sequence,
        id,
    };
    *sequence += 1;
    heap.push(entry);
    Ok(())
}

/// Every flag bit relevant to the merge-base walk.
const SIDE_BITS: ObjectFlags = ObjectFlags::PARENT1.union(ObjectFlags::PARENT2).union(ObjectFlags::STALE);

/// Returns the merge bases of `a` and `b`: the maximal commits reachable
/// from both, with any base that is itself an ancestor of another base
/// removed.
pub fn merge_bases<P: CommitProvider>(provider: &P, a: CommitId, b: CommitId) -> Result<Vec<CommitId>, P::Error> {
    let mut flags: HashMap<CommitId, ObjectFlags> = HashMap::new();
    let mut heap: BinaryHeap<DatedId> = BinaryHeap::new();
    let mut sequence = 0u64;

    seed(provider, &mut flags, &mut heap, &mut sequence, a, ObjectFlags::PARENT1)?;
    seed(provider, &mut flags, &mut heap, &mut sequence, b, ObjectFlags::PARENT2)?;

    let mut result = Vec::new();
    while let Some(entry) = heap.pop() {
        let id = entry.id;
        let current = flags.get(&id).copied().unwrap_or(ObjectFlags::empty());
        if current.contains(ObjectFlags::PARENT1) && current.contains(ObjectFlags::PARENT2) {
            if !current.contains(ObjectFlags::RESULT) {
                flags.insert(id, current | ObjectFlags::RESULT);
                result.push(id);
            }
            for parent in provider.parents(id)? {
                seed(provider, &mut flags, &mut heap, &mut sequence, parent, ObjectFlags::STALE)?;
            }
        } else {
            let propagate = current & SIDE_BITS;
            for parent in provider.parents(id)? {
                seed(provider, &mut flags, &mut heap, &mut sequence, parent, propagate)?;
            }
        }
    }

    // Drop any base that is itself reachable from another base: only the
    // maximal ones are the "merge base" result.
    let mut filtered = Vec::with_capacity(result.len());
    'candidates: for &candidate in &result {
        for &other in &result {
            if other != candidate && is_ancestor(provider, candidate, other)? {
                continue 'candidates;
            }
        }
        filtered.push(candidate);
    }
    tracing::debug!(%a, %b, count = filtered.len(), "merge base walk finished");
    Ok(filtered)
    // `flags` is local and is dropped here, so there is nothing left to clear.
}

/// Whether `ancestor` is reachable by following parent edges from
/// `descendant` (a commit is its own ancestor).
pub fn is_ancestor<P: CommitProvider>(provider: &P, ancestor: CommitId, descendant: CommitId) -> Result<bool, P::Error> {
    let mut visited = HashSet::new();
    let mut stack = vec![descendant];
    while let Some(id) = stack.pop() {
        if id == ancestor {
            return Ok(true);
        }
        if !visited.insert(id) {
            continue;
        }
        stack.extend(provider.parents(id)?);
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;

    #[test]
    fn finds_single_common_ancestor() {
        let base = commit_id(1);
        let left = commit_id(2);
        let right = commit_id(3);
        let mut graph = FakeGraph::default();
        graph.add(base, 1, &[]);
        graph.add(left, 2, &[base]);
        graph.add(right, 3, &[base]);

        let bases = merge_bases(&graph, left, right).unwrap();
        assert_eq!(bases, vec![base]);
    }

    #[test]
    fn ancestor_is_its_own_merge_base() {
        let base = commit_id(1);
        let tip = commit_id(2);
        let mut graph = FakeGraph::default();
        graph.add(base, 1, &[]);
        graph.add(tip, 2, &[base]);

        let bases = merge_bases(&graph, base, tip).unwrap();
        assert_eq!(bases, vec![base]);
    }

    #[test]
    fn drops_merge_base_that_is_ancestor_of_another() {
        // root -> mid -> left, right; merge-bases(left, right) should report
        // just `mid`, not `root` (which `mid` already covers).
        let root = commit_id(1);
        let mid = commit_id(2);
        let left = commit_id(3);
        let right = commit_id(4);
        let mut graph = FakeGraph::default();
        graph.add(root, 1, &[]);
        graph.add(mid, 2, &[root]);
        graph.add(left, 3, &[mid]);
        graph.add(right, 4, &[mid]);

        let bases = merge_bases(&graph, left, right).unwrap();
        assert_eq!(bases, vec![mid]);
    }

    #[test]
    fn is_ancestor_reports_self() {
        let a = commit_id(1);
        let graph = FakeGraph::default();
        assert!(is_ancestor(&graph, a, a).unwrap());
    }
}
