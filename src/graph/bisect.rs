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

//! Bisect a range of commits to find the one that best splits it in half,
//! then track good/bad/skip verdicts across repeated calls until the range
//! narrows to a single answer.

use std::collections::{HashMap, HashSet};

use super::merge_base::is_ancestor;
use super::{CommitProvider, topo_sort};
use crate::digest::CommitId;

/// The outcome of bisecting one round: the chosen commit plus the partition
/// sizes that result depending on how it's marked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BisectionReport {
    pub bisect_rev: CommitId,
    pub remaining_steps: usize,
    /// Commits left to consider if `bisect_rev` turns out good.
    pub good_count: usize,
    /// Commits left to consider if `bisect_rev` turns out bad.
    pub bad_count: usize,
    pub total: usize,
}

fn count_reachable<P: CommitProvider>(provider: &P, start: CommitId, members: &HashSet<CommitId>) -> Result<usize, P::Error> {
    let mut visited = HashSet::new();
    let mut stack = vec![start];
    let mut count = 0;
    while let Some(id) = stack.pop() {
        if !visited.insert(id) {
            continue;
        }
        if members.contains(&id) {
            count += 1;
        }
        stack.extend(provider.parents(id)?);
    }
    Ok(count)
}

/// Picks the commit in `interesting` whose reachable-ancestor count within
/// the set best bisects it. Single-parent commits reuse their parent's
/// already-computed count; everything else falls back to an exact walk.
///
/// `interesting` must be ordered newest-first (the order a revision walk
/// naturally produces). When two commits tie for the best split, the first
/// one encountered in `interesting` wins, so a newest-first order resolves
/// ties toward the newer of the two candidates.
pub fn bisect<P: CommitProvider>(provider: &P, interesting: &[CommitId]) -> Result<Option<BisectionReport>, P::Error> {
    let n = interesting.len();
    if n == 0 {
        return Ok(None);
    }
    let members: HashSet<CommitId> = interesting.iter().copied().collect();
    // Process ancestors before descendants so the fast path can reuse a
    // parent's already-computed reach.
    let mut order = topo_sort(provider, interesting, false)?;
    order.reverse();

    let mut reach: HashMap<CommitId, usize> = HashMap::with_capacity(n);
    for id in order {
        let parents = provider.parents(id)?;
        let value = match parents.as_slice() {
            [parent] if members.contains(parent) => reach.get(parent).copied().map(|r| r + 1),
            _ => None,
        };
        let value = match value {
            Some(v) => v,
            None => count_reachable(provider, id, &members)?,
        };
        reach.insert(id, value);
    }

    let mut best: Option<(CommitId, usize, usize)> = None; // (id, reach, distance)
    for &id in interesting {
        let r = reach[&id];
        let distance = r.min(n - r);
        let improves = match best {
            None => true,
            Some((_, _, best_distance)) => distance > best_distance,
        };
        if improves {
            best = Some((id, r, distance));
        }
    }
    let (bisect_rev, r, _) = best.expect("interesting is non-empty");
    let larger = r.max(n - r);
    let report = BisectionReport {
        bisect_rev,
        remaining_steps: larger.saturating_sub(1),
        good_count: n - r,
        bad_count: r,
        total: n,
    };
    tracing::debug!(%bisect_rev, total = n, remaining_steps = report.remaining_steps, "bisection round chose a pivot");
    Ok(Some(report))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Evaluation {
    Good,
    Bad,
    Skip,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BisectionResult {
    /// The first bad commit(s). More than one only when the bad range has
    /// multiple disjoint heads.
    Found(Vec<CommitId>),
    /// The first bad commit is hidden behind a skipped range.
    Indeterminate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextStep {
    Evaluate(CommitId),
    Done(BisectionResult),
}

/// Tracks good/bad/skip verdicts across rounds of bisection. The range's
/// head is assumed bad at construction; parents of the range's roots are
/// assumed good once discovered.
pub struct Bisector<'p, P> {
    provider: &'p P,
    bad: HashSet<CommitId>,
    good: HashSet<CommitId>,
    skipped: HashSet<CommitId>,
}

impl<'p, P: CommitProvider> Bisector<'p, P> {
    pub fn new(provider: &'p P, bad_tip: CommitId) -> Self {
        Self {
            provider,
            bad: HashSet::from([bad_tip]),
            good: HashSet::new(),
            skipped: HashSet::new(),
        }
    }

    pub fn mark(&mut self, id: CommitId, evaluation: Evaluation) {
        match evaluation {
            Evaluation::Good => self.good.insert(id),
            Evaluation::Bad => self.bad.insert(id),
            Evaluation::Skip => self.skipped.insert(id),
        };
    }

    pub fn good_commits(&self) -> &HashSet<CommitId> {
        &self.good
    }

    pub fn bad_commits(&self) -> &HashSet<CommitId> {
        &self.bad
    }

    pub fn skipped_commits(&self) -> &HashSet<CommitId> {
        &self.skipped
    }

    /// Ancestors of a bad commit that are not ancestors of any good commit
    /// and have not already been decided.
    fn candidate_range(&self) -> Result<Vec<CommitId>, P::Error> {
        let bad_ancestors = self.ancestors_of(&self.bad)?;
        let good_ancestors = self.ancestors_of(&self.good)?;
        Ok(bad_ancestors
            .into_iter()
            .filter(|id| !good_ancestors.contains(id) && !self.skipped.contains(id) && !self.bad.contains(id))
            .collect())
    }

    fn ancestors_of(&self, tips: &HashSet<CommitId>) -> Result<HashSet<CommitId>, P::Error> {
        let mut visited = HashSet::new();
        let mut stack: Vec<CommitId> = tips.iter().copied().collect();
        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            stack.extend(self.provider.parents(id)?);
        }
        Ok(visited)
    }

    /// The next commit to evaluate, or the final bisection result once the
    /// candidate range is empty.
    pub fn next_step(&mut self) -> Result<NextStep, P::Error> {
        let candidates = self.candidate_range()?;
        if let Some(report) = bisect(self.provider, &candidates)? {
            return Ok(NextStep::Evaluate(report.bisect_rev));
        }

        let mut roots = Vec::new();
        'candidates: for &candidate in &self.bad {
            for &other in &self.bad {
                if other != candidate && is_ancestor(self.provider, candidate, other)? {
                    continue 'candidates;
                }
            }
            roots.push(candidate);
        }
        if roots.is_empty() {
            tracing::info!("bisection finished: first bad commit hidden behind a skipped range");
            Ok(NextStep::Done(BisectionResult::Indeterminate))
        } else {
            tracing::info!(count = roots.len(), "bisection finished: first bad commit found");
            Ok(NextStep::Done(BisectionResult::Found(roots)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;

    fn chain(len: u8) -> (FakeGraph, Vec<CommitId>) {
        let mut graph = FakeGraph::default();
        let ids: Vec<CommitId> = (1..=len).map(commit_id).collect();
        for (i, &id) in ids.iter().enumerate() {
            let parents: &[CommitId] = if i == 0 { &[] } else { &ids[i - 1..i] };
            graph.add(id, i as i64, parents);
        }
        (graph, ids)
    }

    #[test]
    fn bisect_picks_midpoint_of_a_chain() {
        let (graph, ids) = chain(7);
        let report = bisect(&graph, &ids).unwrap().unwrap();
        assert_eq!(report.total, 7);
        // The middle of a 7-long chain has reach = 4 (itself + 3 ancestors),
        // giving the best achievable min(reach, n - reach) = 3.
        assert_eq!(report.bad_count.min(report.good_count), 3);
    }

    #[test]
    fn bisector_converges_to_single_bad_commit() {
        let (graph, ids) = chain(7);
        let tip = *ids.last().unwrap();
        let root = ids[0];
        let mut bisector = Bisector::new(&graph, tip);
        bisector.mark(root, Evaluation::Good);

        let mut steps = 0;
        let found = loop {
            steps += 1;
            assert!(steps < 10, "bisection did not converge");
            match bisector.next_step().unwrap() {
                NextStep::Evaluate(id) => {
                    // Simulate: everything from index 4 onward is bad.
                    let idx = ids.iter().position(|&x| x == id).unwrap();
                    bisector.mark(id, if idx >= 4 { Evaluation::Bad } else { Evaluation::Good });
                }
                NextStep::Done(result) => break result,
            }
        };
        assert_eq!(found, BisectionResult::Found(vec![ids[4]]));
    }
}
