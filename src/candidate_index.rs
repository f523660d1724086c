//! Index of candidate linked pairs available to each breakend
//!

use std::collections::BTreeMap;

use crate::breakend::BreakendId;
use crate::linked_pair::{LinkedPair, LinkedPairStore, PairId};

/// Map from each breakend to its ordered list of candidate pairs
///
/// Candidate order reflects the input ranking, with the most preferred partner first. The index
/// is only modified to drop candidates once a breakend's ploidy is exhausted.
///
#[derive(Default)]
pub struct CandidateIndex {
    links: BTreeMap<BreakendId, Vec<PairId>>,
}

impl CandidateIndex {
    /// Register a pair as a candidate for both of its breakends
    ///
    /// Adding the same pair twice has no effect.
    ///
    pub fn add_pair(&mut self, pair: &LinkedPair) {
        for breakend in pair.breakends() {
            let candidates = self.links.entry(breakend).or_default();
            if !candidates.contains(&pair.id) {
                candidates.push(pair.id);
            }
        }
    }

    /// Ordered candidate pairs for the breakend, empty if it has none remaining
    pub fn candidate_pairs_for(&self, breakend: BreakendId) -> &[PairId] {
        self.links.get(&breakend).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Breakends with at least one candidate, in breakend id order
    pub fn breakends(&self) -> impl Iterator<Item = BreakendId> + '_ {
        self.links.keys().copied()
    }

    /// Iterate over all breakends with at least one candidate, in breakend id order
    pub fn iter(&self) -> impl Iterator<Item = (BreakendId, &[PairId])> {
        self.links.iter().map(|(&k, v)| (k, v.as_slice()))
    }

    /// Drop every candidate pair touching an exhausted breakend
    ///
    /// Returns the number of breakend entries removed from the index.
    ///
    pub fn remove_exhausted(
        &mut self,
        pairs: &LinkedPairStore,
        is_exhausted: impl Fn(BreakendId) -> bool,
    ) -> usize {
        let start_len = self.links.len();
        let links = std::mem::take(&mut self.links);
        self.links = links
            .into_iter()
            .filter(|(breakend, _)| !is_exhausted(*breakend))
            .map(|(breakend, candidates)| {
                let candidates = candidates
                    .into_iter()
                    .filter(|&id| {
                        let pair = pairs.get(id);
                        !(is_exhausted(pair.first) || is_exhausted(pair.second))
                    })
                    .collect::<Vec<_>>();
                (breakend, candidates)
            })
            .filter(|(_, candidates)| !candidates.is_empty())
            .collect();
        start_len - self.links.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidate_index() {
        let mut store = LinkedPairStore::default();
        let mut index = CandidateIndex::default();

        let a = BreakendId::end(0);
        let b = BreakendId::start(1);
        let c = BreakendId::start(2);
        let ab = store.get_or_insert(a, b, 100, false);
        let ac = store.get_or_insert(a, c, 200, false);
        index.add_pair(store.get(ab));
        index.add_pair(store.get(ac));
        index.add_pair(store.get(ab));

        assert_eq!(index.candidate_pairs_for(a), &[ab, ac]);
        assert_eq!(index.candidate_pairs_for(b), &[ab]);
        assert!(index.candidate_pairs_for(BreakendId::end(2)).is_empty());

        let removed = index.remove_exhausted(&store, |x| x == c);
        assert_eq!(removed, 1);
        assert_eq!(index.candidate_pairs_for(a), &[ab]);

        let removed = index.remove_exhausted(&store, |x| x == b);
        assert_eq!(removed, 2);
        assert_eq!(index.breakends().count(), 0);
    }
}
