use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::breakend::BreakendId;

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct PairId(pub usize);

/// A candidate adjacency between two breakends
///
/// The pair is unordered, `first` is simply the lower of the two breakend ids.
///
#[derive(Clone, Copy)]
pub struct LinkedPair {
    pub id: PairId,
    pub first: BreakendId,
    pub second: BreakendId,

    /// Number of bases between the two breakends
    pub distance: u64,

    /// True if the adjacency is supported directly by sequence assembly
    pub assembled: bool,
}

impl LinkedPair {
    pub fn other_breakend(&self, breakend: BreakendId) -> Option<BreakendId> {
        if self.first == breakend {
            Some(self.second)
        } else if self.second == breakend {
            Some(self.first)
        } else {
            None
        }
    }

    pub fn breakends(&self) -> [BreakendId; 2] {
        [self.first, self.second]
    }

    /// True if both breakends belong to the same SV
    pub fn is_self_link(&self) -> bool {
        self.first.sv_index == self.second.sv_index
    }
}

impl fmt::Debug for LinkedPair {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "pair{}({:?}<>{:?} dist: {} assembled: {})",
            self.id.0, self.first, self.second, self.distance, self.assembled
        )
    }
}

/// Arena owning every linked pair of a cluster
///
/// Pairs are deduplicated on their breakend ids, so the candidate and assembly-adjacent lists
/// refer to the same pair identity whenever they describe the same adjacency.
///
#[derive(Default)]
pub struct LinkedPairStore {
    pairs: Vec<LinkedPair>,
    pair_lookup: BTreeMap<(BreakendId, BreakendId), PairId>,
}

fn get_pair_key(be1: BreakendId, be2: BreakendId) -> (BreakendId, BreakendId) {
    if be1 <= be2 { (be1, be2) } else { (be2, be1) }
}

impl LinkedPairStore {
    /// Get the id of the pair joining the two breakends, adding a new pair if required
    ///
    /// If the pair already exists, its `assembled` flag is set when the new request is assembled.
    ///
    pub fn get_or_insert(
        &mut self,
        be1: BreakendId,
        be2: BreakendId,
        distance: u64,
        assembled: bool,
    ) -> PairId {
        assert_ne!(be1, be2, "Can't link a breakend to itself");
        let key = get_pair_key(be1, be2);
        if let Some(&id) = self.pair_lookup.get(&key) {
            if assembled {
                self.pairs[id.0].assembled = true;
            }
            return id;
        }

        let id = PairId(self.pairs.len());
        self.pairs.push(LinkedPair {
            id,
            first: key.0,
            second: key.1,
            distance,
            assembled,
        });
        self.pair_lookup.insert(key, id);
        id
    }

    pub fn get(&self, id: PairId) -> &LinkedPair {
        &self.pairs[id.0]
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_dedup() {
        let mut store = LinkedPairStore::default();
        let a = BreakendId::end(0);
        let b = BreakendId::start(1);
        let id1 = store.get_or_insert(b, a, 100, false);
        let id2 = store.get_or_insert(a, b, 100, true);
        assert_eq!(id1, id2);
        assert_eq!(store.len(), 1);

        let pair = store.get(id1);
        assert_eq!(pair.first, a);
        assert!(pair.assembled);
    }

    #[test]
    fn test_other_breakend() {
        let mut store = LinkedPairStore::default();
        let a = BreakendId::start(0);
        let b = BreakendId::end(0);
        let id = store.get_or_insert(a, b, 10, false);
        let pair = *store.get(id);
        assert!(pair.is_self_link());
        assert_eq!(pair.other_breakend(a), Some(b));
        assert_eq!(pair.other_breakend(BreakendId::start(1)), None);
    }
}
