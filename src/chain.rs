//! Chains of committed links, and the arena which owns them
//!

use std::fmt;

use serde::Serialize;

use crate::breakend::{BreakendId, StructuralVariant, get_other_breakend};
use crate::linked_pair::PairId;

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct ChainId(pub usize);

/// Which extremity of a chain
///
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ChainEnd {
    Start,
    End,
}

/// A committed link, oriented in the direction of chain traversal
///
/// The chain path enters the link at `first` and leaves it at `second`, then continues through
/// the SV of `second` to that SV's other breakend.
///
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ChainLink {
    pub pair: PairId,
    pub first: BreakendId,
    pub second: BreakendId,
}

impl ChainLink {
    pub fn new(pair: PairId, first: BreakendId, second: BreakendId) -> Self {
        Self {
            pair,
            first,
            second,
        }
    }

    pub fn reversed(&self) -> Self {
        Self::new(self.pair, self.second, self.first)
    }
}

/// Reverse the traversal direction of a link sequence
pub fn reverse_links(links: &[ChainLink]) -> Vec<ChainLink> {
    links.iter().rev().map(|x| x.reversed()).collect()
}

/// An ordered path of committed links through SV breakends
///
pub struct Chain {
    id: ChainId,
    links: Vec<ChainLink>,
    ploidy: f64,
    uncertainty: f64,
    closed: bool,
    open_start: Option<BreakendId>,
    open_end: Option<BreakendId>,
}

impl Chain {
    pub fn id(&self) -> ChainId {
        self.id
    }

    pub fn links(&self) -> &[ChainLink] {
        &self.links
    }

    pub fn ploidy(&self) -> f64 {
        self.ploidy
    }

    pub fn uncertainty(&self) -> f64 {
        self.uncertainty
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn open_ends(&self) -> (Option<BreakendId>, Option<BreakendId>) {
        (self.open_start, self.open_end)
    }

    /// Find which end of the chain is open at `breakend`, checking the end first
    pub fn open_end_at(&self, breakend: BreakendId) -> Option<ChainEnd> {
        if self.open_end == Some(breakend) {
            Some(ChainEnd::End)
        } else if self.open_start == Some(breakend) {
            Some(ChainEnd::Start)
        } else {
            None
        }
    }

    /// Derive the expected open breakends from the first and last links
    ///
    /// The open breakend at each extremity is the other breakend of the SV the chain path
    /// finishes in, or None if that SV is a single breakend.
    ///
    fn expected_open_ends(
        &self,
        svs: &[StructuralVariant],
    ) -> (Option<BreakendId>, Option<BreakendId>) {
        if self.closed || self.links.is_empty() {
            return (None, None);
        }
        let start = get_other_breakend(svs, self.links[0].first);
        let end = get_other_breakend(svs, self.links[self.links.len() - 1].second);
        (start, end)
    }

    fn refresh_open_ends(&mut self, svs: &[StructuralVariant]) {
        (self.open_start, self.open_end) = self.expected_open_ends(svs);
    }

    pub fn append(&mut self, link: ChainLink, svs: &[StructuralVariant]) {
        assert!(!self.closed);
        self.links.push(link);
        self.refresh_open_ends(svs);
    }

    pub fn prepend(&mut self, link: ChainLink, svs: &[StructuralVariant]) {
        assert!(!self.closed);
        self.links.insert(0, link);
        self.refresh_open_ends(svs);
    }

    /// Add a final link joining the chain's end back to its start
    pub fn close(&mut self, link: ChainLink) {
        assert!(!self.closed);
        self.links.push(link);
        self.closed = true;
        self.open_start = None;
        self.open_end = None;
    }

    /// Mark a chain formed by a single self link as a closed cycle
    pub fn mark_closed(&mut self) {
        self.closed = true;
        self.open_start = None;
        self.open_end = None;
    }

    /// Replace the full link path, used when a chain is merged or split
    pub fn replace_links(
        &mut self,
        links: Vec<ChainLink>,
        ploidy: f64,
        uncertainty: f64,
        svs: &[StructuralVariant],
    ) {
        assert!(!links.is_empty());
        self.links = links;
        self.ploidy = ploidy;
        self.uncertainty = uncertainty;
        self.refresh_open_ends(svs);
    }
}

impl fmt::Debug for Chain {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "chain{} ploidy: {:.2} links: {} closed: {} open: {:?}/{:?}",
            self.id.0,
            self.ploidy,
            self.links.len(),
            self.closed,
            self.open_start,
            self.open_end
        )
    }
}

/// Arena of all chains assembled in one cluster
///
/// Chain ids are stable. A chain absorbed by a merge is retired, its id is never reused.
///
#[derive(Default)]
pub struct ChainStore {
    chains: Vec<Option<Chain>>,
}

impl ChainStore {
    pub fn new_chain(
        &mut self,
        links: Vec<ChainLink>,
        ploidy: f64,
        uncertainty: f64,
        svs: &[StructuralVariant],
    ) -> ChainId {
        assert!(!links.is_empty());
        let id = ChainId(self.chains.len());
        let mut chain = Chain {
            id,
            links,
            ploidy,
            uncertainty,
            closed: false,
            open_start: None,
            open_end: None,
        };
        chain.refresh_open_ends(svs);
        self.chains.push(Some(chain));
        id
    }

    pub fn get(&self, id: ChainId) -> Option<&Chain> {
        self.chains.get(id.0)?.as_ref()
    }

    pub fn get_mut(&mut self, id: ChainId) -> Option<&mut Chain> {
        self.chains.get_mut(id.0)?.as_mut()
    }

    pub fn retire(&mut self, id: ChainId) -> Option<Chain> {
        self.chains.get_mut(id.0)?.take()
    }

    /// All live chains in id order
    pub fn all_chains(&self) -> impl Iterator<Item = &Chain> {
        self.chains.iter().flatten()
    }

    pub fn len(&self) -> usize {
        self.all_chains().count()
    }

    /// Find the first chain in id order with an open end at `breakend` which also satisfies
    /// `filter`
    ///
    pub fn find_chain_with_open_end(
        &self,
        breakend: BreakendId,
        filter: impl Fn(&Chain) -> bool,
    ) -> Option<(ChainId, ChainEnd)> {
        self.all_chains()
            .filter(|x| filter(x))
            .find_map(|x| x.open_end_at(breakend).map(|end| (x.id, end)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breakend::{BreakendDefinition, Orientation, SvDefinition};

    fn get_test_svs(count: usize) -> Vec<StructuralVariant> {
        (0..count)
            .map(|index| {
                let def = SvDefinition {
                    label: format!("sv{index}"),
                    breakends: (0..2)
                        .map(|i| BreakendDefinition {
                            chrom: "chr1".to_string(),
                            pos: 1000 * (index as i64) + 100 * i,
                            orientation: Orientation::Forward,
                            ploidy: 2.0,
                            uncertainty: 0.0,
                        })
                        .collect(),
                    double_minute_dup: false,
                };
                StructuralVariant::from_definition(&def)
            })
            .collect()
    }

    #[test]
    fn test_chain_open_ends() {
        let svs = get_test_svs(3);
        let mut store = ChainStore::default();

        let link = ChainLink::new(PairId(0), BreakendId::end(0), BreakendId::start(1));
        let id = store.new_chain(vec![link], 2.0, 0.1, &svs);
        assert_eq!(
            store.get(id).map(|x| x.open_ends()),
            Some((Some(BreakendId::start(0)), Some(BreakendId::end(1))))
        );

        let chain = store.get_mut(id).unwrap();
        chain.append(
            ChainLink::new(PairId(1), BreakendId::end(1), BreakendId::start(2)),
            &svs,
        );
        assert_eq!(chain.open_ends().1, Some(BreakendId::end(2)));
        assert_eq!(chain.open_end_at(BreakendId::start(0)), Some(ChainEnd::Start));

        let reversed = reverse_links(chain.links());
        chain.replace_links(reversed, 2.0, 0.1, &svs);
        assert_eq!(
            chain.open_ends(),
            (Some(BreakendId::end(2)), Some(BreakendId::start(0)))
        );
        assert_eq!(chain.links()[0].first, BreakendId::start(2));

        chain.close(ChainLink::new(
            PairId(2),
            BreakendId::start(0),
            BreakendId::end(2),
        ));
        assert!(chain.is_closed());
        assert_eq!(chain.open_ends(), (None, None));
    }

    #[test]
    fn test_find_chain_with_open_end() {
        let svs = get_test_svs(3);
        let mut store = ChainStore::default();
        let link = ChainLink::new(PairId(0), BreakendId::end(0), BreakendId::start(1));
        let c0 = store.new_chain(vec![link], 2.0, 0.1, &svs);
        let c1 = store.new_chain(vec![link], 4.0, 0.1, &svs);

        let be = BreakendId::start(0);
        assert_eq!(
            store.find_chain_with_open_end(be, |_| true),
            Some((c0, ChainEnd::Start))
        );
        assert_eq!(
            store.find_chain_with_open_end(be, |x| x.ploidy() > 3.0),
            Some((c1, ChainEnd::Start))
        );

        store.retire(c0);
        assert_eq!(store.len(), 1);
        assert!(store.get(c0).is_none());
        assert_eq!(store.get(c1).map(|x| x.ploidy()), Some(4.0));
    }
}
