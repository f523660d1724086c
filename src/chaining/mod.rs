//! Ploidy-aware chain assembly for one SV cluster
//!
//! All mutable state for a cluster (connection state, candidate index, chain store) is owned by
//! a single [`ChainingContext`]. The rule selector only reads the context to produce proposals,
//! and the assembly driver applies the winning proposal back to it.
//!

mod assembly;
mod commit;
mod rules;
mod validation;

use std::collections::BTreeSet;

use serde::Serialize;
use simple_error::{SimpleResult, bail};

pub use self::validation::{ChainValidationReport, check_chains};
use crate::breakend::{
    BreakendId, StructuralVariant, SvDefinition, get_breakend_distance,
    get_other_breakend,
};
use crate::candidate_index::CandidateIndex;
use crate::chain::{ChainId, ChainStore};
use crate::connection_state::{BreakendPloidy, ConnectionStateTable, SvConnectionState};
use crate::linked_pair::{LinkedPair, LinkedPairStore, PairId};
use crate::ploidy::{PloidyTolerance, ploidy_overlap};
use crate::proposed_links::{ChainingRule, LinkMoveType, PloidyMatch};

/// Settings controlling chain assembly in one cluster
///
#[derive(Clone, Debug, Default)]
pub struct ChainingSettings {
    pub tolerance: PloidyTolerance,

    /// Cluster index, used to label log messages
    pub cluster_index: usize,

    /// If true, write verbose rule and commit messages for this cluster directly to stderr
    pub debug: bool,
}

/// A foldback described by its two effective ends
///
/// For a simple foldback these are the two breakends of one SV. A chained foldback is formed by
/// two SVs, and the ends are on different SVs.
///
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FoldbackMarker {
    pub start: BreakendId,
    pub end: BreakendId,
}

impl FoldbackMarker {
    pub fn is_chained(&self) -> bool {
        self.start.sv_index != self.end.sv_index
    }
}

/// Record of one committed proposal
///
#[derive(Clone, Debug, Serialize)]
pub struct CommitRecord {
    pub pairs: Vec<PairId>,
    pub ploidy: f64,
    pub ploidy_match: PloidyMatch,
    pub rules: Vec<ChainingRule>,
    pub move_type: LinkMoveType,
    pub chains: Vec<ChainId>,
}

pub struct ChainingContext {
    settings: ChainingSettings,
    svs: Vec<StructuralVariant>,
    pairs: LinkedPairStore,
    candidates: CandidateIndex,
    connections: ConnectionStateTable,
    chains: ChainStore,
    foldbacks: Vec<FoldbackMarker>,
    complex_dups: Vec<usize>,
    adjacent_pairs: Vec<PairId>,
    relaxed_adjacent_pairs: Vec<PairId>,
    committed_pairs: BTreeSet<PairId>,
    commit_log: Vec<CommitRecord>,
}

impl ChainingContext {
    pub fn new(settings: ChainingSettings) -> Self {
        Self {
            settings,
            svs: Vec::new(),
            pairs: LinkedPairStore::default(),
            candidates: CandidateIndex::default(),
            connections: ConnectionStateTable::default(),
            chains: ChainStore::default(),
            foldbacks: Vec::new(),
            complex_dups: Vec::new(),
            adjacent_pairs: Vec::new(),
            relaxed_adjacent_pairs: Vec::new(),
            committed_pairs: BTreeSet::new(),
            commit_log: Vec::new(),
        }
    }

    /// Add an SV to the cluster, returning its index
    ///
    pub fn add_sv(&mut self, def: &SvDefinition) -> SimpleResult<usize> {
        if !(1..=2).contains(&def.breakends.len()) {
            bail!(
                "SV '{}' has {} breakends, expected 1 or 2",
                def.label,
                def.breakends.len()
            );
        }
        for be in def.breakends.iter() {
            if !(be.ploidy.is_finite() && be.ploidy >= 0.0) {
                bail!("SV '{}' has invalid breakend ploidy {}", def.label, be.ploidy);
            }
            if !(be.uncertainty.is_finite() && be.uncertainty >= 0.0) {
                bail!(
                    "SV '{}' has invalid breakend ploidy uncertainty {}",
                    def.label,
                    be.uncertainty
                );
            }
        }

        let index = self.svs.len();
        self.svs.push(StructuralVariant::from_definition(def));
        let ends = def
            .breakends
            .iter()
            .map(|x| BreakendPloidy::new(x.ploidy, x.uncertainty))
            .collect();
        self.connections.push(SvConnectionState::new(ends));
        Ok(index)
    }

    fn check_breakend(&self, breakend: BreakendId) -> SimpleResult<()> {
        let exists = self
            .svs
            .get(breakend.sv_index)
            .is_some_and(|x| x.breakend(breakend.side).is_some());
        if !exists {
            bail!("Unknown breakend {breakend:?}");
        }
        Ok(())
    }

    fn get_or_insert_pair(
        &mut self,
        be1: BreakendId,
        be2: BreakendId,
        assembled: bool,
    ) -> SimpleResult<PairId> {
        self.check_breakend(be1)?;
        self.check_breakend(be2)?;
        if be1 == be2 {
            bail!("Can't link breakend {be1:?} to itself");
        }
        let distance = {
            let b1 = &self.svs[be1.sv_index].breakends[be1.side as usize];
            let b2 = &self.svs[be2.sv_index].breakends[be2.side as usize];
            get_breakend_distance(b1, b2)
        };
        Ok(self.pairs.get_or_insert(be1, be2, distance, assembled))
    }

    /// Add a candidate adjacency to the index of both breakends
    ///
    /// Candidates should be added in preference order for each breakend.
    ///
    pub fn add_candidate_pair(
        &mut self,
        be1: BreakendId,
        be2: BreakendId,
        assembled: bool,
    ) -> SimpleResult<PairId> {
        let id = self.get_or_insert_pair(be1, be2, assembled)?;
        self.candidates.add_pair(self.pairs.get(id));
        Ok(id)
    }

    /// Add a pair to the primary or relaxed assembly-adjacent pool
    ///
    pub fn add_adjacent_pair(
        &mut self,
        be1: BreakendId,
        be2: BreakendId,
        relaxed: bool,
    ) -> SimpleResult<PairId> {
        let id = self.get_or_insert_pair(be1, be2, !relaxed)?;
        let pool = if relaxed {
            &mut self.relaxed_adjacent_pairs
        } else {
            &mut self.adjacent_pairs
        };
        if !pool.contains(&id) {
            pool.push(id);
        }
        Ok(id)
    }

    pub fn add_foldback(&mut self, start: BreakendId, end: BreakendId) -> SimpleResult<()> {
        self.check_breakend(start)?;
        self.check_breakend(end)?;
        if start == end {
            bail!("Foldback start and end are the same breakend {start:?}");
        }
        let marker = FoldbackMarker { start, end };
        if !self.foldbacks.contains(&marker) {
            self.foldbacks.push(marker);
        }
        Ok(())
    }

    pub fn add_complex_dup(&mut self, sv_index: usize) -> SimpleResult<()> {
        match self.svs.get(sv_index) {
            Some(sv) if !sv.is_single_breakend() => {}
            Some(sv) => bail!("Complex duplication SV '{}' has a single breakend", sv.label),
            None => bail!("Unknown complex duplication SV index {sv_index}"),
        }
        if !self.complex_dup_marker(sv_index) {
            self.complex_dups.push(sv_index);
        }
        Ok(())
    }

    pub fn settings(&self) -> &ChainingSettings {
        &self.settings
    }

    pub fn svs(&self) -> &[StructuralVariant] {
        &self.svs
    }

    pub fn breakend_label(&self, breakend: BreakendId) -> String {
        self.svs[breakend.sv_index].breakend_label(breakend.side)
    }

    pub fn pair(&self, id: PairId) -> &LinkedPair {
        self.pairs.get(id)
    }

    pub fn pairs(&self) -> &LinkedPairStore {
        &self.pairs
    }

    pub fn foldbacks(&self) -> &[FoldbackMarker] {
        &self.foldbacks
    }

    pub fn complex_dups(&self) -> &[usize] {
        &self.complex_dups
    }

    /// Primary or relaxed assembly-adjacent pair pool
    pub fn adjacent_pairs(&self, relaxed: bool) -> &[PairId] {
        if relaxed {
            &self.relaxed_adjacent_pairs
        } else {
            &self.adjacent_pairs
        }
    }

    pub fn candidates(&self) -> &CandidateIndex {
        &self.candidates
    }

    pub fn candidate_pairs_for(&self, breakend: BreakendId) -> &[PairId] {
        self.candidates.candidate_pairs_for(breakend)
    }

    pub fn connections(&self) -> &ConnectionStateTable {
        &self.connections
    }

    pub fn chains(&self) -> &ChainStore {
        &self.chains
    }

    pub fn commit_log(&self) -> &[CommitRecord] {
        &self.commit_log
    }

    pub fn unlinked(&self, breakend: BreakendId) -> f64 {
        self.connections.unlinked(breakend)
    }

    pub fn uncertainty(&self, breakend: BreakendId) -> f64 {
        self.connections.uncertainty(breakend)
    }

    /// Largest ploidy which could still be consumed at the breakend without breaching its
    /// uncertainty-adjusted total
    pub fn consumption_capacity(&self, breakend: BreakendId) -> f64 {
        self.connections
            .get(breakend)
            .map_or(0.0, |x| (x.consumption_limit() - x.consumed()).max(0.0))
    }

    pub fn other_breakend(&self, breakend: BreakendId) -> Option<BreakendId> {
        get_other_breakend(&self.svs, breakend)
    }

    pub fn is_double_minute_dup(&self, sv_index: usize) -> bool {
        self.svs[sv_index].is_double_minute_dup
    }

    /// Foldback marker for the SV, if either of its breakends is a foldback end
    pub fn foldback_marker(&self, sv_index: usize) -> Option<FoldbackMarker> {
        self.foldbacks
            .iter()
            .find(|x| x.start.sv_index == sv_index || x.end.sv_index == sv_index)
            .copied()
    }

    /// Find the chain joining the two ends of a chained foldback, with at least `ploidy`
    ///
    /// A chained foldback can only be inserted once the path between its two SVs is assembled.
    ///
    pub fn foldback_internal_chain(
        &self,
        foldback: &FoldbackMarker,
        ploidy: f64,
    ) -> Option<ChainId> {
        if !foldback.is_chained() {
            return None;
        }
        self.chains
            .find_chain_with_open_end(foldback.start, |chain| {
                chain.open_end_at(foldback.end).is_some()
                    && (chain.ploidy() >= ploidy || self.ploidy_equal(ploidy, chain.ploidy()))
            })
            .map(|(id, _)| id)
    }

    pub fn complex_dup_marker(&self, sv_index: usize) -> bool {
        self.complex_dups.contains(&sv_index)
    }

    pub fn is_committed(&self, pair: PairId) -> bool {
        self.committed_pairs.contains(&pair)
    }

    /// Classify the agreement of two ploidy values using the cluster tolerance settings
    ///
    pub fn classify_ploidy(
        &self,
        ploidy1: f64,
        uncertainty1: f64,
        ploidy2: f64,
        uncertainty2: f64,
    ) -> PloidyMatch {
        if self.settings.tolerance.ploidy_equal(ploidy1, ploidy2) {
            PloidyMatch::Matched
        } else if ploidy_overlap(ploidy1, uncertainty1, ploidy2, uncertainty2) {
            PloidyMatch::Overlap
        } else {
            PloidyMatch::None
        }
    }

    /// Classify the agreement between the unlinked ploidy of two breakends
    pub fn classify_breakends(&self, be1: BreakendId, be2: BreakendId) -> PloidyMatch {
        self.classify_ploidy(
            self.unlinked(be1),
            self.uncertainty(be1),
            self.unlinked(be2),
            self.uncertainty(be2),
        )
    }

    pub fn ploidy_equal(&self, ploidy1: f64, ploidy2: f64) -> bool {
        self.settings.tolerance.ploidy_equal(ploidy1, ploidy2)
    }

    /// Get all breakends with unlinked ploidy remaining, in breakend id order
    pub fn unlinked_breakends(&self) -> Vec<BreakendId> {
        self.connections
            .iter()
            .filter(|(_, x)| !crate::ploidy::is_exhausted(x.unlinked()))
            .map(|(id, _)| id)
            .collect()
    }
}


#[cfg(test)]
mod tests {
    use super::test_utils::*;
    use super::*;

    #[test]
    fn test_add_sv_validation() {
        let mut ctx = get_test_context();
        let def = SvDefinition {
            label: "bad".to_string(),
            breakends: Vec::new(),
            double_minute_dup: false,
        };
        assert!(ctx.add_sv(&def).is_err());

        let sv = add_test_sv(&mut ctx, 100, 200, 2.0, 0.2);
        assert_eq!(ctx.svs()[sv].label, "sv0");
        assert_eq!(ctx.breakend_label(e(sv)), "sv0:end");
    }

    #[test]
    fn test_add_pairs() {
        let mut ctx = get_test_context();
        let sv0 = add_test_sv(&mut ctx, 100, 200, 2.0, 0.2);
        let sv1 = add_test_sgl(&mut ctx, 500, 2.0, 0.2);

        assert!(ctx.add_candidate_pair(e(sv0), e(sv1), false).is_err());
        assert!(ctx.add_candidate_pair(e(sv0), e(sv0), false).is_err());

        let id = ctx.add_candidate_pair(e(sv0), s(sv1), false).unwrap();
        assert_eq!(ctx.pair(id).distance, 300);
        assert_eq!(ctx.candidate_pairs_for(s(sv1)), &[id]);

        // Adjacent pool shares the candidate pair identity
        let adj_id = ctx.add_adjacent_pair(s(sv1), e(sv0), false).unwrap();
        assert_eq!(id, adj_id);
        assert!(ctx.pair(id).assembled);

        assert!(ctx.add_complex_dup(sv1).is_err());
        ctx.add_complex_dup(sv0).unwrap();
        assert_eq!(ctx.complex_dups(), &[sv0]);

        ctx.add_foldback(s(sv0), e(sv0)).unwrap();
        assert_eq!(
            ctx.foldback_marker(sv0),
            Some(FoldbackMarker {
                start: s(sv0),
                end: e(sv0)
            })
        );
        assert_eq!(ctx.foldback_marker(sv1), None);
        assert!(ctx.complex_dup_marker(sv0));
    }
}
