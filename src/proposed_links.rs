//! Proposed links produced by the chaining rules, and their priority ordering
//!

use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;
use strum::EnumCount;

use crate::breakend::BreakendId;
use crate::chain::ChainId;
use crate::linked_pair::{LinkedPairStore, PairId};

/// Tags recording which chaining rules endorse a proposed link
///
/// Tags are listed in priority order, highest first.
///
#[derive(
    Clone,
    Copy,
    Debug,
    Eq,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
    strum::EnumCount,
    strum::EnumIter,
    strum::IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ChainingRule {
    SingleOption,
    FoldbackSplit,
    ComplexDupSplit,
    Foldback,
    PloidyMatch,
    PloidyOverlap,
    Adjacent,
    PloidyMax,
    Nearest,
}

impl ChainingRule {
    /// Priority weight of the tag
    ///
    /// Each weight exceeds the sum of all lower priority weights, so a tag set containing a
    /// higher priority rule always outranks any set built only from lower priority rules.
    ///
    pub fn weight(self) -> u32 {
        1 << (ChainingRule::COUNT - 1 - self as usize)
    }
}

/// Agreement between the ploidy of a proposed link and the breakends it joins
///
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PloidyMatch {
    None,
    Overlap,
    Matched,
}

/// How a proposal is applied to the chain store
///
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkMoveType {
    /// One pair, extending or merging chains
    Standard,

    /// Both ends of a foldback link to the same breakend, doubling back along a higher ploidy
    /// chain
    FoldbackSplit,

    /// Both ends of a duplication link to the two ends of a higher ploidy SV or chain
    ComplexDupSplit,
}

/// A candidate decision produced by the chaining rules
///
#[derive(Clone)]
pub struct ProposedLinks {
    /// One pair for a standard link, two for a chain split
    pub pairs: Vec<PairId>,

    /// Ploidy consumed by each pair in the proposal
    pub ploidy: f64,

    pub ploidy_match: PloidyMatch,

    rules: BTreeSet<ChainingRule>,

    /// Existing chain to split for foldback or complex duplication insertions
    pub target_chain: Option<ChainId>,

    pub move_type: LinkMoveType,

    /// The two breakends of the foldback or duplication being inserted by a chain split, ordered
    /// to match `pairs`
    pub inserted_ends: Option<[BreakendId; 2]>,
}

impl ProposedLinks {
    pub fn new(pair: PairId, ploidy: f64, rule: ChainingRule) -> Self {
        Self {
            pairs: vec![pair],
            ploidy,
            ploidy_match: PloidyMatch::None,
            rules: BTreeSet::from([rule]),
            target_chain: None,
            move_type: LinkMoveType::Standard,
            inserted_ends: None,
        }
    }

    /// Create a two-pair chain split proposal
    ///
    /// # Arguments
    /// * `pairs` - the pairs linking each inserted breakend, in the same order as `inserted_ends`
    /// * `inserted_ends` - the two breakends of the foldback or duplication being inserted
    ///
    pub fn new_split(
        pairs: [PairId; 2],
        inserted_ends: [BreakendId; 2],
        ploidy: f64,
        rule: ChainingRule,
        target_chain: Option<ChainId>,
        move_type: LinkMoveType,
    ) -> Self {
        assert_ne!(move_type, LinkMoveType::Standard);
        Self {
            pairs: pairs.to_vec(),
            ploidy,
            ploidy_match: PloidyMatch::None,
            rules: BTreeSet::from([rule]),
            target_chain,
            move_type,
            inserted_ends: Some(inserted_ends),
        }
    }

    pub fn with_ploidy_match(mut self, ploidy_match: PloidyMatch) -> Self {
        self.ploidy_match = ploidy_match;
        self
    }

    pub fn add_rule(&mut self, rule: ChainingRule) {
        self.rules.insert(rule);
    }

    #[cfg(test)]
    pub fn has_rule(&self, rule: ChainingRule) -> bool {
        self.rules.contains(&rule)
    }

    pub fn rules(&self) -> impl Iterator<Item = ChainingRule> + '_ {
        self.rules.iter().copied()
    }

    pub fn is_split(&self) -> bool {
        self.move_type != LinkMoveType::Standard
    }

    pub fn contains_pair(&self, pair: PairId) -> bool {
        self.pairs.contains(&pair)
    }

    pub fn shares_pair(&self, other: &ProposedLinks) -> bool {
        self.pairs.iter().any(|&x| other.contains_pair(x))
    }

    pub fn has_same_pairs(&self, other: &ProposedLinks) -> bool {
        self.pairs.len() == other.pairs.len() && self.pairs.iter().all(|&x| other.contains_pair(x))
    }

    /// Take over the pairs and ploidy of a chain split which includes this proposal's pair
    ///
    /// Tags from both proposals are retained.
    ///
    pub fn upgrade_to_split(&mut self, split: &ProposedLinks) {
        assert!(split.is_split());
        self.pairs = split.pairs.clone();
        self.ploidy = split.ploidy;
        self.ploidy_match = split.ploidy_match;
        self.target_chain = split.target_chain;
        self.move_type = split.move_type;
        self.inserted_ends = split.inserted_ends;
        self.rules.extend(split.rules.iter().copied());
    }

    pub fn merge_rules(&mut self, other: &ProposedLinks) {
        self.rules.extend(other.rules.iter().copied());
    }

    /// Priority used to cull proposals
    ///
    /// Compared first by total tag weight, then by ploidy match quality.
    ///
    pub fn priority(&self) -> (u32, PloidyMatch) {
        let weight = self.rules.iter().map(|x| x.weight()).sum();
        (weight, self.ploidy_match)
    }

    pub fn shortest_link_distance(&self, pairs: &LinkedPairStore) -> u64 {
        self.pairs
            .iter()
            .map(|&x| pairs.get(x).distance)
            .min()
            .unwrap_or(u64::MAX)
    }
}

impl fmt::Debug for ProposedLinks {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let rules = self
            .rules
            .iter()
            .map(|&x| {
                let label: &'static str = x.into();
                label
            })
            .collect::<Vec<_>>()
            .join(",");
        write!(
            f,
            "pairs: {:?} ploidy: {:.2} match: {:?} rules: [{}] type: {:?} target: {:?}",
            self.pairs, self.ploidy, self.ploidy_match, rules, self.move_type, self.target_chain
        )
    }
}

/// Remove all proposals with a priority below the best proposal in the list
///
pub fn cull_by_priority(proposals: &mut Vec<ProposedLinks>) {
    if proposals.len() <= 1 {
        return;
    }
    let max_priority = proposals.iter().map(|x| x.priority()).max().unwrap();
    proposals.retain(|x| x.priority() == max_priority);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_weights() {
        assert!(ChainingRule::SingleOption.weight() > ChainingRule::FoldbackSplit.weight());
        assert_eq!(ChainingRule::Nearest.weight(), 1);

        // Any single higher rule outranks all lower rules combined
        let lower_sum: u32 = [
            ChainingRule::PloidyOverlap,
            ChainingRule::Adjacent,
            ChainingRule::PloidyMax,
            ChainingRule::Nearest,
        ]
        .iter()
        .map(|x| x.weight())
        .sum();
        assert!(ChainingRule::PloidyMatch.weight() > lower_sum);
    }

    #[test]
    fn test_cull_by_priority_adjacent() {
        let mut match_only = ProposedLinks::new(PairId(0), 2.0, ChainingRule::PloidyMatch);
        match_only.ploidy_match = PloidyMatch::Matched;
        let mut match_adjacent = ProposedLinks::new(PairId(1), 2.0, ChainingRule::PloidyMatch);
        match_adjacent.ploidy_match = PloidyMatch::Matched;
        match_adjacent.add_rule(ChainingRule::Adjacent);

        let mut proposals = vec![match_only, match_adjacent];
        cull_by_priority(&mut proposals);
        assert_eq!(proposals.len(), 1);
        assert_eq!(proposals[0].pairs, vec![PairId(1)]);
    }

    #[test]
    fn test_cull_by_priority_match_type() {
        let overlap = ProposedLinks::new(PairId(0), 2.0, ChainingRule::SingleOption)
            .with_ploidy_match(PloidyMatch::Overlap);
        let matched = ProposedLinks::new(PairId(1), 2.0, ChainingRule::SingleOption)
            .with_ploidy_match(PloidyMatch::Matched);
        let matched2 = ProposedLinks::new(PairId(2), 3.0, ChainingRule::SingleOption)
            .with_ploidy_match(PloidyMatch::Matched);

        let mut proposals = vec![overlap, matched, matched2];
        cull_by_priority(&mut proposals);
        let pairs = proposals.iter().map(|x| x.pairs[0]).collect::<Vec<_>>();
        assert_eq!(pairs, vec![PairId(1), PairId(2)]);
    }

    #[test]
    fn test_cull_by_priority_idempotent() {
        let mut proposals = vec![
            ProposedLinks::new(PairId(0), 2.0, ChainingRule::Nearest),
            ProposedLinks::new(PairId(1), 2.0, ChainingRule::PloidyMax),
            ProposedLinks::new(PairId(2), 1.0, ChainingRule::PloidyMax),
            ProposedLinks::new(PairId(3), 1.0, ChainingRule::Adjacent),
        ];
        cull_by_priority(&mut proposals);
        let once = proposals.iter().map(|x| x.pairs.clone()).collect::<Vec<_>>();
        cull_by_priority(&mut proposals);
        let twice = proposals.iter().map(|x| x.pairs.clone()).collect::<Vec<_>>();
        assert_eq!(once, twice);
        assert_eq!(once, vec![vec![PairId(3)]]);
    }

    #[test]
    fn test_upgrade_to_split() {
        let mut single = ProposedLinks::new(PairId(0), 4.0, ChainingRule::SingleOption);
        let split = ProposedLinks::new_split(
            [PairId(0), PairId(1)],
            [BreakendId::start(1), BreakendId::end(1)],
            4.0,
            ChainingRule::FoldbackSplit,
            None,
            LinkMoveType::FoldbackSplit,
        )
        .with_ploidy_match(PloidyMatch::Matched);

        assert!(single.shares_pair(&split));
        single.upgrade_to_split(&split);
        assert!(single.is_split());
        assert!(single.has_same_pairs(&split));
        assert!(single.has_rule(ChainingRule::SingleOption));
        assert!(single.has_rule(ChainingRule::FoldbackSplit));
        assert_eq!(single.ploidy_match, PloidyMatch::Matched);
    }
}
