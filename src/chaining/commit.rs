use std::collections::BTreeMap;

use simple_error::{SimpleResult, bail};

use super::{ChainingContext, CommitRecord, FoldbackMarker};
use crate::breakend::BreakendId;
use crate::chain::{ChainEnd, ChainId, ChainLink, reverse_links};
use crate::linked_pair::{LinkedPair, PairId};
use crate::log_utils::debug_msg;
use crate::ploidy::ploidy_overlap;
use crate::proposed_links::{LinkMoveType, ProposedLinks};

/// The two pairs of a chain split, and the breakend each links to the inserted SV
struct SplitLinks {
    pairs: [LinkedPair; 2],
    inserted_ends: [BreakendId; 2],
    others: [BreakendId; 2],

    /// Chain joining the two ends of a chained foldback
    internal_chain: Option<ChainId>,
}

impl ChainingContext {
    /// Apply a proposal to the cluster state
    ///
    /// Consumes the proposal ploidy from every breakend of each pair, updates the chain store
    /// and prunes exhausted candidates. The proposal is fully checked before any state changes,
    /// so a rejected proposal leaves the context unchanged.
    ///
    /// Returns the ids of all chains created or modified by the commit.
    ///
    pub fn commit(&mut self, proposal: &ProposedLinks) -> SimpleResult<Vec<ChainId>> {
        let cluster_index = self.settings.cluster_index;
        let split_links = self.check_proposal(proposal)?;

        let mut consumption = BTreeMap::new();
        for &pair_id in proposal.pairs.iter() {
            for breakend in self.pairs.get(pair_id).breakends() {
                *consumption.entry(breakend).or_insert(0.0) += proposal.ploidy;
            }
        }
        if let Err(e) = self.connections.consume(&consumption) {
            bail!("Cluster {cluster_index}: can't commit {proposal:?}: {e}");
        }

        let chain_ids = match split_links {
            None => {
                let pair = *self.pairs.get(proposal.pairs[0]);
                vec![self.add_single_link(&pair, proposal.ploidy)]
            }
            Some(split) => match proposal.move_type {
                LinkMoveType::FoldbackSplit => {
                    self.add_foldback_split(&split, proposal.ploidy, proposal.target_chain)
                }
                _ => self.add_complex_dup_split(&split, proposal.ploidy, proposal.target_chain),
            },
        };

        debug_msg!(
            self.settings.debug,
            "Cluster {cluster_index}: committed {proposal:?} to chains {chain_ids:?}"
        );

        self.committed_pairs.extend(proposal.pairs.iter().copied());
        self.remove_exhausted_pairs();
        self.commit_log.push(CommitRecord {
            pairs: proposal.pairs.clone(),
            ploidy: proposal.ploidy,
            ploidy_match: proposal.ploidy_match,
            rules: proposal.rules().collect(),
            move_type: proposal.move_type,
            chains: chain_ids.clone(),
        });
        Ok(chain_ids)
    }

    /// Check proposal structure against the current pairs and chains
    ///
    /// Returns the resolved split links for a two-pair proposal.
    ///
    fn check_proposal(&self, proposal: &ProposedLinks) -> SimpleResult<Option<SplitLinks>> {
        for pair_id in proposal.pairs.iter() {
            if pair_id.0 >= self.pairs.len() {
                bail!("Proposal refers to unknown pair {pair_id:?}");
            }
        }

        if proposal.move_type == LinkMoveType::Standard {
            if proposal.pairs.len() != 1 {
                bail!(
                    "Standard proposal has {} pairs, expected 1",
                    proposal.pairs.len()
                );
            }
            return Ok(None);
        }

        let (Some(inserted_ends), 2) = (proposal.inserted_ends, proposal.pairs.len()) else {
            bail!("Chain split proposal is incomplete: {proposal:?}");
        };
        let pairs = [
            *self.pairs.get(proposal.pairs[0]),
            *self.pairs.get(proposal.pairs[1]),
        ];
        let (Some(other0), Some(other1)) = (
            pairs[0].other_breakend(inserted_ends[0]),
            pairs[1].other_breakend(inserted_ends[1]),
        ) else {
            bail!("Chain split pairs don't link the inserted breakends: {proposal:?}");
        };
        let mut split = SplitLinks {
            pairs,
            inserted_ends,
            others: [other0, other1],
            internal_chain: None,
        };

        if proposal.move_type == LinkMoveType::FoldbackSplit {
            if other0 != other1 {
                bail!("Foldback split pairs link to different breakends: {proposal:?}");
            }
            let foldback = FoldbackMarker {
                start: inserted_ends[0],
                end: inserted_ends[1],
            };
            if foldback.is_chained() {
                split.internal_chain = self.foldback_internal_chain(&foldback, proposal.ploidy);
                if split.internal_chain.is_none() {
                    bail!("Chained foldback split has no chain joining its ends: {proposal:?}");
                }
            }
        }

        if let Some(target) = proposal.target_chain {
            let Some(chain) = self.chains.get(target) else {
                bail!("Chain split target {target:?} doesn't exist");
            };
            if chain.is_closed() {
                bail!("Chain split target {target:?} is closed");
            }
            let is_valid_target = match proposal.move_type {
                LinkMoveType::FoldbackSplit => chain.open_end_at(other0).is_some(),
                _ => chain.open_ends() == (Some(other1), Some(other0)),
            };
            if !is_valid_target {
                bail!("Chain split target {chain:?} doesn't have the expected open ends");
            }
        }
        Ok(Some(split))
    }

    fn get_link_uncertainty(&self, be1: BreakendId, be2: BreakendId) -> f64 {
        (self.uncertainty(be1) + self.uncertainty(be2)) * 0.5
    }

    fn is_chain_ploidy_compatible(
        &self,
        chain_ploidy: f64,
        chain_uncertainty: f64,
        ploidy: f64,
        uncertainty: f64,
    ) -> bool {
        self.settings.tolerance.ploidy_equal(chain_ploidy, ploidy)
            || ploidy_overlap(chain_ploidy, chain_uncertainty, ploidy, uncertainty)
    }

    /// Find the first chain with a compatible ploidy and an open end at `breakend`
    fn find_compatible_chain(
        &self,
        breakend: BreakendId,
        ploidy: f64,
        uncertainty: f64,
    ) -> Option<(ChainId, ChainEnd)> {
        self.chains.find_chain_with_open_end(breakend, |chain| {
            self.is_chain_ploidy_compatible(chain.ploidy(), chain.uncertainty(), ploidy, uncertainty)
        })
    }

    /// Add a single committed pair to the chain store
    ///
    /// The pair closes, merges or extends existing chains with compatible ploidy where their open
    /// ends match, otherwise it starts a new chain.
    ///
    fn add_single_link(&mut self, pair: &LinkedPair, ploidy: f64) -> ChainId {
        let (first, second) = (pair.first, pair.second);
        let uncertainty = self.get_link_uncertainty(first, second);
        let first_chain = self.find_compatible_chain(first, ploidy, uncertainty);
        let second_chain = self.find_compatible_chain(second, ploidy, uncertainty);

        // Close a chain whose two open ends are joined by this pair
        if let Some((chain_id, _)) = first_chain {
            let chain = self.chains.get_mut(chain_id).unwrap();
            if let (Some(start), Some(end)) = chain.open_ends() {
                if start != end && chain.open_end_at(second).is_some() {
                    chain.close(ChainLink::new(pair.id, end, start));
                    return chain_id;
                }
            }
        }

        let svs = &self.svs;
        match (first_chain, second_chain) {
            (Some((id1, end1)), Some((id2, end2))) if id1 != id2 => {
                let mut links = self.chains.get(id1).unwrap().links().to_vec();
                if end1 == ChainEnd::Start {
                    links = reverse_links(&links);
                }
                links.push(ChainLink::new(pair.id, first, second));

                let chain2 = self.chains.retire(id2).unwrap();
                if end2 == ChainEnd::End {
                    links.extend(reverse_links(chain2.links()));
                } else {
                    links.extend_from_slice(chain2.links());
                }

                let chain1 = self.chains.get_mut(id1).unwrap();
                let merged_ploidy = (chain1.ploidy() + chain2.ploidy()) * 0.5;
                let merged_uncertainty = (chain1.uncertainty() + chain2.uncertainty()) * 0.5;
                chain1.replace_links(links, merged_ploidy, merged_uncertainty, svs);
                id1
            }
            (Some((chain_id, chain_end)), _) => {
                let chain = self.chains.get_mut(chain_id).unwrap();
                match chain_end {
                    ChainEnd::End => chain.append(ChainLink::new(pair.id, first, second), svs),
                    ChainEnd::Start => chain.prepend(ChainLink::new(pair.id, second, first), svs),
                }
                chain_id
            }
            (None, Some((chain_id, chain_end))) => {
                let chain = self.chains.get_mut(chain_id).unwrap();
                match chain_end {
                    ChainEnd::End => chain.append(ChainLink::new(pair.id, second, first), svs),
                    ChainEnd::Start => chain.prepend(ChainLink::new(pair.id, first, second), svs),
                }
                chain_id
            }
            (None, None) => {
                let link = ChainLink::new(pair.id, first, second);
                let chain_id = self.chains.new_chain(vec![link], ploidy, uncertainty, svs);
                if pair.is_self_link() {
                    self.chains.get_mut(chain_id).unwrap().mark_closed();
                }
                chain_id
            }
        }
    }

    /// Rebuild a target chain around a two-pair insertion, keeping any ploidy beyond twice the
    /// insertion ploidy as a separate copy of the original chain
    ///
    /// `build_links` receives the target chain's links and returns the rebuilt path.
    ///
    fn split_target_chain(
        &mut self,
        target: ChainId,
        links: Vec<ChainLink>,
        ploidy: f64,
        build_links: impl Fn(&[ChainLink]) -> Vec<ChainLink>,
    ) -> Vec<ChainId> {
        let svs = &self.svs;
        let chain = self.chains.get_mut(target).unwrap();
        let (chain_ploidy, chain_uncertainty) = (chain.ploidy(), chain.uncertainty());
        chain.replace_links(build_links(&links), ploidy, chain_uncertainty, svs);

        let mut chain_ids = vec![target];
        let residual_ploidy = chain_ploidy - 2.0 * ploidy;
        if !self.settings.tolerance.ploidy_equal(chain_ploidy, 2.0 * ploidy) && residual_ploidy > 0.0
        {
            chain_ids.push(
                self.chains
                    .new_chain(links, residual_ploidy, chain_uncertainty, svs),
            );
        }
        chain_ids
    }

    /// Take the path of a chained foldback's internal chain, running from `fb_start`
    ///
    /// The internal chain keeps any ploidy beyond the foldback ploidy, otherwise it is retired.
    /// Returns the path and the id of the internal chain if it is kept.
    ///
    fn take_foldback_internal_links(
        &mut self,
        internal: ChainId,
        fb_start: BreakendId,
        ploidy: f64,
    ) -> (Vec<ChainLink>, Option<ChainId>) {
        let chain = self.chains.get(internal).unwrap();
        let links = match chain.open_end_at(fb_start) {
            Some(ChainEnd::End) => reverse_links(chain.links()),
            _ => chain.links().to_vec(),
        };

        let (chain_ploidy, chain_uncertainty) = (chain.ploidy(), chain.uncertainty());
        let residual_ploidy = chain_ploidy - ploidy;
        if !self.settings.tolerance.ploidy_equal(chain_ploidy, ploidy) && residual_ploidy > 0.0 {
            let svs = &self.svs;
            let chain = self.chains.get_mut(internal).unwrap();
            chain.replace_links(links.clone(), residual_ploidy, chain_uncertainty, svs);
            (links, Some(internal))
        } else {
            self.chains.retire(internal);
            (links, None)
        }
    }

    /// Insert a foldback into a chain, or start a new chain from it
    ///
    /// Both foldback ends link to the same breakend X, so the chain runs out to X, through the
    /// foldback and back along its original path in reverse. A chained foldback also carries the
    /// path between its two SVs.
    ///
    fn add_foldback_split(
        &mut self,
        split: &SplitLinks,
        ploidy: f64,
        target: Option<ChainId>,
    ) -> Vec<ChainId> {
        let other = split.others[0];
        let [fb_start, fb_end] = split.inserted_ends;

        let mut inserted = vec![ChainLink::new(split.pairs[0].id, other, fb_start)];
        let mut internal_chain = None;
        if let Some(internal) = split.internal_chain {
            let (internal_links, kept_chain) =
                self.take_foldback_internal_links(internal, fb_start, ploidy);
            inserted.extend(internal_links);
            internal_chain = kept_chain;
        }
        inserted.push(ChainLink::new(split.pairs[1].id, fb_end, other));

        let mut chain_ids = match target {
            Some(target) => {
                let chain = self.chains.get(target).unwrap();
                let links = match chain.open_end_at(other) {
                    Some(ChainEnd::Start) => reverse_links(chain.links()),
                    _ => chain.links().to_vec(),
                };
                self.split_target_chain(target, links, ploidy, |links| {
                    let mut new_links = links.to_vec();
                    new_links.extend_from_slice(&inserted);
                    new_links.extend(reverse_links(links));
                    new_links
                })
            }
            None => {
                let uncertainty = self.get_link_uncertainty(fb_start, other);
                vec![self.chains.new_chain(inserted, ploidy, uncertainty, &self.svs)]
            }
        };
        chain_ids.extend(internal_chain);
        chain_ids
    }

    /// Insert a complex duplication between the two open ends of a chain, or around a single SV
    ///
    fn add_complex_dup_split(
        &mut self,
        split: &SplitLinks,
        ploidy: f64,
        target: Option<ChainId>,
    ) -> Vec<ChainId> {
        let [dup_x, dup_y] = split.inserted_ends;
        let [other_x, other_y] = split.others;

        match target {
            Some(target) => {
                // other_x is the chain's open end and other_y its open start
                let inserted = [
                    ChainLink::new(split.pairs[0].id, other_x, dup_x),
                    ChainLink::new(split.pairs[1].id, dup_y, other_y),
                ];
                let links = self.chains.get(target).unwrap().links().to_vec();
                self.split_target_chain(target, links, ploidy, |links| {
                    let mut new_links = links.to_vec();
                    new_links.extend(inserted);
                    new_links.extend_from_slice(links);
                    new_links
                })
            }
            None => {
                let links = vec![
                    ChainLink::new(split.pairs[1].id, other_y, dup_y),
                    ChainLink::new(split.pairs[0].id, dup_x, other_x),
                ];
                let uncertainty = self.get_link_uncertainty(dup_x, other_x);
                vec![self.chains.new_chain(links, ploidy, uncertainty, &self.svs)]
            }
        }
    }

    /// Drop candidate and assembly-adjacent pairs touching any exhausted breakend
    fn remove_exhausted_pairs(&mut self) {
        let connections = &self.connections;
        let pairs = &self.pairs;
        let is_live = |x: &PairId| {
            let pair = pairs.get(*x);
            !(connections.is_exhausted(pair.first) || connections.is_exhausted(pair.second))
        };

        let removed = self
            .candidates
            .remove_exhausted(pairs, |x| connections.is_exhausted(x));
        self.adjacent_pairs.retain(is_live);
        self.relaxed_adjacent_pairs.retain(is_live);

        if removed > 0 {
            debug_msg!(
                self.settings.debug,
                "Cluster {}: removed {removed} exhausted breakends from the candidate index",
                self.settings.cluster_index
            );
        }
    }
}
