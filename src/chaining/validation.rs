//! Advisory consistency checks on assembled chains
//!
//! These checks only report problems, they never modify the chains or fail the cluster.
//!

use itertools::Itertools;
use log::warn;
use serde::Serialize;

use super::ChainingContext;
use crate::chain::{Chain, ChainLink, reverse_links};
use crate::linked_pair::PairId;

#[derive(Clone, Debug, Default, Serialize)]
pub struct ChainValidationReport {
    /// Chains with the same pair sequence as an earlier chain, in either direction
    pub duplicate_chains: usize,

    /// Chains where a link doesn't start from the other breakend of the previous link's SV
    pub discontinuous_chains: usize,

    /// Breakends consumed beyond their total ploidy plus uncertainty
    pub over_consumed_breakends: usize,
}

impl ChainValidationReport {
    pub fn warning_count(&self) -> usize {
        self.duplicate_chains + self.discontinuous_chains + self.over_consumed_breakends
    }
}

/// Find the first link which doesn't continue the chain path from the previous link
///
/// For a closed chain the first link must also continue from the last one.
///
fn find_discontinuity(ctx: &ChainingContext, chain: &Chain) -> Option<usize> {
    let links = chain.links();
    let is_continued = |prev: &ChainLink, next: &ChainLink| {
        ctx.other_breakend(prev.second) == Some(next.first)
    };
    if let Some(index) = links
        .iter()
        .tuple_windows()
        .position(|(prev, next)| !is_continued(prev, next))
    {
        return Some(index + 1);
    }
    match (links.first(), links.last()) {
        (Some(first), Some(last)) if chain.is_closed() && !is_continued(last, first) => Some(0),
        _ => None,
    }
}

/// Check all chains in the cluster, logging a warning for each problem found
///
pub fn check_chains(ctx: &ChainingContext) -> ChainValidationReport {
    let cluster_index = ctx.settings().cluster_index;
    let mut report = ChainValidationReport::default();

    let mut seen_paths: Vec<Vec<PairId>> = Vec::new();
    for chain in ctx.chains().all_chains() {
        let path = chain.links().iter().map(|x| x.pair).collect::<Vec<_>>();
        let reverse_path = reverse_links(chain.links())
            .iter()
            .map(|x| x.pair)
            .collect::<Vec<_>>();
        if seen_paths.contains(&path) || seen_paths.contains(&reverse_path) {
            warn!("Cluster {cluster_index}: duplicate chain {chain:?}");
            report.duplicate_chains += 1;
        } else {
            seen_paths.push(path);
        }

        if let Some(link_index) = find_discontinuity(ctx, chain) {
            warn!("Cluster {cluster_index}: chain {chain:?} path breaks before link {link_index}");
            report.discontinuous_chains += 1;
        }
    }

    for (breakend, state) in ctx.connections().iter() {
        if !state.can_consume(0.0) {
            warn!(
                "Cluster {cluster_index}: breakend {} consumed ploidy {:.3} exceeds limit {:.3}",
                ctx.breakend_label(breakend),
                state.consumed(),
                state.consumption_limit()
            );
            report.over_consumed_breakends += 1;
        }
    }

    report
}
