//! Chaining rules which propose the next links to commit
//!
//! Each rule stage either scans the cluster afresh, when no proposals exist yet, or annotates
//! the proposals produced by a higher priority stage with its own tag.
//!

use itertools::Itertools;

use super::ChainingContext;
use crate::breakend::BreakendId;
use crate::chain::ChainId;
use crate::linked_pair::PairId;
use crate::log_utils::debug_msg;
use crate::ploidy::{format_ploidy, ploidy_overlap};
use crate::proposed_links::{ChainingRule, LinkMoveType, PloidyMatch, ProposedLinks};

/// Chaining rule stages, in the order they are run
///
#[derive(Clone, Copy, Debug, Eq, PartialEq, strum::EnumIter, strum::IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum RuleStage {
    SingleOption,
    FoldbackSplit,
    ComplexDupSplit,
    FoldbackPair,
    PloidyMatch,
    Adjacent,
    AdjacentRelaxed,
    PloidyMax,
    Nearest,
}

/// Run one rule stage
///
/// If `proposals` is empty the stage scans for new proposals, otherwise it annotates or restricts
/// the given proposals.
///
pub fn propose(
    ctx: &ChainingContext,
    stage: RuleStage,
    proposals: Vec<ProposedLinks>,
) -> Vec<ProposedLinks> {
    let annotate = !proposals.is_empty();
    let proposals = match stage {
        RuleStage::SingleOption => find_single_option_pairs(ctx, proposals),
        RuleStage::FoldbackSplit => {
            let new_links = find_foldback_chain_splits(ctx);
            merge_or_restrict(proposals, new_links, ChainingRule::FoldbackSplit)
        }
        RuleStage::ComplexDupSplit => {
            let new_links = find_complex_dup_splits(ctx);
            merge_or_restrict(proposals, new_links, ChainingRule::ComplexDupSplit)
        }
        RuleStage::FoldbackPair => {
            let new_links = find_foldback_to_foldback_pairs(ctx);
            merge_or_restrict(proposals, new_links, ChainingRule::Foldback)
        }
        RuleStage::PloidyMatch => find_ploidy_match_pairs(ctx, proposals),
        RuleStage::Adjacent => find_adjacent_pairs(ctx, proposals, false),
        RuleStage::AdjacentRelaxed => find_adjacent_pairs(ctx, proposals, true),
        RuleStage::PloidyMax => find_highest_ploidy(ctx, proposals),
        RuleStage::Nearest => find_nearest(ctx, proposals),
    };

    if !annotate && !proposals.is_empty() {
        let stage_label: &'static str = stage.into();
        debug_msg!(
            ctx.settings().debug,
            "Cluster {}: rule {stage_label} proposed {} links",
            ctx.settings().cluster_index,
            proposals.len()
        );
    }
    proposals
}

/// Ploidy to assign a link between two breakends using the average of their unlinked ploidy
///
/// The average is limited so that neither breakend would be consumed beyond its total plus
/// uncertainty.
///
fn get_average_link_ploidy(ctx: &ChainingContext, be1: BreakendId, be2: BreakendId) -> f64 {
    let avg = (ctx.unlinked(be1) + ctx.unlinked(be2)) * 0.5;
    avg.min(ctx.consumption_capacity(be1))
        .min(ctx.consumption_capacity(be2))
}

fn get_min_link_ploidy(ctx: &ChainingContext, be1: BreakendId, be2: BreakendId) -> f64 {
    ctx.unlinked(be1).min(ctx.unlinked(be2))
}

fn is_exhausted(ctx: &ChainingContext, breakend: BreakendId) -> bool {
    ctx.connections().is_exhausted(breakend)
}

/// Check whether `ploidy` reaches at least `required`, allowing for the cluster ploidy tolerance
fn is_ploidy_sufficient(ctx: &ChainingContext, ploidy: f64, required: f64) -> bool {
    ploidy >= required || ctx.ploidy_equal(required, ploidy)
}

/// Propose every pair which is the only remaining candidate of one of its breakends
///
fn find_single_option_pairs(
    ctx: &ChainingContext,
    mut proposals: Vec<ProposedLinks>,
) -> Vec<ProposedLinks> {
    let is_single_option = |breakend: BreakendId, pairs: &[PairId]| {
        pairs.len() == 1
            && !ctx.is_double_minute_dup(breakend.sv_index)
            && !is_exhausted(ctx, breakend)
    };

    if !proposals.is_empty() {
        let single_pairs = ctx
            .candidates()
            .iter()
            .filter(|(breakend, pairs)| is_single_option(*breakend, *pairs))
            .map(|(_, pairs)| pairs[0])
            .collect::<Vec<_>>();
        for proposal in proposals.iter_mut() {
            if proposal.pairs.iter().any(|x| single_pairs.contains(x)) {
                proposal.add_rule(ChainingRule::SingleOption);
            }
        }
        return proposals;
    }

    for (breakend, pairs) in ctx.candidates().iter() {
        if !is_single_option(breakend, pairs) {
            continue;
        }
        let pair_id = pairs[0];
        if proposals.iter().any(|x| x.contains_pair(pair_id)) {
            continue;
        }

        let pair = ctx.pair(pair_id);
        if is_exhausted(ctx, pair.first) || is_exhausted(ctx, pair.second) {
            continue;
        }

        let ploidy_match = ctx.classify_breakends(pair.first, pair.second);
        let ploidy = if ploidy_match == PloidyMatch::None {
            get_min_link_ploidy(ctx, pair.first, pair.second)
        } else {
            get_average_link_ploidy(ctx, pair.first, pair.second)
        };

        debug_msg!(
            ctx.settings().debug,
            "Cluster {}: single option {:?} ploidy {} match {:?}",
            ctx.settings().cluster_index,
            pair,
            format_ploidy(ploidy),
            ploidy_match
        );
        proposals.push(
            ProposedLinks::new(pair_id, ploidy, ChainingRule::SingleOption)
                .with_ploidy_match(ploidy_match),
        );
    }
    proposals
}

/// Find the first candidate pair of `breakend` linking it to `other`
fn find_candidate_pair(
    ctx: &ChainingContext,
    breakend: BreakendId,
    other: BreakendId,
) -> Option<PairId> {
    ctx.candidate_pairs_for(breakend)
        .iter()
        .copied()
        .find(|&x| ctx.pair(x).other_breakend(breakend) == Some(other))
}

/// Find a chain with an open end at `breakend` which can be split around a foldback of ploidy
/// `foldback_ploidy`
///
/// The chain ploidy must exceed the foldback ploidy, or match twice the foldback ploidy.
///
fn find_split_target_chain(
    ctx: &ChainingContext,
    breakend: BreakendId,
    foldback_ploidy: f64,
) -> Option<ChainId> {
    ctx.chains()
        .find_chain_with_open_end(breakend, |chain| {
            !chain.is_closed()
                && (chain.ploidy() > foldback_ploidy
                    || ctx.ploidy_equal(2.0 * foldback_ploidy, chain.ploidy()))
        })
        .map(|(id, _)| id)
}

/// Find foldbacks where both ends can link to the same breakend with at least twice the
/// foldback's ploidy
///
fn find_foldback_chain_splits(ctx: &ChainingContext) -> Vec<ProposedLinks> {
    let mut new_links = Vec::new();
    for foldback in ctx.foldbacks() {
        let (fb_start, fb_end) = (foldback.start, foldback.end);
        if is_exhausted(ctx, fb_start) || is_exhausted(ctx, fb_end) {
            continue;
        }

        let foldback_ploidy = ctx.unlinked(fb_start).min(ctx.unlinked(fb_end));
        if foldback.is_chained()
            && ctx.foldback_internal_chain(foldback, foldback_ploidy).is_none()
        {
            continue;
        }
        let split_ploidy = 2.0 * foldback_ploidy;
        let foldback_uncertainty = ctx.uncertainty(fb_start).max(ctx.uncertainty(fb_end));
        let foldback_svs = [fb_start.sv_index, fb_end.sv_index];

        for &start_pair_id in ctx.candidate_pairs_for(fb_start) {
            let Some(other) = ctx.pair(start_pair_id).other_breakend(fb_start) else {
                continue;
            };
            if foldback_svs.contains(&other.sv_index) || is_exhausted(ctx, other) {
                continue;
            }

            let other_ploidy = ctx.unlinked(other);
            let other_uncertainty = ctx.uncertainty(other);
            let is_candidate = is_ploidy_sufficient(ctx, other_ploidy, split_ploidy)
                || ploidy_overlap(
                    split_ploidy,
                    foldback_uncertainty,
                    other_ploidy,
                    other_uncertainty,
                );
            if !is_candidate || split_ploidy > ctx.consumption_capacity(other) {
                continue;
            }

            let Some(end_pair_id) = find_candidate_pair(ctx, fb_end, other) else {
                continue;
            };

            let target_chain = find_split_target_chain(ctx, other, foldback_ploidy);
            let ploidy_match = ctx.classify_ploidy(
                split_ploidy,
                foldback_uncertainty,
                other_ploidy,
                other_uncertainty,
            );

            debug_msg!(
                ctx.settings().debug,
                "Cluster {}: foldback {:?}/{:?} ploidy {} split around {:?} ploidy {} target {:?}",
                ctx.settings().cluster_index,
                fb_start,
                fb_end,
                format_ploidy(foldback_ploidy),
                other,
                format_ploidy(other_ploidy),
                target_chain
            );

            new_links.push(
                ProposedLinks::new_split(
                    [start_pair_id, end_pair_id],
                    [fb_start, fb_end],
                    foldback_ploidy,
                    ChainingRule::FoldbackSplit,
                    target_chain,
                    LinkMoveType::FoldbackSplit,
                )
                .with_ploidy_match(ploidy_match),
            );
        }
    }
    new_links
}

/// Check that a breakend linked by a chain split still has the unlinked ploidy and consumption
/// capacity for `ploidy`
///
fn can_link_split_end(ctx: &ChainingContext, breakend: BreakendId, ploidy: f64) -> bool {
    !is_exhausted(ctx, breakend)
        && is_ploidy_sufficient(ctx, ctx.unlinked(breakend), ploidy)
        && ploidy <= ctx.consumption_capacity(breakend)
}

/// Find complex duplications whose two ends can link to both ends of a higher ploidy chain or SV
///
fn find_complex_dup_splits(ctx: &ChainingContext) -> Vec<ProposedLinks> {
    let mut new_links = Vec::new();
    for &dup_index in ctx.complex_dups() {
        let dup_start = BreakendId::start(dup_index);
        let dup_end = BreakendId::end(dup_index);
        if is_exhausted(ctx, dup_start) || is_exhausted(ctx, dup_end) {
            continue;
        }

        let dup_ploidy = ctx.unlinked(dup_start).min(ctx.unlinked(dup_end));
        let split_ploidy = 2.0 * dup_ploidy;
        let dup_uncertainty = ctx.uncertainty(dup_start).max(ctx.uncertainty(dup_end));

        // Chains with two distinct open ends
        for chain in ctx.chains().all_chains() {
            if chain.is_closed() || !is_ploidy_sufficient(ctx, chain.ploidy(), split_ploidy) {
                continue;
            }
            let (Some(chain_start), Some(chain_end)) = chain.open_ends() else {
                continue;
            };
            if chain_start == chain_end
                || chain_start.sv_index == dup_index
                || chain_end.sv_index == dup_index
                || !can_link_split_end(ctx, chain_start, dup_ploidy)
                || !can_link_split_end(ctx, chain_end, dup_ploidy)
            {
                continue;
            }

            let assignments = [(dup_start, dup_end), (dup_end, dup_start)];
            let Some((end_pair, start_pair, dup_x, dup_y)) =
                assignments.into_iter().find_map(|(dup_x, dup_y)| {
                    let end_pair = find_candidate_pair(ctx, chain_end, dup_x)?;
                    let start_pair = find_candidate_pair(ctx, chain_start, dup_y)?;
                    Some((end_pair, start_pair, dup_x, dup_y))
                })
            else {
                continue;
            };

            let ploidy_match = ctx.classify_ploidy(
                split_ploidy,
                dup_uncertainty,
                chain.ploidy(),
                chain.uncertainty(),
            );

            debug_msg!(
                ctx.settings().debug,
                "Cluster {}: complex dup sv{} ploidy {} inserted into chain {:?}",
                ctx.settings().cluster_index,
                dup_index,
                format_ploidy(dup_ploidy),
                chain
            );

            new_links.push(
                ProposedLinks::new_split(
                    [end_pair, start_pair],
                    [dup_x, dup_y],
                    dup_ploidy,
                    ChainingRule::ComplexDupSplit,
                    Some(chain.id()),
                    LinkMoveType::ComplexDupSplit,
                )
                .with_ploidy_match(ploidy_match),
            );
        }

        // Both ends of a single other SV
        for &start_pair_id in ctx.candidate_pairs_for(dup_start) {
            let Some(other1) = ctx.pair(start_pair_id).other_breakend(dup_start) else {
                continue;
            };
            if other1.sv_index == dup_index || !can_link_split_end(ctx, other1, dup_ploidy) {
                continue;
            }
            let Some(other2) = ctx.other_breakend(other1) else {
                continue;
            };
            if !can_link_split_end(ctx, other2, dup_ploidy) {
                continue;
            }

            let other1_ploidy = ctx.unlinked(other1);
            if !is_ploidy_sufficient(ctx, other1_ploidy, split_ploidy)
                || !is_ploidy_sufficient(ctx, ctx.unlinked(other2), split_ploidy)
            {
                continue;
            }

            let Some(end_pair_id) = find_candidate_pair(ctx, dup_end, other2) else {
                continue;
            };

            let ploidy_match = ctx.classify_ploidy(
                split_ploidy,
                dup_uncertainty,
                other1_ploidy,
                ctx.uncertainty(other1),
            );

            debug_msg!(
                ctx.settings().debug,
                "Cluster {}: complex dup sv{} ploidy {} matched with breakends {:?} & {:?}",
                ctx.settings().cluster_index,
                dup_index,
                format_ploidy(dup_ploidy),
                other1,
                other2
            );

            new_links.push(
                ProposedLinks::new_split(
                    [start_pair_id, end_pair_id],
                    [dup_start, dup_end],
                    dup_ploidy,
                    ChainingRule::ComplexDupSplit,
                    None,
                    LinkMoveType::ComplexDupSplit,
                )
                .with_ploidy_match(ploidy_match),
            );
        }
    }
    new_links
}

/// Find pairs joining the ends of two different foldbacks, where each is the other's preferred
/// candidate
///
fn find_foldback_to_foldback_pairs(ctx: &ChainingContext) -> Vec<ProposedLinks> {
    let mut new_links: Vec<ProposedLinks> = Vec::new();
    for foldback in ctx.foldbacks() {
        for breakend in [foldback.start, foldback.end] {
            if is_exhausted(ctx, breakend) {
                continue;
            }
            let Some(&pair_id) = ctx.candidate_pairs_for(breakend).first() else {
                continue;
            };
            if new_links.iter().any(|x| x.contains_pair(pair_id)) {
                continue;
            }
            let Some(other) = ctx.pair(pair_id).other_breakend(breakend) else {
                continue;
            };
            match ctx.foldback_marker(other.sv_index) {
                Some(x) if x != *foldback && (x.start == other || x.end == other) => {}
                _ => continue,
            }
            if is_exhausted(ctx, other)
                || ctx.candidate_pairs_for(other).first() != Some(&pair_id)
            {
                continue;
            }

            let ploidy_match = ctx.classify_breakends(breakend, other);
            if ploidy_match == PloidyMatch::None {
                continue;
            }

            let ploidy = get_average_link_ploidy(ctx, breakend, other);
            debug_msg!(
                ctx.settings().debug,
                "Cluster {}: foldback pair {:?} ploidy {}",
                ctx.settings().cluster_index,
                ctx.pair(pair_id),
                format_ploidy(ploidy)
            );
            new_links.push(
                ProposedLinks::new(pair_id, ploidy, ChainingRule::Foldback)
                    .with_ploidy_match(ploidy_match),
            );
        }
    }
    new_links
}

/// Combine the proposals of a structural rule stage with any existing proposals
///
/// With no existing proposals the new proposals are returned. Otherwise the existing proposals
/// are restricted by the new ones.
///
fn merge_or_restrict(
    proposals: Vec<ProposedLinks>,
    new_links: Vec<ProposedLinks>,
    rule: ChainingRule,
) -> Vec<ProposedLinks> {
    if proposals.is_empty() {
        new_links
    } else {
        restrict_proposed_links(proposals, &new_links, rule)
    }
}

/// Tag existing proposals which share a pair with a new proposal from `rule`
///
/// A single pair proposal contained in a new chain split is upgraded to the split. Proposals
/// which become identical after upgrading are merged, keeping the first and the union of tags.
///
fn restrict_proposed_links(
    proposals: Vec<ProposedLinks>,
    new_links: &[ProposedLinks],
    rule: ChainingRule,
) -> Vec<ProposedLinks> {
    let mut restricted: Vec<ProposedLinks> = Vec::new();
    for mut proposal in proposals {
        if let Some(new_link) = new_links.iter().find(|x| x.shares_pair(&proposal)) {
            if new_link.is_split() && !proposal.is_split() {
                proposal.upgrade_to_split(new_link);
            } else {
                proposal.add_rule(rule);
            }
        }

        match restricted
            .iter_mut()
            .find(|x| x.move_type == proposal.move_type && x.has_same_pairs(&proposal))
        {
            Some(existing) => existing.merge_rules(&proposal),
            None => restricted.push(proposal),
        }
    }
    restricted
}

/// Tag or propose links whose breakend ploidies are equal or overlapping
///
fn find_ploidy_match_pairs(
    ctx: &ChainingContext,
    mut proposals: Vec<ProposedLinks>,
) -> Vec<ProposedLinks> {
    if !proposals.is_empty() {
        for proposal in proposals.iter_mut() {
            match proposal.ploidy_match {
                PloidyMatch::Matched => proposal.add_rule(ChainingRule::PloidyMatch),
                PloidyMatch::Overlap => proposal.add_rule(ChainingRule::PloidyOverlap),
                PloidyMatch::None => {}
            }
        }
        return proposals;
    }

    // Highest unlinked ploidy first
    let breakends = ctx
        .candidates()
        .breakends()
        .filter(|&x| !is_exhausted(ctx, x))
        .sorted_by(|&a, &b| ctx.unlinked(b).total_cmp(&ctx.unlinked(a)).then(a.cmp(&b)))
        .collect::<Vec<_>>();

    let mut current_max_ploidy = 0.0;
    for breakend in breakends {
        let breakend_ploidy = ctx.unlinked(breakend);
        if breakend_ploidy < current_max_ploidy
            && !ctx.ploidy_equal(breakend_ploidy, current_max_ploidy)
        {
            continue;
        }

        for &pair_id in ctx.candidate_pairs_for(breakend) {
            if proposals.iter().any(|x| x.contains_pair(pair_id)) {
                continue;
            }
            let Some(other) = ctx.pair(pair_id).other_breakend(breakend) else {
                continue;
            };
            if is_exhausted(ctx, other) {
                continue;
            }

            let ploidy_match = ctx.classify_breakends(breakend, other);
            let rule = match ploidy_match {
                PloidyMatch::Matched => ChainingRule::PloidyMatch,
                PloidyMatch::Overlap => ChainingRule::PloidyOverlap,
                PloidyMatch::None => continue,
            };

            let ploidy = get_average_link_ploidy(ctx, breakend, other);
            if !ctx.ploidy_equal(ploidy, current_max_ploidy) {
                current_max_ploidy = ploidy;
            }

            debug_msg!(
                ctx.settings().debug,
                "Cluster {}: ploidy {:?} {:?} ploidy {} & {}",
                ctx.settings().cluster_index,
                ploidy_match,
                ctx.pair(pair_id),
                format_ploidy(breakend_ploidy),
                format_ploidy(ctx.unlinked(other))
            );
            proposals.push(ProposedLinks::new(pair_id, ploidy, rule).with_ploidy_match(ploidy_match));
            break;
        }
    }
    proposals
}

/// Tag or propose links supported by sequence assembly
///
/// The primary and relaxed pools are run as separate stages, so that adjacencies from the
/// relaxed pool are only considered when the primary pool has nothing to offer.
///
fn find_adjacent_pairs(
    ctx: &ChainingContext,
    mut proposals: Vec<ProposedLinks>,
    relaxed: bool,
) -> Vec<ProposedLinks> {
    let pool = ctx.adjacent_pairs(relaxed);
    if !proposals.is_empty() {
        for proposal in proposals.iter_mut() {
            if proposal.pairs.iter().all(|x| pool.contains(x)) {
                proposal.add_rule(ChainingRule::Adjacent);
            }
        }
        return proposals;
    }

    for &pair_id in pool {
        if ctx.is_committed(pair_id) {
            continue;
        }
        let pair = ctx.pair(pair_id);
        if is_exhausted(ctx, pair.first) || is_exhausted(ctx, pair.second) {
            continue;
        }
        if !ctx.ploidy_equal(ctx.unlinked(pair.first), ctx.unlinked(pair.second)) {
            continue;
        }

        let ploidy = get_average_link_ploidy(ctx, pair.first, pair.second);
        debug_msg!(
            ctx.settings().debug,
            "Cluster {}: adjacent {:?} relaxed: {relaxed} ploidy {}",
            ctx.settings().cluster_index,
            pair,
            format_ploidy(ploidy)
        );

        let mut proposal = ProposedLinks::new(pair_id, ploidy, ChainingRule::Adjacent)
            .with_ploidy_match(PloidyMatch::Matched);
        proposal.add_rule(ChainingRule::PloidyMatch);
        proposals.push(proposal);
    }
    proposals
}

/// All distinct candidate pairs with unlinked ploidy remaining on both sides, in breakend scan
/// order
fn get_live_candidate_pairs(ctx: &ChainingContext) -> Vec<PairId> {
    ctx.candidates()
        .iter()
        .filter(|(breakend, _)| !is_exhausted(ctx, *breakend))
        .flat_map(|(_, pairs)| pairs.iter().copied())
        .unique()
        .filter(|&x| {
            let pair = ctx.pair(x);
            !(is_exhausted(ctx, pair.first) || is_exhausted(ctx, pair.second))
        })
        .collect()
}

/// Tag or propose the links with the highest ploidy
///
fn find_highest_ploidy(
    ctx: &ChainingContext,
    mut proposals: Vec<ProposedLinks>,
) -> Vec<ProposedLinks> {
    if !proposals.is_empty() {
        let max_ploidy = proposals
            .iter()
            .map(|x| x.ploidy)
            .fold(f64::NEG_INFINITY, f64::max);
        for proposal in proposals.iter_mut() {
            if ctx.ploidy_equal(max_ploidy, proposal.ploidy) {
                proposal.add_rule(ChainingRule::PloidyMax);
            }
        }
        return proposals;
    }

    let pair_ploidies = get_live_candidate_pairs(ctx)
        .into_iter()
        .map(|x| {
            let pair = ctx.pair(x);
            (x, get_min_link_ploidy(ctx, pair.first, pair.second))
        })
        .collect::<Vec<_>>();
    let max_ploidy = pair_ploidies
        .iter()
        .map(|(_, ploidy)| *ploidy)
        .fold(f64::NEG_INFINITY, f64::max);

    for (pair_id, ploidy) in pair_ploidies {
        if !ctx.ploidy_equal(max_ploidy, ploidy) {
            continue;
        }
        let pair = ctx.pair(pair_id);
        let ploidy_match = ctx.classify_breakends(pair.first, pair.second);
        debug_msg!(
            ctx.settings().debug,
            "Cluster {}: max ploidy {:?} ploidy {}",
            ctx.settings().cluster_index,
            pair,
            format_ploidy(ploidy)
        );
        proposals.push(
            ProposedLinks::new(pair_id, ploidy, ChainingRule::PloidyMax)
                .with_ploidy_match(ploidy_match),
        );
    }
    proposals
}

/// Keep or propose the single shortest link
///
fn find_nearest(ctx: &ChainingContext, mut proposals: Vec<ProposedLinks>) -> Vec<ProposedLinks> {
    if !proposals.is_empty() {
        let Some(nearest_index) = proposals
            .iter()
            .position_min_by_key(|x| x.shortest_link_distance(ctx.pairs()))
        else {
            return proposals;
        };
        let mut nearest = proposals.swap_remove(nearest_index);
        nearest.add_rule(ChainingRule::Nearest);
        return vec![nearest];
    }

    let Some(pair_id) = get_live_candidate_pairs(ctx)
        .into_iter()
        .min_by_key(|&x| ctx.pair(x).distance)
    else {
        return proposals;
    };

    let pair = ctx.pair(pair_id);
    let ploidy = get_min_link_ploidy(ctx, pair.first, pair.second);
    let ploidy_match = ctx.classify_breakends(pair.first, pair.second);
    debug_msg!(
        ctx.settings().debug,
        "Cluster {}: nearest {:?} ploidy {}",
        ctx.settings().cluster_index,
        pair,
        format_ploidy(ploidy)
    );
    vec![ProposedLinks::new(pair_id, ploidy, ChainingRule::Nearest).with_ploidy_match(ploidy_match)]
}

#[cfg(test)]
mod tests {
    use super::super::assembly::propose_all;
    use super::super::check_chains;
    use super::super::test_utils::*;
    use super::*;
    use crate::breakend::{BreakendDefinition, Orientation, SvDefinition};

    #[test]
    fn test_single_option_skips_double_minute() {
        let mut ctx = get_test_context();
        let def = SvDefinition {
            label: "dm".to_string(),
            breakends: [(100, Orientation::Reverse), (900, Orientation::Forward)]
                .into_iter()
                .map(|(pos, orientation)| BreakendDefinition {
                    chrom: "chr1".to_string(),
                    pos,
                    orientation,
                    ploidy: 6.0,
                    uncertainty: 0.5,
                })
                .collect(),
            double_minute_dup: true,
        };
        let dm = ctx.add_sv(&def).unwrap();
        ctx.add_candidate_pair(s(dm), e(dm), false).unwrap();

        assert!(propose(&ctx, RuleStage::SingleOption, Vec::new()).is_empty());

        let proposals = propose(&ctx, RuleStage::PloidyMatch, Vec::new());
        assert_eq!(proposals.len(), 1);
        assert!(proposals[0].has_rule(ChainingRule::PloidyMatch));
    }

    #[test]
    fn test_ploidy_match_highest_first() {
        let mut ctx = get_test_context();
        let sv0 = add_test_sv(&mut ctx, 100, 1000, 4.0, 0.2);
        let sv1 = add_test_sv(&mut ctx, 2000, 3000, 4.0, 0.2);
        let sv2 = add_test_sv(&mut ctx, 4000, 5000, 1.0, 0.2);
        let sv3 = add_test_sv(&mut ctx, 6000, 7000, 1.0, 0.2);
        let high_pair = ctx.add_candidate_pair(e(sv0), s(sv1), false).unwrap();
        ctx.add_candidate_pair(e(sv2), s(sv3), false).unwrap();

        let proposals = propose(&ctx, RuleStage::PloidyMatch, Vec::new());
        assert_eq!(proposals.len(), 1);
        assert_eq!(proposals[0].pairs, vec![high_pair]);
        approx::assert_ulps_eq!(proposals[0].ploidy, 4.0);
    }

    #[test]
    fn test_adjacent_pools() {
        let mut ctx = get_test_context();
        let sv0 = add_test_sv(&mut ctx, 100, 1000, 2.0, 0.2);
        let sv1 = add_test_sv(&mut ctx, 2000, 3000, 2.0, 0.2);
        let sv2 = add_test_sv(&mut ctx, 4000, 5000, 2.0, 0.2);
        let primary = ctx.add_adjacent_pair(e(sv0), s(sv1), false).unwrap();
        let relaxed = ctx.add_adjacent_pair(e(sv1), s(sv2), true).unwrap();

        let proposals = propose(&ctx, RuleStage::Adjacent, Vec::new());
        assert_eq!(proposals.len(), 1);
        assert_eq!(proposals[0].pairs, vec![primary]);
        assert!(proposals[0].has_rule(ChainingRule::Adjacent));
        assert!(proposals[0].has_rule(ChainingRule::PloidyMatch));
        assert_eq!(proposals[0].ploidy_match, PloidyMatch::Matched);

        let proposals = propose(&ctx, RuleStage::AdjacentRelaxed, Vec::new());
        assert_eq!(proposals.len(), 1);
        assert_eq!(proposals[0].pairs, vec![relaxed]);

        // Committed pairs are not proposed again from the pool
        let partial = ProposedLinks::new(primary, 1.0, ChainingRule::Adjacent);
        ctx.commit(&partial).unwrap();
        assert!(propose(&ctx, RuleStage::Adjacent, Vec::new()).is_empty());
    }

    #[test]
    fn test_highest_ploidy_and_nearest() {
        let mut ctx = get_test_context();
        let sv0 = add_test_sv(&mut ctx, 100, 1000, 3.0, 0.1);
        let sv1 = add_test_sv(&mut ctx, 9000, 9500, 5.0, 0.1);
        let sv2 = add_test_sv(&mut ctx, 1100, 1500, 1.0, 0.1);
        let far_pair = ctx.add_candidate_pair(e(sv0), s(sv1), false).unwrap();
        let near_pair = ctx.add_candidate_pair(e(sv0), s(sv2), false).unwrap();

        let proposals = propose(&ctx, RuleStage::PloidyMax, Vec::new());
        assert_eq!(proposals.len(), 1);
        assert_eq!(proposals[0].pairs, vec![far_pair]);
        approx::assert_ulps_eq!(proposals[0].ploidy, 3.0);

        let proposals = propose(&ctx, RuleStage::Nearest, Vec::new());
        assert_eq!(proposals.len(), 1);
        assert_eq!(proposals[0].pairs, vec![near_pair]);
        approx::assert_ulps_eq!(proposals[0].ploidy, 1.0);

        // Annotating keeps only the shortest proposal
        let both = vec![
            ProposedLinks::new(far_pair, 3.0, ChainingRule::PloidyMax),
            ProposedLinks::new(near_pair, 1.0, ChainingRule::PloidyMax),
        ];
        let proposals = propose(&ctx, RuleStage::Nearest, both);
        assert_eq!(proposals.len(), 1);
        assert_eq!(proposals[0].pairs, vec![near_pair]);
        assert!(proposals[0].has_rule(ChainingRule::Nearest));
    }

    #[test]
    fn test_foldback_to_foldback() {
        let mut ctx = get_test_context();
        let fb0 = add_test_sv(&mut ctx, 100, 300, 2.0, 0.3);
        let fb1 = add_test_sv(&mut ctx, 5000, 5200, 2.2, 0.3);
        let sv2 = add_test_sv(&mut ctx, 8000, 9000, 2.0, 0.3);
        ctx.add_foldback(s(fb0), e(fb0)).unwrap();
        ctx.add_foldback(s(fb1), e(fb1)).unwrap();
        let fb_pair = ctx.add_candidate_pair(e(fb0), s(fb1), false).unwrap();
        ctx.add_candidate_pair(e(fb0), s(sv2), false).unwrap();

        let proposals = propose(&ctx, RuleStage::FoldbackPair, Vec::new());
        assert_eq!(proposals.len(), 1);
        assert_eq!(proposals[0].pairs, vec![fb_pair]);
        assert!(proposals[0].has_rule(ChainingRule::Foldback));
        approx::assert_ulps_eq!(proposals[0].ploidy, 2.1);

        // An existing proposal sharing the pair gains the foldback tag
        let existing = vec![ProposedLinks::new(fb_pair, 2.0, ChainingRule::SingleOption)];
        let proposals = propose(&ctx, RuleStage::FoldbackPair, existing);
        assert_eq!(proposals.len(), 1);
        assert!(proposals[0].has_rule(ChainingRule::SingleOption));
        assert!(proposals[0].has_rule(ChainingRule::Foldback));
    }

    #[test]
    fn test_foldback_to_foldback_requires_best_candidate() {
        let mut ctx = get_test_context();
        let fb0 = add_test_sv(&mut ctx, 100, 300, 2.0, 0.3);
        let fb1 = add_test_sv(&mut ctx, 5000, 5200, 2.0, 0.3);
        let sv2 = add_test_sv(&mut ctx, 8000, 9000, 2.0, 0.3);
        ctx.add_foldback(s(fb0), e(fb0)).unwrap();
        ctx.add_foldback(s(fb1), e(fb1)).unwrap();
        ctx.add_candidate_pair(s(fb1), s(sv2), false).unwrap();
        ctx.add_candidate_pair(e(fb0), s(fb1), false).unwrap();

        assert!(propose(&ctx, RuleStage::FoldbackPair, Vec::new()).is_empty());
    }

    #[test]
    fn test_complex_dup_into_chain() {
        let mut ctx = get_test_context();
        let sv0 = add_test_sv(&mut ctx, 100, 1000, 4.0, 0.2);
        let sv1 = add_test_sv(&mut ctx, 2000, 3000, 4.0, 0.2);
        let dup = add_test_sv(&mut ctx, 1200, 1800, 2.0, 0.2);
        let chain_pair = ctx.add_candidate_pair(e(sv0), s(sv1), false).unwrap();
        ctx.add_complex_dup(dup).unwrap();
        ctx.add_candidate_pair(e(sv1), s(dup), false).unwrap();
        ctx.add_candidate_pair(s(sv0), e(dup), false).unwrap();

        let chain_ids = ctx
            .commit(&ProposedLinks::new(chain_pair, 4.0, ChainingRule::PloidyMatch))
            .unwrap();
        let chain_id = chain_ids[0];

        let proposals = propose_all(&ctx);
        assert_eq!(proposals.len(), 1);
        let proposal = &proposals[0];
        assert_eq!(proposal.move_type, LinkMoveType::ComplexDupSplit);
        assert_eq!(proposal.target_chain, Some(chain_id));
        assert_eq!(proposal.ploidy_match, PloidyMatch::Matched);

        ctx.commit(proposal).unwrap();
        let chain = ctx.chains().get(chain_id).unwrap();
        assert_eq!(chain.links().len(), 4);
        assert_eq!(chain.open_ends(), (Some(s(sv0)), Some(e(sv1))));
        approx::assert_ulps_eq!(chain.ploidy(), 2.0);
        approx::assert_ulps_eq!(ctx.unlinked(e(sv1)), 2.0);
        assert!(ctx.connections().is_exhausted(e(dup)));
    }

    #[test]
    fn test_complex_dup_skips_partly_linked_chain_end() {
        let mut ctx = get_test_context();
        let sv0 = add_test_sv(&mut ctx, 100, 1000, 4.0, 0.2);
        let sv1 = add_test_sv(&mut ctx, 2000, 3000, 4.0, 0.2);
        let dup = add_test_sv(&mut ctx, 1200, 1800, 2.0, 0.2);
        let sv3 = add_test_sv(&mut ctx, 6000, 7000, 3.5, 0.2);
        let chain_pair = ctx.add_candidate_pair(e(sv0), s(sv1), false).unwrap();
        let side_pair = ctx.add_candidate_pair(e(sv1), s(sv3), false).unwrap();
        ctx.add_complex_dup(dup).unwrap();
        ctx.add_candidate_pair(e(sv1), s(dup), false).unwrap();
        ctx.add_candidate_pair(s(sv0), e(dup), false).unwrap();

        let chain_id = ctx
            .commit(&ProposedLinks::new(chain_pair, 4.0, ChainingRule::PloidyMatch))
            .unwrap()[0];
        ctx.commit(&ProposedLinks::new(side_pair, 3.5, ChainingRule::PloidyMatch))
            .unwrap();
        approx::assert_ulps_eq!(ctx.unlinked(e(sv1)), 0.5);
        let chain = ctx.chains().get(chain_id).unwrap();
        assert_eq!(chain.open_ends(), (Some(s(sv0)), Some(e(sv1))));

        // The chain end can't take the full duplication ploidy any more
        let proposals = propose(&ctx, RuleStage::ComplexDupSplit, Vec::new());
        assert!(proposals.is_empty());

        ctx.assemble().unwrap();
        assert_eq!(check_chains(&ctx).over_consumed_breakends, 0);
    }

    #[test]
    fn test_foldback_split_of_lower_ploidy_chain() {
        let mut ctx = get_test_context();
        let sv0 = add_test_sv(&mut ctx, 100, 1000, 3.0, 0.2);
        let sv1 = add_test_sv(&mut ctx, 2000, 3000, 4.0, 0.2);
        let fb = add_test_sv(&mut ctx, 8000, 8200, 2.0, 0.2);
        let chain_pair = ctx.add_candidate_pair(e(sv0), s(sv1), false).unwrap();
        ctx.add_foldback(s(fb), e(fb)).unwrap();
        ctx.add_candidate_pair(s(fb), e(sv1), false).unwrap();
        ctx.add_candidate_pair(e(fb), e(sv1), false).unwrap();

        let chain_id = ctx
            .commit(&ProposedLinks::new(chain_pair, 3.0, ChainingRule::PloidyMatch))
            .unwrap()[0];

        let proposals = propose(&ctx, RuleStage::FoldbackSplit, Vec::new());
        assert_eq!(proposals.len(), 1);
        assert_eq!(proposals[0].target_chain, Some(chain_id));

        // The whole chain carries the foldback, with no residual copy left behind
        let chain_ids = ctx.commit(&proposals[0]).unwrap();
        assert_eq!(chain_ids, vec![chain_id]);
        assert_eq!(ctx.chains().len(), 1);
        let chain = ctx.chains().get(chain_id).unwrap();
        assert_eq!(chain.links().len(), 4);
        approx::assert_ulps_eq!(chain.ploidy(), 2.0);
        assert_eq!(chain.open_ends(), (Some(s(sv0)), Some(s(sv0))));
        assert_eq!(check_chains(&ctx).warning_count(), 0);
    }

    #[test]
    fn test_chained_foldback_split() {
        let mut ctx = get_test_context();
        let sv0 = add_test_sv(&mut ctx, 1000, 1500, 2.0, 0.2);
        let sv1 = add_test_sv(&mut ctx, 1800, 2200, 2.0, 0.2);
        let sv2 = add_test_sv(&mut ctx, 5000, 6000, 4.0, 0.2);
        let internal_pair = ctx.add_candidate_pair(e(sv0), s(sv1), false).unwrap();
        ctx.add_foldback(s(sv0), e(sv1)).unwrap();
        ctx.add_candidate_pair(s(sv0), e(sv2), false).unwrap();
        ctx.add_candidate_pair(e(sv1), e(sv2), false).unwrap();

        // Nothing joins the two foldback SVs yet
        assert!(propose(&ctx, RuleStage::FoldbackSplit, Vec::new()).is_empty());

        let internal_chain = ctx
            .commit(&ProposedLinks::new(internal_pair, 2.0, ChainingRule::PloidyMatch))
            .unwrap()[0];

        let proposals = propose(&ctx, RuleStage::FoldbackSplit, Vec::new());
        assert_eq!(proposals.len(), 1);
        assert_eq!(proposals[0].target_chain, None);
        approx::assert_ulps_eq!(proposals[0].ploidy, 2.0);

        // The path between the foldback SVs is moved into the new chain
        let chain_ids = ctx.commit(&proposals[0]).unwrap();
        assert_eq!(chain_ids.len(), 1);
        assert!(ctx.chains().get(internal_chain).is_none());
        let chain = ctx.chains().get(chain_ids[0]).unwrap();
        let path = chain
            .links()
            .iter()
            .map(|x| (x.first, x.second))
            .collect::<Vec<_>>();
        assert_eq!(
            path,
            vec![(e(sv2), s(sv0)), (e(sv0), s(sv1)), (e(sv1), e(sv2))]
        );
        assert_eq!(chain.open_ends(), (Some(s(sv2)), Some(s(sv2))));
        assert!(ctx.connections().is_exhausted(e(sv2)));
        assert_eq!(check_chains(&ctx).warning_count(), 0);
    }
}
