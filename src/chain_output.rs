//! Write assembled chains for all clusters in json format
//!

use std::fs::File;
use std::io::BufWriter;

use camino::Utf8Path;
use log::info;
use serde::Serialize;
use unwrap::unwrap;

use crate::breakend::{BreakendId, INTER_CHROM_DISTANCE};
use crate::chain::Chain;
use crate::chaining::{ChainValidationReport, ChainingContext, CommitRecord};
use crate::proposed_links::{ChainingRule, LinkMoveType, PloidyMatch};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterStatus {
    Complete,
    Failed,
}

#[derive(Serialize)]
pub struct ChainLinkOutput {
    pub first: String,
    pub second: String,

    /// Distance between the breakends, or None for breakends on different chromosomes
    pub distance: Option<u64>,
    pub assembled: bool,
}

#[derive(Serialize)]
pub struct ChainOutput {
    pub id: usize,
    pub ploidy: f64,
    pub uncertainty: f64,
    pub closed: bool,
    pub open_start: Option<String>,
    pub open_end: Option<String>,
    pub links: Vec<ChainLinkOutput>,
}

#[derive(Serialize)]
pub struct CommitOutput {
    pub pairs: Vec<[String; 2]>,
    pub ploidy: f64,
    pub ploidy_match: PloidyMatch,
    pub rules: Vec<ChainingRule>,
    pub move_type: LinkMoveType,
    pub chains: Vec<usize>,
}

#[derive(Serialize)]
pub struct UnlinkedBreakendOutput {
    pub breakend: String,
    pub unlinked_ploidy: f64,
}

#[derive(Serialize)]
pub struct ClusterChainOutput {
    pub cluster_index: usize,
    pub status: ClusterStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub chains: Vec<ChainOutput>,
    pub commits: Vec<CommitOutput>,
    pub unlinked_breakends: Vec<UnlinkedBreakendOutput>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<ChainValidationReport>,
}

fn get_chain_output(ctx: &ChainingContext, chain: &Chain) -> ChainOutput {
    let label = |x: Option<BreakendId>| x.map(|x| ctx.breakend_label(x));
    let links = chain
        .links()
        .iter()
        .map(|link| {
            let pair = ctx.pair(link.pair);
            ChainLinkOutput {
                first: ctx.breakend_label(link.first),
                second: ctx.breakend_label(link.second),
                distance: (pair.distance != INTER_CHROM_DISTANCE).then_some(pair.distance),
                assembled: pair.assembled,
            }
        })
        .collect();
    let (open_start, open_end) = chain.open_ends();
    ChainOutput {
        id: chain.id().0,
        ploidy: chain.ploidy(),
        uncertainty: chain.uncertainty(),
        closed: chain.is_closed(),
        open_start: label(open_start),
        open_end: label(open_end),
        links,
    }
}

fn get_commit_output(ctx: &ChainingContext, record: &CommitRecord) -> CommitOutput {
    let pairs = record
        .pairs
        .iter()
        .map(|&x| {
            let pair = ctx.pair(x);
            [ctx.breakend_label(pair.first), ctx.breakend_label(pair.second)]
        })
        .collect();
    CommitOutput {
        pairs,
        ploidy: record.ploidy,
        ploidy_match: record.ploidy_match,
        rules: record.rules.clone(),
        move_type: record.move_type,
        chains: record.chains.iter().map(|x| x.0).collect(),
    }
}

impl ClusterChainOutput {
    /// Summarize the final state of a cluster after chain assembly
    ///
    /// If `error` is set, the cluster is reported as failed with the state reached up to the
    /// failure.
    ///
    pub fn from_context(
        ctx: &ChainingContext,
        error: Option<String>,
        validation: Option<ChainValidationReport>,
    ) -> Self {
        let status = if error.is_some() {
            ClusterStatus::Failed
        } else {
            ClusterStatus::Complete
        };
        let unlinked_breakends = ctx
            .unlinked_breakends()
            .into_iter()
            .map(|x| UnlinkedBreakendOutput {
                breakend: ctx.breakend_label(x),
                unlinked_ploidy: ctx.unlinked(x),
            })
            .collect();
        Self {
            cluster_index: ctx.settings().cluster_index,
            status,
            error,
            chains: ctx
                .chains()
                .all_chains()
                .map(|x| get_chain_output(ctx, x))
                .collect(),
            commits: ctx
                .commit_log()
                .iter()
                .map(|x| get_commit_output(ctx, x))
                .collect(),
            unlinked_breakends,
            validation,
        }
    }

    /// Output for a cluster whose input could not be used to build a chaining context
    pub fn invalid_input(cluster_index: usize, error: String) -> Self {
        Self {
            cluster_index,
            status: ClusterStatus::Failed,
            error: Some(error),
            chains: Vec::new(),
            commits: Vec::new(),
            unlinked_breakends: Vec::new(),
            validation: None,
        }
    }
}

/// Write chain output for all clusters to `filename` in json format
pub fn write_chain_output(filename: &Utf8Path, clusters: &[ClusterChainOutput]) {
    info!("Writing chains for {} clusters to file: '{filename}'", clusters.len());

    let f = unwrap!(
        File::create(filename),
        "Unable to create chain output json file: '{filename}'"
    );
    let writer = BufWriter::new(f);
    unwrap!(
        serde_json::to_writer_pretty(writer, &clusters),
        "Unable to write chain output json file: '{filename}'"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chaining::test_utils::*;

    #[test]
    fn test_cluster_output() {
        let mut ctx = get_test_context();
        let sv0 = add_test_sv(&mut ctx, 100, 1000, 2.0, 0.2);
        let sv1 = add_test_sv(&mut ctx, 2000, 3000, 3.0, 0.2);
        ctx.add_candidate_pair(e(sv0), s(sv1), true).unwrap();
        ctx.assemble().unwrap();

        let output = ClusterChainOutput::from_context(&ctx, None, None);
        assert_eq!(output.status, ClusterStatus::Complete);
        assert_eq!(output.chains.len(), 1);
        assert_eq!(output.commits.len(), 1);

        let chain = &output.chains[0];
        assert_eq!(chain.open_start.as_deref(), Some("sv0:start"));
        assert_eq!(chain.links[0].first, "sv0:end");
        assert_eq!(chain.links[0].distance, Some(1000));
        assert!(chain.links[0].assembled);

        // Remaining ploidy on the higher ploidy breakend is reported
        let unlinked = output
            .unlinked_breakends
            .iter()
            .find(|x| x.breakend == "sv1:start")
            .unwrap();
        approx::assert_abs_diff_eq!(unlinked.unlinked_ploidy, 1.0, epsilon = 1e-9);

        let json = serde_json::to_string(&output).unwrap();
        assert!(json.contains("\"status\":\"complete\""));
        assert!(!json.contains("\"error\""));
    }
}
