//! Track stats for the whole chaining run
//!

use std::fs::File;

use camino::Utf8Path;
use log::info;
use serde::{Deserialize, Serialize};
use thousands::Separable;
use unwrap::unwrap;

use crate::chain_output::{ClusterChainOutput, ClusterStatus};
use crate::proposed_links::LinkMoveType;
use crate::run_chaining::RUN_STATS_FILENAME;

#[derive(Default, Deserialize, Serialize)]
pub struct ChainingStats {
    pub cluster_count: usize,
    pub failed_cluster_count: usize,
    pub commit_count: usize,
    pub chain_count: usize,
    pub closed_chain_count: usize,

    /// Commits inserting a foldback into a chain or SV
    pub foldback_split_count: usize,

    /// Commits inserting a complex duplication into a chain or SV
    pub complex_dup_split_count: usize,

    /// Advisory chain validation warnings over all clusters
    pub validation_warning_count: usize,

    pub total_assembly_time_secs: f64,
}

impl ChainingStats {
    /// Add the results of one cluster
    pub fn add_cluster(&mut self, output: &ClusterChainOutput) {
        self.cluster_count += 1;
        if output.status == ClusterStatus::Failed {
            self.failed_cluster_count += 1;
        }
        self.commit_count += output.commits.len();
        self.chain_count += output.chains.len();
        self.closed_chain_count += output.chains.iter().filter(|x| x.closed).count();
        for commit in output.commits.iter() {
            match commit.move_type {
                LinkMoveType::FoldbackSplit => self.foldback_split_count += 1,
                LinkMoveType::ComplexDupSplit => self.complex_dup_split_count += 1,
                LinkMoveType::Standard => {}
            }
        }
        if let Some(validation) = &output.validation {
            self.validation_warning_count += validation.warning_count();
        }
    }

    pub fn log_summary(&self) {
        info!(
            "Assembled {} chains ({} closed) from {} commits over {} clusters",
            self.chain_count.separate_with_commas(),
            self.closed_chain_count.separate_with_commas(),
            self.commit_count.separate_with_commas(),
            self.cluster_count.separate_with_commas()
        );
        if self.failed_cluster_count > 0 {
            info!(
                "Chain assembly failed for {} clusters",
                self.failed_cluster_count.separate_with_commas()
            );
        }
    }
}

#[derive(Deserialize, Serialize)]
pub struct ChainingRunStats {
    pub input_filename: String,
    pub chaining_stats: ChainingStats,
}

/// Write run_stats structure out in json format
pub fn write_run_stats(output_dir: &Utf8Path, run_stats: &ChainingRunStats) {
    let filename = output_dir.join(RUN_STATS_FILENAME);

    info!("Writing run statistics to file: '{filename}'");

    let f = unwrap!(
        File::create(&filename),
        "Unable to create run statistics json file: '{filename}'"
    );

    serde_json::to_writer_pretty(&f, &run_stats).unwrap();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chaining::test_utils::*;

    #[test]
    fn test_add_cluster() {
        let mut ctx = get_test_context();
        let sv0 = add_test_sv(&mut ctx, 100, 1000, 2.0, 0.2);
        let sv1 = add_test_sv(&mut ctx, 2000, 3000, 2.0, 0.2);
        ctx.add_candidate_pair(e(sv0), s(sv1), false).unwrap();
        ctx.add_candidate_pair(e(sv1), s(sv0), false).unwrap();
        ctx.assemble().unwrap();

        let mut stats = ChainingStats::default();
        stats.add_cluster(&ClusterChainOutput::from_context(&ctx, None, None));
        stats.add_cluster(&ClusterChainOutput::invalid_input(
            3,
            "Unknown SV id 'x'".to_string(),
        ));

        assert_eq!(stats.cluster_count, 2);
        assert_eq!(stats.failed_cluster_count, 1);
        assert_eq!(stats.commit_count, 2);
        assert_eq!(stats.chain_count, 1);
        assert_eq!(stats.closed_chain_count, 1);
        assert_eq!(stats.foldback_split_count, 0);
    }
}
