//! Input model for the SVs, ploidy estimates and candidate adjacencies of each cluster
//!
//! Candidate pairs for each breakend are listed in preference order, the most likely partner
//! first. Breakends are referenced by SV id and side.
//!

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;

use camino::Utf8Path;
use serde::{Deserialize, Serialize};
use simple_error::{SimpleResult, bail};
use unwrap::unwrap;

use crate::breakend::{BreakendId, BreakendSide, SvDefinition};
use crate::chaining::{ChainingContext, ChainingSettings};
use crate::ploidy::PloidyTolerance;

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct BreakendRef {
    pub sv: String,
    pub side: BreakendSide,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct PairInput {
    pub first: BreakendRef,
    pub second: BreakendRef,

    /// Set if sequence assembly directly supports this adjacency
    #[serde(default)]
    pub assembled: bool,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct FoldbackInput {
    pub start: BreakendRef,
    pub end: BreakendRef,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ClusterInput {
    pub cluster_index: usize,
    pub svs: Vec<SvDefinition>,

    #[serde(default)]
    pub candidate_pairs: Vec<PairInput>,

    #[serde(default)]
    pub foldbacks: Vec<FoldbackInput>,

    /// Ids of SVs which are complex duplications
    #[serde(default)]
    pub complex_dups: Vec<String>,

    /// Adjacencies found in assembled sequence
    #[serde(default)]
    pub adjacent_pairs: Vec<PairInput>,

    /// Adjacencies inferred from assembled sequence under relaxed criteria
    #[serde(default)]
    pub relaxed_adjacent_pairs: Vec<PairInput>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct ClusterSetInput {
    pub clusters: Vec<ClusterInput>,
}

impl ClusterInput {
    pub fn breakend_count(&self) -> usize {
        self.svs.iter().map(|x| x.breakends.len()).sum()
    }

    /// Create the chaining context for this cluster
    ///
    /// Any reference to an unknown SV or breakend is an error.
    ///
    pub fn build_context(
        &self,
        tolerance: PloidyTolerance,
        debug: bool,
    ) -> SimpleResult<ChainingContext> {
        let settings = ChainingSettings {
            tolerance,
            cluster_index: self.cluster_index,
            debug,
        };
        let mut ctx = ChainingContext::new(settings);

        let mut sv_lookup = BTreeMap::new();
        for sv in self.svs.iter() {
            if sv_lookup.contains_key(sv.label.as_str()) {
                bail!("Duplicate SV id '{}'", sv.label);
            }
            let sv_index = ctx.add_sv(sv)?;
            sv_lookup.insert(sv.label.as_str(), sv_index);
        }

        let get_sv_index = |label: &str| -> SimpleResult<usize> {
            match sv_lookup.get(label) {
                Some(&x) => Ok(x),
                None => bail!("Unknown SV id '{label}'"),
            }
        };
        let get_breakend = |x: &BreakendRef| -> SimpleResult<BreakendId> {
            Ok(BreakendId::new(get_sv_index(&x.sv)?, x.side))
        };

        for pair in self.candidate_pairs.iter() {
            ctx.add_candidate_pair(
                get_breakend(&pair.first)?,
                get_breakend(&pair.second)?,
                pair.assembled,
            )?;
        }

        for foldback in self.foldbacks.iter() {
            ctx.add_foldback(get_breakend(&foldback.start)?, get_breakend(&foldback.end)?)?;
        }

        for label in self.complex_dups.iter() {
            ctx.add_complex_dup(get_sv_index(label)?)?;
        }

        for (pairs, relaxed) in [
            (&self.adjacent_pairs, false),
            (&self.relaxed_adjacent_pairs, true),
        ] {
            for pair in pairs.iter() {
                ctx.add_adjacent_pair(
                    get_breakend(&pair.first)?,
                    get_breakend(&pair.second)?,
                    relaxed,
                )?;
            }
        }

        Ok(ctx)
    }
}

pub fn read_cluster_input(filename: &Utf8Path) -> ClusterSetInput {
    let file = unwrap!(
        File::open(filename),
        "Unable to open cluster input json file: '{filename}'"
    );
    let reader = BufReader::new(file);
    unwrap!(
        serde_json::from_reader(reader),
        "Unable to parse cluster input json file: '{filename}'"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_CLUSTER: &str = r#"{
        "clusters": [
            {
                "cluster_index": 7,
                "svs": [
                    {
                        "id": "del1",
                        "breakends": [
                            { "chrom": "chr2", "pos": 1000, "orientation": "+", "ploidy": 2.0, "uncertainty": 0.2 },
                            { "chrom": "chr2", "pos": 5000, "orientation": "-", "ploidy": 2.0, "uncertainty": 0.2 }
                        ]
                    },
                    {
                        "id": "sgl1",
                        "breakends": [
                            { "chrom": "chr2", "pos": 7000, "orientation": "-", "ploidy": 2.1 }
                        ]
                    }
                ],
                "candidate_pairs": [
                    { "first": { "sv": "del1", "side": "end" }, "second": { "sv": "sgl1", "side": "start" } }
                ],
                "adjacent_pairs": [
                    { "first": { "sv": "sgl1", "side": "start" }, "second": { "sv": "del1", "side": "end" } }
                ]
            }
        ]
    }"#;

    #[test]
    fn test_build_context() {
        let input: ClusterSetInput = serde_json::from_str(TEST_CLUSTER).unwrap();
        assert_eq!(input.clusters.len(), 1);
        let cluster = &input.clusters[0];
        assert_eq!(cluster.breakend_count(), 3);

        let ctx = cluster
            .build_context(PloidyTolerance::default(), false)
            .unwrap();
        assert_eq!(ctx.settings().cluster_index, 7);
        assert_eq!(ctx.svs().len(), 2);

        let del_end = BreakendId::end(0);
        let pairs = ctx.candidate_pairs_for(del_end);
        assert_eq!(pairs.len(), 1);
        assert_eq!(ctx.pair(pairs[0]).distance, 2000);
        assert!(ctx.pair(pairs[0]).assembled);
        assert_eq!(ctx.adjacent_pairs(false), pairs);
        approx::assert_ulps_eq!(ctx.uncertainty(BreakendId::start(1)), 0.0);
    }

    #[test]
    fn test_build_context_bad_reference() {
        let mut input: ClusterSetInput = serde_json::from_str(TEST_CLUSTER).unwrap();
        input.clusters[0].complex_dups.push("not_there".to_string());
        assert!(
            input.clusters[0]
                .build_context(PloidyTolerance::default(), false)
                .is_err()
        );

        let mut input: ClusterSetInput = serde_json::from_str(TEST_CLUSTER).unwrap();
        input.clusters[0].candidate_pairs[0].second.side = BreakendSide::End;
        assert!(
            input.clusters[0]
                .build_context(PloidyTolerance::default(), false)
                .is_err()
        );
    }
}
