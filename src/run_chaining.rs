use std::sync::mpsc::channel;
use std::time::{Duration, Instant};

use camino::Utf8Path;
use log::{info, warn};
use thousands::Separable;

use crate::chain_output::{ClusterChainOutput, write_chain_output};
use crate::chaining::check_chains;
use crate::cli::{ChainSettings, SharedSettings, write_chain_settings};
use crate::cluster_input::{ClusterInput, read_cluster_input};
use crate::ploidy::PloidyTolerance;
use crate::run_stats::{ChainingRunStats, ChainingStats, write_run_stats};

pub const CHAINS_FILENAME: &str = "chains.json";
pub const RUN_STATS_FILENAME: &str = "run.stats.json";
pub const SETTINGS_FILENAME: &str = "chain.settings.json";

/// Build and assemble the chaining context for one cluster
///
/// Failures are reported in the cluster output so that one bad cluster doesn't stop the run.
///
fn chain_cluster(
    cluster: &ClusterInput,
    tolerance: PloidyTolerance,
    run_validation: bool,
    debug: bool,
) -> ClusterChainOutput {
    let cluster_index = cluster.cluster_index;
    let mut ctx = match cluster.build_context(tolerance, debug) {
        Ok(x) => x,
        Err(e) => {
            warn!("Cluster {cluster_index}: skipping cluster with invalid input: {e}");
            return ClusterChainOutput::invalid_input(cluster_index, e.to_string());
        }
    };

    let error = match ctx.assemble() {
        Ok(_) => None,
        Err(e) => {
            warn!("Cluster {cluster_index}: chain assembly failed: {e}");
            Some(e.to_string())
        }
    };

    let validation = if run_validation {
        Some(check_chains(&ctx))
    } else {
        None
    };

    ClusterChainOutput::from_context(&ctx, error, validation)
}

/// Assemble chains for all clusters in the worker pool
///
/// Output is sorted by cluster index. The total assembly time over all clusters is returned as
/// well.
///
fn chain_all_clusters(
    shared_settings: &SharedSettings,
    settings: &ChainSettings,
    clusters: Vec<ClusterInput>,
) -> (Vec<ClusterChainOutput>, Duration) {
    let tolerance = settings.tolerance();
    let run_validation = settings.check_chains;
    let debug = shared_settings.debug && settings.target_cluster_index.is_some();

    let worker_pool = rayon::ThreadPoolBuilder::new()
        .num_threads(shared_settings.thread_count)
        .build()
        .unwrap();

    let (tx, rx) = channel();

    worker_pool.scope(move |scope| {
        for cluster in clusters {
            let tx = tx.clone();
            scope.spawn(move |_| {
                let start = Instant::now();
                let output = chain_cluster(&cluster, tolerance, run_validation, debug);
                tx.send((start.elapsed(), output)).unwrap();
            });
        }
    });

    let mut total_time = Duration::ZERO;
    let mut all_output = rx
        .into_iter()
        .map(|(time, output)| {
            total_time += time;
            output
        })
        .collect::<Vec<_>>();
    all_output.sort_by_key(|x| x.cluster_index);
    (all_output, total_time)
}

pub fn run_chain(shared_settings: &SharedSettings, settings: &ChainSettings) {
    write_chain_settings(&settings.output_dir, settings);

    let input_filename = Utf8Path::new(&settings.input_filename);
    info!("Reading cluster input from file: '{input_filename}'");
    let input = read_cluster_input(input_filename);

    let clusters = input
        .clusters
        .into_iter()
        .filter(|x| {
            settings
                .target_cluster_index
                .is_none_or(|index| x.cluster_index == index)
        })
        .collect::<Vec<_>>();

    let breakend_count = clusters.iter().map(|x| x.breakend_count()).sum::<usize>();
    info!(
        "Chaining {} clusters with {} breakends",
        clusters.len().separate_with_commas(),
        breakend_count.separate_with_commas()
    );

    let (all_output, total_time) = chain_all_clusters(shared_settings, settings, clusters);

    let mut stats = ChainingStats::default();
    for output in all_output.iter() {
        stats.add_cluster(output);
    }
    stats.total_assembly_time_secs = total_time.as_secs_f64();
    stats.log_summary();

    write_chain_output(&settings.output_dir.join(CHAINS_FILENAME), &all_output);

    write_run_stats(
        &settings.output_dir,
        &ChainingRunStats {
            input_filename: settings.input_filename.clone(),
            chaining_stats: stats,
        },
    );
}
