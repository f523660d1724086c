use camino::{Utf8Path, Utf8PathBuf};
use clap::Args;
use const_format::concatcp;
use serde::{Deserialize, Serialize};
use simple_error::{SimpleResult, bail};
use unwrap::unwrap;

use super::utils::check_required_filename;
use crate::ploidy::{DEFAULT_PLOIDY_ABS_MARGIN, DEFAULT_PLOIDY_REL_MARGIN, PloidyTolerance};
use crate::run_chaining::SETTINGS_FILENAME;

#[derive(Args, Default, Deserialize, Serialize)]
pub struct ChainSettings {
    /// Directory for all chain command output (must not already exist)
    #[arg(long, value_name = "DIR", default_value = concatcp!(env!("CARGO_PKG_NAME"), "_chain_output"))]
    pub output_dir: Utf8PathBuf,

    /// SV clusters to chain, in JSON format
    ///
    /// Each cluster lists its SVs with breakend ploidy estimates, the candidate breakend pairs in
    /// preference order, and optional foldback, complex duplication and assembled adjacency
    /// annotations.
    ///
    #[arg(long = "input", value_name = "FILE")]
    pub input_filename: String,

    /// Two ploidy values differing by no more than this amount are considered equal
    #[arg(long, default_value_t = DEFAULT_PLOIDY_ABS_MARGIN)]
    pub ploidy_abs_margin: f64,

    /// Two ploidy values differing by no more than this fraction of the larger value are
    /// considered equal
    #[arg(long, default_value_t = DEFAULT_PLOIDY_REL_MARGIN)]
    pub ploidy_rel_margin: f64,

    /// Run consistency checks on the assembled chains of each cluster and report any problems
    /// in the output
    #[arg(long)]
    pub check_chains: bool,

    /// Only chain the cluster with this index
    ///
    /// This is intended for debugging a single cluster only.
    ///
    #[arg(hide = true, long)]
    pub target_cluster_index: Option<usize>,
}

impl ChainSettings {
    pub fn tolerance(&self) -> PloidyTolerance {
        PloidyTolerance {
            abs_margin: self.ploidy_abs_margin,
            rel_margin: self.ploidy_rel_margin,
        }
    }
}

pub fn validate_and_fix_chain_settings(settings: ChainSettings) -> SimpleResult<ChainSettings> {
    check_required_filename(&settings.input_filename, "cluster input")?;

    for (value, label) in [
        (settings.ploidy_abs_margin, "--ploidy-abs-margin"),
        (settings.ploidy_rel_margin, "--ploidy-rel-margin"),
    ] {
        if !(value.is_finite() && value >= 0.0) {
            bail!("{label} argument must be a non-negative number");
        }
    }

    if settings.ploidy_rel_margin >= 1.0 {
        bail!("--ploidy-rel-margin argument must be less than 1");
    }

    Ok(settings)
}

pub fn write_chain_settings(output_dir: &Utf8Path, settings: &ChainSettings) {
    use log::info;

    let filename = output_dir.join(SETTINGS_FILENAME);

    info!("Writing chain settings to file: '{filename}'");

    let f = unwrap!(
        std::fs::File::create(&filename),
        "Unable to create chain settings json file: '{filename}'"
    );

    serde_json::to_writer_pretty(&f, &settings).unwrap();
}
