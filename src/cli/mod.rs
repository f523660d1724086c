mod chain;
mod shared;
mod utils;

use camino::Utf8Path;
use clap::{Parser, Subcommand};
use simple_error::{SimpleResult, bail};

use self::chain::validate_and_fix_chain_settings;
pub use self::chain::{ChainSettings, write_chain_settings};
use self::shared::validate_and_fix_shared_settings;
pub use self::shared::SharedSettings;

#[derive(Subcommand)]
pub enum Commands {
    /// Assemble derivative chromosome chains from the breakend pairs of each SV cluster
    Chain(ChainSettings),
}

#[derive(Parser)]
#[command(
    author,
    version,
    about,
    help_template = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}"
)]
#[clap(propagate_version = true, rename_all = "kebab_case")]
pub struct Settings {
    #[command(flatten)]
    pub shared: SharedSettings,

    #[command(subcommand)]
    pub command: Commands,
}

impl Settings {
    pub fn get_output_dir(&self) -> &Utf8Path {
        match &self.command {
            Commands::Chain(x) => &x.output_dir,
        }
    }
}

/// Checks if a directory does not exist
///
pub fn check_novel_dirname(dirname: &Utf8Path, label: &str) -> SimpleResult<()> {
    if dirname.exists() {
        bail!("{} already exists: \"{}\"", label, dirname);
    }
    Ok(())
}

/// Validate settings and update parameters that can't be processed by clap
///
fn validate_and_fix_settings_impl(mut settings: Settings) -> SimpleResult<Settings> {
    settings.shared = validate_and_fix_shared_settings(settings.shared)?;

    settings.command = match settings.command {
        Commands::Chain(x) => {
            let x = validate_and_fix_chain_settings(x)?;
            Commands::Chain(x)
        }
    };

    Ok(settings)
}

/// Validate settings and update to parameters that can't be processed automatically by clap.
///
/// Assumes no logger has been configured yet
///
pub fn validate_and_fix_settings(settings: Settings) -> Settings {
    match validate_and_fix_settings_impl(settings) {
        Ok(x) => x,
        Err(msg) => {
            eprintln!("Invalid command-line setting: {}", msg);
            std::process::exit(exitcode::USAGE);
        }
    }
}

pub fn parse_settings() -> Settings {
    Settings::parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Settings::command().debug_assert();
    }

    #[test]
    fn test_parse_chain_args() {
        let settings = Settings::try_parse_from([
            "svchain",
            "chain",
            "--input",
            "clusters.json",
            "--ploidy-abs-margin",
            "0.3",
            "--threads",
            "2",
        ])
        .unwrap();
        assert_eq!(settings.get_output_dir().as_str(), "svchain_chain_output");
        let Commands::Chain(x) = &settings.command;
        assert_eq!(x.input_filename, "clusters.json");
        approx::assert_ulps_eq!(x.ploidy_abs_margin, 0.3);
        assert!(!x.check_chains);
    }
}
