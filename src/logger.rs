//! Logger setup for all program output
//!

use camino::{Utf8Path, Utf8PathBuf};
use log::LevelFilter;
use simple_error::{SimpleResult, bail};

use crate::cli;
use crate::globals::PROGRAM_NAME;
use crate::os_utils::create_dir_all;

fn get_log_level(debug: bool) -> LevelFilter {
    if debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    }
}

/// Log file written in the output directory alongside the chain output
pub fn get_log_filename(output_dir: &Utf8Path) -> Utf8PathBuf {
    output_dir.join(PROGRAM_NAME.to_string() + ".log")
}

/// Log to stderr, and also to the output directory log file if one is given
///
fn setup_logger(output_dir: Option<&Utf8Path>, debug: bool) -> Result<(), fern::InitError> {
    let logger = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{}[{}][{}] {}",
                chrono::Local::now().format("[%Y-%m-%d][%H:%M:%S]"),
                PROGRAM_NAME,
                record.level(),
                message
            ))
        })
        .level(get_log_level(debug))
        .chain(std::io::stderr());

    let logger = match output_dir {
        Some(output_dir) => logger.chain(fern::log_file(get_log_filename(output_dir))?),
        None => logger,
    };

    logger.apply()?;
    Ok(())
}

/// Check that the output path is new, or an existing directory which may be clobbered
///
fn check_output_dir(output_dir: &Utf8Path, clobber: bool) -> SimpleResult<()> {
    if output_dir.exists() && !output_dir.is_dir() {
        bail!("Output directory path exists and is not a directory: \"{output_dir}\"");
    }
    if !clobber {
        cli::check_novel_dirname(output_dir, "Output directory")?;
    }
    Ok(())
}

/// Check and create output directory, then setup logger to write there
///
/// No logger is available yet, so errors follow the pre-logging pattern of the command-line
/// validation methods.
///
pub fn setup_output_dir_and_logger(output_dir: &Utf8Path, clobber: bool, debug: bool) {
    if let Err(msg) = check_output_dir(output_dir, clobber) {
        eprintln!("Invalid command-line setting: {}", msg);
        std::process::exit(exitcode::USAGE);
    };
    create_dir_all(output_dir, "output");
    setup_logger(Some(output_dir), debug).unwrap();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_settings() {
        assert_eq!(get_log_level(true), LevelFilter::Debug);
        assert_eq!(get_log_level(false), LevelFilter::Info);
        assert_eq!(
            get_log_filename(Utf8Path::new("out")).as_str(),
            "out/svchain.log"
        );
    }

    #[test]
    fn test_check_output_dir() {
        let base_dir = std::env::temp_dir().join(format!("svchain_logger_{}", std::process::id()));
        let base_dir = Utf8PathBuf::from_path_buf(base_dir).unwrap();
        std::fs::create_dir_all(&base_dir).unwrap();

        let new_dir = base_dir.join("new");
        assert!(check_output_dir(&new_dir, false).is_ok());

        // An existing directory is only accepted with clobber
        assert!(check_output_dir(&base_dir, false).is_err());
        assert!(check_output_dir(&base_dir, true).is_ok());

        // An existing file is never accepted
        let file_path = base_dir.join("file.txt");
        std::fs::write(&file_path, "x").unwrap();
        assert!(check_output_dir(&file_path, false).is_err());
        assert!(check_output_dir(&file_path, true).is_err());

        std::fs::remove_dir_all(&base_dir).unwrap();
    }
}
