//! Command-line definition and dispatch.

use std::path::PathBuf;

use clap::Parser;
use pox_common::config::PoxConfig;
use pox_common::constants::{ARCHIVE_ENV, BIN_NAME, DEFAULT_ARCHIVE};
use pox_common::types::Encoding;
use pox_runtime::engine::{Engine, Outcome};
use pox_runtime::operation::Operation;

use crate::output;

/// pox: package a program with its shared libraries, then run it from the
/// archive inside a chroot.
#[derive(Parser, Debug)]
#[command(name = BIN_NAME, version, about, long_about = None)]
pub struct Cli {
    /// Verbose diagnostics; keep temporary directories and partial archives.
    #[arg(short, long)]
    pub debug: bool,

    /// Archive to create or run from.
    #[arg(short, long, env = ARCHIVE_ENV, default_value = DEFAULT_ARCHIVE)]
    pub file: PathBuf,

    /// Use a zip archive instead of a squashfs image.
    #[arg(short, long)]
    pub zip: bool,

    /// Create the archive from FILE...
    #[arg(short, long)]
    pub create: bool,

    /// Run PROGRAM [ARGS...] from the archive.
    #[arg(short, long)]
    pub run: bool,

    /// Files to package, or the program followed by its arguments.
    #[arg(value_name = "ARGS", trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,
}

impl Cli {
    /// Engine configuration selected by the flags.
    #[must_use]
    pub fn config(&self) -> PoxConfig {
        PoxConfig::default()
            .debug(self.debug)
            .with_archive(&self.file)
            .with_encoding(Encoding::from_zip_flag(self.zip))
    }
}

/// Runs the operation selected on the command line.
///
/// # Errors
///
/// Returns an error for an invalid mode selection or if the operation fails.
pub fn execute(cli: Cli) -> anyhow::Result<()> {
    let config = cli.config();
    let operation = Operation::select(cli.create, cli.run, cli.args)?;
    let cwd = std::env::current_dir()?;

    let engine = Engine::new(config);
    match engine.execute(&operation, &cwd)? {
        Outcome::Created(archive) => {
            tracing::info!("{}", output::archive_summary(&archive));
        }
        Outcome::Ran(status) => {
            tracing::debug!(%status, "run finished");
        }
    }
    Ok(())
}
