use std::process::ExitCode;

use clap::Parser;

use layerfe::cli::{self, CliArgs};
use layerfe::logger;

fn main() -> ExitCode {
    // Initialize session log (overwrites previous session log)
    logger::init();

    let args = CliArgs::parse();
    cli::run(args)
}
