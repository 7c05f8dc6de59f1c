//! Command-line client for the cliphist query API.

use clap::Parser;
use std::process::ExitCode;

use cliphist::cli::{self, Cli};
use cliphist::logging;

fn main() -> ExitCode {
    logging::init_stderr();
    cli::run(Cli::parse())
}
