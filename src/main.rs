use std::process::ExitCode;

use clap::Parser;

use thumbfe::cli::{self, CliArgs};
use thumbfe::logger;

fn main() -> ExitCode {
    let args = CliArgs::parse();
    logger::init(args.verbose);
    log::info!("ThumbFE {} starting", env!("CARGO_PKG_VERSION"));
    cli::run(args)
}
