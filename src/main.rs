//! landsatpro CLI entrypoint.
//!
//! Thin wrapper over the `cli` module: parse args, run the pipeline for the
//! main (and optional comparative) period, and exit with the right status.
//! For programmatic use, prefer the library API (`landsatpro::api`).

use clap::Parser;

mod cli;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = cli::CliArgs::parse();
    cli::run(args)
}
