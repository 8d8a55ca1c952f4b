#![warn(clippy::all, rust_2018_idioms)]
#![expect(clippy::print_stdout)] // CLI output goes to stdout

mod cli;

use anyhow::Result;
use clap::Parser as _;

fn main() -> Result<()> {
    flowline::logging::init()?;
    let cli = cli::Cli::parse();
    cli::run_command(cli.command)
}
