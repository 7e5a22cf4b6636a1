//! Peer statistics maintenance tool.

mod cli;
mod logging;

use clap::Parser;

fn main() -> eyre::Result<()> {
    let cli = cli::Cli::parse();
    logging::init_logging(&cli.log)?;
    cli::run(cli)
}
