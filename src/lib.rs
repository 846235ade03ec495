#![deny(clippy::disallowed_methods)]

pub mod app_home;
pub mod batch;
pub mod cache;
pub mod cli;
pub mod history;
pub mod model;
pub mod pipeline;
pub mod remote;
pub mod staging;
pub mod tagging;
pub mod telemetry;
pub mod tracing;
pub mod transform;

use crate::cli::Cli;
use clap::CommandFactory;
use clap::FromArgMatches;

pub fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    let cli = Cli::command();
    let cli = Cli::from_arg_matches(&cli.get_matches())?;

    crate::tracing::init_tracing(
        cli.global_args.log_level(),
        cli.global_args.json_log_behaviour(),
    )?;

    cli.invoke()?;
    Ok(())
}
