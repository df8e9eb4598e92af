mod cli;
mod commands;
mod config;
mod effects;
mod http;
mod output_store;
mod session;

use clap::Parser;
use stitch_logging::LogDestination;

use cli::{Cli, Command};

pub fn run_app() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let destination = match &cli.log_file {
        Some(path) => LogDestination::Both(path.clone()),
        None => LogDestination::Terminal,
    };
    stitch_logging::initialize(destination, cli.log_level.into());

    let config = config::load_config(cli.config.as_deref())?;
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async move {
        match cli.cmd {
            Command::Serve(args) => commands::serve(config, args).await,
            Command::Stitch(args) => commands::stitch(config, args).await,
        }
    })
}
