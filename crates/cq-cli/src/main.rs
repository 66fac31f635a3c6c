//! caseql CLI - plan and materialize derived event-log columns and answer questions over them

use anyhow::Result;
use clap::Parser;

mod cli;
mod commands;

use cli::Cli;
use commands::{columns, plan, query, run};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.global.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp(None)
        .init();

    match &cli.command {
        cli::Commands::Plan(args) => plan::execute(args, &cli.global).await,
        cli::Commands::Columns(args) => columns::execute(args, &cli.global).await,
        cli::Commands::Query(args) => query::execute(args, &cli.global).await,
        cli::Commands::Run(args) => run::execute(args, &cli.global).await,
    }
}
