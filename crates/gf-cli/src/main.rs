//! Geoflow CLI - extract geospatial datasets, transform them in isolated
//! DuckDB units and merge the results into one warehouse

use anyhow::Result;
use clap::Parser;

mod cli;
mod commands;
mod logging;

use cli::{Cli, Commands};
use commands::common::{ExitCode, CONFIG_ERROR};
use commands::{clean, export, ls, render, reset, run, status};

#[tokio::main]
async fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // --help and --version print to stdout and succeed
            let code = if e.use_stderr() { CONFIG_ERROR } else { 0 };
            let _ = e.print();
            std::process::exit(code);
        }
    };

    match logging::init(&cli.global) {
        Ok(Some(path)) => log::info!("Writing logs to {}", path.display()),
        Ok(None) => {}
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(CONFIG_ERROR);
        }
    }

    if let Err(err) = dispatch(&cli).await {
        let code = match err.downcast_ref::<ExitCode>() {
            Some(ec) => ec.0,
            None => {
                eprintln!("Error: {:#}", err);
                CONFIG_ERROR
            }
        };
        std::process::exit(code);
    }
}

async fn dispatch(cli: &Cli) -> Result<()> {
    match &cli.command {
        Commands::Run(args) => run::execute(args, &cli.global).await,
        Commands::Ls(args) => ls::execute(args, &cli.global).await,
        Commands::Render(args) => render::execute(args, &cli.global).await,
        Commands::Status(args) => status::execute(args, &cli.global).await,
        Commands::Reset(args) => reset::execute(args, &cli.global).await,
        Commands::Clean(args) => clean::execute(args, &cli.global).await,
        Commands::Export(args) => export::execute(args, &cli.global).await,
    }
}
