#![forbid(unsafe_code)]

mod adapters;
mod app;
mod cli;
mod commands;
mod domain;
mod infrastructure;
mod ports;
#[cfg(test)]
mod testing;

use std::io::IsTerminal;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use colored::Colorize;
use tracing::error;

use app::AppController;
use cli::Cli;
use domain::error::EXIT_GENERIC;

/// Resolves on Ctrl-C. Never resolves if the handler cannot be installed.
async fn ctrl_c() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}

fn runtime() -> anyhow::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start the async runtime")
}

/// Parse the command line, run the command and map the outcome to an exit code.
pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let interactive = !cli.non_interactive && std::io::stdin().is_terminal();

    let runtime = match runtime() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("{} {:#}", "error:".red().bold(), e);
            return ExitCode::from(EXIT_GENERIC);
        }
    };

    let result = runtime.block_on(async {
        let controller = AppController::new(cli.verbose, interactive)?;
        commands::execute(&controller, cli.command, ctrl_c()).await
    });

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, exit_code = e.exit_code(), "Command failed");
            eprintln!("{} {}", "error:".red().bold(), e);
            ExitCode::from(e.exit_code())
        }
    }
}
