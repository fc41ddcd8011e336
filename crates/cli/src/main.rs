// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! cb: run certification test plans locally or on a remote agent

mod client;
mod color;
mod commands;
mod controller;
mod env;
mod exit_error;
mod interaction;
mod output;

use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::{plan, remote, run, session};
use output::OutputFormat;

#[derive(Parser)]
#[command(name = "cb", version, about = "Certification test runner", styles = color::styles())]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(short = 'o', long = "output", global = true, value_enum, default_value_t)]
    output: OutputFormat,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a test plan on this machine
    Run(run::RunArgs),
    /// Drive a test plan on a remote agent
    Remote(remote::RemoteArgs),
    /// Inspect test plans
    Plan(plan::PlanArgs),
    /// Inspect stored sessions
    Session(session::SessionArgs),
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_env("CB_LOG").unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match dispatch(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let code = exit_error::exit_code(&e);
            if code != exit_error::EXIT_FAILURES {
                eprintln!("cb: {e}");
            }
            ExitCode::from(u8::try_from(code).unwrap_or(2))
        }
    }
}

async fn dispatch(cli: Cli) -> Result<()> {
    let format = cli.output;
    match cli.command {
        Commands::Remote(args) => remote::handle(args, format).await,
        Commands::Run(args) => run::handle(args, &env::state_dir()?, format).await,
        Commands::Plan(args) => plan::handle(args.command, &env::state_dir()?, format),
        Commands::Session(args) => session::handle(args.command, &env::state_dir()?, format),
    }
}
