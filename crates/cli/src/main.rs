// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! tend - control client for the tend supervisor

mod client;
mod exit_error;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use client::DaemonClient;
use exit_error::ExitError;
use std::path::PathBuf;
use tend_daemon::{Request, Response};

#[derive(Parser)]
#[command(name = "tend", version, about = "Control the tend supervisor")]
struct Cli {
    /// Daemon control socket
    #[arg(long, global = true, value_name = "PATH", default_value = "/run/tend.sock")]
    socket: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List known jobs with goal, state, and pid
    List,
    /// Start a job
    Start {
        /// Job name
        name: String,
    },
    /// Stop a job
    Stop {
        /// Job name
        name: String,
    },
    /// Show one job's status
    Status {
        /// Job name
        name: String,
    },
    /// Emit an event
    Emit {
        /// Event name
        name: String,
        /// Positional arguments and KEY=VALUE environment
        #[arg(value_name = "ARG")]
        args: Vec<String>,
    },
    /// Reload configuration sources
    Reload,
    /// Check the daemon is alive
    Ping,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        match err.downcast_ref::<ExitError>() {
            Some(exit) => {
                eprintln!("tend: {}", exit.message);
                std::process::exit(exit.code);
            }
            None => {
                eprintln!("tend: {err}");
                std::process::exit(1);
            }
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let client = DaemonClient::connect(&cli.socket).await?;
    match cli.command {
        Commands::List => {
            let response = client.request(Request::List).await?;
            match response {
                Response::Jobs { jobs } => print!("{}", output::render_jobs(&jobs)),
                other => return Err(unexpected(other)),
            }
        }
        Commands::Start { name } => {
            show_job(client.request(Request::Start { name }).await?)?;
        }
        Commands::Stop { name } => {
            show_job(client.request(Request::Stop { name }).await?)?;
        }
        Commands::Status { name } => {
            show_job(client.request(Request::Status { name }).await?)?;
        }
        Commands::Emit { name, args } => {
            let (args, env) = output::split_event_args(args);
            match client.request(Request::Emit { name, args, env }).await? {
                Response::Ok => {}
                other => return Err(unexpected(other)),
            }
        }
        Commands::Reload => match client.request(Request::Reload).await? {
            Response::Ok => {}
            other => return Err(unexpected(other)),
        },
        Commands::Ping => match client.request(Request::Ping).await? {
            Response::Pong { version } => println!("tendd {version}"),
            other => return Err(unexpected(other)),
        },
    }
    Ok(())
}

fn show_job(response: Response) -> Result<()> {
    match response {
        Response::Job { job } => {
            println!("{}", output::render_job(&job));
            Ok(())
        }
        other => Err(unexpected(other)),
    }
}

fn unexpected(response: Response) -> anyhow::Error {
    match response {
        Response::Error { message } => ExitError::new(1, message).into(),
        other => ExitError::new(1, format!("unexpected response: {other:?}")).into(),
    }
}
