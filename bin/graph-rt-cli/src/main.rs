// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # graph-rt CLI
//!
//! Command-line driver for the graph planning runtime.
//!
//! ## Usage
//! ```text
//! graph-rt template --output block.toml
//! graph-rt inspect block.toml
//! graph-rt run block.toml --steps 4 --queued
//! graph-rt --config runtime.toml run block.toml --workspace-limit 64K
//! ```

mod commands;
mod template;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "graph-rt", version, about = "Operation graph planning runtime")]
struct Cli {
    /// Path to a runtime configuration TOML file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show a graph template's nodes, tensor shapes and workspace layout
    Inspect {
        /// Path to the graph template TOML
        graph: PathBuf,
    },

    /// Build, set up and execute a graph template on the simulated kernel
    Run {
        /// Path to the graph template TOML
        graph: PathBuf,

        /// Number of Setup/Execute steps
        #[arg(short, long, default_value_t = 2)]
        steps: usize,

        /// Override the workspace limit (e.g. "64K", "2G")
        #[arg(long)]
        workspace_limit: Option<String>,

        /// Dispatch launches from a background thread
        #[arg(long)]
        queued: bool,
    },

    /// Print a sample graph template
    Template {
        /// Write the template to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    commands::init_tracing(cli.verbose);

    match cli.command {
        Commands::Inspect { graph } => {
            let config = commands::load_config(cli.config.as_deref())?;
            commands::inspect::execute(&graph, config)
        }
        Commands::Run {
            graph,
            steps,
            workspace_limit,
            queued,
        } => {
            let config = commands::load_config(cli.config.as_deref())?;
            let args = commands::run::RunArgs {
                graph: &graph,
                steps,
                workspace_limit,
                queued,
            };
            commands::run::execute(args, config)
        }
        Commands::Template { output } => commands::template::execute(output),
    }
}
