//! sshmux CLI
//!
//! Forwards local TCP ports through one shared SSH connection.

// Use mimalloc as the global allocator for better performance
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "sshmux",
    author,
    version,
    about = "Local TCP port forwarding over one shared SSH connection",
    long_about = "sshmux binds every enabled forward from its config file and carries each \
                  accepted connection over its own channel of a single SSH session.\n\n\
                  The session is opened on first use and closed when the last \
                  forwarded connection ends.",
    propagate_version = true,
    args_conflicts_with_subcommands = true
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    run: commands::run::RunArgs,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            commands::version::run();
            Ok(())
        }
        None => commands::run::run(cli.run).await,
    }
}
