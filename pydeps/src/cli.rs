// pydeps/src/cli.rs
//! Command-line argument structure.
use clap::{ArgAction, Parser, Subcommand};
use pydeps_common::error::Result;
use pydeps_common::Config;

pub mod clean_cache;
pub mod resolve;

use crate::cli::clean_cache::CleanCache;
use crate::cli::resolve::ResolveArgs;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None, name = "pydeps", bin_name = "pydeps")]
#[command(propagate_version = true)]
pub struct CliArgs {
    /// More output; repeat for debug and trace.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Resolve requirements and print the dependency graph as JSON.
    Resolve(ResolveArgs),
    /// Remove cached index pages and artifacts.
    CleanCache(CleanCache),
}

impl Command {
    pub async fn run(&self, config: &Config) -> Result<()> {
        match self {
            Self::Resolve(command) => command.run(config).await,
            Self::CleanCache(command) => command.run(config).await,
        }
    }
}
