//! CLI module for Snowflake
//!
//! Commands operate directly on a store file; no service needs to be running.

pub mod collections;
pub mod context;
pub mod error;
pub mod kv;
pub mod output;
pub mod paths;
pub mod values;

use clap::{Parser, Subcommand};
use context::CliContext;
use std::io::Write;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "snowflake-config",
    version,
    about = "Inspect and edit Snowflake configuration stores"
)]
pub struct Cli {
    /// Enable verbose logging (info/debug to stderr)
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    /// Store file (default: <home>/config.sqlite3)
    #[arg(long, global = true, env = "SNOWFLAKE_STORE")]
    pub store: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show resolved home, store and log locations
    Paths(paths::PathsArgs),
    /// Raw key-value access
    Kv {
        #[command(subcommand)]
        action: kv::KvAction,
    },
    /// Manage configuration collections
    Config {
        #[command(subcommand)]
        action: collections::ConfigAction,
    },
    /// Read or write a single value by id
    Value {
        #[command(subcommand)]
        action: values::ValueAction,
    },
}

/// Execute a parsed command, writing its output to `out`.
pub async fn run(cli: Cli, out: &mut dyn Write) -> anyhow::Result<()> {
    let ctx = CliContext::resolve(cli.store)?;
    run_with(&ctx, cli.command, out).await
}

/// Execute a command against an already resolved context.
pub async fn run_with(ctx: &CliContext, command: Commands, out: &mut dyn Write) -> anyhow::Result<()> {
    match command {
        Commands::Paths(args) => paths::run(ctx, args, out),
        Commands::Kv { action } => kv::run(ctx, action, out).await,
        Commands::Config { action } => collections::run(ctx, action, out).await,
        Commands::Value { action } => values::run(ctx, action, out).await,
    }
}
