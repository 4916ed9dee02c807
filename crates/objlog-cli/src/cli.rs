use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "objlog",
    about = "Inspect objlog snapshot and journal directories",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Journal configuration file (TOML)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Show the current generation of a store directory
    Status(StatusArgs),
    /// Print the records of a snapshot or journal file
    Dump(DumpArgs),
    /// Check the structure of the current generation
    Audit(AuditArgs),
    /// Print the effective journal configuration
    Config(ConfigArgs),
}

#[derive(Args)]
pub struct StatusArgs {
    pub dir: PathBuf,
}

#[derive(Args)]
pub struct DumpArgs {
    pub file: PathBuf,
    /// Only records whose command tag matches (e.g. `oc`, `ls:ad`)
    #[arg(short, long)]
    pub kind: Option<String>,
}

#[derive(Args)]
pub struct AuditArgs {
    pub dir: PathBuf,
}

#[derive(Args)]
pub struct ConfigArgs {}
