//! Clap derive structures for the `hapbridge` CLI.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// hapbridge -- publish plugin accessories behind one bridge identity
#[derive(Debug, Parser)]
#[command(
    name = "hapbridge",
    version,
    about = "Run an accessory bridge and inspect its persisted identities",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Config file (defaults to the platform config directory)
    #[arg(long, env = "HAPBRIDGE_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "HAPBRIDGE_OUTPUT",
        default_value = "plain",
        global = true
    )]
    pub output: OutputFormat,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text
    Plain,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
}

// ── Commands ─────────────────────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Publish the configured accessories until interrupted
    Run(RunArgs),

    /// Print the network identity derived for external accessories
    #[command(alias = "derive")]
    DeriveUsername(DeriveArgs),

    /// Show the persisted credential record and identifier cache of an identity
    Inspect(InspectArgs),

    /// Manage the configuration file
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Identity store directory (overrides bridge.storage_path)
    #[arg(long)]
    pub storage: Option<PathBuf>,

    /// Admit accessories persisted by the previous run into the cache
    #[arg(long)]
    pub restore_cached: bool,
}

#[derive(Debug, Args)]
pub struct DeriveArgs {
    /// Bridge username (defaults to bridge.username from the config)
    #[arg(long, short = 'b')]
    pub bridge: Option<String>,

    /// Accessory UUIDs
    #[arg(required = true)]
    pub uuids: Vec<String>,
}

#[derive(Debug, Args)]
pub struct InspectArgs {
    /// Username of the endpoint, e.g. CC:22:3D:E3:CE:30
    pub username: String,

    /// Identity store directory (overrides bridge.storage_path)
    #[arg(long)]
    pub storage: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the config file path
    Path,
    /// Print the effective configuration
    Show,
    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Target shell
    pub shell: clap_complete::Shell,
}
