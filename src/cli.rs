use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;

#[derive(Parser)]
#[command(name = "freckles")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Apply layered configuration to your machine", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Resolve configuration sources and execute the resulting tasks
    Apply(ApplyArgs),

    /// Print the resolved configuration leaves
    PrintConfig(PrintConfigArgs),

    /// Show what a handler makes of its leaves, without executing anything
    Debug(DebugArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Configuration sources: files, URLs, `gh:` locations or inline YAML
#[derive(Args)]
pub struct SourceArgs {
    #[arg(required = true, value_name = "SOURCE")]
    pub sources: Vec<String>,
}

#[derive(Args)]
pub struct ApplyArgs {
    #[command(flatten)]
    pub sources: SourceArgs,

    /// Show every engine event and all task output
    #[arg(long)]
    pub details: bool,
}

#[derive(Args)]
pub struct PrintConfigArgs {
    #[command(flatten)]
    pub sources: SourceArgs,

    /// Show the per-level layers instead of merged aspects
    #[arg(long)]
    pub raw: bool,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Yaml)]
    pub format: OutputFormat,
}

#[derive(Args)]
pub struct DebugArgs {
    /// Handler to trace (e.g. install, stow, task)
    pub handler: String,

    #[command(flatten)]
    pub sources: SourceArgs,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Yaml,
    Json,
}
