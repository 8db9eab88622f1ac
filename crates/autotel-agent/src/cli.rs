use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "autotel",
    about = "Host telemetry agent: supervises an embedded collector against auto-generated pipeline configuration",
    version
)]
pub struct Cli {
    /// Path to the agent configuration file.
    #[arg(long, short = 'c', env = "CONFIG_PATH", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the agent: discover services, generate config, supervise the
    /// collector. The default when no subcommand is given.
    Run,

    /// One-shot service discovery; prints detected services and exits.
    Discover {
        /// Output format.
        #[arg(long, default_value = "json")]
        output: OutputFormat,
    },

    /// Render the configuration that would be generated for this host.
    Render,

    /// Validate a collector configuration file.
    Validate {
        /// Path to the candidate configuration.
        file: PathBuf,
    },
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Text,
}
