use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "streamgauge")]
#[command(author, version, about = "Supervise an external streaming process and expose its telemetry")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP API server
    Start {
        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Check that the stream program and companion tools are available
    CheckTools,

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default search if not specified)
        config: Option<PathBuf>,
    },

    /// List resolution presets
    Presets,

    /// Parse progress lines from stdin and print them as JSON
    ParseLine {
        /// Also print lines that are not progress lines
        #[arg(long)]
        all: bool,
    },

    /// Display version information
    Version,
}
