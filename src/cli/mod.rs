//! CLI argument parsing using clap 4.x derive macros

use clap::{Parser, Subcommand};

/// Instrumentation agent for the runtime hub
///
/// Connects an application to a hub over WebSocket, streams call
/// telemetry and answers hub commands (sandboxed code execution,
/// module introspection, function monitoring).
#[derive(Parser, Debug)]
#[command(name = "tracelink")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Log filter, e.g. "info" or "tracelink_core=debug"
    #[arg(long, global = true, default_value = "info")]
    pub log: String,

    /// Configuration file (defaults to the per-user config path)
    #[arg(short, long, global = true)]
    pub config: Option<std::path::PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Connect to the hub and stay resident until interrupted
    Run {
        /// Application name announced at registration
        #[arg(short, long)]
        name: Option<String>,

        /// Hub WebSocket URL (overrides the configured one)
        #[arg(long)]
        hub_url: Option<String>,
    },

    /// Run a snippet through the local sandbox, without a hub
    Exec {
        /// Inline code; mutually exclusive with --file
        #[arg(conflicts_with = "file")]
        code: Option<String>,

        /// Read the snippet from a file
        #[arg(short, long)]
        file: Option<std::path::PathBuf>,

        /// Timeout in seconds
        #[arg(short, long)]
        timeout: Option<u64>,
    },

    /// Print the resolved configuration
    Config,
}
