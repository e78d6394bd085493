//! Command-line surface: a local harness over the same
//! [`crate::runner::Runner`] the HTTP control surface drives.

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "loadbench-cli")]
#[command(version)]
#[command(about = "Three-phase network-load / power-telemetry test-execution engine")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run one Pre → Load → Post cycle against a mock power source and
    /// print the resulting summary.
    RunMock {
        /// Pre-phase duration in seconds.
        #[arg(long, default_value_t = 2)]
        pre_secs: u64,
        /// Load-phase duration in seconds.
        #[arg(long, default_value_t = 4)]
        load_secs: u64,
        /// Post-phase duration in seconds.
        #[arg(long, default_value_t = 2)]
        post_secs: u64,
        /// Sampling interval in seconds.
        #[arg(long, default_value_t = 1)]
        interval_secs: u64,
        /// Drive a single unlimited UDP interface during the Load phase.
        #[arg(long)]
        load: bool,
        /// UDP target address used when `--load` is set.
        #[arg(long, default_value = "127.0.0.1")]
        target_ip: String,
        /// UDP target port used when `--load` is set.
        #[arg(long, default_value_t = 9)]
        target_port: u16,
    },
    /// Start the HTTP/SSE control surface.
    Serve {
        /// Listen address; overridden by `LISTEN_ADDR` if set.
        #[arg(long, default_value = "127.0.0.1:8088")]
        listen: String,
    },
}
