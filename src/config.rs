//! Command-line configuration for the proxy server.
//!
//! The listen address, servers, and routing rules live in the config file
//! (see [`switchyard::routing::ConfigFile`]); the CLI selects that file and
//! tunes the ambient pieces around it.
use anyhow::anyhow;
use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(version, about, long_about = None)]
pub struct Config {
    /// The file from which to read servers and routing rules.
    #[arg(short = 'f', long, default_value = "config.json")]
    pub config: PathBuf,

    /// Whether to enable the metrics endpoint.
    #[arg(short = 'm', long, default_value_t = true)]
    pub metrics: bool,

    /// The port on which the metrics server will listen.
    #[arg(long, default_value_t = 9090)]
    pub metrics_port: u16,

    /// The prefix to use for metrics.
    #[arg(long, default_value = "switchyard")]
    pub metrics_prefix: String,

    /// Maximum number of idle HTTP connections to keep alive per upstream
    /// host. Higher values improve throughput when the proxy fronts few
    /// backends under load.
    #[arg(long, default_value_t = switchyard::client::DEFAULT_POOL_MAX_IDLE_PER_HOST)]
    pub pool_max_idle_per_host: usize,

    /// How long (in seconds) to keep idle HTTP connections alive.
    #[arg(long, default_value_t = switchyard::client::DEFAULT_POOL_IDLE_TIMEOUT_SECS)]
    pub pool_idle_timeout_secs: u64,
}

impl Config {
    pub fn validate(self) -> Result<Self, anyhow::Error> {
        if !self.config.exists() {
            return Err(anyhow!(
                "Config file '{}' does not exist",
                self.config.display()
            ));
        }
        Ok(self)
    }
}
