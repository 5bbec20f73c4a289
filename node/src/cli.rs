//! # CLI Interface
//!
//! Command-line arguments for `coinpass-node`, built with `clap` derive.
//! Every `run` flag can also be set through a `COINPASS_*` environment
//! variable.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use coinpass_protocol::config::{
    DEFAULT_API_PORT, DEFAULT_METRICS_PORT, SESSION_REAP_INTERVAL, SESSION_TTL,
};
use coinpass_protocol::group::ReselectionPolicy;
use coinpass_protocol::session::SessionConfig;
use coinpass_protocol::ServiceConfig;

use crate::logging::LogFormat;

/// coinpass node.
///
/// Serves the client and group HTTP API, keeps sessions in memory, stores
/// users and groups on disk, and exposes Prometheus metrics.
#[derive(Parser, Debug)]
#[command(
    name = "coinpass-node",
    about = "coinpass HTTP node",
    version,
    propagate_version = true
)]
pub struct CoinpassCli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the node.
    Run(RunArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Directory holding the user and group database.
    ///
    /// Created on first run if it does not exist.
    #[arg(long, short = 'd', env = "COINPASS_DATA_DIR", default_value = "./coinpass-data")]
    pub data_dir: PathBuf,

    /// Port for the HTTP API.
    #[arg(long, env = "COINPASS_API_PORT", default_value_t = DEFAULT_API_PORT)]
    pub api_port: u16,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "COINPASS_METRICS_PORT", default_value_t = DEFAULT_METRICS_PORT)]
    pub metrics_port: u16,

    /// Session lifetime in seconds.
    #[arg(long, env = "COINPASS_SESSION_TTL_SECS", default_value_t = SESSION_TTL.as_secs())]
    pub session_ttl_secs: u64,

    /// Seconds between sweeps of expired sessions.
    #[arg(
        long,
        env = "COINPASS_REAP_INTERVAL_SECS",
        default_value_t = SESSION_REAP_INTERVAL.as_secs(),
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub reap_interval_secs: u64,

    /// Whether the outgoing holder may receive the coin back: `exclude` or
    /// `include`.
    #[arg(long, env = "COINPASS_RESELECTION", default_value = "exclude")]
    pub reselection: ReselectionPolicy,

    /// Log output format.
    #[arg(long, env = "COINPASS_LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,
}

impl RunArgs {
    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            session: SessionConfig {
                ttl: Duration::from_secs(self.session_ttl_secs),
                reap_interval: Duration::from_secs(self.reap_interval_secs),
            },
            reselection: self.reselection,
            ..ServiceConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli_structure() {
        CoinpassCli::command().debug_assert();
    }

    #[test]
    fn run_defaults() {
        let cli = CoinpassCli::try_parse_from(["coinpass-node", "run"]).unwrap();
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.api_port, DEFAULT_API_PORT);
        assert_eq!(args.reselection, ReselectionPolicy::ExcludeOutgoing);

        let config = args.service_config();
        assert_eq!(config.session.ttl, SESSION_TTL);
        assert_eq!(config.session.reap_interval, SESSION_REAP_INTERVAL);
    }

    #[test]
    fn run_overrides() {
        let cli = CoinpassCli::try_parse_from([
            "coinpass-node",
            "run",
            "--session-ttl-secs",
            "60",
            "--reselection",
            "include",
            "--log-format",
            "json",
        ])
        .unwrap();
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.log_format, LogFormat::Json);
        let config = args.service_config();
        assert_eq!(config.session.ttl, Duration::from_secs(60));
        assert_eq!(config.reselection, ReselectionPolicy::IncludeOutgoing);
    }

    #[test]
    fn zero_reap_interval_is_rejected() {
        assert!(CoinpassCli::try_parse_from([
            "coinpass-node",
            "run",
            "--reap-interval-secs",
            "0"
        ])
        .is_err());
    }
}
