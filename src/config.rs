//! Server configuration.
//!
//! Every option can be given on the command line or through the
//! environment; the command line wins.
//!
//! | Flag                   | Environment                  | Default     |
//! |------------------------|------------------------------|-------------|
//! | `--host`               | `RIVULET_HOST`               | `127.0.0.1` |
//! | `-p`, `--port`         | `RIVULET_PORT`               | `6379`      |
//! | `--reaper-interval-ms` | `RIVULET_REAPER_INTERVAL_MS` | `3000`      |
//! | `--log-level`          | `RIVULET_LOG`                | `info`      |

use crate::storage::ExpiryConfig;
use crate::{DEFAULT_HOST, DEFAULT_PORT};
use clap::Parser;
use std::time::Duration;

/// An in-memory, Redis-compatible key-value and stream store
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(name = "rivulet", author, version, about, long_about = None)]
pub struct Config {
    /// Host to bind to
    #[arg(long, env = "RIVULET_HOST", default_value = DEFAULT_HOST)]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, env = "RIVULET_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Milliseconds between background sweeps for expired keys
    #[arg(
        long,
        env = "RIVULET_REAPER_INTERVAL_MS",
        default_value_t = 3000,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub reaper_interval_ms: u64,

    /// Log filter, e.g. `info` or `rivulet=debug`
    #[arg(long, env = "RIVULET_LOG", default_value = "info")]
    pub log_level: String,
}

impl Config {
    /// Returns the bind address as `host:port`.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn expiry(&self) -> ExpiryConfig {
        ExpiryConfig {
            interval: Duration::from_millis(self.reaper_interval_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::try_parse_from(["rivulet"]).unwrap();

        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 6379);
        assert_eq!(config.reaper_interval_ms, 3000);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.bind_address(), "127.0.0.1:6379");
        assert_eq!(config.expiry().interval, Duration::from_secs(3));
    }

    #[test]
    fn test_flags() {
        let config = Config::try_parse_from([
            "rivulet",
            "--host",
            "0.0.0.0",
            "-p",
            "6380",
            "--reaper-interval-ms",
            "250",
            "--log-level",
            "rivulet=debug",
        ])
        .unwrap();

        assert_eq!(config.bind_address(), "0.0.0.0:6380");
        assert_eq!(config.expiry().interval, Duration::from_millis(250));
        assert_eq!(config.log_level, "rivulet=debug");
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(Config::try_parse_from(["rivulet", "--port", "70000"]).is_err());
        assert!(Config::try_parse_from(["rivulet", "--reaper-interval-ms", "0"]).is_err());
        assert!(Config::try_parse_from(["rivulet", "--bogus"]).is_err());
    }
}
