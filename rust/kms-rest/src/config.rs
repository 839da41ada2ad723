//! Command line and environment configuration of the `start` command.

use std::{net::ToSocketAddrs, path::PathBuf};

use clap::{Args, Parser, Subcommand};
use tracing::Level;

/// Environment variable consulted when `--host-url` is not given.
pub const HOST_URL_ENV_KEY: &str = "KMS_REST_HOST_URL";
/// Environment variable consulted when `--storage-path` is not given.
pub const STORAGE_PATH_ENV_KEY: &str = "KMS_REST_STORAGE_PATH";
/// Environment variable consulted when `--log-level` is not given.
pub const LOG_LEVEL_ENV_KEY: &str = "KMS_REST_LOG_LEVEL";

/// Command line of the `kms-rest` binary.
#[derive(Debug, Parser)]
#[command(name = "kms-rest")]
#[command(bin_name = "kms-rest")]
#[command(about = "Key-management service with capability-authorized HTTP API", long_about = None)]
pub struct KmsRestCli {
    /// The command to run
    #[command(subcommand)]
    pub command: Command,
}

/// Commands of the `kms-rest` binary.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the KMS REST server
    Start(StartArgs),
}

/// Arguments of `kms-rest start`.
#[derive(Debug, Clone, Default, Args)]
pub struct StartArgs {
    /// URL to run the kms-rest instance on, in the form host:port. Falls back
    /// to KMS_REST_HOST_URL.
    #[arg(short = 'u', long)]
    pub host_url: Option<String>,

    /// Directory for persisted stores; in-memory storage when unset. Falls
    /// back to KMS_REST_STORAGE_PATH.
    #[arg(long)]
    pub storage_path: Option<PathBuf>,

    /// Log level (error, warn, info, debug or trace). Falls back to
    /// KMS_REST_LOG_LEVEL, then to info.
    #[arg(long)]
    pub log_level: Option<String>,
}

/// Errors resolving the server configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// `--host-url` was given an empty value
    #[error("host-url value is empty")]
    EmptyHostUrlFlag,

    /// KMS_REST_HOST_URL is set but empty
    #[error("KMS_REST_HOST_URL value is empty")]
    EmptyHostUrlEnv,

    /// No listen address was configured
    #[error(
        "Neither host-url (command line flag) nor KMS_REST_HOST_URL (environment variable) have been set."
    )]
    MissingHostUrl,

    /// The listen address does not resolve to a socket address
    #[error("address {address}: {reason}")]
    InvalidAddress {
        /// The rejected address
        address: String,
        /// Why it was rejected
        reason: String,
    },

    /// The log level is not one of the known levels
    #[error("invalid log level '{0}'")]
    InvalidLogLevel(String),
}

/// Resolved configuration of a server instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Listen address, `host:port`
    pub host_url: String,
    /// Root directory of file-system storage, if any
    pub storage_path: Option<PathBuf>,
    /// Maximum level of emitted log events
    pub log_level: Level,
}

impl StartArgs {
    /// Resolve the configuration, consulting `env` for values missing from
    /// the command line.
    pub fn resolve<Env>(self, env: Env) -> Result<Config, ConfigError>
    where
        Env: Fn(&str) -> Option<String>,
    {
        let host_url = match self.host_url {
            Some(host_url) if host_url.is_empty() => return Err(ConfigError::EmptyHostUrlFlag),
            Some(host_url) => host_url,
            None => match env(HOST_URL_ENV_KEY) {
                Some(host_url) if host_url.is_empty() => return Err(ConfigError::EmptyHostUrlEnv),
                Some(host_url) => host_url,
                None => return Err(ConfigError::MissingHostUrl),
            },
        };
        validate_address(&host_url)?;

        let storage_path = self
            .storage_path
            .or_else(|| env(STORAGE_PATH_ENV_KEY).filter(|path| !path.is_empty()).map(PathBuf::from));

        let log_level = match self.log_level.or_else(|| env(LOG_LEVEL_ENV_KEY)) {
            Some(level) => level
                .parse()
                .map_err(|_| ConfigError::InvalidLogLevel(level))?,
            None => Level::INFO,
        };

        Ok(Config {
            host_url,
            storage_path,
            log_level,
        })
    }
}

/// Reads a variable from the process environment.
pub fn process_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

fn validate_address(address: &str) -> Result<(), ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidAddress {
        address: address.to_string(),
        reason: reason.to_string(),
    };

    let (_, port) = address
        .rsplit_once(':')
        .ok_or_else(|| invalid("missing port in address"))?;
    port.parse::<u16>()
        .map_err(|_| invalid("invalid port in address"))?;

    let mut resolved = address
        .to_socket_addrs()
        .map_err(|error| invalid(&error.to_string()))?;
    if resolved.next().is_none() {
        return Err(invalid("no addresses resolved"));
    }

    Ok(())
}
