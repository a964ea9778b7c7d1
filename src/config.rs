//! Command line and environment configuration

use std::net::{AddrParseError, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use thiserror::Error;

use storefront_driver::HelmConfig;
use storefront_provisioner::StoreUrlTemplate;

/// Database path that selects the non-durable in-memory catalog
pub const IN_MEMORY_DATABASE: &str = ":memory:";

/// Storefront - per-tenant store provisioning on a shared Kubernetes cluster
#[derive(Parser, Debug, Clone)]
#[command(name = "storefront", version, about, long_about = None)]
pub struct Cli {
    /// Address the HTTP API listens on
    #[arg(long, env = "STOREFRONT_LISTEN", default_value = "0.0.0.0:3001")]
    pub listen: String,

    /// SQLite database file; `:memory:` keeps records in process only
    #[arg(long, env = "STOREFRONT_DATABASE", default_value = "stores.db")]
    pub database: String,

    /// Helm executable
    #[arg(long, env = "STOREFRONT_HELM_BIN", default_value = "helm")]
    pub helm_bin: PathBuf,

    /// Chart reference installed for every store
    #[arg(long, env = "STOREFRONT_CHART")]
    pub chart: String,

    /// Namespace holding helm release metadata
    #[arg(long, env = "STOREFRONT_RELEASE_NAMESPACE", default_value = "default")]
    pub release_namespace: String,

    /// Kubeconfig for both helm and the API client; in-cluster or default
    /// discovery when unset
    #[arg(long, env = "STOREFRONT_KUBECONFIG")]
    pub kubeconfig: Option<PathBuf>,

    /// Upper bound on any single helm invocation, in seconds
    #[arg(long, env = "STOREFRONT_HELM_TIMEOUT_SECS", default_value_t = 600)]
    pub helm_timeout_secs: u64,

    /// Mark an install `Failed` if it runs longer than this many seconds
    #[arg(long, env = "STOREFRONT_INSTALL_TIMEOUT_SECS")]
    pub install_timeout_secs: Option<u64>,

    /// Reconcile `Provisioning` stores in the background every this many
    /// seconds
    #[arg(long, env = "STOREFRONT_RECONCILE_INTERVAL_SECS")]
    pub reconcile_interval_secs: Option<u64>,

    /// Public URL of a ready store; `{namespace}` is substituted
    #[arg(
        long,
        env = "STOREFRONT_STORE_URL_TEMPLATE",
        default_value = "http://localhost:8080"
    )]
    pub store_url_template: String,

    /// Log output format
    #[arg(long, env = "STOREFRONT_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human readable lines
    Text,
    /// One JSON object per event
    Json,
}

/// Where store records live
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogLocation {
    /// In process; lost on restart
    Memory,
    /// SQLite database file
    File(PathBuf),
}

/// Errors from validating the command line
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Listen address did not parse
    #[error("invalid listen address '{value}': {source}")]
    InvalidListen {
        /// The rejected value
        value: String,
        /// Parse failure
        source: AddrParseError,
    },

    /// A duration flag was zero
    #[error("{flag} must be greater than zero")]
    ZeroDuration {
        /// The offending flag
        flag: &'static str,
    },

    /// A required string was blank
    #[error("{flag} must not be empty")]
    Empty {
        /// The offending flag
        flag: &'static str,
    },
}

/// Validated runtime configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP listen address
    pub listen: SocketAddr,
    /// Catalog backend
    pub catalog: CatalogLocation,
    /// Helm driver settings
    pub helm: HelmConfig,
    /// Supervising install timeout
    pub install_timeout: Option<Duration>,
    /// Background reconcile interval
    pub reconcile_interval: Option<Duration>,
    /// Store URL template
    pub store_urls: StoreUrlTemplate,
    /// Log output format
    pub log_format: LogFormat,
}

fn positive_secs(flag: &'static str, secs: u64) -> Result<Duration, ConfigError> {
    if secs == 0 {
        return Err(ConfigError::ZeroDuration { flag });
    }
    Ok(Duration::from_secs(secs))
}

fn non_empty(flag: &'static str, value: String) -> Result<String, ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::Empty { flag });
    }
    Ok(value)
}

impl TryFrom<Cli> for Config {
    type Error = ConfigError;

    fn try_from(cli: Cli) -> Result<Self, Self::Error> {
        let listen = cli
            .listen
            .parse()
            .map_err(|source| ConfigError::InvalidListen {
                value: cli.listen.clone(),
                source,
            })?;

        let database = non_empty("--database", cli.database)?;
        let catalog = if database == IN_MEMORY_DATABASE {
            CatalogLocation::Memory
        } else {
            CatalogLocation::File(PathBuf::from(database))
        };

        let helm = HelmConfig {
            binary: cli.helm_bin,
            chart: non_empty("--chart", cli.chart)?,
            release_namespace: non_empty("--release-namespace", cli.release_namespace)?,
            kubeconfig: cli.kubeconfig,
            command_timeout: positive_secs("--helm-timeout-secs", cli.helm_timeout_secs)?,
        };

        let install_timeout = cli
            .install_timeout_secs
            .map(|s| positive_secs("--install-timeout-secs", s))
            .transpose()?;
        let reconcile_interval = cli
            .reconcile_interval_secs
            .map(|s| positive_secs("--reconcile-interval-secs", s))
            .transpose()?;

        Ok(Self {
            listen,
            catalog,
            helm,
            install_timeout,
            reconcile_interval,
            store_urls: StoreUrlTemplate::new(cli.store_url_template),
            log_format: cli.log_format,
        })
    }
}
