use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::history::ring::DEFAULT_CAPACITY;
use crate::providers::continuous_pipe::DEFAULT_URL as CONTINUOUS_PIPE_URL;

#[derive(Debug, Parser)]
#[command(name = "kube-status", version, about = "Multi-cluster Kubernetes status poller")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    #[command(flatten)]
    pub config: Config,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Serve the API and record history (default)
    #[default]
    Run,
    /// Serve the API only
    Api,
    /// Record history only
    History,
    /// Take one snapshot of every cluster, save it and exit
    Snapshot,
}

impl Command {
    pub fn serves_api(self) -> bool {
        matches!(self, Command::Run | Command::Api)
    }

    pub fn records_history(self) -> bool {
        matches!(self, Command::Run | Command::History)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ProviderKind {
    InMemory,
    WithinK8s,
    ContinuousPipe,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum HistoryBackend {
    /// Bounded ring buffer, lost on restart
    InMemory,
    /// SQLite document store
    Sqlite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Args)]
pub struct Config {
    /// Where the list of clusters comes from
    #[arg(long, env = "CLUSTER_PROVIDER", value_enum, default_value_t = ProviderKind::InMemory, global = true)]
    pub cluster_provider: ProviderKind,

    /// Where snapshots are kept
    #[arg(long, env = "HISTORY_STORAGE_BACKEND", value_enum, default_value_t = HistoryBackend::InMemory, global = true)]
    pub history_storage_backend: HistoryBackend,

    /// `host:port`, or a URL whose host and port are used
    #[arg(long, env = "KUBE_STATUS_LISTEN_ADDRESS", default_value = "0.0.0.0:8080", global = true)]
    pub listen_address: String,

    /// Minutes between two scheduled snapshots
    #[arg(long, env = "SNAPSHOT_INTERVAL", default_value_t = 5, global = true)]
    pub snapshot_interval: u64,

    /// Hours of history to keep; keep everything when unset
    #[arg(long, env = "ONLY_KEEP_HOURS_OF_HISTORY", global = true)]
    pub keep_hours: Option<u64>,

    /// Minutes between two garbage collections
    #[arg(long, env = "GC_INTERVAL", default_value_t = 5, global = true)]
    pub gc_interval: u64,

    /// Slots of the in-memory history
    #[arg(long, env = "HISTORY_CAPACITY", default_value_t = DEFAULT_CAPACITY, global = true)]
    pub history_capacity: usize,

    #[arg(long, env = "HISTORY_DATABASE_URL", default_value = "sqlite://var/history.db", global = true)]
    pub database_url: String,

    /// Seconds allowed for a whole cluster snapshot
    #[arg(long, env = "FETCH_TIMEOUT", default_value_t = 60, global = true)]
    pub fetch_timeout: u64,

    /// Seconds allowed for a single control-plane call
    #[arg(long, env = "CALL_TIMEOUT", default_value_t = 15, global = true)]
    pub call_timeout: u64,

    /// Verify control-plane TLS certificates
    #[arg(long, env = "VERIFY_TLS", global = true)]
    pub verify_tls: bool,

    /// Dashboard files served for unmatched paths
    #[arg(long, env = "STATIC_DIR", default_value = "./var/static", global = true)]
    pub static_dir: PathBuf,

    /// JSON array of clusters for the in-memory provider
    #[arg(long, env = "CLUSTER_LIST", hide_env_values = true, global = true)]
    pub cluster_list: Option<String>,

    /// YAML clusters file for the in-memory provider
    #[arg(long, env = "CLUSTERS_FILE", global = true)]
    pub clusters_file: Option<PathBuf>,

    #[arg(long, env = "CONTINUOUS_PIPE_URL", default_value = CONTINUOUS_PIPE_URL, global = true)]
    pub continuous_pipe_url: String,

    #[arg(long, env = "CONTINUOUS_PIPE_API_KEY", hide_env_values = true, global = true)]
    pub continuous_pipe_api_key: Option<String>,

    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text, global = true)]
    pub log_format: LogFormat,
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("snapshot interval", self.snapshot_interval),
            ("gc interval", self.gc_interval),
            ("fetch timeout", self.fetch_timeout),
            ("call timeout", self.call_timeout),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(Error::Config(format!("{} must be positive", name)));
            }
        }
        if self.history_capacity == 0 {
            return Err(Error::Config("history capacity must be positive".to_string()));
        }
        if self.keep_hours == Some(0) {
            return Err(Error::Config("hours of history to keep must be positive".to_string()));
        }
        if self.cluster_provider == ProviderKind::InMemory
            && self.cluster_list.is_none()
            && self.clusters_file.is_none()
        {
            return Err(Error::Config(
                "the in-memory provider needs CLUSTER_LIST or --clusters-file".to_string(),
            ));
        }
        self.listen_addr()?;
        Ok(())
    }

    /// Socket address to bind, from either `host:port` or a URL.
    pub fn listen_addr(&self) -> Result<String> {
        let raw = self.listen_address.trim();
        let (scheme, rest) = match raw.split_once("://") {
            Some((scheme, rest)) => (Some(scheme), rest),
            None => (None, raw),
        };
        let authority = rest.split('/').next().unwrap_or_default();
        if authority.is_empty() {
            return Err(Error::Config(format!("invalid listen address {:?}", raw)));
        }

        let has_port = match authority.rsplit_once(':') {
            Some((host, port)) => {
                !port.is_empty() && port.chars().all(|c| c.is_ascii_digit()) && !host.ends_with(':')
            }
            None => false,
        };
        if has_port {
            return Ok(authority.to_string());
        }
        let port = match scheme {
            Some("https") => 443,
            Some(_) => 80,
            None => return Err(Error::Config(format!("listen address {:?} has no port", raw))),
        };
        Ok(format!("{}:{}", authority, port))
    }

    pub fn snapshot_interval(&self) -> Duration {
        Duration::from_secs(self.snapshot_interval * 60)
    }

    pub fn gc_interval(&self) -> Duration {
        Duration::from_secs(self.gc_interval * 60)
    }

    pub fn retention(&self) -> Option<chrono::Duration> {
        self.keep_hours
            .and_then(|h| i64::try_from(h).ok())
            .map(chrono::Duration::hours)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout)
    }
}
