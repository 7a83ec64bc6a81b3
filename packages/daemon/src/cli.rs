//! Command-line interface.

use std::path::{Path, PathBuf};
use std::time::Duration;

use actors::{PoolConfig, RunMode};
use clap::{Args, Parser, Subcommand};
use db::DbConfig;
use job_core::JobStatus;
use serde_json::{Map, Value};

#[derive(Parser)]
#[command(name = "jobd")]
#[command(about = "Persistent job queue and worker daemon", version)]
pub struct Cli {
    #[command(flatten)]
    pub store: StoreArgs,

    /// Directory holding the launcher, the entry point and the default store
    /// (default: the directory of this executable)
    #[arg(long, env = "JOBD_INSTALL_DIR", global = true)]
    pub install_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Default store directory under the installation directory.
pub const STORE_DIR: &str = "database";

/// Where the job store lives.
#[derive(Args)]
pub struct StoreArgs {
    /// Store endpoint (rocksdb://path, file://path, mem://)
    /// [default: rocksdb://<install dir>/database]
    #[arg(long, env = "JOBD_DB", global = true)]
    pub db: Option<String>,

    /// Store namespace
    #[arg(long, env = "JOBD_NAMESPACE", default_value = "jobqueue", global = true)]
    pub namespace: String,

    /// Store database name
    #[arg(long, env = "JOBD_DATABASE", default_value = "main", global = true)]
    pub database: String,
}

impl StoreArgs {
    /// Store configuration; without `--db` the store lives on disk next to
    /// the installation.
    pub fn config(&self, install_dir: &Path) -> DbConfig {
        let config = match &self.db {
            Some(endpoint) => DbConfig::endpoint(endpoint),
            None => DbConfig::rocksdb(install_dir.join(STORE_DIR).display().to_string()),
        };
        config
            .with_namespace(&self.namespace)
            .with_database(&self.database)
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the worker pool
    Run(RunArgs),

    /// Create a job and enqueue it
    Submit {
        /// Resource the job concerns
        resource: String,

        /// Action to perform
        action: String,

        /// Payload entry as key=value (repeatable, order is kept)
        #[arg(long = "set", value_parser = parse_pair)]
        set: Vec<(String, String)>,

        /// Payload as a JSON object, applied before --set entries
        #[arg(long)]
        json: Option<String>,
    },

    /// Print a job record as JSON
    Show {
        /// Job id
        id: i64,
    },

    /// Re-enqueue a finished job under a new action
    Requeue {
        /// Job id
        id: i64,

        /// New action
        action: String,
    },

    /// List job records
    List {
        /// Only jobs with this status (processed, started, done, error)
        #[arg(long, value_parser = parse_status)]
        status: Option<JobStatus>,

        /// Maximum number of jobs
        #[arg(long)]
        limit: Option<usize>,
    },
}

#[derive(Args)]
pub struct RunArgs {
    /// Number of workers
    #[arg(long, env = "JOBD_WORKERS", default_value_t = 2)]
    pub workers: usize,

    /// Pause between polls of an empty queue, in milliseconds
    #[arg(long, env = "JOBD_POLL_INTERVAL_MS", default_value_t = 500)]
    pub poll_interval_ms: u64,

    /// Make one pass per worker and exit
    #[arg(long)]
    pub once: bool,
}

impl RunArgs {
    pub fn pool_config(&self) -> PoolConfig {
        let mode = if self.once {
            RunMode::Once
        } else {
            RunMode::Forever {
                poll_interval: Duration::from_millis(self.poll_interval_ms),
            }
        };
        PoolConfig::default()
            .with_workers(self.workers)
            .with_mode(mode)
    }
}

/// Build the ordered payload from `--json` and `--set` flags.
pub fn payload(
    json: Option<&str>,
    set: &[(String, String)],
) -> Result<Map<String, Value>, String> {
    let mut map = match json {
        Some(text) => match serde_json::from_str::<Value>(text) {
            Ok(Value::Object(map)) => map,
            Ok(_) => return Err("--json must be a JSON object".to_string()),
            Err(e) => return Err(format!("--json is not valid JSON: {}", e)),
        },
        None => Map::new(),
    };
    for (key, value) in set {
        map.insert(key.clone(), Value::String(value.clone()));
    }
    Ok(map)
}

fn parse_pair(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got `{}`", s))?;
    if key.is_empty() {
        return Err(format!("empty key in `{}`", s));
    }
    Ok((key.to_string(), value.to_string()))
}

fn parse_status(s: &str) -> Result<JobStatus, String> {
    JobStatus::ALL
        .into_iter()
        .find(|status| status.as_str() == s)
        .ok_or_else(|| format!("unknown status `{}`", s))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_flags_build_pool_config() {
        let cli = Cli::try_parse_from(["jobd", "run", "--workers", "4", "--once"]).unwrap();
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.pool_config(), PoolConfig::once(4));
    }

    #[test]
    fn run_defaults_poll_forever() {
        let cli = Cli::try_parse_from(["jobd", "run"]).unwrap();
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.pool_config(), PoolConfig::default());
    }

    #[test]
    fn store_defaults_to_disk_under_install_dir() {
        let cli = Cli::try_parse_from(["jobd", "list"]).unwrap();
        let config = cli.store.config(Path::new("/opt/dlab"));
        assert_eq!(config.endpoint, "rocksdb:///opt/dlab/database");
        assert!(config.is_durable());
    }

    #[test]
    fn store_flag_overrides_default() {
        let cli = Cli::try_parse_from(["jobd", "list", "--db", "mem://"]).unwrap();
        let config = cli.store.config(Path::new("/opt/dlab"));
        assert_eq!(config.endpoint, "mem://");
        assert!(!config.is_durable());
    }

    #[test]
    fn submit_takes_positional_target() {
        let cli = Cli::try_parse_from([
            "jobd", "submit", "project-a", "deploy", "--set", "size=medium",
        ])
        .unwrap();
        let Commands::Submit {
            resource,
            action,
            set,
            json,
        } = cli.command
        else {
            panic!("expected submit");
        };
        assert_eq!(resource, "project-a");
        assert_eq!(action, "deploy");
        assert_eq!(set, vec![("size".to_string(), "medium".to_string())]);
        assert!(json.is_none());
    }

    #[test]
    fn install_dir_is_global() {
        let cli = Cli::try_parse_from(["jobd", "run", "--install-dir", "/srv/dlab"]).unwrap();
        assert_eq!(cli.install_dir, Some(PathBuf::from("/srv/dlab")));
    }

    #[test]
    fn payload_keeps_flag_order_after_json() {
        let set = vec![
            parse_pair("zone=eu").unwrap(),
            parse_pair("key-name=a=b").unwrap(),
        ];
        let map = payload(Some(r#"{"size":"medium"}"#), &set).unwrap();
        let keys: Vec<&str> = map.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["size", "zone", "key-name"]);
        assert_eq!(map["key-name"], "a=b");
    }

    #[test]
    fn payload_rejects_non_objects() {
        assert!(payload(Some("[1]"), &[]).is_err());
        assert!(payload(Some("{"), &[]).is_err());
        assert!(parse_pair("novalue").is_err());
        assert!(parse_pair("=x").is_err());
    }

    #[test]
    fn status_names_parse() {
        assert_eq!(parse_status("error"), Ok(JobStatus::Error));
        assert!(parse_status("queued").is_err());
    }
}
