use crate::engine::Menus;
use crate::poll::{PollSettings, DEFAULT_MANUAL_WINDOW, DEFAULT_POLL_INTERVAL};
use anyhow::{bail, Context, Result};
use clap::Parser;
use handover_core::Vocabulary;
use handover_device::{RetryPolicy, DEFAULT_INFO_PROGRAM, DEFAULT_LIST_PROGRAM};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_AGREEMENTS_DIR: &str = "agreements";
pub const DEFAULT_CONFIG_FILE: &str = "handover.toml";

#[derive(Parser, Debug, Default)]
#[command(name = "handover")]
#[command(about = "Match attached tablets to handover agreements", long_about = None)]
pub struct Args {
    /// Directory holding the agreement CSV files
    #[arg(long)]
    pub dir: Option<PathBuf>,
    /// TOML settings file (defaults to ./handover.toml when present)
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Seconds between polling cycles
    #[arg(long)]
    pub poll_interval: Option<u64>,
    /// Seconds to wait for the manual-entry key when no device is attached
    #[arg(long)]
    pub manual_window: Option<u64>,
    /// Serial number queries per device before it is skipped
    #[arg(long)]
    pub retry_attempts: Option<u32>,
    /// Seconds between serial number queries
    #[arg(long)]
    pub retry_delay: Option<u64>,
    /// Also append logs to <log-dir>/handover.log
    #[arg(long)]
    pub log_dir: Option<PathBuf>,
    #[arg(long, default_value_t = false)]
    pub debug: bool,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub agreements_dir: Option<PathBuf>,
    pub poll_interval_secs: Option<u64>,
    pub manual_window_secs: Option<u64>,
    pub retry_attempts: Option<u32>,
    pub retry_delay_secs: Option<u64>,
    pub list_program: Option<String>,
    pub info_program: Option<String>,
    pub log_dir: Option<PathBuf>,
    pub statuses: Option<Vocabulary>,
    pub schools: Option<Vocabulary>,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub agreements_dir: PathBuf,
    pub poll: PollSettings,
    pub retry: RetryPolicy,
    pub list_program: String,
    pub info_program: String,
    pub menus: Menus,
    pub log_dir: Option<PathBuf>,
    pub debug: bool,
}

/// Reads the settings file. An explicitly named file must exist; the
/// default one is optional.
pub fn load_file_config(explicit: Option<&Path>) -> Result<FileConfig> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => {
            let fallback = PathBuf::from(DEFAULT_CONFIG_FILE);
            if !fallback.exists() {
                return Ok(FileConfig::default());
            }
            fallback
        }
    };
    let contents = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    parse_file_config(&contents).with_context(|| format!("Invalid config {}", path.display()))
}

pub fn parse_file_config(contents: &str) -> Result<FileConfig> {
    Ok(toml::from_str(contents)?)
}

impl Settings {
    /// Flags win over the file, the file wins over built-in defaults.
    pub fn resolve(args: &Args, file: FileConfig) -> Result<Self> {
        let statuses = file.statuses.unwrap_or_else(Vocabulary::statuses);
        let schools = file.schools.unwrap_or_else(Vocabulary::schools);
        if statuses.is_empty() {
            bail!("Config lists no statuses");
        }
        if schools.is_empty() {
            bail!("Config lists no schools");
        }

        let secs = |flag: Option<u64>, file: Option<u64>, default: Duration| {
            flag.or(file).map(Duration::from_secs).unwrap_or(default)
        };

        let defaults = RetryPolicy::default();
        Ok(Self {
            agreements_dir: args
                .dir
                .clone()
                .or(file.agreements_dir)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_AGREEMENTS_DIR)),
            poll: PollSettings {
                interval: secs(args.poll_interval, file.poll_interval_secs, DEFAULT_POLL_INTERVAL),
                manual_window: secs(
                    args.manual_window,
                    file.manual_window_secs,
                    DEFAULT_MANUAL_WINDOW,
                ),
            },
            retry: RetryPolicy {
                max_attempts: args
                    .retry_attempts
                    .or(file.retry_attempts)
                    .unwrap_or(defaults.max_attempts),
                delay: secs(args.retry_delay, file.retry_delay_secs, defaults.delay),
            },
            list_program: file
                .list_program
                .unwrap_or_else(|| DEFAULT_LIST_PROGRAM.to_string()),
            info_program: file
                .info_program
                .unwrap_or_else(|| DEFAULT_INFO_PROGRAM.to_string()),
            menus: Menus { statuses, schools },
            log_dir: args.log_dir.clone().or(file.log_dir),
            debug: args.debug,
        })
    }
}
