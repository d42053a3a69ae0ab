//! Agent configuration: defaults, then environment variables, then CLI flags.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_SERVER: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 35601;
pub const DEFAULT_USER: &str = "USER";
pub const DEFAULT_PASSWORD: &str = "PASSWORD";
pub const DEFAULT_INTERVAL_SECS: u64 = 1;
pub const DEFAULT_PROCFS: &str = "/proc";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub server: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Seconds between reports, at least 1.
    pub interval_secs: u64,
    pub procfs_path: PathBuf,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0}")]
    Help(String),
    #[error("invalid port '{0}'")]
    InvalidPort(String),
    #[error("invalid interval '{0}': expected whole seconds >= 1")]
    InvalidInterval(String),
    #[error("missing value for {0}")]
    MissingValue(String),
    #[error("unexpected argument '{0}'")]
    UnexpectedArgument(String),
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: DEFAULT_SERVER.into(),
            port: DEFAULT_PORT,
            username: DEFAULT_USER.into(),
            password: DEFAULT_PASSWORD.into(),
            interval_secs: DEFAULT_INTERVAL_SECS,
            procfs_path: PathBuf::from(DEFAULT_PROCFS),
        }
    }
}

impl Config {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn from_process() -> Result<Self, ConfigError> {
        Self::resolve(|k| std::env::var(k).ok(), std::env::args())
    }

    /// Build a config from an environment lookup and an argv-style iterator
    /// (first item is the program name).
    pub fn resolve<E, I>(env: E, args: I) -> Result<Self, ConfigError>
    where
        E: Fn(&str) -> Option<String>,
        I: IntoIterator<Item = String>,
    {
        let mut cfg = Config::default();
        if let Some(v) = env("SERVER") {
            cfg.server = v;
        }
        if let Some(v) = env("PORT") {
            cfg.port = parse_port(&v)?;
        }
        if let Some(v) = env("USERNAME") {
            cfg.username = v;
        }
        if let Some(v) = env("PASSWORD") {
            cfg.password = v;
        }
        if let Some(v) = env("INTERVAL") {
            cfg.interval_secs = parse_interval(&v)?;
        }
        if let Some(v) = env("PROCFS_PATH") {
            cfg.procfs_path = PathBuf::from(v);
        }
        cfg.apply_args(args)?;
        Ok(cfg)
    }

    fn apply_args<I: IntoIterator<Item = String>>(&mut self, args: I) -> Result<(), ConfigError> {
        let mut it = args.into_iter();
        let prog = it.next().unwrap_or_else(|| "statline_agent".into());
        while let Some(arg) = it.next() {
            // --flag=value and --flag value are both accepted
            let (flag, inline) = match arg.split_once('=') {
                Some((f, v)) if f.starts_with("--") => (f.to_string(), Some(v.to_string())),
                _ => (arg.clone(), None),
            };
            let mut value = |name: &str| -> Result<String, ConfigError> {
                inline
                    .clone()
                    .or_else(|| it.next())
                    .ok_or_else(|| ConfigError::MissingValue(name.to_string()))
            };
            match flag.as_str() {
                "-h" | "--help" => return Err(ConfigError::Help(usage(&prog))),
                "--server" | "-s" => self.server = value("--server")?,
                "--port" | "-p" => self.port = parse_port(&value("--port")?)?,
                "--user" | "-u" => self.username = value("--user")?,
                "--password" => self.password = value("--password")?,
                "--interval" | "-i" => self.interval_secs = parse_interval(&value("--interval")?)?,
                "--procfs" => self.procfs_path = PathBuf::from(value("--procfs")?),
                _ => return Err(ConfigError::UnexpectedArgument(arg)),
            }
        }
        Ok(())
    }
}

pub fn usage(prog: &str) -> String {
    format!(
        "Usage: {prog} [--server HOST|-s HOST] [--port PORT|-p PORT] [--user NAME|-u NAME] \
         [--password SECRET] [--interval SECS|-i SECS] [--procfs PATH]\n\
         Environment: SERVER, PORT, USERNAME, PASSWORD, INTERVAL, PROCFS_PATH"
    )
}

fn parse_port(s: &str) -> Result<u16, ConfigError> {
    s.trim()
        .parse::<u16>()
        .map_err(|_| ConfigError::InvalidPort(s.to_string()))
}

fn parse_interval(s: &str) -> Result<u64, ConfigError> {
    match s.trim().parse::<u64>() {
        Ok(v) if v >= 1 => Ok(v),
        _ => Err(ConfigError::InvalidInterval(s.to_string())),
    }
}
