//! Process-wide driver configuration.
//!
//! [`DriverConfig`] is parsed once from the environment at startup and is
//! immutable afterwards. Raw option strings never leave this module: driver
//! keys become typed fields and GlusterFS client options are validated
//! against [`options::VALIDATORS`].

pub mod options;

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::level_filters::LevelFilter;

use crate::constants::{defaults, driver_options, envs, layout};
use crate::errors::{BlockError, BlockResult};
use crate::types::{Bytes, FilenameFormat, Filesystem};

/// GlusterFS connection parameters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GlusterConfig {
    /// Volfile servers, tried in order by the GlusterFS client.
    pub servers: Vec<String>,
    /// Remote volume name.
    pub volume_name: String,
    /// Mount the remote volume once per logical volume instead of once overall.
    pub dedicated_mount: bool,
    /// Validated client options forwarded to `glusterfs`.
    pub options: BTreeMap<String, String>,
    /// Retries after a failed mount attempt.
    pub mount_retries: u32,
    /// Delay before the first retry, doubled after each attempt.
    pub retry_backoff: Duration,
}

impl GlusterConfig {
    pub fn new(servers: Vec<String>, volume_name: impl Into<String>) -> Self {
        Self {
            servers,
            volume_name: volume_name.into(),
            dedicated_mount: false,
            options: BTreeMap::new(),
            mount_retries: defaults::MOUNT_RETRIES,
            retry_backoff: Duration::from_millis(defaults::RETRY_BACKOFF_MS),
        }
    }

    /// `server1,server2:/volume`, used in logs and listings.
    pub fn source(&self) -> String {
        format!("{}:/{}", self.servers.join(","), self.volume_name)
    }
}

/// Defaults applied when create options leave a field unset.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BlockFileDefaults {
    pub filesystem: Filesystem,
    pub size: Bytes,
    pub filename_format: FilenameFormat,
}

/// Log verbosity accepted in `LOGLEVEL`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    #[default]
    Warning,
    Error,
    Critical,
    None,
}

impl LogLevel {
    pub fn as_level_filter(&self) -> LevelFilter {
        match self {
            Self::Trace => LevelFilter::TRACE,
            Self::Debug => LevelFilter::DEBUG,
            Self::Info => LevelFilter::INFO,
            Self::Warning => LevelFilter::WARN,
            // errors are always reported
            Self::Error | Self::Critical | Self::None => LevelFilter::ERROR,
        }
    }
}

impl FromStr for LogLevel {
    type Err = BlockError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TRACE" => Ok(Self::Trace),
            "DEBUG" => Ok(Self::Debug),
            "INFO" => Ok(Self::Info),
            "" | "WARNING" => Ok(Self::Warning),
            "ERROR" => Ok(Self::Error),
            "CRITICAL" => Ok(Self::Critical),
            "NONE" => Ok(Self::None),
            other => Err(BlockError::Config(format!("unknown log level '{other}'"))),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Trace => "TRACE",
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
            Self::Critical => "CRITICAL",
            Self::None => "NONE",
        };
        f.write_str(s)
    }
}

/// Immutable driver configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DriverConfig {
    /// Data root holding the state file and all mount points.
    pub root: PathBuf,
    pub gluster: GlusterConfig,
    pub defaults: BlockFileDefaults,
    pub log_level: LogLevel,
}

impl DriverConfig {
    /// Configuration with default block file settings.
    pub fn new(root: impl Into<PathBuf>, gluster: GlusterConfig) -> Self {
        Self {
            root: root.into(),
            gluster,
            defaults: BlockFileDefaults {
                size: defaults::SIZE,
                ..Default::default()
            },
            log_level: LogLevel::default(),
        }
    }

    /// Build from the process environment with the default data root.
    pub fn from_env() -> BlockResult<Self> {
        Self::from_lookup(layout::DEFAULT_ROOT, |key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup.
    ///
    /// `OPTIONS` holds space separated `key=value` pairs; a bare `key` has an
    /// empty value. Driver keys are consumed here, everything else must be a
    /// known GlusterFS client option.
    pub fn from_lookup<F>(root: impl Into<PathBuf>, lookup: F) -> BlockResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let log_level: LogLevel = lookup(envs::LOGLEVEL).unwrap_or_default().parse()?;

        let servers: Vec<String> = lookup(envs::SERVERS)
            .unwrap_or_default()
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        if servers.is_empty() {
            return Err(BlockError::Config(format!(
                "{} must list at least one server",
                envs::SERVERS
            )));
        }

        let volume_name = lookup(envs::VOLUME_NAME).unwrap_or_default();
        if volume_name.is_empty() || volume_name.contains('/') {
            return Err(BlockError::Config(format!(
                "{} must be a plain GlusterFS volume name, got '{}'",
                envs::VOLUME_NAME,
                volume_name
            )));
        }

        let mut gluster = GlusterConfig::new(servers, volume_name);
        let mut config = Self::new(root, gluster.clone());
        config.log_level = log_level;

        let raw_options = lookup(envs::OPTIONS).unwrap_or_default();
        for option in raw_options.split_whitespace() {
            let (key, value) = option.split_once('=').unwrap_or((option, ""));
            match key {
                driver_options::DEDICATED_MOUNT => gluster.dedicated_mount = true,
                driver_options::FILESYSTEM => {
                    config.defaults.filesystem = value
                        .parse()
                        .map_err(|e| BlockError::Config(format!("{key}: {e}")))?;
                }
                driver_options::FILENAME_FORMAT => {
                    config.defaults.filename_format = FilenameFormat::new(value)
                        .map_err(|e| BlockError::Config(format!("{key}: {e}")))?;
                }
                driver_options::DEFAULT_SIZE => {
                    config.defaults.size = value
                        .parse()
                        .map_err(|e| BlockError::Config(format!("{key}: {e}")))?;
                }
                _ => {
                    options::check_option(key, value)?;
                    gluster.options.insert(key.to_string(), value.to_string());
                }
            }
        }

        config.gluster = gluster;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_minimal_env() {
        let config = DriverConfig::from_lookup(
            "/data",
            lookup(&[("SERVERS", "gfs1,gfs2"), ("VOLUME_NAME", "blocks")]),
        )
        .unwrap();

        assert_eq!(config.root, PathBuf::from("/data"));
        assert_eq!(config.gluster.servers, vec!["gfs1", "gfs2"]);
        assert_eq!(config.gluster.volume_name, "blocks");
        assert!(!config.gluster.dedicated_mount);
        assert_eq!(config.defaults.filesystem, Filesystem::Ext4);
        assert_eq!(config.defaults.size, defaults::SIZE);
        assert_eq!(config.defaults.filename_format, FilenameFormat::default());
        assert_eq!(config.log_level, LogLevel::Warning);
        assert_eq!(config.gluster.source(), "gfs1,gfs2:/blocks");
    }

    #[test]
    fn test_driver_options_are_consumed() {
        let config = DriverConfig::from_lookup(
            "/data",
            lookup(&[
                ("SERVERS", "gfs1 gfs2"),
                ("VOLUME_NAME", "blocks"),
                (
                    "OPTIONS",
                    "dedicated-mount filesystem=xfs default-size=20G filename-format=vol-{name}.raw log-level=INFO read-only",
                ),
                ("LOGLEVEL", "DEBUG"),
            ]),
        )
        .unwrap();

        assert!(config.gluster.dedicated_mount);
        assert_eq!(config.defaults.filesystem, Filesystem::Xfs);
        assert_eq!(config.defaults.size, Bytes::from_gib(20));
        assert_eq!(config.defaults.filename_format.as_str(), "vol-{name}.raw");
        assert_eq!(config.log_level, LogLevel::Debug);

        let keys: Vec<&str> = config.gluster.options.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["log-level", "read-only"]);
    }

    #[test]
    fn test_missing_servers_rejected() {
        let err = DriverConfig::from_lookup("/data", lookup(&[("VOLUME_NAME", "blocks")]))
            .unwrap_err();
        assert!(matches!(err, BlockError::Config(_)));
    }

    #[test]
    fn test_invalid_volume_name_rejected() {
        let err = DriverConfig::from_lookup(
            "/data",
            lookup(&[("SERVERS", "gfs1"), ("VOLUME_NAME", "a/b")]),
        )
        .unwrap_err();
        assert!(matches!(err, BlockError::Config(_)));
    }

    #[test]
    fn test_unknown_option_rejected() {
        let err = DriverConfig::from_lookup(
            "/data",
            lookup(&[
                ("SERVERS", "gfs1"),
                ("VOLUME_NAME", "blocks"),
                ("OPTIONS", "bogus=1"),
            ]),
        )
        .unwrap_err();
        assert!(err.to_string().contains("bogus"));
    }

    #[test]
    fn test_unsupported_default_filesystem_is_config_error() {
        let err = DriverConfig::from_lookup(
            "/data",
            lookup(&[
                ("SERVERS", "gfs1"),
                ("VOLUME_NAME", "blocks"),
                ("OPTIONS", "filesystem=zfs"),
            ]),
        )
        .unwrap_err();
        assert!(matches!(err, BlockError::Config(_)));
    }

    #[test]
    fn test_log_levels() {
        assert_eq!("".parse::<LogLevel>().unwrap(), LogLevel::Warning);
        assert_eq!("NONE".parse::<LogLevel>().unwrap().as_level_filter(), LevelFilter::ERROR);
        assert_eq!("TRACE".parse::<LogLevel>().unwrap().as_level_filter(), LevelFilter::TRACE);
        assert!("verbose".parse::<LogLevel>().is_err());
    }
}
