use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use glusterblock::constants::{envs, layout};
use glusterblock::{DriverConfig, DriverLock, LogLevel, SystemHost, VolumeDriver};

use crate::commands::{
    create::CreateArgs, inspect::InspectArgs, list::ListArgs, mount::MountArgs, path::PathArgs,
    reconcile::ReconcileArgs, rm::RmArgs, unmount::UnmountArgs,
};

#[derive(Parser, Debug)]
#[command(
    name = "glusterblock",
    version,
    about = "Manage GlusterFS block-file volumes",
    propagate_version = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalFlags,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a volume
    Create(CreateArgs),

    /// Remove one or more volumes
    Rm(RmArgs),

    /// Mount a volume and print its mount point
    Mount(MountArgs),

    /// Release one mount of a volume
    Unmount(UnmountArgs),

    /// Print the mount point of a mounted volume
    Path(PathArgs),

    /// Display detailed information on one or more volumes
    Inspect(InspectArgs),

    /// List volumes
    #[command(visible_alias = "ls")]
    List(ListArgs),

    /// Repair drift between recorded and live volume state
    Reconcile(ReconcileArgs),
}

/// Connection and root settings shared by every command.
#[derive(Args, Debug, Clone)]
pub struct GlobalFlags {
    /// Driver data root holding the state file and mount points
    #[arg(long, global = true, env = "GLUSTERBLOCK_ROOT", default_value = layout::DEFAULT_ROOT)]
    pub root: PathBuf,

    /// GlusterFS volfile servers, comma separated
    #[arg(long, global = true, env = envs::SERVERS)]
    pub servers: Option<String>,

    /// Remote GlusterFS volume holding the backing files
    #[arg(long, global = true, env = envs::VOLUME_NAME)]
    pub volume_name: Option<String>,

    /// Space separated key=value driver and GlusterFS client options
    #[arg(long, global = true, env = envs::OPTIONS)]
    pub options: Option<String>,

    /// TRACE, DEBUG, INFO, WARNING, ERROR, CRITICAL or NONE
    #[arg(long, global = true, env = envs::LOGLEVEL)]
    pub log_level: Option<String>,
}

/// An opened driver holding the root lock for its lifetime.
pub struct Session {
    pub driver: VolumeDriver,
    _lock: DriverLock,
}

impl GlobalFlags {
    /// Log level for the subscriber; invalid values are reported later by
    /// [`Self::config`].
    pub fn log_level(&self) -> LogLevel {
        self.log_level
            .as_deref()
            .and_then(|level| level.parse().ok())
            .unwrap_or_default()
    }

    pub fn config(&self) -> anyhow::Result<DriverConfig> {
        let config = DriverConfig::from_lookup(&self.root, |key| match key {
            envs::SERVERS => self.servers.clone(),
            envs::VOLUME_NAME => self.volume_name.clone(),
            envs::OPTIONS => self.options.clone(),
            envs::LOGLEVEL => self.log_level.clone(),
            _ => None,
        })?;
        Ok(config)
    }

    /// Lock the root and open the driver on the real host.
    pub async fn open(&self) -> anyhow::Result<Session> {
        let config = self.config()?;
        let lock = DriverLock::acquire(&config.root)?;
        let driver = VolumeDriver::open(config, Arc::new(SystemHost)).await?;
        tracing::debug!(lock_path = %lock.path().display(), "Opened driver session");
        Ok(Session {
            driver,
            _lock: lock,
        })
    }
}

impl Session {
    /// Release idle shared mounts before the lock is dropped.
    pub async fn close(self) -> anyhow::Result<()> {
        self.driver.shutdown().await?;
        Ok(())
    }
}

/// Parse a `key=value` pair; a bare `key` has an empty value.
pub fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s.split_once('=').unwrap_or((s, ""));
    if key.is_empty() {
        return Err(format!("invalid option '{s}': missing key"));
    }
    Ok((key.to_string(), value.to_string()))
}
