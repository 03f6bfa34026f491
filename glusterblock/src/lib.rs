//! GlusterFS block-file volume driver.
//!
//! Each logical volume is a file on a shared GlusterFS volume, formatted
//! with a local filesystem and exposed through a loop device. State survives
//! restarts in a JSON file under the driver root.
//!
//! ```no_run
//! use std::collections::HashMap;
//! use std::sync::Arc;
//!
//! use glusterblock::{DriverConfig, SystemHost, VolumeDriver};
//!
//! # async fn run() -> glusterblock::BlockResult<()> {
//! let config = DriverConfig::from_env()?;
//! let driver = VolumeDriver::open(config, Arc::new(SystemHost)).await?;
//! driver.create("db", &HashMap::new()).await?;
//! let mount_point = driver.mount("db", "container-1").await?;
//! println!("{}", mount_point.display());
//! # Ok(())
//! # }
//! ```

pub mod blockfile;
pub mod config;
pub mod constants;
pub mod driver;
pub mod errors;
pub mod gluster;
pub mod host;
pub mod layout;
pub mod lock;
pub mod logging;
pub mod mounttab;
pub mod state;
pub mod types;
mod util;

pub use blockfile::BlockFileManager;
pub use config::{BlockFileDefaults, DriverConfig, GlusterConfig, LogLevel};
pub use driver::{Capabilities, Scope, VolumeDriver};
pub use errors::{BlockError, BlockResult};
pub use gluster::{SharedMount, SharedMountManager};
pub use host::{CommandOutput, Host, SystemHost};
pub use layout::DriverLayout;
pub use lock::DriverLock;
pub use state::{BlockVolume, StateStore, VolumeMap};
pub use types::{Bytes, FilenameFormat, Filesystem};
pub use util::is_privileged;
