//! Shared fixtures for glusterblock integration tests.

mod host;

pub use host::FakeHost;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use glusterblock::{Bytes, DriverConfig, GlusterConfig, VolumeDriver};
use tempfile::TempDir;

pub const TEST_SERVERS: &[&str] = &["gluster-1", "gluster-2"];
pub const TEST_VOLUME: &str = "blocks";

/// Driver configuration rooted at `root` with fast retries and small files.
pub fn test_config(root: impl Into<PathBuf>) -> DriverConfig {
    let mut gluster = GlusterConfig::new(
        TEST_SERVERS.iter().map(|s| s.to_string()).collect(),
        TEST_VOLUME,
    );
    gluster.retry_backoff = Duration::from_millis(1);

    let mut config = DriverConfig::new(root, gluster);
    config.defaults.size = Bytes::from_mib(16);
    config
}

/// `key=value` pairs as create options.
pub fn options(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Isolated driver over a [`FakeHost`] with automatic cleanup.
pub struct TestDriver {
    pub driver: VolumeDriver,
    pub host: Arc<FakeHost>,
    pub config: DriverConfig,
    _temp_dir: TempDir, // Dropped after test
}

impl TestDriver {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Driver whose configuration is adjusted by `configure` first.
    pub async fn with_config(configure: impl FnOnce(&mut DriverConfig)) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let mut config = test_config(temp_dir.path().join("data"));
        configure(&mut config);

        let host = Arc::new(FakeHost::new());
        let driver = VolumeDriver::open(config.clone(), host.clone())
            .await
            .expect("Failed to open driver");
        Self {
            driver,
            host,
            config,
            _temp_dir: temp_dir,
        }
    }

    /// Open a fresh driver on the same root and host, as after a restart.
    pub async fn reopen(&mut self) {
        self.driver = self.try_reopen().await.expect("Failed to reopen driver");
    }

    pub async fn try_reopen(&self) -> glusterblock::BlockResult<VolumeDriver> {
        VolumeDriver::open(self.config.clone(), self.host.clone()).await
    }

    pub fn state_file(&self) -> PathBuf {
        self.driver.layout().state_file()
    }
}
