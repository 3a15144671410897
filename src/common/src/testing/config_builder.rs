//! Test configuration builder for scratch server layouts.

use std::path::Path;
use std::time::Duration;

use crate::config::Configuration;

/// Builder for configurations whose server layout lives in a temporary directory.
#[derive(Debug, Clone)]
pub struct TestConfigBuilder {
    config: Configuration,
}

impl Default for TestConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestConfigBuilder {
    /// Defaults with short timeouts.
    pub fn new() -> Self {
        let mut config = Configuration::default();
        config.clickhouse.timeouts.query = Duration::from_secs(5);
        config.clickhouse.timeouts.detach_table = Duration::from_secs(5);
        config.clickhouse.timeouts.attach_table = Duration::from_secs(5);
        config.clickhouse.timeouts.system = Duration::from_secs(5);
        config.disks.remover_timeout = Duration::from_secs(5);
        Self { config }
    }

    /// Place the server root at `root` and the object-storage mount under it.
    pub fn rooted_at(mut self, root: &Path) -> Self {
        self.config.paths.clickhouse = root.to_path_buf();
        self.config.paths.object_storage = root.join("disks").join("object_storage");
        self
    }

    pub fn lenient_missing_paths(mut self, lenient: bool) -> Self {
        self.config.disks.lenient_missing_paths = lenient;
        self
    }

    pub fn build(self) -> Configuration {
        self.config
    }
}
