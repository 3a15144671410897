use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

/// Name of the configuration file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "chadmin.toml";

/// Prefix for environment overrides, e.g. `CHADMIN__CLICKHOUSE__URL`.
pub const ENV_PREFIX: &str = "CHADMIN__";

/// Connection settings for the ClickHouse HTTP interface.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClickhouseConfig {
    /// Base URL of the HTTP interface
    pub url: String,
    /// User sent with every query
    pub user: String,
    /// Password for `user`, if any
    #[serde(default)]
    pub password: Option<String>,
    /// Per-operation query timeouts
    #[serde(default)]
    pub timeouts: TimeoutConfig,
}

impl Default for ClickhouseConfig {
    fn default() -> Self {
        Self {
            url: String::from("http://localhost:8123"),
            user: String::from("default"),
            password: None,
            timeouts: TimeoutConfig::default(),
        }
    }
}

/// Timeouts by operation kind. Nothing is retried; a timeout ends the operation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Read-only lookups: presence checks, disk inventory, version, shared ids
    #[serde(with = "humantime_serde")]
    pub query: Duration,
    #[serde(with = "humantime_serde")]
    pub detach_table: Duration,
    #[serde(with = "humantime_serde")]
    pub attach_table: Duration,
    /// `SYSTEM ...` statements such as dropping a replica
    #[serde(with = "humantime_serde")]
    pub system: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            query: Duration::from_secs(60),
            detach_table: Duration::from_secs(300),
            attach_table: Duration::from_secs(300),
            system: Duration::from_secs(300),
        }
    }
}

/// Base paths of the server's on-disk layout.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Server root holding `metadata/`, `data/` and `store/`
    pub clickhouse: PathBuf,
    /// Locally visible mount of the object-storage disk metadata
    pub object_storage: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            clickhouse: PathBuf::from("/var/lib/clickhouse"),
            object_storage: PathBuf::from("/var/lib/clickhouse/disks/object_storage"),
        }
    }
}

impl PathsConfig {
    /// Resolve a path reported by the server. Newer servers report paths relative
    /// to the server root.
    pub fn resolve(&self, reported: impl AsRef<Path>) -> PathBuf {
        let reported = reported.as_ref();
        if reported.is_absolute() {
            reported.to_path_buf()
        } else {
            self.clickhouse.join(reported)
        }
    }
}

/// Settings for physical removal through the external per-disk tool.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DisksConfig {
    /// Remover binary, resolved through `PATH` when not absolute
    pub remover: String,
    /// Server config passed to the remover as the disk configuration handle
    pub config: PathBuf,
    /// Disk-specific configuration handles overriding `config`
    #[serde(default)]
    pub config_overrides: HashMap<String, PathBuf>,
    /// Disks never handed to the remover (cache disks are not supported by it)
    #[serde(default = "default_excluded_disks")]
    pub excluded: Vec<String>,
    /// Invoke the remover even if the target path is not visible locally
    #[serde(default = "default_lenient_missing_paths")]
    pub lenient_missing_paths: bool,
    #[serde(with = "humantime_serde")]
    pub remover_timeout: Duration,
}

fn default_excluded_disks() -> Vec<String> {
    vec![String::from("object_storage_cache")]
}

fn default_lenient_missing_paths() -> bool {
    true
}

impl Default for DisksConfig {
    fn default() -> Self {
        Self {
            remover: String::from("clickhouse-disks"),
            config: PathBuf::from("/etc/clickhouse-server/config.xml"),
            config_overrides: HashMap::new(),
            excluded: default_excluded_disks(),
            lenient_missing_paths: default_lenient_missing_paths(),
            remover_timeout: Duration::from_secs(600),
        }
    }
}

impl DisksConfig {
    /// Configuration handle for the given disk.
    pub fn config_for(&self, disk: &str) -> &Path {
        self.config_overrides
            .get(disk)
            .map(PathBuf::as_path)
            .unwrap_or(self.config.as_path())
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Configuration {
    /// ClickHouse connection used for live-catalog and coordination queries
    pub clickhouse: ClickhouseConfig,
    /// On-disk layout of the server
    pub paths: PathsConfig,
    /// Physical data removal
    pub disks: DisksConfig,
}

impl Configuration {
    /// Defaults, then `chadmin.toml` in the working directory, then `CHADMIN__*` variables.
    pub fn load() -> Result<Self, Box<figment::Error>> {
        Self::figment(Toml::file(DEFAULT_CONFIG_FILE))
            .extract()
            .map_err(Box::new)
    }

    /// Same as [`Configuration::load`] with an explicit file that must exist.
    pub fn load_from_path(path: &Path) -> Result<Self, Box<figment::Error>> {
        if !path.exists() {
            return Err(Box::new(figment::Error::from(format!(
                "configuration file {} does not exist",
                path.display()
            ))));
        }
        Self::figment(Toml::file(path)).extract().map_err(Box::new)
    }

    fn figment(file: figment::providers::Data<Toml>) -> Figment {
        Figment::from(Serialized::defaults(Configuration::default()))
            .merge(file)
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }
}
