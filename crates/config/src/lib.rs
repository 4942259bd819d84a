//! Configuration loading for blobfs.
//!
//! Values are layered with [`figment`], later layers overriding earlier ones:
//!
//! 1. Built-in defaults (an in-memory store, 60 second leases).
//! 2. A config file, format chosen by extension (`.toml`, `.yaml`/`.yml`,
//!    `.json`). When no path is given, `<config dir>/blobfs/config.toml` is
//!    used if it exists.
//! 3. Environment variables prefixed with `BLOBFS_`, nested keys separated by
//!    a double underscore (`BLOBFS_STORE__BUCKET=uploads`).
//!
//! ```toml
//! root_marker = "~"
//! copy_timeout_secs = 300
//!
//! [lease]
//! duration_secs = 60
//!
//! [store]
//! type = "s3"
//! bucket = "uploads"
//! prefix = "site"
//! region = "us-west-004"
//! endpoint = "https://s3.us-west-004.backblazeb2.com"
//! key_id = "..."
//! key_secret = "..."
//! ```

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Toml, Yaml};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "BLOBFS_";
const DEFAULT_LEASE_SECS: u64 = 60;
const DEFAULT_ROOT_MARKER: char = '~';

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Which object store the hierarchy lives in.
    pub store: StoreConfig,
    pub lease: LeaseConfig,
    /// Upper bound on a single server-side copy. `None` waits indefinitely.
    pub copy_timeout_secs: Option<u64>,
    /// Leading character(s) meaning "relative to the store root" in virtual
    /// paths, stripped during canonicalization.
    pub root_marker: char,
}
impl Default for Config {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            lease: LeaseConfig::default(),
            copy_timeout_secs: None,
            root_marker: DEFAULT_ROOT_MARKER,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StoreConfig {
    Memory {
        #[serde(default = "default_memory_name")]
        name: String,
    },
    S3(S3Config),
}
impl Default for StoreConfig {
    fn default() -> Self {
        Self::Memory { name: default_memory_name() }
    }
}

#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct S3Config {
    #[serde(default = "default_s3_name")]
    pub name: String,
    pub bucket: String,
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    pub key_id: String,
    pub key_secret: String,
}
// Keep the secret out of logs.
impl fmt::Debug for S3Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Config")
            .field("name", &self.name)
            .field("bucket", &self.bucket)
            .field("prefix", &self.prefix)
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .field("key_id", &self.key_id)
            .field("key_secret", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LeaseConfig {
    /// How long a lease is held before the store lets it expire.
    pub duration_secs: u64,
}
impl Default for LeaseConfig {
    fn default() -> Self {
        Self { duration_secs: DEFAULT_LEASE_SECS }
    }
}
impl LeaseConfig {
    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }
}

fn default_memory_name() -> String {
    "memory".to_string()
}

fn default_s3_name() -> String {
    "s3".to_string()
}

fn default_region() -> String {
    "us-east-1".to_string()
}

impl Config {
    /// Load configuration from `path`, or from the default config file when
    /// `path` is `None`, then apply environment overrides and validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let default_path = Self::default_path().filter(|p| p.is_file());
        let path = match path {
            Some(path) if !path.is_file() => exn::bail!(ErrorKind::Missing(path.to_path_buf())),
            Some(path) => Some(path),
            None => default_path.as_deref(),
        };
        tracing::debug!(path = ?path.map(Path::display), "Loading configuration");
        Self::from_figment(Self::figment(path)?)
    }

    /// Extract and validate a configuration from an already layered
    /// [`Figment`].
    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: Self = figment.extract().or_raise(|| ErrorKind::Load)?;
        config.validate()?;
        Ok(config)
    }

    /// Build the provider stack: optional file, then environment.
    pub fn figment(path: Option<&Path>) -> Result<Figment> {
        let mut figment = Figment::new();
        if let Some(path) = path {
            let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or_default();
            figment = match extension.to_ascii_lowercase().as_str() {
                "toml" => figment.merge(Toml::file(path)),
                "yaml" | "yml" => figment.merge(Yaml::file(path)),
                "json" => figment.merge(Json::file(path)),
                other => exn::bail!(ErrorKind::UnsupportedFormat(other.to_string())),
            };
        }
        Ok(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    /// `<config dir>/blobfs/config.toml` for the current platform.
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "blobfs").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    pub fn validate(&self) -> Result<()> {
        if self.lease.duration_secs == 0 {
            exn::bail!(ErrorKind::Invalid { field: "lease.duration_secs", reason: "must be greater than zero" });
        }
        if self.copy_timeout_secs == Some(0) {
            exn::bail!(ErrorKind::Invalid { field: "copy_timeout_secs", reason: "must be greater than zero" });
        }
        if self.root_marker == '/' {
            exn::bail!(ErrorKind::Invalid { field: "root_marker", reason: "cannot be the path delimiter" });
        }
        if let StoreConfig::S3(s3) = &self.store
            && s3.bucket.trim().is_empty()
        {
            exn::bail!(ErrorKind::Invalid { field: "store.bucket", reason: "cannot be empty" });
        }
        Ok(())
    }

    pub fn copy_timeout(&self) -> Option<Duration> {
        self.copy_timeout_secs.map(Duration::from_secs)
    }
}
