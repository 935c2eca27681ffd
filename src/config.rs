//! Configuration for kgraph, read from a TOML file.
//!
//! Every section is optional; a missing file yields the defaults.
//!
//! ```toml
//! [cache]
//! dir = ".kgraph/cache"
//! build_timeout_secs = 30
//!
//! [data]
//! row_limit = 100
//!
//! [query]
//! engine = "native"
//! fallback_to_embedded = true
//!
//! [native]
//! base_url = "http://localhost:7474"
//! workspace_id = "analytics"
//! ```

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{GraphError, Result};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct KgraphConfig {
    pub cache: CacheConfig,
    pub data: DataConfig,
    pub query: QueryConfig,
    pub native: NativeConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Directory holding persisted cache entries. Relative paths resolve
    /// against the directory the config file lives in.
    pub dir: PathBuf,
    /// Upper bound on a single build, including source I/O.
    pub build_timeout_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(".kgraph/cache"),
            build_timeout_secs: 30,
        }
    }
}

impl CacheConfig {
    pub fn build_timeout(&self) -> Duration {
        Duration::from_secs(self.build_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Rows fetched per table when building the data graph.
    pub row_limit: usize,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self { row_limit: 100 }
    }
}

/// Which query engine the query service dispatches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineSelection {
    #[default]
    Embedded,
    Native,
    /// Neutral results only. For callers that prefer availability.
    Null,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    pub engine: EngineSelection,
    /// Retry on the embedded engine when the native backend is unreachable.
    pub fallback_to_embedded: bool,
    /// Cap on the number of cycles enumerated by `find_cycles`.
    pub max_cycles: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            engine: EngineSelection::Embedded,
            fallback_to_embedded: false,
            max_cycles: 1000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NativeConfig {
    pub base_url: String,
    pub workspace_id: String,
    pub timeout_secs: u64,
}

impl Default for NativeConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:7474".to_string(),
            workspace_id: "default".to_string(),
            timeout_secs: 10,
        }
    }
}

impl KgraphConfig {
    /// Load config from a TOML file. A missing file is not an error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .map_err(|e| GraphError::Config(format!("{}: {}", path.display(), e)))?;
        let mut config = Self::from_toml_str(&raw)?;
        if config.cache.dir.is_relative() {
            if let Some(parent) = path.parent() {
                config.cache.dir = parent.join(&config.cache.dir);
            }
        }
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| GraphError::Config(e.to_string()))
    }
}
