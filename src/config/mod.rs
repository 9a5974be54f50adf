//! Configuration loading and management
//!
//! ```yaml
//! resolver:
//!   max_depth: 3
//!   fan_out: 8
//! resources:
//!   users:
//!     allowed_modes: [read, list]
//!   users.posts:
//!     default_limit: 20
//!     force_total: always
//! ```

use crate::core::error::{ConfigError, GraphResult};
use crate::graph::Conf;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Limits of the projection resolver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Maximum nesting of embedded resources
    pub max_depth: usize,
    /// Maximum concurrent storage fetches per request
    pub fan_out: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_depth: 5,
            fan_out: 16,
        }
    }
}

/// Complete configuration of a resource graph
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    pub resolver: ResolverConfig,

    /// Per-resource configuration keyed by dotted path
    pub resources: IndexMap<String, Conf>,
}

impl GraphConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: &str) -> GraphResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::IoError {
            message: format!("{}: {}", path, e),
        })?;
        Self::parse(&content, path)
    }

    /// Load configuration from a YAML string
    pub fn from_yaml_str(yaml: &str) -> GraphResult<Self> {
        Self::parse(yaml, "<string>")
    }

    fn parse(yaml: &str, file: &str) -> GraphResult<Self> {
        let config: Self = serde_yaml::from_str(yaml).map_err(|e| ConfigError::ParseError {
            file: Some(file.to_string()),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values no graph can run with
    pub fn validate(&self) -> GraphResult<()> {
        if self.resolver.fan_out == 0 {
            return Err(ConfigError::InvalidValue {
                field: "resolver.fan_out".to_string(),
                value: "0".to_string(),
                message: "must be positive".to_string(),
            }
            .into());
        }
        for (path, conf) in &self.resources {
            conf.validate(path)?;
        }
        Ok(())
    }

    /// Configuration of the resource at `path`, or the default one
    pub fn conf_for(&self, path: &str) -> Conf {
        self.resources.get(path).cloned().unwrap_or_default()
    }

    /// Merge several configurations; later ones win per resource and for the resolver
    pub fn merge(configs: Vec<GraphConfig>) -> GraphConfig {
        let mut merged = GraphConfig::default();
        for config in configs {
            merged.resolver = config.resolver;
            for (path, conf) in config.resources {
                merged.resources.insert(path, conf);
            }
        }
        merged
    }
}
