//! Per-resource configuration: allowed modes, pagination and totals

use crate::core::error::{ConfigError, GraphResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Operation a resource may allow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Create,
    Read,
    Update,
    Replace,
    Delete,
    List,
    Clear,
}

impl Mode {
    pub const ALL: [Mode; 7] = [
        Mode::Create,
        Mode::Read,
        Mode::Update,
        Mode::Replace,
        Mode::Delete,
        Mode::List,
        Mode::Clear,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Create => "create",
            Mode::Read => "read",
            Mode::Update => "update",
            Mode::Replace => "replace",
            Mode::Delete => "delete",
            Mode::List => "list",
            Mode::Clear => "clear",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// When a list response computes the total item count
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TotalPolicy {
    /// Only when the request asks for it
    #[default]
    Optional,
    Always,
    Never,
}

impl TotalPolicy {
    pub fn wants_total(self, requested: bool) -> bool {
        match self {
            TotalPolicy::Optional => requested,
            TotalPolicy::Always => true,
            TotalPolicy::Never => false,
        }
    }
}

/// Configuration of one resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Conf {
    pub allowed_modes: Vec<Mode>,
    /// Page size used when a list request gives none
    pub default_limit: Option<usize>,
    pub force_total: TotalPolicy,
}

impl Default for Conf {
    fn default() -> Self {
        Self {
            allowed_modes: Mode::ALL.to_vec(),
            default_limit: None,
            force_total: TotalPolicy::default(),
        }
    }
}

impl Conf {
    /// Read and list only
    pub fn read_only() -> Self {
        Self {
            allowed_modes: vec![Mode::Read, Mode::List],
            ..Self::default()
        }
    }

    /// Create, update, replace and delete only
    pub fn write_only() -> Self {
        Self {
            allowed_modes: vec![Mode::Create, Mode::Update, Mode::Replace, Mode::Delete],
            ..Self::default()
        }
    }

    pub fn with_modes(mut self, modes: &[Mode]) -> Self {
        self.allowed_modes = modes.to_vec();
        self
    }

    pub fn with_default_limit(mut self, limit: usize) -> Self {
        self.default_limit = Some(limit);
        self
    }

    pub fn with_total(mut self, policy: TotalPolicy) -> Self {
        self.force_total = policy;
        self
    }

    pub fn is_mode_allowed(&self, mode: Mode) -> bool {
        self.allowed_modes.contains(&mode)
    }

    /// Reject configurations no resource can be bound with
    pub fn validate(&self, resource: &str) -> GraphResult<()> {
        if self.allowed_modes.is_empty() {
            return Err(ConfigError::InvalidBinding {
                resource: resource.to_string(),
                message: "no allowed modes".to_string(),
            }
            .into());
        }
        if self.default_limit == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: format!("{}.default_limit", resource),
                value: "0".to_string(),
                message: "must be positive".to_string(),
            }
            .into());
        }
        Ok(())
    }
}
