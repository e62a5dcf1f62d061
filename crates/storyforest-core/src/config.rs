use crate::error::{Result, StoryError};
use crate::paths;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_DEPTH_LIMIT: u32 = 5;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// ProjectConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

// ---------------------------------------------------------------------------
// HierarchyConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HierarchyConfig {
    #[serde(default = "default_depth_limit")]
    pub depth_limit: u32,
}

fn default_depth_limit() -> u32 {
    DEFAULT_DEPTH_LIMIT
}

impl Default for HierarchyConfig {
    fn default() -> Self {
        Self {
            depth_limit: default_depth_limit(),
        }
    }
}

// ---------------------------------------------------------------------------
// QualityConfig
// ---------------------------------------------------------------------------

/// Thresholds for the sizing heuristics, in story points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityConfig {
    /// Estimates above this are too large to estimate with confidence.
    #[serde(default = "default_max_estimate")]
    pub max_estimate: f64,
    /// Leaf stories above this should be split into children.
    #[serde(default = "default_split_threshold")]
    pub split_threshold: f64,
    /// Refuse story and test writes that carry quality warnings unless the
    /// caller accepts them. Off by default, so warnings only inform.
    #[serde(default)]
    pub enforce_on_write: bool,
}

fn default_max_estimate() -> f64 {
    8.0
}

fn default_split_threshold() -> f64 {
    5.0
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            max_estimate: default_max_estimate(),
            split_threshold: default_split_threshold(),
            enforce_on_write: false,
        }
    }
}

// ---------------------------------------------------------------------------
// GateConfig
// ---------------------------------------------------------------------------

/// Extra conditions for reaching `done`. These cannot be overridden by
/// accepting warnings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GateConfig {
    #[serde(default)]
    pub require_children_done: bool,
    #[serde(default)]
    pub require_passing_tests: bool,
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    pub project: ProjectConfig,
    #[serde(default)]
    pub hierarchy: HierarchyConfig,
    #[serde(default)]
    pub quality: QualityConfig,
    #[serde(default)]
    pub gate: GateConfig,
}

fn default_version() -> u32 {
    1
}

impl Config {
    pub fn new(project_name: impl Into<String>) -> Self {
        Self {
            version: default_version(),
            project: ProjectConfig {
                name: project_name.into(),
                description: None,
            },
            hierarchy: HierarchyConfig::default(),
            quality: QualityConfig::default(),
            gate: GateConfig::default(),
        }
    }

    pub fn load(root: &Path) -> Result<Self> {
        if !paths::is_initialized(root) {
            return Err(StoryError::NotInitialized);
        }
        let data = std::fs::read_to_string(paths::config_path(root))?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    pub fn with_depth_limit(mut self, depth_limit: Option<u32>) -> Self {
        if let Some(limit) = depth_limit {
            self.hierarchy.depth_limit = limit;
        }
        self
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        let quality = &self.quality;

        if self.project.name.trim().is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "project.name is empty".to_string(),
            });
        }

        if self.hierarchy.depth_limit == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "hierarchy.depth_limit is 0: stories cannot have children".to_string(),
            });
        }

        for (name, value) in [
            ("quality.max_estimate", quality.max_estimate),
            ("quality.split_threshold", quality.split_threshold),
        ] {
            if !value.is_finite() || value < 0.0 {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: format!("{name} must be a non-negative number, got {value}"),
                });
            }
        }

        if quality.split_threshold > quality.max_estimate {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "quality.split_threshold ({}) is above quality.max_estimate ({}): \
                     the small check will never fire before the estimable check",
                    quality.split_threshold, quality.max_estimate
                ),
            });
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
